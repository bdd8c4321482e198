//! File extension classification and media types for upload handling.

use std::path::Path;

pub const PDF_EXTENSION: &str = ".pdf";

const IMAGE_EXTENSIONS: [&str; 9] = [
    ".jpg", ".jpeg", ".png", ".gif", ".bmp", ".tiff", ".tif", ".heic", ".heif",
];

/// Lowercased extension including the leading dot, or empty.
pub fn file_extension(filename: &str) -> String {
    Path::new(filename)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| format!(".{}", ext.to_ascii_lowercase()))
        .unwrap_or_default()
}

pub fn is_pdf_extension(ext: &str) -> bool {
    ext == PDF_EXTENSION
}

pub fn is_image_extension(ext: &str) -> bool {
    IMAGE_EXTENSIONS.contains(&ext)
}

/// Content type for a file extension; unknown image-ish input defaults to
/// JPEG, matching what the pipeline normalizes pages to.
pub fn content_type_for(ext: &str) -> &'static str {
    match ext {
        ".jpg" | ".jpeg" => "image/jpeg",
        ".png" => "image/png",
        ".gif" => "image/gif",
        ".bmp" => "image/bmp",
        ".tiff" | ".tif" => "image/tiff",
        ".heic" => "image/heic",
        ".heif" => "image/heif",
        ".pdf" => "application/pdf",
        _ => "image/jpeg",
    }
}
