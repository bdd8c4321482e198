//! PDF rasterization capability.
//!
//! The pipeline treats PDF rendering as an external collaborator: the
//! [`PageRasterizer`] trait is the capability boundary and
//! [`PdfiumRasterizer`] binds it to Pdfium. Pages come back as 200-DPI JPEG
//! bytes in document order.

use std::env;
use std::path::{Path, PathBuf};

use image::codecs::jpeg::JpegEncoder;
use pdfium_render::prelude::{PdfRenderConfig, Pdfium, PdfiumError};
use thiserror::Error;

use crate::constants::PDF_RENDER_DPI;

/// JPEG quality of rasterized pages.
const PAGE_JPEG_QUALITY: u8 = 90;

#[derive(Debug, Error)]
pub enum RasterizeError {
    #[error("failed to load Pdfium runtime: {0}")]
    Library(#[from] PdfiumError),

    #[error("failed to load PDF document: {0}")]
    Document(#[source] PdfiumError),

    #[error("failed to render page {page_index}: {source}")]
    PageRender {
        page_index: usize,
        #[source]
        source: PdfiumError,
    },

    #[error("failed to encode page {page_index} as JPEG: {source}")]
    Encode {
        page_index: usize,
        #[source]
        source: image::ImageError,
    },
}

/// Renders a PDF byte stream into one image per page.
pub trait PageRasterizer: Send + Sync {
    fn rasterize(&self, pdf_bytes: &[u8]) -> Result<Vec<Vec<u8>>, RasterizeError>;
}

/// Pdfium-backed rasterizer.
#[derive(Debug, Default, Clone, Copy)]
pub struct PdfiumRasterizer;

impl PageRasterizer for PdfiumRasterizer {
    fn rasterize(&self, pdf_bytes: &[u8]) -> Result<Vec<Vec<u8>>, RasterizeError> {
        let pdfium = load_pdfium()?;
        let document = pdfium
            .load_pdf_from_byte_slice(pdf_bytes, None)
            .map_err(RasterizeError::Document)?;

        let render_config = PdfRenderConfig::new().scale_page_by_factor(PDF_RENDER_DPI / 72.0);
        let mut pages = Vec::with_capacity(document.pages().len() as usize);

        for (page_index, page) in document.pages().iter().enumerate() {
            let bitmap = page
                .render_with_config(&render_config)
                .map_err(|source| RasterizeError::PageRender { page_index, source })?;

            let width = bitmap.width() as u32;
            let height = bitmap.height() as u32;
            let rgba = bitmap.as_rgba_bytes();

            let rgba_image = image::RgbaImage::from_raw(width, height, rgba).ok_or_else(|| {
                RasterizeError::PageRender {
                    page_index,
                    source: PdfiumError::ImageError,
                }
            })?;
            let rgb = image::DynamicImage::ImageRgba8(rgba_image).to_rgb8();

            let mut encoded = Vec::new();
            let encoder = JpegEncoder::new_with_quality(&mut encoded, PAGE_JPEG_QUALITY);
            rgb.write_with_encoder(encoder)
                .map_err(|source| RasterizeError::Encode { page_index, source })?;

            pages.push(encoded);
        }

        Ok(pages)
    }
}

fn load_pdfium() -> Result<Pdfium, PdfiumError> {
    if let Some(result) = try_bind_from_env("PDFIUM_LIBRARY_PATH") {
        return result;
    }

    for var in ["PDFIUM_LIB_DIR", "PDFIUM_DYNAMIC_LIB_PATH", "PDFIUM_LIBRARY_DIR"] {
        if let Some(Ok(pdfium)) = try_bind_from_env(var) {
            return Ok(pdfium);
        }
    }

    match Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./")) {
        Ok(bindings) => Ok(Pdfium::new(bindings)),
        Err(primary_err) => match Pdfium::bind_to_system_library() {
            Ok(bindings) => Ok(Pdfium::new(bindings)),
            Err(_) => Err(primary_err),
        },
    }
}

fn try_bind_from_env(var: &str) -> Option<Result<Pdfium, PdfiumError>> {
    let value = env::var_os(var)?;
    try_bind_from_path(PathBuf::from(&value))
}

fn try_bind_from_path(path: impl AsRef<Path>) -> Option<Result<Pdfium, PdfiumError>> {
    let path = path.as_ref();
    if path.is_dir() {
        let lib_path = Pdfium::pdfium_platform_library_name_at_path(path);
        Some(Pdfium::bind_to_library(lib_path).map(Pdfium::new))
    } else if path.exists() {
        Some(Pdfium::bind_to_library(path).map(Pdfium::new))
    } else {
        None
    }
}
