//! External-tool fallback for formats the native decoders reject.
//!
//! HEIC/HEIF phone photos cannot be decoded natively; `sips` (macOS),
//! `magick`, or `convert` (ImageMagick) are tried in order against a scratch
//! file. The first tool that produces a readable JPEG wins.

use std::io;
use std::process::Command;

pub(crate) fn to_jpeg(bytes: &[u8]) -> io::Result<Vec<u8>> {
    let dir = tempfile::tempdir()?;
    let input = dir.path().join("input.img");
    let output = dir.path().join("output.jpg");
    std::fs::write(&input, bytes)?;

    let input_arg = input.as_os_str();
    let output_arg = output.as_os_str();

    let candidates: [(&str, Vec<&std::ffi::OsStr>); 3] = [
        (
            "sips",
            vec![
                "-s".as_ref(),
                "format".as_ref(),
                "jpeg".as_ref(),
                input_arg,
                "--out".as_ref(),
                output_arg,
            ],
        ),
        ("magick", vec![input_arg, output_arg]),
        ("convert", vec![input_arg, output_arg]),
    ];

    for (tool, args) in candidates {
        let result = Command::new(tool).args(&args).output();
        match result {
            Ok(out) if out.status.success() && output.exists() => {
                let jpeg = std::fs::read(&output)?;
                if !jpeg.is_empty() {
                    tracing::debug!(tool, "converted image via external tool");
                    return Ok(jpeg);
                }
            }
            Ok(out) => {
                tracing::trace!(
                    tool,
                    status = %out.status,
                    "external converter rejected image"
                );
            }
            Err(err) if err.kind() == io::ErrorKind::NotFound => continue,
            Err(err) => tracing::trace!(tool, error = %err, "external converter unavailable"),
        }
    }

    Err(io::Error::new(
        io::ErrorKind::Unsupported,
        "no external image converter accepted the input",
    ))
}
