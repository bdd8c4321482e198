//! Projection-profile page segmentation.
//!
//! A scanned logbook page holds several entries separated by blank gaps.
//! Sending the vision model one entry at a time is dramatically more accurate
//! than prompting with the full page, so each page is cut into horizontal
//! strips before extraction: count dark pixels per row, knock out the
//! baseline contributed by grid lines and binding shadows, smooth with a
//! moving average, and cut at the rows that remain blank.
//!
//! All spatial parameters are calibrated for a reference page height of
//! 3024 px (the long edge of a typical phone photo) and are rescaled to the
//! actual image height at runtime.

pub(crate) mod convert;

use bon::Builder;
use image::codecs::jpeg::JpegEncoder;
use image::DynamicImage;
use thiserror::Error;

/// Reference image height the default parameters are calibrated against.
const REFERENCE_HEIGHT: u32 = 3024;

/// Fraction of the row width subtracted from every profile row. Grid lines
/// and binding shadows contribute roughly this much darkness to otherwise
/// blank rows; only actual text content survives the subtraction.
const NOISE_FLOOR_RATIO: f64 = 0.07;

/// Parameters controlling the slicing algorithm. Spatial values are in rows
/// at [`REFERENCE_HEIGHT`] and are scaled to the actual image height.
#[derive(Debug, Clone, Builder)]
pub struct SliceOptions {
    /// Rows with BT.601 luma below this count as dark.
    #[builder(default = 128)]
    pub darkness_threshold: u8,
    /// Moving-average half-window. A moving average (not a max dilation)
    /// preserves wide gaps as zero while bridging narrow within-entry gaps.
    #[builder(default = 80)]
    pub dilation_radius: u32,
    /// Gaps narrower than this merge the regions on either side.
    #[builder(default = 40)]
    pub min_gap_height: u32,
    /// Cropped strips shorter than this are discarded.
    #[builder(default = 150)]
    pub min_slice_height: u32,
    /// Extra rows kept above and below each cut.
    #[builder(default = 20)]
    pub padding: u32,
    /// JPEG quality of the encoded strips.
    #[builder(default = 85)]
    pub jpeg_quality: u8,
}

impl Default for SliceOptions {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// A cropped horizontal strip of the original page, JPEG-encoded.
#[derive(Debug, Clone)]
pub struct Slice {
    /// Zero-based, dense, top-to-bottom.
    pub index: usize,
    pub image_data: Vec<u8>,
    /// Crop bounds in original image rows, `y0 < y1`.
    pub y0: u32,
    pub y1: u32,
}

#[derive(Debug, Error)]
pub enum SliceError {
    #[error("failed to decode page image: {0}")]
    Decode(#[source] image::ImageError),
    #[error("failed to encode slice {index}: {source}")]
    Encode {
        index: usize,
        #[source]
        source: image::ImageError,
    },
}

/// Cut a page image into one strip per logbook entry.
///
/// Returns at least one slice for every decodable input: when fewer than two
/// regions are detected the whole page is returned as a single slice, which
/// is a valid outcome rather than an error. Identical input bytes and options
/// produce byte-identical output.
pub fn slice_image(image_bytes: &[u8], opts: &SliceOptions) -> Result<Vec<Slice>, SliceError> {
    let img = decode_image(image_bytes)?;
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();

    let scale = f64::from(height) / f64::from(REFERENCE_HEIGHT);
    let dilation_radius = scaled(opts.dilation_radius, scale);
    let min_gap_height = scaled(opts.min_gap_height, scale);
    let min_slice_height = scaled(opts.min_slice_height, scale);
    let padding = scaled(opts.padding, scale);

    let mut profile = projection_profile(&rgb, opts.darkness_threshold);

    let noise_floor = (f64::from(width) * NOISE_FLOOR_RATIO).round() as u32;
    for row in profile.iter_mut() {
        *row = row.saturating_sub(noise_floor);
    }

    let smoothed = moving_average(&profile, dilation_radius as usize);

    let content_threshold = f64::from(width) / 100.0;
    let regions = find_regions(&smoothed, content_threshold, min_gap_height);
    let regions = absorb_small_regions(regions, height);

    if regions.len() < 2 {
        return Ok(vec![full_page_slice(&rgb, height, opts.jpeg_quality)?]);
    }

    let mut slices = Vec::with_capacity(regions.len());
    let mut index = 0;
    for (start, end) in regions {
        let y0 = start.saturating_sub(padding);
        let y1 = (end + padding).min(height);
        if y1 - y0 < min_slice_height {
            continue;
        }

        let cropped = image::imageops::crop_imm(&rgb, 0, y0, width, y1 - y0).to_image();
        let image_data = encode_jpeg(&cropped, opts.jpeg_quality)
            .map_err(|source| SliceError::Encode { index, source })?;
        slices.push(Slice {
            index,
            image_data,
            y0,
            y1,
        });
        index += 1;
    }

    if slices.is_empty() {
        return Ok(vec![full_page_slice(&rgb, height, opts.jpeg_quality)?]);
    }

    Ok(slices)
}

/// Decode natively; on failure route through the bundled external converter
/// (HEIC/HEIF always take this path) and decode the converted JPEG. Fails
/// only when both attempts fail.
fn decode_image(bytes: &[u8]) -> Result<DynamicImage, SliceError> {
    match image::load_from_memory(bytes) {
        Ok(img) => Ok(img),
        Err(primary) => match convert::to_jpeg(bytes) {
            Ok(jpeg) => image::load_from_memory(&jpeg).map_err(SliceError::Decode),
            Err(err) => {
                tracing::debug!(error = %err, "external image conversion failed");
                Err(SliceError::Decode(primary))
            }
        },
    }
}

fn scaled(value: u32, scale: f64) -> u32 {
    if value == 0 {
        return 0;
    }
    ((f64::from(value) * scale).round() as u32).max(1)
}

/// Count dark pixels per row using BT.601 luma.
fn projection_profile(rgb: &image::RgbImage, threshold: u8) -> Vec<u32> {
    let (width, height) = rgb.dimensions();
    let mut profile = vec![0u32; height as usize];

    for (y, row) in profile.iter_mut().enumerate() {
        let mut count = 0u32;
        for x in 0..width {
            let [r, g, b] = rgb.get_pixel(x, y as u32).0;
            let luma = ((19595 * u32::from(r) + 38470 * u32::from(g) + 7471 * u32::from(b)
                + (1 << 15))
                >> 16) as u8;
            if luma < threshold {
                count += 1;
            }
        }
        *row = count;
    }
    profile
}

/// Moving average over `[i - radius, i + radius]`, window clamped at the
/// image edges.
fn moving_average(profile: &[u32], radius: usize) -> Vec<f64> {
    let n = profile.len();
    let mut prefix = vec![0u64; n + 1];
    for (i, value) in profile.iter().enumerate() {
        prefix[i + 1] = prefix[i] + u64::from(*value);
    }

    let mut smoothed = vec![0f64; n];
    for (i, out) in smoothed.iter_mut().enumerate() {
        let lo = i.saturating_sub(radius);
        let hi = (i + radius).min(n.saturating_sub(1));
        let window = (hi - lo + 1) as f64;
        *out = (prefix[hi + 1] - prefix[lo]) as f64 / window;
    }
    smoothed
}

/// Maximal contiguous runs of content rows as half-open `[y0, y1)` ranges,
/// with runs separated by gaps narrower than `min_gap` merged.
fn find_regions(smoothed: &[f64], content_threshold: f64, min_gap: u32) -> Vec<(u32, u32)> {
    let mut regions: Vec<(u32, u32)> = Vec::new();
    let mut start: Option<u32> = None;

    for (y, value) in smoothed.iter().enumerate() {
        let is_content = *value > content_threshold;
        match (is_content, start) {
            (true, None) => start = Some(y as u32),
            (false, Some(s)) => {
                regions.push((s, y as u32));
                start = None;
            }
            _ => {}
        }
    }
    if let Some(s) = start {
        regions.push((s, smoothed.len() as u32));
    }

    merge_close_regions(regions, min_gap)
}

fn merge_close_regions(regions: Vec<(u32, u32)>, min_gap: u32) -> Vec<(u32, u32)> {
    let mut merged: Vec<(u32, u32)> = Vec::with_capacity(regions.len());
    for region in regions {
        match merged.last_mut() {
            Some(last) if region.0 - last.1 < min_gap => last.1 = region.1,
            _ => merged.push(region),
        }
    }
    merged
}

/// Iteratively fold undersized regions into their nearest neighbor.
///
/// A logbook entry has an aircraft-info header visually above its narrative,
/// sometimes separated by a gap wider than inter-entry gaps; without this
/// pass the header would become its own (useless) strip.
fn absorb_small_regions(mut regions: Vec<(u32, u32)>, image_height: u32) -> Vec<(u32, u32)> {
    let threshold = image_height / 8;

    while regions.len() > 1 {
        let smallest = regions
            .iter()
            .enumerate()
            .filter(|(_, r)| r.1 - r.0 < threshold)
            .min_by_key(|(_, r)| r.1 - r.0)
            .map(|(i, _)| i);

        let Some(i) = smallest else {
            break;
        };

        let gap_before = (i > 0).then(|| regions[i].0 - regions[i - 1].1);
        let gap_after = (i + 1 < regions.len()).then(|| regions[i + 1].0 - regions[i].1);

        let merge_with_prev = match (gap_before, gap_after) {
            (Some(before), Some(after)) => before <= after,
            (Some(_), None) => true,
            (None, Some(_)) => false,
            (None, None) => break,
        };

        if merge_with_prev {
            regions[i - 1].1 = regions[i].1;
            regions.remove(i);
        } else {
            regions[i + 1].0 = regions[i].0;
            regions.remove(i);
        }
    }

    regions
}

fn full_page_slice(
    rgb: &image::RgbImage,
    height: u32,
    quality: u8,
) -> Result<Slice, SliceError> {
    let image_data =
        encode_jpeg(rgb, quality).map_err(|source| SliceError::Encode { index: 0, source })?;
    Ok(Slice {
        index: 0,
        image_data,
        y0: 0,
        y1: height,
    })
}

fn encode_jpeg(rgb: &image::RgbImage, quality: u8) -> Result<Vec<u8>, image::ImageError> {
    let mut buffer = Vec::new();
    let encoder = JpegEncoder::new_with_quality(&mut buffer, quality);
    rgb.write_with_encoder(encoder)?;
    Ok(buffer)
}
