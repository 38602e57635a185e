use image::DynamicImage;

use crate::error::{Error, Result};

/// Decode a HEIC/HEIF blob through libheif
#[cfg(feature = "heic")]
pub fn decode_heic(bytes: &[u8]) -> Result<DynamicImage> {
    use libheif_rs::{ColorSpace, HeifContext, RgbChroma};

    let heic_error = |msg: String| Error::CorruptData(format!("HEIC: {}", msg));

    let ctx = HeifContext::read_from_bytes(bytes)
        .map_err(|e| heic_error(format!("failed to read container: {}", e)))?;

    let handle = ctx
        .primary_image_handle()
        .map_err(|e| heic_error(format!("no primary image: {}", e)))?;

    let heif_img = handle
        .decode(ColorSpace::Rgb(RgbChroma::Rgb), None)
        .map_err(|e| heic_error(format!("failed to decode: {}", e)))?;

    let width = heif_img.width();
    let height = heif_img.height();

    let plane = heif_img
        .planes()
        .interleaved
        .ok_or_else(|| heic_error("image doesn't have interleaved data".to_string()))?;

    // Rows may be padded past width * 3
    let row_len = width as usize * 3;
    let mut pixels = Vec::with_capacity(row_len * height as usize);
    for row in plane.data.chunks(plane.stride).take(height as usize) {
        let end = row_len.min(row.len());
        pixels.extend_from_slice(&row[..end]);
    }

    let img = image::RgbImage::from_raw(width, height, pixels)
        .ok_or_else(|| heic_error("plane is smaller than the image".to_string()))?;

    Ok(DynamicImage::ImageRgb8(img))
}

/// HEIC support is compiled out; report the blob as unsupported
#[cfg(not(feature = "heic"))]
pub fn decode_heic(_bytes: &[u8]) -> Result<DynamicImage> {
    Err(Error::UnsupportedFormat(
        "HEIC/HEIF (built without the `heic` feature)".to_string(),
    ))
}
