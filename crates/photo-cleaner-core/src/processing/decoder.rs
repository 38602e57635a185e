use std::io::Cursor;

use image::io::{Limits, Reader as ImageReader};
use image::DynamicImage;
use log::debug;

use super::formats;
use super::resample::area_resample;
use crate::error::{Error, Result};
use crate::types::{ImageFormat, InputBlob};

/// Side length of the normalized grid every image is reduced to
pub const GRID_SIZE: usize = 32;

/// A normalized grayscale image: `GRID_SIZE` x `GRID_SIZE` luminance values
/// in the 0.0-255.0 range, row-major.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelGrid {
    pixels: Vec<f64>,
}

impl PixelGrid {
    /// Reduce a decoded image to the normalized grid.
    ///
    /// Luminance uses the BT.601 weights in integer arithmetic so the
    /// result does not depend on float rounding of the conversion.
    pub fn from_image(img: &DynamicImage) -> Result<Self> {
        let (width, height) = (img.width() as usize, img.height() as usize);
        if width == 0 || height == 0 {
            return Err(Error::CorruptData("image has no pixels".to_string()));
        }

        let rgb = img.to_rgb8();
        let pixels = area_resample(width, height, GRID_SIZE, GRID_SIZE, |x, y| {
            let p = rgb.get_pixel(x as u32, y as u32);
            let luma = 299 * p[0] as u32 + 587 * p[1] as u32 + 114 * p[2] as u32;
            luma as f64 / 1000.0
        });

        Ok(Self { pixels })
    }

    /// Build a grid from raw luminance values
    pub fn from_luma(pixels: Vec<f64>) -> Result<Self> {
        if pixels.len() != GRID_SIZE * GRID_SIZE {
            return Err(Error::CorruptData(format!(
                "expected {} grid values, got {}",
                GRID_SIZE * GRID_SIZE,
                pixels.len()
            )));
        }
        Ok(Self { pixels })
    }

    pub fn pixels(&self) -> &[f64] {
        &self.pixels
    }

    pub fn get(&self, x: usize, y: usize) -> f64 {
        self.pixels[y * GRID_SIZE + x]
    }
}

/// Options controlling how blobs are decoded
#[derive(Debug, Clone, Copy)]
pub struct DecodeOptions {
    /// Upper bound on bytes the decoder may allocate
    pub max_alloc: u64,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            max_alloc: 512 * 1024 * 1024,
        }
    }
}

/// Turns image blobs into normalized pixel grids. Pure: no side effects.
#[derive(Debug, Clone, Default)]
pub struct Decoder {
    options: DecodeOptions,
}

impl Decoder {
    pub fn new(options: DecodeOptions) -> Self {
        Self { options }
    }

    /// Decode a single image blob. Archives must be expanded first.
    pub fn decode(&self, blob: &InputBlob) -> Result<PixelGrid> {
        let img = self.decode_image(blob)?;
        PixelGrid::from_image(&img)
    }

    fn decode_image(&self, blob: &InputBlob) -> Result<DynamicImage> {
        let format = ImageFormat::from_bytes(&blob.bytes);
        debug!("Decoding {} as {:?}", blob.name, format);

        match format {
            ImageFormat::Zip => Err(Error::UnsupportedFormat(format!(
                "{} is a zip archive and must be expanded before decoding",
                blob.name
            ))),
            ImageFormat::Heic => formats::heic::decode_heic(&blob.bytes),
            ImageFormat::Other(kind) => Err(Error::UnsupportedFormat(format!(
                "{} ({})",
                blob.name, kind
            ))),
            _ => {
                let mut reader = ImageReader::new(Cursor::new(&blob.bytes[..]))
                    .with_guessed_format()
                    .map_err(|e| Error::CorruptData(e.to_string()))?;

                let mut limits = Limits::default();
                limits.max_alloc = Some(self.options.max_alloc);
                reader.limits(limits);

                Ok(reader.decode()?)
            }
        }
    }
}

/// Decode a blob with default options
pub fn decode(blob: &InputBlob) -> Result<PixelGrid> {
    Decoder::default().decode(blob)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageOutputFormat, Rgb, RgbImage};

    fn encode(img: &RgbImage, format: ImageOutputFormat) -> Vec<u8> {
        let mut bytes = Cursor::new(Vec::new());
        DynamicImage::ImageRgb8(img.clone())
            .write_to(&mut bytes, format)
            .unwrap();
        bytes.into_inner()
    }

    #[test]
    fn test_uniform_image_gives_uniform_grid() {
        let img = RgbImage::from_pixel(50, 40, Rgb([100, 100, 100]));
        let blob = InputBlob::new("gray.png", encode(&img, ImageOutputFormat::Png));

        let grid = decode(&blob).unwrap();
        assert_eq!(grid.pixels().len(), GRID_SIZE * GRID_SIZE);
        assert!(grid.pixels().iter().all(|v| (v - 100.0).abs() < 1e-9));
    }

    #[test]
    fn test_left_right_split_survives_normalization() {
        let img = RgbImage::from_fn(64, 64, |x, _| {
            if x < 32 {
                Rgb([0, 0, 0])
            } else {
                Rgb([255, 255, 255])
            }
        });
        let blob = InputBlob::new("split.bmp", encode(&img, ImageOutputFormat::Bmp));

        let grid = decode(&blob).unwrap();
        assert!(grid.get(0, 10) < 1.0);
        assert!(grid.get(31, 10) > 254.0);
    }

    #[test]
    fn test_unknown_bytes_are_unsupported() {
        let blob = InputBlob::new("notes.txt", b"just some text".to_vec());
        assert!(matches!(decode(&blob), Err(Error::UnsupportedFormat(_))));
    }

    #[test]
    fn test_truncated_png_is_corrupt() {
        let img = RgbImage::from_pixel(20, 20, Rgb([1, 2, 3]));
        let mut bytes = encode(&img, ImageOutputFormat::Png);
        bytes.truncate(bytes.len() / 2);
        let blob = InputBlob::new("broken.png", bytes);

        assert!(matches!(decode(&blob), Err(Error::CorruptData(_))));
    }

    #[test]
    fn test_zip_blob_is_rejected_by_decoder() {
        let blob = InputBlob::new("photos.zip", b"PK\x03\x04 not really".to_vec());
        assert!(matches!(decode(&blob), Err(Error::UnsupportedFormat(_))));
    }

    #[test]
    fn test_from_luma_checks_length() {
        assert!(PixelGrid::from_luma(vec![0.0; 10]).is_err());
        assert!(PixelGrid::from_luma(vec![0.0; GRID_SIZE * GRID_SIZE]).is_ok());
    }
}
