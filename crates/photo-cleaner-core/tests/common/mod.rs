//! Synthetic fixtures for integration tests: smooth photo-like images,
//! their re-encoded variants and zip archives of them.
#![allow(dead_code)]

use std::io::{Cursor, Write};

use image::{imageops::FilterType, DynamicImage, ImageOutputFormat, Rgb, RgbImage};
use photo_cleaner_core::{InputBlob, ProgressEvent, ScanResults, ScanService, SessionId};
use zip::write::FileOptions;

/// Minimal linear congruential generator so fixtures are reproducible
struct Lcg(u64);

impl Lcg {
    fn next_f64(&mut self) -> f64 {
        self.0 = self
            .0
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (self.0 >> 11) as f64 / (1u64 << 53) as f64
    }
}

struct Blob {
    cx: f64,
    cy: f64,
    sigma: f64,
    amplitude: [f64; 3],
}

/// A smooth random field: a sum of gaussian blobs over a grey base.
/// Coordinates are normalized, so any size renders the same picture.
pub fn photo(seed: u64, width: u32, height: u32) -> RgbImage {
    let mut rng = Lcg(seed.wrapping_add(0x9e37_79b9));
    let blobs: Vec<Blob> = (0..14)
        .map(|_| {
            let sign = if rng.next_f64() < 0.5 { -1.0 } else { 1.0 };
            let strength = 60.0 + rng.next_f64() * 80.0;
            Blob {
                cx: rng.next_f64(),
                cy: rng.next_f64(),
                sigma: 0.06 + rng.next_f64() * 0.2,
                amplitude: [
                    sign * strength,
                    sign * strength * (0.6 + rng.next_f64() * 0.4),
                    sign * strength * (0.4 + rng.next_f64() * 0.6),
                ],
            }
        })
        .collect();

    RgbImage::from_fn(width, height, |x, y| {
        let u = (x as f64 + 0.5) / width as f64;
        let v = (y as f64 + 0.5) / height as f64;
        let mut rgb = [128.0f64; 3];
        for blob in &blobs {
            let d2 = (u - blob.cx).powi(2) + (v - blob.cy).powi(2);
            let weight = (-d2 / (2.0 * blob.sigma * blob.sigma)).exp();
            for (channel, amplitude) in rgb.iter_mut().zip(blob.amplitude) {
                *channel += amplitude * weight;
            }
        }
        Rgb(rgb.map(|c| c.clamp(0.0, 255.0) as u8))
    })
}

pub fn inverted(img: &RgbImage) -> RgbImage {
    let mut out = img.clone();
    image::imageops::invert(&mut out);
    out
}

pub fn resized(img: &RgbImage, width: u32, height: u32) -> RgbImage {
    image::imageops::resize(img, width, height, FilterType::Triangle)
}

pub fn encode(img: &RgbImage, format: ImageOutputFormat) -> Vec<u8> {
    let mut bytes = Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img.clone())
        .write_to(&mut bytes, format)
        .unwrap();
    bytes.into_inner()
}

pub fn jpeg(img: &RgbImage, quality: u8) -> Vec<u8> {
    encode(img, ImageOutputFormat::Jpeg(quality))
}

pub fn png(img: &RgbImage) -> Vec<u8> {
    encode(img, ImageOutputFormat::Png)
}

/// Bytes that claim to be a PNG but cannot be decoded
pub fn corrupt_image() -> Vec<u8> {
    let mut bytes = b"\x89PNG\r\n\x1a\n".to_vec();
    bytes.extend_from_slice(&[0x5a; 64]);
    bytes
}

pub fn zip_of(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
    for (name, bytes) in entries {
        writer.start_file(*name, FileOptions::default()).unwrap();
        writer.write_all(bytes).unwrap();
    }
    writer.finish().unwrap().into_inner()
}

/// The A / A-resized / B trio: two near duplicates and an unrelated image
pub fn trio(seed: u64) -> Vec<InputBlob> {
    let a = photo(seed, 256, 256);
    vec![
        InputBlob::new("A.jpg", jpeg(&a, 95)),
        InputBlob::new("A-resized.jpg", jpeg(&resized(&a, 192, 192), 90)),
        InputBlob::new("B.png", png(&inverted(&a))),
    ]
}

/// `groups` families of three near duplicates, interleaved so that
/// family members are far apart in submission order
pub fn families(groups: u64) -> Vec<InputBlob> {
    let photos: Vec<RgbImage> = (0..groups).map(|g| photo(1000 + g, 256, 256)).collect();
    let mut blobs = Vec::new();
    for variant in 0..3 {
        for (g, img) in photos.iter().enumerate() {
            let (name, bytes) = match variant {
                0 => (format!("family{}-original.jpg", g), jpeg(img, 95)),
                1 => (
                    format!("family{}-small.jpg", g),
                    jpeg(&resized(img, 160, 160), 85),
                ),
                _ => (format!("family{}-lossless.png", g), png(img)),
            };
            blobs.push(InputBlob::new(name, bytes));
        }
    }
    blobs
}

/// Run a scan to the end and return its results
pub fn scan(service: &ScanService, blobs: Vec<InputBlob>) -> (SessionId, ScanResults) {
    let id = service.submit_files(blobs).unwrap();
    service.wait(id).unwrap();
    (id, service.get_results(id).unwrap())
}

pub fn events(service: &ScanService, id: SessionId) -> Vec<ProgressEvent> {
    service.subscribe_progress(id).unwrap().collect()
}
