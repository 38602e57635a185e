use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use crate::error::FailureKind;

/// Opaque handle identifying an image within one scan session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ImageId(pub u32);

impl fmt::Display for ImageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Blob formats the decoder recognises
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageFormat {
    Jpeg,
    Png,
    Gif,
    WebP,
    Bmp,
    Tiff,
    Heic,
    Zip,
    Other(String),
}

impl ImageFormat {
    /// Determine format from file extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Self::Jpeg,
            "png" => Self::Png,
            "gif" => Self::Gif,
            "webp" => Self::WebP,
            "bmp" => Self::Bmp,
            "tif" | "tiff" => Self::Tiff,
            "heic" | "heif" => Self::Heic,
            "zip" => Self::Zip,
            other => Self::Other(other.to_string()),
        }
    }

    /// Determine format from the leading bytes of a blob
    pub fn from_bytes(bytes: &[u8]) -> Self {
        if bytes.starts_with(b"PK\x03\x04") || bytes.starts_with(b"PK\x05\x06") {
            return Self::Zip;
        }
        if is_heif_signature(bytes) {
            return Self::Heic;
        }
        match image::guess_format(bytes) {
            Ok(image::ImageFormat::Jpeg) => Self::Jpeg,
            Ok(image::ImageFormat::Png) => Self::Png,
            Ok(image::ImageFormat::Gif) => Self::Gif,
            Ok(image::ImageFormat::WebP) => Self::WebP,
            Ok(image::ImageFormat::Bmp) => Self::Bmp,
            Ok(image::ImageFormat::Tiff) => Self::Tiff,
            Ok(other) => Self::Other(format!("{:?}", other).to_lowercase()),
            Err(_) => Self::Other("unknown".to_string()),
        }
    }

    /// Check if format is supported
    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Other(_))
    }
}

/// HEIF containers carry an `ftyp` box whose major brand names the codec
fn is_heif_signature(bytes: &[u8]) -> bool {
    if bytes.len() < 12 || &bytes[4..8] != b"ftyp" {
        return false;
    }
    matches!(
        &bytes[8..12],
        b"heic" | b"heix" | b"hevc" | b"hevx" | b"heim" | b"heis" | b"mif1" | b"msf1"
    )
}

/// A named blob handed to the scanner
#[derive(Debug, Clone)]
pub struct InputBlob {
    /// Display name, usually the file name or `archive.zip/entry.jpg`
    pub name: String,

    /// Raw file contents
    pub bytes: Arc<[u8]>,
}

impl InputBlob {
    pub fn new(name: impl Into<String>, bytes: impl Into<Arc<[u8]>>) -> Self {
        Self {
            name: name.into(),
            bytes: bytes.into(),
        }
    }

    /// Load a file from disk into a blob named after its path
    pub fn from_path<P: AsRef<Path>>(path: P) -> std::io::Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        Ok(Self::new(path.display().to_string(), bytes))
    }

    pub fn byte_size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// Decode progress of a single image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DecodeStatus {
    Pending,
    Decoded,
    Failed,
}

/// One image accepted into a scan session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageRecord {
    pub id: ImageId,

    /// Name the caller submitted, or the archive path of an extracted entry
    pub source_name: String,

    pub byte_size: u64,

    pub decode_status: DecodeStatus,

    /// Why decoding failed, when it did
    pub failure: Option<FailedFile>,
}

impl ImageRecord {
    pub fn new(id: ImageId, source_name: impl Into<String>, byte_size: u64) -> Self {
        Self {
            id,
            source_name: source_name.into(),
            byte_size,
            decode_status: DecodeStatus::Pending,
            failure: None,
        }
    }
}

/// A file that was accepted but could not be fingerprinted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FailedFile {
    pub id: ImageId,
    pub source_name: String,
    pub kind: FailureKind,
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_from_extension() {
        assert_eq!(ImageFormat::from_extension("JPG"), ImageFormat::Jpeg);
        assert_eq!(ImageFormat::from_extension("tif"), ImageFormat::Tiff);
        assert_eq!(ImageFormat::from_extension("heif"), ImageFormat::Heic);
        assert_eq!(ImageFormat::from_extension("zip"), ImageFormat::Zip);
        assert!(!ImageFormat::from_extension("txt").is_supported());
    }

    #[test]
    fn test_format_from_bytes() {
        assert_eq!(
            ImageFormat::from_bytes(b"\x89PNG\r\n\x1a\n\0\0\0\0"),
            ImageFormat::Png
        );
        assert_eq!(ImageFormat::from_bytes(b"\xFF\xD8\xFF\xE0"), ImageFormat::Jpeg);
        assert_eq!(ImageFormat::from_bytes(b"PK\x03\x04rest"), ImageFormat::Zip);
        assert_eq!(
            ImageFormat::from_bytes(b"\0\0\0\x18ftypheic\0\0\0\0"),
            ImageFormat::Heic
        );
        assert!(!ImageFormat::from_bytes(b"plain text").is_supported());
    }

    #[test]
    fn test_new_record_is_pending() {
        let record = ImageRecord::new(ImageId(7), "a.jpg", 10);
        assert_eq!(record.decode_status, DecodeStatus::Pending);
        assert!(record.failure.is_none());
        assert_eq!(record.id.to_string(), "#7");
    }
}
