// Format-specific modules
pub mod archive;
pub mod heic;

pub use archive::{expand_archives, ExpandedEntry};
