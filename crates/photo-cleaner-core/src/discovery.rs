use rayon::prelude::*;
use std::io;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use crate::error::{Error, Result};
use crate::types::{ImageFormat, InputBlob};

/// Find scannable files under `paths`.
///
/// Directories are walked up to `max_depth` levels (unbounded when `None`)
/// and yield files whose extension names a supported image format or a zip
/// archive. Explicit file paths are accepted whatever their extension; the
/// decoder sniffs content anyway. Results are sorted per input path.
pub fn discover_inputs<P: AsRef<Path>>(
    paths: &[P],
    max_depth: Option<usize>,
) -> Result<Vec<PathBuf>> {
    let paths: Vec<PathBuf> = paths.iter().map(|p| p.as_ref().to_path_buf()).collect();

    paths
        .par_iter()
        .map(|path| discover_in_path(path, max_depth))
        .collect::<Vec<Result<Vec<PathBuf>>>>()
        .into_iter()
        .try_fold(Vec::new(), |mut acc, result| {
            acc.extend(result?);
            Ok(acc)
        })
}

fn discover_in_path(path: &Path, max_depth: Option<usize>) -> Result<Vec<PathBuf>> {
    if !path.exists() {
        return Err(Error::Io(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} does not exist", path.display()),
        )));
    }

    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }

    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .max_depth(max_depth.unwrap_or(usize::MAX))
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| is_scannable_path(p))
        .collect();

    files.sort();
    Ok(files)
}

/// Returns if the path has an image or zip extension
pub fn is_scannable_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ImageFormat::from_extension(ext).is_supported())
        .unwrap_or(false)
}

/// Read every file into a blob, in the given order
pub fn load_inputs(paths: &[PathBuf]) -> Result<Vec<InputBlob>> {
    paths
        .par_iter()
        .map(|path| InputBlob::from_path(path).map_err(Error::from))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::{self, File};
    use std::io::Write;
    use tempfile::tempdir;

    fn create_test_file(dir: &Path, name: &str) -> PathBuf {
        let file_path = dir.join(name);
        let mut file = File::create(&file_path).unwrap();
        file.write_all(b"DUMMY IMAGE DATA").unwrap();
        file_path
    }

    fn setup_test_directory() -> tempfile::TempDir {
        let dir = tempdir().unwrap();
        let subdir = dir.path().join("subdir");
        fs::create_dir(&subdir).unwrap();

        create_test_file(dir.path(), "image1.jpg");
        create_test_file(dir.path(), "image2.PNG");
        create_test_file(dir.path(), "archive.zip");
        create_test_file(dir.path(), "notes.txt");
        create_test_file(&subdir, "nested.heic");
        create_test_file(&subdir, "nested.webp");
        dir
    }

    #[test]
    fn test_discovers_images_and_archives() {
        let dir = setup_test_directory();
        let found = discover_inputs(&[dir.path()], None).unwrap();

        let names: Vec<String> = found
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
            .collect();
        assert_eq!(found.len(), 5);
        assert!(names.contains(&"archive.zip".to_string()));
        assert!(names.contains(&"nested.heic".to_string()));
        assert!(!names.contains(&"notes.txt".to_string()));
    }

    #[test]
    fn test_max_depth_limits_walk() {
        let dir = setup_test_directory();
        let found = discover_inputs(&[dir.path()], Some(1)).unwrap();
        assert_eq!(found.len(), 3);
        assert!(found.iter().all(|p| p.parent() == Some(dir.path())));
    }

    #[test]
    fn test_explicit_file_is_accepted() {
        let dir = setup_test_directory();
        let notes = dir.path().join("notes.txt");
        assert_eq!(discover_inputs(&[&notes], None).unwrap(), vec![notes]);
    }

    #[test]
    fn test_missing_path_is_not_found() {
        let dir = tempdir().unwrap();
        let missing = dir.path().join("nope");
        match discover_inputs(&[missing], None) {
            Err(Error::Io(e)) => assert_eq!(e.kind(), io::ErrorKind::NotFound),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_load_inputs_names_blobs_by_path() {
        let dir = setup_test_directory();
        let path = dir.path().join("image1.jpg");
        let blobs = load_inputs(&[path.clone()]).unwrap();
        assert_eq!(blobs.len(), 1);
        assert_eq!(blobs[0].name, path.display().to_string());
        assert_eq!(&blobs[0].bytes[..], b"DUMMY IMAGE DATA");
    }
}
