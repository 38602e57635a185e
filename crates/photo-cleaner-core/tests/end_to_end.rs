mod common;

use common::*;
use photo_cleaner_core::{
    ClusterKind, Config, DecodeStatus, FailureKind, ImageId, InputBlob, ScanService,
    SessionStatus,
};

#[test]
fn test_near_duplicates_form_one_cluster() {
    let service = ScanService::new(Config::default()).unwrap();
    let (_, results) = scan(&service, trio(7));

    assert_eq!(results.status, SessionStatus::Completed);
    assert_eq!(results.total_count, 3);
    assert_eq!(results.processed_count, 3);
    assert!(results.failed_files.is_empty());

    assert_eq!(results.clusters.len(), 1);
    let cluster = &results.clusters[0];
    assert_eq!(cluster.members, vec![ImageId(0), ImageId(1)]);
    assert_eq!(cluster.kind, ClusterKind::Similar);
    assert!(cluster.max_pairwise_distance <= Config::default().similarity_threshold);

    // The full-size original is the larger file
    assert_eq!(cluster.representative, ImageId(0));
    assert_eq!(results.record(ImageId(2)).unwrap().source_name, "B.png");
}

#[test]
fn test_zip_with_corrupt_entry() {
    let a = photo(11, 256, 256);
    let archive = zip_of(&[
        ("holiday/A.jpg", &jpeg(&a, 95)[..]),
        ("holiday/broken.jpg", &corrupt_image()[..]),
        ("holiday/A-small.jpg", &jpeg(&resized(&a, 128, 128), 80)[..]),
    ]);

    let service = ScanService::new(Config::default()).unwrap();
    let (_, results) = scan(&service, vec![InputBlob::new("photos.zip", archive)]);

    assert_eq!(results.status, SessionStatus::Completed);
    assert_eq!(results.total_count, 3);
    assert_eq!(results.clusters.len(), 1);
    assert_eq!(results.clusters[0].len(), 2);

    assert_eq!(results.failed_files.len(), 1);
    let failed = &results.failed_files[0];
    assert_eq!(failed.source_name, "photos.zip/holiday/broken.jpg");
    assert_eq!(failed.kind, FailureKind::CorruptData);
}

#[test]
fn test_byte_identical_files_are_exact_duplicates() {
    let bytes = jpeg(&photo(3, 200, 150), 90);
    let blobs = vec![
        InputBlob::new("one.jpg", bytes.clone()),
        InputBlob::new("two.jpg", bytes),
    ];

    let service = ScanService::new(Config::default()).unwrap();
    let (_, results) = scan(&service, blobs);

    assert_eq!(results.clusters.len(), 1);
    assert_eq!(results.clusters[0].max_pairwise_distance, 0);
    assert_eq!(results.clusters[0].kind, ClusterKind::Exact);
    // Same size: the smaller id wins
    assert_eq!(results.clusters[0].representative, ImageId(0));
}

#[test]
fn test_nested_archives_past_depth_limit() {
    let a = photo(5, 128, 128);
    let mut nested = zip_of(&[("deep.jpg", &jpeg(&a, 90)[..])]);
    for level in 0..3 {
        let name = format!("level{}.zip", level);
        nested = zip_of(&[(name.as_str(), &nested[..])]);
    }
    let outer = zip_of(&[("top.jpg", &jpeg(&a, 90)[..]), ("nest.zip", &nested[..])]);

    let mut config = Config::default();
    config.max_archive_depth = 3;
    let service = ScanService::new(config).unwrap();
    let (_, results) = scan(&service, vec![InputBlob::new("outer.zip", outer)]);

    assert_eq!(results.status, SessionStatus::Completed);
    assert_eq!(results.total_count, 2);
    assert_eq!(results.failed_files.len(), 1);
    assert_eq!(results.failed_files[0].kind, FailureKind::ArchiveTooDeep);
    assert!(results.clusters.is_empty());

    let top = results.record(ImageId(0)).unwrap();
    assert_eq!(top.source_name, "outer.zip/top.jpg");
    assert_eq!(top.decode_status, DecodeStatus::Decoded);
}

#[test]
fn test_archive_entries_past_budget_are_failures() {
    let a = photo(8, 128, 128);
    let bytes = jpeg(&a, 90);
    let outer = zip_of(&[
        ("one.jpg", &bytes[..]),
        ("two.jpg", &bytes[..]),
        ("three.jpg", &bytes[..]),
        ("four.jpg", &bytes[..]),
    ]);

    let mut config = Config::default();
    config.max_archive_entries = 2;
    let service = ScanService::new(config).unwrap();
    let (_, results) = scan(&service, vec![InputBlob::new("album.zip", outer)]);

    assert_eq!(results.status, SessionStatus::Completed);
    assert_eq!(results.total_count, 4);
    assert_eq!(results.processed_count, 4);
    assert_eq!(results.failed_files.len(), 2);
    assert!(results
        .failed_files
        .iter()
        .all(|f| f.kind == FailureKind::ArchiveTooLarge));
    assert_eq!(results.failed_files[0].source_name, "album.zip/three.jpg");

    // The two entries within budget still cluster
    assert_eq!(results.clusters.len(), 1);
    assert_eq!(results.clusters[0].members, vec![ImageId(0), ImageId(1)]);
}

#[test]
fn test_results_serialize_to_json() {
    let service = ScanService::new(Config::default()).unwrap();
    let (id, results) = scan(&service, trio(21));

    let json = serde_json::to_string(&results).unwrap();
    let parsed: photo_cleaner_core::ScanResults = serde_json::from_str(&json).unwrap();
    assert_eq!(parsed, results);
    assert_eq!(parsed.session_id, id);
}
