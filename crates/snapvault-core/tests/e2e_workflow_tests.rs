use std::fs;
use std::path::Path;

use tempfile::tempdir;

use snapvault_core::digest::HashAlgorithm;
use snapvault_core::mapping::{media_files, DateMapper, FolderStructure, ScanOptions};
use snapvault_core::record::{ConfigSignature, RunMode, RunRecordReader, RunRecordWriter};
use snapvault_core::store::discovery::{
    discover_reports, select_report, DiscoveryFilter, Selection, SelectionMode,
};
use snapvault_core::store::Store;
use snapvault_core::{Cleaner, SilentReporter, Verifier};

fn test_signature() -> ConfigSignature {
    ConfigSignature {
        folder_structure: "YYYY/MM".to_string(),
        renaming_enabled: false,
        renaming_pattern: "{date}_{time}".to_string(),
        folder_tags_enabled: false,
        on_collision: "check_hash".to_string(),
    }
}

fn write_file(path: &Path, content: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Full pipeline: organizing run writes a record, verification proves the
/// copies, cleanup deletes exactly the proven sources.
#[test]
fn test_record_verify_cleanup_workflow() {
    let tmp = tempdir().unwrap();
    let store = Store::new(tmp.path().join("state"));
    let source_root = tmp.path().join("incoming");
    let destination_root = tmp.path().join("sorted");

    // Library state after an organizing run:
    //   good.jpg:    copied correctly
    //   corrupt.jpg: copy truncated on the way
    //   nodate.jpg:  skipped by the run
    let good_src = source_root.join("good.jpg");
    let good_dst = destination_root.join("2024").join("01").join("good.jpg");
    let corrupt_src = source_root.join("corrupt.jpg");
    let corrupt_dst = destination_root.join("2024").join("02").join("corrupt.jpg");
    let nodate_src = source_root.join("nodate.jpg");

    write_file(&good_src, b"good photo bytes");
    write_file(&good_dst, b"good photo bytes");
    write_file(&corrupt_src, b"complete photo bytes");
    write_file(&corrupt_dst, b"complete ph");
    write_file(&nodate_src, b"undated photo");

    let mut writer = RunRecordWriter::begin(
        &store,
        &source_root,
        &destination_root,
        RunMode::LiveCopy,
        test_signature(),
    )
    .unwrap();
    writer.record_copy(&good_src, &good_dst).unwrap();
    writer.record_copy(&corrupt_src, &corrupt_dst).unwrap();
    writer.record_skip(&nodate_src, "no date detected").unwrap();
    let record_path = writer.finalize().unwrap();

    // Verify.
    let verifier = Verifier::new(HashAlgorithm::Sha256);
    let reader = RunRecordReader::open(&record_path).unwrap();
    let outcome = verifier.verify_run(&store, reader, &SilentReporter).unwrap();

    assert_eq!(outcome.summary.total, 3);
    assert_eq!(outcome.summary.ok, 1);
    assert_eq!(outcome.summary.mismatch, 1);
    assert_eq!(outcome.summary.skipped, 1);

    // The report is discoverable without knowing its path.
    let reports = discover_reports(&store, &DiscoveryFilter::default()).unwrap();
    assert_eq!(reports.len(), 1);
    let selected = match select_report(&store, &DiscoveryFilter::default(), &SelectionMode::Last)
        .unwrap()
    {
        Selection::Chosen(summary) => summary,
        Selection::NeedsChoice(_) => panic!("one report must auto-select"),
    };
    assert_eq!(selected.verify_id, outcome.verify_id);

    // Cleanup, live.
    let cleaner = Cleaner::new().with_dry_run(false);
    let result = cleaner.cleanup(&selected.path, &SilentReporter).unwrap();

    assert_eq!(result.deleted, 1);
    assert_eq!(result.skipped, 2);
    assert_eq!(result.failed, 0);

    // The verified source is gone; everything else is untouched.
    assert!(!good_src.exists());
    assert!(corrupt_src.exists());
    assert!(nodate_src.exists());
    assert!(good_dst.exists());
    assert!(corrupt_dst.exists());
}

/// The no-record path: reconstruct the mapping from rules, content-search the
/// one relocated file, and clean up only what was proven.
#[test]
fn test_reconstruct_verify_cleanup_workflow() {
    let tmp = tempdir().unwrap();
    let store = Store::new(tmp.path().join("state"));
    let source_root = tmp.path().join("incoming");
    let destination_root = tmp.path().join("sorted");
    fs::create_dir_all(&destination_root).unwrap();

    // in_place.jpg:  sits exactly where the rules put it
    // relocated.jpg: same content survives under a different name
    // lost.jpg:      never made it to the destination
    let in_place_src = source_root.join("20240315_142530.jpg");
    let in_place_dst = destination_root
        .join("2024")
        .join("03")
        .join("20240315_142530.jpg");
    let relocated_src = source_root.join("20231224_180000.jpg");
    let relocated_dst = destination_root.join("christmas").join("eve.jpg");
    let lost_src = source_root.join("20220101_000000.jpg");

    write_file(&in_place_src, b"march photo");
    write_file(&in_place_dst, b"march photo");
    write_file(&relocated_src, b"christmas photo");
    write_file(&relocated_dst, b"christmas photo");
    write_file(&lost_src, b"lost photo");

    let mapper = DateMapper::new(&destination_root, FolderStructure::YearMonth);
    let options = ScanOptions {
        extensions: [".jpg".to_string()].into_iter().collect(),
        ignore_hidden: true,
    };
    let mut sources: Vec<_> = media_files(&source_root, &options).collect();
    sources.sort();

    let verifier = Verifier::new(HashAlgorithm::Sha256).with_content_search(true);
    let outcome = verifier
        .verify_reconstructed(
            &store,
            &source_root,
            &destination_root,
            &mapper,
            sources,
            &SilentReporter,
        )
        .unwrap();

    assert_eq!(outcome.summary.total, 3);
    assert_eq!(outcome.summary.ok, 2);
    assert_eq!(outcome.summary.missing_destination, 1);

    let cleaner = Cleaner::new().with_dry_run(false);
    let result = cleaner.cleanup(&outcome.path, &SilentReporter).unwrap();

    assert_eq!(result.deleted, 2);
    assert_eq!(result.skipped, 1);
    assert!(!in_place_src.exists());
    assert!(!relocated_src.exists());
    assert!(lost_src.exists(), "unproven source must never be deleted");
    assert!(in_place_dst.exists());
    assert!(relocated_dst.exists());
}
