use std::fs;
use std::path::{Path, PathBuf};

use tempfile::tempdir;

use snapvault_core::digest::HashAlgorithm;
use snapvault_core::error::Error;
use snapvault_core::mapping::{DateMapper, FolderStructure};
use snapvault_core::record::{ConfigSignature, RunMode, RunRecordReader, RunRecordWriter};
use snapvault_core::report::{InputSource, MatchType, VerificationReport, VerifyStatus};
use snapvault_core::store::Store;
use snapvault_core::{SilentReporter, Verifier};

fn test_signature() -> ConfigSignature {
    ConfigSignature {
        folder_structure: "YYYY/MM".to_string(),
        renaming_enabled: false,
        renaming_pattern: "{date}_{time}".to_string(),
        folder_tags_enabled: false,
        on_collision: "check_hash".to_string(),
    }
}

struct Fixture {
    _tmp: tempfile::TempDir,
    store: Store,
    source_root: PathBuf,
    destination_root: PathBuf,
}

fn fixture() -> Fixture {
    let tmp = tempdir().unwrap();
    let store = Store::new(tmp.path().join("state"));
    let source_root = tmp.path().join("source");
    let destination_root = tmp.path().join("dest");
    fs::create_dir_all(&source_root).unwrap();
    fs::create_dir_all(&destination_root).unwrap();
    Fixture {
        _tmp: tmp,
        store,
        source_root,
        destination_root,
    }
}

fn write_file(path: &Path, content: &[u8]) {
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

#[test]
fn test_verify_run_record_ok_and_skipped() {
    // The canonical scenario: one good copy, one skipped entry.
    let fx = fixture();
    let a_src = fx.source_root.join("a.jpg");
    let a_dst = fx.destination_root.join("2024").join("01").join("a.jpg");
    let b_src = fx.source_root.join("b.jpg");
    write_file(&a_src, b"photo a bytes");
    write_file(&a_dst, b"photo a bytes");
    write_file(&b_src, b"photo b bytes");

    let mut writer = RunRecordWriter::begin(
        &fx.store,
        &fx.source_root,
        &fx.destination_root,
        RunMode::LiveCopy,
        test_signature(),
    )
    .unwrap();
    writer.record_copy(&a_src, &a_dst).unwrap();
    writer.record_skip(&b_src, "no date detected").unwrap();
    let record_path = writer.finalize().unwrap();

    let verifier = Verifier::new(HashAlgorithm::Sha256);
    let reader = RunRecordReader::open(&record_path).unwrap();
    let outcome = verifier
        .verify_run(&fx.store, reader, &SilentReporter)
        .unwrap();

    assert_eq!(outcome.summary.total, 2);
    assert_eq!(outcome.summary.ok, 1);
    assert_eq!(outcome.summary.skipped, 1);

    let report = VerificationReport::load(&outcome.path).unwrap();
    assert!(report.finalized);
    assert_eq!(report.header.input_source, InputSource::RunRecord);

    let a_entry = &report.entries[0];
    assert_eq!(a_entry.status, VerifyStatus::Ok);
    assert_eq!(a_entry.match_type, MatchType::ExpectedPath);
    assert_eq!(a_entry.actual_destination_path.as_deref(), Some(a_dst.as_path()));
    assert_eq!(a_entry.source_hash, a_entry.destination_hash);
    assert!(a_entry.source_hash.is_some());

    let b_entry = &report.entries[1];
    assert_eq!(b_entry.status, VerifyStatus::Skipped);
    assert!(b_entry.source_hash.is_none());
}

#[test]
fn test_corrupt_copy_is_a_mismatch_never_ok() {
    let fx = fixture();
    let c_src = fx.source_root.join("c.jpg");
    let c_dst = fx.destination_root.join("c.jpg");
    write_file(&c_src, b"full photo content");
    // Truncated copy.
    write_file(&c_dst, b"full photo");

    let verifier = Verifier::new(HashAlgorithm::Sha256);
    let entry = verifier.verify_single(&c_src, &c_dst);
    assert_eq!(entry.status, VerifyStatus::Mismatch);
    assert_ne!(entry.source_hash, entry.destination_hash);
    assert!(entry.source_hash.is_some());
    assert!(entry.destination_hash.is_some());
}

#[test]
fn test_missing_destination_and_missing_source() {
    let fx = fixture();
    let present = fx.source_root.join("present.jpg");
    write_file(&present, b"content");

    let verifier = Verifier::new(HashAlgorithm::Sha256);

    let entry = verifier.verify_single(&present, &fx.destination_root.join("absent.jpg"));
    assert_eq!(entry.status, VerifyStatus::MissingDestination);

    let entry = verifier.verify_single(
        &fx.source_root.join("gone.jpg"),
        &fx.destination_root.join("absent.jpg"),
    );
    assert_eq!(entry.status, VerifyStatus::MissingSource);
}

#[test]
fn test_move_entries_are_missing_source() {
    let fx = fixture();
    let moved_dst = fx.destination_root.join("moved.jpg");
    write_file(&moved_dst, b"moved content");

    let mut writer = RunRecordWriter::begin(
        &fx.store,
        &fx.source_root,
        &fx.destination_root,
        RunMode::LiveMove,
        test_signature(),
    )
    .unwrap();
    writer
        .record_move(&fx.source_root.join("moved.jpg"), &moved_dst)
        .unwrap();
    let record_path = writer.finalize().unwrap();

    let verifier = Verifier::new(HashAlgorithm::Sha256);
    let reader = RunRecordReader::open(&record_path).unwrap();
    let outcome = verifier
        .verify_run(&fx.store, reader, &SilentReporter)
        .unwrap();

    assert_eq!(outcome.summary.missing_source, 1);
    let report = VerificationReport::load(&outcome.path).unwrap();
    assert_eq!(
        report.entries[0].actual_destination_path.as_deref(),
        Some(moved_dst.as_path())
    );
}

#[test]
fn test_quick_mode_compares_sizes_only() {
    let fx = fixture();
    let src = fx.source_root.join("q.jpg");
    let same_size = fx.destination_root.join("q.jpg");
    write_file(&src, b"aaaaaaaa");
    write_file(&same_size, b"bbbbbbbb");

    let verifier = Verifier::new(HashAlgorithm::Quick);
    let entry = verifier.verify_single(&src, &same_size);
    // Same size passes quick verification even though content differs,
    // so quick results must never count as proof of content equality.
    assert_eq!(entry.status, VerifyStatus::Ok);
    assert_eq!(entry.hash_algorithm, HashAlgorithm::Quick);
    assert!(entry.source_hash.is_none());

    let shorter = fx.destination_root.join("short.jpg");
    write_file(&shorter, b"bbb");
    let entry = verifier.verify_single(&src, &shorter);
    assert_eq!(entry.status, VerifyStatus::Mismatch);
    assert_eq!(entry.error.as_deref(), Some("size mismatch"));
}

#[test]
fn test_reconstruction_matches_expected_path() {
    let fx = fixture();
    let src = fx.source_root.join("20240315_142530.jpg");
    let dst = fx
        .destination_root
        .join("2024")
        .join("03")
        .join("20240315_142530.jpg");
    write_file(&src, b"march photo");
    write_file(&dst, b"march photo");

    let mapper = DateMapper::new(&fx.destination_root, FolderStructure::YearMonth);
    let verifier = Verifier::new(HashAlgorithm::Sha256);
    let outcome = verifier
        .verify_reconstructed(
            &fx.store,
            &fx.source_root,
            &fx.destination_root,
            &mapper,
            vec![src],
            &SilentReporter,
        )
        .unwrap();

    assert_eq!(outcome.summary.ok, 1);
    let report = VerificationReport::load(&outcome.path).unwrap();
    assert_eq!(report.header.input_source, InputSource::Reconstructed);
    assert!(report.header.run_id.is_none());
    assert_eq!(report.entries[0].match_type, MatchType::ExpectedPath);
}

#[test]
fn test_content_search_fallback_order() {
    let fx = fixture();
    let src = fx.source_root.join("20240315_142530.jpg");
    // Destination landed somewhere else (renamed folder), same content.
    let relocated = fx.destination_root.join("keepers").join("best_shot.jpg");
    write_file(&src, b"relocated photo");
    write_file(&relocated, b"relocated photo");

    let mapper = DateMapper::new(&fx.destination_root, FolderStructure::YearMonth);

    // Content search disabled: expected path is absent, so the file is
    // reported missing.
    let verifier = Verifier::new(HashAlgorithm::Sha256);
    let outcome = verifier
        .verify_reconstructed(
            &fx.store,
            &fx.source_root,
            &fx.destination_root,
            &mapper,
            vec![src.clone()],
            &SilentReporter,
        )
        .unwrap();
    assert_eq!(outcome.summary.missing_destination, 1);

    // Content search enabled: the relocated copy is found by hash.
    let verifier = Verifier::new(HashAlgorithm::Sha256).with_content_search(true);
    let outcome = verifier
        .verify_reconstructed(
            &fx.store,
            &fx.source_root,
            &fx.destination_root,
            &mapper,
            vec![src],
            &SilentReporter,
        )
        .unwrap();
    assert_eq!(outcome.summary.ok, 1);

    let report = VerificationReport::load(&outcome.path).unwrap();
    let entry = &report.entries[0];
    assert_eq!(entry.match_type, MatchType::ContentSearch);
    assert_eq!(
        entry.actual_destination_path.as_deref(),
        Some(relocated.as_path())
    );
}

#[test]
fn test_content_search_rejects_same_size_different_content() {
    let fx = fixture();
    let src = fx.source_root.join("20240315_142530.jpg");
    let decoy = fx.destination_root.join("elsewhere").join("decoy.jpg");
    write_file(&src, b"12345678");
    // Same extension, same size, different bytes.
    write_file(&decoy, b"87654321");

    let mapper = DateMapper::new(&fx.destination_root, FolderStructure::YearMonth);
    let verifier = Verifier::new(HashAlgorithm::Sha256).with_content_search(true);
    let outcome = verifier
        .verify_reconstructed(
            &fx.store,
            &fx.source_root,
            &fx.destination_root,
            &mapper,
            vec![src],
            &SilentReporter,
        )
        .unwrap();

    assert_eq!(outcome.summary.ok, 0);
    assert_eq!(outcome.summary.ok_existing_duplicate, 0);
    assert_eq!(outcome.summary.missing_destination, 1);
}

#[test]
fn test_many_sources_matching_one_destination() {
    let fx = fixture();
    // Two sources with identical content, one surviving destination copy.
    let first = fx.source_root.join("20240101_080000.jpg");
    let second = fx.source_root.join("20240102_090000.jpg");
    let shared = fx.destination_root.join("archive").join("shared.jpg");
    write_file(&first, b"identical bytes");
    write_file(&second, b"identical bytes");
    write_file(&shared, b"identical bytes");

    let mapper = DateMapper::new(&fx.destination_root, FolderStructure::YearMonth);
    let verifier = Verifier::new(HashAlgorithm::Sha256).with_content_search(true);
    let outcome = verifier
        .verify_reconstructed(
            &fx.store,
            &fx.source_root,
            &fx.destination_root,
            &mapper,
            vec![first, second],
            &SilentReporter,
        )
        .unwrap();

    // First claim is a plain ok; the second source referencing the same
    // destination file is tagged as an existing duplicate. Both are hash
    // matches and both stay deletion-eligible.
    assert_eq!(outcome.summary.ok, 1);
    assert_eq!(outcome.summary.ok_existing_duplicate, 1);

    let report = VerificationReport::load(&outcome.path).unwrap();
    assert_eq!(report.entries[0].status, VerifyStatus::Ok);
    assert_eq!(report.entries[1].status, VerifyStatus::OkExistingDuplicate);
    assert_eq!(
        report.entries[0].actual_destination_path,
        report.entries[1].actual_destination_path
    );
}

#[test]
fn test_reconstruction_missing_source_with_derivable_destination() {
    let fx = fixture();
    // Filename carries the date, so the mapper works even though the file
    // is gone; the verifier reports the missing source per entry.
    let gone = fx.source_root.join("20240101_000000.jpg");

    let mapper = DateMapper::new(&fx.destination_root, FolderStructure::YearMonth);
    let verifier = Verifier::new(HashAlgorithm::Sha256);
    let outcome = verifier
        .verify_reconstructed(
            &fx.store,
            &fx.source_root,
            &fx.destination_root,
            &mapper,
            vec![gone],
            &SilentReporter,
        )
        .unwrap();
    assert_eq!(outcome.summary.missing_source, 1);
}

#[test]
fn test_reconstruction_mapper_failure_is_fatal() {
    let fx = fixture();
    // No date in the filename and no file to read a timestamp from: the
    // expected destination cannot be computed, and guessing would undermine
    // the integrity guarantee.
    let undatable = fx.source_root.join("holiday_snap.jpg");

    let mapper = DateMapper::new(&fx.destination_root, FolderStructure::YearMonth);
    let verifier = Verifier::new(HashAlgorithm::Sha256);
    let result = verifier.verify_reconstructed(
        &fx.store,
        &fx.source_root,
        &fx.destination_root,
        &mapper,
        vec![undatable],
        &SilentReporter,
    );
    assert!(matches!(result, Err(Error::Reconstruction { .. })));
}

#[test]
fn test_quick_mode_never_content_searches() {
    let fx = fixture();
    let src = fx.source_root.join("20240315_142530.jpg");
    let relocated = fx.destination_root.join("moved").join("photo.jpg");
    write_file(&src, b"payload!");
    write_file(&relocated, b"payload!");

    let mapper = DateMapper::new(&fx.destination_root, FolderStructure::YearMonth);
    let verifier = Verifier::new(HashAlgorithm::Quick).with_content_search(true);
    let outcome = verifier
        .verify_reconstructed(
            &fx.store,
            &fx.source_root,
            &fx.destination_root,
            &mapper,
            vec![src],
            &SilentReporter,
        )
        .unwrap();

    assert_eq!(outcome.summary.missing_destination, 1);
    let report = VerificationReport::load(&outcome.path).unwrap();
    assert!(report.entries[0]
        .error
        .as_deref()
        .unwrap()
        .contains("content search"));
}
