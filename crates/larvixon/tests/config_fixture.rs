//! Loads the sample configuration and wires services from it.

mod common;

use std::path::Path;

use common::TestHarness;
use uuid::Uuid;

use larvixon::config::{parse_config, LogFormat};
use larvixon::directory;
use larvixon::predictor;
use larvixon::upload::{OwnerId, UploadCoordinator, UploadError, UploadFile};

fn fixture() -> larvixon::Config {
    let content = std::fs::read_to_string(
        Path::new(env!("CARGO_MANIFEST_DIR")).join("tests/fixtures/config.json"),
    )
    .unwrap();
    parse_config(&content).unwrap()
}

#[test]
fn test_fixture_parses() {
    let config = fixture();

    assert_eq!(config.worker_count, 2);
    assert_eq!(config.upload.max_file_size_bytes, 1_048_576);
    assert_eq!(config.logging.format, LogFormat::Json);
    assert_eq!(
        config.staging_directory(),
        Path::new("/srv/larvixon/media/staging")
    );

    let predictor = predictor::from_config(&config.predictor).unwrap();
    assert_eq!(predictor.name(), "synthetic");
}

#[test]
fn test_static_directory_links_subject() {
    let config = fixture();
    let harness = TestHarness::new();
    let coordinator = UploadCoordinator::new(
        harness.db.clone(),
        harness.assets.clone(),
        directory::from_config(&config.directory).unwrap(),
        harness.queue.clone(),
        &config.upload,
    );
    let known: Uuid = "5b1f4c1e-8a0b-4a53-9d1f-1d3f6a0c2e11".parse().unwrap();

    let analysis = coordinator
        .upload(
            Some(UploadFile::from_bytes("clip.MOV", b"0123456789".to_vec())),
            "morning batch",
            Some(" 5b1f4c1e-8a0b-4a53-9d1f-1d3f6a0c2e11 "),
            &OwnerId(1),
        )
        .unwrap();
    assert_eq!(analysis.subject_ref, Some(known));
    assert_eq!(analysis.description, "morning batch");

    let unknown = Uuid::new_v4();
    let err = coordinator
        .upload(
            Some(UploadFile::from_bytes("clip.mp4", b"0123456789".to_vec())),
            "",
            Some(&unknown.to_string()),
            &OwnerId(1),
        )
        .unwrap_err();
    assert!(matches!(err, UploadError::ReferenceNotFound(id) if id == unknown));

    let err = coordinator
        .upload(
            Some(UploadFile::from_bytes("big.mp4", vec![0u8; 2 * 1024 * 1024])),
            "",
            None,
            &OwnerId(1),
        )
        .unwrap_err();
    assert!(matches!(err, UploadError::TooLarge { .. }));
    assert_eq!(harness.queue.pending(), 1);
}
