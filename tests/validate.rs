mod common;

use std::fs;

use assert_matches::assert_matches;
use lab_session_manager::domain::{Modality, ModalitySet, Severity};
use lab_session_manager::error::LsmError;
use lab_session_manager::scan::ModalityRules;
use lab_session_manager::validate::Validator;

use common::{SESSION, SessionBuilder, temp_root};

fn data_checks() -> ModalitySet {
    ModalitySet::from_flags(true, true, true, false)
}

#[test]
fn only_ephys_is_valid_with_two_warnings() {
    let (_temp, root) = temp_root();
    let session = SessionBuilder::new(&root, SESSION).ephys(0, &["imec0"]);

    let report = Validator::default()
        .validate(&session.root, &data_checks())
        .unwrap();
    assert!(report.is_valid(), "{:?}", report.issues);
    let warnings = report.warnings().collect::<Vec<_>>();
    assert_eq!(warnings.len(), 2);
    assert!(warnings
        .iter()
        .any(|issue| issue.modality == Some(Modality::Behavior)));
    assert!(warnings
        .iter()
        .any(|issue| issue.modality == Some(Modality::Video)));
    assert_eq!(report.items(Modality::Ephys).len(), 1);
}

#[test]
fn full_session_has_no_issues() {
    let (_temp, root) = temp_root();
    let session = SessionBuilder::new(&root, SESSION).full();

    let report = Validator::default()
        .validate(&session.root, &ModalitySet::transferable())
        .unwrap();
    assert!(report.issues.is_empty(), "{:?}", report.issues);
    assert_eq!(report.items(Modality::Video).len(), 1);
    assert_eq!(report.items(Modality::Extras).len(), 1);
    assert_eq!(report.items(Modality::Behavior).len(), 4);
}

#[test]
fn malformed_folder_name_fails_before_scanning() {
    let (_temp, root) = temp_root();
    let path = root.join("raw/M020/m020-2024-03-01");
    fs::create_dir_all(&path).unwrap();
    assert_matches!(
        Validator::default().validate(&path, &data_checks()),
        Err(LsmError::InvalidSessionName { .. })
    );
}

#[test]
fn missing_folder_is_not_found() {
    let (_temp, root) = temp_root();
    let path = root.join("raw/M020").join(SESSION);
    assert_matches!(
        Validator::default().validate(&path, &data_checks()),
        Err(LsmError::SessionNotFound(_))
    );
}

#[test]
fn validation_is_repeatable_and_read_only() {
    let (_temp, root) = temp_root();
    let session = SessionBuilder::new(&root, SESSION)
        .behavior()
        .extra("notes.txt", "stray");
    let before = common::snapshot(&root);

    let validator = Validator::new(ModalityRules::default());
    let first = validator
        .validate(&session.root, &ModalitySet::transferable())
        .unwrap();
    let second = validator
        .validate(&session.root, &ModalitySet::transferable())
        .unwrap();
    assert_eq!(first.issues, second.issues);
    assert_eq!(common::snapshot(&root), before);
}

#[test]
fn loose_video_is_reported_under_video() {
    let (_temp, root) = temp_root();
    let session = SessionBuilder::new(&root, SESSION)
        .ephys(0, &["imec0"])
        .extra("Camera_0.avi", "frames");

    let report = Validator::default()
        .validate(&session.root, &data_checks())
        .unwrap();
    assert!(!report.is_valid());
    let error = report.errors().next().unwrap();
    assert_eq!(error.severity, Severity::Error);
    assert_eq!(error.modality, Some(Modality::Video));
}

#[test]
fn unprefixed_extra_file_is_an_error() {
    let (_temp, root) = temp_root();
    let session = SessionBuilder::new(&root, SESSION)
        .ephys(0, &["imec0"])
        .extra("comment.txt", "left unprefixed");

    let report = Validator::default()
        .validate(&session.root, &ModalitySet::transferable())
        .unwrap();
    let error = report.errors().next().unwrap();
    assert_eq!(error.modality, Some(Modality::Extras));
    assert!(error.message.contains("rename-extras"));
    assert_matches!(report.into_result(), Err(LsmError::InvalidSession { errors: 1, .. }));
}

#[test]
fn nothing_to_check_is_rejected() {
    assert_matches!(
        ModalitySet::from_flags(false, false, false, false).require_any(),
        Err(LsmError::NoChecksRequested)
    );
}
