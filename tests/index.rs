mod common;

use std::fs;

use lab_session_manager::domain::{Modality, Presence};
use lab_session_manager::index::LabIndex;
use lab_session_manager::naming::{self, SubjectId};
use lab_session_manager::scan::ModalityRules;

use common::{SessionBuilder, temp_root};

#[test]
fn list_sessions_reports_presence_per_modality() {
    let (_temp, root) = temp_root();
    SessionBuilder::new(&root, "M020_2024_03_01_10_00").full();
    let second = SessionBuilder::new(&root, "M020_2024_03_05_09_00")
        .ephys(0, &["imec0"])
        .extra("Camera_1.avi", "loose");
    let processed = root.join("processed");
    let processed_session = processed.join("M020").join(second.name.to_string());
    fs::create_dir_all(&processed_session).unwrap();
    fs::write(
        processed_session.join(naming::pyaldata_file_name(&second.name)),
        b"mat",
    )
    .unwrap();

    let index = LabIndex::new(root.join("raw"), Vec::new());
    let subject: SubjectId = "M020".parse().unwrap();
    let sessions = index
        .list_sessions(&subject, &ModalityRules::default(), Some(processed.as_path()))
        .unwrap();

    assert_eq!(sessions.len(), 2);
    let first = &sessions[0];
    assert_eq!(first.name().to_string(), "M020_2024_03_01_10_00");
    for modality in Modality::TRANSFERABLE {
        assert_eq!(first.presence(modality), Some(Presence::Present), "{modality}");
    }
    assert_eq!(first.presence(Modality::Nwb), Some(Presence::Absent));

    let last = &sessions[1];
    assert!(last.has(Modality::Ephys));
    assert_eq!(last.presence(Modality::Behavior), Some(Presence::Absent));
    assert_eq!(last.presence(Modality::Video), Some(Presence::Invalid));
    assert!(last.has(Modality::Pyaldata));
}

#[test]
fn unknown_subject_has_no_sessions() {
    let (_temp, root) = temp_root();
    fs::create_dir_all(root.join("raw")).unwrap();
    let index = LabIndex::new(root.join("raw"), Vec::new());
    let subject: SubjectId = "M099".parse().unwrap();
    let listing = index.subject_sessions(&subject).unwrap();
    assert!(listing.valid.is_empty());
    assert!(listing.invalid.is_empty());
}

#[test]
fn subjects_skip_ignored_and_hidden_dirs() {
    let (_temp, root) = temp_root();
    for dir in ["raw/M020", "raw/M021", "raw/.trash", "raw/treadmill-calibration"] {
        fs::create_dir_all(root.join(dir)).unwrap();
    }
    let index = LabIndex::new(root.join("raw"), vec!["treadmill-calibration".to_string()]);
    let subjects = index
        .subjects()
        .unwrap()
        .into_iter()
        .map(|(subject, _)| subject.to_string())
        .collect::<Vec<_>>();
    assert_eq!(subjects, vec!["M020", "M021"]);
}
