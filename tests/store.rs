mod common;

use std::fs;

use assert_matches::assert_matches;
use camino::Utf8Path;
use lab_session_manager::domain::{ProcessingLevel, Side};
use lab_session_manager::error::LsmError;
use lab_session_manager::naming::SessionName;
use lab_session_manager::store::{self, Store};

use common::{SESSION, temp_root};

#[test]
fn layout_paths() {
    let store = Store::new_with_paths("/data/lab".into(), "/mnt/lab".into());
    let session: SessionName = SESSION.parse().unwrap();

    let raw = store.session_path(Side::Local, ProcessingLevel::Raw, &session);
    assert_eq!(raw.as_str(), "/data/lab/raw/M020/M020_2024_03_01_10_00");

    let processed = store.processed_session_path(Side::Remote, &session);
    assert_eq!(processed.as_str(), "/mnt/lab/processed/M020/M020_2024_03_01_10_00");

    let parsed = store
        .session_in_level(Side::Local, ProcessingLevel::Raw, &raw)
        .unwrap();
    assert_eq!(parsed, session);
}

#[test]
fn session_outside_the_store_is_rejected() {
    let store = Store::new_with_paths("/data/lab".into(), "/mnt/lab".into());
    assert_matches!(
        store.session_in_level(
            Side::Local,
            ProcessingLevel::Raw,
            Utf8Path::new("/mnt/lab/raw/M020/M020_2024_03_01_10_00")
        ),
        Err(LsmError::OutsideRoot { .. })
    );
    assert_matches!(
        store.session_in_level(
            Side::Local,
            ProcessingLevel::Raw,
            Utf8Path::new("/data/lab/raw/M021/M020_2024_03_01_10_00")
        ),
        Err(LsmError::SubjectMismatch { .. })
    );
}

#[test]
fn atomic_copy_and_comparison() {
    let (_temp, root) = temp_root();
    let source = root.join("source.bin");
    let dest = root.join("out/dest.bin");
    fs::write(&source, vec![7u8; 200_000]).unwrap();
    fs::create_dir_all(root.join("out")).unwrap();

    store::copy_file_atomic(&source, &dest).unwrap();
    assert!(store::files_identical(&source, &dest).unwrap());

    fs::write(&dest, vec![7u8; 199_999]).unwrap();
    assert!(!store::files_identical(&source, &dest).unwrap());
    assert!(store::copy_file_atomic(&source, &dest).is_err());
    assert_eq!(fs::read(&dest).unwrap().len(), 199_999);

    let leftovers = store::list_dir(&root.join("out"))
        .unwrap()
        .into_iter()
        .filter(|path| path.file_name() != Some("dest.bin"))
        .count();
    assert_eq!(leftovers, 0);
}
