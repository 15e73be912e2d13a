mod common;

use std::fs;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDate;
use lab_session_manager::app::{App, BatchStatus, ProgressEvent, ProgressSink, TransferOptions};
use lab_session_manager::config::ResolvedConfig;
use lab_session_manager::domain::{Modality, ModalitySet, ProcessingLevel, Side};
use lab_session_manager::error::LsmError;
use lab_session_manager::naming::{self, SubjectId};
use lab_session_manager::processing::{
    ConvertRequest, ConvertTarget, Converter, SortOutput, SortRequest, Sorter,
};
use lab_session_manager::scan::ModalityRules;
use lab_session_manager::transfer::{ModalityOutcome, TransferAction};

use common::{SESSION, SessionBuilder, snapshot, temp_root};

struct NoSorter;

impl Sorter for NoSorter {
    fn sort(&self, _request: &SortRequest) -> Result<SortOutput, LsmError> {
        Err(LsmError::Sorter("not installed".to_string()))
    }
}

/// Writes a placeholder file where the real converter would.
struct TouchConverter;

impl Converter for TouchConverter {
    fn convert(&self, request: &ConvertRequest) -> Result<Utf8PathBuf, LsmError> {
        fs::write(&request.output, request.target.as_str()).unwrap();
        Ok(request.output.clone())
    }

    fn tool_version(&self) -> Option<String> {
        Some("touch 1.0".to_string())
    }
}

#[derive(Default)]
struct Recorder(std::cell::RefCell<Vec<String>>);

impl ProgressSink for Recorder {
    fn event(&self, event: ProgressEvent) {
        self.0.borrow_mut().push(event.message);
    }
}

fn app(root: &Utf8Path) -> App<NoSorter, TouchConverter> {
    for side in ["local", "remote"] {
        fs::create_dir_all(root.join(side).join("raw")).unwrap();
    }
    let config = ResolvedConfig {
        schema_version: 1,
        local_root: root.join("local"),
        remote_root: root.join("remote"),
        ignored_subject_dirs: vec!["treadmill-calibration".to_string()],
        rules: ModalityRules::default(),
        sorter: Default::default(),
        converter: Default::default(),
    };
    App::new(config, NoSorter, TouchConverter)
}

fn subject() -> SubjectId {
    "M020".parse().unwrap()
}

#[test]
fn upload_last_then_download_elsewhere() {
    let (_temp, root) = temp_root();
    let app = app(&root);
    SessionBuilder::new(&root.join("local"), "M020_2024_02_28_09_00").behavior();
    SessionBuilder::new(&root.join("local"), SESSION).full();
    let sink = Recorder::default();

    let report = app
        .upload_last(
            &subject(),
            &ModalitySet::transferable(),
            TransferOptions::default(),
            &sink,
        )
        .unwrap();
    assert_eq!(report.plan.session.to_string(), SESSION);
    assert!(report.result.unwrap().is_success());
    assert!(sink
        .0
        .borrow()
        .iter()
        .any(|message| message.starts_with("phase=Verify")));

    let remote_session = app
        .store()
        .session_path(Side::Remote, ProcessingLevel::Raw, &report.plan.session);
    assert!(remote_session.is_dir());
    assert!(!root.join("remote/raw/M020/M020_2024_02_28_09_00").exists());

    let latest = app
        .download_last(
            &subject(),
            &ModalitySet::transferable(),
            TransferOptions::default(),
            &sink,
        )
        .unwrap();
    assert_matches!(
        latest.result.unwrap().outcomes.get(&Modality::Ephys),
        Some(ModalityOutcome::AlreadyPresent)
    );
}

#[test]
fn dry_run_leaves_destination_untouched() {
    let (_temp, root) = temp_root();
    let app = app(&root);
    let session = SessionBuilder::new(&root.join("local"), SESSION).full();

    let report = app
        .upload_session(
            &session.root,
            &ModalitySet::from_flags(true, true, false, false),
            TransferOptions { dry_run: true },
            &Recorder::default(),
        )
        .unwrap();
    assert!(report.result.is_none());
    assert_matches!(
        report.plan.action(Modality::Ephys),
        Some(TransferAction::Copy { files }) if files.len() == 4
    );
    assert_eq!(
        report.plan.action(Modality::Video),
        Some(&TransferAction::SkipNotRequested)
    );
    assert!(snapshot(&root.join("remote")).is_empty());
}

#[test]
fn upload_rejects_sessions_outside_local_raw() {
    let (_temp, root) = temp_root();
    let app = app(&root);
    let session = SessionBuilder::new(&root.join("remote"), SESSION).full();
    assert_matches!(
        app.upload_session(
            &session.root,
            &ModalitySet::transferable(),
            TransferOptions::default(),
            &Recorder::default(),
        ),
        Err(LsmError::OutsideRoot { .. })
    );
}

#[test]
fn download_of_unknown_session() {
    let (_temp, root) = temp_root();
    let app = app(&root);
    assert_matches!(
        app.download_session(
            &SESSION.parse().unwrap(),
            &ModalitySet::transferable(),
            TransferOptions::default(),
            &Recorder::default(),
        ),
        Err(LsmError::SessionNotFound(_))
    );
}

#[test]
fn validate_subject_reports_every_folder() {
    let (_temp, root) = temp_root();
    let app = app(&root);
    let local = root.join("local");
    SessionBuilder::new(&local, SESSION).full();
    SessionBuilder::new(&local, "M020_2024_03_02_10_00")
        .ephys(0, &["imec0"])
        .extra("Camera_0.avi", "loose");
    fs::create_dir_all(local.join("raw/M020/M020_pilot")).unwrap();

    let report = app
        .validate_subject(
            &subject(),
            ModalitySet::transferable(),
            Side::Local,
            &Recorder::default(),
        )
        .unwrap();
    let statuses = report
        .rows
        .iter()
        .map(|row| (row.session.as_str(), row.status))
        .collect::<Vec<_>>();
    assert_eq!(
        statuses,
        vec![
            (SESSION, BatchStatus::Valid),
            ("M020_2024_03_02_10_00", BatchStatus::Invalid),
            ("M020_pilot", BatchStatus::Failed),
        ]
    );
    assert!(!report.all_valid());

    assert_matches!(
        app.validate_subject(
            &"M021".parse().unwrap(),
            ModalitySet::transferable(),
            Side::Local,
            &Recorder::default(),
        ),
        Err(LsmError::NoSessions { .. })
    );
}

#[test]
fn day_listing_spans_subjects() {
    let (_temp, root) = temp_root();
    let app = app(&root);
    let local = root.join("local");
    SessionBuilder::new(&local, SESSION).behavior();
    SessionBuilder::new(&local, "M021_2024_03_01_15_30").ephys(0, &["imec0"]);
    SessionBuilder::new(&local, "M021_2024_03_02_15_30").ephys(0, &["imec0"]);

    let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
    let list = app.list_day(date, Side::Local).unwrap();
    assert_eq!(list.sessions.len(), 2);

    let report = app
        .validate_day(
            date,
            ModalitySet::from_flags(true, true, true, false),
            Side::Local,
            &Recorder::default(),
        )
        .unwrap();
    assert!(report.all_valid());
}

#[test]
fn convert_writes_into_processed_folder() {
    let (_temp, root) = temp_root();
    let app = app(&root);
    let session = SessionBuilder::new(&root.join("local"), SESSION).full();

    let nwb = app
        .convert_session(&session.root, ConvertTarget::Nwb, false, &Recorder::default())
        .unwrap();
    assert_eq!(
        nwb.output,
        root.join("local/processed/M020")
            .join(SESSION)
            .join(naming::nwb_file_name(&session.name))
    );
    assert_matches!(
        app.convert_session(&session.root, ConvertTarget::Nwb, false, &Recorder::default()),
        Err(LsmError::InvalidArgument(_))
    );
    app.convert_session(&session.root, ConvertTarget::Nwb, true, &Recorder::default())
        .unwrap();

    let pyaldata = app
        .convert_session(&session.root, ConvertTarget::Pyaldata, false, &Recorder::default())
        .unwrap();
    assert!(pyaldata.output.is_file());

    let listing = app.list_sessions(&subject(), Side::Local).unwrap();
    assert!(listing.sessions[0].has(Modality::Nwb));
    assert!(listing.sessions[0].has(Modality::Pyaldata));
    assert!(!listing.sessions[0].has(Modality::Kilosort));
}

#[test]
fn sorter_failure_surfaces() {
    let (_temp, root) = temp_root();
    let app = app(&root);
    let session = SessionBuilder::new(&root.join("local"), SESSION).full();
    assert_matches!(
        app.sort_session(&session.root, &[], false, &Recorder::default()),
        Err(LsmError::Sorter(_))
    );
    assert_eq!(app.config_report().tools.converter.as_deref(), Some("touch 1.0"));
}

#[test]
fn check_config_wants_raw_folders() {
    let (_temp, root) = temp_root();
    let app = app(&root);
    app.check_config().unwrap();
    fs::remove_dir(root.join("remote/raw")).unwrap();
    assert_matches!(app.check_config(), Err(LsmError::InvalidRoot(_)));
}
