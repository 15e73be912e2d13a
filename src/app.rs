use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::{Duration, Instant};

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDate;
use serde::Serialize;

use crate::config::{ConfigLoader, ResolvedConfig};
use crate::domain::{Direction, Modality, ModalitySet, ProcessingLevel, Side};
use crate::error::LsmError;
use crate::index::{LabIndex, SessionEntry};
use crate::naming::{self, SessionName, SubjectId};
use crate::processing::{
    ConvertRequest, ConvertTarget, Converter, SortOutput, SortRequest, Sorter, ToolInfo,
};
use crate::rename::{self, Rename};
use crate::scan;
use crate::session::SessionDescriptor;
use crate::store::{self, Store};
use crate::transfer::{TransferEngine, TransferPlan, TransferResult};
use crate::validate::{ValidationReport, Validator};

#[derive(Debug, Clone, Copy, Default)]
pub struct TransferOptions {
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferReport {
    pub plan: TransferPlan,
    /// `None` for a dry run.
    pub result: Option<TransferResult>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BatchStatus {
    Valid,
    Invalid,
    Failed,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchRow {
    pub session: String,
    pub path: Utf8PathBuf,
    pub status: BatchStatus,
    pub errors: usize,
    pub warnings: usize,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchReport {
    pub rows: Vec<BatchRow>,
}

impl BatchReport {
    pub fn all_valid(&self) -> bool {
        self.rows.iter().all(|row| row.status == BatchStatus::Valid)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionList {
    pub root: Utf8PathBuf,
    pub sessions: Vec<SessionEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SubjectSessions {
    pub subject: SubjectId,
    pub sessions: Vec<SessionDescriptor>,
    pub invalid: Vec<Utf8PathBuf>,
    pub duplicates: Vec<SessionName>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RenameReport {
    pub session_root: Utf8PathBuf,
    pub renames: Vec<Rename>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SortReport {
    pub session: SessionName,
    pub recordings: BTreeMap<Utf8PathBuf, SortOutput>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConvertReport {
    pub session: SessionName,
    pub target: ConvertTarget,
    pub output: Utf8PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct ConfigReport {
    pub config: ResolvedConfig,
    pub tools: ToolInfo,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed: Option<Duration>,
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

fn progress(sink: &dyn ProgressSink, message: String) {
    sink.event(ProgressEvent {
        message,
        elapsed: None,
    });
}

pub struct App<S: Sorter, C: Converter> {
    config: ResolvedConfig,
    store: Store,
    validator: Validator,
    engine: TransferEngine,
    sorter: S,
    converter: C,
}

impl<S: Sorter, C: Converter> App<S, C> {
    pub fn new(config: ResolvedConfig, sorter: S, converter: C) -> Self {
        Self {
            store: config.store(),
            validator: Validator::new(config.rules.clone()),
            engine: TransferEngine::new(config.rules.clone()),
            config,
            sorter,
            converter,
        }
    }

    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.engine = self.engine.with_interrupt(flag);
        self
    }

    pub fn config(&self) -> &ResolvedConfig {
        &self.config
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    fn index(&self, side: Side, level: ProcessingLevel) -> LabIndex {
        LabIndex::new(
            self.store.level_root(side, level),
            self.config.ignored_subject_dirs.clone(),
        )
    }

    pub fn validate_session(
        &self,
        path: &Utf8Path,
        subject: Option<&SubjectId>,
        checks: ModalitySet,
        sink: &dyn ProgressSink,
    ) -> Result<ValidationReport, LsmError> {
        let checks = checks.require_any()?;
        progress(sink, format!("phase=Validate; checking {path}"));
        match subject {
            Some(subject) => self.validator.validate_for_subject(path, subject, &checks),
            None => self.validator.validate(path, &checks),
        }
    }

    pub fn validate_last(
        &self,
        subject: &SubjectId,
        checks: ModalitySet,
        side: Side,
        sink: &dyn ProgressSink,
    ) -> Result<ValidationReport, LsmError> {
        progress(sink, format!("phase=Resolve; latest session of {subject} on {side}"));
        let latest = self
            .index(side, ProcessingLevel::Raw)
            .find_latest_session(subject)?;
        self.validate_session(&latest.path, Some(subject), checks, sink)
    }

    pub fn validate_subject(
        &self,
        subject: &SubjectId,
        checks: ModalitySet,
        side: Side,
        sink: &dyn ProgressSink,
    ) -> Result<BatchReport, LsmError> {
        let checks = checks.require_any()?;
        progress(sink, format!("phase=Resolve; sessions of {subject} on {side}"));
        let index = self.index(side, ProcessingLevel::Raw);
        let listing = index.subject_sessions(subject)?;
        if listing.valid.is_empty() && listing.invalid.is_empty() {
            return Err(LsmError::NoSessions {
                subject: subject.to_string(),
                path: index.root().join(subject.as_str()),
            });
        }

        let mut report = BatchReport::default();
        for entry in &listing.valid {
            report.rows.push(self.batch_row(&entry.path, &checks, sink));
        }
        for path in &listing.invalid {
            report.rows.push(self.batch_row(path, &checks, sink));
        }
        Ok(report)
    }

    pub fn validate_day(
        &self,
        date: NaiveDate,
        checks: ModalitySet,
        side: Side,
        sink: &dyn ProgressSink,
    ) -> Result<BatchReport, LsmError> {
        let checks = checks.require_any()?;
        progress(sink, format!("phase=Resolve; sessions recorded on {date}"));
        let sessions = self
            .index(side, ProcessingLevel::Raw)
            .find_sessions_for_date(date)?;
        let rows = sessions
            .iter()
            .map(|entry| self.batch_row(&entry.path, &checks, sink))
            .collect();
        Ok(BatchReport { rows })
    }

    fn batch_row(
        &self,
        path: &Utf8Path,
        checks: &ModalitySet,
        sink: &dyn ProgressSink,
    ) -> BatchRow {
        progress(sink, format!("phase=Validate; checking {path}"));
        let session = path.file_name().unwrap_or_default().to_string();
        match self.validator.validate(path, checks) {
            Ok(report) => BatchRow {
                status: if report.is_valid() {
                    BatchStatus::Valid
                } else {
                    BatchStatus::Invalid
                },
                errors: report.errors().count(),
                warnings: report.warnings().count(),
                message: report.errors().next().map(ToString::to_string),
                session,
                path: path.to_path_buf(),
            },
            Err(err) => BatchRow {
                session,
                path: path.to_path_buf(),
                status: BatchStatus::Failed,
                errors: 1,
                warnings: 0,
                message: Some(err.to_string()),
            },
        }
    }

    pub fn list_day(&self, date: NaiveDate, side: Side) -> Result<SessionList, LsmError> {
        let index = self.index(side, ProcessingLevel::Raw);
        Ok(SessionList {
            sessions: index.find_sessions_for_date(date)?,
            root: index.root().to_path_buf(),
        })
    }

    pub fn list_sessions(
        &self,
        subject: &SubjectId,
        side: Side,
    ) -> Result<SubjectSessions, LsmError> {
        let index = self.index(side, ProcessingLevel::Raw);
        let listing = index.subject_sessions(subject)?;
        let processed = self.store.level_root(side, ProcessingLevel::Processed);
        let sessions = index.list_sessions(subject, &self.config.rules, Some(processed.as_path()))?;
        Ok(SubjectSessions {
            subject: subject.clone(),
            sessions,
            invalid: listing.invalid,
            duplicates: listing.duplicates,
        })
    }

    pub fn upload_session(
        &self,
        path: &Utf8Path,
        include: &ModalitySet,
        options: TransferOptions,
        sink: &dyn ProgressSink,
    ) -> Result<TransferReport, LsmError> {
        let session = self
            .store
            .session_in_level(Side::Local, ProcessingLevel::Raw, path)?;
        self.transfer(Direction::Upload, &session, include, options, sink)
    }

    pub fn upload_last(
        &self,
        subject: &SubjectId,
        include: &ModalitySet,
        options: TransferOptions,
        sink: &dyn ProgressSink,
    ) -> Result<TransferReport, LsmError> {
        progress(sink, format!("phase=Resolve; latest local session of {subject}"));
        let latest = self
            .index(Side::Local, ProcessingLevel::Raw)
            .find_latest_session(subject)?;
        self.transfer(Direction::Upload, &latest.name, include, options, sink)
    }

    pub fn download_session(
        &self,
        session: &SessionName,
        include: &ModalitySet,
        options: TransferOptions,
        sink: &dyn ProgressSink,
    ) -> Result<TransferReport, LsmError> {
        self.transfer(Direction::Download, session, include, options, sink)
    }

    pub fn download_last(
        &self,
        subject: &SubjectId,
        include: &ModalitySet,
        options: TransferOptions,
        sink: &dyn ProgressSink,
    ) -> Result<TransferReport, LsmError> {
        progress(sink, format!("phase=Resolve; latest remote session of {subject}"));
        let latest = self
            .index(Side::Remote, ProcessingLevel::Raw)
            .find_latest_session(subject)?;
        self.transfer(Direction::Download, &latest.name, include, options, sink)
    }

    fn transfer(
        &self,
        direction: Direction,
        session: &SessionName,
        include: &ModalitySet,
        options: TransferOptions,
        sink: &dyn ProgressSink,
    ) -> Result<TransferReport, LsmError> {
        let started = Instant::now();
        let source_root = self.store.level_root(direction.source(), ProcessingLevel::Raw);
        let dest_root = self
            .store
            .level_root(direction.destination(), ProcessingLevel::Raw);
        if !dest_root.is_dir() {
            return Err(LsmError::InvalidRoot(format!(
                "{} raw folder does not exist: {dest_root}",
                direction.destination()
            )));
        }

        progress(sink, format!("phase=Plan; {direction} {session}"));
        let plan = self
            .engine
            .plan_transfer(session, &source_root, &dest_root, direction, include)?;
        if options.dry_run {
            return Ok(TransferReport { plan, result: None });
        }

        progress(
            sink,
            format!("phase=Copy; {} file(s) to {}", plan.files_to_copy(), plan.destination),
        );
        let result = self.engine.execute(&plan)?;
        sink.event(ProgressEvent {
            message: format!(
                "phase=Verify; {} file(s) copied, {} modality failure(s)",
                result.copied_files(),
                result.failures().count()
            ),
            elapsed: Some(started.elapsed()),
        });
        Ok(TransferReport {
            plan,
            result: Some(result),
        })
    }

    pub fn rename_videos(&self, path: &Utf8Path) -> Result<RenameReport, LsmError> {
        Ok(RenameReport {
            session_root: path.to_path_buf(),
            renames: rename::rename_videos(path)?,
        })
    }

    pub fn rename_extras(&self, path: &Utf8Path) -> Result<RenameReport, LsmError> {
        Ok(RenameReport {
            session_root: path.to_path_buf(),
            renames: rename::rename_extra_files(path, &self.config.rules)?,
        })
    }

    pub fn sort_session(
        &self,
        path: &Utf8Path,
        probes: &[String],
        force: bool,
        sink: &dyn ProgressSink,
    ) -> Result<SortReport, LsmError> {
        let session = self
            .store
            .session_in_level(Side::Local, ProcessingLevel::Raw, path)?;
        progress(sink, format!("phase=Validate; checking ephys of {session}"));
        let report = self
            .validator
            .validate_parsed(path, session.clone(), &ModalitySet::from_iter([Modality::Ephys]))?
            .into_result()?;

        let recordings = report
            .items(Modality::Ephys)
            .iter()
            .map(|item| path.join(item))
            .collect::<Vec<_>>();
        let primary = scan::primary_recording_per_probe(&recordings)?;
        let selected = if probes.is_empty() {
            primary.keys().cloned().collect::<Vec<_>>()
        } else {
            probes.to_vec()
        };

        let mut per_recording = BTreeMap::<Utf8PathBuf, Vec<String>>::new();
        for probe in selected {
            let recording = primary.get(&probe).ok_or_else(|| {
                LsmError::InvalidArgument(format!("probe {probe} not found in {session}"))
            })?;
            per_recording.entry(recording.clone()).or_default().push(probe);
        }

        let ephys_output = self
            .store
            .processed_session_path(Side::Local, &session)
            .join(naming::processed_ephys_folder_name(&session));

        let mut requests = Vec::new();
        for (recording, probes) in per_recording {
            let recording_name = recording.file_name().unwrap_or_default().to_string();
            let output = ephys_output.join(&recording_name);
            for probe in &probes {
                let probe_output = output.join(naming::probe_folder_name(&recording_name, probe));
                if !force && !is_empty_or_missing(&probe_output)? {
                    return Err(LsmError::InvalidArgument(format!(
                        "sorting output already exists at {probe_output}; pass --force to sort again"
                    )));
                }
            }
            requests.push(SortRequest {
                session: session.clone(),
                recording,
                probes,
                output,
            });
        }

        let mut recordings = BTreeMap::new();
        for request in requests {
            let started = Instant::now();
            progress(
                sink,
                format!("phase=Sort; {} probe(s) of {}", request.probes.len(), request.recording),
            );
            let output = self.sorter.sort(&request)?;
            sink.event(ProgressEvent {
                message: format!("phase=Sort; finished {}", request.recording),
                elapsed: Some(started.elapsed()),
            });
            recordings.insert(request.recording, output);
        }

        Ok(SortReport {
            session,
            recordings,
        })
    }

    pub fn convert_session(
        &self,
        path: &Utf8Path,
        target: ConvertTarget,
        force: bool,
        sink: &dyn ProgressSink,
    ) -> Result<ConvertReport, LsmError> {
        let session = self
            .store
            .session_in_level(Side::Local, ProcessingLevel::Raw, path)?;
        let processed = self.store.processed_session_path(Side::Local, &session);

        let source = match target {
            ConvertTarget::Nwb => {
                progress(sink, format!("phase=Validate; checking {session}"));
                self.validator
                    .validate_parsed(path, session.clone(), &ModalitySet::transferable())?
                    .into_result()?;
                path.to_path_buf()
            }
            ConvertTarget::Pyaldata => {
                let nwb = processed.join(naming::nwb_file_name(&session));
                if !nwb.is_file() {
                    return Err(LsmError::InvalidArgument(format!(
                        "{nwb} does not exist; convert to nwb first"
                    )));
                }
                nwb
            }
        };

        let output = processed.join(target.output_file_name(&session));
        if output.exists() {
            if !force {
                return Err(LsmError::InvalidArgument(format!(
                    "{output} already exists; pass --force to convert again"
                )));
            }
            fs::remove_file(output.as_std_path()).map_err(|err| LsmError::fs(&output, err))?;
        }
        fs::create_dir_all(processed.as_std_path()).map_err(|err| LsmError::fs(&processed, err))?;

        let started = Instant::now();
        progress(sink, format!("phase=Convert; {session} to {}", target.as_str()));
        let output = self.converter.convert(&ConvertRequest {
            session: session.clone(),
            source,
            target,
            output,
        })?;
        sink.event(ProgressEvent {
            message: format!("phase=Convert; wrote {output}"),
            elapsed: Some(started.elapsed()),
        });

        Ok(ConvertReport {
            session,
            target,
            output,
        })
    }

    pub fn check_config(&self) -> Result<ConfigReport, LsmError> {
        ConfigLoader::check(&self.config)?;
        Ok(self.config_report())
    }

    pub fn config_report(&self) -> ConfigReport {
        ConfigReport {
            config: self.config.clone(),
            tools: ToolInfo {
                sorter: self.sorter.tool_version(),
                converter: self.converter.tool_version(),
            },
        }
    }
}

fn is_empty_or_missing(dir: &Utf8Path) -> Result<bool, LsmError> {
    if !dir.exists() {
        return Ok(true);
    }
    Ok(store::list_dir(dir)?.is_empty())
}
