//! A scanner stops at the first error it meets inside its own modality;
//! warnings raised before that point are kept.

mod behavior;
mod ephys;
mod extras;
mod video;

use camino::{Utf8Path, Utf8PathBuf};
use serde::{Deserialize, Serialize};

use crate::domain::{Modality, Severity};
use crate::naming::SessionName;
use crate::store;
use crate::validate::ValidationIssue;

pub use behavior::BehaviorScanner;
pub use ephys::{EphysScanner, primary_recording_per_probe, probes_in_recording};
pub use extras::ExtrasScanner;
pub use video::VideoScanner;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModalityRules {
    pub whitelisted_files_in_root: Vec<String>,
    pub extra_extensions: Vec<String>,
}

impl Default for ModalityRules {
    fn default() -> Self {
        Self {
            whitelisted_files_in_root: default_whitelisted_files(),
            extra_extensions: default_extra_extensions(),
        }
    }
}

impl ModalityRules {
    pub fn is_whitelisted_root_file(&self, file_name: &str, session: &SessionName) -> bool {
        self.whitelisted_files_in_root
            .iter()
            .any(|allowed| file_name == allowed || file_name == session.prefixed(allowed))
    }

    pub fn has_extra_extension(&self, file_name: &str) -> bool {
        self.extra_extensions
            .iter()
            .any(|ext| file_name.ends_with(ext.as_str()))
    }
}

pub fn default_whitelisted_files() -> Vec<String> {
    vec![
        "comment.txt".to_string(),
        "traj_plan.txt".to_string(),
        "trajectory.txt".to_string(),
        "channel_map.txt".to_string(),
        "bci.log".to_string(),
    ]
}

pub fn default_extra_extensions() -> Vec<String> {
    vec![".txt".to_string(), ".log".to_string()]
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanOutcome {
    pub issues: Vec<ValidationIssue>,
    pub items: Vec<Utf8PathBuf>,
}

impl ScanOutcome {
    pub fn has_errors(&self) -> bool {
        self.issues.iter().any(ValidationIssue::is_error)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SessionContext<'a> {
    pub root: &'a Utf8Path,
    pub name: &'a SessionName,
    pub rules: &'a ModalityRules,
}

impl SessionContext<'_> {
    pub fn relative(&self, path: &Utf8Path) -> Utf8PathBuf {
        path.strip_prefix(self.root)
            .map(Utf8Path::to_path_buf)
            .unwrap_or_else(|_| path.to_path_buf())
    }
}

pub trait ModalityScanner {
    fn modality(&self) -> Modality;
    fn scan(&self, ctx: &SessionContext<'_>) -> ScanOutcome;
}

pub fn scanner_for(modality: Modality) -> Option<Box<dyn ModalityScanner>> {
    match modality {
        Modality::Behavior => Some(Box::new(BehaviorScanner)),
        Modality::Ephys => Some(Box::new(EphysScanner)),
        Modality::Video => Some(Box::new(VideoScanner)),
        Modality::Extras => Some(Box::new(ExtrasScanner)),
        Modality::Nwb | Modality::Pyaldata | Modality::Kilosort => None,
    }
}

pub(crate) struct ScanState {
    modality: Modality,
    issues: Vec<ValidationIssue>,
    items: Vec<Utf8PathBuf>,
}

impl ScanState {
    pub(crate) fn new(modality: Modality) -> Self {
        Self {
            modality,
            issues: Vec::new(),
            items: Vec::new(),
        }
    }

    pub(crate) fn warn(&mut self, path: &Utf8Path, message: impl Into<String>) {
        let issue = ValidationIssue::new(Severity::Warning, Some(self.modality), path, message);
        tracing::warn!(modality = %self.modality, path = %path, "{}", issue.message);
        self.issues.push(issue);
    }

    pub(crate) fn error(&self, path: &Utf8Path, message: impl Into<String>) -> ValidationIssue {
        ValidationIssue::new(Severity::Error, Some(self.modality), path, message)
    }

    pub(crate) fn item(&mut self, relative: Utf8PathBuf) {
        self.items.push(relative);
    }

    pub(crate) fn list(&self, dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, ValidationIssue> {
        store::list_dir(dir).map_err(|err| self.error(dir, err.to_string()))
    }

    pub(crate) fn walk(&self, dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, ValidationIssue> {
        store::walk_files(dir).map_err(|err| self.error(dir, err.to_string()))
    }

    pub(crate) fn finish(mut self, result: Result<(), ValidationIssue>) -> ScanOutcome {
        if let Err(issue) = result {
            tracing::debug!(modality = %self.modality, "{}", issue.message);
            self.issues.push(issue);
        }
        ScanOutcome {
            issues: self.issues,
            items: self.items,
        }
    }
}

pub(crate) fn file_name(path: &Utf8Path) -> &str {
    path.file_name().unwrap_or_default()
}
