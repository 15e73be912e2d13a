use std::collections::BTreeMap;
use std::fmt;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::domain::{Modality, ModalitySet, Severity};
use crate::error::LsmError;
use crate::naming::{self, SessionName, SubjectId};
use crate::scan::{self, ModalityRules, ScanOutcome, SessionContext};

const DATA_MODALITIES: [Modality; 3] = [Modality::Behavior, Modality::Ephys, Modality::Video];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    pub severity: Severity,
    pub modality: Option<Modality>,
    pub path: Utf8PathBuf,
    pub message: String,
}

impl ValidationIssue {
    pub fn new(
        severity: Severity,
        modality: Option<Modality>,
        path: &Utf8Path,
        message: impl Into<String>,
    ) -> Self {
        Self {
            severity,
            modality,
            path: path.to_path_buf(),
            message: message.into(),
        }
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.modality {
            Some(modality) => write!(
                f,
                "[{}] {modality}: {} ({})",
                self.severity, self.message, self.path
            ),
            None => write!(f, "[{}] {} ({})", self.severity, self.message, self.path),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ValidationReport {
    pub session: SessionName,
    pub root: Utf8PathBuf,
    pub checks: ModalitySet,
    pub issues: Vec<ValidationIssue>,
    #[serde(skip)]
    outcomes: BTreeMap<Modality, ScanOutcome>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        !self.issues.iter().any(ValidationIssue::is_error)
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|issue| issue.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|issue| !issue.is_error())
    }

    pub fn items(&self, modality: Modality) -> &[Utf8PathBuf] {
        self.outcomes
            .get(&modality)
            .map(|outcome| outcome.items.as_slice())
            .unwrap_or_default()
    }

    pub fn outcome(&self, modality: Modality) -> Option<&ScanOutcome> {
        self.outcomes.get(&modality)
    }

    pub fn into_result(self) -> Result<Self, LsmError> {
        let errors = self.errors().count();
        if errors == 0 {
            return Ok(self);
        }
        let first = self
            .errors()
            .next()
            .map(ToString::to_string)
            .unwrap_or_default();
        Err(LsmError::InvalidSession {
            session: self.session.to_string(),
            errors,
            first,
        })
    }
}

#[derive(Debug, Clone, Default)]
pub struct Validator {
    rules: ModalityRules,
}

impl Validator {
    pub fn new(rules: ModalityRules) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &ModalityRules {
        &self.rules
    }

    pub fn validate(
        &self,
        session_root: &Utf8Path,
        checks: &ModalitySet,
    ) -> Result<ValidationReport, LsmError> {
        let name = session_folder_name(session_root)?;
        let session = naming::parse_session_name(name)?;
        self.validate_parsed(session_root, session, checks)
    }

    pub fn validate_for_subject(
        &self,
        session_root: &Utf8Path,
        subject: &SubjectId,
        checks: &ModalitySet,
    ) -> Result<ValidationReport, LsmError> {
        let name = session_folder_name(session_root)?;
        let session = naming::parse_for_subject(name, subject)?;
        self.validate_parsed(session_root, session, checks)
    }

    pub fn validate_parsed(
        &self,
        session_root: &Utf8Path,
        session: SessionName,
        checks: &ModalitySet,
    ) -> Result<ValidationReport, LsmError> {
        if !session_root.is_dir() {
            return Err(LsmError::SessionNotFound(session_root.to_path_buf()));
        }

        let mut issues = Vec::new();
        let mut outcomes = BTreeMap::new();
        for modality in checks.iter() {
            let outcome = self.scan_modality(session_root, &session, modality);
            issues.extend(outcome.issues.iter().cloned());
            outcomes.insert(modality, outcome);
        }

        let data_checked = DATA_MODALITIES
            .iter()
            .any(|modality| checks.contains(*modality));
        let data_found = DATA_MODALITIES.iter().any(|modality| {
            outcomes
                .get(modality)
                .map(|outcome| !outcome.items.is_empty())
                .unwrap_or(false)
        });
        let data_broken = DATA_MODALITIES.iter().any(|modality| {
            outcomes
                .get(modality)
                .map(ScanOutcome::has_errors)
                .unwrap_or(false)
        });
        if data_checked && !data_found && !data_broken {
            issues.push(ValidationIssue::new(
                Severity::Error,
                None,
                session_root,
                "no recognized behavior, ephys or video data in session",
            ));
        }

        tracing::debug!(
            session = %session,
            issues = issues.len(),
            "validated session"
        );

        Ok(ValidationReport {
            session,
            root: session_root.to_path_buf(),
            checks: checks.clone(),
            issues,
            outcomes,
        })
    }

    pub fn scan_modality(
        &self,
        session_root: &Utf8Path,
        session: &SessionName,
        modality: Modality,
    ) -> ScanOutcome {
        let ctx = SessionContext {
            root: session_root,
            name: session,
            rules: &self.rules,
        };
        scan::scanner_for(modality)
            .map(|scanner| scanner.scan(&ctx))
            .unwrap_or_default()
    }
}

fn session_folder_name(session_root: &Utf8Path) -> Result<&str, LsmError> {
    session_root
        .file_name()
        .ok_or_else(|| LsmError::InvalidSessionName {
            name: session_root.to_string(),
            reason: "path has no folder name".to_string(),
        })
}

#[cfg(test)]
mod tests {
    use std::fs;

    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn malformed_name_fails_before_scanning() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().join("m020-2024-03-01")).unwrap();
        fs::create_dir_all(&root).unwrap();
        let err = Validator::default()
            .validate(&root, &ModalitySet::raw())
            .unwrap_err();
        assert_matches!(err, LsmError::InvalidSessionName { .. });
    }

    #[test]
    fn empty_session_is_invalid() {
        let temp = tempfile::tempdir().unwrap();
        let root =
            Utf8PathBuf::from_path_buf(temp.path().join("M020_2024_03_01_10_00")).unwrap();
        fs::create_dir_all(&root).unwrap();
        let report = Validator::default()
            .validate(&root, &ModalitySet::raw())
            .unwrap();
        assert!(!report.is_valid());
        let error = report.errors().next().unwrap();
        assert_eq!(error.modality, None);
        assert_matches!(report.into_result(), Err(LsmError::InvalidSession { errors: 1, .. }));
    }
}
