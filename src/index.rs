use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveDate;
use serde::Serialize;

use crate::error::LsmError;
use crate::naming::{self, SessionName, SubjectId};
use crate::scan::{ModalityRules, file_name};
use crate::session::SessionDescriptor;
use crate::store;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionEntry {
    pub name: SessionName,
    pub path: Utf8PathBuf,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SubjectListing {
    /// Sorted by timestamp, oldest first.
    pub valid: Vec<SessionEntry>,
    pub invalid: Vec<Utf8PathBuf>,
    pub duplicates: Vec<SessionName>,
}

#[derive(Debug, Clone)]
pub struct LabIndex {
    root: Utf8PathBuf,
    ignored_dirs: Vec<String>,
}

impl LabIndex {
    pub fn new(root: impl Into<Utf8PathBuf>, ignored_dirs: Vec<String>) -> Self {
        Self {
            root: root.into(),
            ignored_dirs,
        }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn subjects(&self) -> Result<Vec<(SubjectId, Utf8PathBuf)>, LsmError> {
        let mut subjects = Vec::new();
        for path in store::list_dir(&self.root)? {
            if !path.is_dir() {
                continue;
            }
            let name = file_name(&path);
            if store::is_hidden(name) || self.ignored_dirs.iter().any(|ignored| ignored == name) {
                continue;
            }
            match name.parse::<SubjectId>() {
                Ok(subject) => subjects.push((subject, path)),
                Err(_) => tracing::debug!(dir = %path, "skipping non-subject directory"),
            }
        }
        Ok(subjects)
    }

    pub fn subject_sessions(&self, subject: &SubjectId) -> Result<SubjectListing, LsmError> {
        let subject_dir = self.root.join(subject.as_str());
        if !subject_dir.is_dir() {
            return Ok(SubjectListing::default());
        }

        let mut listing = SubjectListing::default();
        let mut seen = BTreeMap::<SessionName, usize>::new();
        for path in store::list_dir(&subject_dir)? {
            if !path.is_dir() || store::is_hidden(file_name(&path)) {
                continue;
            }
            match naming::parse_for_subject(file_name(&path), subject) {
                Ok(name) => {
                    *seen.entry(name.clone()).or_default() += 1;
                    listing.valid.push(SessionEntry { name, path });
                }
                Err(err) => {
                    tracing::debug!(
                        dir = %path,
                        error = %err,
                        "skipping unparsable session folder"
                    );
                    listing.invalid.push(path);
                }
            }
        }

        for (name, count) in seen {
            if count > 1 {
                tracing::warn!(session = %name, "session name appears more than once");
                listing.duplicates.push(name);
            }
        }
        listing
            .valid
            .sort_by(|a, b| a.name.timestamp().cmp(&b.name.timestamp()).then(a.path.cmp(&b.path)));
        Ok(listing)
    }

    pub fn find_latest_session(&self, subject: &SubjectId) -> Result<SessionEntry, LsmError> {
        self.subject_sessions(subject)?
            .valid
            .pop()
            .ok_or_else(|| LsmError::NoSessions {
                subject: subject.to_string(),
                path: self.root.join(subject.as_str()),
            })
    }

    pub fn find_sessions_for_date(&self, date: NaiveDate) -> Result<Vec<SessionEntry>, LsmError> {
        let mut sessions = Vec::new();
        for (subject, _) in self.subjects()? {
            sessions.extend(
                self.subject_sessions(&subject)?
                    .valid
                    .into_iter()
                    .filter(|entry| entry.name.timestamp().date() == date),
            );
        }
        sessions.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(sessions)
    }

    pub fn list_sessions(
        &self,
        subject: &SubjectId,
        rules: &ModalityRules,
        processed_root: Option<&Utf8Path>,
    ) -> Result<Vec<SessionDescriptor>, LsmError> {
        self.subject_sessions(subject)?
            .valid
            .iter()
            .map(|entry| {
                let processed = processed_root
                    .map(|root| root.join(subject.as_str()).join(entry.name.to_string()));
                SessionDescriptor::scan(&entry.path, processed.as_deref(), rules)
            })
            .collect()
    }
}
