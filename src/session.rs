use std::collections::BTreeMap;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::domain::{Modality, ModalitySet, Presence};
use crate::error::LsmError;
use crate::naming::{self, SessionName, SessionTimestamp, SubjectId};
use crate::scan::ModalityRules;
use crate::validate::{ValidationReport, Validator};

#[derive(Debug, Clone, Serialize)]
pub struct SessionDescriptor {
    root: Utf8PathBuf,
    name: SessionName,
    modalities: BTreeMap<Modality, Presence>,
}

impl SessionDescriptor {
    pub fn scan(
        raw_root: &Utf8Path,
        processed_root: Option<&Utf8Path>,
        rules: &ModalityRules,
    ) -> Result<Self, LsmError> {
        let report =
            Validator::new(rules.clone()).validate(raw_root, &ModalitySet::transferable())?;
        Ok(Self::from_report(&report, processed_root))
    }

    pub fn from_report(report: &ValidationReport, processed_root: Option<&Utf8Path>) -> Self {
        let mut modalities = BTreeMap::new();
        for modality in Modality::TRANSFERABLE {
            let presence = match report.outcome(modality) {
                None => continue,
                Some(outcome) if outcome.has_errors() => Presence::Invalid,
                Some(outcome) if outcome.items.is_empty() => Presence::Absent,
                Some(_) => Presence::Present,
            };
            modalities.insert(modality, presence);
        }

        for modality in Modality::DERIVED {
            let present = processed_root
                .map(|root| derived_present(root, &report.session, modality))
                .unwrap_or(false);
            let presence = if present {
                Presence::Present
            } else {
                Presence::Absent
            };
            modalities.insert(modality, presence);
        }

        Self {
            root: report.root.clone(),
            name: report.session.clone(),
            modalities,
        }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn name(&self) -> &SessionName {
        &self.name
    }

    pub fn subject(&self) -> &SubjectId {
        self.name.subject()
    }

    pub fn timestamp(&self) -> SessionTimestamp {
        self.name.timestamp()
    }

    pub fn presence(&self, modality: Modality) -> Option<Presence> {
        self.modalities.get(&modality).copied()
    }

    pub fn has(&self, modality: Modality) -> bool {
        self.presence(modality) == Some(Presence::Present)
    }

    pub fn modalities(&self) -> &BTreeMap<Modality, Presence> {
        &self.modalities
    }
}

fn derived_present(processed_root: &Utf8Path, session: &SessionName, modality: Modality) -> bool {
    match modality {
        Modality::Nwb => processed_root.join(naming::nwb_file_name(session)).is_file(),
        Modality::Pyaldata => processed_root
            .join(naming::pyaldata_file_name(session))
            .is_file(),
        Modality::Kilosort => {
            let ephys = processed_root.join(naming::processed_ephys_folder_name(session));
            crate::store::list_dir(&ephys)
                .map(|entries| entries.iter().any(|entry| entry.is_dir()))
                .unwrap_or(false)
        }
        _ => false,
    }
}
