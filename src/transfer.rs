use std::collections::BTreeMap;
use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::domain::{Direction, Modality, ModalitySet};
use crate::error::LsmError;
use crate::naming::SessionName;
use crate::scan::ModalityRules;
use crate::store;
use crate::validate::{ValidationIssue, Validator};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum TransferAction {
    Copy { files: Vec<Utf8PathBuf> },
    SkipAlreadyPresent,
    SkipNotRequested,
    SkipAbsentAtSource,
    Conflict { paths: Vec<Utf8PathBuf> },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ModalityPlan {
    pub modality: Modality,
    pub action: TransferAction,
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferPlan {
    pub session: SessionName,
    pub direction: Direction,
    pub source: Utf8PathBuf,
    pub destination: Utf8PathBuf,
    pub modalities: Vec<ModalityPlan>,
    pub warnings: Vec<ValidationIssue>,
}

impl TransferPlan {
    pub fn action(&self, modality: Modality) -> Option<&TransferAction> {
        self.modalities
            .iter()
            .find(|plan| plan.modality == modality)
            .map(|plan| &plan.action)
    }

    pub fn conflicts(&self) -> impl Iterator<Item = (Modality, &[Utf8PathBuf])> {
        self.modalities.iter().filter_map(|plan| match &plan.action {
            TransferAction::Conflict { paths } => Some((plan.modality, paths.as_slice())),
            _ => None,
        })
    }

    pub fn files_to_copy(&self) -> usize {
        self.modalities
            .iter()
            .map(|plan| match &plan.action {
                TransferAction::Copy { files } => files.len(),
                _ => 0,
            })
            .sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "kebab-case")]
pub enum ModalityOutcome {
    Copied { files: usize },
    AlreadyPresent,
    NotRequested,
    AbsentAtSource,
    SkippedConflict { paths: Vec<Utf8PathBuf> },
    Failed { reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct TransferResult {
    pub session: SessionName,
    pub direction: Direction,
    pub destination: Utf8PathBuf,
    pub outcomes: BTreeMap<Modality, ModalityOutcome>,
}

impl TransferResult {
    pub fn copied_files(&self) -> usize {
        self.outcomes
            .values()
            .map(|outcome| match outcome {
                ModalityOutcome::Copied { files } => *files,
                _ => 0,
            })
            .sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = (Modality, &str)> {
        self.outcomes.iter().filter_map(|(modality, outcome)| match outcome {
            ModalityOutcome::Failed { reason } => Some((*modality, reason.as_str())),
            _ => None,
        })
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }
}

/// Writes one file to its destination without replacing an existing one.
/// Returns [`LsmError::DestinationExists`] when the destination showed up
/// before the write could land.
pub trait FileCopier {
    fn copy_file(&self, source: &Utf8Path, dest: &Utf8Path) -> Result<(), LsmError>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FsCopier;

impl FileCopier for FsCopier {
    fn copy_file(&self, source: &Utf8Path, dest: &Utf8Path) -> Result<(), LsmError> {
        store::copy_file_atomic(source, dest)
    }
}

pub struct TransferEngine<C: FileCopier = FsCopier> {
    validator: Validator,
    copier: C,
    interrupt: Arc<AtomicBool>,
}

impl TransferEngine<FsCopier> {
    pub fn new(rules: ModalityRules) -> Self {
        Self::with_copier(rules, FsCopier)
    }
}

impl<C: FileCopier> TransferEngine<C> {
    pub fn with_copier(rules: ModalityRules, copier: C) -> Self {
        Self {
            validator: Validator::new(rules),
            copier,
            interrupt: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_interrupt(mut self, flag: Arc<AtomicBool>) -> Self {
        self.interrupt = flag;
        self
    }

    fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    pub fn plan_transfer(
        &self,
        session: &SessionName,
        source_level_root: &Utf8Path,
        dest_level_root: &Utf8Path,
        direction: Direction,
        requested: &ModalitySet,
    ) -> Result<TransferPlan, LsmError> {
        let requested = requested
            .iter()
            .filter(|modality| modality.is_transferable())
            .collect::<ModalitySet>()
            .require_any()?;

        let source_subject = source_level_root.join(session.subject().as_str());
        let source = source_subject.join(session.to_string());
        if !source.is_dir() {
            return Err(LsmError::SessionNotFound(source));
        }
        let destination = dest_level_root
            .join(session.subject().as_str())
            .join(session.to_string());

        let report = self
            .validator
            .validate_parsed(&source, session.clone(), &requested)?
            .into_result()?;

        let mut modalities = Vec::new();
        for modality in Modality::TRANSFERABLE {
            let action = if requested.contains(modality) {
                let files = expand_items(&source, report.items(modality))?;
                compare_files(&source, &destination, files)?
            } else {
                TransferAction::SkipNotRequested
            };
            tracing::debug!(session = %session, %modality, ?action, "planned");
            modalities.push(ModalityPlan { modality, action });
        }

        Ok(TransferPlan {
            session: session.clone(),
            direction,
            source,
            destination,
            modalities,
            warnings: report.warnings().cloned().collect(),
        })
    }

    /// Carries out a plan. Uploads refuse to start when any modality
    /// conflicts; downloads skip conflicting modalities and keep the local
    /// copy. A modality that fails mid-copy is rolled back without touching
    /// the others.
    pub fn execute(&self, plan: &TransferPlan) -> Result<TransferResult, LsmError> {
        if plan.direction == Direction::Upload {
            if let Some((modality, paths)) = plan.conflicts().next() {
                let path = paths
                    .first()
                    .map(|path| plan.destination.join(path))
                    .unwrap_or_else(|| plan.destination.clone());
                return Err(LsmError::TransferConflict { modality, path });
            }
        }

        let mut outcomes = BTreeMap::new();
        for modality_plan in &plan.modalities {
            let modality = modality_plan.modality;
            let outcome = match &modality_plan.action {
                TransferAction::SkipAlreadyPresent => ModalityOutcome::AlreadyPresent,
                TransferAction::SkipNotRequested => ModalityOutcome::NotRequested,
                TransferAction::SkipAbsentAtSource => ModalityOutcome::AbsentAtSource,
                TransferAction::Conflict { paths } => {
                    tracing::warn!(
                        session = %plan.session,
                        %modality,
                        conflicts = paths.len(),
                        "destination differs from source, keeping destination"
                    );
                    ModalityOutcome::SkippedConflict {
                        paths: paths.clone(),
                    }
                }
                TransferAction::Copy { files } => match self.copy_modality(plan, modality, files) {
                    Ok(copied) => ModalityOutcome::Copied { files: copied },
                    Err(err) => {
                        tracing::warn!(
                            session = %plan.session,
                            %modality,
                            error = %err,
                            "copy failed"
                        );
                        ModalityOutcome::Failed {
                            reason: err.to_string(),
                        }
                    }
                },
            };
            outcomes.insert(modality, outcome);
        }

        Ok(TransferResult {
            session: plan.session.clone(),
            direction: plan.direction,
            destination: plan.destination.clone(),
            outcomes,
        })
    }

    fn copy_modality(
        &self,
        plan: &TransferPlan,
        modality: Modality,
        files: &[Utf8PathBuf],
    ) -> Result<usize, LsmError> {
        let mut staged = StagedWrites::new(modality);
        let mut copied = 0;

        for relative in files {
            if self.interrupted() {
                return Err(LsmError::Interrupted);
            }
            let source = plan.source.join(relative);
            let dest = plan.destination.join(relative);
            if dest.exists() {
                // written by an earlier modality sharing the file
                if store::files_identical(&source, &dest)? {
                    continue;
                }
                return Err(LsmError::TransferConflict {
                    modality,
                    path: dest,
                });
            }
            if let Some(parent) = dest.parent() {
                staged.create_dirs(parent)?;
            }
            match self.copier.copy_file(&source, &dest) {
                Ok(()) => staged.file(dest),
                // not ours, never remove it
                Err(err @ LsmError::DestinationExists(_)) => return Err(err),
                Err(err) => {
                    if dest.exists() {
                        staged.file(dest);
                    }
                    return Err(err);
                }
            }
            copied += 1;
        }

        let outcome = self
            .validator
            .scan_modality(&plan.destination, &plan.session, modality);
        if let Some(error) = outcome.issues.iter().find(|issue| issue.is_error()) {
            return Err(LsmError::Filesystem(format!(
                "destination failed verification after copy: {error}"
            )));
        }

        staged.commit();
        tracing::info!(session = %plan.session, %modality, files = copied, "copied");
        Ok(copied)
    }
}

/// Paths a modality copy has created so far. Removed again on drop unless
/// the copy was committed.
struct StagedWrites {
    modality: Modality,
    files: Vec<Utf8PathBuf>,
    dirs: Vec<Utf8PathBuf>,
    committed: bool,
}

impl StagedWrites {
    fn new(modality: Modality) -> Self {
        Self {
            modality,
            files: Vec::new(),
            dirs: Vec::new(),
            committed: false,
        }
    }

    fn file(&mut self, path: Utf8PathBuf) {
        self.files.push(path);
    }

    fn create_dirs(&mut self, dir: &Utf8Path) -> Result<(), LsmError> {
        let missing = dir
            .ancestors()
            .take_while(|ancestor| !ancestor.exists())
            .map(Utf8Path::to_path_buf)
            .collect::<Vec<_>>();
        for dir in missing.into_iter().rev() {
            fs::create_dir(dir.as_std_path()).map_err(|err| LsmError::fs(&dir, err))?;
            self.dirs.push(dir);
        }
        Ok(())
    }

    fn commit(&mut self) {
        self.committed = true;
    }
}

impl Drop for StagedWrites {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        for file in &self.files {
            if file.exists() {
                if let Err(err) = fs::remove_file(file.as_std_path()) {
                    tracing::warn!(path = %file, error = %err, "could not remove partial file");
                }
            }
        }
        for dir in self.dirs.iter().rev() {
            if let Err(err) = fs::remove_dir(dir.as_std_path()) {
                tracing::warn!(path = %dir, error = %err, "could not remove partial directory");
            }
        }
        tracing::info!(
            modality = %self.modality,
            files = self.files.len(),
            "rolled back partial copy"
        );
    }
}

fn expand_items(source: &Utf8Path, items: &[Utf8PathBuf]) -> Result<Vec<Utf8PathBuf>, LsmError> {
    let mut files = Vec::new();
    for item in items {
        let path = source.join(item);
        if path.is_dir() {
            for file in store::walk_files(&path)? {
                let relative = file
                    .strip_prefix(source)
                    .map(Utf8Path::to_path_buf)
                    .map_err(|_| LsmError::OutsideRoot {
                        path: file.clone(),
                        root: source.to_path_buf(),
                    })?;
                files.push(relative);
            }
        } else {
            files.push(item.clone());
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

fn compare_files(
    source: &Utf8Path,
    destination: &Utf8Path,
    files: Vec<Utf8PathBuf>,
) -> Result<TransferAction, LsmError> {
    if files.is_empty() {
        return Ok(TransferAction::SkipAbsentAtSource);
    }

    let mut missing = Vec::new();
    let mut conflicts = Vec::new();
    for relative in files {
        let dest = destination.join(&relative);
        if !dest.exists() {
            missing.push(relative);
        } else if !dest.is_file() || !store::files_identical(&source.join(&relative), &dest)? {
            conflicts.push(relative);
        }
    }

    Ok(if !conflicts.is_empty() {
        TransferAction::Conflict { paths: conflicts }
    } else if missing.is_empty() {
        TransferAction::SkipAlreadyPresent
    } else {
        TransferAction::Copy { files: missing }
    })
}
