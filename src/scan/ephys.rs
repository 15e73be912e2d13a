use std::collections::{BTreeMap, BTreeSet};

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::Modality;
use crate::error::LsmError;
use crate::naming::{self, SPIKEGLX_META_ENDINGS};
use crate::store;
use crate::validate::ValidationIssue;

use super::{ModalityScanner, ScanOutcome, ScanState, SessionContext, file_name};

pub struct EphysScanner;

impl ModalityScanner for EphysScanner {
    fn modality(&self) -> Modality {
        Modality::Ephys
    }

    fn scan(&self, ctx: &SessionContext<'_>) -> ScanOutcome {
        let mut state = ScanState::new(Modality::Ephys);
        let result = scan_ephys(ctx, &mut state);
        state.finish(result)
    }
}

fn scan_ephys(ctx: &SessionContext<'_>, state: &mut ScanState) -> Result<(), ValidationIssue> {
    let recordings = state
        .list(ctx.root)?
        .into_iter()
        .filter(|path| path.is_dir() && naming::recording_gid(file_name(path)).is_some())
        .collect::<Vec<_>>();

    if recordings.is_empty() {
        state.warn(ctx.root, "no raw ephys recording found");
    }

    let mut probe_folders = Vec::new();
    let mut recordings_per_probe = BTreeMap::<String, Vec<String>>::new();
    for recording in &recordings {
        let name = file_name(recording);
        let gid = naming::recording_gid(name).unwrap_or_default();
        let expected = naming::recording_folder_name(ctx.name, gid);
        if name != expected {
            return Err(state.error(
                recording,
                format!("recording folder name does not match expected format {expected}"),
            ));
        }
        for (probe, folder) in scan_recording(ctx, state, recording)? {
            recordings_per_probe
                .entry(probe)
                .or_default()
                .push(name.to_string());
            probe_folders.push(folder);
        }
        state.item(ctx.relative(recording));
    }

    for file in state.walk(ctx.root)? {
        if naming::is_spikeglx_file(file_name(&file))
            && !probe_folders.iter().any(|folder| file.starts_with(folder))
        {
            return Err(state.error(&file, "SpikeGLX file is not in any known probe folder"));
        }
    }

    for (probe, names) in recordings_per_probe {
        if names.len() > 1 {
            let primary = names.iter().max().cloned().unwrap_or_default();
            state.warn(
                ctx.root,
                format!(
                    "more than one raw recording found for probe {probe}; using {primary}"
                ),
            );
        }
    }

    Ok(())
}

fn scan_recording(
    ctx: &SessionContext<'_>,
    state: &ScanState,
    recording: &Utf8Path,
) -> Result<Vec<(String, Utf8PathBuf)>, ValidationIssue> {
    let recording_name = file_name(recording);
    let mut probes = Vec::new();

    for child in state.list(recording)? {
        let name = file_name(&child);
        if store::is_hidden(name) {
            continue;
        }
        if child.is_file() && ctx.rules.has_extra_extension(name) {
            continue;
        }
        if !child.is_dir() {
            return Err(state.error(
                &child,
                "only probe folders are allowed in the ephys recording folder",
            ));
        }
        let Some(probe) = naming::probe_label(name, recording_name) else {
            return Err(state.error(
                &child,
                format!(
                    "folder name doesn't match the expected format {recording_name}_imecN for probes"
                ),
            ));
        };

        let expected = naming::probe_file_names(recording_name, probe)
            .into_iter()
            .collect::<BTreeSet<_>>();
        let found = state
            .list(&child)?
            .iter()
            .map(|path| file_name(path).to_string())
            .collect::<BTreeSet<_>>();

        for ending in SPIKEGLX_META_ENDINGS {
            let meta = format!("{recording_name}_t0.{probe}{ending}");
            if !found.contains(&meta) {
                return Err(state.error(&child, format!("missing probe metadata {meta}")));
            }
        }
        if found != expected {
            return Err(state.error(
                &child,
                "files in probe folder do not match the expected SpikeGLX pattern",
            ));
        }
        probes.push((probe.to_string(), child.clone()));
    }

    Ok(probes)
}

pub fn probes_in_recording(recording: &Utf8Path) -> Result<Vec<String>, LsmError> {
    let recording_name = file_name(recording);
    let mut probes = store::list_dir(recording)?
        .into_iter()
        .filter(|path| path.is_dir())
        .filter_map(|path| {
            naming::probe_label(file_name(&path), recording_name).map(str::to_string)
        })
        .collect::<Vec<_>>();
    probes.sort();
    Ok(probes)
}

/// For every probe, the recording that downstream steps should use when the
/// probe appears in more than one recording: the latest by folder name.
pub fn primary_recording_per_probe(
    recordings: &[Utf8PathBuf],
) -> Result<BTreeMap<String, Utf8PathBuf>, LsmError> {
    let mut primary = BTreeMap::<String, Utf8PathBuf>::new();
    for recording in recordings {
        for probe in probes_in_recording(recording)? {
            let newer = primary
                .get(&probe)
                .map(|current| file_name(recording) > file_name(current))
                .unwrap_or(true);
            if newer {
                primary.insert(probe, recording.clone());
            }
        }
    }
    Ok(primary)
}
