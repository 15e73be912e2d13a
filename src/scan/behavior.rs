use crate::domain::Modality;
use crate::naming::{self, TASK_FOLDER_SUFFIX};
use crate::validate::ValidationIssue;

use super::{ModalityScanner, ScanOutcome, ScanState, SessionContext, file_name};

const EXPECTED_TXT_FILES: usize = 1;
const EXPECTED_PCA_FILES: usize = 2;

pub struct BehaviorScanner;

impl ModalityScanner for BehaviorScanner {
    fn modality(&self) -> Modality {
        Modality::Behavior
    }

    fn scan(&self, ctx: &SessionContext<'_>) -> ScanOutcome {
        let mut state = ScanState::new(Modality::Behavior);
        let result = scan_behavior(ctx, &mut state);
        state.finish(result)
    }
}

fn scan_behavior(ctx: &SessionContext<'_>, state: &mut ScanState) -> Result<(), ValidationIssue> {
    let entries = state.list(ctx.root)?;

    let mut txt_files = Vec::new();
    let mut pca_files = Vec::new();
    let mut task_folders = Vec::new();

    for path in &entries {
        let name = file_name(path);
        if path.is_dir() {
            if name.ends_with(TASK_FOLDER_SUFFIX) {
                task_folders.push(path.clone());
            }
            continue;
        }
        let extension = match path.extension() {
            Some(ext @ ("txt" | "pca")) => ext,
            _ => continue,
        };
        if ctx.rules.is_whitelisted_root_file(name, ctx.name) {
            continue;
        }
        if !naming::is_pycontrol_file(name, ctx.name) {
            return Err(state.error(
                path,
                format!(
                    "file name does not match the PyControl pattern for .{extension} files and is not whitelisted"
                ),
            ));
        }
        if extension == "txt" {
            txt_files.push(path.clone());
        } else {
            pca_files.push(path.clone());
        }
    }

    if txt_files.is_empty() && pca_files.is_empty() && task_folders.is_empty() {
        state.warn(ctx.root, "no task folder found");
        return Ok(());
    }

    if txt_files.len() != EXPECTED_TXT_FILES {
        return Err(state.error(
            ctx.root,
            format!(
                "expected {EXPECTED_TXT_FILES} PyControl .txt file, found {}",
                txt_files.len()
            ),
        ));
    }
    if pca_files.len() != EXPECTED_PCA_FILES {
        return Err(state.error(
            ctx.root,
            format!(
                "expected {EXPECTED_PCA_FILES} PyControl .pca files, found {}",
                pca_files.len()
            ),
        ));
    }
    for path in txt_files.iter().chain(&pca_files) {
        state.item(ctx.relative(path));
    }

    match task_folders.as_slice() {
        [] => state.warn(ctx.root, "no task folder found"),
        [folder] => {
            let scripts = state
                .list(folder)?
                .into_iter()
                .filter(|path| path.is_file() && path.extension() == Some("py"))
                .collect::<Vec<_>>();
            match scripts.as_slice() {
                [] => return Err(state.error(folder, "no .py file found in task folder")),
                [script] => state.item(ctx.relative(script)),
                _ => {
                    return Err(state.error(
                        folder,
                        format!("more than one .py file found in task folder ({})", scripts.len()),
                    ));
                }
            }
        }
        _ => {
            return Err(state.error(
                ctx.root,
                format!(
                    "found {} task folders, cannot tell which one ran the session",
                    task_folders.len()
                ),
            ));
        }
    }

    Ok(())
}
