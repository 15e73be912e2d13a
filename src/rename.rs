use std::collections::BTreeSet;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;

use crate::error::LsmError;
use crate::naming::{self, SessionName, VIDEO_EXTENSION, VIDEO_METADATA_FILE};
use crate::scan::{ModalityRules, file_name};
use crate::store;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Rename {
    pub from: Utf8PathBuf,
    pub to: Utf8PathBuf,
}

fn session_of(session_root: &Utf8Path) -> Result<SessionName, LsmError> {
    if !session_root.is_dir() {
        return Err(LsmError::SessionNotFound(session_root.to_path_buf()));
    }
    naming::parse_session_name(file_name(session_root))
}

fn apply(rename: &Rename) -> Result<(), LsmError> {
    if rename.to.exists() {
        return Err(LsmError::RenameConflict(rename.to.clone()));
    }
    fs::rename(rename.from.as_std_path(), rename.to.as_std_path())
        .map_err(|err| LsmError::fs(&rename.from, err))?;
    tracing::info!(from = %rename.from, to = %rename.to, "renamed");
    Ok(())
}

fn apply_all(renames: Vec<Rename>) -> Result<Vec<Rename>, LsmError> {
    let mut targets = BTreeSet::new();
    for rename in &renames {
        if rename.to.exists() || !targets.insert(rename.to.clone()) {
            return Err(LsmError::RenameConflict(rename.to.clone()));
        }
    }
    for (applied, rename) in renames.iter().enumerate() {
        if let Err(err) = apply(rename) {
            undo(&renames[..applied]);
            return Err(err);
        }
    }
    Ok(renames)
}

fn undo(applied: &[Rename]) {
    for rename in applied.iter().rev() {
        if let Err(err) = fs::rename(rename.to.as_std_path(), rename.from.as_std_path()) {
            tracing::warn!(
                from = %rename.to,
                to = %rename.from,
                error = %err,
                "could not undo rename"
            );
        }
    }
}

/// Creates `folder` and moves everything into it. On failure the moved
/// files go back and the folder is removed again.
fn move_into(folder: &Utf8Path, moves: Vec<Rename>) -> Result<Vec<Rename>, LsmError> {
    fs::create_dir(folder.as_std_path()).map_err(|err| LsmError::fs(folder, err))?;
    apply_all(moves).inspect_err(|_| {
        if let Err(err) = fs::remove_dir(folder.as_std_path()) {
            tracing::warn!(path = %folder, error = %err, "could not remove video folder");
        }
    })
}

pub fn rename_extra_files(
    session_root: &Utf8Path,
    rules: &ModalityRules,
) -> Result<Vec<Rename>, LsmError> {
    let session = session_of(session_root)?;

    let mut renames = Vec::new();
    for allowed in &rules.whitelisted_files_in_root {
        let from = session_root.join(allowed);
        if from.is_file() {
            renames.push(Rename {
                to: session_root.join(session.prefixed(allowed)),
                from,
            });
        }
    }

    for file in store::walk_files(session_root)? {
        if file.parent() == Some(session_root) {
            continue;
        }
        let name = file_name(&file);
        if !rules.has_extra_extension(name) || naming::has_session_prefix(name, &session) {
            continue;
        }
        renames.push(Rename {
            to: file.with_file_name(session.prefixed(name)),
            from: file,
        });
    }

    apply_all(renames)
}

pub fn rename_videos(session_root: &Utf8Path) -> Result<Vec<Rename>, LsmError> {
    let session = session_of(session_root)?;
    let folder = session_root.join(naming::video_folder_name(&session));
    let mut done = Vec::new();

    let misplaced = store::walk_files(session_root)?
        .into_iter()
        .filter(|file| file.extension() == Some(VIDEO_EXTENSION) && !file.starts_with(&folder))
        .collect::<Vec<_>>();

    if !misplaced.is_empty() {
        let parents = misplaced
            .iter()
            .filter_map(|file| file.parent().map(Utf8Path::to_path_buf))
            .collect::<BTreeSet<_>>();
        let [found] = parents.into_iter().collect::<Vec<_>>().try_into().map_err(
            |parents: Vec<Utf8PathBuf>| {
                LsmError::Rename(format!(
                    "videos are spread over {} folders, move them into one first",
                    parents.len()
                ))
            },
        )?;
        if folder.exists() {
            return Err(LsmError::RenameConflict(folder));
        }

        if found.as_path() == session_root {
            let mut moves = misplaced
                .iter()
                .map(|file| Rename {
                    from: file.clone(),
                    to: folder.join(file_name(file)),
                })
                .collect::<Vec<_>>();
            let metadata = session_root.join(VIDEO_METADATA_FILE);
            if metadata.is_file() {
                moves.push(Rename {
                    from: metadata,
                    to: folder.join(VIDEO_METADATA_FILE),
                });
            }
            done.extend(move_into(&folder, moves)?);
        } else {
            let rename = Rename {
                from: found,
                to: folder.clone(),
            };
            apply(&rename)?;
            done.push(rename);
        }
    }

    if !folder.is_dir() {
        return Ok(done);
    }

    let prefix = naming::video_file_prefix(&session);
    let mut renames = Vec::new();
    for file in store::list_dir(&folder)? {
        if file.extension() != Some(VIDEO_EXTENSION) || file_name(&file).starts_with(&prefix) {
            continue;
        }
        let camera = camera_number(&file)?;
        renames.push(Rename {
            to: folder.join(naming::video_file_name(&session, camera)),
            from: file,
        });
    }
    done.extend(apply_all(renames)?);
    Ok(done)
}

/// `Camera_3.avi` -> 3
fn camera_number(file: &Utf8Path) -> Result<u32, LsmError> {
    file.file_stem()
        .and_then(|stem| stem.rsplit('_').next())
        .and_then(|last| last.parse().ok())
        .ok_or_else(|| {
            LsmError::Rename(format!(
                "cannot tell the camera number of {file}, expected a name ending in _<N>.{VIDEO_EXTENSION}"
            ))
        })
}
