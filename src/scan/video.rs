use crate::domain::Modality;
use crate::naming::{self, VIDEO_EXTENSION, VIDEO_METADATA_FILE};
use crate::validate::ValidationIssue;

use super::{ModalityScanner, ScanOutcome, ScanState, SessionContext, file_name};

pub struct VideoScanner;

impl ModalityScanner for VideoScanner {
    fn modality(&self) -> Modality {
        Modality::Video
    }

    fn scan(&self, ctx: &SessionContext<'_>) -> ScanOutcome {
        let mut state = ScanState::new(Modality::Video);
        let result = scan_video(ctx, &mut state);
        state.finish(result)
    }
}

fn scan_video(ctx: &SessionContext<'_>, state: &mut ScanState) -> Result<(), ValidationIssue> {
    let folder = ctx.root.join(naming::video_folder_name(ctx.name));

    if !folder.is_dir() {
        state.warn(ctx.root, "no correctly named video folder found");
    } else {
        let entries = state.list(&folder)?;
        let (videos, others): (Vec<_>, Vec<_>) = entries
            .into_iter()
            .partition(|path| path.is_file() && path.extension() == Some(VIDEO_EXTENSION));

        if videos.is_empty() {
            return Err(state.error(&folder, "no video files found in video folder"));
        }

        let prefix = naming::video_file_prefix(ctx.name);
        for video in &videos {
            if !file_name(video).starts_with(&prefix) {
                return Err(state.error(
                    video,
                    format!(
                        "video file name does not start with {prefix}; run `lsm rename-videos` first"
                    ),
                ));
            }
        }

        if !others
            .iter()
            .any(|path| file_name(path) == VIDEO_METADATA_FILE)
        {
            return Err(state.error(
                &folder,
                format!("could not find {VIDEO_METADATA_FILE} in video folder"),
            ));
        }
        if let Some(unexpected) = others
            .iter()
            .find(|path| file_name(path) != VIDEO_METADATA_FILE)
        {
            return Err(state.error(unexpected, "unexpected file in video folder"));
        }

        state.item(ctx.relative(&folder));
    }

    for file in state.walk(ctx.root)? {
        if file.starts_with(&folder) {
            continue;
        }
        let name = file_name(&file);
        if file.extension() == Some(VIDEO_EXTENSION) || name == VIDEO_METADATA_FILE {
            return Err(state.error(
                &file,
                format!("video file in unexpected location, expected it in {folder}"),
            ));
        }
    }

    Ok(())
}
