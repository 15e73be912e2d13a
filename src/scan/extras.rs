use crate::domain::Modality;
use crate::naming;
use crate::validate::ValidationIssue;

use super::{ModalityScanner, ScanOutcome, ScanState, SessionContext, file_name};

pub struct ExtrasScanner;

impl ModalityScanner for ExtrasScanner {
    fn modality(&self) -> Modality {
        Modality::Extras
    }

    fn scan(&self, ctx: &SessionContext<'_>) -> ScanOutcome {
        let mut state = ScanState::new(Modality::Extras);
        let result = scan_extras(ctx, &mut state);
        state.finish(result)
    }
}

fn scan_extras(ctx: &SessionContext<'_>, state: &mut ScanState) -> Result<(), ValidationIssue> {
    for allowed in &ctx.rules.whitelisted_files_in_root {
        let bare = ctx.root.join(allowed);
        if bare.is_file() {
            return Err(state.error(
                &bare,
                format!(
                    "file must be named {}; run `lsm rename-extras` first",
                    ctx.name.prefixed(allowed)
                ),
            ));
        }
        let prefixed = ctx.root.join(ctx.name.prefixed(allowed));
        if prefixed.is_file() {
            state.item(ctx.relative(&prefixed));
        }
    }

    for file in state.walk(ctx.root)? {
        if file.parent() == Some(ctx.root) {
            continue;
        }
        let name = file_name(&file);
        if !ctx.rules.has_extra_extension(name) {
            continue;
        }
        if !naming::has_session_prefix(name, ctx.name) {
            return Err(state.error(
                &file,
                format!(
                    "file must be named {}; run `lsm rename-extras` first",
                    ctx.name.prefixed(name)
                ),
            ));
        }
        state.item(ctx.relative(&file));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use camino::Utf8PathBuf;

    use super::*;
    use crate::naming::SessionName;
    use crate::scan::ModalityRules;

    #[test]
    fn extras_need_session_prefix() {
        let temp = tempfile::tempdir().unwrap();
        let name: SessionName = "M020_2023_11_30_11_20".parse().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().join(name.to_string())).unwrap();
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("M020_2023_11_30_11_20_comment.txt"), b"ok").unwrap();
        fs::write(root.join("sub/M020_2023_11_30_11_20_traj_plan.txt"), b"ok").unwrap();
        let rules = ModalityRules::default();
        let ctx = SessionContext {
            root: &root,
            name: &name,
            rules: &rules,
        };

        let outcome = ExtrasScanner.scan(&ctx);
        assert!(outcome.issues.is_empty(), "{:?}", outcome.issues);
        assert_eq!(outcome.items.len(), 2);

        fs::write(root.join("sub/bci.log"), b"bad").unwrap();
        let outcome = ExtrasScanner.scan(&ctx);
        assert!(outcome.has_errors());
    }
}
