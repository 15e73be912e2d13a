use std::fs;
use std::io::{BufReader, Read};
use std::path::PathBuf;

use camino::{Utf8Path, Utf8PathBuf};

use crate::domain::{ProcessingLevel, Side};
use crate::error::LsmError;
use crate::naming::{self, SessionName, SubjectId};

const COMPARE_CHUNK: usize = 64 * 1024;

#[derive(Debug, Clone)]
pub struct Store {
    local_root: Utf8PathBuf,
    remote_root: Utf8PathBuf,
}

impl Store {
    pub fn new_with_paths(local_root: Utf8PathBuf, remote_root: Utf8PathBuf) -> Self {
        Self {
            local_root,
            remote_root,
        }
    }

    pub fn root(&self, side: Side) -> &Utf8Path {
        match side {
            Side::Local => &self.local_root,
            Side::Remote => &self.remote_root,
        }
    }

    pub fn level_root(&self, side: Side, level: ProcessingLevel) -> Utf8PathBuf {
        self.root(side).join(level.dir_name())
    }

    pub fn subject_dir(
        &self,
        side: Side,
        level: ProcessingLevel,
        subject: &SubjectId,
    ) -> Utf8PathBuf {
        self.level_root(side, level).join(subject.as_str())
    }

    pub fn session_path(
        &self,
        side: Side,
        level: ProcessingLevel,
        session: &SessionName,
    ) -> Utf8PathBuf {
        self.subject_dir(side, level, session.subject())
            .join(session.to_string())
    }

    pub fn processed_session_path(&self, side: Side, session: &SessionName) -> Utf8PathBuf {
        self.session_path(side, ProcessingLevel::Processed, session)
    }

    pub fn session_in_level(
        &self,
        side: Side,
        level: ProcessingLevel,
        path: &Utf8Path,
    ) -> Result<SessionName, LsmError> {
        let level_root = self.level_root(side, level);
        let relative = path
            .strip_prefix(&level_root)
            .map_err(|_| LsmError::OutsideRoot {
                path: path.to_path_buf(),
                root: level_root.clone(),
            })?;
        let parts = relative.components().map(|c| c.as_str()).collect::<Vec<_>>();
        let [subject, session] = parts.as_slice() else {
            return Err(LsmError::OutsideRoot {
                path: path.to_path_buf(),
                root: level_root,
            });
        };
        let subject: SubjectId = subject.parse()?;
        naming::parse_for_subject(session, &subject)
    }
}

pub fn list_dir(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, LsmError> {
    let entries = fs::read_dir(dir.as_std_path()).map_err(|err| LsmError::fs(dir, err))?;
    let mut items = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|err| LsmError::fs(dir, err))?;
        items.push(to_utf8(entry.path())?);
    }
    items.sort();
    Ok(items)
}

pub fn walk_files(root: &Utf8Path) -> Result<Vec<Utf8PathBuf>, LsmError> {
    let mut files = Vec::new();
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for path in list_dir(&dir)? {
            if path.is_dir() {
                stack.push(path);
            } else {
                files.push(path);
            }
        }
    }
    files.sort();
    Ok(files)
}

pub fn is_hidden(file_name: &str) -> bool {
    file_name.starts_with('.')
}

pub fn to_utf8(path: PathBuf) -> Result<Utf8PathBuf, LsmError> {
    Utf8PathBuf::from_path_buf(path)
        .map_err(|path| LsmError::Filesystem(format!("non UTF-8 path: {}", path.display())))
}

pub fn files_identical(left: &Utf8Path, right: &Utf8Path) -> Result<bool, LsmError> {
    let left_meta = fs::metadata(left.as_std_path()).map_err(|err| LsmError::fs(left, err))?;
    let right_meta = fs::metadata(right.as_std_path()).map_err(|err| LsmError::fs(right, err))?;
    if left_meta.len() != right_meta.len() {
        return Ok(false);
    }

    let open = |path: &Utf8Path| {
        fs::File::open(path.as_std_path())
            .map(BufReader::new)
            .map_err(|err| LsmError::fs(path, err))
    };
    let mut left_reader = open(left)?;
    let mut right_reader = open(right)?;
    let mut left_buf = vec![0u8; COMPARE_CHUNK];
    let mut right_buf = vec![0u8; COMPARE_CHUNK];
    loop {
        let read =
            read_full(&mut left_reader, &mut left_buf).map_err(|err| LsmError::fs(left, err))?;
        let other =
            read_full(&mut right_reader, &mut right_buf).map_err(|err| LsmError::fs(right, err))?;
        if read != other || left_buf[..read] != right_buf[..other] {
            return Ok(false);
        }
        if read == 0 {
            return Ok(true);
        }
    }
}

fn read_full(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

/// Copies `source` into a temp file next to `dest` and moves it into place.
/// Fails instead of replacing an existing `dest`.
pub fn copy_file_atomic(source: &Utf8Path, dest: &Utf8Path) -> Result<(), LsmError> {
    let parent = dest
        .parent()
        .ok_or_else(|| LsmError::Filesystem(format!("invalid destination path {dest}")))?;
    fs::create_dir_all(parent.as_std_path()).map_err(|err| LsmError::fs(parent, err))?;
    let temp = tempfile::Builder::new()
        .prefix(".lsm-copy")
        .tempfile_in(parent.as_std_path())
        .map_err(|err| LsmError::fs(parent, err))?;
    fs::copy(source.as_std_path(), temp.path()).map_err(|err| LsmError::fs(source, err))?;
    temp.persist_noclobber(dest.as_std_path())
        .map_err(|err| match err.error.kind() {
            std::io::ErrorKind::AlreadyExists => LsmError::DestinationExists(dest.to_path_buf()),
            _ => LsmError::fs(dest, err.error),
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn layout_paths() {
        let store = Store::new_with_paths("/data/local".into(), "/mnt/remote".into());
        let session: SessionName = "M020_2024_03_01_10_00".parse().unwrap();

        let raw = store.session_path(Side::Remote, ProcessingLevel::Raw, &session);
        assert_eq!(raw, Utf8PathBuf::from("/mnt/remote/raw/M020/M020_2024_03_01_10_00"));

        let processed = store.processed_session_path(Side::Local, &session);
        assert!(processed.ends_with("processed/M020/M020_2024_03_01_10_00"));
    }

    #[test]
    fn session_must_sit_under_its_subject() {
        let store = Store::new_with_paths("/data/local".into(), "/mnt/remote".into());
        let ok = store
            .session_in_level(
                Side::Local,
                ProcessingLevel::Raw,
                Utf8Path::new("/data/local/raw/M020/M020_2024_03_01_10_00"),
            )
            .unwrap();
        assert_eq!(ok.subject().as_str(), "M020");

        assert_matches!(
            store.session_in_level(
                Side::Local,
                ProcessingLevel::Raw,
                Utf8Path::new("/data/local/raw/M021/M020_2024_03_01_10_00"),
            ),
            Err(LsmError::SubjectMismatch { .. })
        );
        assert_matches!(
            store.session_in_level(
                Side::Local,
                ProcessingLevel::Raw,
                Utf8Path::new("/elsewhere/M020_2024_03_01_10_00"),
            ),
            Err(LsmError::OutsideRoot { .. })
        );
    }

    #[test]
    fn atomic_copy_never_replaces() {
        let temp = tempfile::tempdir().unwrap();
        let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let source = root.join("a.bin");
        let dest = root.join("out/a.bin");
        fs::write(&source, b"one").unwrap();

        copy_file_atomic(&source, &dest).unwrap();
        assert!(files_identical(&source, &dest).unwrap());

        fs::write(&source, b"two").unwrap();
        assert!(!files_identical(&source, &dest).unwrap());
        assert_matches!(
            copy_file_atomic(&source, &dest),
            Err(LsmError::DestinationExists(path)) if path == dest
        );
        assert_eq!(fs::read(&dest).unwrap(), b"one");
    }
}
