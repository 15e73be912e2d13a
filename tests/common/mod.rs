#![allow(dead_code)]

use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use lab_session_manager::naming::{self, SessionName};

pub const SUBJECT: &str = "M020";
pub const SESSION: &str = "M020_2024_03_01_10_00";

pub fn temp_root() -> (tempfile::TempDir, Utf8PathBuf) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
    (temp, root)
}

/// Builds a raw session folder under `<store>/raw/<subject>/<session>`.
pub struct SessionBuilder {
    pub root: Utf8PathBuf,
    pub name: SessionName,
}

impl SessionBuilder {
    pub fn new(store_root: &Utf8Path, session: &str) -> Self {
        let name: SessionName = session.parse().unwrap();
        let root = store_root
            .join("raw")
            .join(name.subject().as_str())
            .join(session);
        fs::create_dir_all(&root).unwrap();
        Self { root, name }
    }

    pub fn behavior(self) -> Self {
        let name = &self.name;
        fs::write(self.root.join(format!("{name}-2024-03-01-100000.txt")), b"pycontrol log").unwrap();
        fs::write(self.root.join(format!("{name}_MotSen1-X.pca")), b"x").unwrap();
        fs::write(self.root.join(format!("{name}_MotSen1-Y.pca")), b"y").unwrap();
        let task = self.root.join(naming::TASK_FOLDER);
        fs::create_dir_all(&task).unwrap();
        fs::write(task.join("task.py"), b"run()").unwrap();
        self
    }

    pub fn ephys(self, gid: u32, probes: &[&str]) -> Self {
        let recording = naming::recording_folder_name(&self.name, gid);
        for probe in probes {
            let folder = self
                .root
                .join(&recording)
                .join(naming::probe_folder_name(&recording, probe));
            fs::create_dir_all(&folder).unwrap();
            for file in naming::probe_file_names(&recording, probe) {
                fs::write(folder.join(&file), format!("{file} data")).unwrap();
            }
        }
        self
    }

    pub fn video(self, cameras: u32) -> Self {
        let folder = self.root.join(naming::video_folder_name(&self.name));
        fs::create_dir_all(&folder).unwrap();
        for camera in 0..cameras {
            fs::write(
                folder.join(naming::video_file_name(&self.name, camera)),
                format!("frames {camera}"),
            )
            .unwrap();
        }
        fs::write(folder.join(naming::VIDEO_METADATA_FILE), b"camera,fps").unwrap();
        self
    }

    pub fn extra(self, relative: &str, content: &str) -> Self {
        let path = self.root.join(relative);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, content).unwrap();
        self
    }

    pub fn full(self) -> Self {
        let comment = self.name.prefixed("comment.txt");
        self.behavior()
            .ephys(0, &["imec0"])
            .video(2)
            .extra(&comment, "good session")
    }
}

/// Every file below `root` with its content, for before/after comparisons.
pub fn snapshot(root: &Utf8Path) -> Vec<(Utf8PathBuf, Vec<u8>)> {
    let mut files = Vec::new();
    if !root.exists() {
        return files;
    }
    let mut stack = vec![root.to_path_buf()];
    while let Some(dir) = stack.pop() {
        for entry in fs::read_dir(&dir).unwrap() {
            let path = Utf8PathBuf::from_path_buf(entry.unwrap().path()).unwrap();
            if path.is_dir() {
                stack.push(path);
            } else {
                let content = fs::read(&path).unwrap();
                files.push((path.strip_prefix(root).unwrap().to_path_buf(), content));
            }
        }
    }
    files.sort();
    files
}
