use camino::Utf8PathBuf;
use miette::Diagnostic;
use thiserror::Error;

use crate::domain::Modality;

#[derive(Debug, Error, Diagnostic)]
pub enum LsmError {
    #[error("invalid session name {name:?}: {reason}")]
    #[diagnostic(help("session folders are named <SUBJECT>_<YYYY>_<MM>_<DD>_<HH>_<MM>"))]
    InvalidSessionName { name: String, reason: String },

    #[error("invalid subject id: {0:?}")]
    InvalidSubjectId(String),

    #[error("session {found} does not belong to subject {expected}")]
    SubjectMismatch { expected: String, found: String },

    #[error("session folder not found: {0}")]
    SessionNotFound(Utf8PathBuf),

    #[error("no valid sessions for subject {subject} in {path}")]
    NoSessions { subject: String, path: Utf8PathBuf },

    #[error("session {session} failed validation with {errors} error(s); first: {first}")]
    InvalidSession {
        session: String,
        errors: usize,
        first: String,
    },

    #[error("destination already holds different {modality} data: {path}")]
    #[diagnostic(help("resolve the difference by hand; uploads never overwrite remote data"))]
    TransferConflict { modality: Modality, path: Utf8PathBuf },

    #[error("destination file appeared during copy: {0}")]
    DestinationExists(Utf8PathBuf),

    #[error("interrupted")]
    Interrupted,

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("missing config file at {0}")]
    #[diagnostic(help("run `lsm init` to create one"))]
    MissingConfig(Utf8PathBuf),

    #[error("failed to read config file at {0}")]
    ConfigRead(Utf8PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid storage root: {0}")]
    InvalidRoot(String),

    #[error("at least one data type must be checked")]
    NoChecksRequested,

    #[error("aborting rename, target already exists: {0}")]
    RenameConflict(Utf8PathBuf),

    #[error("cannot rename: {0}")]
    Rename(String),

    #[error("{path} is not inside {root}")]
    OutsideRoot { path: Utf8PathBuf, root: Utf8PathBuf },

    #[error("required tool not found: {0}")]
    MissingTool(String),

    #[error("spike sorting failed: {0}")]
    Sorter(String),

    #[error("format conversion failed: {0}")]
    Converter(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

impl LsmError {
    pub(crate) fn fs(context: impl std::fmt::Display, err: impl std::fmt::Display) -> Self {
        LsmError::Filesystem(format!("{context}: {err}"))
    }
}
