use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use chrono::{Datelike, NaiveDate, NaiveDateTime, Timelike};
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::LsmError;

const TIMESTAMP_FIELDS: [(&str, usize); 5] = [
    ("year", 4),
    ("month", 2),
    ("day", 2),
    ("hour", 2),
    ("minute", 2),
];

pub const VIDEO_EXTENSION: &str = "avi";
pub const VIDEO_METADATA_FILE: &str = "metadata.csv";
pub const TASK_FOLDER: &str = "run_task-task_files";
pub const TASK_FOLDER_SUFFIX: &str = "task_files";
pub const SPIKEGLX_ENDINGS: [&str; 4] = [".lf.meta", ".lf.bin", ".ap.meta", ".ap.bin"];
pub const SPIKEGLX_META_ENDINGS: [&str; 2] = [".lf.meta", ".ap.meta"];

static RECORDING_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_g(\d+)$").expect("static regex"));
static PCA_SUFFIX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"_MotSen\d-(X|Y)\.pca$").expect("static regex"));

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubjectId(String);

impl SubjectId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for SubjectId {
    type Err = LsmError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let mut chars = value.chars();
        let starts_with_letter = chars
            .next()
            .map(|ch| ch.is_ascii_alphabetic())
            .unwrap_or(false);
        if !starts_with_letter || !chars.all(|ch| ch.is_ascii_alphanumeric()) {
            return Err(LsmError::InvalidSubjectId(value.to_string()));
        }
        Ok(Self(value.to_string()))
    }
}

impl TryFrom<String> for SubjectId {
    type Error = LsmError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SubjectId> for String {
    fn from(value: SubjectId) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SessionTimestamp(NaiveDateTime);

impl SessionTimestamp {
    pub fn new(year: i32, month: u32, day: u32, hour: u32, minute: u32) -> Result<Self, LsmError> {
        let rendered = format!("{year:04}_{month:02}_{day:02}_{hour:02}_{minute:02}");
        if !(0..=9999).contains(&year) {
            return Err(invalid(&rendered, "year must have four digits"));
        }
        if !(1..=12).contains(&month) {
            return Err(invalid(&rendered, format!("month {month} out of range 1-12")));
        }
        if !(1..=31).contains(&day) {
            return Err(invalid(&rendered, format!("day {day} out of range 1-31")));
        }
        if hour > 23 {
            return Err(invalid(&rendered, format!("hour {hour} out of range 0-23")));
        }
        if minute > 59 {
            return Err(invalid(&rendered, format!("minute {minute} out of range 0-59")));
        }
        let date = NaiveDate::from_ymd_opt(year, month, day)
            .ok_or_else(|| invalid(&rendered, "not a calendar date"))?;
        let datetime = date
            .and_hms_opt(hour, minute, 0)
            .ok_or_else(|| invalid(&rendered, "not a valid time of day"))?;
        Ok(Self(datetime))
    }

    pub fn from_datetime(value: NaiveDateTime) -> Result<Self, LsmError> {
        Self::new(
            value.year(),
            value.month(),
            value.day(),
            value.hour(),
            value.minute(),
        )
    }

    pub fn date(&self) -> NaiveDate {
        self.0.date()
    }

    pub fn datetime(&self) -> NaiveDateTime {
        self.0
    }
}

impl fmt::Display for SessionTimestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:04}_{:02}_{:02}_{:02}_{:02}",
            self.0.year(),
            self.0.month(),
            self.0.day(),
            self.0.hour(),
            self.0.minute()
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionName {
    subject: SubjectId,
    timestamp: SessionTimestamp,
}

impl SessionName {
    pub fn new(subject: SubjectId, timestamp: SessionTimestamp) -> Self {
        Self { subject, timestamp }
    }

    pub fn subject(&self) -> &SubjectId {
        &self.subject
    }

    pub fn timestamp(&self) -> SessionTimestamp {
        self.timestamp
    }

    pub fn belongs_to(&self, subject: &SubjectId) -> bool {
        &self.subject == subject
    }

    pub fn prefixed(&self, suffix: &str) -> String {
        format!("{self}_{suffix}")
    }
}

impl fmt::Display for SessionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.subject, self.timestamp)
    }
}

impl FromStr for SessionName {
    type Err = LsmError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        parse_session_name(value)
    }
}

impl TryFrom<String> for SessionName {
    type Error = LsmError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<SessionName> for String {
    fn from(value: SessionName) -> Self {
        value.to_string()
    }
}

pub fn render_session_name(subject: &SubjectId, timestamp: SessionTimestamp) -> String {
    SessionName::new(subject.clone(), timestamp).to_string()
}

pub fn parse_session_name(name: &str) -> Result<SessionName, LsmError> {
    let tokens = name.split('_').collect::<Vec<_>>();
    let expected = TIMESTAMP_FIELDS.len() + 1;
    if tokens.len() != expected {
        return Err(invalid(
            name,
            format!(
                "expected {expected} underscore-separated fields, found {}",
                tokens.len()
            ),
        ));
    }

    let subject = tokens[0]
        .parse::<SubjectId>()
        .map_err(|_| invalid(name, format!("{:?} is not a valid subject id", tokens[0])))?;

    let mut values = [0u32; 5];
    for (slot, (token, (field, width))) in values
        .iter_mut()
        .zip(tokens[1..].iter().zip(TIMESTAMP_FIELDS))
    {
        if token.len() != width || !token.chars().all(|ch| ch.is_ascii_digit()) {
            return Err(invalid(
                name,
                format!("{field} must be {width} digits, got {token:?}"),
            ));
        }
        *slot = token
            .parse()
            .map_err(|_| invalid(name, format!("{field} is not numeric")))?;
    }

    let [year, month, day, hour, minute] = values;
    let timestamp = SessionTimestamp::new(year as i32, month, day, hour, minute)
        .map_err(|err| match err {
            LsmError::InvalidSessionName { reason, .. } => invalid(name, reason),
            other => other,
        })?;

    Ok(SessionName::new(subject, timestamp))
}

pub fn parse_for_subject(name: &str, subject: &SubjectId) -> Result<SessionName, LsmError> {
    if !name.starts_with(subject.as_str()) {
        return Err(LsmError::SubjectMismatch {
            expected: subject.to_string(),
            found: name.to_string(),
        });
    }
    let parsed = parse_session_name(name)?;
    if !parsed.belongs_to(subject) {
        return Err(LsmError::SubjectMismatch {
            expected: subject.to_string(),
            found: name.to_string(),
        });
    }
    Ok(parsed)
}

pub fn has_session_prefix(file_name: &str, session: &SessionName) -> bool {
    file_name.starts_with(&format!("{session}_"))
}

pub fn video_folder_name(session: &SessionName) -> String {
    session.prefixed("cameras")
}

pub fn video_file_prefix(session: &SessionName) -> String {
    session.prefixed("camera_")
}

pub fn video_file_name(session: &SessionName, camera: u32) -> String {
    format!("{}{camera}.{VIDEO_EXTENSION}", video_file_prefix(session))
}

pub fn recording_folder_name(session: &SessionName, gid: u32) -> String {
    session.prefixed(&format!("g{gid}"))
}

/// The `N` of a SpikeGLX `_gN` recording folder.
pub fn recording_gid(folder_name: &str) -> Option<u32> {
    RECORDING_SUFFIX
        .captures(folder_name)
        .and_then(|caps| caps.get(1))
        .and_then(|gid| gid.as_str().parse().ok())
}

pub fn probe_label<'a>(folder_name: &'a str, recording: &str) -> Option<&'a str> {
    let rest = folder_name.strip_prefix(recording)?.strip_prefix('_')?;
    let digits = rest.strip_prefix("imec")?;
    (!digits.is_empty() && digits.chars().all(|ch| ch.is_ascii_digit())).then_some(rest)
}

pub fn probe_folder_name(recording: &str, probe: &str) -> String {
    format!("{recording}_{probe}")
}

pub fn probe_file_names(recording: &str, probe: &str) -> Vec<String> {
    SPIKEGLX_ENDINGS
        .iter()
        .map(|ending| format!("{recording}_t0.{probe}{ending}"))
        .collect()
}

pub fn is_spikeglx_file(file_name: &str) -> bool {
    SPIKEGLX_ENDINGS
        .iter()
        .any(|ending| file_name.ends_with(ending))
}

pub fn is_pycontrol_file(file_name: &str, session: &SessionName) -> bool {
    if !file_name.starts_with(&session.to_string()) {
        return false;
    }
    if file_name.ends_with(".pca") {
        return PCA_SUFFIX.is_match(file_name);
    }
    file_name.ends_with(".txt")
}

pub fn nwb_file_name(session: &SessionName) -> String {
    format!("{session}.nwb")
}

pub fn pyaldata_file_name(session: &SessionName) -> String {
    session.prefixed("pyaldata.mat")
}

pub fn processed_ephys_folder_name(session: &SessionName) -> String {
    session.prefixed("ephys")
}

fn invalid(name: &str, reason: impl Into<String>) -> LsmError {
    LsmError::InvalidSessionName {
        name: name.to_string(),
        reason: reason.into(),
    }
}
