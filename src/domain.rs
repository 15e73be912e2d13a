use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::LsmError;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, ValueEnum,
)]
#[serde(rename_all = "lowercase")]
pub enum Modality {
    Behavior,
    Ephys,
    Video,
    Extras,
    Nwb,
    Pyaldata,
    Kilosort,
}

impl Modality {
    pub const TRANSFERABLE: [Modality; 4] = [
        Modality::Behavior,
        Modality::Ephys,
        Modality::Video,
        Modality::Extras,
    ];

    pub const DERIVED: [Modality; 3] = [Modality::Nwb, Modality::Pyaldata, Modality::Kilosort];

    pub fn is_transferable(self) -> bool {
        Self::TRANSFERABLE.contains(&self)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Modality::Behavior => "behavior",
            Modality::Ephys => "ephys",
            Modality::Video => "video",
            Modality::Extras => "extras",
            Modality::Nwb => "nwb",
            Modality::Pyaldata => "pyaldata",
            Modality::Kilosort => "kilosort",
        }
    }
}

impl fmt::Display for Modality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Modality {
    type Err = LsmError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "behavior" | "behaviour" => Ok(Modality::Behavior),
            "ephys" => Ok(Modality::Ephys),
            "video" | "videos" => Ok(Modality::Video),
            "extras" => Ok(Modality::Extras),
            "nwb" => Ok(Modality::Nwb),
            "pyaldata" => Ok(Modality::Pyaldata),
            "kilosort" => Ok(Modality::Kilosort),
            _ => Err(LsmError::InvalidArgument(format!("unknown modality {value:?}"))),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ModalitySet(BTreeSet<Modality>);

impl ModalitySet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn raw() -> Self {
        [Modality::Behavior, Modality::Ephys, Modality::Video]
            .into_iter()
            .collect()
    }

    pub fn transferable() -> Self {
        Modality::TRANSFERABLE.into_iter().collect()
    }

    pub fn from_flags(behavior: bool, ephys: bool, video: bool, extras: bool) -> Self {
        let mut set = Self::new();
        if behavior {
            set.insert(Modality::Behavior);
        }
        if ephys {
            set.insert(Modality::Ephys);
        }
        if video {
            set.insert(Modality::Video);
        }
        if extras {
            set.insert(Modality::Extras);
        }
        set
    }

    pub fn insert(&mut self, modality: Modality) -> bool {
        self.0.insert(modality)
    }

    pub fn contains(&self, modality: Modality) -> bool {
        self.0.contains(&modality)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = Modality> + '_ {
        self.0.iter().copied()
    }

    pub fn require_any(self) -> Result<Self, LsmError> {
        if self.is_empty() {
            return Err(LsmError::NoChecksRequested);
        }
        Ok(self)
    }
}

impl FromIterator<Modality> for ModalitySet {
    fn from_iter<I: IntoIterator<Item = Modality>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Presence {
    Present,
    Absent,
    Invalid,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Upload,
    Download,
}

impl Direction {
    pub fn source(self) -> Side {
        match self {
            Direction::Upload => Side::Local,
            Direction::Download => Side::Remote,
        }
    }

    pub fn destination(self) -> Side {
        match self {
            Direction::Upload => Side::Remote,
            Direction::Download => Side::Local,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Upload => write!(f, "upload"),
            Direction::Download => write!(f, "download"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Local,
    Remote,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Local => write!(f, "local"),
            Side::Remote => write!(f, "remote"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ProcessingLevel {
    Raw,
    Processed,
}

impl ProcessingLevel {
    pub fn dir_name(self) -> &'static str {
        match self {
            ProcessingLevel::Raw => "raw",
            ProcessingLevel::Processed => "processed",
        }
    }
}

impl fmt::Display for ProcessingLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.dir_name())
    }
}
