use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use directories::BaseDirs;
use serde::{Deserialize, Serialize};

use crate::domain::ProcessingLevel;
use crate::error::LsmError;
use crate::scan::{ModalityRules, default_extra_extensions, default_whitelisted_files};
use crate::store::{self, Store};

const CONFIG_DIR: &str = "lab-session-manager";
const CONFIG_FILE: &str = "config.json";

#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    pub local_root: String,
    pub remote_root: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ignored_subject_dirs: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub whitelisted_files_in_root: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub extensions_to_rename: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sorter: Option<SorterConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub converter: Option<ConverterConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct SorterConfig {
    pub program: String,
    pub image: String,
    pub args: Vec<String>,
}

impl Default for SorterConfig {
    fn default() -> Self {
        Self {
            program: "docker".to_string(),
            image: "spikeinterface/kilosort4-base:latest".to_string(),
            args: [
                "run",
                "--rm",
                "--gpus",
                "all",
                "-v",
                "{input}:/input:ro",
                "-v",
                "{output}:/output",
                "{image}",
                "--stream",
                "{probe}.ap",
            ]
            .map(str::to_string)
            .to_vec(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct ConverterConfig {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for ConverterConfig {
    fn default() -> Self {
        Self {
            program: "lsm-convert".to_string(),
            args: ["--to", "{target}", "--session", "{session}", "{input}", "{output}"]
                .map(str::to_string)
                .to_vec(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub local_root: Utf8PathBuf,
    pub remote_root: Utf8PathBuf,
    pub ignored_subject_dirs: Vec<String>,
    pub rules: ModalityRules,
    pub sorter: SorterConfig,
    pub converter: ConverterConfig,
}

impl ResolvedConfig {
    pub fn store(&self) -> Store {
        Store::new_with_paths(self.local_root.clone(), self.remote_root.clone())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    pub fn default_path() -> Result<Utf8PathBuf, LsmError> {
        BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.config_dir().join(CONFIG_DIR).join(CONFIG_FILE))
                    .ok()
            })
            .ok_or_else(|| LsmError::Filesystem("unable to resolve config directory".to_string()))
    }

    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, LsmError> {
        let config_path = match path {
            Some(path) => Utf8PathBuf::from(path),
            None => Self::default_path()?,
        };

        if path.is_none() && !config_path.exists() {
            return Err(LsmError::MissingConfig(config_path));
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| LsmError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| LsmError::ConfigParse(err.to_string()))?;

        tracing::debug!(path = %config_path, "loaded config");
        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, LsmError> {
        let schema_version = config.schema_version.unwrap_or(1);
        let local_root = parse_root("local_root", &config.local_root)?;
        let remote_root = parse_root("remote_root", &config.remote_root)?;
        if local_root == remote_root {
            return Err(LsmError::InvalidRoot(
                "local_root and remote_root must differ".to_string(),
            ));
        }

        Ok(ResolvedConfig {
            schema_version,
            local_root,
            remote_root,
            ignored_subject_dirs: config
                .ignored_subject_dirs
                .unwrap_or_else(default_ignored_subject_dirs),
            rules: ModalityRules {
                whitelisted_files_in_root: config
                    .whitelisted_files_in_root
                    .unwrap_or_else(default_whitelisted_files),
                extra_extensions: config
                    .extensions_to_rename
                    .unwrap_or_else(default_extra_extensions),
            },
            sorter: config.sorter.unwrap_or_default(),
            converter: config.converter.unwrap_or_default(),
        })
    }

    pub fn check(config: &ResolvedConfig) -> Result<(), LsmError> {
        for (label, root) in [
            ("local_root", &config.local_root),
            ("remote_root", &config.remote_root),
        ] {
            if !root.is_dir() {
                return Err(LsmError::InvalidRoot(format!("{label} {root} is not a directory")));
            }
            let raw = root.join(ProcessingLevel::Raw.dir_name());
            if !raw.is_dir() {
                return Err(LsmError::InvalidRoot(format!(
                    "{label} {root} has no {} folder",
                    ProcessingLevel::Raw
                )));
            }
        }
        Ok(())
    }

    /// Writes a new config file with default rules. Refuses to replace an
    /// existing one.
    pub fn write_default(
        path: &Utf8Path,
        local_root: &str,
        remote_root: &str,
    ) -> Result<ResolvedConfig, LsmError> {
        if path.exists() {
            return Err(LsmError::InvalidArgument(format!(
                "config file already exists at {path}"
            )));
        }
        let config = Config {
            schema_version: Some(1),
            local_root: local_root.to_string(),
            remote_root: remote_root.to_string(),
            ignored_subject_dirs: Some(default_ignored_subject_dirs()),
            whitelisted_files_in_root: Some(default_whitelisted_files()),
            extensions_to_rename: Some(default_extra_extensions()),
            sorter: None,
            converter: None,
        };
        let content = serde_json::to_vec_pretty(&config)
            .map_err(|err| LsmError::ConfigParse(err.to_string()))?;
        let resolved = Self::resolve_config(config)?;

        let parent = path
            .parent()
            .ok_or_else(|| LsmError::Filesystem(format!("invalid config path {path}")))?;
        fs::create_dir_all(parent.as_std_path()).map_err(|err| LsmError::fs(parent, err))?;
        let mut temp = tempfile::Builder::new()
            .prefix(".lsm-config")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| LsmError::fs(parent, err))?;
        std::io::Write::write_all(&mut temp, &content).map_err(|err| LsmError::fs(path, err))?;
        temp.persist_noclobber(path.as_std_path())
            .map_err(|err| LsmError::fs(path, err.error))?;
        tracing::info!(path = %path, "wrote config");
        Ok(resolved)
    }
}

pub fn default_ignored_subject_dirs() -> Vec<String> {
    vec!["treadmill-calibration".to_string()]
}

fn parse_root(label: &str, value: &str) -> Result<Utf8PathBuf, LsmError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(LsmError::InvalidRoot(format!("{label} is empty")));
    }
    let path = Utf8PathBuf::from(trimmed);
    if !path.is_absolute() {
        return Err(LsmError::InvalidRoot(format!(
            "{label} must be an absolute path, got {path}"
        )));
    }
    Ok(path)
}

pub fn current_dir() -> Result<Utf8PathBuf, LsmError> {
    let cwd = std::env::current_dir().map_err(|err| LsmError::fs("current directory", err))?;
    store::to_utf8(cwd)
}
