use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use camino::Utf8PathBuf;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::config::{ConverterConfig, SorterConfig};
use crate::error::LsmError;
use crate::naming::{self, SessionName};

#[derive(Debug, Clone, Serialize)]
pub struct ToolInfo {
    pub sorter: Option<String>,
    pub converter: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SortRequest {
    pub session: SessionName,
    pub recording: Utf8PathBuf,
    pub probes: Vec<String>,
    pub output: Utf8PathBuf,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct SortOutput {
    pub probe_outputs: BTreeMap<String, Utf8PathBuf>,
}

pub trait Sorter {
    fn sort(&self, request: &SortRequest) -> Result<SortOutput, LsmError>;

    fn tool_version(&self) -> Option<String> {
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ConvertTarget {
    Nwb,
    Pyaldata,
}

impl ConvertTarget {
    pub fn as_str(self) -> &'static str {
        match self {
            ConvertTarget::Nwb => "nwb",
            ConvertTarget::Pyaldata => "pyaldata",
        }
    }

    pub fn output_file_name(self, session: &SessionName) -> String {
        match self {
            ConvertTarget::Nwb => naming::nwb_file_name(session),
            ConvertTarget::Pyaldata => naming::pyaldata_file_name(session),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ConvertRequest {
    pub session: SessionName,
    pub source: Utf8PathBuf,
    pub target: ConvertTarget,
    pub output: Utf8PathBuf,
}

pub trait Converter {
    fn convert(&self, request: &ConvertRequest) -> Result<Utf8PathBuf, LsmError>;

    fn tool_version(&self) -> Option<String> {
        None
    }
}

/// Runs the configured sorter program once per probe. Arguments may use the
/// placeholders `{image}`, `{input}`, `{output}` and `{probe}`.
#[derive(Debug, Clone)]
pub struct CommandSorter {
    program_name: String,
    program: Option<PathBuf>,
    image: String,
    args: Vec<String>,
}

impl CommandSorter {
    pub fn new(config: &SorterConfig) -> Self {
        Self {
            program: find_in_path(&config.program),
            program_name: config.program.clone(),
            image: config.image.clone(),
            args: config.args.clone(),
        }
    }

    fn require_program(&self) -> Result<&PathBuf, LsmError> {
        self.program
            .as_ref()
            .ok_or_else(|| LsmError::MissingTool(self.program_name.clone()))
    }
}

impl Sorter for CommandSorter {
    fn sort(&self, request: &SortRequest) -> Result<SortOutput, LsmError> {
        let program = self.require_program()?;
        let recording_name = request.recording.file_name().unwrap_or_default();

        let mut output = SortOutput::default();
        for probe in &request.probes {
            let probe_output = request
                .output
                .join(naming::probe_folder_name(recording_name, probe));
            fs::create_dir_all(probe_output.as_std_path())
                .map_err(|err| LsmError::fs(&probe_output, err))?;
            let args = expand_args(
                &self.args,
                &[
                    ("{image}", self.image.as_str()),
                    ("{input}", request.recording.as_str()),
                    ("{output}", probe_output.as_str()),
                    ("{probe}", probe.as_str()),
                ],
            );
            tracing::info!(session = %request.session, probe = %probe, "sorting probe");
            run_cmd(program, &args, LsmError::Sorter)?;
            output.probe_outputs.insert(probe.clone(), probe_output);
        }
        Ok(output)
    }

    fn tool_version(&self) -> Option<String> {
        self.program
            .as_ref()
            .and_then(|path| tool_version(path, &["--version"]))
    }
}

/// Runs the configured converter program. Arguments may use the
/// placeholders `{session}`, `{input}`, `{output}` and `{target}`.
#[derive(Debug, Clone)]
pub struct CommandConverter {
    program_name: String,
    program: Option<PathBuf>,
    args: Vec<String>,
}

impl CommandConverter {
    pub fn new(config: &ConverterConfig) -> Self {
        Self {
            program: find_in_path(&config.program),
            program_name: config.program.clone(),
            args: config.args.clone(),
        }
    }
}

impl Converter for CommandConverter {
    fn convert(&self, request: &ConvertRequest) -> Result<Utf8PathBuf, LsmError> {
        let program = self
            .program
            .as_ref()
            .ok_or_else(|| LsmError::MissingTool(self.program_name.clone()))?;
        let session = request.session.to_string();
        let args = expand_args(
            &self.args,
            &[
                ("{session}", session.as_str()),
                ("{input}", request.source.as_str()),
                ("{output}", request.output.as_str()),
                ("{target}", request.target.as_str()),
            ],
        );
        run_cmd(program, &args, LsmError::Converter)?;
        if !request.output.exists() {
            return Err(LsmError::Converter(format!(
                "{} finished without writing {}",
                self.program_name, request.output
            )));
        }
        Ok(request.output.clone())
    }

    fn tool_version(&self) -> Option<String> {
        self.program
            .as_ref()
            .and_then(|path| tool_version(path, &["--version"]))
    }
}

fn expand_args(template: &[String], values: &[(&str, &str)]) -> Vec<String> {
    template
        .iter()
        .map(|arg| {
            values
                .iter()
                .fold(arg.clone(), |arg, &(key, value)| arg.replace(key, value))
        })
        .collect()
}

fn run_cmd(program: &Path, args: &[String], wrap: fn(String) -> LsmError) -> Result<(), LsmError> {
    let output = Command::new(program)
        .args(args)
        .output()
        .map_err(|err| wrap(err.to_string()))?;
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
    let message = if stderr.is_empty() {
        format!("command failed: {} ({})", program.display(), output.status)
    } else {
        stderr
    };
    Err(wrap(message))
}

fn find_in_path(name: &str) -> Option<PathBuf> {
    let direct = Path::new(name);
    if direct.components().count() > 1 {
        return direct.exists().then(|| direct.to_path_buf());
    }
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var)
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
}

fn tool_version(path: &Path, args: &[&str]) -> Option<String> {
    let output = Command::new(path).args(args).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if stdout.is_empty() { None } else { Some(stdout) }
}
