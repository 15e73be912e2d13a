use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use camino::Utf8PathBuf;
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use miette::IntoDiagnostic;
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use lab_session_manager::app::{App, ProgressSink, TransferOptions, TransferReport};
use lab_session_manager::config::{self, ConfigLoader};
use lab_session_manager::domain::{ModalitySet, Side};
use lab_session_manager::error::LsmError;
use lab_session_manager::naming::{SessionName, SubjectId};
use lab_session_manager::output::{ConsoleProgress, HumanOutput, JsonOutput, OutputMode};
use lab_session_manager::processing::{CommandConverter, CommandSorter, ConvertTarget};

#[derive(Parser)]
#[command(name = "lsm")]
#[command(about = "Validate, list and synchronize lab recording sessions")]
#[command(version)]
struct Cli {
    /// Print machine-readable JSON instead of a summary.
    #[arg(long, global = true)]
    json: bool,

    /// Config file to use instead of the default location.
    #[arg(long, global = true)]
    config: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Clone, Copy, Default)]
struct ModalityFlags {
    #[arg(long)]
    ignore_behavior: bool,
    #[arg(long)]
    ignore_ephys: bool,
    #[arg(long)]
    ignore_videos: bool,
    #[arg(long)]
    ignore_extras: bool,
}

impl ModalityFlags {
    fn selected(self) -> ModalitySet {
        ModalitySet::from_flags(
            !self.ignore_behavior,
            !self.ignore_ephys,
            !self.ignore_videos,
            !self.ignore_extras,
        )
    }
}

#[derive(Args, Clone, Copy, Default)]
struct SideFlag {
    /// Look at the remote store instead of the local one.
    #[arg(long)]
    remote: bool,
}

impl SideFlag {
    fn side(self) -> Side {
        if self.remote { Side::Remote } else { Side::Local }
    }
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Validate one session folder")]
    ValidateSession {
        path: String,
        /// Require the session to belong to this subject.
        #[arg(long)]
        subject: Option<String>,
        #[command(flatten)]
        modalities: ModalityFlags,
    },
    #[command(about = "Validate the most recent session of a subject")]
    ValidateLast {
        subject: String,
        #[command(flatten)]
        modalities: ModalityFlags,
        #[command(flatten)]
        side: SideFlag,
    },
    #[command(about = "Validate every session of a subject")]
    ValidateSubject {
        subject: String,
        #[command(flatten)]
        modalities: ModalityFlags,
        #[command(flatten)]
        side: SideFlag,
    },
    #[command(about = "Validate all sessions recorded today")]
    ValidateToday {
        /// Day to use instead of today (YYYY-MM-DD).
        #[arg(long)]
        date: Option<NaiveDate>,
        #[command(flatten)]
        modalities: ModalityFlags,
        #[command(flatten)]
        side: SideFlag,
    },
    #[command(about = "List sessions recorded today")]
    ListToday {
        #[arg(long)]
        date: Option<NaiveDate>,
        #[command(flatten)]
        side: SideFlag,
    },
    #[command(about = "List the sessions of a subject and the data they hold")]
    ListSessions {
        subject: String,
        #[command(flatten)]
        side: SideFlag,
    },
    #[command(about = "Upload a local session to the remote store")]
    UploadSession {
        path: String,
        #[command(flatten)]
        modalities: ModalityFlags,
        #[arg(long)]
        dry_run: bool,
    },
    #[command(about = "Upload the most recent local session of a subject")]
    UploadLast {
        subject: String,
        #[command(flatten)]
        modalities: ModalityFlags,
        #[arg(long)]
        dry_run: bool,
    },
    #[command(about = "Download a session from the remote store")]
    DownloadSession {
        session: String,
        #[command(flatten)]
        modalities: ModalityFlags,
        #[arg(long)]
        dry_run: bool,
    },
    #[command(about = "Download the most recent remote session of a subject")]
    DownloadLast {
        subject: String,
        #[command(flatten)]
        modalities: ModalityFlags,
        #[arg(long)]
        dry_run: bool,
    },
    #[command(about = "Move and rename camera recordings to the expected names")]
    RenameVideos { path: String },
    #[command(about = "Prefix extra files with the session name")]
    RenameExtras { path: String },
    #[command(about = "Spike-sort the probes of a local session")]
    Sort {
        path: String,
        /// Probe to sort, e.g. imec0. Repeat for several; all probes by default.
        #[arg(long = "probe")]
        probes: Vec<String>,
        #[arg(long)]
        force: bool,
    },
    #[command(about = "Convert a local session to NWB or pyaldata")]
    Convert {
        path: String,
        #[arg(long = "to", value_enum)]
        target: ConvertTarget,
        #[arg(long)]
        force: bool,
    },
    #[command(about = "Create a config file")]
    Init {
        #[arg(long)]
        local_root: String,
        #[arg(long)]
        remote_root: String,
    },
    #[command(about = "Show the resolved configuration")]
    ShowConfig,
    #[command(about = "Check that the configured storage roots are usable")]
    CheckConfig,
}

impl Commands {
    fn is_transfer(&self) -> bool {
        matches!(
            self,
            Commands::UploadSession { dry_run: false, .. }
                | Commands::UploadLast { dry_run: false, .. }
                | Commands::DownloadSession { dry_run: false, .. }
                | Commands::DownloadLast { dry_run: false, .. }
        )
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(report) => {
            eprintln!("{report:?}");
            if let Some(lsm) = report.downcast_ref::<LsmError>() {
                return ExitCode::from(map_exit_code(lsm));
            }
            ExitCode::from(1)
        }
    }
}

fn map_exit_code(error: &LsmError) -> u8 {
    match error {
        LsmError::SessionNotFound(_) | LsmError::NoSessions { .. } | LsmError::MissingConfig(_) => {
            2
        }
        LsmError::MissingTool(_) | LsmError::Sorter(_) | LsmError::Converter(_) => 3,
        LsmError::InvalidSession { .. }
        | LsmError::InvalidSessionName { .. }
        | LsmError::SubjectMismatch { .. }
        | LsmError::TransferConflict { .. }
        | LsmError::RenameConflict(_) => 4,
        LsmError::Interrupted => 130,
        _ => 1,
    }
}

fn run() -> miette::Result<ExitCode> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mode = if cli.json {
        OutputMode::Json
    } else {
        OutputMode::Human
    };

    if let Commands::Init {
        local_root,
        remote_root,
    } = &cli.command
    {
        let path = match &cli.config {
            Some(path) => Utf8PathBuf::from(path),
            None => ConfigLoader::default_path()?,
        };
        let resolved = ConfigLoader::write_default(&path, local_root, remote_root)?;
        let app = build_app(resolved);
        emit(mode, &app.config_report(), HumanOutput::print_config)?;
        if mode == OutputMode::Human {
            println!("wrote {path}");
        }
        return Ok(ExitCode::SUCCESS);
    }

    let resolved = ConfigLoader::resolve(cli.config.as_deref())?;
    let interrupt = Arc::new(AtomicBool::new(false));
    let mut app = build_app(resolved);
    if cli.command.is_transfer() {
        install_interrupt_handler(interrupt.clone())?;
        app = app.with_interrupt(interrupt.clone());
    }
    let sink: &dyn ProgressSink = match mode {
        OutputMode::Json => &JsonOutput,
        OutputMode::Human => &ConsoleProgress,
    };

    match cli.command {
        Commands::ValidateSession {
            path,
            subject,
            modalities,
        } => {
            let subject = subject.map(|s| parse_subject(&s)).transpose()?;
            let report = app.validate_session(
                &absolute(&path)?,
                subject.as_ref(),
                modalities.selected(),
                sink,
            )?;
            emit(mode, &report, HumanOutput::print_validation)?;
            Ok(verdict(report.is_valid()))
        }
        Commands::ValidateLast {
            subject,
            modalities,
            side,
        } => {
            let report = app.validate_last(
                &parse_subject(&subject)?,
                modalities.selected(),
                side.side(),
                sink,
            )?;
            emit(mode, &report, HumanOutput::print_validation)?;
            Ok(verdict(report.is_valid()))
        }
        Commands::ValidateSubject {
            subject,
            modalities,
            side,
        } => {
            let report = app.validate_subject(
                &parse_subject(&subject)?,
                modalities.selected(),
                side.side(),
                sink,
            )?;
            emit(mode, &report, HumanOutput::print_batch)?;
            Ok(verdict(report.all_valid()))
        }
        Commands::ValidateToday {
            date,
            modalities,
            side,
        } => {
            let report = app.validate_day(
                date.unwrap_or_else(today),
                modalities.selected(),
                side.side(),
                sink,
            )?;
            emit(mode, &report, HumanOutput::print_batch)?;
            Ok(verdict(report.all_valid()))
        }
        Commands::ListToday { date, side } => {
            let list = app.list_day(date.unwrap_or_else(today), side.side())?;
            emit(mode, &list, HumanOutput::print_session_list)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::ListSessions { subject, side } => {
            let listing = app.list_sessions(&parse_subject(&subject)?, side.side())?;
            emit(mode, &listing, HumanOutput::print_subject_sessions)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::UploadSession {
            path,
            modalities,
            dry_run,
        } => {
            let report = app.upload_session(
                &absolute(&path)?,
                &modalities.selected(),
                TransferOptions { dry_run },
                sink,
            )?;
            finish_transfer(mode, &report, &interrupt)
        }
        Commands::UploadLast {
            subject,
            modalities,
            dry_run,
        } => {
            let report = app.upload_last(
                &parse_subject(&subject)?,
                &modalities.selected(),
                TransferOptions { dry_run },
                sink,
            )?;
            finish_transfer(mode, &report, &interrupt)
        }
        Commands::DownloadSession {
            session,
            modalities,
            dry_run,
        } => {
            let session: SessionName = session.parse()?;
            let report = app.download_session(
                &session,
                &modalities.selected(),
                TransferOptions { dry_run },
                sink,
            )?;
            finish_transfer(mode, &report, &interrupt)
        }
        Commands::DownloadLast {
            subject,
            modalities,
            dry_run,
        } => {
            let report = app.download_last(
                &parse_subject(&subject)?,
                &modalities.selected(),
                TransferOptions { dry_run },
                sink,
            )?;
            finish_transfer(mode, &report, &interrupt)
        }
        Commands::RenameVideos { path } => {
            let report = app.rename_videos(&absolute(&path)?)?;
            emit(mode, &report, HumanOutput::print_renames)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::RenameExtras { path } => {
            let report = app.rename_extras(&absolute(&path)?)?;
            emit(mode, &report, HumanOutput::print_renames)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Sort {
            path,
            probes,
            force,
        } => {
            let report = app.sort_session(&absolute(&path)?, &probes, force, sink)?;
            emit(mode, &report, HumanOutput::print_sort)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::Convert {
            path,
            target,
            force,
        } => {
            let report = app.convert_session(&absolute(&path)?, target, force, sink)?;
            emit(mode, &report, HumanOutput::print_convert)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::ShowConfig => {
            emit(mode, &app.config_report(), HumanOutput::print_config)?;
            Ok(ExitCode::SUCCESS)
        }
        Commands::CheckConfig => {
            let report = app.check_config()?;
            emit(mode, &report, HumanOutput::print_config)?;
            if mode == OutputMode::Human {
                println!("\x1b[32mconfig ok\x1b[0m");
            }
            Ok(ExitCode::SUCCESS)
        }
        Commands::Init { .. } => Ok(ExitCode::SUCCESS),
    }
}

/// First Ctrl+C lets the file in flight finish and rolls back the modality
/// being copied; a second one exits immediately.
fn install_interrupt_handler(flag: Arc<AtomicBool>) -> miette::Result<()> {
    ctrlc::set_handler(move || {
        if flag.swap(true, Ordering::SeqCst) {
            std::process::exit(130);
        }
        tracing::warn!("received Ctrl+C, rolling back the current modality");
    })
    .into_diagnostic()
}

fn build_app(resolved: config::ResolvedConfig) -> App<CommandSorter, CommandConverter> {
    let sorter = CommandSorter::new(&resolved.sorter);
    let converter = CommandConverter::new(&resolved.converter);
    App::new(resolved, sorter, converter)
}

fn emit<T: Serialize>(mode: OutputMode, value: &T, human: fn(&T)) -> miette::Result<()> {
    match mode {
        OutputMode::Json => JsonOutput::print_json(value).into_diagnostic(),
        OutputMode::Human => {
            human(value);
            Ok(())
        }
    }
}

fn finish_transfer(
    mode: OutputMode,
    report: &TransferReport,
    interrupt: &AtomicBool,
) -> miette::Result<ExitCode> {
    emit(mode, report, HumanOutput::print_transfer)?;
    if interrupt.load(Ordering::SeqCst) {
        return Ok(ExitCode::from(130));
    }
    let failed = report
        .result
        .as_ref()
        .map(|result| !result.is_success())
        .unwrap_or(false);
    Ok(if failed {
        ExitCode::from(1)
    } else {
        ExitCode::SUCCESS
    })
}

fn verdict(valid: bool) -> ExitCode {
    if valid {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(4)
    }
}

fn parse_subject(value: &str) -> miette::Result<SubjectId> {
    Ok(value.parse::<SubjectId>()?)
}

fn absolute(path: &str) -> miette::Result<Utf8PathBuf> {
    let path = Utf8PathBuf::from(path);
    if path.is_absolute() {
        return Ok(path);
    }
    let cwd = config::current_dir()?;
    Ok(cwd.join(path))
}

fn today() -> NaiveDate {
    chrono::Local::now().date_naive()
}
