use std::io::{self, Write};

use serde::Serialize;

use crate::app::{
    BatchReport, BatchStatus, ConfigReport, ConvertReport, ProgressEvent, ProgressSink,
    RenameReport, SessionList, SortReport, SubjectSessions, TransferReport,
};
use crate::domain::{Presence, Severity};
use crate::transfer::{ModalityOutcome, TransferAction};
use crate::validate::ValidationReport;

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const CYAN: &str = "\x1b[36m";
const RED: &str = "\x1b[31m";
const RESET: &str = "\x1b[0m";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputMode {
    Human,
    Json,
}

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

impl ProgressSink for JsonOutput {
    fn event(&self, _event: ProgressEvent) {}
}

pub struct ConsoleProgress;

impl ProgressSink for ConsoleProgress {
    fn event(&self, event: ProgressEvent) {
        match event.elapsed {
            Some(elapsed) => eprintln!(
                "{CYAN}{} ({:.1}s){RESET}",
                event.message,
                elapsed.as_secs_f64()
            ),
            None => eprintln!("{CYAN}{}{RESET}", event.message),
        }
    }
}

pub struct HumanOutput;

impl HumanOutput {
    pub fn print_validation(report: &ValidationReport) {
        for issue in &report.issues {
            let color = match issue.severity {
                Severity::Warning => YELLOW,
                Severity::Error => RED,
            };
            println!("{color}{issue}{RESET}");
        }
        if report.is_valid() {
            println!(
                "{GREEN}{} is valid ({} warning(s)){RESET}",
                report.session,
                report.warnings().count()
            );
        } else {
            println!(
                "{RED}{} is invalid ({} error(s)){RESET}",
                report.session,
                report.errors().count()
            );
        }
    }

    pub fn print_batch(report: &BatchReport) {
        if report.rows.is_empty() {
            println!("{YELLOW}no sessions found{RESET}");
            return;
        }
        for row in &report.rows {
            let (color, label) = match row.status {
                BatchStatus::Valid => (GREEN, "valid"),
                BatchStatus::Invalid => (RED, "invalid"),
                BatchStatus::Failed => (RED, "failed"),
            };
            println!(
                "{color}{:<8} {} errors={} warnings={}{RESET}",
                label, row.session, row.errors, row.warnings
            );
            if let Some(message) = &row.message {
                println!("{color}         {message}{RESET}");
            }
        }
        let valid = report
            .rows
            .iter()
            .filter(|row| row.status == BatchStatus::Valid)
            .count();
        println!("{CYAN}{valid}/{} session(s) valid{RESET}", report.rows.len());
    }

    pub fn print_transfer(report: &TransferReport) {
        let plan = &report.plan;
        println!(
            "{CYAN}{} {} -> {}{RESET}",
            plan.direction, plan.session, plan.destination
        );
        for warning in &plan.warnings {
            println!("{YELLOW}{warning}{RESET}");
        }

        match &report.result {
            None => {
                for modality_plan in &plan.modalities {
                    let line = match &modality_plan.action {
                        TransferAction::Copy { files } => format!("copy {} file(s)", files.len()),
                        TransferAction::SkipAlreadyPresent => "already present".to_string(),
                        TransferAction::SkipNotRequested => "not requested".to_string(),
                        TransferAction::SkipAbsentAtSource => "absent at source".to_string(),
                        TransferAction::Conflict { paths } => {
                            format!("conflict in {} file(s)", paths.len())
                        }
                    };
                    println!("  {:<9} {line}", modality_plan.modality.as_str());
                }
                println!("{YELLOW}dry run, nothing copied{RESET}");
            }
            Some(result) => {
                for (modality, outcome) in &result.outcomes {
                    let (color, line) = match outcome {
                        ModalityOutcome::Copied { files } => {
                            (GREEN, format!("copied {files} file(s)"))
                        }
                        ModalityOutcome::AlreadyPresent => (GREEN, "already present".to_string()),
                        ModalityOutcome::NotRequested => (RESET, "not requested".to_string()),
                        ModalityOutcome::AbsentAtSource => (RESET, "absent at source".to_string()),
                        ModalityOutcome::SkippedConflict { paths } => (
                            YELLOW,
                            format!("kept destination, {} file(s) differ", paths.len()),
                        ),
                        ModalityOutcome::Failed { reason } => (RED, format!("failed: {reason}")),
                    };
                    println!("{color}  {:<9} {line}{RESET}", modality.as_str());
                }
            }
        }
    }

    pub fn print_session_list(list: &SessionList) {
        if list.sessions.is_empty() {
            println!("{YELLOW}no sessions in {}{RESET}", list.root);
        }
        for entry in &list.sessions {
            println!("{}  {}", entry.name, entry.path);
        }
    }

    pub fn print_subject_sessions(listing: &SubjectSessions) {
        for session in &listing.sessions {
            let flags = session
                .modalities()
                .iter()
                .map(|(modality, presence)| {
                    let mark = match presence {
                        Presence::Present => "+",
                        Presence::Absent => "-",
                        Presence::Invalid => "!",
                    };
                    format!("{mark}{modality}")
                })
                .collect::<Vec<_>>()
                .join(" ");
            println!("{}  {flags}", session.name());
        }
        for path in &listing.invalid {
            println!("{RED}not a session of {}: {path}{RESET}", listing.subject);
        }
        for name in &listing.duplicates {
            println!("{YELLOW}duplicate session name: {name}{RESET}");
        }
    }

    pub fn print_renames(report: &RenameReport) {
        if report.renames.is_empty() {
            println!("{GREEN}{} looks good, no renaming needed{RESET}", report.session_root);
            return;
        }
        for rename in &report.renames {
            let from = rename
                .from
                .strip_prefix(&report.session_root)
                .unwrap_or(rename.from.as_path());
            let to = rename
                .to
                .strip_prefix(&report.session_root)
                .unwrap_or(rename.to.as_path());
            println!("{from} -> {to}");
        }
    }

    pub fn print_sort(report: &SortReport) {
        for (recording, output) in &report.recordings {
            println!("{CYAN}{recording}{RESET}");
            for (probe, path) in &output.probe_outputs {
                println!("{GREEN}  {probe} -> {path}{RESET}");
            }
        }
    }

    pub fn print_convert(report: &ConvertReport) {
        println!(
            "{GREEN}{} converted to {}: {}{RESET}",
            report.session,
            report.target.as_str(),
            report.output
        );
    }

    pub fn print_config(report: &ConfigReport) {
        let config = &report.config;
        println!("local_root:   {}", config.local_root);
        println!("remote_root:  {}", config.remote_root);
        println!("ignored:      {}", config.ignored_subject_dirs.join(", "));
        println!(
            "whitelisted:  {}",
            config.rules.whitelisted_files_in_root.join(", ")
        );
        println!("extensions:   {}", config.rules.extra_extensions.join(", "));
        println!(
            "sorter:       {} ({})",
            config.sorter.program,
            report.tools.sorter.as_deref().unwrap_or("not found")
        );
        println!(
            "converter:    {} ({})",
            config.converter.program,
            report.tools.converter.as_deref().unwrap_or("not found")
        );
    }
}
