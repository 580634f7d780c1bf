use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use clap::{Args, Parser, Subcommand};
use daytodo::archive::archive_document;
use daytodo::config::Settings;
use daytodo::core::ScanOrigin;
use daytodo::document::{join_lines, split_lines};
use daytodo::reschedule::{RescheduleRequest, reschedule};
use daytodo::storage::{DocumentStore, FsStore};
use daytodo::toggle::toggle_at;
use daytodo::tree::{parse_section, sections};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "daytodo",
    about = "Day-partitioned todo lists: carry tasks forward, archive finished months",
    version
)]
struct Cli {
    /// Enable verbose logging for debugging.
    #[arg(long, global = true)]
    verbose: bool,
    /// Settings file. Defaults to .daytodo.toml next to the document.
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Move the nearest earlier day's unfinished tasks under today's header.
    Reschedule(RescheduleArgs),

    /// Move completed tasks of fully finished months into monthly archive files.
    Archive(ArchiveArgs),

    /// Cycle the status of one task line: [ ] -> [/] -> [x] -> [ ].
    Toggle(ToggleArgs),

    /// List the date sections of a document.
    Sections(SectionsArgs),
}

#[derive(Debug, Args)]
struct RescheduleArgs {
    /// Todo document to operate on.
    file: PathBuf,
    /// Date treated as today (YYYY-MM-DD). Defaults to the local date.
    #[arg(long)]
    today: Option<NaiveDate>,
    /// 1-based cursor line; a missing today section is created here.
    #[arg(long, default_value_t = 1)]
    cursor: usize,
    /// Only consider sections at or below the cursor.
    #[arg(long)]
    from_cursor: bool,
    /// Write the result back instead of printing a preview.
    #[arg(long)]
    write: bool,
    /// Emit JSON describing the move.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct ArchiveArgs {
    /// Todo document to operate on.
    file: PathBuf,
    /// Directory for archive-YYYY-MM.md files, overriding the settings.
    #[arg(long)]
    archive_dir: Option<PathBuf>,
    /// Emit JSON instead of a summary.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Args)]
struct ToggleArgs {
    /// Todo document to operate on.
    file: PathBuf,
    /// 1-based line to toggle.
    #[arg(long)]
    line: usize,
}

#[derive(Debug, Args)]
struct SectionsArgs {
    /// Todo document to inspect.
    file: PathBuf,
    /// Date highlighted as today (YYYY-MM-DD). Defaults to the local date.
    #[arg(long)]
    today: Option<NaiveDate>,
    /// Emit JSON instead of a table.
    #[arg(long)]
    json: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = cli.config.as_deref();
    match cli.command {
        Commands::Reschedule(args) => handle_reschedule(args, config),
        Commands::Archive(args) => handle_archive(args, config),
        Commands::Toggle(args) => handle_toggle(args),
        Commands::Sections(args) => handle_sections(args),
    }
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_settings(config: Option<&Path>, document: &Path) -> Result<Settings> {
    let settings = match config {
        Some(path) => Settings::load(path),
        None => Settings::discover(document),
    };
    settings.context("loading settings")
}

/// No document means no active context; report it and succeed.
fn active_document(path: &Path) -> bool {
    if FsStore.exists(path) {
        return true;
    }
    eprintln!("No active todo document at {:?}; nothing to do.", path);
    false
}

fn handle_reschedule(args: RescheduleArgs, config: Option<&Path>) -> Result<()> {
    let RescheduleArgs {
        file,
        today,
        cursor,
        from_cursor,
        write,
        json,
    } = args;

    if !active_document(&file) {
        return Ok(());
    }
    let settings = load_settings(config, &file)?;
    let text = FsStore
        .read(&file)
        .with_context(|| format!("reading {:?}", file))?;

    let cursor_line = cursor.saturating_sub(1);
    let origin = if from_cursor {
        ScanOrigin::Line(cursor_line)
    } else {
        settings.scan_origin(cursor_line)
    };
    let request = RescheduleRequest {
        today: today.unwrap_or_else(|| Local::now().date_naive()),
        cursor_line,
        origin,
        weekday_label: settings.weekday_label,
    };
    let outcome = reschedule(&text, &request);

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome)?);
    }
    if !outcome.found {
        eprintln!("No unfinished tasks found to reschedule.");
        return Ok(());
    }

    if write || !settings.preview {
        FsStore
            .write(&file, &outcome.preview_text)
            .with_context(|| format!("writing {:?}", file))?;
        eprintln!(
            "Moved {} line(s) from {} to {}; cursor at line {}.",
            outcome.moved.len(),
            outcome.source_date.as_deref().unwrap_or("?"),
            request.today,
            outcome.anchor_line + 1
        );
    } else if !json {
        println!("{}", outcome.preview_text);
    }
    Ok(())
}

fn handle_archive(args: ArchiveArgs, config: Option<&Path>) -> Result<()> {
    let ArchiveArgs {
        file,
        archive_dir,
        json,
    } = args;

    if !active_document(&file) {
        return Ok(());
    }
    let settings = load_settings(config, &file)?;
    let archive_root = archive_dir.unwrap_or_else(|| settings.archive_root(&file));

    let run = archive_document(&FsStore, &file, &archive_root)
        .with_context(|| format!("archiving {:?}", file))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&run)?);
        return Ok(());
    }

    if run.months.is_empty() {
        eprintln!("No dated sections found.");
        return Ok(());
    }
    for report in &run.months {
        let status = if run.archived.contains(&report.month) {
            format!("archived {} task(s)", report.completed.len())
        } else if run.failed.contains(&report.month) {
            "archive write failed".to_string()
        } else if report.archivable {
            "nothing to archive".to_string()
        } else {
            format!("skipped, {} unfinished", report.unfinished)
        };
        println!("{} {}", report.month, status);
    }
    if !run.failed.is_empty() {
        anyhow::bail!("{} month(s) could not be archived", run.failed.len());
    }
    Ok(())
}

fn handle_toggle(args: ToggleArgs) -> Result<()> {
    let ToggleArgs { file, line } = args;

    if !active_document(&file) {
        return Ok(());
    }
    if line == 0 {
        anyhow::bail!("--line is 1-based");
    }
    let text = FsStore
        .read(&file)
        .with_context(|| format!("reading {:?}", file))?;
    let mut lines = split_lines(&text);
    let toggled = toggle_at(&mut lines, line - 1)?;
    FsStore
        .write(&file, &join_lines(&lines))
        .with_context(|| format!("writing {:?}", file))?;
    eprintln!(
        "Line {}: {} -> {}",
        line,
        toggled.from.map(|s| s.label()).unwrap_or("unknown"),
        toggled.to.label()
    );
    println!("{}", toggled.line);
    Ok(())
}

#[derive(Debug, serde::Serialize)]
struct SectionSummary {
    date: String,
    line: usize,
    tasks: usize,
    unfinished_leaves: usize,
    today: bool,
}

fn summarize(text: &str, today: &str) -> Vec<SectionSummary> {
    let lines = split_lines(text);
    sections(&lines)
        .iter()
        .map(|section| {
            let tree = parse_section(&lines, section);
            SectionSummary {
                date: section.date.clone(),
                line: section.header + 1,
                tasks: tree.nodes.len(),
                unfinished_leaves: tree.unfinished_leaves().count(),
                today: section.date == today,
            }
        })
        .collect()
}

fn handle_sections(args: SectionsArgs) -> Result<()> {
    let SectionsArgs { file, today, json } = args;

    if !active_document(&file) {
        return Ok(());
    }
    let text = FsStore
        .read(&file)
        .with_context(|| format!("reading {:?}", file))?;
    let today = today
        .unwrap_or_else(|| Local::now().date_naive())
        .format("%Y-%m-%d")
        .to_string();
    let summary = summarize(&text, &today);

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }
    for s in summary {
        let marker = if s.today { "*" } else { " " };
        println!(
            "{} {} line {:<5} {:>3} task(s) {:>3} open leaf(s)",
            marker, s.date, s.line, s.tasks, s.unfinished_leaves
        );
    }
    Ok(())
}
