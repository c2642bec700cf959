//! traffic-spy - record and report client-side traffic telemetry
//!
//! This tool provides commands for:
//! - Registering sources with their root URL
//! - Ingesting telemetry payloads (inline JSON or JSON-lines files)
//! - Reporting per-source summaries and per-URL details
//!
//! Uses XDG Base Directory specification for file locations:
//! - Database: $XDG_DATA_HOME/traffic-spy/events.db (~/.local/share/traffic-spy/events.db)
//! - Logs: $XDG_STATE_HOME/traffic-spy/traffic-spy.log
//! - Config: $XDG_CONFIG_HOME/traffic-spy/config.toml (~/.config/traffic-spy/config.toml)

mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use std::io::{BufRead, BufReader};
use std::path::PathBuf;
use std::process::ExitCode;
use traffic_spy_core::{Config, Database, Error, ErrorKind, TrafficSpy};

use crate::output::Format;

#[derive(Parser)]
#[command(name = "traffic-spy")]
#[command(about = "Record and report client-side traffic telemetry")]
#[command(version)]
struct Args {
    /// Database file (default: from config, then XDG data dir)
    #[arg(long, global = true)]
    database: Option<PathBuf>,

    /// Output format
    #[arg(short, long, global = true, value_enum, default_value_t = OutputFormat::Text)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Register a new source
    Register {
        /// Unique source identifier
        identifier: String,
        /// Root URL other URLs resolve against
        root_url: String,
    },

    /// Ingest telemetry payloads for a source
    Ingest {
        /// Source identifier
        identifier: String,

        /// A single JSON payload
        #[arg(short, long, conflicts_with = "file", required_unless_present = "file")]
        payload: Option<String>,

        /// File with one JSON payload per line
        #[arg(long)]
        file: Option<PathBuf>,
    },

    /// Summarize all traffic for a source
    Summary {
        /// Source identifier
        identifier: String,
    },

    /// Show statistics for one URL of a source
    Url {
        /// Source identifier
        identifier: String,
        /// Absolute URL or path below the root URL
        path: String,
    },

    /// List registered sources
    Sources,
}

/// Exit code for client errors (bad payload, duplicate source, unknown source on ingest)
const EXIT_CLIENT_ERROR: u8 = 2;

fn main() -> ExitCode {
    let args = Args::parse();

    match run(args) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {:#}", err);
            exit_code_for(&err)
        }
    }
}

fn run(args: Args) -> Result<ExitCode> {
    let config = Config::load().context("failed to load configuration")?;

    let _log_guard = traffic_spy_core::logging::init(&config.logging)
        .context("failed to initialize logging")?;

    let db_path = args
        .database
        .clone()
        .unwrap_or_else(|| config.storage.database_path());
    tracing::info!(path = %db_path.display(), "Opening database");

    let db = Database::open_with(&db_path, &config.storage).context("failed to open database")?;
    db.migrate().context("failed to run database migrations")?;

    let spy = TrafficSpy::new(db);
    let format = match args.format {
        OutputFormat::Text => Format::Text,
        OutputFormat::Json => Format::Json,
    };

    match args.command {
        Command::Register {
            identifier,
            root_url,
        } => cmd_register(&spy, format, &identifier, &root_url),
        Command::Ingest {
            identifier,
            payload,
            file,
        } => cmd_ingest(&spy, format, &identifier, payload, file),
        Command::Summary { identifier } => cmd_summary(&spy, format, &identifier),
        Command::Url { identifier, path } => cmd_url(&spy, format, &identifier, &path),
        Command::Sources => cmd_sources(&spy, format),
    }
}

fn cmd_register(spy: &TrafficSpy, format: Format, identifier: &str, root_url: &str) -> Result<ExitCode> {
    let source = spy
        .register_source(identifier, root_url)
        .with_context(|| format!("failed to register source '{}'", identifier))?;
    output::print_registered(format, &source);
    Ok(ExitCode::SUCCESS)
}

fn cmd_ingest(
    spy: &TrafficSpy,
    format: Format,
    identifier: &str,
    payload: Option<String>,
    file: Option<PathBuf>,
) -> Result<ExitCode> {
    if let Some(raw) = payload {
        let outcome = spy
            .ingest_str(identifier, &raw)
            .context("payload rejected")?;
        output::print_ingested(format, &outcome);
        return Ok(ExitCode::SUCCESS);
    }

    let Some(path) = file else {
        anyhow::bail!("either --payload or --file is required");
    };
    let reader = BufReader::new(
        std::fs::File::open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?,
    );

    let mut report = output::BatchReport::default();
    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }

        match spy.ingest_str(identifier, &line) {
            Ok(_) => report.accepted += 1,
            Err(err) if err.kind() == ErrorKind::Client => {
                report.rejected.push((index + 1, err.to_string()));
            }
            // Unknown source and storage failures stop the batch
            Err(err) => return Err(err).context("ingest aborted"),
        }
    }

    output::print_batch(format, &report);
    if report.rejected.is_empty() {
        Ok(ExitCode::SUCCESS)
    } else {
        Ok(ExitCode::from(EXIT_CLIENT_ERROR))
    }
}

fn cmd_summary(spy: &TrafficSpy, format: Format, identifier: &str) -> Result<ExitCode> {
    match spy.source_summary(identifier) {
        Ok(summary) => output::print_summary(format, &summary),
        Err(err) if err.kind() == ErrorKind::NotFound => output::print_not_found(format, &err),
        Err(err) => return Err(err).context("failed to compute summary"),
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_url(spy: &TrafficSpy, format: Format, identifier: &str, path: &str) -> Result<ExitCode> {
    match spy.url_detail(identifier, path) {
        Ok(detail) => output::print_url_detail(format, &detail),
        Err(err) if err.kind() == ErrorKind::NotFound => output::print_not_found(format, &err),
        Err(err) => return Err(err).context("failed to compute URL detail"),
    }
    Ok(ExitCode::SUCCESS)
}

fn cmd_sources(spy: &TrafficSpy, format: Format) -> Result<ExitCode> {
    let db = spy.database();
    let mut rows = Vec::new();
    for source in db.list_sources()? {
        let root = db
            .get_url(source.root_url_id)?
            .map(|u| u.url)
            .unwrap_or_default();
        let events = db.count_events(&source.identifier)?;
        rows.push((source, root, events));
    }
    output::print_sources(format, &rows);
    Ok(ExitCode::SUCCESS)
}

/// Client-side failures exit with 2, everything else with 1.
fn exit_code_for(err: &anyhow::Error) -> ExitCode {
    let client_error = err
        .chain()
        .filter_map(|cause| cause.downcast_ref::<Error>())
        .any(|e| e.kind() != ErrorKind::Server);

    if client_error {
        ExitCode::from(EXIT_CLIENT_ERROR)
    } else {
        ExitCode::FAILURE
    }
}
