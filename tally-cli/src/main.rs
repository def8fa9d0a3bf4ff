//! # tally
//!
//! Runs JSON print jobs through a printer session.
//!
//! ## Usage
//!
//! ```bash
//! # Print through the connector configured in PRINTER_* / the job file
//! tally job.json
//!
//! # Render to a file instead
//! tally job.json --out receipt.bin
//!
//! # Send to a network printer asynchronously
//! tally job.json --send 192.168.1.100:9100 --profile tm-u220
//! ```

mod job;
mod logger;

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tally_printer::{NetworkSpooler, PrinterSession, SessionConfig, Spooler};

use crate::job::Job;

/// tally - ESC/POS job runner
#[derive(Parser, Debug)]
#[command(name = "tally")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Job file (JSON)
    #[arg(value_name = "JOB")]
    job: PathBuf,

    /// Write the encoded bytes to this file
    #[arg(long, value_name = "FILE")]
    out: Option<PathBuf>,

    /// Deliver the encoded bytes to a raw TCP printer
    #[arg(long, value_name = "HOST:PORT")]
    send: Option<String>,

    /// Override the capability profile
    #[arg(long)]
    profile: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    let level = std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".into());
    let json = logger::wants_json(std::env::var("LOG_FORMAT").ok().as_deref());
    logger::init_logger(&level, json)?;

    let cli = Cli::parse();
    let job = Job::load(&cli.job)?;

    let mut config = match job.config.clone() {
        Some(config) => config,
        None => SessionConfig::from_env().context("loading PRINTER_* configuration")?,
    };
    if let Some(profile) = &cli.profile {
        config.profile = profile.clone();
    }
    config.validate()?;

    if discards_output(&cli, &config) {
        tracing::warn!(
            "connector is \"dummy\" and neither --out nor --send was given; \
             the job is rendered but not printed"
        );
    }

    // With --out or --send the bytes are delivered here, not by a connector
    let session = if has_destination(&cli) {
        PrinterSession::buffered(config.load_profile()?, config.session_options()?)?
    } else {
        PrinterSession::from_config(&config)?
    };

    tracing::info!(
        job = %cli.job.display(),
        profile = %config.profile,
        steps = job.steps.len(),
        "running job"
    );
    let bytes = job::run(&job.steps, session)?;

    if let Some(path) = &cli.out {
        std::fs::write(path, &bytes).with_context(|| format!("writing {}", path.display()))?;
        tracing::info!(path = %path.display(), bytes = bytes.len(), "job written");
    }
    if let Some(addr) = &cli.send {
        NetworkSpooler::from_addr(addr)?.send(&bytes).await?;
    }

    Ok(())
}

fn has_destination(cli: &Cli) -> bool {
    cli.out.is_some() || cli.send.is_some()
}

/// Nothing leaves the process: no CLI destination and the dummy connector
fn discards_output(cli: &Cli, config: &SessionConfig) -> bool {
    !has_destination(cli) && config.connector.kind.eq_ignore_ascii_case("dummy")
}
