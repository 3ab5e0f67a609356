//! `spdx-notice`: normalize an SPDX SBOM into a canonical, license-resolved document.
//!
//! # Flow
//! 1. Parse CLI arguments ([`cli`]).
//! 2. Load config ([`config::load_config`]).
//! 3. Pick the adapter by extension ([`detector`]) and read raw records ([`source`]).
//! 4. Resolve every license through the SPDX license list ([`registry`]) into a
//!    [`models::Document`] ([`normalize`]).
//! 5. Render the requested report ([`report`]).
//!
//! Any error aborts the run with a non-zero exit; nothing is retried.

mod cli;
mod config;
mod detector;
mod error;
mod license;
mod models;
mod normalize;
mod registry;
mod report;
mod source;

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use tracing_subscriber::EnvFilter;

use cli::{Cli, ReportFormat};
use config::load_config;
use registry::spdx::SpdxRegistry;
use report::json::JsonGenerator;
use report::NoticeGenerator;

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose);

    let config = load_config(Path::new("."), cli.config.as_deref())?;

    let mut records = source::read_source(&cli.input)
        .with_context(|| format!("reading {}", cli.input.display()))?;
    if let Some(url) = &cli.source_url {
        records.metadata.creation_info.source_download_url = Some(url.clone());
    }

    if !cli.quiet {
        eprintln!(
            "  {} {} packages, {} files, {} extracted licenses",
            "→".cyan(),
            records.packages.len(),
            records.files.len(),
            records.extracted_licenses.len()
        );
    }

    let mut registry = SpdxRegistry::new(&config.registry)?;

    let spinner = if !cli.quiet {
        let pb = ProgressBar::new_spinner();
        pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
        pb.set_message("Resolving licenses");
        pb.enable_steady_tick(Duration::from_millis(100));
        Some(pb)
    } else {
        None
    };

    let result = normalize::normalize(records, &mut registry);

    if let Some(pb) = spinner {
        pb.finish_and_clear();
    }
    let document = result?;

    match cli.report {
        ReportFormat::Terminal => {
            report::terminal::render(&document, &cli.input, cli.verbose, cli.quiet)?;
        }
        ReportFormat::Json => {
            let output_dir = cli
                .output_dir
                .clone()
                .unwrap_or_else(|| config.output.directory.clone());
            let path = JsonGenerator::new(output_dir).generate(&document)?;
            if !cli.quiet {
                eprintln!("  {} wrote {}", "✓".green(), path.display());
            }
        }
    }

    Ok(())
}

/// `RUST_LOG` wins; otherwise `--verbose` selects debug and the default is warn.
fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("spdx_notice={}", default_level)));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}
