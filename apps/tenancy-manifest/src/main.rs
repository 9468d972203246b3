//! Tenancy manifest inspector.
//!
//! # Usage
//!
//! ```bash
//! # Coverage table of every model linked into the platform
//! tenancy-manifest list
//!
//! # CI gate: fail unless these models are tenant-scoped
//! tenancy-manifest check --require-scoped WorkOrder --require-scoped Invoice
//!
//! # Effective runtime configuration
//! tenancy-manifest config --config config/tenancy.yaml
//! ```

// CLI tools are expected to print to stdout/stderr
#![allow(clippy::print_stdout, clippy::print_stderr)]

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use tenancy_db::{Coverage, ModelDescriptor, ScopedModelSet, TenancyConfig};
use tracing_subscriber::EnvFilter;

// Linking the models crate is what registers its declarations.
use field_service_models as _;

#[derive(Parser, Debug)]
#[command(name = "tenancy-manifest")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Log verbosity level (-v info, -vv debug, -vvv trace); `RUST_LOG` takes precedence
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List every model with its scoping decision
    List {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Exit non-zero unless every named model is tenant-scoped
    Check {
        #[arg(long = "require-scoped", value_name = "MODEL", required = true)]
        require_scoped: Vec<String>,
    },
    /// Print the effective tenancy configuration as JSON
    Config {
        /// YAML file layered over the defaults
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match run(cli.command) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{} {err:#}", "error:".red().bold());
            ExitCode::FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn run(command: Command) -> Result<ExitCode> {
    match command {
        Command::List { json } => {
            let manifest = ScopedModelSet::global().context("failed to build tenancy manifest")?;
            tracing::debug!(models = manifest.len(), scoped = manifest.scoped().count(), "manifest loaded");
            if json {
                print_json(manifest)?;
            } else {
                print_table(manifest);
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Check { require_scoped } => {
            let manifest = ScopedModelSet::global().context("failed to build tenancy manifest")?;
            let failures = check(manifest, &require_scoped);
            tracing::info!(
                required = require_scoped.len(),
                failed = failures.len(),
                "coverage check finished"
            );
            for (model, reason) in &failures {
                println!("{} {model}: {reason}", "FAIL".red().bold());
            }
            if failures.is_empty() {
                println!(
                    "{} {} model(s) tenant-scoped",
                    "OK".green().bold(),
                    require_scoped.len()
                );
                Ok(ExitCode::SUCCESS)
            } else {
                Ok(ExitCode::FAILURE)
            }
        }
        Command::Config { config } => {
            tracing::debug!(path = ?config, "loading tenancy config");
            let config = TenancyConfig::load(config.as_deref()).context("failed to load tenancy config")?;
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(ExitCode::SUCCESS)
        }
    }
}

/// Models from `required` that are not tenant-scoped, with the reason.
fn check<'a>(manifest: &ScopedModelSet, required: &'a [String]) -> Vec<(&'a str, &'static str)> {
    required
        .iter()
        .filter_map(|model| match manifest.coverage(model) {
            Coverage::Scoped(_) => None,
            Coverage::Unrestricted(_) => Some((model.as_str(), "declared unrestricted")),
            Coverage::Unknown => Some((model.as_str(), "not in the manifest")),
        })
        .inspect(|(model, reason)| tracing::debug!(model, reason, "model is not tenant-scoped"))
        .collect()
}

#[derive(Serialize)]
struct Listing<'a> {
    models: usize,
    scoped: usize,
    entries: Vec<&'a ModelDescriptor>,
}

fn print_json(manifest: &ScopedModelSet) -> Result<()> {
    let listing = Listing {
        models: manifest.len(),
        scoped: manifest.scoped().count(),
        entries: manifest.iter().collect(),
    };
    println!("{}", serde_json::to_string_pretty(&listing)?);
    Ok(())
}

fn print_table(manifest: &ScopedModelSet) {
    println!("{:<20} {:<14} {:<14} {}", "MODEL".bold(), "SCOPING".bold(), "TENANT FIELD".bold(), "PK".bold());
    for descriptor in manifest.iter() {
        let (scoping, field) = match descriptor.tenant_field() {
            Some(field) => ("tenant".green(), field),
            None => ("unrestricted".yellow(), "-"),
        };
        println!("{:<20} {:<14} {:<14} {}", descriptor.name, scoping, field, descriptor.primary_key);
    }
    println!();
    println!(
        "{} models, {} tenant-scoped",
        manifest.len(),
        manifest.scoped().count()
    );
}
