// src/main.rs
mod app;
mod cert;
mod config;
mod credential;
mod error;
mod kms;
mod utils;

use app::CredentialManager;
use clap::{Parser, Subcommand};
use config::ClusterConfig;
use error::AppError;
use std::{
    error::Error as _,
    path::{Path, PathBuf},
    process::ExitCode,
};
use tracing::{error, info};

#[derive(Parser)]
#[command(version, about = "Issue, encrypt and render Kubernetes cluster credentials")]
pub struct Args {
    #[arg(short, long, default_value = "cluster_config.json")]
    pub config: PathBuf,
    #[arg(short, long)]
    pub debug: bool,
    /// Append logs to this file instead of stderr
    #[arg(long)]
    pub log_file: Option<PathBuf>,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Issue the cluster PKI, tokens and encryption config into the assets directory
    Init {
        /// Reissue certificates that already exist
        #[arg(long)]
        force: bool,
    },
    /// Print the compacted credential set as JSON
    Render {
        /// Skip KMS even when a key is configured
        #[arg(long)]
        unencrypted: bool,
    },
    /// Check every certificate against the cluster CA
    Verify,
    /// Print the SHA-256 content fingerprint of a file
    Fingerprint { path: PathBuf },
}

fn main() -> ExitCode {
    let args = Args::parse();

    if let Err(e) = utils::logging::init(args.debug, args.log_file.as_deref()) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::FAILURE;
    }

    match run(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            let mut message = e.to_string();
            let mut source = e.source();
            while let Some(cause) = source {
                message.push_str(&format!(": {}", cause));
                source = cause.source();
            }
            error!("{}", message);
            // The subscriber writes to stderr unless a log file is set
            if args.log_file.is_some() {
                eprintln!("Error: {}", message);
            }
            ExitCode::FAILURE
        }
    }
}

fn load_manager(path: &Path) -> Result<CredentialManager, AppError> {
    let config = if path.exists() {
        ClusterConfig::load_from_file(path)?
    } else {
        info!("{} not found, writing default config", path.display());
        let config = ClusterConfig::default();
        config.save_to_file(path)?;
        config
    };
    CredentialManager::new(config)
}

fn run(args: &Args) -> Result<(), AppError> {
    match &args.command {
        Command::Fingerprint { path } => {
            println!("{}", app::fingerprint_file(path)?);
        }
        Command::Init { force } => {
            let report = load_manager(&args.config)?.init(*force)?;
            println!(
                "{}",
                serde_json::to_string_pretty(&report)
                    .map_err(|e| AppError::Output(e.into()))?
            );
        }
        Command::Render { unencrypted } => {
            let bundle = load_manager(&args.config)?.render(*unencrypted)?;
            println!(
                "{}",
                bundle.to_json().map_err(|e| AppError::Output(e.into()))?
            );
        }
        Command::Verify => {
            for result in load_manager(&args.config)?.verify()? {
                println!(
                    "{:<28} {}  expires {}  sha256:{}",
                    result.name,
                    result.summary.subject,
                    result.summary.not_after.format("%Y-%m-%d"),
                    result.summary.fingerprint
                );
            }
        }
    }
    Ok(())
}
