//! CLI for the pansync transfer and folder sync engine.

mod commands;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pansync_core::config::{self, AccountConfig, PanSyncConfig};
use pansync_core::transfer_db::TransferDb;
use std::path::PathBuf;

use commands::{run_digest, run_download, run_status, run_sync, run_upload};

#[derive(Debug, Parser)]
#[command(name = "pansync")]
#[command(about = "pansync: resumable chunked transfers and folder sync for remote disks", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Upload one local file to a remote path.
    Upload {
        local: PathBuf,
        remote: String,
        /// Encryption key (at most 32 bytes).
        #[arg(long)]
        key: Option<String>,
        /// Ignore any recorded attempt and start over.
        #[arg(long)]
        restart: bool,
        /// Account to use (default: the first configured).
        #[arg(long)]
        account: Option<String>,
    },

    /// Download one remote file to a local path.
    Download {
        remote: String,
        local: PathBuf,
        /// Decryption key the file was uploaded with.
        #[arg(long)]
        key: Option<String>,
        /// Skip re-reading the finished file to compare digests.
        #[arg(long)]
        no_verify: bool,
        /// Ignore any recorded attempt and start over.
        #[arg(long)]
        restart: bool,
        #[arg(long)]
        account: Option<String>,
    },

    /// Run the folder schedulers of an account.
    Sync {
        #[arg(long)]
        account: Option<String>,
        /// One pass per folder, drain the queues, then exit.
        #[arg(long)]
        once: bool,
    },

    /// Show recorded transfers.
    Status,

    /// Print a file's content digest and its middle fragment.
    Digest { path: PathBuf },
}

fn account<'a>(cfg: &'a PanSyncConfig, name: Option<&str>) -> Result<&'a AccountConfig> {
    cfg.account(name).with_context(|| match name {
        Some(n) => format!("no account named {n:?} in {}", config_path_display()),
        None => format!("no account configured in {}", config_path_display()),
    })
}

fn config_path_display() -> String {
    config::config_path()
        .map(|p| p.display().to_string())
        .unwrap_or_else(|_| "config.toml".to_string())
}

impl CliCommand {
    pub async fn run_from_args() -> Result<()> {
        let cli = Cli::parse();

        if let CliCommand::Digest { path } = &cli.command {
            return run_digest(path).await;
        }

        let cfg = config::load_or_init()?;
        tracing::debug!("loaded config: {:?}", cfg);
        let db = TransferDb::open_default().await?;
        let recovered = db.recover_running().await?;
        if recovered > 0 {
            tracing::info!("marked {} interrupted transfer(s) stopped", recovered);
        }

        match cli.command {
            CliCommand::Upload {
                local,
                remote,
                key,
                restart,
                account: name,
            } => {
                let acct = account(&cfg, name.as_deref())?;
                run_upload(&db, &cfg, acct, &local, &remote, key.as_deref(), restart).await?
            }
            CliCommand::Download {
                remote,
                local,
                key,
                no_verify,
                restart,
                account: name,
            } => {
                let acct = account(&cfg, name.as_deref())?;
                let verify = !no_verify;
                run_download(&db, &cfg, acct, &remote, &local, key.as_deref(), verify, restart)
                    .await?
            }
            CliCommand::Sync {
                account: name,
                once,
            } => {
                let acct = account(&cfg, name.as_deref())?;
                run_sync(&cfg, acct, once).await?
            }
            CliCommand::Status => run_status(&db).await?,
            CliCommand::Digest { .. } => {}
        }

        Ok(())
    }
}
