//! `pansync upload` / `pansync download` – run one transfer task.
//!
//! The task runs on its own tokio task while this loop prints progress,
//! persists the done-slice bitmap, and turns Ctrl-C into a graceful stop.
//! A stopped or failed row for the same paths is picked up where it left
//! off unless `--restart` is given.

use anyhow::{bail, Result};
use pansync_core::config::{AccountConfig, PanSyncConfig};
use pansync_core::remote::{DirRemote, RemoteDisk, UploadEndpointCache};
use pansync_core::scheduler::ProgressStats;
use pansync_core::step::StepStatus;
use pansync_core::task::{DownloadTask, Transfer, TransferKind, TransferOptions, UploadTask};
use pansync_core::transfer_db::{
    NewTransfer, TransferDb, TransferId, TransferProgress, TransferRecord, TransferState,
};
use std::path::Path;
use std::sync::Arc;
use std::time::{Duration, Instant};

const PROGRESS_INTERVAL: Duration = Duration::from_millis(500);

fn remote_for(account: &AccountConfig) -> Arc<dyn RemoteDisk> {
    Arc::new(DirRemote::new(account.remote_root.clone()))
}

/// Stopped or failed row to pick up, unless the caller asked for a fresh start.
async fn previous_attempt(
    db: &TransferDb,
    kind: TransferKind,
    local: &Path,
    remote_path: &str,
    restart: bool,
) -> Result<Option<TransferRecord>> {
    if restart {
        return Ok(None);
    }
    let found = db.find_resumable(kind, local, remote_path).await?;
    if let Some(rec) = &found {
        tracing::info!(
            id = rec.id,
            done = rec.slices_done(),
            slices = rec.slice_count,
            "resuming recorded transfer"
        );
    }
    Ok(found)
}

#[allow(clippy::too_many_arguments)]
pub async fn run_upload(
    db: &TransferDb,
    cfg: &PanSyncConfig,
    account: &AccountConfig,
    local: &Path,
    remote_path: &str,
    key: Option<&str>,
    restart: bool,
) -> Result<()> {
    let endpoints = Arc::new(UploadEndpointCache::with_system_clock(cfg.upload_endpoint_ttl()));
    let mut task = UploadTask::new(
        remote_for(account),
        endpoints,
        local,
        remote_path,
        key,
        TransferOptions::from_config(cfg),
    )?;
    let previous = previous_attempt(db, TransferKind::Upload, local, remote_path, restart).await?;
    if let Some(rec) = &previous {
        task = task.resume_from(rec.resume_point());
    }
    let task = Arc::new(task);
    let row = previous.map(|rec| rec.id);
    drive(db, task.clone(), TransferKind::Upload, local, remote_path, row).await?;
    if let Some(digest) = task.content_digest() {
        println!("uploaded {} -> {} (md5 {})", local.display(), remote_path, digest);
    }
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn run_download(
    db: &TransferDb,
    cfg: &PanSyncConfig,
    account: &AccountConfig,
    remote_path: &str,
    local: &Path,
    key: Option<&str>,
    verify: bool,
    restart: bool,
) -> Result<()> {
    let opts = TransferOptions {
        verify,
        ..TransferOptions::from_config(cfg)
    };
    let mut task = DownloadTask::new(remote_for(account), remote_path, local, key, opts)?;
    let previous = previous_attempt(db, TransferKind::Download, local, remote_path, restart).await?;
    if let Some(rec) = &previous {
        task = task.resume_from(rec.resume_point());
    }
    let task = Arc::new(task);
    let row = previous.map(|rec| rec.id);
    drive(db, task, TransferKind::Download, local, remote_path, row).await?;
    println!("downloaded {} -> {}", remote_path, local.display());
    Ok(())
}

fn print_progress(stats: &ProgressStats) {
    let done_mib = stats.bytes_done as f64 / 1_048_576.0;
    let total_mib = stats.total_bytes as f64 / 1_048_576.0;
    let eta = stats
        .eta_secs()
        .map(|s| format!("{:.0}s", s))
        .unwrap_or_else(|| "?".to_string());
    println!(
        "\r  {:.1} / {:.1} MiB ({:.1}%)  slices {}/{}  {:.2} MiB/s  ETA {}  ",
        done_mib,
        total_mib,
        stats.fraction() * 100.0,
        stats.slices_done,
        stats.slice_count,
        stats.bytes_per_sec() / 1_048_576.0,
        eta
    );
}

async fn drive<T>(
    db: &TransferDb,
    task: Arc<T>,
    kind: TransferKind,
    local: &Path,
    remote_path: &str,
    row: Option<TransferId>,
) -> Result<()>
where
    T: Transfer + 'static,
{
    let id = match row {
        Some(id) => {
            db.set_state(id, TransferState::Running, None).await?;
            id
        }
        None => {
            db.record_transfer(&NewTransfer {
                kind,
                local: local.to_path_buf(),
                remote: remote_path.to_string(),
            })
            .await?
        }
    };

    let started = Instant::now();
    let runner = task.clone();
    let mut handle = tokio::spawn(async move { runner.run().await });
    let mut tick = tokio::time::interval(PROGRESS_INTERVAL);
    let mut stopping = false;

    let result = loop {
        tokio::select! {
            joined = &mut handle => break joined?,
            _ = tick.tick() => {
                print_progress(&ProgressStats::from_info(&task.info(), started.elapsed()));
                db.update_progress(id, &TransferProgress::from(task.resume_point())).await?;
            }
            signal = tokio::signal::ctrl_c(), if !stopping => {
                signal?;
                stopping = true;
                eprintln!("stopping after in-flight slices...");
                tracing::info!(id, "ctrl-c, stopping transfer");
                let stopper = task.clone();
                tokio::spawn(async move { stopper.stop().await });
            }
        }
    };
    println!();
    db.update_progress(id, &TransferProgress::from(task.resume_point())).await?;

    match result {
        Ok(StepStatus::Finished) => {
            db.set_state(id, TransferState::Finished, None).await?;
            Ok(())
        }
        Ok(status) => {
            db.set_state(id, TransferState::Stopped, None).await?;
            bail!("transfer {} ({})", status.as_str(), remote_path)
        }
        Err(err) => {
            let msg = err.to_string();
            db.set_state(id, TransferState::Error, Some(&msg)).await?;
            Err(err.into())
        }
    }
}
