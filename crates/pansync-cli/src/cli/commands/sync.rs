//! `pansync sync` – run an account's folder schedulers.

use anyhow::Result;
use pansync_core::config::{AccountConfig, PanSyncConfig};
use pansync_core::remote::{DirRemote, RemoteDisk};
use pansync_core::scheduler::{AccountManager, AccountSettings};
use std::sync::Arc;

pub async fn run_sync(cfg: &PanSyncConfig, account: &AccountConfig, once: bool) -> Result<()> {
    let remote: Arc<dyn RemoteDisk> = Arc::new(DirRemote::new(account.remote_root.clone()));
    let settings = AccountSettings {
        triggers: !once,
        ..AccountSettings::from_config(cfg)
    };
    let manager = AccountManager::spawn(account, remote, settings)?;
    manager.sync_now(None);

    if once {
        tokio::select! {
            _ = manager.wait_idle() => {}
            signal = tokio::signal::ctrl_c() => signal?,
        }
    } else {
        println!(
            "syncing {} folder(s) of account {}; Ctrl-C to stop",
            account.folders.len(),
            account.name
        );
        tokio::signal::ctrl_c().await?;
    }

    let snap = manager.snapshot().await;
    manager.shutdown().await;

    for (folder, report) in &snap.reports {
        println!(
            "{folder}: {} upload(s), {} download(s) queued; created {} local / {} remote; deleted {} local / {} remote",
            report.uploads_queued,
            report.downloads_queued,
            report.local_created,
            report.remote_created,
            report.local_deleted,
            report.remote_deleted
        );
    }
    println!("{} transfer(s) completed, {} failed", snap.completed, snap.failed.len());
    for failed in &snap.failed {
        println!("  failed {}: {}", failed.item.remote, failed.error);
    }
    Ok(())
}
