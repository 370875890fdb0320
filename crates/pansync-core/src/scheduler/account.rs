//! Account manager: one control task per remote account.
//!
//! The control task owns every folder queue pull, the running and failed task
//! lists, and the task budget. Sync passes and transfer tasks run as spawned
//! tasks and report back over an event channel, so queue state is only ever
//! mutated from the control loop.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use super::caps::TaskBudget;
use super::listing::ListingQueue;
use super::trigger::{spawn_trigger, FolderTrigger, TriggerAction};
use crate::config::{AccountConfig, PanSyncConfig};
use crate::remote::{RemoteDisk, UploadEndpointCache};
use crate::step::StepStatus;
use crate::sync::{Folder, QueuedTransfer, SyncReport};
use crate::task::{
    DownloadTask, Transfer, TransferInfo, TransferKind, TransferOptions, UploadTask,
};

/// Engine knobs an account manager runs with.
#[derive(Debug, Clone)]
pub struct AccountSettings {
    pub transfer: TransferOptions,
    pub max_running_tasks: usize,
    pub max_failed_tasks: usize,
    pub listing_interval: Duration,
    pub upload_endpoint_ttl: Duration,
    /// Arm the folders' cron triggers.
    pub triggers: bool,
}

impl AccountSettings {
    pub fn from_config(cfg: &PanSyncConfig) -> Self {
        Self {
            transfer: TransferOptions::from_config(cfg),
            max_running_tasks: cfg.max_running_tasks,
            max_failed_tasks: cfg.max_failed_tasks,
            listing_interval: cfg.listing_interval(),
            upload_endpoint_ttl: cfg.upload_endpoint_ttl(),
            triggers: true,
        }
    }
}

/// A task that ended with an error and awaits retry or removal.
#[derive(Debug, Clone)]
pub struct FailedTransfer {
    pub item: QueuedTransfer,
    pub error: String,
}

/// Point-in-time view of an account.
#[derive(Debug, Clone, Default)]
pub struct AccountSnapshot {
    pub running: Vec<TransferInfo>,
    pub failed: Vec<FailedTransfer>,
    /// Transfers still waiting in folder queues.
    pub queued: usize,
    pub completed: usize,
    /// Sync passes in progress.
    pub syncing: usize,
    /// Last report per folder id.
    pub reports: HashMap<String, SyncReport>,
}

enum Command {
    SyncNow {
        folder: Option<String>,
    },
    StopFolder {
        folder: String,
    },
    RemoveFolder {
        folder: String,
    },
    RetryFailed,
    ClearFailed,
    Snapshot {
        reply: oneshot::Sender<AccountSnapshot>,
    },
    WaitIdle {
        reply: oneshot::Sender<()>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

enum Event {
    SyncDone {
        folder: String,
        result: std::result::Result<Option<SyncReport>, String>,
    },
    TaskFinished {
        id: u64,
        result: std::result::Result<StepStatus, String>,
    },
}

struct RunningTask {
    item: QueuedTransfer,
    task: Arc<dyn Transfer>,
}

struct FailedTask {
    item: QueuedTransfer,
    error: String,
    /// `None` when the task could not even be built.
    task: Option<Arc<dyn Transfer>>,
}

/// Handle to an account's control task.
#[derive(Clone)]
pub struct AccountManager {
    name: String,
    tx: mpsc::UnboundedSender<Command>,
}

impl AccountManager {
    /// Build the folders and start the control task. Fails on an invalid
    /// folder trigger.
    pub fn spawn(
        account: &AccountConfig,
        remote: Arc<dyn RemoteDisk>,
        settings: AccountSettings,
    ) -> Result<Self> {
        let mut folders = Vec::new();
        let mut triggers = Vec::new();
        for cfg in &account.folders {
            if let Some(trigger) = &cfg.trigger {
                let trigger = FolderTrigger::from_config(trigger)
                    .with_context(|| format!("folder {} trigger", cfg.id))?;
                triggers.push((cfg.id.clone(), trigger));
            }
            folders.push(Arc::new(Folder::from_config(cfg)));
        }

        let (tx, commands) = mpsc::unbounded_channel();
        let (events_tx, events) = mpsc::unbounded_channel();
        let (fire_tx, fires) = mpsc::unbounded_channel();
        let trigger_tasks = if settings.triggers {
            triggers
                .into_iter()
                .map(|(id, trigger)| (id.clone(), spawn_trigger(id, trigger, fire_tx.clone())))
                .collect()
        } else {
            Vec::new()
        };

        let control = Control {
            name: account.name.clone(),
            listing: ListingQueue::spawn(remote.clone(), settings.listing_interval),
            endpoints: Arc::new(UploadEndpointCache::with_system_clock(
                settings.upload_endpoint_ttl,
            )),
            remote,
            budget: TaskBudget::new(settings.max_running_tasks, settings.max_failed_tasks),
            settings,
            folders,
            cursor: 0,
            running: HashMap::new(),
            failed: Vec::new(),
            retry: VecDeque::new(),
            next_id: 0,
            completed: 0,
            syncing: 0,
            reports: HashMap::new(),
            idle_waiters: Vec::new(),
            trigger_tasks,
            events_tx,
        };
        tokio::spawn(control.run(commands, events, fires));
        tracing::info!(account = %account.name, folders = account.folders.len(), "account manager started");
        Ok(Self {
            name: account.name.clone(),
            tx,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn send(&self, cmd: Command) {
        if self.tx.send(cmd).is_err() {
            tracing::warn!(account = %self.name, "account manager is gone");
        }
    }

    /// Run a sync pass for one folder, or every folder.
    pub fn sync_now(&self, folder: Option<&str>) {
        self.send(Command::SyncNow {
            folder: folder.map(str::to_string),
        });
    }

    /// Drop the folder's queued work and stop its running tasks.
    pub fn stop_folder(&self, folder: &str) {
        self.send(Command::StopFolder {
            folder: folder.to_string(),
        });
    }

    /// Stop the folder's triggers and terminate its tasks.
    pub fn remove_folder(&self, folder: &str) {
        self.send(Command::RemoveFolder {
            folder: folder.to_string(),
        });
    }

    /// Run every failed task again (they resume where they stopped).
    pub fn retry_failed(&self) {
        self.send(Command::RetryFailed);
    }

    /// Terminate and forget every failed task.
    pub fn clear_failed(&self) {
        self.send(Command::ClearFailed);
    }

    pub async fn snapshot(&self) -> AccountSnapshot {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Snapshot { reply });
        rx.await.unwrap_or_default()
    }

    /// Resolve once no pass is running, no task is running, and nothing more
    /// can be pulled (queues empty, or the failed cap reached).
    pub async fn wait_idle(&self) {
        let (reply, rx) = oneshot::channel();
        self.send(Command::WaitIdle { reply });
        let _ = rx.await;
    }

    /// Stop running tasks, disarm triggers, and end the control task.
    pub async fn shutdown(&self) {
        let (reply, rx) = oneshot::channel();
        self.send(Command::Shutdown { reply });
        let _ = rx.await;
    }
}

struct Control {
    name: String,
    remote: Arc<dyn RemoteDisk>,
    listing: ListingQueue,
    endpoints: Arc<UploadEndpointCache>,
    settings: AccountSettings,
    budget: TaskBudget,
    folders: Vec<Arc<Folder>>,
    /// Round-robin position into `folders`.
    cursor: usize,
    running: HashMap<u64, RunningTask>,
    failed: Vec<FailedTask>,
    /// Failed tasks queued to run again ahead of folder queues.
    retry: VecDeque<FailedTask>,
    next_id: u64,
    completed: usize,
    syncing: usize,
    reports: HashMap<String, SyncReport>,
    idle_waiters: Vec<oneshot::Sender<()>>,
    trigger_tasks: Vec<(String, JoinHandle<()>)>,
    events_tx: mpsc::UnboundedSender<Event>,
}

impl Control {
    async fn run(
        mut self,
        mut commands: mpsc::UnboundedReceiver<Command>,
        mut events: mpsc::UnboundedReceiver<Event>,
        mut fires: mpsc::UnboundedReceiver<(String, TriggerAction)>,
    ) {
        loop {
            tokio::select! {
                cmd = commands.recv() => {
                    let Some(cmd) = cmd else { break };
                    if let Command::Shutdown { reply } = cmd {
                        self.shutdown().await;
                        let _ = reply.send(());
                        return;
                    }
                    self.on_command(cmd);
                }
                Some(event) = events.recv() => self.on_event(event),
                Some((folder, action)) = fires.recv() => self.on_trigger(&folder, action),
            }
            self.fill();
            self.notify_idle();
        }
        self.shutdown().await;
    }

    fn folder(&self, id: &str) -> Option<Arc<Folder>> {
        self.folders.iter().find(|f| f.id() == id).cloned()
    }

    fn on_command(&mut self, cmd: Command) {
        match cmd {
            Command::SyncNow { folder } => {
                let targets: Vec<Arc<Folder>> = match folder {
                    Some(id) => self.folder(&id).into_iter().collect(),
                    None => self.folders.clone(),
                };
                for f in targets {
                    self.start_sync(f);
                }
            }
            Command::StopFolder { folder } => self.stop_folder(&folder, false),
            Command::RemoveFolder { folder } => {
                self.stop_folder(&folder, true);
                self.trigger_tasks.retain(|(id, handle)| {
                    if *id == folder {
                        handle.abort();
                    }
                    *id != folder
                });
                self.folders.retain(|f| f.id() != folder);
                self.cursor = 0;
                tracing::info!(account = %self.name, folder = %folder, "folder removed");
            }
            Command::RetryFailed => {
                let n = self.failed.len();
                self.budget.forget_failed(n);
                self.retry.extend(self.failed.drain(..));
                tracing::info!(account = %self.name, tasks = n, "retrying failed tasks");
            }
            Command::ClearFailed => {
                let cleared = std::mem::take(&mut self.failed);
                self.budget.forget_failed(cleared.len());
                for f in cleared {
                    if let Some(folder) = self.folder(&f.item.folder) {
                        folder.transfer_done(&f.item.relative);
                    }
                    if let Some(task) = f.task {
                        tokio::spawn(async move { task.terminate().await });
                    }
                }
            }
            Command::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            Command::WaitIdle { reply } => self.idle_waiters.push(reply),
            Command::Shutdown { reply } => {
                let _ = reply.send(());
            }
        }
    }

    fn on_trigger(&mut self, folder: &str, action: TriggerAction) {
        tracing::debug!(account = %self.name, folder, ?action, "trigger fired");
        match action {
            TriggerAction::Start | TriggerAction::Check => {
                if let Some(f) = self.folder(folder) {
                    self.start_sync(f);
                }
            }
            TriggerAction::Stop => self.stop_folder(folder, false),
        }
    }

    fn start_sync(&mut self, folder: Arc<Folder>) {
        if folder.is_processing() {
            tracing::debug!(folder = %folder.id(), "sync pass already running");
            return;
        }
        self.syncing += 1;
        let listing = self.listing.clone();
        let remote = self.remote.clone();
        let events = self.events_tx.clone();
        tokio::spawn(async move {
            let result = folder
                .run_sync(&listing, &remote)
                .await
                .map_err(|e| format!("{e:#}"));
            let _ = events.send(Event::SyncDone {
                folder: folder.id().to_string(),
                result,
            });
        });
    }

    fn stop_folder(&mut self, folder: &str, terminate: bool) {
        if let Some(f) = self.folder(folder) {
            f.clear_queues();
        }
        self.retry.retain(|t| t.item.folder != folder);
        for running in self.running.values().filter(|r| r.item.folder == folder) {
            let task = running.task.clone();
            tokio::spawn(async move {
                if terminate {
                    task.terminate().await;
                } else {
                    task.stop().await;
                }
            });
        }
        tracing::info!(account = %self.name, folder, terminate, "folder stopped");
    }

    fn on_event(&mut self, event: Event) {
        match event {
            Event::SyncDone { folder, result } => {
                self.syncing = self.syncing.saturating_sub(1);
                match result {
                    Ok(Some(report)) => {
                        self.reports.insert(folder, report);
                    }
                    Ok(None) => {}
                    Err(e) => {
                        tracing::warn!(account = %self.name, folder = %folder, error = %e, "sync pass failed")
                    }
                }
            }
            Event::TaskFinished { id, result } => {
                let Some(done) = self.running.remove(&id) else {
                    return;
                };
                match result {
                    Ok(StepStatus::Finished) => {
                        self.budget.release(false);
                        self.completed += 1;
                        self.release_item(&done.item);
                        tracing::info!(
                            remote = %done.item.remote,
                            kind = done.item.kind.as_str(),
                            "transfer finished"
                        );
                    }
                    Ok(status) => {
                        self.budget.release(false);
                        self.release_item(&done.item);
                        tracing::info!(remote = %done.item.remote, status = status.as_str(), "transfer ended");
                    }
                    Err(error) => {
                        self.budget.release(true);
                        tracing::warn!(remote = %done.item.remote, error = %error, "transfer failed");
                        self.failed.push(FailedTask {
                            item: done.item,
                            error,
                            task: Some(done.task),
                        });
                    }
                }
            }
        }
    }

    fn release_item(&self, item: &QueuedTransfer) {
        if let Some(folder) = self.folder(&item.folder) {
            folder.transfer_done(&item.relative);
        }
    }

    /// Next item, round-robin over folders starting after the last one served.
    fn next_item(&mut self) -> Option<QueuedTransfer> {
        let n = self.folders.len();
        for i in 0..n {
            let idx = (self.cursor + i) % n;
            if let Some(item) = self.folders[idx].pop_transfer() {
                self.cursor = (idx + 1) % n;
                return Some(item);
            }
        }
        None
    }

    /// Start tasks until the budget or the queues run out.
    fn fill(&mut self) {
        while self.budget.available() > 0 {
            if let Some(retry) = self.retry.pop_front() {
                match retry.task {
                    Some(task) => self.launch(retry.item, task),
                    None => self.start_item(retry.item),
                }
                continue;
            }
            let Some(item) = self.next_item() else {
                break;
            };
            self.start_item(item);
        }
    }

    fn build_task(&self, item: &QueuedTransfer) -> Result<Arc<dyn Transfer>, String> {
        let folder = self
            .folder(&item.folder)
            .ok_or_else(|| format!("folder {} was removed", item.folder))?;
        let opts = self.settings.transfer.clone();
        let task: Arc<dyn Transfer> = match item.kind {
            TransferKind::Upload => Arc::new(
                UploadTask::new(
                    self.remote.clone(),
                    self.endpoints.clone(),
                    item.local.clone(),
                    item.remote.clone(),
                    folder.key(),
                    opts,
                )
                .map_err(|e| e.to_string())?,
            ),
            TransferKind::Download => Arc::new(
                DownloadTask::new(
                    self.remote.clone(),
                    item.remote.clone(),
                    item.local.clone(),
                    folder.key(),
                    opts,
                )
                .map_err(|e| e.to_string())?,
            ),
        };
        Ok(task)
    }

    fn start_item(&mut self, item: QueuedTransfer) {
        match self.build_task(&item) {
            Ok(task) => self.launch(item, task),
            Err(error) => {
                tracing::warn!(remote = %item.remote, error = %error, "transfer could not start");
                if self.budget.reserve() {
                    self.budget.release(true);
                }
                self.failed.push(FailedTask {
                    item,
                    error,
                    task: None,
                });
            }
        }
    }

    fn launch(&mut self, item: QueuedTransfer, task: Arc<dyn Transfer>) {
        if !self.budget.reserve() {
            self.retry.push_front(FailedTask {
                item,
                error: String::new(),
                task: Some(task),
            });
            return;
        }
        let id = self.next_id;
        self.next_id += 1;
        tracing::debug!(
            account = %self.name,
            id,
            kind = item.kind.as_str(),
            remote = %item.remote,
            running = self.budget.running(),
            "starting transfer"
        );
        let events = self.events_tx.clone();
        let runner = task.clone();
        tokio::spawn(async move {
            let result = runner.run().await.map_err(|e| e.to_string());
            let _ = events.send(Event::TaskFinished { id, result });
        });
        self.running.insert(id, RunningTask { item, task });
    }

    fn snapshot(&self) -> AccountSnapshot {
        AccountSnapshot {
            running: self.running.values().map(|r| r.task.info()).collect(),
            failed: self
                .failed
                .iter()
                .map(|f| FailedTransfer {
                    item: f.item.clone(),
                    error: f.error.clone(),
                })
                .collect(),
            queued: self.folders.iter().map(|f| f.queued()).sum::<usize>() + self.retry.len(),
            completed: self.completed,
            syncing: self.syncing,
            reports: self.reports.clone(),
        }
    }

    fn is_idle(&self) -> bool {
        if self.syncing > 0 || !self.running.is_empty() {
            return false;
        }
        let pending = !self.retry.is_empty() || self.folders.iter().any(|f| f.queued() > 0);
        !pending || self.budget.available() == 0
    }

    fn notify_idle(&mut self) {
        if self.idle_waiters.is_empty() || !self.is_idle() {
            return;
        }
        for waiter in self.idle_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }

    async fn shutdown(&mut self) {
        for (_, handle) in self.trigger_tasks.drain(..) {
            handle.abort();
        }
        let tasks: Vec<Arc<dyn Transfer>> = self.running.values().map(|r| r.task.clone()).collect();
        for task in &tasks {
            task.stop().await;
        }
        for waiter in self.idle_waiters.drain(..) {
            let _ = waiter.send(());
        }
        tracing::info!(account = %self.name, stopped = tasks.len(), "account manager shut down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{ConflictPolicy, Direction, FolderConfig};
    use crate::remote::DirRemote;
    use crate::retry::RetryPolicy;
    use std::path::Path;

    fn settings(max_running: usize, max_failed: usize) -> AccountSettings {
        AccountSettings {
            transfer: TransferOptions {
                threads: 2,
                retry: RetryPolicy::once(),
                pool_max_attempts: 1,
                ..TransferOptions::default()
            },
            max_running_tasks: max_running,
            max_failed_tasks: max_failed,
            listing_interval: Duration::from_millis(1),
            upload_endpoint_ttl: Duration::from_secs(3600),
            triggers: false,
        }
    }

    fn folder(id: &str, local: &Path, remote: &str) -> FolderConfig {
        FolderConfig {
            id: id.into(),
            local: local.to_path_buf(),
            remote: remote.into(),
            key: None,
            direction: Direction::Upload,
            conflict: ConflictPolicy::LocalWins,
            delete: false,
            trigger: None,
            exclude: Vec::new(),
        }
    }

    fn account(folders: Vec<FolderConfig>) -> AccountConfig {
        AccountConfig {
            name: "main".into(),
            remote_root: "/".into(),
            folders,
        }
    }

    #[tokio::test]
    async fn sync_uploads_every_folder() {
        let dir = tempfile::tempdir().unwrap();
        let remote_dir = dir.path().join("remote");
        std::fs::create_dir_all(&remote_dir).unwrap();
        for (name, files) in [("one", 2), ("two", 1)] {
            let local = dir.path().join(name);
            std::fs::create_dir_all(&local).unwrap();
            for i in 0..files {
                std::fs::write(local.join(format!("f{i}.txt")), format!("{name}-{i}")).unwrap();
            }
        }
        let remote: Arc<dyn RemoteDisk> = Arc::new(DirRemote::new(&remote_dir));
        let cfg = account(vec![
            folder("one", &dir.path().join("one"), "/one"),
            folder("two", &dir.path().join("two"), "/two"),
        ]);

        let manager = AccountManager::spawn(&cfg, remote, settings(2, 2)).unwrap();
        manager.sync_now(None);
        manager.wait_idle().await;

        let snap = manager.snapshot().await;
        assert_eq!(snap.completed, 3);
        assert!(snap.failed.is_empty());
        assert_eq!(snap.queued, 0);
        assert_eq!(snap.reports["one"].uploads_queued, 2);
        assert_eq!(
            std::fs::read(remote_dir.join("one/f1.txt")).unwrap(),
            b"one-1"
        );
        assert_eq!(
            std::fs::read(remote_dir.join("two/f0.txt")).unwrap(),
            b"two-0"
        );
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn failed_cap_parks_queue_until_retry() {
        let dir = tempfile::tempdir().unwrap();
        let remote_dir = dir.path().join("remote");
        let local = dir.path().join("local");
        std::fs::create_dir_all(&remote_dir).unwrap();
        std::fs::create_dir_all(&local).unwrap();
        std::fs::write(local.join("a.txt"), b"alpha").unwrap();
        std::fs::write(local.join("b.txt"), b"beta").unwrap();

        let disk = Arc::new(DirRemote::new(&remote_dir));
        disk.fail_slice_upload(0);
        let remote: Arc<dyn RemoteDisk> = disk.clone();
        let cfg = account(vec![folder("f", &local, "/f")]);

        let manager = AccountManager::spawn(&cfg, remote, settings(1, 1)).unwrap();
        manager.sync_now(Some("f"));
        manager.wait_idle().await;

        let snap = manager.snapshot().await;
        assert_eq!(snap.failed.len(), 1);
        assert_eq!(snap.completed, 0);
        assert_eq!(snap.queued, 1);

        manager.retry_failed();
        manager.wait_idle().await;
        let snap = manager.snapshot().await;
        assert!(snap.failed.is_empty());
        assert_eq!(snap.completed, 2);
        assert!(remote_dir.join("f/a.txt").is_file());
        assert!(remote_dir.join("f/b.txt").is_file());
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn retried_tasks_run_in_failure_order() {
        let dir = tempfile::tempdir().unwrap();
        let remote_dir = dir.path().join("remote");
        let local = dir.path().join("local");
        std::fs::create_dir_all(&remote_dir).unwrap();
        std::fs::create_dir_all(&local).unwrap();
        for name in ["a.txt", "b.txt", "c.txt"] {
            std::fs::write(local.join(name), name).unwrap();
        }

        let disk = Arc::new(DirRemote::new(&remote_dir));
        disk.fail_slice_upload(0);
        disk.fail_slice_upload(0);
        let remote: Arc<dyn RemoteDisk> = disk.clone();
        let cfg = account(vec![folder("f", &local, "/f")]);

        let manager = AccountManager::spawn(&cfg, remote, settings(1, 2)).unwrap();
        manager.sync_now(None);
        manager.wait_idle().await;
        let snap = manager.snapshot().await;
        assert_eq!(snap.failed.len(), 2);
        assert_eq!(snap.queued, 1);
        let first_failed = snap.failed[0].item.local.clone();

        disk.set_io_delay(Duration::from_millis(200));
        manager.retry_failed();
        let snap = manager.snapshot().await;
        assert_eq!(snap.running.len(), 1);
        assert_eq!(snap.running[0].local, first_failed);

        disk.set_io_delay(Duration::ZERO);
        manager.wait_idle().await;
        let snap = manager.snapshot().await;
        assert!(snap.failed.is_empty());
        assert_eq!(snap.completed, 3);
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn clear_failed_lets_next_pass_requeue() {
        let dir = tempfile::tempdir().unwrap();
        let remote_dir = dir.path().join("remote");
        let local = dir.path().join("local");
        std::fs::create_dir_all(&remote_dir).unwrap();
        std::fs::create_dir_all(&local).unwrap();
        std::fs::write(local.join("a.txt"), b"alpha").unwrap();

        let disk = Arc::new(DirRemote::new(&remote_dir));
        disk.fail_slice_upload(0);
        let remote: Arc<dyn RemoteDisk> = disk.clone();
        let cfg = account(vec![folder("f", &local, "/f")]);

        let manager = AccountManager::spawn(&cfg, remote, settings(1, 1)).unwrap();
        manager.sync_now(None);
        manager.wait_idle().await;
        assert_eq!(manager.snapshot().await.failed.len(), 1);

        manager.clear_failed();
        manager.sync_now(None);
        manager.wait_idle().await;
        let snap = manager.snapshot().await;
        assert!(snap.failed.is_empty());
        assert_eq!(snap.completed, 1);
        assert_eq!(std::fs::read(remote_dir.join("f/a.txt")).unwrap(), b"alpha");
        manager.shutdown().await;
    }

    #[tokio::test]
    async fn bad_trigger_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let mut f = folder("f", dir.path(), "/f");
        f.trigger = Some(crate::config::TriggerConfig::Check {
            check: "every day".into(),
        });
        let remote: Arc<dyn RemoteDisk> = Arc::new(DirRemote::new(dir.path()));
        let err = AccountManager::spawn(&account(vec![f]), remote, settings(1, 1))
            .err()
            .unwrap();
        assert!(format!("{err:#}").contains("folder f trigger"));
    }
}
