//! Folder diff scenarios and account scheduling over the directory remote.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{pattern, strict_opts, world};
use pansync_core::config::{AccountConfig, Direction};
use pansync_core::scheduler::{AccountManager, AccountSettings, ListingQueue};
use pansync_core::sync::Folder;
use pansync_core::task::{Transfer, TransferKind, UploadTask};

fn listing(w: &common::World) -> ListingQueue {
    ListingQueue::spawn(w.remote(), Duration::from_millis(1))
}

fn settings(max_running: usize) -> AccountSettings {
    AccountSettings {
        transfer: strict_opts(2),
        max_running_tasks: max_running,
        max_failed_tasks: 3,
        listing_interval: Duration::from_millis(1),
        upload_endpoint_ttl: Duration::from_secs(3600),
        triggers: false,
    }
}

#[tokio::test]
async fn mixed_local_wins_with_delete_mirrors_local_shape() {
    let w = world();
    w.local.file("a/b/file.bin", b"payload");
    w.remote_disk.dir("sync/a/c");
    let folder = Folder::from_config(&w.folder("/sync", Direction::Mixed, true));
    let listing = listing(&w);

    let plan = folder.plan(&listing, w.disk.as_ref()).await.unwrap();
    assert_eq!(plan.upload, vec!["a/b/file.bin"]);
    assert_eq!(plan.remote_create, vec!["a/b"]);
    assert_eq!(plan.remote_delete, vec!["a/c"]);
    assert!(plan.download.is_empty());
    assert!(plan.local_create.is_empty());
    assert!(plan.local_delete.is_empty());

    let report = folder.run_sync(&listing, &w.remote()).await.unwrap().unwrap();
    assert_eq!(report.remote_created, 1);
    assert_eq!(report.remote_deleted, 1);
    assert_eq!(report.uploads_queued, 1);
    assert!(w.remote_disk.exists("sync/a/b"));
    assert!(!w.remote_disk.exists("sync/a/c"));

    let item = folder.pop_transfer().unwrap();
    assert_eq!(item.kind, TransferKind::Upload);
    assert_eq!(item.remote, "/sync/a/b/file.bin");
}

#[tokio::test]
async fn mixed_without_delete_keeps_remote_extras() {
    let w = world();
    w.local.file("a/b/file.bin", b"payload");
    w.remote_disk.dir("sync/a/c");
    let folder = Folder::from_config(&w.folder("/sync", Direction::Mixed, false));
    let listing = listing(&w);

    let plan = folder.plan(&listing, w.disk.as_ref()).await.unwrap();
    assert_eq!(plan.upload, vec!["a/b/file.bin"]);
    assert_eq!(plan.remote_create, vec!["a/b"]);
    assert!(plan.remote_delete.is_empty());
    assert_eq!(plan.local_create, vec!["a/c"]);

    folder.run_sync(&listing, &w.remote()).await.unwrap();
    assert!(w.remote_disk.exists("sync/a/c"));
    assert!(w.local.exists("a/c"));
}

#[tokio::test]
async fn synced_trees_plan_nothing_twice() {
    let w = world();
    w.local
        .file("docs/readme.txt", b"hello")
        .file("docs/img/logo.bin", &pattern(3000))
        .dir("empty/leaf");
    let folder = Folder::from_config(&w.folder("/sync", Direction::Upload, true));
    let listing = listing(&w);

    folder.run_sync(&listing, &w.remote()).await.unwrap();
    while let Some(item) = folder.pop_transfer() {
        let task = UploadTask::new(
            w.remote(),
            w.endpoints.clone(),
            item.local.clone(),
            item.remote.clone(),
            None,
            strict_opts(1),
        )
        .unwrap();
        task.run().await.unwrap();
        folder.transfer_done(&item.relative);
    }

    for _ in 0..2 {
        let plan = folder.plan(&listing, w.disk.as_ref()).await.unwrap();
        assert!(plan.is_empty(), "unexpected work: {plan:?}");
    }
}

#[tokio::test]
async fn account_drains_queues_under_running_cap() {
    let w = world();
    for i in 0..5 {
        w.local.file(&format!("batch/f{i}.bin"), &pattern(1000 + i));
    }
    let account = AccountConfig {
        name: "main".into(),
        remote_root: w.remote_disk.root().to_path_buf(),
        folders: vec![w.folder("/backup", Direction::Upload, false)],
    };
    let manager = AccountManager::spawn(&account, w.remote(), settings(2)).unwrap();
    manager.sync_now(None);

    let mut peak = 0;
    loop {
        let snap = manager.snapshot().await;
        peak = peak.max(snap.running.len());
        if snap.completed == 5 || !snap.failed.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(2)).await;
    }
    manager.wait_idle().await;
    assert!(peak <= 2);

    let snap = manager.snapshot().await;
    assert!(snap.failed.is_empty());
    assert_eq!(snap.queued, 0);
    for i in 0..5 {
        assert_eq!(
            w.remote_disk.read(&format!("backup/batch/f{i}.bin")),
            pattern(1000 + i)
        );
    }

    // Nothing left to do on the next pass.
    let folder = Folder::from_config(&account.folders[0]);
    let plan = folder
        .plan(&listing(&w), w.disk.as_ref())
        .await
        .unwrap();
    assert!(plan.is_empty());
    manager.shutdown().await;
}

#[tokio::test]
async fn download_folder_pulls_remote_tree() {
    let w = world();
    w.remote_disk
        .file("share/x/one.txt", b"one")
        .file("share/two.txt", b"two");
    let account = AccountConfig {
        name: "main".into(),
        remote_root: w.remote_disk.root().to_path_buf(),
        folders: vec![w.folder("/share", Direction::Download, true)],
    };
    let remote = w.remote();
    let manager = AccountManager::spawn(&account, Arc::clone(&remote), settings(1)).unwrap();
    manager.sync_now(Some("docs"));
    manager.wait_idle().await;

    assert_eq!(manager.snapshot().await.completed, 2);
    assert_eq!(w.local.read("x/one.txt"), b"one");
    assert_eq!(w.local.read("two.txt"), b"two");
    manager.shutdown().await;
}
