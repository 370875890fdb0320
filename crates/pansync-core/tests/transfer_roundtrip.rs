//! Upload/download round trips against the directory-backed remote.

mod common;

use std::sync::Arc;
use std::time::Duration;

use common::{pattern, strict_opts, world, MIB};
use pansync_core::codec::{file_md5, ChunkLayout};
use pansync_core::error::TransferError;
use pansync_core::remote::DirRemote;
use pansync_core::step::StepStatus;
use pansync_core::storage::set_mtime;
use pansync_core::task::{DownloadTask, Transfer, UploadTask};

const SIZE: usize = 5 * MIB + MIB / 2;
/// Six 4 MiB slices.
const SLOW_SIZE: usize = 24 * MIB;
const SLOW_IO: Duration = Duration::from_millis(40);

async fn wait_until(cond: impl Fn() -> bool) {
    tokio::time::timeout(Duration::from_secs(30), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

#[tokio::test]
async fn plain_five_and_a_half_mib_moves_two_slices() {
    let w = world();
    let data = pattern(SIZE);
    w.local.file("big.bin", &data);

    let up = UploadTask::new(
        w.remote(),
        w.endpoints.clone(),
        w.local.root().join("big.bin"),
        "/vault/big.bin",
        None,
        strict_opts(2),
    )
    .unwrap();
    assert_eq!(up.run().await.unwrap(), StepStatus::Finished);
    let info = up.info();
    assert_eq!(info.chunk_mb, Some(4));
    assert_eq!(info.slice_count, 2);
    assert_eq!(info.transfer_size, Some(SIZE as u64));
    assert_eq!(w.disk.slice_uploads(), 2);
    assert_eq!(w.remote_disk.read("vault/big.bin"), data);

    let down = DownloadTask::new(
        w.remote(),
        "/vault/big.bin",
        w.local.root().join("copy.bin"),
        None,
        strict_opts(2),
    )
    .unwrap();
    assert_eq!(down.run().await.unwrap(), StepStatus::Finished);
    assert_eq!(w.local.read("copy.bin"), data);
    assert_eq!(down.content_digest(), up.content_digest());

    let src = std::fs::metadata(w.local.root().join("big.bin")).unwrap();
    let dst = std::fs::metadata(w.local.root().join("copy.bin")).unwrap();
    assert_eq!(
        src.modified().unwrap().duration_since(std::time::UNIX_EPOCH).unwrap().as_secs(),
        dst.modified().unwrap().duration_since(std::time::UNIX_EPOCH).unwrap().as_secs()
    );
}

#[tokio::test]
async fn encrypted_five_and_a_half_mib_keeps_four_mib_chunks() {
    let w = world();
    let data = pattern(SIZE);
    w.local.file("big.bin", &data);
    let layout = ChunkLayout::select(SIZE as u64, true).unwrap();
    assert_eq!(layout.chunk_mb(), 4);

    let up = UploadTask::new(
        w.remote(),
        w.endpoints.clone(),
        w.local.root().join("big.bin"),
        "/vault/big.bin",
        Some("correct horse"),
        strict_opts(3),
    )
    .unwrap();
    up.run().await.unwrap();
    assert_eq!(up.info().slice_count, layout.slice_count());
    assert_eq!(w.disk.slice_uploads(), layout.slice_count());
    let stored = std::fs::metadata(w.remote_disk.root().join("vault/big.bin")).unwrap();
    assert_eq!(stored.len(), layout.transfer_size());
    assert_ne!(w.remote_disk.read("vault/big.bin")[..64], data[..64]);

    let down = DownloadTask::new(
        w.remote(),
        "/vault/big.bin",
        w.local.root().join("plain.bin"),
        Some("correct horse"),
        strict_opts(3),
    )
    .unwrap();
    assert_eq!(down.run().await.unwrap(), StepStatus::Finished);
    assert_eq!(w.local.read("plain.bin"), data);
    let on_disk = file_md5(&w.local.root().join("plain.bin"), None).unwrap();
    assert_eq!(Some(on_disk), up.content_digest());
}

#[tokio::test]
async fn failed_upload_resumes_without_redoing_finished_work() {
    let w = world();
    let size = 9 * MIB;
    let data = pattern(size);
    w.local.file("resume.bin", &data);
    w.disk.fail_slice_upload(1);

    let up = UploadTask::new(
        w.remote(),
        w.endpoints.clone(),
        w.local.root().join("resume.bin"),
        "/vault/resume.bin",
        None,
        strict_opts(1),
    )
    .unwrap();
    assert!(up.run().await.is_err());
    let info = up.info();
    assert_eq!(info.status, StepStatus::Stopped);
    assert!(info.last_error.is_some());
    assert!(up.completed_steps().contains(&"compute-local-digest"));
    assert!(!up.completed_steps().contains(&"upload-slices"));
    assert_eq!(w.disk.slice_uploads(), 1);
    assert!(!w.remote_disk.exists("vault/resume.bin"));

    assert_eq!(up.run().await.unwrap(), StepStatus::Finished);
    assert_eq!(w.disk.slice_uploads(), 3);
    assert_eq!(w.remote_disk.read("vault/resume.bin"), data);
}

#[tokio::test]
async fn failed_download_resumes_into_same_part_file() {
    let w = world();
    let data = pattern(SIZE);
    w.remote_disk.file("vault/src.bin", &data);
    w.disk.fail_next_range_fetches(1);

    let down = DownloadTask::new(
        w.remote(),
        "/vault/src.bin",
        w.local.root().join("dst.bin"),
        None,
        strict_opts(1),
    )
    .unwrap();
    assert!(down.run().await.is_err());
    assert!(down.completed_steps().contains(&"preallocate-local-file"));
    assert!(down.part_path().exists());
    assert!(!w.local.exists("dst.bin"));

    assert_eq!(down.run().await.unwrap(), StepStatus::Finished);
    assert!(!down.part_path().exists());
    assert_eq!(w.local.read("dst.bin"), data);
}

#[tokio::test]
async fn terminated_download_cannot_run_again() {
    let w = world();
    w.remote_disk.file("vault/src.bin", &pattern(MIB));
    let down = DownloadTask::new(
        w.remote(),
        "/vault/src.bin",
        w.local.root().join("dst.bin"),
        None,
        strict_opts(1),
    )
    .unwrap();
    down.terminate().await;
    assert_eq!(down.run().await.unwrap(), StepStatus::Stopped);
    assert!(!w.local.exists("dst.bin"));
    assert!(!down.part_path().exists());
}

#[tokio::test]
async fn stopped_upload_reruns_only_missing_slices() {
    let w = world();
    let data = pattern(SLOW_SIZE);
    w.local.file("slow.bin", &data);
    w.disk.set_io_delay(SLOW_IO);

    let up = Arc::new(
        UploadTask::new(
            w.remote(),
            w.endpoints.clone(),
            w.local.root().join("slow.bin"),
            "/vault/slow.bin",
            None,
            strict_opts(1),
        )
        .unwrap(),
    );
    let runner = up.clone();
    let handle = tokio::spawn(async move { runner.run().await });
    let disk = w.disk.clone();
    wait_until(move || disk.slice_uploads() >= 2).await;
    up.stop().await;
    assert_eq!(handle.await.unwrap().unwrap(), StepStatus::Stopped);

    let slices = up.info().slice_count;
    assert_eq!(slices, 6);
    let uploaded = w.disk.slice_uploads();
    assert!(uploaded < slices, "stop came too late: {uploaded} of {slices}");
    assert_eq!(up.done_bitmap().count(slices), uploaded);
    assert!(!up.completed_steps().contains(&"upload-slices"));
    assert!(!w.remote_disk.exists("vault/slow.bin"));

    w.disk.set_io_delay(Duration::ZERO);
    assert_eq!(up.run().await.unwrap(), StepStatus::Finished);
    assert_eq!(w.disk.slice_uploads(), slices);
    assert_eq!(w.remote_disk.read("vault/slow.bin"), data);
}

#[tokio::test]
async fn stopped_download_reruns_into_same_part_file() {
    let w = world();
    let data = pattern(SLOW_SIZE);
    w.remote_disk.file("vault/src.bin", &data);
    w.disk.set_io_delay(SLOW_IO);

    let down = Arc::new(
        DownloadTask::new(
            w.remote(),
            "/vault/src.bin",
            w.local.root().join("dst.bin"),
            None,
            strict_opts(1),
        )
        .unwrap(),
    );
    let runner = down.clone();
    let handle = tokio::spawn(async move { runner.run().await });
    let disk = w.disk.clone();
    wait_until(move || disk.range_fetches() >= 2).await;
    down.stop().await;
    assert_eq!(handle.await.unwrap().unwrap(), StepStatus::Stopped);

    let chunks = down.info().slice_count;
    assert_eq!(chunks, 6);
    let fetched = w.disk.range_fetches();
    assert!(fetched < chunks, "stop came too late: {fetched} of {chunks}");
    assert_eq!(down.resume_point().done.count(chunks), fetched);
    assert!(down.completed_steps().contains(&"preallocate-local-file"));
    assert!(!down.completed_steps().contains(&"download-slices"));
    assert!(down.part_path().exists());
    assert!(!w.local.exists("dst.bin"));

    w.disk.set_io_delay(Duration::ZERO);
    assert_eq!(down.run().await.unwrap(), StepStatus::Finished);
    assert_eq!(w.disk.range_fetches(), chunks);
    assert!(!down.part_path().exists());
    assert_eq!(w.local.read("dst.bin"), data);
}

#[tokio::test]
async fn encrypted_upload_resumes_in_a_new_process() {
    let w = world();
    let data = pattern(SLOW_SIZE);
    w.local.file("secret.bin", &data);
    w.disk.set_io_delay(SLOW_IO);

    let first = Arc::new(
        UploadTask::new(
            w.remote(),
            w.endpoints.clone(),
            w.local.root().join("secret.bin"),
            "/vault/secret.bin",
            Some("correct horse"),
            strict_opts(1),
        )
        .unwrap(),
    );
    let runner = first.clone();
    let handle = tokio::spawn(async move { runner.run().await });
    let disk = w.disk.clone();
    wait_until(move || disk.slice_uploads() >= 2).await;
    first.stop().await;
    assert_eq!(handle.await.unwrap().unwrap(), StepStatus::Stopped);

    let point = first.resume_point();
    let before = w.disk.slice_uploads();
    assert!(point.iv.is_some());
    assert!(point.upload_id.is_some());
    assert_eq!(point.done.count(point.slice_count), before);
    assert!(before < point.slice_count);
    drop(first);

    // Fresh remote handle over the same storage: no in-memory sessions.
    let disk = Arc::new(DirRemote::new(w.remote_disk.root().to_path_buf()));
    let second = UploadTask::new(
        disk.clone(),
        w.endpoints.clone(),
        w.local.root().join("secret.bin"),
        "/vault/secret.bin",
        Some("correct horse"),
        strict_opts(2),
    )
    .unwrap()
    .resume_from(point.clone());
    assert_eq!(second.run().await.unwrap(), StepStatus::Finished);
    assert_eq!(second.info().slice_count, point.slice_count);
    assert_eq!(before + disk.slice_uploads(), point.slice_count);

    let down = DownloadTask::new(
        disk.clone(),
        "/vault/secret.bin",
        w.local.root().join("plain.bin"),
        Some("correct horse"),
        strict_opts(2),
    )
    .unwrap();
    assert_eq!(down.run().await.unwrap(), StepStatus::Finished);
    assert_eq!(w.local.read("plain.bin"), data);
}

#[tokio::test]
async fn recorded_upload_refuses_a_modified_source() {
    let w = world();
    w.local.file("moving.bin", &pattern(SLOW_SIZE));
    w.disk.set_io_delay(SLOW_IO);
    let local = w.local.root().join("moving.bin");

    let first = Arc::new(
        UploadTask::new(
            w.remote(),
            w.endpoints.clone(),
            &local,
            "/vault/moving.bin",
            None,
            strict_opts(1),
        )
        .unwrap(),
    );
    let runner = first.clone();
    let handle = tokio::spawn(async move { runner.run().await });
    let disk = w.disk.clone();
    wait_until(move || disk.slice_uploads() >= 1).await;
    first.stop().await;
    handle.await.unwrap().unwrap();

    let point = first.resume_point();
    let recorded = point.source.expect("source captured");
    set_mtime(&local, recorded.mtime + 100).unwrap();

    let second = UploadTask::new(
        w.remote(),
        w.endpoints.clone(),
        &local,
        "/vault/moving.bin",
        None,
        strict_opts(1),
    )
    .unwrap()
    .resume_from(point);
    assert!(matches!(
        second.run().await,
        Err(TransferError::FileChanged { .. })
    ));
    assert!(!w.remote_disk.exists("vault/moving.bin"));
}

#[tokio::test]
async fn download_resumes_recorded_part_in_a_new_process() {
    let w = world();
    let data = pattern(SLOW_SIZE);
    w.remote_disk.file("vault/src.bin", &data);
    w.disk.set_io_delay(SLOW_IO);
    let local = w.local.root().join("dst.bin");

    let first = Arc::new(
        DownloadTask::new(w.remote(), "/vault/src.bin", &local, None, strict_opts(1)).unwrap(),
    );
    let runner = first.clone();
    let handle = tokio::spawn(async move { runner.run().await });
    let disk = w.disk.clone();
    wait_until(move || disk.range_fetches() >= 2).await;
    first.stop().await;
    assert_eq!(handle.await.unwrap().unwrap(), StepStatus::Stopped);

    let point = first.resume_point();
    let done = point.done.count(point.slice_count);
    assert_eq!(done, w.disk.range_fetches());
    assert!(done < point.slice_count);
    assert!(first.part_path().exists());
    drop(first);

    let disk = Arc::new(DirRemote::new(w.remote_disk.root().to_path_buf()));
    let second = DownloadTask::new(disk.clone(), "/vault/src.bin", &local, None, strict_opts(2))
        .unwrap()
        .resume_from(point.clone());
    assert_eq!(second.run().await.unwrap(), StepStatus::Finished);
    assert_eq!(disk.range_fetches(), point.slice_count - done);
    assert_eq!(w.local.read("dst.bin"), data);
    assert_eq!(second.content_digest(), Some(file_md5(&local, None).unwrap()));
}
