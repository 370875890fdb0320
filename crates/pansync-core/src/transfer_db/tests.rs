use super::*;
use crate::slices::SliceBitmap;
use crate::task::{ResumePoint, SourceSnapshot, TransferKind};

fn upload(local: &str, remote: &str) -> NewTransfer {
    NewTransfer {
        kind: TransferKind::Upload,
        local: local.into(),
        remote: remote.into(),
    }
}

#[tokio::test]
async fn record_progress_and_finish() {
    let db = TransferDb::open_memory().await.unwrap();
    let id = db.record_transfer(&upload("/data/a.bin", "/sync/a.bin")).await.unwrap();

    let rec = db.get_transfer(id).await.unwrap().unwrap();
    assert_eq!(rec.state, TransferState::Running);
    assert_eq!(rec.kind, TransferKind::Upload);
    assert_eq!(rec.slice_count, 0);
    assert!(rec.upload_id.is_none());

    let progress = TransferProgress {
        chunk_mb: Some(4),
        upload_id: Some("session-1".into()),
        slice_count: 10,
        bitmap: SliceBitmap::from_done([0, 1, 9], 10),
        source_size: Some(40 << 20),
        source_mtime: Some(1_700_000_000),
        iv: Some([7u8; 16]),
    };
    db.update_progress(id, &progress).await.unwrap();
    db.set_state(id, TransferState::Stopped, Some("connection reset")).await.unwrap();

    let rec = db.get_transfer(id).await.unwrap().unwrap();
    assert_eq!(rec.chunk_mb, Some(4));
    assert_eq!(rec.upload_id.as_deref(), Some("session-1"));
    assert_eq!(rec.slices_done(), 3);
    assert!(rec.bitmap.is_set(9));
    assert_eq!(rec.source_size, Some(40 << 20));
    assert_eq!(rec.source_mtime, Some(1_700_000_000));
    assert_eq!(rec.iv, Some([7u8; 16]));
    assert_eq!(rec.state, TransferState::Stopped);
    assert_eq!(rec.last_error.as_deref(), Some("connection reset"));

    db.set_state(id, TransferState::Finished, None).await.unwrap();
    let rec = db.get_transfer(id).await.unwrap().unwrap();
    assert_eq!(rec.state, TransferState::Finished);
    assert!(rec.last_error.is_none());
}

#[tokio::test]
async fn list_newest_first_and_remove() {
    let db = TransferDb::open_memory().await.unwrap();
    assert!(db.list_transfers().await.unwrap().is_empty());
    let a = db.record_transfer(&upload("/a", "/r/a")).await.unwrap();
    let b = db
        .record_transfer(&NewTransfer {
            kind: TransferKind::Download,
            local: "/b".into(),
            remote: "/r/b".into(),
        })
        .await
        .unwrap();

    let all = db.list_transfers().await.unwrap();
    assert_eq!(all.iter().map(|r| r.id).collect::<Vec<_>>(), vec![b, a]);
    assert_eq!(all[0].kind, TransferKind::Download);

    db.remove_transfer(a).await.unwrap();
    let all = db.list_transfers().await.unwrap();
    assert_eq!(all.len(), 1);
    assert!(db.get_transfer(a).await.unwrap().is_none());
}

#[tokio::test]
async fn recover_running_marks_stopped() {
    let db = TransferDb::open_memory().await.unwrap();
    let a = db.record_transfer(&upload("/a", "/r/a")).await.unwrap();
    let b = db.record_transfer(&upload("/b", "/r/b")).await.unwrap();
    db.set_state(b, TransferState::Finished, None).await.unwrap();

    assert_eq!(db.recover_running().await.unwrap(), 1);
    assert_eq!(db.get_transfer(a).await.unwrap().unwrap().state, TransferState::Stopped);
    assert_eq!(db.get_transfer(b).await.unwrap().unwrap().state, TransferState::Finished);
}

#[tokio::test]
async fn open_at_persists_across_handles() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("nested dir").join("transfers.db");
    let id = {
        let db = TransferDb::open_at(&path).await.unwrap();
        db.record_transfer(&upload("/a", "/r/a")).await.unwrap()
    };
    let db = TransferDb::open_at(&path).await.unwrap();
    let rec = db.get_transfer(id).await.unwrap().unwrap();
    assert_eq!(rec.remote, "/r/a");
}

#[tokio::test]
async fn resume_point_survives_the_row() {
    let db = TransferDb::open_memory().await.unwrap();
    let id = db.record_transfer(&upload("/data/a.bin", "/sync/a.bin")).await.unwrap();
    let point = ResumePoint {
        source: Some(SourceSnapshot { size: 9 << 20, mtime: 1_650_000_000 }),
        chunk_mb: Some(4),
        iv: None,
        upload_id: Some("session-9".into()),
        slice_count: 3,
        done: SliceBitmap::from_done([0, 2], 3),
    };
    db.update_progress(id, &TransferProgress::from(point.clone())).await.unwrap();
    db.set_state(id, TransferState::Stopped, None).await.unwrap();

    let rec = db
        .find_resumable(TransferKind::Upload, "/data/a.bin".as_ref(), "/sync/a.bin")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(rec.id, id);
    assert_eq!(rec.resume_point(), point);
    assert_eq!(rec.resume_point().done_indices(), vec![0, 2]);
}

#[tokio::test]
async fn find_resumable_skips_finished_and_other_paths() {
    let db = TransferDb::open_memory().await.unwrap();
    let done = db.record_transfer(&upload("/a", "/r/a")).await.unwrap();
    db.set_state(done, TransferState::Finished, None).await.unwrap();
    let running = db.record_transfer(&upload("/a", "/r/a")).await.unwrap();
    let other = db.record_transfer(&upload("/a", "/r/other")).await.unwrap();
    db.set_state(other, TransferState::Error, Some("boom")).await.unwrap();

    let found = db.find_resumable(TransferKind::Upload, "/a".as_ref(), "/r/a").await.unwrap();
    assert!(found.is_none());
    assert!(db
        .find_resumable(TransferKind::Download, "/a".as_ref(), "/r/other")
        .await
        .unwrap()
        .is_none());

    db.set_state(running, TransferState::Error, Some("timeout")).await.unwrap();
    let found = db.find_resumable(TransferKind::Upload, "/a".as_ref(), "/r/a").await.unwrap();
    assert_eq!(found.map(|r| r.id), Some(running));
}
