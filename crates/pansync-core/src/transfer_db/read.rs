//! Row reads.

use anyhow::{anyhow, Result};
use sqlx::sqlite::SqliteRow;
use sqlx::Row;
use std::path::{Path, PathBuf};

use super::db::TransferDb;
use super::types::{TransferId, TransferRecord, TransferState};
use crate::codec::IV_LEN;
use crate::slices::SliceBitmap;
use crate::task::TransferKind;

const COLUMNS: &str = "id, direction, local_path, remote_path, state, chunk_mb, upload_id, \
                       slice_count, done_bitmap, source_size, source_mtime, iv, last_error, \
                       created_at, updated_at";

fn record_from_row(row: &SqliteRow) -> Result<TransferRecord> {
    let direction: String = row.get("direction");
    let kind = TransferKind::parse(&direction)
        .ok_or_else(|| anyhow!("unknown transfer direction {direction:?}"))?;
    let state: String = row.get("state");
    let local: String = row.get("local_path");
    let chunk_mb: Option<i64> = row.get("chunk_mb");
    let slice_count: i64 = row.get("slice_count");
    let slice_count = slice_count.max(0) as usize;
    let bitmap: Vec<u8> = row.get("done_bitmap");
    let source_size: Option<i64> = row.get("source_size");
    let iv: Option<Vec<u8>> = row.get("iv");
    Ok(TransferRecord {
        id: row.get("id"),
        kind,
        local: PathBuf::from(local),
        remote: row.get("remote_path"),
        state: TransferState::parse(&state),
        chunk_mb: chunk_mb.and_then(|v| u32::try_from(v).ok()),
        upload_id: row.get("upload_id"),
        slice_count,
        bitmap: SliceBitmap::from_bytes(&bitmap, slice_count),
        source_size: source_size.and_then(|v| u64::try_from(v).ok()),
        source_mtime: row.get("source_mtime"),
        iv: iv.and_then(|v| <[u8; IV_LEN]>::try_from(v.as_slice()).ok()),
        last_error: row.get("last_error"),
        created_at: row.get("created_at"),
        updated_at: row.get("updated_at"),
    })
}

impl TransferDb {
    /// Every row, newest first.
    pub async fn list_transfers(&self) -> Result<Vec<TransferRecord>> {
        let sql = format!("SELECT {COLUMNS} FROM transfers ORDER BY created_at DESC, id DESC");
        let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
        rows.iter().map(record_from_row).collect()
    }

    /// Newest unfinished row for the same direction and paths, if any.
    pub async fn find_resumable(
        &self,
        kind: TransferKind,
        local: &Path,
        remote: &str,
    ) -> Result<Option<TransferRecord>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM transfers \
             WHERE direction = ?1 AND local_path = ?2 AND remote_path = ?3 \
               AND state IN ('stopped', 'error') \
             ORDER BY updated_at DESC, id DESC LIMIT 1"
        );
        let row = sqlx::query(&sql)
            .bind(kind.as_str())
            .bind(local.to_string_lossy().to_string())
            .bind(remote)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }

    pub async fn get_transfer(&self, id: TransferId) -> Result<Option<TransferRecord>> {
        let sql = format!("SELECT {COLUMNS} FROM transfers WHERE id = ?1");
        let row = sqlx::query(&sql)
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(record_from_row).transpose()
    }
}
