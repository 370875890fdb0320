//! Row writes: record, progress, state, remove, crash recovery.

use anyhow::{Context, Result};

use super::db::{unix_timestamp, TransferDb};
use super::types::{NewTransfer, TransferId, TransferProgress, TransferState};

impl TransferDb {
    /// Insert a row in state `running`.
    pub async fn record_transfer(&self, new: &NewTransfer) -> Result<TransferId> {
        let now = unix_timestamp();
        let id = sqlx::query(
            r#"
            INSERT INTO transfers (
                direction, local_path, remote_path, state,
                created_at, updated_at
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(new.kind.as_str())
        .bind(new.local.to_string_lossy().to_string())
        .bind(&new.remote)
        .bind(TransferState::Running.as_str())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await?
        .last_insert_rowid();
        Ok(id)
    }

    pub async fn update_progress(&self, id: TransferId, progress: &TransferProgress) -> Result<()> {
        let now = unix_timestamp();
        let source_size = progress
            .source_size
            .map(i64::try_from)
            .transpose()
            .context("source size out of range")?;
        sqlx::query(
            r#"
            UPDATE transfers
            SET chunk_mb = ?1,
                upload_id = ?2,
                slice_count = ?3,
                done_bitmap = ?4,
                source_size = ?5,
                source_mtime = ?6,
                iv = ?7,
                updated_at = ?8
            WHERE id = ?9
            "#,
        )
        .bind(progress.chunk_mb.map(i64::from))
        .bind(&progress.upload_id)
        .bind(progress.slice_count as i64)
        .bind(progress.bitmap.as_bytes())
        .bind(source_size)
        .bind(progress.source_mtime)
        .bind(progress.iv.as_ref().map(|iv| iv.to_vec()))
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// Set the state; `last_error` replaces the stored error (None clears it).
    pub async fn set_state(
        &self,
        id: TransferId,
        state: TransferState,
        last_error: Option<&str>,
    ) -> Result<()> {
        let now = unix_timestamp();
        sqlx::query(
            r#"
            UPDATE transfers
            SET state = ?1,
                last_error = ?2,
                updated_at = ?3
            WHERE id = ?4
            "#,
        )
        .bind(state.as_str())
        .bind(last_error)
        .bind(now)
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn remove_transfer(&self, id: TransferId) -> Result<()> {
        sqlx::query("DELETE FROM transfers WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Mark rows a crashed process left `running` as `stopped`. Returns the
    /// number of rows changed.
    pub async fn recover_running(&self) -> Result<u64> {
        let now = unix_timestamp();
        let r = sqlx::query(
            r#"
            UPDATE transfers
            SET state = 'stopped',
                updated_at = ?1
            WHERE state = 'running'
            "#,
        )
        .bind(now)
        .execute(&self.pool)
        .await?;
        Ok(r.rows_affected())
    }
}
