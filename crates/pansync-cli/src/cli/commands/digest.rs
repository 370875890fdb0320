//! `pansync digest` – whole-file content digest.

use anyhow::{Context, Result};
use pansync_core::codec::{digest_middle, file_md5};
use std::path::Path;

pub async fn run_digest(path: &Path) -> Result<()> {
    let owned = path.to_path_buf();
    let digest = tokio::task::spawn_blocking(move || file_md5(&owned, None))
        .await?
        .with_context(|| format!("reading {}", path.display()))?;
    let middle = digest_middle(&digest).unwrap_or_default();
    println!("{}  {}  {}", digest, middle, path.display());
    Ok(())
}
