//! Local file I/O for transfers.
//!
//! Downloads land in a preallocated `<final>.part` (fallocate on Unix when
//! available, else `set_len`), filled by concurrent offset writes from slice
//! workers, then renamed onto the final path. Uploads read plaintext at
//! chunk-derived offsets.

mod builder;
mod reader;
mod writer;

use std::path::{Path, PathBuf};

pub use builder::PartFileBuilder;
pub use reader::SliceReader;
pub use writer::PartFile;

/// Suffix of in-progress download files.
pub const PART_SUFFIX: &str = ".part";

/// `file.iso` → `file.iso.part`.
pub fn part_path(final_path: &Path) -> PathBuf {
    let mut o = final_path.as_os_str().to_owned();
    o.push(PART_SUFFIX);
    PathBuf::from(o)
}

/// Seconds since the Unix epoch of a file's mtime.
pub fn mtime_secs(meta: &std::fs::Metadata) -> std::io::Result<i64> {
    let modified = meta.modified()?;
    Ok(modified
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0))
}

/// Set a file's mtime to `secs` since the epoch.
pub fn set_mtime(path: &Path, secs: i64) -> std::io::Result<()> {
    let when = std::time::UNIX_EPOCH + std::time::Duration::from_secs(secs.max(0) as u64);
    std::fs::File::options()
        .write(true)
        .open(path)?
        .set_modified(when)
}
