//! Resume guard: a transfer may only continue if its source is unchanged.

use std::fmt;
use std::io;
use std::path::Path;

use crate::storage::mtime_secs;

/// Size and mtime of a transfer's source (the local file of an upload, the
/// remote file of a download) at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSnapshot {
    pub size: u64,
    pub mtime: i64,
}

impl SourceSnapshot {
    pub fn capture(path: &Path) -> io::Result<Self> {
        let meta = std::fs::metadata(path)?;
        if meta.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} is a directory", path.display()),
            ));
        }
        Ok(Self {
            size: meta.len(),
            mtime: mtime_secs(&meta)?,
        })
    }
}

/// What changed between the first attempt and now.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceChange {
    pub size_changed: bool,
    pub mtime_changed: bool,
}

impl fmt::Display for SourceChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "local source changed")?;
        match (self.size_changed, self.mtime_changed) {
            (true, true) => write!(f, " (size, mtime)"),
            (true, false) => write!(f, " (size)"),
            (false, true) => write!(f, " (mtime)"),
            (false, false) => Ok(()),
        }
    }
}

impl std::error::Error for SourceChange {}

/// Ok when nothing was captured yet (first attempt) or nothing changed.
pub fn validate_for_resume(
    stored: Option<&SourceSnapshot>,
    current: &SourceSnapshot,
) -> Result<(), SourceChange> {
    let Some(stored) = stored else {
        return Ok(());
    };
    let change = SourceChange {
        size_changed: stored.size != current.size,
        mtime_changed: stored.mtime != current.mtime,
    };
    if change.size_changed || change.mtime_changed {
        return Err(change);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(size: u64, mtime: i64) -> SourceSnapshot {
        SourceSnapshot { size, mtime }
    }

    #[test]
    fn first_attempt_always_ok() {
        assert!(validate_for_resume(None, &snap(1, 2)).is_ok());
    }

    #[test]
    fn unchanged_ok() {
        assert!(validate_for_resume(Some(&snap(10, 100)), &snap(10, 100)).is_ok());
    }

    #[test]
    fn mtime_change_rejected() {
        let err = validate_for_resume(Some(&snap(10, 100)), &snap(10, 101)).unwrap_err();
        assert!(err.mtime_changed);
        assert!(!err.size_changed);
        assert_eq!(err.to_string(), "local source changed (mtime)");
    }

    #[test]
    fn size_and_mtime_reported() {
        let err = validate_for_resume(Some(&snap(10, 100)), &snap(11, 101)).unwrap_err();
        assert_eq!(err.to_string(), "local source changed (size, mtime)");
    }

    #[test]
    fn capture_rejects_directories() {
        let dir = tempfile::tempdir().unwrap();
        assert!(SourceSnapshot::capture(dir.path()).is_err());
        let f = dir.path().join("f");
        std::fs::write(&f, b"abc").unwrap();
        assert_eq!(SourceSnapshot::capture(&f).unwrap().size, 3);
    }
}
