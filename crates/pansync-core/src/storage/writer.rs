//! Concurrent offset writer for `.part` files.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
#[cfg(unix)]
use std::os::unix::fs::FileExt;

/// Shared handle on a `.part` file. Clones write through the same descriptor;
/// each `write_at` is an independent pwrite.
#[derive(Clone)]
pub struct PartFile {
    file: Arc<File>,
    path: PathBuf,
}

impl PartFile {
    pub(crate) fn from_file(file: File, path: PathBuf) -> Self {
        Self {
            file: Arc::new(file),
            path,
        }
    }

    /// Re-open a file created by an earlier attempt (no truncation).
    pub fn open_existing(path: &Path) -> io::Result<Self> {
        let file = File::options().read(true).write(true).open(path)?;
        Ok(Self::from_file(file, path.to_path_buf()))
    }

    #[cfg(unix)]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        self.file.write_all_at(data, offset)
    }

    /// Seek + write on a cloned descriptor; not safe for concurrent use.
    #[cfg(not(unix))]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        use std::io::{Seek, SeekFrom, Write};
        let mut f = self.file.try_clone()?;
        f.seek(SeekFrom::Start(offset))?;
        f.write_all(data)
    }

    pub fn sync(&self) -> io::Result<()> {
        self.file.sync_all()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Rename onto `final_path`. Other clones keep the (renamed) file open.
    pub fn finalize(self, final_path: &Path) -> io::Result<()> {
        let path = self.path.clone();
        drop(self.file);
        std::fs::rename(&path, final_path)
    }
}
