//! Creating and preallocating `.part` files.

use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use super::writer::PartFile;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// Builder for a new `.part` file. Call `preallocate` then `build` to get a
/// [`PartFile`] that supports concurrent `write_at` from several workers.
pub struct PartFileBuilder {
    file: File,
    path: PathBuf,
}

impl PartFileBuilder {
    /// Create (or truncate) the file at `path`.
    pub fn create(path: &Path) -> io::Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;
        Ok(PartFileBuilder {
            file,
            path: path.to_path_buf(),
        })
    }

    /// Reserve `size` bytes. On Unix tries `posix_fallocate`; falls back to
    /// `set_len` on failure or elsewhere.
    pub fn preallocate(&mut self, size: u64) -> io::Result<()> {
        #[cfg(unix)]
        {
            if size > 0 {
                let fd = self.file.as_raw_fd();
                let r = unsafe { libc::posix_fallocate(fd, 0, size as libc::off_t) };
                if r == 0 {
                    return Ok(());
                }
                tracing::debug!(errno = r, "posix_fallocate failed, falling back to set_len");
            }
        }
        self.file.set_len(size)
    }

    pub fn build(self) -> PartFile {
        PartFile::from_file(self.file, self.path)
    }
}
