//! Shared fixtures: a scratch local root and a directory-backed remote.
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use pansync_core::config::{ConflictPolicy, Direction, FolderConfig};
use pansync_core::remote::{DirRemote, RemoteDisk, UploadEndpointCache};
use pansync_core::retry::RetryPolicy;
use pansync_core::task::TransferOptions;
use tempfile::TempDir;

pub const MIB: usize = 1024 * 1024;

/// Deterministic, non-repeating-per-chunk bytes.
pub fn pattern(len: usize) -> Vec<u8> {
    (0..len).map(|i| ((i * 7 + i / 4093) % 251) as u8).collect()
}

/// Builds files and folders under a root.
pub struct Tree {
    root: PathBuf,
}

impl Tree {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        std::fs::create_dir_all(&root).unwrap();
        Tree { root }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn file(&self, rel: &str, data: &[u8]) -> &Self {
        let path = self.root.join(rel);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).unwrap();
        }
        std::fs::write(path, data).unwrap();
        self
    }

    pub fn dir(&self, rel: &str) -> &Self {
        std::fs::create_dir_all(self.root.join(rel)).unwrap();
        self
    }

    pub fn read(&self, rel: &str) -> Vec<u8> {
        std::fs::read(self.root.join(rel)).unwrap()
    }

    pub fn exists(&self, rel: &str) -> bool {
        self.root.join(rel).exists()
    }
}

pub struct World {
    _dir: TempDir,
    pub local: Tree,
    pub remote_disk: Tree,
    pub disk: Arc<DirRemote>,
    pub endpoints: Arc<UploadEndpointCache>,
}

pub fn world() -> World {
    let dir = tempfile::tempdir().unwrap();
    let local = Tree::new(dir.path().join("local"));
    let remote_disk = Tree::new(dir.path().join("remote"));
    let disk = Arc::new(DirRemote::new(remote_disk.root().to_path_buf()));
    World {
        _dir: dir,
        local,
        remote_disk,
        disk,
        endpoints: Arc::new(UploadEndpointCache::with_system_clock(Duration::from_secs(3600))),
    }
}

impl World {
    pub fn remote(&self) -> Arc<dyn RemoteDisk> {
        self.disk.clone()
    }

    pub fn folder(&self, remote: &str, direction: Direction, delete: bool) -> FolderConfig {
        FolderConfig {
            id: "docs".into(),
            local: self.local.root().to_path_buf(),
            remote: remote.into(),
            key: None,
            direction,
            conflict: ConflictPolicy::LocalWins,
            delete,
            trigger: None,
            exclude: Vec::new(),
        }
    }
}

/// No per-call retry and no pool respawn: the first failure fails the step.
pub fn strict_opts(threads: usize) -> TransferOptions {
    TransferOptions {
        threads,
        retry: RetryPolicy::once(),
        pool_max_attempts: 1,
        ..TransferOptions::default()
    }
}
