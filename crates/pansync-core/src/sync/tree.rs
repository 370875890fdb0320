//! Snapshots of the local and remote trees under a sync root.
//!
//! Paths are relative to the root, `/`-separated, without a leading slash.

use std::collections::{BTreeMap, BTreeSet};
use std::io;
use std::path::Path;

use walkdir::WalkDir;

use super::exclude::ExcludeSet;
use crate::remote::{relative_remote, RemoteEntry};
use crate::storage::{mtime_secs, PART_SUFFIX};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileStat {
    pub size: u64,
    pub mtime: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeSnapshot {
    pub folders: BTreeSet<String>,
    pub files: BTreeMap<String, FileStat>,
    /// Paths that matched an exclude pattern (their descendants are not listed).
    pub excluded: BTreeSet<String>,
}

impl TreeSnapshot {
    pub fn is_empty(&self) -> bool {
        self.folders.is_empty() && self.files.is_empty()
    }

    /// Build from a recursive remote listing under `root`.
    pub fn from_remote(root: &str, entries: &[RemoteEntry], excludes: &ExcludeSet) -> Self {
        let mut tree = TreeSnapshot::default();
        for entry in entries {
            let Some(rel) = relative_remote(root, &entry.path) else {
                continue;
            };
            if rel.is_empty() {
                continue;
            }
            if excludes.excludes(rel) {
                if excludes.matches(rel) {
                    tree.excluded.insert(rel.to_string());
                }
                continue;
            }
            if entry.is_dir {
                tree.folders.insert(rel.to_string());
            } else {
                tree.files.insert(
                    rel.to_string(),
                    FileStat {
                        size: entry.size,
                        mtime: entry.mtime,
                    },
                );
            }
        }
        tree
    }
}

/// Walk a local root. In-progress `.part` downloads are reported as excluded
/// so the folder holding them is never deleted under a running download.
pub fn scan_local(root: &Path, excludes: &ExcludeSet) -> io::Result<TreeSnapshot> {
    let mut tree = TreeSnapshot::default();
    let mut excluded = BTreeSet::new();
    let walker = WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|e| {
            let rel = relative_local(root, e.path());
            let skip = rel.as_deref().is_some_and(|r| excludes.matches(r));
            if skip {
                if let Some(r) = rel {
                    excluded.insert(r);
                }
            }
            !skip
        });

    for item in walker {
        let item = item.map_err(io::Error::other)?;
        let Some(rel) = relative_local(root, item.path()) else {
            continue;
        };
        let file_type = item.file_type();
        if file_type.is_dir() {
            tree.folders.insert(rel);
        } else if file_type.is_file() {
            if rel.ends_with(PART_SUFFIX) {
                tree.excluded.insert(rel);
                continue;
            }
            let meta = item.metadata().map_err(io::Error::other)?;
            tree.files.insert(
                rel,
                FileStat {
                    size: meta.len(),
                    mtime: mtime_secs(&meta)?,
                },
            );
        }
    }
    tree.excluded.extend(excluded);
    Ok(tree)
}

fn relative_local(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<_> = rel
        .components()
        .map(|c| c.as_os_str().to_string_lossy().into_owned())
        .collect();
    (!parts.is_empty()).then(|| parts.join("/"))
}
