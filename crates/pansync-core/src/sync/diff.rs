//! Three-way tree diff and the ordered plan a sync pass executes.

use std::collections::BTreeSet;

use super::tree::{FileStat, TreeSnapshot};
use crate::codec::ChunkLayout;
use crate::config::{ConflictPolicy, Direction};

/// Set differences between a local and a remote snapshot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TreeDiff {
    pub local_only_folders: BTreeSet<String>,
    pub local_only_files: BTreeSet<String>,
    pub remote_only_folders: BTreeSet<String>,
    pub remote_only_files: BTreeSet<String>,
    /// On both sides with differing size or mtime.
    pub changed_files: BTreeSet<String>,
    /// Excluded on either side.
    pub excluded: BTreeSet<String>,
}

impl TreeDiff {
    pub fn is_empty(&self) -> bool {
        self.local_only_folders.is_empty()
            && self.local_only_files.is_empty()
            && self.remote_only_folders.is_empty()
            && self.remote_only_files.is_empty()
            && self.changed_files.is_empty()
    }
}

/// Size the remote stores for a local file: the encrypted transfer size when
/// the folder has a key.
fn stored_size(local: &FileStat, encrypted: bool) -> Option<u64> {
    if !encrypted {
        return Some(local.size);
    }
    ChunkLayout::select(local.size, true)
        .ok()
        .map(|l| l.transfer_size())
}

pub fn diff_trees(local: &TreeSnapshot, remote: &TreeSnapshot, encrypted: bool) -> TreeDiff {
    let mut diff = TreeDiff {
        excluded: local.excluded.union(&remote.excluded).cloned().collect(),
        ..TreeDiff::default()
    };
    diff.local_only_folders = local.folders.difference(&remote.folders).cloned().collect();
    diff.remote_only_folders = remote.folders.difference(&local.folders).cloned().collect();

    for (path, stat) in &local.files {
        match remote.files.get(path) {
            None => {
                diff.local_only_files.insert(path.clone());
            }
            Some(r) => {
                if stored_size(stat, encrypted) != Some(r.size) || stat.mtime != r.mtime {
                    diff.changed_files.insert(path.clone());
                }
            }
        }
    }
    diff.remote_only_files = remote
        .files
        .keys()
        .filter(|p| !local.files.contains_key(*p))
        .cloned()
        .collect();
    diff
}

fn is_ancestor(ancestor: &str, path: &str) -> bool {
    path.len() > ancestor.len()
        && path.starts_with(ancestor)
        && path.as_bytes()[ancestor.len()] == b'/'
}

/// Folders to create, keeping only those that are not a parent of another
/// folder to create. Creating the deepest folder creates its parents.
pub fn longest_entries(folders: &BTreeSet<String>) -> Vec<String> {
    folders
        .iter()
        .filter(|f| !folders.iter().any(|other| is_ancestor(f, other)))
        .cloned()
        .collect()
}

/// Paths to delete, keeping only the shortest ones: a folder that holds an
/// excluded path is kept (its other contents are deleted one by one), and
/// anything below a folder that is deleted whole is dropped.
pub fn shortest_entries(
    folders: &BTreeSet<String>,
    files: &BTreeSet<String>,
    excluded: &BTreeSet<String>,
) -> Vec<String> {
    let deletable: BTreeSet<&String> = folders
        .iter()
        .filter(|f| !excluded.iter().any(|x| is_ancestor(f, x)))
        .collect();
    let covered = |p: &str| deletable.iter().any(|d| is_ancestor(d, p));

    let mut out: Vec<String> = deletable
        .iter()
        .filter(|f| !covered(f))
        .map(|f| (*f).clone())
        .chain(files.iter().filter(|f| !covered(f)).cloned())
        .collect();
    out.sort();
    out
}

/// How a folder reconciles its two sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncPolicy {
    pub direction: Direction,
    pub conflict: ConflictPolicy,
    /// Propagate deletions, not only creations and modifications.
    pub delete: bool,
}

/// Work computed by one sync pass, all paths relative to the sync root.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncPlan {
    pub upload: Vec<String>,
    pub download: Vec<String>,
    pub local_create: Vec<String>,
    pub local_delete: Vec<String>,
    pub remote_create: Vec<String>,
    pub remote_delete: Vec<String>,
}

impl SyncPlan {
    pub fn is_empty(&self) -> bool {
        self.upload.is_empty()
            && self.download.is_empty()
            && self.local_create.is_empty()
            && self.local_delete.is_empty()
            && self.remote_create.is_empty()
            && self.remote_delete.is_empty()
    }
}

pub fn plan_sync(diff: &TreeDiff, policy: SyncPolicy) -> SyncPlan {
    let mut plan = SyncPlan::default();

    // Which side's additions are propagated. With deletion on, a mixed folder
    // treats the winning side as authoritative.
    let (push_local, push_remote) = match policy.direction {
        Direction::Upload => (true, false),
        Direction::Download => (false, true),
        Direction::Mixed => match (policy.delete, policy.conflict) {
            (false, _) => (true, true),
            (true, ConflictPolicy::LocalWins) => (true, false),
            (true, ConflictPolicy::RemoteWins) => (false, true),
        },
    };

    if push_local {
        plan.upload.extend(diff.local_only_files.iter().cloned());
        plan.remote_create = longest_entries(&diff.local_only_folders);
        if policy.delete {
            plan.remote_delete = shortest_entries(
                &diff.remote_only_folders,
                &diff.remote_only_files,
                &diff.excluded,
            );
        }
    }
    if push_remote {
        plan.download.extend(diff.remote_only_files.iter().cloned());
        plan.local_create = longest_entries(&diff.remote_only_folders);
        if policy.delete {
            plan.local_delete = shortest_entries(
                &diff.local_only_folders,
                &diff.local_only_files,
                &diff.excluded,
            );
        }
    }

    let changed = diff.changed_files.iter().cloned();
    match policy.direction {
        Direction::Upload => plan.upload.extend(changed),
        Direction::Download => plan.download.extend(changed),
        Direction::Mixed => match policy.conflict {
            ConflictPolicy::LocalWins => plan.upload.extend(changed),
            ConflictPolicy::RemoteWins => plan.download.extend(changed),
        },
    }
    plan.upload.sort();
    plan.download.sort();
    plan
}
