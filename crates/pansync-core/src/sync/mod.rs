//! Folder synchronization: tree scans, diff, plan, and the per-folder pass.

mod diff;
mod exclude;
mod folder;
mod tree;

pub use diff::{
    diff_trees, longest_entries, plan_sync, shortest_entries, SyncPlan, SyncPolicy, TreeDiff,
};
pub use exclude::ExcludeSet;
pub use folder::{Folder, QueuedTransfer, SyncReport, REMOTE_DELETE_BATCH};
pub use tree::{scan_local, FileStat, TreeSnapshot};
