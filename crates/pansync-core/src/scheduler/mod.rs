//! Account scheduling.
//!
//! One control task per account pulls queued transfers from its folders,
//! round-robin, under the running/failed caps. Remote listings go through a
//! single spaced queue per account, and cron triggers start, stop, or
//! re-check folders.

mod account;
mod caps;
mod listing;
mod progress;
mod trigger;

pub use account::{AccountManager, AccountSettings, AccountSnapshot, FailedTransfer};
pub use caps::TaskBudget;
pub use listing::ListingQueue;
pub use progress::ProgressStats;
pub use trigger::{parse_cron, FolderTrigger, TriggerAction, TriggerError};
