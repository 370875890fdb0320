//! Persistent transfer records (SQLite via sqlx).
//!
//! One row per transfer task: direction, paths, state, chunk size, upload
//! session id, done-slice bitmap, and the source size, mtime and IV captured
//! on the first attempt, so a later process can resume it.

mod db;
mod read;
mod types;
mod write;

pub use db::TransferDb;
pub use types::*;

#[cfg(test)]
mod tests;
