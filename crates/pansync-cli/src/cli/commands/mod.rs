//! CLI command handlers, one file per command.

mod digest;
mod status;
mod sync;
mod transfer;

pub use digest::run_digest;
pub use status::run_status;
pub use sync::run_sync;
pub use transfer::{run_download, run_upload};
