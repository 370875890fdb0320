pub mod config;
pub mod logging;

pub mod codec;
pub mod error;
pub mod pool;
pub mod remote;
pub mod retry;
pub mod scheduler;
pub mod slices;
pub mod step;
pub mod storage;
pub mod sync;
pub mod task;
pub mod transfer_db;
