//! Slice bookkeeping: the in-memory ledger and its persisted bitmap form.

mod bitmap;
mod ledger;

pub use bitmap::SliceBitmap;
pub use ledger::SliceLedger;
