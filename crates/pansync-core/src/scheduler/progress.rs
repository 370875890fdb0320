//! Progress reporting for transfer tasks (bytes moved, ETA, rate).
//!
//! Consumers compute rate = bytes_done / elapsed_secs and
//! ETA = (total_bytes - bytes_done) / rate.

use std::time::Duration;

use crate::task::TransferInfo;

/// Snapshot of one task's progress (CLI-friendly).
#[derive(Debug, Clone)]
pub struct ProgressStats {
    /// Bytes moved over the network so far.
    pub bytes_done: u64,
    /// Bytes the whole transfer moves (0 until known).
    pub total_bytes: u64,
    pub elapsed_secs: f64,
    pub slices_done: usize,
    pub slice_count: usize,
}

impl ProgressStats {
    pub fn from_info(info: &TransferInfo, elapsed: Duration) -> Self {
        Self {
            bytes_done: info.bytes_moved,
            total_bytes: info.transfer_size.unwrap_or(0),
            elapsed_secs: elapsed.as_secs_f64(),
            slices_done: info.slices_done,
            slice_count: info.slice_count,
        }
    }

    /// Bytes per second (0 if elapsed is 0).
    pub fn bytes_per_sec(&self) -> f64 {
        if self.elapsed_secs <= 0.0 {
            return 0.0;
        }
        self.bytes_done as f64 / self.elapsed_secs
    }

    /// Estimated seconds remaining (None if rate is 0).
    pub fn eta_secs(&self) -> Option<f64> {
        let remaining = self.total_bytes.saturating_sub(self.bytes_done);
        if remaining == 0 {
            return Some(0.0);
        }
        let rate = self.bytes_per_sec();
        if rate <= 0.0 {
            return None;
        }
        Some(remaining as f64 / rate)
    }

    /// Fraction complete in [0.0, 1.0].
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return if self.slice_count > 0 && self.slices_done >= self.slice_count {
                1.0
            } else {
                0.0
            };
        }
        (self.bytes_done as f64 / self.total_bytes as f64).min(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::step::StepStatus;
    use crate::task::TransferKind;

    fn info(moved: u64, total: Option<u64>) -> TransferInfo {
        TransferInfo {
            kind: TransferKind::Upload,
            local: "/tmp/x".into(),
            remote: "/x".into(),
            original_size: total,
            transfer_size: total,
            chunk_mb: Some(4),
            bytes_moved: moved,
            slices_done: 1,
            slice_count: 4,
            step: None,
            status: StepStatus::Running,
            last_error: None,
        }
    }

    #[test]
    fn rate_eta_fraction() {
        let p = ProgressStats::from_info(&info(500, Some(1000)), Duration::from_secs(5));
        assert_eq!(p.bytes_per_sec(), 100.0);
        assert_eq!(p.eta_secs(), Some(5.0));
        assert_eq!(p.fraction(), 0.5);
    }

    #[test]
    fn unknown_total_and_zero_elapsed() {
        let p = ProgressStats::from_info(&info(0, None), Duration::ZERO);
        assert_eq!(p.bytes_per_sec(), 0.0);
        assert_eq!(p.fraction(), 0.0);
        assert_eq!(p.eta_secs(), Some(0.0));
    }
}
