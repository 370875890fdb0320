//! Per-account task caps.
//!
//! An account runs at most `max_running` healthy transfer tasks and stops
//! pulling new work while `max_failed` failed tasks are waiting to be retried
//! or cleared. Only the account's control task touches the counters.

#[derive(Debug, Clone)]
pub struct TaskBudget {
    max_running: usize,
    max_failed: usize,
    running: usize,
    failed: usize,
}

impl TaskBudget {
    pub fn new(max_running: usize, max_failed: usize) -> Self {
        Self {
            max_running: max_running.max(1),
            max_failed: max_failed.max(1),
            running: 0,
            failed: 0,
        }
    }

    pub fn running(&self) -> usize {
        self.running
    }

    pub fn failed(&self) -> usize {
        self.failed
    }

    /// Tasks that may start now; 0 while too many tasks are failed.
    pub fn available(&self) -> usize {
        if self.failed >= self.max_failed {
            return 0;
        }
        self.max_running.saturating_sub(self.running)
    }

    /// Take one running slot. False when none is available.
    pub fn reserve(&mut self) -> bool {
        if self.available() == 0 {
            return false;
        }
        self.running += 1;
        true
    }

    /// A running task ended; `failed` moves it to the failed count.
    pub fn release(&mut self, failed: bool) {
        self.running = self.running.saturating_sub(1);
        if failed {
            self.failed += 1;
        }
    }

    /// `n` failed tasks were retried or cleared.
    pub fn forget_failed(&mut self, n: usize) {
        self.failed = self.failed.saturating_sub(n);
    }
}
