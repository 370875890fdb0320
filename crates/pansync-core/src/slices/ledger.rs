//! Done / pending / in-flight bookkeeping for one task's slices.

use std::collections::{BTreeSet, VecDeque};

use super::bitmap::SliceBitmap;

/// Every index in `0..total` is in exactly one of done, pending, or in-flight.
#[derive(Debug, Clone)]
pub struct SliceLedger {
    total: usize,
    done: BTreeSet<usize>,
    pending: VecDeque<usize>,
    in_flight: BTreeSet<usize>,
}

impl SliceLedger {
    pub fn new(total: usize) -> Self {
        Self {
            total,
            done: BTreeSet::new(),
            pending: (0..total).collect(),
            in_flight: BTreeSet::new(),
        }
    }

    /// Ledger whose `done` indices come from a previous attempt.
    pub fn with_done<I: IntoIterator<Item = usize>>(total: usize, done: I) -> Self {
        let mut ledger = Self::new(total);
        for i in done {
            ledger.mark_done(i);
        }
        ledger
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn done_count(&self) -> usize {
        self.done.len()
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn is_done(&self, index: usize) -> bool {
        self.done.contains(&index)
    }

    pub fn is_complete(&self) -> bool {
        self.done.len() == self.total
    }

    /// Move the front pending index to in-flight.
    pub fn take_next(&mut self) -> Option<usize> {
        let index = self.pending.pop_front()?;
        self.in_flight.insert(index);
        Some(index)
    }

    /// Move an index to done, from wherever it is.
    pub fn mark_done(&mut self, index: usize) {
        if index >= self.total {
            return;
        }
        self.in_flight.remove(&index);
        self.pending.retain(|&i| i != index);
        self.done.insert(index);
    }

    /// Put an in-flight index back at the front of the queue.
    pub fn requeue(&mut self, index: usize) {
        if self.in_flight.remove(&index) {
            self.pending.push_front(index);
        }
    }

    /// Return every in-flight index to the front, lowest first.
    pub fn requeue_all(&mut self) {
        let in_flight = std::mem::take(&mut self.in_flight);
        for index in in_flight.into_iter().rev() {
            self.pending.push_front(index);
        }
    }

    pub fn bitmap(&self) -> SliceBitmap {
        SliceBitmap::from_done(self.done.iter().copied(), self.total)
    }

    #[cfg(test)]
    pub(crate) fn check_partition(&self) {
        let mut seen = vec![0u8; self.total];
        for &i in self.done.iter().chain(self.pending.iter()).chain(self.in_flight.iter()) {
            seen[i] += 1;
        }
        assert!(seen.iter().all(|&n| n == 1), "ledger not a partition: {self:?}");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_holds_through_lifecycle() {
        let mut l = SliceLedger::new(5);
        l.check_partition();
        let a = l.take_next().unwrap();
        let b = l.take_next().unwrap();
        assert_eq!((a, b), (0, 1));
        l.check_partition();
        l.mark_done(a);
        l.requeue(b);
        l.check_partition();
        assert_eq!(l.take_next(), Some(1));
        l.take_next();
        l.requeue_all();
        l.check_partition();
        assert_eq!(l.take_next(), Some(1));
        assert_eq!(l.in_flight_count(), 1);
    }

    #[test]
    fn resume_skips_done() {
        let mut l = SliceLedger::with_done(4, [0, 2]);
        l.check_partition();
        assert_eq!(l.take_next(), Some(1));
        assert_eq!(l.take_next(), Some(3));
        assert_eq!(l.take_next(), None);
        l.mark_done(1);
        l.mark_done(3);
        assert!(l.is_complete());
        assert_eq!(l.bitmap().iter_set(4).count(), 4);
    }

    #[test]
    fn out_of_range_ignored() {
        let mut l = SliceLedger::new(2);
        l.mark_done(7);
        l.check_partition();
        assert_eq!(l.done_count(), 0);
    }
}
