//! Persisted done-set: one bit per slice (LSB = slice 0).

/// Done-slice bitmap stored as a DB BLOB. Only the first `ceil(slice_count/8)`
/// bytes are significant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SliceBitmap {
    bytes: Vec<u8>,
}

impl SliceBitmap {
    pub fn new(slice_count: usize) -> Self {
        SliceBitmap {
            bytes: vec![0u8; slice_count.div_ceil(8)],
        }
    }

    /// Extra bytes are ignored; missing bytes read as 0.
    pub fn from_bytes(bytes: &[u8], slice_count: usize) -> Self {
        let len = slice_count.div_ceil(8);
        let mut b = vec![0u8; len];
        let copy = bytes.len().min(len);
        b[..copy].copy_from_slice(&bytes[..copy]);
        SliceBitmap { bytes: b }
    }

    pub fn from_done<I: IntoIterator<Item = usize>>(done: I, slice_count: usize) -> Self {
        let mut b = Self::new(slice_count);
        for i in done {
            b.set(i);
        }
        b
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn set(&mut self, index: usize) {
        let byte_idx = index / 8;
        if byte_idx >= self.bytes.len() {
            self.bytes.resize(byte_idx + 1, 0);
        }
        self.bytes[byte_idx] |= 1 << (index % 8);
    }

    pub fn is_set(&self, index: usize) -> bool {
        self.bytes
            .get(index / 8)
            .map(|&b| b & (1 << (index % 8)) != 0)
            .unwrap_or(false)
    }

    pub fn count(&self, slice_count: usize) -> usize {
        (0..slice_count).filter(|&i| self.is_set(i)).count()
    }

    /// Indices in `[0, slice_count)` that are set.
    pub fn iter_set(&self, slice_count: usize) -> impl Iterator<Item = usize> + '_ {
        (0..slice_count).filter(move |&i| self.is_set(i))
    }
}
