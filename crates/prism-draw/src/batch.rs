//! Batch cursor bookkeeping: the `[start, end)` vertex range pending in
//! the current frame slot's storage.

use std::ops::Range;

/// Tracks the open batch inside a fixed-capacity vertex region. The
/// capacity is a hard bound; when an append cannot fit, the caller must
/// force a frame submission (which resets the region) before retrying.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BatchRange {
    start: u32,
    end: u32,
    capacity: u32,
}

impl BatchRange {
    pub fn new(capacity: u32) -> Self {
        Self {
            start: 0,
            end: 0,
            capacity,
        }
    }

    /// Vertices appended since the last flush.
    pub fn pending(&self) -> u32 {
        self.end - self.start
    }

    /// Whether `count` more vertices fit in the region.
    pub fn fits(&self, count: u32) -> bool {
        self.end + count <= self.capacity
    }

    /// Reserves space for `count` vertices and returns the write position.
    pub fn append(&mut self, count: u32) -> u32 {
        assert!(self.fits(count), "vertex region capacity exceeded");
        let at = self.end;
        self.end += count;
        at
    }

    /// Closes the open batch, returning its range; the next batch starts
    /// where this one ended.
    pub fn take(&mut self) -> Range<u32> {
        let range = self.start..self.end;
        self.start = self.end;
        range
    }

    /// Resets both cursors for a fresh frame region.
    pub fn reset(&mut self) {
        self.start = 0;
        self.end = 0;
    }
}
