//! Modular sequence-number space shared by both endpoints.
//!
//! Sequence numbers live in `0..size` and wrap around.  A window is a
//! contiguous run of sequence numbers that may itself wrap:
//!
//! ```text
//!  size = 8, base = 6, len = 4
//!
//!    0   1   2   3   4   5   6   7
//!  ┌───┬───┬───┬───┬───┬───┬───┬───┐
//!  │ ▓ │ ▓ │   │   │   │   │ ▓ │ ▓ │     window = {6, 7, 0, 1}
//!  └───┴───┴───┴───┴───┴───┴───┴───┘
//!    slot 2, 3             slot 0, 1
//! ```
//!
//! Every window lookup goes through [`SeqSpace::slot`], which returns a
//! [`SlotIndex`]: the offset of a sequence number from the window base.  The
//! engines index their buffers with that offset and never do their own
//! modulo arithmetic.

/// Position of a sequence number inside a window, counted from the base.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SlotIndex(usize);

impl SlotIndex {
    pub fn get(self) -> usize {
        self.0
    }
}

/// The integers `0..size` under modular arithmetic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeqSpace {
    size: u32,
}

impl SeqSpace {
    /// Create a sequence space of `size` numbers.
    ///
    /// # Panics
    ///
    /// Panics if `size < 2`; [`crate::config::ProtocolConfig::validate`]
    /// rejects such configurations before an engine is built.
    pub fn new(size: u32) -> Self {
        assert!(size >= 2, "sequence space must hold at least two numbers");
        Self { size }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    /// `true` when `x` is a member of the space at all.
    ///
    /// Header fields rewritten by link noise can hold arbitrary values.
    pub fn contains(&self, x: u32) -> bool {
        x < self.size
    }

    /// `s + n` modulo the space size.
    pub fn add(&self, s: u32, n: u32) -> u32 {
        ((u64::from(s) + u64::from(n)) % u64::from(self.size)) as u32
    }

    /// The successor of `s`.
    pub fn next(&self, s: u32) -> u32 {
        self.add(s, 1)
    }

    /// The predecessor of `s`.
    pub fn prev(&self, s: u32) -> u32 {
        self.add(s, self.size - 1)
    }

    /// Number of steps forward from `from` to reach `to`.
    pub fn distance(&self, from: u32, to: u32) -> u32 {
        ((u64::from(to) + u64::from(self.size) - u64::from(from)) % u64::from(self.size)) as u32
    }

    /// Wraparound-aware membership of `x` in the inclusive range
    /// `[first, last]`.
    ///
    /// When `first <= last` the range is the plain interval; otherwise it
    /// wraps past `size - 1` back to `0`.  Values outside the space are never
    /// members.
    pub fn in_range(&self, x: u32, first: u32, last: u32) -> bool {
        if !self.contains(x) {
            return false;
        }
        if first <= last {
            first <= x && x <= last
        } else {
            x >= first || x <= last
        }
    }

    /// Offset of `x` inside the window of `len` numbers starting at `base`,
    /// or `None` when `x` lies outside that window.
    pub fn slot(&self, x: u32, base: u32, len: usize) -> Option<SlotIndex> {
        if len == 0 {
            return None;
        }
        let last = self.add(base, (len - 1) as u32);
        if self.in_range(x, base, last) {
            Some(SlotIndex(self.distance(base, x) as usize))
        } else {
            None
        }
    }
}
