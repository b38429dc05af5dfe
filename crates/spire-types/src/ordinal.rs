use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

/// Total-order label produced by Prime: `(ord_num, event_idx, event_tot)`.
///
/// `ord_num` is Prime's sequence number; one Prime slot can be split into a
/// vector of `event_tot` sub-events, each addressed by `event_idx` (1-based).
/// Two ordinals compare lexicographically on `(ord_num, event_idx)` --
/// `event_tot` carries no ordering information, only the bound used by
/// [`Ordinal::is_consecutive`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ordinal {
    pub ord_num: u64,
    pub event_idx: u32,
    pub event_tot: u32,
}

impl Ordinal {
    pub const ZERO: Ordinal = Ordinal {
        ord_num: 0,
        event_idx: 0,
        event_tot: 0,
    };

    pub fn new(ord_num: u64, event_idx: u32, event_tot: u32) -> Self {
        Self {
            ord_num,
            event_idx,
            event_tot,
        }
    }

    /// First sub-event of a Prime slot: `(ord_num, 1, event_tot)`.
    pub fn first_event(ord_num: u64, event_tot: u32) -> Self {
        Self::new(ord_num, 1, event_tot)
    }

    fn key(self) -> (u64, u32) {
        (self.ord_num, self.event_idx)
    }

    /// True if `self` directly precedes `next`: either `next` advances
    /// `event_idx` by one within the same Prime slot, or `next` starts a new
    /// slot (`event_idx == 1`) immediately following `self`'s last sub-event
    /// (`self.event_idx == self.event_tot`).
    pub fn is_consecutive(self, next: Ordinal) -> bool {
        if self.ord_num == next.ord_num {
            next.event_idx == self.event_idx + 1
        } else {
            next.ord_num == self.ord_num + 1 && self.event_idx == self.event_tot && next.event_idx == 1
        }
    }
}

impl PartialOrd for Ordinal {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Ordinal {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.key().cmp(&other.key())
    }
}

impl Display for Ordinal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}/{})", self.ord_num, self.event_idx, self.event_tot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn consecutive_within_slot() {
        let a = Ordinal::new(5, 1, 3);
        let b = Ordinal::new(5, 2, 3);
        assert!(a.is_consecutive(b));
        assert!(a < b);
    }

    #[test]
    fn consecutive_across_slot_boundary() {
        let a = Ordinal::new(5, 3, 3);
        let b = Ordinal::new(6, 1, 1);
        assert!(a.is_consecutive(b));
        assert!(a < b);
    }

    #[test]
    fn not_consecutive_when_slot_not_exhausted() {
        let a = Ordinal::new(5, 2, 3);
        let b = Ordinal::new(6, 1, 1);
        assert!(!a.is_consecutive(b));
    }

    #[test]
    fn not_consecutive_when_ord_num_skips() {
        let a = Ordinal::new(5, 3, 3);
        let b = Ordinal::new(7, 1, 1);
        assert!(!a.is_consecutive(b));
    }

    #[test]
    fn event_tot_does_not_affect_ordering() {
        let a = Ordinal::new(1, 1, 10);
        let b = Ordinal::new(1, 1, 2);
        assert_eq!(a.cmp(&b), std::cmp::Ordering::Equal);
    }

    proptest! {
        #[test]
        fn ordering_is_lexicographic_on_ord_num_then_event_idx(
            a_ord in 0u64..1000, a_idx in 0u32..50,
            b_ord in 0u64..1000, b_idx in 0u32..50,
        ) {
            let a = Ordinal::new(a_ord, a_idx, a_idx.max(1));
            let b = Ordinal::new(b_ord, b_idx, b_idx.max(1));
            let expected = (a_ord, a_idx).cmp(&(b_ord, b_idx));
            prop_assert_eq!(a.cmp(&b), expected);
        }
    }
}
