use crate::domain::UpdateId;

/// Last update id this process has consumed.
///
/// Only ever moves forward. Process-local: a restart begins again from the configured offset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cursor {
    last: i64,
}

impl Cursor {
    pub fn new(start: i64) -> Self {
        Self {
            last: start.max(0),
        }
    }

    pub fn last(&self) -> i64 {
        self.last
    }

    /// Offset to request next: strictly after everything seen so far.
    pub fn next_offset(&self) -> i64 {
        self.last + 1
    }

    /// True if `id` has not been consumed yet.
    pub fn is_fresh(&self, id: UpdateId) -> bool {
        id.0 > self.last
    }

    /// Move to `id` if it is ahead; returns whether the cursor moved.
    pub fn advance(&mut self, id: UpdateId) -> bool {
        if id.0 > self.last {
            self.last = id.0;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn never_moves_backwards() {
        let mut c = Cursor::new(0);
        assert_eq!(c.next_offset(), 1);
        assert!(c.advance(UpdateId(3)));
        assert!(!c.advance(UpdateId(2)));
        assert!(!c.advance(UpdateId(3)));
        assert_eq!(c.last(), 3);
        assert_eq!(c.next_offset(), 4);
        assert!(!c.is_fresh(UpdateId(3)));
        assert!(c.is_fresh(UpdateId(4)));
    }

    #[test]
    fn negative_start_clamps_to_zero() {
        assert_eq!(Cursor::new(-5).last(), 0);
    }
}
