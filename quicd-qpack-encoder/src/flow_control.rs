//! Encoder stream flow control.
//!
//! The encoder stream is itself subject to transport flow control. If the
//! encoder writes more table mutations than the peer is willing to buffer,
//! instructions queue up behind the window while field sections that
//! reference them are already in flight, and the decoder can end up waiting
//! on bytes it cannot receive. [`EncoderStreamBudget`] bounds the bytes of
//! inserts and duplicates written per `encode` call; once it is overdrawn the
//! encoder stops minting new entries and references nothing it just wrote.

/// Signed byte budget for inserts and duplicates within one `encode` call.
///
/// The budget may go negative by at most one instruction: the instruction
/// that overdraws it is written, but its entry is not referenced.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncoderStreamBudget {
    remaining: i64,
    /// First absolute index written past the budget.
    overdrawn_at: Option<u64>,
}

impl EncoderStreamBudget {
    /// Starts a new call with `max_bytes` of credit.
    pub fn reset(&mut self, max_bytes: u64) {
        self.remaining = i64::try_from(max_bytes).unwrap_or(i64::MAX);
        self.overdrawn_at = None;
    }

    /// Whether another table mutation may be written.
    #[inline]
    pub fn can_send(&self) -> bool {
        self.remaining >= 0
    }

    /// Charges `bytes` written to the encoder stream.
    #[inline]
    pub fn consume(&mut self, bytes: usize) {
        let bytes = i64::try_from(bytes).unwrap_or(i64::MAX);
        self.remaining = self.remaining.saturating_sub(bytes);
    }

    /// Charges the instruction that created the entry at `index`.
    pub fn consume_for_entry(&mut self, index: u64, bytes: usize) {
        self.consume(bytes);
        if self.remaining < 0 && self.overdrawn_at.is_none() {
            self.overdrawn_at = Some(index);
        }
    }

    /// Whether the entry at `index` may be referenced in this call.
    ///
    /// Entries from earlier calls are always available; an entry written by
    /// the instruction that overdrew the budget is not.
    #[inline]
    pub fn entry_available(&self, index: u64) -> bool {
        self.overdrawn_at.map_or(true, |at| index < at)
    }

    /// Whether the most recently written insert or duplicate still fit in
    /// the window, i.e. whether its entry may be referenced.
    #[inline]
    pub fn last_entry_available(&self) -> bool {
        self.remaining >= 0
    }

    pub fn remaining(&self) -> i64 {
        self.remaining
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overdraw_by_one_instruction() {
        let mut budget = EncoderStreamBudget::default();
        budget.reset(10);
        assert!(budget.can_send());

        budget.consume(10);
        assert!(budget.last_entry_available());
        assert!(budget.can_send());

        budget.consume(1);
        assert!(!budget.last_entry_available());
        assert!(!budget.can_send());
        assert_eq!(budget.remaining(), -1);
    }

    #[test]
    fn test_overdrawing_entry_unavailable() {
        let mut budget = EncoderStreamBudget::default();
        budget.reset(5);
        budget.consume_for_entry(7, 4);
        assert!(budget.entry_available(7));

        budget.consume_for_entry(8, 4);
        assert!(!budget.last_entry_available());
        assert!(budget.entry_available(7));
        assert!(!budget.entry_available(8));

        budget.reset(5);
        assert!(budget.entry_available(8));
    }

    #[test]
    fn test_unbounded() {
        let mut budget = EncoderStreamBudget::default();
        budget.reset(u64::MAX);
        budget.consume(1 << 20);
        assert!(budget.can_send());
    }

    #[test]
    fn test_zero_budget_allows_nothing_referenced() {
        let mut budget = EncoderStreamBudget::default();
        budget.reset(0);
        assert!(budget.can_send());
        budget.consume(3);
        assert!(!budget.last_entry_available());
    }
}
