//! # Ledger Constants
//!
//! Every fixed parameter of the ledger engine lives here. Fee policies are
//! expressed in whole percents, so the denominator is 100, not a basis-point
//! scale.

// ---------------------------------------------------------------------------
// Fee Parameters
// ---------------------------------------------------------------------------

/// Denominator applied to every percentage in a fee policy.
pub const PERCENT_DENOMINATOR: u64 = 100;

/// Upper bound for any single fee percentage.
pub const MAX_PERCENT: u8 = 100;

/// Upper bound for `tax + reflection + burn`. A policy that reaches it is
/// legal and simply leaves the recipient with nothing.
pub const MAX_TOTAL_FEE_PERCENT: u16 = 100;

// ---------------------------------------------------------------------------
// Token Parameters
// ---------------------------------------------------------------------------

/// Decimal places reported by every ledger. Display-only; all arithmetic
/// happens in the smallest unit.
pub const TOKEN_DECIMALS: u8 = 18;

/// Version string reported by the engine. Bumped whenever the transfer split
/// changes in a way that alters balances.
pub const ENGINE_VERSION: &str = "0.1.0";

// ---------------------------------------------------------------------------
// Service Defaults
// ---------------------------------------------------------------------------

/// Default capacity of the broadcast channel fanning ledger events out to
/// subscribers.
pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Default number of recent events each ledger keeps in its journal. Older
/// records are evicted; sequence numbers keep counting.
pub const DEFAULT_JOURNAL_CAPACITY: usize = 1024;

/// Smallest journal a ledger accepts. One operation emits at most three
/// events, and all of them must survive until the registry collects them.
pub const MIN_JOURNAL_CAPACITY: usize = 4;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_percent_bounds_are_consistent() {
        assert_eq!(PERCENT_DENOMINATOR, MAX_PERCENT as u64);
        assert_eq!(MAX_TOTAL_FEE_PERCENT, MAX_PERCENT as u16);
    }

    #[test]
    fn test_event_capacity_positive() {
        assert!(DEFAULT_EVENT_CHANNEL_CAPACITY > 0);
    }

    #[test]
    fn test_journal_capacity_bounds() {
        assert!(DEFAULT_JOURNAL_CAPACITY >= MIN_JOURNAL_CAPACITY);
        assert!(MIN_JOURNAL_CAPACITY >= 3);
    }
}
