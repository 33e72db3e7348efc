//! # Ledger Events
//!
//! Every state change a ledger makes is journaled as a [`LedgerEvent`].
//! Events are telemetry: nothing in the engine reads them back to derive
//! balances or entitlements.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::account::{Account, LedgerId};

/// A notification emitted by a ledger.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LedgerEvent {
    /// The ledger was constructed and its initial supply credited.
    LedgerCreated {
        creator: Account,
        owner: Account,
        initial_supply: u64,
    },
    /// `amount` was destroyed out of `from`'s balance.
    Burned { from: Account, amount: u64 },
    /// `amount` paid by `from` was moved into the reserve account's pool.
    ReflectionPooled { from: Account, amount: u64 },
    /// `net` reached `to`; `tax` went to the tax account.
    Transferred {
        from: Account,
        to: Account,
        net: u64,
        tax: u64,
    },
    /// `amount` was paid out of the pool to `holder`.
    Claimed { holder: Account, amount: u64 },
    /// `owner` allowed `spender` to move up to `amount`.
    Approval {
        owner: Account,
        spender: Account,
        amount: u64,
    },
    /// The recorded owner changed.
    OwnershipTransferred { previous: Account, new: Account },
}

impl LedgerEvent {
    /// Short, stable name used for log fields and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            LedgerEvent::LedgerCreated { .. } => "ledger_created",
            LedgerEvent::Burned { .. } => "burned",
            LedgerEvent::ReflectionPooled { .. } => "reflection_pooled",
            LedgerEvent::Transferred { .. } => "transferred",
            LedgerEvent::Claimed { .. } => "claimed",
            LedgerEvent::Approval { .. } => "approval",
            LedgerEvent::OwnershipTransferred { .. } => "ownership_transferred",
        }
    }
}

/// An event stamped with the ledger that emitted it, its position in that
/// ledger's journal and the time it was recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventRecord {
    pub ledger_id: LedgerId,
    pub sequence: u64,
    pub recorded_at: DateTime<Utc>,
    pub event: LedgerEvent,
}
