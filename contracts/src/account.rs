//! # Accounts and Ledger Identifiers
//!
//! Accounts are opaque to the engine. Three shapes exist:
//!
//! - [`Account::Null`]: the burn sink. Never a real holder, never a valid
//!   explicit recipient.
//! - [`Account::Reserve`]: the ledger's own account. Holds the undistributed
//!   reflection pool. It can receive transfers but never send or delegate;
//!   tokens leave it only through claims.
//! - [`Account::Holder`]: any named participant.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Account
// ---------------------------------------------------------------------------

/// An account that can appear in a ledger's balance table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Account {
    /// The reserved null account. Burned tokens conceptually land here.
    Null,
    /// The ledger's own reserve account.
    Reserve,
    /// A named holder.
    Holder(String),
}

impl Account {
    /// Shorthand for a named holder.
    pub fn holder(name: impl Into<String>) -> Self {
        Account::Holder(name.into())
    }

    /// Returns `true` for the null account.
    pub fn is_null(&self) -> bool {
        matches!(self, Account::Null)
    }

    /// Returns `true` for the ledger's reserve account.
    pub fn is_reserve(&self) -> bool {
        matches!(self, Account::Reserve)
    }

    /// Fees that only real holders pay (burn, reflection) are skipped for
    /// the null account.
    pub fn is_real_holder(&self) -> bool {
        !self.is_null()
    }

    /// A named holder with a non-blank name. This is what callers must
    /// supply for owners, tax accounts and spenders.
    pub fn is_valid_holder(&self) -> bool {
        match self {
            Account::Holder(name) => !name.trim().is_empty(),
            _ => false,
        }
    }

    /// Whether the account may receive the net amount of a transfer.
    /// The reserve may be credited directly; the null account only ever
    /// receives burns implicitly.
    pub fn is_valid_recipient(&self) -> bool {
        match self {
            Account::Null => false,
            Account::Reserve => true,
            Account::Holder(_) => self.is_valid_holder(),
        }
    }
}

impl fmt::Display for Account {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Account::Null => write!(f, "<null>"),
            Account::Reserve => write!(f, "<reserve>"),
            Account::Holder(name) => write!(f, "{}", name),
        }
    }
}

// ---------------------------------------------------------------------------
// LedgerId
// ---------------------------------------------------------------------------

/// Unique identifier for a ledger, assigned by the factory at creation time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LedgerId(Uuid);

impl LedgerId {
    /// Generates a fresh random identifier.
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl From<Uuid> for LedgerId {
    fn from(id: Uuid) -> Self {
        Self(id)
    }
}

impl fmt::Display for LedgerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for LedgerId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_is_not_a_real_holder() {
        assert!(!Account::Null.is_real_holder());
        assert!(Account::Reserve.is_real_holder());
        assert!(Account::holder("alice").is_real_holder());
    }

    #[test]
    fn blank_holder_names_are_invalid() {
        assert!(!Account::holder("").is_valid_holder());
        assert!(!Account::holder("   ").is_valid_holder());
        assert!(Account::holder("alice").is_valid_holder());
        assert!(!Account::Reserve.is_valid_holder());
        assert!(!Account::Null.is_valid_holder());
    }

    #[test]
    fn recipient_validity() {
        assert!(!Account::Null.is_valid_recipient());
        assert!(Account::Reserve.is_valid_recipient());
        assert!(!Account::holder("").is_valid_recipient());
        assert!(Account::holder("bob").is_valid_recipient());
    }

    #[test]
    fn ledger_id_parses_its_display_form() {
        let id = LedgerId::generate();
        let parsed: LedgerId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<LedgerId>().is_err());
    }

    #[test]
    fn account_serializes_with_snake_case_tags() {
        let json = serde_json::to_string(&Account::holder("alice")).unwrap();
        assert_eq!(json, r#"{"holder":"alice"}"#);
        let json = serde_json::to_string(&Account::Reserve).unwrap();
        assert_eq!(json, r#""reserve""#);
    }
}
