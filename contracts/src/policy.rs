//! # Fee Policy
//!
//! A ledger's fee policy is a single immutable value built once at creation.
//! It owns the validation rules for percentages and the cascade that turns a
//! transfer amount into its burn, reflection, tax and net parts.
//!
//! ## Cascade
//!
//! The order is fixed and each step works on what the previous one left:
//!
//! 1. burn       = floor(amount × burn% / 100)
//! 2. reflection = floor((amount − burn) × reflection% / 100)
//! 3. tax        = floor((amount − burn − reflection) × tax% / 100)
//! 4. net        = whatever remains
//!
//! Truncation loss always stays in `net`, so `burn + reflection + tax + net`
//! equals `amount` exactly.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::account::Account;
use crate::config::{MAX_PERCENT, MAX_TOTAL_FEE_PERCENT, PERCENT_DENOMINATOR};

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Malformed ledger creation parameters. Each variant names the violated
/// constraint.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// The token name is empty or whitespace.
    #[error("token name must not be empty")]
    EmptyName,

    /// The token symbol is empty or whitespace.
    #[error("token symbol must not be empty")]
    EmptySymbol,

    /// The initial supply is zero.
    #[error("initial supply must be greater than zero")]
    ZeroSupply,

    /// A single percentage is above 100.
    #[error("{field} percent {value} is outside 0..=100")]
    PercentOutOfRange {
        /// Which percentage was rejected.
        field: &'static str,
        /// The rejected value.
        value: u8,
    },

    /// The percentages add up to more than 100.
    #[error("fee percentages sum to {sum}, maximum is 100")]
    PercentSumExceeded {
        /// `tax + reflection + burn`.
        sum: u16,
    },

    /// The initial owner is not a named holder.
    #[error("initial owner must be a named holder account")]
    InvalidOwner,

    /// A tax percentage was given without an account to receive it.
    #[error("tax percent is {tax_percent} but no tax account was provided")]
    MissingTaxAccount {
        /// The configured tax percentage.
        tax_percent: u8,
    },

    /// The tax account is not a named holder.
    #[error("tax account must be a named holder account")]
    InvalidTaxAccount,
}

// ---------------------------------------------------------------------------
// Policy
// ---------------------------------------------------------------------------

/// Raw, unvalidated policy parameters as supplied by a caller.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeePolicyParams {
    /// Percentage of the post-burn, post-reflection amount sent to the tax account.
    #[serde(default)]
    pub tax_percent: u8,
    /// Receiver of the tax. Required when `tax_percent > 0`.
    #[serde(default)]
    pub tax_account: Option<Account>,
    /// Percentage of the post-burn amount moved into the reflection pool.
    #[serde(default)]
    pub reflection_percent: u8,
    /// Whether the reflection step runs at all.
    #[serde(default)]
    pub reflection_enabled: bool,
    /// Percentage of the gross amount destroyed.
    #[serde(default)]
    pub burn_percent: u8,
    /// Whether the burn step runs at all.
    #[serde(default)]
    pub burn_enabled: bool,
}

/// A validated, immutable fee policy.
///
/// Only obtainable through [`FeePolicy::new`] (or deserialization, which
/// runs the same checks), so every instance satisfies the percent bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "FeePolicyParams")]
pub struct FeePolicy {
    tax_percent: u8,
    tax_account: Option<Account>,
    reflection_percent: u8,
    reflection_enabled: bool,
    burn_percent: u8,
    burn_enabled: bool,
}

impl FeePolicy {
    /// Validates `params` and freezes them into a policy.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::PercentOutOfRange`] for any percentage above
    /// 100, [`ValidationError::PercentSumExceeded`] when the three add up to
    /// more than 100, [`ValidationError::MissingTaxAccount`] when a tax is
    /// configured without a receiver and [`ValidationError::InvalidTaxAccount`]
    /// when the receiver is not a named holder.
    pub fn new(params: FeePolicyParams) -> Result<Self, ValidationError> {
        for (field, value) in [
            ("tax", params.tax_percent),
            ("reflection", params.reflection_percent),
            ("burn", params.burn_percent),
        ] {
            if value > MAX_PERCENT {
                return Err(ValidationError::PercentOutOfRange { field, value });
            }
        }

        let sum = params.tax_percent as u16
            + params.reflection_percent as u16
            + params.burn_percent as u16;
        if sum > MAX_TOTAL_FEE_PERCENT {
            return Err(ValidationError::PercentSumExceeded { sum });
        }

        match &params.tax_account {
            None if params.tax_percent > 0 => {
                return Err(ValidationError::MissingTaxAccount {
                    tax_percent: params.tax_percent,
                });
            }
            Some(account) if !account.is_valid_holder() => {
                return Err(ValidationError::InvalidTaxAccount);
            }
            _ => {}
        }

        Ok(Self {
            tax_percent: params.tax_percent,
            tax_account: params.tax_account,
            reflection_percent: params.reflection_percent,
            reflection_enabled: params.reflection_enabled,
            burn_percent: params.burn_percent,
            burn_enabled: params.burn_enabled,
        })
    }

    /// A policy that charges nothing.
    pub fn none() -> Self {
        Self {
            tax_percent: 0,
            tax_account: None,
            reflection_percent: 0,
            reflection_enabled: false,
            burn_percent: 0,
            burn_enabled: false,
        }
    }

    pub fn tax_percent(&self) -> u8 {
        self.tax_percent
    }

    pub fn tax_account(&self) -> Option<&Account> {
        self.tax_account.as_ref()
    }

    pub fn reflection_percent(&self) -> u8 {
        self.reflection_percent
    }

    pub fn reflection_enabled(&self) -> bool {
        self.reflection_enabled
    }

    pub fn burn_percent(&self) -> u8 {
        self.burn_percent
    }

    pub fn burn_enabled(&self) -> bool {
        self.burn_enabled
    }

    /// Returns the raw parameters this policy was built from.
    pub fn params(&self) -> FeePolicyParams {
        FeePolicyParams {
            tax_percent: self.tax_percent,
            tax_account: self.tax_account.clone(),
            reflection_percent: self.reflection_percent,
            reflection_enabled: self.reflection_enabled,
            burn_percent: self.burn_percent,
            burn_enabled: self.burn_enabled,
        }
    }

    /// Computes the burn/reflection/tax/net split of `amount` sent by `sender`.
    ///
    /// Pure: nothing is moved. Returns `None` only if an intermediate value
    /// cannot be represented, which the percent bounds rule out.
    pub fn split(&self, sender: &Account, amount: u64) -> Option<FeeSplit> {
        let mut net = amount;

        let burned = if self.burn_enabled && sender.is_real_holder() {
            percent_of(amount, self.burn_percent)?
        } else {
            0
        };
        net = net.checked_sub(burned)?;

        let reflected = if self.reflection_enabled && sender.is_real_holder() {
            percent_of(net, self.reflection_percent)?
        } else {
            0
        };
        net = net.checked_sub(reflected)?;

        let taxed = match &self.tax_account {
            Some(tax_account) if self.tax_percent > 0 && sender != tax_account => {
                percent_of(net, self.tax_percent)?
            }
            _ => 0,
        };
        net = net.checked_sub(taxed)?;

        Some(FeeSplit {
            burned,
            reflected,
            taxed,
            net,
        })
    }
}

impl TryFrom<FeePolicyParams> for FeePolicy {
    type Error = ValidationError;

    fn try_from(params: FeePolicyParams) -> Result<Self, Self::Error> {
        Self::new(params)
    }
}

impl Default for FeePolicy {
    fn default() -> Self {
        Self::none()
    }
}

// ---------------------------------------------------------------------------
// Split
// ---------------------------------------------------------------------------

/// The four parts a transfer amount is cut into.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeeSplit {
    /// Destroyed; leaves the total supply.
    pub burned: u64,
    /// Moved into the reserve account's reflection pool.
    pub reflected: u64,
    /// Moved to the tax account.
    pub taxed: u64,
    /// Delivered to the recipient.
    pub net: u64,
}

impl FeeSplit {
    /// Everything debited from the sender. Always equals the transfer amount.
    pub fn total(&self) -> Option<u64> {
        self.burned
            .checked_add(self.reflected)?
            .checked_add(self.taxed)?
            .checked_add(self.net)
    }
}

/// `floor(value × percent / 100)`, computed in `u128`.
fn percent_of(value: u64, percent: u8) -> Option<u64> {
    let scaled = (value as u128).checked_mul(percent as u128)? / PERCENT_DENOMINATOR as u128;
    u64::try_from(scaled).ok()
}
