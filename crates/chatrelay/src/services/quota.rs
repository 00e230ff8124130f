//! Prepaid usage quota
//!
//! The relay debits before every provider call and credits the same amount
//! back when the attempt fails. It never keeps a copy of the balance.

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tracing::debug;

use crate::config::QuotaConfig;

use super::identity::UserId;

/// Quota ledger failures
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum QuotaError {
    /// Balance is below the requested amount; nothing was debited
    #[error("Quota exhausted: balance {balance}, required {required}")]
    Exhausted { balance: u64, required: u64 },
}

/// Per-user balance store with atomic debit/credit
#[async_trait]
pub trait QuotaLedger: Send + Sync {
    /// Take `amount` from the user's balance, or fail without changing it
    async fn debit(&self, user: UserId, amount: u64) -> Result<(), QuotaError>;

    /// Return a previously debited `amount`
    async fn credit(&self, user: UserId, amount: u64);

    /// Current balance
    async fn balance(&self, user: UserId) -> u64;
}

/// Ledger held in process memory
///
/// Each user's entry is locked for the duration of a debit, so the floor
/// check and the decrement are one step.
#[derive(Debug, Default)]
pub struct InMemoryLedger {
    balances: DashMap<UserId, u64>,
    default_balance: u64,
}

impl InMemoryLedger {
    pub fn new(default_balance: u64) -> Self {
        Self {
            balances: DashMap::new(),
            default_balance,
        }
    }

    /// Build from configuration seed values
    pub fn from_config(config: &QuotaConfig) -> Self {
        let ledger = Self::new(config.default_balance);
        for entry in &config.balances {
            ledger.set_balance(UserId(entry.user_id), entry.balance);
        }
        ledger
    }

    pub fn set_balance(&self, user: UserId, balance: u64) {
        self.balances.insert(user, balance);
    }
}

#[async_trait]
impl QuotaLedger for InMemoryLedger {
    async fn debit(&self, user: UserId, amount: u64) -> Result<(), QuotaError> {
        let mut entry = self.balances.entry(user).or_insert(self.default_balance);
        let balance = *entry;
        if balance < amount {
            return Err(QuotaError::Exhausted {
                balance,
                required: amount,
            });
        }
        *entry = balance - amount;
        debug!(user_id = %user, amount, remaining = *entry, "Quota debited");
        Ok(())
    }

    async fn credit(&self, user: UserId, amount: u64) {
        let mut entry = self.balances.entry(user).or_insert(self.default_balance);
        let updated = entry.saturating_add(amount);
        *entry = updated;
        debug!(user_id = %user, amount, remaining = *entry, "Quota credited");
    }

    async fn balance(&self, user: UserId) -> u64 {
        self.balances
            .get(&user)
            .map(|b| *b)
            .unwrap_or(self.default_balance)
    }
}
