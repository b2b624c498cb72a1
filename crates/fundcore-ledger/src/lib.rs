//! Fundcore Ledger - Custodial wallet ledger
//!
//! One wallet account per owning profile (investor or owner), with an
//! append-only entry log.
//!
//! # Invariants
//!
//! 1. No negative balances
//! 2. An account's balance equals the sum of the signed amounts of its
//!    confirmed entries
//! 3. Entries are never edited or deleted; corrections are reversing entries
//! 4. Balance checks and debits are atomic with respect to concurrent
//!    operations on the same account

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use fundcore_types::{EntryId, FundcoreError, ProfileId, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

/// Direction/kind of a wallet entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryKind {
    Deposit,
    Withdraw,
    TransferIn,
    TransferOut,
}

/// Caller-supplied context stored with every entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryMeta {
    /// Where the money movement originated (e.g. "gateway", "profit_distribution")
    pub source: String,
    /// Correlation reference, typically a merchant reference or intention id
    pub reference: Option<String>,
}

impl EntryMeta {
    pub fn new(source: impl Into<String>, reference: Option<String>) -> Self {
        Self {
            source: source.into(),
            reference,
        }
    }
}

/// A single wallet transaction entry (append-only)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletEntry {
    pub id: EntryId,
    pub account: ProfileId,
    /// Signed amount: credits positive, debits negative
    pub amount: Decimal,
    pub kind: EntryKind,
    pub confirmed: bool,
    pub meta: EntryMeta,
    /// Shared by the two legs of a transfer
    pub correlation_id: String,
    pub balance_after: Decimal,
    pub created_at: DateTime<Utc>,
}

/// Account state in the ledger
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletAccount {
    pub owner: ProfileId,
    pub balance: Decimal,
    pub entry_count: u64,
}

impl WalletAccount {
    fn new(owner: ProfileId) -> Self {
        Self {
            owner,
            balance: Decimal::ZERO,
            entry_count: 0,
        }
    }
}

/// The wallet ledger
///
/// Thread-safe; a single write lock over the account map serializes
/// check-and-debit sequences per account.
#[derive(Clone, Default)]
pub struct Ledger {
    accounts: Arc<RwLock<LedgerInner>>,
}

#[derive(Default)]
struct LedgerInner {
    accounts: HashMap<ProfileId, WalletAccount>,
    entries: Vec<WalletEntry>,
}

impl LedgerInner {
    fn append(
        &mut self,
        account: ProfileId,
        amount: Decimal,
        kind: EntryKind,
        meta: EntryMeta,
        correlation_id: String,
    ) -> Result<(Decimal, EntryId)> {
        let state = self
            .accounts
            .entry(account)
            .or_insert_with(|| WalletAccount::new(account));

        let new_balance = state.balance + amount;
        if new_balance < Decimal::ZERO {
            return Err(FundcoreError::InsufficientBalance {
                requested: amount.abs().to_string(),
                available: state.balance.to_string(),
            });
        }

        let entry = WalletEntry {
            id: EntryId::new(),
            account,
            amount,
            kind,
            confirmed: true,
            meta,
            correlation_id,
            balance_after: new_balance,
            created_at: Utc::now(),
        };

        state.balance = new_balance;
        state.entry_count += 1;

        let entry_id = entry.id;
        self.entries.push(entry);
        Ok((new_balance, entry_id))
    }
}

impl Ledger {
    /// Create a new in-memory ledger
    pub fn new() -> Self {
        Self::default()
    }

    fn require_positive(amount: Decimal) -> Result<()> {
        if amount <= Decimal::ZERO {
            return Err(FundcoreError::InvalidAmount {
                message: "Amount must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    /// Get the balance of an account (zero for unknown accounts)
    pub async fn balance(&self, account: &ProfileId) -> Decimal {
        let inner = self.accounts.read().await;
        inner
            .accounts
            .get(account)
            .map(|a| a.balance)
            .unwrap_or(Decimal::ZERO)
    }

    /// Credit an account, creating it on first use
    ///
    /// Returns the new balance and the entry ID.
    pub async fn deposit(
        &self,
        account: &ProfileId,
        amount: Decimal,
        meta: EntryMeta,
    ) -> Result<(Decimal, EntryId)> {
        Self::require_positive(amount)?;
        let correlation = meta
            .reference
            .clone()
            .unwrap_or_else(|| EntryId::new().to_string());

        let mut inner = self.accounts.write().await;
        let result = inner.append(*account, amount, EntryKind::Deposit, meta, correlation)?;
        tracing::info!(account = %account, amount = %amount, balance = %result.0, "wallet deposit");
        Ok(result)
    }

    /// Debit an account
    ///
    /// Fails with `InsufficientBalance` if the amount exceeds the balance;
    /// the check and the debit happen under one lock.
    pub async fn withdraw(
        &self,
        account: &ProfileId,
        amount: Decimal,
        meta: EntryMeta,
    ) -> Result<(Decimal, EntryId)> {
        Self::require_positive(amount)?;
        let correlation = meta
            .reference
            .clone()
            .unwrap_or_else(|| EntryId::new().to_string());

        let mut inner = self.accounts.write().await;
        if !inner.accounts.contains_key(account) {
            return Err(FundcoreError::WalletNotFound {
                profile_id: account.to_string(),
            });
        }
        let result = inner.append(*account, -amount, EntryKind::Withdraw, meta, correlation)?;
        tracing::info!(account = %account, amount = %amount, balance = %result.0, "wallet withdrawal");
        Ok(result)
    }

    /// Move funds between two accounts
    ///
    /// Appends an out-entry and an in-entry sharing one correlation id.
    /// Atomic: if the debit fails, no entry is written on either side.
    pub async fn transfer(
        &self,
        from: &ProfileId,
        to: &ProfileId,
        amount: Decimal,
        meta: EntryMeta,
    ) -> Result<(EntryId, EntryId)> {
        Self::require_positive(amount)?;
        let correlation = meta
            .reference
            .clone()
            .unwrap_or_else(|| EntryId::new().to_string());

        let mut inner = self.accounts.write().await;
        if !inner.accounts.contains_key(from) {
            return Err(FundcoreError::WalletNotFound {
                profile_id: from.to_string(),
            });
        }

        // Check first so the out-entry is never written for a failing pair
        let from_balance = inner.accounts.get(from).map(|a| a.balance).unwrap_or_default();
        if from_balance < amount {
            return Err(FundcoreError::InsufficientBalance {
                requested: amount.to_string(),
                available: from_balance.to_string(),
            });
        }

        let (_, out_entry) = inner.append(
            *from,
            -amount,
            EntryKind::TransferOut,
            meta.clone(),
            correlation.clone(),
        )?;
        let (_, in_entry) = inner.append(*to, amount, EntryKind::TransferIn, meta, correlation)?;

        tracing::info!(from = %from, to = %to, amount = %amount, "wallet transfer");
        Ok((out_entry, in_entry))
    }

    /// Get account state
    pub async fn account(&self, account: &ProfileId) -> Option<WalletAccount> {
        self.accounts.read().await.accounts.get(account).cloned()
    }

    /// Get all entries for an account, oldest first
    pub async fn account_entries(&self, account: &ProfileId) -> Vec<WalletEntry> {
        let inner = self.accounts.read().await;
        inner
            .entries
            .iter()
            .filter(|e| &e.account == account)
            .cloned()
            .collect()
    }

    /// Get entries sharing a correlation id (e.g. both legs of a transfer)
    pub async fn entries_for_correlation(&self, correlation_id: &str) -> Vec<WalletEntry> {
        let inner = self.accounts.read().await;
        inner
            .entries
            .iter()
            .filter(|e| e.correlation_id == correlation_id)
            .cloned()
            .collect()
    }

    /// Get recent entries across all accounts (newest first)
    pub async fn recent_entries(&self, limit: usize) -> Vec<WalletEntry> {
        let inner = self.accounts.read().await;
        inner.entries.iter().rev().take(limit).cloned().collect()
    }

    /// Total number of entries
    pub async fn entry_count(&self) -> usize {
        self.accounts.read().await.entries.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn meta(source: &str) -> EntryMeta {
        EntryMeta::new(source, None)
    }

    #[tokio::test]
    async fn test_deposit_and_balance() {
        let ledger = Ledger::new();
        let account = ProfileId::new();

        assert_eq!(ledger.balance(&account).await, Decimal::ZERO);

        let (balance, _) = ledger
            .deposit(&account, dec!(100.00), meta("gateway"))
            .await
            .unwrap();
        assert_eq!(balance, dec!(100.00));
        assert_eq!(ledger.balance(&account).await, dec!(100.00));
    }

    #[tokio::test]
    async fn test_withdraw() {
        let ledger = Ledger::new();
        let account = ProfileId::new();

        ledger
            .deposit(&account, dec!(100), meta("gateway"))
            .await
            .unwrap();
        let (balance, _) = ledger
            .withdraw(&account, dec!(40), meta("payout"))
            .await
            .unwrap();
        assert_eq!(balance, dec!(60));
    }

    #[tokio::test]
    async fn test_no_negative_balance() {
        let ledger = Ledger::new();
        let account = ProfileId::new();

        ledger
            .deposit(&account, dec!(50), meta("gateway"))
            .await
            .unwrap();

        let result = ledger.withdraw(&account, dec!(80), meta("payout")).await;
        assert!(matches!(
            result,
            Err(FundcoreError::InsufficientBalance { .. })
        ));
        assert_eq!(ledger.balance(&account).await, dec!(50));
    }

    #[tokio::test]
    async fn test_withdraw_from_unknown_account() {
        let ledger = Ledger::new();
        let result = ledger
            .withdraw(&ProfileId::new(), dec!(10), meta("payout"))
            .await;
        assert!(matches!(result, Err(FundcoreError::WalletNotFound { .. })));
    }

    #[tokio::test]
    async fn test_zero_and_negative_amounts_rejected() {
        let ledger = Ledger::new();
        let account = ProfileId::new();

        let zero = ledger.deposit(&account, Decimal::ZERO, meta("gateway")).await;
        assert!(matches!(zero, Err(FundcoreError::InvalidAmount { .. })));

        let negative = ledger.deposit(&account, dec!(-5), meta("gateway")).await;
        assert!(matches!(negative, Err(FundcoreError::InvalidAmount { .. })));
        assert_eq!(ledger.entry_count().await, 0);
    }

    #[tokio::test]
    async fn test_transfer_writes_two_correlated_entries() {
        let ledger = Ledger::new();
        let from = ProfileId::new();
        let to = ProfileId::new();

        ledger
            .deposit(&from, dec!(1000), meta("gateway"))
            .await
            .unwrap();
        ledger
            .transfer(&from, &to, dec!(400), EntryMeta::new("transfer", Some("ref-7".into())))
            .await
            .unwrap();

        assert_eq!(ledger.balance(&from).await, dec!(600));
        assert_eq!(ledger.balance(&to).await, dec!(400));

        let legs = ledger.entries_for_correlation("ref-7").await;
        assert_eq!(legs.len(), 2);
        assert!(legs.iter().any(|e| e.kind == EntryKind::TransferOut));
        assert!(legs.iter().any(|e| e.kind == EntryKind::TransferIn));
    }

    #[tokio::test]
    async fn test_failed_transfer_writes_nothing() {
        let ledger = Ledger::new();
        let from = ProfileId::new();
        let to = ProfileId::new();

        ledger
            .deposit(&from, dec!(100), meta("gateway"))
            .await
            .unwrap();
        let result = ledger.transfer(&from, &to, dec!(500), meta("transfer")).await;
        assert!(matches!(
            result,
            Err(FundcoreError::InsufficientBalance { .. })
        ));
        assert_eq!(ledger.entry_count().await, 1);
        assert_eq!(ledger.balance(&to).await, Decimal::ZERO);
    }

    #[tokio::test]
    async fn test_balance_equals_entry_sum() {
        let ledger = Ledger::new();
        let account = ProfileId::new();

        ledger
            .deposit(&account, dec!(100), meta("gateway"))
            .await
            .unwrap();
        ledger
            .deposit(&account, dec!(250), meta("gateway"))
            .await
            .unwrap();
        ledger
            .withdraw(&account, dec!(70), meta("payout"))
            .await
            .unwrap();

        let entries = ledger.account_entries(&account).await;
        let sum: Decimal = entries
            .iter()
            .filter(|e| e.confirmed)
            .map(|e| e.amount)
            .sum();
        assert_eq!(sum, ledger.balance(&account).await);
        assert_eq!(sum, dec!(280));
    }

    #[tokio::test]
    async fn test_concurrent_withdrawals_never_overdraw() {
        let ledger = Ledger::new();
        let account = ProfileId::new();
        ledger
            .deposit(&account, dec!(100), meta("gateway"))
            .await
            .unwrap();

        let mut handles = Vec::new();
        for _ in 0..10 {
            let ledger = ledger.clone();
            handles.push(tokio::spawn(async move {
                ledger.withdraw(&account, dec!(30), meta("payout")).await
            }));
        }

        let mut successes = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                successes += 1;
            }
        }

        // 100 / 30 allows at most 3 withdrawals
        assert_eq!(successes, 3);
        assert_eq!(ledger.balance(&account).await, dec!(10));
    }
}
