//! The currency ledger seam.
//!
//! All account balances belong to the ledger, not the simulation. Commits are
//! asynchronous: the ledger answers through a one-shot callback on its own
//! schedule, and callers route the result back into the simulation through
//! the command stream. Only the synchronous [`Ledger::validate`] exists for
//! feasibility checks, and it promises not to mutate anything.

use crate::world::AccountId;
use dashmap::DashMap;

/// Result of one ledger transaction, delivered through the callback.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TransferOutcome {
    pub success: bool,
    pub source: AccountId,
    /// Source balance after the transaction (or current balance, for
    /// test-only and failed requests).
    pub source_balance: u32,
    pub target: AccountId,
    pub target_balance: u32,
}

/// One-shot completion for [`Ledger::transact`]. Invoked exactly once, from
/// any thread.
pub type TransactionCallback = Box<dyn FnOnce(TransferOutcome) + Send + 'static>;

/// Authoritative account store.
pub trait Ledger: Send + Sync {
    /// Synchronously answers whether the transfer would succeed, mutating
    /// nothing. Only feasibility checks may use this.
    fn validate(&self, source: AccountId, target: AccountId, amount: i32) -> bool;

    /// Performs (or, with `test_only`, merely validates) a transfer and
    /// reports the outcome through `callback`.
    fn transact(
        &self,
        test_only: bool,
        source: AccountId,
        target: AccountId,
        amount: i32,
        callback: TransactionCallback,
    );
}

/// In-process ledger for single-instance simulations and demos.
///
/// The system account has unbounded funds on both sides; every other account
/// must cover the amount it sends. Completions are invoked inline, so results
/// still arrive one tick later through the command stream.
#[derive(Default)]
pub struct LocalLedger {
    balances: DashMap<AccountId, u32>,
}

impl LocalLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_balance(&self, account: AccountId, amount: u32) {
        self.balances.insert(account, amount);
    }

    pub fn balance(&self, account: AccountId) -> u32 {
        self.balances.get(&account).map(|b| *b).unwrap_or(0)
    }

    fn can_transfer(&self, source: AccountId, amount: i32) -> bool {
        if amount < 0 {
            return false;
        }
        source == AccountId::MAXIS || self.balance(source) >= amount as u32
    }
}

impl Ledger for LocalLedger {
    fn validate(&self, source: AccountId, _target: AccountId, amount: i32) -> bool {
        self.can_transfer(source, amount)
    }

    fn transact(
        &self,
        test_only: bool,
        source: AccountId,
        target: AccountId,
        amount: i32,
        callback: TransactionCallback,
    ) {
        let success = self.can_transfer(source, amount);
        if success && !test_only {
            if source != AccountId::MAXIS {
                self.set_balance(source, self.balance(source) - amount as u32);
            }
            if target != AccountId::MAXIS {
                self.set_balance(target, self.balance(target) + amount as u32);
            }
        }
        callback(TransferOutcome {
            success,
            source,
            source_balance: self.balance(source),
            target,
            target_balance: self.balance(target),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;

    fn outcome_of(
        ledger: &LocalLedger,
        test_only: bool,
        source: AccountId,
        target: AccountId,
        amount: i32,
    ) -> TransferOutcome {
        let (tx, rx) = mpsc::channel();
        ledger.transact(
            test_only,
            source,
            target,
            amount,
            Box::new(move |outcome| tx.send(outcome).unwrap()),
        );
        rx.recv().unwrap()
    }

    #[test]
    fn commit_moves_funds() {
        let ledger = LocalLedger::new();
        ledger.set_balance(AccountId(1), 500);
        let outcome = outcome_of(&ledger, false, AccountId(1), AccountId(2), 100);
        assert!(outcome.success);
        assert_eq!(outcome.source_balance, 400);
        assert_eq!(outcome.target_balance, 100);
        assert_eq!(ledger.balance(AccountId(1)), 400);
        assert_eq!(ledger.balance(AccountId(2)), 100);
    }

    #[test]
    fn test_only_never_mutates() {
        let ledger = LocalLedger::new();
        ledger.set_balance(AccountId(1), 500);
        let outcome = outcome_of(&ledger, true, AccountId(1), AccountId(2), 100);
        assert!(outcome.success);
        assert_eq!(ledger.balance(AccountId(1)), 500);
        assert_eq!(ledger.balance(AccountId(2)), 0);
    }

    #[test]
    fn insufficient_funds_fail_without_mutation() {
        let ledger = LocalLedger::new();
        ledger.set_balance(AccountId(1), 50);
        let outcome = outcome_of(&ledger, false, AccountId(1), AccountId(2), 100);
        assert!(!outcome.success);
        assert_eq!(ledger.balance(AccountId(1)), 50);
        assert_eq!(ledger.balance(AccountId(2)), 0);
    }

    #[test]
    fn negative_amounts_always_fail() {
        let ledger = LocalLedger::new();
        assert!(!ledger.validate(AccountId::MAXIS, AccountId(1), -5));
        let outcome = outcome_of(&ledger, false, AccountId::MAXIS, AccountId(1), -5);
        assert!(!outcome.success);
        assert_eq!(ledger.balance(AccountId(1)), 0);
    }

    #[test]
    fn system_account_has_unbounded_funds() {
        let ledger = LocalLedger::new();
        assert!(ledger.validate(AccountId::MAXIS, AccountId(1), 1_000_000));
        let outcome = outcome_of(&ledger, false, AccountId::MAXIS, AccountId(1), 100);
        assert!(outcome.success);
        assert_eq!(ledger.balance(AccountId(1)), 100);
        // The system side reports no meaningful balance.
        assert_eq!(outcome.source_balance, 0);
    }

    #[test]
    fn zero_amount_reads_balances_without_moving_funds() {
        let ledger = LocalLedger::new();
        ledger.set_balance(AccountId(1), 750);
        let outcome = outcome_of(&ledger, false, AccountId(1), AccountId::MAXIS, 0);
        assert!(outcome.success);
        assert_eq!(outcome.source_balance, 750);
        assert_eq!(ledger.balance(AccountId(1)), 750);
    }
}
