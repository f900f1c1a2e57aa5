//! Blocking state for asynchronous primitives.
//!
//! A primitive that needs an external, authoritative answer installs a
//! blocking state on its thread, issues exactly one request, and yields. The
//! result arrives later as an engine command which fills the state in; the
//! owning primitive consumes it on its next invocation and clears the slot.
//!
//! The state is a tagged enum rather than a loosely-typed slot: a primitive
//! resuming with the wrong variant fails a compile-checked match, not a
//! runtime downcast.

use crate::world::AccountId;
use simvm_derive::BinaryCodec;

/// The in-flight-or-resolved state of one asynchronous request.
///
/// Serialized for save/resume as: variant tag, `responded` flag, then the
/// variant's result fields (the thread carries the has-state flag as an
/// `Option` tag byte).
#[derive(BinaryCodec, Clone, Debug, PartialEq, Eq)]
pub enum BlockingState {
    /// Awaiting or holding the result of a ledger transaction.
    TransferFunds(TransferFundsState),
}

impl BlockingState {
    /// True once the external result has been delivered.
    pub fn responded(&self) -> bool {
        match self {
            BlockingState::TransferFunds(state) => state.responded,
        }
    }
}

/// Result slot for a ledger transaction request.
#[derive(BinaryCodec, Clone, Debug, PartialEq, Eq)]
pub struct TransferFundsState {
    /// False while the request is in flight; the fields below are unset.
    pub responded: bool,
    /// Whether the ledger committed (or, for test-only requests, approved)
    /// the transfer.
    pub success: bool,
    /// Source account the ledger resolved.
    pub source: AccountId,
    /// Source balance after the transaction.
    pub source_balance: u32,
    /// Target account the ledger resolved.
    pub target: AccountId,
    /// Target balance after the transaction.
    pub target_balance: u32,
}

impl TransferFundsState {
    /// Fresh "awaiting response" state: request issued, nothing delivered.
    pub fn awaiting() -> Self {
        Self {
            responded: false,
            success: false,
            source: AccountId(0),
            source_balance: 0,
            target: AccountId(0),
            target_balance: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::encoding::{Decode, Encode};

    #[test]
    fn awaiting_state_is_unresponded() {
        let state = BlockingState::TransferFunds(TransferFundsState::awaiting());
        assert!(!state.responded());
    }

    #[test]
    fn responded_state_roundtrips() {
        let state = BlockingState::TransferFunds(TransferFundsState {
            responded: true,
            success: true,
            source: AccountId(42),
            source_balance: 400,
            target: AccountId::MAXIS,
            target_balance: 0,
        });
        let bytes = state.to_bytes();
        assert_eq!(BlockingState::from_bytes(&bytes).unwrap(), state);
    }

    #[test]
    fn optional_slot_roundtrips_for_save_resume() {
        // The persisted layout is: has-state tag, variant tag, responded
        // flag, result fields.
        let none: Option<BlockingState> = None;
        assert_eq!(none.to_bytes(), vec![0]);
        assert_eq!(Option::<BlockingState>::from_bytes(&[0]).unwrap(), none);

        let some = Some(BlockingState::TransferFunds(TransferFundsState::awaiting()));
        let bytes = some.to_bytes();
        assert_eq!(bytes[0], 1); // has-state
        assert_eq!(bytes[1], 0); // variant tag
        assert_eq!(bytes[2], 0); // responded
        assert_eq!(Option::<BlockingState>::from_bytes(&bytes).unwrap(), some);
    }
}
