//! Transfer-funds: move currency between ledger accounts.
//!
//! The ledger is authoritative and remote, so a committing transfer is a
//! five-step dance: resolve accounts, install an awaiting blocking state,
//! issue exactly one asynchronous request, yield every tick until the
//! response command fills the state in, then consume the state and branch on
//! the outcome. Check threads never get that luxury: they must resolve
//! synchronously against locally-known balances and commit nothing.

use crate::engine::blocking::{BlockingState, TransferFundsState};
use crate::engine::command::EngineCommand;
use crate::engine::memory;
use crate::engine::simulation::ExecutionContext;
use crate::engine::thread::ExitCode;
use crate::primitives::{OperandValue, Primitive};
use crate::services::ledger::TransferOutcome;
use crate::world::{AccountId, EntityId, World};

/// Flag bit: validate the transfer without committing it.
pub const FLAG_JUST_TEST: u8 = 0x1;

/// Scope tag values for the legacy amount-owner byte.
const OLD_OWNER_LITERAL: u8 = 0;
const OLD_OWNER_PARAMETERS: u8 = 1;
const OLD_OWNER_LOCAL: u8 = 2;
const OLD_OWNER_NORMAL: u8 = 3;

/// Transfer directions this engine resolves to ledger accounts.
///
/// Tag values come from the script format. Tags outside this set are either
/// deprecated or not yet meaningful here; they resolve true without touching
/// the ledger so old scripts keep running.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferKind {
    MeToMaxis = 2,
    MaxisToMe = 5,
    MaxisToStackObjectOwner = 6,
    StackObjectOwnerToMaxis = 7,
    MeToStackObject = 9,
    StackObjectToMe = 10,
    MaxisToStackObject = 11,
    StackObjectToMaxis = 12,
    /// Read the stack object's balance into wide temp 0; moves nothing.
    StackObjectCashIntoWideTemp = 17,
    LotOwnerToMaxis = 19,
    MaxisToLotOwner = 20,
}

impl TransferKind {
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            2 => Some(TransferKind::MeToMaxis),
            5 => Some(TransferKind::MaxisToMe),
            6 => Some(TransferKind::MaxisToStackObjectOwner),
            7 => Some(TransferKind::StackObjectOwnerToMaxis),
            9 => Some(TransferKind::MeToStackObject),
            10 => Some(TransferKind::StackObjectToMe),
            11 => Some(TransferKind::MaxisToStackObject),
            12 => Some(TransferKind::StackObjectToMaxis),
            17 => Some(TransferKind::StackObjectCashIntoWideTemp),
            19 => Some(TransferKind::LotOwnerToMaxis),
            20 => Some(TransferKind::MaxisToLotOwner),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferFundsOperand {
    /// Legacy amount scope selector; `OLD_OWNER_NORMAL` defers to
    /// `amount_owner`.
    pub old_amount_owner: u8,
    /// Scope tag for the amount read when the legacy selector defers.
    pub amount_owner: u8,
    /// Index (or literal value) within the amount scope.
    pub amount_data: u16,
    pub flags: u8,
    /// Expense classification; recorded by the ledger side, not interpreted
    /// here.
    pub expense_type: u8,
    /// Raw transfer direction tag.
    pub transfer_type: u8,
}

impl TransferFundsOperand {
    pub fn decode(raw: [u8; 8]) -> Self {
        Self {
            old_amount_owner: raw[0],
            amount_owner: raw[1],
            amount_data: u16::from_le_bytes([raw[2], raw[3]]),
            flags: raw[4],
            // raw[5] is padding
            expense_type: raw[6],
            transfer_type: raw[7],
        }
    }

    /// Encodes back to the 8-byte wire record, the exact inverse of
    /// [`Self::decode`].
    pub fn encode(&self) -> [u8; 8] {
        let amount = self.amount_data.to_le_bytes();
        [
            self.old_amount_owner,
            self.amount_owner,
            amount[0],
            amount[1],
            self.flags,
            0,
            self.expense_type,
            self.transfer_type,
        ]
    }

    pub fn just_test(&self) -> bool {
        self.flags & FLAG_JUST_TEST != 0
    }

    /// The effective amount scope: the legacy selector wins unless it defers
    /// to the modern scope byte.
    pub fn amount_scope(&self) -> u8 {
        match self.old_amount_owner {
            OLD_OWNER_LITERAL => 0,
            OLD_OWNER_PARAMETERS => 1,
            OLD_OWNER_LOCAL => 2,
            OLD_OWNER_NORMAL => self.amount_owner,
            _ => self.amount_owner,
        }
    }
}

fn account_of(world: &World, entity: EntityId) -> Option<AccountId> {
    world.get(entity).map(|e| e.persist)
}

pub struct TransferFunds;

impl Primitive for TransferFunds {
    fn execute(&self, ctx: &mut ExecutionContext<'_>, operand: &OperandValue) -> ExitCode {
        let OperandValue::TransferFunds(operand) = operand else {
            return ExitCode::BranchFalse;
        };

        // Resume path: an earlier invocation already issued the request.
        if let Some(BlockingState::TransferFunds(state)) = ctx.thread.blocking.clone() {
            if !state.responded {
                return ExitCode::YieldTick;
            }
            ctx.thread.blocking = None;
            return if operand.transfer_type == TransferKind::StackObjectCashIntoWideTemp as u8 {
                ctx.thread.temps_xl[0] = state.source_balance as i32;
                ExitCode::BranchTrue
            } else if state.success {
                ExitCode::BranchTrue
            } else {
                ExitCode::BranchFalse
            };
        }

        let Some(kind) = TransferKind::from_tag(operand.transfer_type) else {
            return ExitCode::BranchTrue;
        };

        let Some(mut amount) =
            memory::read_big(ctx.thread, operand.amount_scope(), operand.amount_data)
        else {
            return ExitCode::BranchFalse;
        };

        let caller = ctx.thread.frame().caller;
        let stack_object = ctx.thread.frame().stack_object;

        // Unset sides default to the system account.
        let mut source = AccountId::MAXIS;
        let mut target = AccountId::MAXIS;
        let resolved = match kind {
            TransferKind::MeToMaxis => account_of(ctx.world, caller).map(|a| source = a),
            TransferKind::MaxisToMe => account_of(ctx.world, caller).map(|a| target = a),
            TransferKind::MeToStackObject => account_of(ctx.world, caller)
                .zip(account_of(ctx.world, stack_object))
                .map(|(s, t)| {
                    source = s;
                    target = t;
                }),
            TransferKind::StackObjectToMe => account_of(ctx.world, stack_object)
                .zip(account_of(ctx.world, caller))
                .map(|(s, t)| {
                    source = s;
                    target = t;
                }),
            TransferKind::MaxisToStackObject => {
                account_of(ctx.world, stack_object).map(|a| target = a)
            }
            TransferKind::StackObjectToMaxis => {
                account_of(ctx.world, stack_object).map(|a| source = a)
            }
            TransferKind::StackObjectCashIntoWideTemp => {
                amount = 0;
                account_of(ctx.world, stack_object).map(|a| source = a)
            }
            // Owner and lot accounts are not modeled yet; these run as
            // system-to-system transfers.
            TransferKind::MaxisToStackObjectOwner
            | TransferKind::StackObjectOwnerToMaxis
            | TransferKind::LotOwnerToMaxis
            | TransferKind::MaxisToLotOwner => Some(()),
        };
        if resolved.is_none() {
            return ExitCode::BranchFalse;
        }

        // Check threads resolve synchronously and must not commit.
        if ctx.thread.is_check {
            if kind == TransferKind::StackObjectCashIntoWideTemp {
                let Some(entity) = ctx.world.get(stack_object) else {
                    return ExitCode::BranchFalse;
                };
                ctx.thread.temps_xl[0] = entity.budget as i32;
                return ExitCode::BranchTrue;
            }
            if !operand.just_test() {
                return ExitCode::BranchFalse;
            }
            return if ctx.services.ledger.validate(source, target, amount) {
                ExitCode::BranchTrue
            } else {
                ExitCode::BranchFalse
            };
        }

        // Commit path: one request, then yield until the response command
        // lands in the blocking slot.
        ctx.thread.blocking = Some(BlockingState::TransferFunds(TransferFundsState::awaiting()));

        let commands = ctx.commands.clone();
        let thread_id = ctx.thread.id;
        ctx.services.ledger.transact(
            operand.just_test(),
            source,
            target,
            amount,
            Box::new(move |outcome: TransferOutcome| {
                commands.send(EngineCommand::AsyncResponse {
                    thread: thread_id,
                    state: BlockingState::TransferFunds(TransferFundsState {
                        responded: true,
                        success: outcome.success,
                        source: outcome.source,
                        source_balance: outcome.source_balance,
                        target: outcome.target,
                        target_balance: outcome.target_balance,
                    }),
                });
            }),
        );
        ExitCode::YieldTick
    }
}
