//! Shared fixtures for unit tests.

use crate::engine::command::{command_channel, CommandSender, EngineCommand};
use crate::engine::routine::{Instruction, Routine, TARGET_RETURN_FALSE, TARGET_RETURN_TRUE};
use crate::engine::simulation::{Services, Simulation};
use crate::engine::thread::{Frame, Thread, ThreadId};
use crate::primitives::transfer_funds::{TransferFundsOperand, FLAG_JUST_TEST};
use crate::services::ledger::{Ledger, LocalLedger, TransactionCallback, TransferOutcome};
use crate::services::pathfind::{ApproveAllPlanner, RoutePlanner};
use crate::world::{AccountId, Direction, Entity, EntityId, Position, World};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc::UnboundedReceiver;

/// Avatar entity present in every test world.
pub const AVATAR: EntityId = EntityId(1);
/// Object entity present in every test world; frames use it as the stack
/// object.
pub const OBJECT: EntityId = EntityId(2);

/// A world holding one avatar (account 1001) and one object (account 2002).
pub fn test_world() -> World {
    let mut world = World::new();
    world.insert(Entity {
        id: AVATAR,
        persist: AccountId(1001),
        position: Position::new(0.0, 0.0, 0.0),
        direction: Direction::North,
        budget: 0,
    });
    world.insert(Entity {
        id: OBJECT,
        persist: AccountId(2002),
        position: Position::new(4.0, 7.0, 0.0),
        direction: Direction::South,
        budget: 0,
    });
    world
}

/// A thread with a single four-argument frame, caller [`AVATAR`] and stack
/// object [`OBJECT`].
pub fn test_thread(args: &[i16]) -> Thread {
    let routine = Routine {
        id: 900,
        arg_count: 4,
        local_count: 2,
        instructions: vec![Instruction::new(
            0,
            TARGET_RETURN_TRUE,
            TARGET_RETURN_FALSE,
            [0; 8],
        )],
    };
    let frame = Frame::new(&routine, AVATAR, OBJECT, args);
    Thread::new(ThreadId(1), frame, false)
}

fn default_services() -> Services {
    Services {
        ledger: Arc::new(LocalLedger::new()),
        planner: Arc::new(ApproveAllPlanner::new()),
    }
}

/// A simulation over `world` backed by a local ledger and an approve-all
/// planner.
pub fn sim_with(world: World) -> Simulation {
    Simulation::new(world, default_services())
}

/// World, default services, and a sender whose receiver is discarded, for
/// handlers that never read responses back.
pub fn context_parts() -> (World, Services, CommandSender) {
    let (tx, _rx) = command_channel();
    (test_world(), default_services(), tx)
}

pub fn context_parts_with_planner(
    planner: Arc<dyn RoutePlanner>,
) -> (World, Services, CommandSender) {
    let (tx, _rx) = command_channel();
    let services = Services {
        ledger: Arc::new(LocalLedger::new()),
        planner,
    };
    (test_world(), services, tx)
}

/// Like [`context_parts`] but with a caller-chosen ledger and a live command
/// receiver for inspecting emitted responses.
pub fn context_parts_with_ledger(
    ledger: Arc<dyn Ledger>,
) -> (
    World,
    Services,
    CommandSender,
    UnboundedReceiver<EngineCommand>,
) {
    let (tx, rx) = command_channel();
    let services = Services {
        ledger,
        planner: Arc::new(ApproveAllPlanner::new()),
    };
    (test_world(), services, tx, rx)
}

/// Operand bytes for the sleep primitive counting down argument `arg`.
pub fn sleep_operand(arg: u16) -> [u8; 8] {
    let mut raw = [0; 8];
    raw[..2].copy_from_slice(&arg.to_le_bytes());
    raw
}

/// A transfer operand with a literal amount.
pub fn transfer_operand(
    transfer_type: u8,
    amount: i16,
    expense_type: u8,
    just_test: bool,
) -> TransferFundsOperand {
    TransferFundsOperand {
        old_amount_owner: 0,
        amount_owner: 0,
        amount_data: amount as u16,
        flags: if just_test { FLAG_JUST_TEST } else { 0 },
        expense_type,
        transfer_type,
    }
}

/// One transaction request a [`ManualLedger`] recorded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RecordedRequest {
    pub test_only: bool,
    pub source: AccountId,
    pub target: AccountId,
    pub amount: i32,
}

/// Ledger that records requests and holds their callbacks until the test
/// releases them, making the asynchronous gap observable.
#[derive(Default)]
pub struct ManualLedger {
    requests: Mutex<Vec<RecordedRequest>>,
    pending: Mutex<Vec<(RecordedRequest, TransactionCallback)>>,
}

impl ManualLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of transaction requests ever received.
    pub fn request_count(&self) -> usize {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn last_request(&self) -> Option<RecordedRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .last()
            .copied()
    }

    /// Completes every pending request with the given result and balances.
    pub fn respond_all(&self, success: bool, source_balance: u32, target_balance: u32) {
        let pending: Vec<_> = self
            .pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .drain(..)
            .collect();
        for (request, callback) in pending {
            callback(TransferOutcome {
                success,
                source: request.source,
                source_balance,
                target: request.target,
                target_balance,
            });
        }
    }
}

impl Ledger for ManualLedger {
    fn validate(&self, _source: AccountId, _target: AccountId, _amount: i32) -> bool {
        false
    }

    fn transact(
        &self,
        test_only: bool,
        source: AccountId,
        target: AccountId,
        amount: i32,
        callback: TransactionCallback,
    ) {
        let request = RecordedRequest {
            test_only,
            source,
            target,
            amount,
        };
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(request);
        self.pending
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((request, callback));
    }
}
