//! Scripted demo of the behavior engine.
//!
//! Builds a one-avatar, one-object lot, registers a small behavior routine
//! (walk to the object, pay the system account 100 simoleons, idle, finish),
//! then runs the tick loop, standing in for the route planner's driver by
//! completing accepted routes after one tick.
//!
//! # Usage
//! ```text
//! simvm [TICKS]
//! ```
//!
//! # Arguments
//! - `TICKS`: Maximum number of ticks to run (default 32)

use simvm::engine::command::EngineCommand;
use simvm::engine::routine::{Instruction, Routine, TARGET_RETURN_FALSE, TARGET_RETURN_TRUE};
use simvm::engine::simulation::{Services, Simulation};
use simvm::info;
use simvm::services::ledger::LocalLedger;
use simvm::services::pathfind::ApproveAllPlanner;
use simvm::world::{AccountId, Direction, Entity, EntityId, Position, World};
use std::env;
use std::process;
use std::sync::Arc;

const AVATAR: EntityId = EntityId(1);
const OBJECT: EntityId = EntityId(2);
const AVATAR_ACCOUNT: AccountId = AccountId(1001);

fn demo_world() -> World {
    let mut world = World::new();
    world.insert(Entity {
        id: AVATAR,
        persist: AVATAR_ACCOUNT,
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

/// Walk to the object, transfer 100 to the system account, idle two ticks.
fn demo_routine() -> Routine {
    Routine {
        id: 300,
        arg_count: 1,
        local_count: 0,
        instructions: vec![
            // Goto relative: in front of the stack object, one attempt.
            Instruction::new(45, 1, TARGET_RETURN_FALSE, [0, 0, 0, 0, 1, 0, 0, 0]),
            // Transfer funds: me-to-system, literal amount 100, misc expense.
            Instruction::new(62, 2, TARGET_RETURN_FALSE, [0, 0, 100, 0, 0, 0, 1, 2]),
            // Sleep: count down argument register 0.
            Instruction::new(0, TARGET_RETURN_TRUE, TARGET_RETURN_FALSE, [0; 8]),
        ],
    }
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let max_ticks: u64 = match args.get(1).map(|a| a.parse()) {
        Some(Ok(n)) => n,
        Some(Err(_)) => {
            eprintln!("usage: {} [TICKS]", args[0]);
            process::exit(1);
        }
        None => 32,
    };

    let ledger = Arc::new(LocalLedger::new());
    ledger.set_balance(AVATAR_ACCOUNT, 500);
    let planner = Arc::new(ApproveAllPlanner::new());
    let services = Services {
        ledger: ledger.clone(),
        planner: planner.clone(),
    };

    let mut sim = Simulation::new(demo_world(), services);
    sim.register_routine(demo_routine());
    let thread = match sim.spawn(300, AVATAR, OBJECT, &[2], false) {
        Ok(id) => id,
        Err(err) => {
            eprintln!("failed to spawn demo thread: {err}");
            process::exit(1);
        }
    };
    info!(
        "spawned thread {} with balance {}",
        thread.0,
        ledger.balance(AVATAR_ACCOUNT)
    );

    for _ in 0..max_ticks {
        sim.tick();
        let Some(state) = sim.thread(thread) else {
            break;
        };

        // Stand in for the planner's driver: move the avatar to the accepted
        // goal and complete the route on the next tick.
        if let Some(handle) = state.active_route {
            if let Some(goals) = planner.requests().last() {
                if let (Some(goal), Some(avatar)) = (goals.first(), sim.world_mut().get_mut(AVATAR))
                {
                    avatar.position = goal.position;
                }
            }
            sim.command_sender().send(EngineCommand::RouteComplete {
                thread,
                handle,
                success: true,
            });
        }
    }

    info!(
        "finished after {} ticks: balance {}, {} commands replayed",
        sim.current_tick(),
        ledger.balance(AVATAR_ACCOUNT),
        sim.replay_log().len()
    );
}
