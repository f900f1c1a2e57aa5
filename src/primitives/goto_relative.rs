//! Goto-relative-position: route the caller to a spot near the stack object.
//!
//! The primitive computes a location goal relative to the stack object's
//! position and facing, hands it to the route planner, and parks the thread
//! on the returned route. The planner drives the movement over later ticks;
//! its completion arrives as a route command that resolves this instruction's
//! branch. A goal the planner rejects outright resolves false immediately.

use crate::engine::simulation::ExecutionContext;
use crate::engine::thread::ExitCode;
use crate::primitives::{OperandValue, Primitive};
use crate::world::{Direction, LocationGoal, Position};

/// Location selector: stand in front of the stack object, facing it.
pub const LOCATION_IN_FRONT_OF: i8 = 0;
/// Location selector: stand on the stack object's own tile.
pub const LOCATION_ON_TOP_OF: i8 = -2;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GotoRelativeOperand {
    /// Legacy trap count; carried for format compatibility, unused.
    pub old_trap_count: u16,
    /// Location selector relative to the stack object.
    pub location: i8,
    /// Requested arrival facing selector; the location selector decides the
    /// facing for the cases this engine handles.
    pub direction: i8,
    /// Number of route attempts the script permits.
    pub route_count: u16,
    pub flags: u8,
}

impl GotoRelativeOperand {
    pub fn decode(raw: [u8; 8]) -> Self {
        Self {
            old_trap_count: u16::from_le_bytes([raw[0], raw[1]]),
            location: raw[2] as i8,
            direction: raw[3] as i8,
            route_count: u16::from_le_bytes([raw[4], raw[5]]),
            flags: raw[6],
        }
    }
}

pub struct GotoRelativePosition;

impl Primitive for GotoRelativePosition {
    fn execute(&self, ctx: &mut ExecutionContext<'_>, operand: &OperandValue) -> ExitCode {
        let OperandValue::GotoRelative(operand) = operand else {
            return ExitCode::BranchFalse;
        };

        let stack_object = ctx.thread.frame().stack_object;
        let Some(target) = ctx.world.get(stack_object) else {
            return ExitCode::BranchFalse;
        };

        let goal = match operand.location {
            LOCATION_IN_FRONT_OF => {
                let (offset, facing) = match target.direction {
                    Direction::South => (Position::new(0.0, 1.0, 0.0), Direction::North),
                    Direction::West => (Position::new(-1.0, 0.0, 0.0), Direction::East),
                    Direction::East => (Position::new(1.0, 0.0, 0.0), Direction::East),
                    Direction::North => (Position::new(0.0, -1.0, 0.0), Direction::South),
                };
                LocationGoal {
                    position: target.position + offset + Position::CENTER,
                    flags: facing.flag(),
                }
            }
            LOCATION_ON_TOP_OF => LocationGoal {
                position: target.position + Position::CENTER,
                flags: target.direction.flag(),
            },
            _ => return ExitCode::BranchFalse,
        };

        match ctx.services.planner.plan(&[goal]) {
            Some(handle) => {
                ctx.thread.active_route = Some(handle);
                ExitCode::Continue
            }
            None => ExitCode::BranchFalse,
        }
    }
}
