//! Sleep: suspend the thread for a scripted number of ticks.
//!
//! The operand names an argument register holding the remaining tick count.
//! Each invocation with a positive count decrements it and yields, so the
//! countdown survives suspension in the frame itself; once the register hits
//! zero the primitive resolves true.

use crate::engine::simulation::ExecutionContext;
use crate::engine::thread::ExitCode;
use crate::primitives::{OperandValue, Primitive};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SleepOperand {
    /// Index of the argument register holding the remaining tick count.
    pub arg: u16,
}

impl SleepOperand {
    pub fn decode(raw: [u8; 8]) -> Self {
        Self {
            arg: u16::from_le_bytes([raw[0], raw[1]]),
        }
    }
}

pub struct Sleep;

impl Primitive for Sleep {
    fn execute(&self, ctx: &mut ExecutionContext<'_>, operand: &OperandValue) -> ExitCode {
        let OperandValue::Sleep(operand) = operand else {
            return ExitCode::BranchFalse;
        };
        let frame = ctx.thread.frame_mut();
        match frame.args.get_mut(operand.arg as usize) {
            Some(remaining) if *remaining > 0 => {
                *remaining -= 1;
                ExitCode::YieldTick
            }
            Some(_) => ExitCode::BranchTrue,
            None => ExitCode::BranchFalse,
        }
    }
}
