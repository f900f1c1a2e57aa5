//! Primitive opcodes and their handlers.
//!
//! Primitives are the leaf operations of behavior routines: everything an
//! instruction can do that is not a subroutine call. Each handler is a
//! stateless singleton implementing [`Primitive`]; all per-invocation state
//! lives in the execution context, all cross-tick state on the thread.
//!
//! Operand bytes are decoded once per instruction visit (the frame caches the
//! decoded value), so a primitive that yields across many ticks never re-reads
//! its operand mid-flight.

pub mod goto_relative;
pub mod sleep;
pub mod transfer_funds;

use crate::engine::simulation::ExecutionContext;
use crate::engine::thread::ExitCode;
use goto_relative::GotoRelativeOperand;
use sleep::SleepOperand;
use transfer_funds::TransferFundsOperand;

/// Opcodes with a handler in this engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Opcode {
    Sleep = 0,
    GotoRelativePosition = 45,
    TransferFunds = 62,
}

impl Opcode {
    pub fn from_u16(value: u16) -> Option<Self> {
        match value {
            0 => Some(Opcode::Sleep),
            45 => Some(Opcode::GotoRelativePosition),
            62 => Some(Opcode::TransferFunds),
            _ => None,
        }
    }
}

/// A decoded operand. Decoding is total: unhandled opcodes keep their raw
/// bytes, so caching never loses information.
#[derive(Clone, Debug, PartialEq)]
pub enum OperandValue {
    Sleep(SleepOperand),
    GotoRelative(GotoRelativeOperand),
    TransferFunds(TransferFundsOperand),
    Raw([u8; 8]),
}

/// Decodes the operand bytes for `opcode`.
pub fn decode_operand(opcode: u16, raw: [u8; 8]) -> OperandValue {
    match Opcode::from_u16(opcode) {
        Some(Opcode::Sleep) => OperandValue::Sleep(SleepOperand::decode(raw)),
        Some(Opcode::GotoRelativePosition) => {
            OperandValue::GotoRelative(GotoRelativeOperand::decode(raw))
        }
        Some(Opcode::TransferFunds) => {
            OperandValue::TransferFunds(TransferFundsOperand::decode(raw))
        }
        None => OperandValue::Raw(raw),
    }
}

/// One primitive operation.
///
/// A handler runs at most once per scheduler step for its thread and reports
/// how the scheduler should proceed. Handlers invoked while a blocking state
/// is pending must consume that state before returning a branch.
pub trait Primitive: Send + Sync {
    fn execute(&self, ctx: &mut ExecutionContext<'_>, operand: &OperandValue) -> ExitCode;
}

static SLEEP: sleep::Sleep = sleep::Sleep;
static GOTO_RELATIVE: goto_relative::GotoRelativePosition = goto_relative::GotoRelativePosition;
static TRANSFER_FUNDS: transfer_funds::TransferFunds = transfer_funds::TransferFunds;

/// Looks up the handler for a primitive opcode.
pub fn handler_for(opcode: u16) -> Option<&'static dyn Primitive> {
    match Opcode::from_u16(opcode)? {
        Opcode::Sleep => Some(&SLEEP),
        Opcode::GotoRelativePosition => Some(&GOTO_RELATIVE),
        Opcode::TransferFunds => Some(&TRANSFER_FUNDS),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handled_opcodes_resolve_to_handlers() {
        assert!(handler_for(0).is_some());
        assert!(handler_for(45).is_some());
        assert!(handler_for(62).is_some());
        assert!(handler_for(1).is_none());
        assert!(handler_for(255).is_none());
    }

    #[test]
    fn unhandled_opcode_operand_keeps_raw_bytes() {
        let raw = [1, 2, 3, 4, 5, 6, 7, 8];
        assert_eq!(decode_operand(7, raw), OperandValue::Raw(raw));
    }
}
