//! Thread and stack-frame model.
//!
//! One [`Thread`] exists per active behavior execution. It owns a call stack
//! of [`Frame`]s (last is active), fixed temp register files shared by the
//! whole stack, and the single blocking-state slot used by asynchronous
//! primitives. Frames reference entities by id only; the world registry owns
//! the entities themselves.

use crate::engine::blocking::BlockingState;
use crate::engine::routine::Routine;
use crate::primitives::{decode_operand, OperandValue};
use crate::services::pathfind::RouteHandle;
use crate::world::EntityId;
use simvm_derive::BinaryCodec;

/// Number of per-thread 16-bit temp registers.
pub const TEMP_COUNT: usize = 20;
/// Number of per-thread 32-bit wide temp registers.
pub const TEMP_XL_COUNT: usize = 2;

/// Stable identifier of one behavior thread within a simulation instance.
#[derive(BinaryCodec, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ThreadId(pub u32);

/// Outcome of one primitive invocation. Every handler call yields exactly one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ExitCode {
    /// Re-evaluate the top of the call stack within the same tick. Used after
    /// a handler pushed a frame or handed the thread to the route planner.
    Continue,
    /// Follow the instruction's true target.
    BranchTrue,
    /// Follow the instruction's false target.
    BranchFalse,
    /// Stop here; re-execute the same instruction next tick.
    YieldTick,
    /// Park the thread until a command addressed to it arrives.
    YieldEvent,
    /// Tear the thread down.
    Terminate,
}

/// One activation record for a routine invocation.
pub struct Frame {
    /// Id of the routine this frame executes.
    pub routine: u16,
    /// Index of the current instruction.
    pub ip: usize,
    /// Entity whose behavior invoked this routine.
    pub caller: EntityId,
    /// Implicit receiver the routine acts on.
    pub stack_object: EntityId,
    /// Argument registers; callers seed them, the routine may overwrite them.
    pub args: Vec<i16>,
    /// Local registers, zero-initialized.
    pub locals: Vec<i16>,
    /// Operand decoded for the instruction at `.0`; decoding happens once per
    /// instruction visit, not once per tick of a yielding primitive.
    cached_operand: Option<(usize, OperandValue)>,
}

impl Frame {
    /// Creates a frame for `routine`, padding `args` up to the routine's
    /// declared argument count.
    pub fn new(routine: &Routine, caller: EntityId, stack_object: EntityId, args: &[i16]) -> Self {
        let mut padded = args.to_vec();
        padded.resize(routine.arg_count as usize, 0);
        Self {
            routine: routine.id,
            ip: 0,
            caller,
            stack_object,
            args: padded,
            locals: vec![0; routine.local_count as usize],
            cached_operand: None,
        }
    }

    /// Returns the decoded operand for the current instruction, decoding and
    /// caching it on first access.
    pub fn operand(&mut self, opcode: u16, raw: [u8; 8]) -> OperandValue {
        match &self.cached_operand {
            Some((ip, value)) if *ip == self.ip => value.clone(),
            _ => {
                let value = decode_operand(opcode, raw);
                self.cached_operand = Some((self.ip, value.clone()));
                value
            }
        }
    }
}

/// One cooperatively-scheduled behavior execution.
pub struct Thread {
    pub id: ThreadId,
    frames: Vec<Frame>,
    /// 16-bit scratch registers shared across the whole call stack.
    pub temps: [i16; TEMP_COUNT],
    /// 32-bit scratch registers for values that do not fit a temp.
    pub temps_xl: [i32; TEMP_XL_COUNT],
    /// Slot for the single outstanding asynchronous request, if any.
    pub blocking: Option<BlockingState>,
    /// True while this thread runs inside a feasibility check: primitives
    /// must only simulate, never commit.
    pub is_check: bool,
    /// Route the planner is currently driving for this thread, if any. While
    /// set, the scheduler does not advance the thread.
    pub active_route: Option<RouteHandle>,
    waiting_for_event: bool,
}

impl Thread {
    pub fn new(id: ThreadId, first: Frame, is_check: bool) -> Self {
        Self {
            id,
            frames: vec![first],
            temps: [0; TEMP_COUNT],
            temps_xl: [0; TEMP_XL_COUNT],
            blocking: None,
            is_check,
            active_route: None,
            waiting_for_event: false,
        }
    }

    /// The active frame.
    ///
    /// Panics if the stack is empty: the scheduler removes a thread the
    /// moment its stack empties, so an empty stack here is a scheduler bug.
    pub fn frame(&self) -> &Frame {
        self.frames.last().expect("thread has no active frame")
    }

    /// Mutable access to the active frame. Same invariant as [`Self::frame`].
    pub fn frame_mut(&mut self) -> &mut Frame {
        self.frames.last_mut().expect("thread has no active frame")
    }

    pub fn push_frame(&mut self, frame: Frame) {
        self.frames.push(frame);
    }

    pub fn pop_frame(&mut self) -> Option<Frame> {
        self.frames.pop()
    }

    pub fn stack_depth(&self) -> usize {
        self.frames.len()
    }

    pub fn stack_is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// True while the thread waits on the planner or an external event; the
    /// scheduler skips parked threads until a command wakes them.
    pub fn is_parked(&self) -> bool {
        self.waiting_for_event || self.active_route.is_some()
    }

    pub fn park_for_event(&mut self) {
        self.waiting_for_event = true;
    }

    pub fn wake(&mut self) {
        self.waiting_for_event = false;
    }
}
