//! Variable-scope addressed register reads.
//!
//! Operands do not name registers directly; they carry a scope tag plus an
//! index, resolved against the thread and its active frame. Unknown scope
//! tags resolve to a failed read, which handlers surface as branch-false so
//! scripts stay forward-compatible with tags this engine does not implement.

use crate::engine::thread::Thread;

/// Register scopes addressable from an operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VariableScope {
    /// The index itself is the value.
    Literal,
    /// The active frame's argument registers.
    Parameters,
    /// The active frame's local registers.
    Local,
    /// The thread's 16-bit temp registers.
    Temps,
    /// The thread's 32-bit wide temp registers.
    TempsXl,
}

impl VariableScope {
    /// Maps a raw scope tag; unknown tags return `None`.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0 => Some(VariableScope::Literal),
            1 => Some(VariableScope::Parameters),
            2 => Some(VariableScope::Local),
            3 => Some(VariableScope::Temps),
            4 => Some(VariableScope::TempsXl),
            _ => None,
        }
    }
}

/// Reads a 32-bit value through a scope tag and index.
///
/// Returns `None` for unknown scopes and out-of-range indices; callers treat
/// a failed read as a normal script failure, not a fault.
pub fn read_big(thread: &Thread, scope_tag: u8, index: u16) -> Option<i32> {
    let scope = VariableScope::from_tag(scope_tag)?;
    let value = match scope {
        VariableScope::Literal => index as i16 as i32,
        VariableScope::Parameters => *thread.frame().args.get(index as usize)? as i32,
        VariableScope::Local => *thread.frame().locals.get(index as usize)? as i32,
        VariableScope::Temps => *thread.temps.get(index as usize)? as i32,
        VariableScope::TempsXl => *thread.temps_xl.get(index as usize)?,
    };
    Some(value)
}
