use simvm_derive::Error;

/// Errors that can occur while loading or executing behavior routines.
///
/// Script-level failures (unknown tags, rejected services) are NOT errors:
/// they resolve to branch-false so scripts can branch on them. This type
/// covers the loader and scheduler faults that terminate a single thread.
#[derive(Debug, Error)]
pub enum SimError {
    /// Routine id is not registered with the simulation.
    #[error("unknown routine: {0}")]
    UnknownRoutine(u16),
    /// Serialized routine container failed validation.
    #[error("routine container rejected: {0}")]
    BadContainer(String),
    /// Instruction pointer landed outside the routine's instruction list.
    #[error("instruction pointer {ip} outside routine {routine}")]
    InvalidInstructionPointer { routine: u16, ip: usize },
    /// Branch target is neither a return code nor a valid instruction index.
    #[error("branch target {target} outside routine {routine}")]
    InvalidBranchTarget { routine: u16, target: u8 },
    /// The script jumped to the designated error target.
    #[error("script error in routine {0}")]
    ScriptError(u16),
}
