//! Behavior routine representation and serialization.
//!
//! A [`Routine`] is one compiled behavior tree: a flat list of fixed-layout
//! instructions plus register-file sizing. The serialized container carries
//! magic bytes and a format version, validated on load; the instruction wire
//! layout itself is a compatibility contract for save games and network
//! transfer and must not change shape.

use crate::engine::errors::SimError;
use crate::types::encoding::{Decode, Encode};
use simvm_derive::BinaryCodec;

/// Magic bytes identifying a serialized routine container.
const MAGIC: &[u8; 4] = b"SIMR";

/// Current routine container format version.
const CURRENT_VERSION: Version = Version::new(0, 2, 0);

/// Branch target meaning "this routine returns true".
pub const TARGET_RETURN_TRUE: u8 = 254;
/// Branch target meaning "this routine returns false".
pub const TARGET_RETURN_FALSE: u8 = 255;
/// Branch target meaning "unrecoverable script error": the thread terminates.
pub const TARGET_ERROR: u8 = 253;

/// Opcode values at or above this call the routine with that id instead of a
/// primitive; the operand words seed the callee's arguments.
pub const SUBROUTINE_BASE: u16 = 256;

/// Semantic version for routine container compatibility.
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, BinaryCodec)]
struct Version {
    major: u8,
    minor: u8,
    patch: u8,
}

impl Version {
    const fn new(major: u8, minor: u8, patch: u8) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }
}

/// One behavior instruction: a 12-byte fixed-layout record.
///
/// There is no linear "next instruction": control flow is explicit. Every
/// instruction names the instruction index (or return code) to jump to on a
/// true result and on a false result.
#[derive(BinaryCodec, Clone, Debug, PartialEq, Eq)]
pub struct Instruction {
    /// Primitive opcode, or callee routine id if `>= SUBROUTINE_BASE`.
    pub opcode: u16,
    /// Where to go when the instruction resolves true.
    pub true_target: u8,
    /// Where to go when the instruction resolves false.
    pub false_target: u8,
    /// Fixed 8-byte operand record; layout is opcode-specific.
    pub operand: [u8; 8],
}

impl Instruction {
    pub fn new(opcode: u16, true_target: u8, false_target: u8, operand: [u8; 8]) -> Self {
        Self {
            opcode,
            true_target,
            false_target,
            operand,
        }
    }
}

/// One compiled behavior routine.
#[derive(BinaryCodec, Clone, Debug, PartialEq, Eq)]
pub struct Routine {
    /// Routine id; ids `>= SUBROUTINE_BASE` are callable from other routines.
    pub id: u16,
    /// Number of argument registers a frame of this routine carries.
    pub arg_count: u8,
    /// Number of local registers a frame of this routine carries.
    pub local_count: u8,
    /// Instruction list; execution starts at index 0.
    pub instructions: Vec<Instruction>,
}

impl Routine {
    /// Serializes the routine to a portable binary container.
    ///
    /// The output includes a magic header and version for compatibility
    /// checking.
    pub fn to_container(&self) -> Vec<u8> {
        let mut out = Vec::new();
        MAGIC.encode(&mut out);
        CURRENT_VERSION.encode(&mut out);
        self.encode(&mut out);
        out
    }

    /// Deserializes a routine from its binary container.
    ///
    /// Validates the magic header and version. A malformed container is fatal
    /// to loading this routine only; callers keep the simulation running.
    pub fn from_container(mut input: &[u8]) -> Result<Self, SimError> {
        let bad = |reason: &str| SimError::BadContainer(reason.to_string());

        if input.len() < MAGIC.len() {
            return Err(bad("truncated"));
        }

        if &<[u8; 4]>::decode(&mut input).map_err(|_| bad("truncated"))? != MAGIC {
            return Err(bad("bad magic"));
        }

        if Version::decode(&mut input).map_err(|_| bad("truncated"))? != CURRENT_VERSION {
            return Err(bad("unsupported version"));
        }

        let routine = Routine::decode(&mut input).map_err(|_| bad("malformed body"))?;
        if !input.is_empty() {
            return Err(bad("trailing bytes"));
        }
        Ok(routine)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Routine {
        Routine {
            id: 300,
            arg_count: 4,
            local_count: 2,
            instructions: vec![
                Instruction::new(0, 1, TARGET_RETURN_FALSE, [0; 8]),
                Instruction::new(62, TARGET_RETURN_TRUE, TARGET_ERROR, [1, 2, 3, 4, 5, 6, 7, 8]),
            ],
        }
    }

    #[test]
    fn instruction_wire_layout_is_twelve_bytes() {
        let instr = Instruction::new(0x2D, 1, 2, [9, 8, 7, 6, 5, 4, 3, 2]);
        let bytes = instr.to_bytes();
        assert_eq!(bytes.len(), 12);
        // opcode little-endian, then both targets, then the raw operand
        assert_eq!(&bytes[0..2], &[0x2D, 0x00]);
        assert_eq!(&bytes[2..4], &[1, 2]);
        assert_eq!(&bytes[4..], &[9, 8, 7, 6, 5, 4, 3, 2]);
    }

    #[test]
    fn container_roundtrip() {
        let routine = sample();
        let bytes = routine.to_container();
        let decoded = Routine::from_container(&bytes).unwrap();
        assert_eq!(decoded, routine);
    }

    #[test]
    fn container_rejects_bad_magic() {
        let mut bytes = sample().to_container();
        bytes[0] = b'X';
        assert!(matches!(
            Routine::from_container(&bytes),
            Err(SimError::BadContainer(_))
        ));
    }

    #[test]
    fn container_rejects_wrong_version() {
        let mut bytes = sample().to_container();
        bytes[4] = 99; // major version byte
        assert!(matches!(
            Routine::from_container(&bytes),
            Err(SimError::BadContainer(_))
        ));
    }

    #[test]
    fn container_rejects_trailing_bytes() {
        let mut bytes = sample().to_container();
        bytes.push(0);
        assert!(matches!(
            Routine::from_container(&bytes),
            Err(SimError::BadContainer(_))
        ));
    }

    #[test]
    fn container_rejects_truncation() {
        let bytes = sample().to_container();
        for cut in [0, 3, 7, bytes.len() - 1] {
            assert!(matches!(
                Routine::from_container(&bytes[..cut]),
                Err(SimError::BadContainer(_))
            ));
        }
    }
}
