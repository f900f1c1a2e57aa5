//! World model: the entity registry the interpreter executes against.
//!
//! Frames never own the entities they act on. They hold stable [`EntityId`]s
//! resolved through the [`World`] registry, so a thread can outlive (or be
//! outlived by) the objects it references without dangling anything.

use crate::types::encoding::{Decode, DecodeError, Encode};
use simvm_derive::BinaryCodec;
use std::collections::BTreeMap;
use std::ops::Add;

/// Stable identifier of an in-world object or avatar.
///
/// Ids are lot-local and never reused within a simulation instance.
#[derive(BinaryCodec, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct EntityId(pub u32);

/// Global persistent account identifier used by the authoritative ledger.
///
/// Resolves to a player-owned account, an object's stored balance, or the
/// fixed system account ([`AccountId::MAXIS`]).
#[derive(BinaryCodec, Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct AccountId(pub u32);

impl AccountId {
    /// The fixed system account. Transfers with an unset side default here.
    pub const MAXIS: AccountId = AccountId(u32::MAX);
}

/// A point in lot space, in the same coordinate system entities store their
/// own positions in.
#[derive(BinaryCodec, Clone, Copy, Debug, PartialEq)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

impl Position {
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Fixed half-unit centering offset applied to every resolved target
    /// position: tile coordinates address corners, targets address centers.
    pub const CENTER: Position = Position::new(0.5, 0.5, 0.0);
}

impl Add for Position {
    type Output = Position;

    fn add(self, rhs: Position) -> Position {
        Position::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

/// Cardinal facing of an entity.
///
/// Discriminants are the raw slot-flag bit values, so a facing can be handed
/// to the route planner as an orientation flag without translation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u32)]
pub enum Direction {
    North = 0x01,
    East = 0x04,
    South = 0x10,
    West = 0x40,
}

/// Orientation flag bits understood by the route planner.
///
/// Cardinal values coincide with [`Direction`] discriminants; intercardinals
/// fill the gaps in the same clockwise bit progression.
pub mod slot_flags {
    pub const NORTH: u32 = 0x01;
    pub const NORTH_EAST: u32 = 0x02;
    pub const EAST: u32 = 0x04;
    pub const SOUTH_EAST: u32 = 0x08;
    pub const SOUTH: u32 = 0x10;
    pub const SOUTH_WEST: u32 = 0x20;
    pub const WEST: u32 = 0x40;
    pub const NORTH_WEST: u32 = 0x80;
}

impl Direction {
    /// The raw orientation-flag value of this facing.
    pub fn flag(self) -> u32 {
        self as u32
    }
}

impl Encode for Direction {
    fn encode<S: crate::types::encoding::EncodeSink>(&self, out: &mut S) {
        self.flag().encode(out);
    }
}

impl Decode for Direction {
    fn decode(input: &mut &[u8]) -> Result<Self, DecodeError> {
        match u32::decode(input)? {
            0x01 => Ok(Direction::North),
            0x04 => Ok(Direction::East),
            0x10 => Ok(Direction::South),
            0x40 => Ok(Direction::West),
            _ => Err(DecodeError::InvalidValue),
        }
    }
}

/// One candidate target handed to the route planner: where to stand and which
/// way to arrive facing.
#[derive(BinaryCodec, Clone, Copy, Debug, PartialEq)]
pub struct LocationGoal {
    pub position: Position,
    pub flags: u32,
}

/// One in-world object or avatar.
#[derive(Clone, Debug)]
pub struct Entity {
    pub id: EntityId,
    /// Ledger account this entity's funds live under.
    pub persist: AccountId,
    pub position: Position,
    pub direction: Direction,
    /// Locally-known balance for objects that store cash (read synchronously
    /// in check mode; the ledger remains authoritative for commits).
    pub budget: u32,
}

/// Registry of all live entities in a simulation instance.
///
/// Backed by a `BTreeMap` so iteration order is deterministic across
/// participants.
#[derive(Default)]
pub struct World {
    entities: BTreeMap<EntityId, Entity>,
}

impl World {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entity, replacing any previous entity with the same id.
    pub fn insert(&mut self, entity: Entity) {
        self.entities.insert(entity.id, entity);
    }

    /// Resolves an entity id, returning `None` if it no longer exists.
    pub fn get(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn get_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// Removes an entity. Threads referencing it keep their id; resolution
    /// simply starts failing, which handlers surface as branch-false.
    pub fn remove(&mut self, id: EntityId) -> Option<Entity> {
        self.entities.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
