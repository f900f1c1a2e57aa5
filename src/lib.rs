//! Deterministic behavior-script engine for a shared life simulation.
//!
//! The engine interprets compiled behavior routines on cooperatively
//! scheduled threads, one step per simulation tick. Anything authoritative
//! and external (the currency ledger, the route planner) is reached through
//! service traits, and every externally-sourced mutation re-enters the
//! simulation through an ordered command stream, so identical inputs always
//! produce identical state on every participant.

pub mod engine;
pub mod primitives;
pub mod services;
pub mod types;
pub mod utils;
pub mod world;

#[cfg(test)]
pub mod test_utils;
