//! The behavior execution engine.
//!
//! A simulation owns a registry of compiled [`routine::Routine`]s, a set of
//! live [`thread::Thread`]s, and the [`command::EngineCommand`] stream that
//! serializes all externally-sourced mutations. Each call to
//! [`simulation::Simulation::tick`] first applies queued commands, then
//! advances every runnable thread until it yields, completes, or exhausts its
//! per-tick instruction budget.

pub mod blocking;
pub mod command;
pub mod errors;
pub mod memory;
pub mod routine;
pub mod simulation;
pub mod thread;
