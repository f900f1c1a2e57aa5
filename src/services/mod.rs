//! External service seams.
//!
//! The engine never owns authoritative shared state. Money lives behind
//! [`ledger::Ledger`] and movement behind [`pathfind::RoutePlanner`]; both
//! are trait objects so a simulation can run against local in-process
//! implementations or remote authoritative ones without the interpreter
//! noticing.

pub mod ledger;
pub mod pathfind;
