//! The route planner seam.
//!
//! Movement primitives compute location goals; they never move anything
//! themselves. The planner accepts a goal list, drives the entity over later
//! ticks, and reports completion through a route command carrying the handle
//! it returned here. Rejecting a goal list outright is synchronous and means
//! no route will ever start.

use crate::world::LocationGoal;
use simvm_derive::BinaryCodec;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;

/// Identifier of one accepted route, unique within a planner instance.
///
/// Completion commands quote the handle so a thread that moved on to a new
/// route can tell a stale completion from the one it waits for.
#[derive(BinaryCodec, Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RouteHandle(pub u64);

/// Movement authority.
pub trait RoutePlanner: Send + Sync {
    /// Accepts a goal list and returns a handle for the route it will drive,
    /// or `None` if no goal is reachable.
    fn plan(&self, goals: &[LocationGoal]) -> Option<RouteHandle>;
}

/// Planner that accepts every request and records it.
///
/// It never completes routes by itself; tests and demos send the completion
/// command when they decide the route is done.
#[derive(Default)]
pub struct ApproveAllPlanner {
    requests: Mutex<Vec<Vec<LocationGoal>>>,
    next: AtomicU64,
}

impl ApproveAllPlanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// All goal lists accepted so far, in request order.
    pub fn requests(&self) -> Vec<Vec<LocationGoal>> {
        self.requests.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl RoutePlanner for ApproveAllPlanner {
    fn plan(&self, goals: &[LocationGoal]) -> Option<RouteHandle> {
        self.requests
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(goals.to_vec());
        Some(RouteHandle(self.next.fetch_add(1, Ordering::Relaxed) + 1))
    }
}

/// Planner that rejects every request.
pub struct RejectAllPlanner;

impl RoutePlanner for RejectAllPlanner {
    fn plan(&self, _goals: &[LocationGoal]) -> Option<RouteHandle> {
        None
    }
}
