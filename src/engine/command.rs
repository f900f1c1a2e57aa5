//! The deterministic command stream.
//!
//! External services complete on their own schedule, possibly on other OS
//! threads. Their callbacks never touch simulation state directly: they send
//! an [`EngineCommand`] through a [`CommandSender`], and the tick loop applies
//! queued commands in arrival order at the start of each tick. That single
//! ordered write path is what lets every participant in a shared simulation
//! apply identical mutations in identical order, whatever the wall-clock
//! timing of the underlying requests.

use crate::engine::blocking::BlockingState;
use crate::engine::thread::ThreadId;
use crate::services::pathfind::RouteHandle;
use simvm_derive::BinaryCodec;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};

/// One entry of the replicated command stream.
///
/// Commands are serializable so one participant's stream can be shipped to
/// and replayed by the others.
#[derive(BinaryCodec, Clone, Debug, PartialEq, Eq)]
pub enum EngineCommand {
    /// An asynchronous request completed; deliver the result payload into the
    /// thread's blocking slot.
    AsyncResponse {
        thread: ThreadId,
        state: BlockingState,
    },
    /// The route planner finished driving a route for the thread.
    RouteComplete {
        thread: ThreadId,
        handle: RouteHandle,
        success: bool,
    },
}

impl EngineCommand {
    /// The thread this command addresses.
    pub fn thread(&self) -> ThreadId {
        match self {
            EngineCommand::AsyncResponse { thread, .. } => *thread,
            EngineCommand::RouteComplete { thread, .. } => *thread,
        }
    }
}

/// Handle services use to append to the command stream.
///
/// Cloneable and sendable across OS threads. Sending never blocks; a send
/// after the simulation is gone is silently dropped.
#[derive(Clone)]
pub struct CommandSender {
    tx: UnboundedSender<EngineCommand>,
}

impl CommandSender {
    pub fn send(&self, command: EngineCommand) {
        // Receiver dropped means the whole simulation is gone; late
        // completions have nowhere meaningful to land.
        let _ = self.tx.send(command);
    }
}

/// Creates the command stream endpoints for one simulation instance.
pub fn command_channel() -> (CommandSender, UnboundedReceiver<EngineCommand>) {
    let (tx, rx) = unbounded_channel();
    (CommandSender { tx }, rx)
}
