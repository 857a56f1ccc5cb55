//! [`EngineHandle`] — the only way anything outside this crate talks to a
//! running [`crate::Engine`].

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use usc_codec::GraphStoreState;
use usc_types::{CoreError, Result, SourceOfTruth};

use crate::command::Command;
use crate::engine::StatusSnapshot;

/// A cheap, cloneable-by-reference handle to a spawned Engine task.
pub struct EngineHandle {
    commands: mpsc::Sender<Command>,
    status: watch::Receiver<StatusSnapshot>,
    task: JoinHandle<()>,
}

fn send_closed() -> CoreError {
    CoreError::InvariantViolation("engine task is no longer running".into())
}

impl EngineHandle {
    pub(crate) fn new(commands: mpsc::Sender<Command>, status: watch::Receiver<StatusSnapshot>, task: JoinHandle<()>) -> Self {
        Self { commands, status, task }
    }

    /// Store a reference to the latest in-memory state and mark it dirty.
    /// Cheap; does not itself trigger a commit.
    pub async fn update_state(&self, state: GraphStoreState, drag_active: bool) -> Result<()> {
        self.commands
            .send(Command::UpdateState { state, drag_active })
            .await
            .map_err(|_| send_closed())
    }

    /// Commit `state` immediately, bypassing debounce, and wait for the
    /// outcome (the resulting content sha, or the error the attempt ended
    /// on).
    pub async fn force_commit(&self, state: GraphStoreState) -> Result<String> {
        let (reply, rx) = oneshot::channel();
        self.commands
            .send(Command::ForceCommit { state, reply })
            .await
            .map_err(|_| send_closed())?;
        rx.await.map_err(|_| send_closed())?
    }

    /// Suspend the commit loop.
    pub async fn pause(&self) -> Result<()> {
        self.commands.send(Command::Pause).await.map_err(|_| send_closed())
    }

    /// Resume a paused engine.
    pub async fn resume(&self) -> Result<()> {
        self.commands.send(Command::Resume).await.map_err(|_| send_closed())
    }

    /// Leave `ErrorHold`/`Backoff` and resume normal operation.
    pub async fn restart(&self) -> Result<()> {
        self.commands.send(Command::Restart).await.map_err(|_| send_closed())
    }

    /// Change which side is authoritative for conflict resolution.
    pub async fn set_source_of_truth(&self, mode: SourceOfTruth) -> Result<()> {
        self.commands
            .send(Command::SetSourceOfTruth(mode))
            .await
            .map_err(|_| send_closed())
    }

    /// Ask the engine task to shut down. Does not wait for it to actually
    /// stop — callers that need that use [`Self::join`].
    pub async fn stop(&self) -> Result<()> {
        // Best-effort: if the task already exited this simply finds the
        // receiver gone, which is the outcome we wanted anyway.
        let _ = self.commands.send(Command::Stop).await;
        Ok(())
    }

    /// The most recently published status.
    pub fn get_status(&self) -> StatusSnapshot {
        self.status.borrow().clone()
    }

    /// Wait for the engine task to actually exit, e.g. after [`Self::stop`].
    /// The Universe Manager's bounded-timeout delete wraps this in a
    /// `tokio::time::timeout`.
    pub async fn join(self) {
        let _ = self.task.await;
    }
}
