//! Commands the Engine's owning task accepts over its `mpsc` channel.

use tokio::sync::oneshot;

use usc_codec::GraphStoreState;
use usc_types::{Result, SourceOfTruth};

/// One inbound instruction to a running [`crate::Engine`].
pub enum Command {
    /// Store a reference to the latest in-memory state and mark it dirty.
    /// Cheap; does not itself trigger a commit. `drag_active` extends the
    /// debounce window while a drag/edit is in progress.
    UpdateState {
        /// Latest snapshot of the graph store.
        state: GraphStoreState,
        /// Whether the caller is mid-interaction (extends debounce).
        drag_active: bool,
    },
    /// Commit `state` immediately, bypassing the debounce wait (but not
    /// backoff/error-hold gating). Replies with the new content sha.
    ForceCommit {
        /// State to commit.
        state: GraphStoreState,
        /// Resolved with the outcome of the commit attempt.
        reply: oneshot::Sender<Result<String>>,
    },
    /// Suspend the commit loop. Commands are still accepted.
    Pause,
    /// Resume a paused engine.
    Resume,
    /// Leave `ErrorHold` (or `Backoff`) and resume normal operation.
    Restart,
    /// Change which side is authoritative for conflict resolution.
    SetSourceOfTruth(SourceOfTruth),
    /// Shut the engine task down. No further commands are processed.
    Stop,
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Command::UpdateState { drag_active, .. } => {
                f.debug_struct("UpdateState").field("drag_active", drag_active).finish()
            }
            Command::ForceCommit { .. } => f.debug_struct("ForceCommit").finish(),
            Command::Pause => write!(f, "Pause"),
            Command::Resume => write!(f, "Resume"),
            Command::Restart => write!(f, "Restart"),
            Command::SetSourceOfTruth(mode) => write!(f, "SetSourceOfTruth({mode:?})"),
            Command::Stop => write!(f, "Stop"),
        }
    }
}
