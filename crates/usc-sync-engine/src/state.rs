//! The Engine's commit-loop state machine. `Created -> Starting -> Running
//! <-> Paused`, with `Backoff(n)` reachable from `Running` on a
//! network/server failure, returning to `Running` after a delay or
//! escalating to `ErrorHold` past the configured attempt ceiling.

use std::time::Duration;

/// Where the commit loop currently stands.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineState {
    /// Running the load/merge-on-start sequence; no commits attempted yet.
    Starting,
    /// Normal operation: debounce, commit when dirty.
    Running,
    /// Suspended by an explicit `pause()`; commands still processed.
    Paused,
    /// Recovering from a network/server failure; `attempt` retries so far.
    Backoff {
        /// How many consecutive failures led here.
        attempt: u32,
    },
    /// A failure the loop cannot recover from automatically. Requires an
    /// explicit `restart()`.
    ErrorHold {
        /// Short machine-readable tag for the failure that caused this.
        kind: String,
    },
    /// Terminal: the engine task is shutting down.
    Stopped,
}

/// Exponential backoff delay for the `n`th consecutive failure (1-indexed),
/// doubling from `base` and capped at `ceiling`.
pub fn backoff_delay(attempt: u32, base: Duration, ceiling: Duration) -> Duration {
    let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
    base.checked_mul(factor).unwrap_or(ceiling).min(ceiling)
}
