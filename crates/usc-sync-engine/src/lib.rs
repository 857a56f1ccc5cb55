#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **usc-sync-engine** – One commit loop per universe with `gitRepo.enabled
//! = true`. An [`Engine`] owns no network connection or file descriptor of
//! its own — it drives a [`usc_provider::Provider`] and a
//! [`usc_rate_limiter::RateLimiter`] it is handed at [`spawn`] time, so the
//! same loop works against GitHub, Gitea, or a test double.

mod command;
mod engine;
mod handle;
mod merge;
mod state;

pub use command::Command;
pub use engine::{spawn, Engine, EngineConfig, StatusSnapshot};
pub use handle::EngineHandle;
pub use merge::{decide_merge, MergeDecision};
pub use state::{backoff_delay, EngineState};
