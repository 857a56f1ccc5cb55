#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **usc-auth** – Persistent credential storage, refresh, and health-check
//! scheduling for the Universe Synchronization Core. Credentials are durable
//! (`usc-store`), refreshed transparently where possible, and exposed to the
//! rest of the system through a single [`PersistentAuth::get_token`] call —
//! callers never cache a token themselves; this crate owns every credential
//! and everyone else obtains one through `get_token`.

pub mod manager;
pub mod refresher;

pub use manager::PersistentAuth;
pub use refresher::{HealthStatus, TokenRefresher};
