#![forbid(unsafe_code)]
#![deny(missing_docs)]

//! **usc-types** – Shared data model, error kinds, and status events for
//! the Universe Synchronization Core.
//!
//! This crate is dependency-light and sits at the bottom of the crate
//! graph: every other crate depends on it, it depends on nothing internal.
//! It intentionally makes no assumptions about I/O, networking, or
//! storage — those live in `usc-provider`, `usc-store`, and friends.

pub mod credential;
pub mod error;
pub mod source;
pub mod status;
pub mod universe;

pub use credential::{AppInstallationCredential, Credential, Modality, OAuthCredential};
pub use error::{CoreError, Result};
pub use source::{Source, SourceKind};
pub use status::{EventSource, StatusEvent, StatusKind};
pub use universe::{
    GitRepo, LocalFile, Metadata, RepoHost, RepoRef, Slug, SourceOfTruth, Universe,
};
