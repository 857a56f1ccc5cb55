//! Request/response shapes shared by every [`crate::Provider`].

use serde::{Deserialize, Serialize};

/// One entry returned by [`crate::Provider::list_files`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    /// File name relative to the listed directory.
    pub name: String,
    /// Content sha the host currently has on record.
    pub sha: String,
    /// Size in bytes.
    pub size: u64,
}

/// The result of [`crate::Provider::get_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    /// Raw file bytes.
    pub bytes: Vec<u8>,
    /// Content sha at the time of the read.
    pub sha: String,
}

/// The result of [`crate::Provider::put_file`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PutResult {
    /// The sha the host assigned to the newly written content.
    pub new_sha: String,
}
