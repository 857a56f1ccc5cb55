//! Load/merge-on-start decision.

use usc_types::SourceOfTruth;

/// What an Engine should do with its remote document when it starts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDecision {
    /// Load the remote document, replacing whatever is in memory.
    LoadRemote,
    /// Keep the in-memory state; the remote becomes the target of the next
    /// commit rather than something to load from.
    KeepInMemory,
}

impl MergeDecision {
    /// Human-readable summary, suitable for the first status event's
    /// context so the UI can surface which way this went.
    pub fn describe(self) -> &'static str {
        match self {
            MergeDecision::LoadRemote => "loaded remote document",
            MergeDecision::KeepInMemory => "kept in-memory state; remote will be overwritten on next commit",
        }
    }
}

/// `if in-memory is empty OR sourceOfTruth=git -> load remote; else keep in-
/// memory`.
pub fn decide_merge(in_memory_is_empty: bool, source_of_truth: SourceOfTruth) -> MergeDecision {
    if in_memory_is_empty || source_of_truth == SourceOfTruth::Git {
        MergeDecision::LoadRemote
    } else {
        MergeDecision::KeepInMemory
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_in_memory_always_loads_remote() {
        assert_eq!(decide_merge(true, SourceOfTruth::Local), MergeDecision::LoadRemote);
        assert_eq!(decide_merge(true, SourceOfTruth::Git), MergeDecision::LoadRemote);
    }

    #[test]
    fn git_authoritative_always_loads_remote() {
        assert_eq!(decide_merge(false, SourceOfTruth::Git), MergeDecision::LoadRemote);
    }

    #[test]
    fn local_authoritative_with_nonempty_memory_keeps_it() {
        assert_eq!(decide_merge(false, SourceOfTruth::Local), MergeDecision::KeepInMemory);
    }
}
