//! Pipeline error taxonomy.
//!
//! Failures are handled at the narrowest possible scope: per-call
//! (`TransientNetwork` → retry), per-candidate/per-source (`SoftRetrieval` →
//! next candidate or empty result), per-run (`DirectoryUnavailable` → stale
//! cache), and only truly unexpected errors escalate to the scheduler
//! boundary as `RunFatal`.

/// All errors the pipeline distinguishes by handling policy.
#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    /// A network call failed in a way worth retrying.
    #[error("transient network error: {0}")]
    TransientNetwork(String),

    /// A candidate endpoint or source yielded nothing usable. Non-fatal:
    /// the caller falls through to the next candidate or source.
    #[error("no data from {store}: {reason}")]
    SoftRetrieval { store: String, reason: String },

    /// The store directory could not be fetched and no cache exists.
    #[error("store directory unavailable: {0}")]
    DirectoryUnavailable(String),

    /// The dynamic rendering engine is not usable.
    #[error("renderer unavailable: {0}")]
    RendererUnavailable(String),

    /// An unexpected error escaped all inner handling. Caught only at the
    /// scheduler boundary.
    #[error("run failed: {0}")]
    RunFatal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl PipelineError {
    /// Whether this error is worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientNetwork(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soft_retrieval_renders_store_and_reason() {
        let err = PipelineError::SoftRetrieval {
            store: "0423".to_string(),
            reason: "no candidate endpoint yielded data".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "no data from 0423: no candidate endpoint yielded data"
        );
        assert!(!err.is_transient());
    }

    #[test]
    fn test_transient_classification() {
        assert!(PipelineError::TransientNetwork("timeout".into()).is_transient());
        assert!(!PipelineError::RunFatal("boom".into()).is_transient());
    }
}
