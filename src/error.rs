use thiserror::Error;

/// Failures raised by navigation, extraction and resolution.
#[derive(Debug, Error)]
pub enum ScrapeError {
    /// Navigation did not finish within its budget.
    #[error("navigation to {url} timed out after {timeout_ms}ms")]
    NavigationTimeout { url: String, timeout_ms: u64 },

    /// Network failure or an HTTP error status.
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    /// The document has no h1-h3 structure to build a graph from.
    #[error("no heading structure found at {url}")]
    StructureNotFound { url: String },

    /// Every detail strategy came up empty.
    #[error("node {node_id} not found using any strategy")]
    ResolutionExhausted { node_id: String },

    /// The rendering session could not be acquired.
    #[error("rendering session failure: {0}")]
    SessionFailure(String),

    #[error("invalid url: {0}")]
    InvalidUrl(#[from] url::ParseError),
}

impl ScrapeError {
    /// Recoverable failures advance a strategy cascade or skip a single item.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ScrapeError::SessionFailure(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_failure_is_fatal() {
        assert!(!ScrapeError::SessionFailure("no key".into()).is_recoverable());
        assert!(ScrapeError::NavigationTimeout {
            url: "https://roadmap.sh/x".into(),
            timeout_ms: 10,
        }
        .is_recoverable());
    }

    #[test]
    fn messages_name_the_url() {
        let e = ScrapeError::StructureNotFound {
            url: "https://roadmap.sh/frontend".into(),
        };
        assert_eq!(e.to_string(), "no heading structure found at https://roadmap.sh/frontend");
    }
}
