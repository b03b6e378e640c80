/// Errors surfaced by a data backend.
///
/// Every variant is recoverable from the synchronizer's point of view: the
/// last-known-good view is retained and the failure is shown as a dismissable
/// message, never propagated to the rendering layer.
#[derive(Clone, Debug, thiserror::Error)]
pub enum BackendError {
    #[error("query failed: {0}")]
    Query(String),

    #[error("mutation failed: {0}")]
    Mutation(String),

    #[error("subscribe failed: {0}")]
    Subscribe(String),

    #[error("not found: {0}")]
    NotFound(String),
}

impl BackendError {
    /// Whether retrying the same call later could plausibly succeed.
    pub fn is_transient(&self) -> bool {
        !matches!(self, Self::NotFound(_))
    }

    /// Short classification string for logging.
    pub fn error_kind(&self) -> &'static str {
        match self {
            Self::Query(_) => "query",
            Self::Mutation(_) => "mutation",
            Self::Subscribe(_) => "subscribe",
            Self::NotFound(_) => "not_found",
        }
    }
}
