use leadbox_core::BackendError;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("corrupt row in {table}.{column}: {detail}")]
    CorruptRow {
        table: &'static str,
        column: &'static str,
        detail: String,
    },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(String),
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        StoreError::Database(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

impl StoreError {
    /// Fold into the backend error taxonomy, tagging reads vs writes.
    pub fn into_query_error(self) -> BackendError {
        match self {
            StoreError::NotFound(what) => BackendError::NotFound(what),
            other => BackendError::Query(other.to_string()),
        }
    }

    pub fn into_mutation_error(self) -> BackendError {
        match self {
            StoreError::NotFound(what) => BackendError::NotFound(what),
            other => BackendError::Mutation(other.to_string()),
        }
    }
}
