/// Failures surfaced by the ledger, the event store and the progress engine.
///
/// `NotFound` is used for both "does not exist" and "exists but belongs to
/// another user"; callers cannot tell the two apart.
#[derive(Debug, thiserror::Error)]
pub enum LedgerError {
    #[error("{0}")]
    Unauthenticated(String),
    #[error("{0}")]
    NotFound(String),
    #[error("{0}")]
    InvalidArgument(String),
    #[error("{0}")]
    Conflict(String),
    #[error("store unavailable: {0}")]
    Store(#[from] rusqlite::Error),
    #[error("credential processing failed: {0}")]
    Credential(String),
}

impl LedgerError {
    pub(crate) fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    pub(crate) fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }
}

pub type Result<T, E = LedgerError> = std::result::Result<T, E>;
