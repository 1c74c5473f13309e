/// Boxed error returned by cleanup callbacks.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Errors from reference management.
#[derive(Debug, thiserror::Error)]
pub enum RefError {
    /// The view or reference count has already been closed.
    #[error("closed")]
    Closed,

    /// An exclusive close was attempted while other references remain.
    #[error("{name}: still referenced, {pending} pending")]
    StillReferenced { name: String, pending: usize },

    /// The cleanup run at the last release failed.
    #[error("{name}: cleanup failed: {source}")]
    Cleanup {
        name: String,
        #[source]
        source: BoxError,
    },
}

impl RefError {
    /// Returns `true` for the use-after-close sentinel.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }
}

/// Result alias for reference management operations.
pub type RefResult<T> = Result<T, RefError>;
