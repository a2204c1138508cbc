use std::io;
use std::time::Duration;

use thiserror::Error;

/// An error produced by an [`ExternalLoader`](super::ExternalLoader).
///
/// The same error value is handed to every caller that was waiting on the failed load, which
/// is why it is [`Clone`] and only carries stringified details. Errors are never cached.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LoadError {
    /// The source for the requested key does not exist.
    #[error("not found")]
    NotFound,
    /// The source exists, but could not be transformed.
    ///
    /// The attached string contains the details reported by the transformation.
    #[error("malformed: {0}")]
    Malformed(String),
    /// The transformation did not finish in time.
    #[error("instrumentation timed out after {0:?}")]
    Timeout(Duration),
    /// Loading failed for another reason, like an I/O error.
    #[error("load failed: {0}")]
    Failed(String),
    /// The load was aborted before it could produce a result, for example because the
    /// loader panicked.
    #[error("load canceled")]
    Canceled,
    /// An unexpected error in the instrumentor itself.
    #[error("internal error")]
    InternalError,
}

impl From<io::Error> for LoadError {
    #[track_caller]
    fn from(err: io::Error) -> Self {
        match err.kind() {
            io::ErrorKind::NotFound => Self::NotFound,
            _ => Self::from_std_error(err),
        }
    }
}

impl LoadError {
    /// Converts an arbitrary error into [`LoadError::Failed`], logging it along the way.
    #[track_caller]
    pub(crate) fn from_std_error<E: std::error::Error + 'static>(e: E) -> Self {
        let dynerr: &dyn std::error::Error = &e; // tracing expects a `&dyn Error`
        tracing::error!(error = dynerr, "load failed");
        Self::Failed(e.to_string())
    }

    /// A short, stable name of the error kind, suitable as a metrics tag.
    pub fn as_tag(&self) -> &'static str {
        match self {
            Self::NotFound => "notfound",
            Self::Malformed(_) => "malformed",
            Self::Timeout(_) => "timeout",
            Self::Failed(_) => "failed",
            Self::Canceled => "canceled",
            Self::InternalError => "internal",
        }
    }
}

/// The result of loading a single key.
pub type LoadResult<T> = Result<T, LoadError>;
