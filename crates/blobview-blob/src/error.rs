use std::io;
use std::path::PathBuf;

use blobview_refmgmt::RefError;
use blobview_types::{Digest, TypeError};

/// Errors from blob access operations.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    /// The blob access (or the resource behind it) has been closed.
    #[error("blob access closed")]
    Closed,

    /// Reference management failure other than use-after-close.
    #[error(transparent)]
    Ref(RefError),

    /// I/O error from the backing store.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// I/O error on a specific file.
    #[error("file {path:?}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A file-backed blob's file does not exist.
    #[error("file not found: {0:?}")]
    NotFound(PathBuf),

    /// No blob with the given digest is available.
    #[error("blob not found: {0}")]
    BlobNotFound(Digest),

    /// Malformed digest or digest mismatch.
    #[error("digest error: {0}")]
    Digest(#[from] TypeError),

    /// The background transform of a blob stream failed.
    #[error("transform failed: {0}")]
    Transform(String),

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Several independent failures of one operation.
    #[error("{}", join_messages(.0))]
    Multiple(Vec<BlobError>),
}

impl BlobError {
    /// Returns `true` for the use-after-close sentinel, however it was
    /// produced.
    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed | Self::Ref(RefError::Closed))
    }

    pub(crate) fn file(path: impl Into<PathBuf>, source: io::Error) -> Self {
        let path = path.into();
        if source.kind() == io::ErrorKind::NotFound {
            Self::NotFound(path)
        } else {
            Self::File { path, source }
        }
    }

    /// Combine the outcomes of independent steps, keeping every failure.
    pub fn join<I>(results: I) -> BlobResult<()>
    where
        I: IntoIterator<Item = BlobResult<()>>,
    {
        let mut errors: Vec<BlobError> = results.into_iter().filter_map(Result::err).collect();
        match errors.len() {
            0 => Ok(()),
            1 => Err(errors.remove(0)),
            _ => Err(Self::Multiple(errors)),
        }
    }
}

impl From<RefError> for BlobError {
    fn from(err: RefError) -> Self {
        match err {
            RefError::Closed => Self::Closed,
            other => Self::Ref(other),
        }
    }
}

fn join_messages(errors: &[BlobError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Combine the outcome of an operation with the close of the stream it used.
pub(crate) fn and_close<T>(result: BlobResult<T>, closed: BlobResult<()>) -> BlobResult<T> {
    match (result, closed) {
        (Ok(value), Ok(())) => Ok(value),
        (Ok(_), Err(err)) | (Err(err), Ok(())) => Err(err),
        (Err(err), Err(close)) => Err(BlobError::Multiple(vec![err, close])),
    }
}

/// Result alias for blob operations.
pub type BlobResult<T> = Result<T, BlobError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closed_identity_survives_conversion() {
        let err: BlobError = RefError::Closed.into();
        assert!(matches!(err, BlobError::Closed));
        assert!(err.is_closed());
    }

    #[test]
    fn other_ref_errors_are_kept() {
        let err: BlobError = RefError::StillReferenced {
            name: "blob".into(),
            pending: 2,
        }
        .into();
        assert!(!err.is_closed());
        assert_eq!(err.to_string(), "blob: still referenced, 2 pending");
    }

    #[test]
    fn join_keeps_all_failures() {
        assert!(BlobError::join([Ok(()), Ok(())]).is_ok());

        let single = BlobError::join([Ok(()), Err(BlobError::Closed)]).unwrap_err();
        assert!(single.is_closed());

        let multi = BlobError::join([
            Err(BlobError::Transform("bad frame".into())),
            Err(BlobError::Config("level".into())),
        ])
        .unwrap_err();
        assert_eq!(
            multi.to_string(),
            "transform failed: bad frame; invalid configuration: level"
        );
    }

    #[test]
    fn close_failure_is_not_lost() {
        assert_eq!(and_close(Ok(1), Ok(())).unwrap(), 1);
        assert!(and_close(Ok(1), Err(BlobError::Closed)).unwrap_err().is_closed());
        let both = and_close::<()>(
            Err(BlobError::Transform("read".into())),
            Err(BlobError::Transform("close".into())),
        )
        .unwrap_err();
        assert!(matches!(both, BlobError::Multiple(ref v) if v.len() == 2));
    }

    #[test]
    fn missing_files_map_to_not_found() {
        let err = BlobError::file("/nope", io::Error::new(io::ErrorKind::NotFound, "gone"));
        assert!(matches!(err, BlobError::NotFound(_)));
        let err = BlobError::file("/nope", io::Error::new(io::ErrorKind::PermissionDenied, "no"));
        assert!(matches!(err, BlobError::File { .. }));
    }
}
