use derive_more::{Display, Error};
use std::io::Error as IoError;
use std::path::PathBuf;

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("no backup file at {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    #[display("{} already exists", _0.display())]
    AlreadyExists(#[error(not(source))] PathBuf),
    #[display("access to {} denied", _0.display())]
    PermissionDenied(#[error(not(source))] PathBuf),
    /// Any other filesystem failure; usually worth retrying.
    #[display("storage I/O failed: {_0}")]
    Io(IoError),
    /// Escapes the storage root, names nothing, or uses a reserved name.
    #[display("not a usable storage path: {}", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    #[display("storage backend failed: {_0}")]
    BackendError(#[error(not(source))] String),
}

impl ErrorKind {
    pub(crate) fn from_io(err: IoError, path: impl Into<PathBuf>) -> Self {
        match err.kind() {
            std::io::ErrorKind::NotFound => Self::NotFound(path.into()),
            std::io::ErrorKind::AlreadyExists => Self::AlreadyExists(path.into()),
            std::io::ErrorKind::PermissionDenied => Self::PermissionDenied(path.into()),
            _ => Self::Io(err),
        }
    }

    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Io(_) | Self::BackendError(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::io::ErrorKind as IoKind;

    #[rstest]
    #[case(IoKind::NotFound, false)]
    #[case(IoKind::PermissionDenied, false)]
    #[case(IoKind::AlreadyExists, false)]
    #[case(IoKind::StorageFull, true)]
    #[case(IoKind::Interrupted, true)]
    fn test_io_errors_are_classified(#[case] kind: IoKind, #[case] retryable: bool) {
        let err = ErrorKind::from_io(IoError::from(kind), "2026/full.sbx");
        assert_eq!(err.is_retryable(), retryable);
    }

    #[test]
    fn test_not_found_keeps_path() {
        let err = ErrorKind::from_io(IoError::from(IoKind::NotFound), "2026/full.sbx");
        assert!(matches!(err, ErrorKind::NotFound(path) if path == PathBuf::from("2026/full.sbx")));
    }
}
