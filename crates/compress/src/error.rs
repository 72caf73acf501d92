use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error, Clone, PartialEq, Eq)]
pub enum ErrorKind {
    /// The encoder or decoder itself failed.
    #[display("compression codec failed")]
    Codec,
    /// The input is not a valid stream of the format it was decoded as.
    #[display("malformed compressed data")]
    Malformed,
    #[display("decompressed to {actual} bytes, expected {expected}")]
    SizeMismatch { expected: u64, actual: u64 },
    #[display("unknown compression format: {_0}")]
    Unknown(#[error(not(source))] String),
    /// Known, but this build was compiled without it.
    #[display("compression format not built in: {_0}")]
    NotBuilt(#[error(not(source))] String),
}
