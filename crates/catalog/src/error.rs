use derive_more::{Display, Error};

pub type Error = exn::Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The query or connection failed; usually transient.
    #[display("catalog database failed")]
    Database,
    #[display("catalog schema could not be migrated")]
    Migration,
    #[display("backup {_0} is already in the catalog")]
    Duplicate(#[error(not(source))] String),
    /// A stored column could not be encoded or decoded; names the column.
    #[display("catalog holds an unreadable {_0}")]
    InvalidData(#[error(not(source))] &'static str),
}

impl ErrorKind {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Database)
    }
}
