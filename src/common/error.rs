use std::fmt;

/// Error taxonomy surfaced by the storage/recovery core. Mirrors the
/// `dberr_t` kinds of the external interface plus the ambient I/O and
/// invariant-violation cases described in the error handling design.
#[derive(Debug)]
pub enum DbError {
    TableAlreadyExists(String),
    TableNotExist(String),
    IndexAlreadyExists(String),
    IndexNotFound(String),
    ColumnNameNotExist(String),
    /// Resource exhaustion: disk allocator or buffer pool has no capacity left.
    Exhausted(String),
    Io(std::io::Error),
    Generic(String),
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DbError::TableAlreadyExists(name) => write!(f, "table already exists: {name}"),
            DbError::TableNotExist(name) => write!(f, "table does not exist: {name}"),
            DbError::IndexAlreadyExists(name) => write!(f, "index already exists: {name}"),
            DbError::IndexNotFound(name) => write!(f, "index not found: {name}"),
            DbError::ColumnNameNotExist(name) => write!(f, "column does not exist: {name}"),
            DbError::Exhausted(what) => write!(f, "resource exhausted: {what}"),
            DbError::Io(e) => write!(f, "I/O error: {e}"),
            DbError::Generic(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for DbError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            DbError::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for DbError {
    fn from(e: std::io::Error) -> Self {
        DbError::Io(e)
    }
}

pub type DbResult<T> = Result<T, DbError>;
