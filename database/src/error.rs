use sqlx::migrate::MigrateError;
use std::fmt::{self, Formatter};

/// Errors that can occur while interacting with the credential store
#[derive(Debug)]
pub enum Error {
    /// A query failed to execute
    Query(sqlx::Error),
    /// The schema could not be migrated
    Migrate(MigrateError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Self::Query(_) => write!(f, "error while executing query"),
            Self::Migrate(_) => write!(f, "error while applying migrations"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Query(e) => Some(e),
            Self::Migrate(e) => Some(e),
        }
    }
}

impl From<sqlx::Error> for Error {
    fn from(error: sqlx::Error) -> Self {
        Self::Query(error)
    }
}

impl From<MigrateError> for Error {
    fn from(error: MigrateError) -> Self {
        Self::Migrate(error)
    }
}
