use std::error::Error;
use std::fmt;
use std::fmt::Formatter;
use std::io;

use diesel::result::ConnectionError;
use diesel::result::Error as DatabaseError;
use diesel_migrations::{MigrationError, RunMigrationsError};

#[derive(Debug)]
pub enum StoreError {
    Connection(ConnectionError),
    Database(DatabaseError),
    Migration(RunMigrationsError),
    Io(io::Error),
    /// A forward migration without a down.sql counterpart. Rollback is a hard
    /// requirement, so this is a configuration error, not a warning.
    MissingDownScript(String),
    /// The applied migrations are not a prefix of the known migration chain.
    BrokenHistory(String),
    DuplicateSubscription { user_id: String, subreddit: String },
    UnknownUser(String),
    InvalidCommandData(serde_json::Error),
    InvalidCommandStep(String),
}

impl From<ConnectionError> for StoreError {
    fn from(error: ConnectionError) -> Self {
        StoreError::Connection(error)
    }
}

impl From<DatabaseError> for StoreError {
    fn from(error: DatabaseError) -> Self {
        StoreError::Database(error)
    }
}

impl From<RunMigrationsError> for StoreError {
    fn from(error: RunMigrationsError) -> Self {
        StoreError::Migration(error)
    }
}

impl From<MigrationError> for StoreError {
    fn from(error: MigrationError) -> Self {
        StoreError::Migration(RunMigrationsError::MigrationError(error))
    }
}

impl From<io::Error> for StoreError {
    fn from(error: io::Error) -> Self {
        StoreError::Io(error)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(error: serde_json::Error) -> Self {
        StoreError::InvalidCommandData(error)
    }
}

impl Error for StoreError {}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            StoreError::Connection(err) => err.fmt(f),
            StoreError::Database(err) => err.fmt(f),
            StoreError::Migration(err) => err.fmt(f),
            StoreError::Io(err) => err.fmt(f),
            StoreError::MissingDownScript(name) => {
                write!(f, "migration {} has no down.sql", name)
            }
            StoreError::BrokenHistory(detail) => {
                write!(f, "migration history is not linear: {}", detail)
            }
            StoreError::DuplicateSubscription { user_id, subreddit } => {
                write!(f, "user {} is already subscribed to {}", user_id, subreddit)
            }
            StoreError::UnknownUser(user_id) => write!(f, "user {} does not exist", user_id),
            StoreError::InvalidCommandData(err) => {
                write!(f, "command data is not valid JSON: {}", err)
            }
            StoreError::InvalidCommandStep(step) => write!(f, "unknown command step: {}", step),
        }
    }
}
