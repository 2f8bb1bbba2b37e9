//! Core error types for deepfocus-core.
//!
//! The engine surfaces three kinds of failures to its callers:
//! state-machine guard violations, unknown ids, and collaborator
//! persistence failures. Storage and configuration errors have their own
//! enums and convert into [`CoreError`].

use std::path::PathBuf;
use thiserror::Error;

use crate::session::SessionStatus;

/// Core error type for deepfocus-core.
#[derive(Error, Debug)]
pub enum CoreError {
    /// Operation is not valid for the current session state
    #[error("Invalid session state: cannot {operation} while {state}")]
    InvalidSessionState {
        operation: &'static str,
        state: SessionStatus,
    },

    /// Unknown task or session id
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A collaborator call failed
    #[error("Persistence failure during {operation}: {message}")]
    PersistenceFailure {
        operation: &'static str,
        message: String,
    },

    /// The session runtime task is gone
    #[error("Session runtime has stopped")]
    RuntimeStopped,

    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Validation errors
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl CoreError {
    pub fn invalid_state(operation: &'static str, state: SessionStatus) -> Self {
        CoreError::InvalidSessionState { operation, state }
    }

    pub fn task_not_found(id: impl Into<String>) -> Self {
        CoreError::NotFound {
            kind: "task",
            id: id.into(),
        }
    }

    pub fn session_not_found(id: impl Into<String>) -> Self {
        CoreError::NotFound {
            kind: "session",
            id: id.into(),
        }
    }

    /// Wrap any collaborator failure as a persistence failure for `operation`.
    pub fn persistence(operation: &'static str, err: impl std::fmt::Display) -> Self {
        CoreError::PersistenceFailure {
            operation,
            message: err.to_string(),
        }
    }

    /// True when the error is a state-machine guard violation.
    pub fn is_invalid_state(&self) -> bool {
        matches!(self, CoreError::InvalidSessionState { .. })
    }
}

/// Database-specific errors.
#[derive(Error, Debug)]
pub enum DatabaseError {
    /// Failed to open database connection
    #[error("Failed to open database at {path}: {source}")]
    OpenFailed {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Query execution failed
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Migration failed
    #[error("Database migration failed: {0}")]
    MigrationFailed(String),

    /// Stored row could not be decoded
    #[error("Corrupt row in {table}: {message}")]
    CorruptRow { table: &'static str, message: String },

    /// Database is locked
    #[error("Database is locked")]
    Locked,
}

/// Configuration-specific errors.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Config directory could not be resolved or created
    #[error("Cannot prepare config directory {path}: {message}")]
    DataDir { path: PathBuf, message: String },

    /// Failed to load configuration
    #[error("Failed to load configuration from {path}: {message}")]
    LoadFailed { path: PathBuf, message: String },

    /// Failed to save configuration
    #[error("Failed to save configuration to {path}: {message}")]
    SaveFailed { path: PathBuf, message: String },

    /// Unknown configuration key
    #[error("Unknown configuration key: {0}")]
    UnknownKey(String),

    /// Invalid configuration value
    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: String, message: String },
}

/// Validation errors.
#[derive(Error, Debug)]
pub enum ValidationError {
    /// Empty collection
    #[error("Empty collection: {0}")]
    EmptyCollection(String),

    /// Invalid value
    #[error("Invalid value for '{field}': {message}")]
    InvalidValue { field: String, message: String },
}

impl From<rusqlite::Error> for DatabaseError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(inner, _msg) => {
                if inner.code == rusqlite::ErrorCode::DatabaseLocked
                    || inner.code == rusqlite::ErrorCode::DatabaseBusy
                {
                    DatabaseError::Locked
                } else {
                    DatabaseError::QueryFailed(err.to_string())
                }
            }
            _ => DatabaseError::QueryFailed(err.to_string()),
        }
    }
}

impl From<rusqlite::Error> for CoreError {
    fn from(err: rusqlite::Error) -> Self {
        CoreError::Database(DatabaseError::from(err))
    }
}

/// Result type alias for CoreError
pub type Result<T, E = CoreError> = std::result::Result<T, E>;
