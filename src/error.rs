//! Error handling module
//!
//! Provides the error taxonomy shared by collection, diffing and reporting.

use crate::compare::Side;
use crate::dimension::Dimension;
use thiserror::Error;
use tokio_postgres::error::SqlState;

/// Application-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    /// The session is unusable (unreachable host, auth failure, dropped socket)
    #[error("Connection error: {0}")]
    Connection(String),

    /// The catalog query itself failed (e.g. permission denied on a system view)
    #[error("Query error: {0}")]
    Query(String),

    #[error("Unsupported dimension: {0}")]
    UnsupportedDimension(String),

    #[error("Dimension mismatch: expected {expected}, got source {source_dimension} and target {target_dimension}")]
    DimensionMismatch {
        expected: Dimension,
        source_dimension: Dimension,
        target_dimension: Dimension,
    },

    #[error("Malformed snapshot: {0}")]
    MalformedSnapshot(String),

    #[error("Configuration error: {0}")]
    Config(String),

    /// A collection failure attributed to one side of the comparison
    #[error("{side} database failed while collecting {dimension}: {error}")]
    Collect {
        side: Side,
        dimension: Dimension,
        error: Box<AppError>,
    },
}

impl AppError {
    /// Attribute this error to one side of the comparison
    pub fn on_side(self, side: Side, dimension: Dimension) -> Self {
        AppError::Collect {
            side,
            dimension,
            error: Box::new(self),
        }
    }

    /// Short machine-readable code, used by the JSON reporter
    pub fn code(&self) -> &'static str {
        match self {
            AppError::Connection(_) => "CONNECTION_ERROR",
            AppError::Query(_) => "QUERY_ERROR",
            AppError::UnsupportedDimension(_) => "UNSUPPORTED_DIMENSION",
            AppError::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            AppError::MalformedSnapshot(_) => "MALFORMED_SNAPSHOT",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Collect { error, .. } => error.code(),
        }
    }
}

/// SQLSTATEs meaning the session itself is unusable rather than the
/// statement: connection exceptions (08), authorization (28), unknown
/// database (3D), operator intervention (57P) and connection limits.
pub fn is_session_state(state: &SqlState) -> bool {
    let code = state.code();
    ["08", "28", "3D", "57P"].iter().any(|class| code.starts_with(class))
        || *state == SqlState::TOO_MANY_CONNECTIONS
}

fn describe(e: &tokio_postgres::Error) -> String {
    match e.as_db_error() {
        Some(db) => format!("{} ({})", db.message(), db.code().code()),
        None => e.to_string(),
    }
}

impl From<tokio_postgres::Error> for AppError {
    fn from(e: tokio_postgres::Error) -> Self {
        match e.code() {
            Some(state) if !is_session_state(state) => AppError::Query(describe(&e)),
            _ => AppError::Connection(describe(&e)),
        }
    }
}

impl From<deadpool_postgres::PoolError> for AppError {
    fn from(e: deadpool_postgres::PoolError) -> Self {
        // Backend errors only surface while a new session is being opened
        match e {
            deadpool_postgres::PoolError::Backend(pg) => AppError::Connection(describe(&pg)),
            other => AppError::Connection(other.to_string()),
        }
    }
}

/// Result type alias used across the crate
pub type AppResult<T> = Result<T, AppError>;

/// Helper function to create a malformed snapshot error
pub fn malformed(msg: impl Into<String>) -> AppError {
    AppError::MalformedSnapshot(msg.into())
}
