use thiserror::Error;

use crate::config::ConfigError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("could not connect to {target}: {message}")]
    Connection { target: String, message: String },

    #[error("introspection query failed: {message}\n  query: {sql}")]
    Introspection { sql: String, message: String },

    #[error("statement rejected by the database: {message}\n  statement: {sql}")]
    Mutation { sql: String, message: String },
}

impl Error {
    /// The database's own message, as reported by the server.
    pub fn message(&self) -> String {
        match self {
            Error::Config(e) => e.to_string(),
            Error::Connection { message, .. }
            | Error::Introspection { message, .. }
            | Error::Mutation { message, .. } => message.clone(),
        }
    }
}

/// Extract the server message from a driver error.
///
/// Server-side errors keep their text verbatim; anything else (I/O, TLS,
/// protocol) falls back to the driver's description.
pub(crate) fn db_message(err: &sqlx::Error) -> String {
    match err {
        sqlx::Error::Database(db) => db.message().to_string(),
        other => other.to_string(),
    }
}
