//! Connectivity probe: connect to the server, make sure the database exists,
//! disconnect.

use sqlx::mysql::MySqlConnection;
use sqlx::{Connection, Row};
use tracing::{Instrument, debug, info};

use crate::ddl::quote_ident;
use crate::error::db_message;
use crate::{Config, Error, Result};

/// What a successful probe learned about the server.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeReport {
    pub server_version: String,
    pub database: String,
}

/// SQL that creates the configured database when missing.
pub fn create_database_sql(config: &Config) -> String {
    format!(
        "CREATE DATABASE IF NOT EXISTS {} CHARACTER SET {}",
        quote_ident(&config.database),
        config.charset
    )
}

/// Connect without selecting a database, create the configured database if
/// missing, then disconnect.
pub async fn probe(config: &Config) -> Result<ProbeReport> {
    let target = config.redacted_url();
    let connection_error = |e: sqlx::Error| Error::Connection {
        target: target.clone(),
        message: db_message(&e),
    };

    let mut conn = MySqlConnection::connect_with(&config.server_options())
        .instrument(tracing::debug_span!("db.connect", target = %target))
        .await
        .map_err(connection_error)?;
    info!(host = %config.host, port = config.port, "connected to server");

    let result = probe_on(&mut conn, config).await;

    // Close even when the probe failed part way.
    if let Err(e) = conn.close().await {
        debug!(error = %e, "error while closing probe connection");
    }
    result
}

async fn probe_on(conn: &mut MySqlConnection, config: &Config) -> Result<ProbeReport> {
    const VERSION_SQL: &str = "SELECT VERSION()";
    let row = sqlx::query(VERSION_SQL)
        .fetch_one(&mut *conn)
        .await
        .map_err(|e| Error::Introspection {
            sql: VERSION_SQL.to_string(),
            message: db_message(&e),
        })?;
    let server_version: String = row.try_get(0).map_err(|e| Error::Introspection {
        sql: VERSION_SQL.to_string(),
        message: db_message(&e),
    })?;

    let sql = create_database_sql(config);
    sqlx::raw_sql(&sql)
        .execute(&mut *conn)
        .instrument(tracing::debug_span!("db.execute", sql = %sql))
        .await
        .map_err(|e| Error::Mutation {
            sql: sql.clone(),
            message: db_message(&e),
        })?;
    info!(database = %config.database, "database is present");

    Ok(ProbeReport {
        server_version,
        database: config.database.clone(),
    })
}

/// Guidance printed when the probe fails.
pub fn troubleshooting_hints(err: &Error, config: &Config) -> Vec<String> {
    match err {
        Error::Connection { .. } => vec![
            format!(
                "Is a MySQL server running and reachable at {}:{}?",
                config.host, config.port
            ),
            format!(
                "Check the credentials for user '{}' (DB_USER / DB_PASSWORD).",
                config.user
            ),
            "Override the target with DB_HOST and DB_PORT, or put them in a .env file.".to_string(),
        ],
        Error::Mutation { .. } => vec![format!(
            "User '{}' may lack the CREATE privilege; create '{}' manually or grant it.",
            config.user, config.database
        )],
        Error::Introspection { .. } | Error::Config(_) => Vec::new(),
    }
}
