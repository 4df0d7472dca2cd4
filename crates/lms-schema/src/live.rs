//! Live MySQL session.
//!
//! Wraps a single sqlx connection and logs every statement via tracing.

use sqlx::mysql::{MySqlConnection, MySqlRow};
use sqlx::{Connection, Row};
use tracing::{Instrument, debug};

use crate::error::db_message;
use crate::{Check, Config, Ddl, Error, Result, SchemaSession, VirtualSchema};

const TABLES_SQL: &str = "SELECT CAST(TABLE_NAME AS CHAR) FROM information_schema.TABLES \
     WHERE TABLE_SCHEMA = ? ORDER BY TABLE_NAME";

const COLUMNS_SQL: &str =
    "SELECT CAST(TABLE_NAME AS CHAR), CAST(COLUMN_NAME AS CHAR) FROM information_schema.COLUMNS \
     WHERE TABLE_SCHEMA = ? ORDER BY TABLE_NAME, ORDINAL_POSITION";

const CONSTRAINTS_SQL: &str = "SELECT CAST(TABLE_NAME AS CHAR), CAST(CONSTRAINT_NAME AS CHAR) \
     FROM information_schema.TABLE_CONSTRAINTS WHERE TABLE_SCHEMA = ? ORDER BY TABLE_NAME";

/// Execute a query, returning all rows.
async fn query(
    conn: &mut MySqlConnection,
    sql: &str,
    params: &[&str],
) -> std::result::Result<Vec<MySqlRow>, sqlx::Error> {
    let span = tracing::debug_span!(
        "db.query",
        sql = %sql,
        params = params.len(),
        rows = tracing::field::Empty,
    );
    let mut query = sqlx::query(sql);
    for param in params {
        query = query.bind(*param);
    }
    let rows = query.fetch_all(&mut *conn).instrument(span.clone()).await?;
    span.record("rows", rows.len());
    Ok(rows)
}

/// Execute a statement without preparing it, returning the number of rows affected.
async fn execute(conn: &mut MySqlConnection, sql: &str) -> std::result::Result<u64, sqlx::Error> {
    let span = tracing::debug_span!(
        "db.execute",
        sql = %sql,
        affected = tracing::field::Empty,
    );
    let result = sqlx::Executor::execute(&mut *conn, sqlx::raw_sql(sql))
        .instrument(span.clone())
        .await?;
    span.record("affected", result.rows_affected());
    Ok(result.rows_affected())
}

/// Decode the first `N` columns of each row as strings.
fn decode<const N: usize>(rows: &[MySqlRow]) -> std::result::Result<Vec<[String; N]>, sqlx::Error> {
    rows.iter()
        .map(|row| -> std::result::Result<[String; N], sqlx::Error> {
            let mut out: [String; N] = std::array::from_fn(|_| String::new());
            for (i, slot) in out.iter_mut().enumerate() {
                *slot = row.try_get(i)?;
            }
            Ok(out)
        })
        .collect()
}

fn introspection(sql: &str) -> impl FnOnce(sqlx::Error) -> Error + '_ {
    move |e| Error::Introspection {
        sql: sql.to_string(),
        message: db_message(&e),
    }
}

/// A session on one live connection, scoped to the configured database.
pub struct MySqlSession {
    conn: Option<MySqlConnection>,
    database: String,
    target: String,
}

impl MySqlSession {
    /// Open a connection to the configured database.
    pub async fn connect(config: &Config) -> Result<Self> {
        let target = config.redacted_url();
        let span = tracing::debug_span!("db.connect", target = %target);
        let conn = MySqlConnection::connect_with(&config.connect_options())
            .instrument(span)
            .await
            .map_err(|e| Error::Connection {
                target: target.clone(),
                message: db_message(&e),
            })?;
        debug!(target = %target, "connected");

        Ok(Self {
            conn: Some(conn),
            database: config.database.clone(),
            target,
        })
    }

    fn conn(&mut self) -> Result<&mut MySqlConnection> {
        self.conn.as_mut().ok_or_else(|| Error::Connection {
            target: self.target.clone(),
            message: "connection already released".to_string(),
        })
    }

    /// Snapshot every table, column and constraint of the database.
    pub async fn capture(&mut self) -> Result<VirtualSchema> {
        let database = self.database.clone();
        let conn = self.conn()?;
        let params = [database.as_str()];

        let mut schema = VirtualSchema::new(&database);

        let rows = query(conn, TABLES_SQL, &params)
            .await
            .map_err(introspection(TABLES_SQL))?;
        for [table] in decode::<1>(&rows).map_err(introspection(TABLES_SQL))? {
            schema.insert_table(&table);
        }

        let rows = query(conn, COLUMNS_SQL, &params)
            .await
            .map_err(introspection(COLUMNS_SQL))?;
        for [table, column] in decode::<2>(&rows).map_err(introspection(COLUMNS_SQL))? {
            schema.insert_column(&table, &column);
        }

        let rows = query(conn, CONSTRAINTS_SQL, &params)
            .await
            .map_err(introspection(CONSTRAINTS_SQL))?;
        for [table, name] in decode::<2>(&rows).map_err(introspection(CONSTRAINTS_SQL))? {
            schema = schema.with_constraint(&table, &name);
        }

        debug!(database = %database, "captured schema");
        Ok(schema)
    }
}

impl SchemaSession for MySqlSession {
    async fn lookup(&mut self, check: &Check) -> Result<usize> {
        let database = self.database.clone();
        let mut params = vec![database.as_str()];
        params.extend(check.params());

        let rows = query(self.conn()?, check.sql(), &params)
            .await
            .map_err(introspection(check.sql()))?;
        Ok(rows.len())
    }

    async fn apply(&mut self, ddl: &Ddl) -> Result<()> {
        let sql = ddl.to_sql();
        execute(self.conn()?, &sql)
            .await
            .map_err(|e| Error::Mutation {
                sql: sql.clone(),
                message: db_message(&e),
            })?;
        Ok(())
    }

    async fn release(&mut self) -> Result<()> {
        if let Some(conn) = self.conn.take() {
            conn.close().await.map_err(|e| Error::Connection {
                target: self.target.clone(),
                message: db_message(&e),
            })?;
            debug!(target = %self.target, "connection released");
        }
        Ok(())
    }
}
