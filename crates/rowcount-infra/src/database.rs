//! Row count source backed by PostgreSQL

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use std::str::FromStr;
use tracing::{debug, info};

use rowcount_core::TableName;

use crate::{InfraError, Result};

/// Something that can count the rows of the monitored table
#[async_trait]
pub trait RowSource: Send + Sync {
    /// Run one count; errors are reported per cycle and never fatal
    async fn count_rows(&self) -> Result<i64>;

    /// Short human-readable description for logs
    fn describe(&self) -> String;
}

/// Build the count query for a validated table name
pub fn count_query(table: &TableName) -> String {
    format!("SELECT count(*) FROM {}", table)
}

/// Parse a DSN in URL form (`postgres://user@host/db`) or keyword/value
/// form (`host=localhost port=5432 dbname=app sslmode=disable`).
///
/// Keyword values may be single-quoted; `\\` escapes the next character.
/// Unknown keywords are rejected.
pub fn parse_dsn(dsn: &str) -> Result<PgConnectOptions> {
    if dsn.contains("://") {
        return Ok(PgConnectOptions::from_str(dsn)?);
    }

    let mut options = PgConnectOptions::new();
    for (key, value) in keyword_pairs(dsn)? {
        options = match key.as_str() {
            "host" => options.host(&value),
            "port" => {
                let port = value
                    .parse::<u16>()
                    .map_err(|_| malformed(format!("invalid port {:?}", value)))?;
                options.port(port)
            }
            "user" => options.username(&value),
            "password" => options.password(&value),
            "dbname" => options.database(&value),
            "sslmode" => options.ssl_mode(value.parse::<PgSslMode>()?),
            "application_name" => options.application_name(&value),
            other => return Err(malformed(format!("unsupported keyword {:?}", other))),
        };
    }

    Ok(options)
}

fn malformed(reason: String) -> InfraError {
    InfraError::Configuration(format!("malformed DSN: {}", reason))
}

fn keyword_pairs(dsn: &str) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    let mut chars = dsn.chars().peekable();

    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            break;
        }

        let mut key = String::new();
        while let Some(c) = chars.next_if(|c| *c != '=' && !c.is_whitespace()) {
            key.push(c);
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if key.is_empty() || chars.next() != Some('=') {
            return Err(malformed(format!("expected key=value near {:?}", key)));
        }
        while chars.next_if(|c| c.is_whitespace()).is_some() {}

        let mut value = String::new();
        if chars.next_if_eq(&'\'').is_some() {
            loop {
                match chars.next() {
                    Some('\'') => break,
                    Some('\\') => match chars.next() {
                        Some(c) => value.push(c),
                        None => return Err(malformed("unterminated quoted value".into())),
                    },
                    Some(c) => value.push(c),
                    None => return Err(malformed("unterminated quoted value".into())),
                }
            }
        } else {
            while let Some(c) = chars.next_if(|c| !c.is_whitespace()) {
                if c == '\\' {
                    if let Some(escaped) = chars.next() {
                        value.push(escaped);
                    }
                } else {
                    value.push(c);
                }
            }
        }

        pairs.push((key, value));
    }

    Ok(pairs)
}

/// Single long-lived PostgreSQL handle reused every cycle
#[derive(Clone)]
pub struct PgRowSource {
    pool: PgPool,
    table: TableName,
    query: String,
}

impl std::fmt::Debug for PgRowSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PgRowSource")
            .field("table", &self.table)
            .field("query", &self.query)
            .finish()
    }
}

impl PgRowSource {
    /// Parse the DSN and prepare a one-connection pool without connecting.
    ///
    /// A malformed DSN fails here; an unreachable server only fails
    /// individual cycles. Must be called inside a tokio runtime.
    pub fn connect_lazy(dsn: &str, table: TableName) -> Result<Self> {
        let options = parse_dsn(dsn)?;

        info!(
            host = options.get_host(),
            port = options.get_port(),
            table = %table,
            "Prepared PostgreSQL connection"
        );

        let pool = PgPoolOptions::new()
            .max_connections(1)
            .connect_lazy_with(options);
        let query = count_query(&table);

        Ok(Self { pool, table, query })
    }
}

#[async_trait]
impl RowSource for PgRowSource {
    async fn count_rows(&self) -> Result<i64> {
        debug!(query = %self.query, "Counting rows");
        let count = sqlx::query_scalar::<_, i64>(&self.query)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    fn describe(&self) -> String {
        format!("postgres table {}", self.table)
    }
}
