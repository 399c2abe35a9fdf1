//! PostgreSQL session implementation.
//!
//! Provides the `PostgresSession` struct that implements the `Session` trait
//! for PostgreSQL using one sqlx connection.

use super::chain::{
    buffered_rows, closed_connection, not_a_query, AffectedRows, DecodeCell, SqlxResultChain,
    UNBOUNDED_DISPLAY_SIZE,
};
use super::{BufferedRows, DriverResult, DriverValue, ResultChain, Session, Value};
use async_trait::async_trait;
use chrono::{DateTime, NaiveTime, Utc};
use sqlx::postgres::{PgConnection, PgQueryResult, PgRow};
use sqlx::{Column, Connection, Executor, Postgres, Row, Statement, TypeInfo, ValueRef};
use tracing::{debug, warn};

/// PostgreSQL session over a single connection.
pub struct PostgresSession {
    conn: Option<PgConnection>,
}

impl PostgresSession {
    /// Connects to the server described by `target`.
    pub async fn connect(target: &str) -> DriverResult<Self> {
        let conn = PgConnection::connect(target).await?;
        debug!("Connected to PostgreSQL");
        Ok(Self { conn: Some(conn) })
    }

    fn connection(&mut self) -> DriverResult<&mut PgConnection> {
        self.conn.as_mut().ok_or_else(closed_connection)
    }
}

#[async_trait]
impl Session for PostgresSession {
    async fn execute<'s>(&'s mut self, sql: &'s str) -> DriverResult<Box<dyn ResultChain + 's>> {
        let conn = self.connection()?;

        // The server only describes single statements; a zero-row SELECT
        // inside a longer text still reads as an update count of 0.
        let described = match (&mut *conn).prepare(sql).await {
            Ok(statement) => statement.columns().to_vec(),
            Err(e) => {
                debug!("Statement not described up front: {}", e);
                Vec::new()
            }
        };

        let mut chain = SqlxResultChain::<Postgres>::new(sqlx::raw_sql(sql).fetch_many(conn))
            .with_described(described);
        chain.advance().await?;
        Ok(Box::new(chain))
    }

    async fn query(&mut self, sql: &str) -> DriverResult<BufferedRows> {
        let conn = self.connection()?;

        // Preparing fails for multiple statements before any of them runs.
        let columns = (&mut *conn).prepare(sql).await?.columns().to_vec();
        if columns.is_empty() {
            return Err(not_a_query());
        }

        // The simple protocol keeps every cell in text form, same as the
        // streaming path.
        let rows = (&mut *conn).fetch_all(sqlx::raw_sql(sql)).await?;
        buffered_rows::<Postgres>(columns, rows)
    }

    async fn close(&mut self) -> DriverResult<()> {
        match self.conn.take() {
            Some(conn) => conn.close().await,
            None => {
                warn!("PostgreSQL session closed twice");
                Ok(())
            }
        }
    }
}

impl AffectedRows for PgQueryResult {
    fn affected_rows(&self) -> u64 {
        self.rows_affected()
    }
}

impl DecodeCell for PgRow {
    fn decode_cell(&self, index: usize) -> DriverResult<DriverValue> {
        if self.try_get_raw(index)?.is_null() {
            return Ok(DriverValue::null());
        }

        let type_name = self.try_column(index)?.type_info().name().to_uppercase();

        let value = match type_name.as_str() {
            "BOOL" => Value::Bool(self.try_get(index)?),
            "INT2" => Value::Int(i32::from(self.try_get::<i16, _>(index)?)),
            "INT4" => Value::Int(self.try_get(index)?),
            "INT8" => Value::Long(self.try_get(index)?),
            "FLOAT4" => Value::Float(f64::from(self.try_get::<f32, _>(index)?)),
            "FLOAT8" => Value::Float(self.try_get(index)?),
            "NUMERIC" => Value::Decimal(self.try_get_unchecked(index)?),
            "BYTEA" => Value::Bytes(self.try_get(index)?),
            "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" | "CHAR" => {
                Value::String(self.try_get_unchecked(index)?)
            }
            "DATE" => return Ok(DriverValue::Date(self.try_get(index)?)),
            "TIME" => return Ok(DriverValue::Time(self.try_get(index)?)),
            "TIMETZ" => {
                let text: String = self.try_get_unchecked(index)?;
                return Ok(match parse_time_tz(&text) {
                    Some(time) => DriverValue::Time(time),
                    None => Value::Native(text).into(),
                });
            }
            "TIMESTAMP" => return Ok(DriverValue::Timestamp(self.try_get(index)?)),
            "TIMESTAMPTZ" => {
                return Ok(DriverValue::TimestampTz(
                    self.try_get::<DateTime<Utc>, _>(index)?,
                ))
            }
            // JSON, UUID, arrays, enums, intervals...
            _ => Value::Native(self.try_get_unchecked(index)?),
        };

        Ok(DriverValue::Plain(value))
    }

    fn display_size(type_name: &str) -> u32 {
        match type_name.to_uppercase().as_str() {
            "BOOL" => 1,
            "CHAR" => 1,
            "INT2" => 6,
            "INT4" => 11,
            "INT8" => 20,
            "OID" => 10,
            "FLOAT4" => 15,
            "FLOAT8" => 25,
            "NUMERIC" => 131_089,
            "DATE" => 10,
            "TIME" => 15,
            "TIMETZ" => 21,
            "TIMESTAMP" => 29,
            "TIMESTAMPTZ" => 35,
            "UUID" => 36,
            "NAME" => 63,
            _ => UNBOUNDED_DISPLAY_SIZE,
        }
    }
}

/// Parses a `TIMETZ` text value such as `10:30:00.5+02`, dropping the offset.
fn parse_time_tz(text: &str) -> Option<NaiveTime> {
    let split = text.rfind(|c| c == '+' || c == '-')?;
    NaiveTime::parse_from_str(&text[..split], "%H:%M:%S%.f").ok()
}
