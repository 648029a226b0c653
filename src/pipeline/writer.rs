use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::Connection;
use sqlx::postgres::{PgArguments, Postgres};
use sqlx::query::Query;
use tracing::{debug, info};

use super::sink::TableSink;
use crate::config::MAX_BIND_PARAMS;
use crate::db::pool::PoolConnection;
use crate::db::schema::{SchemaInferrer, TableSchema, quote_ident};
use crate::db::Pool;
use crate::formats::{Batch, Value};

/// Placeholder syntax of the connected driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placeholder {
    /// `$1, $2, ...` (PostgreSQL)
    Numbered,
    /// `?, ?, ...` (SQLite)
    Positional,
}

/// Writes batches into a database table through the connection pool
pub struct DatabaseWriter {
    pool: Pool,
}

impl DatabaseWriter {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    fn placeholder(&self) -> Placeholder {
        if self.pool.is_postgres() {
            Placeholder::Numbered
        } else {
            Placeholder::Positional
        }
    }

    /// Rows per INSERT statement so that bound parameters stay under the driver limit
    fn rows_per_statement(column_count: usize) -> usize {
        (MAX_BIND_PARAMS / column_count.max(1)).max(1)
    }

    /// Build `INSERT INTO "t" ("a", "b") VALUES ($1, $2), ($3, $4), ...`
    fn build_insert_sql(
        table: &str,
        schema: &TableSchema,
        row_count: usize,
        placeholder: Placeholder,
    ) -> String {
        let column_count = schema.columns.len();
        let column_list: Vec<String> = schema
            .column_names()
            .into_iter()
            .map(quote_ident)
            .collect();

        let mut value_groups = Vec::with_capacity(row_count);
        let mut param_idx = 1;
        for _ in 0..row_count {
            let placeholders: Vec<String> = (0..column_count)
                .map(|_| {
                    let p = match placeholder {
                        Placeholder::Numbered => format!("${}", param_idx),
                        Placeholder::Positional => "?".to_string(),
                    };
                    param_idx += 1;
                    p
                })
                .collect();
            value_groups.push(format!("({})", placeholders.join(", ")));
        }

        format!(
            "INSERT INTO {} ({}) VALUES {}",
            quote_ident(table),
            column_list.join(", "),
            value_groups.join(", ")
        )
    }

    /// Bind a value with its native Postgres type
    fn bind_pg<'q>(
        query: Query<'q, Postgres, PgArguments>,
        value: &Value,
    ) -> Query<'q, Postgres, PgArguments> {
        match value {
            Value::Bool(v) => query.bind(*v),
            Value::Int(v) => query.bind(*v),
            Value::Float(v) => query.bind(*v),
            Value::Text(v) => query.bind(v.clone()),
            Value::Timestamp(v) => query.bind(*v),
        }
    }

    /// Bind a value with its native SQLite type
    #[cfg(test)]
    fn bind_sqlite<'q>(
        query: Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
        value: &Value,
    ) -> Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
        match value {
            Value::Bool(v) => query.bind(*v),
            Value::Int(v) => query.bind(*v),
            Value::Float(v) => query.bind(*v),
            Value::Text(v) => query.bind(v.clone()),
            Value::Timestamp(v) => query.bind(*v),
        }
    }
}

#[async_trait]
impl TableSink for DatabaseWriter {
    async fn replace_table(&self, table: &str, schema: &TableSchema) -> Result<()> {
        let statements = SchemaInferrer::generate_replace_ddl(table, schema)?;
        debug!(ddl = %statements[1], "replacing table");

        self.pool
            .execute_in_transaction(&statements)
            .await
            .with_context(|| format!("Failed to create table '{}'", table))?;

        info!(
            table,
            columns = schema.columns.len(),
            "table dropped and recreated"
        );
        Ok(())
    }

    async fn append_batch(&self, table: &str, batch: &Batch) -> Result<u64> {
        if batch.is_empty() {
            return Ok(0);
        }

        let schema = batch.schema.as_ref();
        let rows_per_statement = Self::rows_per_statement(schema.columns.len());
        let placeholder = self.placeholder();

        let conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire database connection")?;

        // One transaction per batch: a batch lands whole or not at all
        match conn {
            PoolConnection::Postgres(mut conn) => {
                let mut tx = Connection::begin(&mut *conn).await?;
                for rows in batch.rows.chunks(rows_per_statement) {
                    let sql = Self::build_insert_sql(table, schema, rows.len(), placeholder);
                    let mut query = sqlx::query(&sql);
                    for value in rows.iter().flatten() {
                        query = Self::bind_pg(query, value);
                    }
                    query
                        .execute(&mut *tx)
                        .await
                        .with_context(|| format!("Failed to insert into '{}'", table))?;
                }
                tx.commit().await?;
            }
            #[cfg(test)]
            PoolConnection::Sqlite(mut conn) => {
                let mut tx = Connection::begin(&mut *conn).await?;
                for rows in batch.rows.chunks(rows_per_statement) {
                    let sql = Self::build_insert_sql(table, schema, rows.len(), placeholder);
                    let mut query = sqlx::query(&sql);
                    for value in rows.iter().flatten() {
                        query = Self::bind_sqlite(query, value);
                    }
                    query
                        .execute(&mut *tx)
                        .await
                        .with_context(|| format!("Failed to insert into '{}'", table))?;
                }
                tx.commit().await?;
            }
        }

        debug!(table, batch = batch.index, rows = batch.len(), "batch appended");
        Ok(batch.len() as u64)
    }
}
