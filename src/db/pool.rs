//! Adapter between bb8 and the sqlx::Postgres driver.
use anyhow::{Context, Result, anyhow};
use derive_builder::Builder;
use sqlx::postgres::{PgConnectOptions, PgConnection};
use sqlx::{ConnectOptions, Connection};
use std::str::FromStr;
use tracing::info;
use url::Url;

pub type Bb8Connection<'a> = bb8::PooledConnection<'a, ConnectionManager>;

/// Inner pool variants
#[derive(Debug, Clone)]
enum PoolInner {
    Postgres(bb8::Pool<ConnectionManager>),
    #[cfg(test)]
    Sqlite(sqlx::SqlitePool),
}

/// Connection that can be either Postgres or SQLite
pub enum PoolConnection {
    Postgres(Bb8Connection<'static>),
    #[cfg(test)]
    Sqlite(sqlx::pool::PoolConnection<sqlx::Sqlite>),
}

#[derive(Debug, Clone)]
pub struct Pool {
    inner: PoolInner,
}

/// Where to connect: `postgresql://{user}:{password}@{host}:{port}/{database}`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PgTarget {
    pub user: String,
    pub password: String,
    pub host: String,
    pub port: u16,
    pub database: String,
}

impl PgTarget {
    /// The connection string, credentials percent-encoded
    pub fn connection_url(&self) -> Result<Url> {
        let mut url = Url::parse(&format!("postgresql://{}:{}", self.host, self.port))
            .with_context(|| format!("Invalid database host '{}'", self.host))?;
        url.set_username(&self.user)
            .map_err(|_| anyhow!("Cannot set user on database URL"))?;
        url.set_password(Some(&self.password))
            .map_err(|_| anyhow!("Cannot set password on database URL"))?;
        url.set_path(&self.database);
        Ok(url)
    }

    /// The connection string with the password masked, for display
    pub fn redacted(&self) -> String {
        match self.connection_url() {
            Ok(mut url) => {
                let _ = url.set_password(Some("***"));
                url.to_string()
            }
            Err(_) => format!(
                "postgresql://{}:***@{}:{}/{}",
                self.user, self.host, self.port, self.database
            ),
        }
    }

    fn connect_options(&self) -> Result<PgConnectOptions> {
        let url = self.connection_url()?;
        PgConnectOptions::from_str(url.as_str())
            .with_context(|| format!("Invalid connection string {}", self.redacted()))
    }
}

impl std::fmt::Display for PgTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.redacted())
    }
}

#[derive(Builder)]
pub struct PoolArgs {
    target: PgTarget,
    /// A run holds one connection for its whole duration
    #[builder(default = "1")]
    max_pool_size: u32,
}

/// Open the pool and establish its connection up front
pub async fn pool(args: PoolArgs) -> Result<Pool> {
    let PoolArgs {
        target,
        max_pool_size,
    } = args;

    let connect_options = target.connect_options()?;
    let conn_manager = ConnectionManager::new(connect_options);

    // The idle connection is opened by `build`, so an unreachable database
    // fails here with the driver's error, before any download starts
    let bb8_pool = bb8::Builder::new()
        .min_idle(Some(1))
        .max_size(max_pool_size)
        .retry_connection(false)
        .build(conn_manager)
        .await
        .with_context(|| format!("Failed to connect to {}", target))?;

    info!(target = %target, "connected to database");

    Ok(Pool {
        inner: PoolInner::Postgres(bb8_pool),
    })
}

impl Pool {
    /// Create an in-memory SQLite pool for testing
    ///
    /// Capped at a single connection: every connection to `sqlite::memory:`
    /// opens a separate database.
    #[cfg(test)]
    pub async fn sqlite_in_memory() -> Result<Self, sqlx::Error> {
        let sqlite_pool = sqlx::sqlite::SqlitePoolOptions::new()
            .min_connections(1)
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect("sqlite::memory:")
            .await?;

        Ok(Pool {
            inner: PoolInner::Sqlite(sqlite_pool),
        })
    }

    pub async fn acquire(&self) -> Result<PoolConnection, sqlx::Error> {
        match &self.inner {
            PoolInner::Postgres(pool) => {
                let conn = pool.get_owned().await.map_err(|e| match e {
                    bb8::RunError::User(e) => e,
                    bb8::RunError::TimedOut => sqlx::Error::PoolTimedOut,
                })?;
                Ok(PoolConnection::Postgres(conn))
            }
            #[cfg(test)]
            PoolInner::Sqlite(pool) => {
                let conn = pool.acquire().await?;
                Ok(PoolConnection::Sqlite(conn))
            }
        }
    }

    /// Execute statements (DDL like DROP/CREATE TABLE) in one transaction
    pub async fn execute_in_transaction(&self, statements: &[String]) -> Result<(), sqlx::Error> {
        match self.acquire().await? {
            PoolConnection::Postgres(mut conn) => {
                let mut tx = Connection::begin(&mut *conn).await?;
                for sql in statements {
                    sqlx::query(sql).execute(&mut *tx).await?;
                }
                tx.commit().await
            }
            #[cfg(test)]
            PoolConnection::Sqlite(mut conn) => {
                let mut tx = Connection::begin(&mut *conn).await?;
                for sql in statements {
                    sqlx::query(sql).execute(&mut *tx).await?;
                }
                tx.commit().await
            }
        }
    }

    /// Check if this pool is using PostgreSQL (returns false for SQLite)
    pub fn is_postgres(&self) -> bool {
        matches!(&self.inner, PoolInner::Postgres(_))
    }
}

// Wrap the connect options so that we can implement the bb8::ManageConnection trait.
pub struct ConnectionManager {
    connect_options: PgConnectOptions,
}

impl ConnectionManager {
    /// Create a new `ConnectionManager` with the specified connect options.
    pub fn new(connect_options: PgConnectOptions) -> Self {
        Self { connect_options }
    }
}

impl bb8::ManageConnection for ConnectionManager {
    type Connection = PgConnection;
    type Error = sqlx::Error;

    async fn connect(&self) -> Result<Self::Connection, Self::Error> {
        self.connect_options.connect().await
    }

    async fn is_valid(&self, conn: &mut Self::Connection) -> Result<(), Self::Error> {
        conn.ping().await
    }

    fn has_broken(&self, _conn: &mut Self::Connection) -> bool {
        // sqlx::PgConnection provides no non-async way to check for closed/broken connections.
        false
    }
}
