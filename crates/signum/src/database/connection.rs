/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! Database connection management.
//!
//! This module provides an async connection pool built on `deadpool-diesel`
//! for SQLite. Connections are handed out through [`Database::get_connection`]
//! and every query runs inside `interact`, which moves the blocking diesel call
//! onto the pool's worker thread.
//!
//! Accepted connection strings:
//!
//! - a file path (`./signum.db`, `/var/lib/signum/signum.db`)
//! - a `sqlite://` URL, whose prefix is stripped
//! - a `file:` URI such as `file:signum?mode=memory&cache=shared`
//! - `:memory:`
//!
//! # Example
//!
//! ```rust,ignore
//! use signum::database::Database;
//!
//! let db = Database::new("sqlite://signum.db", "", 1)?;
//! db.run_migrations().await?;
//! ```

use deadpool_diesel::sqlite::{Manager as SqliteManager, Pool as SqlitePool, Runtime};
use tracing::{debug, info};

use crate::error::ValidationError;

/// SQLite busy timeout applied before migrations, in milliseconds.
const BUSY_TIMEOUT_MS: u32 = 30_000;

/// A pool of SQLite connections.
///
/// `Database` is `Clone`; every clone shares the same pool.
#[derive(Clone)]
pub struct Database {
    pool: SqlitePool,
    url: String,
}

impl std::fmt::Debug for Database {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Database").field("url", &self.url).finish()
    }
}

impl Database {
    /// Creates a new connection pool.
    ///
    /// `_database_name` is accepted for symmetry with server databases and is
    /// ignored. `max_size` is clamped to one connection: SQLite has limited
    /// concurrent write support even with WAL, and a single connection avoids
    /// "database is locked" errors. It also keeps `:memory:` databases alive
    /// for the lifetime of the pool.
    pub fn new(
        connection_string: &str,
        _database_name: &str,
        max_size: u32,
    ) -> Result<Self, ValidationError> {
        let url = Self::build_sqlite_url(connection_string);
        let manager = SqliteManager::new(url.clone(), Runtime::Tokio1);

        let sqlite_pool_size = 1;
        if max_size as usize > sqlite_pool_size {
            debug!(
                "Requested pool size {} reduced to {} for SQLite",
                max_size, sqlite_pool_size
            );
        }

        let pool = SqlitePool::builder(manager)
            .max_size(sqlite_pool_size)
            .build()
            .map_err(|e| ValidationError::ConnectionPool(e.to_string()))?;

        info!(
            "SQLite connection pool initialized (size: {})",
            sqlite_pool_size
        );

        Ok(Self { pool, url })
    }

    /// The connection string after normalisation.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns a clone of the connection pool.
    pub fn pool(&self) -> SqlitePool {
        self.pool.clone()
    }

    /// Checks a connection out of the pool.
    pub async fn get_connection(
        &self,
    ) -> Result<
        deadpool::managed::Object<SqliteManager>,
        deadpool::managed::PoolError<deadpool_diesel::Error>,
    > {
        self.pool.get().await
    }

    /// Builds a SQLite connection URL.
    fn build_sqlite_url(connection_string: &str) -> String {
        // Strip sqlite:// prefix if present
        if let Some(path) = connection_string.strip_prefix("sqlite://") {
            path.to_string()
        } else {
            connection_string.to_string()
        }
    }

    /// Runs pending migrations.
    ///
    /// WAL mode and a busy timeout are set on the connection first.
    pub async fn run_migrations(&self) -> Result<(), ValidationError> {
        use diesel::prelude::*;
        use diesel_migrations::MigrationHarness;

        let conn = self.get_connection().await?;
        conn.interact(|conn| -> Result<(), ValidationError> {
            diesel::sql_query("PRAGMA journal_mode=WAL;").execute(conn)?;
            diesel::sql_query(format!("PRAGMA busy_timeout={};", BUSY_TIMEOUT_MS))
                .execute(conn)?;
            diesel::sql_query("PRAGMA foreign_keys=ON;").execute(conn)?;
            conn.run_pending_migrations(crate::database::MIGRATIONS)
                .map_err(|e| ValidationError::ConnectionPool(format!("Failed to run migrations: {}", e)))?;
            Ok(())
        })
        .await??;

        info!("Database migrations applied");
        Ok(())
    }
}
