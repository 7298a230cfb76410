//! Database handle: one connection, one dialect, one last-error mirror.

use std::path::Path;

use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use sqlx::sqlite::SqliteConnectOptions;
use sqlx::{Connection, SqliteConnection};
use tracing::debug;

use crate::error::{Error, Result};
use crate::statement::{Dialect, prepare};
use crate::value::{bind_value, decode_rows};

/// A generic database handle wrapping a single SQLx SQLite connection.
///
/// Handles are not meant to be shared across tasks; concurrent callers use
/// separate handles and rely on the named lock registry (keyed by table and
/// row, not by handle) to serialize logical writes.
///
/// Every operation resets [`DbHandle::last_error`] on entry and, on failure,
/// records a description combining the data-source name, the operation, the
/// driver error, and (for writes) the SQL with its binds. The string mirrors
/// the returned error so callers polling state between operations see
/// `last_error() == ""` exactly when the most recent operation succeeded.
pub struct DbHandle {
   conn: SqliteConnection,
   dsn: String,
   dialect: Dialect,
   last_error: String,
   in_transaction: bool,
}

impl DbHandle {
   /// Open a connection for `dsn` (e.g. `sqlite::memory:` or
   /// `sqlite:/path/to.db`), creating the database file when missing.
   pub async fn connect(dsn: &str) -> Result<Self> {
      let options: SqliteConnectOptions = dsn.parse::<SqliteConnectOptions>()?.create_if_missing(true);
      let conn = SqliteConnection::connect_with(&options).await?;
      Ok(Self {
         conn,
         dsn: dsn.to_string(),
         dialect: Dialect::Sqlite,
         last_error: String::new(),
         in_transaction: false,
      })
   }

   /// Open a connection for a database file path.
   pub async fn connect_with_path(path: &Path) -> Result<Self> {
      Self::connect(&format!("sqlite:{}", path.display())).await
   }

   pub fn dsn(&self) -> &str {
      &self.dsn
   }

   pub fn dialect(&self) -> Dialect {
      self.dialect
   }

   /// Empty iff the most recent operation succeeded.
   pub fn last_error(&self) -> &str {
      &self.last_error
   }

   pub(crate) fn clear_error(&mut self) {
      self.last_error.clear();
   }

   pub(crate) fn record_error(&mut self, operation: &str, detail: &str) {
      self.last_error = format!("{} {operation} failed: {detail}", self.dsn);
      debug!("{}", self.last_error);
   }

   /// Execute a SELECT with named binds and decode all rows.
   pub async fn fetch_all(
      &mut self,
      sql: &str,
      binds: &IndexMap<String, JsonValue>,
   ) -> Result<Vec<IndexMap<String, JsonValue>>> {
      self.clear_error();
      match self.fetch_all_inner(sql, binds).await {
         Ok(rows) => Ok(rows),
         Err(e) => {
            self.record_error("fetch", &format!("{e}; sql={sql}"));
            Err(e)
         }
      }
   }

   async fn fetch_all_inner(
      &mut self,
      sql: &str,
      binds: &IndexMap<String, JsonValue>,
   ) -> Result<Vec<IndexMap<String, JsonValue>>> {
      let (prepared, values) = prepare(sql, binds, self.dialect)?;
      let mut query = sqlx::query(&prepared);
      for value in values {
         query = bind_value(query, value);
      }
      let rows = query.fetch_all(&mut self.conn).await?;
      decode_rows(rows)
   }

   /// Execute a SELECT and return the first column of the first row, if any.
   pub async fn fetch_value(
      &mut self,
      sql: &str,
      binds: &IndexMap<String, JsonValue>,
   ) -> Result<Option<JsonValue>> {
      let rows = self.fetch_all(sql, binds).await?;
      Ok(rows
         .into_iter()
         .next()
         .and_then(|row| row.into_iter().next().map(|(_, v)| v)))
   }

   /// Execute a write statement (INSERT/UPDATE/DELETE/DDL) with named binds.
   ///
   /// On failure inside an open transaction the whole transaction is rolled
   /// back so the connection stays usable for the next caller — this rolls
   /// back more than the failed statement when several statements were
   /// batched uncommitted, which is the accepted trade-off of not relying on
   /// savepoints.
   pub async fn execute(
      &mut self,
      sql: &str,
      binds: &IndexMap<String, JsonValue>,
   ) -> Result<u64> {
      self.clear_error();
      match self.execute_inner(sql, binds).await {
         Ok(rows_affected) => Ok(rows_affected),
         Err(e) => {
            self.record_error("execute", &format!("{e}; sql={sql}; binds={binds:?}"));
            if self.in_transaction {
               self.in_transaction = false;
               if let Err(rollback_err) = sqlx::query("ROLLBACK").execute(&mut self.conn).await {
                  debug!("{} rollback after failed write also failed: {rollback_err}", self.dsn);
               }
            }
            Err(e)
         }
      }
   }

   async fn execute_inner(
      &mut self,
      sql: &str,
      binds: &IndexMap<String, JsonValue>,
   ) -> Result<u64> {
      let (prepared, values) = prepare(sql, binds, self.dialect)?;
      let mut query = sqlx::query(&prepared);
      for value in values {
         query = bind_value(query, value);
      }
      let result = query.execute(&mut self.conn).await?;
      Ok(result.rows_affected())
   }

   /// Begin an explicit transaction.
   pub async fn begin(&mut self) -> Result<()> {
      self.clear_error();
      if let Err(e) = sqlx::query("BEGIN IMMEDIATE").execute(&mut self.conn).await {
         self.record_error("begin", &e.to_string());
         return Err(e.into());
      }
      self.in_transaction = true;
      Ok(())
   }

   /// Commit the open transaction.
   pub async fn commit(&mut self) -> Result<()> {
      self.clear_error();
      self.in_transaction = false;
      if let Err(e) = sqlx::query("COMMIT").execute(&mut self.conn).await {
         self.record_error("commit", &e.to_string());
         return Err(e.into());
      }
      Ok(())
   }

   /// Roll back the open transaction.
   pub async fn rollback(&mut self) -> Result<()> {
      self.clear_error();
      self.in_transaction = false;
      if let Err(e) = sqlx::query("ROLLBACK").execute(&mut self.conn).await {
         self.record_error("rollback", &e.to_string());
         return Err(e.into());
      }
      Ok(())
   }

   /// Close the connection.
   pub async fn close(self) -> Result<()> {
      self.conn.close().await?;
      Ok(())
   }

   pub(crate) fn record_upsert_error(&mut self, error: &Error) {
      self.record_error("upsert", &error.to_string());
   }
}
