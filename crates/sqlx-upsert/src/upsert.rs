//! Race-free insert-or-update orchestration.
//!
//! `upsert` implements check-then-write without backend UPSERT syntax: it
//! serializes on a named lock derived from the table and the sorted check
//! values, counts matching rows inside the lock, and then issues exactly one
//! INSERT or UPDATE. Two concurrent callers with the same check key can
//! therefore never both decide "absent" — whichever acquires the lock first
//! completes its whole check-and-write before the other starts.

use std::time::Duration;

use indexmap::IndexMap;
use named_locks::LockRegistry;
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};
use crate::handle::DbHandle;
use crate::statement::{quote_identifier, rebind, validate_identifier};
use crate::value::normalize_col_values;

/// Knobs for the check-then-write protocol.
#[derive(Debug, Clone, Default)]
pub struct UpsertOptions {
   /// Extra WHERE fragment merged into the check predicate (a fragment
   /// starting with `GROUP BY`/`ORDER BY` is appended instead of ANDed).
   pub extra_where: Option<String>,
   /// Column to read back after the write, under the same check predicate.
   pub returning_column: Option<String>,
   /// Columns that an UPDATE only overwrites with non-NULL new values
   /// (`COALESCE(new, old)` semantics).
   pub locked_cols: Vec<String>,
   /// Allow UPDATE when the check matches more than one row.
   pub multi_row_update: bool,
   /// Bound on the named-lock wait; `None` waits indefinitely.
   pub lock_timeout: Option<Duration>,
}

/// Deterministic lock key for a table and check-value set: the check items
/// are sorted by column name, so two upserts naming the same table and the
/// same check values always serialize regardless of differing column values
/// or map ordering.
pub fn lock_key(table: &str, chk_values: &IndexMap<String, JsonValue>) -> String {
   let mut items: Vec<(&String, &JsonValue)> = chk_values.iter().collect();
   items.sort_by(|a, b| a.0.cmp(b.0));
   let parts: Vec<String> = items.iter().map(|(k, v)| format!("{k}={v}")).collect();
   format!("{table}:{}", parts.join(","))
}

impl DbHandle {
   /// Insert `col_values` when no row matches `chk_values`, update the
   /// matched row otherwise. Returns the read-back value when
   /// `options.returning_column` is set.
   ///
   /// The existence check and the write run under a named lock scoped to
   /// the table and check key; the lock is released on every exit path.
   pub async fn upsert(
      &mut self,
      registry: &LockRegistry,
      table: &str,
      col_values: &IndexMap<String, JsonValue>,
      chk_values: &IndexMap<String, JsonValue>,
      options: &UpsertOptions,
   ) -> Result<Option<JsonValue>> {
      self.clear_error();
      if let Err(error) = validate_identifier(table) {
         self.record_upsert_error(&error);
         return Err(error);
      }
      let col_values = normalize_col_values(col_values);

      let key = lock_key(table, chk_values);
      if !registry.acquire(&key, options.lock_timeout).await {
         let error = Error::LockTimeout { key };
         self.record_upsert_error(&error);
         return Err(error);
      }
      let result = self
         .upsert_locked(table, &col_values, chk_values, options)
         .await;
      registry.release(&key);
      if let Err(error) = &result
         && self.last_error().is_empty()
      {
         self.record_upsert_error(error);
      }
      result
   }

   async fn upsert_locked(
      &mut self,
      table: &str,
      col_values: &IndexMap<String, JsonValue>,
      chk_values: &IndexMap<String, JsonValue>,
      options: &UpsertOptions,
   ) -> Result<Option<JsonValue>> {
      let (where_clause, chk_binds) = rebind(chk_values, options.extra_where.as_deref())?;
      let quoted_table = quote_identifier(table);

      // A failed count records its own error and no write is attempted.
      let count_sql = format!("SELECT COUNT(*) FROM {quoted_table} WHERE {where_clause}");
      let matches = match self.fetch_value(&count_sql, &chk_binds).await? {
         Some(JsonValue::Number(n)) => n.as_i64().unwrap_or(0),
         _ => 0,
      };

      if matches == 0 {
         self.insert_row(&quoted_table, col_values, chk_values).await?;
      } else if matches == 1 || options.multi_row_update {
         self
            .update_rows(&quoted_table, col_values, &where_clause, &chk_binds, options)
            .await?;
      } else {
         let error = Error::AmbiguousMatch {
            table: table.to_string(),
            matches,
         };
         self.record_upsert_error(&error);
         return Err(error);
      }

      if let Some(column) = &options.returning_column {
         validate_identifier(column)?;
         let read_back_sql = format!(
            "SELECT {} FROM {quoted_table} WHERE {where_clause}",
            quote_identifier(column)
         );
         return self.fetch_value(&read_back_sql, &chk_binds).await;
      }
      Ok(None)
   }

   async fn insert_row(
      &mut self,
      quoted_table: &str,
      col_values: &IndexMap<String, JsonValue>,
      chk_values: &IndexMap<String, JsonValue>,
   ) -> Result<()> {
      // The check values are the row's key; they win over any same-named
      // column value so the inserted row actually matches the check.
      let mut merged = col_values.clone();
      for (column, value) in chk_values {
         merged.insert(column.clone(), value.clone());
      }

      let mut columns = Vec::with_capacity(merged.len());
      let mut placeholders = Vec::with_capacity(merged.len());
      for column in merged.keys() {
         validate_identifier(column)?;
         columns.push(quote_identifier(column));
         placeholders.push(format!(":{column}"));
      }
      let sql = format!(
         "INSERT INTO {quoted_table} ({}) VALUES ({})",
         columns.join(", "),
         placeholders.join(", ")
      );
      self.execute(&sql, &merged).await?;
      Ok(())
   }

   async fn update_rows(
      &mut self,
      quoted_table: &str,
      col_values: &IndexMap<String, JsonValue>,
      where_clause: &str,
      chk_binds: &IndexMap<String, JsonValue>,
      options: &UpsertOptions,
   ) -> Result<()> {
      if col_values.is_empty() {
         // Nothing to set; the check already succeeded.
         return Ok(());
      }

      let mut assignments = Vec::with_capacity(col_values.len());
      for column in col_values.keys() {
         validate_identifier(column)?;
         let quoted = quote_identifier(column);
         if options.locked_cols.iter().any(|locked| locked == column) {
            assignments.push(format!("{quoted} = COALESCE(:{column}, {quoted})"));
         } else {
            assignments.push(format!("{quoted} = :{column}"));
         }
      }

      let sql = format!(
         "UPDATE {quoted_table} SET {} WHERE {where_clause}",
         assignments.join(", ")
      );
      // SET binds use plain column names, check binds are chk_-prefixed;
      // the same column can appear in both roles without collision.
      let mut binds = col_values.clone();
      for (name, value) in chk_binds {
         binds.insert(name.clone(), value.clone());
      }
      self.execute(&sql, &binds).await?;
      Ok(())
   }
}
