//! JSON bind values and row decoding.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use indexmap::IndexMap;
use serde_json::Value as JsonValue;
use sqlx::{Column, Row, TypeInfo, ValueRef};
use sqlx::sqlite::SqliteRow;

use crate::error::{Error, Result};

/// Empty strings mark absence, never an empty-string literal: normalize them
/// to NULL before any write.
pub fn normalize_col_values(values: &IndexMap<String, JsonValue>) -> IndexMap<String, JsonValue> {
   values
      .iter()
      .map(|(k, v)| {
         let normalized = match v {
            JsonValue::String(s) if s.is_empty() => JsonValue::Null,
            other => other.clone(),
         };
         (k.clone(), normalized)
      })
      .collect()
}

/// Helper function to bind a JSON value to a SQLx query
pub(crate) fn bind_value<'a>(
   query: sqlx::query::Query<'a, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'a>>,
   value: JsonValue,
) -> sqlx::query::Query<'a, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'a>> {
   match value {
      JsonValue::Null => query.bind(None::<JsonValue>),
      JsonValue::Bool(b) => query.bind(b),
      JsonValue::String(s) => query.bind(s),
      JsonValue::Number(number) => {
         // Preserve integer precision by binding as i64 when possible
         if let Some(int_val) = number.as_i64() {
            query.bind(int_val)
         } else if let Some(uint_val) = number.as_u64() {
            if uint_val <= i64::MAX as u64 {
               query.bind(uint_val as i64)
            } else {
               // Value too large for i64, use f64 (will lose precision)
               query.bind(uint_val as f64)
            }
         } else {
            query.bind(number.as_f64().unwrap_or_default())
         }
      }
      other => query.bind(other),
   }
}

/// Decode one column of a row to JSON based on its SQLite type.
fn column_to_json(row: &SqliteRow, index: usize) -> Result<JsonValue> {
   let raw = row.try_get_raw(index)?;
   if raw.is_null() {
      return Ok(JsonValue::Null);
   }
   let type_name = raw.type_info().name().to_string();
   drop(raw);

   match type_name.as_str() {
      "INTEGER" | "NUMERIC" => {
         let v: i64 = row.try_get(index)?;
         Ok(JsonValue::from(v))
      }
      // Stored as an integer; decoded through bool for type compatibility
      "BOOLEAN" => {
         let v: bool = row.try_get(index)?;
         Ok(JsonValue::from(i64::from(v)))
      }
      "REAL" => {
         let v: f64 = row.try_get(index)?;
         Ok(JsonValue::from(v))
      }
      "TEXT" | "DATE" | "TIME" | "DATETIME" => {
         let v: String = row.try_get(index)?;
         Ok(JsonValue::from(v))
      }
      "BLOB" => {
         let v: Vec<u8> = row.try_get(index)?;
         Ok(JsonValue::from(BASE64.encode(v)))
      }
      other => Err(Error::UnsupportedDatatype(other.to_string())),
   }
}

/// Decode rows to order-preserving JSON maps.
pub(crate) fn decode_rows(rows: Vec<SqliteRow>) -> Result<Vec<IndexMap<String, JsonValue>>> {
   let mut values = Vec::with_capacity(rows.len());
   for row in rows {
      let mut value = IndexMap::default();
      for (i, column) in row.columns().iter().enumerate() {
         let v = column_to_json(&row, i)?;
         value.insert(column.name().to_string(), v);
      }
      values.push(value);
   }
   Ok(values)
}

#[cfg(test)]
mod tests {
   use super::*;
   use serde_json::json;

   #[test]
   fn normalize_turns_empty_strings_into_null() {
      let input: IndexMap<String, JsonValue> = IndexMap::from([
         ("a".to_string(), json!("")),
         ("b".to_string(), json!("kept")),
         ("c".to_string(), json!(0)),
      ]);

      let out = normalize_col_values(&input);
      assert_eq!(out["a"], JsonValue::Null);
      assert_eq!(out["b"], json!("kept"));
      assert_eq!(out["c"], json!(0));
   }

   #[test]
   fn normalize_preserves_column_order() {
      let input: IndexMap<String, JsonValue> = IndexMap::from([
         ("z".to_string(), json!(1)),
         ("a".to_string(), json!(2)),
      ]);
      let out = normalize_col_values(&input);
      let keys: Vec<&String> = out.keys().collect();
      assert_eq!(keys, vec!["z", "a"]);
   }
}
