//! Named-placeholder statement preparation.
//!
//! Call sites write SQL with `:name` placeholders regardless of backend.
//! Just before execution the statement is prepared in two passes:
//!
//! 1. **IN-list expansion**: a placeholder bound to a JSON array becomes N
//!    suffixed placeholders (`:name_0, …`) so drivers that cannot bind a
//!    sequence to one parameter still work; the caller writes `IN (:name)`.
//! 2. **Dialect adaptation**: SQLite accepts named parameters natively, so
//!    the SQL passes through unchanged and bind values are ordered by first
//!    occurrence (one per distinct name). Postgres placeholders are
//!    rewritten to `$N` with the same name always mapping to the same
//!    number.
//!
//! The scanner ignores placeholders inside string literals, quoted
//! identifiers, and comments, and skips `::` casts.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};

/// Placeholder syntax of the executing backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Dialect {
   /// Native `:name` support; SQL passes through unchanged.
   Sqlite,
   /// Requires translation of every `:name` occurrence to `$N`.
   Postgres,
}

/// Bind-name prefix for generated check predicates, so a column appearing
/// both as a SET target and as a WHERE check binds two distinct values.
pub(crate) const CHK_BIND_PREFIX: &str = "chk_";

/// A `:name` occurrence: byte range (including the colon) and the bare name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Placeholder {
   pub start: usize,
   pub end: usize,
   pub name: String,
}

/// Advance the scanner index past a quoted literal or identifier.
///
/// `quote` is the opening quote character (`'` or `"`). The scanner handles
/// SQL-standard doubled-quote escaping (`''` or `""`).
fn skip_quoted(bytes: &[u8], len: usize, i: usize, quote: u8) -> usize {
   let mut j = i + 1;
   while j < len {
      if bytes[j] == quote {
         if j + 1 < len && bytes[j + 1] == quote {
            j += 2;
            continue;
         }
         return j;
      }
      j += 1;
   }
   j // unterminated — return end
}

/// Advance the scanner index past a `--` line comment (until newline or end).
fn skip_line_comment(bytes: &[u8], len: usize, i: usize) -> usize {
   let mut j = i + 2;
   while j < len && bytes[j] != b'\n' {
      j += 1;
   }
   j
}

/// Advance the scanner index past a `/* … */` block comment.
fn skip_block_comment(bytes: &[u8], len: usize, i: usize) -> usize {
   let mut j = i + 2;
   while j + 1 < len {
      if bytes[j] == b'*' && bytes[j + 1] == b'/' {
         return j + 1;
      }
      j += 1;
   }
   len.saturating_sub(1)
}

fn is_ident_start(b: u8) -> bool {
   b.is_ascii_alphabetic() || b == b'_'
}

fn is_ident_char(b: u8) -> bool {
   b.is_ascii_alphanumeric() || b == b'_'
}

/// Collect every `:name` placeholder outside quotes and comments.
pub(crate) fn find_placeholders(sql: &str) -> Vec<Placeholder> {
   let bytes = sql.as_bytes();
   let len = bytes.len();
   let mut found = Vec::new();
   let mut i = 0;

   while i < len {
      match bytes[i] {
         b'\'' => i = skip_quoted(bytes, len, i, b'\''),
         b'"' => i = skip_quoted(bytes, len, i, b'"'),
         b'-' if i + 1 < len && bytes[i + 1] == b'-' => {
            i = skip_line_comment(bytes, len, i);
         }
         b'/' if i + 1 < len && bytes[i + 1] == b'*' => {
            i = skip_block_comment(bytes, len, i);
         }
         b':' => {
            // '::' is a cast, not a placeholder
            if i + 1 < len && bytes[i + 1] == b':' {
               i += 1;
            } else if i + 1 < len && is_ident_start(bytes[i + 1]) {
               let start = i;
               let mut j = i + 1;
               while j < len && is_ident_char(bytes[j]) {
                  j += 1;
               }
               found.push(Placeholder {
                  start,
                  end: j,
                  name: sql[start + 1..j].to_string(),
               });
               i = j;
               continue;
            }
         }
         _ => {}
      }
      i += 1;
   }

   found
}

/// Expand every placeholder bound to a JSON array into N suffixed
/// placeholders. The original SQL is expected to wrap the placeholder in
/// `IN ( … )`; an empty array expands to `NULL`, which matches nothing.
pub(crate) fn expand_in_lists(
   sql: &str,
   binds: &IndexMap<String, JsonValue>,
) -> Result<(String, IndexMap<String, JsonValue>)> {
   let placeholders = find_placeholders(sql);
   let needs_expansion = placeholders
      .iter()
      .any(|p| matches!(binds.get(&p.name), Some(JsonValue::Array(_))));
   if !needs_expansion {
      return Ok((sql.to_string(), binds.clone()));
   }

   let mut out_sql = String::with_capacity(sql.len());
   let mut out_binds: IndexMap<String, JsonValue> = IndexMap::new();
   let mut cursor = 0;

   for (name, value) in binds {
      if !matches!(value, JsonValue::Array(_)) {
         out_binds.insert(name.clone(), value.clone());
      }
   }

   for ph in &placeholders {
      let Some(JsonValue::Array(items)) = binds.get(&ph.name) else {
         continue;
      };
      out_sql.push_str(&sql[cursor..ph.start]);
      if items.is_empty() {
         out_sql.push_str("NULL");
      } else {
         let mut expanded = Vec::with_capacity(items.len());
         for (idx, item) in items.iter().enumerate() {
            let expanded_name = format!("{}_{idx}", ph.name);
            if binds.contains_key(&expanded_name) {
               return Err(Error::BindCollision {
                  name: expanded_name,
               });
            }
            expanded.push(format!(":{expanded_name}"));
            out_binds.insert(expanded_name, item.clone());
         }
         out_sql.push_str(&expanded.join(", "));
      }
      cursor = ph.end;
   }
   out_sql.push_str(&sql[cursor..]);

   Ok((out_sql, out_binds))
}

/// Prepare a named-placeholder statement for execution: expand IN lists,
/// adapt placeholders to `dialect`, and produce the ordered bind values.
pub fn prepare(
   sql: &str,
   binds: &IndexMap<String, JsonValue>,
   dialect: Dialect,
) -> Result<(String, Vec<JsonValue>)> {
   let (expanded_sql, expanded_binds) = expand_in_lists(sql, binds)?;
   let placeholders = find_placeholders(&expanded_sql);

   // Distinct names in first-occurrence order; this is both the SQLite bind
   // order (SQLite numbers named parameters by first occurrence) and the
   // Postgres `$N` numbering.
   let mut order: Vec<&str> = Vec::new();
   for ph in &placeholders {
      if !order.contains(&ph.name.as_str()) {
         order.push(&ph.name);
      }
   }

   let mut values = Vec::with_capacity(order.len());
   for name in &order {
      match expanded_binds.get(*name) {
         Some(value) => values.push(value.clone()),
         None => {
            return Err(Error::MissingBind {
               name: (*name).to_string(),
            });
         }
      }
   }

   let final_sql = match dialect {
      Dialect::Sqlite => expanded_sql,
      Dialect::Postgres => {
         let mut out = String::with_capacity(expanded_sql.len());
         let mut cursor = 0;
         for ph in &placeholders {
            let number = order
               .iter()
               .position(|n| *n == ph.name)
               .map_or(0, |p| p + 1);
            out.push_str(&expanded_sql[cursor..ph.start]);
            out.push_str(&format!("${number}"));
            cursor = ph.end;
         }
         out.push_str(&expanded_sql[cursor..]);
         out
      }
   };

   Ok((final_sql, values))
}

/// Validate that an identifier is safe for SQL interpolation.
///
/// Accepts names matching `[a-zA-Z_][a-zA-Z0-9_.]*`, which covers plain
/// column names, qualified names (e.g., `table.column`), and underscored
/// identifiers.
pub(crate) fn validate_identifier(name: &str) -> Result<()> {
   let mut chars = name.chars();
   let Some(first) = chars.next() else {
      return Err(Error::InvalidIdentifier {
         name: name.to_string(),
      });
   };
   if !first.is_ascii_alphabetic() && first != '_' {
      return Err(Error::InvalidIdentifier {
         name: name.to_string(),
      });
   }
   for ch in chars {
      if !ch.is_ascii_alphanumeric() && ch != '_' && ch != '.' {
         return Err(Error::InvalidIdentifier {
            name: name.to_string(),
         });
      }
   }
   Ok(())
}

/// Quote an identifier with double quotes for defense-in-depth.
///
/// Any embedded double quotes are doubled per SQL standard (`"` → `""`).
pub(crate) fn quote_identifier(name: &str) -> String {
   format!("\"{}\"", name.replace('"', "\"\""))
}

/// Build the merged WHERE clause for a check-value set plus an optional
/// caller fragment.
///
/// Check values become `"col" = :chk_col` predicates (or `"col" IN (:chk_col)`
/// for array values, expanded later). A caller fragment starting with
/// `GROUP BY` or `ORDER BY` is appended after the predicates instead of
/// being ANDed; with no check values and no fragment the clause degrades to
/// a tautology. Returns the clause (without the `WHERE` keyword) and the
/// prefixed bind map.
pub fn rebind(
   chk_values: &IndexMap<String, JsonValue>,
   extra: Option<&str>,
) -> Result<(String, IndexMap<String, JsonValue>)> {
   let mut predicates = Vec::with_capacity(chk_values.len());
   let mut binds = IndexMap::with_capacity(chk_values.len());

   for (column, value) in chk_values {
      validate_identifier(column)?;
      let bind_name = format!("{CHK_BIND_PREFIX}{column}");
      if matches!(value, JsonValue::Array(_)) {
         predicates.push(format!("{} IN (:{bind_name})", quote_identifier(column)));
      } else {
         predicates.push(format!("{} = :{bind_name}", quote_identifier(column)));
      }
      binds.insert(bind_name, value.clone());
   }

   let generated = if predicates.is_empty() {
      "1=1".to_string()
   } else {
      predicates.join(" AND ")
   };

   let extra = extra.map(str::trim).filter(|s| !s.is_empty());
   let clause = match extra {
      None => generated,
      Some(fragment) => {
         let upper = fragment.to_uppercase();
         if upper.starts_with("GROUP BY") || upper.starts_with("ORDER BY") {
            format!("{generated} {fragment}")
         } else {
            format!("{generated} AND ({fragment})")
         }
      }
   };

   Ok((clause, binds))
}

#[cfg(test)]
mod tests {
   use super::*;
   use serde_json::json;

   fn binds(pairs: &[(&str, JsonValue)]) -> IndexMap<String, JsonValue> {
      pairs
         .iter()
         .map(|(k, v)| (k.to_string(), v.clone()))
         .collect()
   }

   // ─── find_placeholders ───

   #[test]
   fn finds_simple_placeholders() {
      let found = find_placeholders("SELECT * FROM t WHERE a = :a AND b = :b_2");
      let names: Vec<&str> = found.iter().map(|p| p.name.as_str()).collect();
      assert_eq!(names, vec!["a", "b_2"]);
   }

   #[test]
   fn ignores_placeholders_in_string_literals() {
      let found = find_placeholders("SELECT ':not_one' FROM t WHERE a = :real");
      let names: Vec<&str> = found.iter().map(|p| p.name.as_str()).collect();
      assert_eq!(names, vec!["real"]);
   }

   #[test]
   fn ignores_placeholders_in_comments() {
      let found = find_placeholders("SELECT * FROM t -- :commented\nWHERE a = :a /* :blocked */");
      let names: Vec<&str> = found.iter().map(|p| p.name.as_str()).collect();
      assert_eq!(names, vec!["a"]);
   }

   #[test]
   fn skips_double_colon_casts() {
      let found = find_placeholders("SELECT a::text FROM t WHERE b = :b");
      let names: Vec<&str> = found.iter().map(|p| p.name.as_str()).collect();
      assert_eq!(names, vec!["b"]);
   }

   #[test]
   fn repeated_name_is_found_at_each_occurrence() {
      let found = find_placeholders("SELECT * FROM t WHERE a = :x OR b = :x");
      assert_eq!(found.len(), 2);
   }

   // ─── expand_in_lists ───

   #[test]
   fn expands_sequence_bind_into_suffixed_names() {
      let input = binds(&[("ids", json!([1, 2, 3, 4, 5]))]);
      let (sql, out) =
         expand_in_lists("SELECT * FROM t WHERE id IN (:ids)", &input).unwrap();

      assert_eq!(
         sql,
         "SELECT * FROM t WHERE id IN (:ids_0, :ids_1, :ids_2, :ids_3, :ids_4)"
      );
      assert_eq!(out.len(), 5);
      assert_eq!(out["ids_2"], json!(3));
   }

   #[test]
   fn expansion_does_not_collide_with_other_bound_names() {
      let input = binds(&[("ids", json!([1, 2])), ("status", json!("open"))]);
      let (_, out) = expand_in_lists(
         "SELECT * FROM t WHERE id IN (:ids) AND status = :status",
         &input,
      )
      .unwrap();

      let names: Vec<&String> = out.keys().collect();
      assert_eq!(names.len(), 3);
      assert!(out.contains_key("status"));
      assert!(out.contains_key("ids_0"));
      assert!(out.contains_key("ids_1"));
   }

   #[test]
   fn expansion_detects_caller_collision() {
      let input = binds(&[("ids", json!([1])), ("ids_0", json!(9))]);
      let err = expand_in_lists("WHERE id IN (:ids) AND x = :ids_0", &input).unwrap_err();
      assert!(matches!(err, Error::BindCollision { .. }));
   }

   #[test]
   fn empty_sequence_becomes_null_match() {
      let input = binds(&[("ids", json!([]))]);
      let (sql, out) = expand_in_lists("SELECT * FROM t WHERE id IN (:ids)", &input).unwrap();
      assert_eq!(sql, "SELECT * FROM t WHERE id IN (NULL)");
      assert!(out.is_empty());
   }

   #[test]
   fn scalar_binds_pass_through_untouched() {
      let input = binds(&[("a", json!(1))]);
      let (sql, out) = expand_in_lists("WHERE a = :a", &input).unwrap();
      assert_eq!(sql, "WHERE a = :a");
      assert_eq!(out, input);
   }

   // ─── prepare ───

   #[test]
   fn sqlite_passes_named_sql_through_unchanged() {
      let input = binds(&[("a", json!(1)), ("b", json!("x"))]);
      let (sql, values) =
         prepare("UPDATE t SET a = :a WHERE b = :b", &input, Dialect::Sqlite).unwrap();

      assert_eq!(sql, "UPDATE t SET a = :a WHERE b = :b");
      assert_eq!(values, vec![json!(1), json!("x")]);
   }

   #[test]
   fn sqlite_orders_values_by_first_occurrence() {
      let input = binds(&[("a", json!("first")), ("z", json!("second"))]);
      let (_, values) = prepare("WHERE z = :z AND a = :a", &input, Dialect::Sqlite).unwrap();
      assert_eq!(values, vec![json!("second"), json!("first")]);
   }

   #[test]
   fn sqlite_binds_repeated_name_once() {
      let input = binds(&[("x", json!(7))]);
      let (sql, values) =
         prepare("WHERE a = :x OR b = :x", &input, Dialect::Sqlite).unwrap();
      assert_eq!(sql, "WHERE a = :x OR b = :x");
      assert_eq!(values, vec![json!(7)]);
   }

   #[test]
   fn postgres_rewrites_to_numbered_placeholders() {
      let input = binds(&[("a", json!(1)), ("b", json!(2))]);
      let (sql, values) =
         prepare("UPDATE t SET a = :a WHERE b = :b", &input, Dialect::Postgres).unwrap();

      assert_eq!(sql, "UPDATE t SET a = $1 WHERE b = $2");
      assert_eq!(values, vec![json!(1), json!(2)]);
   }

   #[test]
   fn postgres_repeated_name_shares_a_number() {
      let input = binds(&[("x", json!(7)), ("y", json!(8))]);
      let (sql, values) = prepare(
         "WHERE a = :x OR (b = :y AND c = :x)",
         &input,
         Dialect::Postgres,
      )
      .unwrap();

      assert_eq!(sql, "WHERE a = $1 OR (b = $2 AND c = $1)");
      assert_eq!(values, vec![json!(7), json!(8)]);
   }

   #[test]
   fn prepare_expands_in_lists_before_dialect() {
      let input = binds(&[("ids", json!([10, 20]))]);
      let (sql, values) = prepare(
         "SELECT * FROM t WHERE id IN (:ids)",
         &input,
         Dialect::Postgres,
      )
      .unwrap();

      assert_eq!(sql, "SELECT * FROM t WHERE id IN ($1, $2)");
      assert_eq!(values, vec![json!(10), json!(20)]);
   }

   #[test]
   fn prepare_reports_missing_bind() {
      let input = binds(&[]);
      let err = prepare("WHERE a = :a", &input, Dialect::Sqlite).unwrap_err();
      assert!(matches!(err, Error::MissingBind { name } if name == "a"));
   }

   // ─── rebind ───

   #[test]
   fn rebind_builds_namespaced_equality_predicates() {
      let chk = binds(&[("id", json!("A1")), ("region", json!("EU"))]);
      let (clause, out) = rebind(&chk, None).unwrap();

      assert_eq!(clause, r#""id" = :chk_id AND "region" = :chk_region"#);
      assert_eq!(out["chk_id"], json!("A1"));
      assert_eq!(out["chk_region"], json!("EU"));
   }

   #[test]
   fn rebind_namespace_avoids_set_where_collision() {
      // The same column can be both a SET target (bound as :balance) and a
      // WHERE check (bound as :chk_balance) in a single statement.
      let chk = binds(&[("balance", json!(100))]);
      let (clause, out) = rebind(&chk, None).unwrap();
      assert_eq!(clause, r#""balance" = :chk_balance"#);
      assert!(!out.contains_key("balance"));
   }

   #[test]
   fn rebind_ands_caller_fragment() {
      let chk = binds(&[("id", json!(1))]);
      let (clause, _) = rebind(&chk, Some("deleted = 0")).unwrap();
      assert_eq!(clause, r#""id" = :chk_id AND (deleted = 0)"#);
   }

   #[test]
   fn rebind_prefixes_group_by_fragment() {
      let chk = binds(&[("id", json!(1))]);
      let (clause, _) = rebind(&chk, Some("GROUP BY region")).unwrap();
      assert_eq!(clause, r#""id" = :chk_id GROUP BY region"#);
   }

   #[test]
   fn rebind_prefixes_order_by_fragment() {
      let chk = binds(&[("id", json!(1))]);
      let (clause, _) = rebind(&chk, Some("order by id")).unwrap();
      assert_eq!(clause, r#""id" = :chk_id order by id"#);
   }

   #[test]
   fn rebind_without_check_values_uses_fragment_alone() {
      let chk = binds(&[]);
      let (clause, out) = rebind(&chk, Some("status = 'open'")).unwrap();
      assert_eq!(clause, "1=1 AND (status = 'open')");
      assert!(out.is_empty());
   }

   #[test]
   fn rebind_defaults_to_tautology() {
      let chk = binds(&[]);
      let (clause, _) = rebind(&chk, None).unwrap();
      assert_eq!(clause, "1=1");
   }

   #[test]
   fn rebind_sequence_check_value_uses_in_predicate() {
      let chk = binds(&[("id", json!([1, 2]))]);
      let (clause, out) = rebind(&chk, None).unwrap();
      assert_eq!(clause, r#""id" IN (:chk_id)"#);
      assert_eq!(out["chk_id"], json!([1, 2]));
   }

   #[test]
   fn rebind_rejects_hostile_column_name() {
      let chk = binds(&[("id; DROP TABLE t --", json!(1))]);
      assert!(rebind(&chk, None).is_err());
   }

   // ─── identifiers ───

   #[test]
   fn identifier_validation() {
      assert!(validate_identifier("col_1").is_ok());
      assert!(validate_identifier("t.col").is_ok());
      assert!(validate_identifier("_private").is_ok());
      assert!(validate_identifier("").is_err());
      assert!(validate_identifier("1bad").is_err());
      assert!(validate_identifier("a b").is_err());
   }

   #[test]
   fn quote_identifier_doubles_embedded_quotes() {
      assert_eq!(quote_identifier("plain"), "\"plain\"");
      assert_eq!(quote_identifier("we\"ird"), "\"we\"\"ird\"");
   }
}
