//! Typed configuration values and the coercion protocol.
//!
//! A [`ConfigValue`] is the resolved form of an option. Raw strings (from the
//! command line or a configuration file) coerce toward a declared
//! [`ValueKind`]; once an option has resolved successfully its kind is locked
//! and every later raw value must coerce to the same kind.
//!
//! Structured values travel through plain-text files as literal expressions,
//! optionally wrapped in triple quotes (`'''…'''` or `"""…"""`). The wrapper
//! marks "parse this as a literal" for values that would otherwise read as a
//! plain string; bare `[…]`, `{…}`, `(…)` and quoted forms parse as literals
//! without it.

use serde::Serialize;
use time::format_description::BorrowedFormatItem;
use time::macros::format_description;
use time::{Date, PrimitiveDateTime};

use crate::error::{ConfigError, Result};
use crate::literal::parse_literal;

/// Fixed date-only format: `YYYY-MM-DD`.
pub(crate) const DATE_FORMAT: &[BorrowedFormatItem<'static>] =
   format_description!("[year]-[month]-[day]");

/// Fixed datetime format: `YYYY-MM-DD HH:MM:SS.ffffff`.
pub(crate) const DATETIME_FORMAT: &[BorrowedFormatItem<'static>] =
   format_description!("[year]-[month]-[day] [hour]:[minute]:[second].[subsecond digits:6]");

/// Datetime without the fractional part, accepted on input only.
pub(crate) const DATETIME_FORMAT_SECONDS: &[BorrowedFormatItem<'static>] =
   format_description!("[year]-[month]-[day] [hour]:[minute]:[second]");

/// The kind an option locks onto after its first successful resolution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum ValueKind {
   Str,
   Bool,
   Int,
   Float,
   Date,
   DateTime,
   List,
   Map,
   Tuple,
   Bytes,
}

/// A resolved, typed configuration value.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigValue {
   Str(String),
   Bool(bool),
   Int(i64),
   Float(f64),
   Date(Date),
   DateTime(PrimitiveDateTime),
   List(Vec<ConfigValue>),
   /// Order-preserving string-keyed map.
   Map(Vec<(String, ConfigValue)>),
   Tuple(Vec<ConfigValue>),
   Bytes(Vec<u8>),
}

impl ConfigValue {
   /// The kind of this value.
   pub fn kind(&self) -> ValueKind {
      match self {
         ConfigValue::Str(_) => ValueKind::Str,
         ConfigValue::Bool(_) => ValueKind::Bool,
         ConfigValue::Int(_) => ValueKind::Int,
         ConfigValue::Float(_) => ValueKind::Float,
         ConfigValue::Date(_) => ValueKind::Date,
         ConfigValue::DateTime(_) => ValueKind::DateTime,
         ConfigValue::List(_) => ValueKind::List,
         ConfigValue::Map(_) => ValueKind::Map,
         ConfigValue::Tuple(_) => ValueKind::Tuple,
         ConfigValue::Bytes(_) => ValueKind::Bytes,
      }
   }

   pub fn as_str(&self) -> Option<&str> {
      match self {
         ConfigValue::Str(s) => Some(s),
         _ => None,
      }
   }

   pub fn as_bool(&self) -> Option<bool> {
      match self {
         ConfigValue::Bool(b) => Some(*b),
         _ => None,
      }
   }

   pub fn as_int(&self) -> Option<i64> {
      match self {
         ConfigValue::Int(i) => Some(*i),
         _ => None,
      }
   }

   pub fn as_float(&self) -> Option<f64> {
      match self {
         ConfigValue::Float(f) => Some(*f),
         _ => None,
      }
   }

   pub fn as_list(&self) -> Option<&[ConfigValue]> {
      match self {
         ConfigValue::List(items) => Some(items),
         _ => None,
      }
   }

   /// Coerce a raw string toward `declared`, or infer a kind when `None`.
   ///
   /// `option` is only used for error reporting. Byte input is expected to
   /// have been decoded to UTF-8 before reaching this point.
   pub fn coerce(option: &str, raw: &str, declared: Option<ValueKind>) -> Result<ConfigValue> {
      let trimmed = raw.trim();
      let fail = |kind: ValueKind| ConfigError::Coercion {
         option: option.to_string(),
         raw: raw.to_string(),
         kind,
      };

      let Some(kind) = declared else {
         return generic_parse(trimmed);
      };

      match kind {
         ValueKind::Bool => {
            if trimmed.eq_ignore_ascii_case("true") {
               return Ok(ConfigValue::Bool(true));
            }
            if trimmed.eq_ignore_ascii_case("false") {
               return Ok(ConfigValue::Bool(false));
            }
            // Not a boolean literal: the generic rules decide, and the
            // result must still be a boolean.
            match generic_parse(trimmed) {
               Ok(ConfigValue::Bool(b)) => Ok(ConfigValue::Bool(b)),
               _ => Err(fail(kind)),
            }
         }
         ValueKind::Date => match parse_fixed_date(trimmed) {
            Some(ConfigValue::Date(d)) => Ok(ConfigValue::Date(d)),
            // Length heuristic matched the datetime pattern: keep the date part
            Some(ConfigValue::DateTime(dt)) => Ok(ConfigValue::Date(dt.date())),
            _ => match triple_quoted(trimmed).map(parse_literal) {
               Some(Ok(ConfigValue::Date(d))) => Ok(ConfigValue::Date(d)),
               Some(Ok(ConfigValue::DateTime(dt))) => Ok(ConfigValue::Date(dt.date())),
               _ => Err(fail(kind)),
            },
         },
         ValueKind::DateTime => match parse_fixed_date(trimmed) {
            Some(ConfigValue::DateTime(dt)) => Ok(ConfigValue::DateTime(dt)),
            // Date-only raw promotes to midnight
            Some(ConfigValue::Date(d)) => Ok(ConfigValue::DateTime(d.midnight())),
            _ => match triple_quoted(trimmed).map(parse_literal) {
               Some(Ok(ConfigValue::DateTime(dt))) => Ok(ConfigValue::DateTime(dt)),
               Some(Ok(ConfigValue::Date(d))) => Ok(ConfigValue::DateTime(d.midnight())),
               _ => Err(fail(kind)),
            },
         },
         ValueKind::Int => {
            if let Ok(i) = trimmed.parse::<i64>() {
               return Ok(ConfigValue::Int(i));
            }
            match generic_parse(trimmed) {
               Ok(ConfigValue::Int(i)) => Ok(ConfigValue::Int(i)),
               _ => Err(fail(kind)),
            }
         }
         ValueKind::Float => {
            if let Ok(f) = trimmed.parse::<f64>() {
               return Ok(ConfigValue::Float(f));
            }
            match generic_parse(trimmed) {
               Ok(ConfigValue::Float(f)) => Ok(ConfigValue::Float(f)),
               Ok(ConfigValue::Int(i)) => Ok(ConfigValue::Float(i as f64)),
               _ => Err(fail(kind)),
            }
         }
         ValueKind::Str => match generic_parse(trimmed) {
            Ok(ConfigValue::Str(s)) => Ok(ConfigValue::Str(s)),
            Ok(_) => Err(fail(kind)),
            Err(e) => Err(e),
         },
         ValueKind::List | ValueKind::Map | ValueKind::Tuple => {
            match generic_parse(trimmed) {
               Ok(v) if v.kind() == kind => Ok(v),
               _ => Err(fail(kind)),
            }
         }
         ValueKind::Bytes => Ok(ConfigValue::Bytes(trimmed.as_bytes().to_vec())),
      }
   }

   /// Literal representation that round-trips through [`parse_literal`].
   pub fn literal(&self) -> String {
      match self {
         ConfigValue::Str(s) => quote_string(s),
         ConfigValue::Bool(true) => "True".to_string(),
         ConfigValue::Bool(false) => "False".to_string(),
         ConfigValue::Int(i) => i.to_string(),
         ConfigValue::Float(f) => format!("{f:?}"),
         ConfigValue::Date(d) => format_date(*d),
         ConfigValue::DateTime(dt) => format_datetime(*dt),
         ConfigValue::List(items) => {
            let inner: Vec<String> = items.iter().map(ConfigValue::literal).collect();
            format!("[{}]", inner.join(", "))
         }
         ConfigValue::Tuple(items) => match items.len() {
            0 => "()".to_string(),
            1 => format!("({},)", items[0].literal()),
            _ => {
               let inner: Vec<String> = items.iter().map(ConfigValue::literal).collect();
               format!("({})", inner.join(", "))
            }
         },
         ConfigValue::Map(entries) => {
            let inner: Vec<String> = entries
               .iter()
               .map(|(k, v)| format!("{}: {}", quote_string(k), v.literal()))
               .collect();
            format!("{{{}}}", inner.join(", "))
         }
         ConfigValue::Bytes(b) => quote_string(&String::from_utf8_lossy(b)),
      }
   }

   /// Serialization used by write-back: structured values are triple-quoted
   /// literals, dates use the fixed formats, and everything else is plain
   /// display output — deliberately unquoted, so a plain string reads back
   /// as itself rather than as a quoted literal.
   pub fn persist_repr(&self) -> String {
      match self {
         ConfigValue::List(_) | ConfigValue::Map(_) | ConfigValue::Tuple(_) => {
            format!("'''{}'''", self.literal())
         }
         ConfigValue::Date(d) => format_date(*d),
         ConfigValue::DateTime(dt) => format_datetime(*dt),
         ConfigValue::Str(s) => s.clone(),
         ConfigValue::Bool(true) => "True".to_string(),
         ConfigValue::Bool(false) => "False".to_string(),
         ConfigValue::Int(i) => i.to_string(),
         ConfigValue::Float(f) => format!("{f:?}"),
         ConfigValue::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
      }
   }
}

/// The generic coercion rules, applied when no declared kind constrains the
/// result or when a typed rule falls through to them.
fn generic_parse(trimmed: &str) -> Result<ConfigValue> {
   if let Some(inner) = triple_quoted(trimmed) {
      return parse_literal(inner);
   }
   if looks_like_literal(trimmed) {
      return parse_literal(trimmed);
   }
   Ok(ConfigValue::Str(trimmed.to_string()))
}

/// Strip a matching triple-quote wrapper, if present.
fn triple_quoted(s: &str) -> Option<&str> {
   for delim in ["'''", "\"\"\""] {
      if s.len() >= 6 && s.starts_with(delim) && s.ends_with(delim) {
         return Some(&s[3..s.len() - 3]);
      }
   }
   None
}

/// A bare value that is syntactically a structured or quoted literal parses
/// as one even without the triple-quote wrapper.
fn looks_like_literal(s: &str) -> bool {
   matches!(s.as_bytes().first(), Some(b'[' | b'{' | b'(' | b'\'' | b'"'))
}

/// Try the two fixed date patterns, picked by a length heuristic: 10 bytes is
/// date-only, 19 or more is a datetime (with or without the fraction).
pub(crate) fn parse_fixed_date(s: &str) -> Option<ConfigValue> {
   match s.len() {
      10 => Date::parse(s, DATE_FORMAT).ok().map(ConfigValue::Date),
      n if n >= 19 => PrimitiveDateTime::parse(s, DATETIME_FORMAT)
         .or_else(|_| PrimitiveDateTime::parse(s, DATETIME_FORMAT_SECONDS))
         .ok()
         .map(ConfigValue::DateTime),
      _ => None,
   }
}

pub(crate) fn format_date(d: Date) -> String {
   format!("{:04}-{:02}-{:02}", d.year(), u8::from(d.month()), d.day())
}

pub(crate) fn format_datetime(dt: PrimitiveDateTime) -> String {
   format!(
      "{} {:02}:{:02}:{:02}.{:06}",
      format_date(dt.date()),
      dt.hour(),
      dt.minute(),
      dt.second(),
      dt.microsecond()
   )
}

fn quote_string(s: &str) -> String {
   let mut out = String::with_capacity(s.len() + 2);
   out.push('\'');
   for ch in s.chars() {
      match ch {
         '\\' => out.push_str("\\\\"),
         '\'' => out.push_str("\\'"),
         '\n' => out.push_str("\\n"),
         '\t' => out.push_str("\\t"),
         '\r' => out.push_str("\\r"),
         _ => out.push(ch),
      }
   }
   out.push('\'');
   out
}

#[cfg(test)]
mod tests {
   use super::*;
   use time::macros::{date, datetime};

   // ─── coercion: bool ───

   #[test]
   fn bool_literals_case_insensitive() {
      for raw in ["True", "true", "TRUE"] {
         assert_eq!(
            ConfigValue::coerce("o", raw, Some(ValueKind::Bool)).unwrap(),
            ConfigValue::Bool(true)
         );
      }
      assert_eq!(
         ConfigValue::coerce("o", "False", Some(ValueKind::Bool)).unwrap(),
         ConfigValue::Bool(false)
      );
   }

   #[test]
   fn bool_triple_quoted_literal() {
      assert_eq!(
         ConfigValue::coerce("o", "'''True'''", Some(ValueKind::Bool)).unwrap(),
         ConfigValue::Bool(true)
      );
   }

   #[test]
   fn bool_rejects_non_boolean() {
      let err = ConfigValue::coerce("flag", "maybe", Some(ValueKind::Bool)).unwrap_err();
      assert!(err.to_string().contains("flag"));
      assert!(err.to_string().contains("maybe"));
   }

   // ─── coercion: dates ───

   #[test]
   fn date_fixed_format() {
      assert_eq!(
         ConfigValue::coerce("o", "2024-03-15", Some(ValueKind::Date)).unwrap(),
         ConfigValue::Date(date!(2024 - 03 - 15))
      );
   }

   #[test]
   fn datetime_fixed_format_with_fraction() {
      assert_eq!(
         ConfigValue::coerce("o", "2024-03-15 10:30:00.250000", Some(ValueKind::DateTime)).unwrap(),
         ConfigValue::DateTime(datetime!(2024-03-15 10:30:00.250))
      );
   }

   #[test]
   fn datetime_without_fraction() {
      assert_eq!(
         ConfigValue::coerce("o", "2024-03-15 10:30:00", Some(ValueKind::DateTime)).unwrap(),
         ConfigValue::DateTime(datetime!(2024-03-15 10:30:00))
      );
   }

   #[test]
   fn date_only_promotes_to_midnight_for_datetime_kind() {
      assert_eq!(
         ConfigValue::coerce("o", "2024-03-15", Some(ValueKind::DateTime)).unwrap(),
         ConfigValue::DateTime(datetime!(2024-03-15 00:00:00))
      );
   }

   #[test]
   fn date_rejects_garbage() {
      assert!(ConfigValue::coerce("o", "15/03/2024", Some(ValueKind::Date)).is_err());
   }

   // ─── coercion: numbers ───

   #[test]
   fn int_from_plain_string() {
      assert_eq!(
         ConfigValue::coerce("retryCount", "7", Some(ValueKind::Int)).unwrap(),
         ConfigValue::Int(7)
      );
   }

   #[test]
   fn int_rejects_float_raw() {
      assert!(ConfigValue::coerce("o", "7.5", Some(ValueKind::Int)).is_err());
   }

   #[test]
   fn float_promotes_int_literal() {
      assert_eq!(
         ConfigValue::coerce("o", "3", Some(ValueKind::Float)).unwrap(),
         ConfigValue::Float(3.0)
      );
   }

   // ─── coercion: structured ───

   #[test]
   fn list_bare_bracket_syntax() {
      assert_eq!(
         ConfigValue::coerce("o", "[1, 2, 3]", Some(ValueKind::List)).unwrap(),
         ConfigValue::List(vec![
            ConfigValue::Int(1),
            ConfigValue::Int(2),
            ConfigValue::Int(3)
         ])
      );
   }

   #[test]
   fn list_triple_quoted() {
      assert_eq!(
         ConfigValue::coerce("o", "'''['a', 'b']'''", Some(ValueKind::List)).unwrap(),
         ConfigValue::List(vec![
            ConfigValue::Str("a".into()),
            ConfigValue::Str("b".into())
         ])
      );
   }

   #[test]
   fn map_kind_mismatch_is_error() {
      assert!(ConfigValue::coerce("o", "[1]", Some(ValueKind::Map)).is_err());
   }

   // ─── coercion: strings and inference ───

   #[test]
   fn plain_string_passes_through_unchanged() {
      assert_eq!(
         ConfigValue::coerce("o", "hello world", Some(ValueKind::Str)).unwrap(),
         ConfigValue::Str("hello world".into())
      );
   }

   #[test]
   fn quoted_string_is_unquoted() {
      assert_eq!(
         ConfigValue::coerce("o", "'hello'", Some(ValueKind::Str)).unwrap(),
         ConfigValue::Str("hello".into())
      );
   }

   #[test]
   fn undeclared_kind_infers_from_syntax() {
      assert_eq!(
         ConfigValue::coerce("o", "(1, 2)", None).unwrap().kind(),
         ValueKind::Tuple
      );
      assert_eq!(
         ConfigValue::coerce("o", "plain", None).unwrap().kind(),
         ValueKind::Str
      );
   }

   #[test]
   fn bytes_kind_takes_utf8_bytes() {
      assert_eq!(
         ConfigValue::coerce("o", "abc", Some(ValueKind::Bytes)).unwrap(),
         ConfigValue::Bytes(b"abc".to_vec())
      );
   }

   // ─── literal repr round-trip ───

   #[test]
   fn literal_round_trips_nested_structure() {
      let value = ConfigValue::List(vec![
         ConfigValue::Int(1),
         ConfigValue::Str("it's".into()),
         ConfigValue::Tuple(vec![ConfigValue::Bool(true)]),
         ConfigValue::Map(vec![("k".into(), ConfigValue::Float(2.5))]),
      ]);
      let reparsed = parse_literal(&value.literal()).unwrap();
      assert_eq!(reparsed, value);
   }

   #[test]
   fn literal_float_keeps_decimal_point() {
      // 2.0 must not serialize as "2", which would re-parse as an Int
      assert_eq!(ConfigValue::Float(2.0).literal(), "2.0");
   }

   #[test]
   fn persist_repr_plain_string_is_unquoted() {
      assert_eq!(ConfigValue::Str("hello".into()).persist_repr(), "hello");
   }

   #[test]
   fn persist_repr_list_is_triple_quoted() {
      let v = ConfigValue::List(vec![ConfigValue::Int(1)]);
      assert_eq!(v.persist_repr(), "'''[1]'''");
   }

   #[test]
   fn persist_repr_datetime_uses_fixed_format() {
      let v = ConfigValue::DateTime(datetime!(2024-03-15 10:30:00.250));
      assert_eq!(v.persist_repr(), "2024-03-15 10:30:00.250000");
   }
}
