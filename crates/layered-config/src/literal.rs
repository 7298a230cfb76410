//! Safe recursive-descent parser for literal option values.
//!
//! Supports exactly: quoted strings (single or double, backslash escapes),
//! integers, floats, booleans, bracketed lists, braced maps with quoted
//! string keys, parenthesized tuples, the two fixed date/datetime token
//! formats, and arbitrary nesting of those. Anything else is a typed parse
//! error — there is no identifier lookup and no call evaluation.

use crate::error::{ConfigError, Result};
use crate::value::{ConfigValue, parse_fixed_date};

/// Parse a complete literal expression. Trailing content after the literal
/// is an error.
pub fn parse_literal(input: &str) -> Result<ConfigValue> {
   let mut p = Parser {
      input,
      bytes: input.as_bytes(),
      pos: 0,
   };
   p.skip_whitespace();
   let value = p.parse_value()?;
   p.skip_whitespace();
   if p.pos != p.bytes.len() {
      return Err(p.error("trailing characters after literal"));
   }
   Ok(value)
}

struct Parser<'a> {
   input: &'a str,
   bytes: &'a [u8],
   pos: usize,
}

impl<'a> Parser<'a> {
   fn error(&self, message: &str) -> ConfigError {
      ConfigError::Literal {
         pos: self.pos,
         message: message.to_string(),
      }
   }

   fn skip_whitespace(&mut self) {
      while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_whitespace() {
         self.pos += 1;
      }
   }

   fn peek(&self) -> Option<u8> {
      self.bytes.get(self.pos).copied()
   }

   fn parse_value(&mut self) -> Result<ConfigValue> {
      match self.peek() {
         Some(b'\'') | Some(b'"') => self.parse_string().map(ConfigValue::Str),
         Some(b'[') => self.parse_list(),
         Some(b'{') => self.parse_map(),
         Some(b'(') => self.parse_tuple(),
         Some(c) if c.is_ascii_alphabetic() => self.parse_keyword(),
         Some(c) if c.is_ascii_digit() || c == b'-' || c == b'+' => self.parse_number_or_date(),
         Some(_) => Err(self.error("expected a literal value")),
         None => Err(self.error("unexpected end of input")),
      }
   }

   fn parse_string(&mut self) -> Result<String> {
      let quote = self.bytes[self.pos];
      self.pos += 1;
      let mut out = String::new();
      let mut segment_start = self.pos;

      while self.pos < self.bytes.len() {
         let b = self.bytes[self.pos];
         if b == quote {
            out.push_str(&self.input[segment_start..self.pos]);
            self.pos += 1;
            return Ok(out);
         }
         if b == b'\\' {
            out.push_str(&self.input[segment_start..self.pos]);
            let escaped = match self.bytes.get(self.pos + 1) {
               Some(b'\\') => '\\',
               Some(b'\'') => '\'',
               Some(b'"') => '"',
               Some(b'n') => '\n',
               Some(b't') => '\t',
               Some(b'r') => '\r',
               _ => return Err(self.error("unknown escape sequence")),
            };
            out.push(escaped);
            self.pos += 2;
            segment_start = self.pos;
            continue;
         }
         self.pos += 1;
      }
      Err(self.error("unterminated string literal"))
   }

   fn parse_list(&mut self) -> Result<ConfigValue> {
      self.pos += 1; // consume '['
      let items = self.parse_items(b']')?;
      Ok(ConfigValue::List(items.0))
   }

   fn parse_tuple(&mut self) -> Result<ConfigValue> {
      self.pos += 1; // consume '('
      let (items, trailing_comma) = self.parse_items(b')')?;
      // A single parenthesized value without a trailing comma is grouping,
      // not a 1-tuple.
      if items.len() == 1 && !trailing_comma {
         return Ok(items.into_iter().next().unwrap_or(ConfigValue::Tuple(vec![])));
      }
      Ok(ConfigValue::Tuple(items))
   }

   /// Parse comma-separated values up to `close`. Returns the items and
   /// whether the last item carried a trailing comma.
   fn parse_items(&mut self, close: u8) -> Result<(Vec<ConfigValue>, bool)> {
      let mut items = Vec::new();
      let mut trailing_comma = false;
      loop {
         self.skip_whitespace();
         match self.peek() {
            Some(c) if c == close => {
               self.pos += 1;
               return Ok((items, trailing_comma));
            }
            None => return Err(self.error("unterminated collection literal")),
            _ => {}
         }
         items.push(self.parse_value()?);
         self.skip_whitespace();
         match self.peek() {
            Some(b',') => {
               self.pos += 1;
               trailing_comma = true;
            }
            Some(c) if c == close => {
               trailing_comma = false;
            }
            _ => return Err(self.error("expected ',' or closing delimiter")),
         }
      }
   }

   fn parse_map(&mut self) -> Result<ConfigValue> {
      self.pos += 1; // consume '{'
      let mut entries = Vec::new();
      loop {
         self.skip_whitespace();
         match self.peek() {
            Some(b'}') => {
               self.pos += 1;
               return Ok(ConfigValue::Map(entries));
            }
            Some(b'\'') | Some(b'"') => {}
            None => return Err(self.error("unterminated map literal")),
            _ => return Err(self.error("map keys must be quoted strings")),
         }
         let key = self.parse_string()?;
         self.skip_whitespace();
         if self.peek() != Some(b':') {
            return Err(self.error("expected ':' after map key"));
         }
         self.pos += 1;
         self.skip_whitespace();
         let value = self.parse_value()?;
         entries.push((key, value));
         self.skip_whitespace();
         match self.peek() {
            Some(b',') => self.pos += 1,
            Some(b'}') => {}
            _ => return Err(self.error("expected ',' or '}' in map literal")),
         }
      }
   }

   fn parse_keyword(&mut self) -> Result<ConfigValue> {
      let start = self.pos;
      while self.pos < self.bytes.len() && self.bytes[self.pos].is_ascii_alphabetic() {
         self.pos += 1;
      }
      match &self.input[start..self.pos] {
         "True" | "true" => Ok(ConfigValue::Bool(true)),
         "False" | "false" => Ok(ConfigValue::Bool(false)),
         other => Err(ConfigError::Literal {
            pos: start,
            message: format!("unknown keyword '{other}'"),
         }),
      }
   }

   /// Numbers and bare date/datetime tokens both start with a digit; a
   /// `dddd-` prefix selects the date path.
   fn parse_number_or_date(&mut self) -> Result<ConfigValue> {
      if self.looks_like_date() {
         return self.parse_date_token();
      }
      self.parse_number()
   }

   fn looks_like_date(&self) -> bool {
      let rest = &self.bytes[self.pos..];
      rest.len() >= 5 && rest[..4].iter().all(u8::is_ascii_digit) && rest[4] == b'-'
   }

   /// Consume up to the next collection delimiter and try the fixed
   /// date/datetime formats on the trimmed token.
   fn parse_date_token(&mut self) -> Result<ConfigValue> {
      let start = self.pos;
      while self.pos < self.bytes.len() && !matches!(self.bytes[self.pos], b',' | b']' | b'}' | b')') {
         self.pos += 1;
      }
      let token = self.input[start..self.pos].trim_end();
      // Give back any trimmed trailing whitespace
      self.pos = start + token.len();
      parse_fixed_date(token).ok_or(ConfigError::Literal {
         pos: start,
         message: format!("invalid date token '{token}'"),
      })
   }

   fn parse_number(&mut self) -> Result<ConfigValue> {
      let start = self.pos;
      if matches!(self.peek(), Some(b'-') | Some(b'+')) {
         self.pos += 1;
      }
      let mut is_float = false;
      while let Some(b) = self.peek() {
         match b {
            b'0'..=b'9' => self.pos += 1,
            b'.' | b'e' | b'E' => {
               is_float = true;
               self.pos += 1;
            }
            b'-' | b'+' if is_float => self.pos += 1, // exponent sign
            _ => break,
         }
      }
      let text = &self.input[start..self.pos];
      if is_float {
         text.parse::<f64>().map(ConfigValue::Float).map_err(|_| ConfigError::Literal {
            pos: start,
            message: format!("invalid float literal '{text}'"),
         })
      } else {
         text.parse::<i64>().map(ConfigValue::Int).map_err(|_| ConfigError::Literal {
            pos: start,
            message: format!("invalid integer literal '{text}'"),
         })
      }
   }
}
