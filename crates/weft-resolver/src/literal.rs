//! A small parser for literal values written in source form.
//!
//! Accepts the literal forms code fields carry (`None`, `True`, single-quoted strings,
//! tuples, trailing commas) as well as plain JSON, and produces a JSON value.
//! Tuples become arrays and mapping keys are stringified.

use serde_json::{Map, Number, Value};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
#[error("invalid literal at offset {offset}: {message}")]
pub struct LiteralError {
  pub offset: usize,
  pub message: String,
}

/// Deepest container nesting accepted before parsing gives up.
pub const MAX_DEPTH: usize = 256;

/// Parse `source` as a single literal value.
pub fn parse_literal(source: &str) -> Result<Value, LiteralError> {
  let mut parser = Parser {
    src: source,
    pos: 0,
    depth: 0,
  };
  let value = parser.value()?;
  parser.skip_ws();
  if parser.pos < parser.src.len() {
    return Err(parser.error("trailing characters"));
  }
  Ok(value)
}

struct Parser<'a> {
  src: &'a str,
  pos: usize,
  depth: usize,
}

impl Parser<'_> {
  fn error(&self, message: impl Into<String>) -> LiteralError {
    LiteralError {
      offset: self.pos,
      message: message.into(),
    }
  }

  fn peek(&self) -> Option<char> {
    self.src[self.pos..].chars().next()
  }

  fn bump(&mut self) -> Option<char> {
    let c = self.peek()?;
    self.pos += c.len_utf8();
    Some(c)
  }

  fn skip_ws(&mut self) {
    while let Some(c) = self.peek() {
      if c.is_whitespace() {
        self.pos += c.len_utf8();
      } else {
        break;
      }
    }
  }

  fn eat(&mut self, expected: char) -> bool {
    self.skip_ws();
    if self.peek() == Some(expected) {
      self.pos += expected.len_utf8();
      true
    } else {
      false
    }
  }

  fn value(&mut self) -> Result<Value, LiteralError> {
    self.skip_ws();
    match self.peek() {
      Some(open @ ('[' | '(' | '{')) => {
        if self.depth == MAX_DEPTH {
          return Err(self.error(format!("nesting deeper than {MAX_DEPTH}")));
        }
        self.bump();
        self.depth += 1;
        let value = self.container(open);
        self.depth -= 1;
        value
      }
      Some(quote @ ('"' | '\'')) => {
        self.bump();
        self.string(quote).map(Value::String)
      }
      Some(c) if c.is_ascii_digit() || matches!(c, '-' | '+' | '.') => self.number(),
      Some(c) if c.is_alphabetic() => self.keyword(),
      Some(c) => Err(self.error(format!("unexpected character '{c}'"))),
      None => Err(self.error("unexpected end of input")),
    }
  }

  fn container(&mut self, open: char) -> Result<Value, LiteralError> {
    match open {
      '[' => {
        let (items, _) = self.sequence(']')?;
        Ok(Value::Array(items))
      }
      '(' => {
        let (mut items, trailing_comma) = self.sequence(')')?;
        // `(x)` is just a parenthesized value; `(x,)` is a tuple.
        if items.len() == 1 && !trailing_comma {
          Ok(items.remove(0))
        } else {
          Ok(Value::Array(items))
        }
      }
      _ => self.mapping(),
    }
  }

  /// Comma-separated values up to `close`. Returns the items and whether the
  /// last item was followed by a comma.
  fn sequence(&mut self, close: char) -> Result<(Vec<Value>, bool), LiteralError> {
    let mut items = Vec::new();
    let mut trailing_comma = false;
    loop {
      if self.eat(close) {
        return Ok((items, trailing_comma));
      }
      items.push(self.value()?);
      trailing_comma = self.eat(',');
      if !trailing_comma {
        if self.eat(close) {
          return Ok((items, false));
        }
        return Err(self.error(format!("expected ',' or '{close}'")));
      }
    }
  }

  fn mapping(&mut self) -> Result<Value, LiteralError> {
    let mut map = Map::new();
    loop {
      if self.eat('}') {
        return Ok(Value::Object(map));
      }
      let key = match self.value()? {
        Value::String(s) => s,
        Value::Null => "None".to_string(),
        other @ (Value::Number(_) | Value::Bool(_)) => other.to_string(),
        _ => return Err(self.error("unhashable mapping key")),
      };
      if !self.eat(':') {
        return Err(self.error("expected ':'"));
      }
      let value = self.value()?;
      map.insert(key, value);
      if !self.eat(',') {
        if self.eat('}') {
          return Ok(Value::Object(map));
        }
        return Err(self.error("expected ',' or '}'"));
      }
    }
  }

  fn string(&mut self, quote: char) -> Result<String, LiteralError> {
    let mut out = String::new();
    loop {
      let c = self
        .bump()
        .ok_or_else(|| self.error("unterminated string"))?;
      match c {
        c if c == quote => return Ok(out),
        '\\' => {
          let escaped = self
            .bump()
            .ok_or_else(|| self.error("unterminated escape"))?;
          match escaped {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            'r' => out.push('\r'),
            '0' => out.push('\0'),
            '\\' | '\'' | '"' => out.push(escaped),
            'x' => out.push(self.hex_escape(2)?),
            'u' => out.push(self.hex_escape(4)?),
            other => {
              out.push('\\');
              out.push(other);
            }
          }
        }
        c => out.push(c),
      }
    }
  }

  fn hex_escape(&mut self, digits: usize) -> Result<char, LiteralError> {
    let end = self.pos + digits;
    let hex = self
      .src
      .get(self.pos..end)
      .ok_or_else(|| self.error("truncated escape"))?;
    let code = u32::from_str_radix(hex, 16).map_err(|_| self.error("invalid hex escape"))?;
    self.pos = end;
    char::from_u32(code).ok_or_else(|| self.error("invalid code point"))
  }

  fn number(&mut self) -> Result<Value, LiteralError> {
    let start = self.pos;
    while let Some(c) = self.peek() {
      if c.is_ascii_alphanumeric() || matches!(c, '-' | '+' | '.' | '_') {
        self.pos += 1;
      } else {
        break;
      }
    }
    let text: String = self.src[start..self.pos].chars().filter(|c| *c != '_').collect();

    let is_float = text.contains(['.', 'e', 'E']) && !text.starts_with("0x");
    if !is_float && let Ok(int) = text.parse::<i64>() {
      return Ok(Value::Number(int.into()));
    }
    text
      .parse::<f64>()
      .ok()
      .and_then(Number::from_f64)
      .map(Value::Number)
      .ok_or_else(|| LiteralError {
        offset: start,
        message: format!("invalid number '{text}'"),
      })
  }

  fn keyword(&mut self) -> Result<Value, LiteralError> {
    let start = self.pos;
    while let Some(c) = self.peek() {
      if c.is_alphanumeric() || c == '_' {
        self.pos += c.len_utf8();
      } else {
        break;
      }
    }
    match &self.src[start..self.pos] {
      "None" | "null" => Ok(Value::Null),
      "True" | "true" => Ok(Value::Bool(true)),
      "False" | "false" => Ok(Value::Bool(false)),
      word => Err(LiteralError {
        offset: start,
        message: format!("'{word}' is not a literal"),
      }),
    }
  }
}
