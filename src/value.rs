use std::cmp::Ordering;
use std::fmt::{self, Formatter};

use serde::de::{Deserialize, Deserializer, Visitor};

/// A dynamically typed Scratch value.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
  Number(f64),
  String(String),
  Boolean(bool),
  #[default]
  Empty,
}

impl Value {
  /// Coerces to a number for arithmetic. Anything that does not parse is 0.
  pub fn to_number(&self) -> f64 {
    match self {
      Value::Number(number) if number.is_nan() => 0.,
      Value::Number(number) => *number,
      Value::String(string) => parse_number(string).unwrap_or(0.),
      Value::Boolean(boolean) => *boolean as i32 as f64,
      Value::Empty => 0.,
    }
  }

  /// The numeric reading used by comparisons: `None` means "compare as text".
  pub fn as_number(&self) -> Option<f64> {
    match self {
      Value::Number(number) if number.is_nan() => None,
      Value::Number(number) => Some(*number),
      Value::String(string) => parse_number(string),
      Value::Boolean(_) | Value::Empty => None,
    }
  }

  pub fn to_bool(&self) -> bool {
    match self {
      Value::Boolean(boolean) => *boolean,
      Value::Number(number) => *number != 0. && !number.is_nan(),
      Value::String(string) => {
        !(string.is_empty() || string == "0" || string.eq_ignore_ascii_case("false"))
      }
      Value::Empty => false,
    }
  }

  pub fn is_int(&self) -> bool {
    match self {
      Value::Number(number) => number.is_finite() && number.fract() == 0.,
      Value::String(string) => !string.contains('.'),
      Value::Boolean(_) | Value::Empty => true,
    }
  }

  pub fn is_empty(&self) -> bool {
    matches!(self, Value::Empty)
  }

  pub fn equals(&self, other: &Value) -> bool {
    if self.is_boolean() || other.is_boolean() {
      return self.to_string().to_lowercase() == other.to_string().to_lowercase();
    }
    match (self.as_number(), other.as_number()) {
      (Some(lhs), Some(rhs)) => lhs == rhs,
      _ => self.to_string() == other.to_string(),
    }
  }

  pub fn compare(&self, other: &Value) -> Ordering {
    match (self, other) {
      (Value::Empty, Value::Empty) => return Ordering::Equal,
      (Value::Empty, _) => return Ordering::Less,
      (_, Value::Empty) => return Ordering::Greater,
      _ => {}
    }
    if self.is_boolean() || other.is_boolean() {
      return self.to_string().to_lowercase().cmp(&other.to_string().to_lowercase());
    }
    match (self.as_number(), other.as_number()) {
      (Some(lhs), Some(rhs)) => lhs.partial_cmp(&rhs).unwrap_or(Ordering::Equal),
      _ => self.to_string().cmp(&other.to_string()),
    }
  }

  /// Literal from a numeric input slot: kept as text when it is not a number
  /// so an empty slot still reads back as "".
  pub fn numeric_literal(value: Value) -> Value {
    match value {
      Value::String(string) => match parse_number(&string) {
        Some(number) => Value::Number(number),
        None => Value::String(string),
      },
      value => value,
    }
  }

  fn is_boolean(&self) -> bool {
    matches!(self, Value::Boolean(_))
  }
}

/// Parses text the way the language does: surrounding whitespace is ignored,
/// `Infinity` is accepted, words such as `inf` or `nan` are not.
pub fn parse_number(text: &str) -> Option<f64> {
  let text = text.trim();
  if text.is_empty() {
    return None;
  }
  match text {
    "Infinity" | "+Infinity" => return Some(f64::INFINITY),
    "-Infinity" => return Some(f64::NEG_INFINITY),
    _ => {}
  }
  let (negative, unsigned) = match text.strip_prefix('-') {
    Some(rest) => (true, rest),
    None => (false, text.strip_prefix('+').unwrap_or(text)),
  };
  for (prefix, radix) in [("0x", 16), ("0X", 16), ("0b", 2), ("0B", 2), ("0o", 8), ("0O", 8)] {
    if let Some(digits) = unsigned.strip_prefix(prefix) {
      let number = i64::from_str_radix(digits, radix).ok()? as f64;
      return Some(if negative { -number } else { number });
    }
  }
  if text.chars().any(|c| c.is_ascii_alphabetic() && c != 'e' && c != 'E') {
    return None;
  }
  text.parse::<f64>().ok()
}

pub fn format_number(number: f64) -> String {
  if number.is_nan() {
    "NaN".to_string()
  } else if number == f64::INFINITY {
    "Infinity".to_string()
  } else if number == f64::NEG_INFINITY {
    "-Infinity".to_string()
  } else if number == 0. {
    "0".to_string()
  } else {
    format!("{number}")
  }
}

impl fmt::Display for Value {
  fn fmt(&self, f: &mut Formatter) -> fmt::Result {
    match self {
      Value::Number(number) => f.write_str(&format_number(*number)),
      Value::String(string) => f.write_str(string),
      Value::Boolean(true) => f.write_str("True"),
      Value::Boolean(false) => f.write_str("False"),
      Value::Empty => Ok(()),
    }
  }
}

impl From<f64> for Value {
  fn from(number: f64) -> Self {
    Value::Number(number)
  }
}

impl From<bool> for Value {
  fn from(boolean: bool) -> Self {
    Value::Boolean(boolean)
  }
}

impl From<&str> for Value {
  fn from(string: &str) -> Self {
    Value::String(string.to_string())
  }
}

impl From<String> for Value {
  fn from(string: String) -> Self {
    Value::String(string)
  }
}

impl<'de> Deserialize<'de> for Value {
  fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
    struct ValueVisitor;
    impl<'de> Visitor<'de> for ValueVisitor {
      type Value = Value;
      fn expecting(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "a number, string, boolean or null")
      }
      fn visit_bool<E>(self, boolean: bool) -> Result<Value, E> {
        Ok(Value::Boolean(boolean))
      }
      fn visit_i64<E>(self, number: i64) -> Result<Value, E> {
        Ok(Value::Number(number as f64))
      }
      fn visit_u64<E>(self, number: u64) -> Result<Value, E> {
        Ok(Value::Number(number as f64))
      }
      fn visit_f64<E>(self, number: f64) -> Result<Value, E> {
        Ok(Value::Number(number))
      }
      fn visit_str<E>(self, string: &str) -> Result<Value, E> {
        Ok(Value::String(string.to_string()))
      }
      fn visit_string<E>(self, string: String) -> Result<Value, E> {
        Ok(Value::String(string))
      }
      fn visit_unit<E>(self) -> Result<Value, E> {
        Ok(Value::Empty)
      }
      fn visit_none<E>(self) -> Result<Value, E> {
        Ok(Value::Empty)
      }
    }
    de.deserialize_any(ValueVisitor)
  }
}
