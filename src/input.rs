use serde::de::{Error, SeqAccess, Visitor};
use serde::{Deserialize, Deserializer};
use std::fmt;
use std::fmt::Formatter;

use crate::data::{ListRef, VariableRef};
use crate::value::Value;

const NUMBER: i32 = 4;
const ANGLE: i32 = 8;
const COLOR: i32 = 9;
const TEXT: i32 = 10;
const BROADCAST: i32 = 11;
const VARIABLE: i32 = 12;
const LIST: i32 = 13;

/// One entry of a block's `inputs` map.
#[derive(Debug, Clone, PartialEq)]
pub enum Input {
  Block(String),
  Literal(Value),
  Broadcast(BroadcastRef),
  Variable(VariableRef),
  List(ListRef),
  Empty,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BroadcastRef {
  pub name: String,
  pub id: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Slot {
  Block(String),
  Primitive(Vec<Value>),
}

impl Slot {
  fn into_input<E: Error>(self) -> Result<Input, E> {
    let mut values = match self {
      Slot::Block(id) => return Ok(Input::Block(id)),
      Slot::Primitive(values) => values.into_iter(),
    };
    let kind = values.next().map(|kind| kind.to_number() as i32);
    let values = &mut values;
    match kind {
      Some(NUMBER..=ANGLE) => {
        Ok(Input::Literal(Value::numeric_literal(values.next().unwrap_or_default())))
      }
      Some(COLOR | TEXT) => Ok(Input::Literal(values.next().unwrap_or_default())),
      Some(BROADCAST) => Ok(Input::Broadcast(BroadcastRef {
        name: text(values, "name")?,
        id: text(values, "id")?,
      })),
      Some(VARIABLE) => Ok(Input::Variable(VariableRef {
        name: text(values, "name")?,
        id: text(values, "id")?,
      })),
      Some(LIST) => Ok(Input::List(ListRef {
        name: text(values, "name")?,
        id: text(values, "id")?,
      })),
      Some(kind) => Err(E::custom(format!("unknown input primitive kind {kind}"))),
      None => Err(E::custom("empty input primitive")),
    }
  }
}

fn text<E: Error>(
  values: &mut impl Iterator<Item = Value>,
  what: &'static str,
) -> Result<String, E> {
  match values.next() {
    Some(Value::String(string)) => Ok(string),
    Some(other) => Ok(other.to_string()),
    None => Err(E::missing_field(what)),
  }
}

impl<'de> Deserialize<'de> for Input {
  fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
    struct SeqVisitor;
    impl<'de> Visitor<'de> for SeqVisitor {
      type Value = Input;
      fn expecting(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "an input array [shadow, value, shadow value?]")
      }
      fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let _shadow = seq.next_element::<i32>()?;
        // An obscured shadow is [3, value, shadow]; when the value slot is empty
        // the shadow underneath is what the block sees.
        let mut input = Input::Empty;
        while let Some(slot) = seq.next_element::<Option<Slot>>()? {
          if let (Input::Empty, Some(slot)) = (&input, slot) {
            input = slot.into_input()?;
          }
        }
        Ok(input)
      }
    }
    de.deserialize_seq(SeqVisitor)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn parse(json: &str) -> Input {
    serde_json::from_str(json).unwrap()
  }

  #[test]
  fn literals_follow_their_kind() {
    assert_eq!(parse(r#"[1, [4, "10"]]"#), Input::Literal(Value::Number(10.)));
    assert_eq!(parse(r#"[1, [5, ""]]"#), Input::Literal(Value::from("")));
    assert_eq!(parse(r#"[1, [10, "10"]]"#), Input::Literal(Value::from("10")));
  }

  #[test]
  fn references_are_distinguished_by_shape() {
    assert_eq!(parse(r#"[2, "abc"]"#), Input::Block(format!("abc")));
    assert_eq!(parse(r#"[3, "abc", [4, "0"]]"#), Input::Block(format!("abc")));
    assert_eq!(
      parse(r#"[3, [12, "score", "v1"], [10, ""]]"#),
      Input::Variable(VariableRef { name: format!("score"), id: format!("v1") })
    );
    assert_eq!(
      parse(r#"[1, [13, "items", "l1"]]"#),
      Input::List(ListRef { name: format!("items"), id: format!("l1") })
    );
  }

  #[test]
  fn empty_slots_fall_back_to_the_shadow() {
    assert_eq!(parse(r#"[2, null]"#), Input::Empty);
    assert_eq!(parse(r#"[3, null, [4, "7"]]"#), Input::Literal(Value::Number(7.)));
  }
}
