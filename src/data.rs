//! Variables and lists owned by stage objects.
//!
//! Each read or write takes the item's own lock, so single operations are
//! atomic. Nothing spans several operations: "change by" is a read followed by
//! a write, and concurrent scripts race with last-writer-wins. All mutation
//! goes through the methods here.

use std::fmt;

use parking_lot::Mutex;
use serde::de::{Deserialize, Deserializer, Error, SeqAccess, Visitor};

use crate::event::ChangeEvent;
use crate::value::Value;

/// Largest number of items a list may hold.
pub const LIST_ITEM_LIMIT: usize = 200_000;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VariableRef {
  pub name: String,
  pub id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ListRef {
  pub name: String,
  pub id: String,
}

impl fmt::Display for VariableRef {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{} ({})", self.name, self.id)
  }
}

impl fmt::Display for ListRef {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    write!(f, "{} ({})", self.name, self.id)
  }
}

#[derive(Debug)]
pub struct Variable {
  pub name: String,
  pub id: String,
  value: Mutex<Value>,
  changed: ChangeEvent,
}

impl Variable {
  pub fn new(id: impl Into<String>, name: impl Into<String>, value: Value) -> Self {
    Self {
      name: name.into(),
      id: id.into(),
      value: Mutex::new(value),
      changed: ChangeEvent::new(),
    }
  }

  pub fn get(&self) -> Value {
    self.value.lock().clone()
  }

  pub fn set(&self, value: Value) {
    *self.value.lock() = value;
    self.changed.raise();
  }

  pub fn changed(&self) -> &ChangeEvent {
    &self.changed
  }
}

#[derive(Debug)]
pub struct List {
  pub name: String,
  pub id: String,
  items: Mutex<Vec<Value>>,
  changed: ChangeEvent,
}

impl List {
  pub fn new(id: impl Into<String>, name: impl Into<String>, items: Vec<Value>) -> Self {
    Self {
      name: name.into(),
      id: id.into(),
      items: Mutex::new(items),
      changed: ChangeEvent::new(),
    }
  }

  pub fn items(&self) -> Vec<Value> {
    self.items.lock().clone()
  }

  pub fn len(&self) -> usize {
    self.items.lock().len()
  }

  pub fn is_empty(&self) -> bool {
    self.items.lock().is_empty()
  }

  /// Item at a 1-based index.
  pub fn get(&self, index: usize) -> Option<Value> {
    let items = self.items.lock();
    index.checked_sub(1).and_then(|i| items.get(i)).cloned()
  }

  /// Returns false when the list is full.
  pub fn push(&self, value: Value, limit: usize) -> bool {
    {
      let mut items = self.items.lock();
      if items.len() >= limit {
        return false;
      }
      items.push(value);
    }
    self.changed.raise();
    true
  }

  /// Inserts before the 1-based `index`; `len + 1` appends.
  pub fn insert(&self, index: usize, value: Value, limit: usize) -> bool {
    {
      let mut items = self.items.lock();
      if items.len() >= limit || index == 0 || index > items.len() + 1 {
        return false;
      }
      items.insert(index - 1, value);
    }
    self.changed.raise();
    true
  }

  pub fn replace(&self, index: usize, value: Value) -> bool {
    {
      let mut items = self.items.lock();
      match index.checked_sub(1).and_then(|i| items.get_mut(i)) {
        Some(item) => *item = value,
        None => return false,
      }
    }
    self.changed.raise();
    true
  }

  pub fn remove(&self, index: usize) -> Option<Value> {
    let removed = {
      let mut items = self.items.lock();
      if index == 0 || index > items.len() {
        return None;
      }
      items.remove(index - 1)
    };
    self.changed.raise();
    Some(removed)
  }

  pub fn clear(&self) {
    self.items.lock().clear();
    self.changed.raise();
  }

  pub fn changed(&self) -> &ChangeEvent {
    &self.changed
  }

  /// The list rendered as one value: items joined by spaces, or with no
  /// separator when every item is a one-character string.
  pub fn contents(&self) -> String {
    let items = self.items.lock();
    let letters =
      items.iter().all(|item| matches!(item, Value::String(s) if s.chars().count() == 1));
    let strings: Vec<String> = items.iter().map(|item| item.to_string()).collect();
    strings.join(if letters { "" } else { " " })
  }
}

/// `[name, value]` pair as stored in project.json.
#[derive(Debug)]
pub struct VariableDecl {
  pub name: String,
  pub value: Value,
}

impl<'de> Deserialize<'de> for VariableDecl {
  fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
    struct DeclVisitor;
    impl<'de> Visitor<'de> for DeclVisitor {
      type Value = VariableDecl;
      fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "a [name, value] pair")
      }
      fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let name = seq.next_element()?.ok_or_else(|| A::Error::missing_field("name"))?;
        let value = seq.next_element()?.unwrap_or_default();
        // Cloud variables carry a trailing flag.
        while seq.next_element::<serde_json::Value>()?.is_some() {}
        Ok(VariableDecl { name, value })
      }
    }
    de.deserialize_seq(DeclVisitor)
  }
}

/// `[name, [items...]]` pair as stored in project.json.
#[derive(Debug, serde::Deserialize)]
pub struct ListDecl(pub String, pub Vec<Value>);

#[cfg(test)]
mod tests {
  use super::*;
  use std::sync::atomic::{AtomicUsize, Ordering};
  use std::sync::Arc;

  #[test]
  fn setting_a_variable_notifies() {
    let variable = Variable::new("v", "score", Value::Number(0.));
    let count = Arc::new(AtomicUsize::new(0));
    let seen = count.clone();
    let _subscription = variable.changed().subscribe(Arc::new(move || {
      seen.fetch_add(1, Ordering::SeqCst);
    }));
    variable.set(Value::Number(3.));
    assert_eq!(variable.get(), Value::Number(3.));
    assert_eq!(count.load(Ordering::SeqCst), 1);
  }

  #[test]
  fn list_indices_are_one_based() {
    let list = List::new("l", "things", vec![]);
    assert!(list.push(Value::from("a"), LIST_ITEM_LIMIT));
    assert!(list.push(Value::from("c"), LIST_ITEM_LIMIT));
    assert!(list.insert(2, Value::from("b"), LIST_ITEM_LIMIT));
    assert!(!list.insert(5, Value::from("z"), LIST_ITEM_LIMIT));
    assert_eq!(list.get(1), Some(Value::from("a")));
    assert_eq!(list.get(0), None);
    assert_eq!(list.contents(), "abc");
    assert_eq!(list.remove(1), Some(Value::from("a")));
    assert!(list.replace(2, Value::from("long")));
    assert_eq!(list.contents(), "b long");
  }

  #[test]
  fn only_single_letter_strings_drop_the_separator() {
    let digits = vec![Value::Number(1.), Value::Number(2.), Value::Number(3.)];
    let numbers = List::new("l", "digits", digits);
    assert_eq!(numbers.contents(), "1 2 3");
    let mixed = List::new("l", "mixed", vec![Value::from("a"), Value::Number(2.)]);
    assert_eq!(mixed.contents(), "a 2");
    let letters = List::new("l", "letters", vec![Value::from("a"), Value::from("2")]);
    assert_eq!(letters.contents(), "a2");
  }

  #[test]
  fn full_lists_reject_items() {
    let list = List::new("l", "things", vec![Value::Empty]);
    assert!(!list.push(Value::Empty, 1));
    assert_eq!(list.len(), 1);
  }
}
