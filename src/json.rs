use std::collections::HashMap;
use std::fmt;
use std::fmt::Formatter;

use log::{debug, warn};
use serde::de::{SeqAccess, Visitor};
use serde::{Deserialize, Deserializer};

use crate::data::{ListDecl, VariableDecl};
use crate::input::Input;
use crate::value::Value;

#[derive(Debug, Deserialize)]
pub struct Project {
  pub targets: Vec<Target>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
  pub is_stage: bool,
  pub name: String,
  #[serde(default)]
  pub variables: HashMap<String, VariableDecl>,
  #[serde(default)]
  pub lists: HashMap<String, ListDecl>,
  #[serde(default)]
  pub blocks: BlockGraph,
  #[serde(default)]
  pub sounds: Vec<Sound>,
  #[serde(default = "default_volume")]
  pub volume: f64,
  #[serde(default = "default_f64")]
  pub x: f64,
  #[serde(default = "default_f64")]
  pub y: f64,
  #[serde(default = "default_direction")]
  pub direction: f64,
}

fn default_volume() -> f64 {
  100.
}

fn default_f64() -> f64 {
  0.
}

fn default_direction() -> f64 {
  90.
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Sound {
  pub name: String,
  #[serde(default)]
  pub md5ext: Option<String>,
}

/// One node of the block dictionary.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockNode {
  pub opcode: String,
  #[serde(default)]
  pub next: Option<String>,
  #[serde(default)]
  pub parent: Option<String>,
  #[serde(default)]
  pub inputs: HashMap<String, Input>,
  #[serde(default)]
  pub fields: HashMap<String, Field>,
  #[serde(default)]
  pub shadow: bool,
  #[serde(default)]
  pub top_level: bool,
}

/// `[value, id?]` entry of a block's `fields` map.
#[derive(Debug, Clone, PartialEq)]
pub struct Field {
  pub value: String,
  pub id: Option<String>,
}

impl<'de> Deserialize<'de> for Field {
  fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
    struct FieldVisitor;
    impl<'de> Visitor<'de> for FieldVisitor {
      type Value = Field;
      fn expecting(&self, f: &mut Formatter) -> fmt::Result {
        write!(f, "a field array [value, id?]")
      }
      fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<Self::Value, A::Error> {
        let value = seq.next_element::<Value>()?.unwrap_or_default().to_string();
        let id = seq.next_element::<Option<String>>()?.flatten();
        while seq.next_element::<serde_json::Value>()?.is_some() {}
        Ok(Field { value, id })
      }
    }
    de.deserialize_seq(FieldVisitor)
  }
}

/// The block dictionary of one stage object, keyed by block id.
#[derive(Debug, Default)]
pub struct BlockGraph {
  nodes: HashMap<String, BlockNode>,
}

impl BlockGraph {
  pub fn new(nodes: HashMap<String, BlockNode>) -> Self {
    Self { nodes }
  }

  pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
    serde_json::from_str(json)
  }

  pub fn get(&self, id: &str) -> Option<&BlockNode> {
    self.nodes.get(id)
  }

  pub fn len(&self) -> usize {
    self.nodes.len()
  }

  pub fn is_empty(&self) -> bool {
    self.nodes.is_empty()
  }

  /// Ids of top-level blocks with the given op-code, in id order.
  pub fn top_level(&self, opcode: &str) -> Vec<&str> {
    let mut ids: Vec<&str> = self
      .nodes
      .iter()
      .filter(|(_, node)| node.top_level && node.opcode == opcode)
      .map(|(id, _)| id.as_str())
      .collect();
    ids.sort_unstable();
    ids
  }
}

impl<'de> Deserialize<'de> for BlockGraph {
  fn deserialize<D: Deserializer<'de>>(de: D) -> Result<Self, D::Error> {
    let raw = HashMap::<String, serde_json::Value>::deserialize(de)?;
    let mut nodes = HashMap::with_capacity(raw.len());
    for (id, entry) in raw {
      if entry.is_array() {
        // Loose variable or list reporters lying on the workspace.
        debug!("skipping loose primitive `{id}`");
        continue;
      }
      match serde_json::from_value::<BlockNode>(entry) {
        Ok(node) => {
          nodes.insert(id, node);
        }
        Err(err) => warn!("skipping malformed block `{id}`: {err}"),
      }
    }
    Ok(Self { nodes })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn parses_nodes_and_skips_junk() {
    let graph = BlockGraph::from_json(
      r#"{
        "a": {"opcode": "event_whenflagclicked", "next": "b", "topLevel": true},
        "b": {"opcode": "control_stop", "fields": {"STOP_OPTION": ["all", null]}},
        "c": [12, "score", "v1", 10, 20],
        "d": {"inputs": {}}
      }"#,
    )
    .unwrap();
    assert_eq!(graph.len(), 2);
    assert_eq!(graph.top_level("event_whenflagclicked"), vec!["a"]);
    let stop = graph.get("b").unwrap();
    assert_eq!(stop.fields["STOP_OPTION"], Field { value: format!("all"), id: None });
    assert_eq!(graph.get("a").unwrap().next.as_deref(), Some("b"));
  }

  #[test]
  fn parses_targets() {
    let project: Project = serde_json::from_str(
      r#"{"targets": [{
        "isStage": true, "name": "Stage",
        "variables": {"v1": ["score", 0], "v2": ["cloud", 1, true]},
        "lists": {"l1": ["items", ["a", 2]]}
      }]}"#,
    )
    .unwrap();
    let stage = &project.targets[0];
    assert_eq!(stage.variables["v2"].value, Value::Number(1.));
    assert_eq!(stage.lists["l1"].1, vec![Value::from("a"), Value::Number(2.)]);
    assert_eq!(stage.volume, 100.);
  }
}
