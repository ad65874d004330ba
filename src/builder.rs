//! Turns a block dictionary into executable substacks.
//!
//! Construction failures are handled the same way everywhere: the failing
//! block is logged and skipped, and the chain continues with its `next`. A
//! missing `next` target or a `next` cycle ends the chain early. Only registry
//! misconfiguration is fatal, and that happens before any graph is read.

use std::cell::Cell;
use std::collections::HashSet;
use std::sync::Arc;

use log::{error, warn};

use crate::block::{Action, Condition, Operand, ReporterBlock};
use crate::blocks::data::{ListContents, VariableReporter};
use crate::data::{ListRef, VariableRef};
use crate::error::BuildError;
use crate::input::Input;
use crate::json::{BlockGraph, BlockNode, Field};
use crate::registry::{BlockSpec, Registries};
use crate::substack::Substack;
use crate::value::Value;

const MAX_DEPTH: usize = 256;

pub struct GraphBuilder<'g> {
  graph: &'g BlockGraph,
  registries: &'g Registries,
  depth: Cell<usize>,
}

impl<'g> GraphBuilder<'g> {
  pub fn new(graph: &'g BlockGraph) -> Self {
    Self::with_registries(graph, Registries::global())
  }

  pub fn with_registries(graph: &'g BlockGraph, registries: &'g Registries) -> Self {
    Self { graph, registries, depth: Cell::new(0) }
  }

  /// The body of the script whose hat block is `hat_id`.
  pub fn script(&self, hat_id: &str) -> Substack {
    match self.graph.get(hat_id) {
      Some(hat) => self.substack(hat.next.as_deref()),
      None => {
        warn!("script hat `{hat_id}` does not exist");
        Substack::frozen(Vec::new())
      }
    }
  }

  /// Follows `next` links from `start`, building every block it can.
  pub fn substack(&self, start: Option<&str>) -> Substack {
    let mut blocks = Vec::new();
    let mut seen = HashSet::new();
    let mut current = start;
    while let Some(id) = current {
      if !seen.insert(id) {
        error!("`next` chain loops back to block `{id}`");
        break;
      }
      let Some(node) = self.graph.get(id) else {
        warn!("{}", BuildError::MissingBlock(id.to_string()));
        break;
      };
      match self.action(id, node) {
        Ok(block) => blocks.push(block),
        Err(err) => error!("skipping block `{id}`: {err}"),
      }
      current = node.next.as_deref().filter(|next| !next.is_empty());
    }
    Substack::frozen(blocks)
  }

  fn action(&self, id: &str, node: &BlockNode) -> Result<Arc<dyn Action>, BuildError> {
    let (opcode, factory) =
      self.registries.actions.resolve(&node.opcode).ok_or_else(|| {
        BuildError::UnknownOpcode {
          id: id.to_string(),
          opcode: node.opcode.clone(),
          position: "statement",
        }
      })?;
    self.nested(id, || factory(self, &BlockSpec { id, opcode, node }))
  }

  pub fn reporter(&self, id: &str) -> Result<ReporterBlock, BuildError> {
    let node = self.graph.get(id).ok_or_else(|| BuildError::MissingBlock(id.to_string()))?;
    let (opcode, factory) =
      self.registries.reporters.resolve(&node.opcode).ok_or_else(|| {
        BuildError::UnknownOpcode {
          id: id.to_string(),
          opcode: node.opcode.clone(),
          position: "reporter",
        }
      })?;
    self.nested(id, || factory(self, &BlockSpec { id, opcode, node }))
  }

  fn nested<T>(
    &self,
    id: &str,
    build: impl FnOnce() -> Result<T, BuildError>,
  ) -> Result<T, BuildError> {
    let depth = self.depth.get();
    if depth >= MAX_DEPTH {
      return Err(BuildError::TooDeep(id.to_string()));
    }
    self.depth.set(depth + 1);
    let built = build();
    self.depth.set(depth);
    built
  }

  /// A value input. Missing or empty inputs read as Empty.
  pub fn operand(&self, spec: &BlockSpec, name: &str) -> Result<Operand, BuildError> {
    Ok(match spec.node.inputs.get(name) {
      None | Some(Input::Empty) => Operand::Constant(Value::Empty),
      Some(Input::Literal(value)) => Operand::Constant(value.clone()),
      Some(Input::Broadcast(broadcast)) => {
        Operand::Constant(Value::from(broadcast.name.as_str()))
      }
      Some(Input::Variable(variable)) => {
        Operand::Reporter(Arc::new(VariableReporter::new(variable.clone())))
      }
      Some(Input::List(list)) => Operand::Reporter(Arc::new(ListContents::new(list.clone()))),
      Some(Input::Block(id)) => self.reporter(id)?.into_operand(),
    })
  }

  /// A boolean input. Only predicate blocks fit; an empty slot is false.
  pub fn condition(
    &self,
    spec: &BlockSpec,
    name: &'static str,
  ) -> Result<Condition, BuildError> {
    let mismatch = || BuildError::ExpectedPredicate { id: spec.id.to_string(), input: name };
    match spec.node.inputs.get(name) {
      None | Some(Input::Empty) => Ok(Condition::empty()),
      Some(Input::Block(id)) => match self.reporter(id)? {
        ReporterBlock::Predicate(predicate) => Ok(Condition::new(predicate)),
        ReporterBlock::Value(_) => Err(mismatch()),
      },
      Some(_) => Err(mismatch()),
    }
  }

  /// A nested block list such as a loop body. Missing means empty.
  pub fn substack_input(
    &self,
    spec: &BlockSpec,
    name: &str,
  ) -> Result<Arc<Substack>, BuildError> {
    match spec.node.inputs.get(name) {
      Some(Input::Block(start)) => {
        self.nested(spec.id, || Ok(Arc::new(self.substack(Some(start.as_str())))))
      }
      None | Some(Input::Empty) => Ok(Arc::new(Substack::frozen(Vec::new()))),
      Some(other) => {
        warn!("block `{}` has a non-block `{name}` input {other:?}", spec.id);
        Ok(Arc::new(Substack::frozen(Vec::new())))
      }
    }
  }

  pub fn field<'s>(
    &self,
    spec: &BlockSpec<'s>,
    name: &'static str,
  ) -> Result<&'s Field, BuildError> {
    spec
      .node
      .fields
      .get(name)
      .ok_or_else(|| BuildError::MissingField { id: spec.id.to_string(), field: name })
  }

  pub fn variable_field(
    &self,
    spec: &BlockSpec,
    name: &'static str,
  ) -> Result<VariableRef, BuildError> {
    let field = self.field(spec, name)?;
    Ok(VariableRef { name: field.value.clone(), id: field.id.clone().unwrap_or_default() })
  }

  pub fn list_field(
    &self,
    spec: &BlockSpec,
    name: &'static str,
  ) -> Result<ListRef, BuildError> {
    let field = self.field(spec, name)?;
    Ok(ListRef { name: field.value.clone(), id: field.id.clone().unwrap_or_default() })
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  const SCRIPT: &str = r#"{
    "hat": {"opcode": "event_whenflagclicked", "next": "set", "topLevel": true},
    "set": {
      "opcode": "data_setvariableto", "next": "loop",
      "inputs": {"VALUE": [1, [10, "0"]]},
      "fields": {"VARIABLE": ["n", "v1"]}
    },
    "loop": {
      "opcode": "control_repeat", "next": "bogus",
      "inputs": {"TIMES": [1, [6, "3"]], "SUBSTACK": [2, "change"]}
    },
    "change": {
      "opcode": "data_changevariableby",
      "inputs": {"VALUE": [3, "sum", [4, "1"]]},
      "fields": {"VARIABLE": ["n", "v1"]}
    },
    "sum": {
      "opcode": "operator_add",
      "inputs": {"NUM1": [1, [4, "1"]], "NUM2": [3, [12, "n", "v1"], [4, ""]]}
    },
    "bogus": {"opcode": "looks_nonexistent", "next": "wait"},
    "wait": {"opcode": "control_wait", "next": "gone", "inputs": {"DURATION": [1, [5, "0"]]}}
  }"#;

  fn opcodes(substack: &Substack) -> Vec<&'static str> {
    substack.opcodes()
  }

  #[test]
  fn unknown_blocks_are_skipped_and_dangling_next_ends_the_chain() {
    let graph = BlockGraph::from_json(SCRIPT).unwrap();
    let script = GraphBuilder::new(&graph).script("hat");
    assert_eq!(opcodes(&script), vec!["data_setvariableto", "control_repeat", "control_wait"]);
    assert!(script.is_frozen());
  }

  #[test]
  fn building_twice_is_deterministic() {
    let graph = BlockGraph::from_json(SCRIPT).unwrap();
    let first = GraphBuilder::new(&graph).script("hat");
    let second = GraphBuilder::new(&graph).script("hat");
    assert_eq!(first.len(), second.len());
    assert_eq!(opcodes(&first), opcodes(&second));
  }

  #[test]
  fn value_reporters_do_not_fit_condition_slots() {
    let graph = BlockGraph::from_json(
      r#"{
        "if": {"opcode": "control_if", "next": "stop", "inputs": {"CONDITION": [2, "sum"]}},
        "sum": {"opcode": "operator_add", "inputs": {}},
        "stop": {"opcode": "control_stop", "fields": {"STOP_OPTION": ["this script", null]}}
      }"#,
    )
    .unwrap();
    let substack = GraphBuilder::new(&graph).substack(Some("if"));
    assert_eq!(opcodes(&substack), vec!["control_stop"]);
  }

  #[test]
  fn next_cycles_terminate() {
    let graph = BlockGraph::from_json(
      r#"{
        "a": {"opcode": "control_wait", "next": "b"},
        "b": {"opcode": "control_wait", "next": "a"}
      }"#,
    )
    .unwrap();
    assert_eq!(GraphBuilder::new(&graph).substack(Some("a")).len(), 2);
  }

  #[test]
  fn reporter_cycles_are_rejected() {
    let graph = BlockGraph::from_json(
      r#"{
        "say": {"opcode": "data_setvariableto", "inputs": {"VALUE": [3, "x", [10, ""]]},
                "fields": {"VARIABLE": ["n", "v1"]}},
        "x": {"opcode": "operator_join", "inputs": {"STRING1": [3, "y", [10, ""]]}},
        "y": {"opcode": "operator_join", "inputs": {"STRING1": [3, "x", [10, ""]]}}
      }"#,
    )
    .unwrap();
    assert!(GraphBuilder::new(&graph).substack(Some("say")).is_empty());
  }
}
