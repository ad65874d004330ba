use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use log::debug;
use once_cell::sync::Lazy;

use crate::block::{Action, ReporterBlock};
use crate::blocks;
use crate::builder::GraphBuilder;
use crate::error::{BuildError, RegistryError};
use crate::json::BlockNode;

/// The node a factory is asked to build, with its op-code as registered.
#[derive(Debug, Clone, Copy)]
pub struct BlockSpec<'g> {
  pub id: &'g str,
  pub opcode: &'static str,
  pub node: &'g BlockNode,
}

pub type ActionFactory =
  fn(&GraphBuilder<'_>, &BlockSpec<'_>) -> Result<Arc<dyn Action>, BuildError>;
pub type ReporterFactory =
  fn(&GraphBuilder<'_>, &BlockSpec<'_>) -> Result<ReporterBlock, BuildError>;

pub struct Registry<F> {
  table: &'static str,
  entries: HashMap<&'static str, F>,
}

impl<F> fmt::Debug for Registry<F> {
  fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
    let mut opcodes: Vec<&str> = self.entries.keys().copied().collect();
    opcodes.sort_unstable();
    f.debug_struct("Registry").field("table", &self.table).field("opcodes", &opcodes).finish()
  }
}

impl<F: Copy> Registry<F> {
  pub fn new(table: &'static str) -> Self {
    Self { table, entries: HashMap::new() }
  }

  pub fn register(
    &mut self,
    opcodes: &[&'static str],
    factory: F,
  ) -> Result<(), RegistryError> {
    for &opcode in opcodes {
      if self.entries.insert(opcode, factory).is_some() {
        return Err(RegistryError::DuplicateOpcode { opcode, table: self.table });
      }
    }
    Ok(())
  }

  pub fn resolve(&self, opcode: &str) -> Option<(&'static str, F)> {
    self.entries.get_key_value(opcode).map(|(opcode, factory)| (*opcode, *factory))
  }

  pub fn contains(&self, opcode: &str) -> bool {
    self.entries.contains_key(opcode)
  }

  pub fn len(&self) -> usize {
    self.entries.len()
  }

  pub fn is_empty(&self) -> bool {
    self.entries.is_empty()
  }
}

/// Statement and expression tables. An op-code in one never satisfies a
/// lookup in the other.
#[derive(Debug)]
pub struct Registries {
  pub actions: Registry<ActionFactory>,
  pub reporters: Registry<ReporterFactory>,
}

static BUILTIN: Lazy<Registries> = Lazy::new(|| match Registries::builtin() {
  Ok(registries) => registries,
  Err(err) => panic!("block registry is misconfigured: {err}"),
});

impl Registries {
  pub fn empty() -> Self {
    Self { actions: Registry::new("action"), reporters: Registry::new("reporter") }
  }

  pub fn builtin() -> Result<Self, RegistryError> {
    let mut registries = Self::empty();
    blocks::register(&mut registries)?;
    debug!(
      "registered {} action and {} reporter op-codes",
      registries.actions.len(),
      registries.reporters.len()
    );
    Ok(registries)
  }

  /// The process-wide builtin tables, built on first use.
  pub fn global() -> &'static Registries {
    &BUILTIN
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn builtin_tables_are_disjoint_and_complete() {
    let registries = Registries::global();
    for opcode in ["control_if", "control_wait_until", "data_addtolist", "control_stop"] {
      assert!(registries.actions.contains(opcode), "{opcode}");
      assert!(!registries.reporters.contains(opcode), "{opcode}");
    }
    for opcode in ["operator_add", "operator_equals", "data_itemoflist", "data_variable"] {
      assert!(registries.reporters.contains(opcode), "{opcode}");
      assert!(registries.actions.resolve(opcode).is_none(), "{opcode}");
    }
  }

  #[test]
  fn duplicate_registration_fails() {
    let mut registries = Registries::empty();
    blocks::register(&mut registries).unwrap();
    let err = blocks::register(&mut registries).unwrap_err();
    assert!(matches!(err, RegistryError::DuplicateOpcode { .. }));
  }

  #[test]
  fn resolve_returns_the_static_opcode() {
    let (opcode, _) = Registries::global().reporters.resolve("operator_mod").unwrap();
    assert_eq!(opcode, "operator_mod");
  }
}
