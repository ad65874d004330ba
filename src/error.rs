//! Error types, one enum per phase: registry configuration, graph
//! construction, execution and project loading.

use thiserror::Error;

/// Raised while the op-code tables are assembled. Always fatal.
#[derive(Debug, Error, PartialEq)]
pub enum RegistryError {
  #[error("op-code `{opcode}` is registered twice in the {table} table")]
  DuplicateOpcode { opcode: &'static str, table: &'static str },
}

/// Raised while turning a block graph into executable blocks. The builder logs
/// these and skips the offending block.
#[derive(Debug, Error)]
pub enum BuildError {
  #[error("block `{0}` does not exist")]
  MissingBlock(String),
  #[error("op-code `{opcode}` of block `{id}` is not a known {position}")]
  UnknownOpcode { id: String, opcode: String, position: &'static str },
  #[error("block `{id}` has no field `{field}`")]
  MissingField { id: String, field: &'static str },
  #[error("field `{field}` of block `{id}` has unsupported value `{value}`")]
  UnsupportedField { id: String, field: &'static str, value: String },
  #[error("input `{input}` of block `{id}` must be a boolean block")]
  ExpectedPredicate { id: String, input: &'static str },
  #[error("block nesting under `{0}` is too deep")]
  TooDeep(String),
}

/// Raised by a block while it runs. Caught at the substack boundary.
#[derive(Debug, Error)]
pub enum RuntimeError {
  #[error("variable `{name}` ({id}) not found")]
  MissingVariable { name: String, id: String },
  #[error("list `{name}` ({id}) not found")]
  MissingList { name: String, id: String },
  #[error("block panicked: {0}")]
  Panicked(String),
}

#[derive(Debug, Error, PartialEq)]
pub enum SubstackError {
  #[error("substack is frozen and no longer editable")]
  NotEditable,
  #[error("index {index} is out of bounds for a substack of {len} blocks")]
  OutOfBounds { index: usize, len: usize },
}

#[derive(Debug, Error)]
pub enum ProjectError {
  #[error("cannot read project: {0}")]
  Io(#[from] std::io::Error),
  #[error("malformed project.json: {0}")]
  Json(#[from] serde_json::Error),
  #[error("project has no stage target")]
  NoStage,
}
