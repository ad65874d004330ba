//! An interpreter for Scratch block graphs: rebuilds the scripts stored in a
//! `project.json` and runs them as cooperative tasks.

pub mod block;
pub mod blocks;
pub mod builder;
pub mod cancel;
pub mod data;
pub mod error;
pub mod event;
pub mod input;
pub mod json;
pub mod project;
pub mod registry;
pub mod script;
pub mod services;
pub mod substack;
pub mod target;
pub mod value;

#[cfg(test)]
mod testing;

pub use block::{Action, Condition, Operand, Predicate, Reporter, ReporterBlock};
pub use builder::GraphBuilder;
pub use cancel::CancelScope;
pub use error::{BuildError, ProjectError, RegistryError, RuntimeError, SubstackError};
pub use json::BlockGraph;
pub use project::{Config, Project};
pub use registry::Registries;
pub use script::{Context, Script, ScriptExecutor};
pub use services::Services;
pub use substack::Substack;
pub use target::Target;
pub use value::Value;
