use std::any::Any;
use std::mem;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use log::{error, trace};
use parking_lot::Mutex;

use crate::block::Action;
use crate::cancel::CancelScope;
use crate::error::{RuntimeError, SubstackError};
use crate::script::Context;

#[derive(Debug)]
enum State {
  Editable(Vec<Arc<dyn Action>>),
  Frozen(Arc<[Arc<dyn Action>]>),
}

/// An ordered list of action blocks. Editable until it is executed for the
/// first time; substacks built from a graph start out frozen.
#[derive(Debug)]
pub struct Substack {
  state: Mutex<State>,
}

impl Default for Substack {
  fn default() -> Self {
    Self::new()
  }
}

impl Substack {
  pub fn new() -> Self {
    Self { state: Mutex::new(State::Editable(Vec::new())) }
  }

  pub fn frozen(blocks: Vec<Arc<dyn Action>>) -> Self {
    Self { state: Mutex::new(State::Frozen(blocks.into())) }
  }

  pub fn push(&self, block: Arc<dyn Action>) -> Result<(), SubstackError> {
    match &mut *self.state.lock() {
      State::Editable(blocks) => {
        blocks.push(block);
        Ok(())
      }
      State::Frozen(_) => Err(SubstackError::NotEditable),
    }
  }

  pub fn insert(&self, index: usize, block: Arc<dyn Action>) -> Result<(), SubstackError> {
    match &mut *self.state.lock() {
      State::Editable(blocks) if index <= blocks.len() => {
        blocks.insert(index, block);
        Ok(())
      }
      State::Editable(blocks) => Err(SubstackError::OutOfBounds { index, len: blocks.len() }),
      State::Frozen(_) => Err(SubstackError::NotEditable),
    }
  }

  pub fn remove(&self, index: usize) -> Result<Arc<dyn Action>, SubstackError> {
    match &mut *self.state.lock() {
      State::Editable(blocks) if index < blocks.len() => Ok(blocks.remove(index)),
      State::Editable(blocks) => Err(SubstackError::OutOfBounds { index, len: blocks.len() }),
      State::Frozen(_) => Err(SubstackError::NotEditable),
    }
  }

  /// Freezes the substack (if it is not already) and returns its blocks.
  pub fn freeze(&self) -> Arc<[Arc<dyn Action>]> {
    let mut state = self.state.lock();
    let blocks: Arc<[Arc<dyn Action>]> = match &mut *state {
      State::Frozen(blocks) => return blocks.clone(),
      State::Editable(blocks) => mem::take(blocks).into(),
    };
    *state = State::Frozen(blocks.clone());
    blocks
  }

  pub fn is_frozen(&self) -> bool {
    matches!(&*self.state.lock(), State::Frozen(_))
  }

  pub fn len(&self) -> usize {
    match &*self.state.lock() {
      State::Editable(blocks) => blocks.len(),
      State::Frozen(blocks) => blocks.len(),
    }
  }

  pub fn is_empty(&self) -> bool {
    self.len() == 0
  }

  pub fn opcodes(&self) -> Vec<&'static str> {
    match &*self.state.lock() {
      State::Editable(blocks) => blocks.iter().map(|block| block.opcode()).collect(),
      State::Frozen(blocks) => blocks.iter().map(|block| block.opcode()).collect(),
    }
  }

  /// Runs every block in order. A failing block is logged and the next one
  /// runs; a cancelled scope stops the run after the current block.
  pub async fn execute(&self, ctx: &Context, scope: &CancelScope) {
    let blocks = self.freeze();
    for block in blocks.iter() {
      if scope.is_cancelled() {
        trace!("cancelled before {}", block.opcode());
        break;
      }
      let outcome = AssertUnwindSafe(block.execute(ctx, scope))
        .catch_unwind()
        .await
        .unwrap_or_else(|panic| Err(RuntimeError::Panicked(panic_message(panic))));
      if let Err(err) = outcome {
        error!("[{}] {}: {err}", ctx.figure.name, block.opcode());
      }
    }
  }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
  match panic.downcast::<String>() {
    Ok(message) => *message,
    Err(panic) => match panic.downcast::<&'static str>() {
      Ok(message) => message.to_string(),
      Err(_) => "unknown panic".to_string(),
    },
  }
}
