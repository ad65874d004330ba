use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::cancel::CancelScope;
use crate::error::RuntimeError;
use crate::event::{Handler, Subscription};
use crate::script::Context;
use crate::value::Value;

/// A block in statement position: performs a side effect, may suspend.
pub trait Action: Send + Sync + fmt::Debug {
  fn opcode(&self) -> &'static str;

  fn execute<'a>(
    &'a self,
    ctx: &'a Context,
    scope: &'a CancelScope,
  ) -> BoxFuture<'a, Result<(), RuntimeError>>;
}

/// A block in expression position.
pub trait Reporter: Send + Sync + fmt::Debug {
  fn opcode(&self) -> &'static str;

  fn report(&self, ctx: &Context) -> Value;

  /// Subscribes to "the reported value may have changed".
  fn subscribe(&self, _handler: Handler) -> Subscription {
    Subscription::empty()
  }
}

/// A boolean-producing reporter, the only kind a condition slot accepts.
pub trait Predicate: Send + Sync + fmt::Debug {
  fn opcode(&self) -> &'static str;

  fn test(&self, ctx: &Context) -> bool;

  fn subscribe(&self, _handler: Handler) -> Subscription {
    Subscription::empty()
  }
}

/// What a reporter factory produces.
#[derive(Debug, Clone)]
pub enum ReporterBlock {
  Value(Arc<dyn Reporter>),
  Predicate(Arc<dyn Predicate>),
}

impl ReporterBlock {
  pub fn opcode(&self) -> &'static str {
    match self {
      ReporterBlock::Value(reporter) => reporter.opcode(),
      ReporterBlock::Predicate(predicate) => predicate.opcode(),
    }
  }

  pub fn into_operand(self) -> Operand {
    match self {
      ReporterBlock::Value(reporter) => Operand::Reporter(reporter),
      ReporterBlock::Predicate(predicate) => {
        Operand::Reporter(Arc::new(PredicateValue(predicate)))
      }
    }
  }
}

/// A predicate dropped into a value slot reports `True`/`False`.
#[derive(Debug)]
struct PredicateValue(Arc<dyn Predicate>);

impl Reporter for PredicateValue {
  fn opcode(&self) -> &'static str {
    self.0.opcode()
  }

  fn report(&self, ctx: &Context) -> Value {
    Value::Boolean(self.0.test(ctx))
  }

  fn subscribe(&self, handler: Handler) -> Subscription {
    self.0.subscribe(handler)
  }
}

/// A value input: a literal fixed at construction or a reporter evaluated on
/// every read.
#[derive(Debug, Clone)]
pub enum Operand {
  Constant(Value),
  Reporter(Arc<dyn Reporter>),
}

impl Operand {
  pub fn evaluate(&self, ctx: &Context) -> Value {
    match self {
      Operand::Constant(value) => value.clone(),
      Operand::Reporter(reporter) => reporter.report(ctx),
    }
  }

  pub fn subscribe(&self, handler: Handler) -> Subscription {
    match self {
      Operand::Constant(_) => Subscription::empty(),
      Operand::Reporter(reporter) => reporter.subscribe(handler),
    }
  }
}

impl From<Value> for Operand {
  fn from(value: Value) -> Self {
    Operand::Constant(value)
  }
}

/// A boolean input. An empty slot is false.
#[derive(Debug, Clone, Default)]
pub struct Condition(Option<Arc<dyn Predicate>>);

impl Condition {
  pub fn new(predicate: Arc<dyn Predicate>) -> Self {
    Self(Some(predicate))
  }

  pub fn empty() -> Self {
    Self(None)
  }

  pub fn test(&self, ctx: &Context) -> bool {
    self.0.as_ref().map_or(false, |predicate| predicate.test(ctx))
  }

  pub fn subscribe(&self, handler: Handler) -> Subscription {
    match &self.0 {
      Some(predicate) => predicate.subscribe(handler),
      None => Subscription::empty(),
    }
  }
}
