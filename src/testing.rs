//! Fixtures shared by the unit tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use parking_lot::Mutex;

use crate::block::{Action, Condition, Predicate};
use crate::cancel::CancelScope;
use crate::data::{List, Variable};
use crate::error::RuntimeError;
use crate::event::{ChangeEvent, Handler, Subscription};
use crate::project::Config;
use crate::script::Context;
use crate::services::Services;
use crate::target::Target;
use crate::value::Value;

/// A stage with a global `g` and a list `items`, and a running sprite with a
/// local `n`.
pub fn context() -> Context {
  let stage = Target::new("Stage", true)
    .with_variable(Variable::new("global", "g", Value::Number(0.)))
    .with_list(List::new("list", "items", Vec::new()));
  let sprite = Arc::new(
    Target::new("Sprite1", false).with_variable(Variable::new("v1", "n", Value::Number(0.))),
  );
  let config = Config::default();
  let services = Services::new(&config);
  Context {
    figure: sprite.clone(),
    figures: vec![Arc::new(stage), sprite].into(),
    services,
    config: Arc::new(config),
  }
}

/// Hands out blocks that log their label when they run.
#[derive(Debug, Clone, Default)]
pub struct Recorder {
  seen: Arc<Mutex<Vec<String>>>,
}

#[derive(Debug)]
struct Record {
  label: Option<String>,
  seen: Arc<Mutex<Vec<String>>>,
  cancel: Option<(CancelScope, usize)>,
  runs: AtomicUsize,
}

impl Action for Record {
  fn opcode(&self) -> &'static str {
    "test_record"
  }

  fn execute<'a>(
    &'a self,
    _ctx: &'a Context,
    _scope: &'a CancelScope,
  ) -> BoxFuture<'a, Result<(), RuntimeError>> {
    async move {
      if let Some(label) = &self.label {
        self.seen.lock().push(label.clone());
      }
      let runs = self.runs.fetch_add(1, Ordering::SeqCst) + 1;
      if let Some((scope, after)) = &self.cancel {
        if runs >= *after {
          scope.cancel();
        }
      }
      Ok(())
    }
    .boxed()
  }
}

impl Recorder {
  pub fn new() -> Self {
    Self::default()
  }

  fn record(&self, label: Option<&str>, cancel: Option<(CancelScope, usize)>) -> Arc<dyn Action> {
    Arc::new(Record {
      label: label.map(String::from),
      seen: self.seen.clone(),
      cancel,
      runs: AtomicUsize::new(0),
    })
  }

  pub fn block(&self, label: &str) -> Arc<dyn Action> {
    self.record(Some(label), None)
  }

  /// Records, then cancels `scope`.
  pub fn cancelling_block(&self, label: &str, scope: CancelScope) -> Arc<dyn Action> {
    self.record(Some(label), Some((scope, 1)))
  }

  /// Records nothing; cancels `scope` on its `runs`-th execution.
  pub fn cancel_after(&self, runs: usize, scope: CancelScope) -> Arc<dyn Action> {
    self.record(None, Some((scope, runs)))
  }

  pub fn seen(&self) -> Vec<String> {
    self.seen.lock().clone()
  }
}

#[derive(Debug)]
struct FlagPredicate {
  value: AtomicBool,
  changed: ChangeEvent,
  subscriptions: AtomicUsize,
}

impl Predicate for FlagPredicate {
  fn opcode(&self) -> &'static str {
    "test_flag"
  }

  fn test(&self, _ctx: &Context) -> bool {
    self.value.load(Ordering::SeqCst)
  }

  fn subscribe(&self, handler: Handler) -> Subscription {
    self.subscriptions.fetch_add(1, Ordering::SeqCst);
    self.changed.subscribe(handler)
  }
}

/// A boolean the test flips by hand, observable as a condition.
#[derive(Debug, Clone)]
pub struct Flag(Arc<FlagPredicate>);

impl Flag {
  pub fn new(value: bool) -> Self {
    Self(Arc::new(FlagPredicate {
      value: AtomicBool::new(value),
      changed: ChangeEvent::new(),
      subscriptions: AtomicUsize::new(0),
    }))
  }

  pub fn condition(&self) -> Condition {
    Condition::new(self.0.clone())
  }

  pub fn set(&self, value: bool) {
    self.0.value.store(value, Ordering::SeqCst);
    self.0.changed.raise();
  }

  pub fn subscriber_count(&self) -> usize {
    self.0.changed.subscriber_count()
  }

  pub fn subscriptions_made(&self) -> usize {
    self.0.subscriptions.load(Ordering::SeqCst)
  }
}
