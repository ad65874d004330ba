use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;
use tokio::task::JoinHandle;

use crate::cancel::CancelScope;
use crate::data::{List, ListRef, Variable, VariableRef};
use crate::project::Config;
use crate::services::Services;
use crate::substack::Substack;
use crate::target::Target;

/// Everything a block may read while it runs. Mutable state lives in the
/// targets, never here.
#[derive(Debug, Clone)]
pub struct Context {
  pub figure: Arc<Target>,
  pub figures: Arc<[Arc<Target>]>,
  pub services: Services,
  pub config: Arc<Config>,
}

impl Context {
  pub fn stage(&self) -> Option<&Arc<Target>> {
    self.figures.iter().find(|figure| figure.is_stage)
  }

  /// By id on the sprite, then the stage; by name only when no id matches.
  pub fn variable(&self, variable: &VariableRef) -> Option<Arc<Variable>> {
    let stage = self.stage();
    self
      .figure
      .variable_by_id(&variable.id)
      .or_else(|| stage.and_then(|stage| stage.variable_by_id(&variable.id)))
      .or_else(|| self.figure.variable_named(&variable.name))
      .or_else(|| stage.and_then(|stage| stage.variable_named(&variable.name)))
  }

  pub fn list(&self, list: &ListRef) -> Option<Arc<List>> {
    let stage = self.stage();
    self
      .figure
      .list_by_id(&list.id)
      .or_else(|| stage.and_then(|stage| stage.list_by_id(&list.id)))
      .or_else(|| self.figure.list_named(&list.name))
      .or_else(|| stage.and_then(|stage| stage.list_named(&list.name)))
  }
}

/// A top-level script: the hat block id and the body that follows it.
#[derive(Debug, Clone)]
pub struct Script {
  pub hat: String,
  pub body: Arc<Substack>,
}

#[derive(Debug)]
struct ActiveScript {
  id: u64,
  scope: CancelScope,
}

/// Tracks the scripts running on one target, each with its own scope.
#[derive(Debug, Default)]
pub struct ScriptExecutor {
  next_id: AtomicU64,
  active: Arc<Mutex<Vec<ActiveScript>>>,
}

/// Removes a script from its executor when dropped, however the script ends.
struct Registration {
  id: u64,
  active: Arc<Mutex<Vec<ActiveScript>>>,
}

impl Drop for Registration {
  fn drop(&mut self) {
    self.active.lock().retain(|script| script.id != self.id);
  }
}

impl ScriptExecutor {
  fn register(&self) -> (CancelScope, Registration) {
    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
    let scope = CancelScope::new();
    self.active.lock().push(ActiveScript { id, scope: scope.clone() });
    (scope, Registration { id, active: self.active.clone() })
  }

  /// Spawns `body` as an independent task with a fresh scope.
  pub fn start(&self, ctx: Context, body: Arc<Substack>) -> JoinHandle<()> {
    let (scope, registration) = self.register();
    tokio::spawn(async move {
      let _registration = registration;
      body.execute(&ctx, &scope).await;
      debug!("[{}] script finished", ctx.figure.name);
    })
  }

  pub fn active_scopes(&self) -> Vec<CancelScope> {
    self.active.lock().iter().map(|script| script.scope.clone()).collect()
  }

  pub fn active_count(&self) -> usize {
    self.active.lock().len()
  }

  pub fn stop_all(&self) {
    for scope in self.active_scopes() {
      scope.cancel();
    }
  }

  /// Stops every script except the one running under `caller`.
  pub fn stop_others(&self, caller: &CancelScope) {
    for scope in self.active_scopes() {
      if !scope.same(caller) {
        scope.cancel();
      }
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::{context, Recorder};

  #[tokio::test]
  async fn finished_scripts_deregister() {
    let ctx = context();
    let recorder = Recorder::new();
    let body = Arc::new(Substack::frozen(vec![recorder.block("only")]));
    ctx.figure.executor().start(ctx.clone(), body).await.unwrap();
    assert_eq!(ctx.figure.executor().active_count(), 0);
    assert_eq!(recorder.seen(), vec!["only"]);
  }

  #[test]
  fn ids_win_over_colliding_names() {
    use crate::value::Value;

    let mut ctx = context();
    let stage = ctx.stage().cloned().unwrap();
    let sprite = Arc::new(
      Target::new("Sprite1", false)
        .with_variable(Variable::new("local-id", "g", Value::from("local")))
        .with_list(List::new("local-list", "items", vec![Value::from("mine")])),
    );
    ctx.figures = vec![stage, sprite.clone()].into();
    ctx.figure = sprite;

    let global = VariableRef { name: "g".to_string(), id: "global".to_string() };
    assert_eq!(ctx.variable(&global).unwrap().id, "global");
    let local = VariableRef { name: "g".to_string(), id: "local-id".to_string() };
    assert_eq!(ctx.variable(&local).unwrap().get(), Value::from("local"));
    let stale = VariableRef { name: "g".to_string(), id: "gone".to_string() };
    assert_eq!(ctx.variable(&stale).unwrap().id, "local-id");

    let list = ListRef { name: "items".to_string(), id: "list".to_string() };
    assert_eq!(ctx.list(&list).unwrap().id, "list");
  }

  #[test]
  fn stop_others_spares_the_caller() {
    let ctx = context();
    let executor = ctx.figure.executor();
    let (first, _first) = executor.register();
    let (second, _second) = executor.register();
    executor.stop_others(&first);
    assert!(!first.is_cancelled());
    assert!(second.is_cancelled());
    executor.stop_all();
    assert!(first.is_cancelled());
  }
}
