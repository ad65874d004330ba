use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::FutureExt;
use log::warn;
use tokio::sync::Notify;

use super::round_half_up;
use crate::block::{Action, Condition, Operand};
use crate::builder::GraphBuilder;
use crate::cancel::CancelScope;
use crate::error::{BuildError, RegistryError, RuntimeError};
use crate::registry::{BlockSpec, Registries};
use crate::script::Context;
use crate::substack::Substack;

pub fn register(registries: &mut Registries) -> Result<(), RegistryError> {
  let actions = &mut registries.actions;
  actions.register(&["control_if", "control_if_else"], build_if)?;
  actions.register(&["control_repeat"], build_repeat)?;
  actions.register(&["control_forever"], build_forever)?;
  actions.register(&["control_repeat_until"], build_repeat_until)?;
  actions.register(&["control_wait"], build_wait)?;
  actions.register(&["control_wait_until"], build_wait_until)?;
  actions.register(&["control_stop"], build_stop)?;
  Ok(())
}

#[derive(Debug)]
struct If {
  opcode: &'static str,
  condition: Condition,
  then: Arc<Substack>,
  otherwise: Option<Arc<Substack>>,
}

fn build_if(builder: &GraphBuilder, spec: &BlockSpec) -> Result<Arc<dyn Action>, BuildError> {
  let otherwise = match spec.opcode {
    "control_if_else" => Some(builder.substack_input(spec, "SUBSTACK2")?),
    _ => None,
  };
  Ok(Arc::new(If {
    opcode: spec.opcode,
    condition: builder.condition(spec, "CONDITION")?,
    then: builder.substack_input(spec, "SUBSTACK")?,
    otherwise,
  }))
}

impl Action for If {
  fn opcode(&self) -> &'static str {
    self.opcode
  }

  fn execute<'a>(
    &'a self,
    ctx: &'a Context,
    scope: &'a CancelScope,
  ) -> BoxFuture<'a, Result<(), RuntimeError>> {
    async move {
      if self.condition.test(ctx) {
        self.then.execute(ctx, scope).await;
      } else if let Some(otherwise) = &self.otherwise {
        otherwise.execute(ctx, scope).await;
      }
      Ok(())
    }
    .boxed()
  }
}

/// Number of iterations for a repeat count: negatives run nothing and
/// fractions round to the nearest whole number.
pub(crate) fn iteration_count(count: f64) -> u64 {
  if count < 0. {
    warn!("repeat count {count} is negative, skipping the loop");
    return 0;
  }
  let rounded = round_half_up(count);
  if rounded != count {
    warn!("repeat count {count} rounded to {rounded}");
  }
  rounded as u64
}

#[derive(Debug)]
struct Repeat {
  times: Operand,
  body: Arc<Substack>,
}

fn build_repeat(builder: &GraphBuilder, spec: &BlockSpec) -> Result<Arc<dyn Action>, BuildError> {
  Ok(Arc::new(Repeat {
    times: builder.operand(spec, "TIMES")?,
    body: builder.substack_input(spec, "SUBSTACK")?,
  }))
}

impl Action for Repeat {
  fn opcode(&self) -> &'static str {
    "control_repeat"
  }

  fn execute<'a>(
    &'a self,
    ctx: &'a Context,
    scope: &'a CancelScope,
  ) -> BoxFuture<'a, Result<(), RuntimeError>> {
    async move {
      let times = iteration_count(self.times.evaluate(ctx).to_number());
      for _ in 0..times {
        if scope.is_cancelled() {
          break;
        }
        self.body.execute(ctx, scope).await;
        tokio::task::yield_now().await;
      }
      Ok(())
    }
    .boxed()
  }
}

#[derive(Debug)]
struct Forever {
  body: Arc<Substack>,
}

fn build_forever(builder: &GraphBuilder, spec: &BlockSpec) -> Result<Arc<dyn Action>, BuildError> {
  Ok(Arc::new(Forever { body: builder.substack_input(spec, "SUBSTACK")? }))
}

impl Action for Forever {
  fn opcode(&self) -> &'static str {
    "control_forever"
  }

  fn execute<'a>(
    &'a self,
    ctx: &'a Context,
    scope: &'a CancelScope,
  ) -> BoxFuture<'a, Result<(), RuntimeError>> {
    async move {
      while !scope.is_cancelled() {
        self.body.execute(ctx, scope).await;
        tokio::task::yield_now().await;
      }
      Ok(())
    }
    .boxed()
  }
}

#[derive(Debug)]
struct RepeatUntil {
  condition: Condition,
  body: Arc<Substack>,
}

fn build_repeat_until(
  builder: &GraphBuilder,
  spec: &BlockSpec,
) -> Result<Arc<dyn Action>, BuildError> {
  Ok(Arc::new(RepeatUntil {
    condition: builder.condition(spec, "CONDITION")?,
    body: builder.substack_input(spec, "SUBSTACK")?,
  }))
}

impl Action for RepeatUntil {
  fn opcode(&self) -> &'static str {
    "control_repeat_until"
  }

  fn execute<'a>(
    &'a self,
    ctx: &'a Context,
    scope: &'a CancelScope,
  ) -> BoxFuture<'a, Result<(), RuntimeError>> {
    async move {
      while !scope.is_cancelled() && !self.condition.test(ctx) {
        self.body.execute(ctx, scope).await;
        tokio::task::yield_now().await;
      }
      Ok(())
    }
    .boxed()
  }
}

#[derive(Debug)]
struct Wait {
  duration: Operand,
}

fn build_wait(builder: &GraphBuilder, spec: &BlockSpec) -> Result<Arc<dyn Action>, BuildError> {
  Ok(Arc::new(Wait { duration: builder.operand(spec, "DURATION")? }))
}

impl Action for Wait {
  fn opcode(&self) -> &'static str {
    "control_wait"
  }

  fn execute<'a>(
    &'a self,
    ctx: &'a Context,
    scope: &'a CancelScope,
  ) -> BoxFuture<'a, Result<(), RuntimeError>> {
    async move {
      let seconds = self.duration.evaluate(ctx).to_number();
      if seconds < 0. {
        warn!("[{}] cannot wait {seconds} seconds", ctx.figure.name);
        return Ok(());
      }
      match Duration::try_from_secs_f64(seconds) {
        Ok(duration) => tokio::select! {
          _ = tokio::time::sleep(duration) => {}
          _ = scope.cancelled() => {}
        },
        Err(_) => scope.cancelled().await,
      }
      Ok(())
    }
    .boxed()
  }
}

#[derive(Debug)]
struct WaitUntil {
  condition: Condition,
}

fn build_wait_until(
  builder: &GraphBuilder,
  spec: &BlockSpec,
) -> Result<Arc<dyn Action>, BuildError> {
  Ok(Arc::new(WaitUntil { condition: builder.condition(spec, "CONDITION")? }))
}

impl Action for WaitUntil {
  fn opcode(&self) -> &'static str {
    "control_wait_until"
  }

  fn execute<'a>(
    &'a self,
    ctx: &'a Context,
    scope: &'a CancelScope,
  ) -> BoxFuture<'a, Result<(), RuntimeError>> {
    async move {
      if self.condition.test(ctx) {
        return Ok(());
      }
      let wake = Arc::new(Notify::new());
      let waker = wake.clone();
      // Held until this block returns, on every path.
      let _subscription = self.condition.subscribe(Arc::new(move || waker.notify_one()));
      // Re-test: the value may have changed before the subscription existed.
      while !self.condition.test(ctx) {
        tokio::select! {
          _ = wake.notified() => {}
          _ = scope.cancelled() => break,
        }
      }
      Ok(())
    }
    .boxed()
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum StopOption {
  All,
  ThisScript,
  OtherScripts,
}

#[derive(Debug)]
struct Stop {
  option: StopOption,
}

fn build_stop(builder: &GraphBuilder, spec: &BlockSpec) -> Result<Arc<dyn Action>, BuildError> {
  let field = builder.field(spec, "STOP_OPTION")?;
  let option = match field.value.as_str() {
    "all" => StopOption::All,
    "this script" => StopOption::ThisScript,
    "other scripts in sprite" | "other scripts in stage" => StopOption::OtherScripts,
    other => {
      return Err(BuildError::UnsupportedField {
        id: spec.id.to_string(),
        field: "STOP_OPTION",
        value: other.to_string(),
      })
    }
  };
  Ok(Arc::new(Stop { option }))
}

impl Action for Stop {
  fn opcode(&self) -> &'static str {
    "control_stop"
  }

  fn execute<'a>(
    &'a self,
    ctx: &'a Context,
    scope: &'a CancelScope,
  ) -> BoxFuture<'a, Result<(), RuntimeError>> {
    async move {
      match self.option {
        StopOption::ThisScript => scope.cancel(),
        StopOption::OtherScripts => ctx.figure.executor().stop_others(scope),
        StopOption::All => {
          for figure in ctx.figures.iter() {
            figure.executor().stop_all();
          }
          scope.cancel();
        }
      }
      Ok(())
    }
    .boxed()
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::testing::{context, Flag, Recorder};
  use crate::value::Value;
  use std::time::Instant;

  fn repeat(times: f64, recorder: &Recorder) -> Repeat {
    Repeat {
      times: Operand::Constant(Value::Number(times)),
      body: Arc::new(Substack::frozen(vec![recorder.block("body")])),
    }
  }

  #[test]
  fn repeat_counts_round_half_up() {
    assert_eq!(iteration_count(3.), 3);
    assert_eq!(iteration_count(-1.), 0);
    assert_eq!(iteration_count(2.6), 3);
    assert_eq!(iteration_count(2.5), 3);
    assert_eq!(iteration_count(2.4), 2);
  }

  #[tokio::test]
  async fn repeat_runs_its_body_count_times() {
    for (times, expected) in [(3., 3), (-1., 0), (2.6, 3)] {
      let recorder = Recorder::new();
      let block = repeat(times, &recorder);
      block.execute(&context(), &CancelScope::new()).await.unwrap();
      assert_eq!(recorder.seen().len(), expected, "repeat {times}");
    }
  }

  #[tokio::test]
  async fn cancelled_repeat_stops_early() {
    let recorder = Recorder::new();
    let scope = CancelScope::new();
    let block = Repeat {
      times: Operand::Constant(Value::Number(10.)),
      body: Arc::new(Substack::frozen(vec![
        recorder.block("body"),
        recorder.cancelling_block("stop", scope.clone()),
      ])),
    };
    block.execute(&context(), &scope).await.unwrap();
    assert_eq!(recorder.seen(), vec!["body", "stop"]);
  }

  #[tokio::test]
  async fn if_else_picks_a_branch() {
    let recorder = Recorder::new();
    let flag = Flag::new(false);
    let block = If {
      opcode: "control_if_else",
      condition: flag.condition(),
      then: Arc::new(Substack::frozen(vec![recorder.block("then")])),
      otherwise: Some(Arc::new(Substack::frozen(vec![recorder.block("else")]))),
    };
    let ctx = context();
    block.execute(&ctx, &CancelScope::new()).await.unwrap();
    flag.set(true);
    block.execute(&ctx, &CancelScope::new()).await.unwrap();
    assert_eq!(recorder.seen(), vec!["else", "then"]);
  }

  #[tokio::test]
  async fn repeat_until_checks_before_each_iteration() {
    let recorder = Recorder::new();
    let flag = Flag::new(true);
    let block = RepeatUntil {
      condition: flag.condition(),
      body: Arc::new(Substack::frozen(vec![recorder.block("body")])),
    };
    block.execute(&context(), &CancelScope::new()).await.unwrap();
    assert!(recorder.seen().is_empty());
  }

  #[tokio::test]
  async fn forever_runs_until_cancelled() {
    let recorder = Recorder::new();
    let scope = CancelScope::new();
    let block = Forever {
      body: Arc::new(Substack::frozen(vec![
        recorder.block("body"),
        recorder.cancel_after(3, scope.clone()),
      ])),
    };
    block.execute(&context(), &scope).await.unwrap();
    assert_eq!(recorder.seen().len(), 3);
  }

  #[tokio::test]
  async fn wait_until_true_does_not_subscribe() {
    let flag = Flag::new(true);
    let block = WaitUntil { condition: flag.condition() };
    block.execute(&context(), &CancelScope::new()).await.unwrap();
    assert_eq!(flag.subscriptions_made(), 0);
    assert_eq!(flag.subscriber_count(), 0);
  }

  #[tokio::test]
  async fn wait_until_resumes_on_change_and_unsubscribes() {
    let flag = Flag::new(false);
    let block = Arc::new(WaitUntil { condition: flag.condition() });
    let ctx = context();
    let waiting = {
      let block = block.clone();
      tokio::spawn(async move {
        let scope = CancelScope::new();
        let finished = block.execute(&ctx, &scope).await;
        finished
      })
    };
    while flag.subscriber_count() == 0 {
      tokio::task::yield_now().await;
    }
    assert!(!waiting.is_finished());
    flag.set(true);
    tokio::time::timeout(Duration::from_secs(1), waiting).await.unwrap().unwrap().unwrap();
    assert_eq!(flag.subscriber_count(), 0);
  }

  #[tokio::test]
  async fn wait_until_releases_on_cancel() {
    let flag = Flag::new(false);
    let block = Arc::new(WaitUntil { condition: flag.condition() });
    let scope = CancelScope::new();
    let ctx = context();
    let waiting = {
      let (block, scope) = (block.clone(), scope.clone());
      tokio::spawn(async move {
        let finished = block.execute(&ctx, &scope).await;
        finished
      })
    };
    while flag.subscriber_count() == 0 {
      tokio::task::yield_now().await;
    }
    scope.cancel();
    tokio::time::timeout(Duration::from_secs(1), waiting).await.unwrap().unwrap().unwrap();
    assert_eq!(flag.subscriber_count(), 0);
  }

  #[tokio::test]
  async fn timed_wait_ends_early_on_cancel() {
    let scope = CancelScope::new();
    let block = Wait { duration: Operand::Constant(Value::Number(30.)) };
    let started = Instant::now();
    let canceller = scope.clone();
    tokio::spawn(async move {
      tokio::time::sleep(Duration::from_millis(20)).await;
      canceller.cancel();
    });
    block.execute(&context(), &scope).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(5));
  }

  #[tokio::test]
  async fn negative_wait_is_a_no_op() {
    let block = Wait { duration: Operand::Constant(Value::Number(-5.)) };
    let started = Instant::now();
    block.execute(&context(), &CancelScope::new()).await.unwrap();
    assert!(started.elapsed() < Duration::from_secs(1));
  }

  #[tokio::test]
  async fn stop_this_script_only_cancels_the_caller() {
    let ctx = context();
    let sibling = ctx.figure.executor().start(ctx.clone(), Arc::new(Substack::frozen(vec![
      Arc::new(Forever { body: Arc::new(Substack::new()) }) as Arc<dyn Action>,
    ])));
    let scope = CancelScope::new();
    Stop { option: StopOption::ThisScript }.execute(&ctx, &scope).await.unwrap();
    assert!(scope.is_cancelled());
    assert!(ctx.figure.executor().active_scopes().iter().all(|s| !s.is_cancelled()));
    ctx.figure.executor().stop_all();
    sibling.await.unwrap();
  }
}
