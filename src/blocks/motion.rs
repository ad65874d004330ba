use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::block::{Action, Operand, Reporter, ReporterBlock};
use crate::builder::GraphBuilder;
use crate::cancel::CancelScope;
use crate::error::{BuildError, RegistryError, RuntimeError};
use crate::event::{Handler, Relay, Subscription};
use crate::registry::{BlockSpec, Registries};
use crate::script::Context;
use crate::value::Value;

pub fn register(registries: &mut Registries) -> Result<(), RegistryError> {
  let actions = &mut registries.actions;
  actions.register(
    &[
      "motion_gotoxy",
      "motion_setx",
      "motion_sety",
      "motion_changexby",
      "motion_changeyby",
      "motion_movesteps",
    ],
    build_move,
  )?;
  actions.register(
    &["motion_turnright", "motion_turnleft", "motion_pointindirection"],
    build_turn,
  )?;
  actions.register(&["motion_glidesecstoxy"], build_glide)?;

  registries.reporters.register(
    &["motion_xposition", "motion_yposition", "motion_direction"],
    build_position,
  )?;
  Ok(())
}

#[derive(Debug)]
enum Step {
  GoTo { x: Operand, y: Operand },
  SetX(Operand),
  SetY(Operand),
  ChangeX(Operand),
  ChangeY(Operand),
  Forward(Operand),
}

#[derive(Debug)]
struct Move {
  opcode: &'static str,
  step: Step,
}

fn build_move(builder: &GraphBuilder, spec: &BlockSpec) -> Result<Arc<dyn Action>, BuildError> {
  let step = match spec.opcode {
    "motion_gotoxy" => {
      Step::GoTo { x: builder.operand(spec, "X")?, y: builder.operand(spec, "Y")? }
    }
    "motion_setx" => Step::SetX(builder.operand(spec, "X")?),
    "motion_sety" => Step::SetY(builder.operand(spec, "Y")?),
    "motion_changexby" => Step::ChangeX(builder.operand(spec, "DX")?),
    "motion_changeyby" => Step::ChangeY(builder.operand(spec, "DY")?),
    _ => Step::Forward(builder.operand(spec, "STEPS")?),
  };
  Ok(Arc::new(Move { opcode: spec.opcode, step }))
}

impl Move {
  fn destination(&self, ctx: &Context) -> (f64, f64) {
    let pose = ctx.figure.pose();
    let number = |operand: &Operand| operand.evaluate(ctx).to_number();
    match &self.step {
      Step::GoTo { x, y } => (number(x), number(y)),
      Step::SetX(x) => (number(x), pose.y),
      Step::SetY(y) => (pose.x, number(y)),
      Step::ChangeX(dx) => (pose.x + number(dx), pose.y),
      Step::ChangeY(dy) => (pose.x, pose.y + number(dy)),
      // Direction 90 points along +x, 0 along +y.
      Step::Forward(steps) => {
        let steps = number(steps);
        let radians = (90. - pose.direction).to_radians();
        (pose.x + steps * radians.cos(), pose.y + steps * radians.sin())
      }
    }
  }
}

impl Action for Move {
  fn opcode(&self) -> &'static str {
    self.opcode
  }

  fn execute<'a>(
    &'a self,
    ctx: &'a Context,
    _scope: &'a CancelScope,
  ) -> BoxFuture<'a, Result<(), RuntimeError>> {
    async move {
      let (x, y) = self.destination(ctx);
      ctx.services.motion.move_to(&ctx.figure, x, y);
      Ok(())
    }
    .boxed()
  }
}

#[derive(Debug)]
struct Turn {
  opcode: &'static str,
  degrees: Operand,
}

fn build_turn(builder: &GraphBuilder, spec: &BlockSpec) -> Result<Arc<dyn Action>, BuildError> {
  let input = match spec.opcode {
    "motion_pointindirection" => "DIRECTION",
    _ => "DEGREES",
  };
  Ok(Arc::new(Turn { opcode: spec.opcode, degrees: builder.operand(spec, input)? }))
}

impl Action for Turn {
  fn opcode(&self) -> &'static str {
    self.opcode
  }

  fn execute<'a>(
    &'a self,
    ctx: &'a Context,
    _scope: &'a CancelScope,
  ) -> BoxFuture<'a, Result<(), RuntimeError>> {
    async move {
      let degrees = self.degrees.evaluate(ctx).to_number();
      let current = ctx.figure.pose().direction;
      let direction = match self.opcode {
        "motion_turnright" => current + degrees,
        "motion_turnleft" => current - degrees,
        _ => degrees,
      };
      ctx.services.motion.point_in_direction(&ctx.figure, direction);
      Ok(())
    }
    .boxed()
  }
}

#[derive(Debug)]
struct Glide {
  seconds: Operand,
  x: Operand,
  y: Operand,
}

fn build_glide(builder: &GraphBuilder, spec: &BlockSpec) -> Result<Arc<dyn Action>, BuildError> {
  Ok(Arc::new(Glide {
    seconds: builder.operand(spec, "SECS")?,
    x: builder.operand(spec, "X")?,
    y: builder.operand(spec, "Y")?,
  }))
}

impl Action for Glide {
  fn opcode(&self) -> &'static str {
    "motion_glidesecstoxy"
  }

  fn execute<'a>(
    &'a self,
    ctx: &'a Context,
    scope: &'a CancelScope,
  ) -> BoxFuture<'a, Result<(), RuntimeError>> {
    async move {
      let seconds = self.seconds.evaluate(ctx).to_number();
      let x = self.x.evaluate(ctx).to_number();
      let y = self.y.evaluate(ctx).to_number();
      // A cancelled glide stays where it got to.
      tokio::select! {
        _ = ctx.services.motion.glide_to(&ctx.figure, seconds, x, y) => {}
        _ = scope.cancelled() => {}
      }
      Ok(())
    }
    .boxed()
  }
}

#[derive(Debug)]
struct Position {
  opcode: &'static str,
  relay: Relay,
}

fn build_position(_: &GraphBuilder, spec: &BlockSpec) -> Result<ReporterBlock, BuildError> {
  Ok(ReporterBlock::Value(Arc::new(Position { opcode: spec.opcode, relay: Relay::new() })))
}

/// Hides floating point noise such as `6.1e-16` after a turn.
fn limit_precision(value: f64) -> f64 {
  let rounded = value.round();
  if (value - rounded).abs() < 1e-9 {
    rounded
  } else {
    value
  }
}

impl Reporter for Position {
  fn opcode(&self) -> &'static str {
    self.opcode
  }

  fn report(&self, ctx: &Context) -> Value {
    self.relay.forward_from(ctx.figure.moved());
    let pose = ctx.figure.pose();
    Value::Number(match self.opcode {
      "motion_xposition" => limit_precision(pose.x),
      "motion_yposition" => limit_precision(pose.y),
      _ => pose.direction,
    })
  }

  fn subscribe(&self, handler: Handler) -> Subscription {
    self.relay.subscribe(handler)
  }
}
