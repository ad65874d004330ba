use std::sync::Arc;

use crate::block::{Reporter, ReporterBlock};
use crate::builder::GraphBuilder;
use crate::error::{BuildError, RegistryError};
use crate::event::{Handler, Relay, Subscription};
use crate::registry::{BlockSpec, Registries};
use crate::script::Context;
use crate::value::Value;

pub fn register(registries: &mut Registries) -> Result<(), RegistryError> {
  registries.reporters.register(&["sensing_mousex", "sensing_mousey"], build_mouse)?;
  Ok(())
}

/// Pointer coordinate, clamped to the stage.
#[derive(Debug)]
struct Mouse {
  opcode: &'static str,
  relay: Relay,
}

fn build_mouse(_: &GraphBuilder, spec: &BlockSpec) -> Result<ReporterBlock, BuildError> {
  Ok(ReporterBlock::Value(Arc::new(Mouse { opcode: spec.opcode, relay: Relay::new() })))
}

impl Reporter for Mouse {
  fn opcode(&self) -> &'static str {
    self.opcode
  }

  fn report(&self, ctx: &Context) -> Value {
    let pointer = &ctx.services.pointer;
    if let Some(moved) = pointer.moved() {
      self.relay.forward_from(moved);
    }
    let (x, y) = pointer.position();
    let (half_width, half_height) =
      (ctx.config.stage_width as f64 / 2., ctx.config.stage_height as f64 / 2.);
    Value::Number(match self.opcode {
      "sensing_mousex" => x.clamp(-half_width, half_width),
      _ => y.clamp(-half_height, half_height),
    })
  }

  fn subscribe(&self, handler: Handler) -> Subscription {
    self.relay.subscribe(handler)
  }
}
