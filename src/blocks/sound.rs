use std::sync::Arc;

use futures::future::BoxFuture;
use futures::FutureExt;
use log::warn;

use crate::block::{Action, Operand, Reporter, ReporterBlock};
use crate::builder::GraphBuilder;
use crate::cancel::CancelScope;
use crate::error::{BuildError, RegistryError, RuntimeError};
use crate::event::{Handler, Relay, Subscription};
use crate::registry::{BlockSpec, Registries};
use crate::script::Context;
use crate::target::{AudioSettings, Target};
use crate::value::Value;

pub fn register(registries: &mut Registries) -> Result<(), RegistryError> {
  let actions = &mut registries.actions;
  actions.register(&["sound_play", "sound_playuntildone"], build_play)?;
  actions.register(
    &[
      "sound_setvolumeto",
      "sound_changevolumeby",
      "sound_seteffectto",
      "sound_changeeffectby",
    ],
    build_adjust,
  )?;
  actions.register(&["sound_cleareffects"], build_clear_effects)?;

  let reporters = &mut registries.reporters;
  reporters.register(&["sound_volume"], build_volume)?;
  reporters.register(&["sound_sounds_menu"], build_sounds_menu)?;
  Ok(())
}

/// Finds a sound by name, or by a 1-based index that wraps around.
fn resolve_sound<'t>(figure: &'t Target, sound: &Value) -> Option<&'t str> {
  let sounds = figure.sounds();
  let name = sound.to_string();
  if let Some(found) = sounds.iter().find(|candidate| **candidate == name) {
    return Some(found.as_str());
  }
  if sounds.is_empty() {
    return None;
  }
  let number = sound.as_number().filter(|number| number.is_finite())?;
  let index = (super::round_half_up(number) as i64 - 1).rem_euclid(sounds.len() as i64);
  sounds.get(index as usize).map(String::as_str)
}

#[derive(Debug)]
struct Play {
  until_done: bool,
  sound: Operand,
}

fn build_play(builder: &GraphBuilder, spec: &BlockSpec) -> Result<Arc<dyn Action>, BuildError> {
  Ok(Arc::new(Play {
    until_done: spec.opcode == "sound_playuntildone",
    sound: builder.operand(spec, "SOUND_MENU")?,
  }))
}

impl Action for Play {
  fn opcode(&self) -> &'static str {
    if self.until_done {
      "sound_playuntildone"
    } else {
      "sound_play"
    }
  }

  fn execute<'a>(
    &'a self,
    ctx: &'a Context,
    scope: &'a CancelScope,
  ) -> BoxFuture<'a, Result<(), RuntimeError>> {
    async move {
      let sound = self.sound.evaluate(ctx);
      let Some(name) = resolve_sound(&ctx.figure, &sound) else {
        warn!("[{}] no sound `{sound}`", ctx.figure.name);
        return Ok(());
      };
      let playback = ctx.services.sound.play(&ctx.figure, name, ctx.figure.audio());
      if self.until_done {
        tokio::select! {
          _ = playback => {}
          _ = scope.cancelled() => {}
        }
      } else {
        tokio::spawn(playback);
      }
      Ok(())
    }
    .boxed()
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Setting {
  Volume,
  Pitch,
  Pan,
}

impl Setting {
  fn adjust(self, audio: &mut AudioSettings, amount: f64, relative: bool) {
    let (slot, low, high) = match self {
      Setting::Volume => (&mut audio.volume, 0., 100.),
      Setting::Pitch => (&mut audio.pitch, -360., 360.),
      Setting::Pan => (&mut audio.pan, -100., 100.),
    };
    let target = if relative { *slot + amount } else { amount };
    *slot = target.clamp(low, high);
  }
}

#[derive(Debug)]
struct Adjust {
  opcode: &'static str,
  setting: Setting,
  relative: bool,
  amount: Operand,
}

fn build_adjust(builder: &GraphBuilder, spec: &BlockSpec) -> Result<Arc<dyn Action>, BuildError> {
  let (setting, input) = match spec.opcode {
    "sound_setvolumeto" | "sound_changevolumeby" => (Setting::Volume, "VOLUME"),
    _ => {
      let field = builder.field(spec, "EFFECT")?;
      let setting = match field.value.to_uppercase().as_str() {
        "PITCH" => Setting::Pitch,
        "PAN" => Setting::Pan,
        _ => {
          return Err(BuildError::UnsupportedField {
            id: spec.id.to_string(),
            field: "EFFECT",
            value: field.value.clone(),
          })
        }
      };
      (setting, "VALUE")
    }
  };
  Ok(Arc::new(Adjust {
    opcode: spec.opcode,
    setting,
    relative: spec.opcode.starts_with("sound_change"),
    amount: builder.operand(spec, input)?,
  }))
}

impl Action for Adjust {
  fn opcode(&self) -> &'static str {
    self.opcode
  }

  fn execute<'a>(
    &'a self,
    ctx: &'a Context,
    _scope: &'a CancelScope,
  ) -> BoxFuture<'a, Result<(), RuntimeError>> {
    async move {
      let amount = self.amount.evaluate(ctx).to_number();
      ctx.figure.update_audio(|audio| self.setting.adjust(audio, amount, self.relative));
      Ok(())
    }
    .boxed()
  }
}

#[derive(Debug)]
struct ClearEffects;

fn build_clear_effects(_: &GraphBuilder, _: &BlockSpec) -> Result<Arc<dyn Action>, BuildError> {
  Ok(Arc::new(ClearEffects))
}

impl Action for ClearEffects {
  fn opcode(&self) -> &'static str {
    "sound_cleareffects"
  }

  fn execute<'a>(
    &'a self,
    ctx: &'a Context,
    _scope: &'a CancelScope,
  ) -> BoxFuture<'a, Result<(), RuntimeError>> {
    async move {
      ctx.figure.update_audio(|audio| {
        audio.pitch = 0.;
        audio.pan = 0.;
      });
      Ok(())
    }
    .boxed()
  }
}

#[derive(Debug, Default)]
struct Volume {
  relay: Relay,
}

fn build_volume(_: &GraphBuilder, _: &BlockSpec) -> Result<ReporterBlock, BuildError> {
  Ok(ReporterBlock::Value(Arc::new(Volume::default())))
}

impl Reporter for Volume {
  fn opcode(&self) -> &'static str {
    "sound_volume"
  }

  fn report(&self, ctx: &Context) -> Value {
    self.relay.forward_from(ctx.figure.audio_changed());
    Value::Number(ctx.figure.audio().volume)
  }

  fn subscribe(&self, handler: Handler) -> Subscription {
    self.relay.subscribe(handler)
  }
}

/// The sound picker shadow: reports the chosen sound's name.
#[derive(Debug)]
struct SoundsMenu {
  sound: String,
}

fn build_sounds_menu(
  builder: &GraphBuilder,
  spec: &BlockSpec,
) -> Result<ReporterBlock, BuildError> {
  let field = builder.field(spec, "SOUND_MENU")?;
  Ok(ReporterBlock::Value(Arc::new(SoundsMenu { sound: field.value.clone() })))
}

impl Reporter for SoundsMenu {
  fn opcode(&self) -> &'static str {
    "sound_sounds_menu"
  }

  fn report(&self, _: &Context) -> Value {
    Value::String(self.sound.clone())
  }
}
