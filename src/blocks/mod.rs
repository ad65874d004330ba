//! The block catalog. Each module registers the op-codes it implements.

pub mod control;
pub mod data;
pub mod motion;
pub mod operator;
pub mod sensing;
pub mod sound;

use crate::error::RegistryError;
use crate::registry::Registries;

pub fn register(registries: &mut Registries) -> Result<(), RegistryError> {
  control::register(registries)?;
  data::register(registries)?;
  operator::register(registries)?;
  motion::register(registries)?;
  sound::register(registries)?;
  sensing::register(registries)?;
  Ok(())
}

/// Rounds halves toward positive infinity.
pub(crate) fn round_half_up(number: f64) -> f64 {
  (number + 0.5).floor()
}
