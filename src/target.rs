use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::data::{List, Variable};
use crate::event::ChangeEvent;
use crate::script::ScriptExecutor;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
  pub x: f64,
  pub y: f64,
  pub direction: f64,
}

impl Default for Pose {
  fn default() -> Self {
    Self { x: 0., y: 0., direction: 90. }
  }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AudioSettings {
  pub volume: f64,
  pub pitch: f64,
  pub pan: f64,
}

impl Default for AudioSettings {
  fn default() -> Self {
    Self { volume: 100., pitch: 0., pan: 0. }
  }
}

/// A sprite or the stage: owns variables, lists and the scripts running on it.
#[derive(Debug)]
pub struct Target {
  pub name: String,
  pub is_stage: bool,
  variables: HashMap<String, Arc<Variable>>,
  lists: HashMap<String, Arc<List>>,
  sounds: Vec<String>,
  pose: Mutex<Pose>,
  moved: ChangeEvent,
  audio: Mutex<AudioSettings>,
  audio_changed: ChangeEvent,
  executor: ScriptExecutor,
}

impl Target {
  pub fn new(name: impl Into<String>, is_stage: bool) -> Self {
    Self {
      name: name.into(),
      is_stage,
      variables: HashMap::new(),
      lists: HashMap::new(),
      sounds: Vec::new(),
      pose: Mutex::new(Pose::default()),
      moved: ChangeEvent::new(),
      audio: Mutex::new(AudioSettings::default()),
      audio_changed: ChangeEvent::new(),
      executor: ScriptExecutor::default(),
    }
  }

  pub fn with_variable(mut self, variable: Variable) -> Self {
    self.variables.insert(variable.id.clone(), Arc::new(variable));
    self
  }

  pub fn with_list(mut self, list: List) -> Self {
    self.lists.insert(list.id.clone(), Arc::new(list));
    self
  }

  pub fn with_sound(mut self, name: impl Into<String>) -> Self {
    self.sounds.push(name.into());
    self
  }

  pub fn with_pose(self, pose: Pose) -> Self {
    *self.pose.lock() = pose;
    self
  }

  pub fn with_volume(self, volume: f64) -> Self {
    self.audio.lock().volume = volume;
    self
  }

  /// Looks a variable up by id, then by name.
  pub fn variable(&self, id: &str, name: &str) -> Option<Arc<Variable>> {
    self.variable_by_id(id).or_else(|| self.variable_named(name))
  }

  pub fn variable_by_id(&self, id: &str) -> Option<Arc<Variable>> {
    self.variables.get(id).cloned()
  }

  pub fn variable_named(&self, name: &str) -> Option<Arc<Variable>> {
    self.variables.values().find(|variable| variable.name == name).cloned()
  }

  pub fn list(&self, id: &str, name: &str) -> Option<Arc<List>> {
    self.list_by_id(id).or_else(|| self.list_named(name))
  }

  pub fn list_by_id(&self, id: &str) -> Option<Arc<List>> {
    self.lists.get(id).cloned()
  }

  pub fn list_named(&self, name: &str) -> Option<Arc<List>> {
    self.lists.values().find(|list| list.name == name).cloned()
  }

  pub fn sounds(&self) -> &[String] {
    &self.sounds
  }

  pub fn pose(&self) -> Pose {
    *self.pose.lock()
  }

  pub fn set_pose(&self, pose: Pose) {
    *self.pose.lock() = pose;
    self.moved.raise();
  }

  pub fn moved(&self) -> &ChangeEvent {
    &self.moved
  }

  pub fn audio(&self) -> AudioSettings {
    *self.audio.lock()
  }

  pub fn update_audio(&self, update: impl FnOnce(&mut AudioSettings)) {
    {
      let mut audio = self.audio.lock();
      update(&mut *audio);
    }
    self.audio_changed.raise();
  }

  pub fn audio_changed(&self) -> &ChangeEvent {
    &self.audio_changed
  }

  pub fn executor(&self) -> &ScriptExecutor {
    &self.executor
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::value::Value;

  #[test]
  fn variables_resolve_by_id_then_name() {
    let target = Target::new("Sprite1", false)
      .with_variable(Variable::new("v1", "score", Value::Number(1.)));
    assert!(target.variable("v1", "other").is_some());
    assert!(target.variable("stale-id", "score").is_some());
    assert!(target.variable("v2", "lives").is_none());
  }

  #[test]
  fn moving_raises_moved() {
    let target = Target::new("Sprite1", false);
    let hits = Arc::new(Mutex::new(0));
    let seen = hits.clone();
    let _subscription = target.moved().subscribe(Arc::new(move || *seen.lock() += 1));
    target.set_pose(Pose { x: 10., ..target.pose() });
    assert_eq!(*hits.lock(), 1);
    assert_eq!(target.pose().x, 10.);
  }
}
