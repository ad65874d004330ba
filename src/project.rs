use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use log::{info, warn};
use tokio::task::JoinHandle;

use crate::builder::GraphBuilder;
use crate::data::{List, Variable, LIST_ITEM_LIMIT};
use crate::error::ProjectError;
use crate::json;
use crate::script::{Context, Script};
use crate::services::Services;
use crate::target::{Pose, Target};

pub const GREEN_FLAG: &str = "event_whenflagclicked";

#[derive(Debug, Clone)]
pub struct Config {
  pub stage_width: u32,
  pub stage_height: u32,
  pub frame_rate: u32,
  pub list_item_limit: usize,
}

impl Default for Config {
  fn default() -> Self {
    Self { stage_width: 480, stage_height: 360, frame_rate: 30, list_item_limit: LIST_ITEM_LIMIT }
  }
}

/// A loaded program: its stage objects and their green-flag scripts.
#[derive(Debug)]
pub struct Project {
  pub config: Arc<Config>,
  pub figures: Arc<[Arc<Target>]>,
  scripts: Vec<(Arc<Target>, Script)>,
}

impl Project {
  /// Loads an extracted `project.json`.
  pub fn load(path: impl AsRef<Path>, config: Config) -> Result<Project, ProjectError> {
    let json_project: json::Project =
      serde_json::from_reader(BufReader::new(File::open(path)?))?;
    Project::from_targets(json_project.targets, config)
  }

  pub fn from_json(source: &str, config: Config) -> Result<Project, ProjectError> {
    let json_project: json::Project = serde_json::from_str(source)?;
    Project::from_targets(json_project.targets, config)
  }

  pub fn from_targets(
    json_targets: Vec<json::Target>,
    config: Config,
  ) -> Result<Project, ProjectError> {
    if !json_targets.iter().any(|target| target.is_stage) {
      return Err(ProjectError::NoStage);
    }
    let mut figures = Vec::with_capacity(json_targets.len());
    let mut scripts = Vec::new();
    for json_target in &json_targets {
      let figure = Arc::new(load_target(json_target));
      let builder = GraphBuilder::new(&json_target.blocks);
      for hat in json_target.blocks.top_level(GREEN_FLAG) {
        let body = Arc::new(builder.script(hat));
        scripts.push((figure.clone(), Script { hat: hat.to_string(), body }));
      }
      figures.push(figure);
    }
    info!("loaded {} targets with {} green-flag scripts", figures.len(), scripts.len());
    Ok(Project { config: Arc::new(config), figures: figures.into(), scripts })
  }

  pub fn figure(&self, name: &str) -> Option<&Arc<Target>> {
    self.figures.iter().find(|figure| figure.name == name)
  }

  pub fn scripts(&self) -> impl Iterator<Item = (&Arc<Target>, &Script)> {
    self.scripts.iter().map(|(figure, script)| (figure, script))
  }

  pub fn context(&self, figure: Arc<Target>, services: Services) -> Context {
    Context {
      figure,
      figures: self.figures.clone(),
      services,
      config: self.config.clone(),
    }
  }

  /// Starts every green-flag script as its own task.
  pub fn green_flag(&self, services: &Services) -> Vec<JoinHandle<()>> {
    self
      .scripts
      .iter()
      .map(|(figure, script)| {
        let ctx = self.context(figure.clone(), services.clone());
        figure.executor().start(ctx, script.body.clone())
      })
      .collect()
  }

  /// Cancels every running script on every target.
  pub fn stop_all(&self) {
    for figure in self.figures.iter() {
      figure.executor().stop_all();
    }
  }
}

fn load_target(json_target: &json::Target) -> Target {
  let mut target = Target::new(json_target.name.clone(), json_target.is_stage)
    .with_volume(json_target.volume)
    .with_pose(Pose { x: json_target.x, y: json_target.y, direction: json_target.direction });
  for (id, variable) in &json_target.variables {
    target = target.with_variable(Variable::new(id, &variable.name, variable.value.clone()));
  }
  for (id, list) in &json_target.lists {
    target = target.with_list(List::new(id, &list.0, list.1.clone()));
  }
  for sound in &json_target.sounds {
    if sound.md5ext.is_none() {
      warn!("[{}] sound `{}` has no asset", json_target.name, sound.name);
    }
    target = target.with_sound(sound.name.clone());
  }
  target
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn projects_need_a_stage() {
    let err = Project::from_json(
      r#"{"targets": [{"isStage": false, "name": "Sprite1"}]}"#,
      Config::default(),
    )
    .unwrap_err();
    assert!(matches!(err, ProjectError::NoStage));
  }

  #[test]
  fn green_flag_scripts_are_collected() {
    let project = Project::from_json(
      r#"{"targets": [
        {"isStage": true, "name": "Stage", "variables": {"g": ["global", 1]}},
        {"isStage": false, "name": "Cat", "x": 10, "blocks": {
          "hat": {"opcode": "event_whenflagclicked", "next": "go", "topLevel": true},
          "go": {"opcode": "motion_gotoxy", "inputs": {"X": [1, [4, "1"]], "Y": [1, [4, "2"]]}},
          "loose": {"opcode": "control_wait", "topLevel": true}
        }}
      ]}"#,
      Config::default(),
    )
    .unwrap();
    let scripts: Vec<_> = project.scripts().collect();
    assert_eq!(scripts.len(), 1);
    assert_eq!(scripts[0].0.name, "Cat");
    assert_eq!(scripts[0].1.body.opcodes(), vec!["motion_gotoxy"]);
    assert_eq!(project.figure("Cat").unwrap().pose().x, 10.);
  }
}
