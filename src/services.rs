//! Collaborators the interpreter calls for side effects it does not own.

use std::sync::Arc;
use std::time::Duration;

use derivative::Derivative;
use futures::future::BoxFuture;
use futures::FutureExt;
use log::{debug, info};
use parking_lot::Mutex;
use tokio::time::Instant;

use crate::event::ChangeEvent;
use crate::project::Config;
use crate::target::{AudioSettings, Pose, Target};

pub trait Motion: Send + Sync {
  fn move_to(&self, figure: &Target, x: f64, y: f64);

  fn point_in_direction(&self, figure: &Target, direction: f64);

  /// Moves over time; resolves on arrival.
  fn glide_to<'a>(
    &'a self,
    figure: &'a Target,
    seconds: f64,
    x: f64,
    y: f64,
  ) -> BoxFuture<'a, ()>;
}

pub trait Sound: Send + Sync {
  /// Starts playback. The returned future resolves when the sound ends.
  fn play(&self, figure: &Target, sound: &str, settings: AudioSettings) -> BoxFuture<'static, ()>;
}

pub trait Pointer: Send + Sync {
  fn position(&self) -> (f64, f64);

  fn moved(&self) -> Option<&ChangeEvent> {
    None
  }
}

/// Keeps the pose on the target itself and glides one step per frame.
#[derive(Debug, Clone)]
pub struct PoseMotion {
  frame: Duration,
}

impl PoseMotion {
  pub fn new(frame_rate: u32) -> Self {
    Self { frame: Duration::from_secs(1) / frame_rate.max(1) }
  }
}

/// Normalizes a direction into (-180, 180].
pub fn wrap_direction(direction: f64) -> f64 {
  (direction + 179.).rem_euclid(360.) - 179.
}

impl Motion for PoseMotion {
  fn move_to(&self, figure: &Target, x: f64, y: f64) {
    if !(x.is_finite() && y.is_finite()) {
      debug!("ignoring move of {} to ({x}, {y})", figure.name);
      return;
    }
    figure.set_pose(Pose { x, y, ..figure.pose() });
  }

  fn point_in_direction(&self, figure: &Target, direction: f64) {
    if direction.is_finite() {
      figure.set_pose(Pose { direction: wrap_direction(direction), ..figure.pose() });
    }
  }

  fn glide_to<'a>(
    &'a self,
    figure: &'a Target,
    seconds: f64,
    x: f64,
    y: f64,
  ) -> BoxFuture<'a, ()> {
    async move {
      let start = figure.pose();
      let total = Duration::try_from_secs_f64(seconds.max(0.)).unwrap_or(Duration::MAX);
      let began = Instant::now();
      while !total.is_zero() {
        tokio::time::sleep(self.frame).await;
        let progress = began.elapsed().as_secs_f64() / total.as_secs_f64();
        if progress >= 1. {
          break;
        }
        self.move_to(
          figure,
          start.x + (x - start.x) * progress,
          start.y + (y - start.y) * progress,
        );
      }
      self.move_to(figure, x, y);
    }
    .boxed()
  }
}

/// Logs instead of playing.
#[derive(Debug, Clone, Default)]
pub struct SilentSound;

impl Sound for SilentSound {
  fn play(&self, figure: &Target, sound: &str, settings: AudioSettings) -> BoxFuture<'static, ()> {
    info!(
      "[{}] play `{sound}` at volume {} (pitch {}, pan {})",
      figure.name, settings.volume, settings.pitch, settings.pan
    );
    async {}.boxed()
  }
}

/// A pointer position set by the host, with a change notification.
#[derive(Debug, Default)]
pub struct PointerState {
  position: Mutex<(f64, f64)>,
  moved: ChangeEvent,
}

impl PointerState {
  pub fn set(&self, x: f64, y: f64) {
    *self.position.lock() = (x, y);
    self.moved.raise();
  }
}

impl Pointer for PointerState {
  fn position(&self) -> (f64, f64) {
    *self.position.lock()
  }

  fn moved(&self) -> Option<&ChangeEvent> {
    Some(&self.moved)
  }
}

#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct Services {
  #[derivative(Debug = "ignore")]
  pub motion: Arc<dyn Motion>,
  #[derivative(Debug = "ignore")]
  pub sound: Arc<dyn Sound>,
  #[derivative(Debug = "ignore")]
  pub pointer: Arc<dyn Pointer>,
}

impl Services {
  pub fn new(config: &Config) -> Self {
    Self {
      motion: Arc::new(PoseMotion::new(config.frame_rate)),
      sound: Arc::new(SilentSound),
      pointer: Arc::new(PointerState::default()),
    }
  }
}
