use std::sync::Arc;

use tokio::sync::watch;

/// Cooperative cancellation signal shared by everything a script runs.
/// Once cancelled it stays cancelled.
#[derive(Debug, Clone)]
pub struct CancelScope {
  signal: Arc<watch::Sender<bool>>,
}

impl Default for CancelScope {
  fn default() -> Self {
    Self::new()
  }
}

impl CancelScope {
  pub fn new() -> Self {
    let (signal, _) = watch::channel(false);
    Self { signal: Arc::new(signal) }
  }

  pub fn cancel(&self) {
    self.signal.send_replace(true);
  }

  pub fn is_cancelled(&self) -> bool {
    *self.signal.borrow()
  }

  /// Resolves once the scope is cancelled.
  pub async fn cancelled(&self) {
    let mut receiver = self.signal.subscribe();
    // The sender lives as long as `self`, so this only ends by cancellation.
    let _ = receiver.wait_for(|cancelled| *cancelled).await;
  }

  pub fn same(&self, other: &CancelScope) -> bool {
    Arc::ptr_eq(&self.signal, &other.signal)
  }
}
