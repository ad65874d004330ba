use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use derivative::Derivative;
use parking_lot::Mutex;

pub type Handler = Arc<dyn Fn() + Send + Sync>;

#[derive(Derivative, Default)]
#[derivative(Debug)]
struct Observers {
  next_id: AtomicU64,
  #[derivative(Debug = "ignore")]
  handlers: Mutex<Vec<(u64, Handler)>>,
}

/// A "value changed" notification with an explicit observer list.
#[derive(Debug, Clone, Default)]
pub struct ChangeEvent {
  observers: Arc<Observers>,
}

impl ChangeEvent {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn subscribe(&self, handler: Handler) -> Subscription {
    let id = self.observers.next_id.fetch_add(1, Ordering::Relaxed);
    self.observers.handlers.lock().push((id, handler));
    Subscription { links: vec![(Arc::downgrade(&self.observers), id)] }
  }

  pub fn raise(&self) {
    // Handlers may subscribe or unsubscribe, so call them outside the lock.
    let handlers: Vec<Handler> =
      self.observers.handlers.lock().iter().map(|(_, h)| h.clone()).collect();
    for handler in handlers {
      handler();
    }
  }

  /// A handler that re-raises this event. It does not keep the event alive.
  pub fn forwarder(&self) -> Handler {
    let observers = Arc::downgrade(&self.observers);
    Arc::new(move || {
      if let Some(observers) = observers.upgrade() {
        ChangeEvent { observers }.raise();
      }
    })
  }

  pub fn subscriber_count(&self) -> usize {
    self.observers.handlers.lock().len()
  }
}

/// Disposal handle for one or more subscriptions. Dropping it unsubscribes.
#[derive(Debug, Default)]
#[must_use = "dropping a subscription unsubscribes immediately"]
pub struct Subscription {
  links: Vec<(Weak<Observers>, u64)>,
}

impl Subscription {
  pub fn empty() -> Self {
    Self::default()
  }

  pub fn join(mut self, mut other: Subscription) -> Subscription {
    self.links.append(&mut other.links);
    self
  }

  pub fn is_empty(&self) -> bool {
    self.links.is_empty()
  }
}

impl Drop for Subscription {
  fn drop(&mut self) {
    for (observers, id) in self.links.drain(..) {
      if let Some(observers) = observers.upgrade() {
        observers.handlers.lock().retain(|(other, _)| *other != id);
      }
    }
  }
}

/// A one-time upstream link: the first `forward_from` subscribes, later calls
/// are no-ops while that subscription is held.
#[derive(Debug, Default)]
pub struct Relay {
  event: ChangeEvent,
  upstream: Mutex<Option<Subscription>>,
}

impl Relay {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn forward_from(&self, source: &ChangeEvent) {
    let mut upstream = self.upstream.lock();
    if upstream.is_none() {
      *upstream = Some(source.subscribe(self.event.forwarder()));
    }
  }

  pub fn subscribe(&self, handler: Handler) -> Subscription {
    self.event.subscribe(handler)
  }
}
