use std::sync::Arc;

use once_cell::sync::OnceCell;
use stonks_core_types::DeliveryOutcome;
use thiserror::Error;
use tokio::sync::broadcast;

/// Trait implemented by payload types that can be carried on the bus.
pub trait Event: Clone + Send + Sync + std::fmt::Debug + 'static {}

impl<T> Event for T where T: Clone + Send + Sync + std::fmt::Debug + 'static {}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum BusError {
    #[error("no active subscribers")]
    NoSubscribers,
}

/// Publishing never blocks: the tracker runs on the page's UI thread and must
/// not wait on listeners.
pub trait EventBus<E>: Send + Sync
where
    E: Event,
{
    fn publish(&self, event: E) -> Result<usize, BusError>;
    fn subscribe(&self) -> broadcast::Receiver<E>;
}

/// In-memory broadcast bus; lagging receivers lose the oldest entries.
pub struct InMemoryBus<E>
where
    E: Event,
{
    sender: broadcast::Sender<E>,
}

impl<E> InMemoryBus<E>
where
    E: Event,
{
    pub fn new(capacity: usize) -> Arc<Self> {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Arc::new(Self { sender })
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl<E> EventBus<E> for InMemoryBus<E>
where
    E: Event,
{
    fn publish(&self, event: E) -> Result<usize, BusError> {
        self.sender.send(event).map_err(|_| BusError::NoSubscribers)
    }

    fn subscribe(&self) -> broadcast::Receiver<E> {
        self.sender.subscribe()
    }
}

pub type OutcomeBus = InMemoryBus<DeliveryOutcome>;

const OUTCOME_CAPACITY: usize = 64;

static OUTCOMES: OnceCell<Arc<OutcomeBus>> = OnceCell::new();

/// Process-wide outcome bus shared by every tracker session.
pub fn outcome_bus() -> Arc<OutcomeBus> {
    Arc::clone(OUTCOMES.get_or_init(|| InMemoryBus::new(OUTCOME_CAPACITY)))
}

/// Publishes an outcome, treating the absence of listeners as the normal case.
pub fn publish_outcome(bus: &OutcomeBus, outcome: DeliveryOutcome) {
    match bus.publish(outcome) {
        Ok(receivers) => tracing::trace!(receivers, "delivery outcome published"),
        Err(BusError::NoSubscribers) => {}
    }
}
