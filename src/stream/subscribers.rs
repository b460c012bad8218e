//! Subscriber registry with failure supervision

use super::types::{MarketEvent, SubscriberFailure, SubscriberId};
use crate::telemetry::{self, CounterMetric, GaugeMetric};
use tokio::sync::mpsc;
use uuid::Uuid;

/// Consecutive failures after which a subscriber is removed
pub const DEFAULT_MAX_CONSECUTIVE_FAILURES: u32 = 3;

/// Handles decoded market events
///
/// Returning an error reports the failure to the stream owner; repeated
/// failures get the handler unsubscribed.
pub trait MarketDataHandler: Send {
    /// Process one event
    fn handle(&mut self, event: &MarketEvent) -> anyhow::Result<()>;
}

impl<F> MarketDataHandler for F
where
    F: FnMut(&MarketEvent) -> anyhow::Result<()> + Send,
{
    fn handle(&mut self, event: &MarketEvent) -> anyhow::Result<()> {
        self(event)
    }
}

struct Subscriber {
    id: SubscriberId,
    name: String,
    handler: Box<dyn MarketDataHandler>,
    consecutive_failures: u32,
}

/// Result of dispatching one event
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DispatchReport {
    /// Handlers that accepted the event
    pub delivered: usize,
    /// Handlers that returned an error
    pub failed: usize,
    /// Subscribers removed by the supervisor
    pub removed: Vec<SubscriberId>,
}

/// Ordered set of subscribers with a failure supervisor
pub struct SubscriberRegistry {
    subscribers: Vec<Subscriber>,
    max_consecutive_failures: u32,
    failure_tx: Option<mpsc::UnboundedSender<SubscriberFailure>>,
}

impl SubscriberRegistry {
    /// Create a registry that removes a subscriber after
    /// `max_consecutive_failures` failures in a row (0 = never)
    pub fn new(max_consecutive_failures: u32) -> Self {
        Self {
            subscribers: Vec::new(),
            max_consecutive_failures,
            failure_tx: None,
        }
    }

    /// Change the failure threshold
    pub fn set_max_consecutive_failures(&mut self, max: u32) {
        self.max_consecutive_failures = max;
    }

    /// Route failure reports to `tx`
    pub fn set_failure_channel(&mut self, tx: mpsc::UnboundedSender<SubscriberFailure>) {
        self.failure_tx = Some(tx);
    }

    /// Register a handler
    pub fn add(&mut self, name: impl Into<String>, handler: Box<dyn MarketDataHandler>) -> SubscriberId {
        let id = Uuid::new_v4();
        let name = name.into();
        tracing::info!(%id, name = %name, "Registered subscriber");
        self.subscribers.push(Subscriber {
            id,
            name,
            handler,
            consecutive_failures: 0,
        });
        telemetry::set_gauge(GaugeMetric::Subscribers, self.subscribers.len() as f64);
        id
    }

    /// Remove a handler, returning whether it was registered
    pub fn remove(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        telemetry::set_gauge(GaugeMetric::Subscribers, self.subscribers.len() as f64);
        self.subscribers.len() != before
    }

    /// Number of registered handlers
    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    /// Whether no handlers are registered
    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }

    /// Names of registered handlers in registration order
    pub fn names(&self) -> Vec<&str> {
        self.subscribers.iter().map(|s| s.name.as_str()).collect()
    }

    /// Deliver an event to every handler in registration order
    pub fn dispatch(&mut self, event: &MarketEvent) -> DispatchReport {
        let mut report = DispatchReport::default();
        let max = self.max_consecutive_failures;

        for subscriber in &mut self.subscribers {
            match subscriber.handler.handle(event) {
                Ok(()) => {
                    subscriber.consecutive_failures = 0;
                    report.delivered += 1;
                }
                Err(e) => {
                    subscriber.consecutive_failures += 1;
                    report.failed += 1;

                    let unsubscribe = max > 0 && subscriber.consecutive_failures >= max;
                    if unsubscribe {
                        report.removed.push(subscriber.id);
                    }

                    tracing::warn!(
                        id = %subscriber.id,
                        name = %subscriber.name,
                        error = %e,
                        consecutive = subscriber.consecutive_failures,
                        unsubscribe,
                        "Subscriber failed"
                    );
                    telemetry::increment(CounterMetric::SubscriberFailures, 1);

                    if let Some(tx) = &self.failure_tx {
                        let _ = tx.send(SubscriberFailure {
                            id: subscriber.id,
                            name: subscriber.name.clone(),
                            error: e.to_string(),
                            consecutive_failures: subscriber.consecutive_failures,
                            unsubscribed: unsubscribe,
                        });
                    }
                }
            }
        }

        if !report.removed.is_empty() {
            let removed = &report.removed;
            self.subscribers.retain(|s| !removed.contains(&s.id));
            telemetry::set_gauge(GaugeMetric::Subscribers, self.subscribers.len() as f64);
        }

        report
    }
}

impl Default for SubscriberRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CONSECUTIVE_FAILURES)
    }
}
