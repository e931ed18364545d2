//! In-memory broker for testing and single-process scenarios.
//!
//! `InMemoryBroker` is a `BusFactory` whose connections deliver from named
//! in-process queues. It applies the broker-side rules a real client would:
//! - messages sent before an endpoint starts are buffered
//! - routing by `event_type` to every handler registered for it
//! - session-aware endpoints deliver sequentially and dead-letter
//!   messages without a session key
//! - failed deliveries are redelivered up to `max_delivery_count`, then
//!   dead-lettered; shutdown returns a message still being redelivered to
//!   its queue
//!
//! ## Example
//!
//! ```ignore
//! let broker = InMemoryBroker::new();
//! let registry = ListenerRegistry::new(store, Arc::new(broker.clone()));
//! // ... subscribe and start ...
//! broker.send("created", Event::encode("evt-1", &OrderCreated { id: "o1".into() })?)?;
//! ```

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use futures::future::join_all;
use tokio::sync::{mpsc, Semaphore};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use super::configurator::{BusConfigurator, EndpointHandler, HostConfigurator};
use super::context::DeliveryMetadata;
use super::control::{BusControl, BusFactory};
use super::error::BrokerError;
use super::message::Event;
use crate::dispatch::DeliveryError;

/// Delivery attempts before dead-lettering when a handler sets no limit.
pub const DEFAULT_MAX_DELIVERY_COUNT: u32 = 10;

/// A message the broker gave up on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeadLetter {
    pub queue: String,
    pub event_id: String,
    pub event_type: String,
    pub reason: String,
}

struct QueueChannel {
    tx: mpsc::UnboundedSender<Event>,
    /// `None` while an endpoint is receiving from the queue.
    rx: Option<mpsc::UnboundedReceiver<Event>>,
}

impl QueueChannel {
    fn new() -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        Self { tx, rx: Some(rx) }
    }
}

#[derive(Default)]
struct BrokerState {
    queues: Mutex<HashMap<String, QueueChannel>>,
    bound: Mutex<HashMap<String, Arc<BoundEndpoint>>>,
    acked: Mutex<Vec<String>>,
    dead_letters: Mutex<Vec<DeadLetter>>,
    refusal: Mutex<Option<String>>,
    connect_delay: Mutex<Option<Duration>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// In-process broker shared by every connection it creates.
///
/// Cloning shares the same queues.
#[derive(Clone, Default)]
pub struct InMemoryBroker {
    state: Arc<BrokerState>,
}

impl InMemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Delay every connection handshake (useful to overlap concurrent starts).
    pub fn with_connect_delay(self, delay: Duration) -> Self {
        *lock(&self.state.connect_delay) = Some(delay);
        self
    }

    /// Make subsequent connection attempts fail with `reason`.
    pub fn refuse_connections(&self, reason: impl Into<String>) {
        *lock(&self.state.refusal) = Some(reason.into());
    }

    /// Accept connections again after `refuse_connections`.
    pub fn accept_connections(&self) {
        *lock(&self.state.refusal) = None;
    }

    /// Send a message to a named queue.
    pub fn send(&self, queue: &str, event: Event) -> Result<(), BrokerError> {
        let mut queues = lock(&self.state.queues);
        let channel = queues
            .entry(queue.to_string())
            .or_insert_with(QueueChannel::new);
        channel.tx.send(event).map_err(|_| BrokerError::Closed)
    }

    /// Run a single delivery attempt on the endpoint bound to `queue` and
    /// return the handler outcome, bypassing redelivery.
    ///
    /// Every handler registered for the message type runs once; the first
    /// failure is returned.
    pub async fn dispatch(&self, queue: &str, event: Event) -> Result<(), DeliveryError> {
        let no_handler = || DeliveryError::NoHandler {
            queue: queue.to_string(),
            message_type: event.event_type.clone(),
        };
        let endpoint = self.bound(queue).ok_or_else(no_handler)?;
        let handlers = endpoint.handlers_for(&event.event_type);
        if handlers.is_empty() {
            return Err(no_handler());
        }

        for bound in handlers {
            let metadata = endpoint.metadata(&event, 1, CancellationToken::new());
            bound.handler.deliver(&event, metadata).await?;
        }
        self.ack(&event.id);
        Ok(())
    }

    /// IDs of acknowledged messages, in acknowledgment order.
    pub fn acknowledged(&self) -> Vec<String> {
        lock(&self.state.acked).clone()
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        lock(&self.state.dead_letters).clone()
    }

    /// Whether a started endpoint is currently receiving from `queue`.
    pub fn is_bound(&self, queue: &str) -> bool {
        lock(&self.state.bound).contains_key(queue)
    }

    fn bound(&self, queue: &str) -> Option<Arc<BoundEndpoint>> {
        lock(&self.state.bound).get(queue).cloned()
    }

    fn claim(&self, queue: &str) -> Option<mpsc::UnboundedReceiver<Event>> {
        let mut queues = lock(&self.state.queues);
        queues
            .entry(queue.to_string())
            .or_insert_with(QueueChannel::new)
            .rx
            .take()
    }

    fn release(&self, queue: &str, rx: mpsc::UnboundedReceiver<Event>) {
        if let Some(channel) = lock(&self.state.queues).get_mut(queue) {
            channel.rx = Some(rx);
        }
    }

    fn bind(&self, endpoint: Arc<BoundEndpoint>) {
        lock(&self.state.bound).insert(endpoint.queue.clone(), endpoint);
    }

    fn unbind(&self, queue: &str) {
        lock(&self.state.bound).remove(queue);
    }

    fn ack(&self, event_id: &str) {
        lock(&self.state.acked).push(event_id.to_string());
    }

    fn dead_letter(&self, queue: &str, event: &Event, reason: impl Into<String>) {
        let reason = reason.into();
        warn!(queue, message_id = %event.id, %reason, "message dead-lettered");
        lock(&self.state.dead_letters).push(DeadLetter {
            queue: queue.to_string(),
            event_id: event.id.clone(),
            event_type: event.event_type.clone(),
            reason,
        });
    }
}

impl BusFactory for InMemoryBroker {
    fn create(&self, configuration: BusConfigurator) -> Result<Arc<dyn BusControl>, BrokerError> {
        Ok(Arc::new(InMemoryBus::new(self.clone(), configuration)))
    }
}

struct BoundHandler {
    handler: EndpointHandler,
    permits: Option<Arc<Semaphore>>,
}

enum Outcome {
    Acknowledged,
    Failed(DeliveryError),
    Interrupted,
}

impl BoundHandler {
    /// Deliver with redelivery, stopping early once `shutdown` fires.
    async fn run(&self, endpoint: &BoundEndpoint, event: &Event, shutdown: &CancellationToken) -> Outcome {
        let _permit = match &self.permits {
            Some(permits) => Arc::clone(permits).acquire_owned().await.ok(),
            None => None,
        };

        let max_attempts = self
            .handler
            .settings()
            .max_delivery_count
            .unwrap_or(DEFAULT_MAX_DELIVERY_COUNT)
            .max(1);

        let mut attempt = 1;
        loop {
            let metadata = endpoint.metadata(event, attempt, shutdown.child_token());
            match self.handler.deliver(event, metadata).await {
                Ok(()) => return Outcome::Acknowledged,
                Err(err) if attempt >= max_attempts => return Outcome::Failed(err),
                Err(err) if shutdown.is_cancelled() => {
                    debug!(queue = %endpoint.queue, message_id = %event.id, attempt, error = %err, "redelivery interrupted by shutdown");
                    return Outcome::Interrupted;
                }
                Err(err) => {
                    debug!(queue = %endpoint.queue, message_id = %event.id, attempt, error = %err, "redelivering");
                }
            }
            attempt += 1;
        }
    }
}

struct BoundEndpoint {
    queue: String,
    requires_session: bool,
    handlers: Vec<BoundHandler>,
}

impl BoundEndpoint {
    fn handlers_for(&self, message_type: &str) -> Vec<&BoundHandler> {
        self.handlers
            .iter()
            .filter(|h| h.handler.message_type() == message_type)
            .collect()
    }

    fn metadata(&self, event: &Event, attempt: u32, cancellation: CancellationToken) -> DeliveryMetadata {
        DeliveryMetadata {
            message_id: event.id.clone(),
            queue: self.queue.clone(),
            headers: event.headers.clone(),
            session_id: event.session_id.clone(),
            delivery_count: attempt,
            cancellation,
        }
    }

    /// Run every handler for the message type. The message is acknowledged
    /// once all of them succeed, dead-lettered when any exhausts its
    /// attempts, and returned to the queue when shutdown interrupts
    /// redelivery.
    async fn process(&self, broker: &InMemoryBroker, event: Event, shutdown: &CancellationToken) {
        if self.requires_session && event.session_id.is_none() {
            broker.dead_letter(&self.queue, &event, "session id required");
            return;
        }
        let handlers = self.handlers_for(&event.event_type);
        if handlers.is_empty() {
            broker.dead_letter(
                &self.queue,
                &event,
                format!("no handler for message type {}", event.event_type),
            );
            return;
        }

        let outcomes = join_all(handlers.iter().map(|h| h.run(self, &event, shutdown))).await;

        let mut interrupted = false;
        for outcome in outcomes {
            match outcome {
                Outcome::Acknowledged => {}
                Outcome::Failed(err) => {
                    broker.dead_letter(&self.queue, &event, err.to_string());
                    return;
                }
                Outcome::Interrupted => interrupted = true,
            }
        }

        if interrupted {
            let message_id = event.id.clone();
            match broker.send(&self.queue, event) {
                Ok(()) => debug!(queue = %self.queue, %message_id, "message returned to queue"),
                Err(err) => warn!(queue = %self.queue, %message_id, error = %err, "message lost on shutdown"),
            }
            return;
        }

        debug!(queue = %self.queue, message_id = %event.id, handlers = handlers.len(), "message acknowledged");
        broker.ack(&event.id);
    }
}

/// A connection created by `InMemoryBroker`.
pub struct InMemoryBus {
    broker: InMemoryBroker,
    host: HostConfigurator,
    endpoints: Vec<Arc<BoundEndpoint>>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
}

impl InMemoryBus {
    fn new(broker: InMemoryBroker, configuration: BusConfigurator) -> Self {
        let (host, endpoints) = configuration.into_parts();
        let endpoints = endpoints
            .into_iter()
            .map(|endpoint| {
                let handlers = endpoint
                    .handlers()
                    .iter()
                    .map(|handler| BoundHandler {
                        permits: handler
                            .settings()
                            .concurrent_message_limit
                            .map(|limit| Arc::new(Semaphore::new(limit.max(1)))),
                        handler: handler.clone(),
                    })
                    .collect();
                Arc::new(BoundEndpoint {
                    queue: endpoint.queue_name().to_string(),
                    requires_session: endpoint.requires_session(),
                    handlers,
                })
            })
            .collect();

        Self {
            broker,
            host,
            endpoints,
            shutdown: CancellationToken::new(),
            tracker: TaskTracker::new(),
        }
    }

    pub fn host(&self) -> &HostConfigurator {
        &self.host
    }

    async fn connect(&self, cancel: &CancellationToken) -> Result<(), BrokerError> {
        let delay = *lock(&self.broker.state.connect_delay);
        if let Some(delay) = delay {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = cancel.cancelled() => return Err(BrokerError::Cancelled),
            }
        }
        if cancel.is_cancelled() {
            return Err(BrokerError::Cancelled);
        }
        if let Some(reason) = lock(&self.broker.state.refusal).clone() {
            return Err(BrokerError::ConnectionFailed(format!(
                "{}: {}",
                self.host.service_uri(),
                reason
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl BusControl for InMemoryBus {
    async fn start(&self, cancel: CancellationToken) -> Result<(), BrokerError> {
        self.connect(&cancel).await?;

        let mut claimed = Vec::with_capacity(self.endpoints.len());
        for endpoint in &self.endpoints {
            match self.broker.claim(&endpoint.queue) {
                Some(rx) => claimed.push((Arc::clone(endpoint), rx)),
                None => {
                    for (endpoint, rx) in claimed {
                        self.broker.release(&endpoint.queue, rx);
                    }
                    return Err(BrokerError::Provisioning(format!(
                        "queue {} already has an active receiver",
                        endpoint.queue
                    )));
                }
            }
        }

        for (endpoint, rx) in claimed {
            self.broker.bind(Arc::clone(&endpoint));
            self.tracker.spawn(receive_loop(
                self.broker.clone(),
                endpoint,
                rx,
                self.shutdown.clone(),
                self.tracker.clone(),
            ));
        }
        Ok(())
    }

    async fn stop(&self) -> Result<(), BrokerError> {
        self.shutdown.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        Ok(())
    }
}

async fn receive_loop(
    broker: InMemoryBroker,
    endpoint: Arc<BoundEndpoint>,
    mut rx: mpsc::UnboundedReceiver<Event>,
    shutdown: CancellationToken,
    tracker: TaskTracker,
) {
    loop {
        let event = tokio::select! {
            biased;
            _ = shutdown.cancelled() => break,
            next = rx.recv() => match next {
                Some(event) => event,
                None => break,
            },
        };

        if endpoint.requires_session {
            endpoint.process(&broker, event, &shutdown).await;
        } else {
            let endpoint = Arc::clone(&endpoint);
            let broker = broker.clone();
            let shutdown = shutdown.clone();
            tracker.spawn(async move {
                endpoint.process(&broker, event, &shutdown).await;
            });
        }
    }

    broker.unbind(&endpoint.queue);
    broker.release(&endpoint.queue, rx);
}
