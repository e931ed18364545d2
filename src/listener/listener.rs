use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures::future::{BoxFuture, FutureExt, Shared};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::error::ListenerError;
use super::subscription::{QueueSubscription, SessionUsage};
use crate::bus::{BrokerError, BusConfigurator, BusControl, BusFactory, Message};
use crate::config::{BusConfigurationStore, ConfigurationError};
use crate::dispatch::DispatchAdapter;

/// Observable lifecycle of a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerState {
    NotStarted,
    Starting,
    Started,
    Stopped,
}

type Readiness = Shared<BoxFuture<'static, Result<(), BrokerError>>>;

enum Lifecycle {
    NotStarted,
    Starting {
        attempt: u64,
        control: Arc<dyn BusControl>,
        ready: Readiness,
    },
    Started {
        control: Arc<dyn BusControl>,
    },
    Stopped,
}

impl Lifecycle {
    fn state(&self) -> ListenerState {
        match self {
            Lifecycle::NotStarted => ListenerState::NotStarted,
            Lifecycle::Starting { .. } => ListenerState::Starting,
            Lifecycle::Started { .. } => ListenerState::Started,
            Lifecycle::Stopped => ListenerState::Stopped,
        }
    }
}

struct Inner {
    lifecycle: Lifecycle,
    queues: BTreeMap<String, Vec<QueueSubscription>>,
    attempts: u64,
}

/// Owns the single broker connection for one bus.
///
/// Subscriptions accumulate per queue until the first `start`, which builds
/// one connection carrying every receive endpoint. Concurrent `start` calls
/// share that build; only one of them constructs the connection.
///
/// State transitions:
///
/// ```text
/// NotStarted ──start──► Starting ──ready──► Started ──stop──► Stopped
///      ▲                    │                                   ▲
///      └──failed/cancelled──┘──────────────stop─────────────────┘
/// ```
pub struct Listener {
    bus_name: String,
    store: Arc<BusConfigurationStore>,
    factory: Arc<dyn BusFactory>,
    inner: Mutex<Inner>,
}

impl Listener {
    /// A listener for `bus_name`; nothing is built until `start`.
    pub fn new(
        bus_name: impl Into<String>,
        store: Arc<BusConfigurationStore>,
        factory: Arc<dyn BusFactory>,
    ) -> Self {
        Self {
            bus_name: bus_name.into(),
            store,
            factory,
            inner: Mutex::new(Inner {
                lifecycle: Lifecycle::NotStarted,
                queues: BTreeMap::new(),
                attempts: 0,
            }),
        }
    }

    /// Name of the bus this listener serves.
    pub fn bus_name(&self) -> &str {
        &self.bus_name
    }

    /// Current lifecycle state.
    pub fn state(&self) -> ListenerState {
        self.peek().lifecycle.state()
    }

    /// Queue names with at least one subscription, in sorted order.
    pub fn queues(&self) -> Vec<String> {
        self.peek().queues.keys().cloned().collect()
    }

    /// Message types subscribed on `queue`, in registration order.
    pub fn subscriptions(&self, queue: &str) -> Vec<&'static str> {
        self.peek()
            .queues
            .get(queue)
            .map(|subs| subs.iter().map(QueueSubscription::message_type).collect())
            .unwrap_or_default()
    }

    /// Add a subscription to `queue`.
    ///
    /// Fails with `AlreadyStarted` once a connection has been built, since
    /// the subscription could never be wired into it.
    pub fn register_subscription(
        &self,
        queue: impl Into<String>,
        subscription: QueueSubscription,
    ) -> Result<(), ListenerError> {
        let queue = queue.into();
        let mut inner = self.lock("register_subscription")?;
        if inner.lifecycle.state() != ListenerState::NotStarted {
            warn!(
                bus = %self.bus_name,
                %queue,
                message_type = subscription.message_type(),
                "subscription rejected; listener already started"
            );
            return Err(ListenerError::AlreadyStarted {
                bus: self.bus_name.clone(),
                queue,
            });
        }

        debug!(
            bus = %self.bus_name,
            %queue,
            message_type = subscription.message_type(),
            session = subscription.session_usage().is_activated(),
            "subscription registered"
        );
        inner.queues.entry(queue).or_default().push(subscription);
        Ok(())
    }

    /// Subscribe a dispatch adapter for `T` on `queue`, using the trigger
    /// configuration the store holds for this bus.
    pub fn subscribe<T: Message>(
        &self,
        queue: impl Into<String>,
        session_usage: SessionUsage,
        adapter: DispatchAdapter<T>,
    ) -> Result<(), ListenerError> {
        let configuration = self.store.trigger_config::<T>(&self.bus_name);
        self.register_subscription(
            queue,
            QueueSubscription::for_adapter(session_usage, configuration, adapter),
        )
    }

    /// Build the connection if needed and wait until it is ready.
    ///
    /// Returns immediately when already started or stopped. A caller joining
    /// a start in progress stops waiting when its own `cancel` fires; the
    /// caller that built the connection passes its token to the broker.
    pub async fn start(&self, cancel: CancellationToken) -> Result<(), ListenerError> {
        let (attempt, ready, building) = {
            let mut inner = self.lock("start")?;
            let pending = match &inner.lifecycle {
                Lifecycle::Started { .. } => return Ok(()),
                Lifecycle::Stopped => {
                    debug!(bus = %self.bus_name, "listener stopped; start ignored");
                    return Ok(());
                }
                Lifecycle::Starting { attempt, ready, .. } => Some((*attempt, ready.clone())),
                Lifecycle::NotStarted => None,
            };

            match pending {
                Some((attempt, ready)) => (attempt, ready, false),
                None => {
                    let control = self.build(&inner)?;
                    inner.attempts += 1;
                    let attempt = inner.attempts;
                    let ready = {
                        let control = Arc::clone(&control);
                        let cancel = cancel.clone();
                        async move { control.start(cancel).await }.boxed().shared()
                    };
                    inner.lifecycle = Lifecycle::Starting {
                        attempt,
                        control,
                        ready: ready.clone(),
                    };
                    (attempt, ready, true)
                }
            }
        };

        let outcome = if building {
            ready.await
        } else {
            tokio::select! {
                outcome = ready => outcome,
                _ = cancel.cancelled() => {
                    debug!(bus = %self.bus_name, "stopped waiting for listener start");
                    return Err(ListenerError::Cancelled { bus: self.bus_name.clone() });
                }
            }
        };

        self.complete_start(attempt, outcome).await
    }

    /// Stop the connection and wait for in-flight deliveries to drain.
    ///
    /// A no-op unless a connection exists. If `cancel` fires first the
    /// listener keeps its state and `stop` may be called again. The state
    /// only becomes `Stopped` if the connection that was stopped is still
    /// the listener's current one.
    pub async fn stop(&self, cancel: CancellationToken) -> Result<(), ListenerError> {
        let control = {
            let inner = self.lock("stop")?;
            match &inner.lifecycle {
                Lifecycle::NotStarted | Lifecycle::Stopped => {
                    debug!(bus = %self.bus_name, "no connection to stop");
                    return Ok(());
                }
                Lifecycle::Starting { control, .. } | Lifecycle::Started { control } => {
                    Arc::clone(control)
                }
            }
        };

        info!(bus = %self.bus_name, "stopping bus listener");
        tokio::select! {
            biased;
            result = control.stop() => {
                result.map_err(|source| ListenerError::Connection {
                    bus: self.bus_name.clone(),
                    source,
                })?;
                let mut inner = self.lock("stop")?;
                let current = match &inner.lifecycle {
                    Lifecycle::Starting { control: held, .. } | Lifecycle::Started { control: held } => {
                        Arc::ptr_eq(held, &control)
                    }
                    Lifecycle::NotStarted | Lifecycle::Stopped => false,
                };
                if current {
                    inner.lifecycle = Lifecycle::Stopped;
                    info!(bus = %self.bus_name, "bus listener stopped");
                } else {
                    debug!(
                        bus = %self.bus_name,
                        state = ?inner.lifecycle.state(),
                        "connection replaced while stopping; state left unchanged"
                    );
                }
                Ok(())
            }
            _ = cancel.cancelled() => {
                warn!(bus = %self.bus_name, "bus listener shutdown abandoned");
                Err(ListenerError::ShutdownTimeout { bus: self.bus_name.clone() })
            }
        }
    }

    /// `stop` bounded by a deadline.
    pub async fn stop_within(&self, deadline: Duration) -> Result<(), ListenerError> {
        match tokio::time::timeout(deadline, self.stop(CancellationToken::new())).await {
            Ok(result) => result,
            Err(_) => {
                warn!(bus = %self.bus_name, ?deadline, "bus listener shutdown timed out");
                Err(ListenerError::ShutdownTimeout {
                    bus: self.bus_name.clone(),
                })
            }
        }
    }

    fn build(&self, inner: &Inner) -> Result<Arc<dyn BusControl>, ListenerError> {
        let host = self.store.host(&self.bus_name).ok_or_else(|| {
            error!(bus = %self.bus_name, "no host configuration registered");
            ConfigurationError::HostConfigurationMissing {
                bus: self.bus_name.clone(),
            }
        })?;

        let mut configuration = BusConfigurator::new(host.configurator());
        for (queue, subscriptions) in &inner.queues {
            configuration.receive_endpoint(queue, |endpoint| {
                for subscription in subscriptions {
                    subscription.wire(endpoint);
                }
            });
        }

        info!(
            bus = %self.bus_name,
            host = %host.service_uri(),
            queues = inner.queues.len(),
            "building bus connection"
        );
        self.factory
            .create(configuration)
            .map_err(|source| ListenerError::Connection {
                bus: self.bus_name.clone(),
                source,
            })
    }

    async fn complete_start(
        &self,
        attempt: u64,
        outcome: Result<(), BrokerError>,
    ) -> Result<(), ListenerError> {
        let abandoned = {
            let mut inner = self.lock("start")?;
            let current = matches!(
                &inner.lifecycle,
                Lifecycle::Starting { attempt: a, .. } if *a == attempt
            );
            if !current {
                if matches!(inner.lifecycle, Lifecycle::Stopped) {
                    debug!(bus = %self.bus_name, attempt, "start finished after listener was stopped");
                }
                None
            } else {
                match std::mem::replace(&mut inner.lifecycle, Lifecycle::NotStarted) {
                    Lifecycle::Starting { control, .. } if outcome.is_ok() => {
                        inner.lifecycle = Lifecycle::Started { control };
                        info!(bus = %self.bus_name, "bus listener started");
                        None
                    }
                    Lifecycle::Starting { control, .. } => Some(control),
                    other => {
                        inner.lifecycle = other;
                        None
                    }
                }
            }
        };

        if let Some(control) = abandoned {
            if let Err(e) = control.stop().await {
                debug!(bus = %self.bus_name, error = %e, "releasing failed connection");
            }
        }

        match outcome {
            Ok(()) => Ok(()),
            Err(BrokerError::Cancelled) => {
                warn!(bus = %self.bus_name, "bus listener start cancelled");
                Err(ListenerError::Cancelled {
                    bus: self.bus_name.clone(),
                })
            }
            Err(source) => {
                error!(bus = %self.bus_name, error = %source, "bus connection failed");
                Err(ListenerError::Connection {
                    bus: self.bus_name.clone(),
                    source,
                })
            }
        }
    }

    fn lock(&self, operation: &'static str) -> Result<MutexGuard<'_, Inner>, ListenerError> {
        self.inner
            .lock()
            .map_err(|_| ListenerError::LockPoisoned(operation))
    }

    fn peek(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl fmt::Debug for Listener {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Listener")
            .field("bus_name", &self.bus_name)
            .field("state", &self.state())
            .field("queues", &self.queues())
            .finish()
    }
}
