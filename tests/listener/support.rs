//! Shared fixtures: message types, host registration, recording executors.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once};
use std::time::Duration;

use bus_trigger::bus::{
    BrokerError, BusConfigurator, BusControl, BusFactory, InMemoryBroker, Message,
};
use bus_trigger::config::BusConfigurationStore;
use bus_trigger::dispatch::{executor_fn, FunctionExecutor, ParameterMode, TriggerValue};
use bus_trigger::listener::ListenerRegistry;
use serde::{Deserialize, Serialize};
use tracing_subscriber::EnvFilter;
use url::Url;

pub fn init_tracing() {
    static INIT: Once = Once::new();
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .init();
    });
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCreated {
    pub id: String,
    pub amount: u64,
}

impl Message for OrderCreated {
    const MESSAGE_TYPE: &'static str = "OrderCreated";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderCancelled {
    pub id: String,
    pub reason: String,
}

impl Message for OrderCancelled {
    const MESSAGE_TYPE: &'static str = "OrderCancelled";
}

pub trait HasId {
    fn id(&self) -> &str;
}

impl HasId for OrderCreated {
    fn id(&self) -> &str {
        &self.id
    }
}

impl HasId for OrderCancelled {
    fn id(&self) -> &str {
        &self.id
    }
}

/// What a recording executor saw for one invocation.
#[derive(Debug, Clone, PartialEq)]
pub struct Received {
    pub message_type: &'static str,
    pub id: String,
    pub mode: ParameterMode,
    pub delivery_count: Option<u32>,
    pub correlation_id: Option<String>,
}

pub type Log = Arc<Mutex<Vec<Received>>>;

pub fn recording<T: Message + HasId>(log: &Log) -> Arc<dyn FunctionExecutor<T>> {
    let log = Arc::clone(log);
    Arc::new(executor_fn(move |value: TriggerValue<T>, _cancel| {
        let log = Arc::clone(&log);
        async move {
            let metadata = value.context().map(|c| c.metadata());
            log.lock().unwrap().push(Received {
                message_type: T::MESSAGE_TYPE,
                id: value.message().id().to_string(),
                mode: value.mode(),
                delivery_count: metadata.map(|m| m.delivery_count),
                correlation_id: metadata
                    .and_then(|m| m.header("correlation-id"))
                    .map(str::to_string),
            });
            Ok(())
        }
    }))
}

/// An executor that always fails, counting its invocations.
pub fn failing<T: Message>(attempts: &Arc<AtomicUsize>) -> Arc<dyn FunctionExecutor<T>> {
    let attempts = Arc::clone(attempts);
    Arc::new(executor_fn(move |_value: TriggerValue<T>, _cancel| {
        attempts.fetch_add(1, Ordering::SeqCst);
        async { Err("inventory service unavailable".into()) }
    }))
}

/// An executor that takes `duration` per message and ignores cancellation.
pub fn slow<T: Message>(duration: Duration, entered: &Arc<AtomicUsize>) -> Arc<dyn FunctionExecutor<T>> {
    let entered = Arc::clone(entered);
    Arc::new(executor_fn(move |_value: TriggerValue<T>, _cancel| {
        entered.fetch_add(1, Ordering::SeqCst);
        async move {
            tokio::time::sleep(duration).await;
            Ok(())
        }
    }))
}

/// `InMemoryBroker` that counts connection constructions.
pub struct CountingFactory {
    pub broker: InMemoryBroker,
    created: AtomicUsize,
}

impl CountingFactory {
    pub fn new(broker: InMemoryBroker) -> Arc<Self> {
        Arc::new(Self {
            broker,
            created: AtomicUsize::new(0),
        })
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl BusFactory for CountingFactory {
    fn create(&self, configuration: BusConfigurator) -> Result<Arc<dyn BusControl>, BrokerError> {
        self.created.fetch_add(1, Ordering::SeqCst);
        self.broker.create(configuration)
    }
}

pub fn store() -> BusConfigurationStore {
    let mut store = BusConfigurationStore::new();
    store
        .register_host("orders", Url::parse("sb://orders").unwrap(), |_| {})
        .unwrap();
    store
        .register_host("billing", Url::parse("sb://billing").unwrap(), |host| {
            host.operation_timeout(Duration::from_secs(30));
        })
        .unwrap();
    store
}

pub fn registry(store: BusConfigurationStore, factory: &Arc<CountingFactory>) -> Arc<ListenerRegistry> {
    init_tracing();
    Arc::new(ListenerRegistry::new(
        Arc::new(store),
        Arc::clone(factory) as Arc<dyn BusFactory>,
    ))
}

pub async fn wait_until(check: impl Fn() -> bool) {
    for _ in 0..400 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met within 2s");
}
