//! Connection lifecycle: lazy single construction, stop, failure and retry.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bus_trigger::bus::{Event, InMemoryBroker};
use bus_trigger::config::{BusConfigurationStore, ConfigurationError};
use bus_trigger::dispatch::{DispatchAdapter, ParameterMode};
use bus_trigger::listener::{ListenerError, ListenerState, SessionUsage};
use tokio_util::sync::CancellationToken;

use crate::support::{
    recording, registry, slow, store, wait_until, CountingFactory, Log, OrderCancelled,
    OrderCreated,
};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_starts_build_one_connection() {
    let factory = CountingFactory::new(InMemoryBroker::new().with_connect_delay(Duration::from_millis(50)));
    let registry = registry(store(), &factory);
    let log = Log::default();

    for queue in ["created", "audit", "cancelled"] {
        let listener = registry.get_or_create_listener("orders").unwrap();
        listener
            .subscribe(
                queue,
                SessionUsage::None,
                DispatchAdapter::new(ParameterMode::Message, recording::<OrderCreated>(&log)),
            )
            .unwrap();
    }

    let starts: Vec<_> = (0..10)
        .map(|_| {
            let listener = registry.get_or_create_listener("orders").unwrap();
            tokio::spawn(async move { listener.start(CancellationToken::new()).await })
        })
        .collect();
    for start in starts {
        start.await.unwrap().unwrap();
    }

    let listener = registry.get_or_create_listener("orders").unwrap();
    assert_eq!(factory.created(), 1);
    assert_eq!(listener.state(), ListenerState::Started);
    for queue in ["created", "audit", "cancelled"] {
        assert!(factory.broker.is_bound(queue), "{queue} not bound");
    }

    listener.stop(CancellationToken::new()).await.unwrap();
}

#[tokio::test]
async fn stop_before_start_is_noop() {
    let factory = CountingFactory::new(InMemoryBroker::new());
    let registry = registry(store(), &factory);
    let listener = registry.get_or_create_listener("orders").unwrap();

    listener.stop(CancellationToken::new()).await.unwrap();
    listener.stop_within(Duration::from_millis(10)).await.unwrap();

    assert_eq!(listener.state(), ListenerState::NotStarted);
    assert_eq!(factory.created(), 0);
}

#[tokio::test]
async fn missing_host_is_fatal() {
    let factory = CountingFactory::new(InMemoryBroker::new());
    let registry = registry(BusConfigurationStore::new(), &factory);
    let listener = registry.get_or_create_listener("shipping").unwrap();

    let err = listener.start(CancellationToken::new()).await.unwrap_err();

    assert!(matches!(
        err,
        ListenerError::Configuration(ConfigurationError::HostConfigurationMissing { ref bus })
            if bus == "shipping"
    ));
    assert_eq!(listener.state(), ListenerState::NotStarted);
    assert_eq!(factory.created(), 0);
}

#[tokio::test]
async fn refused_connection_can_be_retried() {
    let factory = CountingFactory::new(InMemoryBroker::new());
    let registry = registry(store(), &factory);
    let log = Log::default();
    let listener = registry.get_or_create_listener("orders").unwrap();
    listener
        .subscribe(
            "created",
            SessionUsage::None,
            DispatchAdapter::new(ParameterMode::Message, recording::<OrderCreated>(&log)),
        )
        .unwrap();

    factory.broker.refuse_connections("connection reset");
    let err = listener.start(CancellationToken::new()).await.unwrap_err();
    assert!(matches!(err, ListenerError::Connection { ref bus, .. } if bus == "orders"));
    assert!(err.to_string().contains("connection reset"));
    assert_eq!(listener.state(), ListenerState::NotStarted);
    assert!(!factory.broker.is_bound("created"));

    factory.broker.accept_connections();
    listener.start(CancellationToken::new()).await.unwrap();
    assert_eq!(listener.state(), ListenerState::Started);
    assert_eq!(factory.created(), 2);

    let event = Event::encode("evt-1", &OrderCreated { id: "o1".into(), amount: 5 }).unwrap();
    factory.broker.send("created", event).unwrap();
    wait_until(|| log.lock().unwrap().len() == 1).await;

    listener.stop(CancellationToken::new()).await.unwrap();
}

#[tokio::test]
async fn cancelled_start_never_records_started() {
    let factory = CountingFactory::new(InMemoryBroker::new().with_connect_delay(Duration::from_secs(5)));
    let registry = registry(store(), &factory);
    let listener = registry.get_or_create_listener("orders").unwrap();
    let cancel = CancellationToken::new();

    let start = {
        let listener = Arc::clone(&listener);
        let cancel = cancel.clone();
        tokio::spawn(async move { listener.start(cancel).await })
    };
    wait_until(|| listener.state() == ListenerState::Starting).await;
    cancel.cancel();

    let err = start.await.unwrap().unwrap_err();
    assert!(matches!(err, ListenerError::Cancelled { .. }));
    assert_eq!(listener.state(), ListenerState::NotStarted);
}

#[tokio::test]
async fn subscription_after_start_is_rejected() {
    let factory = CountingFactory::new(InMemoryBroker::new());
    let registry = registry(store(), &factory);
    let log = Log::default();
    let listener = registry.get_or_create_listener("orders").unwrap();
    listener.start(CancellationToken::new()).await.unwrap();

    let err = listener
        .subscribe(
            "cancelled",
            SessionUsage::None,
            DispatchAdapter::new(ParameterMode::Message, recording::<OrderCancelled>(&log)),
        )
        .unwrap_err();

    assert!(matches!(err, ListenerError::AlreadyStarted { ref queue, .. } if queue == "cancelled"));
    assert!(listener.queues().is_empty());
    listener.stop(CancellationToken::new()).await.unwrap();
}

#[tokio::test]
async fn stop_drains_in_flight_deliveries() {
    let factory = CountingFactory::new(InMemoryBroker::new());
    let registry = registry(store(), &factory);
    let entered = Arc::new(AtomicUsize::new(0));
    let listener = registry.get_or_create_listener("orders").unwrap();
    listener
        .subscribe(
            "created",
            SessionUsage::None,
            DispatchAdapter::new(
                ParameterMode::Message,
                slow::<OrderCreated>(Duration::from_millis(100), &entered),
            ),
        )
        .unwrap();
    listener.start(CancellationToken::new()).await.unwrap();

    let event = Event::encode("evt-7", &OrderCreated { id: "o7".into(), amount: 1 }).unwrap();
    factory.broker.send("created", event).unwrap();
    wait_until(|| entered.load(Ordering::SeqCst) == 1).await;

    listener.stop(CancellationToken::new()).await.unwrap();

    assert_eq!(listener.state(), ListenerState::Stopped);
    assert_eq!(factory.broker.acknowledged(), vec!["evt-7".to_string()]);
    assert!(!factory.broker.is_bound("created"));
}

#[tokio::test]
async fn shutdown_timeout_leaves_state_intact() {
    let factory = CountingFactory::new(InMemoryBroker::new());
    let registry = registry(store(), &factory);
    let entered = Arc::new(AtomicUsize::new(0));
    let listener = registry.get_or_create_listener("orders").unwrap();
    listener
        .subscribe(
            "created",
            SessionUsage::None,
            DispatchAdapter::new(
                ParameterMode::Message,
                slow::<OrderCreated>(Duration::from_millis(300), &entered),
            ),
        )
        .unwrap();
    listener.start(CancellationToken::new()).await.unwrap();

    let event = Event::encode("evt-8", &OrderCreated { id: "o8".into(), amount: 1 }).unwrap();
    factory.broker.send("created", event).unwrap();
    wait_until(|| entered.load(Ordering::SeqCst) == 1).await;

    let err = listener.stop_within(Duration::from_millis(20)).await.unwrap_err();
    assert!(matches!(err, ListenerError::ShutdownTimeout { ref bus } if bus == "orders"));
    assert_eq!(listener.state(), ListenerState::Started);

    listener.stop(CancellationToken::new()).await.unwrap();
    assert_eq!(listener.state(), ListenerState::Stopped);
}

#[tokio::test]
async fn start_after_stop_does_not_reconnect() {
    let factory = CountingFactory::new(InMemoryBroker::new());
    let registry = registry(store(), &factory);
    let listener = registry.get_or_create_listener("billing").unwrap();

    listener.start(CancellationToken::new()).await.unwrap();
    listener.stop(CancellationToken::new()).await.unwrap();
    listener.start(CancellationToken::new()).await.unwrap();

    assert_eq!(listener.state(), ListenerState::Stopped);
    assert_eq!(factory.created(), 1);
}
