//! Registry: one listener per bus under concurrent first use.

use std::sync::Arc;

use bus_trigger::bus::InMemoryBroker;
use bus_trigger::listener::ListenerState;
use tokio_util::sync::CancellationToken;

use crate::support::{registry, store, CountingFactory};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_lookups_return_identical_listener() {
    let factory = CountingFactory::new(InMemoryBroker::new());
    let registry = registry(store(), &factory);

    let lookups: Vec<_> = (0..32)
        .map(|_| {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move { registry.get_or_create_listener("orders").unwrap() })
        })
        .collect();

    let mut listeners = Vec::new();
    for lookup in lookups {
        listeners.push(lookup.await.unwrap());
    }

    assert!(listeners.iter().all(|l| Arc::ptr_eq(l, &listeners[0])));
    assert_eq!(registry.listeners().unwrap().len(), 1);
}

#[tokio::test]
async fn start_all_and_stop_all_cover_every_bus() {
    let factory = CountingFactory::new(InMemoryBroker::new());
    let registry = registry(store(), &factory);
    let orders = registry.get_or_create_listener("orders").unwrap();
    let billing = registry.get_or_create_listener("billing").unwrap();

    registry.start_all(CancellationToken::new()).await.unwrap();
    assert_eq!(orders.state(), ListenerState::Started);
    assert_eq!(billing.state(), ListenerState::Started);
    assert_eq!(factory.created(), 2);

    registry.stop_all(CancellationToken::new()).await.unwrap();
    assert_eq!(orders.state(), ListenerState::Stopped);
    assert_eq!(billing.state(), ListenerState::Stopped);

    let names: Vec<_> = registry
        .listeners()
        .unwrap()
        .iter()
        .map(|l| l.bus_name().to_string())
        .collect();
    assert_eq!(names, vec!["billing", "orders"]);
}
