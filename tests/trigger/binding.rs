//! Typed bindings: several functions sharing one bus connection.

use std::sync::{Arc, Mutex};

use bus_trigger::bus::{Event, InMemoryBroker};
use bus_trigger::dispatch::{executor_fn, FunctionExecutor, ParameterMode, TriggerValue};
use bus_trigger::listener::{ListenerState, SessionUsage};
use bus_trigger::trigger::{EnvNameResolver, NameResolver, TriggerAttribute};
use tokio_util::sync::CancellationToken;

use crate::support::{provider, wait_until, InvoicePaid, InvoiceVoided};

fn collect<T, F>(seen: &Arc<Mutex<Vec<String>>>, describe: F) -> Arc<dyn FunctionExecutor<T>>
where
    T: bus_trigger::bus::Message,
    F: Fn(&TriggerValue<T>) -> String + Send + Sync + 'static,
{
    let seen = Arc::clone(seen);
    Arc::new(executor_fn(move |value: TriggerValue<T>, _cancel| {
        seen.lock().unwrap().push(describe(&value));
        async { Ok(()) }
    }))
}

#[tokio::test]
async fn functions_on_one_bus_share_a_connection() {
    let broker = InMemoryBroker::new();
    let provider = provider(&broker);
    let seen = Arc::new(Mutex::new(Vec::new()));

    let paid = provider.bind::<InvoicePaid>(
        &TriggerAttribute::new("billing-%ENV%", "%PAID_QUEUE%"),
        ParameterMode::Message,
    );
    assert_eq!(paid.bus_name(), "billing-prod");
    assert_eq!(paid.queue_name(), "invoices-paid");
    let paid = paid
        .create_listener(collect(&seen, |v: &TriggerValue<InvoicePaid>| {
            format!("paid {} {}", v.message().invoice, v.message().cents)
        }))
        .unwrap();

    let voided = provider
        .bind::<InvoiceVoided>(
            &TriggerAttribute::new("billing-%ENV%", "invoices-voided").use_session(true),
            ParameterMode::ConsumeContext,
        );
    assert_eq!(voided.session_usage(), SessionUsage::Activated);
    let voided = voided
        .create_listener(collect(&seen, |v: &TriggerValue<InvoiceVoided>| {
            let session = v
                .context()
                .and_then(|c| c.metadata().session_id.clone())
                .unwrap_or_default();
            format!("voided {} {}", v.message().invoice, session)
        }))
        .unwrap();

    assert!(Arc::ptr_eq(paid.bus_listener(), voided.bus_listener()));

    paid.start(CancellationToken::new()).await.unwrap();
    voided.start(CancellationToken::new()).await.unwrap();
    assert_eq!(voided.bus_listener().state(), ListenerState::Started);
    assert!(broker.is_bound("invoices-paid"));
    assert!(broker.is_bound("invoices-voided"));

    let event = Event::encode("e1", &InvoicePaid { invoice: "inv-1".into(), cents: 1999 }).unwrap();
    broker.send("invoices-paid", event).unwrap();
    let event = Event::encode("e2", &InvoiceVoided { invoice: "inv-2".into() })
        .unwrap()
        .with_session_id("acct-9");
    broker.send("invoices-voided", event).unwrap();
    wait_until(|| seen.lock().unwrap().len() == 2).await;

    let mut seen_now = seen.lock().unwrap().clone();
    seen_now.sort();
    assert_eq!(seen_now, vec!["paid inv-1 1999", "voided inv-2 acct-9"]);

    voided.stop(CancellationToken::new()).await.unwrap();
    assert_eq!(paid.bus_listener().state(), ListenerState::Stopped);
    paid.cancel().await.unwrap();
}

#[tokio::test]
async fn binding_after_start_fails() {
    let broker = InMemoryBroker::new();
    let provider = provider(&broker);
    let seen = Arc::new(Mutex::new(Vec::new()));

    let first = provider
        .bind::<InvoicePaid>(&TriggerAttribute::new("billing-prod", "paid"), ParameterMode::Message)
        .create_listener(collect(&seen, |v: &TriggerValue<InvoicePaid>| v.message().invoice.clone()))
        .unwrap();
    first.start(CancellationToken::new()).await.unwrap();

    let late = provider
        .bind::<InvoiceVoided>(&TriggerAttribute::new("billing-prod", "voided"), ParameterMode::Message)
        .create_listener(collect(&seen, |v: &TriggerValue<InvoiceVoided>| v.message().invoice.clone()));
    assert!(late.is_err());

    first.stop(CancellationToken::new()).await.unwrap();
}

#[test]
fn env_resolver_reads_process_environment() {
    std::env::set_var("BUS_TRIGGER_TEST_QUEUE", "from-env");
    assert_eq!(
        EnvNameResolver.resolve_whole_string("%BUS_TRIGGER_TEST_QUEUE%-q"),
        "from-env-q"
    );
    assert_eq!(
        EnvNameResolver.resolve_whole_string("%BUS_TRIGGER_TEST_UNSET_NAME%"),
        "%BUS_TRIGGER_TEST_UNSET_NAME%"
    );
}
