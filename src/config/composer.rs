//! Trigger configuration contributions and their composition.
//!
//! A message type can receive consumer configuration from two places: a
//! global contribution applying on every bus, and a bus-scoped one. The
//! composite runs global first and bus-scoped second, so the bus-scoped
//! contribution overrides anything both of them set.

use std::fmt;
use std::sync::Arc;

use crate::bus::HandlerConfigurator;

/// One configuration contribution for handlers of message type `T`.
pub struct TriggerConfiguration<T> {
    configure: Arc<dyn Fn(&mut HandlerConfigurator<T>) + Send + Sync>,
}

impl<T> Clone for TriggerConfiguration<T> {
    fn clone(&self) -> Self {
        Self {
            configure: Arc::clone(&self.configure),
        }
    }
}

impl<T> fmt::Debug for TriggerConfiguration<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TriggerConfiguration").finish_non_exhaustive()
    }
}

impl<T: 'static> TriggerConfiguration<T> {
    pub fn new<F>(configure: F) -> Self
    where
        F: Fn(&mut HandlerConfigurator<T>) + Send + Sync + 'static,
    {
        Self {
            configure: Arc::new(configure),
        }
    }

    pub fn configure(&self, configurator: &mut HandlerConfigurator<T>) {
        (self.configure)(configurator)
    }

    /// Chain two contributions: `self` runs first, then `next`.
    pub fn then(self, next: TriggerConfiguration<T>) -> Self {
        Self::new(move |configurator| {
            self.configure(configurator);
            next.configure(configurator);
        })
    }
}

/// The merged configuration for one message type on one bus.
pub struct CompositeConfiguration<T> {
    parts: Vec<TriggerConfiguration<T>>,
}

impl<T> Clone for CompositeConfiguration<T> {
    fn clone(&self) -> Self {
        Self {
            parts: self.parts.clone(),
        }
    }
}

impl<T> fmt::Debug for CompositeConfiguration<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompositeConfiguration")
            .field("parts", &self.parts.len())
            .finish()
    }
}

impl<T: 'static> CompositeConfiguration<T> {
    /// A composite that configures nothing.
    pub fn noop() -> Self {
        Self { parts: Vec::new() }
    }

    /// Apply every part in order.
    pub fn configure(&self, configurator: &mut HandlerConfigurator<T>) {
        for part in &self.parts {
            part.configure(configurator);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.parts.is_empty()
    }
}

/// Merge global and bus-scoped contributions: global first, then bus-scoped.
/// Absent slots contribute nothing.
pub fn compose<T: 'static>(
    global: Option<TriggerConfiguration<T>>,
    bus: Option<TriggerConfiguration<T>>,
) -> CompositeConfiguration<T> {
    CompositeConfiguration {
        parts: global.into_iter().chain(bus).collect(),
    }
}
