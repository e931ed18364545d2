use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::attribute::TriggerAttribute;
use super::binding::{describe_parameter, ParameterDescriptor, TriggerBindingProvider, TriggerListener};
use super::error::TriggerError;
use crate::bus::Message;
use crate::dispatch::{DynamicExecutor, ErasedExecutor, ParameterMode};

type Binder = Box<
    dyn Fn(
            &TriggerBindingProvider,
            &TriggerAttribute,
            ParameterMode,
            ErasedExecutor,
        ) -> Result<TriggerListener, TriggerError>
        + Send
        + Sync,
>;

type Describer = fn(&str) -> ParameterDescriptor;

struct Entry {
    bind: Binder,
    describe: Describer,
}

/// Message types known by name, for hosts that discover triggers at runtime.
///
/// Each registered type carries a typed binder, so a host holding only a
/// type name and a `DynamicExecutor` can still bind a trigger.
#[derive(Default)]
pub struct MessageTypeRegistry {
    entries: HashMap<&'static str, Entry>,
}

impl MessageTypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Message>(&mut self) -> &mut Self {
        let bind: Binder = Box::new(
            |provider: &TriggerBindingProvider,
             attribute: &TriggerAttribute,
             mode: ParameterMode,
             executor: ErasedExecutor|
             -> Result<TriggerListener, TriggerError> {
                let listener = provider
                    .bind::<T>(attribute, mode)
                    .create_listener(Arc::new(executor))?;
                Ok(listener)
            },
        );
        let entry = Entry {
            bind,
            describe: describe_parameter::<T>,
        };
        self.entries.insert(T::MESSAGE_TYPE, entry);
        self
    }

    pub fn contains(&self, message_type: &str) -> bool {
        self.entries.contains_key(message_type)
    }

    /// Registered message type names, sorted.
    pub fn message_types(&self) -> Vec<&'static str> {
        let mut types: Vec<_> = self.entries.keys().copied().collect();
        types.sort_unstable();
        types
    }

    pub fn describe(
        &self,
        message_type: &str,
        parameter: &str,
    ) -> Result<ParameterDescriptor, TriggerError> {
        let entry = self.entry(message_type)?;
        Ok((entry.describe)(parameter))
    }

    /// Bind a trigger for the type registered as `message_type`.
    pub fn bind(
        &self,
        provider: &TriggerBindingProvider,
        message_type: &str,
        attribute: &TriggerAttribute,
        mode: ParameterMode,
        executor: Arc<dyn DynamicExecutor>,
    ) -> Result<TriggerListener, TriggerError> {
        let entry = self.entry(message_type)?;
        (entry.bind)(provider, attribute, mode, ErasedExecutor::new(executor))
    }

    fn entry(&self, message_type: &str) -> Result<&Entry, TriggerError> {
        self.entries
            .get(message_type)
            .ok_or_else(|| TriggerError::UnknownMessageType(message_type.to_string()))
    }
}

impl fmt::Debug for MessageTypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MessageTypeRegistry")
            .field("message_types", &self.message_types())
            .finish()
    }
}
