//! Trigger binding: from a declared trigger to a subscription on the
//! shared bus listener.
//!
//! ```text
//! TriggerAttribute ──NameResolver──► TriggerBinding<T> ──create_listener──► TriggerListener
//!                                                            │
//!                                  ListenerRegistry ◄────────┘ (one Listener per bus)
//! ```

mod attribute;
mod binding;
mod error;
mod registry;
mod resolver;

pub use attribute::TriggerAttribute;
pub use binding::{
    ParameterDescriptor, TriggerBinding, TriggerBindingProvider, TriggerListener, TRIGGER_KIND,
};
pub use error::TriggerError;
pub use registry::MessageTypeRegistry;
pub use resolver::{EnvNameResolver, MapNameResolver, NameResolver};
