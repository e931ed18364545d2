//! Queue subscriptions aggregated by a listener before its connection is built.

use std::fmt;

use crate::bus::{Message, ReceiveEndpointConfigurator};
use crate::config::CompositeConfiguration;
use crate::dispatch::{DispatchAdapter, ParameterMode};

/// Whether a handler needs a session-aware receive endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionUsage {
    #[default]
    None,
    Activated,
}

impl SessionUsage {
    pub fn from_flag(use_session: bool) -> Self {
        if use_session {
            SessionUsage::Activated
        } else {
            SessionUsage::None
        }
    }

    pub fn is_activated(self) -> bool {
        self == SessionUsage::Activated
    }
}

type WiringAction = Box<dyn Fn(&mut ReceiveEndpointConfigurator) + Send + Sync>;

/// One handler registration on a queue.
///
/// The wiring action runs when the connection is built and attaches the
/// handler to the queue's receive endpoint. It is `Fn` so a retried start
/// can wire the endpoint again.
pub struct QueueSubscription {
    message_type: &'static str,
    session_usage: SessionUsage,
    parameter_mode: ParameterMode,
    wire: WiringAction,
}

impl QueueSubscription {
    /// A subscription with a custom wiring action.
    pub fn new<F>(message_type: &'static str, wire: F) -> Self
    where
        F: Fn(&mut ReceiveEndpointConfigurator) + Send + Sync + 'static,
    {
        Self {
            message_type,
            session_usage: SessionUsage::None,
            parameter_mode: ParameterMode::Message,
            wire: Box::new(wire),
        }
    }

    /// A subscription that dispatches `T` through `adapter`, with handler
    /// settings taken from `configuration`.
    pub fn for_adapter<T: Message>(
        session_usage: SessionUsage,
        configuration: CompositeConfiguration<T>,
        adapter: DispatchAdapter<T>,
    ) -> Self {
        let parameter_mode = adapter.mode();
        Self::new(T::MESSAGE_TYPE, move |endpoint| {
            let adapter = adapter.clone();
            endpoint.handler::<T, _, _>(
                move |context| {
                    let adapter = adapter.clone();
                    async move { adapter.dispatch(context).await }
                },
                |handler| configuration.configure(handler),
            );
        })
        .with_session(session_usage)
        .with_parameter_mode(parameter_mode)
    }

    pub fn with_session(mut self, session_usage: SessionUsage) -> Self {
        self.session_usage = session_usage;
        self
    }

    pub fn with_parameter_mode(mut self, parameter_mode: ParameterMode) -> Self {
        self.parameter_mode = parameter_mode;
        self
    }

    pub fn message_type(&self) -> &'static str {
        self.message_type
    }

    pub fn session_usage(&self) -> SessionUsage {
        self.session_usage
    }

    pub fn parameter_mode(&self) -> ParameterMode {
        self.parameter_mode
    }

    /// Apply this subscription to its queue's receive endpoint.
    pub(crate) fn wire(&self, endpoint: &mut ReceiveEndpointConfigurator) {
        if self.session_usage.is_activated() {
            endpoint.set_requires_session(true);
        }
        (self.wire)(endpoint)
    }
}

impl fmt::Debug for QueueSubscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueueSubscription")
            .field("message_type", &self.message_type)
            .field("session_usage", &self.session_usage)
            .field("parameter_mode", &self.parameter_mode)
            .finish_non_exhaustive()
    }
}
