//! Lifecycle events published while a request moves through the pipeline.
//!
//! Sinks are called synchronously and must be cheap. For async processing,
//! forward events through a [`ChannelSink`] and consume them on another task.
//! A panicking sink is isolated from the pipeline and the remaining sinks.
//!
//! ```
//! use restbind::{ApiEvent, EventRelay};
//! use std::sync::{Arc, Mutex};
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = {
//!     let seen = Arc::clone(&seen);
//!     move |event: &ApiEvent| seen.lock().unwrap().push(event.attempt())
//! };
//!
//! let relay = EventRelay::new().with_sink(sink);
//! # let _ = relay;
//! ```

use crate::request::RequestId;
use http::Method;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc::UnboundedSender;

/// Why an attempt failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// The attempt exceeded the per-attempt timeout.
    TimedOut,
    /// The transport could not reach the remote end.
    ConnectionFailure,
    /// The transport rejected the request as malformed.
    InvalidRequest,
    /// The caller cancelled the request.
    Cancelled,
}

/// A pipeline lifecycle event.
#[derive(Debug, Clone)]
pub enum ApiEvent {
    /// A request was built and is about to be dispatched.
    RequestBuilt {
        /// The request identity.
        request_id: RequestId,
        /// The HTTP verb.
        method: Method,
        /// The relative path.
        path: String,
    },
    /// An attempt was handed to the transport.
    RequestSent {
        /// The request identity.
        request_id: RequestId,
        /// The attempt number, starting at 1.
        attempt: usize,
    },
    /// An attempt failed without a response.
    AttemptFailed {
        /// The request identity.
        request_id: RequestId,
        /// The attempt number, starting at 1.
        attempt: usize,
        /// What went wrong.
        kind: FailureKind,
        /// A human-readable description.
        message: String,
    },
    /// Another attempt will be made.
    RetryScheduled {
        /// The request identity.
        request_id: RequestId,
        /// The number of the upcoming attempt.
        next_attempt: usize,
        /// The backoff before it, if any.
        delay: Option<Duration>,
    },
    /// A response was received.
    ResponseReceived {
        /// The request identity.
        request_id: RequestId,
        /// The attempt that produced it.
        attempt: usize,
        /// The numeric status code.
        status: u16,
        /// How long the attempt took.
        elapsed: Duration,
    },
}

impl ApiEvent {
    /// The identity of the request this event belongs to.
    pub fn request_id(&self) -> RequestId {
        match self {
            ApiEvent::RequestBuilt { request_id, .. }
            | ApiEvent::RequestSent { request_id, .. }
            | ApiEvent::AttemptFailed { request_id, .. }
            | ApiEvent::RetryScheduled { request_id, .. }
            | ApiEvent::ResponseReceived { request_id, .. } => *request_id,
        }
    }

    /// The attempt number this event refers to, if any.
    pub fn attempt(&self) -> Option<usize> {
        match self {
            ApiEvent::RequestBuilt { .. } => None,
            ApiEvent::RequestSent { attempt, .. }
            | ApiEvent::AttemptFailed { attempt, .. }
            | ApiEvent::ResponseReceived { attempt, .. } => Some(*attempt),
            ApiEvent::RetryScheduled { next_attempt, .. } => Some(*next_attempt),
        }
    }
}

/// Receives lifecycle events.
pub trait EventSink: Send + Sync {
    /// Handles one event. Must not block.
    fn on_event(&self, event: &ApiEvent);
}

impl<F> EventSink for F
where
    F: Fn(&ApiEvent) + Send + Sync,
{
    fn on_event(&self, event: &ApiEvent) {
        self(event)
    }
}

/// Forwards events into an unbounded tokio channel.
///
/// Events are dropped silently once the receiver is gone.
#[derive(Debug, Clone)]
pub struct ChannelSink(UnboundedSender<ApiEvent>);

impl ChannelSink {
    /// Wraps a sender.
    pub fn new(sender: UnboundedSender<ApiEvent>) -> Self {
        Self(sender)
    }
}

impl EventSink for ChannelSink {
    fn on_event(&self, event: &ApiEvent) {
        let _ = self.0.send(event.clone());
    }
}

/// Fans events out to every registered sink.
#[derive(Clone, Default)]
pub struct EventRelay {
    sinks: Vec<Arc<dyn EventSink>>,
}

impl EventRelay {
    /// Creates a relay with no sinks.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a sink.
    pub fn with_sink(mut self, sink: impl EventSink + 'static) -> Self {
        self.sinks.push(Arc::new(sink));
        self
    }

    /// Adds a shared sink.
    pub fn with_shared_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// The number of sinks.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Returns `true` if no sinks are registered.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Delivers an event to every sink.
    pub fn publish(&self, event: ApiEvent) {
        for sink in &self.sinks {
            let delivered = catch_unwind(AssertUnwindSafe(|| sink.on_event(&event)));
            if delivered.is_err() {
                tracing::warn!(
                    request_id = %event.request_id(),
                    "Event sink panicked; event dropped for this sink"
                );
            }
        }
    }
}

impl std::fmt::Debug for EventRelay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventRelay")
            .field("sinks", &self.sinks.len())
            .finish()
    }
}
