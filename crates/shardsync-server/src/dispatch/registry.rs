//! Handler registry and async dispatch.

use std::collections::HashMap;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use futures::FutureExt;
use metrics::{counter, histogram};
use shardsync_core::errors::FRAME_ERROR;
use shardsync_core::{ClusterId, EventPayload, Result, SenderId, SyncError, SyncFrame};
use tracing::{debug, error, instrument, warn};

use crate::context::SyncContext;
use crate::metrics::{SYNC_EVENT_DURATION_SECONDS, SYNC_EVENT_ERRORS_TOTAL, SYNC_EVENTS_TOTAL};

const SENDER_MISMATCH: &str = "SENDER_MISMATCH";

/// Trait implemented by every event handler.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle one decoded event. `origin` is the cluster whose channel
    /// delivered it; a `Some` result is sent back there.
    async fn handle(
        &self,
        sender: &SenderId,
        origin: Option<ClusterId>,
        payload: EventPayload,
        ctx: &Arc<SyncContext>,
    ) -> Result<Option<EventPayload>>;
}

/// An inbound frame plus the cluster whose channel delivered it.
#[derive(Clone, Debug)]
pub struct InboundMessage {
    /// Originating cluster, when the frame came over a cluster channel.
    pub origin: Option<ClusterId>,
    /// The frame.
    pub frame: SyncFrame,
}

/// What happened to one inbound message.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handled, reply sent to the origin.
    Replied,
    /// Handled, nothing to send back (or nowhere to send it).
    Handled,
    /// Handled, but the reply could not be delivered.
    ReplyFailed,
    /// No handler for the tag; dropped.
    Unhandled,
    /// Payload did not match the tag's schema; dropped.
    Rejected,
    /// A cluster sender id that does not match the delivering channel; dropped.
    SenderMismatch,
    /// The handler returned an error with this code.
    Failed(&'static str),
    /// The handler panicked.
    Panicked,
}

/// Registry mapping event tags to handlers. Immutable once shared.
pub struct EventRegistry {
    handlers: HashMap<String, Arc<dyn EventHandler>>,
}

impl EventRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    /// Register a handler for a tag. A second handler for the same tag is
    /// rejected.
    pub fn register(&mut self, tag: &str, handler: impl EventHandler + 'static) -> Result<()> {
        if self.handlers.contains_key(tag) {
            return Err(SyncError::DuplicateTag(tag.to_owned()));
        }
        let _ = self.handlers.insert(tag.to_owned(), Arc::new(handler));
        Ok(())
    }

    /// Dispatch one message.
    ///
    /// Never fails: unknown tags, bad payloads, handler errors and handler
    /// panics are logged and reported in the outcome. A frame whose
    /// `senderId` names a different cluster than the channel it arrived on
    /// never reaches a handler.
    #[instrument(skip_all, fields(event = %message.frame.event, sender = %message.frame.sender_id))]
    pub async fn dispatch(&self, message: InboundMessage, ctx: &Arc<SyncContext>) -> DispatchOutcome {
        let InboundMessage { origin, frame } = message;
        let SyncFrame {
            event,
            sender_id,
            data,
        } = frame;

        let Some(handler) = self.handlers.get(&event).cloned() else {
            debug!(?origin, "no handler registered, dropping");
            return DispatchOutcome::Unhandled;
        };
        counter!(SYNC_EVENTS_TOTAL, "event" => event.clone()).increment(1);

        if let (Some(origin), Some(claimed)) = (origin, sender_id.cluster_id()) {
            if origin != claimed {
                counter!(SYNC_EVENT_ERRORS_TOTAL, "event" => event.clone(), "code" => SENDER_MISMATCH)
                    .increment(1);
                warn!(cluster_id = %origin, claimed = %claimed, "sender does not match channel, dropping");
                return DispatchOutcome::SenderMismatch;
            }
        }

        let payload = match EventPayload::decode(&event, data) {
            Ok(payload) => payload,
            Err(e) => {
                counter!(SYNC_EVENT_ERRORS_TOTAL, "event" => event.clone(), "code" => FRAME_ERROR)
                    .increment(1);
                warn!(error = %e, "dropping event with invalid payload");
                return DispatchOutcome::Rejected;
            }
        };

        let start = Instant::now();
        let result = AssertUnwindSafe(handler.handle(&sender_id, origin, payload, ctx))
            .catch_unwind()
            .await;
        histogram!(SYNC_EVENT_DURATION_SECONDS, "event" => event.clone())
            .record(start.elapsed().as_secs_f64());

        match result {
            Err(_panic) => {
                counter!(SYNC_EVENT_ERRORS_TOTAL, "event" => event.clone(), "code" => "PANIC")
                    .increment(1);
                error!("event handler panicked");
                DispatchOutcome::Panicked
            }
            Ok(Err(e)) => {
                counter!(SYNC_EVENT_ERRORS_TOTAL, "event" => event.clone(), "code" => e.code())
                    .increment(1);
                warn!(error = %e, code = e.code(), "event handler failed");
                DispatchOutcome::Failed(e.code())
            }
            Ok(Ok(None)) => DispatchOutcome::Handled,
            Ok(Ok(Some(reply))) => {
                let Some(origin) = origin else {
                    debug!(reply = reply.event(), "no origin channel, reply dropped");
                    return DispatchOutcome::Handled;
                };
                match ctx.manager.send_to(origin, &reply) {
                    Ok(()) => DispatchOutcome::Replied,
                    Err(e) => {
                        warn!(cluster_id = %origin, reply = reply.event(), error = %e, "failed to send reply");
                        DispatchOutcome::ReplyFailed
                    }
                }
            }
        }
    }

    /// List all registered tags (sorted).
    pub fn tags(&self) -> Vec<String> {
        let mut names: Vec<String> = self.handlers.keys().cloned().collect();
        names.sort();
        names
    }

    /// Check whether a tag has a handler.
    pub fn has_tag(&self, tag: &str) -> bool {
        self.handlers.contains_key(tag)
    }
}

impl Default for EventRegistry {
    fn default() -> Self {
        Self::new()
    }
}
