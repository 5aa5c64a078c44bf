//! Event dispatch: tag → handler lookup, typed payload decoding and replies.

pub mod handlers;
pub mod registry;

pub use registry::{DispatchOutcome, EventHandler, EventRegistry, InboundMessage};
