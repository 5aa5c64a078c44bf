//! Wire frame codec.
//!
//! Every channel message is one JSON text record:
//!
//! ```json
//! { "event": "SERVER_COUNT", "senderId": "cluster_3", "data": { "serverCount": 812 } }
//! ```
//!
//! `data` is optional on the wire and defaults to `null`.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::FrameError;
use crate::events::EventPayload;
use crate::ids::SenderId;

/// One framed sync message.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncFrame {
    /// Event tag used for handler lookup.
    pub event: String,
    /// Role-prefixed identity of the sender.
    pub sender_id: SenderId,
    /// Event-specific body.
    #[serde(default)]
    pub data: Value,
}

impl SyncFrame {
    /// Build a frame from raw parts.
    pub fn new(event: impl Into<String>, sender_id: SenderId, data: Value) -> Self {
        Self {
            event: event.into(),
            sender_id,
            data,
        }
    }

    /// Build a frame carrying a typed payload.
    pub fn from_payload(sender_id: SenderId, payload: &EventPayload) -> Result<Self, FrameError> {
        Ok(Self {
            event: payload.event().to_owned(),
            sender_id,
            data: payload.to_data()?,
        })
    }

    /// Parse one text message.
    pub fn decode(text: &str) -> Result<Self, FrameError> {
        let frame: Self =
            serde_json::from_str(text).map_err(|e| FrameError::Malformed(e.to_string()))?;
        if frame.event.trim().is_empty() {
            return Err(FrameError::MissingEvent);
        }
        Ok(frame)
    }

    /// Serialize to one text message.
    pub fn encode(&self) -> Result<String, FrameError> {
        serde_json::to_string(self).map_err(|e| FrameError::Encode(e.to_string()))
    }

    /// Decode `data` according to the event tag.
    pub fn payload(&self) -> Result<EventPayload, FrameError> {
        EventPayload::decode(&self.event, self.data.clone())
    }
}
