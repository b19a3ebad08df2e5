//! Push event types and the JSON frame codec for the push channel.
//!
//! Every frame the server pushes is a JSON text message of the form
//! `{"event": "CALL_STARTED", "data": {...}}` with camelCase payload fields.
//! No network I/O occurs here.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::listing::Comment;

/// Payload of `CALL_STARTED`: an operator started calling a listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallStarted {
    pub real_estate_id: String,
    pub user_id: String,
    #[serde(default)]
    pub avatar_url: String,
    pub full_name: String,
}

/// Payload of `CALL_ENDED`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallEnded {
    pub real_estate_id: String,
}

/// Payload of `CLIENT_DISCONNECTED`: an operator's session dropped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientDisconnected {
    pub user_id: String,
}

/// Payload shared by `REAL_ESTATE_SAVED` and `DUPLICATE_ADDED`: which
/// operator acted on which listing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingActed {
    pub real_estate_id: String,
    pub user_id: String,
}

/// Payload of `STATUS_CHANGED`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusChanged {
    pub real_estate_id: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
}

/// Payload of `COMMENT_ADDED`. The comment body is optional: older servers
/// only announce that the counter moved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommentAdded {
    pub real_estate_id: String,
    pub user_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub comment: Option<Comment>,
}

/// Payload of `PAYMENT_COMPLETED`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentCompleted {
    pub payment_id: String,
}

/// A server-pushed notification.
///
/// Uses adjacently tagged serde serialization, which matches the wire frame
/// exactly: the variant name in SCREAMING_SNAKE_CASE under `"event"`, the
/// payload under `"data"`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PushEvent {
    RealEstateSaved(ListingActed),
    CallStarted(CallStarted),
    CallEnded(CallEnded),
    ClientDisconnected(ClientDisconnected),
    DuplicateAdded(ListingActed),
    StatusChanged(StatusChanged),
    CommentAdded(CommentAdded),
    PaymentCompleted(PaymentCompleted),
}

/// Name of a push event, used as the subscription key on the channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    RealEstateSaved,
    CallStarted,
    CallEnded,
    ClientDisconnected,
    DuplicateAdded,
    StatusChanged,
    CommentAdded,
    PaymentCompleted,
}

impl EventKind {
    /// The seven events that mutate listing pages.
    pub const LISTING_EVENTS: [Self; 7] = [
        Self::RealEstateSaved,
        Self::CallStarted,
        Self::CallEnded,
        Self::ClientDisconnected,
        Self::DuplicateAdded,
        Self::StatusChanged,
        Self::CommentAdded,
    ];

    /// Wire name of the event.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::RealEstateSaved => "REAL_ESTATE_SAVED",
            Self::CallStarted => "CALL_STARTED",
            Self::CallEnded => "CALL_ENDED",
            Self::ClientDisconnected => "CLIENT_DISCONNECTED",
            Self::DuplicateAdded => "DUPLICATE_ADDED",
            Self::StatusChanged => "STATUS_CHANGED",
            Self::CommentAdded => "COMMENT_ADDED",
            Self::PaymentCompleted => "PAYMENT_COMPLETED",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl PushEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            Self::RealEstateSaved(_) => EventKind::RealEstateSaved,
            Self::CallStarted(_) => EventKind::CallStarted,
            Self::CallEnded(_) => EventKind::CallEnded,
            Self::ClientDisconnected(_) => EventKind::ClientDisconnected,
            Self::DuplicateAdded(_) => EventKind::DuplicateAdded,
            Self::StatusChanged(_) => EventKind::StatusChanged,
            Self::CommentAdded(_) => EventKind::CommentAdded,
            Self::PaymentCompleted(_) => EventKind::PaymentCompleted,
        }
    }

    /// The listing the event refers to, if any.
    pub fn real_estate_id(&self) -> Option<&str> {
        match self {
            Self::RealEstateSaved(e) | Self::DuplicateAdded(e) => Some(e.real_estate_id.as_str()),
            Self::CallStarted(e) => Some(e.real_estate_id.as_str()),
            Self::CallEnded(e) => Some(e.real_estate_id.as_str()),
            Self::StatusChanged(e) => Some(e.real_estate_id.as_str()),
            Self::CommentAdded(e) => Some(e.real_estate_id.as_str()),
            Self::ClientDisconnected(_) | Self::PaymentCompleted(_) => None,
        }
    }
}

/// Decode one text frame from the push channel.
///
/// Frames that are not valid JSON, carry an unknown event name, or have a
/// payload of the wrong shape are skipped for forward compatibility: the
/// failure is logged at `debug` and `None` is returned.
///
/// # Arguments
///
/// * `text` - The raw text frame as received.
///
/// # Returns
///
/// `Some(PushEvent)` if the frame is a known, well-formed event.
pub fn decode_push_frame(text: &str) -> Option<PushEvent> {
    match serde_json::from_str::<PushEvent>(text) {
        Ok(event) => Some(event),
        Err(e) => {
            tracing::debug!(error = %e, frame_len = text.len(), "skipping undecodable push frame");
            None
        }
    }
}

/// Encode an event into a wire frame.
///
/// # Errors
///
/// Returns `serde_json::Error` if serialization fails.
pub fn encode_push_frame(event: &PushEvent) -> serde_json::Result<String> {
    serde_json::to_string(event)
}
