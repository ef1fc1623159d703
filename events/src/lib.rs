//! Shared event envelope for the realtime WS transport.
//!
//! This crate owns the wire representation used by both `server` and
//! `client`. Every message in either direction is an [`Envelope`]:
//! `{ "type": ..., "payload": {...}, "timestamp": "<RFC-3339>" }`.
//!
//! DESIGN
//! ======
//! The event body is an adjacently-tagged sum type: `type` selects the
//! variant, `payload` carries that variant's strongly-typed shape. Dispatch
//! sites match on the enum instead of casting untyped payload maps.
//!
//! Unknown inbound `type` values are a distinct parse error so receivers can
//! log them as unhandled and keep the connection open — new event types must
//! be ignorable by old clients.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use uuid::Uuid;

/// Error returned by [`Envelope::parse`].
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    /// The text was not valid JSON, or a known type carried a bad payload.
    #[error("malformed event: {0}")]
    Json(#[from] serde_json::Error),
    /// Valid JSON whose `type` field names no known event.
    #[error("unknown event type: {0}")]
    UnknownType(String),
}

// =============================================================================
// PAYLOADS
// =============================================================================

/// Greeting sent to a socket right after it registers. Never broadcast.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Connected {
    pub message: String,
}

/// A lead was dragged between kanban stages (or off the board entirely).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadMoved {
    pub lead_id: Uuid,
    pub from_stage_id: Option<Uuid>,
    pub to_stage_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funnel_id: Option<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadCreated {
    pub lead_id: Uuid,
    #[serde(default)]
    pub stage_id: Option<Uuid>,
}

/// Payload for `lead:updated` and `lead:deleted`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeadRef {
    pub lead_id: Uuid,
}

/// Payload for all three stage lifecycle events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRef {
    pub stage_id: Uuid,
    pub funnel_id: Uuid,
}

/// Live pointer position, as percentages of the kanban viewport.
///
/// `oderId` is the participant identity field name on the wire — a legacy
/// contract inherited from the first client, kept verbatim.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorMove {
    pub oder_id: String,
    pub x: f64,
    pub y: f64,
    pub name: String,
    pub color: String,
    pub funnel_id: Uuid,
}

/// Presence hint for `cursor:enter` and `cursor:leave`. Carries no
/// coordinates; position is only ever learned from `cursor:move`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CursorHint {
    pub oder_id: String,
    pub name: String,
    pub color: String,
    pub funnel_id: Uuid,
}

// =============================================================================
// EVENT BODY
// =============================================================================

/// Every event type on the wire, tagged by `type` with its payload under
/// `payload`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "payload")]
pub enum EventBody {
    #[serde(rename = "connected")]
    Connected(Connected),
    #[serde(rename = "lead:moved")]
    LeadMoved(LeadMoved),
    #[serde(rename = "lead:created")]
    LeadCreated(LeadCreated),
    #[serde(rename = "lead:updated")]
    LeadUpdated(LeadRef),
    #[serde(rename = "lead:deleted")]
    LeadDeleted(LeadRef),
    #[serde(rename = "stage:created")]
    StageCreated(StageRef),
    #[serde(rename = "stage:updated")]
    StageUpdated(StageRef),
    #[serde(rename = "stage:deleted")]
    StageDeleted(StageRef),
    #[serde(rename = "cursor:move")]
    CursorMove(CursorMove),
    #[serde(rename = "cursor:enter")]
    CursorEnter(CursorHint),
    #[serde(rename = "cursor:leave")]
    CursorLeave(CursorHint),
}

/// Wire tags accepted by [`Envelope::parse`]. Anything else is
/// [`ParseError::UnknownType`].
const KNOWN_TYPES: &[&str] = &[
    "connected",
    "lead:moved",
    "lead:created",
    "lead:updated",
    "lead:deleted",
    "stage:created",
    "stage:updated",
    "stage:deleted",
    "cursor:move",
    "cursor:enter",
    "cursor:leave",
];

impl EventBody {
    /// Wire tag for this event, for logs and metrics.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Connected(_) => "connected",
            Self::LeadMoved(_) => "lead:moved",
            Self::LeadCreated(_) => "lead:created",
            Self::LeadUpdated(_) => "lead:updated",
            Self::LeadDeleted(_) => "lead:deleted",
            Self::StageCreated(_) => "stage:created",
            Self::StageUpdated(_) => "stage:updated",
            Self::StageDeleted(_) => "stage:deleted",
            Self::CursorMove(_) => "cursor:move",
            Self::CursorEnter(_) => "cursor:enter",
            Self::CursorLeave(_) => "cursor:leave",
        }
    }

    /// True for the ephemeral cursor events the server relays verbatim.
    #[must_use]
    pub fn is_cursor(&self) -> bool {
        matches!(self, Self::CursorMove(_) | Self::CursorEnter(_) | Self::CursorLeave(_))
    }
}

// =============================================================================
// ENVELOPE
// =============================================================================

/// One complete wire message: typed body plus creation timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    #[serde(flatten)]
    pub body: EventBody,
    /// RFC-3339 creation time, stamped by the producer. Informational only;
    /// receivers never order by it.
    pub timestamp: String,
}

/// Current UTC time as an RFC-3339 string.
fn now_rfc3339() -> String {
    let Ok(ts) = OffsetDateTime::now_utc().format(&Rfc3339) else {
        return String::new();
    };
    ts
}

impl Envelope {
    /// Wrap a body with a fresh timestamp.
    #[must_use]
    pub fn now(body: EventBody) -> Self {
        Self { body, timestamp: now_rfc3339() }
    }

    /// Parse one inbound text frame.
    ///
    /// # Errors
    ///
    /// [`ParseError::UnknownType`] for well-formed JSON naming an
    /// unrecognized event type; [`ParseError::Json`] for everything else.
    pub fn parse(text: &str) -> Result<Self, ParseError> {
        match serde_json::from_str::<Self>(text) {
            Ok(envelope) => Ok(envelope),
            Err(err) => {
                if let Ok(value) = serde_json::from_str::<serde_json::Value>(text) {
                    if let Some(kind) = value.get("type").and_then(|v| v.as_str()) {
                        if !KNOWN_TYPES.contains(&kind) {
                            return Err(ParseError::UnknownType(kind.to_owned()));
                        }
                    }
                }
                Err(ParseError::Json(err))
            }
        }
    }

    /// Serialize for the wire.
    ///
    /// # Errors
    ///
    /// Returns the underlying serde error; cannot occur for envelopes built
    /// from the types in this crate.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

#[cfg(test)]
#[path = "lib_test.rs"]
mod tests;
