//! Protocol event model: what the transport hands us, and what we send back.
//!
//! Inbound events arrive as loosely-typed JSON content; this module decodes the
//! handful of fields the bot reads. Outbound content is built from
//! [`MessageContent`] and serialized to the protocol's JSON shape.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::ids::{ContentUri, EventId, RoomId, UserId};

/// Event type of a plaintext room message.
pub const EVENT_MESSAGE: &str = "m.room.message";

/// Event type of an encrypted room event.
pub const EVENT_ENCRYPTED: &str = "m.room.encrypted";

/// Relation type marking an edit of an earlier message.
pub const REL_REPLACE: &str = "m.replace";

/// Relation type used to thread a diagram under the message that caused it.
pub const REL_THREAD: &str = "m.thread";

// ---------------------------------------------------------------------------
// Inbound
// ---------------------------------------------------------------------------

/// A plaintext room message, after any decryption.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundMessage {
    pub room_id: RoomId,
    pub sender: UserId,
    pub event_id: EventId,
    /// Effective text: the edited text for edits, reply fallback removed.
    pub body: String,
    /// Set when this event is an edit of an earlier message.
    pub replaces: Option<EventId>,
}

impl InboundMessage {
    /// Decode `m.room.message` content. Returns `None` when there is no text body.
    pub fn from_content(
        room_id: RoomId,
        sender: UserId,
        event_id: EventId,
        content: &Value,
    ) -> Option<Self> {
        let content: MessageEventContent = serde_json::from_value(content.clone()).ok()?;

        let replaces = content
            .relates_to
            .as_ref()
            .filter(|rel| rel.rel_type.as_deref() == Some(REL_REPLACE))
            .and_then(|rel| rel.event_id.clone());

        let body = match (&replaces, content.new_content) {
            (Some(_), Some(new_content)) => new_content.body?,
            _ => content.body?,
        };

        Some(Self {
            room_id,
            sender,
            event_id,
            body: strip_reply_fallback(&body).to_string(),
            replaces,
        })
    }

    /// The logical message this event belongs to: the original for edits.
    pub fn logical_event_id(&self) -> &EventId {
        self.replaces.as_ref().unwrap_or(&self.event_id)
    }
}

#[derive(Debug, Deserialize)]
struct MessageEventContent {
    body: Option<String>,
    #[serde(rename = "m.relates_to")]
    relates_to: Option<RelatesTo>,
    #[serde(rename = "m.new_content")]
    new_content: Option<NewContent>,
}

#[derive(Debug, Deserialize)]
struct RelatesTo {
    rel_type: Option<String>,
    event_id: Option<EventId>,
}

#[derive(Debug, Deserialize)]
struct NewContent {
    body: Option<String>,
}

/// Remove the quoted `> ` fallback a client prepends to replies.
pub fn strip_reply_fallback(body: &str) -> &str {
    if !body.starts_with("> ") {
        return body;
    }
    let mut offset = 0;
    for line in body.split_inclusive('\n') {
        if line.starts_with('>') {
            offset += line.len();
        } else {
            break;
        }
    }
    let rest = &body[offset..];
    rest.strip_prefix("\r\n")
        .or_else(|| rest.strip_prefix('\n'))
        .unwrap_or(rest)
}

/// Room membership states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Membership {
    Invite,
    Join,
    Leave,
    Ban,
    Knock,
}

impl Membership {
    pub fn is_leave_or_ban(self) -> bool {
        matches!(self, Membership::Leave | Membership::Ban)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Membership::Invite => "invite",
            Membership::Join => "join",
            Membership::Leave => "leave",
            Membership::Ban => "ban",
            Membership::Knock => "knock",
        }
    }
}

impl std::str::FromStr for Membership {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "invite" => Ok(Membership::Invite),
            "join" => Ok(Membership::Join),
            "leave" => Ok(Membership::Leave),
            "ban" => Ok(Membership::Ban),
            "knock" => Ok(Membership::Knock),
            other => Err(format!("invalid membership: '{other}'")),
        }
    }
}

/// A membership state change for one user in one room.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MembershipChange {
    pub room_id: RoomId,
    pub user_id: UserId,
    pub membership: Membership,
}

/// An event still sealed by end-to-end encryption.
#[derive(Debug, Clone, PartialEq)]
pub struct EncryptedEvent {
    pub room_id: RoomId,
    pub sender: UserId,
    pub event_id: EventId,
    /// Milliseconds since the epoch, as stamped by the sender's homeserver.
    pub origin_server_ts: u64,
    pub content: Value,
}

/// Result of decrypting an [`EncryptedEvent`].
#[derive(Debug, Clone, PartialEq)]
pub struct DecryptedEvent {
    pub event_type: String,
    pub content: Value,
}

/// Everything the transport feeds into the event router.
#[derive(Debug, Clone, PartialEq)]
pub enum InboundEvent {
    Message(InboundMessage),
    Encrypted(EncryptedEvent),
    Membership(MembershipChange),
    /// The room turned on encryption; `content` is the state event content.
    Encryption { room_id: RoomId, content: Value },
}

// ---------------------------------------------------------------------------
// Outbound
// ---------------------------------------------------------------------------

/// Metadata describing an uploaded image.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub mimetype: String,
    pub size: usize,
    pub w: u32,
    pub h: u32,
}

/// Content of a message the bot sends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageContent {
    /// A notice with an optional HTML rendering.
    Notice {
        body: String,
        formatted_body: Option<String>,
    },
    /// An uploaded image, optionally threaded under another event.
    Image {
        body: String,
        url: ContentUri,
        info: ImageInfo,
        thread_root: Option<EventId>,
    },
}

impl MessageContent {
    /// Serialize as `m.room.message` content.
    pub fn to_json(&self) -> Value {
        match self {
            MessageContent::Notice {
                body,
                formatted_body,
            } => {
                let mut content = json!({ "msgtype": "m.notice", "body": body });
                if let Some(html) = formatted_body {
                    content["format"] = json!("org.matrix.custom.html");
                    content["formatted_body"] = json!(html);
                }
                content
            }
            MessageContent::Image {
                body, url, info, ..
            } => {
                let mut content = json!({
                    "msgtype": "m.image",
                    "body": body,
                    "url": url,
                    "info": info,
                });
                if let Some(relates_to) = self.relates_to() {
                    content["m.relates_to"] = relates_to;
                }
                content
            }
        }
    }

    /// The `m.relates_to` block, which must stay readable after encryption.
    pub fn relates_to(&self) -> Option<Value> {
        match self {
            MessageContent::Image {
                thread_root: Some(root),
                ..
            } => Some(json!({ "rel_type": REL_THREAD, "event_id": root })),
            _ => None,
        }
    }
}
