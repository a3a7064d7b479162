//! The common message shape every platform adapter translates to and from.
//!
//! Adapters emit [`InboundMessage`] values into their outbound queue; the
//! exchange turns each one into an [`OutboundMessage`] delivered to the peer
//! threads of the same connection. Attachments are opaque references (type,
//! URL, display name) and are never reinterpreted by the core.

use serde::{Deserialize, Serialize};

/// Kind of a forwarded attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttachmentKind {
    Video,
    Gif,
    Image,
    Audio,
    File,
}

impl AttachmentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Gif => "gif",
            Self::Image => "image",
            Self::Audio => "audio",
            Self::File => "file",
        }
    }
}

/// An attachment carried alongside a message, forwarded by reference.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub url: String,
    pub name: String,
}

/// The platform-side author of a message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub username: String,
    /// Author ID in the origin platform's namespace.
    pub external_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_url: Option<String>,
}

impl Author {
    pub fn new(username: impl Into<String>, external_id: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            external_id: external_id.into(),
            avatar_url: None,
        }
    }
}

/// A platform message as received by an adapter, before routing.
///
/// The adapter only knows platform-side identifiers; the exchange resolves
/// the owning thread and connection from the topology store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundMessage {
    /// External ID of the thread the message was posted in.
    pub origin_external_id: String,
    /// Display name of the origin thread, when the platform provides one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_name: Option<String>,
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub author: Author,
}

impl InboundMessage {
    /// Plain-text message with no attachments.
    pub fn text(
        origin_external_id: impl Into<String>,
        author: Author,
        content: impl Into<String>,
    ) -> Self {
        Self {
            origin_external_id: origin_external_id.into(),
            origin_name: None,
            content: content.into(),
            attachments: Vec::new(),
            author,
        }
    }
}

/// A routed message handed to a target adapter's `send`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub content: String,
    pub attachments: Vec<Attachment>,
    pub author: Author,
    /// Instance name of the service the message originated from, for
    /// platforms that prefix forwarded messages with their source.
    pub origin_instance: String,
    /// Display name of the origin thread, when known.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub origin_name: Option<String>,
}
