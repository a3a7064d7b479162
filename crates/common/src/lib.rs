//! Shared message types used across all chatplug crates.

pub mod types;

pub use types::{Attachment, AttachmentKind, Author, InboundMessage, OutboundMessage};
