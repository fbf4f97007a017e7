//! Gateway Protocol types for communication between intake and messaging gateways.
//!
//! A gateway (LINE, Telegram, a web widget, ...) translates platform webhooks
//! into [`InboundEvent`]s, posts them to intake, and renders the returned
//! [`OutboundMessage`]s on its platform.
//!
//! # Protocol Overview
//!
//! Everything is JSON, internally tagged with a `type` field:
//!
//! - **Inbound events** (Gateway → intake): a user sent a message, or pressed
//!   an inline keyboard button.
//! - **Outbound messages** (intake → Gateway): plain text, or text carrying an
//!   inline keyboard whose buttons echo `callback_data` back as a callback query.
//!
//! # Example
//!
//! ```
//! use intake_gateway_protocol::InboundEvent;
//!
//! let json = r#"{
//!     "type": "message_received",
//!     "message_id": "m-1",
//!     "sender": { "id": "U1" },
//!     "content": { "type": "text", "text": "Taro" }
//! }"#;
//! let event: InboundEvent = serde_json::from_str(json).unwrap();
//! assert_eq!(event.sender_id(), "U1");
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ============================================================================
// Inbound (Gateway → intake)
// ============================================================================

/// Events sent from a gateway to intake.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// Incoming message from a user.
    MessageReceived(Box<MessageReceivedData>),

    /// Callback query from an inline keyboard button press.
    CallbackQuery(Box<CallbackQueryData>),
}

impl InboundEvent {
    /// Identifier of the user who produced this event.
    pub fn sender_id(&self) -> &str {
        match self {
            InboundEvent::MessageReceived(data) => &data.sender.id,
            InboundEvent::CallbackQuery(data) => &data.sender.id,
        }
    }

    /// When the platform says the event happened, if it told us.
    pub fn timestamp(&self) -> Option<DateTime<Utc>> {
        match self {
            InboundEvent::MessageReceived(data) => data.timestamp,
            InboundEvent::CallbackQuery(data) => data.timestamp,
        }
    }
}

/// Data for an incoming message event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MessageReceivedData {
    /// Platform message identifier. Stable across redeliveries.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    pub sender: Sender,
    pub content: MessageContent,
    /// Timestamp when the message was sent (from the platform).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Data for a callback query event (inline keyboard button press).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackQueryData {
    /// Unique identifier for this callback query, when the platform has one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_query_id: Option<String>,
    /// User who pressed the button.
    pub sender: Sender,
    /// Data from the pressed button.
    pub data: String,
    /// Timestamp of the button press (from the platform).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

/// Sender information for inbound events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sender {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
}

impl Sender {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: None,
        }
    }
}

/// Content of an incoming message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum MessageContent {
    /// Plain text message.
    Text { text: String },

    /// Sticker / emoji message.
    Sticker {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        sticker_id: Option<String>,
    },

    /// Media message (image, video, audio, document).
    Media {
        media_type: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        url: Option<String>,
    },

    /// Location message.
    Location { latitude: f64, longitude: f64 },

    /// Any content type not listed above. Extra fields are discarded.
    #[serde(other)]
    Unknown,
}

impl MessageContent {
    /// Extract text content if this is a text message.
    ///
    /// Media captions are deliberately not treated as text input.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            MessageContent::Text { text } => Some(text),
            _ => None,
        }
    }
}

// ============================================================================
// Outbound (intake → Gateway)
// ============================================================================

/// A message intake wants delivered to the user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundMessage {
    /// Plain text.
    Text { content: String },

    /// Text with an inline keyboard attached.
    Keyboard {
        content: String,
        inline_keyboard: InlineKeyboard,
    },
}

impl OutboundMessage {
    pub fn text(content: impl Into<String>) -> Self {
        OutboundMessage::Text {
            content: content.into(),
        }
    }

    /// The message body, regardless of kind.
    pub fn content(&self) -> &str {
        match self {
            OutboundMessage::Text { content } | OutboundMessage::Keyboard { content, .. } => {
                content
            }
        }
    }

    /// The inline keyboard, if the message carries one.
    pub fn keyboard(&self) -> Option<&InlineKeyboard> {
        match self {
            OutboundMessage::Keyboard {
                inline_keyboard, ..
            } => Some(inline_keyboard),
            OutboundMessage::Text { .. } => None,
        }
    }
}

/// Inline keyboard for interactive buttons in messages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineKeyboard {
    /// Rows of buttons (each row is a Vec of buttons).
    pub rows: Vec<Vec<InlineButton>>,
}

/// A button in an inline keyboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InlineButton {
    /// Button text displayed to user.
    pub text: String,
    /// Callback data sent back in a [`CallbackQueryData`] when pressed.
    pub callback_data: String,
}

impl InlineKeyboard {
    /// Create a single-row keyboard with the given buttons.
    pub fn single_row(buttons: Vec<InlineButton>) -> Self {
        Self {
            rows: vec![buttons],
        }
    }

    /// Iterate over every button, row by row.
    pub fn buttons(&self) -> impl Iterator<Item = &InlineButton> {
        self.rows.iter().flatten()
    }
}

impl InlineButton {
    /// Create a new button.
    pub fn new(text: impl Into<String>, callback_data: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            callback_data: callback_data.into(),
        }
    }
}
