//! Outbound message texts.
//!
//! Wording is fixed; gateways only render what they are given.

use intake_gateway_protocol::{InlineButton, InlineKeyboard, OutboundMessage};

use super::field::Field;
use super::payload::{Answer, ConfirmationPayload};
use crate::session::{ConfirmationToken, ConfirmedValues};

pub const CONFIRMING_IN_PROGRESS: &str =
    "A confirmation is in progress. Please choose Yes or No.";
pub const INVALID_OPERATION: &str = "That action is no longer valid.";
pub const FIELD_MISMATCH: &str = "That button is for an item that is not being confirmed.";
pub const RETRY: &str = "Please enter it again.";
pub const UNSUPPORTED_WHILE_CONFIRMING: &str =
    "Stickers and attachments can't be used while confirming. Please choose Yes or No.";
pub const UNSUPPORTED_INPUT: &str =
    "Stickers and attachments aren't supported. Please reply with text.";

/// Sent once for any failure that prevented the event from being handled.
pub const APOLOGY: &str = "Sorry, something went wrong on our side. Please try again.";

const YES_LABEL: &str = "Yes";
const NO_LABEL: &str = "No";

fn label(field: Field) -> &'static str {
    match field {
        Field::Name => "Name",
        Field::Address => "Address",
        Field::Phone => "Phone",
    }
}

/// Ask the user to type a field.
pub fn prompt(field: Field) -> OutboundMessage {
    let text = match field {
        Field::Name => "Please enter your name.",
        Field::Address => "Please enter your address.",
        Field::Phone => "Please enter your phone number.",
    };
    OutboundMessage::text(text)
}

/// Ask the user to confirm a candidate value with yes/no buttons.
pub fn confirmation(field: Field, value: &str, token: &ConfirmationToken) -> OutboundMessage {
    let question = match field {
        Field::Name => "Is this name correct?",
        Field::Address => "Is this address correct?",
        Field::Phone => "Is this phone number correct?",
    };

    let button = |text: &str, answer| {
        InlineButton::new(
            text,
            ConfirmationPayload::encode(token.as_str(), field.as_str(), answer),
        )
    };

    OutboundMessage::Keyboard {
        content: format!("{question}\n\n\"{value}\""),
        inline_keyboard: InlineKeyboard::single_row(vec![
            button(YES_LABEL, Answer::Yes),
            button(NO_LABEL, Answer::No),
        ]),
    }
}

/// Summary sent when every field has been confirmed.
pub fn completion(values: &ConfirmedValues) -> OutboundMessage {
    let mut text = String::from("Registration complete:");
    for field in Field::SEQUENCE {
        let value = values.get(&field).map(String::as_str).unwrap_or_default();
        text.push_str(&format!("\n{}: {}", label(field), value));
    }
    OutboundMessage::text(text)
}
