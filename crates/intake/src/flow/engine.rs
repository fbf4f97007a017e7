//! The conversation state machine.
//!
//! [`FlowEngine::process_event`] is a pure function of the current record and
//! one input: it never loads or saves anything. Token minting is the only
//! outside dependency and is injected through [`TokenMint`].

use std::sync::Arc;

use intake_gateway_protocol::{InboundEvent, MessageContent, OutboundMessage};
use tracing::{debug, warn};

use super::field::Field;
use super::messages;
use super::payload::{Answer, ConfirmationPayload};
use crate::session::{
    ConfirmedValues, FlowState, PendingConfirmation, SessionRecord, TokenMint, UuidTokenMint,
    is_valid,
};

// ============================================================================
// Input / Output
// ============================================================================

/// What the engine sees of an inbound event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowInput<'a> {
    /// Free text typed by the user.
    Text(&'a str),
    /// Callback data from a pressed button.
    Confirmation(&'a str),
    /// Anything else (stickers, media, locations, ...).
    Unsupported,
}

impl<'a> FlowInput<'a> {
    pub fn from_event(event: &'a InboundEvent) -> Self {
        match event {
            InboundEvent::MessageReceived(data) => match &data.content {
                MessageContent::Text { text } => FlowInput::Text(text),
                _ => FlowInput::Unsupported,
            },
            InboundEvent::CallbackQuery(data) => FlowInput::Confirmation(&data.data),
        }
    }
}

/// Result of one transition.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    /// The record to persist.
    pub record: SessionRecord,
    /// Messages to deliver, in order.
    pub messages: Vec<OutboundMessage>,
    /// Confirmed values when this transition finished a pass.
    pub completed: Option<ConfirmedValues>,
}

impl Transition {
    fn new(record: SessionRecord, messages: Vec<OutboundMessage>) -> Self {
        Self {
            record,
            messages,
            completed: None,
        }
    }

    fn reply(record: SessionRecord, text: &str) -> Self {
        Self::new(record, vec![OutboundMessage::text(text)])
    }

    pub fn is_completed(&self) -> bool {
        self.completed.is_some()
    }
}

// ============================================================================
// Engine
// ============================================================================

#[derive(Clone)]
pub struct FlowEngine {
    tokens: Arc<dyn TokenMint>,
}

impl Default for FlowEngine {
    fn default() -> Self {
        Self::new(Arc::new(UuidTokenMint))
    }
}

impl FlowEngine {
    pub fn new(tokens: Arc<dyn TokenMint>) -> Self {
        Self { tokens }
    }

    /// Compute the next record and the messages to send for one input.
    pub fn process_event(&self, record: SessionRecord, input: FlowInput<'_>) -> Transition {
        let record = if Field::at(record.step_index).is_none() {
            warn!(
                step_index = record.step_index,
                "Step index out of range, restarting conversation"
            );
            SessionRecord::default()
        } else {
            record
        };

        match input {
            FlowInput::Text(text) => self.on_text(record, text.trim()),
            FlowInput::Confirmation(data) => on_confirmation(record, data),
            FlowInput::Unsupported => {
                let text = match record.state() {
                    FlowState::AwaitingField(_) => messages::UNSUPPORTED_INPUT,
                    FlowState::AwaitingConfirmation { .. } => {
                        messages::UNSUPPORTED_WHILE_CONFIRMING
                    }
                };
                Transition::reply(record, text)
            }
        }
    }

    fn on_text(&self, mut record: SessionRecord, text: &str) -> Transition {
        let step_index = match record.state() {
            FlowState::AwaitingField(step_index) => step_index,
            FlowState::AwaitingConfirmation { .. } => {
                return Transition::reply(record, messages::CONFIRMING_IN_PROGRESS);
            }
        };

        let field = current_field(&record);

        // First contact: the message only opens the conversation.
        let first_contact =
            !record.prompted && step_index == 0 && record.confirmed_values.is_empty();
        if first_contact || text.is_empty() {
            record.prompted = true;
            return Transition::new(record, vec![messages::prompt(field)]);
        }

        let token = self.tokens.mint();
        debug!(field = %field, "Awaiting confirmation");
        let message = messages::confirmation(field, text, &token);
        record.pending = Some(PendingConfirmation {
            token,
            buffer: text.to_string(),
        });
        Transition::new(record, vec![message])
    }
}

fn on_confirmation(mut record: SessionRecord, data: &str) -> Transition {
    let payload = match ConfirmationPayload::parse(data) {
        Ok(p) => p,
        Err(e) => {
            debug!(error = %e, "Rejecting malformed confirmation payload");
            return Transition::reply(record, messages::INVALID_OPERATION);
        }
    };

    if !is_valid(&record, &payload.token) {
        debug!("Rejecting stale or foreign confirmation token");
        return Transition::reply(record, messages::INVALID_OPERATION);
    }

    let field = current_field(&record);
    if Field::parse(&payload.field) != Some(field) {
        debug!(
            expected = %field,
            presented = %payload.field,
            "Rejecting confirmation for another field"
        );
        return Transition::reply(record, messages::FIELD_MISMATCH);
    }

    let buffer = match record.state() {
        FlowState::AwaitingConfirmation { buffer, .. } => buffer.to_string(),
        FlowState::AwaitingField(_) => {
            return Transition::reply(record, messages::INVALID_OPERATION);
        }
    };
    record.pending = None;

    match payload.answer {
        Answer::No => {
            record.prompted = true;
            Transition::new(
                record,
                vec![OutboundMessage::text(messages::RETRY), messages::prompt(field)],
            )
        }
        Answer::Yes => {
            record.confirmed_values.insert(field, buffer);

            if field.is_last() {
                let values = std::mem::take(&mut record.confirmed_values);
                let summary = messages::completion(&values);
                Transition {
                    record: SessionRecord::default(),
                    messages: vec![summary],
                    completed: Some(values),
                }
            } else {
                record.step_index += 1;
                record.prompted = true;
                let next = current_field(&record);
                Transition::new(record, vec![messages::prompt(next)])
            }
        }
    }
}

/// Field at the record's step. Callers have already normalized the index.
fn current_field(record: &SessionRecord) -> Field {
    Field::at(record.step_index).unwrap_or(Field::SEQUENCE[0])
}
