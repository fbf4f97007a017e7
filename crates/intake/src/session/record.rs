//! Per-user conversational progress record.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::token::ConfirmationToken;
use crate::flow::Field;

/// Values confirmed so far in the current pass, keyed by field.
pub type ConfirmedValues = BTreeMap<Field, String>;

/// Progress of one user through the field sequence.
///
/// The record is plain data: the flow engine computes the next record and the
/// session store persists it. A fresh [`SessionRecord::default`] is the
/// initial state (`AwaitingField(0)`, not yet prompted).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Position in the field sequence.
    #[serde(default)]
    pub step_index: usize,

    /// Confirmed values for every field before `step_index`.
    #[serde(default)]
    pub confirmed_values: ConfirmedValues,

    /// Outstanding yes/no confirmation, if any.
    #[serde(default)]
    pub pending: Option<PendingConfirmation>,

    /// Whether the prompt for the current attempt has been sent.
    #[serde(default)]
    pub prompted: bool,
}

/// An unconfirmed candidate value and the token that may confirm it.
///
/// Keeping both in one value makes "token without buffer" unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingConfirmation {
    pub token: ConfirmationToken,
    pub buffer: String,
}

/// The conversational state a record encodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState<'a> {
    AwaitingField(usize),
    AwaitingConfirmation {
        step_index: usize,
        buffer: &'a str,
        token: &'a ConfirmationToken,
    },
}

impl SessionRecord {
    /// Derive the state machine position from the record.
    pub fn state(&self) -> FlowState<'_> {
        match &self.pending {
            None => FlowState::AwaitingField(self.step_index),
            Some(pending) => FlowState::AwaitingConfirmation {
                step_index: self.step_index,
                buffer: &pending.buffer,
                token: &pending.token,
            },
        }
    }

    /// Token of the outstanding confirmation, if any.
    pub fn pending_token(&self) -> Option<&ConfirmationToken> {
        self.pending.as_ref().map(|p| &p.token)
    }

    /// Candidate value awaiting confirmation, if any.
    pub fn buffer(&self) -> Option<&str> {
        self.pending.as_ref().map(|p| p.buffer.as_str())
    }

    /// True for a record indistinguishable from a brand-new user's.
    pub fn is_initial(&self) -> bool {
        *self == Self::default()
    }

    /// Serialize for storage.
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    /// Deserialize a stored record.
    pub fn from_json(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }
}
