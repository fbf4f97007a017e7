//! Callback payloads carried by confirmation buttons.
//!
//! Format: `token=<token>&field=<field>&answer=<yes|no>`. Parts may come in
//! any order; unknown parts are ignored.

use thiserror::Error;

/// The user's reply to a confirmation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Answer {
    Yes,
    No,
}

impl Answer {
    pub fn as_str(self) -> &'static str {
        match self {
            Answer::Yes => "yes",
            Answer::No => "no",
        }
    }
}

/// A decoded button press.
///
/// `field` is kept as the raw wire string: an unknown field name is a
/// mismatch for the engine to reject, not a parse failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationPayload {
    pub token: String,
    pub field: String,
    pub answer: Answer,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PayloadError {
    #[error("confirmation payload is missing '{0}'")]
    Missing(&'static str),

    #[error("unrecognized answer '{0}'")]
    InvalidAnswer(String),
}

impl ConfirmationPayload {
    /// Encode the callback data for one button.
    pub fn encode(token: &str, field: &str, answer: Answer) -> String {
        format!("token={}&field={}&answer={}", token, field, answer.as_str())
    }

    pub fn parse(data: &str) -> Result<Self, PayloadError> {
        let mut token = None;
        let mut field = None;
        let mut answer = None;

        for part in data.split('&') {
            let Some((key, value)) = part.split_once('=') else {
                continue;
            };
            match key {
                "token" => token = Some(value),
                "field" => field = Some(value),
                "answer" => answer = Some(value),
                _ => {}
            }
        }

        let token = token
            .filter(|t| !t.is_empty())
            .ok_or(PayloadError::Missing("token"))?;
        let field = field.ok_or(PayloadError::Missing("field"))?;
        let answer = match answer.ok_or(PayloadError::Missing("answer"))? {
            "yes" => Answer::Yes,
            "no" => Answer::No,
            other => return Err(PayloadError::InvalidAnswer(other.to_string())),
        };

        Ok(Self {
            token: token.to_string(),
            field: field.to_string(),
            answer,
        })
    }
}
