//! Session state: the per-user progress record and its confirmation guard.

mod record;
mod token;

pub use record::{ConfirmedValues, FlowState, PendingConfirmation, SessionRecord};
pub use token::{
    ConfirmationToken, SequentialTokenMint, TokenMint, UuidTokenMint, is_valid,
};
