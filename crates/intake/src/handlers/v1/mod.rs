//! V1 API handlers.

mod events;

pub use events::handle_event;
