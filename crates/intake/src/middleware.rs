//! Session middleware.
//!
//! Wraps a pure transition with everything storage-related, in this order:
//! idempotency check, load, transition, registration upsert on completion,
//! save. The transition itself never sees a store.

use std::sync::Arc;

use chrono::Utc;
use intake_gateway_protocol::{InboundEvent, OutboundMessage};
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::flow::{FlowEngine, FlowInput, Transition, messages};
use crate::session::SessionRecord;
use crate::store::{LoadedSession, Registration, StorageResult, Stores};

/// Attempts per event when the stored revision keeps moving underneath us.
const MAX_SAVE_ATTEMPTS: u32 = 3;

/// A transition from the current record and one event to the next record.
pub type TransitionFn = Arc<dyn Fn(SessionRecord, &InboundEvent) -> Transition + Send + Sync>;

/// How an event was dealt with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HandlerStatus {
    /// Processed and persisted.
    Handled,
    /// Already processed within the idempotency window; nothing was done.
    Duplicate,
    /// Storage failed; state is unchanged and the event may be redelivered.
    Failed,
}

/// Result of handling one inbound event.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HandlerOutcome {
    pub status: HandlerStatus,
    /// True when this event finished a registration.
    pub completed: bool,
    pub messages: Vec<OutboundMessage>,
}

impl HandlerOutcome {
    fn handled(transition: Transition) -> Self {
        Self {
            status: HandlerStatus::Handled,
            completed: transition.is_completed(),
            messages: transition.messages,
        }
    }

    fn duplicate() -> Self {
        Self {
            status: HandlerStatus::Duplicate,
            completed: false,
            messages: Vec::new(),
        }
    }

    /// The apology outcome for an event that could not be handled.
    pub fn failed() -> Self {
        Self {
            status: HandlerStatus::Failed,
            completed: false,
            messages: vec![OutboundMessage::text(messages::APOLOGY)],
        }
    }
}

/// Stable identity of an inbound event for duplicate suppression.
///
/// The gateway's own identifier when present; otherwise the payload combined
/// with the event time in milliseconds. Messages also carry the sender.
pub fn event_key(event: &InboundEvent) -> String {
    let millis = event
        .timestamp()
        .unwrap_or_else(Utc::now)
        .timestamp_millis();
    match event {
        InboundEvent::MessageReceived(data) => match &data.message_id {
            Some(id) => id.clone(),
            None => {
                let payload = match data.content.as_text() {
                    Some(text) => text.to_string(),
                    None => serde_json::to_string(&data.content).unwrap_or_default(),
                };
                format!("{}:{payload}:{millis}", data.sender.id)
            }
        },
        InboundEvent::CallbackQuery(data) => match &data.callback_query_id {
            Some(id) => id.clone(),
            None => format!("{}:{millis}", data.data),
        },
    }
}

/// Bind `transition` to `stores`.
pub fn with_session<F>(stores: Stores, transition: F) -> SessionMiddleware
where
    F: Fn(SessionRecord, &InboundEvent) -> Transition + Send + Sync + 'static,
{
    SessionMiddleware {
        stores,
        transition: Arc::new(transition),
        strict_load: false,
    }
}

/// Runs events through a transition with load/save and duplicate suppression.
#[derive(Clone)]
pub struct SessionMiddleware {
    stores: Stores,
    transition: TransitionFn,
    strict_load: bool,
}

impl SessionMiddleware {
    /// The registration flow driven by `engine`.
    pub fn for_engine(stores: Stores, engine: FlowEngine) -> Self {
        with_session(stores, move |record, event| {
            engine.process_event(record, FlowInput::from_event(event))
        })
    }

    /// Fail events whose record cannot be loaded instead of starting over.
    pub fn strict_load(mut self, strict: bool) -> Self {
        self.strict_load = strict;
        self
    }

    pub fn stores(&self) -> &Stores {
        &self.stores
    }

    /// Handle one inbound event.
    pub async fn handle(&self, event: &InboundEvent) -> HandlerOutcome {
        let user_id = event.sender_id();
        let event_key = event_key(event);

        match self.stores.idempotency.mark_if_new(&event_key).await {
            Ok(true) => {}
            Ok(false) => {
                debug!(user_id = %user_id, event_key = %event_key, "Duplicate event ignored");
                return HandlerOutcome::duplicate();
            }
            Err(e) => {
                error!(user_id = %user_id, event_key = %event_key, error = %e, "Idempotency check failed");
                return HandlerOutcome::failed();
            }
        }

        match self.run(user_id, event).await {
            Ok(transition) => {
                if transition.is_completed() {
                    info!(user_id = %user_id, "Registration completed");
                }
                HandlerOutcome::handled(transition)
            }
            Err(e) => {
                error!(user_id = %user_id, event_key = %event_key, error = %e, "Failed to handle event");
                if let Err(e) = self.stores.idempotency.release(&event_key).await {
                    warn!(event_key = %event_key, error = %e, "Failed to release event marker");
                }
                HandlerOutcome::failed()
            }
        }
    }

    async fn run(&self, user_id: &str, event: &InboundEvent) -> StorageResult<Transition> {
        let mut attempt = 1;
        loop {
            let loaded = self.load(user_id).await?;
            let transition = (self.transition)(loaded.record, event);

            if let Some(values) = &transition.completed {
                self.stores
                    .registrations
                    .upsert(&Registration::from_values(user_id, values))
                    .await?;
            }

            match self
                .stores
                .sessions
                .save(user_id, &transition.record, loaded.revision)
                .await
            {
                Ok(revision) => {
                    debug!(user_id = %user_id, revision, "Session saved");
                    return Ok(transition);
                }
                Err(e) if e.is_conflict() && attempt < MAX_SAVE_ATTEMPTS => {
                    debug!(user_id = %user_id, attempt, "Session changed concurrently, retrying");
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn load(&self, user_id: &str) -> StorageResult<LoadedSession> {
        match self.stores.sessions.load(user_id).await {
            Ok(loaded) => Ok(loaded),
            Err(e) if !self.strict_load => {
                warn!(
                    user_id = %user_id,
                    error = %e,
                    "Session load failed, continuing from a fresh record"
                );
                Ok(LoadedSession::new_user())
            }
            Err(e) => Err(e),
        }
    }
}
