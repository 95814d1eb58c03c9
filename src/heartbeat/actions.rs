//! Named action handlers: the scheduler's only way to produce external effects.

use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, PoisonError, RwLock};

use serde::{Deserialize, Serialize};

use crate::drives::Impulse;

/// Handler name for messages to the user.
pub const MESSAGE_USER: &str = "message_user";

/// Payload handed to every action handler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionPayload {
    pub motivation: String,
    pub reason: String,
}

impl ActionPayload {
    pub fn new(motivation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            motivation: motivation.into(),
            reason: reason.into(),
        }
    }
}

impl From<&Impulse> for ActionPayload {
    fn from(impulse: &Impulse) -> Self {
        Self::new(impulse.motivation.clone(), impulse.reason.clone())
    }
}

/// An action waiting for budget in a later tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingAction {
    pub action: String,
    pub payload: ActionPayload,
    /// Label recorded in the activity log, e.g. `event:BATTERY_LOW`.
    pub label: String,
}

pub type ActionHandler = Arc<dyn Fn(&ActionPayload) + Send + Sync>;

/// Thread-safe handler table, cloneable into the scheduler task.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    handlers: Arc<RwLock<HashMap<String, ActionHandler>>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register or replace the handler for `name`.
    pub fn register<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&ActionPayload) + Send + Sync + 'static,
    {
        let name = name.into();
        tracing::debug!(action = %name, "heartbeat: action registered");
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name, Arc::new(handler));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }

    /// Registered names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    /// Invoke the handler for `name`. Returns whether a handler ran to completion.
    ///
    /// A missing handler is not an error. A panicking handler is logged.
    pub fn dispatch(&self, name: &str, payload: &ActionPayload) -> bool {
        let handler = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .cloned();
        let Some(handler) = handler else {
            tracing::debug!(action = name, "heartbeat: no handler registered");
            return false;
        };
        match catch_unwind(AssertUnwindSafe(|| handler(payload))) {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(action = name, "heartbeat: action handler panicked");
                false
            }
        }
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionRegistry")
            .field("actions", &self.names())
            .finish()
    }
}
