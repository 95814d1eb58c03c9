//! Static event-type to reaction table.
//!
//! Reactions only produce candidate actions. The scheduler decides when they
//! run, subject to its per-tick budget.

use std::collections::VecDeque;

use crate::bus::{Event, EventPayload};
use crate::drives::DriveLevels;

use super::actions::{ActionPayload, MESSAGE_USER, PendingAction};

/// Social need below which the agent greets people it sees.
const GREETING_SOCIAL_CEILING: f32 = 0.5;

/// Characters of on-screen error text quoted back to the user.
const ERROR_PREVIEW_CHARS: usize = 30;

/// Map a drained event to an action, if its type has one.
///
/// Observe-only types are logged and yield `None`, as do unmapped types.
pub fn react(event: &Event, drives: &DriveLevels) -> Option<PendingAction> {
    let (motivation, reason) = match &event.payload {
        EventPayload::ErrorOnScreen { text } => {
            let preview: String = text.chars().take(ERROR_PREVIEW_CHARS).collect();
            (
                format!("I see an error on screen: '{preview}...'. Want help?"),
                "Proactive Help",
            )
        }
        EventPayload::BatteryLow { .. } => {
            ("Battery is low! Please plug in.".to_string(), "System Alert")
        }
        EventPayload::VoiceCommand { text } => {
            tracing::info!(text = %text, "heartbeat: heard voice command");
            (format!("I heard you say: '{text}'"), "Voice Command")
        }
        EventPayload::DeviceConnected { name } => {
            (format!("New device detected: {name}"), "Peripheral Check")
        }
        EventPayload::UserSeen { faces } => {
            if drives.social_need >= GREETING_SOCIAL_CEILING {
                return None;
            }
            (format!("I see {faces} person(s). Hello!"), "Visual Contact")
        }
        EventPayload::InternetLost => {
            tracing::warn!("heartbeat: internet lost, pausing non-essential tasks");
            return None;
        }
        EventPayload::MediaPlaying { title } => {
            tracing::info!(title = %title, "heartbeat: user is playing media");
            return None;
        }
        EventPayload::TextCopied { .. } => return None,
        _ => {
            tracing::debug!(event_type = event.event_type(), "heartbeat: no reaction");
            return None;
        }
    };

    Some(PendingAction {
        action: MESSAGE_USER.to_string(),
        payload: ActionPayload::new(motivation, reason),
        label: format!("event:{}", event.event_type()),
    })
}

/// Reactions carried over between ticks. Oldest are dropped past capacity.
#[derive(Debug)]
pub struct PendingQueue {
    items: VecDeque<PendingAction>,
    capacity: usize,
}

impl PendingQueue {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: VecDeque::new(),
            capacity,
        }
    }

    pub fn push(&mut self, action: PendingAction) {
        if self.capacity == 0 {
            return;
        }
        if self.items.len() >= self.capacity {
            if let Some(dropped) = self.items.pop_front() {
                tracing::debug!(label = %dropped.label, "heartbeat: pending action dropped");
            }
        }
        self.items.push_back(action);
    }

    pub fn pop(&mut self) -> Option<PendingAction> {
        self.items.pop_front()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}
