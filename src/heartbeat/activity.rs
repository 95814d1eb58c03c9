//! Append-only heartbeat activity log.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::persist;

/// What kind of record an activity is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityKind {
    /// End-of-tick summary.
    Heartbeat,
    /// A completed deep-work objective.
    Work,
    /// A step of the tick failed and was skipped.
    Error,
}

impl ActivityKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Heartbeat => "heartbeat",
            Self::Work => "work",
            Self::Error => "error",
        }
    }
}

/// One log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeartbeatActivity {
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: ActivityKind,
    #[serde(default)]
    pub actions: Vec<String>,
    #[serde(default)]
    pub mood: Option<String>,
    #[serde(default)]
    pub energy: Option<f32>,
    #[serde(default)]
    pub details: Option<String>,
}

impl HeartbeatActivity {
    pub fn heartbeat(actions: Vec<String>, mood: impl Into<String>, energy: f32) -> Self {
        Self {
            timestamp: Utc::now(),
            kind: ActivityKind::Heartbeat,
            actions,
            mood: Some(mood.into()),
            energy: Some(energy),
            details: None,
        }
    }

    pub fn work(actions: Vec<String>, details: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind: ActivityKind::Work,
            actions,
            mood: None,
            energy: None,
            details: Some(details.into()),
        }
    }

    pub fn error(details: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            kind: ActivityKind::Error,
            actions: Vec::new(),
            mood: None,
            energy: None,
            details: Some(details.into()),
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct LogState {
    #[serde(default)]
    activities: Vec<HeartbeatActivity>,
    #[serde(default)]
    last_heartbeat: Option<DateTime<Utc>>,
}

/// Bounded activity log, persisted after every append.
#[derive(Debug)]
pub struct ActivityLog {
    entries: VecDeque<HeartbeatActivity>,
    last_heartbeat: Option<DateTime<Utc>>,
    capacity: usize,
    store: Option<PathBuf>,
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            last_heartbeat: None,
            capacity: capacity.max(1),
            store: None,
        }
    }

    /// Log backed by `path`, keeping only the newest `capacity` loaded records.
    pub fn open(capacity: usize, path: &Path) -> Self {
        let mut log = Self::new(capacity);
        if let Some(state) = persist::load_or_warn::<LogState>(path, "heartbeat log") {
            log.entries = state.activities.into();
            log.last_heartbeat = state.last_heartbeat;
            log.trim();
        }
        log.store = Some(path.to_path_buf());
        log
    }

    pub fn push(&mut self, activity: HeartbeatActivity) {
        self.entries.push_back(activity);
        self.trim();
        self.persist();
    }

    pub fn mark_heartbeat(&mut self, at: DateTime<Utc>) {
        self.last_heartbeat = Some(at);
    }

    pub fn last_heartbeat(&self) -> Option<DateTime<Utc>> {
        self.last_heartbeat
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn last(&self) -> Option<&HeartbeatActivity> {
        self.entries.back()
    }

    /// The newest `n` records, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &HeartbeatActivity> {
        self.entries.iter().skip(self.entries.len().saturating_sub(n))
    }

    /// Markdown list of the newest `n` records.
    pub fn summary(&self, n: usize) -> String {
        if self.entries.is_empty() {
            return "No autonomous activities yet.".to_string();
        }
        let mut out = String::from("**Recent Autonomous Activities:**\n");
        for activity in self.recent(n) {
            let actions = if activity.actions.is_empty() {
                activity
                    .details
                    .clone()
                    .unwrap_or_else(|| activity.kind.label().to_string())
            } else {
                activity.actions.join(", ")
            };
            let mood = activity.mood.as_deref().unwrap_or("");
            out.push_str(&format!(
                "- [{}] {actions} (mood: {mood})\n",
                activity.timestamp.format("%Y-%m-%d %H:%M")
            ));
        }
        out
    }

    fn trim(&mut self) {
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    fn persist(&self) {
        let Some(path) = &self.store else {
            return;
        };
        let state = LogState {
            activities: self.entries.iter().cloned().collect(),
            last_heartbeat: self.last_heartbeat,
        };
        persist::save_or_warn(path, &state, "heartbeat log");
    }
}
