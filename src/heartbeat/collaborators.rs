//! External collaborators consulted during a tick.
//!
//! All of them are optional. They are synchronous and may be slow; the
//! scheduler calls them on the blocking pool under a timeout, and a missing,
//! failing, or timed-out collaborator only skips its step.

use std::sync::Arc;
use std::time::Duration;

use crate::error::{SchedulerError, SchedulerResult};

/// Error type collaborators report failures with.
pub type CollaboratorError = Box<dyn std::error::Error + Send + Sync>;

pub type CollaboratorResult<T> = Result<T, CollaboratorError>;

/// A self-chosen objective for deep work.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Objective {
    pub objective: String,
    /// Category used in the announcement, e.g. `research`.
    pub kind: String,
}

/// Proposes objectives when the agent is bored and rested.
pub trait ObjectiveSource: Send + Sync {
    fn brainstorm(&self) -> CollaboratorResult<Option<Objective>>;
}

/// Runs a deep-work objective to completion.
pub trait TaskExecutor: Send + Sync {
    fn run_task(&self, objective: &str) -> CollaboratorResult<String>;
}

/// Working-memory consolidation.
pub trait MemoryConsolidator: Send + Sync {
    fn should_consolidate(&self) -> CollaboratorResult<bool>;

    /// Consolidate up to `limit` candidates. Returns how many were stored.
    fn consolidate(&self, limit: usize) -> CollaboratorResult<usize>;
}

/// The social feed the agent posts to and engages with.
pub trait SocialFeed: Send + Sync {
    fn should_post(&self) -> CollaboratorResult<bool>;

    /// Post a thought. Returns its title when something was posted.
    fn post_thought(&self) -> CollaboratorResult<Option<String>>;

    /// Share deep-work findings. Returns the post title when shared.
    fn share_findings(&self, objective: &str, result: &str) -> CollaboratorResult<Option<String>>;

    /// Engage with the feed. Returns labels of what was done.
    fn engage(&self) -> CollaboratorResult<Vec<String>>;
}

/// Mood and energy as reported by the rest of the agent.
pub trait MoodSource: Send + Sync {
    fn mood(&self) -> String;
    fn energy(&self) -> f32;
}

/// The optional collaborator set handed to the scheduler.
#[derive(Clone, Default)]
pub struct Collaborators {
    pub objectives: Option<Arc<dyn ObjectiveSource>>,
    pub executor: Option<Arc<dyn TaskExecutor>>,
    pub memory: Option<Arc<dyn MemoryConsolidator>>,
    pub social: Option<Arc<dyn SocialFeed>>,
    pub mood: Option<Arc<dyn MoodSource>>,
}

impl Collaborators {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_deep_work(
        mut self,
        objectives: Arc<dyn ObjectiveSource>,
        executor: Arc<dyn TaskExecutor>,
    ) -> Self {
        self.objectives = Some(objectives);
        self.executor = Some(executor);
        self
    }

    pub fn with_memory(mut self, memory: Arc<dyn MemoryConsolidator>) -> Self {
        self.memory = Some(memory);
        self
    }

    pub fn with_social(mut self, social: Arc<dyn SocialFeed>) -> Self {
        self.social = Some(social);
        self
    }

    pub fn with_mood(mut self, mood: Arc<dyn MoodSource>) -> Self {
        self.mood = Some(mood);
        self
    }
}

impl std::fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Collaborators")
            .field("objectives", &self.objectives.is_some())
            .field("executor", &self.executor.is_some())
            .field("memory", &self.memory.is_some())
            .field("social", &self.social.is_some())
            .field("mood", &self.mood.is_some())
            .finish()
    }
}

/// Run a blocking collaborator call on the blocking pool, bounded by `limit`.
///
/// A timed-out call keeps running on its blocking thread; only the tick stops
/// waiting for it.
pub async fn call_blocking<T, F>(name: &str, limit: Duration, f: F) -> SchedulerResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> CollaboratorResult<T> + Send + 'static,
{
    match tokio::time::timeout(limit, tokio::task::spawn_blocking(f)).await {
        Err(_) => Err(SchedulerError::CollaboratorTimeout {
            name: name.to_string(),
            waited_ms: limit.as_millis() as u64,
        }),
        Ok(Err(_)) => Err(SchedulerError::TaskPanicked {
            name: name.to_string(),
        }),
        Ok(Ok(Err(e))) => Err(SchedulerError::Collaborator {
            name: name.to_string(),
            message: e.to_string(),
        }),
        Ok(Ok(Ok(value))) => Ok(value),
    }
}
