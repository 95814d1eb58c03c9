//! The heartbeat: a periodic reconciler over the bus, drives and plan.
//!
//! One tokio task runs ticks back to back on a fixed interval. Each tick, in
//! order:
//!
//! 1. starts registered event producers (once);
//! 2. advances the drives, relieving them if the user interacted;
//! 3. drains urgent events into reactions, dispatching at most
//!    `max_actions_per_tick` and carrying the rest over;
//! 4. runs deep work when bored and rested, which ends the tick early;
//! 5. otherwise acts on the first drive impulse, or on a random
//!    spontaneous thought;
//! 6. runs housekeeping (memory consolidation, social engagement);
//! 7. restores a little energy;
//! 8. appends an activity record and persists it.
//!
//! External collaborators run on the blocking pool under a timeout. Their
//! failures are logged as `error` activities and never abort the tick.

pub mod actions;
pub mod activity;
pub mod collaborators;
pub mod reaction;

use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use tokio::sync::{Mutex, watch};
use tokio::task::JoinHandle;

use crate::drives::{DriveKind, DriveLevels, Impulse, ImpulseKind};
use crate::error::{SchedulerError, SchedulerResult};
use crate::producer::{EventProducer, ProducerSet};
use crate::runtime::AgentRuntime;

pub use actions::{ActionPayload, ActionRegistry, MESSAGE_USER, PendingAction};
pub use activity::{ActivityKind, ActivityLog, HeartbeatActivity};
pub use collaborators::{
    CollaboratorError, CollaboratorResult, Collaborators, MemoryConsolidator, MoodSource,
    Objective, ObjectiveSource, SocialFeed, TaskExecutor,
};
use collaborators::call_blocking;
use reaction::PendingQueue;

/// Handler name for the social-feed impulse.
pub const CHECK_SOCIAL: &str = "check_social";

/// Memory candidates consolidated per pass.
const CONSOLIDATION_LIMIT: usize = 3;

/// Heartbeat tuning. Durations are in (fractional) seconds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HeartbeatConfig {
    pub interval_secs: f64,
    /// Delay before the first tick after `start`.
    pub first_beat_delay_secs: f64,
    /// Event reactions dispatched per tick; the rest wait for the next tick.
    pub max_actions_per_tick: usize,
    pub pending_action_capacity: usize,
    /// Chance of a spontaneous thought on a tick with no impulse.
    pub spontaneous_probability: f64,
    pub deep_work_boredom_floor: f32,
    pub deep_work_energy_floor: f32,
    /// Energy spent by one completed deep-work objective.
    pub deep_work_energy_cost: f32,
    /// Energy recovered on every tick that does not end in deep work.
    pub energy_restore_per_tick: f32,
    pub collaborator_timeout_secs: f64,
    pub stop_grace_secs: f64,
    pub activity_capacity: usize,
    /// Fixed seed for the spontaneous-thought roll.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rng_seed: Option<u64>,
}

impl Default for HeartbeatConfig {
    fn default() -> Self {
        Self {
            interval_secs: 30.0,
            first_beat_delay_secs: 10.0,
            max_actions_per_tick: 3,
            pending_action_capacity: 32,
            spontaneous_probability: 0.3,
            deep_work_boredom_floor: 0.6,
            deep_work_energy_floor: 0.4,
            deep_work_energy_cost: 0.2,
            energy_restore_per_tick: 0.1,
            collaborator_timeout_secs: 120.0,
            stop_grace_secs: 5.0,
            activity_capacity: 100,
            rng_seed: None,
        }
    }
}

fn secs(value: f64) -> Duration {
    if value.is_finite() && value > 0.0 {
        Duration::from_secs_f64(value)
    } else {
        Duration::ZERO
    }
}

impl HeartbeatConfig {
    pub fn interval(&self) -> Duration {
        secs(self.interval_secs).max(Duration::from_millis(10))
    }

    pub fn first_beat_delay(&self) -> Duration {
        secs(self.first_beat_delay_secs)
    }

    pub fn collaborator_timeout(&self) -> Duration {
        secs(self.collaborator_timeout_secs)
    }

    pub fn stop_grace(&self) -> Duration {
        secs(self.stop_grace_secs)
    }

    fn spontaneous_chance(&self) -> f64 {
        let p = self.spontaneous_probability;
        if p.is_finite() { p.clamp(0.0, 1.0) } else { 0.0 }
    }
}

/// Scheduler lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SchedulerState {
    Stopped,
    Running,
}

/// Snapshot returned by [`HeartbeatScheduler::status`].
#[derive(Debug, Clone, Serialize)]
pub struct HeartbeatStatus {
    pub state: SchedulerState,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub interval_secs: f64,
    pub activities: usize,
    pub pending_actions: usize,
    pub registered_actions: Vec<String>,
}

// ---------------------------------------------------------------------------
// Tick logic
// ---------------------------------------------------------------------------

/// Everything one tick touches. Locked for the duration of a tick.
struct HeartbeatCore {
    runtime: AgentRuntime,
    config: HeartbeatConfig,
    actions: ActionRegistry,
    collaborators: Collaborators,
    producers: Arc<StdMutex<ProducerSet>>,
    activity: ActivityLog,
    pending: PendingQueue,
    rng: StdRng,
}

impl HeartbeatCore {
    async fn tick(&mut self) -> HeartbeatActivity {
        let now = Utc::now();
        self.activity.mark_heartbeat(now);
        tracing::debug!(at = %now.format("%H:%M:%S"), "heartbeat: thump");

        let mut taken: Vec<String> = Vec::new();

        self.start_producers();

        let interaction = self.runtime.take_interaction();
        let levels = self.runtime.with_drives(|d| {
            d.tick(interaction);
            d.levels()
        });

        self.react_to_events(&levels, &mut taken);

        if let Some(record) = self.deep_work(&levels, &mut taken).await {
            return record;
        }

        let impulse = self
            .runtime
            .with_drives(|d| d.evaluate())
            .or_else(|| self.spontaneous());
        let wants_social = match &impulse {
            Some(impulse) => self.act_on(impulse, &mut taken),
            None => false,
        };

        self.consolidate_memory(&mut taken).await;
        self.engage_social(wants_social, &mut taken).await;

        let rest = self.config.energy_restore_per_tick;
        self.runtime.with_drives(|d| d.restore_energy(rest));

        let (mood, energy) = self.mood();
        let mut record = HeartbeatActivity::heartbeat(taken, mood, energy);
        record.timestamp = now;
        if let Some(progress) = self.plan_progress() {
            record = record.with_details(progress);
        }
        self.activity.push(record.clone());

        if record.actions.is_empty() {
            tracing::debug!("heartbeat: quiet beat");
        } else {
            tracing::info!(actions = ?record.actions, "heartbeat: beat complete");
        }
        record
    }

    fn start_producers(&self) {
        let mut producers = self.producers.lock().unwrap_or_else(PoisonError::into_inner);
        if producers.is_started() {
            return;
        }
        let started = producers.start(&self.runtime.bus);
        tracing::info!(started, "heartbeat: producers started");
    }

    fn react_to_events(&mut self, levels: &DriveLevels, taken: &mut Vec<String>) {
        for event in self.runtime.bus.drain_high_priority() {
            tracing::info!(event = %event, "heartbeat: reacting to event");
            taken.push(format!("event:{}", event.event_type()));
            if let Some(action) = reaction::react(&event, levels) {
                self.pending.push(action);
            }
        }

        for _ in 0..self.config.max_actions_per_tick {
            let Some(action) = self.pending.pop() else {
                break;
            };
            tracing::debug!(label = %action.label, action = %action.action, "heartbeat: dispatching reaction");
            self.actions.dispatch(&action.action, &action.payload);
        }
        if !self.pending.is_empty() {
            tracing::debug!(waiting = self.pending.len(), "heartbeat: reactions deferred");
        }
    }

    /// Run one deep-work objective. `Some` means the tick is over.
    async fn deep_work(
        &mut self,
        levels: &DriveLevels,
        taken: &mut Vec<String>,
    ) -> Option<HeartbeatActivity> {
        if levels.boredom <= self.config.deep_work_boredom_floor
            || levels.energy <= self.config.deep_work_energy_floor
        {
            return None;
        }
        let (Some(source), Some(executor)) = (
            self.collaborators.objectives.clone(),
            self.collaborators.executor.clone(),
        ) else {
            return None;
        };
        let limit = self.config.collaborator_timeout();

        let objective = match call_blocking("objectives", limit, move || source.brainstorm()).await {
            Ok(Some(objective)) => objective,
            Ok(None) => return None,
            Err(e) => {
                self.record_failure("brainstorm", &e);
                return None;
            }
        };

        tracing::info!(objective = %objective.objective, "heartbeat: starting deep work");
        self.actions.dispatch(
            MESSAGE_USER,
            &ActionPayload::new(
                format!(
                    "I'm feeling bored, so I'm going to research: {}",
                    objective.objective
                ),
                format!("Project: {}", objective.kind),
            ),
        );

        let task = objective.objective.clone();
        let result = match call_blocking("executor", limit, move || executor.run_task(&task)).await {
            Ok(result) => result,
            Err(e) => {
                self.record_failure("deep work", &e);
                return None;
            }
        };

        self.actions.dispatch(
            MESSAGE_USER,
            &ActionPayload::new(
                format!("**Deep Work Complete**: {}\n\n{result}", objective.objective),
                "Task Completed",
            ),
        );
        let cost = self.config.deep_work_energy_cost;
        self.runtime.with_drives(|d| {
            d.satisfy(DriveKind::Boredom, 1.0);
            d.satisfy(DriveKind::Curiosity, 0.9);
            d.expend_energy(cost);
        });
        taken.push(format!("deep_work:{}", objective.kind));

        if let Some(social) = self.collaborators.social.clone() {
            let (obj, res) = (objective.objective.clone(), result);
            match call_blocking("social", limit, move || social.share_findings(&obj, &res)).await {
                Ok(Some(title)) => {
                    taken.push("shared_knowledge".into());
                    self.actions.dispatch(
                        MESSAGE_USER,
                        &ActionPayload::new(
                            format!("I also posted my findings: '{title}'"),
                            "Social Sharing",
                        ),
                    );
                }
                Ok(None) => {}
                Err(e) => self.record_failure("share findings", &e),
            }
        }

        let record = HeartbeatActivity::work(
            std::mem::take(taken),
            format!("Completed task: {}", objective.objective),
        );
        self.activity.push(record.clone());
        tracing::info!(objective = %objective.objective, "heartbeat: deep work complete");
        Some(record)
    }

    fn spontaneous(&mut self) -> Option<Impulse> {
        let chance = self.config.spontaneous_chance();
        self.rng.gen_bool(chance).then(Impulse::spontaneous)
    }

    /// Act on an impulse. Returns whether it asks for a social check.
    fn act_on(&mut self, impulse: &Impulse, taken: &mut Vec<String>) -> bool {
        tracing::info!(
            impulse = impulse.kind.action_name(),
            reason = %impulse.reason,
            "heartbeat: impulse triggered"
        );
        match impulse.kind {
            ImpulseKind::MessageUser => {
                if self
                    .actions
                    .dispatch(MESSAGE_USER, &ActionPayload::from(impulse))
                {
                    taken.push("messaged_user".into());
                    self.relieve(ImpulseKind::MessageUser);
                }
                false
            }
            ImpulseKind::CheckSocial => true,
        }
    }

    fn relieve(&self, kind: ImpulseKind) {
        self.runtime.with_drives(|d| {
            for &(drive, amount) in kind.relieves() {
                d.satisfy(drive, amount);
            }
        });
    }

    async fn consolidate_memory(&mut self, taken: &mut Vec<String>) {
        let Some(memory) = self.collaborators.memory.clone() else {
            return;
        };
        let limit = self.config.collaborator_timeout();
        let result = call_blocking("memory", limit, move || {
            if !memory.should_consolidate()? {
                return Ok(0);
            }
            memory.consolidate(CONSOLIDATION_LIMIT)
        })
        .await;
        match result {
            Ok(0) => {}
            Ok(stored) => {
                tracing::debug!(stored, "heartbeat: memory consolidated");
                taken.push("consolidated_memory".into());
            }
            Err(e) => self.record_failure("memory consolidation", &e),
        }
    }

    /// Social housekeeping. `requested` forces a post and relieves social need.
    async fn engage_social(&mut self, requested: bool, taken: &mut Vec<String>) {
        let Some(social) = self.collaborators.social.clone() else {
            if requested
                && self
                    .actions
                    .dispatch(CHECK_SOCIAL, &ActionPayload::new("Checking social media.", "I feel lonely."))
            {
                taken.push("checked_social".into());
                self.relieve(ImpulseKind::CheckSocial);
            }
            return;
        };
        if requested {
            self.relieve(ImpulseKind::CheckSocial);
        }

        let limit = self.config.collaborator_timeout();
        let result = call_blocking("social", limit, move || {
            let mut done = Vec::new();
            if requested || social.should_post()? {
                if let Some(title) = social.post_thought()? {
                    let short: String = title.chars().take(10).collect();
                    done.push(format!("posted_thought:{short}"));
                }
            }
            done.extend(social.engage()?);
            Ok(done)
        })
        .await;
        match result {
            Ok(done) => taken.extend(done),
            Err(e) => self.record_failure("social engagement", &e),
        }
    }

    fn mood(&self) -> (String, f32) {
        match &self.collaborators.mood {
            Some(source) => (source.mood(), source.energy()),
            None => self
                .runtime
                .with_drives(|d| (d.mood().to_string(), d.level(DriveKind::Energy))),
        }
    }

    fn plan_progress(&self) -> Option<String> {
        self.runtime.with_plans(|p| {
            let plan = p.active_plan()?;
            if plan.state.is_terminal() {
                return None;
            }
            Some(format!(
                "goal '{}' {}/{} ({})",
                plan.goal,
                plan.done_count(),
                plan.total_steps(),
                plan.state.label()
            ))
        })
    }

    fn record_failure(&mut self, step: &str, error: &SchedulerError) {
        tracing::warn!(step, error = %error, "heartbeat: step failed");
        self.activity
            .push(HeartbeatActivity::error(format!("{step} failed: {error}")));
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

struct Worker {
    handle: Option<JoinHandle<()>>,
    shutdown_tx: watch::Sender<bool>,
}

/// Builder for [`HeartbeatScheduler`].
pub struct HeartbeatBuilder {
    runtime: AgentRuntime,
    config: HeartbeatConfig,
    actions: ActionRegistry,
    collaborators: Collaborators,
    producers: ProducerSet,
    activity: Option<ActivityLog>,
}

impl HeartbeatBuilder {
    pub fn collaborators(mut self, collaborators: Collaborators) -> Self {
        self.collaborators = collaborators;
        self
    }

    pub fn producer(mut self, producer: impl EventProducer) -> Self {
        self.producers.add(producer);
        self
    }

    /// Use a (usually persisted) activity log instead of an in-memory one.
    pub fn activity_log(mut self, log: ActivityLog) -> Self {
        self.activity = Some(log);
        self
    }

    pub fn action<F>(self, name: impl Into<String>, handler: F) -> Self
    where
        F: Fn(&ActionPayload) + Send + Sync + 'static,
    {
        self.actions.register(name, handler);
        self
    }

    pub fn build(self) -> HeartbeatScheduler {
        let rng = match self.config.rng_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let activity = self
            .activity
            .unwrap_or_else(|| ActivityLog::new(self.config.activity_capacity));
        let producers = Arc::new(StdMutex::new(self.producers));
        let core = HeartbeatCore {
            runtime: self.runtime,
            config: self.config.clone(),
            actions: self.actions.clone(),
            collaborators: self.collaborators,
            producers: Arc::clone(&producers),
            activity,
            pending: PendingQueue::new(self.config.pending_action_capacity),
            rng,
        };
        HeartbeatScheduler {
            core: Arc::new(Mutex::new(core)),
            actions: self.actions,
            producers,
            config: self.config,
            worker: None,
        }
    }
}

/// Owns the heartbeat task.
pub struct HeartbeatScheduler {
    core: Arc<Mutex<HeartbeatCore>>,
    actions: ActionRegistry,
    producers: Arc<StdMutex<ProducerSet>>,
    config: HeartbeatConfig,
    worker: Option<Worker>,
}

impl HeartbeatScheduler {
    pub fn builder(runtime: AgentRuntime, config: HeartbeatConfig) -> HeartbeatBuilder {
        HeartbeatBuilder {
            runtime,
            config,
            actions: ActionRegistry::new(),
            collaborators: Collaborators::none(),
            producers: ProducerSet::new(),
            activity: None,
        }
    }

    pub fn new(runtime: AgentRuntime, config: HeartbeatConfig) -> Self {
        Self::builder(runtime, config).build()
    }

    pub fn config(&self) -> &HeartbeatConfig {
        &self.config
    }

    /// Register or replace an action handler. Takes effect on the next dispatch.
    pub fn register_action<F>(&self, name: impl Into<String>, handler: F)
    where
        F: Fn(&ActionPayload) + Send + Sync + 'static,
    {
        self.actions.register(name, handler);
    }

    pub fn state(&self) -> SchedulerState {
        match &self.worker {
            Some(Worker {
                handle: Some(handle),
                ..
            }) if !handle.is_finished() => SchedulerState::Running,
            _ => SchedulerState::Stopped,
        }
    }

    /// Spawn the heartbeat task. Returns `false` if it was already running.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&mut self) -> bool {
        self.start_with_limit(None)
    }

    /// Like [`start`](Self::start), but the task exits after `max_ticks` ticks.
    pub fn start_with_limit(&mut self, max_ticks: Option<u64>) -> bool {
        if self.state() == SchedulerState::Running {
            tracing::debug!("heartbeat: already running");
            return false;
        }
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(run_heartbeat(
            Arc::clone(&self.core),
            self.config.first_beat_delay(),
            self.config.interval(),
            max_ticks,
            shutdown_rx,
        ));
        self.worker = Some(Worker {
            handle: Some(handle),
            shutdown_tx,
        });
        tracing::info!(
            interval_secs = self.config.interval().as_secs_f64(),
            "heartbeat: started"
        );
        true
    }

    /// Wait for the heartbeat task to exit on its own (tick limit reached).
    ///
    /// Returns immediately when not started. Cancel-safe.
    pub async fn finished(&mut self) {
        let Some(worker) = self.worker.as_mut() else {
            return;
        };
        if let Some(handle) = worker.handle.as_mut() {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "heartbeat: task ended abnormally");
            }
            worker.handle = None;
        }
    }

    /// Stop ticking, then stop the producers.
    ///
    /// No new tick starts after this is called. An in-flight tick is allowed
    /// to finish within `grace`; past that the call reports `StopTimeout`
    /// and the task is left to finish on its own.
    pub async fn stop(&mut self, grace: Duration) -> SchedulerResult<()> {
        let mut outcome = Ok(());
        if let Some(mut worker) = self.worker.take() {
            let _ = worker.shutdown_tx.send(true);
            if let Some(handle) = worker.handle.take() {
                outcome = match tokio::time::timeout(grace, handle).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => {
                        tracing::warn!(error = %e, "heartbeat: task ended abnormally");
                        Err(SchedulerError::TaskPanicked {
                            name: "heartbeat".into(),
                        })
                    }
                    Err(_) => Err(SchedulerError::StopTimeout {
                        worker: "heartbeat".into(),
                        waited_ms: grace.as_millis() as u64,
                    }),
                };
            }
        }

        let producers = Arc::clone(&self.producers);
        let stopped = tokio::task::spawn_blocking(move || {
            producers
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .stop(grace)
        })
        .await
        .unwrap_or_else(|_| {
            Err(SchedulerError::TaskPanicked {
                name: "producers".into(),
            })
        });

        tracing::info!("heartbeat: stopped");
        outcome.and(stopped)
    }

    /// Run one tick now, waiting for any in-flight tick first.
    pub async fn force_tick(&self) -> HeartbeatActivity {
        tracing::info!("heartbeat: forced tick");
        self.core.lock().await.tick().await
    }

    pub async fn status(&self) -> HeartbeatStatus {
        let core = self.core.lock().await;
        HeartbeatStatus {
            state: self.state(),
            last_heartbeat: core.activity.last_heartbeat(),
            interval_secs: self.config.interval().as_secs_f64(),
            activities: core.activity.len(),
            pending_actions: core.pending.len(),
            registered_actions: self.actions.names(),
        }
    }

    /// Markdown summary of the newest `n` activity records.
    pub async fn activity_summary(&self, n: usize) -> String {
        self.core.lock().await.activity.summary(n)
    }

    pub async fn recent_activity(&self, n: usize) -> Vec<HeartbeatActivity> {
        self.core.lock().await.activity.recent(n).cloned().collect()
    }
}

impl std::fmt::Debug for HeartbeatScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HeartbeatScheduler")
            .field("state", &self.state())
            .field("config", &self.config)
            .field("actions", &self.actions)
            .finish()
    }
}

/// The heartbeat task body.
async fn run_heartbeat(
    core: Arc<Mutex<HeartbeatCore>>,
    first_beat_delay: Duration,
    interval: Duration,
    max_ticks: Option<u64>,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    tokio::select! {
        _ = tokio::time::sleep(first_beat_delay) => {}
        _ = shutdown_rx.changed() => return,
    }

    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    let mut ticks: u64 = 0;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                core.lock().await.tick().await;
                ticks += 1;
                if max_ticks.is_some_and(|max| ticks >= max) {
                    tracing::info!(ticks, "heartbeat: tick limit reached");
                    break;
                }
            }
            _ = shutdown_rx.changed() => break,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::{EventBus, EventPayload, Priority};
    use crate::config::AutonomicConfig;
    use crate::drives::{DriveConfig, DriveEngine};
    use crate::plan::PlanTracker;

    fn quiet_config() -> HeartbeatConfig {
        HeartbeatConfig {
            spontaneous_probability: 0.0,
            rng_seed: Some(7),
            ..Default::default()
        }
    }

    fn runtime_with(levels: DriveLevels) -> AgentRuntime {
        let config = AutonomicConfig::default();
        AgentRuntime::from_parts(
            EventBus::new(),
            DriveEngine::with_levels(DriveConfig::default(), levels, Utc::now()),
            PlanTracker::new(config.plan),
        )
    }

    fn recorder(scheduler: &HeartbeatScheduler) -> Arc<StdMutex<Vec<ActionPayload>>> {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        scheduler.register_action(MESSAGE_USER, move |p: &ActionPayload| {
            sink.lock().unwrap().push(p.clone());
        });
        seen
    }

    #[tokio::test]
    async fn reactions_respect_budget_and_carry_over() {
        let runtime = runtime_with(DriveLevels::default());
        let scheduler = HeartbeatScheduler::new(
            runtime.clone(),
            HeartbeatConfig {
                max_actions_per_tick: 2,
                ..quiet_config()
            },
        );
        let seen = recorder(&scheduler);

        for i in 0..3 {
            runtime.bus.publish(
                "peripherals",
                EventPayload::DeviceConnected {
                    name: format!("dev{i}"),
                },
                Priority::High,
            );
        }

        let record = scheduler.force_tick().await;
        assert_eq!(
            record.actions,
            vec![
                "event:DEVICE_CONNECTED",
                "event:DEVICE_CONNECTED",
                "event:DEVICE_CONNECTED"
            ]
        );
        assert_eq!(seen.lock().unwrap().len(), 2);
        assert_eq!(scheduler.status().await.pending_actions, 1);

        scheduler.force_tick().await;
        let seen = seen.lock().unwrap();
        assert_eq!(seen.len(), 3);
        assert_eq!(seen[2].motivation, "New device detected: dev2");
    }

    #[tokio::test]
    async fn impulse_dispatches_and_relieves() {
        let runtime = runtime_with(DriveLevels {
            boredom: 0.5,
            energy: 0.8,
            ..Default::default()
        });
        let scheduler = HeartbeatScheduler::new(runtime.clone(), quiet_config());
        let seen = recorder(&scheduler);

        let record = scheduler.force_tick().await;
        assert_eq!(record.actions, vec!["messaged_user"]);
        assert_eq!(seen.lock().unwrap()[0].reason, "I am bored.");
        assert!(runtime.with_drives(|d| d.level(DriveKind::Boredom)) < 0.1);
    }

    #[tokio::test]
    async fn spontaneous_thought_when_forced() {
        let runtime = runtime_with(DriveLevels::default());
        let scheduler = HeartbeatScheduler::new(
            runtime,
            HeartbeatConfig {
                spontaneous_probability: 1.0,
                ..quiet_config()
            },
        );
        let seen = recorder(&scheduler);

        let record = scheduler.force_tick().await;
        assert_eq!(record.actions, vec!["messaged_user"]);
        assert_eq!(seen.lock().unwrap()[0].reason, "Spontaneous Thought");
    }

    #[tokio::test]
    async fn no_impulse_without_chance() {
        let runtime = runtime_with(DriveLevels::default());
        let scheduler = HeartbeatScheduler::new(runtime, quiet_config());
        let seen = recorder(&scheduler);

        let record = scheduler.force_tick().await;
        assert!(record.actions.is_empty());
        assert_eq!(record.kind, ActivityKind::Heartbeat);
        assert_eq!(record.mood.as_deref(), Some("content"));
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn start_is_idempotent_and_stop_is_bounded() {
        let runtime = runtime_with(DriveLevels::default());
        let mut scheduler = HeartbeatScheduler::new(
            runtime,
            HeartbeatConfig {
                interval_secs: 0.02,
                first_beat_delay_secs: 0.0,
                ..quiet_config()
            },
        );

        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert!(scheduler.start());
        assert!(!scheduler.start());
        assert_eq!(scheduler.state(), SchedulerState::Running);

        tokio::time::sleep(Duration::from_millis(100)).await;
        scheduler.stop(Duration::from_secs(2)).await.unwrap();
        assert_eq!(scheduler.state(), SchedulerState::Stopped);

        let status = scheduler.status().await;
        assert!(status.activities >= 1);
        assert!(status.last_heartbeat.is_some());
    }

    #[tokio::test]
    async fn tick_limit_ends_the_task() {
        let runtime = runtime_with(DriveLevels::default());
        let mut scheduler = HeartbeatScheduler::new(
            runtime,
            HeartbeatConfig {
                interval_secs: 0.01,
                first_beat_delay_secs: 0.0,
                ..quiet_config()
            },
        );
        scheduler.start_with_limit(Some(3));
        tokio::time::timeout(Duration::from_secs(5), scheduler.finished())
            .await
            .unwrap();
        assert_eq!(scheduler.state(), SchedulerState::Stopped);
        assert_eq!(scheduler.status().await.activities, 3);
        scheduler.stop(Duration::from_secs(1)).await.unwrap();
    }
}
