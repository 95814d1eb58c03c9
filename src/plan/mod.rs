//! Plan tracker: the single active multi-step plan and its loop detector.
//!
//! A `Plan` is an ordered list of `Step`s the agent committed to before
//! executing. Exactly one plan is active at a time; creating a new one archives
//! the previous one if it was unfinished. Step transitions are exact and
//! returned as typed values whose `Display` form is the feedback handed to the
//! language model.
//!
//! Invariants:
//! - at most one step is `InProgress`;
//! - `attempts` never exceeds the retry ceiling, and a step that reached it is
//!   `Failed` for good.

pub mod loop_detect;
pub mod tools;

use std::collections::VecDeque;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{PlanError, PlanResult};
use crate::persist;

pub use loop_detect::{LoopDetector, LoopDetectorConfig, LoopWarning};

// ---------------------------------------------------------------------------
// Plan types
// ---------------------------------------------------------------------------

/// Lifecycle of the active plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PlanState {
    Idle,
    Planning,
    Executing,
    Verifying,
    Complete,
    Failed,
}

impl PlanState {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Idle => "IDLE",
            Self::Planning => "PLANNING",
            Self::Executing => "EXECUTING",
            Self::Verifying => "VERIFYING",
            Self::Complete => "COMPLETE",
            Self::Failed => "FAILED",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

/// Status of an individual step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Pending,
    InProgress,
    Done,
    Failed,
    Skipped,
}

impl StepStatus {
    pub fn icon(&self) -> &'static str {
        match self {
            Self::Pending => "⬜",
            Self::InProgress => "🔷",
            Self::Done => "✅",
            Self::Failed => "❌",
            Self::Skipped => "⏭️",
        }
    }

    /// Whether the step still needs work.
    pub fn is_open(&self) -> bool {
        matches!(self, Self::Pending | Self::InProgress)
    }
}

/// What the caller supplies for each step of a new plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StepSpec {
    pub description: String,
    pub tool_hint: String,
}

impl StepSpec {
    pub fn new(description: impl Into<String>, tool_hint: impl Into<String>) -> Self {
        Self {
            description: description.into(),
            tool_hint: tool_hint.into(),
        }
    }
}

/// A single step in a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// 1-based position in the plan.
    pub number: usize,
    pub description: String,
    pub tool_hint: String,
    pub status: StepStatus,
    pub outcome: Option<String>,
    pub attempts: u32,
}

/// The active multi-step plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub goal: String,
    pub steps: Vec<Step>,
    pub done_when: String,
    pub state: PlanState,
    /// Number of the step currently in progress.
    pub current_step: Option<usize>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl Plan {
    pub fn step(&self, number: usize) -> Option<&Step> {
        self.steps.iter().find(|s| s.number == number)
    }

    fn step_mut(&mut self, number: usize) -> PlanResult<&mut Step> {
        self.steps
            .iter_mut()
            .find(|s| s.number == number)
            .ok_or(PlanError::StepNotFound { step: number })
    }

    pub fn done_count(&self) -> usize {
        self.steps
            .iter()
            .filter(|s| s.status == StepStatus::Done)
            .count()
    }

    pub fn total_steps(&self) -> usize {
        self.steps.len()
    }

    /// Completed fraction in [0.0, 1.0].
    pub fn completion(&self) -> f32 {
        if self.steps.is_empty() {
            return 0.0;
        }
        self.done_count() as f32 / self.steps.len() as f32
    }

    fn in_progress(&self) -> Option<usize> {
        self.steps
            .iter()
            .find(|s| s.status == StepStatus::InProgress)
            .map(|s| s.number)
    }
}

/// Archived record of a finished or abandoned plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanCompletion {
    pub goal: String,
    pub success: bool,
    pub results: String,
    pub steps_completed: usize,
    pub steps_total: usize,
    pub finished_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Transition results
// ---------------------------------------------------------------------------

/// What happened to the plan after a step was completed or skipped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAdvance {
    /// The next pending step is now in progress.
    Next {
        finished: usize,
        next: usize,
        description: String,
    },
    /// Another step was already in progress and stays active.
    Continuing { finished: usize, active: usize },
    /// No open steps remain and the goal now awaits `confirm_done`.
    AwaitingVerification { goal: String, done_when: String },
    /// No open steps remain. Permanently failed steps do not block completion.
    PlanComplete { goal: String },
    /// The last open step was given up on, or verification said no.
    PlanFailed { goal: String },
}

impl std::fmt::Display for StepAdvance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Next {
                finished,
                next,
                description,
            } => write!(f, "✓ Step {finished} done. Now on step {next}: {description}"),
            Self::Continuing { finished, active } => {
                write!(f, "✓ Step {finished} done. Step {active} is still in progress.")
            }
            Self::AwaitingVerification { goal, done_when } => write!(
                f,
                "All steps of '{goal}' are resolved. Verify the goal is met: {done_when}"
            ),
            Self::PlanComplete { goal } => {
                write!(f, "✅ ALL STEPS DONE! Goal '{goal}' is complete.")
            }
            Self::PlanFailed { goal } => write!(
                f,
                "❌ Goal '{goal}' failed. Report what went wrong to the user."
            ),
        }
    }
}

/// Result of reporting a failed attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailOutcome {
    /// Below the retry ceiling: try a different approach.
    Retry {
        step: usize,
        attempt: u32,
        ceiling: u32,
        reason: String,
    },
    /// The step is permanently failed.
    GaveUp { step: usize, attempts: u32 },
}

impl std::fmt::Display for FailOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Retry {
                step,
                attempt,
                ceiling,
                reason,
            } => write!(
                f,
                "⚠️ Step {step} attempt {attempt}/{ceiling} failed: {reason}. Try a different approach."
            ),
            Self::GaveUp { step, attempts } => write!(
                f,
                "❌ Step {step} FAILED after {attempts} attempts. Move on or report to the user."
            ),
        }
    }
}

// ---------------------------------------------------------------------------
// Tracker
// ---------------------------------------------------------------------------

/// Tracker tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanConfig {
    /// Failed attempts after which a step is permanently failed.
    pub retry_ceiling: u32,
    /// Stop in `Verifying` instead of completing once no open steps remain.
    pub verify_before_complete: bool,
    /// How many finished plans are retained.
    pub archive_capacity: usize,
    pub loops: LoopDetectorConfig,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            retry_ceiling: 3,
            verify_before_complete: false,
            archive_capacity: 50,
            loops: LoopDetectorConfig::default(),
        }
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct TrackerState {
    active_plan: Option<Plan>,
    #[serde(default)]
    archive: Vec<PlanCompletion>,
}

/// Owns the single active plan, the archive, and the loop detector.
#[derive(Debug)]
pub struct PlanTracker {
    active: Option<Plan>,
    archive: VecDeque<PlanCompletion>,
    loops: LoopDetector,
    config: PlanConfig,
    store: Option<PathBuf>,
}

impl PlanTracker {
    pub fn new(config: PlanConfig) -> Self {
        Self {
            active: None,
            archive: VecDeque::new(),
            loops: LoopDetector::new(config.loops.clone()),
            config,
            store: None,
        }
    }

    /// Tracker backed by `path`. A missing or unreadable file means idle.
    pub fn open(config: PlanConfig, path: &Path) -> Self {
        let mut tracker = Self::new(config);
        if let Some(state) = persist::load_or_warn::<TrackerState>(path, "plan tracker") {
            tracker.active = state.active_plan;
            tracker.archive = state.archive.into();
            tracker.trim_archive();
        }
        tracker.store = Some(path.to_path_buf());
        tracker
    }

    pub fn config(&self) -> &PlanConfig {
        &self.config
    }

    pub fn active_plan(&self) -> Option<&Plan> {
        self.active.as_ref()
    }

    pub fn state(&self) -> PlanState {
        self.active.as_ref().map_or(PlanState::Idle, |p| p.state)
    }

    /// Archived plans, oldest first.
    pub fn archive(&self) -> impl Iterator<Item = &PlanCompletion> {
        self.archive.iter()
    }

    pub fn loop_detector(&self) -> &LoopDetector {
        &self.loops
    }

    /// Record that the agent is decomposing `goal` before it has steps.
    pub fn begin_planning(&mut self, goal: impl Into<String>) {
        self.archive_unfinished("superseded by a new plan");
        self.active = Some(Plan {
            goal: goal.into(),
            steps: Vec::new(),
            done_when: String::new(),
            state: PlanState::Planning,
            current_step: None,
            created_at: Utc::now(),
            completed_at: None,
        });
        self.loops.reset();
        self.persist();
    }

    /// Replace any existing plan with a new one whose first step is in progress.
    pub fn create_plan(
        &mut self,
        goal: impl Into<String>,
        steps: Vec<StepSpec>,
        done_when: impl Into<String>,
    ) -> PlanResult<&Plan> {
        if steps.is_empty() {
            return Err(PlanError::EmptyPlan);
        }
        self.archive_unfinished("superseded by a new plan");

        let steps: Vec<Step> = steps
            .into_iter()
            .enumerate()
            .map(|(i, spec)| Step {
                number: i + 1,
                description: spec.description,
                tool_hint: spec.tool_hint,
                status: if i == 0 {
                    StepStatus::InProgress
                } else {
                    StepStatus::Pending
                },
                outcome: None,
                attempts: 0,
            })
            .collect();

        let plan = Plan {
            goal: goal.into(),
            steps,
            done_when: done_when.into(),
            state: PlanState::Executing,
            current_step: Some(1),
            created_at: Utc::now(),
            completed_at: None,
        };
        tracing::info!(goal = %plan.goal, steps = plan.steps.len(), "plan: created");

        self.loops.reset();
        self.active = Some(plan);
        self.persist();
        self.active.as_ref().ok_or(PlanError::NoActivePlan)
    }

    /// Mark step `number` done and advance to the next pending step.
    pub fn complete_step(
        &mut self,
        number: usize,
        outcome: impl Into<String>,
    ) -> PlanResult<StepAdvance> {
        let plan = self.open_plan_mut()?;
        let step = plan.step_mut(number)?;
        match step.status {
            StepStatus::Done => return Err(PlanError::StepAlreadyDone { step: number }),
            StepStatus::Failed => return Err(PlanError::StepPermanentlyFailed { step: number }),
            _ => {}
        }
        step.status = StepStatus::Done;
        step.outcome = Some(outcome.into());

        let advance = self.advance(number, true);
        tracing::info!(step = number, result = %advance, "plan: step completed");
        self.persist();
        Ok(advance)
    }

    /// Report a failed attempt at step `number`.
    ///
    /// Below the retry ceiling this is a soft failure and the step keeps its
    /// status. At the ceiling the step becomes `Failed` permanently; further
    /// calls report the same outcome without counting more attempts.
    pub fn fail_step(&mut self, number: usize, reason: impl Into<String>) -> PlanResult<FailOutcome> {
        let ceiling = self.config.retry_ceiling.max(1);
        let reason = reason.into();
        let plan = self.open_plan_mut()?;
        let step = plan.step_mut(number)?;

        match step.status {
            StepStatus::Done => return Err(PlanError::StepAlreadyDone { step: number }),
            StepStatus::Failed => {
                return Ok(FailOutcome::GaveUp {
                    step: number,
                    attempts: step.attempts,
                });
            }
            _ => {}
        }

        step.attempts = (step.attempts + 1).min(ceiling);
        if step.attempts < ceiling {
            let outcome = FailOutcome::Retry {
                step: number,
                attempt: step.attempts,
                ceiling,
                reason,
            };
            tracing::info!(step = number, attempt = step.attempts, "plan: soft failure");
            self.persist();
            return Ok(outcome);
        }

        let was_active = step.status == StepStatus::InProgress;
        step.status = StepStatus::Failed;
        step.outcome = Some(format!("FAILED after {} attempts: {reason}", step.attempts));
        let outcome = FailOutcome::GaveUp {
            step: number,
            attempts: step.attempts,
        };
        tracing::warn!(step = number, attempts = step.attempts, "plan: step permanently failed");

        if was_active {
            self.advance(number, false);
        }
        self.persist();
        Ok(outcome)
    }

    /// Mark step `number` as no longer needed.
    pub fn skip_step(&mut self, number: usize, reason: impl Into<String>) -> PlanResult<StepAdvance> {
        let plan = self.open_plan_mut()?;
        let step = plan.step_mut(number)?;
        match step.status {
            StepStatus::Done => return Err(PlanError::StepAlreadyDone { step: number }),
            StepStatus::Failed => return Err(PlanError::StepPermanentlyFailed { step: number }),
            _ => {}
        }
        step.status = StepStatus::Skipped;
        step.outcome = Some(reason.into());

        let advance = self.advance(number, true);
        self.persist();
        Ok(advance)
    }

    /// Resolve a plan waiting in `Verifying`.
    pub fn confirm_done(&mut self, met: bool, notes: impl Into<String>) -> PlanResult<StepAdvance> {
        let plan = self.active.as_mut().ok_or(PlanError::NoActivePlan)?;
        if plan.state != PlanState::Verifying {
            return Err(PlanError::NotVerifying);
        }
        let advance = self.conclude(met, notes.into());
        self.persist();
        Ok(advance)
    }

    /// Drop the active plan, archiving it as unsuccessful if it was unfinished.
    pub fn reset(&mut self) {
        self.archive_unfinished("Goal was reset before completion");
        self.active = None;
        self.loops.reset();
        self.persist();
    }

    /// Feed a tool call to the loop detector.
    pub fn record_tool_call(&mut self, tool: &str) -> Option<LoopWarning> {
        let warning = self.loops.record(tool);
        if let Some(w) = &warning {
            tracing::warn!(tool, warning = %w, "plan: loop warning");
        }
        warning
    }

    /// Render the active plan for the agent's working context.
    ///
    /// Empty when idle or when the plan has completed.
    pub fn status_context(&self) -> String {
        let Some(plan) = &self.active else {
            return String::new();
        };
        if matches!(plan.state, PlanState::Idle | PlanState::Complete) {
            return String::new();
        }

        let mut lines = vec![
            "### 🎯 ACTIVE GOAL TRACKER".to_string(),
            format!("**Goal:** {}", plan.goal),
            format!("**State:** {}", plan.state.label()),
            "**Progress:**".to_string(),
        ];
        for step in &plan.steps {
            let outcome = step
                .outcome
                .as_deref()
                .map(|o| format!(" → {o}"))
                .unwrap_or_default();
            let here = if step.status == StepStatus::InProgress {
                " ← YOU ARE HERE"
            } else {
                ""
            };
            lines.push(format!(
                "  {} {}. {}{outcome}{here}",
                step.status.icon(),
                step.number,
                step.description,
            ));
        }
        if !plan.done_when.is_empty() {
            lines.push(format!("**Done When:** {}", plan.done_when));
        }
        lines.push(format!(
            "**Completion:** {}/{} steps",
            plan.done_count(),
            plan.total_steps()
        ));

        let streak = self.loops.observe_streak();
        if streak > 0 {
            lines.push(format!(
                "\n⚠️ You've observed {streak} time(s): ACT NOW, don't observe again!"
            ));
        }
        lines.join("\n")
    }

    // -----------------------------------------------------------------------
    // Internals
    // -----------------------------------------------------------------------

    /// The active plan, if it still accepts step transitions.
    fn open_plan_mut(&mut self) -> PlanResult<&mut Plan> {
        match self.active.as_mut() {
            Some(plan) if matches!(plan.state, PlanState::Executing | PlanState::Verifying) => {
                Ok(plan)
            }
            _ => Err(PlanError::NoActivePlan),
        }
    }

    /// After step `finished` left the open set, pick what runs next.
    ///
    /// With nothing left open, a plan closed by completing or skipping a step
    /// is complete; one closed by giving up on its last step has failed.
    fn advance(&mut self, finished: usize, resolved: bool) -> StepAdvance {
        let verify = self.config.verify_before_complete;
        let Some(plan) = self.active.as_mut() else {
            return StepAdvance::PlanFailed {
                goal: String::new(),
            };
        };

        if let Some(active) = plan.in_progress() {
            plan.current_step = Some(active);
            return StepAdvance::Continuing { finished, active };
        }

        if let Some(next) = plan
            .steps
            .iter_mut()
            .find(|s| s.status == StepStatus::Pending)
        {
            next.status = StepStatus::InProgress;
            let advance = StepAdvance::Next {
                finished,
                next: next.number,
                description: next.description.clone(),
            };
            plan.current_step = Some(next.number);
            return advance;
        }

        plan.current_step = None;
        if verify && resolved {
            plan.state = PlanState::Verifying;
            return StepAdvance::AwaitingVerification {
                goal: plan.goal.clone(),
                done_when: plan.done_when.clone(),
            };
        }

        let results = plan
            .step(finished)
            .and_then(|s| s.outcome.clone())
            .unwrap_or_default();
        self.conclude(resolved, results)
    }

    /// Move the active plan to a terminal state and archive it.
    fn conclude(&mut self, success: bool, results: String) -> StepAdvance {
        let Some(plan) = self.active.as_mut() else {
            return StepAdvance::PlanFailed {
                goal: String::new(),
            };
        };
        plan.state = if success {
            PlanState::Complete
        } else {
            PlanState::Failed
        };
        plan.current_step = None;
        plan.completed_at = Some(Utc::now());

        let completion = PlanCompletion {
            goal: plan.goal.clone(),
            success,
            results,
            steps_completed: plan.done_count(),
            steps_total: plan.total_steps(),
            finished_at: Utc::now(),
        };
        let goal = plan.goal.clone();
        tracing::info!(goal = %goal, success, "plan: concluded");
        self.push_archive(completion);

        if success {
            StepAdvance::PlanComplete { goal }
        } else {
            StepAdvance::PlanFailed { goal }
        }
    }

    fn archive_unfinished(&mut self, results: &str) {
        let Some(plan) = self.active.as_ref() else {
            return;
        };
        if plan.state.is_terminal() {
            return;
        }
        let completion = PlanCompletion {
            goal: plan.goal.clone(),
            success: false,
            results: results.to_string(),
            steps_completed: plan.done_count(),
            steps_total: plan.total_steps(),
            finished_at: Utc::now(),
        };
        self.push_archive(completion);
    }

    fn push_archive(&mut self, completion: PlanCompletion) {
        self.archive.push_back(completion);
        self.trim_archive();
    }

    fn trim_archive(&mut self) {
        while self.archive.len() > self.config.archive_capacity {
            self.archive.pop_front();
        }
    }

    fn persist(&self) {
        let Some(path) = &self.store else {
            return;
        };
        let state = TrackerState {
            active_plan: self.active.clone(),
            archive: self.archive.iter().cloned().collect(),
        };
        persist::save_or_warn(path, &state, "plan tracker");
    }
}

impl Default for PlanTracker {
    fn default() -> Self {
        Self::new(PlanConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn three_steps() -> Vec<StepSpec> {
        vec![
            StepSpec::new("Open the search page", "open_chrome_at"),
            StepSpec::new("Type the query", "type_text"),
            StepSpec::new("Read the results", "see_screen"),
        ]
    }

    fn status(tracker: &PlanTracker, number: usize) -> StepStatus {
        tracker.active_plan().unwrap().step(number).unwrap().status
    }

    #[test]
    fn empty_plan_is_rejected() {
        let mut tracker = PlanTracker::default();
        assert_eq!(
            tracker.create_plan("nothing", vec![], "never").unwrap_err(),
            PlanError::EmptyPlan
        );
        assert_eq!(tracker.state(), PlanState::Idle);
    }

    #[test]
    fn create_plan_starts_first_step() {
        let mut tracker = PlanTracker::default();
        let plan = tracker.create_plan("Find leads", three_steps(), "3 leads").unwrap();
        assert_eq!(plan.state, PlanState::Executing);
        assert_eq!(plan.current_step, Some(1));
        assert_eq!(plan.steps[0].status, StepStatus::InProgress);
        assert!(plan.steps[1..].iter().all(|s| s.status == StepStatus::Pending));
    }

    #[test]
    fn completing_every_step_completes_plan() {
        let mut tracker = PlanTracker::default();
        tracker.create_plan("Find leads", three_steps(), "3 leads").unwrap();

        let advance = tracker.complete_step(1, "opened").unwrap();
        assert!(matches!(advance, StepAdvance::Next { next: 2, .. }));
        assert_eq!(status(&tracker, 1), StepStatus::Done);
        assert_eq!(status(&tracker, 2), StepStatus::InProgress);

        tracker.complete_step(2, "typed").unwrap();
        let advance = tracker.complete_step(3, "found 3").unwrap();
        assert_eq!(
            advance,
            StepAdvance::PlanComplete {
                goal: "Find leads".into()
            }
        );
        assert_eq!(tracker.state(), PlanState::Complete);
        assert!(tracker.status_context().is_empty());

        let archived: Vec<_> = tracker.archive().collect();
        assert_eq!(archived.len(), 1);
        assert!(archived[0].success);
        assert_eq!(archived[0].steps_completed, 3);
        assert_eq!(archived[0].results, "found 3");
    }

    #[test]
    fn retry_ceiling_saturates() {
        let mut tracker = PlanTracker::default();
        tracker.create_plan("g", three_steps(), "done").unwrap();

        for attempt in 1..=2 {
            let outcome = tracker.fail_step(2, "x").unwrap();
            assert!(matches!(outcome, FailOutcome::Retry { attempt: a, .. } if a == attempt));
            assert_eq!(status(&tracker, 2), StepStatus::Pending);
        }
        let outcome = tracker.fail_step(2, "x").unwrap();
        assert_eq!(outcome, FailOutcome::GaveUp { step: 2, attempts: 3 });
        assert_eq!(status(&tracker, 2), StepStatus::Failed);

        let outcome = tracker.fail_step(2, "x").unwrap();
        assert_eq!(outcome, FailOutcome::GaveUp { step: 2, attempts: 3 });
        assert_eq!(tracker.active_plan().unwrap().step(2).unwrap().attempts, 3);

        assert_eq!(
            tracker.complete_step(2, "late").unwrap_err(),
            PlanError::StepPermanentlyFailed { step: 2 }
        );
    }

    #[test]
    fn giving_up_on_active_step_moves_on() {
        let mut tracker = PlanTracker::default();
        tracker.create_plan("g", three_steps(), "done").unwrap();
        for _ in 0..3 {
            tracker.fail_step(1, "button missing").unwrap();
        }
        assert_eq!(status(&tracker, 1), StepStatus::Failed);
        assert_eq!(status(&tracker, 2), StepStatus::InProgress);
        assert_eq!(tracker.active_plan().unwrap().current_step, Some(2));
    }

    #[test]
    fn plan_with_failed_step_still_completes() {
        let mut tracker = PlanTracker::default();
        tracker.create_plan("g", three_steps(), "done").unwrap();
        for _ in 0..3 {
            tracker.fail_step(2, "nope").unwrap();
        }
        tracker.complete_step(1, "ok").unwrap();
        let advance = tracker.complete_step(3, "ok").unwrap();

        assert_eq!(advance, StepAdvance::PlanComplete { goal: "g".into() });
        assert_eq!(tracker.state(), PlanState::Complete);
        let archived = tracker.archive().last().unwrap();
        assert!(archived.success);
        assert_eq!(archived.steps_completed, 2);
        assert_eq!(archived.steps_total, 3);
    }

    #[test]
    fn giving_up_on_the_last_open_step_fails_the_plan() {
        let mut tracker = PlanTracker::default();
        tracker
            .create_plan("g", vec![StepSpec::new("a", "shell"), StepSpec::new("b", "shell")], "done")
            .unwrap();
        tracker.complete_step(1, "ok").unwrap();
        for _ in 0..3 {
            tracker.fail_step(2, "nope").unwrap();
        }
        assert_eq!(tracker.state(), PlanState::Failed);
        assert!(!tracker.archive().last().unwrap().success);
        assert!(!tracker.status_context().is_empty());
    }

    #[test]
    fn completing_out_of_order_keeps_single_active_step() {
        let mut tracker = PlanTracker::default();
        tracker.create_plan("g", three_steps(), "done").unwrap();

        let advance = tracker.complete_step(3, "early").unwrap();
        assert_eq!(advance, StepAdvance::Continuing { finished: 3, active: 1 });

        let plan = tracker.active_plan().unwrap();
        let active = plan
            .steps
            .iter()
            .filter(|s| s.status == StepStatus::InProgress)
            .count();
        assert_eq!(active, 1);
    }

    #[test]
    fn unknown_step_and_missing_plan_are_errors() {
        let mut tracker = PlanTracker::default();
        assert_eq!(tracker.complete_step(1, "x").unwrap_err(), PlanError::NoActivePlan);
        assert_eq!(tracker.fail_step(1, "x").unwrap_err(), PlanError::NoActivePlan);

        tracker.create_plan("g", three_steps(), "done").unwrap();
        assert_eq!(
            tracker.complete_step(9, "x").unwrap_err(),
            PlanError::StepNotFound { step: 9 }
        );
        tracker.complete_step(1, "x").unwrap();
        assert_eq!(
            tracker.complete_step(1, "again").unwrap_err(),
            PlanError::StepAlreadyDone { step: 1 }
        );
    }

    #[test]
    fn skip_advances_like_completion() {
        let mut tracker = PlanTracker::default();
        tracker.create_plan("g", three_steps(), "done").unwrap();
        let advance = tracker.skip_step(1, "already open").unwrap();
        assert!(matches!(advance, StepAdvance::Next { next: 2, .. }));
        assert_eq!(status(&tracker, 1), StepStatus::Skipped);
    }

    #[test]
    fn verification_gate() {
        let mut tracker = PlanTracker::new(PlanConfig {
            verify_before_complete: true,
            ..Default::default()
        });
        tracker
            .create_plan("g", vec![StepSpec::new("only", "shell")], "file exists")
            .unwrap();
        assert_eq!(tracker.confirm_done(true, "").unwrap_err(), PlanError::NotVerifying);

        let advance = tracker.complete_step(1, "wrote it").unwrap();
        assert!(matches!(advance, StepAdvance::AwaitingVerification { .. }));
        assert_eq!(tracker.state(), PlanState::Verifying);

        let advance = tracker.confirm_done(true, "checked").unwrap();
        assert!(matches!(advance, StepAdvance::PlanComplete { .. }));
        assert_eq!(tracker.archive().last().unwrap().results, "checked");
    }

    #[test]
    fn new_plan_archives_unfinished_one_and_resets_loops() {
        let mut tracker = PlanTracker::default();
        tracker.create_plan("first", three_steps(), "done").unwrap();
        tracker.record_tool_call("see_screen");
        assert_eq!(tracker.loop_detector().observe_streak(), 1);

        tracker.create_plan("second", three_steps(), "done").unwrap();
        assert_eq!(tracker.loop_detector().observe_streak(), 0);
        assert_eq!(tracker.loop_detector().recent().count(), 0);

        let archived: Vec<_> = tracker.archive().collect();
        assert_eq!(archived.len(), 1);
        assert_eq!(archived[0].goal, "first");
        assert!(!archived[0].success);
    }

    #[test]
    fn reset_returns_to_idle() {
        let mut tracker = PlanTracker::default();
        tracker.create_plan("g", three_steps(), "done").unwrap();
        tracker.reset();
        assert_eq!(tracker.state(), PlanState::Idle);
        assert!(tracker.status_context().is_empty());
        assert_eq!(
            tracker.archive().last().unwrap().results,
            "Goal was reset before completion"
        );
    }

    #[test]
    fn planning_state_is_visible() {
        let mut tracker = PlanTracker::default();
        tracker.begin_planning("Tidy the desktop");
        assert_eq!(tracker.state(), PlanState::Planning);
        assert!(tracker.status_context().contains("PLANNING"));
        assert_eq!(tracker.complete_step(1, "x").unwrap_err(), PlanError::NoActivePlan);
    }

    #[test]
    fn status_context_renders_progress() {
        let mut tracker = PlanTracker::default();
        assert!(tracker.status_context().is_empty());

        tracker.create_plan("Find leads", three_steps(), "3 leads").unwrap();
        tracker.complete_step(1, "opened").unwrap();
        tracker.record_tool_call("see_screen");

        let ctx = tracker.status_context();
        assert!(ctx.contains("**Goal:** Find leads"));
        assert!(ctx.contains("✅ 1. Open the search page → opened"));
        assert!(ctx.contains("🔷 2. Type the query ← YOU ARE HERE"));
        assert!(ctx.contains("⬜ 3. Read the results"));
        assert!(ctx.contains("**Done When:** 3 leads"));
        assert!(ctx.contains("**Completion:** 1/3 steps"));
        assert!(ctx.contains("observed 1 time(s)"));
    }

    #[test]
    fn archive_is_bounded() {
        let mut tracker = PlanTracker::new(PlanConfig {
            archive_capacity: 2,
            ..Default::default()
        });
        for i in 0..5 {
            tracker
                .create_plan(format!("goal {i}"), three_steps(), "done")
                .unwrap();
        }
        tracker.reset();
        let goals: Vec<_> = tracker.archive().map(|c| c.goal.clone()).collect();
        assert_eq!(goals, vec!["goal 3", "goal 4"]);
    }

    #[test]
    fn active_plan_survives_reopen() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("plan_tracker.json");
        {
            let mut tracker = PlanTracker::open(PlanConfig::default(), &path);
            tracker.create_plan("Persist me", three_steps(), "done").unwrap();
            tracker.complete_step(1, "ok").unwrap();
            tracker.fail_step(2, "flaky").unwrap();
        }
        let tracker = PlanTracker::open(PlanConfig::default(), &path);
        let plan = tracker.active_plan().unwrap();
        assert_eq!(plan.goal, "Persist me");
        assert_eq!(plan.step(1).unwrap().status, StepStatus::Done);
        assert_eq!(plan.step(2).unwrap().attempts, 1);
        assert_eq!(plan.current_step, Some(2));
    }
}
