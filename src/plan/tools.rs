//! String-in, string-out goal operations for the agent's tool layer.
//!
//! The consumer is a language model, so every operation answers with text.
//! Tracker errors are rendered through their `Display` form rather than
//! propagated.

use std::sync::{Arc, Mutex, PoisonError};

use super::{PlanTracker, StepSpec};

/// Tool hint used when a step does not name one.
pub const AUTO_TOOL: &str = "auto";

/// Parse `"desc|tool; desc|tool"` into step specs.
///
/// Blank entries are dropped. A missing or empty tool hint becomes `"auto"`.
/// The tool hint follows the last `|`, so descriptions may contain pipes.
pub fn parse_steps(raw: &str) -> Vec<StepSpec> {
    raw.split(';')
        .filter_map(|entry| {
            let entry = entry.trim();
            if entry.is_empty() {
                return None;
            }
            let (description, tool) = match entry.rsplit_once('|') {
                Some((d, t)) => (d.trim(), t.trim()),
                None => (entry, ""),
            };
            if description.is_empty() {
                return None;
            }
            let tool = if tool.is_empty() { AUTO_TOOL } else { tool };
            Some(StepSpec::new(description, tool))
        })
        .collect()
}

/// Goal tools over a shared tracker.
#[derive(Debug, Clone)]
pub struct GoalTools {
    tracker: Arc<Mutex<PlanTracker>>,
}

impl GoalTools {
    pub fn new(tracker: Arc<Mutex<PlanTracker>>) -> Self {
        Self { tracker }
    }

    fn with_tracker<R>(&self, f: impl FnOnce(&mut PlanTracker) -> R) -> R {
        let mut tracker = self.tracker.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut tracker)
    }

    pub fn create_goal_plan(&self, goal: &str, steps: &str, done_when: &str) -> String {
        let specs = parse_steps(steps);
        self.with_tracker(|t| match t.create_plan(goal, specs, done_when) {
            Ok(plan) => {
                let first = plan
                    .steps
                    .first()
                    .map(|s| s.description.clone())
                    .unwrap_or_default();
                format!(
                    "📋 Plan created: {} steps for goal '{}'. Start with step 1: {first}",
                    plan.steps.len(),
                    plan.goal
                )
            }
            Err(e) => format!("Could not create plan: {e}"),
        })
    }

    pub fn complete_step(&self, step: usize, outcome: &str) -> String {
        self.with_tracker(|t| match t.complete_step(step, outcome) {
            Ok(advance) => advance.to_string(),
            Err(e) => e.to_string(),
        })
    }

    pub fn fail_step(&self, step: usize, reason: &str) -> String {
        self.with_tracker(|t| match t.fail_step(step, reason) {
            Ok(outcome) => outcome.to_string(),
            Err(e) => e.to_string(),
        })
    }

    pub fn current_plan(&self) -> String {
        self.with_tracker(|t| {
            let ctx = t.status_context();
            if ctx.is_empty() {
                "No active goal plan.".to_string()
            } else {
                ctx
            }
        })
    }

    /// Loop warning text for the next context, or an empty string.
    pub fn record_tool_call(&self, tool: &str) -> String {
        self.with_tracker(|t| {
            t.record_tool_call(tool)
                .map(|w| w.to_string())
                .unwrap_or_default()
        })
    }
}
