//! The shared state every part of the agent works against.
//!
//! One `AgentRuntime` is built at startup and cloned into the scheduler and
//! into the tool layer. Clones share the same bus, drives and plan tracker.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::bus::EventBus;
use crate::config::AutonomicConfig;
use crate::drives::DriveEngine;
use crate::paths::AutonomicPaths;
use crate::plan::PlanTracker;
use crate::plan::tools::GoalTools;

#[derive(Debug, Clone)]
pub struct AgentRuntime {
    pub bus: Arc<EventBus>,
    pub drives: Arc<Mutex<DriveEngine>>,
    pub plans: Arc<Mutex<PlanTracker>>,
    interaction: Arc<AtomicBool>,
}

impl AgentRuntime {
    /// Runtime with nothing persisted.
    pub fn in_memory(config: &AutonomicConfig) -> Self {
        Self::from_parts(
            EventBus::with_config(&config.bus),
            DriveEngine::new(config.drives.clone()),
            PlanTracker::new(config.plan.clone()),
        )
    }

    /// Runtime whose drives and plan tracker load from and persist to `paths`.
    pub fn open(config: &AutonomicConfig, paths: &AutonomicPaths) -> Self {
        Self::from_parts(
            EventBus::with_config(&config.bus),
            DriveEngine::open(config.drives.clone(), &paths.drives_file()),
            PlanTracker::open(config.plan.clone(), &paths.plan_file()),
        )
    }

    pub fn from_parts(bus: EventBus, drives: DriveEngine, plans: PlanTracker) -> Self {
        Self {
            bus: Arc::new(bus),
            drives: Arc::new(Mutex::new(drives)),
            plans: Arc::new(Mutex::new(plans)),
            interaction: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Run `f` with the drive engine locked. Never hold this across an await.
    pub fn with_drives<R>(&self, f: impl FnOnce(&mut DriveEngine) -> R) -> R {
        let mut drives = self.drives.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut drives)
    }

    /// Run `f` with the plan tracker locked. Never hold this across an await.
    pub fn with_plans<R>(&self, f: impl FnOnce(&mut PlanTracker) -> R) -> R {
        let mut plans = self.plans.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut plans)
    }

    /// Goal tools bound to this runtime's tracker.
    pub fn goal_tools(&self) -> GoalTools {
        GoalTools::new(Arc::clone(&self.plans))
    }

    /// Record that the user interacted since the last heartbeat.
    pub fn note_interaction(&self) {
        self.interaction.store(true, Ordering::SeqCst);
    }

    /// Read and clear the interaction flag.
    pub fn take_interaction(&self) -> bool {
        self.interaction.swap(false, Ordering::SeqCst)
    }
}
