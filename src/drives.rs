//! Drive engine: bounded, time-decaying motivational counters.
//!
//! Five drives hold a strength in [0.0, 1.0]. Four of them measure an unmet
//! need (high = desperate); `energy` is inverted (high = rested). Needs grow
//! with wall-clock time at a per-drive rate and are relieved by interaction or
//! by explicit `satisfy` calls. `evaluate` turns the current levels into at most
//! one impulse using fixed thresholds in a fixed priority order.
//!
//! State is loaded at startup and written back after every mutation.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{DriveError, DriveResult};
use crate::persist;

// ---------------------------------------------------------------------------
// Drive kinds
// ---------------------------------------------------------------------------

/// The five drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriveKind {
    /// Desire for stimulation. Grows while idle.
    Boredom,
    /// Desire for contact. Grows while nobody talks to the agent.
    SocialNeed,
    /// Desire to learn something new.
    Curiosity,
    /// Capacity to act. Inverted: 1.0 is fully rested.
    Energy,
    /// Desire for warmth from the user.
    Affection,
}

impl DriveKind {
    /// All drives in canonical order.
    pub const ALL: [DriveKind; 5] = [
        DriveKind::Boredom,
        DriveKind::SocialNeed,
        DriveKind::Curiosity,
        DriveKind::Energy,
        DriveKind::Affection,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Boredom => "boredom",
            Self::SocialNeed => "social_need",
            Self::Curiosity => "curiosity",
            Self::Energy => "energy",
            Self::Affection => "affection",
        }
    }

    /// Whether a high value means "satisfied" rather than "needy".
    pub fn is_inverted(&self) -> bool {
        matches!(self, Self::Energy)
    }
}

impl std::fmt::Display for DriveKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl FromStr for DriveKind {
    type Err = DriveError;

    fn from_str(s: &str) -> DriveResult<Self> {
        Self::ALL
            .into_iter()
            .find(|k| k.label() == s)
            .ok_or_else(|| DriveError::UnknownDrive { name: s.into() })
    }
}

// ---------------------------------------------------------------------------
// Levels, rates, config
// ---------------------------------------------------------------------------

fn clamp_unit(v: f32) -> f32 {
    if v.is_nan() { 0.0 } else { v.clamp(0.0, 1.0) }
}

/// Current strength of every drive. Always within [0.0, 1.0].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveLevels {
    pub boredom: f32,
    pub social_need: f32,
    pub curiosity: f32,
    pub energy: f32,
    pub affection: f32,
}

impl Default for DriveLevels {
    fn default() -> Self {
        Self {
            boredom: 0.0,
            social_need: 0.0,
            curiosity: 0.5,
            energy: 1.0,
            affection: 0.5,
        }
    }
}

impl DriveLevels {
    pub fn get(&self, kind: DriveKind) -> f32 {
        match kind {
            DriveKind::Boredom => self.boredom,
            DriveKind::SocialNeed => self.social_need,
            DriveKind::Curiosity => self.curiosity,
            DriveKind::Energy => self.energy,
            DriveKind::Affection => self.affection,
        }
    }

    /// Set a drive, clamping into [0.0, 1.0].
    pub fn set(&mut self, kind: DriveKind, value: f32) {
        let value = clamp_unit(value);
        match kind {
            DriveKind::Boredom => self.boredom = value,
            DriveKind::SocialNeed => self.social_need = value,
            DriveKind::Curiosity => self.curiosity = value,
            DriveKind::Energy => self.energy = value,
            DriveKind::Affection => self.affection = value,
        }
    }

    fn adjust(&mut self, kind: DriveKind, delta: f32) {
        self.set(kind, self.get(kind) + delta);
    }

    /// Re-clamp every field; used after deserializing foreign state.
    fn normalized(mut self) -> Self {
        for kind in DriveKind::ALL {
            self.set(kind, self.get(kind));
        }
        self
    }
}

/// Per-minute growth rate for each drive. For `energy` this is recovery.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveRates {
    pub boredom: f32,
    pub social_need: f32,
    pub curiosity: f32,
    pub energy: f32,
    pub affection: f32,
}

impl Default for DriveRates {
    fn default() -> Self {
        Self {
            boredom: 0.1,
            social_need: 0.05,
            curiosity: 0.0,
            energy: 0.0,
            affection: 0.0,
        }
    }
}

impl DriveRates {
    pub fn get(&self, kind: DriveKind) -> f32 {
        match kind {
            DriveKind::Boredom => self.boredom,
            DriveKind::SocialNeed => self.social_need,
            DriveKind::Curiosity => self.curiosity,
            DriveKind::Energy => self.energy,
            DriveKind::Affection => self.affection,
        }
    }
}

/// Rates and impulse thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DriveConfig {
    pub rates: DriveRates,
    /// How much boredom and social need drop per tick with an active interaction.
    pub interaction_relief: f32,
    /// Boredom above this produces a `message_user` impulse.
    pub boredom_threshold: f32,
    /// Social need above this produces a `check_social` impulse.
    pub social_threshold: f32,
    /// Impulses are suppressed while energy is at or below this floor.
    pub energy_floor: f32,
}

impl Default for DriveConfig {
    fn default() -> Self {
        Self {
            rates: DriveRates::default(),
            interaction_relief: 0.1,
            boredom_threshold: 0.4,
            social_threshold: 0.3,
            energy_floor: 0.2,
        }
    }
}

// ---------------------------------------------------------------------------
// Impulses
// ---------------------------------------------------------------------------

/// What an impulse asks the scheduler to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImpulseKind {
    MessageUser,
    CheckSocial,
}

impl ImpulseKind {
    /// Name of the action handler this impulse dispatches to.
    pub fn action_name(&self) -> &'static str {
        match self {
            Self::MessageUser => "message_user",
            Self::CheckSocial => "check_social",
        }
    }

    /// Drives relieved once the impulse has been acted on, with amounts.
    pub fn relieves(&self) -> &'static [(DriveKind, f32)] {
        match self {
            Self::MessageUser => &[(DriveKind::SocialNeed, 0.4), (DriveKind::Boredom, 0.5)],
            Self::CheckSocial => &[(DriveKind::SocialNeed, 0.3)],
        }
    }
}

/// A candidate unprompted action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Impulse {
    pub kind: ImpulseKind,
    pub reason: String,
    pub motivation: String,
}

impl Impulse {
    pub fn new(kind: ImpulseKind, reason: impl Into<String>, motivation: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
            motivation: motivation.into(),
        }
    }

    /// The low-probability fallback used when no drive crosses its threshold.
    pub fn spontaneous() -> Self {
        Self::new(
            ImpulseKind::MessageUser,
            "Spontaneous Thought",
            "I just had a thought I wanted to share.",
        )
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// On-disk form of the drive state.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct DriveState {
    drives: DriveLevels,
    last_update: DateTime<Utc>,
    #[serde(default)]
    last_interaction: Option<DateTime<Utc>>,
}

/// Holds the drives and their clock.
#[derive(Debug)]
pub struct DriveEngine {
    levels: DriveLevels,
    last_update: DateTime<Utc>,
    last_interaction: Option<DateTime<Utc>>,
    config: DriveConfig,
    store: Option<PathBuf>,
}

impl DriveEngine {
    /// In-memory engine with default levels, clock starting now.
    pub fn new(config: DriveConfig) -> Self {
        Self::with_levels(config, DriveLevels::default(), Utc::now())
    }

    /// In-memory engine with explicit starting state.
    pub fn with_levels(config: DriveConfig, levels: DriveLevels, now: DateTime<Utc>) -> Self {
        Self {
            levels: levels.normalized(),
            last_update: now,
            last_interaction: None,
            config,
            store: None,
        }
    }

    /// Engine backed by `path`. A missing or unreadable file means defaults.
    pub fn open(config: DriveConfig, path: &Path) -> Self {
        let mut engine = Self::new(config);
        if let Some(state) = persist::load_or_warn::<DriveState>(path, "drives") {
            engine.levels = state.drives.normalized();
            engine.last_update = state.last_update;
            engine.last_interaction = state.last_interaction;
            tracing::debug!(path = %path.display(), "drives: state loaded");
        }
        engine.store = Some(path.to_path_buf());
        engine
    }

    pub fn levels(&self) -> DriveLevels {
        self.levels
    }

    pub fn level(&self, kind: DriveKind) -> f32 {
        self.levels.get(kind)
    }

    pub fn config(&self) -> &DriveConfig {
        &self.config
    }

    pub fn last_update(&self) -> DateTime<Utc> {
        self.last_update
    }

    pub fn last_interaction(&self) -> Option<DateTime<Utc>> {
        self.last_interaction
    }

    /// Advance the drives to the current wall-clock time.
    pub fn tick(&mut self, active_interaction: bool) {
        self.tick_at(active_interaction, Utc::now());
    }

    /// Advance the drives to `now`. A clock that went backwards counts as zero elapsed.
    pub fn tick_at(&mut self, active_interaction: bool, now: DateTime<Utc>) {
        let elapsed_ms = (now - self.last_update).num_milliseconds().max(0);
        let minutes = elapsed_ms as f32 / 60_000.0;
        self.last_update = now;

        for kind in DriveKind::ALL {
            let relieved_by_interaction =
                matches!(kind, DriveKind::Boredom | DriveKind::SocialNeed);
            if active_interaction && relieved_by_interaction {
                self.levels.adjust(kind, -self.config.interaction_relief);
            } else {
                self.levels.adjust(kind, self.config.rates.get(kind) * minutes);
            }
        }
        if active_interaction {
            self.last_interaction = Some(now);
        }

        tracing::trace!(minutes, active_interaction, "drives: ticked");
        self.persist();
    }

    /// Relieve a drive by `amount`. For the inverted `energy` drive this
    /// restores energy instead. Records the time of the satisfying interaction.
    pub fn satisfy(&mut self, kind: DriveKind, amount: f32) {
        let delta = if kind.is_inverted() { amount } else { -amount };
        self.levels.adjust(kind, delta);
        self.last_interaction = Some(Utc::now());
        tracing::debug!(drive = %kind, amount, level = self.levels.get(kind), "drives: satisfied");
        self.persist();
    }

    /// `satisfy` addressed by drive label, for string-driven callers.
    pub fn satisfy_named(&mut self, name: &str, amount: f32) -> DriveResult<()> {
        let kind = name.parse::<DriveKind>()?;
        self.satisfy(kind, amount);
        Ok(())
    }

    /// Spend energy on an action.
    pub fn expend_energy(&mut self, amount: f32) {
        self.levels.adjust(DriveKind::Energy, -amount);
        self.persist();
    }

    /// Recover energy through rest. Unlike `satisfy`, this is not an interaction.
    pub fn restore_energy(&mut self, amount: f32) {
        self.levels.adjust(DriveKind::Energy, amount);
        tracing::trace!(amount, level = self.levels.energy, "drives: energy restored");
        self.persist();
    }

    /// First matching impulse in priority order, or `None`.
    ///
    /// Boredom outranks social need; both are suppressed when energy is at or
    /// below the floor.
    pub fn evaluate(&self) -> Option<Impulse> {
        let c = &self.config;
        if self.levels.energy <= c.energy_floor {
            return None;
        }
        if self.levels.boredom > c.boredom_threshold {
            return Some(Impulse::new(
                ImpulseKind::MessageUser,
                "I am bored.",
                "Let's do something!",
            ));
        }
        if self.levels.social_need > c.social_threshold {
            return Some(Impulse::new(
                ImpulseKind::CheckSocial,
                "I feel lonely.",
                "Checking social media.",
            ));
        }
        None
    }

    /// One-word description of the dominant state, used when no mood source is wired in.
    pub fn mood(&self) -> &'static str {
        let c = &self.config;
        if self.levels.energy <= c.energy_floor {
            "tired"
        } else if self.levels.boredom > c.boredom_threshold {
            "bored"
        } else if self.levels.social_need > c.social_threshold {
            "lonely"
        } else if self.levels.curiosity > 0.7 {
            "curious"
        } else {
            "content"
        }
    }

    fn persist(&self) {
        let Some(path) = &self.store else {
            return;
        };
        let state = DriveState {
            drives: self.levels,
            last_update: self.last_update,
            last_interaction: self.last_interaction,
        };
        persist::save_or_warn(path, &state, "drives");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
