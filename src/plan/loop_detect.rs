//! Sliding-window loop detection over recent tool calls.
//!
//! Two independent, advisory signals:
//! - an *observation streak*: an observation tool called repeatedly with no
//!   other tool in between;
//! - a *dominant tool*: one tool filling most of the recent window.
//!
//! Warnings are returned to the caller to be injected into the agent's next
//! context. Nothing here blocks execution.

use std::collections::{HashMap, VecDeque};

use serde::{Deserialize, Serialize};

/// Thresholds for both loop signals.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoopDetectorConfig {
    /// Tools that only look and never act.
    pub observe_tools: Vec<String>,
    /// Consecutive observation calls that trigger a warning.
    pub observe_streak_limit: u32,
    /// How many recent tool names are retained.
    pub history_capacity: usize,
    /// Size of the window inspected for a dominant tool.
    pub dominance_window: usize,
    /// Calls of one tool within the window that count as a loop.
    pub dominance_threshold: usize,
}

impl Default for LoopDetectorConfig {
    fn default() -> Self {
        Self {
            observe_tools: vec!["see_screen".into()],
            observe_streak_limit: 2,
            history_capacity: 10,
            dominance_window: 7,
            dominance_threshold: 5,
        }
    }
}

/// An advisory loop warning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoopWarning {
    /// The same observation tool was called `count` times in a row.
    ObservationStreak { tool: String, count: u32 },
    /// `tool` accounts for `count` of the last `window` calls.
    DominantTool {
        tool: String,
        count: usize,
        window: usize,
    },
}

impl std::fmt::Display for LoopWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ObservationStreak { tool, count } => write!(
                f,
                "ANTI-LOOP WARNING: you called {tool} {count} times without acting! \
                 YOUR NEXT TOOL CALL MUST BE AN ACTION (click_at, type_text, press_key, \
                 scroll_wheel, shell, etc.). DO NOT call {tool} again."
            ),
            Self::DominantTool {
                tool,
                count,
                window,
            } => write!(
                f,
                "LOOP DETECTED: you've called '{tool}' {count} times in the last {window} calls. \
                 STOP and try a completely different approach, or report the issue to the user."
            ),
        }
    }
}

/// Recent tool-call window plus the observation streak counter.
#[derive(Debug, Clone)]
pub struct LoopDetector {
    recent: VecDeque<String>,
    observe_streak: u32,
    last_observe_tool: Option<String>,
    config: LoopDetectorConfig,
}

impl LoopDetector {
    pub fn new(config: LoopDetectorConfig) -> Self {
        Self {
            recent: VecDeque::with_capacity(config.history_capacity),
            observe_streak: 0,
            last_observe_tool: None,
            config,
        }
    }

    /// Record a tool call and return a warning if either loop signal fires.
    pub fn record(&mut self, tool: &str) -> Option<LoopWarning> {
        self.recent.push_back(tool.to_string());
        while self.recent.len() > self.config.history_capacity.max(1) {
            self.recent.pop_front();
        }

        if self.is_observation(tool) {
            if self.last_observe_tool.as_deref() == Some(tool) {
                self.observe_streak += 1;
            } else {
                self.observe_streak = 1;
                self.last_observe_tool = Some(tool.to_string());
            }
            if self.observe_streak >= self.config.observe_streak_limit {
                return Some(LoopWarning::ObservationStreak {
                    tool: tool.to_string(),
                    count: self.observe_streak,
                });
            }
        } else {
            self.observe_streak = 0;
            self.last_observe_tool = None;
        }

        self.dominant_tool()
    }

    fn dominant_tool(&self) -> Option<LoopWarning> {
        let window = self.config.dominance_window;
        if window == 0 || self.recent.len() < window {
            return None;
        }

        let tail: Vec<&str> = self
            .recent
            .iter()
            .skip(self.recent.len() - window)
            .map(String::as_str)
            .collect();
        let mut counts: HashMap<&str, usize> = HashMap::new();
        for &name in &tail {
            *counts.entry(name).or_default() += 1;
        }

        // Walk the window in order so ties resolve to the earliest tool.
        let mut best: Option<(&str, usize)> = None;
        for &name in &tail {
            let count = counts[name];
            if best.is_none_or(|(_, c)| count > c) {
                best = Some((name, count));
            }
        }

        best.filter(|(_, count)| *count >= self.config.dominance_threshold)
            .map(|(tool, count)| LoopWarning::DominantTool {
                tool: tool.to_string(),
                count,
                window,
            })
    }

    fn is_observation(&self, tool: &str) -> bool {
        self.config.observe_tools.iter().any(|t| t == tool)
    }

    /// Current consecutive-observation count.
    pub fn observe_streak(&self) -> u32 {
        self.observe_streak
    }

    /// Recorded tool names, oldest first.
    pub fn recent(&self) -> impl Iterator<Item = &str> {
        self.recent.iter().map(String::as_str)
    }

    pub fn reset(&mut self) {
        self.recent.clear();
        self.observe_streak = 0;
        self.last_observe_tool = None;
    }
}

impl Default for LoopDetector {
    fn default() -> Self {
        Self::new(LoopDetectorConfig::default())
    }
}
