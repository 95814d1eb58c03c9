//! Rich diagnostic error types for the autonomic control core.
//!
//! Each subsystem defines its own error type with miette `#[diagnostic]` derives,
//! providing error codes and help text. Plan errors double as the feedback text
//! handed back to the language-model loop, so their messages are written for it.

use miette::Diagnostic;
use thiserror::Error;

/// Top-level error type for the control core.
#[derive(Debug, Error, Diagnostic)]
pub enum AutonomicError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Drive(#[from] DriveError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Persist(#[from] PersistError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),
}

pub type AutonomicResult<T> = std::result::Result<T, AutonomicError>;

// ---------------------------------------------------------------------------
// Plan errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum PlanError {
    #[error("a plan needs at least one step")]
    #[diagnostic(
        code(autonomic::plan::empty),
        help("Provide steps as 'description|tool; description|tool; ...'.")
    )]
    EmptyPlan,

    #[error("no active plan; create one first with create_goal_plan")]
    #[diagnostic(
        code(autonomic::plan::no_active_plan),
        help("Call `PlanTracker::create_plan` before completing or failing steps.")
    )]
    NoActivePlan,

    #[error("step {step} not found in plan")]
    #[diagnostic(
        code(autonomic::plan::step_not_found),
        help("Step numbers are 1-based. Check the plan with `status_context()`.")
    )]
    StepNotFound { step: usize },

    #[error("step {step} is already done")]
    #[diagnostic(
        code(autonomic::plan::step_done),
        help("Finished steps cannot be failed or completed again.")
    )]
    StepAlreadyDone { step: usize },

    #[error("step {step} has permanently failed; move on or report the problem")]
    #[diagnostic(
        code(autonomic::plan::step_failed),
        help("The retry ceiling was reached. Complete the next step or reset the plan.")
    )]
    StepPermanentlyFailed { step: usize },

    #[error("the plan is not awaiting verification")]
    #[diagnostic(
        code(autonomic::plan::not_verifying),
        help("Verification is only requested when `verify_before_complete` is enabled.")
    )]
    NotVerifying,
}

pub type PlanResult<T> = std::result::Result<T, PlanError>;

// ---------------------------------------------------------------------------
// Drive errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Error, Diagnostic)]
pub enum DriveError {
    #[error("unknown drive: \"{name}\"")]
    #[diagnostic(
        code(autonomic::drives::unknown),
        help("Known drives: boredom, social_need, curiosity, energy, affection.")
    )]
    UnknownDrive { name: String },
}

pub type DriveResult<T> = std::result::Result<T, DriveError>;

// ---------------------------------------------------------------------------
// Persistence errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum PersistError {
    #[error("I/O error on {path}: {source}")]
    #[diagnostic(
        code(autonomic::persist::io),
        help(
            "A state file could not be read or written. Check that the data directory \
             exists, has correct permissions, and that the disk is not full."
        )
    )]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed JSON in {path}: {source}")]
    #[diagnostic(
        code(autonomic::persist::json),
        help("Delete or repair the file; defaults are used when it is missing.")
    )]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

pub type PersistResult<T> = std::result::Result<T, PersistError>;

// ---------------------------------------------------------------------------
// Scheduler errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum SchedulerError {
    #[error("{worker} did not stop within {waited_ms} ms")]
    #[diagnostic(
        code(autonomic::scheduler::stop_timeout),
        help(
            "An in-flight tick or producer poll is still running. It will finish on its \
             own; raise `stop_grace_secs` if this happens during normal shutdown."
        )
    )]
    StopTimeout { worker: String, waited_ms: u64 },

    #[error("collaborator \"{name}\" timed out after {waited_ms} ms")]
    #[diagnostic(
        code(autonomic::scheduler::collaborator_timeout),
        help("The call was abandoned for this tick. Raise `collaborator_timeout_secs` if needed.")
    )]
    CollaboratorTimeout { name: String, waited_ms: u64 },

    #[error("collaborator \"{name}\" failed: {message}")]
    #[diagnostic(
        code(autonomic::scheduler::collaborator),
        help("The housekeeping step was skipped; the heartbeat continues.")
    )]
    Collaborator { name: String, message: String },

    #[error("background task \"{name}\" panicked")]
    #[diagnostic(
        code(autonomic::scheduler::panicked),
        help("A collaborator panicked inside a blocking task. See the log for the panic message.")
    )]
    TaskPanicked { name: String },
}

pub type SchedulerResult<T> = std::result::Result<T, SchedulerError>;

// ---------------------------------------------------------------------------
// Config / path errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("failed to read config: {path}")]
    #[diagnostic(
        code(autonomic::config::read),
        help("Check that the file exists and is readable.")
    )]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write config: {path}")]
    #[diagnostic(
        code(autonomic::config::write),
        help("Check that the parent directory exists and you have write permissions.")
    )]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config in {path}: {message}")]
    #[diagnostic(
        code(autonomic::config::parse),
        help("The file must be valid TOML. Run `autonomic config init` to write a fresh one.")
    )]
    Parse { path: String, message: String },

    #[error("cannot determine home directory")]
    #[diagnostic(
        code(autonomic::config::no_home),
        help("Set the HOME environment variable or pass --data-dir explicitly.")
    )]
    NoHome,
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
