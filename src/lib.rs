// thiserror's #[error("...{field}...")] format strings reference struct fields,
// but the compiler doesn't see through the derive macro and reports false positives.
#![allow(unused_assignments)]

//! # autonomic
//!
//! The autonomous control core of a desktop agent: the part that decides when
//! to act without being asked.
//!
//! ## Architecture
//!
//! - **Event bus** (`bus`): thread-safe publish/subscribe with bounded history,
//!   a last-value snapshot per event type, and a priority queue for urgent events
//! - **Drives** (`drives`): bounded, decaying needs that produce impulses
//! - **Plan tracker** (`plan`): one active multi-step plan with bounded retries
//!   and an advisory loop detector over recent tool calls
//! - **Heartbeat** (`heartbeat`): the periodic reconciler tying the above
//!   together and dispatching actions through registered handlers
//! - **Producers** (`producer`): background pollers that publish events
//!
//! ## Library usage
//!
//! ```no_run
//! use autonomic::config::AutonomicConfig;
//! use autonomic::heartbeat::{ActionPayload, HeartbeatScheduler, MESSAGE_USER};
//! use autonomic::runtime::AgentRuntime;
//!
//! # async fn run() {
//! let config = AutonomicConfig::default();
//! let runtime = AgentRuntime::in_memory(&config);
//! let mut heartbeat = HeartbeatScheduler::builder(runtime.clone(), config.heartbeat.clone())
//!     .action(MESSAGE_USER, |p: &ActionPayload| println!("{}", p.motivation))
//!     .build();
//! heartbeat.start();
//! # }
//! ```

pub mod bus;
pub mod config;
pub mod drives;
pub mod error;
pub mod heartbeat;
pub mod paths;
pub mod persist;
pub mod plan;
pub mod producer;
pub mod runtime;
