//! Event producers: independent background pollers that publish to the bus.
//!
//! Each producer runs on its own named OS thread and polls at its own
//! interval. The sleep between polls is a `recv_timeout` on a stop channel, so
//! `ProducerSet::stop` wakes idle producers immediately; a producer that is
//! inside `poll` is given until the grace deadline to return.

use std::collections::HashSet;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::bus::{EventBus, EventPayload, Priority};
use crate::error::{SchedulerError, SchedulerResult};

pub type PollResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// A source of events. Polled repeatedly on a dedicated thread.
pub trait EventProducer: Send + 'static {
    fn name(&self) -> &str;

    /// Pause between polls.
    fn interval(&self) -> Duration;

    /// Check the source once and publish whatever changed.
    fn poll(&mut self, bus: &EventBus) -> PollResult;
}

struct RunningProducer {
    name: String,
    stop_tx: mpsc::Sender<()>,
    handle: JoinHandle<()>,
}

/// Registered producers and, once started, their threads.
#[derive(Default)]
pub struct ProducerSet {
    pending: Vec<Box<dyn EventProducer>>,
    running: Vec<RunningProducer>,
    started: bool,
}

impl ProducerSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a producer. Producers added after `start` are started on the
    /// next `start` call.
    pub fn add(&mut self, producer: impl EventProducer) {
        self.pending.push(Box::new(producer));
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    pub fn running(&self) -> usize {
        self.running.len()
    }

    /// Spawn a thread for every registered producer not yet running.
    ///
    /// Returns how many were started. A producer whose thread cannot be
    /// spawned is logged and dropped.
    pub fn start(&mut self, bus: &Arc<EventBus>) -> usize {
        self.started = true;
        let mut started = 0;
        for producer in self.pending.drain(..) {
            let name = producer.name().to_string();
            let (stop_tx, stop_rx) = mpsc::channel::<()>();
            let bus = Arc::clone(bus);
            let spawned = thread::Builder::new()
                .name(format!("producer-{name}"))
                .spawn(move || run_producer(producer, bus, stop_rx));
            match spawned {
                Ok(handle) => {
                    tracing::info!(producer = %name, "producer: started");
                    self.running.push(RunningProducer {
                        name,
                        stop_tx,
                        handle,
                    });
                    started += 1;
                }
                Err(e) => {
                    tracing::warn!(producer = %name, error = %e, "producer: failed to spawn thread");
                }
            }
        }
        started
    }

    /// Signal every producer to stop and wait up to `grace` for them to exit.
    ///
    /// Threads still running at the deadline are detached and reported.
    pub fn stop(&mut self, grace: Duration) -> SchedulerResult<()> {
        for p in &self.running {
            let _ = p.stop_tx.send(());
        }

        let deadline = Instant::now() + grace;
        let mut remaining: Vec<RunningProducer> = std::mem::take(&mut self.running);
        loop {
            let (finished, still): (Vec<_>, Vec<_>) =
                remaining.into_iter().partition(|p| p.handle.is_finished());
            for p in finished {
                if p.handle.join().is_err() {
                    tracing::warn!(producer = %p.name, "producer: thread panicked");
                }
            }
            remaining = still;
            if remaining.is_empty() || Instant::now() >= deadline {
                break;
            }
            thread::sleep(Duration::from_millis(10));
        }

        self.started = false;
        match remaining.first() {
            None => Ok(()),
            Some(p) => {
                let names: Vec<&str> = remaining.iter().map(|p| p.name.as_str()).collect();
                tracing::warn!(producers = ?names, "producer: did not stop in time");
                Err(SchedulerError::StopTimeout {
                    worker: format!("producer {}", p.name),
                    waited_ms: grace.as_millis() as u64,
                })
            }
        }
    }
}

impl std::fmt::Debug for ProducerSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProducerSet")
            .field("pending", &self.pending.len())
            .field("running", &self.running.len())
            .field("started", &self.started)
            .finish()
    }
}

/// Polls directories and publishes `FILE_CREATED` for files that appear.
///
/// The first poll only records what is already there.
#[derive(Debug)]
pub struct DirectoryWatcher {
    dirs: Vec<PathBuf>,
    interval: Duration,
    seen: HashSet<PathBuf>,
    primed: bool,
}

impl DirectoryWatcher {
    pub fn new(dirs: Vec<PathBuf>, interval: Duration) -> Self {
        Self {
            dirs,
            interval,
            seen: HashSet::new(),
            primed: false,
        }
    }

    fn scan(&self) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for dir in &self.dirs {
            let Ok(entries) = std::fs::read_dir(dir) else {
                continue;
            };
            files.extend(
                entries
                    .filter_map(|e| e.ok())
                    .filter(|e| e.file_type().map(|ft| ft.is_file()).unwrap_or(false))
                    .map(|e| e.path()),
            );
        }
        files.sort();
        files
    }
}

impl EventProducer for DirectoryWatcher {
    fn name(&self) -> &str {
        "filesystem"
    }

    fn interval(&self) -> Duration {
        self.interval
    }

    fn poll(&mut self, bus: &EventBus) -> PollResult {
        let files = self.scan();
        let primed = std::mem::replace(&mut self.primed, true);
        for file in files {
            if self.seen.insert(file.clone()) && primed {
                bus.publish(
                    "filesystem",
                    EventPayload::FileCreated {
                        path: file.display().to_string(),
                    },
                    Priority::Normal,
                );
            }
        }
        Ok(())
    }
}

fn run_producer(mut producer: Box<dyn EventProducer>, bus: Arc<EventBus>, stop_rx: mpsc::Receiver<()>) {
    loop {
        match catch_unwind(AssertUnwindSafe(|| producer.poll(&bus))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                tracing::warn!(producer = producer.name(), error = %e, "producer: poll failed");
            }
            Err(_) => {
                tracing::warn!(producer = producer.name(), "producer: poll panicked, stopping");
                return;
            }
        }
        match stop_rx.recv_timeout(producer.interval()) {
            Err(RecvTimeoutError::Timeout) => continue,
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    tracing::debug!(producer = producer.name(), "producer: stopped");
}
