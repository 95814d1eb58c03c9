//! autonomic CLI: drive the agent's heartbeat and inspect its state.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};

use autonomic::config::AutonomicConfig;
use autonomic::drives::DriveKind;
use autonomic::error::AutonomicResult;
use autonomic::heartbeat::{
    ActionPayload, ActivityLog, CHECK_SOCIAL, HeartbeatBuilder, HeartbeatConfig,
    HeartbeatScheduler, MESSAGE_USER,
};
use autonomic::paths::AutonomicPaths;
use autonomic::producer::DirectoryWatcher;
use autonomic::runtime::AgentRuntime;

#[derive(Parser)]
#[command(name = "autonomic", version, about = "Autonomous control core for a desktop agent")]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/autonomic/config.toml).
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Directory for persisted state (default: $XDG_STATE_HOME/autonomic).
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the heartbeat until Ctrl+C (or until --ticks beats).
    Run {
        /// Override the heartbeat interval in seconds.
        #[arg(long)]
        interval: Option<f64>,

        /// Stop after this many beats.
        #[arg(long)]
        ticks: Option<u64>,

        /// Directories to watch for new files (repeatable).
        #[arg(long)]
        watch: Vec<PathBuf>,
    },

    /// Run a single heartbeat now and print its activity record.
    Tick,

    /// Show drive levels, plan and recent activity.
    Status {
        /// Number of recent activities to list.
        #[arg(long, default_value = "10")]
        recent: usize,
    },

    /// Inspect and drive the active goal plan.
    Plan {
        #[command(subcommand)]
        action: PlanAction,
    },

    /// Manage the config file.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum PlanAction {
    /// Show the active plan.
    Show,
    /// Create a plan, replacing the active one.
    Create {
        #[arg(long)]
        goal: String,
        /// Steps as "description|tool; description|tool".
        #[arg(long)]
        steps: String,
        #[arg(long, default_value = "")]
        done_when: String,
    },
    /// Mark a step done.
    Complete {
        step: usize,
        #[arg(long, default_value = "done")]
        outcome: String,
    },
    /// Report a failed attempt at a step.
    Fail {
        step: usize,
        #[arg(long)]
        reason: String,
    },
    /// Drop the active plan.
    Reset,
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Write a config file with every default spelled out.
    Init {
        /// Overwrite an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Print the effective configuration.
    Show,
}

#[tokio::main]
async fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))
    .ok(); // Ignore error if hook already set (e.g., in tests)

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let paths = AutonomicPaths::with_overrides(cli.data_dir.as_deref())?;
    let config_file = cli.config.clone().unwrap_or_else(|| paths.config_file());

    match cli.command {
        Commands::Config { action } => match action {
            ConfigAction::Init { force } => {
                if config_file.exists() && !force {
                    miette::bail!(
                        "{} already exists; pass --force to overwrite",
                        config_file.display()
                    );
                }
                AutonomicConfig::default().save(&config_file)?;
                println!("Wrote {}", config_file.display());
            }
            ConfigAction::Show => {
                let config = AutonomicConfig::load_or_default(&config_file)?;
                print!("{}", toml::to_string_pretty(&config).into_diagnostic()?);
            }
        },

        Commands::Run {
            interval,
            ticks,
            watch,
        } => run_heartbeat(&paths, &config_file, interval, ticks, watch).await?,

        Commands::Tick => {
            let (config, runtime) = open_runtime(&paths, &config_file)?;
            let heartbeat = scheduler_for(&runtime, &paths, config.heartbeat.clone()).build();
            let record = heartbeat.force_tick().await;
            println!("{}", serde_json::to_string_pretty(&record).into_diagnostic()?);
        }

        Commands::Status { recent } => {
            let (config, runtime) = open_runtime(&paths, &config_file)?;
            let heartbeat = scheduler_for(&runtime, &paths, config.heartbeat.clone()).build();
            let status = heartbeat.status().await;

            println!("Drives:");
            runtime.with_drives(|d| {
                for kind in DriveKind::ALL {
                    println!("  {:<12} {:.2}", kind.label(), d.level(kind));
                }
                println!("  mood: {}", d.mood());
            });

            println!("\nPlan: {}", runtime.with_plans(|p| p.state().label()));
            match status.last_heartbeat {
                Some(at) => println!("Last heartbeat: {}", at.format("%Y-%m-%d %H:%M:%S")),
                None => println!("Last heartbeat: never"),
            }
            println!(
                "Interval: {}s, {} activities recorded\n",
                status.interval_secs, status.activities
            );
            println!("{}", heartbeat.activity_summary(recent).await);
        }

        Commands::Plan { action } => {
            let (_, runtime) = open_runtime(&paths, &config_file)?;
            let tools = runtime.goal_tools();
            let message = match action {
                PlanAction::Show => tools.current_plan(),
                PlanAction::Create {
                    goal,
                    steps,
                    done_when,
                } => tools.create_goal_plan(&goal, &steps, &done_when),
                PlanAction::Complete { step, outcome } => tools.complete_step(step, &outcome),
                PlanAction::Fail { step, reason } => tools.fail_step(step, &reason),
                PlanAction::Reset => {
                    runtime.with_plans(|p| p.reset());
                    "Plan reset.".to_string()
                }
            };
            println!("{message}");
        }
    }

    Ok(())
}

fn open_runtime(
    paths: &AutonomicPaths,
    config_file: &Path,
) -> AutonomicResult<(AutonomicConfig, AgentRuntime)> {
    let config = AutonomicConfig::load_or_default(config_file)?;
    paths.ensure_dirs()?;
    let runtime = AgentRuntime::open(&config, paths);
    Ok((config, runtime))
}

/// Beat until the tick limit or Ctrl+C, then print recent activity.
async fn run_heartbeat(
    paths: &AutonomicPaths,
    config_file: &Path,
    interval: Option<f64>,
    ticks: Option<u64>,
    watch: Vec<PathBuf>,
) -> AutonomicResult<()> {
    let (config, runtime) = open_runtime(paths, config_file)?;
    let mut hb_config = config.heartbeat.clone();
    if let Some(secs) = interval {
        hb_config.interval_secs = secs;
    }
    let grace = hb_config.stop_grace();
    let mut builder = scheduler_for(&runtime, paths, hb_config);
    if !watch.is_empty() {
        builder = builder.producer(DirectoryWatcher::new(watch, Duration::from_secs(5)));
    }
    let mut heartbeat = builder.build();

    heartbeat.start_with_limit(ticks);
    tokio::select! {
        _ = heartbeat.finished() => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("received Ctrl+C, stopping heartbeat");
        }
    }
    heartbeat.stop(grace).await?;
    println!("{}", heartbeat.activity_summary(10).await);
    Ok(())
}

/// Scheduler wired to persisted activity and stdout action handlers.
fn scheduler_for(
    runtime: &AgentRuntime,
    paths: &AutonomicPaths,
    config: HeartbeatConfig,
) -> HeartbeatBuilder {
    let log = ActivityLog::open(config.activity_capacity, &paths.heartbeat_log_file());
    HeartbeatScheduler::builder(runtime.clone(), config)
        .activity_log(log)
        .action(MESSAGE_USER, |p: &ActionPayload| {
            println!("💬 [{}] {}", p.reason, p.motivation);
        })
        .action(CHECK_SOCIAL, |p: &ActionPayload| {
            println!("🌐 [{}] {}", p.reason, p.motivation);
        })
}
