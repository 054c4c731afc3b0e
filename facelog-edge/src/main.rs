//! FaceLog attendance checkpoint.
//!
//! Runs on the device next to the camera:
//! 1. Captures a face when the operator (or a button wired to stdin) asks
//! 2. Asks the recognition service who it is and records the attempt locally
//! 3. Syncs recorded attempts to the service whenever it is reachable
//!
//! Usage:
//!   facelog-edge --config /etc/facelog/edge.json run

use anyhow::{Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand, ValueEnum};
use facelog_edge::{
    DeviceHealth, EdgeConfig, HealthConfig, HealthMonitor, StationCommand, build, display,
    parse_command, spawn_health_monitor,
};
use facelog_pipeline::{CycleRecord, Orchestrator, PipelineResult};
use facelog_recognition::LogFilter;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser, Debug)]
#[command(name = "facelog-edge")]
#[command(about = "FaceLog attendance checkpoint")]
struct Args {
    /// Path to a JSON config file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Recognition service base URL
    #[arg(long)]
    server_url: Option<String>,

    /// Identifier this checkpoint reports to the service
    #[arg(long)]
    device_id: Option<String>,

    /// Directory for the local cache
    #[arg(long)]
    data_dir: Option<PathBuf>,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the checkpoint; type `in` or `out` to capture, `quit` to stop
    Run,
    /// Capture a face and register it with the service
    Enroll {
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "")]
        role: String,
    },
    /// List visible WiFi networks
    Networks,
    /// Join a WiFi network
    Connect {
        ssid: String,
        #[arg(long)]
        password: Option<String>,
    },
    /// Leave the current WiFi network
    Disconnect,
    /// Show or switch the WiFi radio
    Radio {
        #[arg(value_enum, default_value = "status")]
        state: RadioState,
    },
    /// Submit unsynced entries now
    Sync,
    /// Refresh and list registered users
    Users {
        /// Show the cached list without contacting the service
        #[arg(long)]
        offline: bool,
    },
    /// Show recent attendance entries
    History {
        #[arg(short, long, default_value = "20")]
        limit: usize,
        /// Read the service's log instead of the local one
        #[arg(long)]
        remote: bool,
    },
    /// Show worked hours for a day, or per day over a range
    Hours {
        /// Day to report (service's today if omitted)
        #[arg(long, conflicts_with_all = ["from", "to"])]
        date: Option<NaiveDate>,
        #[arg(long)]
        from: Option<NaiveDate>,
        #[arg(long)]
        to: Option<NaiveDate>,
    },
    /// Show camera, service, queue and device health
    Status,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum RadioState {
    On,
    Off,
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let default_filter = if args.verbose { "facelog=debug" } else { "facelog=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let config = EdgeConfig::load(args.config.as_deref())?.with_overrides(
        args.server_url,
        args.device_id,
        args.data_dir,
    );
    let orchestrator = build(&config)?;

    match args.command {
        Command::Run => run(orchestrator, &config).await,
        Command::Enroll { name, role } => {
            let subject_id = orchestrator
                .enroll(&name, &role)
                .await
                .context("Enrollment failed")?;
            orchestrator.capture().close().await;
            println!("Enrolled {name} as {subject_id}");
            Ok(())
        }
        Command::Networks => {
            let networks = orchestrator
                .connectivity()
                .list_networks()
                .await
                .context("Failed to list networks")?;
            if networks.is_empty() {
                println!("No networks visible");
            }
            for network in &networks {
                println!("{}", display::network_line(network));
            }
            Ok(())
        }
        Command::Connect { ssid, password } => {
            let connectivity = orchestrator.connectivity();
            connectivity
                .connect(&ssid, password.as_deref())
                .await
                .with_context(|| format!("Failed to connect to {ssid}"))?;
            let online = connectivity.is_online().await;
            println!(
                "Connected to {ssid}; service {}",
                if online { "reachable" } else { "unreachable" }
            );
            Ok(())
        }
        Command::Disconnect => {
            orchestrator
                .connectivity()
                .disconnect()
                .await
                .context("Failed to disconnect")?;
            println!("Disconnected");
            Ok(())
        }
        Command::Radio { state } => radio(&orchestrator, state).await,
        Command::Sync => sync(&orchestrator).await,
        Command::Users { offline } => users(&orchestrator, offline).await,
        Command::History { limit, remote } => history(&orchestrator, limit, remote).await,
        Command::Hours { date, from, to } => hours(&orchestrator, date, from, to).await,
        Command::Status => {
            let online = orchestrator.connectivity().is_online().await;
            let status = orchestrator.status().await.context("Failed to read status")?;
            println!("{}", display::status_text(&status));
            if online {
                if let Ok(health) = orchestrator.recognition().health().await {
                    println!("server:   {health}");
                }
            }
            let health = HealthMonitor::new(&config.data_dir).sample_settled().await;
            print_health(&health, &config.health);
            Ok(())
        }
    }
}

async fn run(orchestrator: Arc<Orchestrator>, config: &EdgeConfig) -> Result<()> {
    if let Err(e) = orchestrator.capture().open().await {
        warn!(error = %e, "Camera unavailable; attempts will be recorded as camera errors");
    }
    let sync = orchestrator.spawn_sync_loop();
    let health_task = spawn_health_monitor(config.health.clone(), config.data_dir.clone());
    let mut health = HealthMonitor::new(&config.data_dir);

    let mut events = orchestrator.subscribe();
    let printer = tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => println!("{}", display::event_line(&event)),
                Err(RecvError::Lagged(skipped)) => warn!(skipped, "Event output fell behind"),
                Err(RecvError::Closed) => break,
            }
        }
    });

    println!("\n========================================");
    println!("  FaceLog Checkpoint Running");
    println!("========================================");
    println!("  in / out   capture a check-in / check-out");
    println!("  sync       sync now");
    println!("  status     show status");
    println!("  quit       stop");
    println!("========================================\n");

    let mut cycles: Vec<JoinHandle<PipelineResult<CycleRecord>>> = Vec::new();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                match parse_command(&line) {
                    Some(StationCommand::Trigger(event_type)) => {
                        cycles.retain(|cycle| !cycle.is_finished());
                        cycles.push(orchestrator.trigger(event_type));
                    }
                    Some(StationCommand::Sync) => sync.request_sync(),
                    Some(StationCommand::Status) => {
                        match orchestrator.status().await {
                            Ok(status) => println!("{}", display::status_text(&status)),
                            Err(e) => println!("ERROR: {e}"),
                        }
                        print_health(&health.sample(), &config.health);
                    }
                    Some(StationCommand::Quit) => break,
                    None if line.trim().is_empty() => {}
                    None => println!("Unknown command: {}", line.trim()),
                }
            }
        }
    }

    info!("Shutting down");
    // Attempts already under way still get recorded.
    for cycle in cycles {
        if let Err(e) = Orchestrator::join_cycle(cycle).await {
            warn!(error = %e, "Cycle did not complete");
        }
    }
    sync.shutdown().await;
    orchestrator.capture().close().await;
    if let Some(task) = health_task {
        task.abort();
    }
    printer.abort();
    Ok(())
}

fn print_health(health: &DeviceHealth, thresholds: &HealthConfig) {
    println!("{}", display::health_text(health));
    for warning in health.warnings(thresholds) {
        println!("WARNING: {warning}");
    }
}

async fn radio(orchestrator: &Orchestrator, state: RadioState) -> Result<()> {
    let connectivity = orchestrator.connectivity();
    match state {
        RadioState::On | RadioState::Off => {
            let enabled = matches!(state, RadioState::On);
            connectivity
                .set_radio_enabled(enabled)
                .await
                .context("Failed to switch radio")?;
        }
        RadioState::Status => {}
    }
    let enabled = connectivity
        .radio_enabled()
        .await
        .context("Failed to read radio state")?;
    println!("WiFi radio {}", if enabled { "on" } else { "off" });
    Ok(())
}

async fn sync(orchestrator: &Orchestrator) -> Result<()> {
    if !orchestrator.connectivity().is_online().await {
        let waiting = orchestrator.cache().unsynced_count().await?;
        println!("Service unreachable; {waiting} entries waiting");
        return Ok(());
    }
    let report = orchestrator.drain().await.context("Sync failed")?;
    println!("{}", display::report_line(&report));
    Ok(())
}

async fn users(orchestrator: &Orchestrator, offline: bool) -> Result<()> {
    if !offline {
        if let Err(e) = orchestrator.refresh_users().await {
            warn!(error = %e, "Showing cached users");
        }
    }
    let users = orchestrator
        .cache()
        .cached_users()
        .await
        .context("Failed to read cached users")?;
    if users.is_empty() {
        println!("No users cached");
    }
    for user in &users {
        println!("{}", display::user_line(user));
    }
    Ok(())
}

async fn history(orchestrator: &Orchestrator, limit: usize, remote: bool) -> Result<()> {
    if remote {
        let filter = LogFilter {
            limit: Some(u32::try_from(limit).unwrap_or(u32::MAX)),
        };
        let records = orchestrator
            .recognition()
            .fetch_log(&filter)
            .await
            .context("Failed to fetch service log")?;
        for record in &records {
            println!("{}", display::record_line(record));
        }
        return Ok(());
    }

    let entries = orchestrator
        .cache()
        .recent_logs(limit)
        .await
        .context("Failed to read local log")?;
    for entry in &entries {
        println!("{}", display::entry_line(entry));
    }
    Ok(())
}

async fn hours(
    orchestrator: &Orchestrator,
    date: Option<NaiveDate>,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
) -> Result<()> {
    let recognition = orchestrator.recognition();
    if from.is_some() || to.is_some() {
        let days = recognition
            .work_hours_summary(from, to)
            .await
            .context("Failed to fetch work hours summary")?;
        for day in &days {
            println!("{}", display::hours_day_line(day));
        }
    } else {
        let rows = recognition
            .work_hours(date)
            .await
            .context("Failed to fetch work hours")?;
        for row in &rows {
            println!("{}", display::hours_line(row));
        }
    }
    Ok(())
}
