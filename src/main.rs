//! Main entry point for the rank tracker
//!
//! `serve` runs the scheduler and health endpoints until interrupted; the
//! other subcommands run one operation against the configured database
//! and exit.

use anyhow::{bail, Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use rank_tracker::config::{validate_config, AppConfig};
use rank_tracker::report::ReportRequest;
use rank_tracker::scheduler::{deliver_with_metrics, parse_schedule_input, SCHEDULE_USAGE};
use rank_tracker::service::{AppState, HealthCheck, HealthStatus};
use rank_tracker::types::{
    ChannelId, OutputFormat, Period, RiotId, Schedule, ScheduleStatus, ServerId, UserId,
};
use std::path::PathBuf;
use tokio::signal;
use tracing::{error, info, warn};

/// Rank Tracker - daily ranked ladder history and reports
#[derive(Parser)]
#[command(
    name = "rank-tracker",
    version,
    about = "Tracks solo-queue ranks of registered players and reports their progress",
    long_about = "Rank Tracker collects each registered player's solo-queue rank from op.gg once \
                 a day, stores the history in SQLite, and produces roster tables, per-player \
                 reports, and rank charts on demand or on a schedule."
)]
struct Args {
    #[arg(
        short,
        long,
        value_name = "FILE",
        global = true,
        help = "Path to configuration file (TOML format)"
    )]
    config: Option<PathBuf>,

    #[arg(
        short,
        long,
        value_name = "LEVEL",
        global = true,
        help = "Override log level (trace, debug, info, warn, error)"
    )]
    log_level: Option<String>,

    #[arg(long, value_name = "PATH", global = true, help = "Override database path")]
    database: Option<String>,

    #[arg(long, value_name = "PORT", global = true, help = "Override health server port")]
    health_port: Option<u16>,

    #[arg(short, long, global = true, help = "Enable debug mode with verbose logging")]
    debug: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the scheduler and health endpoints until interrupted
    Serve,

    /// Collect current ranks now
    Collect {
        /// Only this server's players
        #[arg(long)]
        server: Option<ServerId>,

        /// Also fill missing past dates from the provider's tier history
        #[arg(long)]
        backfill: bool,
    },

    /// Print a report
    Report(ReportArgs),

    /// Manage registered players
    #[command(subcommand)]
    Player(PlayerCommand),

    /// Manage report schedules
    #[command(subcommand)]
    Schedule(ScheduleCommand),

    /// Validate configuration, open the database, and exit
    CheckConfig,
}

#[derive(ClapArgs)]
struct ReportArgs {
    #[arg(long)]
    server: ServerId,

    #[arg(long, default_value = "daily")]
    period: Period,

    #[arg(long, default_value = "table")]
    format: OutputFormat,

    /// Riot ID (`Name#TAG`) or op.gg profile URL for a single-player report
    #[arg(long)]
    player: Option<String>,

    /// Deliver to this channel instead of printing
    #[arg(long)]
    channel: Option<ChannelId>,
}

#[derive(Subcommand)]
enum PlayerCommand {
    /// Register a player and record their current rank
    Add {
        #[arg(long)]
        server: ServerId,

        /// Chat user the player belongs to
        #[arg(long)]
        user: UserId,

        /// Riot ID (`Name#TAG`) or op.gg profile URL
        riot_id: String,

        /// Skip the initial fetch
        #[arg(long)]
        no_fetch: bool,
    },

    /// List registered players
    List {
        #[arg(long)]
        server: Option<ServerId>,
    },

    /// Remove a player by local id; history is kept
    Remove {
        #[arg(long)]
        server: ServerId,

        local_id: u32,
    },
}

#[derive(Subcommand)]
enum ScheduleCommand {
    /// Add a schedule, e.g. `21:00 here daily graph`
    Add {
        #[arg(long)]
        server: ServerId,

        #[arg(long)]
        user: UserId,

        /// Channel that `here` refers to
        #[arg(long)]
        channel: ChannelId,

        /// Schedule definition
        #[arg(num_args = 1.., trailing_var_arg = true)]
        definition: Vec<String>,
    },

    /// Replace a schedule's definition, e.g. `3 08:00 here weekly table`
    Edit {
        #[arg(long)]
        server: ServerId,

        /// Channel that `here` refers to
        #[arg(long)]
        channel: ChannelId,

        local_id: u32,

        /// New schedule definition
        #[arg(num_args = 1.., trailing_var_arg = true)]
        definition: Vec<String>,
    },

    /// List schedules
    List {
        #[arg(long)]
        server: Option<ServerId>,
    },

    Enable {
        #[arg(long)]
        server: ServerId,

        local_id: u32,
    },

    Disable {
        #[arg(long)]
        server: ServerId,

        local_id: u32,
    },

    Remove {
        #[arg(long)]
        server: ServerId,

        local_id: u32,
    },
}

/// Initialize structured logging with the configured level
fn init_logging(log_level: &str) -> Result<()> {
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| log_level.into()),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_line_number(true)
        .finish();

    tracing::subscriber::set_global_default(subscriber)
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    Ok(())
}

/// Wait for shutdown signals (SIGINT, SIGTERM)
async fn wait_for_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received SIGINT (Ctrl+C) signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}

fn display_startup_banner(config: &AppConfig) {
    info!("🚀 Rank Tracker");
    info!("   Service: {}", config.service.name);
    info!("   Log level: {}", config.service.log_level);
    info!("   Health port: {}", config.service.health_port);
    info!("   Database: {}", config.storage.database_path);
    info!(
        "   Provider: {} (region {})",
        config.provider.base_url, config.provider.region
    );
    info!(
        "   Daily collection: {} (UTC{:+})",
        config.scheduler.collection_time, config.scheduler.utc_offset_hours
    );
    info!("   Rank apex policy: {:?}", config.rank.apex_policy);
    info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
}

/// Load configuration, then apply CLI overrides
fn load_config(args: &Args) -> Result<AppConfig> {
    let mut config = if let Some(config_path) = &args.config {
        AppConfig::from_file(config_path)?
    } else {
        AppConfig::from_env()?
    };

    if let Some(log_level) = &args.log_level {
        config.service.log_level = log_level.clone();
    }

    if args.debug {
        config.service.log_level = "debug".to_string();
    }

    if let Some(database) = &args.database {
        config.storage.database_path = database.clone();
    }

    if let Some(port) = args.health_port {
        config.service.health_port = port;
    }

    validate_config(&config)?;
    Ok(config)
}

async fn serve(config: AppConfig) -> Result<()> {
    display_startup_banner(&config);

    info!("Initializing service components...");
    let mut app_state = AppState::new(config.clone()).await?;

    info!("Starting service...");
    app_state.start().await?;

    info!("✅ Rank Tracker is running");
    info!("Press Ctrl+C to shutdown gracefully...");

    wait_for_shutdown_signal().await;
    info!("🛑 Shutdown signal received, beginning graceful shutdown...");

    match tokio::time::timeout(config.shutdown_timeout(), app_state.shutdown()).await {
        Ok(Ok(())) => info!("✅ Graceful shutdown completed successfully"),
        Ok(Err(e)) => warn!("Shutdown finished with errors: {}", e),
        Err(_) => warn!("⚠️  Shutdown timeout exceeded, forcing exit"),
    }

    info!("🛑 Rank Tracker stopped");
    Ok(())
}

async fn collect(app: &AppState, server: Option<ServerId>, backfill: bool) -> Result<()> {
    let summary = app.collector().collect_all(server, backfill).await?;
    println!(
        "Collected {} players: {} updated, {} unranked, {} failed",
        summary.total, summary.success, summary.unranked, summary.failed
    );
    if backfill {
        println!("Backfilled {} history entries", summary.backfilled);
    }
    if !summary.failed_players.is_empty() {
        println!("Failed: {}", summary.failed_players.join(", "));
    }
    Ok(())
}

async fn report(app: &AppState, args: ReportArgs) -> Result<()> {
    let mut request = ReportRequest::new(args.server, args.period, args.format);
    if let Some(player) = &args.player {
        request = request.for_player(RiotId::parse(player)?);
    }

    let rendered = app.reports().generate(&request)?;
    match args.channel {
        Some(channel) => {
            let metrics = app.metrics_service().collector();
            deliver_with_metrics(app.sink().as_ref(), Some(&metrics), channel, &rendered).await?;
            println!("Delivered '{}' to channel {}", rendered.title, channel);
        }
        None => {
            println!("{}", rendered.title);
            println!("{}", rendered.body);
            if let Some(attachment) = &rendered.attachment {
                println!("--- {} ---", attachment.filename);
                println!("{}", attachment.content);
            }
        }
    }
    Ok(())
}

async fn player(app: &AppState, command: PlayerCommand) -> Result<()> {
    match command {
        PlayerCommand::Add {
            server,
            user,
            riot_id,
            no_fetch,
        } => {
            let riot_id = RiotId::parse(&riot_id)?;
            let player = app.history().register_player(server, user, &riot_id, None)?;
            println!("Registered #{} {}", player.local_id, player.riot_id);

            if !no_fetch {
                match app.collector().collect_one(&player).await {
                    Ok(Some(snapshot)) => println!(
                        "Current rank: {}",
                        rank_tracker::rank::format_rank_display(&snapshot)
                    ),
                    Ok(None) => println!("Current rank: unranked"),
                    Err(e) => warn!("Registered, but the first fetch failed: {}", e),
                }
            }
        }
        PlayerCommand::List { server } => {
            let players = app.history().players(server)?;
            if players.is_empty() {
                println!("No players are registered.");
            }
            for player in players {
                println!(
                    "[{}] #{} {} (user {})",
                    player.server_id, player.local_id, player.riot_id, player.discord_id
                );
            }
        }
        PlayerCommand::Remove { server, local_id } => {
            if !app.history().remove_player(server, local_id)? {
                bail!("No player #{} on server {}", local_id, server);
            }
            println!("Removed player #{}", local_id);
        }
    }
    Ok(())
}

fn print_schedule(schedule: &Schedule) {
    println!(
        "[{}] #{} {} <#{}> {} {} {}",
        schedule.server_id,
        schedule.local_id,
        schedule.time.format("%H:%M"),
        schedule.channel_id,
        schedule.period,
        schedule.format,
        schedule.status.as_str()
    );
}

fn schedule(app: &AppState, command: ScheduleCommand) -> Result<()> {
    let store = app.schedules();
    match command {
        ScheduleCommand::Add {
            server,
            user,
            channel,
            definition,
        } => {
            let spec = parse_schedule_input(&definition.join(" "), channel)
                .with_context(|| format!("usage: {}", SCHEDULE_USAGE))?;
            let schedule = store.add_schedule(server, user, &spec)?;
            print_schedule(&schedule);
        }
        ScheduleCommand::Edit {
            server,
            channel,
            local_id,
            definition,
        } => {
            // a running `serve` picks this up on its next schedule refresh
            let schedule = app
                .scheduler()
                .edit_schedule(server, local_id, &definition.join(" "), channel)
                .with_context(|| format!("usage: {}", SCHEDULE_USAGE))?;
            print_schedule(&schedule);
        }
        ScheduleCommand::List { server } => {
            let schedules = store.schedules(server)?;
            if schedules.is_empty() {
                println!("No schedules.");
            }
            schedules.iter().for_each(print_schedule);
        }
        ScheduleCommand::Enable { server, local_id } => {
            print_schedule(&store.set_schedule_status(server, local_id, ScheduleStatus::Enabled)?);
        }
        ScheduleCommand::Disable { server, local_id } => {
            print_schedule(&store.set_schedule_status(server, local_id, ScheduleStatus::Disabled)?);
        }
        ScheduleCommand::Remove { server, local_id } => {
            if !store.delete_schedule(server, local_id)? {
                bail!("No schedule #{} on server {}", local_id, server);
            }
            println!("Removed schedule #{}", local_id);
        }
    }
    Ok(())
}

async fn check_config(config: AppConfig) -> Result<()> {
    display_startup_banner(&config);
    let app = AppState::new(config).await?;

    // Not started, so only the store check is meaningful here
    let health = HealthCheck::check(&app.status()).await?;
    for check in &health.checks {
        info!("  {}: {}", check.name, check.status);
    }
    let store_ok = health
        .checks
        .iter()
        .any(|c| c.name == "history_store" && c.status == HealthStatus::Healthy);
    if !store_ok {
        bail!("History store is not usable");
    }

    println!(
        "Configuration OK ({} players registered)",
        health.stats.registered_players.unwrap_or(0)
    );
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            std::process::exit(1);
        }
    };

    if let Err(e) = init_logging(&config.service.log_level) {
        eprintln!("Failed to initialize logging: {}", e);
        std::process::exit(1);
    }

    let result = match args.command {
        Command::Serve => serve(config).await,
        Command::CheckConfig => check_config(config).await,
        command => {
            let app = AppState::new(config).await?;
            match command {
                Command::Collect { server, backfill } => collect(&app, server, backfill).await,
                Command::Report(report_args) => report(&app, report_args).await,
                Command::Player(player_command) => player(&app, player_command).await,
                Command::Schedule(schedule_command) => schedule(&app, schedule_command),
                Command::Serve | Command::CheckConfig => Ok(()),
            }
        }
    };

    if let Err(e) = &result {
        error!("{:#}", e);
    }
    result
}
