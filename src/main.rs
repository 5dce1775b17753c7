// ABOUTME: CLI entry point for attendance-sync
// ABOUTME: Runs the service loop or one-shot session/sync commands

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Result};
use attendance_sync::audit::{AuditSink, TracingSink};
use attendance_sync::config::ConfigFile;
use attendance_sync::service::{AttendanceService, ServiceHooks};
use attendance_sync::TickOutcome;
use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "attendance-sync")]
#[command(about = "Ships newly recorded attendance logs to the attendance API", long_about = None)]
#[command(version)]
struct Cli {
    /// Path to the configuration document (defaults to ~/.attendance-sync/configurations.toml)
    #[arg(long, global = true, env = "ATTENDANCE_SYNC_CONFIG", value_name = "PATH")]
    config: Option<PathBuf>,
    /// Persist the delivery checkpoint in this JSON file across restarts
    #[arg(long = "state-file", global = true, env = "ATTENDANCE_SYNC_STATE", value_name = "PATH")]
    state_file: Option<PathBuf>,
    /// Tracing filter (error, warn, info, debug, trace)
    #[arg(
        long = "log-level",
        global = true,
        default_value = "info",
        env = "ATTENDANCE_SYNC_LOG"
    )]
    log_level: String,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run as a service: authenticate, then ship new logs every TimerInterval
    Run,
    /// Check whether the stored access token is still valid
    Ping,
    /// Log in with the configured credentials and store the access token
    Login,
    /// End the current API session
    Logout,
    /// Authenticate and run a single fetch/send cycle
    SyncOnce,
}

fn init_tracing(filter: &str) -> Result<()> {
    let env_filter = EnvFilter::try_new(filter).or_else(|_| EnvFilter::try_new("info"))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow!("failed to init tracing subscriber: {err}"))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log_level)?;

    let config_path = match cli.config {
        Some(path) => path,
        None => ConfigFile::default_path()?,
    };
    tracing::info!("Using configuration {}", config_path.display());

    let audit: Arc<dyn AuditSink> = Arc::new(TracingSink);
    let mut service =
        AttendanceService::from_file(ConfigFile::new(config_path), cli.state_file, audit).await;

    match cli.command {
        Commands::Run => run_service(&mut service).await,
        Commands::Ping => {
            let state = service.probe().await;
            println!("Session: {:?}", state);
            Ok(())
        }
        Commands::Login => {
            service.login().await?;
            println!("Logged in.");
            Ok(())
        }
        Commands::Logout => {
            service.probe().await;
            if service.logout().await? {
                println!("Logged out.");
            } else {
                println!("No active session.");
            }
            Ok(())
        }
        Commands::SyncOnce => {
            let outcome = service.run_once().await;
            println!("Tick outcome: {:?}", outcome);
            match outcome {
                TickOutcome::SourceFailed | TickOutcome::SendFailed { .. } => {
                    anyhow::bail!("sync cycle did not deliver, see log for details")
                }
                _ => Ok(()),
            }
        }
    }
}

async fn run_service(service: &mut AttendanceService) -> Result<()> {
    service.on_start().await;

    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let mut terminate = signal(SignalKind::terminate())?;
        let mut hangup = signal(SignalKind::hangup())?;
        loop {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => break,
                _ = terminate.recv() => break,
                _ = hangup.recv() => {
                    tracing::info!("SIGHUP received, re-probing session");
                    service.reauthenticate().await;
                }
            }
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    service.on_stop().await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_globals() {
        let cli = Cli::try_parse_from([
            "attendance-sync",
            "--config",
            "/tmp/conf.toml",
            "run",
            "--state-file",
            "/tmp/state.json",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::Run));
        assert_eq!(cli.config, Some(PathBuf::from("/tmp/conf.toml")));
        assert_eq!(cli.state_file, Some(PathBuf::from("/tmp/state.json")));
    }

    #[test]
    fn test_parse_sync_once() {
        let cli =
            Cli::try_parse_from(["attendance-sync", "sync-once", "--log-level", "debug"]).unwrap();
        assert!(matches!(cli.command, Commands::SyncOnce));
        assert_eq!(cli.log_level, "debug");
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["attendance-sync"]).is_err());
    }
}
