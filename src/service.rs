// ABOUTME: Lifecycle wiring for the attendance shipper
// ABOUTME: Start hook probes/logs in then arms the timer; stop hook disables it

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;

use crate::audit::AuditSink;
use crate::checkpoint::Checkpoint;
use crate::config::{ConfigFile, Configuration};
use crate::error::SyncError;
use crate::scheduler::{SchedulerState, SyncEngine, SyncScheduler, TickOutcome};
use crate::session::{SessionManager, SessionState};
use crate::source::SourceReader;
use crate::uploader::Uploader;

/// Start/stop hooks a host (service manager, CLI, test) drives.
#[async_trait]
pub trait ServiceHooks {
    async fn on_start(&mut self);
    async fn on_stop(&mut self);
}

pub struct AttendanceService {
    scheduler: SyncScheduler,
    audit: Arc<dyn AuditSink>,
    shutdown: broadcast::Sender<()>,
    runner: Option<JoinHandle<()>>,
}

impl AttendanceService {
    /// Build the service from a configuration file.
    ///
    /// A configuration that fails to load is reported and replaced by the
    /// defaults; the service still starts and its calls fail until the file
    /// is fixed.
    pub async fn from_file(
        config_file: ConfigFile,
        state_file: Option<PathBuf>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        let config = match config_file.load() {
            Ok(config) => config,
            Err(e) => {
                audit.error(&format!("Error occurs in Configurations.Load(): {}", e));
                Configuration::default()
            }
        };

        let checkpoint = match &state_file {
            Some(path) => Checkpoint::load_or_default(path).await,
            None => Checkpoint::new(),
        };

        let mut engine = SyncEngine::new(
            SessionManager::new(&config, Some(config_file), Arc::clone(&audit)),
            SourceReader::new(config.connection_string.clone()),
            Uploader::new(config.base_address.clone(), Arc::clone(&audit)),
            checkpoint,
            Arc::clone(&audit),
        );
        if let Some(path) = state_file {
            engine = engine.with_state_file(path);
        }

        Self::new(SyncScheduler::new(engine, config.timer_interval), audit)
    }

    pub fn new(scheduler: SyncScheduler, audit: Arc<dyn AuditSink>) -> Self {
        let (shutdown, _) = broadcast::channel(4);
        Self {
            scheduler,
            audit,
            shutdown,
            runner: None,
        }
    }

    pub fn scheduler(&self) -> &SyncScheduler {
        &self.scheduler
    }

    pub fn state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    /// Explicit re-probe: check the token and log in once if it is rejected.
    pub async fn reauthenticate(&self) -> SessionState {
        self.scheduler.authenticate().await
    }

    /// Ping only; never logs in.
    pub async fn probe(&self) -> SessionState {
        self.scheduler.engine().lock().await.session_mut().probe().await
    }

    /// Probe, then log in if the held token was not accepted.
    pub async fn login(&self) -> Result<String, SyncError> {
        let mut engine = self.scheduler.engine().lock().await;
        let session = engine.session_mut();
        session.probe().await;
        session.login().await
    }

    pub async fn logout(&self) -> Result<bool, SyncError> {
        self.scheduler.logout().await
    }

    /// Authenticate and run exactly one tick, without arming the timer loop.
    pub async fn run_once(&self) -> TickOutcome {
        self.scheduler.authenticate().await;
        self.scheduler.arm();
        let outcome = self.scheduler.fire().await;
        self.scheduler.disable();
        outcome
    }

    /// Wait until the timer loop has exited (after `on_stop` or a logout).
    pub async fn wait(&mut self) {
        if let Some(runner) = self.runner.take() {
            if let Err(e) = runner.await {
                tracing::error!("Sync scheduler task failed: {}", e);
            }
        }
    }
}

#[async_trait]
impl ServiceHooks for AttendanceService {
    /// Probe, log in if needed, then arm the timer whatever the outcome so
    /// later ticks run as soon as a session exists.
    async fn on_start(&mut self) {
        self.audit.info("Attendance sync service STARTED.");

        let session = self.scheduler.authenticate().await;
        tracing::info!("Startup authentication finished: {:?}", session);

        if self.runner.is_none() {
            let scheduler = self.scheduler.clone();
            let shutdown = self.shutdown.subscribe();
            self.scheduler.arm();
            self.runner = Some(tokio::spawn(async move { scheduler.run(shutdown).await }));
        }
    }

    async fn on_stop(&mut self) {
        self.audit.info("Attendance sync service STOPPED.");
        let _ = self.shutdown.send(());
        self.scheduler.disable();
        self.wait().await;
    }
}
