// ABOUTME: Timer-driven fetch -> map -> send loop with a single-flight guard
// ABOUTME: Every error is caught inside the tick and reported; the loop never stops on failure

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch, Mutex};
use tokio::time::{interval_at, Instant, MissedTickBehavior};

use crate::audit::AuditSink;
use crate::checkpoint::Checkpoint;
use crate::error::SyncError;
use crate::session::{SessionManager, SessionState};
use crate::source::SourceReader;
use crate::uploader::{SendOutcome, Uploader};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// Timer disarmed, store released.
    Disabled,
    /// Armed, waiting for the next firing.
    Idle,
    /// A fetch -> map -> send pipeline is running.
    Ticking,
}

/// What a single timer firing did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Scheduler is disabled, nothing ran.
    Disabled,
    /// Another tick was still running; this firing was dropped.
    InFlight,
    /// No valid session; the store was not touched.
    NotLoggedIn,
    /// The store query failed; checkpoint untouched.
    SourceFailed,
    /// The query returned no rows; checkpoint untouched.
    NoNewLogs,
    /// Rows were read but the upload failed; checkpoint untouched.
    SendFailed { rows: usize },
    /// Rows were accepted and the checkpoint advanced.
    Delivered {
        rows: usize,
        records_updated: Option<u64>,
    },
}

/// Everything one tick touches. Exactly one writer (the scheduler) owns it.
pub struct SyncEngine {
    session: SessionManager,
    reader: SourceReader,
    uploader: Uploader,
    checkpoint: Checkpoint,
    state_file: Option<PathBuf>,
    audit: Arc<dyn AuditSink>,
}

impl SyncEngine {
    pub fn new(
        session: SessionManager,
        reader: SourceReader,
        uploader: Uploader,
        checkpoint: Checkpoint,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self {
            session,
            reader,
            uploader,
            checkpoint,
            state_file: None,
            audit,
        }
    }

    /// Persist the checkpoint to `path` after every advance.
    pub fn with_state_file(mut self, path: PathBuf) -> Self {
        self.state_file = Some(path);
        self
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut SessionManager {
        &mut self.session
    }

    pub fn checkpoint(&self) -> &Checkpoint {
        &self.checkpoint
    }

    pub fn is_store_open(&self) -> bool {
        self.reader.is_connected()
    }

    /// Probe the held token and, if that does not yield a session, log in once.
    pub async fn authenticate(&mut self) -> SessionState {
        if self.session.probe().await == SessionState::LoggedIn {
            return SessionState::LoggedIn;
        }
        // Outcome is reported by the session manager.
        let _ = self.session.login().await;
        self.session.state()
    }

    /// Run one fetch -> map -> send pipeline.
    pub async fn tick(&mut self) -> TickOutcome {
        if !self.session.is_logged_in() {
            tracing::debug!("Not logged in, skipping tick");
            return TickOutcome::NotLoggedIn;
        }

        let rows = match self.reader.fetch(&mut self.checkpoint).await {
            Ok(rows) => rows,
            Err(e) => {
                self.audit.error(&format!("OnTimerElapsed: {}", e));
                return TickOutcome::SourceFailed;
            }
        };

        if rows.is_empty() {
            self.audit.info(&format!(
                "no new attendance logs. no data sent to api on {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S")
            ));
            return TickOutcome::NoNewLogs;
        }

        self.audit.info(&format!(
            "attendance logs to be sent to api: {}",
            rows.len()
        ));

        let token = self.session.access_token().unwrap_or_default().to_string();
        match self.uploader.send(&rows, &token).await {
            Ok(SendOutcome::Delivered {
                records_updated,
                advance_to,
            }) => {
                if self.checkpoint.advance(advance_to) {
                    self.persist_checkpoint().await;
                }
                TickOutcome::Delivered {
                    rows: rows.len(),
                    records_updated,
                }
            }
            // Empty batches return above; the arm keeps the match exhaustive.
            Ok(SendOutcome::Skipped) => TickOutcome::NoNewLogs,
            Err(_) => TickOutcome::SendFailed { rows: rows.len() },
        }
    }

    async fn persist_checkpoint(&self) {
        let Some(path) = &self.state_file else {
            return;
        };
        if let Err(e) = self.checkpoint.save(path).await {
            self.audit.error(&format!(
                "Failed to persist checkpoint: {}",
                SyncError::Config(format!("{:#}", e))
            ));
        }
    }

    /// Drop the store handle; it is reopened lazily if ticks resume.
    pub fn release_store(&mut self) {
        self.reader.release();
    }
}

/// Fires [`SyncEngine::tick`] on a fixed interval.
///
/// Each firing runs on its own task and must win `try_lock` on the engine; a
/// firing that finds a tick still running is dropped.
#[derive(Clone)]
pub struct SyncScheduler {
    engine: Arc<Mutex<SyncEngine>>,
    state: Arc<watch::Sender<SchedulerState>>,
    period: Duration,
}

impl SyncScheduler {
    pub fn new(engine: SyncEngine, period: Duration) -> Self {
        let (state, _) = watch::channel(SchedulerState::Disabled);
        Self {
            engine: Arc::new(Mutex::new(engine)),
            state: Arc::new(state),
            period,
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn state(&self) -> SchedulerState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<SchedulerState> {
        self.state.subscribe()
    }

    pub fn engine(&self) -> &Arc<Mutex<SyncEngine>> {
        &self.engine
    }

    /// Probe and, if needed, log in once.
    pub async fn authenticate(&self) -> SessionState {
        self.engine.lock().await.authenticate().await
    }

    /// Move to `Idle` so firings are accepted.
    pub fn arm(&self) {
        self.state.send_if_modified(|state| {
            if *state == SchedulerState::Disabled {
                *state = SchedulerState::Idle;
                true
            } else {
                false
            }
        });
    }

    /// Handle one timer firing.
    pub async fn fire(&self) -> TickOutcome {
        if self.state() == SchedulerState::Disabled {
            return TickOutcome::Disabled;
        }

        let Ok(mut engine) = self.engine.try_lock() else {
            tracing::debug!("Previous tick still running, dropping this one");
            return TickOutcome::InFlight;
        };

        let entered = self.state.send_if_modified(|state| {
            if *state == SchedulerState::Idle {
                *state = SchedulerState::Ticking;
                true
            } else {
                false
            }
        });
        if !entered {
            return TickOutcome::Disabled;
        }

        let outcome = engine.tick().await;
        drop(engine);

        self.state.send_if_modified(|state| {
            if *state == SchedulerState::Ticking {
                *state = SchedulerState::Idle;
                true
            } else {
                false
            }
        });

        tracing::debug!("Tick finished: {:?}", outcome);
        outcome
    }

    /// Disarm the timer and release the store.
    ///
    /// A tick that is already running is left to finish; the store is
    /// released once it does.
    pub fn disable(&self) {
        self.state.send_replace(SchedulerState::Disabled);
        match Arc::clone(&self.engine).try_lock_owned() {
            Ok(mut engine) => engine.release_store(),
            Err(_) => {
                let engine = Arc::clone(&self.engine);
                tokio::spawn(async move {
                    engine.lock().await.release_store();
                });
            }
        }
    }

    /// End the API session; a terminated session also disables the scheduler.
    pub async fn logout(&self) -> Result<bool, SyncError> {
        let ended = self.engine.lock().await.session_mut().logout().await?;
        if ended {
            self.disable();
        }
        Ok(ended)
    }

    /// Fire every `period` until `shutdown` is signalled or the scheduler is
    /// disabled. The caller arms first; a scheduler that is already disabled
    /// returns at once. The first firing happens one period after start.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) {
        let mut state_rx = self.subscribe();
        if *state_rx.borrow_and_update() == SchedulerState::Disabled {
            tracing::info!("Sync scheduler is disabled, not starting timer");
            return;
        }
        let mut ticker = interval_at(Instant::now() + self.period, self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!("Sync scheduler armed with interval {:?}", self.period);

        loop {
            tokio::select! {
                biased;

                _ = shutdown.recv() => {
                    tracing::info!("Shutdown signal received, stopping sync scheduler");
                    break;
                }
                changed = state_rx.changed() => {
                    if changed.is_err() || *state_rx.borrow() == SchedulerState::Disabled {
                        tracing::info!("Sync scheduler disabled");
                        break;
                    }
                }
                _ = ticker.tick() => {
                    let scheduler = self.clone();
                    tokio::spawn(async move {
                        scheduler.fire().await;
                    });
                }
            }
        }

        self.disable();
    }
}
