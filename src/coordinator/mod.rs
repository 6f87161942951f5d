// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Replication orchestrator.
//!
//! Ties together:
//! - Discovery via [`crate::discovery::list_candidates`]
//! - Deduplication via [`crate::dedup::DedupTracker`]
//! - Transfer with retry via [`crate::resilience::RetryingTransfer`]
//! - Status persistence via [`crate::store::StatusStore`]
//!
//! # Tick
//!
//! ```text
//! list watched dir ──► drop seen keys ──► for each (sorted by name):
//!                                            replicate() ──► mark seen
//!                                         maybe_reset()
//! ```
//!
//! Ticks are single-flight: a call that overlaps a running tick returns a
//! skipped report immediately. Files within a tick are processed strictly
//! one after another, and one file's failure never stops the rest.
//!
//! # Shutdown
//!
//! [`Replicator::run`] only checks the shutdown signal between ticks, so an
//! in-flight tick always finishes (including its store writes).

mod pipeline;
mod types;

pub use types::{EngineState, ReplicationReport, TickReport};

use crate::config::ReplicatorConfig;
use crate::dedup::DedupTracker;
use crate::discovery::list_candidates;
use crate::error::{ReplicationError, Result};
use crate::metrics;
use crate::resilience::RetryingTransfer;
use crate::store::StatusStore;
use crate::transport::Transport;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tracing::{debug, error, info, warn};

/// The file replicator.
///
/// Generic over the transport and the status store so both can be swapped
/// (SCP + SQLite in production, recording fakes in tests).
pub struct Replicator<T: Transport, S: StatusStore> {
    config: ReplicatorConfig,
    transfer: RetryingTransfer<T>,
    store: S,
    tracker: Arc<DedupTracker>,

    /// Held for the duration of a tick
    tick_lock: Mutex<()>,

    state_tx: watch::Sender<EngineState>,
    state_rx: watch::Receiver<EngineState>,
}

impl<T: Transport, S: StatusStore> Replicator<T, S> {
    /// Create a replicator with its own dedup tracker.
    pub fn new(config: ReplicatorConfig, transport: T, store: S) -> Self {
        let tracker = Arc::new(DedupTracker::new(config.watch.dedup_high_water_mark));
        Self::with_tracker(config, transport, store, tracker)
    }

    /// Create a replicator sharing an existing dedup tracker.
    pub fn with_tracker(
        config: ReplicatorConfig,
        transport: T,
        store: S,
        tracker: Arc<DedupTracker>,
    ) -> Self {
        let (state_tx, state_rx) = watch::channel(EngineState::Created);
        let transfer = RetryingTransfer::new(
            transport,
            config.retry.retry_config(),
            config.remote.base_path.clone(),
        );

        Self {
            config,
            transfer,
            store,
            tracker,
            tick_lock: Mutex::new(()),
            state_tx,
            state_rx,
        }
    }

    pub fn config(&self) -> &ReplicatorConfig {
        &self.config
    }

    /// Get a reference to the status store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Get the wrapped transport.
    pub fn transport(&self) -> &T {
        self.transfer.transport()
    }

    /// Get the dedup tracker.
    pub fn tracker(&self) -> &Arc<DedupTracker> {
        &self.tracker
    }

    /// Get current state.
    pub fn state(&self) -> EngineState {
        *self.state_rx.borrow()
    }

    /// Get a receiver to watch state changes.
    pub fn state_receiver(&self) -> watch::Receiver<EngineState> {
        self.state_rx.clone()
    }

    pub fn is_running(&self) -> bool {
        matches!(self.state(), EngineState::Running)
    }

    fn set_state(&self, state: EngineState) {
        let _ = self.state_tx.send(state);
        metrics::set_engine_state(&state.to_string());
    }

    /// Run one discovery-and-replicate cycle.
    ///
    /// Never fails: discovery problems and per-file failures are logged and
    /// reported in the returned [`TickReport`].
    pub async fn tick(&self) -> TickReport {
        let Ok(_guard) = self.tick_lock.try_lock() else {
            debug!("Previous tick still running, skipping");
            metrics::record_tick("skipped");
            return TickReport::skipped();
        };

        let started = Instant::now();
        let watch_path = &self.config.watch.path;
        let mut report = TickReport::default();

        let listed = match list_candidates(watch_path).await {
            Ok(listed) => listed,
            Err(e) => {
                error!(path = %watch_path.display(), error = %e, "Failed to list watched directory");
                metrics::record_tick("discovery_failed");
                report.discovery_error = Some(e.to_string());
                return report;
            }
        };

        report.listed = listed.len();
        let candidates: Vec<_> = listed
            .into_iter()
            .filter(|c| !self.tracker.seen(&c.dedup_key()))
            .collect();
        report.new_files = candidates.len();
        metrics::record_discovery(report.listed, report.new_files);

        if candidates.is_empty() {
            info!("No new files detected");
            self.record_completed_tick(started);
            return report;
        }

        info!(count = candidates.len(), "New files detected");

        for candidate in &candidates {
            match self.replicate(candidate).await {
                Ok(outcome) => {
                    self.tracker.mark_seen(candidate.dedup_key());
                    if outcome.is_completed() {
                        report.completed += 1;
                    } else {
                        report.failed += 1;
                    }
                    report.reports.push(outcome);
                }
                Err(e) => {
                    // Not marked seen: the next tick picks it up again
                    warn!(file = %candidate.name, error = %e, "File left for next tick");
                    report.errors += 1;
                }
            }
        }

        report.dedup_reset = self.tracker.maybe_reset();
        if report.dedup_reset {
            metrics::record_dedup_reset();
        }
        self.record_completed_tick(started);

        info!(
            completed = report.completed,
            failed = report.failed,
            errors = report.errors,
            duration_ms = started.elapsed().as_millis() as u64,
            "Tick complete"
        );

        report
    }

    fn record_completed_tick(&self, started: Instant) {
        metrics::set_dedup_size(self.tracker.len());
        metrics::record_tick("completed");
        metrics::record_tick_duration(started.elapsed());
    }

    /// Run ticks on the configured interval until `shutdown_rx` turns true
    /// (or its sender is dropped).
    ///
    /// Missed intervals are skipped rather than bursted. The signal is only
    /// observed between ticks.
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) -> Result<()> {
        if self.state() != EngineState::Created {
            return Err(ReplicationError::InvalidState {
                expected: "Created".to_string(),
                actual: self.state().to_string(),
            });
        }

        let interval = self
            .config
            .watch
            .interval_duration()
            .max(Duration::from_millis(1));
        info!(
            path = %self.config.watch.path.display(),
            remote = %self.transfer.transport().target(),
            interval_ms = interval.as_millis() as u64,
            "Starting file replicator"
        );
        self.set_state(EngineState::Running);

        let mut timer = tokio::time::interval(interval);
        timer.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        if !*shutdown_rx.borrow_and_update() {
            loop {
                tokio::select! {
                    biased;

                    result = shutdown_rx.changed() => {
                        if result.is_err() || *shutdown_rx.borrow() {
                            info!("Shutdown signal received");
                            break;
                        }
                    }

                    _ = timer.tick() => {
                        self.tick().await;
                    }
                }
            }
        }

        self.set_state(EngineState::ShuttingDown);
        // An overlapping tick started through tick() may still hold the lock.
        let _drain = self.tick_lock.lock().await;
        self.set_state(EngineState::Stopped);
        info!("File replicator stopped");
        Ok(())
    }
}
