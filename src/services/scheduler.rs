//! Periodic billing sweeps.
//!
//! A single [`BillingScheduler`] is built at startup and shared with the HTTP
//! layer, which uses it for manual runs. At most one sweep runs at a time;
//! a tick or trigger that lands on a running sweep is skipped.

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::error::AppResult;
use crate::models::SweepSummary;

#[async_trait]
pub trait SweepJob: Send + Sync {
    async fn run(&self, today: NaiveDate) -> AppResult<SweepSummary>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum TickOutcome {
    Completed(SweepSummary),
    /// Another sweep was still in flight.
    Skipped,
    Failed { error: String },
}

/// Clears the in-flight flag even if the sweep panics.
struct InFlight<'a>(&'a AtomicBool);

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

pub struct BillingScheduler {
    job: Arc<dyn SweepJob>,
    period: Duration,
    running: AtomicBool,
    stop_tx: watch::Sender<bool>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl BillingScheduler {
    pub fn new(job: Arc<dyn SweepJob>, period: Duration) -> Self {
        let (stop_tx, _) = watch::channel(false);
        Self {
            job,
            period,
            running: AtomicBool::new(false),
            stop_tx,
            handle: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Spawns the periodic loop. The first tick fires immediately.
    /// Calling this on a started scheduler does nothing.
    pub fn start(self: &Arc<Self>) {
        let mut handle = self.handle.lock().unwrap_or_else(|e| e.into_inner());
        if handle.is_some() {
            tracing::warn!("Billing scheduler already started");
            return;
        }

        self.stop_tx.send_replace(false);
        let mut stop_rx = self.stop_tx.subscribe();
        let scheduler = Arc::clone(self);

        *handle = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(scheduler.period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            tracing::info!(
                "Billing scheduler started, sweeping every {}s",
                scheduler.period.as_secs()
            );

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        scheduler.run_once(Utc::now().date_naive()).await;
                    }
                    changed = stop_rx.changed() => {
                        if changed.is_err() || *stop_rx.borrow() {
                            break;
                        }
                    }
                }
            }

            tracing::info!("Billing scheduler stopped");
        }));
    }

    /// Signals the loop to exit and waits for it. A sweep already running
    /// finishes first.
    pub async fn stop(&self) {
        let handle = self
            .handle
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .take();
        let Some(handle) = handle else {
            return;
        };

        self.stop_tx.send_replace(true);
        if let Err(e) = handle.await {
            tracing::error!("Billing scheduler task failed: {}", e);
        }
    }

    /// Runs one sweep for `today` unless another is in flight.
    pub async fn run_once(&self, today: NaiveDate) -> TickOutcome {
        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::info!("Billing sweep for {} skipped, previous run still in progress", today);
            return TickOutcome::Skipped;
        }
        let _in_flight = InFlight(&self.running);

        match self.job.run(today).await {
            Ok(summary) => TickOutcome::Completed(summary),
            Err(e) => {
                tracing::error!("Billing sweep for {} failed: {}", today, e);
                TickOutcome::Failed {
                    error: e.to_string(),
                }
            }
        }
    }

    pub async fn trigger(&self) -> TickOutcome {
        self.run_once(Utc::now().date_naive()).await
    }
}
