//! Periodic reconciliation.
//!
//! Reports age without new messages arriving, so markers have to be degraded
//! and expired on a timer. The sweeper re-reads every known report from a
//! [`ReportSource`] and runs a full `sweep` over it on a fixed interval.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use async_trait::async_trait;
use tokio::{sync::Mutex, task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::{
    reconciler::{unix_now, MarkerReconciler, PassOutcome},
    report::LocationReport,
    Result,
};

/// Every report the chat client currently knows about.
#[async_trait]
pub trait ReportSource: Send + Sync {
    async fn reports(&self) -> Result<Vec<LocationReport>>;
}

#[derive(Clone)]
pub struct Sweeper {
    inner: Arc<SweeperInner>,
}

struct SweeperInner {
    reconciler: Arc<MarkerReconciler>,
    source: Arc<dyn ReportSource>,
    interval: Duration,
    passes: AtomicU64,
    state: Mutex<SweeperState>,
}

#[derive(Default)]
struct SweeperState {
    task: Option<JoinHandle<()>>,
    cancel: Option<CancellationToken>,
}

impl Sweeper {
    pub fn new(
        reconciler: Arc<MarkerReconciler>,
        source: Arc<dyn ReportSource>,
        interval: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(SweeperInner {
                reconciler,
                source,
                interval,
                passes: AtomicU64::new(0),
                state: Mutex::new(SweeperState::default()),
            }),
        }
    }

    /// Number of sweeps that reached the reconciler.
    pub fn passes(&self) -> u64 {
        self.inner.passes.load(Ordering::SeqCst)
    }

    pub async fn is_running(&self) -> bool {
        self.inner.state.lock().await.task.is_some()
    }

    /// One sweep over the current report set with the current visibility.
    pub async fn run_once(&self) -> Result<PassOutcome> {
        let reports = self.inner.source.reports().await?;
        let visible = self.inner.reconciler.settings().visible_chats();
        let outcome = self
            .inner
            .reconciler
            .sweep(&reports, &visible, unix_now())
            .await;
        self.inner.passes.fetch_add(1, Ordering::SeqCst);
        Ok(outcome)
    }

    /// Spawn the sweep loop. Returns false if it is already running.
    pub async fn start(&self) -> bool {
        let mut st = self.inner.state.lock().await;
        if st.task.is_some() {
            return false;
        }

        let tok = CancellationToken::new();
        st.cancel = Some(tok.clone());
        let sweeper = self.clone();
        let period = self.inner.interval;
        let handle = tokio::spawn(async move {
            let mut tick = tokio::time::interval(period);
            tick.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                  _ = tok.cancelled() => break,
                  _ = tick.tick() => {
                    match sweeper.run_once().await {
                      Ok(outcome) if !outcome.proceeded => {
                        debug!(event = "sweeper.pass.deferred", reason = "host unreachable");
                      }
                      Ok(_) => {}
                      Err(e) => {
                        warn!(event = "sweeper.source.failed", error = %e);
                      }
                    }
                  }
                }
            }
        });

        st.task = Some(handle);
        info!(
            event = "sweeper.started",
            interval_ms = period.as_millis() as u64
        );
        true
    }

    /// Cancel the loop and wait for the in-flight sweep to finish.
    pub async fn stop(&self) {
        let (cancel, task) = {
            let mut st = self.inner.state.lock().await;
            (st.cancel.take(), st.task.take())
        };
        if let Some(tok) = cancel {
            tok.cancel();
        }
        if let Some(task) = task {
            if let Err(e) = task.await {
                warn!(event = "sweeper.task.failed", error = %e);
            }
            info!(event = "sweeper.stopped", passes = self.passes());
        }
    }
}
