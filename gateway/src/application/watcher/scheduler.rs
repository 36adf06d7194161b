//! Periodic pull path: the pending-payment poll (fan-out, cron-resolved
//! interval) and the expiry sweep. Both tasks are re-entrancy safe: a
//! tick that begins while the previous one is still running is skipped,
//! never queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;

use crate::application::watcher::reconciler::Reconciler;
use crate::application::watcher::state_machine::IntentStateMachine;
use crate::domain::models::DeltaSource;
use crate::infrastructure::persistence::Repositories;
use crate::utils::logging;

const EXPIRY_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

pub struct Scheduler {
    repos: Repositories,
    reconciler: Reconciler,
    state: IntentStateMachine,
    poll_interval: Duration,
    poll_tag: DeltaSource,
}

impl Scheduler {
    pub fn new(
        repos: Repositories,
        reconciler: Reconciler,
        state: IntentStateMachine,
        poll_interval: Duration,
        poll_tag: DeltaSource,
    ) -> Self {
        Self {
            repos,
            reconciler,
            state,
            poll_interval,
            poll_tag,
        }
    }

    pub fn spawn(self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        logging::log_info(&format!(
            "scheduler started: pending poll every {:?}, expiry sweep every {:?}",
            self.poll_interval, EXPIRY_SWEEP_INTERVAL
        ));
        vec![
            tokio::spawn(pending_poll_loop(
                self.repos.clone(),
                self.reconciler,
                self.poll_interval,
                self.poll_tag,
                shutdown.clone(),
            )),
            tokio::spawn(expiry_sweep_loop(self.repos, self.state, shutdown)),
        ]
    }
}

async fn pending_poll_loop(
    repos: Repositories,
    reconciler: Reconciler,
    interval: Duration,
    tag: DeltaSource,
    mut shutdown: watch::Receiver<bool>,
) {
    let in_flight = Arc::new(AtomicBool::new(false));
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                if in_flight
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    logging::log_debug("pending poll still in flight, skipping tick");
                    continue;
                }
                let in_flight = in_flight.clone();
                let repos = repos.clone();
                let reconciler = reconciler.clone();
                tokio::spawn(async move {
                    run_pending_poll(&repos, &reconciler, tag).await;
                    in_flight.store(false, Ordering::SeqCst);
                });
            }
        }
    }
}

/// One poll: every open intent becomes its own work unit.
pub(crate) async fn run_pending_poll(
    repos: &Repositories,
    reconciler: &Reconciler,
    tag: DeltaSource,
) {
    let intents = match repos.intents.list_open().await {
        Ok(intents) => intents,
        Err(e) => {
            logging::log_warning(&format!("pending poll could not list intents: {}", e));
            return;
        }
    };
    if intents.is_empty() {
        return;
    }

    logging::log_debug(&format!("pending poll: {} open intents", intents.len()));

    let mut work = JoinSet::new();
    for intent in intents {
        let reconciler = reconciler.clone();
        work.spawn(async move {
            if let Err(e) = reconciler.scan_intent(&intent, false, tag).await {
                logging::log_warning(&format!("poll of intent {} failed: {}", intent.id, e));
            }
        });
    }
    while work.join_next().await.is_some() {}
}

async fn expiry_sweep_loop(
    repos: Repositories,
    state: IntentStateMachine,
    mut shutdown: watch::Receiver<bool>,
) {
    let in_flight = Arc::new(AtomicBool::new(false));
    let mut ticker = tokio::time::interval(EXPIRY_SWEEP_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            _ = ticker.tick() => {
                if in_flight
                    .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    logging::log_debug("expiry sweep still in flight, skipping tick");
                    continue;
                }
                let in_flight = in_flight.clone();
                let repos = repos.clone();
                let state = state.clone();
                tokio::spawn(async move {
                    run_expiry_sweep(&repos, &state).await;
                    in_flight.store(false, Ordering::SeqCst);
                });
            }
        }
    }
}

pub(crate) async fn run_expiry_sweep(repos: &Repositories, state: &IntentStateMachine) {
    let expirable = match repos.intents.list_expirable(Utc::now()).await {
        Ok(intents) => intents,
        Err(e) => {
            logging::log_warning(&format!("expiry sweep could not list intents: {}", e));
            return;
        }
    };

    for intent in expirable {
        if let Err(e) = state.apply_expiry(&intent).await {
            logging::log_warning(&format!("expiry of intent {} failed: {}", intent.id, e));
        }
    }
}
