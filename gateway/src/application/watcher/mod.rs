//! Watcher lifecycle: the push path (ZMQ), the pull path (scheduler), and
//! the signal pump that joins them onto the reconciler.

pub mod address_book;
pub mod reconciler;
pub mod scheduler;
pub mod state_machine;
pub mod zmq_listener;

use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

use crate::application::watcher::address_book::AddressBook;
use crate::application::watcher::reconciler::Reconciler;
use crate::application::watcher::scheduler::Scheduler;
use crate::application::watcher::state_machine::IntentStateMachine;
use crate::application::watcher::zmq_listener::{WatchSignal, ZmqListener};
use crate::config::AppConfig;
use crate::domain::errors::PayResult;
use crate::domain::models::DeltaSource;
use crate::infrastructure::persistence::Repositories;
use crate::utils::logging;

/// How long stop() waits for in-flight work before aborting tasks.
const STOP_DEADLINE: Duration = Duration::from_secs(5);
/// How long the signal pump may spend draining queued notifications.
const DRAIN_DEADLINE: Duration = Duration::from_secs(3);

/// A running watcher; dropping it without `stop()` aborts nothing, so the
/// owner is expected to call `stop` on shutdown.
pub struct Watcher {
    shutdown: watch::Sender<bool>,
    tasks: Vec<JoinHandle<()>>,
}

impl Watcher {
    /// Bootstrap the watched-address set and start all watcher tasks.
    pub async fn start(
        config: &AppConfig,
        repos: Repositories,
        reconciler: Reconciler,
        state: IntentStateMachine,
        watched: AddressBook,
    ) -> PayResult<Self> {
        // watch only addresses whose intent is still open
        let open_ids: std::collections::HashSet<i64> = repos
            .intents
            .list_open()
            .await?
            .into_iter()
            .map(|intent| intent.id)
            .collect();
        let assigned = repos
            .addresses
            .list_assigned()
            .await?
            .into_iter()
            .filter(|(_, intent_id)| open_ids.contains(intent_id))
            .collect::<Vec<_>>();
        logging::log_info(&format!(
            "watcher starting with {} watched addresses",
            assigned.len()
        ));
        watched.replace_all(assigned);

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let mut tasks = Vec::new();

        if config.zmq.is_configured() {
            let (signal_tx, signal_rx) = mpsc::unbounded_channel();
            tasks.extend(ZmqListener::spawn(
                &config.zmq,
                signal_tx,
                shutdown_rx.clone(),
            ));
            tasks.push(tokio::spawn(pump_signals(
                signal_rx,
                reconciler.clone(),
                shutdown_rx.clone(),
            )));
        } else {
            logging::log_info("no ZMQ ports configured; running on polling only");
        }

        let poll_tag = if config.rpc.is_some() {
            DeltaSource::RpcPoll
        } else {
            DeltaSource::IndexerPoll
        };
        let scheduler = Scheduler::new(
            repos,
            reconciler,
            state,
            config.poll_interval(),
            poll_tag,
        );
        tasks.extend(scheduler.spawn(shutdown_rx));

        Ok(Self {
            shutdown: shutdown_tx,
            tasks,
        })
    }

    /// Signal all tasks, wait briefly for in-flight work, abort stragglers.
    pub async fn stop(self, watched: &AddressBook) {
        let _ = self.shutdown.send(true);
        for mut task in self.tasks {
            if tokio::time::timeout(STOP_DEADLINE, &mut task).await.is_err() {
                task.abort();
            }
        }
        watched.clear();
        logging::log_info("watcher stopped");
    }
}

/// Consume notification signals in arrival order. On shutdown the queue
/// is drained with a deadline so already-received pushes are not lost.
async fn pump_signals(
    mut receiver: mpsc::UnboundedReceiver<WatchSignal>,
    reconciler: Reconciler,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        tokio::select! {
            _ = shutdown.changed() => break,
            maybe = receiver.recv() => match maybe {
                Some(signal) => handle_signal(signal, &reconciler).await,
                None => return,
            }
        }
    }

    let deadline = tokio::time::Instant::now() + DRAIN_DEADLINE;
    let mut dropped = 0usize;
    while let Ok(signal) = receiver.try_recv() {
        if tokio::time::Instant::now() >= deadline {
            dropped += 1;
            continue;
        }
        handle_signal(signal, &reconciler).await;
    }
    if dropped > 0 {
        logging::log_warning(&format!(
            "dropped {} queued notifications at shutdown; next poll re-derives them",
            dropped
        ));
    }
}

async fn handle_signal(signal: WatchSignal, reconciler: &Reconciler) {
    match signal {
        WatchSignal::Tx(txid) => {
            if let Err(e) = reconciler.process_txid(&txid, DeltaSource::Zmq).await {
                logging::log_warning(&format!("push reconcile of {} failed: {}", txid, e));
            }
        }
        WatchSignal::Block(hash) => {
            logging::log_debug(&format!("new block {}", hash));
            if let Err(e) = reconciler.refresh_tracked(DeltaSource::Zmq).await {
                logging::log_warning(&format!("block-driven refresh failed: {}", e));
            }
        }
    }
}
