//! Fixed pool of workers sharing one update queue.

use std::sync::Arc;
use tokio::sync::{Mutex, mpsc};
use tokio::task::JoinHandle;

use super::dispatcher::Dispatcher;
use super::errors::DispatchError;
use super::update::Update;
use crate::db::GameStore;

/// Default number of workers
pub const DEFAULT_NUM_WORKERS: usize = 3;

/// Capacity of the update queue
pub const QUEUE_CAPACITY: usize = 256;

/// Create the update queue
pub fn update_queue() -> (mpsc::Sender<Update>, mpsc::Receiver<Update>) {
    mpsc::channel(QUEUE_CAPACITY)
}

/// Handles of the running workers
pub struct WorkerPool {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Start `num_workers` workers draining `receiver`
    ///
    /// Workers exit once every sender is dropped and the queue is empty.
    pub fn spawn<S: GameStore>(
        dispatcher: Arc<Dispatcher<S>>,
        receiver: mpsc::Receiver<Update>,
        num_workers: usize,
    ) -> Self {
        let queue = Arc::new(Mutex::new(receiver));
        let handles = (0..num_workers.max(1))
            .map(|id| tokio::spawn(run_worker(id, Arc::clone(&dispatcher), Arc::clone(&queue))))
            .collect();

        Self { handles }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Wait for every worker to finish
    pub async fn join(self) {
        for handle in self.handles {
            if let Err(e) = handle.await {
                log::error!("Worker task failed: {e}");
            }
        }
    }
}

async fn run_worker<S: GameStore>(
    id: usize,
    dispatcher: Arc<Dispatcher<S>>,
    queue: Arc<Mutex<mpsc::Receiver<Update>>>,
) {
    log::info!("Worker {id} started");

    loop {
        // Release the queue before processing so other workers can pick up updates.
        let next = queue.lock().await.recv().await;
        let Some(update) = next else {
            break;
        };

        let update_id = update.update_id;
        let chat_id = update.chat_id;
        if let Err(e) = dispatcher.dispatch(update).await {
            metrics::counter!("blackjack_dispatch_errors_total", "kind" => e.kind()).increment(1);
            match &e {
                DispatchError::RouteNotFound(_) => {
                    log::debug!("Worker {id}: update {update_id} dropped: {e}")
                }
                _ if e.is_not_found() => {
                    log::warn!("Worker {id}: update {update_id} for chat {chat_id}: {e}")
                }
                _ => log::error!("Worker {id}: update {update_id} for chat {chat_id}: {e}"),
            }
        }
    }

    log::info!("Worker {id} stopped");
}
