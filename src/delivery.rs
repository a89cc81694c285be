//! Delivery Queue: a bounded FIFO of chat sends drained by
//! a single worker task, paced by two independent token buckets (global
//! and per-recipient) and retried with backoff on transient failures.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::store::StoreGateway;
use crate::upstream::{SendOutcome, UpstreamClient};

/// Minimum interval between any two outgoing sends, ≈30 msg/s.
const GLOBAL_PACING: Duration = Duration::from_millis(34);
/// Minimum interval between two sends to the same recipient.
const PER_CHAT_PACING: Duration = Duration::from_secs(1);
/// Transient-failure retries before an item is dropped.
const MAX_TRANSIENT_ATTEMPTS: u32 = 3;
/// How long the worker keeps draining after a shutdown is requested.
const SHUTDOWN_GRACE_PERIOD: Duration = Duration::from_secs(5);
/// How long to sleep when the queue is non-empty but nothing is ready yet,
/// to avoid busy-spinning while re-scanning for a ready item.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(20);

struct QueueItem {
    chat_id: String,
    text: String,
    attempts: u32,
    earliest_send_at: Instant,
}

/// Handle held by the orchestrator to enqueue outgoing messages.
/// Enqueueing never blocks: a full queue drops the newest item and logs.
#[derive(Clone)]
pub struct DeliveryHandle {
    sender: mpsc::Sender<QueueItem>,
}

impl DeliveryHandle {
    pub fn enqueue(&self, chat_id: String, text: String) {
        let item = QueueItem {
            chat_id: chat_id.clone(),
            text,
            attempts: 0,
            earliest_send_at: Instant::now(),
        };
        if let Err(e) = self.sender.try_send(item) {
            warn!(chat_id, error = %e, "delivery queue full, dropping alert");
        }
    }
}

/// Join handle plus a shutdown trigger for the delivery worker task.
pub struct DeliveryWorker {
    handle: JoinHandle<()>,
    shutdown: mpsc::Sender<()>,
}

impl DeliveryWorker {
    /// Stop accepting new items (the [`DeliveryHandle`] should already be
    /// dropped by callers), drain for a bounded grace period, then return.
    /// Anything still queued at the end of the grace period is lost by
    /// design — the Deduper has already marked those trades seen, so they
    /// will not be retried on the next run.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(()).await;
        match tokio::time::timeout(SHUTDOWN_GRACE_PERIOD, self.handle).await {
            Ok(_) => info!("delivery worker drained and stopped"),
            Err(_) => warn!("delivery worker did not drain within the grace period"),
        }
    }
}

/// Spawn the delivery worker task and return the handle the orchestrator
/// enqueues through, plus the worker handle used to shut it down.
pub fn spawn<U, S>(upstream: Arc<U>, store: Arc<S>, capacity: usize) -> (DeliveryHandle, DeliveryWorker)
where
    U: UpstreamClient + 'static,
    S: StoreGateway + 'static,
{
    let (sender, receiver) = mpsc::channel(capacity);
    let (shutdown_tx, shutdown_rx) = mpsc::channel(1);
    let handle = tokio::spawn(run(upstream, store, receiver, shutdown_rx));
    (
        DeliveryHandle { sender },
        DeliveryWorker {
            handle,
            shutdown: shutdown_tx,
        },
    )
}

async fn run<U, S>(
    upstream: Arc<U>,
    store: Arc<S>,
    mut receiver: mpsc::Receiver<QueueItem>,
    mut shutdown: mpsc::Receiver<()>,
) where
    U: UpstreamClient,
    S: StoreGateway,
{
    let mut queue: VecDeque<QueueItem> = VecDeque::new();
    let mut last_global_send: Option<Instant> = None;
    let mut last_chat_send: HashMap<String, Instant> = HashMap::new();
    let mut shutting_down = false;

    loop {
        while let Ok(item) = receiver.try_recv() {
            queue.push_back(item);
        }

        let Some(mut item) = queue.pop_front() else {
            if shutting_down {
                break;
            }
            tokio::select! {
                maybe = receiver.recv() => match maybe {
                    Some(item) => queue.push_back(item),
                    None => shutting_down = true,
                },
                _ = shutdown.recv() => shutting_down = true,
            }
            continue;
        };

        if Instant::now() < item.earliest_send_at {
            queue.push_back(item);
            tokio::time::sleep(IDLE_POLL_INTERVAL).await;
            continue;
        }

        if let Some(last) = last_global_send {
            let wait = GLOBAL_PACING.saturating_sub(last.elapsed());
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
        }
        if let Some(last) = last_chat_send.get(&item.chat_id) {
            let wait = PER_CHAT_PACING.saturating_sub(last.elapsed());
            if !wait.is_zero() {
                tokio::time::sleep(wait).await;
            }
        }

        let outcome = upstream.send_chat_message(&item.chat_id, &item.text).await;
        let now = Instant::now();
        last_global_send = Some(now);
        last_chat_send.insert(item.chat_id.clone(), now);

        match outcome {
            Ok(SendOutcome::Delivered) => {
                debug!(chat_id = %item.chat_id, "alert delivered");
            }
            Ok(SendOutcome::RateLimited { retry_after_seconds }) => {
                item.earliest_send_at = now + Duration::from_secs(retry_after_seconds + 1);
                queue.push_back(item);
            }
            Ok(SendOutcome::PermanentReject(reason)) => {
                warn!(chat_id = %item.chat_id, ?reason, "recipient permanently rejected, deactivating");
                if let Err(e) = store.deactivate_chat(&item.chat_id).await {
                    error!(chat_id = %item.chat_id, error = %e, "failed to deactivate chat after permanent reject");
                }
            }
            Ok(SendOutcome::TransientError) | Err(_) => {
                item.attempts += 1;
                if item.attempts < MAX_TRANSIENT_ATTEMPTS {
                    item.earliest_send_at = now + Duration::from_secs(5 * item.attempts as u64);
                    queue.push_back(item);
                } else {
                    error!(chat_id = %item.chat_id, "dropping alert after exhausting transient retries");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;

    use crate::domain::{MarketMetadata, Trade};
    use crate::store::MemoryStore;
    use crate::taxonomy::TaxonomySnapshot;
    use crate::upstream::RejectReason;

    #[derive(Default)]
    struct RecordingUpstream {
        sends: parking_lot::Mutex<Vec<(String, Instant)>>,
        outcomes: parking_lot::Mutex<VecDeque<SendOutcome>>,
    }

    impl RecordingUpstream {
        fn with_outcomes(outcomes: Vec<SendOutcome>) -> Self {
            Self {
                sends: parking_lot::Mutex::new(Vec::new()),
                outcomes: parking_lot::Mutex::new(outcomes.into()),
            }
        }
    }

    #[async_trait]
    impl UpstreamClient for RecordingUpstream {
        async fn fetch_recent_trades(&self, _limit: u32, _min_notional_usd: f64) -> crate::error::Result<Vec<Trade>> {
            Ok(Vec::new())
        }
        async fn fetch_markets_batch(&self, _ids: &[String]) -> crate::error::Result<HashMap<String, MarketMetadata>> {
            Ok(HashMap::new())
        }
        async fn load_taxonomy(&self) -> crate::error::Result<TaxonomySnapshot> {
            Ok(TaxonomySnapshot::default())
        }
        async fn send_chat_message(&self, chat_id: &str, _text: &str) -> crate::error::Result<SendOutcome> {
            self.sends.lock().push((chat_id.to_string(), Instant::now()));
            let mut outcomes = self.outcomes.lock();
            Ok(outcomes.pop_front().unwrap_or(SendOutcome::Delivered))
        }
    }

    #[tokio::test]
    async fn per_chat_pacing_spaces_sends_at_least_one_second_apart() {
        let upstream = Arc::new(RecordingUpstream::with_outcomes(vec![
            SendOutcome::Delivered,
            SendOutcome::Delivered,
        ]));
        let store = Arc::new(MemoryStore::new());
        let (handle, worker) = spawn(upstream.clone(), store, 16);

        handle.enqueue("chat-1".into(), "first".into());
        handle.enqueue("chat-1".into(), "second".into());

        tokio::time::sleep(Duration::from_millis(1100)).await;
        drop(handle);
        worker.shutdown().await;

        let sends = upstream.sends.lock().clone();
        assert_eq!(sends.len(), 2);
        assert!(sends[1].1.duration_since(sends[0].1) >= PER_CHAT_PACING);
    }

    #[tokio::test]
    async fn permanent_reject_deactivates_and_drops_without_retry() {
        let upstream = Arc::new(RecordingUpstream::with_outcomes(vec![SendOutcome::PermanentReject(
            RejectReason::InvalidRecipient,
        )]));
        let store = Arc::new(MemoryStore::new());
        let (handle, worker) = spawn(upstream.clone(), store.clone(), 16);

        handle.enqueue("chat-1".into(), "hi".into());

        tokio::time::sleep(Duration::from_millis(50)).await;
        drop(handle);
        worker.shutdown().await;

        assert_eq!(store.deactivated_chats(), vec!["chat-1".to_string()]);
        assert_eq!(upstream.sends.lock().len(), 1);
    }

    #[tokio::test]
    async fn transient_errors_are_dropped_after_max_attempts() {
        let upstream = Arc::new(RecordingUpstream::with_outcomes(vec![
            SendOutcome::TransientError,
            SendOutcome::TransientError,
            SendOutcome::TransientError,
        ]));
        let store = Arc::new(MemoryStore::new());
        let (handle, worker) = spawn(upstream.clone(), store, 16);

        handle.enqueue("chat-1".into(), "hi".into());

        // 5s + 10s backoff between the three attempts, plus slack.
        tokio::time::sleep(Duration::from_secs(16)).await;
        drop(handle);
        worker.shutdown().await;

        assert_eq!(upstream.sends.lock().len(), MAX_TRANSIENT_ATTEMPTS as usize);
    }
}
