//! Buffered append-only event sink.
//!
//! `emit` never blocks the turn: records go into a bounded in-process
//! buffer and a single background flusher drains them to the events table
//! in batches. Under backpressure the oldest low-priority records
//! (cache_hit/cache_miss) are evicted first, and every drop is counted for
//! the health endpoint.

use crate::store::SqlStore;
use platform::record_counter;
use shared_types::{EventPriority, EventRecord, EventSinkHealth};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::warn;

const FLUSH_BATCH: usize = 64;
const FLUSH_INTERVAL_MS: u64 = 500;

struct SinkShared {
    buffer: Mutex<VecDeque<EventRecord>>,
    notify: Notify,
    capacity: usize,
    seq: AtomicU64,
    flushed: AtomicU64,
    dropped_low: AtomicU64,
    dropped_high: AtomicU64,
    flush_failures: AtomicU64,
    shutdown: AtomicBool,
}

#[derive(Clone)]
pub struct EventSink {
    shared: Arc<SinkShared>,
}

impl EventSink {
    /// Create the sink and its flusher task. The handle is awaited during
    /// worker teardown so buffered events reach the store.
    pub fn new(store: Arc<SqlStore>, capacity: usize) -> (Self, JoinHandle<()>) {
        let shared = Arc::new(SinkShared {
            buffer: Mutex::new(VecDeque::new()),
            notify: Notify::new(),
            capacity: capacity.max(16),
            seq: AtomicU64::new(0),
            flushed: AtomicU64::new(0),
            dropped_low: AtomicU64::new(0),
            dropped_high: AtomicU64::new(0),
            flush_failures: AtomicU64::new(0),
            shutdown: AtomicBool::new(false),
        });

        let sink = Self {
            shared: shared.clone(),
        };
        let handle = tokio::spawn(run_flusher(shared, store));
        (sink, handle)
    }

    /// Append an event. Non-blocking: on a full buffer an old low-priority
    /// record is evicted, or — if none exists — the oldest record overall.
    pub fn emit(&self, mut event: EventRecord) {
        event.seq = self.shared.seq.fetch_add(1, Ordering::Relaxed);

        {
            let mut buffer = self.shared.buffer.lock().expect("event buffer poisoned");
            if buffer.len() >= self.shared.capacity {
                if let Some(pos) = buffer
                    .iter()
                    .position(|e| e.kind.priority() == EventPriority::Low)
                {
                    buffer.remove(pos);
                    self.shared.dropped_low.fetch_add(1, Ordering::Relaxed);
                } else {
                    buffer.pop_front();
                    self.shared.dropped_high.fetch_add(1, Ordering::Relaxed);
                }
                record_counter("events_dropped_total", 1);
            }
            buffer.push_back(event);
        }

        self.shared.notify.notify_one();
    }

    pub fn health(&self) -> EventSinkHealth {
        EventSinkHealth {
            buffered: self.shared.buffer.lock().expect("event buffer poisoned").len() as u64,
            flushed: self.shared.flushed.load(Ordering::Relaxed),
            dropped_low: self.shared.dropped_low.load(Ordering::Relaxed),
            dropped_high: self.shared.dropped_high.load(Ordering::Relaxed),
            flush_failures: self.shared.flush_failures.load(Ordering::Relaxed),
        }
    }

    /// Signal the flusher to drain and exit. Await the handle returned from
    /// `new` afterwards.
    pub fn shutdown(&self) {
        self.shared.shutdown.store(true, Ordering::Relaxed);
        self.shared.notify.notify_one();
    }
}

async fn run_flusher(shared: Arc<SinkShared>, store: Arc<SqlStore>) {
    loop {
        let batch: Vec<EventRecord> = {
            let mut buffer = shared.buffer.lock().expect("event buffer poisoned");
            let take = buffer.len().min(FLUSH_BATCH);
            buffer.drain(..take).collect()
        };

        if batch.is_empty() {
            if shared.shutdown.load(Ordering::Relaxed) {
                break;
            }
            tokio::select! {
                _ = shared.notify.notified() => {}
                _ = tokio::time::sleep(std::time::Duration::from_millis(FLUSH_INTERVAL_MS)) => {}
            }
            continue;
        }

        let count = batch.len() as u64;
        match store.append_events(batch).await {
            Ok(()) => {
                shared.flushed.fetch_add(count, Ordering::Relaxed);
            }
            Err(e) => {
                // The batch is dropped rather than requeued: audit loss is
                // accounted for, and a dead store must not grow the buffer
                // without bound.
                shared.flush_failures.fetch_add(1, Ordering::Relaxed);
                shared.dropped_high.fetch_add(count, Ordering::Relaxed);
                warn!(error = %e, dropped = count, "event flush failed");
            }
        }
    }
}
