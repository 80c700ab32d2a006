//! # In-flight Request Table
//!
//! Correlates responses with outstanding requests on one connection.
//!
//! ## Invariants
//! - **Bounded**: Every entry owns a semaphore permit, so `len() <= capacity()` always.
//! - **Released Once**: The permit lives in the entry. Whichever path removes the entry
//!   (response, reaper, connection failure, close) drops it exactly once.
//! - **Single Winner**: Removal goes through one `DashMap::remove`. When the reader and the
//!   reaper race on an id, exactly one of them completes the waiter.
//! - **Reaped Promptly**: The reaper ticks every `request_timeout`, so an entry inserted at
//!   `t0` is gone by `t0 + 2 * request_timeout`.

use std::sync::Arc;
use std::sync::Weak;
use std::sync::atomic::AtomicBool;
use std::sync::atomic::Ordering;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use microrpc::Command;
use tokio::sync::OwnedSemaphorePermit;
use tokio::sync::Semaphore;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::config::InflightConfig;
use crate::transport;
use crate::transport::Error;

pub type Waiter = oneshot::Receiver<transport::Result<Command>>;

/// An outstanding request's completion handle.
pub struct Pending {
    tx: oneshot::Sender<transport::Result<Command>>,
    started: Instant,
    _permit: OwnedSemaphorePermit,
}

impl Pending {
    /// Completes the waiter and releases the slot. A dropped waiter is ignored.
    pub fn complete(self, result: transport::Result<Command>) {
        let _ = self.tx.send(result);
    }

    pub fn started(&self) -> Instant {
        self.started
    }
}

pub struct InflightTable {
    entries: DashMap<i32, Pending>,
    permits: Arc<Semaphore>,
    config: InflightConfig,
    closed: AtomicBool,
    shutdown: CancellationToken,
}

impl InflightTable {
    /// Creates a table and spawns its reaper. Must be called inside a tokio runtime.
    pub fn new(config: InflightConfig) -> Arc<Self> {
        let table = Arc::new(Self {
            entries: DashMap::new(),
            permits: Arc::new(Semaphore::new(config.capacity)),
            config,
            closed: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
        });

        tokio::spawn(Self::reaper(Arc::downgrade(&table), table.shutdown.clone(), table.config.request_timeout));
        table
    }

    async fn reaper(table: Weak<Self>, shutdown: CancellationToken, period: std::time::Duration) {
        let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            let Some(table) = table.upgrade() else {
                break;
            };
            table.reap();
        }
    }

    /// Registers `request_id`, waiting up to the submit timeout for a free slot.
    pub async fn put(&self, request_id: i32) -> transport::Result<Waiter> {
        if self.is_closed() {
            return Err(Error::ClientClosed);
        }

        let acquire = self.permits.clone().acquire_owned();
        let permit = match tokio::time::timeout(self.config.submit_timeout, acquire).await {
            Ok(Ok(permit)) => permit,
            Ok(Err(_)) => return Err(Error::ClientClosed),
            Err(_) => {
                tracing::warn!(request_id, capacity = self.capacity(), "no in-flight slot freed in time");
                return Err(Error::SubmitTimeout);
            }
        };

        let (tx, rx) = oneshot::channel();
        match self.entries.entry(request_id) {
            Entry::Occupied(_) => return Err(Error::DuplicateRequestId(request_id)),
            Entry::Vacant(slot) => {
                slot.insert(Pending {
                    tx,
                    started: Instant::now(),
                    _permit: permit,
                });
            }
        }

        // close() may have drained between the check above and the insert
        if self.is_closed() {
            if let Some(pending) = self.take(request_id) {
                pending.complete(Err(Error::ClientClosed));
            }
        }

        Ok(rx)
    }

    /// Removes the entry for `request_id`, releasing its slot.
    pub fn take(&self, request_id: i32) -> Option<Pending> {
        self.entries.remove(&request_id).map(|(_, pending)| pending)
    }

    /// Removes every entry, completing each waiter with `error`.
    pub fn fail_all(&self, error: Error) {
        let ids: Vec<i32> = self.entries.iter().map(|e| *e.key()).collect();
        for id in ids {
            if let Some(pending) = self.take(id) {
                pending.complete(Err(error.clone()));
            }
        }
    }

    /// Removes entries older than the request timeout. Returns how many were reaped.
    pub fn reap(&self) -> usize {
        let timeout = self.config.request_timeout;
        let expired: Vec<i32> = self
            .entries
            .iter()
            .filter(|e| e.started.elapsed() >= timeout)
            .map(|e| *e.key())
            .collect();

        let mut reaped = 0;
        for id in expired {
            if let Some((_, pending)) = self.entries.remove_if(&id, |_, p| p.started.elapsed() >= timeout) {
                tracing::warn!(request_id = id, "reaping request that outlived its timeout");
                pending.complete(Err(Error::InflightTimeout));
                reaped += 1;
            }
        }
        reaped
    }

    /// Stops the reaper, refuses new entries, and fails the rest with `ClientClosed`.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.permits.close();
        self.shutdown.cancel();
        self.fail_all(Error::ClientClosed);
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }
}

impl Drop for InflightTable {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
