//! Write-once result store

use crate::task::{TaskId, TaskRecord, TaskState};
use crate::{Result, TaskError};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// Keyed storage for task records.
///
/// A record moves from pending to a terminal state exactly once; later
/// attempts to finish it are rejected.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Record a newly submitted task
    async fn insert(&self, record: TaskRecord) -> Result<()>;

    /// Move a pending task to its terminal state
    async fn finish(&self, id: &TaskId, state: TaskState) -> Result<()>;

    /// Current record for `id`
    async fn get(&self, id: &TaskId) -> Option<TaskRecord>;

    /// Drop terminal records finished more than `ttl` ago; returns how many went
    async fn evict_expired(&self, ttl: Duration) -> usize;

    /// Number of records held
    async fn len(&self) -> usize;
}

/// Result store statistics
#[derive(Debug, Default)]
pub struct ResultStoreStats {
    pub inserted: AtomicU64,
    pub completed: AtomicU64,
    pub failed: AtomicU64,
    pub rejected_writes: AtomicU64,
    pub evicted: AtomicU64,
}

/// In-process result store
#[derive(Debug, Clone, Default)]
pub struct InMemoryResultStore {
    records: Arc<DashMap<TaskId, TaskRecord>>,
    stats: Arc<ResultStoreStats>,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats(&self) -> &ResultStoreStats {
        &self.stats
    }
}

#[async_trait]
impl ResultStore for InMemoryResultStore {
    async fn insert(&self, record: TaskRecord) -> Result<()> {
        match self.records.entry(record.id) {
            Entry::Occupied(_) => {
                self.stats.rejected_writes.fetch_add(1, Ordering::Relaxed);
                Err(TaskError::InvalidRequest(format!("duplicate task id {}", record.id)))
            }
            Entry::Vacant(slot) => {
                slot.insert(record);
                self.stats.inserted.fetch_add(1, Ordering::Relaxed);
                Ok(())
            }
        }
    }

    async fn finish(&self, id: &TaskId, state: TaskState) -> Result<()> {
        let mut record = self
            .records
            .get_mut(id)
            .ok_or_else(|| TaskError::NotFound(id.to_string()))?;

        if record.state.is_terminal() {
            self.stats.rejected_writes.fetch_add(1, Ordering::Relaxed);
            return Err(TaskError::AlreadyTerminal(*id));
        }

        match &state {
            TaskState::Completed { .. } => self.stats.completed.fetch_add(1, Ordering::Relaxed),
            TaskState::Failed { .. } => self.stats.failed.fetch_add(1, Ordering::Relaxed),
            TaskState::Pending => {
                return Err(TaskError::InvalidRequest(format!(
                    "task {} cannot be finished as pending",
                    id
                )))
            }
        };

        debug!("Task {} finished as {}", id, state.status());
        record.state = state;
        record.finished_at = Some(Utc::now());
        Ok(())
    }

    async fn get(&self, id: &TaskId) -> Option<TaskRecord> {
        self.records.get(id).map(|r| r.clone())
    }

    async fn evict_expired(&self, ttl: Duration) -> usize {
        let now = Utc::now();
        let mut evicted = 0;

        self.records.retain(|_, record| {
            let expired = record.finished_at.is_some_and(|finished| {
                now.signed_duration_since(finished)
                    .to_std()
                    .is_ok_and(|age| age > ttl)
            });
            if expired {
                evicted += 1;
            }
            !expired
        });

        if evicted > 0 {
            self.stats.evicted.fetch_add(evicted as u64, Ordering::Relaxed);
            info!("Evicted {} expired task results", evicted);
        }
        evicted
    }

    async fn len(&self) -> usize {
        self.records.len()
    }
}
