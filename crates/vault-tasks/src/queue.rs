//! Inference queue and worker pool

use crate::store::ResultStore;
use crate::task::{TaskId, TaskRecord, TaskState};
use crate::{Result, TaskError};

use dashmap::DashSet;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout_at, Instant};
use tracing::{debug, error, info, warn};
use vault_adapter_npu::ModelRegistry;
use vault_core::QueueConfig;

/// Work item handed to the workers
#[derive(Debug)]
struct Job {
    id: TaskId,
    model_name: String,
    input: serde_json::Value,
}

/// Queue statistics
#[derive(Debug, Default)]
pub struct QueueStats {
    pub submitted: AtomicU64,
    pub completed: AtomicU64,
    pub failed: AtomicU64,
    pub sweeps: AtomicU64,
    pub cancelled: AtomicU64,
}

/// Failure recorded for tasks the queue gave up on while stopping
pub const CANCELLED_AT_SHUTDOWN: &str = "cancelled at shutdown";

/// Accepts inference requests and runs them on long-lived workers.
///
/// Submission never waits for a worker, a model load or an inference; it only
/// records the pending task and pushes it onto an unbounded channel.
pub struct InferenceQueue {
    config: QueueConfig,
    registry: Arc<ModelRegistry>,
    store: Arc<dyn ResultStore>,
    job_tx: mpsc::UnboundedSender<Job>,
    job_rx: Arc<Mutex<mpsc::UnboundedReceiver<Job>>>,
    running: Arc<AtomicBool>,
    shutdown: Arc<watch::Sender<bool>>,
    in_flight: Arc<DashSet<TaskId>>,
    task_handles: Arc<RwLock<Vec<JoinHandle<()>>>>,
    stats: Arc<QueueStats>,
}

impl InferenceQueue {
    pub fn new(config: QueueConfig, registry: Arc<ModelRegistry>, store: Arc<dyn ResultStore>) -> Self {
        let (job_tx, job_rx) = mpsc::unbounded_channel();
        Self {
            config,
            registry,
            store,
            job_tx,
            job_rx: Arc::new(Mutex::new(job_rx)),
            running: Arc::new(AtomicBool::new(false)),
            shutdown: Arc::new(watch::channel(false).0),
            in_flight: Arc::new(DashSet::new()),
            task_handles: Arc::new(RwLock::new(Vec::new())),
            stats: Arc::new(QueueStats::default()),
        }
    }

    pub fn stats(&self) -> &QueueStats {
        &self.stats
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    /// Start the workers and, when a retention TTL is configured, the sweeper
    pub async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::Relaxed) {
            return Err(TaskError::AlreadyRunning);
        }

        info!("Starting inference queue with {} workers", self.config.workers);
        self.shutdown.send_replace(false);
        let mut handles = self.task_handles.write().await;

        for worker_id in 0..self.config.workers {
            let queue = self.clone();
            handles.push(tokio::spawn(async move {
                queue.run_worker(worker_id).await;
            }));
        }

        if let Some(ttl) = self.config.result_ttl() {
            let queue = self.clone();
            handles.push(tokio::spawn(async move {
                queue.run_sweeper(ttl).await;
            }));
        }

        Ok(())
    }

    /// Stop the workers once their current job is done.
    ///
    /// Workers still busy when the shutdown grace runs out are aborted. Their
    /// tasks, and every task still waiting in the queue, are failed with
    /// [`CANCELLED_AT_SHUTDOWN`] so no record is left pending.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::Relaxed) {
            return;
        }

        info!("Stopping inference queue");
        self.shutdown.send_replace(true);

        let deadline = Instant::now() + self.config.shutdown_grace();
        let mut handles = self.task_handles.write().await;
        for mut handle in handles.drain(..) {
            if timeout_at(deadline, &mut handle).await.is_err() {
                handle.abort();
                let _ = handle.await;
            }
        }
        drop(handles);

        let interrupted: Vec<TaskId> = self.in_flight.iter().map(|id| *id).collect();
        for id in interrupted {
            self.in_flight.remove(&id);
            warn!("Task {} interrupted by shutdown", id);
            self.cancel(&id).await;
        }

        let mut job_rx = self.job_rx.lock().await;
        while let Ok(job) = job_rx.try_recv() {
            self.cancel(&job.id).await;
        }
    }

    async fn cancel(&self, id: &TaskId) {
        let state = TaskState::Failed {
            error: CANCELLED_AT_SHUTDOWN.to_string(),
        };
        match self.store.finish(id, state).await {
            Ok(()) => {
                self.stats.cancelled.fetch_add(1, Ordering::Relaxed);
            }
            Err(TaskError::AlreadyTerminal(_)) => {}
            Err(e) => error!("Failed to cancel task {}: {}", id, e),
        }
    }

    /// Enqueue inference of `model_name` over `input` and return the task id
    pub async fn submit(&self, model_name: impl Into<String>, input: serde_json::Value) -> Result<TaskId> {
        let model_name = model_name.into();
        if model_name.is_empty() {
            return Err(TaskError::InvalidRequest("model_name is required".to_string()));
        }

        let record = TaskRecord::pending(model_name.clone(), input.clone());
        let id = record.id;
        self.store.insert(record).await?;

        if self.job_tx.send(Job { id, model_name, input }).is_err() {
            let _ = self
                .store
                .finish(&id, TaskState::Failed {
                    error: TaskError::QueueClosed.to_string(),
                })
                .await;
            return Err(TaskError::QueueClosed);
        }

        self.stats.submitted.fetch_add(1, Ordering::Relaxed);
        debug!("Submitted task {}", id);
        Ok(id)
    }

    /// Current record for `id`. Repeated polls of a finished task return the same outcome.
    pub async fn poll(&self, id: &TaskId) -> Result<TaskRecord> {
        self.store
            .get(id)
            .await
            .ok_or_else(|| TaskError::NotFound(id.to_string()))
    }

    async fn run_worker(&self, worker_id: usize) {
        debug!("Inference worker {} started", worker_id);
        let mut shutdown = self.shutdown.subscribe();

        while self.running.load(Ordering::Relaxed) {
            // Hold the receiver only while waiting, so other workers can pick
            // up the next job while this one runs.
            let job = {
                let mut job_rx = self.job_rx.lock().await;
                tokio::select! {
                    biased;
                    _ = shutdown.changed() => None,
                    job = job_rx.recv() => job,
                }
            };

            match job {
                Some(job) => self.execute(worker_id, job).await,
                None => break,
            }
        }

        debug!("Inference worker {} stopped", worker_id);
    }

    async fn execute(&self, worker_id: usize, job: Job) {
        debug!("Worker {} running task {} on '{}'", worker_id, job.id, job.model_name);
        self.in_flight.insert(job.id);

        let state = match self.registry.ensure_loaded(&job.model_name).await {
            Err(e) => TaskState::Failed {
                error: format!("Failed to load model '{}': {}", job.model_name, e),
            },
            Ok(_) => match self.registry.infer(&job.model_name, &job.input).await {
                Ok(result) => TaskState::Completed { result },
                Err(e) => TaskState::Failed {
                    error: e.to_string(),
                },
            },
        };

        match &state {
            TaskState::Completed { .. } => {
                self.stats.completed.fetch_add(1, Ordering::Relaxed);
            }
            TaskState::Failed { error } => {
                self.stats.failed.fetch_add(1, Ordering::Relaxed);
                warn!("Task {} failed: {}", job.id, error);
            }
            TaskState::Pending => {}
        }

        if let Err(e) = self.store.finish(&job.id, state).await {
            error!("Failed to record outcome of task {}: {}", job.id, e);
        }
        self.in_flight.remove(&job.id);
    }

    async fn run_sweeper(&self, ttl: std::time::Duration) {
        let mut ticker = interval(self.config.sweep_interval());
        let mut shutdown = self.shutdown.subscribe();
        info!("Result sweeper evicting results older than {:?}", ttl);

        while self.running.load(Ordering::Relaxed) {
            tokio::select! {
                _ = shutdown.changed() => break,
                _ = ticker.tick() => {}
            }
            self.stats.sweeps.fetch_add(1, Ordering::Relaxed);
            self.store.evict_expired(ttl).await;
        }
    }
}

impl Clone for InferenceQueue {
    fn clone(&self) -> Self {
        Self {
            config: self.config.clone(),
            registry: Arc::clone(&self.registry),
            store: Arc::clone(&self.store),
            job_tx: self.job_tx.clone(),
            job_rx: Arc::clone(&self.job_rx),
            running: Arc::clone(&self.running),
            shutdown: Arc::clone(&self.shutdown),
            in_flight: Arc::clone(&self.in_flight),
            task_handles: Arc::clone(&self.task_handles),
            stats: Arc::clone(&self.stats),
        }
    }
}

impl std::fmt::Debug for InferenceQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InferenceQueue")
            .field("config", &self.config)
            .field("running", &self.is_running())
            .field("stats", &self.stats)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryResultStore;
    use crate::task::TaskStatus;
    use serde_json::json;
    use std::time::Duration;
    use vault_adapter_npu::StandInBackend;

    fn queue_with(backend: StandInBackend, config: QueueConfig) -> (InferenceQueue, Arc<ModelRegistry>) {
        let registry = Arc::new(ModelRegistry::new(Arc::new(backend)));
        let queue = InferenceQueue::new(config, Arc::clone(&registry), Arc::new(InMemoryResultStore::new()));
        (queue, registry)
    }

    async fn wait_terminal(queue: &InferenceQueue, id: &TaskId) -> TaskRecord {
        for _ in 0..200 {
            let record = queue.poll(id).await.unwrap();
            if record.state.is_terminal() {
                return record;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("task {} never finished", id);
    }

    #[tokio::test]
    async fn test_submit_returns_pending_without_workers() {
        let (queue, registry) = queue_with(StandInBackend::default(), QueueConfig::default());

        let id = queue.submit("yolov5s", json!({"image": "a.jpg"})).await.unwrap();
        assert_eq!(queue.poll(&id).await.unwrap().status(), TaskStatus::Pending);
        assert!(!registry.is_loaded("yolov5s").await);
    }

    #[tokio::test]
    async fn test_task_completes_and_model_stays_loaded() {
        let (queue, registry) = queue_with(StandInBackend::default(), QueueConfig::default());
        queue.start().await.unwrap();

        let id = queue.submit("yolov5s", json!({"image": "a.jpg"})).await.unwrap();
        let record = wait_terminal(&queue, &id).await;

        match &record.state {
            TaskState::Completed { result } => assert_eq!(result["results"][0]["label"], "cat"),
            other => panic!("unexpected state {:?}", other),
        }
        assert!(registry.is_loaded("yolov5s").await);

        // Polling again yields the same terminal record
        assert_eq!(queue.poll(&id).await.unwrap(), record);
        queue.stop().await;
    }

    #[tokio::test]
    async fn test_unknown_model_fails_with_load_error() {
        let (queue, _registry) = queue_with(StandInBackend::default(), QueueConfig::default());
        queue.start().await.unwrap();

        let id = queue.submit("ghost", json!("anything")).await.unwrap();
        match wait_terminal(&queue, &id).await.state {
            TaskState::Failed { error } => assert!(error.contains("Failed to load model 'ghost'")),
            other => panic!("unexpected state {:?}", other),
        }
        assert_eq!(queue.stats().failed.load(Ordering::Relaxed), 1);
        queue.stop().await;
    }

    #[tokio::test]
    async fn test_concurrent_tasks_share_one_load() {
        let backend = StandInBackend::default().with_inference_delay(Duration::from_millis(10));
        let config = QueueConfig {
            workers: 4,
            ..Default::default()
        };
        let (queue, registry) = queue_with(backend, config);
        queue.start().await.unwrap();

        let (a, b) = tokio::join!(
            queue.submit("resnet18", json!({"n": 1})),
            queue.submit("resnet18", json!({"n": 2}))
        );
        let (a, b) = (a.unwrap(), b.unwrap());

        assert_eq!(wait_terminal(&queue, &a).await.status(), TaskStatus::Completed);
        assert_eq!(wait_terminal(&queue, &b).await.status(), TaskStatus::Completed);
        assert_eq!(registry.stats().loads_performed.load(Ordering::Relaxed), 1);
        queue.stop().await;
    }

    #[tokio::test]
    async fn test_poll_unknown_task() {
        let (queue, _registry) = queue_with(StandInBackend::default(), QueueConfig::default());
        assert!(matches!(
            queue.poll(&TaskId::new()).await,
            Err(TaskError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_empty_model_name_rejected() {
        let (queue, _registry) = queue_with(StandInBackend::default(), QueueConfig::default());
        assert!(matches!(
            queue.submit("", json!({})).await,
            Err(TaskError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn test_double_start_rejected() {
        let (queue, _registry) = queue_with(StandInBackend::default(), QueueConfig::default());
        queue.start().await.unwrap();
        assert!(matches!(queue.start().await, Err(TaskError::AlreadyRunning)));
        queue.stop().await;
        assert!(!queue.is_running());
    }

    #[tokio::test]
    async fn test_stop_lets_running_inference_finish() {
        let backend = StandInBackend::default().with_inference_delay(Duration::from_millis(200));
        let (queue, _registry) = queue_with(backend, QueueConfig::default());
        queue.start().await.unwrap();

        let id = queue.submit("yolov5s", json!({"image": "a.jpg"})).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        queue.stop().await;

        assert_eq!(queue.poll(&id).await.unwrap().status(), TaskStatus::Completed);
        assert_eq!(queue.stats().cancelled.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn test_stop_past_grace_cancels_running_and_queued_tasks() {
        let backend = StandInBackend::default().with_inference_delay(Duration::from_millis(500));
        let config = QueueConfig {
            workers: 1,
            shutdown_grace_ms: 50,
            ..Default::default()
        };
        let (queue, _registry) = queue_with(backend, config);
        queue.start().await.unwrap();

        let running = queue.submit("yolov5s", json!({"n": 1})).await.unwrap();
        let queued = queue.submit("yolov5s", json!({"n": 2})).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        queue.stop().await;

        for id in [running, queued] {
            match queue.poll(&id).await.unwrap().state {
                TaskState::Failed { error } => assert_eq!(error, CANCELLED_AT_SHUTDOWN),
                other => panic!("unexpected state {:?}", other),
            }
        }
        assert_eq!(queue.stats().cancelled.load(Ordering::Relaxed), 2);

        // A restarted queue serves new work and leaves the cancelled records alone
        queue.start().await.unwrap();
        let next = queue.submit("yolov5s", json!({"n": 3})).await.unwrap();
        assert_eq!(wait_terminal(&queue, &next).await.status(), TaskStatus::Completed);
        assert_eq!(queue.poll(&running).await.unwrap().status(), TaskStatus::Failed);
        queue.stop().await;
    }

    #[tokio::test]
    async fn test_sweeper_evicts_finished_results() {
        let config = QueueConfig {
            result_ttl_seconds: Some(1),
            sweep_interval_seconds: 1,
            ..Default::default()
        };
        let (queue, _registry) = queue_with(StandInBackend::default(), config);
        queue.start().await.unwrap();

        let id = queue.submit("yolov5s", json!({})).await.unwrap();
        wait_terminal(&queue, &id).await;

        tokio::time::sleep(Duration::from_millis(2200)).await;
        assert!(matches!(queue.poll(&id).await, Err(TaskError::NotFound(_))));
        assert!(queue.stats().sweeps.load(Ordering::Relaxed) >= 2);
        queue.stop().await;
    }
}
