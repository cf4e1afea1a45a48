use super::admission::{
    AdmissionDecision, AdmissionPolicy, BlockingRejectionPolicy, ExecutorLifecycle, Task, TaskId,
};
use super::capability::{spawn_with_capability, ThreadCapability};
use super::metrics::{ExecutorMetrics, NoopExecutorMetrics};
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{info, warn};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    pub name: String,
    pub max_workers: usize,
    pub queue_capacity: usize,
    pub worker_capability: ThreadCapability,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            name: "xsite-state-apply".into(),
            max_workers: 4,
            queue_capacity: 256,
            worker_capability: ThreadCapability::Blocking,
        }
    }
}

impl ExecutorConfig {
    pub fn validate(&self) -> Result<(), ExecutorConfigError> {
        if self.name.trim().is_empty() {
            return Err(ExecutorConfigError::EmptyName);
        }
        if self.max_workers == 0 {
            return Err(ExecutorConfigError::ZeroWorkers {
                executor: self.name.clone(),
            });
        }
        if self.queue_capacity == 0 {
            return Err(ExecutorConfigError::ZeroQueue {
                executor: self.name.clone(),
            });
        }
        Ok(())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutorConfigError {
    #[error("executor name must not be empty")]
    EmptyName,
    #[error("executor {executor} needs at least one worker")]
    ZeroWorkers { executor: String },
    #[error("executor {executor} needs a queue capacity of at least one")]
    ZeroQueue { executor: String },
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ExecutorError {
    #[error("executor {executor} is saturated; resubmit later")]
    Backpressure { executor: String },
    #[error("executor {executor} is shut down")]
    Shutdown { executor: String },
    #[error("failed to spawn worker for executor {executor}: {reason}")]
    Spawn { executor: String, reason: String },
    #[error(transparent)]
    Config(#[from] ExecutorConfigError),
}

impl ExecutorError {
    /// Only backpressure clears by itself; everything else is permanent for
    /// this executor.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ExecutorError::Backpressure { .. })
    }
}

struct ExecutorShared {
    name: String,
    sender: RwLock<Option<Sender<Task>>>,
    shutdown: AtomicBool,
    policy: Arc<dyn AdmissionPolicy>,
    metrics: Arc<dyn ExecutorMetrics>,
}

impl ExecutorLifecycle for ExecutorShared {
    fn name(&self) -> &str {
        &self.name
    }

    fn is_shutdown(&self) -> bool {
        self.shutdown.load(Ordering::SeqCst)
    }
}

struct WorkerContext {
    executor: String,
    receiver: Receiver<Task>,
    metrics: Arc<dyn ExecutorMetrics>,
}

impl WorkerContext {
    fn run(self) {
        for task in self.receiver.iter() {
            self.metrics.record_queue_depth(self.receiver.len());
            let id = task.id();
            if panic::catch_unwind(AssertUnwindSafe(|| task.run())).is_err() {
                self.metrics.record_task_panicked();
                warn!(
                    "event=executor_task_panicked executor={} task={}",
                    self.executor, id
                );
            }
        }
    }
}

/// Fixed pool of worker threads fed from a bounded queue.
///
/// Work that cannot be queued (queue full, or pool shut down) is handed to
/// the installed [`AdmissionPolicy`] on the submitting thread.
pub struct BoundedExecutor {
    shared: Arc<ExecutorShared>,
    config: ExecutorConfig,
    next_task: AtomicU64,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl BoundedExecutor {
    pub fn new(config: ExecutorConfig) -> Result<Self, ExecutorError> {
        Self::with_policy(config, Arc::new(BlockingRejectionPolicy::new()))
    }

    pub fn with_policy(
        config: ExecutorConfig,
        policy: Arc<dyn AdmissionPolicy>,
    ) -> Result<Self, ExecutorError> {
        Self::with_parts(config, policy, Arc::new(NoopExecutorMetrics))
    }

    pub fn with_parts(
        config: ExecutorConfig,
        policy: Arc<dyn AdmissionPolicy>,
        metrics: Arc<dyn ExecutorMetrics>,
    ) -> Result<Self, ExecutorError> {
        config.validate()?;
        let (sender, receiver) = bounded(config.queue_capacity);
        let shared = Arc::new(ExecutorShared {
            name: config.name.clone(),
            sender: RwLock::new(Some(sender)),
            shutdown: AtomicBool::new(false),
            policy,
            metrics: metrics.clone(),
        });
        let executor = Self {
            shared,
            config,
            next_task: AtomicU64::new(1),
            workers: Mutex::new(Vec::new()),
        };
        for index in 0..executor.config.max_workers {
            let worker = WorkerContext {
                executor: executor.config.name.clone(),
                receiver: receiver.clone(),
                metrics: metrics.clone(),
            };
            let thread_name = format!("{}-{}", executor.config.name, index);
            match spawn_with_capability(thread_name, executor.config.worker_capability, move || {
                worker.run()
            }) {
                Ok(handle) => executor.workers.lock().push(handle),
                Err(err) => {
                    // Dropping the executor stops the workers spawned so far.
                    return Err(ExecutorError::Spawn {
                        executor: executor.config.name.clone(),
                        reason: err.to_string(),
                    });
                }
            }
        }
        info!(
            "event=executor_started executor={} workers={} queue_capacity={} capability={}",
            executor.config.name,
            executor.config.max_workers,
            executor.config.queue_capacity,
            executor.config.worker_capability.label()
        );
        Ok(executor)
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    /// Queues `body`, or hands it to the admission policy when the queue is
    /// full or the executor is shut down. `Ok` means the task was queued or
    /// already ran on the calling thread.
    pub fn execute(&self, body: impl FnOnce() + Send + 'static) -> Result<TaskId, ExecutorError> {
        let id = TaskId(self.next_task.fetch_add(1, Ordering::Relaxed));
        let task = Task::new(id, body);
        self.shared.metrics.record_submitted();
        let rejected = if self.shared.is_shutdown() {
            task
        } else {
            let guard = self.shared.sender.read();
            let outcome = match guard.as_ref() {
                Some(sender) => match sender.try_send(task) {
                    Ok(()) => {
                        self.shared.metrics.record_queue_depth(sender.len());
                        return Ok(id);
                    }
                    Err(TrySendError::Full(task) | TrySendError::Disconnected(task)) => task,
                },
                None => task,
            };
            outcome
        };
        match self.shared.policy.on_rejected(rejected, self.shared.as_ref()) {
            AdmissionDecision::RunInline => {
                self.shared.metrics.record_inline_run();
                Ok(id)
            }
            AdmissionDecision::RejectBackpressure => {
                self.shared.metrics.record_backpressure_rejection();
                Err(ExecutorError::Backpressure {
                    executor: self.shared.name.clone(),
                })
            }
            AdmissionDecision::RejectLifecycle => {
                self.shared.metrics.record_lifecycle_rejection();
                Err(ExecutorError::Shutdown {
                    executor: self.shared.name.clone(),
                })
            }
        }
    }

    pub fn is_shutdown(&self) -> bool {
        self.shared.is_shutdown()
    }

    pub fn queue_depth(&self) -> usize {
        self.shared.sender.read().as_ref().map_or(0, Sender::len)
    }

    pub fn worker_count(&self) -> usize {
        self.workers.lock().len()
    }

    /// Stops accepting work, lets the workers drain what is already queued
    /// and joins them. Safe to call more than once and from a worker thread.
    pub fn shutdown(&self) {
        if self.shared.shutdown.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.sender.write().take();
        let handles: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
        let current = thread::current().id();
        let mut joined = 0usize;
        for handle in handles {
            if handle.thread().id() == current {
                continue;
            }
            if handle.join().is_err() {
                warn!("event=executor_worker_panic executor={}", self.shared.name);
            }
            joined += 1;
        }
        info!(
            "event=executor_shutdown executor={} joined_workers={}",
            self.shared.name, joined
        );
    }
}

impl ExecutorLifecycle for BoundedExecutor {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn is_shutdown(&self) -> bool {
        self.shared.is_shutdown()
    }
}

impl Drop for BoundedExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl std::fmt::Debug for BoundedExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoundedExecutor")
            .field("name", &self.config.name)
            .field("workers", &self.config.max_workers)
            .field("queue_capacity", &self.config.queue_capacity)
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}
