use super::capability::ThreadCapability;
use log::{debug, trace};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TaskId(pub u64);

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "task-{}", self.0)
    }
}

/// A unit of work submitted to a bounded executor.
pub struct Task {
    id: TaskId,
    body: Box<dyn FnOnce() + Send + 'static>,
}

impl Task {
    pub fn new(id: TaskId, body: impl FnOnce() + Send + 'static) -> Self {
        Self {
            id,
            body: Box::new(body),
        }
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn run(self) {
        (self.body)()
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task").field("id", &self.id).finish()
    }
}

/// The view of an executor an admission policy needs.
pub trait ExecutorLifecycle {
    fn name(&self) -> &str;
    fn is_shutdown(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdmissionDecision {
    /// The task already ran to completion on the submitting thread.
    RunInline,
    /// Transient overload; the task was dropped and may be resubmitted later.
    RejectBackpressure,
    /// The executor is shut down; the task will never run.
    RejectLifecycle,
}

impl AdmissionDecision {
    pub fn is_rejection(&self) -> bool {
        !matches!(self, AdmissionDecision::RunInline)
    }
}

/// Invoked by a bounded executor, on the submitting thread, for a task it can
/// neither queue nor hand to a worker.
pub trait AdmissionPolicy: Send + Sync {
    fn on_rejected(&self, task: Task, executor: &dyn ExecutorLifecycle) -> AdmissionDecision;
}

/// Runs rejected work on blocking-capable submitters and refuses it on
/// non-blocking ones, so an event-loop thread never stalls behind a full
/// queue. A shut down executor always refuses.
///
/// Stateless: one instance can back every executor in the process.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockingRejectionPolicy;

impl BlockingRejectionPolicy {
    pub const fn new() -> Self {
        Self
    }

    /// Decision for the calling thread without consuming a task.
    pub fn decide(executor: &dyn ExecutorLifecycle) -> AdmissionDecision {
        if executor.is_shutdown() {
            AdmissionDecision::RejectLifecycle
        } else if ThreadCapability::current().can_block() {
            AdmissionDecision::RunInline
        } else {
            AdmissionDecision::RejectBackpressure
        }
    }
}

impl AdmissionPolicy for BlockingRejectionPolicy {
    fn on_rejected(&self, task: Task, executor: &dyn ExecutorLifecycle) -> AdmissionDecision {
        let decision = Self::decide(executor);
        match decision {
            AdmissionDecision::RunInline => task.run(),
            AdmissionDecision::RejectBackpressure => trace!(
                "event=admission_rejected_non_blocking task={} executor={}",
                task.id(),
                executor.name()
            ),
            AdmissionDecision::RejectLifecycle => debug!(
                "event=admission_rejected_shutdown task={} executor={}",
                task.id(),
                executor.name()
            ),
        }
        decision
    }
}
