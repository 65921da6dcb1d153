//! Task node state.
//!
//! A node's mutable state is written only by its own executor worker; every
//! other party (presentation loop, tests, the scheduler's sink inspection)
//! reads a cloned [`TaskSnapshot`].

use chrono::{DateTime, Utc};
use dagrun_core::{Error, ResourceUsage, Stage};
use parking_lot::{Mutex, RwLock};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

use crate::log::LogBuffer;

/// Mutable per-task fields, guarded by the node's lock
#[derive(Debug)]
pub(crate) struct NodeState {
    pub stage: Stage,
    pub eval_start: Option<DateTime<Utc>>,
    pub eval_end: Option<DateTime<Utc>>,
    pub build_start: Option<DateTime<Utc>>,
    pub build_end: Option<DateTime<Utc>>,
    pub run_start: Option<DateTime<Utc>>,
    pub run_end: Option<DateTime<Utc>>,
    pub artifact: Option<PathBuf>,
    pub error: Option<Arc<Error>>,
    pub dependency_error: Option<Arc<Error>>,
    pub pid: Option<u32>,
    pub pgid: Option<i32>,
    pub usage: Option<ResourceUsage>,
}

impl Default for NodeState {
    fn default() -> Self {
        Self {
            stage: Stage::Wait,
            eval_start: None,
            eval_end: None,
            build_start: None,
            build_end: None,
            run_start: None,
            run_end: None,
            artifact: None,
            error: None,
            dependency_error: None,
            pid: None,
            pgid: None,
            usage: None,
        }
    }
}

/// Countdown of outstanding predecessors plus the first failure any of them
/// reported. Reaching zero unblocks the owner's run stage.
#[derive(Debug)]
pub(crate) struct DependencyGate {
    remaining: AtomicUsize,
    notify: Notify,
    failure: Mutex<Option<Arc<Error>>>,
}

impl DependencyGate {
    fn new(count: usize) -> Self {
        Self {
            remaining: AtomicUsize::new(count),
            notify: Notify::new(),
            failure: Mutex::new(None),
        }
    }

    /// One predecessor reached a terminal stage. Called exactly once per
    /// predecessor on every exit path: success, failure, or cancellation.
    pub fn report(&self, failure: Option<Arc<Error>>) {
        if let Some(err) = failure {
            self.failure.lock().get_or_insert(err);
        }
        if self.remaining.fetch_sub(1, Ordering::AcqRel) == 1 {
            self.notify.notify_waiters();
        }
    }

    /// Block until every predecessor has reported, then return the first
    /// failure received, if any.
    pub async fn wait(&self) -> Option<Arc<Error>> {
        loop {
            // Register interest before re-checking the count so a report
            // landing in between cannot be missed.
            let notified = self.notify.notified();
            if self.remaining.load(Ordering::Acquire) == 0 {
                break;
            }
            notified.await;
        }
        self.failure.lock().clone()
    }

    pub fn pending(&self) -> usize {
        self.remaining.load(Ordering::Acquire)
    }
}

/// One unit of work in the graph: a named task with dependencies and a
/// runnable artifact. Created once during graph construction and never
/// destroyed; it remains inspectable after the run completes.
#[derive(Debug)]
pub struct TaskNode {
    name: String,
    pub(crate) admitted: AtomicBool,
    pub(crate) gate: DependencyGate,
    pub(crate) predecessors: Vec<usize>,
    pub(crate) successors: Vec<usize>,
    pub(crate) state: RwLock<NodeState>,
    log: Arc<LogBuffer>,
}

impl TaskNode {
    pub(crate) fn new(name: String, predecessors: Vec<usize>, successors: Vec<usize>) -> Self {
        let gate = DependencyGate::new(predecessors.len());
        Self {
            name,
            admitted: AtomicBool::new(false),
            gate,
            predecessors,
            successors,
            state: RwLock::new(NodeState::default()),
            log: Arc::new(LogBuffer::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The task's captured output, in timestamp order
    pub fn log(&self) -> &Arc<LogBuffer> {
        &self.log
    }

    /// Claim the single admission slot for this node. Only the caller that
    /// wins the exchange may spawn the node's worker.
    pub(crate) fn admit(&self) -> bool {
        self.admitted
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// A point-in-time copy of the node's state for read-only consumers
    pub fn snapshot(&self) -> TaskSnapshot {
        let state = self.state.read();
        TaskSnapshot {
            name: self.name.clone(),
            stage: state.stage,
            eval_start: state.eval_start,
            eval_end: state.eval_end,
            build_start: state.build_start,
            build_end: state.build_end,
            run_start: state.run_start,
            run_end: state.run_end,
            artifact: state.artifact.clone(),
            error: state.error.clone(),
            dependency_error: state.dependency_error.clone(),
            pid: state.pid,
            usage: state.usage,
            log_len: self.log.len(),
        }
    }
}

/// Read-only view of one task, for the presentation layer and tests
#[derive(Debug, Clone)]
pub struct TaskSnapshot {
    pub name: String,
    pub stage: Stage,
    pub eval_start: Option<DateTime<Utc>>,
    pub eval_end: Option<DateTime<Utc>>,
    pub build_start: Option<DateTime<Utc>>,
    pub build_end: Option<DateTime<Utc>>,
    pub run_start: Option<DateTime<Utc>>,
    pub run_end: Option<DateTime<Utc>>,
    pub artifact: Option<PathBuf>,
    pub error: Option<Arc<Error>>,
    pub dependency_error: Option<Arc<Error>>,
    pub pid: Option<u32>,
    pub usage: Option<ResourceUsage>,
    pub log_len: usize,
}

impl TaskSnapshot {
    /// The error that decides this task's contribution to the run outcome:
    /// its own failure, or the failure it was cancelled by.
    pub fn outcome_error(&self) -> Option<Arc<Error>> {
        self.error
            .clone()
            .or_else(|| self.dependency_error.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn admission_is_exactly_once() {
        let node = TaskNode::new("build".into(), vec![], vec![]);
        assert!(node.admit());
        assert!(!node.admit());
        assert!(!node.admit());
    }

    #[tokio::test]
    async fn gate_opens_when_all_predecessors_report() {
        let gate = Arc::new(DependencyGate::new(2));

        let waiter = {
            let gate = Arc::clone(&gate);
            tokio::spawn(async move { gate.wait().await })
        };

        gate.report(None);
        assert_eq!(gate.pending(), 1);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(!waiter.is_finished());

        gate.report(None);
        let failure = waiter.await.unwrap();
        assert!(failure.is_none());
    }

    #[tokio::test]
    async fn gate_keeps_first_failure() {
        let gate = DependencyGate::new(2);
        let first = Arc::new(Error::task_build("lint", "exited", Some(1)));
        let second = Arc::new(Error::task_build("fmt", "exited", Some(2)));
        gate.report(Some(Arc::clone(&first)));
        gate.report(Some(second));

        let received = gate.wait().await.expect("failure recorded");
        assert!(Arc::ptr_eq(&received, &first));
    }

    #[tokio::test]
    async fn gate_with_no_predecessors_opens_immediately() {
        let gate = DependencyGate::new(0);
        assert!(gate.wait().await.is_none());
    }
}
