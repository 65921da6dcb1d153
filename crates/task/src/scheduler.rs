//! Two-phase scheduling: prepare admits workers, start releases them.
//!
//! Preparation walks the requested task and its transitive predecessors,
//! admitting each node's worker exactly once no matter how many paths reach
//! it. Admitted workers block on the prepare barrier until the caller has
//! attached any observer and calls `start`, which releases the barrier once,
//! waits for every worker to reach a terminal stage, and aggregates the
//! outcome from the sink nodes.

use dagrun_core::{Error, Result};
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tracing::Instrument;

use crate::executor::{self, ExecContext};

pub(crate) struct Scheduler {
    ctx: Arc<ExecContext>,
    barrier: watch::Sender<bool>,
    workers: JoinSet<()>,
    prepared: bool,
}

impl Scheduler {
    pub fn new(ctx: Arc<ExecContext>) -> Self {
        let (barrier, _) = watch::channel(false);
        Self {
            ctx,
            barrier,
            workers: JoinSet::new(),
            prepared: false,
        }
    }

    /// Admit the named task and, transitively, every predecessor. Unknown
    /// names fail with the full list of available tasks.
    pub fn prepare(&mut self, task: &str) -> Result<()> {
        let index = self.ctx.graph.position(task)?;
        self.prepared = true;
        self.admit(index);
        Ok(())
    }

    fn admit(&mut self, index: usize) {
        let node = Arc::clone(self.ctx.graph.node(index));
        if !node.admit() {
            return;
        }

        let span = tracing::info_span!("task", name = node.name());
        let ctx = Arc::clone(&self.ctx);
        let barrier = self.barrier.subscribe();
        self.workers
            .spawn(executor::run_worker(ctx, index, barrier).instrument(span));

        for predecessor in node.predecessors.clone() {
            self.admit(predecessor);
        }
    }

    /// Release the prepare barrier, wait for the start countdown to drain,
    /// then report the first error found among the sink nodes.
    pub async fn start(&mut self) -> Result<()> {
        if !self.prepared {
            return Err(Error::scheduler("start was called before prepare"));
        }

        let _ = self.barrier.send(true);

        while let Some(joined) = self.workers.join_next().await {
            if let Err(e) = joined {
                tracing::error!(error = %e, "task worker aborted");
            }
        }

        for sink in self.ctx.graph.sinks() {
            if let Some(err) = sink.snapshot().outcome_error() {
                return Err(Error::failed(sink.name(), err));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{BuildBackend, CommandSpec};
    use crate::dag::TaskGraph;
    use crate::wiring;
    use async_trait::async_trait;
    use dagrun_core::ExecutionMode;
    use indexmap::IndexMap;
    use std::path::PathBuf;

    /// A backend that must never be reached: these tests exercise scheduler
    /// bookkeeping, not execution.
    struct UnreachableBackend;

    #[async_trait]
    impl BuildBackend for UnreachableBackend {
        async fn dag(&self, _dag_flake: &str) -> Result<IndexMap<String, Vec<String>>> {
            unreachable!("tests never evaluate a dag through the backend")
        }

        async fn eval_command(&self, _task: &str, _runtime: &str) -> Result<CommandSpec> {
            unreachable!("tests never reach the eval stage")
        }

        fn build_command(&self, _resolved: &str) -> CommandSpec {
            unreachable!("tests never reach the build stage")
        }

        fn artifact(&self, _task: &str, _runtime: &str, _output: &str) -> Result<PathBuf> {
            unreachable!("tests never reach the artifact step")
        }
    }

    fn scheduler_for(description: &[(&str, &[&str])]) -> Scheduler {
        let description: IndexMap<String, Vec<String>> = description
            .iter()
            .map(|(task, deps)| {
                (
                    task.to_string(),
                    deps.iter().map(|d| d.to_string()).collect(),
                )
            })
            .collect();
        let graph = Arc::new(TaskGraph::build(&description).unwrap());
        Scheduler::new(Arc::new(ExecContext {
            graph,
            backend: Arc::new(UnreachableBackend),
            wiring: wiring::for_mode(ExecutionMode::Interactive),
            run_spec: None,
            runtime: "nsjail".into(),
        }))
    }

    #[tokio::test]
    async fn start_before_prepare_is_rejected() {
        let mut scheduler = scheduler_for(&[("only", &[])]);
        let err = scheduler.start().await.unwrap_err();
        assert!(matches!(err, Error::Scheduler { .. }));
        assert!(err.to_string().contains("before prepare"));
    }

    #[tokio::test]
    async fn preparing_an_unknown_task_lists_available_tasks() {
        let mut scheduler = scheduler_for(&[("build", &[]), ("test", &["build"])]);
        let err = scheduler.prepare("deploy").unwrap_err();
        assert!(matches!(err, Error::UnknownTask { .. }));
        assert!(err.to_string().contains("build test"));
    }

    #[tokio::test]
    async fn preparing_twice_admits_each_worker_once() {
        let mut scheduler = scheduler_for(&[("shared", &[]), ("left", &["shared"])]);
        scheduler.prepare("left").unwrap();
        scheduler.prepare("left").unwrap();
        scheduler.prepare("shared").unwrap();
        // one worker per node, not per preparation path
        assert_eq!(scheduler.workers.len(), 2);
    }
}
