//! The engine facade: builds the graph for a run and drives the scheduler.

use dagrun_core::{Error, ExecutionMode, Result, RunSpec};
use indexmap::IndexMap;
use std::sync::Arc;

use crate::backend::BuildBackend;
use crate::dag::TaskGraph;
use crate::executor::{self, ExecContext};
use crate::scheduler::Scheduler;
use crate::wiring;

/// Configuration for one graph run
#[derive(Debug, Clone)]
pub struct RunnerOptions {
    pub mode: ExecutionMode,
    pub runtime: String,
    pub dag_flake: String,
    pub run_spec: Option<RunSpec>,
}

impl Default for RunnerOptions {
    fn default() -> Self {
        Self {
            mode: ExecutionMode::default(),
            runtime: dagrun_core::DEFAULT_RUNTIME.to_string(),
            dag_flake: dagrun_core::DEFAULT_DAG_FLAKE.to_string(),
            run_spec: None,
        }
    }
}

/// Owns one dependency graph and its scheduler for the lifetime of a run.
/// The graph stays inspectable after `start` returns, for the presentation
/// layer and for retries.
pub struct GraphRunner {
    graph: Arc<TaskGraph>,
    ctx: Arc<ExecContext>,
    scheduler: Scheduler,
}

impl std::fmt::Debug for GraphRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphRunner")
            .field("graph", &self.graph)
            .finish_non_exhaustive()
    }
}

impl GraphRunner {
    /// Resolve the dependency description and build the graph.
    ///
    /// The description comes from the run specification when one is given,
    /// is synthesized as a single free-standing task in passthrough mode,
    /// and is otherwise evaluated through the backend.
    pub async fn new(
        task: &str,
        options: RunnerOptions,
        backend: Arc<dyn BuildBackend>,
    ) -> Result<Self> {
        let description: IndexMap<String, Vec<String>> =
            if let Some(spec) = &options.run_spec {
                spec.dag.clone()
            } else if options.mode == ExecutionMode::Passthrough {
                IndexMap::from([(task.to_string(), Vec::new())])
            } else {
                backend.dag(&options.dag_flake).await?
            };

        let graph = Arc::new(TaskGraph::build(&description)?);

        if options.mode == ExecutionMode::Passthrough && graph.len() > 1 {
            return Err(Error::scheduler(
                "passthrough mode is only valid for a single task with no dependency graph",
            ));
        }

        let ctx = Arc::new(ExecContext {
            graph: Arc::clone(&graph),
            backend,
            wiring: wiring::for_mode(options.mode),
            run_spec: options.run_spec,
            runtime: options.runtime,
        });

        Ok(Self {
            graph,
            ctx: Arc::clone(&ctx),
            scheduler: Scheduler::new(ctx),
        })
    }

    /// Admit the task and its transitive dependencies for execution
    pub fn prepare(&mut self, task: &str) -> Result<()> {
        self.scheduler.prepare(task)
    }

    /// Release the prepare barrier, wait for the whole graph to finish, and
    /// report the first sink error
    pub async fn start(&mut self) -> Result<()> {
        self.scheduler.start().await
    }

    /// The read-only presentation surface
    pub fn graph(&self) -> &Arc<TaskGraph> {
        &self.graph
    }

    /// Re-run one finished task from scratch, clearing its log and error
    pub async fn retry(&self, task: &str) -> Result<()> {
        executor::retry(&self.ctx, task).await
    }
}
