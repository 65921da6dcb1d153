//! Builder methods for creating errors with context

use super::types::Error;
use std::sync::Arc;

// Helper methods for creating errors with context
impl Error {
    /// Create an unknown-task error carrying the full set of known names
    #[must_use]
    pub fn unknown_task(task: impl Into<String>, known: Vec<String>) -> Self {
        Error::UnknownTask {
            task: task.into(),
            known,
        }
    }

    /// Create a cyclic-graph error anchored at one task on the cycle
    #[must_use]
    pub fn cyclic_graph(task: impl Into<String>) -> Self {
        Error::CyclicGraph { task: task.into() }
    }

    /// Create a graph description error
    #[must_use]
    pub fn graph_description(message: impl Into<String>) -> Self {
        Error::GraphDescription {
            message: message.into(),
        }
    }

    /// Create a build-stage error (covers both eval and build steps)
    #[must_use]
    pub fn task_build(
        task: impl Into<String>,
        message: impl Into<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Error::TaskBuild {
            task: task.into(),
            message: message.into(),
            exit_code,
        }
    }

    /// Create a run-stage error, annotating the well-known OOM exit status
    #[must_use]
    pub fn task_run(
        task: impl Into<String>,
        message: impl Into<String>,
        exit_code: Option<i32>,
    ) -> Self {
        Error::TaskRun {
            task: task.into(),
            message: message.into(),
            exit_code,
            oom: exit_code == Some(crate::constants::OOM_EXIT_CODE),
        }
    }

    /// Create a dependency error naming the failed predecessor
    #[must_use]
    pub fn dependency(task: impl Into<String>, source: Arc<Error>) -> Self {
        Error::Dependency {
            task: task.into(),
            source,
        }
    }

    /// Wrap a sink task's recorded error as the overall run outcome
    #[must_use]
    pub fn failed(task: impl Into<String>, source: Arc<Error>) -> Self {
        Error::Failed {
            task: task.into(),
            source,
        }
    }

    /// Create a scheduler misuse error
    #[must_use]
    pub fn scheduler(message: impl Into<String>) -> Self {
        Error::Scheduler {
            message: message.into(),
        }
    }

    /// Create an I/O error with the failing operation named
    #[must_use]
    pub fn io(operation: impl Into<String>, source: std::io::Error) -> Self {
        Error::Io {
            operation: operation.into(),
            source,
        }
    }

    /// The underlying cause chain, for variants that carry one
    pub fn cause(&self) -> Option<&Arc<Error>> {
        match self {
            Error::Dependency { source, .. } | Error::Failed { source, .. } => Some(source),
            _ => None,
        }
    }
}
