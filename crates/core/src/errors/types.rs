//! Core error type definitions

use std::sync::Arc;

/// Result type alias for dagrun operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for dagrun operations using thiserror
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A dependency edge references a task that is not part of the graph
    UnknownTask {
        task: String,
        /// Every task name the graph does know, sorted, to guide the caller
        known: Vec<String>,
    },

    /// The dependency description contains a cycle
    CyclicGraph { task: String },

    /// The dependency description could not be obtained or decoded
    GraphDescription { message: String },

    /// The eval or build step for a task failed
    TaskBuild {
        task: String,
        message: String,
        exit_code: Option<i32>,
    },

    /// Executing a task's artifact failed
    TaskRun {
        task: String,
        message: String,
        exit_code: Option<i32>,
        /// Exit status 137 usually means the process ran out of memory
        oom: bool,
    },

    /// A predecessor of this task failed or was cancelled
    Dependency { task: String, source: Arc<Error> },

    /// The overall outcome of a graph run, attributed to a sink task
    Failed { task: String, source: Arc<Error> },

    /// Scheduler misuse (start before prepare, retry on a live task, ...)
    Scheduler { message: String },

    /// I/O errors from process and file handling
    Io {
        operation: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization errors
    Json {
        message: String,
        #[source]
        source: serde_json::Error,
    },
}
