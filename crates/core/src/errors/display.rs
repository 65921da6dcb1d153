//! Display implementations for error types

use super::types::Error;
use std::fmt;

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::UnknownTask { task, known } => {
                write!(
                    f,
                    "unknown task '{task}'. Available tasks: {}",
                    known.join(" ")
                )
            }
            Error::CyclicGraph { task } => {
                write!(f, "dependency graph contains a cycle through task '{task}'")
            }
            Error::GraphDescription { message } => {
                write!(f, "failed to read dependency description: {message}")
            }
            Error::TaskBuild {
                task,
                message,
                exit_code,
            } => match exit_code {
                Some(code) => {
                    write!(f, "build of task '{task}' failed with exit code {code}: {message}")
                }
                None => write!(f, "build of task '{task}' failed: {message}"),
            },
            Error::TaskRun {
                task,
                message,
                exit_code,
                oom,
            } => {
                match exit_code {
                    Some(code) => {
                        write!(f, "task '{task}' failed with exit code {code}: {message}")?;
                    }
                    None => write!(f, "task '{task}' failed: {message}")?,
                }
                if *oom {
                    write!(f, "\nThis usually means it ran out of memory")?;
                }
                Ok(())
            }
            Error::Dependency { task, source } => {
                write!(f, "'{task}' failed: {source}")
            }
            Error::Failed { task, source } => {
                write!(f, "running '{task}': {source}")
            }
            Error::Scheduler { message } => {
                write!(f, "scheduler error: {message}")
            }
            Error::Io { operation, source } => {
                write!(f, "{operation}: {source}")
            }
            Error::Json { message, .. } => {
                write!(f, "JSON error: {message}")
            }
        }
    }
}
