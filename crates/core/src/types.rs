//! Shared domain types for dagrun

use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::errors::{Error, Result};

/// One phase of a task's life.
///
/// Transitions are monotonic: `wait → (eval →) (build →) wait → run` and then
/// exactly one of the terminal stages. Only an explicit retry resets a task,
/// and only from a terminal stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// Queued: admitted but not yet past the prepare barrier, or blocked on
    /// the dependency countdown
    Wait,
    /// Resolving the artifact location through the external evaluator
    Eval,
    /// Producing/fetching the runnable artifact
    Build,
    /// Executing the artifact
    Run,
    /// Finished successfully
    Done,
    /// Finished with a recorded error
    Error,
    /// Never attempted because a predecessor failed
    Cancel,
}

impl Stage {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Done | Self::Error | Self::Cancel)
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Wait => "wait",
            Stage::Eval => "eval",
            Stage::Build => "build",
            Stage::Run => "run",
            Stage::Done => "done",
            Stage::Error => "error",
            Stage::Cancel => "cancel",
        };
        f.write_str(s)
    }
}

/// Which standard stream a captured line arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Stdout,
    Stderr,
}

/// One sanitized line of captured task output.
///
/// Immutable once stored; ordered by `time` within a task's log buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Line {
    pub time: DateTime<Utc>,
    pub stream: StreamKind,
    pub text: String,
}

/// How a task's standard streams are wired for a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Buffered capture for on-screen display
    #[default]
    Interactive,
    /// Stream every line as a structured log event
    Verbose,
    /// Inherit the supervising process's stdio and environment; only valid
    /// for a single task with no dependency graph
    Passthrough,
    /// Emit structured JSON events on stdout instead of human text
    Machine,
}

impl ExecutionMode {
    pub const ALL: &'static [&'static str] =
        &["interactive", "verbose", "passthrough", "machine"];
}

impl fmt::Display for ExecutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ExecutionMode::Interactive => "interactive",
            ExecutionMode::Verbose => "verbose",
            ExecutionMode::Passthrough => "passthrough",
            ExecutionMode::Machine => "machine",
        };
        f.write_str(s)
    }
}

impl FromStr for ExecutionMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "interactive" => Ok(Self::Interactive),
            "verbose" => Ok(Self::Verbose),
            "passthrough" => Ok(Self::Passthrough),
            "machine" => Ok(Self::Machine),
            other => Err(Error::scheduler(format!(
                "unknown mode '{other}', expected one of: {}",
                Self::ALL.join(", ")
            ))),
        }
    }
}

/// A precomputed dependency graph plus resolved artifact paths.
///
/// When supplied, the scheduler bypasses per-task artifact resolution: tasks
/// skip the eval/build stages and run the artifact named in `bin`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSpec {
    /// Task name to ordered dependency names
    pub dag: IndexMap<String, Vec<String>>,
    /// Task name to an already-resolved artifact path
    pub bin: HashMap<String, PathBuf>,
}

impl RunSpec {
    /// Parse a run specification from a CLI argument. A leading `@` reads the
    /// JSON from the named file instead.
    pub fn from_arg(arg: &str) -> Result<Self> {
        let raw = match arg.strip_prefix('@') {
            Some(path) => std::fs::read_to_string(path)
                .map_err(|e| Error::io(format!("reading run spec from '{path}'"), e))?,
            None => arg.to_string(),
        };
        Ok(serde_json::from_str(&raw)?)
    }
}

/// Resource accounting read from a finished process's exit status
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceUsage {
    /// Peak resident set size, in kibibytes
    pub max_rss_kib: u64,
    /// CPU time spent in user mode
    pub user_time: Duration,
    /// CPU time spent in kernel mode
    pub system_time: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn terminal_stages() {
        assert!(Stage::Done.is_terminal());
        assert!(Stage::Error.is_terminal());
        assert!(Stage::Cancel.is_terminal());
        for stage in [Stage::Wait, Stage::Eval, Stage::Build, Stage::Run] {
            assert!(!stage.is_terminal());
        }
    }

    #[test]
    fn mode_round_trips_through_str() {
        for name in ExecutionMode::ALL {
            let mode: ExecutionMode = name.parse().unwrap();
            assert_eq!(mode.to_string(), *name);
        }
        assert!("tui".parse::<ExecutionMode>().is_err());
    }

    #[test]
    fn run_spec_parses_inline_json() {
        let spec = RunSpec::from_arg(
            r#"{"dag": {"build": [], "test": ["build"]}, "bin": {"build": "/nix/store/x/bin/build"}}"#,
        )
        .unwrap();
        assert_eq!(spec.dag["test"], vec!["build".to_string()]);
        assert_eq!(
            spec.bin["build"],
            PathBuf::from("/nix/store/x/bin/build")
        );
    }

    #[test]
    fn run_spec_reads_at_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"dag": {{"only": []}}, "bin": {{}}}}"#).unwrap();
        let arg = format!("@{}", file.path().display());
        let spec = RunSpec::from_arg(&arg).unwrap();
        assert!(spec.dag.contains_key("only"));
    }
}
