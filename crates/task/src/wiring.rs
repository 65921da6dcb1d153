//! Mode-selected standard-stream wiring.
//!
//! The executor picks one strategy at configuration time and never branches
//! on the mode again: stage logic only asks the strategy how to wire stdio
//! and where captured lines go.

use chrono::{DateTime, Utc};
use dagrun_core::{ExecutionMode, StreamKind, TaskEvent};
use std::io::Write;
use std::sync::Arc;

use crate::log::LogBuffer;

/// How a stage process's standard streams are set up before spawn
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StdioSpec {
    /// Pipe both streams into line readers
    Piped,
    /// Inherit the supervising process's stdio (and environment)
    Inherit,
}

/// Destination for captured output lines
pub trait LineSink: Send + Sync {
    fn push(&self, stream: StreamKind, text: String, time: DateTime<Utc>);
}

/// Standard-stream wiring for a whole run, chosen once from the mode
pub trait OutputWiring: Send + Sync {
    fn stdio(&self) -> StdioSpec;

    /// The sink line readers feed for one task. `None` with inherited stdio.
    fn sink(&self, task: &str, log: &Arc<LogBuffer>) -> Option<Arc<dyn LineSink>>;

    /// Report a lifecycle event. Only the machine wiring surfaces these as
    /// output; other wirings leave them to `tracing`.
    fn emit(&self, _event: &TaskEvent) {}
}

pub fn for_mode(mode: ExecutionMode) -> Arc<dyn OutputWiring> {
    match mode {
        ExecutionMode::Interactive => Arc::new(BufferedWiring),
        ExecutionMode::Verbose => Arc::new(VerboseWiring),
        ExecutionMode::Passthrough => Arc::new(PassthroughWiring),
        ExecutionMode::Machine => Arc::new(MachineWiring),
    }
}

/// Buffered capture for on-screen display: lines land in the task's log
/// buffer, in timestamp order
pub struct BufferedWiring;

impl OutputWiring for BufferedWiring {
    fn stdio(&self) -> StdioSpec {
        StdioSpec::Piped
    }

    fn sink(&self, _task: &str, log: &Arc<LogBuffer>) -> Option<Arc<dyn LineSink>> {
        Some(Arc::new(BufferSink {
            log: Arc::clone(log),
        }))
    }
}

struct BufferSink {
    log: Arc<LogBuffer>,
}

impl LineSink for BufferSink {
    fn push(&self, stream: StreamKind, text: String, time: DateTime<Utc>) {
        self.log.push(stream, text, time);
    }
}

/// Stream every captured line as a structured log event
pub struct VerboseWiring;

impl OutputWiring for VerboseWiring {
    fn stdio(&self) -> StdioSpec {
        StdioSpec::Piped
    }

    fn sink(&self, task: &str, _log: &Arc<LogBuffer>) -> Option<Arc<dyn LineSink>> {
        Some(Arc::new(TracingSink {
            task: task.to_string(),
        }))
    }
}

struct TracingSink {
    task: String,
}

impl LineSink for TracingSink {
    fn push(&self, stream: StreamKind, text: String, _time: DateTime<Utc>) {
        match stream {
            StreamKind::Stdout => {
                tracing::info!(task = %self.task, std = "out", "{text}");
            }
            StreamKind::Stderr => {
                tracing::info!(task = %self.task, std = "err", "{text}");
            }
        }
    }
}

/// Inherit the supervising process's stdio; nothing is captured
pub struct PassthroughWiring;

impl OutputWiring for PassthroughWiring {
    fn stdio(&self) -> StdioSpec {
        StdioSpec::Inherit
    }

    fn sink(&self, _task: &str, _log: &Arc<LogBuffer>) -> Option<Arc<dyn LineSink>> {
        None
    }
}

/// Emit structured JSON events on stdout instead of human text
pub struct MachineWiring;

impl OutputWiring for MachineWiring {
    fn stdio(&self) -> StdioSpec {
        StdioSpec::Piped
    }

    fn sink(&self, task: &str, _log: &Arc<LogBuffer>) -> Option<Arc<dyn LineSink>> {
        Some(Arc::new(MachineSink {
            task: task.to_string(),
        }))
    }

    fn emit(&self, event: &TaskEvent) {
        write_event(event);
    }
}

struct MachineSink {
    task: String,
}

impl LineSink for MachineSink {
    fn push(&self, stream: StreamKind, text: String, time: DateTime<Utc>) {
        write_event(&TaskEvent::OutputLine {
            task: self.task.clone(),
            stream,
            text,
            time,
        });
    }
}

fn write_event(event: &TaskEvent) {
    let Ok(json) = serde_json::to_string(event) else {
        return;
    };
    let stdout = std::io::stdout();
    let mut handle = stdout.lock();
    let _ = writeln!(handle, "{json}");
}
