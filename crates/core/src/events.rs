//! Machine-readable task events.
//!
//! `machine` mode serializes these as JSON lines on stdout so supervising
//! tools can follow a run without scraping human-oriented output. They are
//! data output, not logging; diagnostic logging goes through `tracing`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{Stage, StreamKind};

/// Task execution events
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum TaskEvent {
    /// A task moved to a new stage
    StageChanged {
        task: String,
        stage: Stage,
        time: DateTime<Utc>,
    },
    /// A task emitted one line of output
    OutputLine {
        task: String,
        stream: StreamKind,
        text: String,
        time: DateTime<Utc>,
    },
    /// A task reached a terminal stage
    Finished {
        task: String,
        stage: Stage,
        error: Option<String>,
        time: DateTime<Utc>,
    },
}

impl TaskEvent {
    pub fn task(&self) -> &str {
        match self {
            TaskEvent::StageChanged { task, .. }
            | TaskEvent::OutputLine { task, .. }
            | TaskEvent::Finished { task, .. } => task,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_with_tag() {
        let event = TaskEvent::StageChanged {
            task: "build".into(),
            stage: Stage::Run,
            time: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains(r#""event":"stage_changed""#));
        assert!(json.contains(r#""stage":"run""#));
    }
}
