//! Task graph scheduling and execution for dagrun.
//!
//! The engine turns a dependency description into a validated DAG of task
//! nodes, runs one worker per node behind a two-phase prepare/start barrier,
//! and drives each task through its stage state machine (`wait → eval →
//! build → run`) with live output capture and process-group control. A
//! predecessor's failure short-circuits its transitive successors into
//! `cancel`; every node's state remains inspectable after the run.

pub mod backend;
pub mod dag;
mod executor;
pub mod log;
pub mod node;
pub mod process;
pub mod runner;
mod scheduler;
pub mod wiring;

pub use backend::{BuildBackend, CommandSpec, NixBackend};
pub use dag::TaskGraph;
pub use log::LogBuffer;
pub use node::{TaskNode, TaskSnapshot};
pub use process::ExitReport;
pub use runner::{GraphRunner, RunnerOptions};
pub use wiring::{LineSink, OutputWiring, StdioSpec};
