//! Core domain types, errors, and constants for dagrun.
//!
//! This crate establishes the foundational data structures and error handling
//! mechanisms used throughout the workspace.
//!
//! ## Key Components
//!
//! - **`errors`**: Defines the primary `Error` enum and `Result` type alias,
//!   centralizing all possible failure modes for predictable error handling.
//! - **`types`**: Domain types shared between the engine and its callers:
//!   stages, execution modes, captured log lines, run specifications, and
//!   resource accounting.
//! - **`events`**: The machine-readable event stream emitted in `machine`
//!   mode.
//! - **`constants`**: Shared static constants such as default flake
//!   references and the kill grace period.

pub mod constants;
pub mod errors;
pub mod events;
pub mod types;

pub use self::{
    constants::*,
    errors::{Error, Result},
    events::TaskEvent,
    types::{ExecutionMode, Line, ResourceUsage, RunSpec, Stage, StreamKind},
};
