/// Constants used throughout the dagrun codebase
use std::time::Duration;

// Exit status that usually indicates the kernel OOM killer
pub const OOM_EXIT_CODE: i32 = 137;

// Grace period between the termination signal and the unconditional kill
// sent to a task's process group
pub const KILL_GRACE: Duration = Duration::from_secs(3);

// Default flake attribute holding the dependency description
pub const DEFAULT_DAG_FLAKE: &str = ".#dagrun.x86_64-linux.dag";

// Default flake attribute holding the per-task build expressions
pub const DEFAULT_TASK_FLAKE: &str = ".#dagrun.x86_64-linux.task";

// Default runtime variant a task artifact is built for
pub const DEFAULT_RUNTIME: &str = "nsjail";

// Environment variable names mirrored by the CLI flags
pub const DAG_FLAKE_VAR: &str = "DAG_FLAKE";
pub const TASK_FLAKE_VAR: &str = "TASK_FLAKE";
pub const MODE_VAR: &str = "MODE";
pub const RUNTIME_VAR: &str = "RUNTIME";
pub const RUN_SPEC_VAR: &str = "RUN_SPEC";
pub const LOG_LEVEL_VAR: &str = "LOG_LEVEL";
