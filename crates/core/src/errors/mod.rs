//! Error types for dagrun operations

mod builders;
mod conversions;
mod display;
mod types;

pub use types::{Error, Result};

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn unknown_task_lists_known_names() {
        let err = Error::unknown_task("deploy", vec!["build".into(), "test".into()]);
        let msg = err.to_string();
        assert!(msg.contains("deploy"));
        assert!(msg.contains("build test"));
    }

    #[test]
    fn run_error_annotates_oom_exit() {
        let err = Error::task_run("bench", "nsjail runner exited", Some(137));
        assert!(matches!(err, Error::TaskRun { oom: true, .. }));
        assert!(err.to_string().contains("ran out of memory"));

        let err = Error::task_run("bench", "nsjail runner exited", Some(1));
        assert!(matches!(err, Error::TaskRun { oom: false, .. }));
        assert!(!err.to_string().contains("ran out of memory"));
    }

    #[test]
    fn dependency_error_chains_cause() {
        let cause = Arc::new(Error::task_build("lint", "nix build exited", Some(1)));
        let err = Error::dependency("lint", Arc::clone(&cause));
        assert!(err.to_string().contains("'lint' failed"));
        assert!(err.to_string().contains("nix build exited"));
        assert!(err.cause().is_some());
    }
}
