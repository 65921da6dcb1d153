//! The external declarative build tool boundary.
//!
//! The scheduler treats artifact resolution as an opaque contract: given a
//! task name and a runtime variant, the backend yields the commands whose
//! execution resolves and realizes a runnable artifact. [`NixBackend`] is
//! the production implementation; tests substitute scripted backends the
//! same way.

use async_trait::async_trait;
use dagrun_core::{Error, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;
use std::process::Command;

/// A command to execute for one stage of a task
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            env: Vec::new(),
        }
    }

    #[must_use]
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);
        for (key, value) in &self.env {
            cmd.env(key, value);
        }
        cmd
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.program)?;
        for arg in &self.args {
            write!(f, " {arg}")?;
        }
        Ok(())
    }
}

/// Contract with the external declarative build/evaluation tool
#[async_trait]
pub trait BuildBackend: Send + Sync {
    /// Evaluate the dependency description: task name → ordered dependency
    /// names.
    async fn dag(&self, dag_flake: &str) -> Result<IndexMap<String, Vec<String>>>;

    /// The eval-stage command for a task. Its standard output is the
    /// resolved location the build stage realizes.
    async fn eval_command(&self, task: &str, runtime: &str) -> Result<CommandSpec>;

    /// The build-stage command realizing what eval resolved. Its standard
    /// output is the builder's result report.
    fn build_command(&self, resolved: &str) -> CommandSpec;

    /// Extract the runnable artifact path from the build-stage report.
    fn artifact(&self, task: &str, runtime: &str, build_output: &str) -> Result<PathBuf>;
}

/// Production backend driving `nix`
pub struct NixBackend {
    task_flake: String,
}

#[derive(Debug, Deserialize)]
struct NixBuildResult {
    outputs: NixBuildOutputs,
}

#[derive(Debug, Deserialize)]
struct NixBuildOutputs {
    out: String,
}

impl NixBackend {
    pub fn new(task_flake: impl Into<String>) -> Self {
        Self {
            task_flake: task_flake.into(),
        }
    }

    /// Quote a task name into a nix string literal through an environment
    /// variable, so names containing `.` or `"` cannot break the attribute
    /// path the eval command builds.
    async fn quote_name(&self, task: &str) -> Result<String> {
        let output = tokio::process::Command::new("nix")
            .args(["eval", "--impure", "--expr", r#"__getEnv "s""#])
            .env("s", task)
            .output()
            .await
            .map_err(|e| Error::io("running nix eval for name quoting", e))?;
        if !output.status.success() {
            return Err(Error::task_build(
                task,
                format!(
                    "quoting task name failed: {}",
                    String::from_utf8_lossy(&output.stderr).trim()
                ),
                output.status.code(),
            ));
        }
        Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
    }
}

#[async_trait]
impl BuildBackend for NixBackend {
    async fn dag(&self, dag_flake: &str) -> Result<IndexMap<String, Vec<String>>> {
        let output = tokio::process::Command::new("nix")
            .args(["eval", "--json", dag_flake])
            .output()
            .await
            .map_err(|e| Error::io(format!("running nix eval --json {dag_flake}"), e))?;

        if !output.status.success() {
            return Err(Error::graph_description(format!(
                "nix eval --json {dag_flake} {}: {}",
                match output.status.code() {
                    Some(code) => format!("exited with status {code}"),
                    None => "was terminated".to_string(),
                },
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| Error::graph_description(format!("decoding eval result: {e}")))
    }

    async fn eval_command(&self, task: &str, runtime: &str) -> Result<CommandSpec> {
        let quoted = self.quote_name(task).await?;
        Ok(CommandSpec::new(
            "nix",
            vec![
                "eval".into(),
                "--raw".into(),
                self.task_flake.clone(),
                "--apply".into(),
                format!("f: f.{quoted}.{runtime}.run.drvPath"),
            ],
        ))
    }

    fn build_command(&self, resolved: &str) -> CommandSpec {
        CommandSpec::new(
            "nix",
            vec![
                "build".into(),
                "--json".into(),
                "--no-link".into(),
                resolved.to_string(),
            ],
        )
    }

    fn artifact(&self, task: &str, runtime: &str, build_output: &str) -> Result<PathBuf> {
        let results: Vec<NixBuildResult> = serde_json::from_str(build_output).map_err(|e| {
            Error::task_build(task, format!("decoding nix build result: {e}"), None)
        })?;
        let first = results.first().ok_or_else(|| {
            Error::task_build(task, "nix build produced no result entries", None)
        })?;
        Ok(PathBuf::from(format!(
            "{}/bin/{task}-{runtime}",
            first.outputs.out
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_spec_renders_for_diagnostics() {
        let spec = CommandSpec::new("nix", vec!["build".into(), "--no-link".into()])
            .env("NIX_CONFIG", "accept-flake-config = true");
        assert_eq!(spec.to_string(), "nix build --no-link");
        assert_eq!(spec.env.len(), 1);

        let cmd = spec.to_command();
        assert_eq!(cmd.get_program(), "nix");
    }

    #[test]
    fn artifact_path_comes_from_build_report() {
        let backend = NixBackend::new(".#dagrun.x86_64-linux.task");
        let report = r#"[{"drvPath": "/nix/store/abc.drv", "outputs": {"out": "/nix/store/abc-out"}}]"#;
        let path = backend.artifact("lint", "nsjail", report).unwrap();
        assert_eq!(
            path,
            PathBuf::from("/nix/store/abc-out/bin/lint-nsjail")
        );
    }

    #[test]
    fn empty_build_report_is_an_error() {
        let backend = NixBackend::new(".#task");
        assert!(backend.artifact("lint", "nsjail", "[]").is_err());
        assert!(backend.artifact("lint", "nsjail", "not json").is_err());
    }
}
