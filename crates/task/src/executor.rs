//! Per-task execution: drives one node through its stage state machine.
//!
//! A worker owns every mutation of its node. It blocks on the prepare
//! barrier, resolves its artifact (eval/build, or directly from a run
//! specification), blocks on the dependency countdown, then runs the
//! artifact. Every exit path notifies each direct successor exactly once.

use chrono::Utc;
use dagrun_core::{Error, Result, RunSpec, Stage, StreamKind, TaskEvent};
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use tokio::sync::watch;

use crate::backend::{BuildBackend, CommandSpec};
use crate::dag::TaskGraph;
use crate::log;
use crate::node::TaskNode;
use crate::process::{self, ExitReport};
use crate::wiring::{LineSink, OutputWiring, StdioSpec};

/// Everything a worker needs, shared across all workers of one run
pub(crate) struct ExecContext {
    pub graph: Arc<TaskGraph>,
    pub backend: Arc<dyn BuildBackend>,
    pub wiring: Arc<dyn OutputWiring>,
    pub run_spec: Option<RunSpec>,
    pub runtime: String,
}

/// The worker admitted for one node. Spawned exactly once per traversal.
pub(crate) async fn run_worker(
    ctx: Arc<ExecContext>,
    index: usize,
    mut barrier: watch::Receiver<bool>,
) {
    if barrier.wait_for(|released| *released).await.is_err() {
        // scheduler went away before releasing the barrier
        return;
    }

    let node = Arc::clone(ctx.graph.node(index));
    set_stage(&ctx, &node, Stage::Wait);

    let artifact = match resolve_artifact(&ctx, &node).await {
        Ok(path) => path,
        Err(err) => {
            fail(&ctx, &node, err);
            return;
        }
    };

    if let Some(cause) = node.gate.wait().await {
        cancel(&ctx, &node, cause);
        return;
    }

    match run_stage(&ctx, &node, &artifact).await {
        Ok(()) => {
            set_stage(&ctx, &node, Stage::Done);
            tracing::info!(task = node.name(), "task done");
            ctx.wiring.emit(&TaskEvent::Finished {
                task: node.name().to_string(),
                stage: Stage::Done,
                error: None,
                time: Utc::now(),
            });
            notify_successors(&ctx, &node, None);
        }
        Err(err) => fail(&ctx, &node, err),
    }
}

/// Re-run one finished task from scratch. Successors are not re-notified:
/// the traversal already delivered their one report per predecessor.
pub(crate) async fn retry(ctx: &Arc<ExecContext>, task: &str) -> Result<()> {
    let index = ctx.graph.position(task)?;
    let node = Arc::clone(ctx.graph.node(index));

    {
        let mut state = node.state.write();
        if !state.stage.is_terminal() {
            return Err(Error::scheduler(format!(
                "can only retry finished tasks; '{task}' is in stage '{}'",
                state.stage
            )));
        }
        *state = Default::default();
    }
    node.log().clear();
    set_stage(ctx, &node, Stage::Wait);
    tracing::info!(task, "retrying");

    let artifact = match resolve_artifact(ctx, &node).await {
        Ok(path) => path,
        Err(err) => return Err(record_failure(ctx, &node, err)),
    };

    match run_stage(ctx, &node, &artifact).await {
        Ok(()) => {
            set_stage(ctx, &node, Stage::Done);
            ctx.wiring.emit(&TaskEvent::Finished {
                task: node.name().to_string(),
                stage: Stage::Done,
                error: None,
                time: Utc::now(),
            });
            Ok(())
        }
        Err(err) => Err(record_failure(ctx, &node, err)),
    }
}

/// The artifact to run: straight from the run specification, or through the
/// eval and build stages.
async fn resolve_artifact(ctx: &Arc<ExecContext>, node: &Arc<TaskNode>) -> Result<PathBuf> {
    if let Some(spec) = &ctx.run_spec {
        let path = spec.bin.get(node.name()).cloned().ok_or_else(|| {
            Error::task_build(
                node.name(),
                "run specification has no artifact for this task",
                None,
            )
        })?;
        node.state.write().artifact = Some(path.clone());
        return Ok(path);
    }
    eval_and_build(ctx, node).await
}

async fn eval_and_build(ctx: &Arc<ExecContext>, node: &Arc<TaskNode>) -> Result<PathBuf> {
    // eval: resolve the artifact location
    set_stage(ctx, node, Stage::Eval);
    let spec = ctx.backend.eval_command(node.name(), &ctx.runtime).await?;
    let outcome = execute_stage(ctx, node, &spec, true).await;
    node.state.write().eval_end = Some(Utc::now());
    let outcome = outcome?;
    if !outcome.report.success() {
        return Err(Error::task_build(
            node.name(),
            format!("{spec} {}", outcome.report.describe()),
            outcome.report.status_code(),
        ));
    }
    let resolved = outcome.stdout.trim().to_string();

    // build: realize the artifact
    set_stage(ctx, node, Stage::Build);
    let spec = ctx.backend.build_command(&resolved);
    let outcome = execute_stage(ctx, node, &spec, true).await;
    node.state.write().build_end = Some(Utc::now());
    let outcome = outcome?;
    if !outcome.report.success() {
        return Err(Error::task_build(
            node.name(),
            format!("{spec} {}", outcome.report.describe()),
            outcome.report.status_code(),
        ));
    }

    let artifact = ctx
        .backend
        .artifact(node.name(), &ctx.runtime, &outcome.stdout)?;
    node.state.write().artifact = Some(artifact.clone());

    // queued again until every predecessor has reported
    set_stage(ctx, node, Stage::Wait);
    Ok(artifact)
}

async fn run_stage(ctx: &Arc<ExecContext>, node: &Arc<TaskNode>, artifact: &Path) -> Result<()> {
    set_stage(ctx, node, Stage::Run);
    let spec = CommandSpec::new(artifact.to_string_lossy(), Vec::new());
    let outcome = execute_stage(ctx, node, &spec, false).await;
    node.state.write().run_end = Some(Utc::now());
    let outcome = outcome?;

    if outcome.report.success() {
        Ok(())
    } else {
        Err(Error::task_run(
            node.name(),
            format!("{spec} {}", outcome.report.describe()),
            outcome.report.status_code(),
        ))
    }
}

struct StageOutcome {
    report: ExitReport,
    stdout: String,
}

/// Run one stage process under the controller: fresh process group, stream
/// wiring fixed before spawn, rusage collected at exit.
async fn execute_stage(
    ctx: &Arc<ExecContext>,
    node: &Arc<TaskNode>,
    spec: &CommandSpec,
    capture_stdout: bool,
) -> Result<StageOutcome> {
    let mut cmd = spec.to_command();
    let piped = ctx.wiring.stdio() == StdioSpec::Piped;
    if piped {
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
    } else {
        // passthrough inherits the supervising process's stdio; eval still
        // needs its stdout captured, it is the resolved location
        cmd.stdin(Stdio::inherit())
            .stdout(if capture_stdout {
                Stdio::piped()
            } else {
                Stdio::inherit()
            })
            .stderr(Stdio::inherit());
    }

    let mut spawned = process::spawn(cmd, &spec.to_string())?;
    {
        let mut state = node.state.write();
        state.pid = Some(spawned.pid);
        state.pgid = Some(spawned.pgid);
    }
    tracing::debug!(
        task = node.name(),
        pid = spawned.pid,
        command = %spec,
        "stage process started"
    );

    let sink = ctx.wiring.sink(node.name(), node.log());

    let mut readers = Vec::new();
    let mut stdout_capture = None;
    if let Some(stdout) = spawned.stdout.take() {
        if capture_stdout {
            stdout_capture = Some(tokio::task::spawn_blocking(move || {
                let mut buf = String::new();
                let _ = BufReader::new(stdout).read_to_string(&mut buf);
                buf
            }));
        } else {
            readers.push(spawn_line_reader(stdout, StreamKind::Stdout, sink.clone()));
        }
    }
    if let Some(stderr) = spawned.stderr.take() {
        readers.push(spawn_line_reader(stderr, StreamKind::Stderr, sink.clone()));
    }

    let report = process::wait_with_usage(spawned.pid).await;

    for reader in readers {
        let _ = reader.await;
    }
    let stdout = match stdout_capture {
        Some(handle) => handle.await.unwrap_or_default(),
        None => String::new(),
    };

    {
        let mut state = node.state.write();
        state.pid = None;
        state.pgid = None;
        if let Ok(report) = &report {
            state.usage = Some(report.usage);
        }
    }

    Ok(StageOutcome {
        report: report?,
        stdout,
    })
}

/// One blocking reader per standard stream. Each line is sanitized and
/// inserted at its chronological position by the sink.
fn spawn_line_reader<R: Read + Send + 'static>(
    stream: R,
    kind: StreamKind,
    sink: Option<Arc<dyn LineSink>>,
) -> tokio::task::JoinHandle<()> {
    tokio::task::spawn_blocking(move || {
        let mut reader = BufReader::new(stream);
        let mut raw = Vec::new();
        loop {
            raw.clear();
            match reader.read_until(b'\n', &mut raw) {
                Ok(0) | Err(_) => break,
                Ok(_) => {
                    let Some(sink) = &sink else { continue };
                    let time = Utc::now();
                    let text = String::from_utf8_lossy(&raw);
                    for segment in log::sanitize_segments(&text) {
                        sink.push(kind, segment, time);
                    }
                }
            }
        }
    })
}

fn set_stage(ctx: &ExecContext, node: &TaskNode, stage: Stage) {
    let now = Utc::now();
    {
        let mut state = node.state.write();
        state.stage = stage;
        match stage {
            Stage::Eval => state.eval_start = Some(now),
            Stage::Build => state.build_start = Some(now),
            Stage::Run => state.run_start = Some(now),
            _ => {}
        }
    }
    tracing::debug!(task = node.name(), %stage, "stage");
    ctx.wiring.emit(&TaskEvent::StageChanged {
        task: node.name().to_string(),
        stage,
        time: now,
    });
}

/// Record a failure on the node and push it to every direct successor
fn fail(ctx: &ExecContext, node: &Arc<TaskNode>, err: Error) {
    let shared = record_failure_inner(ctx, node, err);
    notify_successors(
        ctx,
        node,
        Some(Arc::new(Error::dependency(node.name(), shared))),
    );
}

/// Record a failure without notifying successors (retry path: the original
/// traversal already delivered their reports)
fn record_failure(ctx: &ExecContext, node: &Arc<TaskNode>, err: Error) -> Error {
    let shared = record_failure_inner(ctx, node, err);
    Error::failed(node.name(), shared)
}

fn record_failure_inner(ctx: &ExecContext, node: &Arc<TaskNode>, err: Error) -> Arc<Error> {
    let shared = Arc::new(err);
    {
        let mut state = node.state.write();
        state.stage = Stage::Error;
        state.error = Some(Arc::clone(&shared));
    }
    tracing::error!(task = node.name(), error = %shared, "task failed");
    ctx.wiring.emit(&TaskEvent::Finished {
        task: node.name().to_string(),
        stage: Stage::Error,
        error: Some(shared.to_string()),
        time: Utc::now(),
    });
    shared
}

/// A predecessor failed: never attempt this node's run, propagate the cause
fn cancel(ctx: &ExecContext, node: &Arc<TaskNode>, cause: Arc<Error>) {
    {
        let mut state = node.state.write();
        state.stage = Stage::Cancel;
        state.dependency_error = Some(Arc::clone(&cause));
    }
    tracing::warn!(task = node.name(), cause = %cause, "task cancelled");
    ctx.wiring.emit(&TaskEvent::Finished {
        task: node.name().to_string(),
        stage: Stage::Cancel,
        error: Some(cause.to_string()),
        time: Utc::now(),
    });
    notify_successors(
        ctx,
        node,
        Some(Arc::new(Error::dependency(node.name(), cause))),
    );
}

fn notify_successors(ctx: &ExecContext, node: &TaskNode, failure: Option<Arc<Error>>) {
    for &successor in &node.successors {
        ctx.graph.node(successor).gate.report(failure.clone());
    }
}
