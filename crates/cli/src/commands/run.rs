use clap::Args;
use dagrun_core::{
    ExecutionMode, RunSpec, DAG_FLAKE_VAR, DEFAULT_DAG_FLAKE, DEFAULT_RUNTIME,
    DEFAULT_TASK_FLAKE, MODE_VAR, RUNTIME_VAR, RUN_SPEC_VAR, TASK_FLAKE_VAR,
};
use dagrun_task::{GraphRunner, NixBackend, RunnerOptions, TaskGraph, TaskSnapshot};
use std::sync::Arc;

#[derive(Args)]
pub struct RunArgs {
    /// Task to execute
    pub task: String,

    /// one of interactive,verbose,passthrough,machine
    #[arg(long, env = MODE_VAR, default_value = "interactive")]
    pub mode: String,

    /// Runtime variant the task artifacts are built for
    #[arg(long, env = RUNTIME_VAR, default_value = DEFAULT_RUNTIME)]
    pub runtime: String,

    /// Flake attribute evaluating to the dependency description
    #[arg(long, env = DAG_FLAKE_VAR, default_value = DEFAULT_DAG_FLAKE)]
    pub dag_flake: String,

    /// Flake attribute with the per-task build expressions
    #[arg(long, env = TASK_FLAKE_VAR, default_value = DEFAULT_TASK_FLAKE)]
    pub task_flake: String,

    /// used internally. Start with @ to read from a file.
    #[arg(long, env = RUN_SPEC_VAR)]
    pub run_spec: Option<String>,
}

pub async fn execute(args: RunArgs) -> eyre::Result<()> {
    let mode: ExecutionMode = args.mode.parse()?;
    let run_spec = args
        .run_spec
        .as_deref()
        .map(RunSpec::from_arg)
        .transpose()?;

    let options = RunnerOptions {
        mode,
        runtime: args.runtime,
        dag_flake: args.dag_flake,
        run_spec,
    };
    let backend = Arc::new(NixBackend::new(args.task_flake));

    let mut runner = GraphRunner::new(&args.task, options, backend).await?;
    runner.prepare(&args.task)?;

    // forward an interrupt to every running task's process group
    let graph = Arc::clone(runner.graph());
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received, terminating running tasks");
            graph.terminate_all();
        }
    });

    let outcome = runner.start().await;

    if mode == ExecutionMode::Interactive {
        print_summary(runner.graph());
    }

    outcome?;
    tracing::debug!("done");
    Ok(())
}

/// Final per-task report for interactive runs, read from the presentation
/// surface only.
fn print_summary(graph: &TaskGraph) {
    for snapshot in graph.snapshots() {
        println!("{}", render_line(&snapshot));

        if snapshot.outcome_error().is_some() {
            if let Some(node) = graph.get(&snapshot.name) {
                for line in node.log().tail(20) {
                    println!("    {}", line.text);
                }
            }
        }
    }
}

fn render_line(snapshot: &TaskSnapshot) -> String {
    let mut rendered = format!("{} {}", snapshot.name, snapshot.stage);

    if let (Some(start), Some(end)) = (snapshot.run_start, snapshot.run_end) {
        let elapsed = (end - start).num_milliseconds().max(0);
        rendered.push_str(&format!(" ({}.{:03}s)", elapsed / 1000, elapsed % 1000));
    }
    if let Some(usage) = snapshot.usage {
        rendered.push_str(&format!(" (max RSS: {} KiB)", usage.max_rss_kib));
    }
    if let Some(err) = snapshot.outcome_error() {
        rendered.push_str(&format!("\n    error: {err}"));
    }

    rendered
}
