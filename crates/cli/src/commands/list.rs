use clap::Args;
use dagrun_core::{DAG_FLAKE_VAR, DEFAULT_DAG_FLAKE, DEFAULT_TASK_FLAKE};
use dagrun_task::{BuildBackend, NixBackend};

#[derive(Args)]
pub struct ListArgs {
    /// Flake attribute evaluating to the dependency description
    #[arg(long, env = DAG_FLAKE_VAR, default_value = DEFAULT_DAG_FLAKE)]
    pub dag_flake: String,
}

pub async fn execute(args: ListArgs) -> eyre::Result<()> {
    let backend = NixBackend::new(DEFAULT_TASK_FLAKE);
    let description = backend.dag(&args.dag_flake).await?;

    let mut names: Vec<&String> = description.keys().collect();
    names.sort();

    for name in names {
        match description.get(name) {
            Some(dependencies) if !dependencies.is_empty() => {
                println!("{name} <- {}", dependencies.join(" "));
            }
            _ => println!("{name}"),
        }
    }

    Ok(())
}
