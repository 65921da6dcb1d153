mod list;
mod run;

use clap::Subcommand;

pub use list::ListArgs;
pub use run::RunArgs;

#[derive(Subcommand)]
pub enum Commands {
    /// Execute the given task and its dependencies
    Run(RunArgs),
    /// Show a list of available tasks
    List(ListArgs),
}

impl Commands {
    pub async fn execute(self) -> eyre::Result<()> {
        match self {
            Commands::Run(args) => run::execute(args).await,
            Commands::List(args) => list::execute(args).await,
        }
    }
}
