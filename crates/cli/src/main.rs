use clap::Parser;

mod commands;

use commands::Commands;

#[derive(Parser)]
#[command(name = "dagrun")]
#[command(about = "Run a task and its dependency graph through nix", long_about = None)]
#[command(version)]
struct Cli {
    /// one of trace,debug,info,warn,error
    #[arg(long, env = dagrun_core::LOG_LEVEL_VAR, default_value = "info", global = true)]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_new(&cli.log_level)
        .map_err(|e| eyre::eyre!("setting log level: {e}"))?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    cli.command.execute().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_args_are_consistent() {
        Cli::command().debug_assert();
    }
}
