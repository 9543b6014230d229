use bootstrap_scripts::{cli::Cli, errors::ScriptError, utils::setup_client};
use clap::Parser;
use tracing::error;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), ScriptError> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().pretty().with_env_filter(filter).init();

    let policy = cli.confirmation_policy();
    let Cli {
        priv_key,
        rpc_url,
        artifacts,
        command,
        ..
    } = cli;

    let ledger = setup_client(priv_key.as_deref(), &rpc_url)?;
    command
        .run(ledger, artifacts, policy)
        .await
        .inspect_err(|e| error!("{e}"))
}
