//! Definitions of CLI arguments and commands for the bootstrap scripts

use std::{path::PathBuf, time::Duration};

use clap::{Args, Parser, Subcommand};

use crate::{
    commands::{bootstrap, deploy, identity},
    constants::{
        DEFAULT_ARTIFACTS_DIR, DEFAULT_CONFIRMATIONS, DEFAULT_POLL_INTERVAL_MS,
        DEFAULT_RPC_URL, DEFAULT_STALL_POLLS, DEFAULT_TIMEOUT_BLOCKS,
    },
    errors::ScriptError,
    ledger::RpcLedger,
    types::ConfirmationPolicy,
};

/// Deploy and configure contracts from a plan file
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Private key of the deployer
    #[arg(short, long, env = "PKEY")]
    pub priv_key: Option<String>,

    /// Network RPC URL
    #[arg(short, long, env = "RPC_URL", default_value = DEFAULT_RPC_URL)]
    pub rpc_url: String,

    /// Directory searched for compiled contract artifacts
    #[arg(short, long, default_value = DEFAULT_ARTIFACTS_DIR)]
    pub artifacts: PathBuf,

    /// Number of blocks a receipt must be buried under before it is accepted
    #[arg(long, default_value_t = DEFAULT_CONFIRMATIONS)]
    pub confirmations: u64,

    /// Number of blocks to wait for a receipt before giving up
    #[arg(long, default_value_t = DEFAULT_TIMEOUT_BLOCKS)]
    pub timeout_blocks: u64,

    /// Consecutive polls without a new block after which the chain head is
    /// considered stalled
    #[arg(long, default_value_t = DEFAULT_STALL_POLLS)]
    pub stall_polls: u64,

    /// Milliseconds between polls of the node while awaiting a receipt
    #[arg(long, default_value_t = DEFAULT_POLL_INTERVAL_MS)]
    pub poll_interval_ms: u64,

    /// The script to run
    #[command(subcommand)]
    pub command: Command,
}

impl Cli {
    /// The confirmation policy configured on the command line
    pub fn confirmation_policy(&self) -> ConfirmationPolicy {
        ConfirmationPolicy {
            confirmations: self.confirmations,
            timeout_blocks: self.timeout_blocks,
            stall_polls: self.stall_polls,
            poll_interval: Duration::from_millis(self.poll_interval_ms),
        }
    }
}

/// The scripts that can be run
#[derive(Subcommand)]
pub enum Command {
    /// Print the deployer's address and balance
    Identity,
    /// Obtain the resources of a plan, ignoring its calls
    Deploy(DeployArgs),
    /// Obtain the resources of a plan, then make its configuration calls
    Bootstrap(BootstrapArgs),
}

impl Command {
    /// Run the command against the given ledger
    pub async fn run(
        self,
        ledger: RpcLedger,
        artifacts: PathBuf,
        policy: ConfirmationPolicy,
    ) -> Result<(), ScriptError> {
        match self {
            Command::Identity => identity(ledger).await,
            Command::Deploy(args) => deploy(args, ledger, artifacts, policy).await,
            Command::Bootstrap(args) => bootstrap(args, ledger, artifacts, policy).await,
        }
    }
}

/// Deploy the resources of a plan
#[derive(Args)]
pub struct DeployArgs {
    /// Path to the plan file
    #[arg(long)]
    pub plan: PathBuf,

    /// Path to which a JSON report of the obtained addresses is written
    #[arg(long)]
    pub report: Option<PathBuf>,
}

/// Deploy the resources of a plan and make its configuration calls
#[derive(Args)]
pub struct BootstrapArgs {
    /// Path to the plan file
    #[arg(long)]
    pub plan: PathBuf,

    /// Path to which a JSON report of the addresses and call results is written
    #[arg(long)]
    pub report: Option<PathBuf>,
}
