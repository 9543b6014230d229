//! The deployment sequencer: obtains each resource of a plan in order,
//! threading the addresses of earlier resources into later constructors

use alloy::primitives::Address;
use tracing::{error, info, warn};

use crate::{
    abi::{encode_deploy, format_value},
    bindings::{Bindings, Produces, ResolvedArg},
    errors::ScriptError,
    ledger::{Ledger, LedgerError, TxPayload},
    session::Session,
    types::{DeployMode, Mode, ResourceInstance, ResourceSpec, RunReport},
};

/// Executes resource specs one at a time against a session
pub struct Sequencer<'s, L> {
    /// The session every creation is submitted through
    session: &'s mut Session<L>,
}

impl<'s, L: Ledger> Sequencer<'s, L> {
    /// A sequencer submitting through the given session
    pub fn new(session: &'s mut Session<L>) -> Self {
        Self { session }
    }

    /// Obtain every spec in the given order, binding each instance under its
    /// spec name as it is produced.
    ///
    /// The order is the caller's; references are checked against it before
    /// anything is submitted. The run stops at the first failure
    pub async fn run(
        &mut self,
        specs: &[ResourceSpec],
        bindings: &mut Bindings,
    ) -> RunReport<ResourceInstance> {
        let steps = specs.iter().map(|spec| {
            let args = spec.args().iter().collect::<Vec<_>>();
            (spec.name.as_str(), Produces::Instance, args)
        });
        if let Err(e) = bindings.check_order(steps) {
            error!("{e}");
            return RunReport::aborted(e);
        }

        let mut report = RunReport::empty();
        for (step, spec) in specs.iter().enumerate() {
            let result = match bindings.resolve_all(step, &spec.name, spec.args()) {
                Ok(args) => self.deploy(step, spec, &args).await,
                Err(e) => Err(e),
            };

            match result {
                Ok(instance) => {
                    bindings.bind_instance(instance.clone());
                    report.completed.push(instance);
                }
                Err(e) => {
                    error!("{e}");
                    report.failure = Some(e);
                    break;
                }
            }
        }

        report
    }

    /// Obtain a single resource, given its constructor arguments with every
    /// reference already substituted
    pub async fn deploy(
        &mut self,
        step: usize,
        spec: &ResourceSpec,
        args: &[ResolvedArg],
    ) -> Result<ResourceInstance, ScriptError> {
        match &spec.mode {
            Mode::Create { .. } => self.create(step, spec, args).await,
            Mode::Attach { target, probe } => {
                self.probe(spec, *target, probe.as_deref()).await;
                info!("{} attached at {target}", spec.name);

                Ok(ResourceInstance {
                    name: spec.name.clone(),
                    contract: spec.contract.clone(),
                    address: *target,
                    mode: DeployMode::Attach,
                    tx_hash: None,
                })
            }
        }
    }

    /// Submit a creation transaction and wait for the created address
    async fn create(
        &mut self,
        step: usize,
        spec: &ResourceSpec,
        args: &[ResolvedArg],
    ) -> Result<ResourceInstance, ScriptError> {
        let initcode = self
            .session
            .artifact(&spec.contract)
            .and_then(|artifact| encode_deploy(&spec.contract, &artifact, args))
            .map_err(|e| ScriptError::CreationFailed {
                step,
                name: spec.name.clone(),
                reason: e.to_string(),
            })?;

        info!("Deploying {} ({})", spec.name, spec.contract);
        let receipt = self
            .session
            .send(TxPayload::Create(initcode))
            .await
            .map_err(|e| creation_error(step, &spec.name, e))?;

        let address = receipt
            .contract_address
            .ok_or_else(|| ScriptError::CreationFailed {
                step,
                name: spec.name.clone(),
                reason: "receipt carries no contract address".to_string(),
            })?;
        info!("{} deployed to: {address}", spec.name);

        Ok(ResourceInstance {
            name: spec.name.clone(),
            contract: spec.contract.clone(),
            address,
            mode: DeployMode::Create,
            tx_hash: Some(receipt.tx_hash),
        })
    }

    /// Best-effort diagnostics for an attached address, failures are only logged
    async fn probe(&mut self, spec: &ResourceSpec, target: Address, function: Option<&str>) {
        match self.session.ledger().code_at(target).await {
            Ok(code) if code.is_empty() => {
                warn!("{}: no contract code at {target}", spec.name)
            }
            Ok(_) => {}
            Err(e) => warn!("{}: could not read code at {target}: {e}", spec.name),
        }

        let Some(function) = function else {
            return;
        };
        match self.session.read(&spec.contract, target, function, &[]).await {
            Ok(outputs) => {
                for (_, value) in outputs {
                    info!("{}.{function}(): {}", spec.name, format_value(&value));
                }
            }
            Err(e) => warn!("{}.{function}() probe failed: {e}", spec.name),
        }
    }
}

/// Attach the step's context to a failed creation
fn creation_error(step: usize, name: &str, err: LedgerError) -> ScriptError {
    match err {
        LedgerError::Timeout { blocks_waited } => ScriptError::ConfirmationTimeout {
            step,
            name: name.to_string(),
            blocks_waited,
        },
        other => ScriptError::CreationFailed {
            step,
            name: name.to_string(),
            reason: other.to_string(),
        },
    }
}
