//! The signer, ledger connection, and artifacts shared by every step of a run

use std::sync::Arc;

use alloy::{
    dyn_abi::DynSolValue,
    primitives::{utils::format_ether, Address},
};
use tracing::info;

use crate::{
    abi::{decode_output, encode_call},
    artifacts::{ArtifactStore, ContractArtifact},
    bindings::ResolvedArg,
    errors::ScriptError,
    ledger::{Ledger, LedgerError, LedgerReceipt, TxPayload},
    transactions::send_tx,
    types::{ActorIdentity, ConfirmationPolicy},
};

/// Resolve the identity every transaction of the run will be submitted from
pub async fn resolve_identity<L: Ledger>(ledger: &L) -> Result<ActorIdentity, ScriptError> {
    let address = ledger
        .signer_address()
        .ok_or(ScriptError::IdentityUnavailable)?;
    let balance = ledger
        .balance(address)
        .await
        .map_err(|e| ScriptError::ClientInitialization(e.to_string()))?;

    info!("Deployer: {address}");
    info!("Balance of deployer: {} ETH", format_ether(balance));

    Ok(ActorIdentity { address, balance })
}

/// A single run's connection to the ledger.
///
/// The session owns the ledger, so every submission of the run goes through
/// `&mut Session` and is strictly ordered
pub struct Session<L> {
    /// The ledger connection
    ledger: L,
    /// The identity submissions are made from
    identity: ActorIdentity,
    /// How submissions are confirmed
    policy: ConfirmationPolicy,
    /// The compiled artifacts of the contracts involved
    artifacts: ArtifactStore,
}

impl<L: Ledger> Session<L> {
    /// Resolve the signer identity and open a session
    pub async fn open(
        ledger: L,
        artifacts: ArtifactStore,
        policy: ConfirmationPolicy,
    ) -> Result<Self, ScriptError> {
        let identity = resolve_identity(&ledger).await?;
        Ok(Self {
            ledger,
            identity,
            policy,
            artifacts,
        })
    }

    /// The identity submissions are made from
    pub fn identity(&self) -> &ActorIdentity {
        &self.identity
    }

    /// The underlying ledger
    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    /// The artifact of the given contract
    pub fn artifact(&mut self, contract: &str) -> Result<Arc<ContractArtifact>, ScriptError> {
        self.artifacts.load(contract)
    }

    /// Submit a transaction and wait for it to be confirmed
    pub async fn send(&mut self, payload: TxPayload) -> Result<LedgerReceipt, LedgerError> {
        send_tx(&mut self.ledger, payload, &self.policy).await
    }

    /// Call a view function of the contract at `to`, decoding its outputs
    pub async fn read(
        &mut self,
        contract: &str,
        to: Address,
        function: &str,
        args: &[ResolvedArg],
    ) -> Result<Vec<(String, DynSolValue)>, String> {
        let artifact = self.artifact(contract).map_err(|e| e.to_string())?;
        let (function, calldata) =
            encode_call(&artifact.abi, function, args).map_err(|e| e.to_string())?;
        let data = self
            .ledger
            .call(to, calldata)
            .await
            .map_err(|e| e.to_string())?;

        decode_output(function, &data)
    }
}
