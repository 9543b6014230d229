//! The connection to the remote ledger that transactions are submitted to

use std::{
    fmt::{self, Display, Formatter},
    str::FromStr,
};

use alloy::{
    network::{Ethereum, TransactionBuilder},
    primitives::{Address, Bytes, Log, TxHash, U256},
    providers::{DynProvider, Provider, ProviderBuilder},
    rpc::types::{TransactionReceipt, TransactionRequest},
    signers::local::PrivateKeySigner,
    transports::{http::reqwest::Url, RpcError, TransportErrorKind},
};

use crate::errors::ScriptError;

/// Errors reported by the ledger for a single request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerError {
    /// The node refused the transaction, e.g. for lack of funds or a nonce conflict
    Rejected(String),
    /// The transaction was mined with a failure status
    Reverted(TxHash),
    /// No confirmed receipt was observed within the block bound
    Timeout {
        /// The number of blocks mined while waiting
        blocks_waited: u64,
    },
    /// The node could not be reached or returned a malformed response
    Transport(String),
}

impl Display for LedgerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::Rejected(s) => write!(f, "{}", s),
            LedgerError::Reverted(hash) => write!(f, "transaction {hash:#x} reverted"),
            LedgerError::Timeout { blocks_waited } => {
                write!(f, "no confirmation after {blocks_waited} blocks")
            }
            LedgerError::Transport(s) => write!(f, "transport error: {}", s),
        }
    }
}

impl From<RpcError<TransportErrorKind>> for LedgerError {
    fn from(err: RpcError<TransportErrorKind>) -> Self {
        match err {
            RpcError::ErrorResp(payload) => LedgerError::Rejected(payload.message.to_string()),
            other => LedgerError::Transport(other.to_string()),
        }
    }
}

/// The parts of a transaction receipt the scripts act on
#[derive(Clone, Debug, PartialEq)]
pub struct LedgerReceipt {
    /// The hash of the transaction
    pub tx_hash: TxHash,
    /// Whether the transaction executed successfully
    pub status: bool,
    /// The block the transaction was included in
    pub block_number: u64,
    /// The address of the contract created by the transaction, if any
    pub contract_address: Option<Address>,
    /// The logs emitted by the transaction, in order
    pub logs: Vec<Log>,
}

impl From<TransactionReceipt> for LedgerReceipt {
    fn from(receipt: TransactionReceipt) -> Self {
        Self {
            tx_hash: receipt.transaction_hash,
            status: receipt.status(),
            block_number: receipt.block_number.unwrap_or_default(),
            contract_address: receipt.contract_address,
            logs: receipt.inner.logs().iter().map(|log| log.inner.clone()).collect(),
        }
    }
}

/// A transaction to submit from the signer
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxPayload {
    /// Create a contract from the given initcode (bytecode followed by constructor args)
    Create(Bytes),
    /// Call the contract at the given address with the given calldata
    Call {
        /// The contract called
        to: Address,
        /// The ABI-encoded calldata
        data: Bytes,
    },
}

/// The operations the scripts need from a ledger.
///
/// Submission is the only operation that takes `&mut self`: it advances the
/// signer's nonce, so holding the ledger mutably serializes every submission
/// of a run
#[allow(async_fn_in_trait)]
pub trait Ledger {
    /// The address of the signer submissions are made from, if one is configured
    fn signer_address(&self) -> Option<Address>;

    /// The native balance of the given address
    async fn balance(&self, address: Address) -> Result<U256, LedgerError>;

    /// The code deployed at the given address
    async fn code_at(&self, address: Address) -> Result<Bytes, LedgerError>;

    /// The number of the most recent block
    async fn block_number(&self) -> Result<u64, LedgerError>;

    /// Sign and broadcast a transaction, returning its hash once the node accepts it
    async fn submit(&mut self, payload: TxPayload) -> Result<TxHash, LedgerError>;

    /// The receipt of the given transaction, if it has been mined
    async fn receipt(&self, tx_hash: TxHash) -> Result<Option<LedgerReceipt>, LedgerError>;

    /// Execute a read-only call against the latest state
    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, LedgerError>;
}

/// A ledger backed by an alloy HTTP provider with a local private key wallet
#[derive(Clone)]
pub struct RpcLedger {
    /// The provider, with the wallet and nonce management attached
    provider: DynProvider<Ethereum>,
    /// The address of the wallet, if a private key was given
    signer: Option<Address>,
}

impl RpcLedger {
    /// Connect to the node at the given URL, signing with the given private key if any
    pub fn connect(priv_key: Option<&str>, rpc_url: &str) -> Result<Self, ScriptError> {
        let url =
            Url::parse(rpc_url).map_err(|e| ScriptError::ClientInitialization(e.to_string()))?;

        let Some(priv_key) = priv_key.filter(|k| !k.trim().is_empty()) else {
            let provider = ProviderBuilder::new().connect_http(url);
            return Ok(Self {
                provider: DynProvider::new(provider),
                signer: None,
            });
        };

        let signer = PrivateKeySigner::from_str(priv_key.trim())
            .map_err(|e| ScriptError::ClientInitialization(e.to_string()))?;
        let address = signer.address();
        let provider = ProviderBuilder::new()
            .wallet(signer)
            .with_simple_nonce_management()
            .connect_http(url);

        Ok(Self {
            provider: DynProvider::new(provider),
            signer: Some(address),
        })
    }
}

impl Ledger for RpcLedger {
    fn signer_address(&self) -> Option<Address> {
        self.signer
    }

    async fn balance(&self, address: Address) -> Result<U256, LedgerError> {
        Ok(self.provider.get_balance(address).await?)
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, LedgerError> {
        Ok(self.provider.get_code_at(address).await?)
    }

    async fn block_number(&self) -> Result<u64, LedgerError> {
        Ok(self.provider.get_block_number().await?)
    }

    async fn submit(&mut self, payload: TxPayload) -> Result<TxHash, LedgerError> {
        let from = self
            .signer
            .ok_or_else(|| LedgerError::Rejected("no signer configured".to_string()))?;

        let tx = match payload {
            TxPayload::Create(initcode) => TransactionRequest::default()
                .with_from(from)
                .with_deploy_code(initcode),
            TxPayload::Call { to, data } => TransactionRequest::default()
                .with_from(from)
                .with_to(to)
                .with_input(data),
        };

        let pending = self.provider.send_transaction(tx).await?;
        Ok(*pending.tx_hash())
    }

    async fn receipt(&self, tx_hash: TxHash) -> Result<Option<LedgerReceipt>, LedgerError> {
        let receipt = self.provider.get_transaction_receipt(tx_hash).await?;
        Ok(receipt.map(LedgerReceipt::from))
    }

    async fn call(&self, to: Address, data: Bytes) -> Result<Bytes, LedgerError> {
        let mut tx = TransactionRequest::default().with_to(to).with_input(data);
        if let Some(from) = self.signer {
            tx = tx.with_from(from);
        }

        Ok(self.provider.call(tx).await?)
    }
}
