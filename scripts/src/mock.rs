//! An in-memory ledger for testing the sequencer and invoker

use std::{cell::Cell, collections::HashMap, time::Duration};

use alloy::{
    json_abi::JsonAbi,
    primitives::{address, keccak256, Address, Bytes, Log, LogData, TxHash, U256},
};

use crate::{
    artifacts::{ArtifactStore, ContractArtifact},
    ledger::{Ledger, LedgerError, LedgerReceipt, TxPayload},
    session::Session,
    types::ConfirmationPolicy,
};

/// A fault injected into a submission
#[derive(Clone, Debug)]
enum Fault {
    /// The node refuses the transaction
    Reject(String),
    /// The transaction is mined with a failure status
    Revert,
    /// The transaction is accepted but never mined
    NeverMine,
}

/// A transaction accepted by the mock
#[derive(Clone, Debug)]
pub struct Submission {
    /// The transaction hash
    pub tx_hash: TxHash,
    /// The signer nonce the transaction was sent with
    pub nonce: u64,
    /// The transaction itself
    pub payload: TxPayload,
}

/// A ledger that mines every accepted transaction in the block after submission.
///
/// The chain head advances by one block every time it is queried, unless the
/// mock is set to automine, in which case blocks are only mined on submission
pub struct MockLedger {
    /// The signer, if any
    signer: Option<Address>,
    /// The signer's balance
    balance: U256,
    /// The current chain head
    head: Cell<u64>,
    /// Whether blocks are only mined when a transaction is submitted
    automine: bool,
    /// The number of submissions attempted so far, accepted or not
    attempts: usize,
    /// Faults by submission attempt
    faults: HashMap<usize, Fault>,
    /// Accepted submissions, in order
    submissions: Vec<Submission>,
    /// Receipts by transaction hash, withheld for transactions that never mine
    receipts: HashMap<TxHash, LedgerReceipt>,
    /// Code deployed at each address
    code: HashMap<Address, Bytes>,
    /// Logs emitted by calls, by function selector
    call_logs: HashMap<[u8; 4], Vec<LogData>>,
    /// Return data of view calls, by function selector
    view_returns: HashMap<[u8; 4], Bytes>,
}

impl MockLedger {
    /// A mock with a funded signer
    pub fn new() -> Self {
        Self {
            signer: Some(Address::repeat_byte(0xde)),
            balance: U256::from(10).pow(U256::from(18)),
            head: Cell::new(100),
            automine: false,
            attempts: 0,
            faults: HashMap::new(),
            submissions: Vec::new(),
            receipts: HashMap::new(),
            code: HashMap::new(),
            call_logs: HashMap::new(),
            view_returns: HashMap::new(),
        }
    }

    /// A mock without any signer configured
    pub fn without_signer() -> Self {
        Self {
            signer: None,
            ..Self::new()
        }
    }

    /// A mock that mines a block per submission and none otherwise, like a
    /// local development node
    pub fn automine() -> Self {
        Self {
            automine: true,
            ..Self::new()
        }
    }

    /// Reject the `n`th submission attempt with the given reason
    pub fn reject(&mut self, n: usize, reason: &str) {
        self.faults.insert(n, Fault::Reject(reason.to_string()));
    }

    /// Mine the `n`th submission attempt with a failure status
    pub fn revert(&mut self, n: usize) {
        self.faults.insert(n, Fault::Revert);
    }

    /// Accept the `n`th submission attempt but never mine it
    pub fn never_mine(&mut self, n: usize) {
        self.faults.insert(n, Fault::NeverMine);
    }

    /// Emit the given logs whenever a function with the given selector is called
    pub fn on_call(&mut self, selector: [u8; 4], logs: Vec<LogData>) {
        self.call_logs.insert(selector, logs);
    }

    /// Return the given data whenever a view function with the given selector is called
    pub fn on_view(&mut self, selector: [u8; 4], ret: Bytes) {
        self.view_returns.insert(selector, ret);
    }

    /// Place code at the given address
    pub fn set_code(&mut self, address: Address, code: Bytes) {
        self.code.insert(address, code);
    }

    /// The accepted submissions, in order
    pub fn submissions(&self) -> &[Submission] {
        &self.submissions
    }

    /// The current chain head, without advancing it
    pub fn head(&self) -> u64 {
        self.head.get()
    }
}

impl Ledger for MockLedger {
    fn signer_address(&self) -> Option<Address> {
        self.signer
    }

    async fn balance(&self, _address: Address) -> Result<U256, LedgerError> {
        Ok(self.balance)
    }

    async fn code_at(&self, address: Address) -> Result<Bytes, LedgerError> {
        Ok(self.code.get(&address).cloned().unwrap_or_default())
    }

    async fn block_number(&self) -> Result<u64, LedgerError> {
        if !self.automine {
            self.head.set(self.head.get() + 1);
        }
        Ok(self.head.get())
    }

    async fn submit(&mut self, payload: TxPayload) -> Result<TxHash, LedgerError> {
        let attempt = self.attempts;
        self.attempts += 1;

        let fault = self.faults.get(&attempt).cloned();
        if let Some(Fault::Reject(reason)) = &fault {
            return Err(LedgerError::Rejected(reason.clone()));
        }
        let signer = self
            .signer
            .ok_or_else(|| LedgerError::Rejected("no signer configured".to_string()))?;

        let nonce = self.submissions.len() as u64;
        let tx_hash = keccak256([signer.as_slice(), &nonce.to_be_bytes()[..]].concat());
        let status = !matches!(fault, Some(Fault::Revert));

        let (contract_address, logs) = match &payload {
            TxPayload::Create(initcode) => {
                let address = signer.create(nonce);
                if status {
                    self.code.insert(address, initcode.clone());
                }
                (Some(address), Vec::new())
            }
            TxPayload::Call { to, data } => {
                let logs = data
                    .get(..4)
                    .and_then(|sel| self.call_logs.get(sel))
                    .cloned()
                    .unwrap_or_default()
                    .into_iter()
                    .map(|data| Log { address: *to, data })
                    .collect();
                (None, logs)
            }
        };

        if !matches!(fault, Some(Fault::NeverMine)) {
            let block_number = self.head.get() + 1;
            if self.automine {
                self.head.set(block_number);
            }

            let receipt = LedgerReceipt {
                tx_hash,
                status,
                block_number,
                contract_address: if status { contract_address } else { None },
                logs: if status { logs } else { Vec::new() },
            };
            self.receipts.insert(tx_hash, receipt);
        }

        self.submissions.push(Submission {
            tx_hash,
            nonce,
            payload,
        });
        Ok(tx_hash)
    }

    async fn receipt(&self, tx_hash: TxHash) -> Result<Option<LedgerReceipt>, LedgerError> {
        Ok(self
            .receipts
            .get(&tx_hash)
            .filter(|receipt| receipt.block_number <= self.head.get())
            .cloned())
    }

    async fn call(&self, _to: Address, data: Bytes) -> Result<Bytes, LedgerError> {
        data.get(..4)
            .and_then(|sel| self.view_returns.get(sel))
            .cloned()
            .ok_or_else(|| LedgerError::Rejected("execution reverted".to_string()))
    }
}

/// The address the test registry contract is attached at
pub const REGISTRY_ADDRESS: Address = address!("6f48c09d171f1526bf88fa718bbe87e307e03eaf");

/// An artifact store holding the test contracts:
/// - `A`, without a constructor
/// - `B`, whose constructor takes an address
/// - `CompoundRegistry`, the registry the configuration calls are made against
pub fn test_artifacts() -> ArtifactStore {
    let mut store = ArtifactStore::in_memory();
    store.insert(
        "A",
        ContractArtifact::new(JsonAbi::new(), Some(Bytes::from_static(&[0x60, 0x01]))),
    );
    store.insert(
        "B",
        ContractArtifact::new(
            JsonAbi::parse(["constructor(address a)"]).unwrap(),
            Some(Bytes::from_static(&[0x60, 0x02])),
        ),
    );
    store.insert(
        "CompoundRegistry",
        ContractArtifact::new(
            JsonAbi::parse([
                "function owner() view returns (address)",
                "function addMapping(address key, address value)",
                "function getMapping(address key) view returns (address)",
                "event MappingAdded(address key, address value)",
                "event OwnershipTransferred(address indexed previousOwner, address indexed newOwner)",
            ])
            .unwrap(),
            Some(Bytes::from_static(&[0x60, 0x03])),
        ),
    );
    store
}

/// A confirmation policy that never sleeps
pub fn test_policy() -> ConfirmationPolicy {
    ConfirmationPolicy {
        confirmations: 1,
        timeout_blocks: 10,
        stall_polls: 3,
        poll_interval: Duration::ZERO,
    }
}

/// Open a session over the given mock with the test artifacts
pub async fn test_session(ledger: MockLedger) -> Session<MockLedger> {
    Session::open(ledger, test_artifacts(), test_policy())
        .await
        .unwrap()
}
