//! Definitions of errors that can occur during the execution of the bootstrap scripts

use std::{
    error::Error,
    fmt::{self, Display, Formatter},
};

/// Errors that can occur during the execution of the bootstrap scripts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptError {
    /// The ledger connection exposes no usable signer
    IdentityUnavailable,
    /// A creation transaction could not be built, was rejected or reverted,
    /// or produced no address
    CreationFailed {
        /// The position of the failed step in the plan
        step: usize,
        /// The name of the resource being created
        name: String,
        /// The underlying reason reported by the ledger
        reason: String,
    },
    /// A configuration call could not be built, was rejected, or reverted
    CallFailed {
        /// The position of the failed step in the plan
        step: usize,
        /// The name of the configuration call
        name: String,
        /// The underlying reason reported by the ledger
        reason: String,
    },
    /// A call was confirmed, but its receipt did not carry the expected event
    UnexpectedReceiptShape {
        /// The position of the failed step in the plan
        step: usize,
        /// The name of the configuration call
        name: String,
        /// The event the call was expected to emit, if one was configured
        expected: Option<String>,
        /// The names of the events actually decoded from the receipt
        found: Vec<String>,
    },
    /// No confirmed receipt was observed within the configured block bound
    ConfirmationTimeout {
        /// The position of the failed step in the plan
        step: usize,
        /// The name of the resource or call being confirmed
        name: String,
        /// The number of blocks mined while waiting
        blocks_waited: u64,
    },
    /// A reference names a resource or call that has not been resolved yet
    InvalidReference {
        /// The position of the offending step in the plan
        step: usize,
        /// The name of the offending step
        name: String,
        /// The unresolved reference
        reference: String,
    },
    /// Error reading or parsing the plan file
    ReadPlan(String),
    /// Error loading a compiled contract artifact
    ArtifactLoading(String),
    /// Error initializing the RPC client
    ClientInitialization(String),
    /// Error constructing calldata for a constructor or contract method
    CalldataConstruction(String),
    /// Error writing the run report
    WriteReport(String),
}

impl Display for ScriptError {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            ScriptError::IdentityUnavailable => write!(f, "no usable signer identity"),
            ScriptError::CreationFailed { step, name, reason } => {
                write!(f, "step {step} (`{name}`): creation failed: {reason}")
            }
            ScriptError::CallFailed { step, name, reason } => {
                write!(f, "step {step} (`{name}`): call failed: {reason}")
            }
            ScriptError::UnexpectedReceiptShape {
                step,
                name,
                expected,
                found,
            } => write!(
                f,
                "step {step} (`{name}`): expected event {} in receipt, found [{}]",
                expected.as_deref().unwrap_or("<any>"),
                found.join(", ")
            ),
            ScriptError::ConfirmationTimeout {
                step,
                name,
                blocks_waited,
            } => write!(
                f,
                "step {step} (`{name}`): gave up waiting for confirmation after {blocks_waited} blocks"
            ),
            ScriptError::InvalidReference {
                step,
                name,
                reference,
            } => write!(
                f,
                "step {step} (`{name}`): reference to unresolved `{reference}`"
            ),
            ScriptError::ReadPlan(s) => write!(f, "error reading plan: {}", s),
            ScriptError::ArtifactLoading(s) => write!(f, "error loading artifact: {}", s),
            ScriptError::ClientInitialization(s) => write!(f, "error initializing client: {}", s),
            ScriptError::CalldataConstruction(s) => write!(f, "error constructing calldata: {}", s),
            ScriptError::WriteReport(s) => write!(f, "error writing report: {}", s),
        }
    }
}

impl Error for ScriptError {}
