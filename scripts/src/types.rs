//! Type definitions used throughout the scripts

use std::{collections::BTreeMap, time::Duration};

use alloy::{
    dyn_abi::DynSolValue,
    primitives::{Address, TxHash, U256},
};
use serde::{Deserialize, Serialize};

use crate::{
    constants::{
        DEFAULT_CONFIRMATIONS, DEFAULT_POLL_INTERVAL_MS, DEFAULT_STALL_POLLS,
        DEFAULT_TIMEOUT_BLOCKS,
    },
    errors::ScriptError,
};

// ---------
// | Plans |
// ---------

/// An argument to a constructor or contract method, as written in a plan.
///
/// A reference is written `{"ref": "<name>"}` or `{"ref": "<name>", "field": "<field>"}`,
/// anything else is a literal which is coerced to the parameter's Solidity type
/// once the target ABI is known. Objects are only accepted as references.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(try_from = "RawArgValue")]
pub enum ArgValue {
    /// A reference to the result of an earlier resource or call
    Ref {
        /// The name of the referenced resource or call
        target: String,
        /// The decoded field to select from a call result
        field: Option<String>,
    },
    /// A literal value
    Literal(serde_json::Value),
}

/// An argument as it appears in the plan file
#[derive(Deserialize)]
#[serde(untagged)]
enum RawArgValue {
    /// A well-formed reference
    Ref(RawRef),
    /// Anything else
    Literal(serde_json::Value),
}

/// A reference as it appears in the plan file
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawRef {
    /// The referenced name
    #[serde(rename = "ref")]
    target: String,
    /// The selected field, if any
    #[serde(default)]
    field: Option<String>,
}

impl TryFrom<RawArgValue> for ArgValue {
    type Error = String;

    fn try_from(raw: RawArgValue) -> Result<Self, Self::Error> {
        match raw {
            RawArgValue::Ref(RawRef { target, field }) => Ok(ArgValue::Ref { target, field }),
            RawArgValue::Literal(serde_json::Value::Object(object)) => {
                let keys = object.keys().map(String::as_str).collect::<Vec<_>>().join(", ");
                Err(format!(
                    "malformed reference {{{keys}}}, expected `ref` and an optional `field`"
                ))
            }
            RawArgValue::Literal(value) => Ok(ArgValue::Literal(value)),
        }
    }
}

impl ArgValue {
    /// A literal argument
    pub fn literal(value: impl Into<serde_json::Value>) -> Self {
        ArgValue::Literal(value.into())
    }

    /// A reference to the result of the named resource or call
    pub fn reference(target: &str) -> Self {
        ArgValue::Ref {
            target: target.to_string(),
            field: None,
        }
    }

    /// A reference to a field of the named call's result
    pub fn field(target: &str, field: &str) -> Self {
        ArgValue::Ref {
            target: target.to_string(),
            field: Some(field.to_string()),
        }
    }

    /// The name this argument refers to, if it is a reference
    pub fn referenced_name(&self) -> Option<&str> {
        match self {
            ArgValue::Ref { target, .. } => Some(target),
            ArgValue::Literal(_) => None,
        }
    }
}

/// How a resource is obtained
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeployMode {
    /// Submit a creation transaction for a fresh instance
    Create,
    /// Reuse an instance that already exists at a known address
    Attach,
}

/// The mode of a resource along with the data that mode requires
#[derive(Clone, Debug, PartialEq)]
pub enum Mode {
    /// Deploy a fresh instance with the given constructor arguments
    Create {
        /// The constructor arguments
        args: Vec<ArgValue>,
    },
    /// Attach to an existing instance
    Attach {
        /// The address of the existing instance
        target: Address,
        /// A zero-argument view function read for diagnostics after attaching
        probe: Option<String>,
    },
}

/// A resource specification as it appears in the plan file
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawResourceSpec {
    name: String,
    #[serde(default)]
    contract: Option<String>,
    mode: DeployMode,
    #[serde(default)]
    target: Option<Address>,
    #[serde(default)]
    args: Vec<ArgValue>,
    #[serde(default)]
    probe: Option<String>,
}

/// A named contract instance to obtain, either by creation or by attaching
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(try_from = "RawResourceSpec")]
pub struct ResourceSpec {
    /// The symbolic name other steps use to refer to this resource
    pub name: String,
    /// The name of the compiled artifact describing the contract
    pub contract: String,
    /// How the resource is obtained
    pub mode: Mode,
}

impl ResourceSpec {
    /// A spec deploying a fresh instance of the contract of the same name
    pub fn create(name: &str, args: Vec<ArgValue>) -> Self {
        Self {
            name: name.to_string(),
            contract: name.to_string(),
            mode: Mode::Create { args },
        }
    }

    /// A spec attaching to an existing instance of the contract of the same name
    pub fn attach(name: &str, target: Address) -> Self {
        Self {
            name: name.to_string(),
            contract: name.to_string(),
            mode: Mode::Attach {
                target,
                probe: None,
            },
        }
    }

    /// Use the artifact of the given contract rather than the one named after the spec
    pub fn with_contract(mut self, contract: &str) -> Self {
        self.contract = contract.to_string();
        self
    }

    /// The mode flag of the spec
    pub fn deploy_mode(&self) -> DeployMode {
        match self.mode {
            Mode::Create { .. } => DeployMode::Create,
            Mode::Attach { .. } => DeployMode::Attach,
        }
    }

    /// The constructor arguments of the spec, empty for attached resources
    pub fn args(&self) -> &[ArgValue] {
        match &self.mode {
            Mode::Create { args } => args,
            Mode::Attach { .. } => &[],
        }
    }
}

impl TryFrom<RawResourceSpec> for ResourceSpec {
    type Error = String;

    fn try_from(raw: RawResourceSpec) -> Result<Self, Self::Error> {
        let mode = match raw.mode {
            DeployMode::Create => {
                if raw.target.is_some() || raw.probe.is_some() {
                    return Err(format!(
                        "resource `{}` is created, `target` and `probe` only apply to attach",
                        raw.name
                    ));
                }
                Mode::Create { args: raw.args }
            }
            DeployMode::Attach => {
                if !raw.args.is_empty() {
                    return Err(format!(
                        "resource `{}` is attached and cannot take constructor args",
                        raw.name
                    ));
                }
                let target = raw
                    .target
                    .ok_or_else(|| format!("attached resource `{}` has no `target`", raw.name))?;
                Mode::Attach {
                    target,
                    probe: raw.probe,
                }
            }
        };

        let contract = raw.contract.unwrap_or_else(|| raw.name.clone());
        Ok(Self {
            name: raw.name,
            contract,
            mode,
        })
    }
}

/// A read-only call made after a configuration call is confirmed
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReadBack {
    /// The view function to call
    pub call: String,
    /// The arguments of the view function
    #[serde(default)]
    pub args: Vec<ArgValue>,
}

/// A post-deployment call against a resource
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ConfigCall {
    /// The label later steps use to refer to this call's result, defaults to `call`
    #[serde(default)]
    pub name: Option<String>,
    /// The name of the resource the call is made against
    pub instance: String,
    /// The contract method to invoke
    pub call: String,
    /// The arguments of the method
    #[serde(default)]
    pub args: Vec<ArgValue>,
    /// The event the receipt must carry, the first decoded event is taken when unset
    #[serde(default)]
    pub expect_event: Option<String>,
    /// A view call used to read back the written state
    #[serde(default)]
    pub read_back: Option<ReadBack>,
}

impl ConfigCall {
    /// A call against the given resource
    pub fn new(instance: &str, call: &str, args: Vec<ArgValue>) -> Self {
        Self {
            name: None,
            instance: instance.to_string(),
            call: call.to_string(),
            args,
            expect_event: None,
            read_back: None,
        }
    }

    /// Require the receipt to carry the given event
    pub fn expecting(mut self, event: &str) -> Self {
        self.expect_event = Some(event.to_string());
        self
    }

    /// Read back state with the given view call once confirmed
    pub fn reading_back(mut self, call: &str, args: Vec<ArgValue>) -> Self {
        self.read_back = Some(ReadBack {
            call: call.to_string(),
            args,
        });
        self
    }

    /// Label the call's result
    pub fn named(mut self, name: &str) -> Self {
        self.name = Some(name.to_string());
        self
    }

    /// The name other steps use to refer to this call
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.call)
    }

    /// Every argument of the call, including those of the read-back
    pub fn all_args(&self) -> impl Iterator<Item = &ArgValue> {
        self.args
            .iter()
            .chain(self.read_back.iter().flat_map(|r| r.args.iter()))
    }
}

/// A bootstrap plan: resources to obtain, then calls to make against them
#[derive(Clone, Debug, Default, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Plan {
    /// The resources, in the order they are obtained
    #[serde(default)]
    pub resources: Vec<ResourceSpec>,
    /// The configuration calls, in the order they are made
    #[serde(default)]
    pub calls: Vec<ConfigCall>,
}

// -----------
// | Results |
// -----------

/// The signer every transaction of a run is submitted from
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ActorIdentity {
    /// The signer's address
    pub address: Address,
    /// The signer's native balance when the run started
    pub balance: U256,
}

/// A contract instance obtained by the sequencer
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ResourceInstance {
    /// The name of the spec that produced the instance
    pub name: String,
    /// The artifact describing the instance
    pub contract: String,
    /// The address of the instance
    pub address: Address,
    /// Whether the instance was created or attached
    pub mode: DeployMode,
    /// The creation transaction, absent for attached instances
    pub tx_hash: Option<TxHash>,
}

/// An event decoded from a receipt log
#[derive(Clone, Debug, PartialEq)]
pub struct EventRecord {
    /// The event name
    pub name: String,
    /// The event's fields, by parameter name
    pub fields: BTreeMap<String, DynSolValue>,
}

/// The decoded result of a confirmed configuration call
#[derive(Clone, Debug, PartialEq)]
pub struct CallOutcome {
    /// The label of the call
    pub name: String,
    /// The resource the call was made against
    pub instance: String,
    /// The transaction carrying the call
    pub tx_hash: TxHash,
    /// The event selected from the receipt
    pub event: EventRecord,
    /// Every event decoded from the receipt, in log order
    pub events: Vec<EventRecord>,
    /// The outputs of the read-back call, by output name or position
    pub read_back: Vec<(String, DynSolValue)>,
}

/// The outcome of running an ordered sequence of steps.
///
/// Holds every step that completed, plus the error of the step that aborted the run
#[derive(Clone, Debug, PartialEq)]
pub struct RunReport<T> {
    /// The steps that completed, in order
    pub completed: Vec<T>,
    /// The error that aborted the run, if any
    pub failure: Option<ScriptError>,
}

impl<T> RunReport<T> {
    /// A report with nothing completed yet
    pub fn empty() -> Self {
        Self {
            completed: Vec::new(),
            failure: None,
        }
    }

    /// A report for a run that failed before any step was attempted
    pub fn aborted(err: ScriptError) -> Self {
        Self {
            completed: Vec::new(),
            failure: Some(err),
        }
    }

    /// Whether every step completed
    pub fn is_success(&self) -> bool {
        self.failure.is_none()
    }

    /// The completed steps, or the error that aborted the run
    pub fn into_result(self) -> Result<Vec<T>, ScriptError> {
        match self.failure {
            Some(err) => Err(err),
            None => Ok(self.completed),
        }
    }
}

/// How long, and how deep, to wait for a transaction to be confirmed
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ConfirmationPolicy {
    /// The number of blocks the receipt must be buried under, counting its own
    pub confirmations: u64,
    /// The number of blocks to wait before giving up
    pub timeout_blocks: u64,
    /// The number of consecutive polls without a new block after which the
    /// head is considered stalled: a mined receipt is then accepted at
    /// whatever depth it has, and a missing one times out
    pub stall_polls: u64,
    /// The delay between polls of the node
    pub poll_interval: Duration,
}

impl Default for ConfirmationPolicy {
    fn default() -> Self {
        Self {
            confirmations: DEFAULT_CONFIRMATIONS,
            timeout_blocks: DEFAULT_TIMEOUT_BLOCKS,
            stall_polls: DEFAULT_STALL_POLLS,
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
        }
    }
}
