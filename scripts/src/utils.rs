//! Utilities for the bootstrap scripts.

use std::{collections::BTreeMap, fs, path::Path};

use alloy::primitives::TxHash;
use serde::Serialize;

use crate::{
    abi::format_value,
    errors::ScriptError,
    ledger::RpcLedger,
    types::{CallOutcome, Plan, ResourceInstance, RunReport},
};

/// Sets up the ledger connection, signing with the given private key if any
pub fn setup_client(priv_key: Option<&str>, rpc_url: &str) -> Result<RpcLedger, ScriptError> {
    RpcLedger::connect(priv_key, rpc_url)
}

/// Read and parse a plan file
pub fn read_plan(path: &Path) -> Result<Plan, ScriptError> {
    let contents = fs::read_to_string(path)
        .map_err(|e| ScriptError::ReadPlan(format!("{}: {}", path.display(), e)))?;

    parse_plan(&contents)
}

/// Parse the contents of a plan file
pub fn parse_plan(contents: &str) -> Result<Plan, ScriptError> {
    serde_json::from_str(contents).map_err(|e| ScriptError::ReadPlan(e.to_string()))
}

/// What a run produced, as written to the report file
#[derive(Debug, Serialize)]
pub struct RunSummary {
    /// The resources obtained, in order
    pub resources: Vec<ResourceInstance>,
    /// The configuration calls confirmed, in order
    pub calls: Vec<CallSummary>,
    /// The error that aborted the run, if any
    pub failure: Option<String>,
}

/// A confirmed configuration call, with its decoded values rendered as strings
#[derive(Debug, Serialize)]
pub struct CallSummary {
    /// The label of the call
    pub name: String,
    /// The resource the call was made against
    pub instance: String,
    /// The transaction carrying the call
    pub tx_hash: TxHash,
    /// The name of the event selected from the receipt
    pub event: String,
    /// The fields of the selected event
    pub fields: BTreeMap<String, String>,
    /// The outputs of the read-back call
    pub read_back: BTreeMap<String, String>,
}

impl From<&CallOutcome> for CallSummary {
    fn from(outcome: &CallOutcome) -> Self {
        Self {
            name: outcome.name.clone(),
            instance: outcome.instance.clone(),
            tx_hash: outcome.tx_hash,
            event: outcome.event.name.clone(),
            fields: outcome
                .event
                .fields
                .iter()
                .map(|(name, value)| (name.clone(), format_value(value)))
                .collect(),
            read_back: outcome
                .read_back
                .iter()
                .map(|(name, value)| (name.clone(), format_value(value)))
                .collect(),
        }
    }
}

impl RunSummary {
    /// Summarize the reports of the deployment and configuration phases
    pub fn new(resources: &RunReport<ResourceInstance>, calls: &RunReport<CallOutcome>) -> Self {
        let failure = resources
            .failure
            .as_ref()
            .or(calls.failure.as_ref())
            .map(ToString::to_string);

        Self {
            resources: resources.completed.clone(),
            calls: calls.completed.iter().map(CallSummary::from).collect(),
            failure,
        }
    }
}

/// Write a run summary to the given path as pretty-printed JSON, replacing
/// whatever is there
pub fn write_report(path: &Path, summary: &RunSummary) -> Result<(), ScriptError> {
    let json = serde_json::to_string_pretty(summary)
        .map_err(|e| ScriptError::WriteReport(e.to_string()))?;

    fs::write(path, json).map_err(|e| ScriptError::WriteReport(e.to_string()))
}
