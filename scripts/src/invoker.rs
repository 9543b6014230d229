//! The configuration invoker: makes post-deployment calls against obtained
//! resources and decodes the confirmation each call's receipt carries

use alloy::primitives::Log;
use itertools::Itertools;
use tracing::{error, info};

use crate::{
    abi::{decode_events, encode_call, format_fields, format_value},
    bindings::{Bindings, Produces},
    errors::ScriptError,
    ledger::{Ledger, LedgerError, TxPayload},
    session::Session,
    types::{CallOutcome, ConfigCall, ResourceInstance, RunReport},
};

/// Executes configuration calls one at a time against a session
pub struct Invoker<'s, L> {
    /// The session every call is submitted through
    session: &'s mut Session<L>,
}

impl<'s, L: Ledger> Invoker<'s, L> {
    /// An invoker submitting through the given session
    pub fn new(session: &'s mut Session<L>) -> Self {
        Self { session }
    }

    /// Make every call in the given order, binding each outcome under the
    /// call's label so later calls can refer to it.
    ///
    /// Stops at the first failure
    pub async fn run_sequence(
        &mut self,
        calls: &[ConfigCall],
        bindings: &mut Bindings,
    ) -> RunReport<CallOutcome> {
        if let Err(e) = check_calls(calls, bindings) {
            error!("{e}");
            return RunReport::aborted(e);
        }

        let mut report = RunReport::empty();
        for (step, call) in calls.iter().enumerate() {
            let result = match bindings.instance(&call.instance).cloned() {
                Some(instance) => self.invoke(step, &instance, call, bindings).await,
                None => Err(ScriptError::InvalidReference {
                    step,
                    name: call.label().to_string(),
                    reference: call.instance.clone(),
                }),
            };

            match result {
                Ok(outcome) => {
                    bindings.bind_call(outcome.clone());
                    report.completed.push(outcome);
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

    /// Make a single call against `instance`, resolving its arguments against
    /// the given bindings, and decode the confirmation from its receipt
    pub async fn invoke(
        &mut self,
        step: usize,
        instance: &ResourceInstance,
        call: &ConfigCall,
        bindings: &Bindings,
    ) -> Result<CallOutcome, ScriptError> {
        let name = call.label();
        let args = bindings.resolve_all(step, name, &call.args)?;
        let (artifact, calldata) = self
            .session
            .artifact(&instance.contract)
            .and_then(|artifact| {
                let (_, calldata) = encode_call(&artifact.abi, &call.call, &args)?;
                Ok((artifact, calldata))
            })
            .map_err(|e| ScriptError::CallFailed {
                step,
                name: name.to_string(),
                reason: e.to_string(),
            })?;

        info!("Calling {}.{}", instance.name, call.call);
        let receipt = self
            .session
            .send(TxPayload::Call {
                to: instance.address,
                data: calldata,
            })
            .await
            .map_err(|e| call_error(step, name, e))?;

        // Only logs emitted by the called contract are decoded against its ABI
        let logs: Vec<Log> = receipt
            .logs
            .into_iter()
            .filter(|log| log.address == instance.address)
            .collect();
        let events = decode_events(&artifact.abi, &logs);

        let selected = match &call.expect_event {
            Some(expected) => events.iter().find(|event| &event.name == expected),
            None => events.first(),
        };
        let Some(event) = selected.cloned() else {
            return Err(ScriptError::UnexpectedReceiptShape {
                step,
                name: name.to_string(),
                expected: call.expect_event.clone(),
                found: events.iter().map(|event| event.name.clone()).collect(),
            });
        };
        info!(
            "{name} confirmed with event {}({})",
            event.name,
            format_fields(&event.fields)
        );

        let mut read_back = Vec::new();
        if let Some(read) = &call.read_back {
            let args = bindings.resolve_all(step, name, &read.args)?;
            read_back = self
                .session
                .read(&instance.contract, instance.address, &read.call, &args)
                .await
                .map_err(|reason| ScriptError::CallFailed {
                    step,
                    name: name.to_string(),
                    reason: format!("read-back `{}` failed: {reason}", read.call),
                })?;

            info!(
                "{}: {}",
                read.call,
                read_back
                    .iter()
                    .map(|(_, value)| format_value(value))
                    .join(", ")
            );
        }

        Ok(CallOutcome {
            name: name.to_string(),
            instance: instance.name.clone(),
            tx_hash: receipt.tx_hash,
            event,
            events,
            read_back,
        })
    }
}

/// Check, before anything is submitted, that every call targets a bound
/// resource and refers only to bound names or earlier calls
fn check_calls(calls: &[ConfigCall], bindings: &Bindings) -> Result<(), ScriptError> {
    for (step, call) in calls.iter().enumerate() {
        if bindings.instance(&call.instance).is_none() {
            return Err(ScriptError::InvalidReference {
                step,
                name: call.label().to_string(),
                reference: call.instance.clone(),
            });
        }
    }

    bindings.check_order(calls.iter().map(|call| {
        let produces = Produces::Call {
            read_back: call.read_back.is_some(),
        };
        (call.label(), produces, call.all_args().collect::<Vec<_>>())
    }))
}

/// Attach the step's context to a failed call
fn call_error(step: usize, name: &str, err: LedgerError) -> ScriptError {
    match err {
        LedgerError::Timeout { blocks_waited } => ScriptError::ConfirmationTimeout {
            step,
            name: name.to_string(),
            blocks_waited,
        },
        other => ScriptError::CallFailed {
            step,
            name: name.to_string(),
            reason: other.to_string(),
        },
    }
}
