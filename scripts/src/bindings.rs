//! The results of a run so far, by name, and the resolution of references against them

use std::collections::{BTreeMap, HashMap};

use alloy::dyn_abi::DynSolValue;

use crate::{
    errors::ScriptError,
    types::{ArgValue, CallOutcome, ResourceInstance},
};

/// An argument with references substituted by the values they point to
#[derive(Clone, Debug, PartialEq)]
pub enum ResolvedArg {
    /// A value taken from an earlier result
    Value(DynSolValue),
    /// A literal awaiting coercion to its parameter's type
    Literal(serde_json::Value),
}

/// The kind of result a step binds under its name
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Produces {
    /// A resource instance, referred to by address only
    Instance,
    /// A call outcome, whose bare reference needs a read-back value
    Call {
        /// Whether the call reads back a value after it is confirmed
        read_back: bool,
    },
}

/// The name-to-result map built up as a run proceeds.
///
/// Starts empty on every run, nothing is carried over between runs
#[derive(Clone, Debug, Default)]
pub struct Bindings {
    /// Resource instances by spec name
    instances: BTreeMap<String, ResourceInstance>,
    /// Call outcomes by call label
    calls: BTreeMap<String, CallOutcome>,
}

impl Bindings {
    /// An empty set of bindings
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a resource instance under its spec name
    pub fn bind_instance(&mut self, instance: ResourceInstance) {
        self.instances.insert(instance.name.clone(), instance);
    }

    /// Record a call outcome under its label
    pub fn bind_call(&mut self, outcome: CallOutcome) {
        self.calls.insert(outcome.name.clone(), outcome);
    }

    /// The instance bound to the given name
    pub fn instance(&self, name: &str) -> Option<&ResourceInstance> {
        self.instances.get(name)
    }

    /// Every bound instance, by name
    pub fn instances(&self) -> &BTreeMap<String, ResourceInstance> {
        &self.instances
    }

    /// The call outcome bound to the given label
    pub fn call(&self, name: &str) -> Option<&CallOutcome> {
        self.calls.get(name)
    }

    /// Whether anything is bound to the given name
    pub fn contains(&self, name: &str) -> bool {
        self.instances.contains_key(name) || self.calls.contains_key(name)
    }

    /// Check, before anything is submitted, that each step only refers to names
    /// bound already or produced by an earlier step, in a way that step's
    /// result can satisfy, and that no name repeats
    pub fn check_order<'a, I>(&self, steps: I) -> Result<(), ScriptError>
    where
        I: IntoIterator<Item = (&'a str, Produces, Vec<&'a ArgValue>)>,
    {
        let mut seen: HashMap<&str, Produces> = HashMap::new();
        for (step, (name, produces, args)) in steps.into_iter().enumerate() {
            for arg in args {
                let ArgValue::Ref { target, field } = arg else {
                    continue;
                };

                let target_produces = seen
                    .get(target.as_str())
                    .copied()
                    .or_else(|| self.produces(target));
                let satisfiable = match (target_produces, field) {
                    (None, _) => false,
                    // Resources only yield their address
                    (Some(Produces::Instance), field) => field.is_none(),
                    (Some(Produces::Call { read_back }), None) => read_back,
                    // Event fields are only known once the call is confirmed
                    (Some(Produces::Call { .. }), Some(_)) => true,
                };
                if !satisfiable {
                    return Err(ScriptError::InvalidReference {
                        step,
                        name: name.to_string(),
                        reference: describe(arg),
                    });
                }
            }

            if self.contains(name) || seen.insert(name, produces).is_some() {
                return Err(ScriptError::ReadPlan(format!(
                    "step {step}: name `{name}` is used more than once"
                )));
            }
        }

        Ok(())
    }

    /// What the result bound to `name` can be referred to for
    fn produces(&self, name: &str) -> Option<Produces> {
        if self.instances.contains_key(name) {
            return Some(Produces::Instance);
        }

        self.calls.get(name).map(|outcome| Produces::Call {
            read_back: !outcome.read_back.is_empty(),
        })
    }

    /// Substitute the references among a step's arguments
    pub fn resolve_all(
        &self,
        step: usize,
        name: &str,
        args: &[ArgValue],
    ) -> Result<Vec<ResolvedArg>, ScriptError> {
        args.iter()
            .map(|arg| {
                self.resolve(arg)
                    .ok_or_else(|| ScriptError::InvalidReference {
                        step,
                        name: name.to_string(),
                        reference: describe(arg),
                    })
            })
            .collect()
    }

    /// Substitute a single argument, `None` if it refers to nothing bound
    pub fn resolve(&self, arg: &ArgValue) -> Option<ResolvedArg> {
        let (target, field) = match arg {
            ArgValue::Literal(value) => return Some(ResolvedArg::Literal(value.clone())),
            ArgValue::Ref { target, field } => (target, field.as_deref()),
        };

        if let Some(instance) = self.instances.get(target) {
            return match field {
                None => Some(ResolvedArg::Value(DynSolValue::Address(instance.address))),
                Some(_) => None,
            };
        }

        let outcome = self.calls.get(target)?;
        let value = match field {
            Some(field) => outcome.event.fields.get(field).cloned().or_else(|| {
                outcome
                    .read_back
                    .iter()
                    .find(|(name, _)| name == field)
                    .map(|(_, value)| value.clone())
            }),
            None => outcome.read_back.first().map(|(_, value)| value.clone()),
        }?;

        Some(ResolvedArg::Value(value))
    }
}

/// Render a reference the way it is written in a plan
fn describe(arg: &ArgValue) -> String {
    match arg {
        ArgValue::Ref {
            target,
            field: Some(field),
        } => format!("{target}.{field}"),
        ArgValue::Ref { target, field: None } => target.clone(),
        ArgValue::Literal(value) => value.to_string(),
    }
}
