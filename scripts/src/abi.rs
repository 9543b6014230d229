//! ABI encoding of constructor and call arguments, and decoding of call
//! outputs and receipt logs

use std::collections::{BTreeMap, HashMap};

use alloy::{
    dyn_abi::{DynSolType, DynSolValue, EventExt, FunctionExt, JsonAbiExt, Specifier},
    json_abi::{Event, Function, JsonAbi, Param},
    primitives::{hex, Bytes, Log, B256},
};
use itertools::Itertools;
use tracing::debug;

use crate::{
    artifacts::ContractArtifact, bindings::ResolvedArg, errors::ScriptError, types::EventRecord,
};

// ------------
// | Encoding |
// ------------

/// Coerce resolved arguments to the types of the given parameters
pub fn coerce_args(params: &[Param], args: &[ResolvedArg]) -> Result<Vec<DynSolValue>, ScriptError> {
    if params.len() != args.len() {
        return Err(ScriptError::CalldataConstruction(format!(
            "expected {} arguments, got {}",
            params.len(),
            args.len()
        )));
    }

    params.iter().zip(args).map(|(param, arg)| coerce_arg(param, arg)).collect()
}

/// Coerce a single resolved argument to its parameter's type
fn coerce_arg(param: &Param, arg: &ResolvedArg) -> Result<DynSolValue, ScriptError> {
    let ty: DynSolType = param
        .resolve()
        .map_err(|e| ScriptError::CalldataConstruction(e.to_string()))?;

    match arg {
        ResolvedArg::Value(value) if ty.matches(value) => Ok(value.clone()),
        ResolvedArg::Value(value) => Err(ScriptError::CalldataConstruction(format!(
            "`{}` expects {}, got {}",
            param.name,
            ty,
            format_value(value)
        ))),
        ResolvedArg::Literal(literal) => {
            let literal = literal_to_str(literal).map_err(|e| {
                ScriptError::CalldataConstruction(format!("`{}`: {}", param.name, e))
            })?;
            ty.coerce_str(&literal).map_err(|e| {
                ScriptError::CalldataConstruction(format!("`{}` as {}: {}", param.name, ty, e))
            })
        }
    }
}

/// Render a JSON literal in the syntax `DynSolType::coerce_str` accepts.
///
/// JSON numbers outside the 64-bit integer range are only held as floats, so
/// they are refused; large amounts are written as strings
fn literal_to_str(literal: &serde_json::Value) -> Result<String, String> {
    match literal {
        serde_json::Value::String(s) => Ok(s.clone()),
        serde_json::Value::Number(n) if n.is_f64() => Err(format!(
            "{n} is not an exact integer, write large amounts as strings, e.g. \"1000000000000000000000\""
        )),
        serde_json::Value::Array(items) => {
            let items = items.iter().map(literal_to_str).collect::<Result<Vec<_>, _>>()?;
            Ok(format!("[{}]", items.join(", ")))
        }
        other => Ok(other.to_string()),
    }
}

/// Build the initcode of a creation transaction: the artifact's creation
/// bytecode followed by the ABI-encoded constructor arguments
pub fn encode_deploy(
    contract: &str,
    artifact: &ContractArtifact,
    args: &[ResolvedArg],
) -> Result<Bytes, ScriptError> {
    let code = artifact.creation_code(contract)?;
    let encoded_args = match &artifact.abi.constructor {
        Some(constructor) => {
            let values = coerce_args(&constructor.inputs, args)?;
            constructor
                .abi_encode_input(&values)
                .map_err(|e| ScriptError::CalldataConstruction(e.to_string()))?
        }
        None if args.is_empty() => Vec::new(),
        None => {
            return Err(ScriptError::CalldataConstruction(format!(
                "`{contract}` has no constructor but {} arguments were given",
                args.len()
            )))
        }
    };

    let mut initcode = code.to_vec();
    initcode.extend_from_slice(&encoded_args);
    Ok(initcode.into())
}

/// Find the overload of `name` taking `arity` arguments
pub fn find_function<'a>(
    abi: &'a JsonAbi,
    name: &str,
    arity: usize,
) -> Result<&'a Function, ScriptError> {
    abi.function(name)
        .and_then(|overloads| overloads.iter().find(|f| f.inputs.len() == arity))
        .ok_or_else(|| {
            ScriptError::CalldataConstruction(format!(
                "no function `{name}` taking {arity} arguments"
            ))
        })
}

/// Encode a call to `name`, returning the selected function and its calldata
pub fn encode_call<'a>(
    abi: &'a JsonAbi,
    name: &str,
    args: &[ResolvedArg],
) -> Result<(&'a Function, Bytes), ScriptError> {
    let function = find_function(abi, name, args.len())?;
    let values = coerce_args(&function.inputs, args)?;
    let calldata = function
        .abi_encode_input(&values)
        .map_err(|e| ScriptError::CalldataConstruction(e.to_string()))?;

    Ok((function, calldata.into()))
}

// ------------
// | Decoding |
// ------------

/// Decode the return data of a call, naming each output by its ABI name or position
pub fn decode_output(
    function: &Function,
    data: &[u8],
) -> Result<Vec<(String, DynSolValue)>, String> {
    let values = function.abi_decode_output(data).map_err(|e| e.to_string())?;

    Ok(function
        .outputs
        .iter()
        .zip(values)
        .enumerate()
        .map(|(i, (param, value))| (field_name(&param.name, i), value))
        .collect())
}

/// Decode the logs of a receipt against an ABI.
///
/// Logs are kept in order; anonymous logs, logs from events the ABI does not
/// declare, and logs that fail to decode are skipped
pub fn decode_events(abi: &JsonAbi, logs: &[Log]) -> Vec<EventRecord> {
    let by_selector: HashMap<B256, &Event> = abi
        .events()
        .filter(|event| !event.anonymous)
        .map(|event| (event.selector(), event))
        .collect();

    logs.iter()
        .filter_map(|log| {
            let selector = log.topics().first()?;
            let event = by_selector.get(selector)?;
            match event.decode_log(&log.data) {
                Ok(decoded) => Some(event_record(event, decoded.indexed, decoded.body)),
                Err(e) => {
                    debug!("skipping undecodable `{}` log: {e}", event.name);
                    None
                }
            }
        })
        .collect()
}

/// Pair decoded indexed and body values with the event's parameter names
fn event_record(event: &Event, indexed: Vec<DynSolValue>, body: Vec<DynSolValue>) -> EventRecord {
    let mut indexed = indexed.into_iter();
    let mut body = body.into_iter();

    let mut fields = BTreeMap::new();
    for (i, input) in event.inputs.iter().enumerate() {
        let value = if input.indexed {
            indexed.next()
        } else {
            body.next()
        };
        if let Some(value) = value {
            fields.insert(field_name(&input.name, i), value);
        }
    }

    EventRecord {
        name: event.name.clone(),
        fields,
    }
}

/// The name of a parameter, or its position if it is unnamed
fn field_name(name: &str, position: usize) -> String {
    if name.is_empty() {
        position.to_string()
    } else {
        name.to_string()
    }
}

// --------------
// | Formatting |
// --------------

/// Render a decoded value for logs and reports
#[allow(unreachable_patterns)]
pub fn format_value(value: &DynSolValue) -> String {
    match value {
        DynSolValue::Address(address) => address.to_checksum(None),
        DynSolValue::Bool(b) => b.to_string(),
        DynSolValue::Int(i, _) => i.to_string(),
        DynSolValue::Uint(u, _) => u.to_string(),
        DynSolValue::FixedBytes(word, size) => hex::encode_prefixed(&word[..*size]),
        DynSolValue::Bytes(bytes) => hex::encode_prefixed(bytes),
        DynSolValue::String(s) => s.clone(),
        DynSolValue::Array(values) | DynSolValue::FixedArray(values) | DynSolValue::Tuple(values) => {
            format!("[{}]", values.iter().map(format_value).join(", "))
        }
        other => format!("{other:?}"),
    }
}

/// Render an event record's fields as `name=value` pairs
pub fn format_fields(fields: &BTreeMap<String, DynSolValue>) -> String {
    fields
        .iter()
        .map(|(name, value)| format!("{name}={}", format_value(value)))
        .join(", ")
}

#[cfg(test)]
mod tests {
    use alloy::{
        primitives::{address, Address, LogData, U256},
        sol,
        sol_types::SolEvent,
    };

    use super::*;

    sol! {
        event MappingAdded(address key, address value);
        event Transfer(address indexed from, address indexed to, uint256 amount);
    }

    fn registry_abi() -> JsonAbi {
        JsonAbi::parse([
            "constructor(address registry)",
            "function addMapping(address key, address value)",
            "function getMapping(address key) view returns (address)",
            "function setLimits(uint256[] limits)",
            "event MappingAdded(address key, address value)",
            "event Transfer(address indexed from, address indexed to, uint256 amount)",
        ])
        .unwrap()
    }

    const KEY: Address = address!("00000000000c2e074ec69a0dfb2997ba6c7d2e1e");
    const VALUE: Address = address!("4ddc2d193948926d02f9b1fe9e1daa0718270ed5");

    #[test]
    fn test_encode_call_coerces_literals_and_values() {
        let abi = registry_abi();
        let args = [
            ResolvedArg::Literal(serde_json::json!("0x00000000000C2E074eC69A0dFb2997BA6C7d2e1e")),
            ResolvedArg::Value(DynSolValue::Address(VALUE)),
        ];

        let (function, calldata) = encode_call(&abi, "addMapping", &args).unwrap();
        assert_eq!(function.name, "addMapping");
        assert_eq!(&calldata[..4], function.selector().as_slice());
        assert_eq!(&calldata[4 + 12..4 + 32], KEY.as_slice());
        assert_eq!(&calldata[4 + 32 + 12..], VALUE.as_slice());
    }

    #[test]
    fn test_encode_array_literal() {
        let abi = registry_abi();
        let args = [ResolvedArg::Literal(serde_json::json!([1, 2, 3]))];
        assert!(encode_call(&abi, "setLimits", &args).is_ok());
    }

    #[test]
    fn test_large_amounts_are_written_as_strings() {
        let abi = JsonAbi::parse(["function setLimit(uint256 limit)"]).unwrap();

        let err = encode_call(
            &abi,
            "setLimit",
            &[ResolvedArg::Literal(serde_json::json!(1e21))],
        )
        .unwrap_err();
        assert!(err.to_string().contains("as strings"));

        let (_, calldata) = encode_call(
            &abi,
            "setLimit",
            &[ResolvedArg::Literal(serde_json::json!("1000000000000000000000"))],
        )
        .unwrap();
        assert_eq!(
            U256::from_be_slice(&calldata[4..]),
            U256::from(10).pow(U256::from(21))
        );

        let plan_literal: serde_json::Value =
            serde_json::from_str("1000000000000000000000").unwrap();
        assert!(encode_call(&abi, "setLimit", &[ResolvedArg::Literal(plan_literal)]).is_err());
    }

    #[test]
    fn test_encode_rejects_mistyped_value() {
        let abi = registry_abi();
        let args = [
            ResolvedArg::Value(DynSolValue::Bool(true)),
            ResolvedArg::Value(DynSolValue::Address(VALUE)),
        ];
        assert!(matches!(
            encode_call(&abi, "addMapping", &args),
            Err(ScriptError::CalldataConstruction(_))
        ));
    }

    #[test]
    fn test_encode_deploy_appends_constructor_args() {
        let artifact =
            ContractArtifact::new(registry_abi(), Some(Bytes::from_static(&[0x60, 0x80])));
        let initcode = encode_deploy(
            "Compound",
            &artifact,
            &[ResolvedArg::Value(DynSolValue::Address(VALUE))],
        )
        .unwrap();

        assert_eq!(initcode.len(), 2 + 32);
        assert_eq!(&initcode[..2], &[0x60, 0x80]);
        assert_eq!(&initcode[2 + 12..], VALUE.as_slice());
    }

    #[test]
    fn test_encode_deploy_without_constructor() {
        let artifact = ContractArtifact::new(JsonAbi::new(), Some(Bytes::from_static(&[0x60])));
        assert!(encode_deploy("Escrow", &artifact, &[]).is_ok());
        assert!(encode_deploy(
            "Escrow",
            &artifact,
            &[ResolvedArg::Literal(serde_json::json!(1))]
        )
        .is_err());
    }

    #[test]
    fn test_decode_events_in_order_skipping_unknown() {
        let abi = registry_abi();
        let emitter = Address::repeat_byte(0x11);
        let unknown = LogData::new_unchecked(vec![B256::repeat_byte(0x22)], Bytes::new());
        let transfer = Transfer {
            from: KEY,
            to: VALUE,
            amount: U256::from(7),
        }
        .encode_log_data();
        let added = MappingAdded {
            key: KEY,
            value: VALUE,
        }
        .encode_log_data();

        let logs: Vec<Log> = [unknown, transfer, added]
            .into_iter()
            .map(|data| Log {
                address: emitter,
                data,
            })
            .collect();
        let events = decode_events(&abi, &logs);

        assert_eq!(events.len(), 2);
        assert_eq!(events[0].name, "Transfer");
        assert_eq!(events[0].fields["from"], DynSolValue::Address(KEY));
        assert_eq!(events[0].fields["amount"], DynSolValue::Uint(U256::from(7), 256));
        assert_eq!(events[1].name, "MappingAdded");
        assert_eq!(events[1].fields["value"], DynSolValue::Address(VALUE));
    }

    #[test]
    fn test_decode_output_names_positions() {
        let abi = registry_abi();
        let function = find_function(&abi, "getMapping", 1).unwrap();
        let data = DynSolValue::Address(VALUE).abi_encode();

        let outputs = decode_output(function, &data).unwrap();
        assert_eq!(outputs, vec![("0".to_string(), DynSolValue::Address(VALUE))]);
    }

    #[test]
    fn test_format_value() {
        assert!(format_value(&DynSolValue::Address(VALUE))
            .eq_ignore_ascii_case("0x4ddc2d193948926d02f9b1fe9e1daa0718270ed5"));
        assert_eq!(
            format_value(&DynSolValue::Array(vec![
                DynSolValue::Uint(U256::from(1), 256),
                DynSolValue::Bool(false),
            ])),
            "[1, false]"
        );
    }
}
