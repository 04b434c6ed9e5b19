//! Leaf conversions shared by the codec tree: integers, floats, principals
//! and blobs, plus the value descriptions used in mismatch errors.

use super::{BLOB_HEX_MAX, CodecError};
use candid::Principal;
use candid::types::Label;
use candid::types::value::IDLValue;
use serde_json::Value;

/// Display key for a label: the name for named labels, the decimal id for
/// numeric ones.
pub(crate) fn label_key(label: &Label) -> String {
    match label {
        Label::Named(name) => name.clone(),
        Label::Id(id) | Label::Unnamed(id) => id.to_string(),
    }
}

pub(super) fn decode_bigint(value: &IDLValue) -> Result<Value, CodecError> {
    let text = match value {
        IDLValue::Nat(n) => n.0.to_string(),
        IDLValue::Int(i) => i.0.to_string(),
        IDLValue::Nat64(v) => v.to_string(),
        IDLValue::Int64(v) => v.to_string(),
        IDLValue::Number(s) => s.clone(),
        other => return Err(CodecError::mismatch("integer", describe(other))),
    };

    Ok(Value::String(text))
}

pub(super) fn encode_bigint(value: &Value) -> Result<IDLValue, CodecError> {
    match value {
        Value::String(s) => {
            let digits = s.trim();
            let body = digits.strip_prefix('-').unwrap_or(digits);
            if body.is_empty() || !body.bytes().all(|b| b.is_ascii_digit()) {
                return Err(CodecError::mismatch("decimal string", format!("{s:?}")));
            }
            Ok(IDLValue::Number(digits.to_string()))
        }
        // Plain JSON integers are accepted for convenience.
        Value::Number(n) if n.is_u64() || n.is_i64() => Ok(IDLValue::Number(n.to_string())),
        other => Err(CodecError::mismatch("decimal string", describe_json(other))),
    }
}

pub(super) fn decode_small_int(value: &IDLValue) -> Result<Value, CodecError> {
    let number = match value {
        IDLValue::Nat8(v) => Value::from(*v),
        IDLValue::Nat16(v) => Value::from(*v),
        IDLValue::Nat32(v) => Value::from(*v),
        IDLValue::Int8(v) => Value::from(*v),
        IDLValue::Int16(v) => Value::from(*v),
        IDLValue::Int32(v) => Value::from(*v),
        other => return Err(CodecError::mismatch("number", describe(other))),
    };

    Ok(number)
}

pub(super) fn encode_small_int(value: &Value) -> Result<IDLValue, CodecError> {
    match value {
        // Width and sign checks happen during candid serialization, which
        // knows the target type.
        Value::Number(n) if n.is_u64() || n.is_i64() => Ok(IDLValue::Number(n.to_string())),
        other => Err(CodecError::mismatch("number", describe_json(other))),
    }
}

pub(super) fn decode_float(value: &IDLValue) -> Result<Value, CodecError> {
    let float = match value {
        IDLValue::Float32(f) => f64::from(*f),
        IDLValue::Float64(f) => *f,
        other => return Err(CodecError::mismatch("float", describe(other))),
    };

    serde_json::Number::from_f64(float)
        .map(Value::Number)
        .ok_or(CodecError::NonFiniteFloat(float))
}

pub(super) fn encode_float(value: &Value) -> Result<IDLValue, CodecError> {
    match value {
        Value::Number(n) => n
            .as_f64()
            .map(IDLValue::Float64)
            .ok_or_else(|| CodecError::mismatch("float", n.to_string())),
        other => Err(CodecError::mismatch("number", describe_json(other))),
    }
}

pub(super) fn decode_principal(value: &IDLValue) -> Result<Value, CodecError> {
    match value {
        IDLValue::Principal(p) | IDLValue::Service(p) => Ok(Value::String(p.to_text())),
        // Already-textual values pass through untouched.
        IDLValue::Text(s) => Ok(Value::String(s.clone())),
        other => Err(CodecError::mismatch("principal", describe(other))),
    }
}

pub(super) fn encode_principal(value: &Value) -> Result<Principal, CodecError> {
    match value {
        Value::String(s) => parse_principal(s),
        other => Err(CodecError::mismatch("principal text", describe_json(other))),
    }
}

pub(super) fn parse_principal(text: &str) -> Result<Principal, CodecError> {
    Principal::from_text(text).map_err(|err| CodecError::InvalidPrincipal {
        text: text.to_string(),
        reason: err.to_string(),
    })
}

pub(super) fn decode_blob(value: &IDLValue) -> Result<Value, CodecError> {
    let bytes = blob_bytes(value).ok_or_else(|| CodecError::mismatch("blob", describe(value)))?;

    if bytes.len() <= BLOB_HEX_MAX {
        Ok(Value::String(hex::encode(bytes)))
    } else {
        Ok(Value::Array(bytes.into_iter().map(Value::from).collect()))
    }
}

pub(super) fn encode_blob(value: &Value) -> Result<IDLValue, CodecError> {
    let bytes = match value {
        Value::String(s) => {
            let digits = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")).unwrap_or(s);
            hex::decode(digits).map_err(|err| CodecError::InvalidHex(err.to_string()))?
        }
        Value::Array(items) => items
            .iter()
            .map(|item| {
                item.as_u64()
                    .and_then(|n| u8::try_from(n).ok())
                    .ok_or_else(|| CodecError::mismatch("byte", describe_json(item)))
            })
            .collect::<Result<Vec<_>, _>>()?,
        other => {
            return Err(CodecError::mismatch(
                "hex string or byte array",
                describe_json(other),
            ));
        }
    };

    Ok(IDLValue::Vec(bytes.into_iter().map(IDLValue::Nat8).collect()))
}

fn blob_bytes(value: &IDLValue) -> Option<Vec<u8>> {
    match value {
        IDLValue::Blob(bytes) => Some(bytes.clone()),
        IDLValue::Vec(items) => items
            .iter()
            .map(|item| match item {
                IDLValue::Nat8(b) => Some(*b),
                IDLValue::Number(s) => s.parse().ok(),
                _ => None,
            })
            .collect(),
        _ => None,
    }
}

pub(crate) fn describe(value: &IDLValue) -> &'static str {
    match value {
        IDLValue::Bool(_) => "bool",
        IDLValue::Null => "null",
        IDLValue::Text(_) => "text",
        IDLValue::Number(_) => "number",
        IDLValue::Float32(_) | IDLValue::Float64(_) => "float",
        IDLValue::Opt(_) => "opt",
        IDLValue::Vec(_) => "vec",
        IDLValue::Blob(_) => "blob",
        IDLValue::Record(_) => "record",
        IDLValue::Variant(_) => "variant",
        IDLValue::Principal(_) => "principal",
        IDLValue::Service(_) => "service",
        IDLValue::Func(..) => "func",
        IDLValue::None => "none",
        IDLValue::Int(_) => "int",
        IDLValue::Nat(_) => "nat",
        IDLValue::Nat8(_) => "nat8",
        IDLValue::Nat16(_) => "nat16",
        IDLValue::Nat32(_) => "nat32",
        IDLValue::Nat64(_) => "nat64",
        IDLValue::Int8(_) => "int8",
        IDLValue::Int16(_) => "int16",
        IDLValue::Int32(_) => "int32",
        IDLValue::Int64(_) => "int64",
        IDLValue::Reserved => "reserved",
    }
}

pub(super) const fn describe_json(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
