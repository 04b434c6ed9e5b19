//! Bidirectional codecs between Candid wire values and display values.
//!
//! For every node of a Candid type tree the builder produces a [`Codec`]
//! converting [`IDLValue`] to an ergonomic [`serde_json::Value`] and back:
//! big integers become decimal strings, principals their text form, short
//! blobs lowercase hex, variants discriminated objects. Codecs are plain
//! immutable data; recursive types go through arena slots in a
//! [`CodecTable`] so self-referential trees still build and run.

mod build;
mod scalar;

pub use build::build;
pub(crate) use build::Builder;
pub(crate) use scalar::{describe, label_key};

use candid::types::Label;
use candid::types::value::{IDLField, IDLValue, VariantValue};
use serde_json::{Map, Value};
use thiserror::Error as ThisError;

/// Longest blob (in bytes) rendered as a hex string on decode. Longer blobs
/// pass through as arrays of byte values.
pub const BLOB_HEX_MAX: usize = 96;

/// Display key carrying a variant's active arm name.
pub const VARIANT_TAG: &str = "_type";

///
/// Codec
///
/// One node of a codec tree. `decode` maps wire to display, `encode` maps
/// display back to wire; the two are mutual inverses except for the
/// deliberately lossy long-blob passthrough and the nested-optional collapse
/// inherent to a nullable display model.
///

#[derive(Clone, Debug, PartialEq)]
pub enum Codec {
    /// `bool` ↔ JSON boolean.
    Bool,
    /// `text` ↔ JSON string.
    Text,
    /// `float32`/`float64` ↔ JSON number.
    Float,
    /// `null`/`reserved` ↔ JSON null.
    Null,
    /// Unbounded or 64-bit integers ↔ decimal string.
    BigInt,
    /// Integers of at most 32 bits ↔ JSON number.
    SmallInt,
    /// `principal` ↔ canonical text form.
    Principal,
    /// `vec nat8` ↔ lowercase hex (≤ [`BLOB_HEX_MAX`] bytes) or raw bytes.
    Blob,
    /// `vec record { text; T }` ↔ JSON object.
    AssocList(Box<Codec>),
    Vec(Box<Codec>),
    Opt(Box<Codec>),
    /// Named fields, display keys in declaration order.
    Record(Vec<(String, Codec)>),
    /// Sequentially-labelled record ↔ positional JSON array.
    Tuple(Vec<Codec>),
    Variant(Vec<VariantArm>),
    /// `func` ↔ `[principal-text, method-name]`.
    Func,
    /// `service` ↔ principal text.
    Service,
    /// Recursive reference into a [`CodecTable`] slot.
    Rec(usize),
}

///
/// VariantArm
///

#[derive(Clone, Debug, PartialEq)]
pub struct VariantArm {
    pub name: String,
    /// `None` for arms whose payload type is `null`; such arms carry no
    /// payload key on the display side.
    pub payload: Option<Codec>,
}

///
/// CodecTable
///
/// Arena of codecs for recursive bindings. Slots are reserved before their
/// definition is built so re-entrant references resolve to a stable index.
///

#[derive(Clone, Debug, Default)]
pub struct CodecTable {
    slots: Vec<Option<Codec>>,
}

impl CodecTable {
    #[must_use]
    pub const fn new() -> Self {
        Self { slots: Vec::new() }
    }

    pub(crate) fn reserve(&mut self) -> usize {
        self.slots.push(None);
        self.slots.len() - 1
    }

    pub(crate) fn fill(&mut self, slot: usize, codec: Codec) {
        self.slots[slot] = Some(codec);
    }

    pub(crate) fn get(&self, slot: usize) -> Result<&Codec, CodecError> {
        self.slots
            .get(slot)
            .and_then(Option::as_ref)
            .ok_or(CodecError::UnresolvedSlot(slot))
    }
}

///
/// CodecError
///

#[remain::sorted]
#[derive(Debug, ThisError)]
pub enum CodecError {
    #[error("invalid hex string: {0}")]
    InvalidHex(String),

    #[error("invalid principal text {text:?}: {reason}")]
    InvalidPrincipal { text: String, reason: String },

    #[error("expected {expected}, found {found}")]
    Mismatch { expected: &'static str, found: String },

    #[error("variant object has no {VARIANT_TAG:?} discriminant")]
    MissingDiscriminant,

    #[error("float {0} has no JSON representation")]
    NonFiniteFloat(f64),

    #[error("expected {expected} element(s), got {got}")]
    TupleArity { expected: usize, got: usize },

    #[error("unknown variant arm {0:?}")]
    UnknownArm(String),

    #[error("unresolved recursive codec slot {0}")]
    UnresolvedSlot(usize),

    #[error("unsupported type: {0}")]
    Unsupported(String),
}

impl CodecError {
    pub(crate) fn mismatch(expected: &'static str, found: impl Into<String>) -> Self {
        Self::Mismatch {
            expected,
            found: found.into(),
        }
    }
}

impl Codec {
    /// Convert a wire value into its display form.
    pub fn decode(&self, table: &CodecTable, value: &IDLValue) -> Result<Value, CodecError> {
        match self {
            Self::Bool => match value {
                IDLValue::Bool(b) => Ok(Value::Bool(*b)),
                other => Err(CodecError::mismatch("bool", scalar::describe(other))),
            },
            Self::Text => match value {
                IDLValue::Text(s) => Ok(Value::String(s.clone())),
                other => Err(CodecError::mismatch("text", scalar::describe(other))),
            },
            Self::Float => scalar::decode_float(value),
            Self::Null => match value {
                IDLValue::Null | IDLValue::Reserved => Ok(Value::Null),
                other => Err(CodecError::mismatch("null", scalar::describe(other))),
            },
            Self::BigInt => scalar::decode_bigint(value),
            Self::SmallInt => scalar::decode_small_int(value),
            Self::Principal => scalar::decode_principal(value),
            Self::Blob => scalar::decode_blob(value),
            Self::AssocList(val) => decode_assoc(table, val, value),
            Self::Vec(elem) => match value {
                IDLValue::Vec(items) => items
                    .iter()
                    .map(|item| elem.decode(table, item))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array),
                other => Err(CodecError::mismatch("vec", scalar::describe(other))),
            },
            Self::Opt(inner) => match value {
                IDLValue::None => Ok(Value::Null),
                IDLValue::Opt(present) => inner.decode(table, present),
                other => Err(CodecError::mismatch("opt", scalar::describe(other))),
            },
            Self::Record(fields) => decode_record(table, fields, value),
            Self::Tuple(elems) => decode_tuple(table, elems, value),
            Self::Variant(arms) => decode_variant(table, arms, value),
            Self::Func => match value {
                IDLValue::Func(principal, method) => Ok(Value::Array(vec![
                    Value::String(principal.to_text()),
                    Value::String(method.clone()),
                ])),
                other => Err(CodecError::mismatch("func", scalar::describe(other))),
            },
            Self::Service => match value {
                IDLValue::Service(principal) | IDLValue::Principal(principal) => {
                    Ok(Value::String(principal.to_text()))
                }
                other => Err(CodecError::mismatch("service", scalar::describe(other))),
            },
            Self::Rec(slot) => table.get(*slot)?.decode(table, value),
        }
    }

    /// Convert a display value back into its wire form.
    pub fn encode(&self, table: &CodecTable, value: &Value) -> Result<IDLValue, CodecError> {
        match self {
            Self::Bool => match value {
                Value::Bool(b) => Ok(IDLValue::Bool(*b)),
                other => Err(CodecError::mismatch("bool", scalar::describe_json(other))),
            },
            Self::Text => match value {
                Value::String(s) => Ok(IDLValue::Text(s.clone())),
                other => Err(CodecError::mismatch("text", scalar::describe_json(other))),
            },
            Self::Float => scalar::encode_float(value),
            Self::Null => match value {
                Value::Null => Ok(IDLValue::Null),
                other => Err(CodecError::mismatch("null", scalar::describe_json(other))),
            },
            Self::BigInt => scalar::encode_bigint(value),
            Self::SmallInt => scalar::encode_small_int(value),
            Self::Principal => scalar::encode_principal(value).map(IDLValue::Principal),
            Self::Blob => scalar::encode_blob(value),
            Self::AssocList(val) => encode_assoc(table, val, value),
            Self::Vec(elem) => match value {
                Value::Array(items) => items
                    .iter()
                    .map(|item| elem.encode(table, item))
                    .collect::<Result<Vec<_>, _>>()
                    .map(IDLValue::Vec),
                other => Err(CodecError::mismatch("array", scalar::describe_json(other))),
            },
            Self::Opt(inner) => match value {
                Value::Null => Ok(IDLValue::None),
                present => Ok(IDLValue::Opt(Box::new(inner.encode(table, present)?))),
            },
            Self::Record(fields) => encode_record(table, fields, value),
            Self::Tuple(elems) => encode_tuple(table, elems, value),
            Self::Variant(arms) => encode_variant(table, arms, value),
            Self::Func => encode_func(value),
            Self::Service => scalar::encode_principal(value).map(IDLValue::Service),
            Self::Rec(slot) => table.get(*slot)?.encode(table, value),
        }
    }
}

fn decode_record(
    table: &CodecTable,
    fields: &[(String, Codec)],
    value: &IDLValue,
) -> Result<Value, CodecError> {
    let IDLValue::Record(wire_fields) = value else {
        return Err(CodecError::mismatch("record", scalar::describe(value)));
    };

    let mut object = Map::with_capacity(fields.len());
    for (name, codec) in fields {
        let wire = wire_fields
            .iter()
            .find(|field| scalar::label_key(&field.id) == *name)
            .map(|field| &field.val)
            .ok_or_else(|| CodecError::mismatch("record field", format!("no field {name:?}")))?;
        object.insert(name.clone(), codec.decode(table, wire)?);
    }

    Ok(Value::Object(object))
}

fn encode_record(
    table: &CodecTable,
    fields: &[(String, Codec)],
    value: &Value,
) -> Result<IDLValue, CodecError> {
    let Value::Object(object) = value else {
        return Err(CodecError::mismatch("object", scalar::describe_json(value)));
    };

    // Unknown keys are ignored; a missing key reads as null so optional
    // fields may simply be left out.
    let mut wire_fields = Vec::with_capacity(fields.len());
    for (name, codec) in fields {
        let field_value = object.get(name).unwrap_or(&Value::Null);
        wire_fields.push(IDLField {
            id: Label::Named(name.clone()),
            val: codec.encode(table, field_value)?,
        });
    }

    Ok(IDLValue::Record(wire_fields))
}

fn decode_tuple(
    table: &CodecTable,
    elems: &[Codec],
    value: &IDLValue,
) -> Result<Value, CodecError> {
    let IDLValue::Record(wire_fields) = value else {
        return Err(CodecError::mismatch("tuple", scalar::describe(value)));
    };
    if wire_fields.len() != elems.len() {
        return Err(CodecError::TupleArity {
            expected: elems.len(),
            got: wire_fields.len(),
        });
    }

    elems
        .iter()
        .zip(wire_fields)
        .map(|(codec, field)| codec.decode(table, &field.val))
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

fn encode_tuple(
    table: &CodecTable,
    elems: &[Codec],
    value: &Value,
) -> Result<IDLValue, CodecError> {
    let Value::Array(items) = value else {
        return Err(CodecError::mismatch("array", scalar::describe_json(value)));
    };
    if items.len() != elems.len() {
        return Err(CodecError::TupleArity {
            expected: elems.len(),
            got: items.len(),
        });
    }

    let wire_fields = elems
        .iter()
        .zip(items)
        .enumerate()
        .map(|(index, (codec, item))| {
            Ok(IDLField {
                id: Label::Unnamed(index as u32),
                val: codec.encode(table, item)?,
            })
        })
        .collect::<Result<Vec<_>, CodecError>>()?;

    Ok(IDLValue::Record(wire_fields))
}

fn decode_variant(
    table: &CodecTable,
    arms: &[VariantArm],
    value: &IDLValue,
) -> Result<Value, CodecError> {
    let IDLValue::Variant(variant) = value else {
        return Err(CodecError::mismatch("variant", scalar::describe(value)));
    };
    let field = variant.0.as_ref();
    let key = scalar::label_key(&field.id);

    let arm = arms
        .iter()
        .find(|arm| arm.name == key)
        .ok_or_else(|| CodecError::UnknownArm(key.clone()))?;

    let mut object = Map::with_capacity(2);
    object.insert(VARIANT_TAG.to_string(), Value::String(arm.name.clone()));
    if let Some(payload) = &arm.payload {
        object.insert(arm.name.clone(), payload.decode(table, &field.val)?);
    }

    Ok(Value::Object(object))
}

fn encode_variant(
    table: &CodecTable,
    arms: &[VariantArm],
    value: &Value,
) -> Result<IDLValue, CodecError> {
    let Value::Object(object) = value else {
        return Err(CodecError::mismatch("object", scalar::describe_json(value)));
    };
    let Some(Value::String(tag)) = object.get(VARIANT_TAG) else {
        return Err(CodecError::MissingDiscriminant);
    };

    let arm = arms
        .iter()
        .find(|arm| arm.name == *tag)
        .ok_or_else(|| CodecError::UnknownArm(tag.clone()))?;

    let payload = match &arm.payload {
        Some(codec) => codec.encode(table, object.get(&arm.name).unwrap_or(&Value::Null))?,
        None => IDLValue::Null,
    };

    Ok(IDLValue::Variant(VariantValue(
        Box::new(IDLField {
            id: Label::Named(arm.name.clone()),
            val: payload,
        }),
        0,
    )))
}

fn decode_assoc(table: &CodecTable, val: &Codec, value: &IDLValue) -> Result<Value, CodecError> {
    let IDLValue::Vec(items) = value else {
        return Err(CodecError::mismatch(
            "association list",
            scalar::describe(value),
        ));
    };

    let mut object = Map::with_capacity(items.len());
    for item in items {
        let IDLValue::Record(pair) = item else {
            return Err(CodecError::mismatch("key-value pair", scalar::describe(item)));
        };
        let [key_field, val_field] = pair.as_slice() else {
            return Err(CodecError::TupleArity {
                expected: 2,
                got: pair.len(),
            });
        };
        let IDLValue::Text(key) = &key_field.val else {
            return Err(CodecError::mismatch(
                "text key",
                scalar::describe(&key_field.val),
            ));
        };
        object.insert(key.clone(), val.decode(table, &val_field.val)?);
    }

    Ok(Value::Object(object))
}

fn encode_assoc(table: &CodecTable, val: &Codec, value: &Value) -> Result<IDLValue, CodecError> {
    let pair = |key: &str, item: &Value| -> Result<IDLValue, CodecError> {
        Ok(IDLValue::Record(vec![
            IDLField {
                id: Label::Unnamed(0),
                val: IDLValue::Text(key.to_string()),
            },
            IDLField {
                id: Label::Unnamed(1),
                val: val.encode(table, item)?,
            },
        ]))
    };

    match value {
        Value::Object(object) => object
            .iter()
            .map(|(key, item)| pair(key, item))
            .collect::<Result<Vec<_>, _>>()
            .map(IDLValue::Vec),
        // An array of [key, value] pairs round-trips as well.
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::Array(kv) => {
                    let [Value::String(key), item] = kv.as_slice() else {
                        return Err(CodecError::mismatch(
                            "[key, value] pair",
                            scalar::describe_json(item),
                        ));
                    };
                    pair(key, item)
                }
                other => Err(CodecError::mismatch(
                    "[key, value] pair",
                    scalar::describe_json(other),
                )),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(IDLValue::Vec),
        other => Err(CodecError::mismatch(
            "object or pair array",
            scalar::describe_json(other),
        )),
    }
}

fn encode_func(value: &Value) -> Result<IDLValue, CodecError> {
    let Value::Array(parts) = value else {
        return Err(CodecError::mismatch(
            "[principal, method] pair",
            scalar::describe_json(value),
        ));
    };
    let [Value::String(principal), Value::String(method)] = parts.as_slice() else {
        return Err(CodecError::mismatch(
            "[principal, method] pair",
            scalar::describe_json(value),
        ));
    };

    let principal = scalar::parse_principal(principal)?;
    Ok(IDLValue::Func(principal, method.clone()))
}

///
/// TESTS
///
