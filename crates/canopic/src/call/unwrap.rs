//! Convention-based extraction of `Ok`/`Err` payloads from result-shaped
//! replies. Runs on the decoded wire value; the winning arm's payload is
//! transformed through that arm's codec.

use crate::codec::{Codec, CodecError, CodecTable, VariantArm, describe, label_key};
use crate::interface::ResultArms;
use candid::types::value::IDLValue;
use serde_json::Value;

///
/// Unwrapped
///

#[derive(Debug, PartialEq)]
pub(crate) enum Unwrapped {
    Ok(Value),
    Err(Value),
}

/// Split a result-shaped wire value into its success or failure payload.
pub(crate) fn unwrap_result(
    arms: &ResultArms,
    codec: &Codec,
    table: &CodecTable,
    wire: &IDLValue,
) -> Result<Unwrapped, CodecError> {
    let IDLValue::Variant(variant) = wire else {
        return Err(CodecError::mismatch("result variant", describe(wire)));
    };

    let field = variant.0.as_ref();
    let label = label_key(&field.id);
    let payload = match &arm(table, codec, &label)?.payload {
        Some(codec) => codec.decode(table, &field.val)?,
        None => Value::Null,
    };

    if label == arms.ok {
        Ok(Unwrapped::Ok(payload))
    } else if label == arms.err {
        Ok(Unwrapped::Err(payload))
    } else {
        Err(CodecError::UnknownArm(label))
    }
}

fn arm<'a>(
    table: &'a CodecTable,
    codec: &'a Codec,
    label: &str,
) -> Result<&'a VariantArm, CodecError> {
    match codec {
        Codec::Variant(arms) => arms
            .iter()
            .find(|arm| arm.name == label)
            .ok_or_else(|| CodecError::UnknownArm(label.to_string())),
        Codec::Rec(slot) => arm(table, table.get(*slot)?, label),
        other => Err(CodecError::mismatch("variant codec", format!("{other:?}"))),
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interface::Interface;
    use serde_json::json;

    fn unwrap_via(did: &str, display: Value) -> Result<Unwrapped, CodecError> {
        let iface = Interface::parse(did).expect("interface parses");
        let method = iface.method("act").expect("method exists");
        let arms = method.result_arms.as_ref().expect("result shape detected");
        let codec = &method.ret_codecs[0];
        let wire = codec.encode(iface.table(), &display).expect("display encodes");

        unwrap_result(arms, codec, iface.table(), &wire)
    }

    #[test]
    fn ok_arm_yields_its_payload() {
        let out = unwrap_via(
            "service : { act : () -> (variant { Ok : text; Err : text }); }",
            json!({ "_type": "Ok", "Ok": "success-value" }),
        )
        .expect("unwraps");

        assert_eq!(out, Unwrapped::Ok(json!("success-value")));
    }

    #[test]
    fn err_arm_yields_its_payload() {
        let out = unwrap_via(
            "service : { act : () -> (variant { Ok : text; Err : text }); }",
            json!({ "_type": "Err", "Err": "boom" }),
        )
        .expect("unwraps");

        assert_eq!(out, Unwrapped::Err(json!("boom")));
    }

    #[test]
    fn payloadless_arms_yield_null() {
        let out = unwrap_via(
            "service : { act : () -> (variant { Ok; Err : text }); }",
            json!({ "_type": "Ok" }),
        )
        .expect("unwraps");

        assert_eq!(out, Unwrapped::Ok(Value::Null));
    }

    #[test]
    fn named_result_types_resolve_through_the_table() {
        let out = unwrap_via(
            "type R = variant { Ok : nat; Err : text }; service : { act : () -> (R); }",
            json!({ "_type": "Ok", "Ok": "1000000" }),
        )
        .expect("unwraps");

        assert_eq!(out, Unwrapped::Ok(json!("1000000")));
    }

    #[test]
    fn lowercase_pairs_unwrap_too() {
        let out = unwrap_via(
            "service : { act : () -> (variant { ok : nat8; err : text }); }",
            json!({ "_type": "ok", "ok": 7 }),
        )
        .expect("unwraps");

        assert_eq!(out, Unwrapped::Ok(json!(7)));
    }

    #[test]
    fn non_variant_wire_values_are_rejected() {
        let iface = Interface::parse("service : { act : () -> (variant { Ok; Err }); }")
            .expect("interface parses");
        let method = iface.method("act").expect("method exists");
        let arms = method.result_arms.as_ref().expect("result shape detected");

        let err = unwrap_result(
            arms,
            &method.ret_codecs[0],
            iface.table(),
            &IDLValue::Text("nope".to_string()),
        )
        .expect_err("not a variant");
        assert!(matches!(err, CodecError::Mismatch { .. }));
    }
}
