//! Parsed Candid interfaces.
//!
//! [`Interface::parse`] checks a `.did` source once and binds every service
//! method to an immutable [`MethodDescriptor`]: wire types, query mode,
//! display codecs and the detected `Ok`/`Err` result shape. Descriptors are
//! built eagerly, so cloning an `Interface` is cheap (the type tree is
//! reference-counted) and clones never diverge.

use crate::codec::{Builder, Codec, CodecError, CodecTable};
use candid::types::{FuncMode, Label, Type, TypeInner};
use candid_parser::{IDLProg, TypeEnv, check_prog};
use std::collections::BTreeMap;
use thiserror::Error as ThisError;

///
/// InterfaceError
///

#[remain::sorted]
#[derive(Debug, ThisError)]
pub enum InterfaceError {
    #[error("candid error: {0}")]
    Candid(#[from] candid::Error),

    #[error(transparent)]
    Codec(#[from] CodecError),

    #[error("interface does not define a service")]
    MissingActor,

    #[error("invalid candid interface: {0}")]
    Parse(#[from] candid_parser::Error),
}

///
/// Interface
///
/// A checked Candid interface with one descriptor per service method.
///

#[derive(Clone, Debug)]
pub struct Interface {
    env: TypeEnv,
    methods: BTreeMap<String, MethodDescriptor>,
    table: CodecTable,
}

impl Interface {
    /// Parse and check a `.did` source, binding codecs for every method.
    pub fn parse(source: &str) -> Result<Self, InterfaceError> {
        let ast = source.parse::<IDLProg>()?;
        let mut env = TypeEnv::new();
        let actor = check_prog(&mut env, &ast)?.ok_or(InterfaceError::MissingActor)?;

        // Services with init arguments carry a class wrapper.
        let actor = env.trace_type(&actor)?;
        let actor = if let TypeInner::Class(_, inner) = actor.as_ref() {
            inner.clone()
        } else {
            actor
        };

        let mut table = CodecTable::new();
        let mut builder = Builder::new(&env, &mut table);
        let mut methods = BTreeMap::new();

        for (name, ty) in env.as_service(&actor)? {
            let func = env.as_func(ty)?;
            let arg_codecs = func
                .args
                .iter()
                .map(|arg| builder.build(arg))
                .collect::<Result<Vec<_>, _>>()?;
            let ret_codecs = func
                .rets
                .iter()
                .map(|ret| builder.build(ret))
                .collect::<Result<Vec<_>, _>>()?;

            methods.insert(
                name.clone(),
                MethodDescriptor {
                    name: name.clone(),
                    args: func.args.clone(),
                    rets: func.rets.clone(),
                    query: func
                        .modes
                        .iter()
                        .any(|mode| matches!(mode, FuncMode::Query | FuncMode::CompositeQuery)),
                    arg_codecs,
                    ret_codecs,
                    result_arms: result_arms(&env, &func.rets),
                },
            );
        }

        Ok(Self {
            env,
            methods,
            table,
        })
    }

    #[must_use]
    pub fn method(&self, name: &str) -> Option<&MethodDescriptor> {
        self.methods.get(name)
    }

    pub fn method_names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    #[must_use]
    pub const fn env(&self) -> &TypeEnv {
        &self.env
    }

    #[must_use]
    pub const fn table(&self) -> &CodecTable {
        &self.table
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.methods.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

///
/// MethodDescriptor
///
/// Everything the call pipeline needs to know about one service method.
///

#[derive(Clone, Debug)]
pub struct MethodDescriptor {
    pub name: String,
    /// Declared argument types, in order.
    pub args: Vec<Type>,
    /// Declared return types, in order.
    pub rets: Vec<Type>,
    /// `true` for `query` and `composite_query` methods.
    pub query: bool,
    pub arg_codecs: Vec<Codec>,
    pub ret_codecs: Vec<Codec>,
    /// Present when the single return type is a two-armed `Ok`/`Err` variant.
    pub result_arms: Option<ResultArms>,
}

///
/// ResultArms
///
/// Arm labels of a result-shaped return variant, as declared. Matching is
/// ASCII case-insensitive, so `Ok`/`Err` and `ok`/`err` both qualify.
///

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResultArms {
    pub ok: String,
    pub err: String,
}

fn result_arms(env: &TypeEnv, rets: &[Type]) -> Option<ResultArms> {
    let [ret] = rets else {
        return None;
    };

    let traced = env.trace_type(ret).ok()?;
    let TypeInner::Variant(arms) = traced.as_ref() else {
        return None;
    };
    let [first, second] = arms.as_slice() else {
        return None;
    };

    let first_name = named_label(&first.id)?;
    let second_name = named_label(&second.id)?;
    let (ok, err) = if first_name.eq_ignore_ascii_case("ok")
        && second_name.eq_ignore_ascii_case("err")
    {
        (first_name, second_name)
    } else if first_name.eq_ignore_ascii_case("err") && second_name.eq_ignore_ascii_case("ok") {
        (second_name, first_name)
    } else {
        return None;
    };

    Some(ResultArms {
        ok: ok.to_string(),
        err: err.to_string(),
    })
}

fn named_label(label: &Label) -> Option<&str> {
    match label {
        Label::Named(name) => Some(name.as_str()),
        Label::Id(_) | Label::Unnamed(_) => None,
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    const DID: &str = r"
        type Profile = record { name : text; age : nat8 };
        type ApiResult = variant { Ok : text; Err : text };
        service : {
            get_profile : (principal) -> (Profile) query;
            set_name : (text) -> (ApiResult);
            ping : () -> ();
        }
    ";

    #[test]
    fn parse_binds_every_service_method() {
        let iface = Interface::parse(DID).expect("interface parses");

        assert_eq!(iface.len(), 3);
        let names: Vec<_> = iface.method_names().collect();
        assert_eq!(names, ["get_profile", "ping", "set_name"]);
        assert!(iface.method("restart").is_none());
    }

    #[test]
    fn query_mode_is_recorded() {
        let iface = Interface::parse(DID).expect("interface parses");

        assert!(iface.method("get_profile").is_some_and(|m| m.query));
        assert!(iface.method("set_name").is_some_and(|m| !m.query));
    }

    #[test]
    fn composite_query_counts_as_query() {
        let iface = Interface::parse("service : { peek : () -> (nat) composite_query; }")
            .expect("interface parses");

        assert!(iface.method("peek").is_some_and(|m| m.query));
    }

    #[test]
    fn result_arms_detected_through_named_types() {
        let iface = Interface::parse(DID).expect("interface parses");
        let method = iface.method("set_name").expect("method exists");

        let arms = method.result_arms.as_ref().expect("result shape detected");
        assert_eq!(arms.ok, "Ok");
        assert_eq!(arms.err, "Err");
        assert!(iface.method("ping").expect("method exists").result_arms.is_none());
        assert!(
            iface
                .method("get_profile")
                .expect("method exists")
                .result_arms
                .is_none()
        );
    }

    #[test]
    fn result_arms_match_case_insensitively() {
        let iface =
            Interface::parse("service : { flip : () -> (variant { ok : nat32; err : text }); }")
                .expect("interface parses");
        let arms = iface
            .method("flip")
            .and_then(|m| m.result_arms.clone())
            .expect("result shape detected");

        assert_eq!(arms.ok, "ok");
        assert_eq!(arms.err, "err");
    }

    #[test]
    fn two_armed_variants_without_result_labels_are_not_results() {
        let iface =
            Interface::parse("service : { state : () -> (variant { On; Off }); }")
                .expect("interface parses");

        assert!(iface.method("state").is_some_and(|m| m.result_arms.is_none()));
    }

    #[test]
    fn init_arguments_are_unwrapped() {
        let iface = Interface::parse("service : (text) -> { ping : () -> (); }")
            .expect("interface parses");

        assert_eq!(iface.len(), 1);
    }

    #[test]
    fn sources_without_a_service_are_rejected() {
        let err = Interface::parse("type T = nat;").expect_err("no service");
        assert!(matches!(err, InterfaceError::MissingActor));
    }

    #[test]
    fn arity_is_recorded() {
        let iface = Interface::parse(DID).expect("interface parses");
        let method = iface.method("set_name").expect("method exists");

        assert_eq!(method.args.len(), 1);
        assert_eq!(method.rets.len(), 1);
    }
}
