//! The call pipeline: resolve descriptor, validate, transform and encode
//! arguments, dispatch, process the response, decode, unwrap, transform back.
//!
//! Transform failures never abort a call. When an argument refuses its
//! codec, every argument is passed through untyped and the wire encoder has
//! the final word; when a reply refuses its codec, the reply is rendered
//! untyped. Both fallbacks are logged. This mirrors the lenient display
//! layer this crate grew out of, with the control flow made explicit.

mod key;
mod unwrap;

pub use key::RequestKey;

use crate::codec::{BLOB_HEX_MAX, VARIANT_TAG, label_key};
use crate::error::{CallError, CallErrorKind, CallFailure, CanisterError, ValidationError};
use crate::interface::{Interface, MethodDescriptor};
use crate::protocol::{
    CallContext, CertificateVerifier, PollingPolicy, ResponseProcessor, SubmitOutcome, Transport,
    poll_request, process_query,
};
use async_trait::async_trait;
use candid::Principal;
use candid::types::Label;
use candid::types::value::{IDLArgs, IDLField, IDLValue};
use futures::future::LocalBoxFuture;
use serde_json::{Map, Number, Value};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};
use unwrap::Unwrapped;

///
/// QueryOptions
///

#[derive(Clone, Copy, Debug, Default)]
pub struct QueryOptions {
    /// Bypass the cache for this call even when one is configured.
    pub fresh: bool,
}

///
/// QueryPlan
///
/// A prepared query: the cache key the result would live under, plus the
/// deferred call that produces it. Built by [`CallExecutor::query_plan`]
/// for callers that drive their own cache.
///

pub struct QueryPlan<'a> {
    pub key: RequestKey,
    pub fetch: LocalBoxFuture<'a, Result<Value, CallFailure>>,
}

impl fmt::Debug for QueryPlan<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("QueryPlan")
            .field("key", &self.key)
            .finish_non_exhaustive()
    }
}

///
/// ArgValidator
///
/// Caller-supplied pre-flight check over display-shaped arguments. Any
/// reported issue aborts the call before encoding.
///

pub trait ArgValidator: Send + Sync {
    fn validate(&self, method: &MethodDescriptor, args: &[Value]) -> Result<(), ValidationError>;
}

///
/// QueryCache
///
/// External key→value store for query results. The executor only reads and
/// invalidates; staleness policy belongs to the implementation.
///
/// Call futures are not `Send` (the interface machinery is reference-counted
/// single-threaded data), so `fetch` arrives as a [`LocalBoxFuture`] and the
/// trait drops the usual `Send` bound on its own futures.
///

#[async_trait(?Send)]
pub trait QueryCache: Send + Sync {
    /// Return the value cached under `key`, or resolve `fetch`, remember its
    /// success and return it.
    async fn get_or_fetch(
        &self,
        key: RequestKey,
        fetch: LocalBoxFuture<'_, Result<Value, CallFailure>>,
    ) -> Result<Value, CallFailure>;

    /// Cached value for `key`, if any.
    async fn get(&self, key: &RequestKey) -> Option<Value>;

    /// Drop every entry covered by `pattern`, returning how many were removed.
    async fn invalidate(&self, pattern: &RequestKey) -> usize;
}

///
/// CallExecutor
///
/// Executes calls against one canister through one parsed interface. The
/// executor is immutable after construction; transports, verifiers,
/// validators and caches are all injected. Interfaces are reference-counted
/// single-threaded data, so call futures are not `Send`; drive them on a
/// current-thread runtime.
///

pub struct CallExecutor {
    interface: Interface,
    canister_id: Principal,
    transport: Arc<dyn Transport>,
    verifier: Arc<dyn CertificateVerifier>,
    polling: PollingPolicy,
    validator: Option<Arc<dyn ArgValidator>>,
    cache: Option<Arc<dyn QueryCache>>,
}

impl CallExecutor {
    #[must_use]
    pub fn new(
        interface: Interface,
        canister_id: Principal,
        transport: Arc<dyn Transport>,
        verifier: Arc<dyn CertificateVerifier>,
    ) -> Self {
        Self {
            interface,
            canister_id,
            transport,
            verifier,
            polling: PollingPolicy::default(),
            validator: None,
            cache: None,
        }
    }

    #[must_use]
    pub fn with_polling(mut self, policy: PollingPolicy) -> Self {
        self.polling = policy;
        self
    }

    #[must_use]
    pub fn with_validator(mut self, validator: Arc<dyn ArgValidator>) -> Self {
        self.validator = Some(validator);
        self
    }

    #[must_use]
    pub fn with_cache(mut self, cache: Arc<dyn QueryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    #[must_use]
    pub fn interface(&self) -> &Interface {
        &self.interface
    }

    #[must_use]
    pub const fn canister_id(&self) -> &Principal {
        &self.canister_id
    }

    /// Execute `method` with display-shaped arguments and return the
    /// display-shaped result. Replies are collapsed by arity: none → null,
    /// one → the value, several → an array.
    pub async fn call(&self, method: &str, args: &[Value]) -> Result<Value, CallFailure> {
        let descriptor = self.descriptor(method)?;
        self.validate(descriptor, args)?;
        debug!(method = %descriptor.name, query = descriptor.query, "dispatching call");

        self.execute(descriptor, args).await
    }

    /// Execute `method` on pre-encoded argument bytes and return the raw
    /// reply bytes. Validation, codecs and result unwrapping are skipped;
    /// the protocol machinery (certificates, rejects, polling) still runs.
    pub async fn call_raw(&self, method: &str, arg: Vec<u8>) -> Result<Vec<u8>, CallFailure> {
        let descriptor = self.descriptor(method)?;
        debug!(method = %descriptor.name, query = descriptor.query, "dispatching raw call");

        Ok(self.dispatch(descriptor, arg).await?)
    }

    /// Like [`Self::call`], but query results are served from the configured
    /// cache. Calls without a cache, non-query methods and
    /// [`QueryOptions::fresh`] all fall back to a direct call.
    pub async fn fetch_query(
        &self,
        method: &str,
        args: &[Value],
        options: QueryOptions,
    ) -> Result<Value, CallFailure> {
        let descriptor = self.descriptor(method)?;
        self.validate(descriptor, args)?;

        let cache = match &self.cache {
            Some(cache) if descriptor.query && !options.fresh => cache,
            _ => return self.execute(descriptor, args).await,
        };

        let key = RequestKey::call(&self.canister_id, &descriptor.name, args);
        cache.get_or_fetch(key, Box::pin(self.execute(descriptor, args))).await
    }

    /// Cached result for one exact call, without going to the network.
    pub async fn cached(&self, method: &str, args: &[Value]) -> Option<Value> {
        let cache = self.cache.as_ref()?;
        cache
            .get(&RequestKey::call(&self.canister_id, method, args))
            .await
    }

    /// Drop cached entries covered by `pattern`. A no-op without a cache.
    pub async fn invalidate(&self, pattern: &RequestKey) -> usize {
        match &self.cache {
            Some(cache) => cache.invalidate(pattern).await,
            None => 0,
        }
    }

    /// Drop every cached entry for this canister.
    pub async fn invalidate_all(&self) -> usize {
        self.invalidate(&RequestKey::canister(&self.canister_id)).await
    }

    /// The cache key [`Self::fetch_query`] would use for this call.
    #[must_use]
    pub fn request_key(&self, method: &str, args: &[Value]) -> RequestKey {
        RequestKey::call(&self.canister_id, method, args)
    }

    /// Prepare `method` as a cache key plus a deferred call, for callers
    /// that drive their own cache. Validation runs up front; the network is
    /// not touched until `fetch` is awaited.
    pub fn query_plan<'a>(
        &'a self,
        method: &str,
        args: &'a [Value],
    ) -> Result<QueryPlan<'a>, CallFailure> {
        let descriptor = self.descriptor(method)?;
        self.validate(descriptor, args)?;

        Ok(QueryPlan {
            key: RequestKey::call(&self.canister_id, &descriptor.name, args),
            fetch: Box::pin(self.execute(descriptor, args)),
        })
    }

    async fn execute(
        &self,
        descriptor: &MethodDescriptor,
        args: &[Value],
    ) -> Result<Value, CallFailure> {
        let wire_args = self.prepare_args(descriptor, args)?;
        let bytes = self.encode_args(descriptor, wire_args)?;
        let reply = self.dispatch(descriptor, bytes).await?;

        self.render_reply(descriptor, &reply)
    }

    fn descriptor(&self, method: &str) -> Result<&MethodDescriptor, CallError> {
        self.interface
            .method(method)
            .ok_or_else(|| CallError::new(method, CallErrorKind::MethodNotFound))
    }

    fn validate(
        &self,
        descriptor: &MethodDescriptor,
        args: &[Value],
    ) -> Result<(), ValidationError> {
        match &self.validator {
            Some(validator) => validator.validate(descriptor, args),
            None => Ok(()),
        }
    }

    /// Transform display arguments into wire values. Any transform failure
    /// downgrades the whole argument list to an untyped passthrough; the
    /// wire encoder then accepts or rejects it.
    fn prepare_args(
        &self,
        descriptor: &MethodDescriptor,
        args: &[Value],
    ) -> Result<Vec<IDLValue>, CallError> {
        if args.len() != descriptor.args.len() {
            return Err(CallError::new(
                &descriptor.name,
                CallErrorKind::InvalidArity {
                    expected: descriptor.args.len(),
                    got: args.len(),
                },
            ));
        }

        let table = self.interface.table();
        let mut wire = Vec::with_capacity(args.len());
        for (codec, value) in descriptor.arg_codecs.iter().zip(args) {
            match codec.encode(table, value) {
                Ok(encoded) => wire.push(encoded),
                Err(err) => {
                    warn!(
                        method = %descriptor.name,
                        error = %err,
                        "argument transform failed; passing arguments through untyped"
                    );
                    return Ok(args.iter().map(untyped_to_wire).collect());
                }
            }
        }

        Ok(wire)
    }

    fn encode_args(
        &self,
        descriptor: &MethodDescriptor,
        wire: Vec<IDLValue>,
    ) -> Result<Vec<u8>, CallError> {
        IDLArgs { args: wire }
            .to_bytes_with_types(self.interface.env(), &descriptor.args)
            .map_err(|err| CallError::new(&descriptor.name, err.into()))
    }

    async fn dispatch(
        &self,
        descriptor: &MethodDescriptor,
        arg: Vec<u8>,
    ) -> Result<Vec<u8>, CallError> {
        let wrap = |kind| CallError::new(&descriptor.name, kind);
        let context = CallContext::new(self.canister_id, &descriptor.name);

        if descriptor.query {
            let response = self
                .transport
                .query(&self.canister_id, &descriptor.name, &arg)
                .await
                .map_err(|err| wrap(err.into()))?;
            return process_query(&context, response).map_err(wrap);
        }

        let response = self
            .transport
            .call(&self.canister_id, &descriptor.name, &arg)
            .await
            .map_err(|err| wrap(err.into()))?;
        let request_id = response.request_id;
        let processor =
            ResponseProcessor::new(self.verifier.as_ref(), self.transport.root_key(), context);

        match processor.process_submit(response).map_err(&wrap)? {
            SubmitOutcome::Reply(reply) => Ok(reply),
            SubmitOutcome::Poll => {
                debug!(method = %descriptor.name, request_id = %request_id, "accepted; polling");
                poll_request(
                    self.transport.as_ref(),
                    &processor,
                    &self.canister_id,
                    &request_id,
                    &self.polling,
                )
                .await
                .map_err(wrap)
            }
        }
    }

    /// Decode, unwrap and transform a reply. Result-shaped replies resolve
    /// to their `Ok` payload or classify their `Err` payload as a
    /// [`CanisterError`]; transform failures fall back to untyped rendering.
    fn render_reply(
        &self,
        descriptor: &MethodDescriptor,
        reply: &[u8],
    ) -> Result<Value, CallFailure> {
        let table = self.interface.table();
        let decoded = IDLArgs::from_bytes_with_types(reply, self.interface.env(), &descriptor.rets)
            .map_err(|err| CallError::new(&descriptor.name, err.into()))?;

        if let (Some(arms), [wire]) = (&descriptor.result_arms, decoded.args.as_slice()) {
            match unwrap::unwrap_result(arms, &descriptor.ret_codecs[0], table, wire) {
                Ok(Unwrapped::Ok(value)) => return Ok(value),
                Ok(Unwrapped::Err(payload)) => {
                    return Err(CanisterError::from_payload(payload).into());
                }
                Err(err) => {
                    warn!(
                        method = %descriptor.name,
                        error = %err,
                        "result transform failed; rendering reply untyped"
                    );
                    return Ok(collapse(
                        decoded.args.iter().map(untyped_from_wire).collect(),
                    ));
                }
            }
        }

        let mut rendered = Vec::with_capacity(decoded.args.len());
        for (codec, wire) in descriptor.ret_codecs.iter().zip(&decoded.args) {
            match codec.decode(table, wire) {
                Ok(value) => rendered.push(value),
                Err(err) => {
                    warn!(
                        method = %descriptor.name,
                        error = %err,
                        "reply transform failed; rendering reply untyped"
                    );
                    rendered = decoded.args.iter().map(untyped_from_wire).collect();
                    break;
                }
            }
        }

        Ok(collapse(rendered))
    }
}

/// Collapse a reply tuple by arity.
fn collapse(mut values: Vec<Value>) -> Value {
    match values.len() {
        0 => Value::Null,
        1 => values.swap_remove(0),
        _ => Value::Array(values),
    }
}

/// Best-effort JSON → wire conversion for the untyped argument fallback.
/// Numbers ride through as numeric literals so the wire encoder can still
/// range-check them against the declared type.
fn untyped_to_wire(value: &Value) -> IDLValue {
    match value {
        Value::Null => IDLValue::Null,
        Value::Bool(b) => IDLValue::Bool(*b),
        Value::Number(n) => IDLValue::Number(n.to_string()),
        Value::String(s) => IDLValue::Text(s.clone()),
        Value::Array(items) => IDLValue::Vec(items.iter().map(untyped_to_wire).collect()),
        Value::Object(fields) => IDLValue::Record(
            fields
                .iter()
                .map(|(name, field)| IDLField {
                    id: Label::Named(name.clone()),
                    val: untyped_to_wire(field),
                })
                .collect(),
        ),
    }
}

/// Best-effort wire → JSON rendering for the untyped reply fallback.
/// Unbounded and 64-bit integers become decimal strings, like their typed
/// counterparts.
fn untyped_from_wire(value: &IDLValue) -> Value {
    match value {
        IDLValue::Null | IDLValue::None | IDLValue::Reserved => Value::Null,
        IDLValue::Bool(b) => Value::Bool(*b),
        IDLValue::Text(s) => Value::String(s.clone()),
        IDLValue::Number(n) => Value::String(n.clone()),
        IDLValue::Nat(n) => Value::String(n.0.to_string()),
        IDLValue::Int(n) => Value::String(n.0.to_string()),
        IDLValue::Nat64(n) => Value::String(n.to_string()),
        IDLValue::Int64(n) => Value::String(n.to_string()),
        IDLValue::Nat8(n) => Value::from(*n),
        IDLValue::Nat16(n) => Value::from(*n),
        IDLValue::Nat32(n) => Value::from(*n),
        IDLValue::Int8(n) => Value::from(*n),
        IDLValue::Int16(n) => Value::from(*n),
        IDLValue::Int32(n) => Value::from(*n),
        IDLValue::Float32(f) => Number::from_f64(f64::from(*f)).map_or(Value::Null, Value::Number),
        IDLValue::Float64(f) => Number::from_f64(*f).map_or(Value::Null, Value::Number),
        IDLValue::Opt(inner) => untyped_from_wire(inner),
        IDLValue::Vec(items) => Value::Array(items.iter().map(untyped_from_wire).collect()),
        IDLValue::Blob(bytes) => blob_value(bytes),
        IDLValue::Record(fields) => Value::Object(
            fields
                .iter()
                .map(|field| (label_key(&field.id), untyped_from_wire(&field.val)))
                .collect(),
        ),
        IDLValue::Variant(variant) => {
            let field = variant.0.as_ref();
            let label = label_key(&field.id);
            let mut object = Map::new();
            object.insert(VARIANT_TAG.to_string(), Value::String(label.clone()));
            if !matches!(field.val, IDLValue::Null) {
                object.insert(label, untyped_from_wire(&field.val));
            }
            Value::Object(object)
        }
        IDLValue::Principal(p) | IDLValue::Service(p) => Value::String(p.to_text()),
        IDLValue::Func(p, method) => Value::Array(vec![
            Value::String(p.to_text()),
            Value::String(method.clone()),
        ]),
    }
}

fn blob_value(bytes: &[u8]) -> Value {
    if bytes.len() <= BLOB_HEX_MAX {
        Value::String(hex::encode(bytes))
    } else {
        Value::Array(bytes.iter().map(|byte| Value::from(*byte)).collect())
    }
}

///
/// TESTS
///
