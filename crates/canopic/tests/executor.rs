// End-to-end executor scenarios: scripted transport, structural certificate
// verification, no network. Call futures are not Send, so every test runs on
// tokio's current-thread test runtime.

use candid::types::Label;
use candid::types::value::{IDLArgs, IDLField, IDLValue, VariantValue};
use canopic::call::{ArgValidator, CallExecutor, QueryOptions};
use canopic::error::{CallErrorKind, ValidationError, ValidationIssue};
use canopic::interface::{Interface, MethodDescriptor};
use canopic::protocol::{
    PollingPolicy, QueryResponse, RejectBody, RequestId, SubmitBody, SubmitResponse,
};
use canopic_testkit::Fake;
use canopic_testkit::cache::MemoryCache;
use canopic_testkit::cert::{StaticCertificate, StaticVerifier};
use canopic_testkit::transport::{MockTransport, SentKind};
use serde_json::{Value, json};
use std::sync::Arc;

const COUNTER_DID: &str = "service : { get_count : () -> (nat) query; bump : (nat) -> (nat); }";

const PROFILE_DID: &str = "
    type Profile = record { id : principal; balance : nat; active : bool };
    service : { get_profile : (principal) -> (Profile) query; }
";

const RESULT_DID: &str = "
    type Result = variant { Ok : text; Err : text };
    service : { finish : (text) -> (Result) query; }
";

const TRANSFER_DID: &str =
    "service : { transfer : (record { to : opt principal; amount : nat }) -> (nat); }";

fn executor(interface: &Interface, transport: Arc<MockTransport>) -> CallExecutor {
    CallExecutor::new(
        interface.clone(),
        Fake::principal(9),
        transport,
        Arc::new(StaticVerifier::new()),
    )
}

fn encode_rets(interface: &Interface, method: &str, values: Vec<IDLValue>) -> Vec<u8> {
    let descriptor = interface.method(method).expect("method exists");
    IDLArgs { args: values }
        .to_bytes_with_types(interface.env(), &descriptor.rets)
        .expect("reply encodes")
}

fn variant(arm: &str, payload: IDLValue) -> IDLValue {
    IDLValue::Variant(VariantValue(
        Box::new(IDLField {
            id: Label::Named(arm.to_string()),
            val: payload,
        }),
        0,
    ))
}

fn accepted(request_id: RequestId) -> SubmitResponse {
    SubmitResponse {
        request_id,
        status: 202,
        body: None,
    }
}

fn certified(request_id: RequestId, certificate: Vec<u8>) -> SubmitResponse {
    SubmitResponse {
        request_id,
        status: 200,
        body: Some(SubmitBody::Certificate(certificate)),
    }
}

#[tokio::test]
async fn queries_decode_to_display_values() {
    let interface = Interface::parse(COUNTER_DID).expect("interface parses");
    let reply = encode_rets(
        &interface,
        "get_count",
        vec![IDLValue::Number("1000000".to_string())],
    );
    let transport = Arc::new(MockTransport::new().reply_query(QueryResponse::Replied {
        arg: reply,
    }));
    let exec = executor(&interface, transport.clone());

    let value = exec.call("get_count", &[]).await.expect("query resolves");

    assert_eq!(value, json!("1000000"));
    let sent = transport.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].kind, SentKind::Query);
    assert_eq!(sent[0].method, "get_count");
    assert_eq!(sent[0].canister_id, Fake::principal(9));
}

#[tokio::test]
async fn record_replies_render_field_by_field() {
    let interface = Interface::parse(PROFILE_DID).expect("interface parses");
    let owner = Fake::principal(3);
    let reply = encode_rets(
        &interface,
        "get_profile",
        vec![IDLValue::Record(vec![
            IDLField {
                id: Label::Named("id".to_string()),
                val: IDLValue::Principal(owner),
            },
            IDLField {
                id: Label::Named("balance".to_string()),
                val: IDLValue::Number("123456789012345".to_string()),
            },
            IDLField {
                id: Label::Named("active".to_string()),
                val: IDLValue::Bool(true),
            },
        ])],
    );
    let transport = Arc::new(MockTransport::new().reply_query(QueryResponse::Replied {
        arg: reply,
    }));
    let exec = executor(&interface, transport.clone());

    let value = exec
        .call("get_profile", &[json!(owner.to_text())])
        .await
        .expect("query resolves");
    assert_eq!(
        value,
        json!({
            "id": owner.to_text(),
            "balance": "123456789012345",
            "active": true,
        })
    );

    // The principal argument went out typed, not as text.
    let descriptor = interface.method("get_profile").expect("method exists");
    let expected_arg = IDLArgs {
        args: vec![IDLValue::Principal(owner)],
    }
    .to_bytes_with_types(interface.env(), &descriptor.args)
    .expect("arg encodes");
    assert_eq!(transport.sent()[0].arg, expected_arg);
}

#[tokio::test]
async fn query_rejects_surface_uncertified_rejections() {
    let interface = Interface::parse(COUNTER_DID).expect("interface parses");
    let transport = Arc::new(MockTransport::new().reply_query(QueryResponse::Rejected(
        RejectBody {
            reject_code: 4,
            reject_message: "method rejected".to_string(),
            error_code: Some("IC0406".to_string()),
        },
    )));
    let exec = executor(&interface, transport);

    let failure = exec.call("get_count", &[]).await.expect_err("rejected");

    let call_err = failure.as_call().expect("call error");
    let rejection = call_err.rejection().expect("rejection attached");
    assert!(!rejection.certified);
    assert_eq!(rejection.reject_code, 4);
    assert_eq!(rejection.error_code.as_deref(), Some("IC0406"));
    assert_eq!(rejection.request_id, None);
    assert_eq!(rejection.context.canister_id, Fake::principal(9));
    assert_eq!(rejection.context.method, "get_count");
}

#[tokio::test]
async fn transport_failures_surface_as_call_errors() {
    let interface = Interface::parse(COUNTER_DID).expect("interface parses");
    let transport = Arc::new(
        MockTransport::new().fail_query(canopic::protocol::TransportError::http(
            503,
            "gateway unavailable",
        )),
    );
    let exec = executor(&interface, transport);

    let failure = exec.call("get_count", &[]).await.expect_err("transport down");

    let call_err = failure.as_call().expect("call error");
    assert!(matches!(call_err.kind, CallErrorKind::Transport(_)));
    assert!(call_err.to_string().contains("http 503"));
}

#[tokio::test]
async fn updates_resolve_from_certified_replies() {
    let interface = Interface::parse(COUNTER_DID).expect("interface parses");
    let id = Fake::request_id(7);
    let reply = encode_rets(&interface, "bump", vec![IDLValue::Number("6".to_string())]);
    let cert = StaticCertificate::replied(&id, &reply).to_bytes();
    let transport =
        Arc::new(MockTransport::with_root_key(vec![1]).reply_call(certified(id, cert)));
    let exec = executor(&interface, transport.clone());

    let value = exec.call("bump", &[json!("5")]).await.expect("update resolves");

    assert_eq!(value, json!("6"));
    assert_eq!(transport.sent_count(SentKind::Call), 1);
    assert_eq!(transport.sent_count(SentKind::ReadState), 0);
}

#[tokio::test]
async fn updates_surface_certified_rejects() {
    let interface = Interface::parse(COUNTER_DID).expect("interface parses");
    let id = Fake::request_id(7);
    let cert = StaticCertificate::rejected(&id, 5, "canister trapped").to_bytes();
    let transport =
        Arc::new(MockTransport::with_root_key(vec![1]).reply_call(certified(id, cert)));
    let exec = executor(&interface, transport);

    let failure = exec.call("bump", &[json!("5")]).await.expect_err("rejected");

    let rejection = failure
        .as_call()
        .and_then(|err| err.rejection())
        .expect("rejection attached");
    assert!(rejection.certified);
    assert_eq!(rejection.reject_code, 5);
    assert_eq!(rejection.reject_message, "canister trapped");
    assert_eq!(rejection.request_id, Some(id));
    assert_eq!(rejection.context.method, "bump");
    assert_eq!(rejection.context.transport_status, Some(200));
}

#[tokio::test(start_paused = true)]
async fn accepted_updates_poll_until_replied() {
    let interface = Interface::parse(COUNTER_DID).expect("interface parses");
    let id = Fake::request_id(7);
    let reply = encode_rets(&interface, "bump", vec![IDLValue::Number("6".to_string())]);
    let transport = Arc::new(
        MockTransport::with_root_key(vec![1])
            .reply_call(accepted(id))
            .reply_state(StaticCertificate::status(&id, "received").to_bytes())
            .reply_state(StaticCertificate::status(&id, "processing").to_bytes())
            .reply_state(StaticCertificate::replied(&id, &reply).to_bytes()),
    );
    let exec = executor(&interface, transport.clone());

    let value = exec.call("bump", &[json!("5")]).await.expect("update resolves");

    assert_eq!(value, json!("6"));
    assert_eq!(transport.sent_count(SentKind::ReadState), 3);
}

#[tokio::test(start_paused = true)]
async fn polling_stops_at_the_attempt_limit() {
    let interface = Interface::parse(COUNTER_DID).expect("interface parses");
    let id = Fake::request_id(7);
    let transport = Arc::new(
        MockTransport::with_root_key(vec![1])
            .reply_call(accepted(id))
            .reply_state(StaticCertificate::status(&id, "processing").to_bytes())
            .reply_state(StaticCertificate::status(&id, "processing").to_bytes()),
    );
    let exec = executor(&interface, transport.clone()).with_polling(PollingPolicy::attempts(2));

    let failure = exec.call("bump", &[json!("5")]).await.expect_err("gives up");

    let call_err = failure.as_call().expect("call error");
    assert!(matches!(
        &call_err.kind,
        CallErrorKind::PollingExceeded {
            attempts: 2,
            last_status,
            ..
        } if last_status == "processing"
    ));
    assert_eq!(transport.sent_count(SentKind::ReadState), 2);
}

#[tokio::test]
async fn done_requests_have_no_reply() {
    let interface = Interface::parse(COUNTER_DID).expect("interface parses");
    let id = Fake::request_id(7);
    let transport = Arc::new(
        MockTransport::with_root_key(vec![1])
            .reply_call(accepted(id))
            .reply_state(StaticCertificate::status(&id, "done").to_bytes()),
    );
    let exec = executor(&interface, transport);

    let failure = exec.call("bump", &[json!("5")]).await.expect_err("pruned");

    let call_err = failure.as_call().expect("call error");
    assert!(matches!(call_err.kind, CallErrorKind::StatusDoneNoReply));
}

#[tokio::test]
async fn updates_without_a_root_key_cannot_verify() {
    let interface = Interface::parse(COUNTER_DID).expect("interface parses");
    let id = Fake::request_id(7);
    let cert = StaticCertificate::replied(&id, b"reply").to_bytes();
    // No root key configured on the transport.
    let transport = Arc::new(MockTransport::new().reply_call(certified(id, cert)));
    let exec = executor(&interface, transport);

    let failure = exec.call("bump", &[json!("5")]).await.expect_err("no root key");

    let call_err = failure.as_call().expect("call error");
    assert!(matches!(call_err.kind, CallErrorKind::MissingRootKey));
}

#[tokio::test]
async fn verifier_failures_are_fatal() {
    let interface = Interface::parse(COUNTER_DID).expect("interface parses");
    let id = Fake::request_id(7);
    let cert = StaticCertificate::replied(&id, b"reply").to_bytes();
    let transport =
        Arc::new(MockTransport::with_root_key(vec![1]).reply_call(certified(id, cert)));
    let exec = CallExecutor::new(
        interface,
        Fake::principal(9),
        transport,
        Arc::new(StaticVerifier::failing("signature mismatch")),
    );

    let failure = exec.call("bump", &[json!("5")]).await.expect_err("bad signature");

    let call_err = failure.as_call().expect("call error");
    assert!(matches!(call_err.kind, CallErrorKind::Certificate(_)));
}

#[tokio::test]
async fn ok_results_unwrap_to_their_payload() {
    let interface = Interface::parse(RESULT_DID).expect("interface parses");
    let reply = encode_rets(
        &interface,
        "finish",
        vec![variant("Ok", IDLValue::Text("success-value".to_string()))],
    );
    let transport = Arc::new(MockTransport::new().reply_query(QueryResponse::Replied {
        arg: reply,
    }));
    let exec = executor(&interface, transport);

    let value = exec
        .call("finish", &[json!("job-1")])
        .await
        .expect("ok arm resolves");

    assert_eq!(value, json!("success-value"));
}

#[tokio::test]
async fn err_results_classify_as_canister_errors() {
    let interface = Interface::parse(RESULT_DID).expect("interface parses");
    let reply = encode_rets(
        &interface,
        "finish",
        vec![variant("Err", IDLValue::Text("boom".to_string()))],
    );
    let transport = Arc::new(MockTransport::new().reply_query(QueryResponse::Replied {
        arg: reply,
    }));
    let exec = executor(&interface, transport);

    let failure = exec
        .call("finish", &[json!("job-1")])
        .await
        .expect_err("err arm fails");

    let canister_err = failure.as_canister().expect("canister error");
    assert_eq!(canister_err.err, json!("boom"));
    assert_eq!(canister_err.message, "Canister Error: boom");
    assert_eq!(canister_err.code, canopic::CanisterError::UNKNOWN_CODE);
}

struct RequireRecipient;

impl ArgValidator for RequireRecipient {
    fn validate(&self, method: &MethodDescriptor, args: &[Value]) -> Result<(), ValidationError> {
        let missing = args
            .first()
            .and_then(|arg| arg.get("to"))
            .is_none_or(Value::is_null);
        if missing {
            return Err(ValidationError::new(
                &method.name,
                vec![
                    ValidationIssue::new(vec!["to".into()], "recipient is required")
                        .with_code("required"),
                ],
            ));
        }

        Ok(())
    }
}

#[tokio::test]
async fn validators_run_before_any_network_activity() {
    let interface = Interface::parse(TRANSFER_DID).expect("interface parses");
    let transport = Arc::new(MockTransport::new());
    let exec = executor(&interface, transport.clone()).with_validator(Arc::new(RequireRecipient));

    let failure = exec
        .call("transfer", &[json!({ "amount": "5" })])
        .await
        .expect_err("blocked");

    let validation = failure.as_validation().expect("validation failure");
    assert_eq!(validation.method, "transfer");
    assert!(validation.has_issue_at(&"to".into()));
    assert!(transport.sent().is_empty());
}

#[tokio::test]
async fn raw_calls_skip_codecs_entirely() {
    let interface = Interface::parse(COUNTER_DID).expect("interface parses");
    let transport = Arc::new(MockTransport::new().reply_query(QueryResponse::Replied {
        arg: b"raw-reply".to_vec(),
    }));
    let exec = executor(&interface, transport.clone());

    let reply = exec
        .call_raw("get_count", b"DIDL\x00\x00".to_vec())
        .await
        .expect("raw call resolves");

    assert_eq!(reply, b"raw-reply");
    assert_eq!(transport.sent()[0].arg, b"DIDL\x00\x00");
}

#[tokio::test]
async fn query_results_are_cached_per_key() {
    let interface = Interface::parse(COUNTER_DID).expect("interface parses");
    let reply = encode_rets(
        &interface,
        "get_count",
        vec![IDLValue::Number("1000000".to_string())],
    );
    let transport = Arc::new(MockTransport::new().reply_query(QueryResponse::Replied {
        arg: reply,
    }));
    let cache = Arc::new(MemoryCache::new());
    let exec = executor(&interface, transport.clone()).with_cache(cache.clone());

    let first = exec
        .fetch_query("get_count", &[], QueryOptions::default())
        .await
        .expect("fetches");
    let second = exec
        .fetch_query("get_count", &[], QueryOptions::default())
        .await
        .expect("served from cache");

    assert_eq!(first, json!("1000000"));
    assert_eq!(second, json!("1000000"));
    assert_eq!(transport.sent_count(SentKind::Query), 1);
    assert_eq!(cache.hits(), 1);
    assert_eq!(cache.misses(), 1);
    assert_eq!(exec.cached("get_count", &[]).await, Some(json!("1000000")));

    assert_eq!(exec.invalidate_all().await, 1);
    assert_eq!(exec.cached("get_count", &[]).await, None);
}

#[tokio::test]
async fn fresh_queries_bypass_the_cache() {
    let interface = Interface::parse(COUNTER_DID).expect("interface parses");
    let first = encode_rets(&interface, "get_count", vec![IDLValue::Number("7".to_string())]);
    let second = encode_rets(&interface, "get_count", vec![IDLValue::Number("8".to_string())]);
    let transport = Arc::new(
        MockTransport::new()
            .reply_query(QueryResponse::Replied { arg: first })
            .reply_query(QueryResponse::Replied { arg: second }),
    );
    let cache = Arc::new(MemoryCache::new());
    let exec = executor(&interface, transport.clone()).with_cache(cache);

    exec.fetch_query("get_count", &[], QueryOptions::default())
        .await
        .expect("fetches");
    let fresh = exec
        .fetch_query("get_count", &[], QueryOptions { fresh: true })
        .await
        .expect("bypasses cache");

    assert_eq!(fresh, json!("8"));
    assert_eq!(transport.sent_count(SentKind::Query), 2);

    // The fresh fetch never touched the cache; the stale entry is still there.
    assert_eq!(exec.cached("get_count", &[]).await, Some(json!("7")));
    assert_eq!(exec.invalidate(&exec.request_key("get_count", &[])).await, 1);
    assert_eq!(exec.cached("get_count", &[]).await, None);
}

#[tokio::test]
async fn without_a_cache_every_query_goes_out() {
    let interface = Interface::parse(COUNTER_DID).expect("interface parses");
    let first = encode_rets(&interface, "get_count", vec![IDLValue::Number("7".to_string())]);
    let second = encode_rets(&interface, "get_count", vec![IDLValue::Number("8".to_string())]);
    let transport = Arc::new(
        MockTransport::new()
            .reply_query(QueryResponse::Replied { arg: first })
            .reply_query(QueryResponse::Replied { arg: second }),
    );
    let exec = executor(&interface, transport.clone());

    exec.fetch_query("get_count", &[], QueryOptions::default())
        .await
        .expect("fetches");
    exec.fetch_query("get_count", &[], QueryOptions::default())
        .await
        .expect("fetches again");

    assert_eq!(transport.sent_count(SentKind::Query), 2);
    assert_eq!(exec.cached("get_count", &[]).await, None);
    assert_eq!(exec.invalidate_all().await, 0);
}

#[tokio::test]
async fn query_plans_expose_a_key_and_a_deferred_fetch() {
    let interface = Interface::parse(COUNTER_DID).expect("interface parses");
    let reply = encode_rets(&interface, "get_count", vec![IDLValue::Number("41".to_string())]);
    let transport = Arc::new(MockTransport::new().reply_query(QueryResponse::Replied {
        arg: reply,
    }));
    let exec = executor(&interface, transport.clone());

    let plan = exec.query_plan("get_count", &[]).expect("plan builds");
    assert_eq!(plan.key, exec.request_key("get_count", &[]));
    assert!(transport.sent().is_empty());

    let value = plan.fetch.await.expect("fetch resolves");
    assert_eq!(value, json!("41"));
    assert_eq!(transport.sent_count(SentKind::Query), 1);
}

#[tokio::test]
async fn validators_gate_query_plans() {
    let interface = Interface::parse(TRANSFER_DID).expect("interface parses");
    let transport = Arc::new(MockTransport::new());
    let exec = executor(&interface, transport.clone()).with_validator(Arc::new(RequireRecipient));

    let args = [json!({ "to": null, "amount": "10" })];
    let failure = exec.query_plan("transfer", &args).expect_err("blocked");

    assert!(failure.as_validation().is_some());
    assert!(transport.sent().is_empty());
}
