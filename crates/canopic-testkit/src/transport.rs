//! Scripted in-memory transport.
//!
//! [`MockTransport`] replays queued responses in order and records every
//! request it receives, so tests can assert both what the pipeline sent and
//! how it reacted to each scripted reply.

use async_trait::async_trait;
use candid::Principal;
use canopic::protocol::{QueryResponse, RequestId, SubmitResponse, Transport, TransportError};
use std::collections::VecDeque;
use std::sync::Mutex;

///
/// SentKind
///

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SentKind {
    Query,
    Call,
    ReadState,
}

///
/// SentRequest
///
/// One request as the transport saw it. `method` and `arg` are empty for
/// `read_state`.
///

#[derive(Clone, Debug)]
pub struct SentRequest {
    pub kind: SentKind,
    pub canister_id: Principal,
    pub method: String,
    pub arg: Vec<u8>,
}

///
/// MockTransport
///

#[derive(Debug, Default)]
pub struct MockTransport {
    root_key: Option<Vec<u8>>,
    queries: Mutex<VecDeque<Result<QueryResponse, TransportError>>>,
    calls: Mutex<VecDeque<Result<SubmitResponse, TransportError>>>,
    states: Mutex<VecDeque<Result<Vec<u8>, TransportError>>>,
    sent: Mutex<Vec<SentRequest>>,
}

impl MockTransport {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_root_key(root_key: impl Into<Vec<u8>>) -> Self {
        Self {
            root_key: Some(root_key.into()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn reply_query(self, response: QueryResponse) -> Self {
        self.queries
            .lock()
            .expect("mock transport lock")
            .push_back(Ok(response));
        self
    }

    #[must_use]
    pub fn fail_query(self, error: TransportError) -> Self {
        self.queries
            .lock()
            .expect("mock transport lock")
            .push_back(Err(error));
        self
    }

    #[must_use]
    pub fn reply_call(self, response: SubmitResponse) -> Self {
        self.calls
            .lock()
            .expect("mock transport lock")
            .push_back(Ok(response));
        self
    }

    #[must_use]
    pub fn fail_call(self, error: TransportError) -> Self {
        self.calls
            .lock()
            .expect("mock transport lock")
            .push_back(Err(error));
        self
    }

    #[must_use]
    pub fn reply_state(self, certificate: impl Into<Vec<u8>>) -> Self {
        self.states
            .lock()
            .expect("mock transport lock")
            .push_back(Ok(certificate.into()));
        self
    }

    #[must_use]
    pub fn fail_state(self, error: TransportError) -> Self {
        self.states
            .lock()
            .expect("mock transport lock")
            .push_back(Err(error));
        self
    }

    /// Every request received so far, in order.
    #[must_use]
    pub fn sent(&self) -> Vec<SentRequest> {
        self.sent.lock().expect("mock transport lock").clone()
    }

    /// Number of requests of one kind received so far.
    #[must_use]
    pub fn sent_count(&self, kind: SentKind) -> usize {
        self.sent
            .lock()
            .expect("mock transport lock")
            .iter()
            .filter(|request| request.kind == kind)
            .count()
    }

    fn record(&self, kind: SentKind, canister_id: &Principal, method: &str, arg: &[u8]) {
        self.sent
            .lock()
            .expect("mock transport lock")
            .push(SentRequest {
                kind,
                canister_id: *canister_id,
                method: method.to_string(),
                arg: arg.to_vec(),
            });
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn query(
        &self,
        canister_id: &Principal,
        method: &str,
        arg: &[u8],
    ) -> Result<QueryResponse, TransportError> {
        self.record(SentKind::Query, canister_id, method, arg);
        self.queries
            .lock()
            .expect("mock transport lock")
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::network("no scripted query response")))
    }

    async fn call(
        &self,
        canister_id: &Principal,
        method: &str,
        arg: &[u8],
    ) -> Result<SubmitResponse, TransportError> {
        self.record(SentKind::Call, canister_id, method, arg);
        self.calls
            .lock()
            .expect("mock transport lock")
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::network("no scripted call response")))
    }

    async fn read_state(
        &self,
        canister_id: &Principal,
        _request_id: &RequestId,
    ) -> Result<Vec<u8>, TransportError> {
        self.record(SentKind::ReadState, canister_id, "", &[]);
        self.states
            .lock()
            .expect("mock transport lock")
            .pop_front()
            .unwrap_or_else(|| Err(TransportError::network("no scripted read_state response")))
    }

    fn root_key(&self) -> Option<Vec<u8>> {
        self.root_key.clone()
    }
}

///
/// TESTS
///
