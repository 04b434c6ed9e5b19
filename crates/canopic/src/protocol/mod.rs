//! Wire-agnostic call protocol: response shapes, certificate handling and
//! polling.
//!
//! A [`Transport`] produces [`QueryResponse`]/[`SubmitResponse`] values;
//! [`ResponseProcessor`] turns them into reply bytes or typed failures,
//! deferring signature checks to an injected [`CertificateVerifier`].
//! Update calls that are accepted but not yet executed are driven to
//! completion by the polling loop under a [`PollingPolicy`].

mod certificate;
mod polling;
mod transport;

pub use certificate::{Certificate, CertificateError, CertificateVerifier, RequestStatus};
pub use polling::{PollLimit, PollingPolicy};
pub use transport::{Transport, TransportError};

pub(crate) use polling::poll_request;

use crate::error::CallErrorKind;
use candid::Principal;
use std::fmt;

///
/// RequestId
///
/// 32-byte identifier of a submitted update call, displayed as hex.
///

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct RequestId([u8; 32]);

impl RequestId {
    #[must_use]
    pub const fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<[u8; 32]> for RequestId {
    fn from(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

///
/// RejectBody
///
/// Reject payload as decoded off the wire.
///

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RejectBody {
    pub reject_code: u64,
    pub reject_message: String,
    pub error_code: Option<String>,
}

///
/// QueryResponse
///

#[derive(Clone, Debug)]
pub enum QueryResponse {
    Replied { arg: Vec<u8> },
    Rejected(RejectBody),
}

///
/// SubmitResponse
///
/// Outcome of submitting an update call. Responses either carry a
/// certificate covering the request status, a synchronous uncertified
/// reject, or no body at all (accepted for asynchronous execution).
///

#[derive(Clone, Debug)]
pub struct SubmitResponse {
    pub request_id: RequestId,
    /// Transport-level status; 202 means accepted for asynchronous execution.
    pub status: u16,
    pub body: Option<SubmitBody>,
}

///
/// SubmitBody
///

#[derive(Clone, Debug)]
pub enum SubmitBody {
    Certificate(Vec<u8>),
    Rejected(RejectBody),
}

///
/// CallContext
///
/// Where a reject happened: the target canister, the method, and the
/// transport status of the response that carried it (when one did).
///

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CallContext {
    pub canister_id: Principal,
    pub method: String,
    pub transport_status: Option<u16>,
}

impl CallContext {
    #[must_use]
    pub fn new(canister_id: Principal, method: impl Into<String>) -> Self {
        Self {
            canister_id,
            method: method.into(),
            transport_status: None,
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.transport_status = Some(status);
        self
    }
}

///
/// RejectionInfo
///
/// A canister or replica reject, certified or not, attached to the call
/// that provoked it.
///

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RejectionInfo {
    /// Identifier of the submitted request, when the reject came from one.
    pub request_id: Option<RequestId>,
    pub reject_code: u64,
    pub reject_message: String,
    pub error_code: Option<String>,
    /// `true` when the reject was read from a verified certificate.
    pub certified: bool,
    pub context: CallContext,
}

impl RejectionInfo {
    #[must_use]
    pub fn certified(request_id: RequestId, body: RejectBody, context: CallContext) -> Self {
        Self {
            request_id: Some(request_id),
            reject_code: body.reject_code,
            reject_message: body.reject_message,
            error_code: body.error_code,
            certified: true,
            context,
        }
    }

    #[must_use]
    pub fn uncertified(
        request_id: Option<RequestId>,
        body: RejectBody,
        context: CallContext,
    ) -> Self {
        Self {
            request_id,
            reject_code: body.reject_code,
            reject_message: body.reject_message,
            error_code: body.error_code,
            certified: false,
            context,
        }
    }
}

impl fmt::Display for RejectionInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = if self.certified {
            "certified reject"
        } else {
            "reject"
        };
        write!(f, "{kind} (code {})", self.reject_code)?;
        if let Some(code) = &self.error_code {
            write!(f, " [{code}]")?;
        }
        write!(f, ": {}", self.reject_message)
    }
}

///
/// SubmitOutcome
///

#[derive(Debug)]
pub enum SubmitOutcome {
    /// Certified reply available without polling.
    Reply(Vec<u8>),
    /// Accepted; poll `read_state` for the result.
    Poll,
}

/// Resolve a query response to its reply bytes.
pub fn process_query(
    context: &CallContext,
    response: QueryResponse,
) -> Result<Vec<u8>, CallErrorKind> {
    match response {
        QueryResponse::Replied { arg } => Ok(arg),
        QueryResponse::Rejected(body) => Err(CallErrorKind::Rejected(RejectionInfo::uncertified(
            None,
            body,
            context.clone(),
        ))),
    }
}

///
/// ResponseProcessor
///
/// Interprets submit responses and certified request statuses for one call.
/// Every rejection it classifies carries the call's [`CallContext`]. The
/// root key is required the moment a certificate has to be verified; its
/// absence is fatal at that point and not before.
///

pub struct ResponseProcessor<'a> {
    verifier: &'a dyn CertificateVerifier,
    root_key: Option<Vec<u8>>,
    context: CallContext,
}

impl<'a> ResponseProcessor<'a> {
    #[must_use]
    pub const fn new(
        verifier: &'a dyn CertificateVerifier,
        root_key: Option<Vec<u8>>,
        context: CallContext,
    ) -> Self {
        Self {
            verifier,
            root_key,
            context,
        }
    }

    /// Interpret a submit response.
    ///
    /// Certificates whose status is neither `replied` nor `rejected` fall
    /// through: the call is treated as accepted when the transport said 202,
    /// and as an unexpected response otherwise. A certified reply wins over
    /// polling.
    pub fn process_submit(&self, response: SubmitResponse) -> Result<SubmitOutcome, CallErrorKind> {
        let SubmitResponse {
            request_id,
            status,
            body,
        } = response;

        let mut reply = None;
        match body {
            Some(SubmitBody::Certificate(bytes)) => {
                match self.check_status(&request_id, &bytes)? {
                    RequestStatus::Replied(arg) => reply = Some(arg),
                    RequestStatus::Rejected(reject) => {
                        let context = self.context.clone().with_status(status);
                        return Err(CallErrorKind::Rejected(RejectionInfo::certified(
                            request_id, reject, context,
                        )));
                    }
                    _ => {}
                }
            }
            Some(SubmitBody::Rejected(reject)) => {
                let context = self.context.clone().with_status(status);
                return Err(CallErrorKind::Rejected(RejectionInfo::uncertified(
                    Some(request_id),
                    reject,
                    context,
                )));
            }
            None => {}
        }

        if let Some(arg) = reply {
            return Ok(SubmitOutcome::Reply(arg));
        }
        if status == 202 {
            return Ok(SubmitOutcome::Poll);
        }

        Err(CallErrorKind::UnexpectedResponse(format!(
            "submit returned status {status} with no usable body"
        )))
    }

    /// Verify `certificate` and read the status of `request_id` from it.
    pub fn check_status(
        &self,
        request_id: &RequestId,
        certificate: &[u8],
    ) -> Result<RequestStatus, CallErrorKind> {
        let verified = self.verify(certificate)?;
        certificate::read_request_status(verified.as_ref(), request_id)
    }

    /// Classify a certified reject read back while polling.
    #[must_use]
    pub fn certified_rejection(&self, request_id: &RequestId, body: RejectBody) -> RejectionInfo {
        RejectionInfo::certified(*request_id, body, self.context.clone())
    }

    fn verify(&self, certificate: &[u8]) -> Result<Box<dyn Certificate>, CallErrorKind> {
        let root_key = self
            .root_key
            .as_deref()
            .ok_or(CallErrorKind::MissingRootKey)?;

        Ok(self
            .verifier
            .verify(certificate, root_key, &self.context.canister_id)?)
    }
}

///
/// TESTS
///
