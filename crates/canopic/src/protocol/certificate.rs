//! Certificate verification seam and request-status lookup.
//!
//! Verification itself is injected through [`CertificateVerifier`]; this
//! module only walks the verified tree. Status values follow the replica's
//! request lifecycle: `received` and `processing` mean keep polling,
//! `replied`/`rejected` are terminal, `done` means the reply was already
//! pruned.

use crate::error::CallErrorKind;
use crate::protocol::{RejectBody, RequestId};
use candid::Principal;
use std::fmt;
use thiserror::Error as ThisError;

///
/// CertificateError
///

#[remain::sorted]
#[derive(Debug, ThisError)]
pub enum CertificateError {
    #[error("certificate verification failed: {0}")]
    Invalid(String),

    #[error("malformed certificate: {0}")]
    Malformed(String),
}

///
/// Certificate
///
/// A verified certificate tree. `lookup_path` returns the leaf value at
/// `path`, or `None` when the path is absent or pruned.
///

pub trait Certificate {
    fn lookup_path(&self, path: &[&[u8]]) -> Option<Vec<u8>>;
}

impl fmt::Debug for dyn Certificate + '_ {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate").finish_non_exhaustive()
    }
}

///
/// CertificateVerifier
///
/// Checks a certificate's signature chain against a root key and the
/// canister's delegation scope, returning the tree on success.
///

pub trait CertificateVerifier: Send + Sync {
    fn verify(
        &self,
        certificate: &[u8],
        root_key: &[u8],
        canister_id: &Principal,
    ) -> Result<Box<dyn Certificate>, CertificateError>;
}

///
/// RequestStatus
///
/// Certified status of a submitted request.
///

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RequestStatus {
    /// No status recorded yet; equivalent to `received` for polling.
    Absent,
    Received,
    Processing,
    Replied(Vec<u8>),
    Rejected(RejectBody),
    /// Terminal, but the reply is no longer retained.
    Done,
    Unknown(String),
}

impl RequestStatus {
    #[must_use]
    pub fn label(&self) -> &str {
        match self {
            Self::Absent => "unknown",
            Self::Received => "received",
            Self::Processing => "processing",
            Self::Replied(_) => "replied",
            Self::Rejected(_) => "rejected",
            Self::Done => "done",
            Self::Unknown(status) => status,
        }
    }
}

/// Read the status of `request_id` from a verified certificate.
pub(crate) fn read_request_status(
    certificate: &dyn Certificate,
    request_id: &RequestId,
) -> Result<RequestStatus, CallErrorKind> {
    let id = request_id.as_bytes();
    let Some(status) = certificate.lookup_path(&[b"request_status", id, b"status"]) else {
        return Ok(RequestStatus::Absent);
    };

    let status = String::from_utf8_lossy(&status);
    let state = match status.as_ref() {
        "replied" => {
            let reply = certificate
                .lookup_path(&[b"request_status", id, b"reply"])
                .ok_or_else(|| {
                    CallErrorKind::UnexpectedResponse(
                        "certified status is replied but carries no reply".to_string(),
                    )
                })?;
            RequestStatus::Replied(reply)
        }
        "rejected" => RequestStatus::Rejected(read_rejection(certificate, id)),
        "processing" => RequestStatus::Processing,
        "received" => RequestStatus::Received,
        "done" => RequestStatus::Done,
        other => RequestStatus::Unknown(other.to_string()),
    };

    Ok(state)
}

fn read_rejection(certificate: &dyn Certificate, id: &[u8]) -> RejectBody {
    let reject_code = certificate
        .lookup_path(&[b"request_status", id, b"reject_code"])
        .and_then(|bytes| decode_leb128(&bytes))
        .unwrap_or(0);
    let reject_message = certificate
        .lookup_path(&[b"request_status", id, b"reject_message"])
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned())
        .unwrap_or_default();
    let error_code = certificate
        .lookup_path(&[b"request_status", id, b"error_code"])
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());

    RejectBody {
        reject_code,
        reject_message,
        error_code,
    }
}

fn decode_leb128(bytes: &[u8]) -> Option<u64> {
    let mut value: u64 = 0;
    let mut shift: u32 = 0;

    for &byte in bytes {
        value |= u64::from(byte & 0x7f) << shift;
        if byte & 0x80 == 0 {
            return Some(value);
        }
        shift += 7;
        if shift >= 64 {
            return None;
        }
    }

    None
}

///
/// TESTS
///
