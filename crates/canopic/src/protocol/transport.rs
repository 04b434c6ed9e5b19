//! Transport seam between the call pipeline and the network.
//!
//! Implementations speak the replica's HTTP interface (or fake it in tests)
//! and hand back protocol-shaped responses; everything above this trait is
//! transport-agnostic.

use crate::protocol::{QueryResponse, RequestId, SubmitResponse};
use async_trait::async_trait;
use candid::Principal;
use thiserror::Error as ThisError;

///
/// TransportError
///

#[remain::sorted]
#[derive(Debug, ThisError)]
pub enum TransportError {
    #[error("http {status}: {message}")]
    Http { status: u16, message: String },

    #[error("network error: {0}")]
    Network(String),
}

impl TransportError {
    pub fn http(status: u16, message: impl Into<String>) -> Self {
        Self::Http {
            status,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }
}

///
/// Transport
///
/// Sends encoded Candid payloads to a canister. `query` resolves
/// immediately; `call` submits an update whose result may require
/// certificate polling via `read_state`.
///

#[async_trait]
pub trait Transport: Send + Sync {
    /// Execute a query method and return its (uncertified) response.
    async fn query(
        &self,
        canister_id: &Principal,
        method: &str,
        arg: &[u8],
    ) -> Result<QueryResponse, TransportError>;

    /// Submit an update call.
    async fn call(
        &self,
        canister_id: &Principal,
        method: &str,
        arg: &[u8],
    ) -> Result<SubmitResponse, TransportError>;

    /// Fetch a certificate covering the status of a submitted request.
    async fn read_state(
        &self,
        canister_id: &Principal,
        request_id: &RequestId,
    ) -> Result<Vec<u8>, TransportError>;

    /// Root of trust for certificate verification, when known.
    fn root_key(&self) -> Option<Vec<u8>>;
}
