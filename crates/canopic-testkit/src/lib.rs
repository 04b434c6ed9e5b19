//! Test utilities and fixtures for exercising Canopic call pipelines.
//!
//! This crate is intended for host-side test environments and provides a
//! scripted [`transport::MockTransport`], verifier-friendly fake
//! certificates, an in-memory query cache and small helpers for generating
//! stable dummy identifiers.

pub mod cache;
pub mod cert;
pub mod transport;

use candid::Principal;
use canopic::protocol::RequestId;

///
/// Deterministic dummy-value generator for tests.
///
/// Produces stable principals/request ids derived from a numeric seed, which
/// makes tests reproducible without hardcoding raw byte arrays.
///

pub struct Fake;

impl Fake {
    ///
    /// Deterministically derive a [`Principal`] from `seed`.
    ///
    #[must_use]
    pub fn principal(seed: u32) -> Principal {
        let mut buf = [0u8; 29];
        buf[..4].copy_from_slice(&seed.to_be_bytes());

        Principal::from_slice(&buf)
    }

    ///
    /// Deterministically derive a [`RequestId`] from `seed`.
    ///
    #[must_use]
    pub fn request_id(seed: u32) -> RequestId {
        let mut bytes = [0u8; 32];
        bytes[..4].copy_from_slice(&seed.to_be_bytes());

        RequestId::new(bytes)
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_principal_is_deterministic_and_unique() {
        let p1 = Fake::principal(7);
        let p2 = Fake::principal(7);
        let q = Fake::principal(8);

        assert_eq!(p1, p2, "Fake::principal should be deterministic");
        assert_ne!(p1, q, "Fake::principal should differ for different seeds");

        let bytes = p1.as_slice();
        assert_eq!(bytes.len(), 29, "Principal must be 29 bytes");
    }

    #[test]
    fn fake_request_id_is_deterministic_and_unique() {
        let r1 = Fake::request_id(3);
        let r2 = Fake::request_id(3);
        let s = Fake::request_id(4);

        assert_eq!(r1, r2, "Fake::request_id should be deterministic");
        assert_ne!(r1, s, "Fake::request_id should vary by seed");
    }
}
