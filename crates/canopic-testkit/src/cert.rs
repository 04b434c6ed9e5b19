//! Fake certificates and a structural verifier.
//!
//! [`StaticCertificate`] is a path→value table that serializes to JSON, so a
//! scripted transport can hand it over as "certificate bytes" and
//! [`StaticVerifier`] can reconstruct it without any cryptography. Helper
//! constructors build the `request_status` subtrees the protocol layer looks
//! up.

use candid::Principal;
use canopic::protocol::{Certificate, CertificateError, CertificateVerifier, RequestId};
use serde::{Deserialize, Serialize};

///
/// StaticCertificate
///

#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct StaticCertificate {
    entries: Vec<(Vec<Vec<u8>>, Vec<u8>)>,
}

impl StaticCertificate {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `path → value` leaf.
    #[must_use]
    pub fn with(mut self, path: &[&[u8]], value: impl Into<Vec<u8>>) -> Self {
        self.entries.push((
            path.iter().map(|segment| segment.to_vec()).collect(),
            value.into(),
        ));
        self
    }

    /// Certificate whose request status is the bare string `status`.
    #[must_use]
    pub fn status(request_id: &RequestId, status: &str) -> Self {
        Self::new().with(
            &[b"request_status", request_id.as_bytes(), b"status"],
            status.as_bytes(),
        )
    }

    /// Certificate for a replied request carrying `reply`.
    #[must_use]
    pub fn replied(request_id: &RequestId, reply: &[u8]) -> Self {
        Self::status(request_id, "replied").with(
            &[b"request_status", request_id.as_bytes(), b"reply"],
            reply,
        )
    }

    /// Certificate for a rejected request.
    #[must_use]
    pub fn rejected(request_id: &RequestId, code: u64, message: &str) -> Self {
        Self::status(request_id, "rejected")
            .with(
                &[b"request_status", request_id.as_bytes(), b"reject_code"],
                leb128(code),
            )
            .with(
                &[b"request_status", request_id.as_bytes(), b"reject_message"],
                message.as_bytes(),
            )
    }

    /// Serialize for use as transport-level certificate bytes.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("static certificate serializes")
    }
}

impl Certificate for StaticCertificate {
    fn lookup_path(&self, path: &[&[u8]]) -> Option<Vec<u8>> {
        self.entries
            .iter()
            .find(|(stored, _)| {
                stored.len() == path.len()
                    && stored
                        .iter()
                        .zip(path.iter())
                        .all(|(a, b)| a.as_slice() == *b)
            })
            .map(|(_, value)| value.clone())
    }
}

///
/// StaticVerifier
///
/// Deserializes [`StaticCertificate`] bytes, or fails unconditionally when
/// built with [`StaticVerifier::failing`].
///

#[derive(Clone, Debug, Default)]
pub struct StaticVerifier {
    failure: Option<String>,
}

impl StaticVerifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn failing(reason: impl Into<String>) -> Self {
        Self {
            failure: Some(reason.into()),
        }
    }
}

impl CertificateVerifier for StaticVerifier {
    fn verify(
        &self,
        certificate: &[u8],
        _root_key: &[u8],
        _canister_id: &Principal,
    ) -> Result<Box<dyn Certificate>, CertificateError> {
        if let Some(reason) = &self.failure {
            return Err(CertificateError::Invalid(reason.clone()));
        }

        let parsed: StaticCertificate = serde_json::from_slice(certificate)
            .map_err(|err| CertificateError::Malformed(err.to_string()))?;
        Ok(Box::new(parsed))
    }
}

fn leb128(mut value: u64) -> Vec<u8> {
    let mut out = Vec::new();
    loop {
        let byte = u8::try_from(value & 0x7f).expect("masked to 7 bits");
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Fake;

    #[test]
    fn lookup_matches_exact_paths_only() {
        let id = Fake::request_id(1);
        let cert = StaticCertificate::replied(&id, b"out");

        assert_eq!(
            cert.lookup_path(&[b"request_status", id.as_bytes(), b"reply"]),
            Some(b"out".to_vec())
        );
        assert_eq!(cert.lookup_path(&[b"request_status", id.as_bytes()]), None);
        assert_eq!(cert.lookup_path(&[b"time"]), None);
    }

    #[test]
    fn verifier_round_trips_certificate_bytes() {
        let id = Fake::request_id(2);
        let bytes = StaticCertificate::rejected(&id, 300, "nope").to_bytes();

        let verified = StaticVerifier::new()
            .verify(&bytes, &[1, 2, 3], &Fake::principal(1))
            .expect("verifies");
        assert_eq!(
            verified.lookup_path(&[b"request_status", id.as_bytes(), b"reject_code"]),
            Some(vec![0xac, 0x02])
        );
    }

    #[test]
    fn failing_verifier_rejects_everything() {
        let err = StaticVerifier::failing("bad signature")
            .verify(b"{}", &[], &Fake::principal(1))
            .expect_err("fails");
        assert!(matches!(err, CertificateError::Invalid(_)));
    }

    #[test]
    fn garbage_bytes_are_malformed() {
        let err = StaticVerifier::new()
            .verify(b"not-json", &[], &Fake::principal(1))
            .expect_err("fails");
        assert!(matches!(err, CertificateError::Malformed(_)));
    }
}
