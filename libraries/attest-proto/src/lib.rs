//! # Attestation Wire Schema
//!
//! Protobuf messages exchanged between a GCE VM producing vTPM attestations
//! and the server verifying them: the [`Attestation`] bundle and its quotes,
//! the verified [`MachineState`] a verifier derives from one, and the
//! [`Policy`] an administrator evaluates against that state.
//!
//! Field numbers and enum values are a compatibility contract with existing
//! producers. [`HashAlgo`] values are TPM 2.0 algorithm identifiers, which
//! is why `SHA1 = 4` and `SHA256 = 11`.
//!
//! Policy and instance-info messages additionally implement serde so that
//! policies can be authored as JSON, with `bytes` fields rendered as hex.

mod attest;

pub use attest::*;

impl HashAlgo {
    /// Digest length in bytes, or `None` for [`HashAlgo::HashInvalid`].
    pub fn digest_size(&self) -> Option<usize> {
        match self {
            HashAlgo::HashInvalid => None,
            HashAlgo::Sha1 => Some(20),
            HashAlgo::Sha256 => Some(32),
        }
    }
}
