//! # TPM Quote Verification
//!
//! Decoding and verification of TPM 2.0 quotes produced by an Attestation
//! Key (AK).
//!
//! A quote is a signed [TPMS_ATTEST] structure covering a composite digest
//! of selected Platform Configuration Registers. Verifying one proves that
//! the PCR values shipped alongside it are the values the TPM actually held,
//! provided the signing AK is trusted. Verification proceeds in five steps:
//!
//! 1. Decode the TPMS_ATTEST message, rejecting anything that is not a
//!    well-formed TPM-generated quote.
//! 2. Check the AK signature over the raw message bytes.
//! 3. Compare the embedded extra data against the challenger's nonce.
//! 4. Recompute the composite digest over the supplied PCR values and
//!    compare it to the quoted digest.
//! 5. Compare the quoted PCR selection against the supplied register set.
//!
//! ## Usage
//!
//! ```ignore
//! use tpm_quote::AkPublic;
//!
//! let ak = AkPublic::decode(&attestation.ak_pub)?;
//! for quote in &attestation.quotes {
//!     ak.key.verify_quote(quote, nonce)?;
//! }
//! ```
//!
//! The PCR values themselves say nothing until replayed against a measured
//! boot event log; that step lives outside this crate.
//!
//! [TPMS_ATTEST]: https://trustedcomputinggroup.org/resource/tpm-library-specification/

pub mod structs;
pub mod verify;

pub use verify::{AkPublic, AkPublicError, AkPublicKey, QuoteError};
