//! # Attestation Verification
//!
//! Turns a GCE vTPM attestation bundle into a verified
//! [`MachineState`](attest_proto::MachineState) and evaluates administrator
//! [`Policy`](attest_proto::Policy) over it.
//!
//! Appraisal runs in order:
//! 1. match the attestation key against the caller's trusted set,
//! 2. verify the quote of the strongest permitted PCR bank,
//! 3. parse the event log and replay it against the quoted PCR values,
//! 4. derive the platform firmware state from the verified events.
//!
//! SHA-1 banks are appraised only when the caller opts in, and never before
//! SHA-256 has been tried.
//!
//! ```ignore
//! use attest_verifier::{evaluate_policy, verify_attestation, VerifyOpts};
//!
//! let opts = VerifyOpts {
//!     nonce: challenge.to_vec(),
//!     trusted_aks: vec![registered_ak],
//!     allow_sha1: false,
//! };
//! let state = verify_attestation(&attestation, &opts)?;
//! evaluate_policy(&state, &policy)?;
//! ```

pub mod policy;
pub mod state;
pub mod verify;

pub use policy::{evaluate_policy, PolicyError, Violation};
pub use state::platform_state;
pub use verify::{verify_attestation, BankError, VerifyError, VerifyOpts};
