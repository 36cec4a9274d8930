//! # Measured-Boot Event Log
//!
//! Parsing and replay of TCG PC Client event logs, the firmware-written
//! record of everything extended into the TPM's Platform Configuration
//! Registers during boot.
//!
//! The log itself is untrusted input: it arrives from the attested machine
//! and an attacker there can write whatever bytes they like. It becomes
//! meaningful only through replay: folding every recorded digest into
//! zero-initialized virtual registers, in log order, and comparing the
//! result against PCR values proven by a verified TPM quote. A log that
//! replays to the quoted values is the unique explanation of how the
//! machine reached that state.
//!
//! ```ignore
//! use boot_eventlog::EventLog;
//!
//! let log = EventLog::parse(&attestation.event_log)?;
//! let events = log.verify(bank, &quoted_pcrs)?;
//! ```

pub mod parse;
pub mod replay;

#[cfg(test)]
mod testutil;

pub use parse::{
    EventLog, ParseError, RawEvent, EV_NONHOST_INFO, EV_NO_ACTION, EV_SEPARATOR,
    EV_S_CRTM_VERSION,
};
pub use replay::{PcrMismatch, ReplayError};
