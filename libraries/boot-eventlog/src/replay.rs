//! Replay of a parsed event log against quoted PCR values.
//!
//! PCR extension is non-commutative, so the virtual registers are folded
//! strictly in log order. A log only explains a quote when every register it
//! touches replays to exactly the quoted value; any divergence means the log
//! was tampered with, reordered or truncated, and the attestation must be
//! rejected even though the quote signature itself was valid.

use std::collections::BTreeMap;
use std::fmt;

use attest_proto::{Event, HashAlgo};
use digest::Digest;

use crate::parse::{EventLog, RawEvent, EV_NO_ACTION};

/// Ways a log can fail to explain quoted PCR values.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplayError {
    /// The log does not carry digests in the requested bank.
    #[error("event log carries no {} bank", .0.as_str_name())]
    MissingBank(HashAlgo),
    /// One or more replayed registers diverged from the quote.
    #[error("replayed PCRs diverge from the quote: {}", render_mismatches(.0))]
    Mismatch(Vec<PcrMismatch>),
}

/// A virtual register whose replayed value disagrees with the quote.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcrMismatch {
    pub pcr_index: u32,
    pub replayed: Vec<u8>,
    /// `None` when the log extends a register the quote does not cover.
    pub quoted: Option<Vec<u8>>,
}

impl fmt::Display for PcrMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.quoted {
            Some(quoted) => write!(
                f,
                "PCR {}: replayed {}, quoted {}",
                self.pcr_index,
                hex::encode(&self.replayed),
                hex::encode(quoted)
            ),
            None => write!(
                f,
                "PCR {}: replayed {}, absent from the quote",
                self.pcr_index,
                hex::encode(&self.replayed)
            ),
        }
    }
}

fn render_mismatches(failed: &[PcrMismatch]) -> String {
    let rendered: Vec<String> = failed.iter().map(ToString::to_string).collect();
    rendered.join("; ")
}

impl EventLog {
    /// Computes virtual PCR values for one bank.
    ///
    /// Every register starts as the all-zero value sized for the bank and is
    /// extended with each event digest in log order: `hash(register || digest)`.
    /// EV_NO_ACTION records are informative and never extended. Only
    /// registers the log actually extends appear in the result.
    pub fn replay(&self, bank: HashAlgo) -> Result<BTreeMap<u32, Vec<u8>>, ReplayError> {
        let Some(digest_size) = bank.digest_size() else {
            return Err(ReplayError::MissingBank(bank));
        };
        if !self.has_bank(bank) {
            return Err(ReplayError::MissingBank(bank));
        }
        let extend_register: fn(&[u8], &[u8]) -> Vec<u8> = match bank {
            HashAlgo::Sha1 => extend::<sha1::Sha1>,
            HashAlgo::Sha256 => extend::<sha2::Sha256>,
            HashAlgo::HashInvalid => return Err(ReplayError::MissingBank(bank)),
        };
        let mut registers: BTreeMap<u32, Vec<u8>> = BTreeMap::new();
        for event in self.events() {
            if event.event_type == EV_NO_ACTION {
                continue;
            }
            let digest = event
                .digest(bank as u16)
                .ok_or(ReplayError::MissingBank(bank))?;
            let register = registers
                .entry(event.pcr_index)
                .or_insert_with(|| vec![0; digest_size]);
            *register = extend_register(register, digest);
        }
        Ok(registers)
    }

    /// Replays the log in one bank and cross-checks the result against
    /// quoted PCR values, returning the boot events the quote vouches for.
    ///
    /// Divergences are collected across all registers before failing, so the
    /// error names every PCR that disagrees. Quoted registers the log never
    /// extends pass vacuously; the log simply says nothing about them.
    /// Events on registers outside the quote are dropped from the returned
    /// stream. Each returned event carries `digest_verified`: whether the
    /// recorded digest equals the bank hash of the recorded data. Consumers
    /// must ignore the data of events failing that check; for informative
    /// records such as EV_NO_ACTION a `false` there does not imply
    /// tampering.
    pub fn verify(
        &self,
        bank: HashAlgo,
        quoted: &BTreeMap<u32, Vec<u8>>,
    ) -> Result<Vec<Event>, ReplayError> {
        let replayed = self.replay(bank)?;
        let mut failed = Vec::new();
        for (pcr_index, value) in &replayed {
            match quoted.get(pcr_index) {
                Some(quoted_value) if quoted_value == value => {}
                quoted_value => failed.push(PcrMismatch {
                    pcr_index: *pcr_index,
                    replayed: value.clone(),
                    quoted: quoted_value.cloned(),
                }),
            }
        }
        if !failed.is_empty() {
            return Err(ReplayError::Mismatch(failed));
        }
        Ok(self
            .events()
            .iter()
            .filter(|event| quoted.contains_key(&event.pcr_index))
            .map(|event| to_proto_event(event, bank))
            .collect())
    }
}

fn extend<D: Digest>(register: &[u8], digest: &[u8]) -> Vec<u8> {
    let mut hasher = D::new();
    hasher.update(register);
    hasher.update(digest);
    hasher.finalize().to_vec()
}

fn to_proto_event(event: &RawEvent, bank: HashAlgo) -> Event {
    let digest = event.digest(bank as u16).unwrap_or_default().to_vec();
    let digest_verified = match bank {
        HashAlgo::Sha1 => sha1::Sha1::digest(&event.data).as_slice() == digest,
        HashAlgo::Sha256 => sha2::Sha256::digest(&event.data).as_slice() == digest,
        HashAlgo::HashInvalid => false,
    };
    Event {
        pcr_index: event.pcr_index,
        untrusted_type: event.event_type,
        data: event.data.clone(),
        digest,
        digest_verified,
    }
}
