//! Appraises attestation bundles against caller trust requirements.

use attest_proto::{Attestation, HashAlgo, MachineState, Pcrs, Quote};
use boot_eventlog::{EventLog, ParseError, ReplayError};
use tpm_quote::{AkPublic, AkPublicError, AkPublicKey, QuoteError};

use crate::state::platform_state;

/// What a caller demands of an attestation before trusting it.
#[derive(Debug, Clone)]
pub struct VerifyOpts {
    /// Anti-replay challenge every quote must embed as its extra data.
    pub nonce: Vec<u8>,
    /// Attestation keys the caller trusts. Matching is by key material, so
    /// keys loaded from PEM match keys decoded from a TPMT_PUBLIC area.
    pub trusted_aks: Vec<AkPublicKey>,
    /// Accept the SHA-1 PCR bank when no stronger bank verifies. SHA-1 is
    /// a fallback only and never preempts SHA-256.
    pub allow_sha1: bool,
}

/// Why one PCR bank failed to produce a verified machine state.
#[derive(Debug, thiserror::Error)]
pub enum BankError {
    #[error("the attestation carries no quote for this bank")]
    QuoteMissing,
    #[error(transparent)]
    Quote(#[from] QuoteError),
    #[error(transparent)]
    EventLog(#[from] ParseError),
    #[error(transparent)]
    Replay(#[from] ReplayError),
}

/// Why an attestation was rejected.
#[derive(Debug, thiserror::Error)]
pub enum VerifyError {
    #[error("no trusted attestation keys were supplied")]
    NoTrustedAk,
    /// The attestation key public area does not describe a usable key.
    #[error("attestation key: {0}")]
    BadAkPublic(#[from] AkPublicError),
    #[error("the attestation key does not match any trusted key")]
    NoMatchingAk,
    /// The attestation key declares a signing hash weaker than the options
    /// permit.
    #[error("attestation key signs with {}, which the options do not permit", .0.as_str_name())]
    SigningHashNotPermitted(HashAlgo),
    /// Every permitted bank was tried; each entry names a bank and why it
    /// was rejected.
    #[error("no PCR bank verified: {}", render_attempts(.0))]
    NoValidBank(Vec<(HashAlgo, BankError)>),
}

fn render_attempts(attempts: &[(HashAlgo, BankError)]) -> String {
    let rendered: Vec<String> = attempts
        .iter()
        .map(|(bank, error)| format!("{}: {error}", bank.as_str_name()))
        .collect();
    rendered.join("; ")
}

/// Appraises an attestation into a verified machine state.
///
/// # Parameters
/// - `attestation`: The bundle to appraise: AK public area, quotes, event
///   log, and unverified instance metadata.
/// - `opts`: The caller's trust requirements.
///
/// # Returns
/// The machine state proven by the strongest bank that fully verified: a
/// quote signed by a trusted key over the expected nonce, PCR values
/// matching the quoted digest, and an event log that replays to exactly
/// those values. `raw_events` holds the replay-verified log and `platform`
/// the firmware state derived from it.
///
/// # Errors
/// [`VerifyError::NoTrustedAk`] when `opts` names no keys,
/// [`VerifyError::BadAkPublic`] when the AK public area does not decode to
/// a supported key, [`VerifyError::NoMatchingAk`] when the key is not
/// trusted, and [`VerifyError::NoValidBank`] when every permitted bank
/// fails, carrying the reason for each.
pub fn verify_attestation(
    attestation: &Attestation,
    opts: &VerifyOpts,
) -> Result<MachineState, VerifyError> {
    // Step 1: refuse to appraise anything without a trust anchor.
    if opts.trusted_aks.is_empty() {
        return Err(VerifyError::NoTrustedAk);
    }

    // Step 2: decode the attestation key. Its declared signing hash must be
    // at least as strong as the options permit.
    let ak = AkPublic::decode(&attestation.ak_pub)?;
    if ak.signing_hash == HashAlgo::Sha1 && !opts.allow_sha1 {
        return Err(VerifyError::SigningHashNotPermitted(ak.signing_hash));
    }

    // Step 3: match the key against the trusted set by key material, not by
    // encoding.
    if !opts.trusted_aks.contains(&ak.key) {
        return Err(VerifyError::NoMatchingAk);
    }
    log::debug!(
        "Attestation key recognized, signs with {}",
        ak.signing_hash.as_str_name()
    );

    // Step 4: build the bank trial order, strongest first. Weaker banks are
    // tried only after stronger ones and only when explicitly allowed.
    let mut banks = vec![HashAlgo::Sha256];
    if opts.allow_sha1 {
        banks.push(HashAlgo::Sha1);
    }

    // Step 5: run the bank trials in order. A failed trial leaves nothing
    // behind; the first full success wins.
    let mut attempts = Vec::new();
    for bank in banks {
        match verify_bank(attestation, &ak.key, bank, &opts.nonce) {
            Ok(state) => {
                if bank == HashAlgo::Sha1 {
                    log::warn!("Attestation verified from the SHA-1 bank only");
                }
                match &attestation.instance_info {
                    Some(info) => log::info!(
                        "Attestation verified for instance {} in project {}",
                        info.instance_name,
                        info.project_id
                    ),
                    None => log::info!("Attestation verified"),
                }
                return Ok(state);
            }
            Err(error) => {
                log::debug!("Bank {} rejected: {error}", bank.as_str_name());
                attempts.push((bank, error));
            }
        }
    }
    Err(VerifyError::NoValidBank(attempts))
}

/// Runs one full bank trial: quote verification, log parsing, replay
/// cross-check, and machine state assembly.
fn verify_bank(
    attestation: &Attestation,
    key: &AkPublicKey,
    bank: HashAlgo,
    nonce: &[u8],
) -> Result<MachineState, BankError> {
    let (quote, pcrs) =
        find_quote(&attestation.quotes, bank).ok_or(BankError::QuoteMissing)?;

    key.verify_quote(quote, nonce)?;
    log::debug!("Quote verified for bank {}", bank.as_str_name());

    // The quote proved the PCR values; the log must now explain them.
    let log = EventLog::parse(&attestation.event_log)?;
    let events = log.verify(bank, &pcrs.pcrs)?;
    log::debug!(
        "Event log replayed to the quoted PCR values, {} events",
        events.len()
    );

    Ok(MachineState {
        platform: Some(platform_state(&events, attestation.instance_info.clone())),
        raw_events: events,
        hash: bank as i32,
    })
}

fn find_quote(quotes: &[Quote], bank: HashAlgo) -> Option<(&Quote, &Pcrs)> {
    quotes.iter().find_map(|quote| {
        let pcrs = quote.pcrs.as_ref()?;
        (pcrs.hash() == bank).then_some((quote, pcrs))
    })
}
