//! # Software TPM
//!
//! An in-memory stand-in for the TPM collaborator: it keeps SHA-1 and
//! SHA-256 PCR banks, writes a crypto-agile measured-boot log as events are
//! extended, and signs quotes with generated attestation keys. Fixtures
//! built here exercise verification code against the same byte formats a
//! GCE vTPM produces, with none of the platform plumbing.
//!
//! The private keys live in process memory and exist to make tests real;
//! nothing in this crate belongs anywhere near production key handling.

mod ak;

pub use ak::Ak;

use std::collections::BTreeMap;

use attest_proto::{
    Attestation, GceConfidentialTechnology, GceInstanceInfo, HashAlgo, Pcrs, Quote,
};
use boot_eventlog::{EV_NONHOST_INFO, EV_NO_ACTION, EV_SEPARATOR, EV_S_CRTM_VERSION};
use digest::Digest;
use sha1::Sha1;
use sha2::Sha256;

pub(crate) const TPM_ALG_RSA: u16 = 0x0001;
pub(crate) const TPM_ALG_SHA1: u16 = 0x0004;
pub(crate) const TPM_ALG_SHA256: u16 = 0x000b;
pub(crate) const TPM_ALG_NULL: u16 = 0x0010;
pub(crate) const TPM_ALG_RSASSA: u16 = 0x0014;
pub(crate) const TPM_ALG_ECDSA: u16 = 0x0018;
pub(crate) const TPM_ALG_ECC: u16 = 0x0023;
pub(crate) const TPM_ECC_NIST_P256: u16 = 0x0003;

const TPM_GENERATED_VALUE: u32 = 0xff54_4347;
const TPM_ST_ATTEST_QUOTE: u16 = 0x8018;
const PCR_COUNT: u32 = 24;

/// A software TPM with 24 PCRs in a SHA-1 and a SHA-256 bank and an attached
/// crypto-agile event log.
pub struct SoftTpm {
    sha1_bank: Vec<[u8; 20]>,
    sha256_bank: Vec<[u8; 32]>,
    log: Vec<u8>,
}

impl SoftTpm {
    pub fn new() -> Self {
        SoftTpm {
            sha1_bank: vec![[0; 20]; PCR_COUNT as usize],
            sha256_bank: vec![[0; 32]; PCR_COUNT as usize],
            log: spec_id_header(),
        }
    }

    /// Measures `data` into both banks of one register and appends the
    /// matching log record. The recorded digests are the bank hashes of the
    /// data, so the event will later pass digest verification.
    pub fn extend_event(&mut self, pcr_index: u32, event_type: u32, data: &[u8]) {
        let sha1_digest: [u8; 20] = Sha1::digest(data).into();
        let sha256_digest: [u8; 32] = Sha256::digest(data).into();
        self.extend_digests(pcr_index, event_type, &sha1_digest, &sha256_digest, data);
    }

    /// Extends both banks with caller-chosen digests and logs the record,
    /// for measurements whose digest is not simply the hash of the logged
    /// data.
    pub fn extend_digests(
        &mut self,
        pcr_index: u32,
        event_type: u32,
        sha1_digest: &[u8; 20],
        sha256_digest: &[u8; 32],
        data: &[u8],
    ) {
        let index = pcr_index as usize;
        self.sha1_bank[index] = extend_sha1(&self.sha1_bank[index], sha1_digest);
        self.sha256_bank[index] = extend_sha256(&self.sha256_bank[index], sha256_digest);
        self.append_record(pcr_index, event_type, sha1_digest, sha256_digest, data);
    }

    /// Appends an informative EV_NO_ACTION record without extending
    /// anything, the way firmware logs locality or vendor notes.
    pub fn log_no_action(&mut self, pcr_index: u32, data: &[u8]) {
        self.append_record(pcr_index, EV_NO_ACTION, &[0; 20], &[0; 32], data);
    }

    /// Measures a plausible GCE boot: firmware version and confidential
    /// technology on PCR 0, then a separator across PCRs 0 through 7.
    pub fn measure_gce_boot(&mut self, version: u32, technology: GceConfidentialTechnology) {
        self.extend_event(0, EV_S_CRTM_VERSION, &gce_firmware_version_event(version));
        self.extend_event(0, EV_NONHOST_INFO, &gce_nonhost_info_event(technology));
        for pcr in 0..8 {
            self.extend_event(pcr, EV_SEPARATOR, &[0, 0, 0, 0]);
        }
    }

    /// Reads the full 24-register bank.
    pub fn read_pcrs(&self, bank: HashAlgo) -> anyhow::Result<Pcrs> {
        let mut pcrs = BTreeMap::new();
        for index in 0..PCR_COUNT {
            let value = match bank {
                HashAlgo::Sha1 => self.sha1_bank[index as usize].to_vec(),
                HashAlgo::Sha256 => self.sha256_bank[index as usize].to_vec(),
                HashAlgo::HashInvalid => anyhow::bail!("no such bank"),
            };
            pcrs.insert(index, value);
        }
        Ok(Pcrs {
            hash: bank as i32,
            pcrs,
        })
    }

    /// Produces a signed quote over all 24 registers of one bank.
    pub fn quote(&self, ak: &Ak, bank: HashAlgo, nonce: &[u8]) -> anyhow::Result<Quote> {
        let indices: Vec<u32> = (0..PCR_COUNT).collect();
        self.quote_selection(ak, bank, nonce, &indices)
    }

    /// Produces a signed quote over a chosen register selection of one
    /// bank. Repeated indices collapse, the way a selection bitmap would.
    pub fn quote_selection(
        &self,
        ak: &Ak,
        bank: HashAlgo,
        nonce: &[u8],
        indices: &[u32],
    ) -> anyhow::Result<Quote> {
        let full = self.read_pcrs(bank)?;
        let mut selected = BTreeMap::new();
        for &index in indices {
            let value = full
                .pcrs
                .get(&index)
                .ok_or_else(|| anyhow::anyhow!("no PCR {index}"))?;
            selected.insert(index, value.clone());
        }
        let pcrs = Pcrs {
            hash: bank as i32,
            pcrs: selected,
        };
        let message = encode_attest(bank, &pcrs, nonce)?;
        let raw_sig = ak.sign(&message)?;
        Ok(Quote {
            quote: message,
            raw_sig,
            pcrs: Some(pcrs),
        })
    }

    /// Produces a full attestation bundle: AK public area, one quote per
    /// bank (SHA-1 first, as GCE tooling emits them), the event log, and
    /// optional instance metadata.
    pub fn attest(
        &self,
        ak: &Ak,
        nonce: &[u8],
        instance_info: Option<GceInstanceInfo>,
    ) -> anyhow::Result<Attestation> {
        Ok(Attestation {
            ak_pub: ak.public_area(),
            quotes: vec![
                self.quote(ak, HashAlgo::Sha1, nonce)?,
                self.quote(ak, HashAlgo::Sha256, nonce)?,
            ],
            event_log: self.log.clone(),
            instance_info,
        })
    }

    pub fn event_log(&self) -> &[u8] {
        &self.log
    }

    fn append_record(
        &mut self,
        pcr_index: u32,
        event_type: u32,
        sha1_digest: &[u8; 20],
        sha256_digest: &[u8; 32],
        data: &[u8],
    ) {
        self.log.extend_from_slice(&pcr_index.to_le_bytes());
        self.log.extend_from_slice(&event_type.to_le_bytes());
        self.log.extend_from_slice(&2u32.to_le_bytes());
        self.log.extend_from_slice(&TPM_ALG_SHA1.to_le_bytes());
        self.log.extend_from_slice(sha1_digest);
        self.log.extend_from_slice(&TPM_ALG_SHA256.to_le_bytes());
        self.log.extend_from_slice(sha256_digest);
        self.log.extend_from_slice(&(data.len() as u32).to_le_bytes());
        self.log.extend_from_slice(data);
    }
}

impl Default for SoftTpm {
    fn default() -> Self {
        Self::new()
    }
}

/// Event data GCE firmware writes for EV_S_CRTM_VERSION: the version string
/// in UCS-2 little-endian with a terminating NUL.
pub fn gce_firmware_version_event(version: u32) -> Vec<u8> {
    let text = format!("GCE Virtual Firmware v{version}");
    let mut out = Vec::new();
    for unit in text.encode_utf16() {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    out.extend_from_slice(&0u16.to_le_bytes());
    out
}

/// Event data GCE firmware writes for EV_NONHOST_INFO: a fixed 16-byte
/// signature followed by the confidential-technology byte.
pub fn gce_nonhost_info_event(technology: GceConfidentialTechnology) -> Vec<u8> {
    let mut out = Vec::with_capacity(17);
    out.extend_from_slice(b"GCE NonHostInfo\0");
    out.push(technology as u8);
    out
}

pub(crate) fn tpm2b(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u16).to_be_bytes());
    out.extend_from_slice(bytes);
}

fn extend_sha1(register: &[u8; 20], digest: &[u8]) -> [u8; 20] {
    let mut hasher = Sha1::new();
    hasher.update(register);
    hasher.update(digest);
    hasher.finalize().into()
}

fn extend_sha256(register: &[u8; 32], digest: &[u8]) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(register);
    hasher.update(digest);
    hasher.finalize().into()
}

fn encode_attest(bank: HashAlgo, pcrs: &Pcrs, nonce: &[u8]) -> anyhow::Result<Vec<u8>> {
    let mut concatenated = Vec::new();
    for value in pcrs.pcrs.values() {
        concatenated.extend_from_slice(value);
    }
    let composite = match bank {
        HashAlgo::Sha1 => Sha1::digest(&concatenated).to_vec(),
        HashAlgo::Sha256 => Sha256::digest(&concatenated).to_vec(),
        HashAlgo::HashInvalid => anyhow::bail!("no such bank"),
    };

    let mut out = Vec::new();
    out.extend_from_slice(&TPM_GENERATED_VALUE.to_be_bytes());
    out.extend_from_slice(&TPM_ST_ATTEST_QUOTE.to_be_bytes());
    // qualified signer: a SHA-256 object name
    let mut name = Vec::new();
    name.extend_from_slice(&TPM_ALG_SHA256.to_be_bytes());
    name.extend_from_slice(&[0x51; 32]);
    tpm2b(&mut out, &name);
    tpm2b(&mut out, nonce);
    // clock info: clock, reset count, restart count, safe
    out.extend_from_slice(&0x0123_4567u64.to_be_bytes());
    out.extend_from_slice(&1u32.to_be_bytes());
    out.extend_from_slice(&0u32.to_be_bytes());
    out.push(1);
    // firmware version
    out.extend_from_slice(&0x2021_0609_0018_1338u64.to_be_bytes());
    // one selection with the three-byte bitmap a 24-register TPM reports
    let mut bitmap = [0u8; 3];
    for &index in pcrs.pcrs.keys() {
        bitmap[(index / 8) as usize] |= 1u8 << (index % 8);
    }
    out.extend_from_slice(&1u32.to_be_bytes());
    out.extend_from_slice(&(bank as u16).to_be_bytes());
    out.push(3);
    out.extend_from_slice(&bitmap);
    tpm2b(&mut out, &composite);
    Ok(out)
}

fn spec_id_header() -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(b"Spec ID Event03\0");
    data.extend_from_slice(&0u32.to_le_bytes());
    // spec 2.0, errata 0, uintn size 2
    data.extend_from_slice(&[0, 2, 0, 2]);
    data.extend_from_slice(&2u32.to_le_bytes());
    data.extend_from_slice(&TPM_ALG_SHA1.to_le_bytes());
    data.extend_from_slice(&20u16.to_le_bytes());
    data.extend_from_slice(&TPM_ALG_SHA256.to_le_bytes());
    data.extend_from_slice(&32u16.to_le_bytes());
    data.push(0);

    let mut log = Vec::new();
    log.extend_from_slice(&0u32.to_le_bytes());
    log.extend_from_slice(&EV_NO_ACTION.to_le_bytes());
    log.extend_from_slice(&[0; 20]);
    log.extend_from_slice(&(data.len() as u32).to_le_bytes());
    log.extend_from_slice(&data);
    log
}
