//! Byte-level log builders shared by the unit tests.

use attest_proto::HashAlgo;

use crate::parse::{EV_NO_ACTION, SPEC_ID_SIGNATURE};

pub(crate) fn legacy_record(pcr: u32, typ: u32, digest: &[u8; 20], data: &[u8]) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&pcr.to_le_bytes());
    out.extend_from_slice(&typ.to_le_bytes());
    out.extend_from_slice(digest);
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
    out
}

pub(crate) fn spec_id_header() -> Vec<u8> {
    let mut data = Vec::new();
    data.extend_from_slice(SPEC_ID_SIGNATURE);
    data.extend_from_slice(&0u32.to_le_bytes());
    // spec 2.0, errata 0, uintn size 2
    data.extend_from_slice(&[0, 2, 0, 2]);
    data.extend_from_slice(&2u32.to_le_bytes());
    data.extend_from_slice(&(HashAlgo::Sha1 as u16).to_le_bytes());
    data.extend_from_slice(&20u16.to_le_bytes());
    data.extend_from_slice(&(HashAlgo::Sha256 as u16).to_le_bytes());
    data.extend_from_slice(&32u16.to_le_bytes());
    // vendor info size
    data.push(0);
    legacy_record(0, EV_NO_ACTION, &[0; 20], &data)
}

pub(crate) fn agile_record(
    pcr: u32,
    typ: u32,
    sha1: &[u8; 20],
    sha256: &[u8; 32],
    data: &[u8],
) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(&pcr.to_le_bytes());
    out.extend_from_slice(&typ.to_le_bytes());
    out.extend_from_slice(&2u32.to_le_bytes());
    out.extend_from_slice(&(HashAlgo::Sha1 as u16).to_le_bytes());
    out.extend_from_slice(sha1);
    out.extend_from_slice(&(HashAlgo::Sha256 as u16).to_le_bytes());
    out.extend_from_slice(sha256);
    out.extend_from_slice(&(data.len() as u32).to_le_bytes());
    out.extend_from_slice(data);
    out
}
