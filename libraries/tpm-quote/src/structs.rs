//! Big-endian decoding of the TPM 2.0 structures a quote verifier consumes.
//!
//! Only the structures and algorithms GCE attestation keys actually produce
//! are supported; anything else is rejected rather than guessed at. Every
//! length field is bounds-checked against the remaining input before use.

use nom::bytes::complete::take;
use nom::number::complete::{be_u16, be_u32, be_u64, be_u8};
use nom::IResult;

/// TPM_GENERATED_VALUE, the magic every TPM-generated attestation starts with.
pub const TPM_GENERATED_VALUE: u32 = 0xff54_4347;
/// TPM_ST_ATTEST_QUOTE
pub const TPM_ST_ATTEST_QUOTE: u16 = 0x8018;

pub const TPM_ALG_RSA: u16 = 0x0001;
pub const TPM_ALG_SHA1: u16 = 0x0004;
pub const TPM_ALG_SHA256: u16 = 0x000b;
pub const TPM_ALG_NULL: u16 = 0x0010;
pub const TPM_ALG_RSASSA: u16 = 0x0014;
pub const TPM_ALG_ECDSA: u16 = 0x0018;
pub const TPM_ALG_ECC: u16 = 0x0023;
/// TPM_ECC_NIST_P256
pub const TPM_ECC_NIST_P256: u16 = 0x0003;

/// Ways a marshalled TPM structure can fail to decode.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StructError {
    #[error("structure is truncated")]
    Truncated,
    #[error("trailing bytes after structure")]
    TrailingData,
    #[error("attestation does not start with TPM_GENERATED_VALUE")]
    BadMagic,
    #[error("attestation type is not TPM_ST_ATTEST_QUOTE")]
    NotAQuote,
    #[error("expected exactly one PCR selection, got {0}")]
    SelectionCount(u32),
    #[error("unsupported algorithm {0:#06x}")]
    UnsupportedAlgorithm(u16),
}

/// The quote-relevant content of a marshalled TPMS_ATTEST.
///
/// The qualified signer, clock info and firmware version are consumed for
/// structural validation but carry no verification weight here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TpmsAttest {
    /// Challenger-provided anti-replay data (TPM2B_DATA)
    pub extra_data: Vec<u8>,
    /// The single PCR selection the quote covers
    pub pcr_select: PcrSelection,
    /// Composite digest of the selected PCR values
    pub pcr_digest: Vec<u8>,
}

/// One TPMS_PCR_SELECTION: a bank and the registers quoted under it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PcrSelection {
    /// TPM_ALG_* identifier of the bank
    pub hash: u16,
    /// Selected PCR indices, ascending; a bitmap cannot express duplicates
    pub pcrs: Vec<u32>,
}

/// A marshalled TPMT_SIGNATURE an attestation key can produce.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TpmtSignature {
    /// RSASSA (PKCS#1 v1.5) over the named hash
    RsaSsa { hash: u16, signature: Vec<u8> },
    /// ECDSA over the named hash, r and s as separate TPM2B scalars
    Ecdsa { hash: u16, r: Vec<u8>, s: Vec<u8> },
}

/// The key-bearing content of a marshalled TPMT_PUBLIC area.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TpmtPublic {
    Rsa {
        symmetric: u16,
        scheme: u16,
        scheme_hash: u16,
        key_bits: u16,
        exponent: u32,
        modulus: Vec<u8>,
    },
    Ecc {
        symmetric: u16,
        scheme: u16,
        scheme_hash: u16,
        curve_id: u16,
        x: Vec<u8>,
        y: Vec<u8>,
    },
}

impl TpmsAttest {
    /// Decodes a marshalled TPMS_ATTEST, consuming the entire input.
    ///
    /// SECURITY:
    /// The Trusted Platform Module Library Part 1: Architecture states in
    /// 9.5.3.2 that an entity checking an attestation made by an AK must
    /// verify that the signed message begins with TPM_GENERATED_VALUE, so
    /// that a quote cannot be confused with other signed content. That check
    /// happens here; a blob with the wrong magic never decodes.
    pub fn unmarshal(input: &[u8]) -> Result<Self, StructError> {
        let (input, magic) = step(be_u32(input))?;
        if magic != TPM_GENERATED_VALUE {
            return Err(StructError::BadMagic);
        }
        let (input, attest_type) = step(be_u16(input))?;
        if attest_type != TPM_ST_ATTEST_QUOTE {
            return Err(StructError::NotAQuote);
        }
        let (input, _qualified_signer) = step(sized_buffer(input))?;
        let (input, extra_data) = step(sized_buffer(input))?;
        // TPMS_CLOCK_INFO and the firmware version
        let (input, _clock) = step(be_u64(input))?;
        let (input, _reset_count) = step(be_u32(input))?;
        let (input, _restart_count) = step(be_u32(input))?;
        let (input, _safe) = step(be_u8(input))?;
        let (input, _firmware_version) = step(be_u64(input))?;
        let (input, selection_count) = step(be_u32(input))?;
        if selection_count != 1 {
            return Err(StructError::SelectionCount(selection_count));
        }
        let (input, pcr_select) = step(pcr_selection(input))?;
        let (input, pcr_digest) = step(sized_buffer(input))?;
        ensure_consumed(input)?;
        Ok(TpmsAttest {
            extra_data: extra_data.to_vec(),
            pcr_select,
            pcr_digest: pcr_digest.to_vec(),
        })
    }
}

impl TpmtSignature {
    /// Decodes a marshalled TPMT_SIGNATURE, consuming the entire input.
    pub fn unmarshal(input: &[u8]) -> Result<Self, StructError> {
        let (input, sig_alg) = step(be_u16(input))?;
        match sig_alg {
            TPM_ALG_RSASSA => {
                let (input, hash) = step(be_u16(input))?;
                let (input, signature) = step(sized_buffer(input))?;
                ensure_consumed(input)?;
                Ok(TpmtSignature::RsaSsa {
                    hash,
                    signature: signature.to_vec(),
                })
            }
            TPM_ALG_ECDSA => {
                let (input, hash) = step(be_u16(input))?;
                let (input, r) = step(sized_buffer(input))?;
                let (input, s) = step(sized_buffer(input))?;
                ensure_consumed(input)?;
                Ok(TpmtSignature::Ecdsa {
                    hash,
                    r: r.to_vec(),
                    s: s.to_vec(),
                })
            }
            other => Err(StructError::UnsupportedAlgorithm(other)),
        }
    }
}

impl TpmtPublic {
    /// Decodes a marshalled TPMT_PUBLIC area, consuming the entire input.
    pub fn unmarshal(input: &[u8]) -> Result<Self, StructError> {
        let (input, key_alg) = step(be_u16(input))?;
        let (input, _name_alg) = step(be_u16(input))?;
        let (input, _object_attributes) = step(be_u32(input))?;
        let (input, _auth_policy) = step(sized_buffer(input))?;
        match key_alg {
            TPM_ALG_RSA => {
                let (input, symmetric) = step(sym_def_object(input))?;
                let (input, (scheme, scheme_hash)) = step(scheme_with_hash(input))?;
                let (input, key_bits) = step(be_u16(input))?;
                let (input, exponent) = step(be_u32(input))?;
                let (input, modulus) = step(sized_buffer(input))?;
                ensure_consumed(input)?;
                Ok(TpmtPublic::Rsa {
                    symmetric,
                    scheme,
                    scheme_hash,
                    key_bits,
                    exponent,
                    modulus: modulus.to_vec(),
                })
            }
            TPM_ALG_ECC => {
                let (input, symmetric) = step(sym_def_object(input))?;
                let (input, (scheme, scheme_hash)) = step(scheme_with_hash(input))?;
                let (input, curve_id) = step(be_u16(input))?;
                let (input, _kdf) = step(scheme_with_hash(input))?;
                let (input, x) = step(sized_buffer(input))?;
                let (input, y) = step(sized_buffer(input))?;
                ensure_consumed(input)?;
                Ok(TpmtPublic::Ecc {
                    symmetric,
                    scheme,
                    scheme_hash,
                    curve_id,
                    x: x.to_vec(),
                    y: y.to_vec(),
                })
            }
            other => Err(StructError::UnsupportedAlgorithm(other)),
        }
    }
}

fn step<'a, T>(parsed: IResult<&'a [u8], T>) -> Result<(&'a [u8], T), StructError> {
    parsed.map_err(|_| StructError::Truncated)
}

fn ensure_consumed(input: &[u8]) -> Result<(), StructError> {
    if input.is_empty() {
        Ok(())
    } else {
        Err(StructError::TrailingData)
    }
}

/// TPM2B: a 16-bit size followed by that many bytes.
fn sized_buffer(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, size) = be_u16(input)?;
    take(size)(input)
}

fn pcr_selection(input: &[u8]) -> IResult<&[u8], PcrSelection> {
    let (input, hash) = be_u16(input)?;
    let (input, sizeof_select) = be_u8(input)?;
    let (input, bitmap) = take(sizeof_select)(input)?;
    let mut pcrs = Vec::new();
    for (byte_index, byte) in bitmap.iter().enumerate() {
        for bit in 0..8 {
            if byte & (1 << bit) != 0 {
                pcrs.push((byte_index * 8 + bit) as u32);
            }
        }
    }
    Ok((input, PcrSelection { hash, pcrs }))
}

/// TPMT_SYM_DEF_OBJECT: the algorithm, plus key bits and mode when not null.
fn sym_def_object(input: &[u8]) -> IResult<&[u8], u16> {
    let (input, alg) = be_u16(input)?;
    if alg == TPM_ALG_NULL {
        return Ok((input, alg));
    }
    let (input, _key_bits) = be_u16(input)?;
    let (input, _mode) = be_u16(input)?;
    Ok((input, alg))
}

/// TPMT_*_SCHEME: the scheme identifier, plus its hash when not null.
fn scheme_with_hash(input: &[u8]) -> IResult<&[u8], (u16, u16)> {
    let (input, scheme) = be_u16(input)?;
    if scheme == TPM_ALG_NULL {
        return Ok((input, (scheme, TPM_ALG_NULL)));
    }
    let (input, hash) = be_u16(input)?;
    Ok((input, (scheme, hash)))
}

#[cfg(test)]
mod test {
    use super::*;

    fn sample_attest() -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&TPM_GENERATED_VALUE.to_be_bytes());
        out.extend_from_slice(&TPM_ST_ATTEST_QUOTE.to_be_bytes());
        // qualified signer
        out.extend_from_slice(&4u16.to_be_bytes());
        out.extend_from_slice(&[0xde, 0xad, 0xbe, 0xef]);
        // extra data
        out.extend_from_slice(&3u16.to_be_bytes());
        out.extend_from_slice(b"abc");
        // clock info + firmware version
        out.extend_from_slice(&7u64.to_be_bytes());
        out.extend_from_slice(&1u32.to_be_bytes());
        out.extend_from_slice(&0u32.to_be_bytes());
        out.push(1);
        out.extend_from_slice(&0x20120420u64.to_be_bytes());
        // one SHA-256 selection over PCRs 0, 1 and 23
        out.extend_from_slice(&1u32.to_be_bytes());
        out.extend_from_slice(&TPM_ALG_SHA256.to_be_bytes());
        out.push(3);
        out.extend_from_slice(&[0b0000_0011, 0x00, 0b1000_0000]);
        // pcr digest
        out.extend_from_slice(&32u16.to_be_bytes());
        out.extend_from_slice(&[0x42; 32]);
        out
    }

    #[test]
    fn attest_unmarshals() {
        let attest = TpmsAttest::unmarshal(&sample_attest()).unwrap();
        assert_eq!(attest.extra_data, b"abc");
        assert_eq!(attest.pcr_select.hash, TPM_ALG_SHA256);
        assert_eq!(attest.pcr_select.pcrs, [0, 1, 23]);
        assert_eq!(attest.pcr_digest, [0x42; 32]);
    }

    #[test]
    fn attest_rejects_bad_magic() {
        let mut raw = sample_attest();
        raw[0] ^= 0xff;
        assert_eq!(TpmsAttest::unmarshal(&raw), Err(StructError::BadMagic));
    }

    #[test]
    fn attest_rejects_non_quote_type() {
        let mut raw = sample_attest();
        // TPM_ST_ATTEST_CERTIFY
        raw[4..6].copy_from_slice(&0x8017u16.to_be_bytes());
        assert_eq!(TpmsAttest::unmarshal(&raw), Err(StructError::NotAQuote));
    }

    #[test]
    fn attest_rejects_truncation_at_every_length() {
        let raw = sample_attest();
        for len in 0..raw.len() {
            assert_eq!(
                TpmsAttest::unmarshal(&raw[..len]),
                Err(StructError::Truncated),
                "length {len} should not decode"
            );
        }
    }

    #[test]
    fn attest_rejects_trailing_bytes() {
        let mut raw = sample_attest();
        raw.push(0);
        assert_eq!(TpmsAttest::unmarshal(&raw), Err(StructError::TrailingData));
    }

    #[test]
    fn attest_rejects_multiple_selections() {
        let mut raw = sample_attest();
        // selection count sits right after the 8-byte firmware version
        let count_offset = 4 + 2 + 6 + 5 + 17 + 8;
        raw[count_offset..count_offset + 4].copy_from_slice(&2u32.to_be_bytes());
        assert_eq!(TpmsAttest::unmarshal(&raw), Err(StructError::SelectionCount(2)));
    }

    #[test]
    fn attest_rejects_hostile_buffer_size() {
        let mut raw = sample_attest();
        // claim a 0xffff-byte extra data buffer without supplying it
        raw[12..14].copy_from_slice(&0xffffu16.to_be_bytes());
        assert_eq!(TpmsAttest::unmarshal(&raw), Err(StructError::Truncated));
    }

    #[test]
    fn signature_unmarshals_rsassa() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&TPM_ALG_RSASSA.to_be_bytes());
        raw.extend_from_slice(&TPM_ALG_SHA256.to_be_bytes());
        raw.extend_from_slice(&4u16.to_be_bytes());
        raw.extend_from_slice(&[1, 2, 3, 4]);
        assert_eq!(
            TpmtSignature::unmarshal(&raw).unwrap(),
            TpmtSignature::RsaSsa {
                hash: TPM_ALG_SHA256,
                signature: vec![1, 2, 3, 4],
            }
        );
    }

    #[test]
    fn signature_unmarshals_ecdsa() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&TPM_ALG_ECDSA.to_be_bytes());
        raw.extend_from_slice(&TPM_ALG_SHA1.to_be_bytes());
        raw.extend_from_slice(&2u16.to_be_bytes());
        raw.extend_from_slice(&[0xaa, 0xbb]);
        raw.extend_from_slice(&1u16.to_be_bytes());
        raw.push(0xcc);
        assert_eq!(
            TpmtSignature::unmarshal(&raw).unwrap(),
            TpmtSignature::Ecdsa {
                hash: TPM_ALG_SHA1,
                r: vec![0xaa, 0xbb],
                s: vec![0xcc],
            }
        );
    }

    #[test]
    fn signature_rejects_unsupported_algorithm() {
        // TPM_ALG_HMAC
        let raw = 0x0005u16.to_be_bytes();
        assert_eq!(
            TpmtSignature::unmarshal(&raw),
            Err(StructError::UnsupportedAlgorithm(0x0005))
        );
    }

    #[test]
    fn public_area_unmarshals_ecc() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&TPM_ALG_ECC.to_be_bytes());
        raw.extend_from_slice(&TPM_ALG_SHA256.to_be_bytes());
        raw.extend_from_slice(&0x0004_0472u32.to_be_bytes());
        raw.extend_from_slice(&0u16.to_be_bytes());
        raw.extend_from_slice(&TPM_ALG_NULL.to_be_bytes());
        raw.extend_from_slice(&TPM_ALG_ECDSA.to_be_bytes());
        raw.extend_from_slice(&TPM_ALG_SHA256.to_be_bytes());
        raw.extend_from_slice(&TPM_ECC_NIST_P256.to_be_bytes());
        raw.extend_from_slice(&TPM_ALG_NULL.to_be_bytes());
        raw.extend_from_slice(&32u16.to_be_bytes());
        raw.extend_from_slice(&[0x11; 32]);
        raw.extend_from_slice(&32u16.to_be_bytes());
        raw.extend_from_slice(&[0x22; 32]);
        assert_eq!(
            TpmtPublic::unmarshal(&raw).unwrap(),
            TpmtPublic::Ecc {
                symmetric: TPM_ALG_NULL,
                scheme: TPM_ALG_ECDSA,
                scheme_hash: TPM_ALG_SHA256,
                curve_id: TPM_ECC_NIST_P256,
                x: vec![0x11; 32],
                y: vec![0x22; 32],
            }
        );
    }

    #[test]
    fn public_area_unmarshals_rsa_with_default_exponent() {
        let mut raw = Vec::new();
        raw.extend_from_slice(&TPM_ALG_RSA.to_be_bytes());
        raw.extend_from_slice(&TPM_ALG_SHA256.to_be_bytes());
        raw.extend_from_slice(&0x0004_0472u32.to_be_bytes());
        raw.extend_from_slice(&0u16.to_be_bytes());
        raw.extend_from_slice(&TPM_ALG_NULL.to_be_bytes());
        raw.extend_from_slice(&TPM_ALG_RSASSA.to_be_bytes());
        raw.extend_from_slice(&TPM_ALG_SHA256.to_be_bytes());
        raw.extend_from_slice(&2048u16.to_be_bytes());
        raw.extend_from_slice(&0u32.to_be_bytes());
        raw.extend_from_slice(&4u16.to_be_bytes());
        raw.extend_from_slice(&[0xf1, 0xf2, 0xf3, 0xf5]);
        assert_eq!(
            TpmtPublic::unmarshal(&raw).unwrap(),
            TpmtPublic::Rsa {
                symmetric: TPM_ALG_NULL,
                scheme: TPM_ALG_RSASSA,
                scheme_hash: TPM_ALG_SHA256,
                key_bits: 2048,
                exponent: 0,
                modulus: vec![0xf1, 0xf2, 0xf3, 0xf5],
            }
        );
    }

    #[test]
    fn public_area_rejects_unsupported_key_algorithm() {
        let mut raw = Vec::new();
        // TPM_ALG_KEYEDHASH
        raw.extend_from_slice(&0x0008u16.to_be_bytes());
        raw.extend_from_slice(&TPM_ALG_SHA256.to_be_bytes());
        raw.extend_from_slice(&0u32.to_be_bytes());
        raw.extend_from_slice(&0u16.to_be_bytes());
        assert_eq!(
            TpmtPublic::unmarshal(&raw),
            Err(StructError::UnsupportedAlgorithm(0x0008))
        );
    }
}
