//! Verify quotes with an Attestation Key.

use attest_proto::{HashAlgo, Quote};
use digest::Digest;
use p256::ecdsa::signature::hazmat::PrehashVerifier;
use p256::ecdsa::VerifyingKey;
use rsa::{BigUint, Pkcs1v15Sign, RsaPublicKey};
use subtle::ConstantTimeEq;

use crate::structs::{
    PcrSelection, StructError, TpmsAttest, TpmtPublic, TpmtSignature, TPM_ALG_ECDSA, TPM_ALG_NULL,
    TPM_ALG_RSASSA, TPM_ALG_SHA1, TPM_ALG_SHA256, TPM_ECC_NIST_P256,
};

const P256_SCALAR_SIZE: usize = 32;

/// Ways a quote can fail verification.
#[derive(Debug, thiserror::Error)]
pub enum QuoteError {
    /// The quote bundle is internally inconsistent.
    #[error("malformed quote: {0}")]
    Malformed(&'static str),
    /// A TPM structure inside the quote failed to decode.
    #[error("malformed quote: {0}")]
    Struct(#[from] StructError),
    #[error("quote signature did not verify against the attestation key")]
    SignatureInvalid,
    #[error("quote extra data does not match the expected nonce")]
    NonceMismatch,
    #[error("composite digest of the supplied PCR values does not match the quoted digest")]
    PcrDigestMismatch,
    #[error("quoted PCR selection does not match the supplied PCR values")]
    PcrSelectionMismatch,
}

/// Ways a TPMT_PUBLIC area can fail to yield a usable attestation key.
#[derive(Debug, thiserror::Error)]
pub enum AkPublicError {
    #[error("malformed public area: {0}")]
    Struct(#[from] StructError),
    #[error("attestation key symmetric field is not null")]
    SymmetricNotNull,
    #[error("unsupported signing scheme {0:#06x}")]
    UnsupportedScheme(u16),
    #[error("unsupported signing hash {0:#06x}")]
    UnsupportedHash(u16),
    #[error("unsupported ECC curve {0:#06x}")]
    UnsupportedCurve(u16),
    #[error("invalid key material: {0}")]
    InvalidKey(String),
}

/// An attestation key public half, RSA or NIST P-256.
///
/// Equality compares the underlying key material, so a decoded TPMT_PUBLIC
/// can be matched against keys loaded from PEM.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AkPublicKey {
    Rsa(RsaPublicKey),
    Ecdsa(VerifyingKey),
}

/// An attestation key decoded from its TPMT_PUBLIC area: the key material
/// plus the hash algorithm the key signs with.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AkPublic {
    pub key: AkPublicKey,
    pub signing_hash: HashAlgo,
}

impl AkPublic {
    /// Decodes a marshalled TPMT_PUBLIC area into an attestation key.
    ///
    /// # Parameters
    /// - `tpmt_public`: A marshalled TPMT_PUBLIC.
    ///
    /// # Errors
    /// Returns an error if the area does not decode, or if it describes a key
    /// this verifier does not support: anything but RSASSA or ECDSA over
    /// SHA-1 or SHA-256, a non-null symmetric algorithm, or an ECC curve
    /// other than NIST P-256.
    pub fn decode(tpmt_public: &[u8]) -> Result<Self, AkPublicError> {
        match TpmtPublic::unmarshal(tpmt_public)? {
            TpmtPublic::Rsa {
                symmetric,
                scheme,
                scheme_hash,
                key_bits: _,
                exponent,
                modulus,
            } => {
                if symmetric != TPM_ALG_NULL {
                    return Err(AkPublicError::SymmetricNotNull);
                }
                if scheme != TPM_ALG_RSASSA {
                    return Err(AkPublicError::UnsupportedScheme(scheme));
                }
                let signing_hash = supported_hash(scheme_hash)?;
                // TPM 2.0 Part 2 marks an exponent of zero as the default 2^16 + 1
                let exponent = if exponent == 0 { 65_537 } else { exponent };
                let key = RsaPublicKey::new(
                    BigUint::from_bytes_be(&modulus),
                    BigUint::from(exponent),
                )
                .map_err(|err| AkPublicError::InvalidKey(err.to_string()))?;
                Ok(AkPublic {
                    key: AkPublicKey::Rsa(key),
                    signing_hash,
                })
            }
            TpmtPublic::Ecc {
                symmetric,
                scheme,
                scheme_hash,
                curve_id,
                x,
                y,
            } => {
                if symmetric != TPM_ALG_NULL {
                    return Err(AkPublicError::SymmetricNotNull);
                }
                if scheme != TPM_ALG_ECDSA {
                    return Err(AkPublicError::UnsupportedScheme(scheme));
                }
                let signing_hash = supported_hash(scheme_hash)?;
                if curve_id != TPM_ECC_NIST_P256 {
                    return Err(AkPublicError::UnsupportedCurve(curve_id));
                }
                if x.len() != P256_SCALAR_SIZE || y.len() != P256_SCALAR_SIZE {
                    return Err(AkPublicError::InvalidKey(
                        "P-256 coordinates must be 32 bytes".into(),
                    ));
                }
                let point = p256::EncodedPoint::from_affine_coordinates(
                    x.as_slice().into(),
                    y.as_slice().into(),
                    false,
                );
                let key = VerifyingKey::from_encoded_point(&point)
                    .map_err(|err| AkPublicError::InvalidKey(err.to_string()))?;
                Ok(AkPublic {
                    key: AkPublicKey::Ecdsa(key),
                    signing_hash,
                })
            }
        }
    }
}

impl AkPublicKey {
    /// Loads a key from a PEM-encoded SPKI `PUBLIC KEY` block, accepting RSA
    /// and NIST P-256 keys.
    pub fn from_pem(pem: &str) -> Result<Self, AkPublicError> {
        use rsa::pkcs8::DecodePublicKey as _;

        if let Ok(key) = RsaPublicKey::from_public_key_pem(pem) {
            return Ok(AkPublicKey::Rsa(key));
        }
        let key = VerifyingKey::from_public_key_pem(pem).map_err(|_| {
            AkPublicError::InvalidKey("not an RSA or NIST P-256 public key".into())
        })?;
        Ok(AkPublicKey::Ecdsa(key))
    }

    /// Verifies the attestation key's signature over a message.
    ///
    /// # Parameters
    /// - `message`: The message that was signed with the attestation key.
    /// - `raw_sig`: A marshalled TPMT_SIGNATURE over the message.
    ///
    /// # Errors
    /// Returns an error if the signature does not decode, names a hash this
    /// verifier does not support, belongs to a different key family than this
    /// key, or does not verify.
    pub fn verify_signature(&self, message: &[u8], raw_sig: &[u8]) -> Result<(), QuoteError> {
        match (self, TpmtSignature::unmarshal(raw_sig)?) {
            (AkPublicKey::Rsa(key), TpmtSignature::RsaSsa { hash, signature }) => {
                let (padding, digest) = match hash {
                    TPM_ALG_SHA1 => (
                        Pkcs1v15Sign::new::<sha1::Sha1>(),
                        sha1::Sha1::digest(message).to_vec(),
                    ),
                    TPM_ALG_SHA256 => (
                        Pkcs1v15Sign::new::<sha2::Sha256>(),
                        sha2::Sha256::digest(message).to_vec(),
                    ),
                    other => return Err(StructError::UnsupportedAlgorithm(other).into()),
                };
                key.verify(padding, &digest, &signature)
                    .map_err(|_| QuoteError::SignatureInvalid)
            }
            (AkPublicKey::Ecdsa(key), TpmtSignature::Ecdsa { hash, r, s }) => {
                let digest = match hash {
                    TPM_ALG_SHA1 => sha1::Sha1::digest(message).to_vec(),
                    TPM_ALG_SHA256 => sha2::Sha256::digest(message).to_vec(),
                    other => return Err(StructError::UnsupportedAlgorithm(other).into()),
                };
                let r: [u8; P256_SCALAR_SIZE] = r
                    .as_slice()
                    .try_into()
                    .map_err(|_| QuoteError::Malformed("ECDSA r is not a P-256 scalar"))?;
                let s: [u8; P256_SCALAR_SIZE] = s
                    .as_slice()
                    .try_into()
                    .map_err(|_| QuoteError::Malformed("ECDSA s is not a P-256 scalar"))?;
                let signature = p256::ecdsa::Signature::from_scalars(r, s)
                    .map_err(|_| QuoteError::SignatureInvalid)?;
                key.verify_prehash(&digest, &signature)
                    .map_err(|_| QuoteError::SignatureInvalid)
            }
            _ => Err(QuoteError::Malformed(
                "signature algorithm does not match the attestation key",
            )),
        }
    }

    /// Verifies a quote against this attestation key and an expected nonce.
    ///
    /// # Parameters
    /// - `quote`: The quote bundle: message, signature, and untrusted PCR values.
    /// - `nonce`: The anti-replay challenge the quote must embed. A quote with
    ///   empty extra data matches an empty nonce.
    ///
    /// # Returns
    /// On success the PCR values carried in `quote` are genuine: the TPM
    /// signed a composite digest over exactly those values, in that bank,
    /// for exactly those registers.
    ///
    /// # Errors
    /// Returns an error if the message is not a well-formed TPMS_ATTEST
    /// quote, the signature is invalid, the nonce differs, the composite
    /// digest does not match the supplied PCR values, or the quoted PCR
    /// selection names a different bank or register set than supplied.
    pub fn verify_quote(&self, quote: &Quote, nonce: &[u8]) -> Result<(), QuoteError> {
        let pcrs = quote
            .pcrs
            .as_ref()
            .ok_or(QuoteError::Malformed("quote carries no PCR values"))?;
        let bank = pcrs.hash();
        let digest_size = bank
            .digest_size()
            .ok_or(QuoteError::Malformed("unsupported PCR bank algorithm"))?;

        // TPM_GENERATED_VALUE and the attestation type are enforced during
        // unmarshalling; a blob with the wrong magic never gets this far.
        let attest = TpmsAttest::unmarshal(&quote.quote)?;
        self.verify_signature(&quote.quote, &quote.raw_sig)?;

        if !bool::from(attest.extra_data.ct_eq(nonce)) {
            return Err(QuoteError::NonceMismatch);
        }

        for value in pcrs.pcrs.values() {
            if value.len() != digest_size {
                return Err(QuoteError::Malformed(
                    "PCR value length does not match the bank digest size",
                ));
            }
        }
        // Composite digest: selected PCR values concatenated in ascending
        // index order, hashed with the bank algorithm. BTreeMap iteration
        // supplies the order.
        let composite = composite_digest(bank, pcrs.pcrs.values().map(Vec::as_slice))?;
        if !bool::from(composite.ct_eq(&attest.pcr_digest)) {
            return Err(QuoteError::PcrDigestMismatch);
        }

        let supplied: Vec<u32> = pcrs.pcrs.keys().copied().collect();
        let expected = PcrSelection {
            hash: bank as u16,
            pcrs: supplied,
        };
        if attest.pcr_select != expected {
            return Err(QuoteError::PcrSelectionMismatch);
        }
        Ok(())
    }
}

impl From<RsaPublicKey> for AkPublicKey {
    fn from(key: RsaPublicKey) -> Self {
        AkPublicKey::Rsa(key)
    }
}

impl From<VerifyingKey> for AkPublicKey {
    fn from(key: VerifyingKey) -> Self {
        AkPublicKey::Ecdsa(key)
    }
}

fn supported_hash(alg: u16) -> Result<HashAlgo, AkPublicError> {
    match alg {
        TPM_ALG_SHA1 => Ok(HashAlgo::Sha1),
        TPM_ALG_SHA256 => Ok(HashAlgo::Sha256),
        other => Err(AkPublicError::UnsupportedHash(other)),
    }
}

fn composite_digest<'a>(
    bank: HashAlgo,
    values: impl Iterator<Item = &'a [u8]>,
) -> Result<Vec<u8>, QuoteError> {
    fn digest_all<'a, D: Digest>(values: impl Iterator<Item = &'a [u8]>) -> Vec<u8> {
        let mut hasher = D::new();
        for value in values {
            hasher.update(value);
        }
        hasher.finalize().to_vec()
    }
    match bank {
        HashAlgo::Sha1 => Ok(digest_all::<sha1::Sha1>(values)),
        HashAlgo::Sha256 => Ok(digest_all::<sha2::Sha256>(values)),
        HashAlgo::HashInvalid => Err(QuoteError::Malformed("unsupported PCR bank algorithm")),
    }
}

#[cfg(test)]
mod test {
    use std::collections::BTreeMap;

    use attest_proto::GceConfidentialTechnology;
    use rstest::rstest;
    use soft_tpm::{Ak, SoftTpm};

    use super::*;
    use crate::structs::TPM_ALG_ECC;

    fn rsa_ak() -> Ak {
        Ak::generate_rsa(&mut rand::rngs::OsRng).unwrap()
    }

    fn ecdsa_ak() -> Ak {
        Ak::generate_ecdsa(&mut rand::rngs::OsRng)
    }

    /// A TPM with a few registers extended, so composites are not all-zero.
    fn booted_tpm() -> SoftTpm {
        let mut tpm = SoftTpm::new();
        tpm.measure_gce_boot(7, GceConfidentialTechnology::None);
        tpm
    }

    fn ecc_public_area(x: &[u8; 32], y: &[u8; 32]) -> Vec<u8> {
        let mut raw = Vec::new();
        raw.extend_from_slice(&TPM_ALG_ECC.to_be_bytes());
        raw.extend_from_slice(&TPM_ALG_SHA256.to_be_bytes());
        raw.extend_from_slice(&0x0005_0472u32.to_be_bytes());
        raw.extend_from_slice(&0u16.to_be_bytes());
        raw.extend_from_slice(&TPM_ALG_NULL.to_be_bytes());
        raw.extend_from_slice(&TPM_ALG_ECDSA.to_be_bytes());
        raw.extend_from_slice(&TPM_ALG_SHA256.to_be_bytes());
        raw.extend_from_slice(&TPM_ECC_NIST_P256.to_be_bytes());
        raw.extend_from_slice(&TPM_ALG_NULL.to_be_bytes());
        raw.extend_from_slice(&32u16.to_be_bytes());
        raw.extend_from_slice(x);
        raw.extend_from_slice(&32u16.to_be_bytes());
        raw.extend_from_slice(y);
        raw
    }

    #[test]
    fn decodes_generated_ecc_key() -> anyhow::Result<()> {
        let signing = p256::ecdsa::SigningKey::random(&mut rand::rngs::OsRng);
        let verifying = *signing.verifying_key();
        let point = verifying.to_encoded_point(false);
        let x: [u8; 32] = point.x().unwrap().as_slice().try_into()?;
        let y: [u8; 32] = point.y().unwrap().as_slice().try_into()?;

        let ak = AkPublic::decode(&ecc_public_area(&x, &y))?;
        assert_eq!(ak.signing_hash, HashAlgo::Sha256);
        assert_eq!(ak.key, AkPublicKey::Ecdsa(verifying));
        Ok(())
    }

    #[test]
    fn rejects_off_curve_point() {
        let err = AkPublic::decode(&ecc_public_area(&[0x11; 32], &[0x22; 32])).unwrap_err();
        assert!(matches!(err, AkPublicError::InvalidKey(_)), "{err}");
    }

    #[test]
    fn rejects_unknown_curve() {
        let mut raw = ecc_public_area(&[0x11; 32], &[0x22; 32]);
        // curve id follows type, name alg, attributes, auth policy,
        // symmetric, scheme and scheme hash
        let curve_offset = 2 + 2 + 4 + 2 + 2 + 2 + 2;
        // TPM_ECC_NIST_P384
        raw[curve_offset..curve_offset + 2].copy_from_slice(&0x0004u16.to_be_bytes());
        let err = AkPublic::decode(&raw).unwrap_err();
        assert!(matches!(err, AkPublicError::UnsupportedCurve(0x0004)), "{err}");
    }

    #[test]
    fn pem_round_trips_both_key_families() -> anyhow::Result<()> {
        use rsa::pkcs8::{EncodePublicKey, LineEnding};

        let mut rng = rand::rngs::OsRng;

        let rsa_private = rsa::RsaPrivateKey::new(&mut rng, 2048)?;
        let rsa_pem = rsa_private.to_public_key().to_public_key_pem(LineEnding::LF)?;
        assert_eq!(
            AkPublicKey::from_pem(&rsa_pem)?,
            AkPublicKey::Rsa(rsa_private.to_public_key())
        );

        let ecc_private = p256::ecdsa::SigningKey::random(&mut rng);
        let ecc_pem = ecc_private.verifying_key().to_public_key_pem(LineEnding::LF)?;
        assert_eq!(
            AkPublicKey::from_pem(&ecc_pem)?,
            AkPublicKey::Ecdsa(*ecc_private.verifying_key())
        );

        assert!(AkPublicKey::from_pem("not a pem").is_err());
        Ok(())
    }

    #[test]
    fn error_text_is_stable() {
        insta::assert_snapshot!(
            QuoteError::from(StructError::BadMagic),
            @"malformed quote: attestation does not start with TPM_GENERATED_VALUE"
        );
        insta::assert_snapshot!(
            QuoteError::PcrSelectionMismatch,
            @"quoted PCR selection does not match the supplied PCR values"
        );
    }

    #[rstest]
    #[case::rsa_sha1(rsa_ak(), HashAlgo::Sha1)]
    #[case::rsa_sha256(rsa_ak(), HashAlgo::Sha256)]
    #[case::ecdsa_sha1(ecdsa_ak(), HashAlgo::Sha1)]
    #[case::ecdsa_sha256(ecdsa_ak(), HashAlgo::Sha256)]
    fn fresh_quotes_verify_for_every_key_and_bank(
        #[case] ak: Ak,
        #[case] bank: HashAlgo,
    ) -> anyhow::Result<()> {
        let tpm = booted_tpm();
        let key = AkPublicKey::from_pem(&ak.public_pem()?)?;

        for nonce in [&b""[..], &b"one bit matters"[..]] {
            let quote = tpm.quote(&ak, bank, nonce)?;
            key.verify_quote(&quote, nonce)?;
        }
        Ok(())
    }

    #[rstest]
    #[case::single(&[7u32][..])]
    #[case::multiple(&[0, 4, 7, 23][..])]
    #[case::duplicated(&[4, 4, 7][..])]
    fn selection_shapes_round_trip(#[case] indices: &[u32]) -> anyhow::Result<()> {
        let tpm = booted_tpm();
        let ak = ecdsa_ak();
        let key = AkPublicKey::from_pem(&ak.public_pem()?)?;

        let quote = tpm.quote_selection(&ak, HashAlgo::Sha256, b"challenge", indices)?;
        key.verify_quote(&quote, b"challenge")?;
        Ok(())
    }

    #[test]
    fn nonce_differences_are_rejected() -> anyhow::Result<()> {
        let tpm = booted_tpm();
        let ak = ecdsa_ak();
        let key = AkPublicKey::from_pem(&ak.public_pem()?)?;

        let quote = tpm.quote(&ak, HashAlgo::Sha256, b"one bit matters")?;
        let err = key.verify_quote(&quote, b"one bit matterr").unwrap_err();
        assert!(matches!(err, QuoteError::NonceMismatch), "{err}");
        Ok(())
    }

    #[test]
    fn corrupted_signatures_are_rejected() -> anyhow::Result<()> {
        let tpm = booted_tpm();
        let ak = ecdsa_ak();
        let key = AkPublicKey::from_pem(&ak.public_pem()?)?;

        let mut quote = tpm.quote(&ak, HashAlgo::Sha256, b"challenge")?;
        let last = quote.raw_sig.len() - 1;
        quote.raw_sig[last] ^= 0x01;

        let err = key.verify_quote(&quote, b"challenge").unwrap_err();
        assert!(matches!(err, QuoteError::SignatureInvalid), "{err}");
        Ok(())
    }

    #[test]
    fn values_extended_after_quoting_are_rejected() -> anyhow::Result<()> {
        let mut tpm = booted_tpm();
        let ak = ecdsa_ak();
        let key = AkPublicKey::from_pem(&ak.public_pem()?)?;

        let mut quote = tpm.quote(&ak, HashAlgo::Sha256, b"challenge")?;
        tpm.extend_event(4, 4, b"late measurement");
        quote.pcrs = Some(tpm.read_pcrs(HashAlgo::Sha256)?);

        let err = key.verify_quote(&quote, b"challenge").unwrap_err();
        assert!(matches!(err, QuoteError::PcrDigestMismatch), "{err}");
        Ok(())
    }

    #[test]
    fn values_attributed_to_the_wrong_register_are_rejected() -> anyhow::Result<()> {
        let tpm = booted_tpm();
        let ak = ecdsa_ak();
        let key = AkPublicKey::from_pem(&ak.public_pem()?)?;

        let mut quote = tpm.quote_selection(&ak, HashAlgo::Sha256, b"challenge", &[4])?;
        // same value, claimed for PCR 5: the composite matches, the
        // selection does not
        let value = quote.pcrs.as_ref().unwrap().pcrs[&4].clone();
        quote.pcrs.as_mut().unwrap().pcrs = BTreeMap::from([(5, value)]);

        let err = key.verify_quote(&quote, b"challenge").unwrap_err();
        assert!(matches!(err, QuoteError::PcrSelectionMismatch), "{err}");
        Ok(())
    }
}
