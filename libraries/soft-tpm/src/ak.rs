//! Attestation keys for the software TPM.

use digest::Digest;
use p256::ecdsa::signature::hazmat::PrehashSigner;
use p256::ecdsa::SigningKey;
use rsa::pkcs8::{EncodePublicKey, LineEnding};
use rsa::rand_core::CryptoRngCore;
use rsa::traits::PublicKeyParts;
use rsa::{Pkcs1v15Sign, RsaPrivateKey};
use sha2::Sha256;

use crate::{
    tpm2b, TPM_ALG_ECC, TPM_ALG_ECDSA, TPM_ALG_NULL, TPM_ALG_RSA, TPM_ALG_RSASSA,
    TPM_ALG_SHA256, TPM_ECC_NIST_P256,
};

// fixedTPM | fixedParent | sensitiveDataOrigin | userWithAuth | noDA
// | restricted | sign, the attributes a GCE attestation key carries
const AK_OBJECT_ATTRIBUTES: u32 = 0x0005_0472;
const RSA_AK_BITS: usize = 2048;

/// A software attestation key. Signs quote messages with SHA-256, the hash
/// GCE attestation keys use regardless of the quoted bank.
pub enum Ak {
    Rsa(RsaPrivateKey),
    Ecdsa(SigningKey),
}

impl Ak {
    pub fn generate_rsa(rng: &mut impl CryptoRngCore) -> anyhow::Result<Self> {
        Ok(Ak::Rsa(RsaPrivateKey::new(rng, RSA_AK_BITS)?))
    }

    pub fn generate_ecdsa(rng: &mut impl CryptoRngCore) -> Self {
        Ak::Ecdsa(SigningKey::random(rng))
    }

    /// The key's public half as a marshalled TPMT_PUBLIC area, the shape a
    /// real TPM reports from TPM2_ReadPublic.
    pub fn public_area(&self) -> Vec<u8> {
        match self {
            Ak::Rsa(key) => {
                let modulus = key.n().to_bytes_be();
                let mut out = Vec::new();
                out.extend_from_slice(&TPM_ALG_RSA.to_be_bytes());
                out.extend_from_slice(&TPM_ALG_SHA256.to_be_bytes());
                out.extend_from_slice(&AK_OBJECT_ATTRIBUTES.to_be_bytes());
                tpm2b(&mut out, &[]);
                out.extend_from_slice(&TPM_ALG_NULL.to_be_bytes());
                out.extend_from_slice(&TPM_ALG_RSASSA.to_be_bytes());
                out.extend_from_slice(&TPM_ALG_SHA256.to_be_bytes());
                out.extend_from_slice(&(RSA_AK_BITS as u16).to_be_bytes());
                // zero exponent marks the default 2^16 + 1
                out.extend_from_slice(&0u32.to_be_bytes());
                tpm2b(&mut out, &modulus);
                out
            }
            Ak::Ecdsa(key) => {
                let point = key.verifying_key().to_encoded_point(false);
                let mut out = Vec::new();
                out.extend_from_slice(&TPM_ALG_ECC.to_be_bytes());
                out.extend_from_slice(&TPM_ALG_SHA256.to_be_bytes());
                out.extend_from_slice(&AK_OBJECT_ATTRIBUTES.to_be_bytes());
                tpm2b(&mut out, &[]);
                out.extend_from_slice(&TPM_ALG_NULL.to_be_bytes());
                out.extend_from_slice(&TPM_ALG_ECDSA.to_be_bytes());
                out.extend_from_slice(&TPM_ALG_SHA256.to_be_bytes());
                out.extend_from_slice(&TPM_ECC_NIST_P256.to_be_bytes());
                out.extend_from_slice(&TPM_ALG_NULL.to_be_bytes());
                tpm2b(&mut out, point.x().map(|x| x.as_slice()).unwrap_or(&[]));
                tpm2b(&mut out, point.y().map(|y| y.as_slice()).unwrap_or(&[]));
                out
            }
        }
    }

    /// The public half as a PEM SPKI block, the shape a verifier's trusted
    /// key list is configured from.
    pub fn public_pem(&self) -> anyhow::Result<String> {
        let pem = match self {
            Ak::Rsa(key) => key.to_public_key().to_public_key_pem(LineEnding::LF)?,
            Ak::Ecdsa(key) => key.verifying_key().to_public_key_pem(LineEnding::LF)?,
        };
        Ok(pem)
    }

    /// Signs a quote message, returning a marshalled TPMT_SIGNATURE.
    pub fn sign(&self, message: &[u8]) -> anyhow::Result<Vec<u8>> {
        let digest = Sha256::digest(message);
        match self {
            Ak::Rsa(key) => {
                let signature = key.sign(Pkcs1v15Sign::new::<Sha256>(), &digest)?;
                let mut out = Vec::new();
                out.extend_from_slice(&TPM_ALG_RSASSA.to_be_bytes());
                out.extend_from_slice(&TPM_ALG_SHA256.to_be_bytes());
                tpm2b(&mut out, &signature);
                Ok(out)
            }
            Ak::Ecdsa(key) => {
                let signature: p256::ecdsa::Signature = key.sign_prehash(&digest)?;
                let (r, s) = signature.split_bytes();
                let mut out = Vec::new();
                out.extend_from_slice(&TPM_ALG_ECDSA.to_be_bytes());
                out.extend_from_slice(&TPM_ALG_SHA256.to_be_bytes());
                tpm2b(&mut out, &r);
                tpm2b(&mut out, &s);
                Ok(out)
            }
        }
    }
}
