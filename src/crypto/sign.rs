/// Detached signatures over bundle hashes: Ed25519 + optional ML-DSA-65.
///
/// The classical keypair is derived deterministically from a configured
/// 32-byte seed, so test fixtures reproduce exactly and seed rotation only
/// affects new bundles — every bundle embeds the public key it was signed
/// with. The post-quantum scheme is pluggable: when the `pqc` backend is not
/// compiled in, signing records mode=`unavailable` instead of failing, and
/// an explicit caller opt-out records mode=`disabled`. Both are terminal
/// states of the signing step, not errors.
use std::collections::BTreeMap;

use ed25519_dalek::{Signer as _, SigningKey, Verifier as _, VerifyingKey};
use serde::{Deserialize, Serialize};

#[cfg(feature = "pqc")]
use pqcrypto_dilithium::dilithium3;
#[cfg(feature = "pqc")]
use pqcrypto_traits::sign::{
    DetachedSignature as _, PublicKey as _, SecretKey as _,
};
#[cfg(feature = "pqc")]
use zeroize::Zeroize;

/// Scheme name for the classical signature.
pub const SCHEME_CLASSICAL: &str = "ed25519";
/// Scheme name for the post-quantum signature.
pub const SCHEME_POST_QUANTUM: &str = "ml-dsa-65";

/// Terminal state of one signing scheme for a bundle.
///
/// `Disabled` is a policy choice by the caller; `Unavailable` means the
/// backend was absent at signing time. Verifiers can tell the two apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SignatureMode {
    Signed,
    Disabled,
    Unavailable,
}

/// One scheme's entry in a manifest signature block.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SignatureRecord {
    pub scheme: String,
    pub mode: SignatureMode,
    /// Hex-encoded public key; present iff mode is `signed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
    /// Hex-encoded detached signature; present iff mode is `signed`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}

impl SignatureRecord {
    fn signed(scheme: &str, public_key: Vec<u8>, signature: Vec<u8>) -> Self {
        Self {
            scheme: scheme.to_string(),
            mode: SignatureMode::Signed,
            public_key: Some(hex::encode(public_key)),
            signature: Some(hex::encode(signature)),
        }
    }

    fn disabled(scheme: &str) -> Self {
        Self {
            scheme: scheme.to_string(),
            mode: SignatureMode::Disabled,
            public_key: None,
            signature: None,
        }
    }

    fn unavailable(scheme: &str) -> Self {
        Self {
            scheme: scheme.to_string(),
            mode: SignatureMode::Unavailable,
            public_key: None,
            signature: None,
        }
    }
}

/// Per-request signing toggles. Disabling a scheme records mode=`disabled`
/// in the manifest rather than omitting the entry.
#[derive(Debug, Clone, Copy)]
pub struct SignOptions {
    pub classical: bool,
    pub post_quantum: bool,
}

impl Default for SignOptions {
    fn default() -> Self {
        Self {
            classical: true,
            post_quantum: true,
        }
    }
}

/// ML-DSA-65 (Dilithium3) signing key pair.
#[cfg(feature = "pqc")]
pub struct MlDsaKeyPair {
    public_key: Vec<u8>,
    secret_key: Vec<u8>,
}

#[cfg(feature = "pqc")]
impl MlDsaKeyPair {
    pub fn generate() -> Self {
        let (pk, sk) = dilithium3::keypair();
        Self {
            public_key: pk.as_bytes().to_vec(),
            secret_key: sk.as_bytes().to_vec(),
        }
    }
}

#[cfg(feature = "pqc")]
impl Drop for MlDsaKeyPair {
    fn drop(&mut self) {
        self.secret_key.zeroize();
    }
}

/// Bundle-hash signer holding one keypair per scheme.
pub struct Signer {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
    #[cfg(feature = "pqc")]
    mldsa: MlDsaKeyPair,
}

impl Signer {
    /// Derive the classical keypair from the configured seed. The
    /// post-quantum keypair (when compiled in) is generated fresh per
    /// signer instance.
    pub fn from_seed(seed: [u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(&seed);
        let verifying_key = signing_key.verifying_key();
        Self {
            signing_key,
            verifying_key,
            #[cfg(feature = "pqc")]
            mldsa: MlDsaKeyPair::generate(),
        }
    }

    /// Ed25519 verifying key for this deployment's seed.
    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying_key
    }

    /// Sign a 32-byte bundle hash with every enabled scheme.
    ///
    /// Always returns one record per scheme; disabled and unavailable
    /// schemes carry no key material.
    pub fn sign_bundle_hash(
        &self,
        digest: &[u8; 32],
        opts: SignOptions,
    ) -> BTreeMap<String, SignatureRecord> {
        let mut records = BTreeMap::new();

        let classical = if opts.classical {
            let sig = self.signing_key.sign(digest);
            SignatureRecord::signed(
                SCHEME_CLASSICAL,
                self.verifying_key.to_bytes().to_vec(),
                sig.to_bytes().to_vec(),
            )
        } else {
            SignatureRecord::disabled(SCHEME_CLASSICAL)
        };
        records.insert(SCHEME_CLASSICAL.to_string(), classical);

        let post_quantum = if !opts.post_quantum {
            SignatureRecord::disabled(SCHEME_POST_QUANTUM)
        } else {
            #[cfg(feature = "pqc")]
            let record = {
                let sk = dilithium3::SecretKey::from_bytes(&self.mldsa.secret_key)
                    .expect("stored ML-DSA secret key is well-formed");
                let sig = dilithium3::detached_sign(digest, &sk);
                SignatureRecord::signed(
                    SCHEME_POST_QUANTUM,
                    self.mldsa.public_key.clone(),
                    sig.as_bytes().to_vec(),
                )
            };
            #[cfg(not(feature = "pqc"))]
            let record = SignatureRecord::unavailable(SCHEME_POST_QUANTUM);
            record
        };
        records.insert(SCHEME_POST_QUANTUM.to_string(), post_quantum);

        records
    }
}

/// Verify one `signed` record against a digest using only the key material
/// embedded in the record. Returns a human-readable reason on failure.
pub fn verify_signature(
    record: &SignatureRecord,
    digest: &[u8; 32],
) -> std::result::Result<(), String> {
    let public_key = record
        .public_key
        .as_deref()
        .ok_or_else(|| "signed record is missing its public key".to_string())?;
    let signature = record
        .signature
        .as_deref()
        .ok_or_else(|| "signed record is missing its signature".to_string())?;

    let pk_bytes =
        hex::decode(public_key).map_err(|e| format!("public key is not valid hex: {e}"))?;
    let sig_bytes =
        hex::decode(signature).map_err(|e| format!("signature is not valid hex: {e}"))?;

    match record.scheme.as_str() {
        SCHEME_CLASSICAL => verify_ed25519(&pk_bytes, &sig_bytes, digest),
        SCHEME_POST_QUANTUM => verify_mldsa(&pk_bytes, &sig_bytes, digest),
        other => Err(format!("unknown signature scheme {other:?}")),
    }
}

fn verify_ed25519(
    pk_bytes: &[u8],
    sig_bytes: &[u8],
    digest: &[u8; 32],
) -> std::result::Result<(), String> {
    let pk: [u8; 32] = pk_bytes
        .try_into()
        .map_err(|_| "ed25519 public key must be 32 bytes".to_string())?;
    let sig: [u8; 64] = sig_bytes
        .try_into()
        .map_err(|_| "ed25519 signature must be 64 bytes".to_string())?;

    let verifying_key =
        VerifyingKey::from_bytes(&pk).map_err(|e| format!("invalid ed25519 public key: {e}"))?;
    let signature = ed25519_dalek::Signature::from_bytes(&sig);
    verifying_key
        .verify(digest, &signature)
        .map_err(|_| "ed25519 signature does not verify".to_string())
}

#[cfg(feature = "pqc")]
fn verify_mldsa(
    pk_bytes: &[u8],
    sig_bytes: &[u8],
    digest: &[u8; 32],
) -> std::result::Result<(), String> {
    let pk = dilithium3::PublicKey::from_bytes(pk_bytes)
        .map_err(|_| "invalid ml-dsa-65 public key".to_string())?;
    let sig = dilithium3::DetachedSignature::from_bytes(sig_bytes)
        .map_err(|_| "invalid ml-dsa-65 signature encoding".to_string())?;
    dilithium3::verify_detached_signature(&sig, digest, &pk)
        .map_err(|_| "ml-dsa-65 signature does not verify".to_string())
}

#[cfg(not(feature = "pqc"))]
fn verify_mldsa(
    _pk_bytes: &[u8],
    _sig_bytes: &[u8],
    _digest: &[u8; 32],
) -> std::result::Result<(), String> {
    Err("ml-dsa-65 signature present but backend not compiled in".to_string())
}
