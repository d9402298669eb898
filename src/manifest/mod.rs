/// Attestation manifest: the record committed to an evidence bundle.
///
/// The manifest ties together everything needed to verify a claim later:
/// - the content hash of the claim's canonical bytes
/// - the policy context the decision was made under (opaque here)
/// - the bundle hash covering the manifest skeleton and companion artifact
/// - one signature record per scheme
///
/// `bundle_hash` is computed over the canonical signature-free skeleton
/// concatenated with the companion artifact bytes, *before* any signature
/// attaches, and signatures sign `bundle_hash` — never the full manifest.
/// A manifest is immutable once signed; a new claim produces a new bundle.
use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical;
use crate::crypto::hash;
use crate::crypto::sign::{SignatureRecord, SignOptions, Signer};
use crate::error::{AttestError, Result};

/// Current manifest format version.
pub const MANIFEST_VERSION: u8 = 1;

/// The record stored inside every evidence bundle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Format version for forward compatibility.
    pub version: u8,
    /// Hashing algorithm id (see `crypto::hash::ALGORITHM_ID`).
    pub algorithm: String,
    /// SHA-256 of the claim's canonical bytes, hex-encoded.
    pub content_hash: String,
    /// Rule ids / policy versions from the policy collaborator. Opaque to
    /// this subsystem.
    pub policy_context: Value,
    /// When the manifest was created.
    pub created_at: DateTime<Utc>,
    /// SHA-256 over canonical skeleton || companion artifact, hex-encoded.
    pub bundle_hash: String,
    /// Scheme name → signature record.
    pub signatures: BTreeMap<String, SignatureRecord>,
}

impl Manifest {
    /// The signature-free view of this manifest that `bundle_hash` covers.
    /// Excludes `signatures` and `bundle_hash` itself.
    pub fn skeleton_value(&self) -> Value {
        serde_json::json!({
            "version": self.version,
            "algorithm": self.algorithm,
            "content_hash": self.content_hash,
            "policy_context": self.policy_context,
            "created_at": self.created_at,
        })
    }

    /// Decode the stored bundle hash.
    pub fn bundle_hash_bytes(&self) -> Result<[u8; 32]> {
        let bytes = hex::decode(&self.bundle_hash)
            .map_err(|e| AttestError::Validation(format!("bundle hash is not valid hex: {e}")))?;
        bytes
            .try_into()
            .map_err(|_| AttestError::Validation("bundle hash must be 32 bytes".into()))
    }
}

/// Compute a bundle hash from canonical skeleton bytes plus the optional
/// companion artifact.
pub fn compute_bundle_hash(skeleton_canonical: &[u8], artifact: Option<&[u8]>) -> [u8; 32] {
    match artifact {
        Some(bytes) => hash::hash_concat(skeleton_canonical, bytes),
        None => hash::hash(skeleton_canonical),
    }
}

/// Builds signed manifests from claim payloads.
pub struct ManifestBuilder<'a> {
    signer: &'a Signer,
}

impl<'a> ManifestBuilder<'a> {
    pub fn new(signer: &'a Signer) -> Self {
        Self { signer }
    }

    /// Build a manifest for a claim: canonicalize → content hash → skeleton
    /// → bundle hash → sign → attach. Pure computation; persistence is the
    /// bundle store's job.
    pub fn build(
        &self,
        claim: &Value,
        policy_context: Value,
        artifact: Option<&[u8]>,
        opts: SignOptions,
    ) -> Result<Manifest> {
        self.build_at(claim, policy_context, artifact, opts, Utc::now())
    }

    /// `build` with an explicit creation timestamp. Two builds of the same
    /// claim with the same seed and timestamp are byte-identical.
    pub fn build_at(
        &self,
        claim: &Value,
        policy_context: Value,
        artifact: Option<&[u8]>,
        opts: SignOptions,
        created_at: DateTime<Utc>,
    ) -> Result<Manifest> {
        if !claim.is_object() {
            return Err(AttestError::Validation(
                "claim payload must be a JSON object".into(),
            ));
        }

        let claim_bytes = canonical::to_canonical_bytes(claim)?;
        let content_hash = hash::hash(&claim_bytes);

        let mut manifest = Manifest {
            version: MANIFEST_VERSION,
            algorithm: hash::ALGORITHM_ID.to_string(),
            content_hash: hex::encode(content_hash),
            policy_context,
            created_at,
            bundle_hash: String::new(),
            signatures: BTreeMap::new(),
        };

        let skeleton_bytes = canonical::to_canonical_bytes(&manifest.skeleton_value())?;
        let digest = compute_bundle_hash(&skeleton_bytes, artifact);
        manifest.bundle_hash = hex::encode(digest);
        manifest.signatures = self.signer.sign_bundle_hash(&digest, opts);

        Ok(manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::sign::{SignatureMode, SCHEME_CLASSICAL, SCHEME_POST_QUANTUM};
    use serde_json::json;

    fn test_signer() -> Signer {
        let mut seed = [0u8; 32];
        seed[31] = 1;
        Signer::from_seed(seed)
    }

    fn fixed_time() -> DateTime<Utc> {
        "2024-06-01T12:00:00Z".parse().unwrap()
    }

    #[test]
    fn test_build_rejects_non_object_claim() {
        let signer = test_signer();
        let builder = ManifestBuilder::new(&signer);
        let err = builder
            .build(&json!([1, 2, 3]), json!({}), None, SignOptions::default())
            .unwrap_err();
        assert!(matches!(err, AttestError::Validation(_)));
    }

    #[test]
    fn test_hash_stability() {
        let signer = test_signer();
        let builder = ManifestBuilder::new(&signer);
        let claim = json!({"amount": 100, "currency": "USD"});

        let a = builder
            .build_at(&claim, json!({"policy": "v1"}), None, SignOptions::default(), fixed_time())
            .unwrap();
        let b = builder
            .build_at(&claim, json!({"policy": "v1"}), None, SignOptions::default(), fixed_time())
            .unwrap();

        assert_eq!(a.bundle_hash, b.bundle_hash);
        assert_eq!(
            a.signatures[SCHEME_CLASSICAL].signature,
            b.signatures[SCHEME_CLASSICAL].signature
        );
    }

    #[test]
    fn test_bundle_hash_covers_artifact() {
        let signer = test_signer();
        let builder = ManifestBuilder::new(&signer);
        let claim = json!({"amount": 100});

        let without = builder
            .build_at(&claim, json!({}), None, SignOptions::default(), fixed_time())
            .unwrap();
        let with = builder
            .build_at(
                &claim,
                json!({}),
                Some(b"report body"),
                SignOptions::default(),
                fixed_time(),
            )
            .unwrap();

        assert_ne!(without.bundle_hash, with.bundle_hash);
        // Content hash only covers the claim
        assert_eq!(without.content_hash, with.content_hash);
    }

    #[test]
    fn test_signatures_sign_bundle_hash() {
        let signer = test_signer();
        let builder = ManifestBuilder::new(&signer);
        let manifest = builder
            .build(&json!({"amount": 100}), json!({}), None, SignOptions::default())
            .unwrap();

        let digest = manifest.bundle_hash_bytes().unwrap();
        let classical = &manifest.signatures[SCHEME_CLASSICAL];
        assert!(crate::crypto::sign::verify_signature(classical, &digest).is_ok());
    }

    #[test]
    fn test_minimal_round_trip_signature_modes() {
        let signer = test_signer();
        let builder = ManifestBuilder::new(&signer);
        let manifest = builder
            .build(&json!({"amount": 100}), json!({}), None, SignOptions::default())
            .unwrap();

        assert_eq!(manifest.signatures.len(), 2);
        assert_eq!(
            manifest.signatures[SCHEME_CLASSICAL].mode,
            SignatureMode::Signed
        );
        let pq_mode = manifest.signatures[SCHEME_POST_QUANTUM].mode;
        assert!(matches!(
            pq_mode,
            SignatureMode::Signed | SignatureMode::Disabled | SignatureMode::Unavailable
        ));
        #[cfg(not(feature = "pqc"))]
        assert_eq!(pq_mode, SignatureMode::Unavailable);
    }

    #[test]
    fn test_manifest_serde_roundtrip() {
        let signer = test_signer();
        let builder = ManifestBuilder::new(&signer);
        let manifest = builder
            .build(&json!({"amount": 100}), json!({"rules": ["r1"]}), None, SignOptions::default())
            .unwrap();

        let bytes = serde_json::to_vec(&manifest).unwrap();
        let restored: Manifest = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(restored.bundle_hash, manifest.bundle_hash);
        assert_eq!(restored.content_hash, manifest.content_hash);
        assert_eq!(restored.created_at, manifest.created_at);
        // Skeleton recomputed from the restored manifest matches
        assert_eq!(
            canonical::to_canonical_bytes(&restored.skeleton_value()).unwrap(),
            canonical::to_canonical_bytes(&manifest.skeleton_value()).unwrap()
        );
    }
}
