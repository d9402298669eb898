/// Stateless bundle verification.
///
/// Checks are independent and failures accumulate, so an adversarial or
/// corrupted bundle reports every problem at once:
/// (a) the bundle hash is recomputed from the signature-free manifest
///     skeleton plus the companion artifact and compared to the stored value
/// (b) every signature with mode=`signed` is verified against its embedded
///     public key and the *recomputed* bundle hash
/// (c) `disabled` and `unavailable` signatures are skipped, not failures
///
/// Mismatches are returned as data, never raised: tampering is an expected
/// input to a verifier.
use serde::Serialize;

use crate::bundle::Bundle;
use crate::canonical;
use crate::crypto::sign::{self, SignatureMode};
use crate::manifest;

/// Outcome of verifying one bundle.
#[derive(Debug, Clone, Serialize)]
pub struct VerifyReport {
    pub valid: bool,
    pub reasons: Vec<String>,
}

/// Verify a bundle's integrity and signatures.
pub fn verify(bundle: &Bundle) -> VerifyReport {
    let mut reasons = Vec::new();

    let skeleton_bytes = match canonical::to_canonical_bytes(&bundle.manifest.skeleton_value()) {
        Ok(bytes) => bytes,
        Err(e) => {
            return VerifyReport {
                valid: false,
                reasons: vec![format!("manifest could not be canonicalized: {e}")],
            }
        }
    };

    let recomputed = manifest::compute_bundle_hash(&skeleton_bytes, bundle.artifact.as_deref());
    let recomputed_hex = hex::encode(recomputed);

    if recomputed_hex != bundle.manifest.bundle_hash {
        reasons.push(format!(
            "bundle hash mismatch: stored {} but recomputed {}",
            bundle.manifest.bundle_hash, recomputed_hex
        ));
    }

    for (scheme, record) in &bundle.manifest.signatures {
        match record.mode {
            SignatureMode::Signed => {
                if let Err(reason) = sign::verify_signature(record, &recomputed) {
                    reasons.push(format!("{scheme}: {reason}"));
                }
            }
            SignatureMode::Disabled | SignatureMode::Unavailable => {}
        }
    }

    VerifyReport {
        valid: reasons.is_empty(),
        reasons,
    }
}
