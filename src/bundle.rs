/// Content-addressed evidence bundle store.
///
/// A bundle is the persisted pairing of a manifest and its optional
/// companion artifact, keyed by `bundle_hash`:
///
/// ```text
/// <root>/<bundle_hash>/manifest.json
/// <root>/<bundle_hash>/artifact.bin      (only when present)
/// ```
///
/// Saves are idempotent: identical inputs land at the same path, so
/// re-saving an existing bundle is a no-op success and concurrent duplicate
/// writes race harmlessly. Bundles are never updated in place — a new claim
/// produces a new bundle.
use std::fs;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::error::{AttestError, Result};
use crate::manifest::Manifest;

pub const MANIFEST_FILE: &str = "manifest.json";
pub const ARTIFACT_FILE: &str = "artifact.bin";

/// A stored evidence bundle.
#[derive(Debug, Clone)]
pub struct Bundle {
    /// Content-addressed id, equal to the manifest's `bundle_hash`.
    pub id: String,
    pub manifest: Manifest,
    pub artifact: Option<Vec<u8>>,
}

/// Filesystem-backed bundle store.
#[derive(Debug, Clone)]
pub struct BundleStore {
    root: PathBuf,
}

impl BundleStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Persist a manifest and optional companion artifact.
    ///
    /// Write failures are retried once before surfacing as `Storage`.
    pub fn save(&self, manifest: &Manifest, artifact: Option<&[u8]>) -> Result<Bundle> {
        let id = manifest.bundle_hash.clone();
        let dir = self.root.join(&id);

        if dir.join(MANIFEST_FILE).exists() {
            return self.load(&id);
        }

        if let Err(first) = self.write_bundle(&dir, manifest, artifact) {
            warn!(bundle_id = %id, error = %first, "bundle write failed, retrying once");
            self.write_bundle(&dir, manifest, artifact)
                .map_err(|e| AttestError::Storage(format!("bundle {id}: {e}")))?;
        }

        Ok(Bundle {
            id,
            manifest: manifest.clone(),
            artifact: artifact.map(<[u8]>::to_vec),
        })
    }

    fn write_bundle(
        &self,
        dir: &Path,
        manifest: &Manifest,
        artifact: Option<&[u8]>,
    ) -> std::io::Result<()> {
        fs::create_dir_all(dir)?;
        let manifest_bytes = serde_json::to_vec_pretty(manifest)
            .map_err(|e| std::io::Error::other(e.to_string()))?;
        fs::write(dir.join(MANIFEST_FILE), manifest_bytes)?;
        if let Some(bytes) = artifact {
            fs::write(dir.join(ARTIFACT_FILE), bytes)?;
        }
        Ok(())
    }

    /// Load a bundle by id. Unknown ids fail with `NotFound`.
    pub fn load(&self, id: &str) -> Result<Bundle> {
        if !is_valid_id(id) {
            return Err(AttestError::NotFound(id.to_string()));
        }

        let dir = self.root.join(id);
        let manifest_path = dir.join(MANIFEST_FILE);
        if !manifest_path.exists() {
            return Err(AttestError::NotFound(id.to_string()));
        }

        let manifest_bytes = fs::read(&manifest_path)?;
        let manifest: Manifest = serde_json::from_slice(&manifest_bytes)
            .map_err(|e| AttestError::Serialization(format!("bundle {id}: {e}")))?;

        let artifact_path = dir.join(ARTIFACT_FILE);
        let artifact = if artifact_path.exists() {
            Some(fs::read(&artifact_path)?)
        } else {
            None
        };

        Ok(Bundle {
            id: id.to_string(),
            manifest,
            artifact,
        })
    }

    /// Whether a bundle exists for this id.
    pub fn exists(&self, id: &str) -> bool {
        is_valid_id(id) && self.root.join(id).join(MANIFEST_FILE).exists()
    }
}

/// Bundle ids are hex content hashes; anything else (path separators,
/// dotfiles) is rejected before touching the filesystem.
fn is_valid_id(id: &str) -> bool {
    !id.is_empty() && id.chars().all(|c| c.is_ascii_hexdigit())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::sign::{SignOptions, Signer};
    use crate::manifest::ManifestBuilder;
    use serde_json::json;

    fn test_manifest(artifact: Option<&[u8]>) -> Manifest {
        let mut seed = [0u8; 32];
        seed[31] = 1;
        let signer = Signer::from_seed(seed);
        ManifestBuilder::new(&signer)
            .build(&json!({"amount": 100}), json!({}), artifact, SignOptions::default())
            .unwrap()
    }

    #[test]
    fn test_save_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = BundleStore::new(dir.path());

        let manifest = test_manifest(Some(b"report"));
        let bundle = store.save(&manifest, Some(b"report")).unwrap();
        assert_eq!(bundle.id, manifest.bundle_hash);

        let loaded = store.load(&bundle.id).unwrap();
        assert_eq!(loaded.manifest.bundle_hash, manifest.bundle_hash);
        assert_eq!(loaded.artifact.as_deref(), Some(b"report".as_slice()));
    }

    #[test]
    fn test_save_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = BundleStore::new(dir.path());

        let manifest = test_manifest(None);
        store.save(&manifest, None).unwrap();
        store.save(&manifest, None).unwrap();

        // Exactly one stored bundle
        let entries: Vec<_> = std::fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_load_unknown_id() {
        let dir = tempfile::tempdir().unwrap();
        let store = BundleStore::new(dir.path());
        assert!(matches!(
            store.load("deadbeef"),
            Err(AttestError::NotFound(_))
        ));
    }

    #[test]
    fn test_load_rejects_traversal() {
        let dir = tempfile::tempdir().unwrap();
        let store = BundleStore::new(dir.path());
        assert!(matches!(
            store.load("../escape"),
            Err(AttestError::NotFound(_))
        ));
    }

    #[test]
    fn test_exists() {
        let dir = tempfile::tempdir().unwrap();
        let store = BundleStore::new(dir.path());
        let manifest = test_manifest(None);
        assert!(!store.exists(&manifest.bundle_hash));
        store.save(&manifest, None).unwrap();
        assert!(store.exists(&manifest.bundle_hash));
    }
}
