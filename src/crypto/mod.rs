/// Cryptographic primitives for attestation.
///
/// - `hash`: SHA-256 content hashing over canonical bytes
/// - `sign`: detached bundle-hash signatures (Ed25519 always, ML-DSA-65
///   when the `pqc` backend is compiled in)
pub mod hash;
pub mod sign;
