use thiserror::Error;

#[derive(Error, Debug)]
pub enum AttestError {
    #[error("Invalid claim payload: {0}")]
    Validation(String),

    #[error("Unsupported value in canonical encoding: {0}")]
    UnsupportedType(String),

    #[error("Bundle storage failed: {0}")]
    Storage(String),

    #[error("Bundle not found: {0}")]
    NotFound(String),

    #[error("Anchor submission failed: {0}")]
    AnchorSubmission(String),

    #[error("Cannot build a Merkle tree over zero leaves")]
    EmptyMerkleInput,

    #[error("Anchor run interrupted by shutdown")]
    Interrupted,

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, AttestError>;
