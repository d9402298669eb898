/// Runtime configuration for the attestation service.
///
/// All configuration is read once at startup and passed into components
/// explicitly. The signing seed is deterministic per deployment: rotating it
/// changes the keypair used for new bundles only, since every bundle embeds
/// the public key it was signed with.
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use chrono::NaiveTime;

use crate::error::{AttestError, Result};

/// Default UTC time of day at which the anchor scheduler fires.
pub const DEFAULT_ANCHOR_TIME: &str = "00:05";

/// Top-level service configuration, sourced from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    /// Root directory for bundles, the claim archive and anchor state.
    pub data_dir: PathBuf,
    /// Address the API server binds to.
    pub bind_addr: String,
    /// 32-byte seed for deterministic Ed25519 key derivation.
    pub seed: [u8; 32],
    /// UTC time of day for the scheduled anchor run.
    pub anchor_time_utc: NaiveTime,
    /// Blockchain submission settings. None disables anchoring entirely
    /// (the archive still accumulates claim hashes).
    pub anchor: Option<AnchorConfig>,
}

/// Settings for the Ethereum anchoring client.
#[derive(Debug, Clone)]
pub struct AnchorConfig {
    /// Ethereum JSON-RPC endpoint.
    pub rpc_url: String,
    /// Private key (hex, without 0x prefix) for signing anchor transactions.
    pub private_key_hex: String,
    /// Chain ID (1 for mainnet, 11155111 for Sepolia).
    pub chain_id: u64,
    /// Address of the anchoring contract (0x-prefixed hex).
    pub contract: String,
    /// Upper bound on a single RPC call.
    pub rpc_timeout: Duration,
}

impl Config {
    /// Load configuration from `ATTEST_*` environment variables.
    ///
    /// `ATTEST_SEED` is required; anchoring variables are optional as a
    /// group (`ATTEST_RPC_URL`, `ATTEST_RPC_PRIVATE_KEY`, `ATTEST_CHAIN_ID`,
    /// `ATTEST_CONTRACT`).
    pub fn from_env() -> Result<Self> {
        let seed_hex = env::var("ATTEST_SEED")
            .map_err(|_| AttestError::Validation("ATTEST_SEED is required (32-byte hex)".into()))?;
        let seed = parse_seed(&seed_hex)?;

        let data_dir = PathBuf::from(env::var("ATTEST_DATA_DIR").unwrap_or_else(|_| "data".into()));
        let bind_addr = env::var("ATTEST_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8080".into());

        let anchor_time_utc = match env::var("ATTEST_ANCHOR_TIME") {
            Ok(raw) => NaiveTime::parse_from_str(&raw, "%H:%M").map_err(|e| {
                AttestError::Validation(format!("ATTEST_ANCHOR_TIME must be HH:MM: {e}"))
            })?,
            Err(_) => NaiveTime::parse_from_str(DEFAULT_ANCHOR_TIME, "%H:%M").unwrap(),
        };

        let anchor = match env::var("ATTEST_RPC_URL") {
            Ok(rpc_url) => {
                let private_key_hex = env::var("ATTEST_RPC_PRIVATE_KEY").map_err(|_| {
                    AttestError::Validation(
                        "ATTEST_RPC_PRIVATE_KEY is required when ATTEST_RPC_URL is set".into(),
                    )
                })?;
                let chain_id = env::var("ATTEST_CHAIN_ID")
                    .map_err(|_| {
                        AttestError::Validation(
                            "ATTEST_CHAIN_ID is required when ATTEST_RPC_URL is set".into(),
                        )
                    })?
                    .parse::<u64>()
                    .map_err(|e| {
                        AttestError::Validation(format!("ATTEST_CHAIN_ID must be an integer: {e}"))
                    })?;
                let contract = env::var("ATTEST_CONTRACT").map_err(|_| {
                    AttestError::Validation(
                        "ATTEST_CONTRACT is required when ATTEST_RPC_URL is set".into(),
                    )
                })?;
                let rpc_timeout = env::var("ATTEST_RPC_TIMEOUT_SECS")
                    .ok()
                    .and_then(|raw| raw.parse::<u64>().ok())
                    .map(Duration::from_secs)
                    .unwrap_or(Duration::from_secs(30));

                Some(AnchorConfig {
                    rpc_url,
                    private_key_hex,
                    chain_id,
                    contract,
                    rpc_timeout,
                })
            }
            Err(_) => None,
        };

        Ok(Self {
            data_dir,
            bind_addr,
            seed,
            anchor_time_utc,
            anchor,
        })
    }

    pub fn bundle_dir(&self) -> PathBuf {
        self.data_dir.join("bundles")
    }

    pub fn archive_dir(&self) -> PathBuf {
        self.data_dir.join("archive")
    }

    pub fn ledger_path(&self) -> PathBuf {
        self.data_dir.join("anchor").join("status.json")
    }

    pub fn scheduler_state_path(&self) -> PathBuf {
        self.data_dir.join("anchor").join("scheduler.json")
    }
}

/// Parse a 32-byte hex seed.
pub fn parse_seed(raw: &str) -> Result<[u8; 32]> {
    let bytes = hex::decode(raw.trim())
        .map_err(|e| AttestError::Validation(format!("seed is not valid hex: {e}")))?;
    let seed: [u8; 32] = bytes
        .try_into()
        .map_err(|_| AttestError::Validation("seed must be exactly 32 bytes".into()))?;
    Ok(seed)
}
