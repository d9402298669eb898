/// Ethereum anchoring client.
///
/// Submits the day's Merkle root as calldata to the anchoring contract:
/// `anchor(uint256 day, bytes32 root)` with the day as its numeric
/// `YYYYMMDD` form. Uses raw JSON-RPC for node compatibility; transactions
/// are signed locally, never by the node.
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Deserialize;

use super::{AnchorClient, AnchorReceipt};
use crate::error::{AttestError, Result};

/// Configuration for the Ethereum anchor client.
#[derive(Debug, Clone)]
pub struct EthereumConfig {
    /// Ethereum JSON-RPC endpoint (e.g., Infura, Alchemy, local node).
    pub rpc_url: String,
    /// Private key (hex, without 0x prefix) for signing transactions.
    /// In production, this would come from a KMS.
    pub private_key_hex: String,
    /// Chain ID (1 for mainnet, 11155111 for Sepolia).
    pub chain_id: u64,
    /// Anchoring contract address (0x-prefixed hex).
    pub contract: String,
    /// Upper bound on each RPC call.
    pub timeout: Duration,
}

/// Ethereum calldata anchor implementation.
pub struct EthereumAnchor {
    config: EthereumConfig,
    client: Client,
}

/// Simplified JSON-RPC response.
#[derive(Debug, Deserialize)]
struct JsonRpcResponse<T> {
    result: Option<T>,
    error: Option<JsonRpcError>,
}

#[derive(Debug, Deserialize)]
struct JsonRpcError {
    message: String,
}

impl EthereumAnchor {
    pub fn new(config: EthereumConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| AttestError::AnchorSubmission(format!("HTTP client setup: {e}")))?;
        Ok(Self { config, client })
    }

    /// Send a JSON-RPC request to the Ethereum node.
    async fn rpc_call<T: serde::de::DeserializeOwned>(
        &self,
        method: &str,
        params: serde_json::Value,
    ) -> Result<T> {
        let body = serde_json::json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": 1
        });

        let resp: JsonRpcResponse<T> = self
            .client
            .post(&self.config.rpc_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| AttestError::AnchorSubmission(format!("{method}: {e}")))?
            .json()
            .await
            .map_err(|e| AttestError::AnchorSubmission(format!("{method} response parse: {e}")))?;

        if let Some(err) = resp.error {
            return Err(AttestError::AnchorSubmission(format!(
                "{method}: {}",
                err.message
            )));
        }

        resp.result
            .ok_or_else(|| AttestError::AnchorSubmission(format!("{method}: empty response")))
    }

    /// ABI-encode the `anchor(uint256,bytes32)` call.
    fn anchor_calldata(day: NaiveDate, root: &[u8; 32]) -> Vec<u8> {
        let selector = &alloy::primitives::keccak256(b"anchor(uint256,bytes32)")[..4];
        let day_num: u64 = ClaimDayNumber::from(day).0;

        let mut data = Vec::with_capacity(4 + 64);
        data.extend_from_slice(selector);
        data.extend_from_slice(&[0u8; 24]);
        data.extend_from_slice(&day_num.to_be_bytes());
        data.extend_from_slice(root);
        data
    }

    /// Build, sign, and send the anchoring transaction.
    async fn send_anchor_tx(&self, day: NaiveDate, root: &[u8; 32]) -> Result<String> {
        use alloy::consensus::SignableTransaction;
        use alloy::primitives::{Address, Bytes, U256};
        use alloy::signers::local::PrivateKeySigner;
        use alloy::signers::Signer;

        let signer: PrivateKeySigner = self
            .config
            .private_key_hex
            .parse()
            .map_err(|e| AttestError::AnchorSubmission(format!("invalid private key: {e}")))?;
        let from_address = signer.address();

        let contract: Address = self
            .config
            .contract
            .parse()
            .map_err(|e| AttestError::AnchorSubmission(format!("invalid contract address: {e}")))?;

        // Get nonce
        let nonce_hex: String = self
            .rpc_call(
                "eth_getTransactionCount",
                serde_json::json!([format!("{from_address:?}"), "pending"]),
            )
            .await?;
        let nonce = u64::from_str_radix(nonce_hex.trim_start_matches("0x"), 16)
            .map_err(|e| AttestError::AnchorSubmission(format!("invalid nonce: {e}")))?;

        // Get gas price
        let gas_price_hex: String = self.rpc_call("eth_gasPrice", serde_json::json!([])).await?;
        let gas_price = u128::from_str_radix(gas_price_hex.trim_start_matches("0x"), 16)
            .map_err(|e| AttestError::AnchorSubmission(format!("invalid gas price: {e}")))?;

        let tx = alloy::consensus::TxLegacy {
            chain_id: Some(self.config.chain_id),
            nonce,
            gas_price,
            gas_limit: 60_000,
            to: alloy::primitives::TxKind::Call(contract),
            value: U256::ZERO,
            input: Bytes::from(Self::anchor_calldata(day, root)),
        };

        // Sign the transaction
        let sig_hash = tx.signature_hash();
        let sig = signer
            .sign_hash(&sig_hash)
            .await
            .map_err(|e| AttestError::AnchorSubmission(format!("signing failed: {e}")))?;

        // RLP-encode and send
        let signed = alloy::consensus::TxEnvelope::Legacy(tx.into_signed(sig));
        let mut raw_tx = Vec::new();
        alloy::eips::eip2718::Encodable2718::encode_2718(&signed, &mut raw_tx);
        let raw_hex = format!("0x{}", hex::encode(&raw_tx));

        let tx_hash: String = self
            .rpc_call("eth_sendRawTransaction", serde_json::json!([raw_hex]))
            .await?;

        Ok(tx_hash)
    }
}

#[async_trait]
impl AnchorClient for EthereumAnchor {
    fn chain_name(&self) -> &str {
        "ethereum"
    }

    async fn submit(&self, day: NaiveDate, root: &[u8; 32]) -> Result<AnchorReceipt> {
        let tx_hash = self.send_anchor_tx(day, root).await?;

        Ok(AnchorReceipt {
            chain: "ethereum".to_string(),
            tx_hash,
            anchored_root: hex::encode(root),
        })
    }
}

/// A calendar day as its numeric `YYYYMMDD` form for the contract call.
struct ClaimDayNumber(u64);

impl From<NaiveDate> for ClaimDayNumber {
    fn from(day: NaiveDate) -> Self {
        let formatted = day.format("%Y%m%d").to_string();
        // Eight ASCII digits always parse
        Self(formatted.parse().unwrap_or(0))
    }
}
