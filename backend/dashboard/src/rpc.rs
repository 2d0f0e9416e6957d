//! JSON-RPC client for the EVM node that hosts the voting contract.
//!
//! Every call is a single request: no retries, no back-off. Transport
//! failures and JSON-RPC `error` objects both surface as
//! [`DashboardError::RemoteCall`] so callers can decide what to isolate.

use reqwest::Client;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::errors::{DashboardError, Result};
use crate::types::{parse_address, Address};

// ─────────────────────────────────────────────────────────
// JSON-RPC response shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct RpcResponse {
    pub result: Option<Value>,
    pub error: Option<RpcError>,
}

#[derive(Debug, Deserialize)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
}

/// The subset of a transaction receipt the dashboard looks at.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction_hash: String,
    pub status: Option<String>,
    pub block_number: Option<String>,
}

impl Receipt {
    /// Post-Byzantium receipts carry `0x1` on success and `0x0` on revert.
    pub fn succeeded(&self) -> bool {
        !matches!(self.status.as_deref(), Some("0x0"))
    }
}

// ─────────────────────────────────────────────────────────
// Client
// ─────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RpcClient {
    client: Client,
    url: String,
}

impl RpcClient {
    pub fn new(client: Client, url: impl Into<String>) -> Self {
        Self {
            client,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Issue one JSON-RPC request and return its `result`.
    pub async fn call(&self, method: &str, params: Value) -> Result<Value> {
        debug!("rpc → {method}");
        let response = self
            .client
            .post(&self.url)
            .json(&json!({
                "jsonrpc": "2.0",
                "id": 1,
                "method": method,
                "params": params,
            }))
            .send()
            .await
            .map_err(|e| DashboardError::RemoteCall(format!("{method}: {e}")))?;

        let body: RpcResponse = response
            .json()
            .await
            .map_err(|e| DashboardError::RemoteCall(format!("{method}: {e}")))?;

        if let Some(err) = body.error {
            return Err(DashboardError::RemoteCall(format!(
                "{method} failed ({}): {}",
                err.code, err.message
            )));
        }

        Ok(body.result.unwrap_or(Value::Null))
    }

    /// Read-only contract call at the latest block. Returns raw return data.
    pub async fn eth_call(&self, from: Option<&Address>, to: &Address, data: &[u8]) -> Result<Vec<u8>> {
        let mut tx = json!({
            "to": to.to_string(),
            "data": format!("0x{}", hex::encode(data)),
        });
        if let Some(from) = from {
            tx["from"] = json!(from.to_string());
        }
        let result = self.call("eth_call", json!([tx, "latest"])).await?;
        let hex = result
            .as_str()
            .ok_or_else(|| DashboardError::RemoteCall("eth_call returned non-string".to_string()))?;
        crate::abi::decode_hex(hex)
    }

    /// Submit a transaction for the node to sign with `from`. Returns the hash.
    pub async fn send_transaction(&self, from: &Address, to: &Address, data: &[u8]) -> Result<String> {
        let result = self
            .call(
                "eth_sendTransaction",
                json!([{
                    "from": from.to_string(),
                    "to": to.to_string(),
                    "data": format!("0x{}", hex::encode(data)),
                }]),
            )
            .await?;
        result.as_str().map(String::from).ok_or_else(|| {
            DashboardError::RemoteCall("eth_sendTransaction returned no hash".to_string())
        })
    }

    /// `None` while the transaction is still unmined.
    pub async fn transaction_receipt(&self, hash: &str) -> Result<Option<Receipt>> {
        let result = self
            .call("eth_getTransactionReceipt", json!([hash]))
            .await?;
        if result.is_null() {
            return Ok(None);
        }
        Ok(Some(serde_json::from_value(result)?))
    }

    /// Ask the wallet for account access, falling back to `eth_accounts` on
    /// nodes that do not implement the wallet method.
    pub async fn request_accounts(&self) -> Result<Vec<Address>> {
        let result = match self.call("eth_requestAccounts", json!([])).await {
            Ok(v) => v,
            Err(e) => {
                debug!("eth_requestAccounts unavailable ({e}), using eth_accounts");
                self.call("eth_accounts", json!([])).await?
            }
        };
        let raw: Vec<String> = serde_json::from_value(result)?;
        raw.iter().map(|s| parse_address(s)).collect()
    }

    pub async fn chain_id(&self) -> Result<u64> {
        let result = self.call("eth_chainId", json!([])).await?;
        let hex = result
            .as_str()
            .ok_or_else(|| DashboardError::RemoteCall("eth_chainId returned non-string".to_string()))?;
        parse_quantity(hex)
    }
}

/// Parse a JSON-RPC hex quantity such as `0x7a69`.
pub fn parse_quantity(s: &str) -> Result<u64> {
    let body = s.strip_prefix("0x").unwrap_or(s);
    u64::from_str_radix(body, 16)
        .map_err(|e| DashboardError::Decode(format!("invalid quantity {s:?}: {e}")))
}
