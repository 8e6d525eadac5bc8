//! JSON-RPC provider over HTTP.

use std::time::Duration;

use alloy_core::primitives::{Address, B256, Bytes, U256};
use async_trait::async_trait;
use backon::{ExponentialBuilder, Retryable};
use serde_json::{Value, json};
use url::Url;

use crate::error::{CallError, ProviderError};

use super::{
    BlockTag, CallRequest, LogEntry, Provider, TransactionReceipt, TransactionRequest,
    TransactionView, TxFees,
};

/// Default timeout for a single RPC request.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// How many recent blocks to scan when looking for a user replacement.
const REPLACEMENT_SCAN_DEPTH: u64 = 32;

/// How a JSON-RPC exchange failed.
enum RpcFailure {
    /// The endpoint could not be reached or answered garbage.
    Transport(String),
    /// The node answered with an error object (e.g. a revert).
    Node(String),
}

/// [`Provider`] over plain HTTP JSON-RPC, sending through the node's managed
/// accounts (`eth_sendTransaction`). Transient transport failures retry with
/// exponential backoff before surfacing as fatal.
pub struct HttpProvider {
    url: Url,
    client: reqwest::Client,
}

impl HttpProvider {
    pub fn new(url: Url) -> Result<Self, ProviderError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| ProviderError::new("client", e.to_string()))?;
        Ok(Self { url, client })
    }

    async fn rpc_once(&self, method: &str, params: Vec<Value>) -> Result<Value, RpcFailure> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&json!({
                "jsonrpc": "2.0",
                "method": method,
                "params": params,
                "id": 1
            }))
            .send()
            .await
            .map_err(|e| RpcFailure::Transport(e.to_string()))?;

        let body: Value = response
            .json()
            .await
            .map_err(|e| RpcFailure::Transport(e.to_string()))?;

        if let Some(error) = body.get("error") {
            let message = error
                .get("message")
                .and_then(|m| m.as_str())
                .unwrap_or("unknown")
                .to_string();
            return Err(RpcFailure::Node(message));
        }

        body.get("result")
            .cloned()
            .ok_or_else(|| RpcFailure::Transport("no result in response".to_string()))
    }

    /// RPC call with retry on transport failure. Node-level errors are never
    /// retried: a revert does not become a success on the second try.
    async fn rpc(&self, method: &str, params: Vec<Value>) -> Result<Value, ProviderError> {
        (|| self.rpc_once(method, params.clone()))
            .retry(ExponentialBuilder::default().with_max_times(3))
            .when(|f| matches!(f, RpcFailure::Transport(_)))
            .notify(|_, dur| {
                tracing::trace!(method, after = ?dur, "RPC transport failure, retrying...");
            })
            .await
            .map_err(|f| match f {
                RpcFailure::Transport(reason) | RpcFailure::Node(reason) => {
                    ProviderError::new(method, reason)
                }
            })
    }

    async fn rpc_quantity(&self, method: &str, params: Vec<Value>) -> Result<u64, ProviderError> {
        let value = self.rpc(method, params).await?;
        parse_quantity(&value).map_err(|reason| ProviderError::new(method, reason))
    }
}

fn parse_quantity(value: &Value) -> Result<u64, String> {
    let s = value.as_str().ok_or("expected a hex quantity string")?;
    u64::from_str_radix(s.trim_start_matches("0x"), 16).map_err(|e| e.to_string())
}

fn parse_u256(value: &Value) -> Result<U256, String> {
    let s = value.as_str().ok_or("expected a hex quantity string")?;
    U256::from_str_radix(s.trim_start_matches("0x"), 16).map_err(|e| e.to_string())
}

fn parse_address(value: &Value) -> Result<Address, String> {
    let s = value.as_str().ok_or("expected an address string")?;
    s.parse().map_err(|_| format!("invalid address: {s}"))
}

fn parse_hash(value: &Value) -> Result<B256, String> {
    let s = value.as_str().ok_or("expected a hash string")?;
    s.parse().map_err(|_| format!("invalid hash: {s}"))
}

fn parse_bytes(value: &Value) -> Result<Bytes, String> {
    let s = value.as_str().ok_or("expected a hex data string")?;
    s.parse().map_err(|_| "invalid hex data".to_string())
}

fn parse_receipt(value: &Value) -> Result<TransactionReceipt, String> {
    let block_number = parse_quantity(&value["blockNumber"])?;
    let status = parse_quantity(&value["status"])? == 1;
    let contract_address = match &value["contractAddress"] {
        Value::Null => None,
        other => Some(parse_address(other)?),
    };
    let mut logs = Vec::new();
    for log in value["logs"].as_array().unwrap_or(&Vec::new()) {
        let mut topics = Vec::new();
        for topic in log["topics"].as_array().unwrap_or(&Vec::new()) {
            topics.push(parse_hash(topic)?);
        }
        logs.push(LogEntry {
            address: parse_address(&log["address"])?,
            topics,
            data: parse_bytes(&log["data"])?,
        });
    }
    Ok(TransactionReceipt {
        block_number,
        status,
        contract_address,
        logs,
    })
}

fn quantity_hex(value: u64) -> String {
    format!("0x{value:x}")
}

fn u256_hex(value: U256) -> String {
    format!("0x{value:x}")
}

#[async_trait]
impl Provider for HttpProvider {
    async fn chain_id(&self) -> Result<u64, ProviderError> {
        self.rpc_quantity("eth_chainId", vec![]).await
    }

    async fn block_number(&self) -> Result<u64, ProviderError> {
        self.rpc_quantity("eth_blockNumber", vec![]).await
    }

    async fn fee_estimate(&self) -> Result<TxFees, ProviderError> {
        let block = self
            .rpc("eth_getBlockByNumber", vec![json!("latest"), json!(false)])
            .await?;
        let base_fee = parse_u256(&block["baseFeePerGas"])
            .map_err(|reason| ProviderError::new("eth_getBlockByNumber", reason))?;
        let priority = match self.rpc("eth_maxPriorityFeePerGas", vec![]).await {
            Ok(value) => parse_u256(&value)
                .map_err(|reason| ProviderError::new("eth_maxPriorityFeePerGas", reason))?,
            // Some nodes don't expose the method; one gwei is the usual floor.
            Err(_) => U256::from(1_000_000_000u64),
        };
        Ok(TxFees {
            max_fee_per_gas: base_fee * U256::from(2u64) + priority,
            max_priority_fee_per_gas: priority,
        })
    }

    async fn get_balance(&self, address: Address) -> Result<U256, ProviderError> {
        let value = self
            .rpc(
                "eth_getBalance",
                vec![json!(address.to_string()), json!("latest")],
            )
            .await?;
        parse_u256(&value).map_err(|reason| ProviderError::new("eth_getBalance", reason))
    }

    async fn get_transaction_count(
        &self,
        address: Address,
        tag: BlockTag,
    ) -> Result<u64, ProviderError> {
        let tag = match tag {
            BlockTag::Latest => "latest",
            BlockTag::Pending => "pending",
        };
        self.rpc_quantity(
            "eth_getTransactionCount",
            vec![json!(address.to_string()), json!(tag)],
        )
        .await
    }

    async fn send_transaction(&self, request: &TransactionRequest) -> Result<B256, ProviderError> {
        let mut tx = json!({
            "from": request.from.to_string(),
            "data": request.data.to_string(),
            "value": u256_hex(request.value),
            "nonce": quantity_hex(request.nonce),
            "maxFeePerGas": u256_hex(request.fees.max_fee_per_gas),
            "maxPriorityFeePerGas": u256_hex(request.fees.max_priority_fee_per_gas),
        });
        if let Some(to) = request.to {
            tx["to"] = json!(to.to_string());
        }
        let value = self.rpc("eth_sendTransaction", vec![tx]).await?;
        parse_hash(&value).map_err(|reason| ProviderError::new("eth_sendTransaction", reason))
    }

    async fn get_transaction(
        &self,
        hash: B256,
    ) -> Result<Option<TransactionView>, ProviderError> {
        let value = self
            .rpc("eth_getTransactionByHash", vec![json!(hash.to_string())])
            .await?;
        if value.is_null() {
            return Ok(None);
        }
        let view = TransactionView {
            hash,
            nonce: parse_quantity(&value["nonce"])
                .map_err(|reason| ProviderError::new("eth_getTransactionByHash", reason))?,
            block_number: match &value["blockNumber"] {
                Value::Null => None,
                other => Some(
                    parse_quantity(other).map_err(|reason| {
                        ProviderError::new("eth_getTransactionByHash", reason)
                    })?,
                ),
            },
        };
        Ok(Some(view))
    }

    async fn get_transaction_receipt(
        &self,
        hash: B256,
    ) -> Result<Option<TransactionReceipt>, ProviderError> {
        let value = self
            .rpc("eth_getTransactionReceipt", vec![json!(hash.to_string())])
            .await?;
        if value.is_null() {
            return Ok(None);
        }
        parse_receipt(&value)
            .map(Some)
            .map_err(|reason| ProviderError::new("eth_getTransactionReceipt", reason))
    }

    async fn find_transaction_by_nonce(
        &self,
        from: Address,
        nonce: u64,
    ) -> Result<Option<B256>, ProviderError> {
        let head = self.block_number().await?;
        let floor = head.saturating_sub(REPLACEMENT_SCAN_DEPTH);
        for number in (floor..=head).rev() {
            let block = self
                .rpc(
                    "eth_getBlockByNumber",
                    vec![json!(quantity_hex(number)), json!(true)],
                )
                .await?;
            for tx in block["transactions"].as_array().unwrap_or(&Vec::new()) {
                let sender = parse_address(&tx["from"]).unwrap_or(Address::ZERO);
                let tx_nonce = parse_quantity(&tx["nonce"]).unwrap_or(u64::MAX);
                if sender == from && tx_nonce == nonce {
                    let hash = parse_hash(&tx["hash"]).map_err(|reason| {
                        ProviderError::new("eth_getBlockByNumber", reason)
                    })?;
                    return Ok(Some(hash));
                }
            }
        }
        Ok(None)
    }

    async fn call(&self, request: &CallRequest) -> Result<Bytes, CallError> {
        let params = vec![
            json!({
                "from": request.from.to_string(),
                "to": request.to.to_string(),
                "data": request.data.to_string(),
            }),
            json!("latest"),
        ];
        match self.rpc_once("eth_call", params).await {
            Ok(value) => parse_bytes(&value)
                .map_err(|reason| CallError::Provider(ProviderError::new("eth_call", reason))),
            Err(RpcFailure::Node(reason)) => Err(CallError::Reverted { reason }),
            Err(RpcFailure::Transport(reason)) => {
                Err(CallError::Provider(ProviderError::new("eth_call", reason)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quantities_parse_from_hex() {
        assert_eq!(parse_quantity(&json!("0x10")).unwrap(), 16);
        assert_eq!(parse_u256(&json!("0xde0b6b3a7640000")).unwrap(), U256::from(10u64.pow(18)));
        assert!(parse_quantity(&json!(16)).is_err());
    }

    #[test]
    fn receipts_parse_status_and_logs() {
        let value = json!({
            "blockNumber": "0xa",
            "status": "0x1",
            "contractAddress": "0x00000000000000000000000000000000000000aa",
            "logs": [{
                "address": "0x00000000000000000000000000000000000000aa",
                "topics": ["0x0000000000000000000000000000000000000000000000000000000000000001"],
                "data": "0x"
            }]
        });
        let receipt = parse_receipt(&value).unwrap();
        assert!(receipt.status);
        assert_eq!(receipt.block_number, 10);
        assert_eq!(receipt.logs.len(), 1);
        assert_eq!(receipt.logs[0].topics.len(), 1);
    }
}
