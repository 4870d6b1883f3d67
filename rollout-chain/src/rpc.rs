//! JSON-RPC over HTTP transport for nodes with managed accounts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use serde::Deserialize;
use serde_json::{json, Value};

use rollout_core::types::decode_hex;
use rollout_core::{Address, H256};

use crate::error::TransportError;
use crate::receipt::{Log, Receipt};
use crate::transport::{Transport, TxRequest};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const SEND_TRANSACTION: &str = "eth_sendTransaction";

#[derive(Debug)]
pub struct JsonRpcTransport {
    endpoint: String,
    agent: ureq::Agent,
    next_id: AtomicU64,
}

#[derive(Debug, Deserialize)]
struct RpcReply {
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcFailure>,
}

#[derive(Debug, Deserialize)]
struct RpcFailure {
    #[serde(default)]
    code: i64,
    message: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawReceipt {
    transaction_hash: H256,
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    contract_address: Option<Address>,
    #[serde(default)]
    logs: Vec<RawLog>,
    #[serde(default)]
    revert_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawLog {
    address: Address,
    topics: Vec<H256>,
    data: String,
}

impl JsonRpcTransport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            agent: ureq::AgentBuilder::new().timeout(REQUEST_TIMEOUT).build(),
            next_id: AtomicU64::new(1),
        }
    }

    fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let body = json!({ "jsonrpc": "2.0", "id": id, "method": method, "params": params });
        tracing::debug!(endpoint = %self.endpoint, method, id, "rpc request");

        let response = match self.agent.post(&self.endpoint).send_json(body) {
            Ok(response) => response,
            Err(ureq::Error::Status(code, _)) if code >= 500 => {
                return Err(delivered_failure(method, format!("HTTP {code}")));
            }
            Err(ureq::Error::Status(code, response)) => {
                let text = response.into_string().unwrap_or_default();
                return Err(TransportError::Rpc(format!("HTTP {code}: {text}")));
            }
            Err(ureq::Error::Transport(t)) => {
                let message = t.to_string();
                return Err(match t.kind() {
                    ureq::ErrorKind::Dns | ureq::ErrorKind::ConnectionFailed => {
                        TransportError::Unavailable(message)
                    }
                    _ => delivered_failure(method, message),
                });
            }
        };

        let reply: RpcReply = response
            .into_json()
            .map_err(|e| TransportError::Rpc(format!("invalid {method} response: {e}")))?;
        if let Some(failure) = reply.error {
            if is_revert(&failure) {
                return Err(TransportError::Rejected {
                    message: failure.message,
                });
            }
            return Err(TransportError::Rpc(format!(
                "{method}: {} (code {})",
                failure.message, failure.code
            )));
        }
        Ok(reply.result.unwrap_or(Value::Null))
    }

    fn decode<T: for<'de> Deserialize<'de>>(
        method: &str,
        value: Value,
    ) -> Result<T, TransportError> {
        serde_json::from_value(value)
            .map_err(|e| TransportError::Rpc(format!("invalid {method} result: {e}")))
    }
}

/// A failure after the request may have reached the node. Only a
/// transaction submission is unsafe to repeat.
fn delivered_failure(method: &str, message: String) -> TransportError {
    if method == SEND_TRANSACTION {
        TransportError::Indeterminate(message)
    } else {
        TransportError::Unavailable(message)
    }
}

/// Geth reports reverts with code 3; Hardhat and Anvil put it in the message.
fn is_revert(failure: &RpcFailure) -> bool {
    failure.code == 3 || failure.message.to_ascii_lowercase().contains("revert")
}

fn quantity(value: &str) -> Result<u64, TransportError> {
    u64::from_str_radix(value.trim_start_matches("0x"), 16)
        .map_err(|e| TransportError::Rpc(format!("invalid quantity '{value}': {e}")))
}

fn tx_json(tx: &TxRequest) -> Value {
    let mut obj = json!({
        "from": tx.from,
        "data": format!("0x{}", hex::encode(&tx.data)),
    });
    if let Some(to) = tx.to {
        obj["to"] = json!(to);
    }
    if let Some(gas) = tx.gas {
        obj["gas"] = json!(format!("{gas:#x}"));
    }
    obj
}

impl Transport for JsonRpcTransport {
    fn endpoint(&self) -> &str {
        &self.endpoint
    }

    fn chain_id(&self) -> Result<u64, TransportError> {
        let raw: String = Self::decode("eth_chainId", self.request("eth_chainId", json!([]))?)?;
        quantity(&raw)
    }

    fn accounts(&self) -> Result<Vec<Address>, TransportError> {
        Self::decode("eth_accounts", self.request("eth_accounts", json!([]))?)
    }

    fn send_transaction(&self, tx: &TxRequest) -> Result<H256, TransportError> {
        let result = self.request(SEND_TRANSACTION, json!([tx_json(tx)]))?;
        Self::decode(SEND_TRANSACTION, result)
    }

    fn receipt(&self, hash: &H256) -> Result<Option<Receipt>, TransportError> {
        let result = self.request("eth_getTransactionReceipt", json!([hash]))?;
        let raw: Option<RawReceipt> = Self::decode("eth_getTransactionReceipt", result)?;
        let Some(raw) = raw else {
            return Ok(None);
        };
        let status = match raw.status.as_deref() {
            Some(s) => quantity(s)? == 1,
            // Pre-Byzantium receipts carry no status.
            None => true,
        };
        let logs = raw
            .logs
            .into_iter()
            .map(|log| {
                Ok(Log {
                    address: log.address,
                    topics: log.topics,
                    data: decode_hex(&log.data).map_err(|e| TransportError::Rpc(e.to_string()))?,
                })
            })
            .collect::<Result<_, TransportError>>()?;
        Ok(Some(Receipt {
            transaction_hash: raw.transaction_hash,
            status,
            contract_address: raw.contract_address,
            logs,
            revert_reason: raw.revert_reason,
        }))
    }

    fn call(&self, tx: &TxRequest) -> Result<Vec<u8>, TransportError> {
        let result = self.request("eth_call", json!([tx_json(tx), "latest"]))?;
        let raw: String = Self::decode("eth_call", result)?;
        decode_hex(&raw).map_err(|e| TransportError::Rpc(e.to_string()))
    }
}
