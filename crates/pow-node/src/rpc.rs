//! JSON-RPC 1.1 envelopes for the handful of node calls the search needs.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{NodeError, Result};

const RPC_VERSION: &str = "1.1";

/// Node calls used to obtain headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RpcMethod {
    GetBlockCount,
    GetBlockHash { height: u64 },
    /// Hash in display order, as the node prints it.
    GetBlock { hash: String },
    GetWork,
}

impl RpcMethod {
    pub fn name(&self) -> &'static str {
        match self {
            RpcMethod::GetBlockCount => "getblockcount",
            RpcMethod::GetBlockHash { .. } => "getblockhash",
            RpcMethod::GetBlock { .. } => "getblock",
            RpcMethod::GetWork => "getwork",
        }
    }

    pub fn params(&self) -> Vec<Value> {
        match self {
            RpcMethod::GetBlockCount | RpcMethod::GetWork => Vec::new(),
            RpcMethod::GetBlockHash { height } => vec![json!(height)],
            RpcMethod::GetBlock { hash } => vec![json!(hash)],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RpcRequest {
    pub version: &'static str,
    pub method: &'static str,
    pub params: Vec<Value>,
    pub id: u64,
}

impl RpcRequest {
    pub fn new(method: &RpcMethod, id: u64) -> Self {
        RpcRequest {
            version: RPC_VERSION,
            method: method.name(),
            params: method.params(),
            id,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct RpcResponse {
    #[serde(default)]
    pub result: Value,
    #[serde(default)]
    pub error: Value,
    #[serde(default)]
    pub id: Value,
}

impl RpcResponse {
    /// The `result` member, or the node's `error` as [`NodeError::Rpc`].
    pub fn into_result(self) -> Result<Value> {
        match self.error {
            Value::Null => Ok(self.result),
            Value::Object(ref fields) => {
                let code = fields.get("code").and_then(Value::as_i64).unwrap_or(0);
                let message = match fields.get("message") {
                    Some(Value::String(message)) => message.clone(),
                    _ => self.error.to_string(),
                };
                Err(NodeError::Rpc { code, message })
            }
            other => Err(NodeError::Rpc {
                code: 0,
                message: other.to_string(),
            }),
        }
    }
}

/// The `getwork` result. Only the header data is used; the node's
/// `target` and `hash1` members are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WorkResponse {
    /// Header data, 128 bytes with each word byte-reversed.
    pub data: String,
}
