//! Header source backed by a node's JSON-RPC interface.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use pow_core::source::decode_getwork_data;
use pow_core::{BlockFields, BlockHeader, BlockRef, HeaderSource, PowError};
use serde_json::Value;
use tracing::{debug, warn};

use crate::config::RpcConfig;
use crate::error::{NodeError, Result};
use crate::rpc::{RpcMethod, RpcRequest, RpcResponse, WorkResponse};

/// Delivers a request body to the node and returns the response body.
///
/// HTTP, authentication and timeouts are the implementation's business;
/// `config` carries the endpoint, credentials and timeout to use.
pub trait Transport {
    fn post(&self, config: &RpcConfig, body: &str) -> Result<String>;
}

impl<F> Transport for F
where
    F: Fn(&RpcConfig, &str) -> Result<String>,
{
    fn post(&self, config: &RpcConfig, body: &str) -> Result<String> {
        self(config, body)
    }
}

pub struct NodeClient<T> {
    config: RpcConfig,
    transport: T,
    last_id: AtomicU64,
}

impl<T: Transport> NodeClient<T> {
    pub fn new(config: RpcConfig, transport: T) -> Self {
        NodeClient {
            config,
            transport,
            last_id: AtomicU64::new(0),
        }
    }

    pub fn config(&self) -> &RpcConfig {
        &self.config
    }

    /// Send one request. Every call gets a fresh id.
    pub fn call(&self, method: &RpcMethod) -> Result<Value> {
        let id = self.last_id.fetch_add(1, Ordering::Relaxed) + 1;
        let body = serde_json::to_string(&RpcRequest::new(method, id))?;

        debug!(method = method.name(), id, url = %self.config.url(), "sending rpc request");
        let started = Instant::now();
        let reply = self.transport.post(&self.config, &body)?;
        debug!(
            method = method.name(),
            id,
            bytes = reply.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "rpc response received"
        );

        let response: RpcResponse = serde_json::from_str(&reply)?;
        if !response.id.is_null() && response.id != Value::from(id) {
            return Err(NodeError::InvalidResponse(format!(
                "response id {} does not match request id {}",
                response.id, id
            )));
        }
        response.into_result().map_err(|e| {
            warn!(method = method.name(), id, error = %e, "rpc call failed");
            e
        })
    }

    pub fn block_count(&self) -> Result<u64> {
        let count = self.call(&RpcMethod::GetBlockCount)?;
        count
            .as_u64()
            .ok_or_else(|| NodeError::InvalidResponse(format!("block count {}", count)))
    }

    /// Display-order hash of the block at `height`.
    pub fn block_hash(&self, height: u64) -> Result<String> {
        match self.call(&RpcMethod::GetBlockHash { height })? {
            Value::String(hash) => Ok(hash),
            other => Err(NodeError::InvalidResponse(format!("block hash {}", other))),
        }
    }

    pub fn block(&self, hash: &str) -> Result<BlockFields> {
        let value = self.call(&RpcMethod::GetBlock {
            hash: hash.to_string(),
        })?;
        Ok(BlockFields::from_value(value)?)
    }

    pub fn work(&self) -> Result<WorkResponse> {
        Ok(serde_json::from_value(self.call(&RpcMethod::GetWork)?)?)
    }

    /// Turn a possibly tip-relative height into an absolute one.
    ///
    /// -1 is the tip, which sits at height `getblockcount`.
    pub fn resolve_height(&self, height: i64) -> Result<u64> {
        if height >= 0 {
            return Ok(height as u64);
        }
        let count = self.block_count()?;
        let absolute = count as i64 + height + 1;
        if absolute < 0 {
            return Err(PowError::NotFound(BlockRef::Height(height).to_string()).into());
        }
        Ok(absolute as u64)
    }

    /// Fetch and decode the header for a block reference.
    pub fn fetch_header(&self, reference: &BlockRef) -> Result<BlockHeader> {
        let hash = match reference {
            BlockRef::Height(height) => self.block_hash(self.resolve_height(*height)?)?,
            BlockRef::Hash(hash) => pow_core::hash_to_display_hex(hash),
        };
        let header = BlockHeader::from_fields(&self.block(&hash)?)?;
        debug!(%reference, hash = %header.display_hash(), "fetched header");
        Ok(header)
    }
}

impl<T: Transport> HeaderSource for NodeClient<T> {
    fn header_by_hash(&self, hash: &[u8; 32]) -> pow_core::Result<Vec<u8>> {
        Ok(self.fetch_header(&BlockRef::Hash(*hash))?.serialize().to_vec())
    }

    fn header_by_height(&self, height: i64) -> pow_core::Result<Vec<u8>> {
        Ok(self.fetch_header(&BlockRef::Height(height))?.serialize().to_vec())
    }

    fn work_template(&self) -> pow_core::Result<Vec<u8>> {
        let work = self.work()?;
        Ok(decode_getwork_data(&work.data)?.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pow_core::source::encode_getwork_data;
    use pow_core::{Network, SearchResult};
    use serde_json::json;
    use std::sync::Mutex;

    const GENESIS_HEADER_HEX: &str = "0100000000000000000000000000000000000000000000000000000000000000000000003ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa4b1e5e4a29ab5f49ffff001d1dac2b7c";
    const GENESIS_HASH: &str = "000000000019d6689c085ae165831e934ff763ae46a2a6c172b3f1b60a8ce26f";
    const BLOCK_1_HASH: &str = "00000000839a8e6886ab5951d76f411475428afc90947ee320161bbf18eb6048";

    fn genesis_fields() -> Value {
        json!({
            "hash": GENESIS_HASH,
            "height": 0,
            "version": 1,
            "merkleroot": "4a5e1e4baab89f3a32518a88c31bc87f618f76673e2cc77ab2127b7afdeda33b",
            "time": 1231006505,
            "bits": "1d00ffff",
            "nonce": 2083236893u32,
            "confirmations": 2,
        })
    }

    fn block_1_fields() -> Value {
        json!({
            "hash": BLOCK_1_HASH,
            "height": 1,
            "version": 1,
            "previousblockhash": GENESIS_HASH,
            "merkleroot": "0e3e2357e806b6cdb1f70b54c3a3a17b6714ee1f0e68bebb44a74b1efd512098",
            "time": 1231469665,
            "bits": "1d00ffff",
            "nonce": 2573394689u32,
            "confirmations": 1,
        })
    }

    /// A two-block chain answering the calls the client makes.
    #[derive(Default)]
    struct FakeNode {
        requests: Mutex<Vec<Value>>,
    }

    impl FakeNode {
        fn answer(&self, request: &Value) -> Value {
            let blocks = [genesis_fields(), block_1_fields()];
            let params = &request["params"];
            let rpc_error = |code: i64, message: &str| json!({"code": code, "message": message});

            let (result, error) = match request["method"].as_str().unwrap() {
                "getblockcount" => (json!(blocks.len() - 1), Value::Null),
                "getblockhash" => match blocks.get(params[0].as_u64().unwrap() as usize) {
                    Some(block) => (block["hash"].clone(), Value::Null),
                    None => (Value::Null, rpc_error(-8, "Block height out of range")),
                },
                "getblock" => match blocks.iter().find(|b| b["hash"] == params[0]) {
                    Some(block) => (block.clone(), Value::Null),
                    None => (Value::Null, rpc_error(-5, "Block not found")),
                },
                "getwork" => {
                    let header: [u8; 80] = hex::decode(GENESIS_HEADER_HEX)
                        .unwrap()
                        .try_into()
                        .unwrap();
                    let work = json!({
                        "data": encode_getwork_data(&header),
                        "target": format!("{}00000000", "ff".repeat(28)),
                    });
                    (work, Value::Null)
                }
                _ => (Value::Null, rpc_error(-32601, "Method not found")),
            };
            json!({"result": result, "error": error, "id": request["id"]})
        }
    }

    impl Transport for &FakeNode {
        fn post(&self, _config: &RpcConfig, body: &str) -> Result<String> {
            let request: Value = serde_json::from_str(body)?;
            let reply = self.answer(&request);
            self.requests.lock().unwrap().push(request);
            Ok(reply.to_string())
        }
    }

    fn client(node: &FakeNode) -> NodeClient<&FakeNode> {
        NodeClient::new(RpcConfig::local(Network::Mainnet, "user", "pass"), node)
    }

    #[test]
    fn test_ids_increment() {
        let node = FakeNode::default();
        let client = client(&node);
        assert_eq!(client.block_count().unwrap(), 1);
        assert_eq!(client.block_hash(0).unwrap(), GENESIS_HASH);

        let requests = node.requests.lock().unwrap();
        assert_eq!(requests[0]["id"], json!(1));
        assert_eq!(requests[1]["id"], json!(2));
        assert_eq!(requests[0]["version"], json!("1.1"));
        assert_eq!(requests[1]["params"], json!([0]));
    }

    #[test]
    fn test_header_by_height_and_hash() {
        let node = FakeNode::default();
        let client = client(&node);

        let tip = BlockHeader::from_external(&client, &BlockRef::tip()).unwrap();
        assert_eq!(tip.display_hash(), BLOCK_1_HASH);

        let genesis = BlockHeader::from_external(&client, &BlockRef::tip_minus(1)).unwrap();
        assert_eq!(genesis.display_hash(), GENESIS_HASH);
        assert_eq!(hex::encode(genesis.serialize()), GENESIS_HEADER_HEX);

        let by_hash =
            BlockHeader::from_external(&client, &BlockRef::Hash(genesis.calculate_hash())).unwrap();
        assert_eq!(by_hash, genesis);
    }

    #[test]
    fn test_missing_blocks_are_not_found() {
        let node = FakeNode::default();
        let client = client(&node);

        assert!(matches!(client.header_by_height(5), Err(PowError::NotFound(_))));
        assert!(matches!(client.header_by_height(-3), Err(PowError::NotFound(_))));
        assert!(matches!(client.header_by_hash(&[0x11; 32]), Err(PowError::NotFound(_))));
    }

    #[test]
    fn test_work_template_searchable() {
        let node = FakeNode::default();
        let client = client(&node);

        let template = BlockHeader::from_work_template(&client).unwrap();
        assert_eq!(hex::encode(template.serialize()), GENESIS_HEADER_HEX);

        let result = template.search(2_083_236_893 - 500).unwrap();
        assert!(matches!(result, SearchResult::Found { nonce: 2_083_236_893, .. }));
    }

    #[test]
    fn test_transport_failure_is_source_error() {
        let failing = |_: &RpcConfig, _: &str| -> Result<String> {
            Err(NodeError::Transport("connection refused".to_string()))
        };
        let client = NodeClient::new(RpcConfig::local(Network::Regtest, "u", "p"), failing);
        assert!(matches!(client.header_by_height(0), Err(PowError::Source(_))));
        assert!(matches!(client.block_count(), Err(NodeError::Transport(_))));
    }

    #[test]
    fn test_transport_receives_connection_settings() {
        let mut config = RpcConfig::local(Network::Testnet, "alice", "s3cret");
        config.timeout_secs = 7;
        config.use_tls = true;

        let checking = |config: &RpcConfig, _: &str| -> Result<String> {
            assert_eq!((config.user.as_str(), config.password.as_str()), ("alice", "s3cret"));
            assert_eq!(config.timeout(), std::time::Duration::from_secs(7));
            assert_eq!(config.url(), "https://127.0.0.1:18332/");
            Ok(r#"{"result": 42, "error": null, "id": 1}"#.to_string())
        };
        let client = NodeClient::new(config, checking);
        assert_eq!(client.block_count().unwrap(), 42);
    }

    #[test]
    fn test_mismatched_response_id_rejected() {
        let stale = |_: &RpcConfig, _: &str| -> Result<String> {
            Ok(r#"{"result": 42, "error": null, "id": 99}"#.to_string())
        };
        let client = NodeClient::new(RpcConfig::local(Network::Mainnet, "u", "p"), stale);
        assert!(matches!(client.block_count(), Err(NodeError::InvalidResponse(_))));
    }
}
