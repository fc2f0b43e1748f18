//! JSON-RPC header source for `pow-core`.
//!
//! [`NodeClient`] speaks the node's JSON-RPC 1.1 dialect and implements
//! [`pow_core::HeaderSource`], so headers can be fetched by height, by hash
//! or as a `getwork` template. Moving bytes over the wire is left to a
//! caller-supplied [`Transport`].

pub mod client;
pub mod config;
pub mod error;
pub mod rpc;

pub use client::{NodeClient, Transport};
pub use config::RpcConfig;
pub use error::{NodeError, Result};
pub use rpc::{RpcMethod, RpcRequest, RpcResponse, WorkResponse};
