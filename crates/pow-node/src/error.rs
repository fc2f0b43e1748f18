use pow_core::PowError;

/// Node error codes meaning "no such block".
const RPC_INVALID_ADDRESS_OR_KEY: i64 = -5;
const RPC_INVALID_PARAMETER: i64 = -8;

#[derive(Debug, thiserror::Error)]
pub enum NodeError {
    #[error("invalid node configuration: {0}")]
    Config(String),
    #[error("transport error: {0}")]
    Transport(String),
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Pow(#[from] PowError),
}

impl NodeError {
    /// Whether the node reported that the requested block does not exist.
    pub fn is_not_found(&self) -> bool {
        match self {
            NodeError::Rpc { code, .. } => {
                *code == RPC_INVALID_ADDRESS_OR_KEY || *code == RPC_INVALID_PARAMETER
            }
            NodeError::Pow(PowError::NotFound(_)) => true,
            _ => false,
        }
    }
}

impl From<NodeError> for PowError {
    fn from(e: NodeError) -> Self {
        if e.is_not_found() {
            return match e {
                NodeError::Pow(inner) => inner,
                other => PowError::NotFound(other.to_string()),
            };
        }
        match e {
            NodeError::Pow(inner) => inner,
            other => PowError::Source(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, NodeError>;
