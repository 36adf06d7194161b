use thiserror::Error;

/// Chain-backend failures, classified for retry policy: transient errors
/// are retried/deferred, fatal ones bubble up to the operator.
#[derive(Debug, Error, Clone)]
pub enum NodeError {
    #[error("transient node error: {0}")]
    Transient(String),
    #[error("fatal node error: {0}")]
    Fatal(String),
}

impl NodeError {
    pub fn is_transient(&self) -> bool {
        matches!(self, NodeError::Transient(_))
    }
}

/// RPC error code for "No such mempool or blockchain transaction"
pub const RPC_INVALID_ADDRESS_OR_KEY: i32 = -5;
/// RPC error code while the node is still warming up
const RPC_IN_WARMUP: i32 = -28;
/// JSON-RPC "method not found"
const RPC_METHOD_NOT_FOUND: i32 = -32601;

/// Classify a bitcoincore-rpc failure. Auth rejections and unknown
/// methods cannot be fixed by retrying; everything transport-shaped can.
pub fn classify_rpc_error(err: &bitcoincore_rpc::Error) -> NodeError {
    if let bitcoincore_rpc::Error::JsonRpc(jsonrpc_err) = err {
        match jsonrpc_err {
            bitcoincore_rpc::jsonrpc::Error::Rpc(rpc) => {
                return match rpc.code {
                    RPC_METHOD_NOT_FOUND => NodeError::Fatal(format!(
                        "RPC method not found: {}",
                        rpc.message
                    )),
                    RPC_IN_WARMUP => NodeError::Transient(rpc.message.clone()),
                    _ => NodeError::Transient(format!("RPC error {}: {}", rpc.code, rpc.message)),
                };
            }
            bitcoincore_rpc::jsonrpc::Error::Transport(transport) => {
                let msg = transport.to_string();
                return if msg.contains("401") || msg.contains("Unauthorized") {
                    NodeError::Fatal(format!("RPC authentication failed: {}", msg))
                } else {
                    NodeError::Transient(msg)
                };
            }
            other => return NodeError::Transient(other.to_string()),
        }
    }
    NodeError::Transient(err.to_string())
}

/// True when the error is the node's way of saying the transaction is not
/// known to mempool or chain (the reorg signal).
pub fn is_tx_not_found(err: &bitcoincore_rpc::Error) -> bool {
    matches!(
        err,
        bitcoincore_rpc::Error::JsonRpc(bitcoincore_rpc::jsonrpc::Error::Rpc(rpc))
            if rpc.code == RPC_INVALID_ADDRESS_OR_KEY
    )
}
