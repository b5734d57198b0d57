use {
    serde_json::{json, Value},
    std::fmt,
};

/// Protocol version carried in every outbound envelope.
pub const JSON_RPC_VERSION: &str = "2.0";

#[derive(Debug, PartialEq, Eq, Hash, Clone, Copy)]
pub enum RpcRequest {
    Custom { method: &'static str },
    GetBalance,
    GetBlock,
    GetBlockHeight,
    GetBlockTime,
    GetBlocks,
    GetFirstAvailableBlock,
    GetHealth,
    GetSignaturesForAddress,
    GetSlot,
    GetTransaction,
    GetVersion,
}

impl fmt::Display for RpcRequest {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let method = match self {
            RpcRequest::Custom { method } => method,
            RpcRequest::GetBalance => "getBalance",
            RpcRequest::GetBlock => "getBlock",
            RpcRequest::GetBlockHeight => "getBlockHeight",
            RpcRequest::GetBlockTime => "getBlockTime",
            RpcRequest::GetBlocks => "getBlocks",
            RpcRequest::GetFirstAvailableBlock => "getFirstAvailableBlock",
            RpcRequest::GetHealth => "getHealth",
            RpcRequest::GetSignaturesForAddress => "getSignaturesForAddress",
            RpcRequest::GetSlot => "getSlot",
            RpcRequest::GetTransaction => "getTransaction",
            RpcRequest::GetVersion => "getVersion",
        };

        write!(f, "{method}")
    }
}

impl RpcRequest {
    /// Wraps `params` in the `{jsonrpc, id, method, params}` envelope.
    pub fn build_request_json(self, id: u64, params: Value) -> Value {
        build_envelope(id, &self.to_string(), params)
    }
}

/// Envelope builder shared with the duplex channel, whose methods are not
/// part of [`RpcRequest`].
pub fn build_envelope(id: u64, method: &str, params: Value) -> Value {
    json!({
       "jsonrpc": JSON_RPC_VERSION,
       "id": id,
       "method": method,
       "params": params,
    })
}
