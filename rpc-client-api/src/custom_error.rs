//! Remote error codes the clients distinguish.
//!
//! Only three outcomes matter to the transport: retry with backoff, fail
//! immediately with the remote diagnostic attached, or fail immediately as
//! is. The block stream additionally recognizes the "slot was skipped" pair.

/// Standard JSON-RPC "invalid params".
pub const JSON_RPC_INVALID_PARAMS: i64 = -32602;
/// Node is behind or has no healthy upstream.
pub const JSON_RPC_SERVER_ERROR_NODE_UNHEALTHY: i64 = -32005;
/// Block is not (yet) available for the slot.
pub const JSON_RPC_SERVER_ERROR_BLOCK_NOT_AVAILABLE: i64 = -32004;
/// The slot was skipped, or its block pruned from the local ledger.
pub const JSON_RPC_SERVER_ERROR_SLOT_SKIPPED: i64 = -32007;
/// The slot was skipped, or is missing in long-term storage.
pub const JSON_RPC_SERVER_ERROR_LONG_TERM_STORAGE_SLOT_SKIPPED: i64 = -32009;
/// Rate limiting as reported inside the payload by hosted providers.
pub const JSON_RPC_RATE_LIMITED: i64 = 429;
pub const JSON_RPC_SERVER_ERROR_RATE_LIMITED: i64 = -32429;

pub fn is_rate_limited(code: i64) -> bool {
    matches!(
        code,
        JSON_RPC_RATE_LIMITED | JSON_RPC_SERVER_ERROR_RATE_LIMITED
    )
}

pub fn is_node_unhealthy(code: i64) -> bool {
    code == JSON_RPC_SERVER_ERROR_NODE_UNHEALTHY
}

/// Whether the code means the record for a slot legitimately does not exist.
pub fn is_slot_skipped(code: i64) -> bool {
    matches!(
        code,
        JSON_RPC_SERVER_ERROR_SLOT_SKIPPED | JSON_RPC_SERVER_ERROR_LONG_TERM_STORAGE_SLOT_SKIPPED
    )
}
