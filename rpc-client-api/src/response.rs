//! Typed views of replies.
//!
//! Payloads the clients do not interpret (transactions, rewards, account
//! data) stay as [`serde_json::Value`].

use {
    serde::{Deserialize, Serialize},
    serde_json::Value,
    solana_clock::{Slot, UnixTimestamp},
};

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RpcResponseContext {
    pub slot: Slot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_version: Option<String>,
}

/// `{context, value}` wrapper used by context-carrying methods.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct Response<T> {
    pub context: RpcResponseContext,
    pub value: T,
}

/// One block as returned by `getBlock`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RpcBlock {
    pub previous_blockhash: String,
    pub blockhash: String,
    pub parent_slot: Slot,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transactions: Option<Vec<Value>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signatures: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rewards: Option<Value>,
    #[serde(default)]
    pub block_time: Option<UnixTimestamp>,
    #[serde(default)]
    pub block_height: Option<u64>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RpcConfirmedTransactionStatusWithSignature {
    pub signature: String,
    pub slot: Slot,
    pub err: Option<Value>,
    pub memo: Option<String>,
    pub block_time: Option<UnixTimestamp>,
    #[serde(default)]
    pub confirmation_status: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RpcConfirmedTransaction {
    pub slot: Slot,
    pub transaction: Value,
    #[serde(default)]
    pub meta: Option<Value>,
    #[serde(default)]
    pub block_time: Option<UnixTimestamp>,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub struct RpcVersionInfo {
    pub solana_core: String,
    pub feature_set: Option<u32>,
}

/// Payload of a `slotNotification`.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct SlotInfo {
    pub slot: Slot,
    pub parent: Slot,
    pub root: Slot,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct RpcLogsResponse {
    pub signature: String,
    pub err: Option<Value>,
    pub logs: Vec<String>,
}

#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn test_block_deserializes_minimal_shape() {
        let block: RpcBlock = serde_json::from_value(json!({
            "previousBlockhash": "11111111111111111111111111111111",
            "blockhash": "GHtXQBsoZHVnNFa9YevAzFr17DJjgHXk3ycTKD5xD3Zi",
            "parentSlot": 99,
            "blockTime": null,
        }))
        .unwrap();
        assert_eq!(block.parent_slot, 99);
        assert_eq!(block.transactions, None);
        assert_eq!(block.block_height, None);
    }

    #[test]
    fn test_context_response() {
        let response: Response<u64> =
            serde_json::from_value(json!({"context": {"slot": 12}, "value": 500})).unwrap();
        assert_eq!(response.context.slot, 12);
        assert_eq!(response.value, 500);
    }
}
