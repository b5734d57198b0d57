//! Typed facade over an [`RpcSender`].
//!
//! Each method builds the `params` array for one remote procedure, sends it
//! through the sender (which owns retries and endpoint rotation) and decodes
//! the `result` member. Payloads the client does not interpret are returned
//! as [`serde_json::Value`] or the thin views in
//! [`trv1_rpc_client_api::response`].

use {
    crate::{
        http_sender::{HttpSender, HttpSenderConfig},
        mock_sender::{MockSender, Mocks},
        rpc_sender::{RpcSender, RpcTransportStats},
    },
    serde::de::DeserializeOwned,
    serde_json::{json, Value},
    solana_clock::{Slot, UnixTimestamp},
    solana_commitment_config::CommitmentConfig,
    solana_pubkey::Pubkey,
    solana_signature::Signature,
    trv1_rpc_client_api::{
        client_error::{ClientError, ErrorKind, Result as ClientResult, RpcError},
        config::{
            RpcBlockConfig, RpcContextConfig, RpcSignaturesForAddressConfig, RpcTransactionConfig,
        },
        request::RpcRequest,
        response::{
            RpcBlock, RpcConfirmedTransaction, RpcConfirmedTransactionStatusWithSignature,
            RpcVersionInfo,
        },
    },
};

#[derive(Debug, Default, Clone, Copy)]
pub struct RpcClientConfig {
    pub commitment_config: CommitmentConfig,
}

impl RpcClientConfig {
    pub fn with_commitment(commitment_config: CommitmentConfig) -> Self {
        Self { commitment_config }
    }
}

/// A client of a remote ledger node.
pub struct RpcClient {
    sender: Box<dyn RpcSender + Send + Sync + 'static>,
    config: RpcClientConfig,
}

impl RpcClient {
    /// Create an `RpcClient` from an [`RpcSender`] and an [`RpcClientConfig`].
    pub fn new_sender<T: RpcSender + Send + Sync + 'static>(
        sender: T,
        config: RpcClientConfig,
    ) -> Self {
        Self {
            sender: Box::new(sender),
            config,
        }
    }

    /// Create an HTTP `RpcClient` for a single endpoint with default settings.
    pub fn new(url: String) -> ClientResult<Self> {
        Self::new_with_commitment(url, CommitmentConfig::default())
    }

    pub fn new_with_commitment(
        url: String,
        commitment_config: CommitmentConfig,
    ) -> ClientResult<Self> {
        Ok(Self::new_sender(
            HttpSender::new(url)?,
            RpcClientConfig::with_commitment(commitment_config),
        ))
    }

    /// Create an HTTP `RpcClient` that rotates requests across `urls`.
    pub fn new_with_endpoints<I, U>(
        urls: I,
        commitment_config: CommitmentConfig,
        sender_config: HttpSenderConfig,
    ) -> ClientResult<Self>
    where
        I: IntoIterator<Item = U>,
        U: ToString,
    {
        Ok(Self::new_sender(
            HttpSender::new_with_config(urls, sender_config)?,
            RpcClientConfig::with_commitment(commitment_config),
        ))
    }

    /// Create a mock `RpcClient` answering from `mocks`.
    pub fn new_mock_with_mocks(url: String, mocks: Mocks) -> Self {
        Self::new_sender(
            MockSender::new_with_mocks(url, mocks),
            RpcClientConfig::with_commitment(CommitmentConfig::default()),
        )
    }

    pub fn url(&self) -> String {
        self.sender.url()
    }

    pub fn commitment(&self) -> CommitmentConfig {
        self.config.commitment_config
    }

    pub fn get_transport_stats(&self) -> RpcTransportStats {
        self.sender.get_transport_stats()
    }

    /// Send an arbitrary request and decode its `result`.
    pub async fn send<T>(&self, request: RpcRequest, params: Value) -> ClientResult<T>
    where
        T: DeserializeOwned,
    {
        let response = self
            .sender
            .send(request, params)
            .await
            .map_err(|err| err.into_with_request(request))?;

        serde_json::from_value(response)
            .map_err(|err| ClientError::new_with_request(err.into(), request))
    }

    fn context_config(&self, commitment_config: CommitmentConfig) -> RpcContextConfig {
        RpcContextConfig {
            commitment: Some(commitment_config),
            min_context_slot: None,
        }
    }

    /// Returns the slot that has reached the configured commitment level.
    pub async fn get_slot(&self) -> ClientResult<Slot> {
        self.get_slot_with_commitment(self.commitment()).await
    }

    pub async fn get_slot_with_commitment(
        &self,
        commitment_config: CommitmentConfig,
    ) -> ClientResult<Slot> {
        self.send(
            RpcRequest::GetSlot,
            json!([self.context_config(commitment_config)]),
        )
        .await
    }

    pub async fn get_block_height(&self) -> ClientResult<u64> {
        self.send(
            RpcRequest::GetBlockHeight,
            json!([self.context_config(self.commitment())]),
        )
        .await
    }

    /// Returns the block at `slot`; a `null` reply is an error.
    pub async fn get_block(&self, slot: Slot) -> ClientResult<RpcBlock> {
        let config = RpcBlockConfig {
            commitment: Some(self.commitment()),
            ..RpcBlockConfig::default()
        };
        self.get_block_with_config(slot, config)
            .await?
            .ok_or_else(|| {
                ClientError::new_with_request(
                    ErrorKind::RpcError(RpcError::ForUser(format!(
                        "block not available for slot {slot}"
                    ))),
                    RpcRequest::GetBlock,
                )
            })
    }

    /// Returns the block at `slot`, or `None` when the node replied `null`.
    pub async fn get_block_with_config(
        &self,
        slot: Slot,
        config: RpcBlockConfig,
    ) -> ClientResult<Option<RpcBlock>> {
        self.send(RpcRequest::GetBlock, json!([slot, config])).await
    }

    /// Returns the confirmed slots in `[start_slot, end_slot]`.
    pub async fn get_blocks(
        &self,
        start_slot: Slot,
        end_slot: Option<Slot>,
    ) -> ClientResult<Vec<Slot>> {
        let commitment = self.context_config(self.commitment());
        let params = match end_slot {
            Some(end_slot) => json!([start_slot, end_slot, commitment]),
            None => json!([start_slot, commitment]),
        };
        self.send(RpcRequest::GetBlocks, params).await
    }

    pub async fn get_block_time(&self, slot: Slot) -> ClientResult<UnixTimestamp> {
        let block_time: Option<UnixTimestamp> =
            self.send(RpcRequest::GetBlockTime, json!([slot])).await?;
        block_time.ok_or_else(|| {
            ClientError::new_with_request(
                ErrorKind::RpcError(RpcError::ForUser(format!(
                    "block time not available for slot {slot}"
                ))),
                RpcRequest::GetBlockTime,
            )
        })
    }

    pub async fn get_first_available_block(&self) -> ClientResult<Slot> {
        self.send(RpcRequest::GetFirstAvailableBlock, Value::Null)
            .await
    }

    pub async fn get_balance(&self, pubkey: &Pubkey) -> ClientResult<u64> {
        let response: trv1_rpc_client_api::response::Response<u64> = self
            .send(
                RpcRequest::GetBalance,
                json!([pubkey.to_string(), self.context_config(self.commitment())]),
            )
            .await?;
        Ok(response.value)
    }

    pub async fn get_transaction(
        &self,
        signature: &Signature,
        config: RpcTransactionConfig,
    ) -> ClientResult<Option<RpcConfirmedTransaction>> {
        self.send(
            RpcRequest::GetTransaction,
            json!([signature.to_string(), config]),
        )
        .await
    }

    pub async fn get_signatures_for_address(
        &self,
        address: &Pubkey,
    ) -> ClientResult<Vec<RpcConfirmedTransactionStatusWithSignature>> {
        self.get_signatures_for_address_with_config(
            address,
            RpcSignaturesForAddressConfig {
                commitment: Some(self.commitment()),
                ..RpcSignaturesForAddressConfig::default()
            },
        )
        .await
    }

    pub async fn get_signatures_for_address_with_config(
        &self,
        address: &Pubkey,
        config: RpcSignaturesForAddressConfig,
    ) -> ClientResult<Vec<RpcConfirmedTransactionStatusWithSignature>> {
        self.send(
            RpcRequest::GetSignaturesForAddress,
            json!([address.to_string(), config]),
        )
        .await
    }

    pub async fn get_health(&self) -> ClientResult<()> {
        let health: String = self.send(RpcRequest::GetHealth, Value::Null).await?;
        if health == "ok" {
            Ok(())
        } else {
            Err(ClientError::new_with_request(
                ErrorKind::Custom(format!("node reports health {health:?}")),
                RpcRequest::GetHealth,
            ))
        }
    }

    pub async fn get_version(&self) -> ClientResult<RpcVersionInfo> {
        self.send(RpcRequest::GetVersion, Value::Null).await
    }
}
