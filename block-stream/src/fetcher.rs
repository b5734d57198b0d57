//! Sources of blocks for a [`BlockStream`](crate::BlockStream).

use {
    crate::error::FetchError,
    async_trait::async_trait,
    log::*,
    solana_clock::Slot,
    std::sync::Arc,
    trv1_rpc_client::RpcClient,
    trv1_rpc_client_api::{
        client_error::ClientError, config::RpcBlockConfig, custom_error::is_slot_skipped,
        response::RpcBlock,
    },
};

/// Fetch-by-slot capability consumed by the stream.
#[async_trait]
pub trait BlockFetcher: Send + Sync + 'static {
    type Block: Send + 'static;

    /// Fetches the block at `slot`. `Ok(None)` means the source answered
    /// but had no block.
    async fn fetch_block(&self, slot: Slot) -> Result<Option<Self::Block>, FetchError>;

    /// The current tip, used as an exclusive upper bound.
    async fn get_tip(&self) -> Result<Slot, FetchError>;
}

/// A cheaper source probed before the primary fetcher, e.g. a local cache.
#[async_trait]
pub trait LocalBlockSource<B>: Send + Sync + 'static {
    async fn get_block(&self, slot: Slot) -> Option<B>;
}

/// Probes `local` first and falls through to `primary` on a miss.
pub struct WithLocalSource<F, L> {
    primary: F,
    local: L,
}

impl<F, L> WithLocalSource<F, L> {
    pub fn new(primary: F, local: L) -> Self {
        Self { primary, local }
    }
}

#[async_trait]
impl<F, L> BlockFetcher for WithLocalSource<F, L>
where
    F: BlockFetcher,
    L: LocalBlockSource<F::Block>,
{
    type Block = F::Block;

    async fn fetch_block(&self, slot: Slot) -> Result<Option<Self::Block>, FetchError> {
        if let Some(block) = self.local.get_block(slot).await {
            trace!("slot {slot} served locally");
            return Ok(Some(block));
        }
        self.primary.fetch_block(slot).await
    }

    async fn get_tip(&self) -> Result<Slot, FetchError> {
        self.primary.get_tip().await
    }
}

/// Fetches blocks with `getBlock` and the tip with `getSlot`.
pub struct RpcBlockFetcher {
    client: Arc<RpcClient>,
    block_config: RpcBlockConfig,
}

impl RpcBlockFetcher {
    pub fn new(client: Arc<RpcClient>, block_config: RpcBlockConfig) -> Self {
        Self {
            client,
            block_config,
        }
    }

    /// Full blocks at the client's commitment.
    pub fn new_with_client_commitment(client: Arc<RpcClient>) -> Self {
        let block_config = RpcBlockConfig {
            commitment: Some(client.commitment()),
            ..RpcBlockConfig::default()
        };
        Self::new(client, block_config)
    }

    pub fn client(&self) -> &RpcClient {
        &self.client
    }
}

fn classify(slot: Slot, err: ClientError) -> FetchError {
    if err.kind().rpc_code().is_some_and(is_slot_skipped) {
        FetchError::Skipped { slot }
    } else {
        FetchError::Client(err)
    }
}

#[async_trait]
impl BlockFetcher for RpcBlockFetcher {
    type Block = RpcBlock;

    async fn fetch_block(&self, slot: Slot) -> Result<Option<RpcBlock>, FetchError> {
        self.client
            .get_block_with_config(slot, self.block_config)
            .await
            .map_err(|err| classify(slot, err))
    }

    async fn get_tip(&self) -> Result<Slot, FetchError> {
        Ok(self.client.get_slot().await?)
    }
}
