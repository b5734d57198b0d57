use {solana_clock::Slot, thiserror::Error, trv1_rpc_client_api::client_error::ClientError};

/// Failure of a single fetch or tip query.
#[derive(Error, Debug)]
pub enum FetchError {
    /// The slot was skipped or pruned upstream; there is no block to fetch.
    #[error("slot {slot} was skipped")]
    Skipped { slot: Slot },

    #[error(transparent)]
    Client(#[from] ClientError),

    #[error("{0}")]
    Other(String),
}

/// Errors that terminate a [`BlockStream`](crate::BlockStream).
#[derive(Error, Debug)]
pub enum StreamError {
    /// The fetch succeeded but returned no block.
    #[error("block not available for slot {0}")]
    BlockUnavailable(Slot),

    #[error("failed to fetch slot {slot}: {source}")]
    Fetch {
        slot: Slot,
        #[source]
        source: FetchError,
    },

    #[error("failed to query the tip: {0}")]
    Tip(#[source] FetchError),

    #[error("fetch task for slot {slot} failed: {reason}")]
    TaskFailed { slot: Slot, reason: String },

    #[error("invalid stream configuration: {0}")]
    InvalidConfig(String),
}

pub type Result<T> = std::result::Result<T, StreamError>;
