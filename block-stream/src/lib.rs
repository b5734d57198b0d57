//! Ordered, windowed prefetch of consecutive ledger blocks.
//!
//! [`BlockStream`] walks slots `start, start + 1, ...` and yields one
//! [`SlotBlock`] per slot in strictly ascending order while keeping up to
//! `window` fetches in flight ahead of the read cursor. Blocks come from any
//! [`BlockFetcher`]; [`RpcBlockFetcher`] adapts an
//! [`RpcClient`](trv1_rpc_client::RpcClient).

pub mod config;
pub mod error;
pub mod fetcher;
pub mod stream;

pub use {
    config::{BlockStreamConfig, MissingSlotPolicy, StreamMode},
    error::{FetchError, Result, StreamError},
    fetcher::{BlockFetcher, LocalBlockSource, RpcBlockFetcher, WithLocalSource},
    stream::{BlockStream, SlotBlock},
};
