//! Publish/subscribe client for the ledger's websocket interface.
//!
//! ## Crate modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`]        | `PubsubClientConfig` timers and keepalive payload |
//! | [`error`]         | Crate-wide error enum |
//! | [`single_flight`] | Join-the-in-flight-operation helper used by connect/disconnect |
//! | [`channel`]       | `DuplexChannel`: one websocket, its state machine and observers |
//! | [`pubsub_client`] | Request/reply correlation, subscription table, subscribe helpers |

pub mod channel;
pub mod config;
pub mod error;
pub mod pubsub_client;
pub mod single_flight;

#[cfg(test)]
mod test_server;

pub use {
    channel::{ChannelEvent, ChannelState, DuplexChannel, ObserverId},
    config::PubsubClientConfig,
    error::{PubsubError, Result},
    pubsub_client::PubsubClient,
};
