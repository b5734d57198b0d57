//! Request/response client for the ledger's JSON-RPC interface.
//!
//! Every call goes through an [`RpcSender`](rpc_sender::RpcSender). The
//! production sender, [`HttpSender`](http_sender::HttpSender), rotates across
//! a set of equivalent endpoints and absorbs transient failures according to
//! a linear [`BackoffPolicy`](backoff::BackoffPolicy). [`RpcClient`] is the
//! typed facade on top.

pub mod backoff;
pub mod endpoints;
pub mod http_sender;
pub mod mock_sender;
pub mod rpc_client;
pub mod rpc_sender;

pub use {
    rpc_client::{RpcClient, RpcClientConfig},
    trv1_rpc_client_api as api,
};
