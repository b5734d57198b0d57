//! Types shared by the TRv1 ledger clients.
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`request`]      | `RpcRequest` method table and the JSON-RPC envelope |
//! | [`custom_error`] | Remote error codes the clients act on |
//! | [`client_error`] | `ClientError` / `ErrorKind` taxonomy |
//! | [`response`]     | Typed views of the replies the facade decodes |
//! | [`config`]       | Request configuration objects sent as `params` |

pub mod client_error;
pub mod config;
pub mod custom_error;
pub mod request;
pub mod response;
