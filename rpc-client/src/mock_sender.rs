//! A nonblocking [`RpcSender`] used for unit testing [`RpcClient`](crate::rpc_client::RpcClient).

use {
    crate::rpc_sender::{RpcSender, RpcTransportStats},
    async_trait::async_trait,
    serde_json::{json, Value},
    std::{
        collections::HashMap,
        sync::{Mutex, RwLock},
    },
    trv1_rpc_client_api::{
        client_error::{ClientError, ErrorKind, Result, RpcError},
        request::RpcRequest,
    },
};

pub type Mocks = HashMap<RpcRequest, Value>;

type Handler = Box<dyn Fn(RpcRequest, &Value) -> Result<Value> + Send + Sync>;

/// Answers requests from a handler instead of the network.
///
/// With [`MockSender::new`], requests are answered from a method table of
/// canned results; unmocked methods fail with an `RpcRequestError`. The
/// special URL `"fails"` makes every request fail the same way.
pub struct MockSender {
    url: String,
    handler: Handler,
    requests: Mutex<Vec<(RpcRequest, Value)>>,
    stats: RwLock<RpcTransportStats>,
}

impl MockSender {
    pub fn new<U: ToString>(url: U) -> Self {
        Self::new_with_mocks(url, Mocks::default())
    }

    pub fn new_with_mocks<U: ToString>(url: U, mocks: Mocks) -> Self {
        let url = url.to_string();
        let fails = url == "fails";
        Self::new_with_handler(url, move |request, _params| {
            if fails {
                return Err(RpcError::RpcRequestError("mock failure".to_string()).into());
            }
            mocks.get(&request).cloned().ok_or_else(|| {
                ClientError::from(ErrorKind::RpcError(RpcError::RpcRequestError(format!(
                    "no mock for {request}"
                ))))
            })
        })
    }

    /// Answers each request by calling `handler(request, params)`.
    pub fn new_with_handler<U, F>(url: U, handler: F) -> Self
    where
        U: ToString,
        F: Fn(RpcRequest, &Value) -> Result<Value> + Send + Sync + 'static,
    {
        Self {
            url: url.to_string(),
            handler: Box::new(handler),
            requests: Mutex::default(),
            stats: RwLock::default(),
        }
    }

    /// Every request received so far, in order.
    pub fn requests(&self) -> Vec<(RpcRequest, Value)> {
        self.requests
            .lock()
            .map(|requests| requests.clone())
            .unwrap_or_default()
    }
}

#[async_trait]
impl RpcSender for MockSender {
    fn get_transport_stats(&self) -> RpcTransportStats {
        self.stats.read().map(|stats| *stats).unwrap_or_default()
    }

    async fn send(&self, request: RpcRequest, params: Value) -> Result<Value> {
        if let Ok(mut stats) = self.stats.write() {
            stats.request_count = stats.request_count.saturating_add(1);
        }
        let result = (self.handler)(request, &params);
        if let Ok(mut requests) = self.requests.lock() {
            requests.push((request, params));
        }
        result
    }

    fn url(&self) -> String {
        self.url.clone()
    }
}

/// `{context, value}` wrapper for mocked context-carrying results.
pub fn with_context(slot: u64, value: Value) -> Value {
    json!({"context": {"slot": slot}, "value": value})
}
