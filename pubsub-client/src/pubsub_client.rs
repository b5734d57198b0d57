//! A client for subscribing to messages from the ledger's websocket interface.
//!
//! [`PubsubClient`] layers JSON-RPC request/reply correlation and a
//! subscription table over a [`DuplexChannel`]. Every request carries a
//! fresh identifier from the channel's counter and its reply listener is
//! registered before the request is written, so a fast reply is never
//! missed.
//!
//! Subscriptions are routed by `(notification method, subscription id)`.
//! The routing observer is registered before the subscribe request is
//! written and picks the subscription id out of the reply as it is
//! dispatched, so a notification sent right behind the reply is delivered.
//! They live only as long as the socket that created them: when the
//! channel closes the table is cleared and callers must subscribe again
//! after reconnecting.
//!
//! # Examples
//!
//! ```no_run
//! use trv1_pubsub_client::PubsubClient;
//!
//! # async fn run() -> trv1_pubsub_client::Result<()> {
//! let client = PubsubClient::new("ws://127.0.0.1:8900").await?;
//! let (subscription, mut slots) = client.slot_subscribe_channel().await?;
//! while let Some(slot_info) = slots.recv().await {
//!     println!("slot {}", slot_info.slot);
//!     if slot_info.slot > 100 {
//!         break;
//!     }
//! }
//! client.unsubscribe(subscription).await?;
//! client.shutdown().await
//! # }
//! ```

use {
    crate::{
        channel::{ChannelEvent, DuplexChannel, ObserverGuard, ObserverId},
        config::PubsubClientConfig,
        error::{PubsubError, Result},
    },
    log::*,
    serde::de::DeserializeOwned,
    serde_json::{json, Value},
    solana_clock::Slot,
    solana_pubkey::Pubkey,
    solana_signature::Signature,
    std::{
        collections::HashMap,
        sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError},
    },
    tokio::sync::mpsc,
    trv1_rpc_client_api::{
        config::{
            RpcAccountInfoConfig, RpcSignatureSubscribeConfig, RpcTransactionLogsConfig,
            RpcTransactionLogsFilter,
        },
        request::build_envelope,
        response::{Response, RpcLogsResponse, SlotInfo},
    },
};

#[derive(Debug)]
struct Subscription {
    observer: ObserverId,
    unsubscribe_method: String,
}

type Subscriptions = Arc<Mutex<HashMap<u64, Subscription>>>;

fn lock(subscriptions: &Subscriptions) -> MutexGuard<'_, HashMap<u64, Subscription>> {
    subscriptions.lock().unwrap_or_else(PoisonError::into_inner)
}

fn decode<T: DeserializeOwned>(method: &str, result: Value) -> Option<T> {
    serde_json::from_value(result)
        .map_err(|err| warn!("{method}: failed to decode notification: {err}"))
        .ok()
}

#[derive(Debug)]
pub struct PubsubClient {
    channel: DuplexChannel,
    subscriptions: Subscriptions,
    close_observer: ObserverId,
}

impl PubsubClient {
    /// Connects to `url` with the default configuration.
    pub async fn new(url: &str) -> Result<Self> {
        Self::new_with_config(url, PubsubClientConfig::default()).await
    }

    pub async fn new_with_config(url: &str, config: PubsubClientConfig) -> Result<Self> {
        let client = Self::new_disconnected(DuplexChannel::new_with_config(url, config)?);
        client.channel.connect().await?;
        Ok(client)
    }

    /// Wraps `channel` without connecting it.
    pub fn new_disconnected(channel: DuplexChannel) -> Self {
        let subscriptions = Subscriptions::default();
        let close_observer = channel.add_observer({
            let channel = channel.clone();
            let subscriptions = subscriptions.clone();
            move |event| {
                if let ChannelEvent::Close(_) = event {
                    let dropped: Vec<_> = lock(&subscriptions).drain().collect();
                    if !dropped.is_empty() {
                        debug!("channel closed, dropping {} subscriptions", dropped.len());
                    }
                    for (_, subscription) in dropped {
                        channel.remove_observer(subscription.observer);
                    }
                }
            }
        });
        Self {
            channel,
            subscriptions,
            close_observer,
        }
    }

    pub fn channel(&self) -> &DuplexChannel {
        &self.channel
    }

    pub async fn connect(&self) -> Result<()> {
        self.channel.connect().await
    }

    /// Closes the socket. Subscriptions are dropped with it.
    pub async fn shutdown(&self) -> Result<()> {
        self.channel.disconnect(None).await
    }

    /// Sends `method` with `params` and waits for the reply carrying the
    /// same identifier.
    ///
    /// Returns the reply's `result`; an `error` member fails the call with
    /// [`PubsubError::RequestFailed`].
    pub async fn send_request(&self, method: &str, params: Value) -> Result<Value> {
        self.request(self.channel.next_request_id(), method, params).await
    }

    async fn request(&self, id: u64, method: &str, params: Value) -> Result<Value> {
        let reply = self
            .channel
            .wait_for_message(move |message| message.get("id").and_then(Value::as_u64) == Some(id));
        self.channel
            .send(build_envelope(id, method, params).to_string())?;
        let reply = reply.await?;

        if let Some(error) = reply.get("error").filter(|error| !error.is_null()) {
            return Err(PubsubError::RequestFailed {
                code: error.get("code").and_then(Value::as_i64).unwrap_or_default(),
                message: error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or_default()
                    .to_string(),
            });
        }
        Ok(reply.get("result").cloned().unwrap_or(Value::Null))
    }

    /// Sends `method` without waiting for a reply. Returns the identifier used.
    pub fn send_request_no_wait(&self, method: &str, params: Value) -> Result<u64> {
        let id = self.channel.next_request_id();
        self.channel
            .send(build_envelope(id, method, params).to_string())?;
        Ok(id)
    }

    /// Subscribes with `subscribe_method` and routes every
    /// `notification_method` message for the returned subscription id to
    /// `callback` with the notification's `result`.
    pub async fn subscribe<F>(
        &self,
        subscribe_method: &str,
        unsubscribe_method: &str,
        notification_method: &str,
        params: Value,
        callback: F,
    ) -> Result<u64>
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.subscribe_with(
            subscribe_method,
            unsubscribe_method,
            notification_method,
            params,
            move |_, result| callback(result),
        )
        .await
    }

    /// Like [`subscribe`](Self::subscribe), decoding each notification as `T`.
    /// Notifications that fail to decode are logged and skipped.
    pub async fn subscribe_typed<T, F>(
        &self,
        subscribe_method: &str,
        unsubscribe_method: &str,
        notification_method: &str,
        params: Value,
        callback: F,
    ) -> Result<u64>
    where
        T: DeserializeOwned + 'static,
        F: Fn(T) + Send + Sync + 'static,
    {
        let method = notification_method.to_string();
        self.subscribe_with(
            subscribe_method,
            unsubscribe_method,
            notification_method,
            params,
            move |_, result| {
                if let Some(notification) = decode(&method, result) {
                    callback(notification);
                }
            },
        )
        .await
    }

    /// Like [`subscribe_typed`](Self::subscribe_typed), delivering
    /// notifications through a channel instead of a callback.
    ///
    /// Dropping the receiver ends the subscription locally: the next
    /// notification removes it from the table without telling the server.
    pub async fn subscribe_channel<T>(
        &self,
        subscribe_method: &str,
        unsubscribe_method: &str,
        notification_method: &str,
        params: Value,
    ) -> Result<(u64, mpsc::UnboundedReceiver<T>)>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let (sender, receiver) = mpsc::unbounded_channel();
        let method = notification_method.to_string();
        let channel = self.channel.clone();
        let subscriptions = self.subscriptions.clone();
        let id = self
            .subscribe_with(
                subscribe_method,
                unsubscribe_method,
                notification_method,
                params,
                move |id, result| {
                    let Some(notification) = decode::<T>(&method, result) else {
                        return;
                    };
                    if sender.send(notification).is_err() {
                        let entry = lock(&subscriptions).remove(&id);
                        if let Some(entry) = entry {
                            debug!("{method}: receiver for subscription {id} dropped, removing it");
                            channel.remove_observer(entry.observer);
                        }
                    }
                },
            )
            .await?;
        Ok((id, receiver))
    }

    async fn subscribe_with<F>(
        &self,
        subscribe_method: &str,
        unsubscribe_method: &str,
        notification_method: &str,
        params: Value,
        callback: F,
    ) -> Result<u64>
    where
        F: Fn(u64, Value) + Send + Sync + 'static,
    {
        let request_id = self.channel.next_request_id();
        let subscription = Arc::new(OnceLock::new());
        let notification_method = notification_method.to_string();
        let observer = self.channel.add_observer({
            let subscription = subscription.clone();
            move |event| {
                let ChannelEvent::Message(message) = event else {
                    return;
                };
                match subscription.get() {
                    Some(&id) => {
                        if message.get("method").and_then(Value::as_str)
                            == Some(notification_method.as_str())
                            && message["params"]["subscription"].as_u64() == Some(id)
                        {
                            callback(id, message["params"]["result"].clone());
                        }
                    }
                    None => {
                        if message.get("id").and_then(Value::as_u64) == Some(request_id) {
                            if let Some(id) = message.get("result").and_then(Value::as_u64) {
                                let _ = subscription.set(id);
                            }
                        }
                    }
                }
            }
        });
        // Dropped with the observer if the request fails or is abandoned.
        let guard = ObserverGuard::new(self.channel.clone(), observer);

        let result = self.request(request_id, subscribe_method, params).await?;
        let id = result.as_u64().ok_or_else(|| {
            PubsubError::UnexpectedSubscriptionResponse(format!(
                "{subscribe_method} returned {result}"
            ))
        })?;

        let replaced = lock(&self.subscriptions).insert(
            id,
            Subscription {
                observer: guard.release(),
                unsubscribe_method: unsubscribe_method.to_string(),
            },
        );
        if let Some(replaced) = replaced {
            self.channel.remove_observer(replaced.observer);
        }
        debug!("{subscribe_method}: subscription {id}");
        Ok(id)
    }

    /// Stops routing notifications for `subscription` and tells the server.
    pub async fn unsubscribe(&self, subscription: u64) -> Result<()> {
        let entry = lock(&self.subscriptions)
            .remove(&subscription)
            .ok_or(PubsubError::UnknownSubscription(subscription))?;
        self.channel.remove_observer(entry.observer);

        let result = self
            .send_request(&entry.unsubscribe_method, json!([subscription]))
            .await?;
        if result != Value::Bool(true) {
            return Err(PubsubError::UnexpectedSubscriptionResponse(format!(
                "{} returned {result}",
                entry.unsubscribe_method
            )));
        }
        Ok(())
    }

    pub fn subscription_count(&self) -> usize {
        lock(&self.subscriptions).len()
    }

    /// Subscribe to slot events.
    pub async fn slot_subscribe<F>(&self, callback: F) -> Result<u64>
    where
        F: Fn(SlotInfo) + Send + Sync + 'static,
    {
        self.subscribe_typed(
            "slotSubscribe",
            "slotUnsubscribe",
            "slotNotification",
            json!([]),
            callback,
        )
        .await
    }

    pub async fn slot_subscribe_channel(
        &self,
    ) -> Result<(u64, mpsc::UnboundedReceiver<SlotInfo>)> {
        self.subscribe_channel(
            "slotSubscribe",
            "slotUnsubscribe",
            "slotNotification",
            json!([]),
        )
        .await
    }

    /// Subscribe to root events. Each notification is the newly rooted slot.
    pub async fn root_subscribe<F>(&self, callback: F) -> Result<u64>
    where
        F: Fn(Slot) + Send + Sync + 'static,
    {
        self.subscribe_typed(
            "rootSubscribe",
            "rootUnsubscribe",
            "rootNotification",
            json!([]),
            callback,
        )
        .await
    }

    pub async fn root_subscribe_channel(&self) -> Result<(u64, mpsc::UnboundedReceiver<Slot>)> {
        self.subscribe_channel(
            "rootSubscribe",
            "rootUnsubscribe",
            "rootNotification",
            json!([]),
        )
        .await
    }

    /// Subscribe to account changes. The callback receives the
    /// `{context, value}` notification untouched.
    pub async fn account_subscribe<F>(
        &self,
        pubkey: &Pubkey,
        config: Option<RpcAccountInfoConfig>,
        callback: F,
    ) -> Result<u64>
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.subscribe(
            "accountSubscribe",
            "accountUnsubscribe",
            "accountNotification",
            json!([pubkey.to_string(), config]),
            callback,
        )
        .await
    }

    /// Subscribe to status changes of one signature.
    pub async fn signature_subscribe<F>(
        &self,
        signature: &Signature,
        config: Option<RpcSignatureSubscribeConfig>,
        callback: F,
    ) -> Result<u64>
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.subscribe(
            "signatureSubscribe",
            "signatureUnsubscribe",
            "signatureNotification",
            json!([signature.to_string(), config]),
            callback,
        )
        .await
    }

    /// Subscribe to transaction log output.
    pub async fn logs_subscribe<F>(
        &self,
        filter: RpcTransactionLogsFilter,
        config: RpcTransactionLogsConfig,
        callback: F,
    ) -> Result<u64>
    where
        F: Fn(Response<RpcLogsResponse>) + Send + Sync + 'static,
    {
        self.subscribe_typed(
            "logsSubscribe",
            "logsUnsubscribe",
            "logsNotification",
            json!([filter, config]),
            callback,
        )
        .await
    }
}

impl Drop for PubsubClient {
    fn drop(&mut self) {
        self.channel.remove_observer(self.close_observer);
        for (_, subscription) in lock(&self.subscriptions).drain() {
            self.channel.remove_observer(subscription.observer);
        }
    }
}
