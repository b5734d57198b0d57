//! A single websocket connection with an explicit lifecycle.
//!
//! [`DuplexChannel`] owns at most one live socket. Connect and disconnect
//! are single-flight: concurrent callers join the operation already in
//! progress. Inbound frames are parsed as JSON and fanned out to the
//! registered observers in arrival order; [`DuplexChannel::wait_for_message`]
//! builds request/reply correlation on top of that.
//!
//! Each live socket is served by three tasks: a reader that dispatches
//! inbound frames, a writer that drains the outbound queue, and the
//! keepalive timer. All three are aborted when the connection is torn down.

use {
    crate::{
        config::PubsubClientConfig,
        error::{PubsubError, Result},
        single_flight::SingleFlight,
    },
    futures_util::{
        stream::{SplitSink, SplitStream},
        SinkExt, StreamExt,
    },
    log::*,
    serde_json::Value,
    std::{
        collections::HashMap,
        fmt,
        future::Future,
        sync::{
            atomic::{AtomicU64, Ordering},
            Arc, Mutex, MutexGuard, PoisonError, Weak,
        },
        time::Duration,
    },
    tokio::{
        net::TcpStream,
        sync::{mpsc, oneshot},
        task::JoinHandle,
        time::{self, Instant},
    },
    tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream},
    tungstenite::Message,
    url::Url,
};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

pub type ObserverId = u64;

type Observer = Arc<dyn Fn(&ChannelEvent) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Disconnected,
    Connecting,
    Connected,
    Disconnecting,
}

/// Lifecycle and traffic notifications delivered to observers.
#[derive(Debug, Clone)]
pub enum ChannelEvent {
    Open,
    /// A parsed inbound frame.
    Message(Arc<Value>),
    /// The socket closed, locally or remotely. Carries the close reason if any.
    Close(Option<String>),
    Error(String),
}

struct Connection {
    generation: u64,
    outbound: mpsc::UnboundedSender<Message>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
    keepalive: JoinHandle<()>,
}

struct Inner {
    url: Url,
    config: PubsubClientConfig,
    state: Mutex<ChannelState>,
    connection: Mutex<Option<Connection>>,
    observers: Mutex<HashMap<ObserverId, Observer>>,
    next_observer_id: AtomicU64,
    next_generation: AtomicU64,
    next_request_id: AtomicU64,
    connecting: SingleFlight<Result<()>>,
    disconnecting: SingleFlight<()>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        let connection = self
            .connection
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(connection) = connection {
            connection.reader.abort();
            connection.writer.abort();
            connection.keepalive.abort();
        }
    }
}

#[derive(Clone)]
pub struct DuplexChannel {
    inner: Arc<Inner>,
}

impl fmt::Debug for DuplexChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DuplexChannel")
            .field("url", &self.inner.url.as_str())
            .field("state", &self.state())
            .finish()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl DuplexChannel {
    /// Creates a disconnected channel for `url`.
    pub fn new(url: &str) -> Result<Self> {
        Self::new_with_config(url, PubsubClientConfig::default())
    }

    pub fn new_with_config(url: &str, config: PubsubClientConfig) -> Result<Self> {
        let url = Url::parse(url)?;
        config.validate()?;
        Ok(Self {
            inner: Arc::new(Inner {
                url,
                config,
                state: Mutex::new(ChannelState::Disconnected),
                connection: Mutex::new(None),
                observers: Mutex::default(),
                next_observer_id: AtomicU64::new(0),
                next_generation: AtomicU64::new(0),
                next_request_id: AtomicU64::new(0),
                connecting: SingleFlight::new(),
                disconnecting: SingleFlight::new(),
            }),
        })
    }

    pub fn url(&self) -> &Url {
        &self.inner.url
    }

    pub fn config(&self) -> &PubsubClientConfig {
        &self.inner.config
    }

    pub fn state(&self) -> ChannelState {
        *lock(&self.inner.state)
    }

    pub fn is_connected(&self) -> bool {
        self.state() == ChannelState::Connected
    }

    /// Next message identifier. Strictly increasing for the life of the channel.
    pub fn next_request_id(&self) -> u64 {
        self.inner.next_request_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Opens the socket.
    ///
    /// Joins a connect already in progress. Waits for an in-progress
    /// disconnect to finish first, and replaces an existing live socket
    /// with a new one.
    pub async fn connect(&self) -> Result<()> {
        let channel = self.clone();
        self.inner
            .connecting
            .run(move || async move { channel.establish().await })
            .await
    }

    /// Closes the socket.
    ///
    /// Joins a disconnect already in progress and is a no-op when already
    /// disconnected. With `reason`, the socket is still closed but the
    /// call fails with that reason so the caller can propagate it.
    pub async fn disconnect(&self, reason: Option<PubsubError>) -> Result<()> {
        let channel = self.clone();
        self.inner
            .disconnecting
            .run(move || async move { channel.teardown().await })
            .await;
        match reason {
            Some(reason) => Err(reason),
            None => Ok(()),
        }
    }

    /// Queues a text frame for transmission.
    pub fn send(&self, payload: String) -> Result<()> {
        if !self.is_connected() {
            return Err(PubsubError::NotConnected);
        }
        match lock(&self.inner.connection).as_ref() {
            Some(connection) => connection
                .outbound
                .send(Message::text(payload))
                .map_err(|_| PubsubError::NotConnected),
            None => Err(PubsubError::NotConnected),
        }
    }

    /// Registers `observer` for every [`ChannelEvent`] until removed.
    pub fn add_observer<F>(&self, observer: F) -> ObserverId
    where
        F: Fn(&ChannelEvent) + Send + Sync + 'static,
    {
        let id = self.inner.next_observer_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.inner.observers).insert(id, Arc::new(observer));
        id
    }

    pub fn remove_observer(&self, id: ObserverId) -> bool {
        lock(&self.inner.observers).remove(&id).is_some()
    }

    pub fn observer_count(&self) -> usize {
        lock(&self.inner.observers).len()
    }

    /// Resolves with the first inbound message accepted by `predicate`.
    ///
    /// The listener is registered before this returns, so a reply to a
    /// request sent after calling this cannot be missed. Fails with
    /// [`PubsubError::AckTimeout`] if nothing matches within the configured
    /// deadline and with [`PubsubError::ConnectionClosed`] if the channel
    /// closes first. The listener is removed in every case, including when
    /// the returned future is dropped.
    pub fn wait_for_message<P>(
        &self,
        predicate: P,
    ) -> impl Future<Output = Result<Arc<Value>>> + Send + 'static + use<P>
    where
        P: Fn(&Value) -> bool + Send + Sync + 'static,
    {
        let (sender, receiver) = oneshot::channel();
        let sender = Mutex::new(Some(sender));
        let registration = (self.state() != ChannelState::Disconnected).then(|| {
            let id = self.add_observer(move |event| {
                let outcome = match event {
                    ChannelEvent::Message(message) if predicate(message) => Ok(message.clone()),
                    ChannelEvent::Close(reason) => Err(PubsubError::ConnectionClosed(
                        reason.clone().unwrap_or_else(|| "closed".to_string()),
                    )),
                    _ => return,
                };
                if let Some(sender) = lock(&sender).take() {
                    let _ = sender.send(outcome);
                }
            });
            ObserverGuard::new(self.clone(), id)
        });
        let ack_timeout = self.inner.config.ack_timeout;

        async move {
            let Some(_registration) = registration else {
                return Err(PubsubError::ConnectionClosed("not connected".to_string()));
            };
            match time::timeout(ack_timeout, receiver).await {
                Ok(Ok(outcome)) => outcome,
                Ok(Err(_)) => Err(PubsubError::ConnectionClosed("listener dropped".to_string())),
                Err(_) => Err(PubsubError::AckTimeout(ack_timeout)),
            }
        }
    }

    fn set_state(&self, state: ChannelState) {
        let mut current = lock(&self.inner.state);
        if *current != state {
            debug!("{}: {:?} -> {:?}", self.inner.url, *current, state);
            *current = state;
        }
    }

    fn emit(&self, event: &ChannelEvent) {
        let observers: Vec<Observer> = lock(&self.inner.observers).values().cloned().collect();
        for observer in observers {
            observer(event);
        }
    }

    async fn establish(&self) -> Result<()> {
        self.inner.disconnecting.join().await;
        if self.is_connected() {
            self.inner
                .disconnecting
                .run({
                    let channel = self.clone();
                    move || async move { channel.teardown().await }
                })
                .await;
        }

        self.set_state(ChannelState::Connecting);
        let socket = match connect_async(self.inner.url.as_str()).await {
            Ok((socket, _response)) => socket,
            Err(err) => {
                warn!("{}: connect failed: {err}", self.inner.url);
                self.set_state(ChannelState::Disconnected);
                self.emit(&ChannelEvent::Error(err.to_string()));
                return Err(PubsubError::ConnectFailed(err.to_string()));
            }
        };

        let generation = self.inner.next_generation.fetch_add(1, Ordering::Relaxed);
        let (sink, stream) = socket.split();
        let (outbound, outbound_receiver) = mpsc::unbounded_channel();
        let (ready, ready_receiver) = oneshot::channel();
        let connection = Connection {
            generation,
            outbound: outbound.clone(),
            reader: tokio::spawn(read_loop(
                Arc::downgrade(&self.inner),
                generation,
                stream,
                ready_receiver,
            )),
            writer: tokio::spawn(write_loop(sink, outbound_receiver)),
            keepalive: tokio::spawn(keepalive_loop(
                outbound,
                self.inner.config.keepalive_interval,
                self.inner.config.keepalive_payload.clone(),
            )),
        };
        *lock(&self.inner.connection) = Some(connection);
        self.set_state(ChannelState::Connected);
        info!("{}: connected", self.inner.url);
        self.emit(&ChannelEvent::Open);
        // Inbound dispatch starts only after observers have seen `Open`.
        let _ = ready.send(());
        Ok(())
    }

    async fn teardown(&self) {
        if self.state() == ChannelState::Connecting {
            let _ = self.inner.connecting.join().await;
        }
        let Some(connection) = lock(&self.inner.connection).take() else {
            self.set_state(ChannelState::Disconnected);
            return;
        };
        self.set_state(ChannelState::Disconnecting);

        let Connection {
            outbound,
            mut reader,
            writer,
            keepalive,
            ..
        } = connection;
        keepalive.abort();
        let _ = outbound.send(Message::Close(None));
        if time::timeout(self.inner.config.close_timeout, &mut reader)
            .await
            .is_err()
        {
            warn!(
                "{}: no close acknowledgement within {:?}, terminating",
                self.inner.url, self.inner.config.close_timeout
            );
            reader.abort();
        }
        writer.abort();

        self.set_state(ChannelState::Disconnected);
        info!("{}: disconnected", self.inner.url);
        self.emit(&ChannelEvent::Close(None));
    }

    fn on_remote_close(&self, generation: u64, reason: Option<String>) {
        let connection = {
            let mut connection = lock(&self.inner.connection);
            match connection.as_ref() {
                Some(current) if current.generation == generation => connection.take(),
                _ => None,
            }
        };
        // Already taken by a local teardown or replaced by a newer socket.
        let Some(connection) = connection else {
            return;
        };
        connection.keepalive.abort();
        connection.writer.abort();
        self.set_state(ChannelState::Disconnected);
        info!(
            "{}: closed by remote ({})",
            self.inner.url,
            reason.as_deref().unwrap_or("no reason")
        );
        self.emit(&ChannelEvent::Close(reason));
    }
}

/// Removes an observer when dropped unless released first.
pub(crate) struct ObserverGuard {
    channel: DuplexChannel,
    id: ObserverId,
    armed: bool,
}

impl ObserverGuard {
    pub(crate) fn new(channel: DuplexChannel, id: ObserverId) -> Self {
        Self {
            channel,
            id,
            armed: true,
        }
    }

    /// Keeps the observer registered and hands back its id.
    pub(crate) fn release(mut self) -> ObserverId {
        self.armed = false;
        self.id
    }
}

impl Drop for ObserverGuard {
    fn drop(&mut self) {
        if self.armed {
            self.channel.remove_observer(self.id);
        }
    }
}

async fn read_loop(
    inner: Weak<Inner>,
    generation: u64,
    mut stream: SplitStream<WsStream>,
    ready: oneshot::Receiver<()>,
) {
    if ready.await.is_err() {
        return;
    }
    let reason = loop {
        let text = match stream.next().await {
            Some(Ok(Message::Text(text))) => text.as_str().to_string(),
            Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes.to_vec()) {
                Ok(text) => text,
                Err(err) => {
                    warn!("dropping non-utf8 binary frame: {err}");
                    continue;
                }
            },
            Some(Ok(Message::Close(frame))) => {
                break frame.map(|frame| frame.reason.as_str().to_string());
            }
            Some(Ok(_)) => continue,
            Some(Err(err)) => {
                if let Some(inner) = inner.upgrade() {
                    DuplexChannel { inner }.emit(&ChannelEvent::Error(err.to_string()));
                }
                break Some(err.to_string());
            }
            None => break None,
        };
        let Some(inner) = inner.upgrade() else {
            return;
        };
        match serde_json::from_str::<Value>(&text) {
            Ok(message) => DuplexChannel { inner }.emit(&ChannelEvent::Message(Arc::new(message))),
            Err(err) => warn!("dropping unparseable message: {err}"),
        }
    };
    if let Some(inner) = inner.upgrade() {
        DuplexChannel { inner }.on_remote_close(generation, reason);
    }
}

async fn write_loop(
    mut sink: SplitSink<WsStream, Message>,
    mut outbound: mpsc::UnboundedReceiver<Message>,
) {
    while let Some(message) = outbound.recv().await {
        let closing = message.is_close();
        if let Err(err) = sink.send(message).await {
            warn!("websocket write failed: {err}");
            break;
        }
        if closing {
            break;
        }
    }
    let _ = sink.close().await;
}

async fn keepalive_loop(
    outbound: mpsc::UnboundedSender<Message>,
    period: Duration,
    payload: Option<Message>,
) {
    let start = Instant::now().checked_add(period).unwrap_or_else(Instant::now);
    let mut interval = time::interval_at(start, period);
    loop {
        interval.tick().await;
        match &payload {
            Some(payload) => {
                if outbound.send(payload.clone()).is_err() {
                    break;
                }
            }
            None => trace!("keepalive tick"),
        }
    }
}
