//! In-process websocket peer for unit tests.

use {
    futures_util::{SinkExt, StreamExt},
    serde_json::Value,
    std::{
        sync::{
            atomic::{AtomicBool, AtomicUsize, Ordering},
            Arc, Mutex,
        },
        time::Duration,
    },
    tokio::{net::TcpListener, sync::mpsc},
    tokio_tungstenite::accept_async,
    tungstenite::Message,
};

enum Command {
    Push(Value),
    Close,
}

type Handler = dyn Fn(&Value) -> Vec<Value> + Send + Sync;

/// Answers each inbound JSON message with whatever the handler returns.
/// Tests can also push unsolicited messages or close the latest connection.
pub(crate) struct TestServer {
    pub url: String,
    current: Arc<Mutex<Option<mpsc::UnboundedSender<Command>>>>,
    connections: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<Value>>>,
    ignore_close: Arc<AtomicBool>,
}

impl TestServer {
    pub async fn spawn<H>(handler: H) -> Self
    where
        H: Fn(&Value) -> Vec<Value> + Send + Sync + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let handler: Arc<Handler> = Arc::new(handler);
        let current = Arc::new(Mutex::new(None));
        let connections = Arc::new(AtomicUsize::new(0));
        let received = Arc::new(Mutex::new(Vec::new()));
        let ignore_close = Arc::new(AtomicBool::new(false));

        tokio::spawn({
            let current = current.clone();
            let connections = connections.clone();
            let received = received.clone();
            let ignore_close = ignore_close.clone();
            async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let Ok(socket) = accept_async(stream).await else {
                        continue;
                    };
                    let (commands, command_receiver) = mpsc::unbounded_channel();
                    *current.lock().unwrap() = Some(commands);
                    connections.fetch_add(1, Ordering::SeqCst);
                    tokio::spawn(serve(
                        socket,
                        command_receiver,
                        handler.clone(),
                        received.clone(),
                        ignore_close.clone(),
                    ));
                }
            }
        });

        Self {
            url,
            current,
            connections,
            received,
            ignore_close,
        }
    }

    pub fn push(&self, message: Value) {
        self.command(Command::Push(message));
    }

    pub fn close(&self) {
        self.command(Command::Close);
    }

    /// From now on a Close frame from the client is neither answered nor
    /// followed by dropping the socket.
    pub fn ignore_close(&self) {
        self.ignore_close.store(true, Ordering::SeqCst);
    }

    pub fn received(&self) -> Vec<Value> {
        self.received.lock().unwrap().clone()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.load(Ordering::SeqCst)
    }

    pub async fn wait_for_connections(&self, count: usize) {
        while self.connection_count() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    pub async fn wait_for_received<F>(&self, done: F)
    where
        F: Fn(&[Value]) -> bool,
    {
        loop {
            if done(&self.received.lock().unwrap()) {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    fn command(&self, command: Command) {
        let current = self.current.lock().unwrap();
        current.as_ref().unwrap().send(command).unwrap();
    }
}

async fn serve(
    socket: tokio_tungstenite::WebSocketStream<tokio::net::TcpStream>,
    mut commands: mpsc::UnboundedReceiver<Command>,
    handler: Arc<Handler>,
    received: Arc<Mutex<Vec<Value>>>,
    ignore_close: Arc<AtomicBool>,
) {
    let (mut sink, mut stream) = socket.split();
    loop {
        tokio::select! {
            frame = stream.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    let Ok(message) = serde_json::from_str::<Value>(text.as_str()) else {
                        continue;
                    };
                    received.lock().unwrap().push(message.clone());
                    for reply in handler(&message) {
                        if sink.send(Message::text(reply.to_string())).await.is_err() {
                            return;
                        }
                    }
                }
                Some(Ok(Message::Close(_))) if ignore_close.load(Ordering::SeqCst) => {
                    // Stop reading so no close reply is flushed; the socket stays open.
                    std::future::pending::<()>().await;
                }
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                Some(Ok(_)) => {}
            },
            command = commands.recv() => match command {
                Some(Command::Push(message)) => {
                    if sink.send(Message::text(message.to_string())).await.is_err() {
                        return;
                    }
                }
                Some(Command::Close) | None => {
                    let _ = sink.send(Message::Close(None)).await;
                    return;
                }
            },
        }
    }
}
