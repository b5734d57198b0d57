//! Nonblocking [`RpcSender`] over HTTP.
//!
//! One logical request is up to `max_attempts` HTTP POSTs. Each attempt takes
//! the next endpoint from the [`EndpointRotator`], so a retry normally lands
//! on a different node. Failures are sorted by [`backoff::classify`]:
//! transport failures, throttling and unhealthy-node replies are retried with
//! linear backoff; payment rejections and every other remote error code end
//! the request at once.

use {
    crate::{
        backoff::{self, BackoffPolicy, RetryDecision},
        endpoints::EndpointRotator,
        rpc_sender::{RpcSender, RpcTransportStats},
    },
    async_trait::async_trait,
    log::{debug, warn},
    reqwest::{
        header::{self, CONTENT_TYPE, RETRY_AFTER},
        StatusCode,
    },
    serde_json::Value,
    std::{
        sync::{
            atomic::{AtomicU64, Ordering},
            RwLock,
        },
        time::{Duration, Instant},
    },
    tokio::time::sleep,
    trv1_rpc_client_api::{
        client_error::{ClientError, ErrorKind, Result, RpcError, RpcErrorObject},
        custom_error::JSON_RPC_INVALID_PARAMS,
        request::RpcRequest,
    },
};

/// Tunables for [`HttpSender`].
#[derive(Debug, Clone)]
pub struct HttpSenderConfig {
    /// Budget for a single HTTP attempt.
    pub timeout: Duration,
    /// Total attempts per logical request, including the first.
    pub max_attempts: usize,
    /// Base delay of the linear backoff.
    pub retry_delay: Duration,
    /// Wait at least as long as a 429 reply's `Retry-After` asks.
    pub honor_retry_after: bool,
}

impl Default for HttpSenderConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            max_attempts: 5,
            retry_delay: Duration::from_millis(500),
            honor_retry_after: true,
        }
    }
}

impl HttpSenderConfig {
    /// Short timeouts and delays for tests against local servers.
    #[cfg(any(test, feature = "dev-context-only-utils"))]
    pub fn dev_default() -> Self {
        Self {
            timeout: Duration::from_secs(5),
            max_attempts: 3,
            retry_delay: Duration::from_millis(10),
            honor_retry_after: false,
        }
    }

    fn backoff(&self) -> BackoffPolicy {
        BackoffPolicy::linear(self.retry_delay, self.max_attempts)
    }
}

pub struct HttpSender {
    client: reqwest::Client,
    endpoints: EndpointRotator,
    backoff: BackoffPolicy,
    honor_retry_after: bool,
    request_id: AtomicU64,
    stats: RwLock<RpcTransportStats>,
}

/// A failed attempt, before classification.
struct AttemptFailure {
    kind: ErrorKind,
    retry_after: Option<Duration>,
}

impl From<ErrorKind> for AttemptFailure {
    fn from(kind: ErrorKind) -> Self {
        Self {
            kind,
            retry_after: None,
        }
    }
}

impl From<reqwest::Error> for AttemptFailure {
    fn from(err: reqwest::Error) -> Self {
        ErrorKind::from(err).into()
    }
}

impl HttpSender {
    /// Create an HTTP RPC sender for a single endpoint with default settings.
    pub fn new<U: ToString>(url: U) -> Result<Self> {
        Self::new_with_config([url], HttpSenderConfig::default())
    }

    /// Create an HTTP RPC sender rotating across `urls`.
    pub fn new_with_config<I, U>(urls: I, config: HttpSenderConfig) -> Result<Self>
    where
        I: IntoIterator<Item = U>,
        U: ToString,
    {
        let endpoints = EndpointRotator::new(urls)?;
        let client = reqwest::Client::builder()
            .default_headers(Self::default_headers())
            .timeout(config.timeout)
            .pool_idle_timeout(config.timeout)
            .build()?;

        Ok(Self {
            client,
            endpoints,
            backoff: config.backoff(),
            honor_retry_after: config.honor_retry_after,
            request_id: AtomicU64::new(0),
            stats: RwLock::new(RpcTransportStats::default()),
        })
    }

    pub fn default_headers() -> header::HeaderMap {
        let mut default_headers = header::HeaderMap::new();
        default_headers.append(
            header::HeaderName::from_static("trv1-client"),
            header::HeaderValue::from_static(concat!("rust/", env!("CARGO_PKG_VERSION"))),
        );
        default_headers
    }

    pub fn endpoints(&self) -> &EndpointRotator {
        &self.endpoints
    }

    pub fn backoff(&self) -> BackoffPolicy {
        self.backoff
    }

    async fn attempt(
        &self,
        endpoint: &str,
        request_json: &str,
    ) -> std::result::Result<Value, AttemptFailure> {
        let response = self
            .client
            .post(endpoint)
            .header(CONTENT_TYPE, "application/json")
            .body(request_json.to_owned())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let retry_after = retry_after(response.headers());
            let body = response.text().await.unwrap_or_default();
            let kind = if status == StatusCode::PAYMENT_REQUIRED {
                ErrorKind::PaymentRequired(body)
            } else {
                ErrorKind::HttpStatus {
                    status: status.as_u16(),
                    body,
                }
            };
            return Err(AttemptFailure { kind, retry_after });
        }

        let mut json = response.json::<Value>().await?;
        if let Some(error) = json.get_mut("error").filter(|error| error.is_object()) {
            let error = error.take();
            let kind = match serde_json::from_value::<RpcErrorObject>(error.clone()) {
                Ok(object) => ErrorKind::RpcError(decorate(object)),
                Err(err) => ErrorKind::RpcError(RpcError::RpcRequestError(format!(
                    "Failed to deserialize RPC error response: {error} [{err}]"
                ))),
            };
            return Err(kind.into());
        }
        Ok(json.get_mut("result").map(Value::take).unwrap_or(Value::Null))
    }
}

/// Appends attached diagnostics to "invalid params" messages.
fn decorate(object: RpcErrorObject) -> RpcError {
    let RpcErrorObject {
        code,
        message,
        data,
    } = object;
    let message = match (&data, code) {
        (Some(data), JSON_RPC_INVALID_PARAMS) if !data.is_null() => format!("{message}: {data}"),
        _ => message,
    };
    RpcError::RpcResponseError {
        code,
        message,
        data,
    }
}

fn retry_after(headers: &header::HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

struct StatsUpdater<'a> {
    stats: &'a RwLock<RpcTransportStats>,
    request_start_time: Instant,
    rate_limited_time: Duration,
}

impl<'a> StatsUpdater<'a> {
    fn new(stats: &'a RwLock<RpcTransportStats>) -> Self {
        Self {
            stats,
            request_start_time: Instant::now(),
            rate_limited_time: Duration::default(),
        }
    }

    fn add_rate_limited_time(&mut self, duration: Duration) {
        self.rate_limited_time = self.rate_limited_time.saturating_add(duration);
    }
}

impl Drop for StatsUpdater<'_> {
    fn drop(&mut self) {
        if let Ok(mut stats) = self.stats.write() {
            stats.request_count = stats.request_count.saturating_add(1);
            stats.elapsed_time = stats
                .elapsed_time
                .saturating_add(self.request_start_time.elapsed());
            stats.rate_limited_time = stats
                .rate_limited_time
                .saturating_add(self.rate_limited_time);
        }
    }
}

#[async_trait]
impl RpcSender for HttpSender {
    fn get_transport_stats(&self) -> RpcTransportStats {
        self.stats.read().map(|stats| *stats).unwrap_or_default()
    }

    async fn send(&self, request: RpcRequest, params: Value) -> Result<Value> {
        let request_id = self.request_id.fetch_add(1, Ordering::Relaxed);
        let request_json = request.build_request_json(request_id, params).to_string();

        let max_attempts = self.backoff.max_attempts;
        let mut last_error = None;
        for attempt in 1..=max_attempts {
            let mut stats_updater = StatsUpdater::new(&self.stats);
            let endpoint = self.endpoints.next();

            let AttemptFailure { kind, retry_after } =
                match self.attempt(endpoint, &request_json).await {
                    Ok(result) => return Ok(result),
                    Err(failure) => failure,
                };

            let decision = backoff::classify(&kind);
            if decision == RetryDecision::Fatal {
                warn!("{request} to {endpoint} rejected (attempt {attempt}): {kind}");
                return Err(ClientError::new_with_request(kind, request));
            }

            if self.backoff.should_retry(attempt, decision) {
                let mut delay = self.backoff.next_delay(attempt);
                if self.honor_retry_after {
                    if let Some(retry_after) = retry_after {
                        delay = delay.max(retry_after);
                    }
                }
                debug!(
                    "{request} to {endpoint} failed (attempt {attempt}/{max_attempts}): {kind}; \
                     retrying in {delay:?}"
                );
                if backoff::is_rate_limited(&kind) {
                    stats_updater.add_rate_limited_time(delay);
                }
                sleep(delay).await;
            } else {
                debug!("{request} to {endpoint} failed (attempt {attempt}/{max_attempts}): {kind}");
            }
            last_error = Some(kind);
        }

        Err(ClientError::new_with_request(
            ErrorKind::TransportExhausted {
                attempts: max_attempts,
                last: Box::new(last_error.unwrap_or(ErrorKind::Unknown)),
            },
            request,
        ))
    }

    fn url(&self) -> String {
        self.endpoints.endpoints().join(",")
    }
}

#[cfg(test)]
mod tests {
    use {
        super::*,
        assert_matches::assert_matches,
        serde_json::json,
        std::{
            collections::VecDeque,
            net::SocketAddr,
            sync::{Arc, Mutex},
        },
        tokio::{
            io::{AsyncReadExt, AsyncWriteExt},
            net::{TcpListener, TcpStream},
        },
    };

    /// A canned HTTP reply.
    #[derive(Clone)]
    struct Reply {
        status: u16,
        headers: Vec<(&'static str, String)>,
        body: String,
    }

    impl Reply {
        fn ok(result: Value) -> Self {
            Self::json(200, json!({"jsonrpc": "2.0", "id": 0, "result": result}))
        }

        fn rpc_error(code: i64, message: &str, data: Option<Value>) -> Self {
            let mut error = json!({"code": code, "message": message});
            if let Some(data) = data {
                error["data"] = data;
            }
            Self::json(200, json!({"jsonrpc": "2.0", "id": 0, "error": error}))
        }

        fn status(status: u16) -> Self {
            Self {
                status,
                headers: vec![],
                body: String::new(),
            }
        }

        fn json(status: u16, body: Value) -> Self {
            Self {
                status,
                headers: vec![],
                body: body.to_string(),
            }
        }

        fn with_header(mut self, name: &'static str, value: &str) -> Self {
            self.headers.push((name, value.to_string()));
            self
        }
    }

    /// Minimal HTTP/1.1 responder. Replies are served in order; the last one
    /// repeats. Every served request is appended to `log` as `(server, body)`.
    struct ScriptedServer {
        url: String,
    }

    type RequestLog = Arc<Mutex<Vec<(usize, Value)>>>;

    impl ScriptedServer {
        async fn spawn(index: usize, replies: Vec<Reply>, log: RequestLog) -> Self {
            let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
            let addr = listener.local_addr().unwrap();
            let replies = Arc::new(Mutex::new(VecDeque::from(replies)));
            tokio::spawn(async move {
                while let Ok((stream, _)) = listener.accept().await {
                    let reply = {
                        let mut replies = replies.lock().unwrap();
                        if replies.len() > 1 {
                            replies.pop_front().unwrap()
                        } else {
                            replies.front().cloned().unwrap()
                        }
                    };
                    tokio::spawn(serve_one(stream, index, reply, log.clone()));
                }
            });
            Self {
                url: format!("http://{addr}"),
            }
        }
    }

    async fn serve_one(mut stream: TcpStream, index: usize, reply: Reply, log: RequestLog) {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 4096];
        let header_end = loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                return;
            }
            buf.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
        };
        let head = String::from_utf8_lossy(&buf[..header_end]).to_lowercase();
        let content_length = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .map(|len| len.trim().parse::<usize>().unwrap())
            .unwrap_or(0);
        while buf.len() < header_end + content_length {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
        }
        let body: Value = serde_json::from_slice(&buf[header_end..]).unwrap_or(Value::Null);
        log.lock().unwrap().push((index, body));

        let mut response = format!(
            "HTTP/1.1 {} X\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n",
            reply.status,
            reply.body.len()
        );
        for (name, value) in &reply.headers {
            response.push_str(&format!("{name}: {value}\r\n"));
        }
        response.push_str("\r\n");
        response.push_str(&reply.body);
        let _ = stream.write_all(response.as_bytes()).await;
        let _ = stream.shutdown().await;
    }

    /// An address nothing listens on.
    async fn dead_endpoint() -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr: SocketAddr = listener.local_addr().unwrap();
        drop(listener);
        format!("http://{addr}")
    }

    fn config(max_attempts: usize, retry_delay: Duration) -> HttpSenderConfig {
        HttpSenderConfig {
            max_attempts,
            retry_delay,
            ..HttpSenderConfig::dev_default()
        }
    }

    #[tokio::test]
    async fn test_endpoints_rotate_per_request() {
        trv1_logger::setup();
        let log = RequestLog::default();
        let a = ScriptedServer::spawn(0, vec![Reply::ok(json!(1))], log.clone()).await;
        let b = ScriptedServer::spawn(1, vec![Reply::ok(json!(1))], log.clone()).await;
        let sender =
            HttpSender::new_with_config([a.url, b.url], HttpSenderConfig::dev_default()).unwrap();

        for _ in 0..4 {
            sender.send(RpcRequest::GetSlot, Value::Null).await.unwrap();
        }

        let order: Vec<usize> = log.lock().unwrap().iter().map(|(i, _)| *i).collect();
        assert_eq!(order, vec![0, 1, 0, 1]);
        assert_eq!(sender.get_transport_stats().request_count, 4);
    }

    #[tokio::test]
    async fn test_envelope_shape() {
        let log = RequestLog::default();
        let server = ScriptedServer::spawn(0, vec![Reply::ok(json!(42))], log.clone()).await;
        let sender = HttpSender::new_with_config([server.url], HttpSenderConfig::dev_default())
            .unwrap();

        let result = sender
            .send(RpcRequest::GetBlock, json!([100]))
            .await
            .unwrap();
        assert_eq!(result, json!(42));

        let (_, body) = log.lock().unwrap()[0].clone();
        assert_eq!(body["jsonrpc"], "2.0");
        assert_eq!(body["method"], "getBlock");
        assert_eq!(body["params"], json!([100]));
        assert!(body["id"].is_u64());
    }

    #[tokio::test]
    async fn test_retries_then_succeeds_with_linear_delays() {
        let log = RequestLog::default();
        let server = ScriptedServer::spawn(
            0,
            vec![Reply::status(503), Reply::status(503), Reply::ok(json!("done"))],
            log.clone(),
        )
        .await;
        let delay = Duration::from_millis(50);
        let sender = HttpSender::new_with_config([server.url], config(3, delay)).unwrap();

        let start = Instant::now();
        let result = sender.send(RpcRequest::GetHealth, Value::Null).await.unwrap();
        let elapsed = start.elapsed();

        assert_eq!(result, json!("done"));
        assert_eq!(log.lock().unwrap().len(), 3);
        // 50ms after the first failure, 100ms after the second.
        assert!(elapsed >= delay.saturating_mul(3), "elapsed {elapsed:?}");
    }

    #[tokio::test]
    async fn test_exhaustion_wraps_last_error() {
        let log = RequestLog::default();
        let server = ScriptedServer::spawn(
            0,
            vec![Reply::rpc_error(-32005, "Node is unhealthy", None)],
            log.clone(),
        )
        .await;
        let sender =
            HttpSender::new_with_config([server.url], config(3, Duration::from_millis(1))).unwrap();

        let err = sender.send(RpcRequest::GetSlot, Value::Null).await.unwrap_err();
        assert_eq!(err.request(), Some(&RpcRequest::GetSlot));
        assert_matches!(
            err.kind(),
            ErrorKind::TransportExhausted { attempts: 3, last }
                if matches!(**last, ErrorKind::RpcError(RpcError::RpcResponseError { code: -32005, .. }))
        );
        assert_eq!(log.lock().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_payment_required_is_fatal() {
        let log = RequestLog::default();
        let server = ScriptedServer::spawn(0, vec![Reply::status(402)], log.clone()).await;
        let sender = HttpSender::new_with_config([server.url], HttpSenderConfig::dev_default())
            .unwrap();

        let err = sender.send(RpcRequest::GetSlot, Value::Null).await.unwrap_err();
        assert_matches!(err.kind(), ErrorKind::PaymentRequired(_));
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_invalid_params_is_fatal_and_decorated() {
        let log = RequestLog::default();
        let server = ScriptedServer::spawn(
            0,
            vec![Reply::rpc_error(
                -32602,
                "Invalid params",
                Some(json!("invalid type: string \"x\", expected u64")),
            )],
            log.clone(),
        )
        .await;
        let sender = HttpSender::new_with_config([server.url], HttpSenderConfig::dev_default())
            .unwrap();

        let err = sender
            .send(RpcRequest::GetBlock, json!(["x"]))
            .await
            .unwrap_err();
        assert_eq!(log.lock().unwrap().len(), 1);
        assert_matches!(
            err.kind(),
            ErrorKind::RpcError(RpcError::RpcResponseError { code: -32602, message, .. })
                if message.contains("expected u64")
        );
    }

    #[tokio::test]
    async fn test_other_remote_codes_are_fatal() {
        let log = RequestLog::default();
        let server = ScriptedServer::spawn(
            0,
            vec![Reply::rpc_error(-32000, "Server error", None)],
            log.clone(),
        )
        .await;
        let sender = HttpSender::new_with_config([server.url], HttpSenderConfig::dev_default())
            .unwrap();

        let err = sender.send(RpcRequest::GetSlot, Value::Null).await.unwrap_err();
        assert_eq!(err.kind().rpc_code(), Some(-32000));
        assert_eq!(log.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_connection_failure_fails_over() {
        let log = RequestLog::default();
        let dead = dead_endpoint().await;
        let live = ScriptedServer::spawn(1, vec![Reply::ok(json!(7))], log.clone()).await;
        let sender = HttpSender::new_with_config([dead, live.url], HttpSenderConfig::dev_default())
            .unwrap();

        let result = sender.send(RpcRequest::GetSlot, Value::Null).await.unwrap();
        assert_eq!(result, json!(7));
        assert_eq!(sender.get_transport_stats().request_count, 2);
    }

    #[tokio::test]
    async fn test_rate_limit_counts_toward_stats() {
        let log = RequestLog::default();
        let server = ScriptedServer::spawn(
            0,
            vec![
                Reply::status(429).with_header("Retry-After", "0"),
                Reply::ok(json!(true)),
            ],
            log.clone(),
        )
        .await;
        let sender =
            HttpSender::new_with_config([server.url], config(3, Duration::from_millis(5))).unwrap();

        assert_eq!(
            sender.send(RpcRequest::GetHealth, Value::Null).await.unwrap(),
            json!(true)
        );
        let stats = sender.get_transport_stats();
        assert_eq!(stats.request_count, 2);
        assert!(stats.rate_limited_time >= Duration::from_millis(5));
    }

    #[tokio::test]
    async fn test_zero_attempts_reports_unknown() {
        let sender =
            HttpSender::new_with_config(["http://127.0.0.1:1"], config(0, Duration::ZERO)).unwrap();
        let err = sender.send(RpcRequest::GetSlot, Value::Null).await.unwrap_err();
        assert_matches!(
            err.kind(),
            ErrorKind::TransportExhausted { attempts: 0, last } if matches!(**last, ErrorKind::Unknown)
        );
    }

    #[test]
    fn test_retry_after_parsing() {
        let mut headers = header::HeaderMap::new();
        assert_eq!(retry_after(&headers), None);
        headers.insert(RETRY_AFTER, header::HeaderValue::from_static("3"));
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(3)));
        headers.insert(
            RETRY_AFTER,
            header::HeaderValue::from_static("Wed, 21 Oct 2015 07:28:00 GMT"),
        );
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn test_decorate_only_invalid_params() {
        let decorated = decorate(RpcErrorObject {
            code: JSON_RPC_INVALID_PARAMS,
            message: "Invalid params".to_string(),
            data: Some(json!({"field": "slot"})),
        });
        assert_eq!(decorated.to_string(), "RPC response error -32602: Invalid params: {\"field\":\"slot\"}");

        let untouched = decorate(RpcErrorObject {
            code: -32000,
            message: "boom".to_string(),
            data: Some(json!("extra")),
        });
        assert_eq!(untouched.to_string(), "RPC response error -32000: boom");
    }
}
