use {
    crate::request::RpcRequest,
    serde::{Deserialize, Serialize},
    serde_json::Value,
    thiserror::Error as ThisError,
};

/// The `error` member of a JSON-RPC reply.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

#[derive(ThisError, Debug)]
pub enum RpcError {
    #[error("RPC request error: {0}")]
    RpcRequestError(String),
    #[error("RPC response error {code}: {message}")]
    RpcResponseError {
        code: i64,
        message: String,
        data: Option<Value>,
    },
    #[error("parse error: expected {0}")]
    ParseError(String), /* "expected" */
    // Anything in a `ForUser` needs to die. The caller should be
    // deciding what to tell their user
    #[error("{0}")]
    ForUser(String), /* "direct-to-user message" */
}

impl RpcError {
    pub fn code(&self) -> Option<i64> {
        match self {
            Self::RpcResponseError { code, .. } => Some(*code),
            _ => None,
        }
    }
}

impl From<RpcErrorObject> for RpcError {
    fn from(object: RpcErrorObject) -> Self {
        Self::RpcResponseError {
            code: object.code,
            message: object.message,
            data: object.data,
        }
    }
}

#[derive(ThisError, Debug)]
pub enum ErrorKind {
    #[error(transparent)]
    Reqwest(#[from] reqwest::Error),
    #[error(transparent)]
    SerdeJson(#[from] serde_json::Error),
    #[error(transparent)]
    RpcError(#[from] RpcError),
    #[error("HTTP status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("payment or quota required: {0}")]
    PaymentRequired(String),
    #[error("retries exhausted after {attempts} attempts: {last}")]
    TransportExhausted {
        attempts: usize,
        last: Box<ErrorKind>,
    },
    #[error("unknown error")]
    Unknown,
    #[error("{0}")]
    Custom(String),
}

impl ErrorKind {
    /// The innermost cause, looking through `TransportExhausted`.
    pub fn root(&self) -> &ErrorKind {
        match self {
            Self::TransportExhausted { last, .. } => last.root(),
            other => other,
        }
    }

    /// The remote error code carried by the innermost cause, if any.
    pub fn rpc_code(&self) -> Option<i64> {
        match self.root() {
            Self::RpcError(err) => err.code(),
            _ => None,
        }
    }
}

#[derive(ThisError, Debug)]
#[error("{kind}")]
pub struct ClientError {
    pub request: Option<RpcRequest>,

    #[source]
    pub kind: ErrorKind,
}

impl ClientError {
    pub fn new_with_request(kind: ErrorKind, request: RpcRequest) -> Self {
        Self {
            request: Some(request),
            kind,
        }
    }

    pub fn into_with_request(self, request: RpcRequest) -> Self {
        Self {
            request: Some(request),
            ..self
        }
    }

    pub fn request(&self) -> Option<&RpcRequest> {
        self.request.as_ref()
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

impl From<ErrorKind> for ClientError {
    fn from(kind: ErrorKind) -> Self {
        Self {
            request: None,
            kind,
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        ErrorKind::from(err).into()
    }
}

impl From<serde_json::Error> for ClientError {
    fn from(err: serde_json::Error) -> Self {
        ErrorKind::from(err).into()
    }
}

impl From<RpcError> for ClientError {
    fn from(err: RpcError) -> Self {
        ErrorKind::from(err).into()
    }
}

pub type Result<T> = std::result::Result<T, ClientError>;
