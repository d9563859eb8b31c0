//! # Backend API
//!
//! Everything the client needs from the REST backend, behind one trait so
//! the submitter can be exercised without a network.
//!
//! ## Endpoints
//!
//! | Method | Path               | Body                               |
//! |--------|--------------------|------------------------------------|
//! | POST   | `/attendance/mark` | `{subjectId, counterpartId}`       |
//! | POST   | `/stall/play`      | `{visitorWalletId, stallId}`       |
//! | POST   | `/stall/score`     | `{transactionId, score}`           |
//! | GET    | `/wallet/{id}`     | —                                  |
//!
//! Response schemas are owned by the backend. The client reads the fields
//! it knows about and ignores the rest.

pub mod http;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::FALLBACK_ERROR_MESSAGE;
use crate::intent::ActionRequest;

pub use http::{HttpBackend, HttpBackendConfig};

/// Fields the client understands in a successful action response.
///
/// Built from whatever JSON the backend sends. Fields with an unexpected
/// type are treated as absent; a reply is never rejected for its shape.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RemoteReply {
    pub success: Option<bool>,
    pub message: Option<String>,
    pub error: Option<String>,
    pub balance: Option<f64>,
    pub score: Option<f64>,
    pub reward: Option<f64>,
    pub transaction_id: Option<String>,
    pub pending_count: Option<u64>,
}

impl RemoteReply {
    /// Reads a 2xx body. Empty or non-JSON bodies give an empty reply.
    pub fn from_body(body: &str) -> Self {
        match serde_json::from_str::<Value>(body) {
            Ok(value) => Self::from_value(&value),
            Err(_) => Self::default(),
        }
    }

    pub fn from_value(value: &Value) -> Self {
        let Some(obj) = value.as_object() else {
            return Self::default();
        };
        Self {
            success: lookup(obj, &["success"]).and_then(as_flag),
            message: lookup(obj, &["message"]).and_then(as_text),
            error: lookup(obj, &["error"]).and_then(as_text),
            balance: lookup(obj, &["balance", "newBalance", "new_balance"]).and_then(as_number),
            score: lookup(obj, &["score"]).and_then(as_number),
            reward: lookup(obj, &["reward", "rewardPoints", "reward_points"])
                .and_then(as_number),
            transaction_id: lookup(obj, &["transactionId", "transaction_id"]).and_then(as_id),
            pending_count: lookup(obj, &["pendingCount", "pending_count", "pending"])
                .and_then(as_count),
        }
    }
}

/// Wallet lookup response.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletBalance {
    pub wallet_id: String,
    pub balance: f64,
    pub pending_count: Option<u64>,
}

impl WalletBalance {
    /// Reads a wallet body. The id falls back to `requested` when the
    /// backend does not echo it; a missing balance is a decode error.
    pub fn from_body(body: &str, requested: &str) -> Result<Self, RemoteError> {
        let value: Value =
            serde_json::from_str(body).map_err(|e| RemoteError::Decode(e.to_string()))?;
        let obj = value
            .as_object()
            .ok_or_else(|| RemoteError::Decode("wallet response is not an object".into()))?;
        let balance = lookup(obj, &["balance"])
            .and_then(as_number)
            .ok_or_else(|| RemoteError::Decode("wallet response has no balance".into()))?;
        Ok(Self {
            wallet_id: lookup(obj, &["walletId", "wallet_id", "id"])
                .and_then(as_id)
                .unwrap_or_else(|| requested.to_string()),
            balance,
            pending_count: lookup(obj, &["pendingCount", "pending_count", "pending"])
                .and_then(as_count),
        })
    }
}

// ---------------------------------------------------------------------------
// Lenient field readers
// ---------------------------------------------------------------------------

fn lookup<'a>(obj: &'a Map<String, Value>, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|k| obj.get(*k).filter(|v| !v.is_null()))
}

fn as_text(v: &Value) -> Option<String> {
    v.as_str().map(str::to_string)
}

/// Strings and numbers both work as ids.
fn as_id(v: &Value) -> Option<String> {
    match v {
        Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_number(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_count(v: &Value) -> Option<u64> {
    match v {
        Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| *f >= 0.0 && f.fract() == 0.0).map(|f| f as u64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn as_flag(v: &Value) -> Option<bool> {
    match v {
        Value::Bool(b) => Some(*b),
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" => Some(true),
            "false" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

/// A failed backend call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The backend answered, and the answer was no.
    #[error("request rejected with status {status}")]
    Rejected {
        status: u16,
        /// Server-supplied `error` field.
        error: Option<String>,
        /// Server-supplied `message` field.
        message: Option<String>,
    },

    /// The request never produced a response (DNS, connect, timeout...).
    #[error("transport error: {0}")]
    Transport(String),

    /// A success status with a body we could not read.
    #[error("unexpected response body: {0}")]
    Decode(String),

    /// The client could not be built from its configuration.
    #[error("invalid backend configuration: {0}")]
    Config(String),
}

impl RemoteError {
    /// The text to show the operator.
    ///
    /// First available wins: server `error`, server `message`, the
    /// transport-level message, then a fixed fallback.
    pub fn user_message(&self) -> String {
        let server = match self {
            RemoteError::Rejected { error, message, .. } => non_blank(error.as_deref())
                .or_else(|| non_blank(message.as_deref()))
                .map(str::to_string),
            _ => None,
        };
        let transport = self.transport_message();
        server
            .or_else(|| non_blank(Some(transport.as_str())).map(str::to_string))
            .unwrap_or_else(|| FALLBACK_ERROR_MESSAGE.to_string())
    }

    fn transport_message(&self) -> String {
        match self {
            RemoteError::Rejected { status, .. } => {
                format!("Request failed with status code {status}")
            }
            RemoteError::Transport(msg) | RemoteError::Decode(msg) | RemoteError::Config(msg) => {
                msg.clone()
            }
        }
    }
}

fn non_blank(s: Option<&str>) -> Option<&str> {
    s.map(str::trim).filter(|s| !s.is_empty())
}

/// The remote side of every business action.
#[async_trait]
pub trait TransactionBackend: Send + Sync {
    /// Issues exactly one request for `request`.
    async fn send(&self, request: &ActionRequest) -> Result<RemoteReply, RemoteError>;

    async fn wallet_balance(&self, wallet_id: &str) -> Result<WalletBalance, RemoteError>;
}
