//! `reqwest`-backed implementation of [`TransactionBackend`].

use async_trait::async_trait;
use reqwest::StatusCode;
use std::time::Duration;
use uuid::Uuid;

use crate::config;
use crate::intent::ActionRequest;
use crate::session::SessionContext;

use super::{RemoteError, RemoteReply, TransactionBackend, WalletBalance};

/// Connection settings for [`HttpBackend`].
#[derive(Debug, Clone)]
pub struct HttpBackendConfig {
    pub base_url: String,
    pub timeout: Duration,
}

impl Default for HttpBackendConfig {
    fn default() -> Self {
        Self {
            base_url: config::DEFAULT_API_URL.to_string(),
            timeout: config::REQUEST_TIMEOUT,
        }
    }
}

impl HttpBackendConfig {
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }
}

pub struct HttpBackend {
    cfg: HttpBackendConfig,
    client: reqwest::Client,
    session: SessionContext,
}

impl HttpBackend {
    pub fn new(cfg: HttpBackendConfig, session: SessionContext) -> Result<Self, RemoteError> {
        if cfg.base_url.trim().is_empty() {
            return Err(RemoteError::Config("base_url is empty".to_string()));
        }
        let client = reqwest::Client::builder()
            .timeout(cfg.timeout)
            .build()
            .map_err(|e| RemoteError::Config(format!("failed to build http client: {e}")))?;
        Ok(Self {
            cfg,
            client,
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.cfg.base_url
    }

    fn url(&self, path: &str) -> String {
        config::join_url(&self.cfg.base_url, path)
    }

    /// `{base}/wallet/{id}` with the id as a single encoded segment, so
    /// `/`, `..`, `?` or `#` in an id cannot reach another endpoint.
    fn wallet_url(&self, wallet_id: &str) -> Result<reqwest::Url, RemoteError> {
        if matches!(wallet_id, "" | "." | "..") {
            return Err(RemoteError::Config(format!("invalid wallet id {wallet_id:?}")));
        }
        let mut url = reqwest::Url::parse(&self.url(config::WALLET_PATH))
            .map_err(|e| RemoteError::Config(format!("invalid base_url: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| RemoteError::Config("base_url cannot take a path".to_string()))?
            .pop_if_empty()
            .push(wallet_id);
        Ok(url)
    }

    fn path_for(request: &ActionRequest) -> &'static str {
        match request {
            ActionRequest::MarkAttendance(_) => config::ATTENDANCE_PATH,
            ActionRequest::StartPlay(_) => config::PLAY_START_PATH,
            ActionRequest::SubmitScore { .. } => config::SCORE_PATH,
        }
    }

    /// Attaches the bearer token (read now, not at construction) and a
    /// request id, sends, and reads the body.
    async fn execute(
        &self,
        req: reqwest::RequestBuilder,
    ) -> Result<(StatusCode, String), RemoteError> {
        let request_id = Uuid::new_v4();
        let mut req = req.header(config::REQUEST_ID_HEADER, request_id.to_string());
        if let Some(token) = self.session.bearer() {
            req = req.bearer_auth(token);
        }

        let resp = req.send().await.map_err(transport_error)?;
        let status = resp.status();
        let body = resp.text().await.map_err(transport_error)?;
        tracing::debug!(%request_id, status = status.as_u16(), "backend responded");

        if !status.is_success() {
            let (error, message) = error_fields(&body);
            return Err(RemoteError::Rejected {
                status: status.as_u16(),
                error,
                message,
            });
        }

        Ok((status, body))
    }
}

fn transport_error(e: reqwest::Error) -> RemoteError {
    if e.is_timeout() {
        RemoteError::Transport("request timed out".to_string())
    } else {
        RemoteError::Transport(e.to_string())
    }
}

/// Pulls `error` and `message` out of an error body when it is JSON.
fn error_fields(body: &str) -> (Option<String>, Option<String>) {
    let Ok(value) = serde_json::from_str::<serde_json::Value>(body) else {
        return (None, None);
    };
    let field = |name: &str| value.get(name).and_then(|v| v.as_str()).map(str::to_string);
    (field("error"), field("message"))
}

#[async_trait]
impl TransactionBackend for HttpBackend {
    async fn send(&self, request: &ActionRequest) -> Result<RemoteReply, RemoteError> {
        let url = self.url(Self::path_for(request));
        tracing::info!(action = %request.kind(), %url, "submitting action");

        let (status, body) = self
            .execute(self.client.post(&url).json(&request.body()))
            .await?;
        // The action already happened on a 2xx, so the body is read
        // leniently. Only an explicit `success: false` turns it into a
        // failure.
        let reply = RemoteReply::from_body(&body);
        if reply.success == Some(false) {
            return Err(RemoteError::Rejected {
                status: status.as_u16(),
                error: reply.error,
                message: reply.message,
            });
        }
        Ok(reply)
    }

    async fn wallet_balance(&self, wallet_id: &str) -> Result<WalletBalance, RemoteError> {
        let wallet_id = wallet_id.trim();
        let url = self.wallet_url(wallet_id)?;
        let (_, body) = self.execute(self.client.get(url)).await?;
        WalletBalance::from_body(&body, wallet_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_fields_from_json_body() {
        let (e, m) = error_fields(r#"{"error":"Wallet frozen","message":"Forbidden"}"#);
        assert_eq!(e.as_deref(), Some("Wallet frozen"));
        assert_eq!(m.as_deref(), Some("Forbidden"));
    }

    #[test]
    fn error_fields_from_html_body() {
        assert_eq!(error_fields("<html>502</html>"), (None, None));
    }

    #[test]
    fn empty_base_url_is_refused() {
        let cfg = HttpBackendConfig::default().with_base_url("  ");
        let err = HttpBackend::new(cfg, SessionContext::ephemeral(None)).err().unwrap();
        assert!(matches!(err, RemoteError::Config(_)));
    }

    #[test]
    fn wallet_id_is_one_encoded_segment() {
        let cfg = HttpBackendConfig::default().with_base_url("http://localhost:5000/api/");
        let backend = HttpBackend::new(cfg, SessionContext::ephemeral(None)).unwrap();
        assert_eq!(
            backend.wallet_url("w-1").unwrap().as_str(),
            "http://localhost:5000/api/wallet/w-1"
        );
        assert_eq!(
            backend.wallet_url("../admin?x=1#f").unwrap().as_str(),
            "http://localhost:5000/api/wallet/..%2Fadmin%3Fx=1%23f"
        );
        assert!(matches!(backend.wallet_url(".."), Err(RemoteError::Config(_))));
    }

    #[test]
    fn paths_follow_action() {
        let intent = crate::intent::TransactionIntent::new("a", "b").unwrap();
        assert_eq!(
            HttpBackend::path_for(&ActionRequest::MarkAttendance(intent.clone())),
            "/attendance/mark"
        );
        assert_eq!(
            HttpBackend::path_for(&ActionRequest::StartPlay(intent)),
            "/stall/play"
        );
    }
}
