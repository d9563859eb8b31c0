//! The transaction submitter.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::api::{RemoteError, RemoteReply, TransactionBackend, WalletBalance};
use crate::intent::{ActionKind, ActionRequest};
use crate::metrics::SharedMetrics;

use super::state::{ActionContexts, SubmissionState};
use super::view::{Notification, ViewState};

/// Outcome of one submission attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionResult {
    pub action: ActionKind,
    pub success: bool,
    /// Human-readable text, already resolved for display.
    pub message: String,
    pub balance: Option<f64>,
    pub score: Option<f64>,
    pub reward: Option<f64>,
    pub transaction_id: Option<String>,
    pub pending_count: Option<u64>,
    pub completed_at: DateTime<Utc>,
}

impl TransactionResult {
    fn from_reply(action: ActionKind, reply: RemoteReply) -> Self {
        let message = reply
            .message
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| action.default_success_message().to_string());
        Self {
            action,
            success: true,
            message,
            balance: reply.balance,
            score: reply.score,
            reward: reply.reward,
            transaction_id: reply.transaction_id,
            pending_count: reply.pending_count,
            completed_at: Utc::now(),
        }
    }

    fn from_error(action: ActionKind, error: &RemoteError) -> Self {
        Self {
            action,
            success: false,
            message: error.user_message(),
            balance: None,
            score: None,
            reward: None,
            transaction_id: None,
            pending_count: None,
            completed_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum SubmitOutcome {
    Success(TransactionResult),
    Failed {
        result: TransactionResult,
        error: RemoteError,
    },
    /// A submission for the same action was already in flight. Nothing was
    /// sent.
    Suppressed,
}

impl SubmitOutcome {
    pub fn result(&self) -> Option<&TransactionResult> {
        match self {
            SubmitOutcome::Success(r) | SubmitOutcome::Failed { result: r, .. } => Some(r),
            SubmitOutcome::Suppressed => None,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, SubmitOutcome::Success(_))
    }
}

/// Sends action requests, one in flight per action, and reconciles the view.
///
/// No retries: a failed submission is reported and the operator triggers the
/// next attempt.
pub struct Submitter {
    backend: Arc<dyn TransactionBackend>,
    contexts: ActionContexts,
    view: Arc<ViewState>,
    metrics: Option<SharedMetrics>,
}

impl Submitter {
    pub fn new(backend: Arc<dyn TransactionBackend>, view: Arc<ViewState>) -> Self {
        Self {
            backend,
            contexts: ActionContexts::new(),
            view,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn view(&self) -> &Arc<ViewState> {
        &self.view
    }

    pub fn state(&self, kind: ActionKind) -> SubmissionState {
        self.contexts.state(kind)
    }

    /// `true` while `kind` has a request in flight. Front ends use this to
    /// disable their submit triggers.
    pub fn is_busy(&self, kind: ActionKind) -> bool {
        self.contexts.is_busy(kind)
    }

    pub fn last_outcome(&self, kind: ActionKind) -> Option<SubmissionState> {
        self.contexts.last_outcome(kind)
    }

    pub async fn submit(&self, request: ActionRequest) -> SubmitOutcome {
        let kind = request.kind();
        let Some(in_flight) = self.contexts.begin(kind) else {
            debug!(action = %kind, "submission already in flight, trigger ignored");
            if let Some(m) = &self.metrics {
                m.submissions_suppressed_total.inc();
            }
            return SubmitOutcome::Suppressed;
        };

        let epoch = self.view.epoch();
        if let Some(m) = &self.metrics {
            m.submissions_total.inc();
        }
        let started = Instant::now();
        let response = self.backend.send(&request).await;
        let elapsed = started.elapsed();
        if let Some(m) = &self.metrics {
            m.submission_latency_seconds.observe(elapsed.as_secs_f64());
        }

        match response {
            Ok(reply) => {
                let result = TransactionResult::from_reply(kind, reply);
                in_flight.finish(SubmissionState::Success);
                info!(
                    action = %kind,
                    elapsed_ms = elapsed.as_millis() as u64,
                    balance = ?result.balance,
                    "submission succeeded"
                );
                self.view.apply_if_current(
                    epoch,
                    |view| {
                        if result.balance.is_some() {
                            view.balance = result.balance;
                        }
                        if result.pending_count.is_some() {
                            view.pending_count = result.pending_count;
                        }
                        if result.score.is_some() {
                            view.last_score = result.score;
                        }
                        if result.transaction_id.is_some() {
                            view.last_transaction_id = result.transaction_id.clone();
                        }
                    },
                    Some(Notification::success(kind, result.message.clone())),
                );
                SubmitOutcome::Success(result)
            }
            Err(error) => {
                let result = TransactionResult::from_error(kind, &error);
                in_flight.finish(SubmissionState::Failed);
                if let Some(m) = &self.metrics {
                    m.submissions_failed_total.inc();
                }
                warn!(action = %kind, error = %error, "submission failed");
                self.view.apply_if_current(
                    epoch,
                    |_| {},
                    Some(Notification::error(Some(kind), result.message.clone())),
                );
                SubmitOutcome::Failed { result, error }
            }
        }
    }

    /// Fetches a wallet balance and shows it.
    pub async fn refresh_balance(&self, wallet_id: &str) -> Result<WalletBalance, RemoteError> {
        let epoch = self.view.epoch();
        match self.backend.wallet_balance(wallet_id).await {
            Ok(balance) => {
                self.view.apply_if_current(
                    epoch,
                    |view| {
                        view.balance = Some(balance.balance);
                        if balance.pending_count.is_some() {
                            view.pending_count = balance.pending_count;
                        }
                    },
                    None,
                );
                Ok(balance)
            }
            Err(error) => {
                self.view.apply_if_current(
                    epoch,
                    |_| {},
                    Some(Notification::error(None, error.user_message())),
                );
                Err(error)
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::intent::TransactionIntent;
    use crate::metrics::ClientMetrics;
    use crate::submit::NotificationLevel;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Notify;

    /// Scripted backend. Optionally blocks every call until `gate` is
    /// notified.
    pub(crate) struct MockBackend {
        pub calls: AtomicUsize,
        pub reply: Mutex<Result<RemoteReply, RemoteError>>,
        pub gate: Option<Arc<Notify>>,
        pub requests: Mutex<Vec<ActionRequest>>,
    }

    impl MockBackend {
        pub(crate) fn replying(reply: Result<RemoteReply, RemoteError>) -> Self {
            Self {
                calls: AtomicUsize::new(0),
                reply: Mutex::new(reply),
                gate: None,
                requests: Mutex::new(Vec::new()),
            }
        }

        pub(crate) fn gated(reply: Result<RemoteReply, RemoteError>, gate: Arc<Notify>) -> Self {
            Self {
                gate: Some(gate),
                ..Self::replying(reply)
            }
        }

        pub(crate) fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl TransactionBackend for MockBackend {
        async fn send(&self, request: &ActionRequest) -> Result<RemoteReply, RemoteError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.requests.lock().push(request.clone());
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            self.reply.lock().clone()
        }

        async fn wallet_balance(&self, wallet_id: &str) -> Result<WalletBalance, RemoteError> {
            Ok(WalletBalance {
                wallet_id: wallet_id.to_string(),
                balance: 250.0,
                pending_count: Some(1),
            })
        }
    }

    fn attendance(subject: &str, counterpart: &str) -> ActionRequest {
        ActionRequest::MarkAttendance(TransactionIntent::new(subject, counterpart).unwrap())
    }

    #[tokio::test]
    async fn success_uses_default_message_and_returns_to_idle() {
        let backend = Arc::new(MockBackend::replying(Ok(RemoteReply::default())));
        let submitter = Submitter::new(backend.clone(), Arc::new(ViewState::new()));

        let outcome = submitter.submit(attendance("u1", "REG-1")).await;
        let result = outcome.result().unwrap();
        assert!(result.success);
        assert_eq!(result.message, "Attendance marked successfully");
        assert_eq!(submitter.state(ActionKind::MarkAttendance), SubmissionState::Idle);
        assert_eq!(
            submitter.last_outcome(ActionKind::MarkAttendance),
            Some(SubmissionState::Success)
        );
        let note = submitter.view().snapshot().notification.unwrap();
        assert_eq!(note.text, "Attendance marked successfully");
        assert_eq!(backend.calls(), 1);
    }

    #[tokio::test]
    async fn server_message_and_balance_reach_the_view() {
        let backend = Arc::new(MockBackend::replying(Ok(RemoteReply {
            message: Some("Enjoy the game!".into()),
            balance: Some(80.0),
            transaction_id: Some("tx-9".into()),
            ..RemoteReply::default()
        })));
        let submitter = Submitter::new(backend, Arc::new(ViewState::new()));
        let intent = TransactionIntent::new("w1", "stall-2").unwrap();

        let outcome = submitter.submit(ActionRequest::StartPlay(intent)).await;
        assert!(outcome.is_success());
        let view = submitter.view().snapshot();
        assert_eq!(view.balance, Some(80.0));
        assert_eq!(view.last_transaction_id.as_deref(), Some("tx-9"));
        assert_eq!(view.notification.unwrap().text, "Enjoy the game!");
    }

    #[tokio::test]
    async fn server_error_text_is_shown_verbatim() {
        let backend = Arc::new(MockBackend::replying(Err(RemoteError::Rejected {
            status: 403,
            error: Some("Wallet frozen".into()),
            message: Some("Forbidden".into()),
        })));
        let submitter = Submitter::new(backend, Arc::new(ViewState::new()));
        let mut notes = submitter.view().subscribe();

        let outcome = submitter.submit(attendance("u1", "REG-1")).await;
        assert!(matches!(outcome, SubmitOutcome::Failed { .. }));
        let note = notes.recv().await.unwrap();
        assert_eq!(note.level, NotificationLevel::Error);
        assert_eq!(note.text, "Wallet frozen");
        assert_eq!(submitter.state(ActionKind::MarkAttendance), SubmissionState::Idle);
    }

    #[tokio::test]
    async fn concurrent_trigger_is_suppressed() {
        let gate = Arc::new(Notify::new());
        let backend = Arc::new(MockBackend::gated(
            Ok(RemoteReply::default()),
            Arc::clone(&gate),
        ));
        let metrics = Arc::new(ClientMetrics::new());
        let submitter = Submitter::new(backend.clone(), Arc::new(ViewState::new()))
            .with_metrics(Arc::clone(&metrics));

        let (first, second, _) = tokio::join!(
            submitter.submit(attendance("u1", "REG-1")),
            async {
                assert!(submitter.is_busy(ActionKind::MarkAttendance));
                submitter.submit(attendance("u1", "REG-1")).await
            },
            async {
                gate.notify_one();
            },
        );

        assert!(first.is_success());
        assert_eq!(second, SubmitOutcome::Suppressed);
        assert_eq!(backend.calls(), 1);
        assert_eq!(metrics.submissions_suppressed_total.get(), 1);
        assert!(!submitter.is_busy(ActionKind::MarkAttendance));

        // Idle again: the next trigger goes through.
        gate.notify_one();
        assert!(submitter.submit(attendance("u1", "REG-1")).await.is_success());
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn failure_does_not_retry_and_allows_next_attempt() {
        let backend = Arc::new(MockBackend::replying(Err(RemoteError::Transport(
            "connection refused".into(),
        ))));
        let submitter = Submitter::new(backend.clone(), Arc::new(ViewState::new()));

        let outcome = submitter.submit(attendance("u1", "REG-1")).await;
        assert_eq!(outcome.result().unwrap().message, "connection refused");
        assert_eq!(backend.calls(), 1);

        submitter.submit(attendance("u1", "REG-1")).await;
        assert_eq!(backend.calls(), 2);
    }

    #[tokio::test]
    async fn result_after_view_reset_is_dropped() {
        let gate = Arc::new(Notify::new());
        let backend = Arc::new(MockBackend::gated(
            Ok(RemoteReply {
                balance: Some(5.0),
                ..RemoteReply::default()
            }),
            Arc::clone(&gate),
        ));
        let view = Arc::new(ViewState::new());
        let submitter = Submitter::new(backend, Arc::clone(&view));

        let (outcome, _) = tokio::join!(submitter.submit(attendance("u1", "REG-1")), async {
            view.reset();
            gate.notify_one();
        });

        assert!(outcome.is_success());
        assert_eq!(view.snapshot().balance, None);
        assert!(view.snapshot().notification.is_none());
        assert_eq!(submitter.state(ActionKind::MarkAttendance), SubmissionState::Idle);
    }

    #[tokio::test]
    async fn dropped_submission_frees_the_context() {
        let gate = Arc::new(Notify::new());
        let backend = Arc::new(MockBackend::gated(
            Ok(RemoteReply::default()),
            Arc::clone(&gate),
        ));
        let submitter = Submitter::new(backend, Arc::new(ViewState::new()));

        let mut pending = Box::pin(submitter.submit(attendance("u1", "REG-1")));
        assert!(futures::poll!(pending.as_mut()).is_pending());
        assert!(submitter.is_busy(ActionKind::MarkAttendance));
        drop(pending);
        assert!(!submitter.is_busy(ActionKind::MarkAttendance));
    }

    #[tokio::test]
    async fn refresh_balance_updates_view() {
        let backend = Arc::new(MockBackend::replying(Ok(RemoteReply::default())));
        let submitter = Submitter::new(backend, Arc::new(ViewState::new()));
        let balance = submitter.refresh_balance("w-1").await.unwrap();
        assert_eq!(balance.balance, 250.0);
        assert_eq!(submitter.view().snapshot().balance, Some(250.0));
        assert_eq!(submitter.view().snapshot().pending_count, Some(1));
    }
}
