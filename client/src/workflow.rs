//! # Scan Workflow
//!
//! Joins the scanner, the interpreter and the submitter for one action.
//!
//! Camera payloads that fail to parse are dropped quietly: continuous
//! scanning sees plenty of QR codes that are not ours. Manual input is
//! different; the operator typed it and needs to hear it was wrong.
//!
//! The post-scan cooldown lives in the scanner, so it covers camera scans
//! only. Manual submissions are never paused.

use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};

use crate::config;
use crate::intent::{ActionKind, ActionRequest, PayloadSource, ScanPayload};
use crate::metrics::SharedMetrics;
use crate::payload::{PayloadError, PayloadInterpreter};
use crate::scanner::PayloadStream;
use crate::submit::{Notification, SubmitOutcome, Submitter};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WorkflowError {
    /// The action does not take its input from a QR payload.
    #[error("action {0} is not driven by QR payloads")]
    UnsupportedAction(ActionKind),
}

/// Tally of one [`ScanWorkflow::run`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkflowSummary {
    pub succeeded: u64,
    pub failed: u64,
    pub suppressed: u64,
    pub rejected: u64,
}

impl WorkflowSummary {
    fn record(&mut self, outcome: &Result<SubmitOutcome, PayloadError>) {
        match outcome {
            Ok(SubmitOutcome::Success(_)) => self.succeeded += 1,
            Ok(SubmitOutcome::Failed { .. }) => self.failed += 1,
            Ok(SubmitOutcome::Suppressed) => self.suppressed += 1,
            Err(_) => self.rejected += 1,
        }
    }
}

pub struct ScanWorkflow {
    action: ActionKind,
    interpreter: PayloadInterpreter,
    submitter: Arc<Submitter>,
    metrics: Option<SharedMetrics>,
}

impl ScanWorkflow {
    pub fn new(action: ActionKind, submitter: Arc<Submitter>) -> Result<Self, WorkflowError> {
        if action == ActionKind::SubmitScore {
            return Err(WorkflowError::UnsupportedAction(action));
        }
        Ok(Self {
            action,
            interpreter: PayloadInterpreter::default(),
            submitter,
            metrics: None,
        })
    }

    pub fn with_interpreter(mut self, interpreter: PayloadInterpreter) -> Self {
        self.interpreter = interpreter;
        self
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn action(&self) -> ActionKind {
        self.action
    }

    pub fn submitter(&self) -> &Arc<Submitter> {
        &self.submitter
    }

    /// Interprets one payload and, if valid, submits it.
    ///
    /// An invalid payload never reaches the network.
    pub async fn handle(&self, payload: ScanPayload) -> Result<SubmitOutcome, PayloadError> {
        let intent = match self.interpreter.interpret(&payload.text) {
            Ok(intent) => intent,
            Err(e) => {
                if let Some(m) = &self.metrics {
                    m.payloads_rejected_total.inc();
                }
                match payload.source {
                    PayloadSource::Camera => {
                        debug!(action = %self.action, "ignoring unrecognised camera payload");
                    }
                    PayloadSource::Manual => {
                        info!(action = %self.action, "manual payload rejected");
                        self.submitter.view().notify(Notification::error(
                            Some(self.action),
                            config::INVALID_PAYLOAD_MESSAGE,
                        ));
                    }
                }
                return Err(e);
            }
        };

        let request = ActionRequest::from_intent(self.action, intent)
            .ok_or(PayloadError::InvalidPayloadFormat)?;
        Ok(self.submitter.submit(request).await)
    }

    /// Pasted or typed input.
    pub async fn submit_manual(&self, text: &str) -> Result<SubmitOutcome, PayloadError> {
        self.handle(ScanPayload::manual(text)).await
    }

    /// Drains a scanner's payload stream until it closes.
    ///
    /// Payloads are handled concurrently, so a code scanned while the
    /// previous submission is still in flight hits the busy context and is
    /// suppressed rather than queued.
    pub async fn run(&self, mut payloads: PayloadStream) -> WorkflowSummary {
        let mut summary = WorkflowSummary::default();
        let mut in_flight = FuturesUnordered::new();
        let mut open = true;

        while open || !in_flight.is_empty() {
            tokio::select! {
                next = payloads.recv(), if open => match next {
                    Some(payload) => in_flight.push(self.handle(payload)),
                    None => open = false,
                },
                Some(outcome) = in_flight.next(), if !in_flight.is_empty() => {
                    summary.record(&outcome);
                }
            }
        }

        info!(
            action = %self.action,
            succeeded = summary.succeeded,
            failed = summary.failed,
            suppressed = summary.suppressed,
            rejected = summary.rejected,
            "scan workflow finished"
        );
        summary
    }
}
