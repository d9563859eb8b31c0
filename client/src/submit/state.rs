//! Per-action submission state.
//!
//! Each [`ActionKind`] is an independent action context that runs the cycle
//!
//! ```text
//!   Idle ──begin──► Submitting ──► Success ─┐
//!    ▲                         └─► Failed  ─┤
//!    └──────────────────────────────────────┘
//! ```
//!
//! `Success` and `Failed` mark the end of a cycle and are never held as the
//! live state: [`InFlight::finish`] records them as the context's last
//! outcome and returns it straight to `Idle`. A context is observed as
//! `Idle` or `Submitting` only.
//!
//! `Submitting` is the only state that rejects a new submission. The
//! check-and-set in [`ActionContexts::begin`] happens under the map entry
//! lock, so two triggers racing for the same context cannot both win.

use dashmap::DashMap;

use crate::intent::ActionKind;

/// Phase of an action context. [`ActionContexts::state`] reports `Idle` or
/// `Submitting`; [`ActionContexts::last_outcome`] reports `Success` or
/// `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SubmissionState {
    #[default]
    Idle,
    Submitting,
    Success,
    Failed,
}

#[derive(Debug, Clone, Copy, Default)]
struct ContextEntry {
    state: SubmissionState,
    /// Outcome of the most recent completed cycle.
    last_outcome: Option<SubmissionState>,
    completed: u64,
}

/// All action contexts for one submitter.
#[derive(Debug, Default)]
pub struct ActionContexts {
    inner: DashMap<ActionKind, ContextEntry>,
}

impl ActionContexts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves `kind` from `Idle` to `Submitting`. Returns `None` if a
    /// submission is already in flight for it.
    pub fn begin(&self, kind: ActionKind) -> Option<InFlight<'_>> {
        let mut entry = self.inner.entry(kind).or_default();
        if entry.state == SubmissionState::Submitting {
            return None;
        }
        entry.state = SubmissionState::Submitting;
        Some(InFlight {
            contexts: self,
            kind,
            finished: false,
        })
    }

    pub fn state(&self, kind: ActionKind) -> SubmissionState {
        self.inner
            .get(&kind)
            .map(|e| e.state)
            .unwrap_or(SubmissionState::Idle)
    }

    pub fn is_busy(&self, kind: ActionKind) -> bool {
        self.state(kind) == SubmissionState::Submitting
    }

    pub fn last_outcome(&self, kind: ActionKind) -> Option<SubmissionState> {
        self.inner.get(&kind).and_then(|e| e.last_outcome)
    }

    /// Number of cycles that reached `Success` or `Failed`.
    pub fn completed(&self, kind: ActionKind) -> u64 {
        self.inner.get(&kind).map(|e| e.completed).unwrap_or(0)
    }
}

/// Proof that a context is `Submitting`. Returns the context to `Idle` when
/// finished or dropped, so an abandoned submission future cannot wedge it.
pub struct InFlight<'a> {
    contexts: &'a ActionContexts,
    kind: ActionKind,
    finished: bool,
}

impl InFlight<'_> {
    pub fn kind(&self) -> ActionKind {
        self.kind
    }

    /// Records the outcome (`Success` or `Failed`) and returns to `Idle`.
    pub fn finish(mut self, outcome: SubmissionState) {
        debug_assert!(matches!(
            outcome,
            SubmissionState::Success | SubmissionState::Failed
        ));
        if let Some(mut entry) = self.contexts.inner.get_mut(&self.kind) {
            entry.last_outcome = Some(outcome);
            entry.completed += 1;
            entry.state = SubmissionState::Idle;
        }
        tracing::debug!(action = %self.kind, ?outcome, "submission cycle complete");
        self.finished = true;
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Some(mut entry) = self.contexts.inner.get_mut(&self.kind) {
            entry.state = SubmissionState::Idle;
        }
        tracing::debug!(action = %self.kind, "submission abandoned before completion");
    }
}
