//! Transaction intents and the requests built from them.
//!
//! A [`TransactionIntent`] is the normalized pair of identifiers extracted
//! from a scanned or pasted payload. What the pair means depends on the
//! action it is submitted under: for attendance it is user id + registration
//! number, for a play it is visitor wallet + stall.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Where a payload came from. Camera and manual input are treated
/// differently when they fail to parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadSource {
    /// Decoded from a video frame by the scanner loop.
    Camera,
    /// Typed or pasted by the operator.
    Manual,
}

/// Raw text from a scan or a paste, tagged with its source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanPayload {
    /// The decoded text, untouched.
    pub text: String,
    /// Where the text came from.
    pub source: PayloadSource,
}

impl ScanPayload {
    pub fn camera(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: PayloadSource::Camera,
        }
    }

    pub fn manual(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            source: PayloadSource::Manual,
        }
    }
}

/// A validated `{subjectId, counterpartId}` pair.
///
/// Both identifiers are trimmed and guaranteed non-empty. There is no way to
/// build an intent with a blank field; [`TransactionIntent::new`] returns
/// `None` instead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionIntent {
    subject_id: String,
    counterpart_id: String,
}

impl TransactionIntent {
    /// Builds an intent from two identifiers, trimming both.
    pub fn new(subject_id: impl AsRef<str>, counterpart_id: impl AsRef<str>) -> Option<Self> {
        let subject_id = subject_id.as_ref().trim();
        let counterpart_id = counterpart_id.as_ref().trim();
        if subject_id.is_empty() || counterpart_id.is_empty() {
            return None;
        }
        Some(Self {
            subject_id: subject_id.to_string(),
            counterpart_id: counterpart_id.to_string(),
        })
    }

    /// Builds an intent from two identifiers as given. Blank identifiers
    /// are still refused.
    pub fn exact(subject_id: impl Into<String>, counterpart_id: impl Into<String>) -> Option<Self> {
        let subject_id = subject_id.into();
        let counterpart_id = counterpart_id.into();
        if subject_id.trim().is_empty() || counterpart_id.trim().is_empty() {
            return None;
        }
        Some(Self {
            subject_id,
            counterpart_id,
        })
    }

    pub fn subject_id(&self) -> &str {
        &self.subject_id
    }

    pub fn counterpart_id(&self) -> &str {
        &self.counterpart_id
    }
}

impl fmt::Display for TransactionIntent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.subject_id, self.counterpart_id)
    }
}

// ---------------------------------------------------------------------------
// Actions
// ---------------------------------------------------------------------------

/// One user-facing operation. Each kind is its own action context and
/// accepts at most one in-flight submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    MarkAttendance,
    StartPlay,
    SubmitScore,
}

impl ActionKind {
    /// Notification text used when the server returns no message of its own.
    pub fn default_success_message(&self) -> &'static str {
        match self {
            ActionKind::MarkAttendance => "Attendance marked successfully",
            ActionKind::StartPlay => "Play started",
            ActionKind::SubmitScore => "Score submitted",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::MarkAttendance => "mark_attendance",
            ActionKind::StartPlay => "start_play",
            ActionKind::SubmitScore => "submit_score",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A business action ready to be sent to the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionRequest {
    /// Subject is the user id, counterpart the registration number.
    MarkAttendance(TransactionIntent),
    /// Subject is the visitor wallet, counterpart the stall.
    StartPlay(TransactionIntent),
    /// Closes out a play started earlier.
    SubmitScore { transaction_id: String, score: i64 },
}

impl ActionRequest {
    /// Wraps an intent for the given action. `SubmitScore` does not come
    /// from a QR payload, so it yields `None`.
    pub fn from_intent(kind: ActionKind, intent: TransactionIntent) -> Option<Self> {
        match kind {
            ActionKind::MarkAttendance => Some(ActionRequest::MarkAttendance(intent)),
            ActionKind::StartPlay => Some(ActionRequest::StartPlay(intent)),
            ActionKind::SubmitScore => None,
        }
    }

    pub fn kind(&self) -> ActionKind {
        match self {
            ActionRequest::MarkAttendance(_) => ActionKind::MarkAttendance,
            ActionRequest::StartPlay(_) => ActionKind::StartPlay,
            ActionRequest::SubmitScore { .. } => ActionKind::SubmitScore,
        }
    }

    /// JSON body sent to the backend for this action.
    pub fn body(&self) -> serde_json::Value {
        match self {
            ActionRequest::MarkAttendance(intent) => serde_json::json!({
                "subjectId": intent.subject_id(),
                "counterpartId": intent.counterpart_id(),
            }),
            ActionRequest::StartPlay(intent) => serde_json::json!({
                "visitorWalletId": intent.subject_id(),
                "stallId": intent.counterpart_id(),
            }),
            ActionRequest::SubmitScore {
                transaction_id,
                score,
            } => serde_json::json!({
                "transactionId": transaction_id,
                "score": score,
            }),
        }
    }
}
