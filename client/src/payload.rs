//! # Payload Interpreter
//!
//! Turns decoded QR text into a [`TransactionIntent`]. Two encodings are
//! accepted and tried in a fixed order:
//!
//! 1. **Structured** — a JSON object carrying a subject field and a
//!    counterpart field, e.g. `{"subjectId":"u1","reg_no":"REG-1"}`.
//! 2. **Delimited** — `subject:counterpart` with exactly one separator.
//!
//! Order matters: a payload that happens to satisfy both is always read as
//! structured.

use thiserror::Error;

use crate::intent::TransactionIntent;

/// Keys recognised as the subject identifier, in lookup order.
const SUBJECT_KEYS: &[&str] = &[
    "subjectId",
    "subject_id",
    "userId",
    "user_id",
    "visitorWalletId",
    "walletId",
];

/// Keys recognised as the counterpart identifier, in lookup order.
const COUNTERPART_KEYS: &[&str] = &[
    "counterpartId",
    "counterpart_id",
    "reg_no",
    "regNo",
    "registrationNo",
    "stallId",
    "stall_id",
];

const DELIMITER: char = ':';

/// Errors produced while interpreting a payload.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PayloadError {
    /// The text matched none of the accepted encodings.
    #[error("invalid payload format")]
    InvalidPayloadFormat,
}

/// One way of reading a payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PayloadStrategy {
    Structured,
    Delimited,
}

impl PayloadStrategy {
    /// Attempts this strategy. `None` means "not mine", never a hard error.
    pub fn parse(&self, text: &str) -> Option<TransactionIntent> {
        match self {
            PayloadStrategy::Structured => parse_structured(text),
            PayloadStrategy::Delimited => parse_delimited(text),
        }
    }
}

fn parse_structured(text: &str) -> Option<TransactionIntent> {
    let value: serde_json::Value = serde_json::from_str(text.trim()).ok()?;
    let object = value.as_object()?;
    let subject = first_field(object, SUBJECT_KEYS)?;
    let counterpart = first_field(object, COUNTERPART_KEYS)?;
    // Structured values are used verbatim; only delimited halves are trimmed.
    TransactionIntent::exact(subject, counterpart)
}

/// Returns the first key that holds a string or integer value.
fn first_field(
    object: &serde_json::Map<String, serde_json::Value>,
    keys: &[&str],
) -> Option<String> {
    keys.iter().find_map(|key| match object.get(*key)? {
        serde_json::Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) if n.is_i64() || n.is_u64() => Some(n.to_string()),
        _ => None,
    })
}

fn parse_delimited(text: &str) -> Option<TransactionIntent> {
    let (subject, counterpart) = text.split_once(DELIMITER)?;
    if counterpart.contains(DELIMITER) {
        return None;
    }
    TransactionIntent::new(subject, counterpart)
}

/// Runs an ordered list of strategies and stops at the first success.
#[derive(Debug, Clone)]
pub struct PayloadInterpreter {
    strategies: Vec<PayloadStrategy>,
}

impl Default for PayloadInterpreter {
    fn default() -> Self {
        Self {
            strategies: vec![PayloadStrategy::Structured, PayloadStrategy::Delimited],
        }
    }
}

impl PayloadInterpreter {
    /// Interpreter with a custom strategy order.
    pub fn with_strategies(strategies: Vec<PayloadStrategy>) -> Self {
        Self { strategies }
    }

    pub fn strategies(&self) -> &[PayloadStrategy] {
        &self.strategies
    }

    pub fn interpret(&self, text: &str) -> Result<TransactionIntent, PayloadError> {
        for strategy in &self.strategies {
            if let Some(intent) = strategy.parse(text) {
                tracing::trace!(?strategy, %intent, "payload interpreted");
                return Ok(intent);
            }
        }
        Err(PayloadError::InvalidPayloadFormat)
    }
}
