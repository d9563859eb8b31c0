//! # Transaction Submitter
//!
//! Sends an [`ActionRequest`](crate::intent::ActionRequest) to the backend,
//! interprets the answer, reconciles local view-state and publishes a
//! notification.
//!
//! - [`state`] — per-action `Idle → Submitting → {Success, Failed} → Idle`.
//! - [`view`] — the reconciled view and its notifications.
//! - [`submitter`] — the [`Submitter`] itself.

pub mod state;
pub mod submitter;
pub mod view;

pub use state::{ActionContexts, InFlight, SubmissionState};
pub use submitter::{SubmitOutcome, Submitter, TransactionResult};
pub use view::{Notification, NotificationLevel, ViewSnapshot, ViewState};
