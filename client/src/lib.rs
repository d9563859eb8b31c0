// Copyright (c) 2026 Arcade Wallet Team. MIT License.
// See LICENSE for details.

//! # Arcade Client — QR Transaction Core
//!
//! The operator side of the arcade wallet: stall and desk stations point a
//! camera at a visitor's QR code, the code is decoded into an intent, and
//! the intent becomes a backend action (mark attendance, start a play,
//! record a score).
//!
//! ```text
//!   Scanner ──text──► PayloadInterpreter ──intent──► Submitter ──► backend
//!                                                        │
//!                                          ViewState ◄───┘ notifications
//! ```
//!
//! ## Modules
//!
//! - **scanner** — camera stream, decode loop, cooldown, lifecycle.
//! - **payload** — structured-then-delimited payload interpretation.
//! - **intent** — intents, action kinds, request bodies.
//! - **submit** — one-in-flight-per-action submission and view reconciliation.
//! - **workflow** — scanner + interpreter + submitter for one action.
//! - **api** — backend trait and the `reqwest` implementation.
//! - **session** — explicit bearer-token context with a persistent store.
//! - **qr** — rendering payloads back into codes.
//! - **metrics** — Prometheus counters for the pipeline.
//! - **config** — defaults and constants.

pub mod api;
pub mod config;
pub mod intent;
pub mod metrics;
pub mod payload;
pub mod qr;
pub mod scanner;
pub mod session;
pub mod submit;
pub mod workflow;

pub use intent::{ActionKind, ActionRequest, PayloadSource, ScanPayload, TransactionIntent};
pub use payload::{PayloadError, PayloadInterpreter, PayloadStrategy};
pub use submit::{SubmitOutcome, Submitter, TransactionResult};
pub use workflow::ScanWorkflow;
