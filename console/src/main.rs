// Copyright (c) 2026 Arcade Wallet Team. MIT License.
// See LICENSE for details.

//! # Arcade Operator Console
//!
//! Entry point for the `arcade-console` binary. Parses CLI arguments,
//! initializes logging and metrics, and wires the scanner, interpreter and
//! submitter from `arcade-client` together.
//!
//! - `login` / `logout` — manage the stored bearer token
//! - `scan`             — camera workflow for attendance or play
//! - `submit`           — manual payload entry
//! - `score`            — record a score for a started play
//! - `balance`          — wallet lookup
//! - `qr`               — render a payload as a code
//! - `version`          — print build version information

mod cli;
mod logging;

use anyhow::{bail, Context, Result};
use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::broadcast::error::RecvError;

use arcade_client::api::{HttpBackend, HttpBackendConfig};
use arcade_client::metrics::{ClientMetrics, SharedMetrics};
use arcade_client::qr::{self, PayloadEncoding};
use arcade_client::scanner::{FrameDirCamera, QrDecoder, ScannerConfig, ScannerSession};
use arcade_client::session::{FileTokenStore, SessionContext};
use arcade_client::submit::{NotificationLevel, ViewState};
use arcade_client::{
    ActionKind, ActionRequest, ScanWorkflow, SubmitOutcome, Submitter, TransactionIntent,
};

use cli::{ArcadeConsoleCli, Commands, GlobalArgs};
use logging::LogFormat;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = ArcadeConsoleCli::parse();
    logging::init_logging(
        "arcade_console=info,arcade_client=info",
        LogFormat::from_str_lossy(&cli.global.log_format),
    );

    let metrics: SharedMetrics = Arc::new(ClientMetrics::new());
    let result = match cli.command {
        Commands::Login(args) => login(&cli.global, &args.token),
        Commands::Logout => logout(&cli.global),
        Commands::Scan(args) => scan(&cli.global, args, Arc::clone(&metrics)).await,
        Commands::Submit(args) => submit_payload(&cli.global, args, Arc::clone(&metrics)).await,
        Commands::Score(args) => submit_score(&cli.global, args, Arc::clone(&metrics)).await,
        Commands::Balance(args) => balance(&cli.global, &args.wallet).await,
        Commands::Qr(args) => render_qr(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    };

    if cli.global.print_metrics {
        let text = metrics.encode().context("failed to encode metrics")?;
        print!("{text}");
    }
    result
}

// ---------------------------------------------------------------------------
// Wiring
// ---------------------------------------------------------------------------

fn open_session(global: &GlobalArgs) -> Result<SessionContext> {
    let store = Arc::new(FileTokenStore::new(&global.session_file));
    SessionContext::init(store).with_context(|| {
        format!(
            "failed to load session from {}",
            global.session_file.display()
        )
    })
}

fn build_submitter(global: &GlobalArgs, metrics: Option<SharedMetrics>) -> Result<Submitter> {
    let session = open_session(global)?;
    if !session.is_authenticated() {
        tracing::warn!("no stored token, requests will be sent unauthenticated");
    }
    let cfg = HttpBackendConfig::default().with_base_url(global.api_url.clone());
    let backend = HttpBackend::new(cfg, session)
        .with_context(|| format!("failed to create backend client for {}", global.api_url))?;

    let submitter = Submitter::new(Arc::new(backend), Arc::new(ViewState::new()));
    Ok(match metrics {
        Some(m) => submitter.with_metrics(m),
        None => submitter,
    })
}

// ---------------------------------------------------------------------------
// Commands
// ---------------------------------------------------------------------------

fn login(global: &GlobalArgs, token: &str) -> Result<()> {
    let session = open_session(global)?;
    session.login(token).context("failed to store token")?;
    println!("Logged in. Token stored in {}", global.session_file.display());
    Ok(())
}

fn logout(global: &GlobalArgs) -> Result<()> {
    let session = open_session(global)?;
    session.logout().context("failed to clear token")?;
    println!("Logged out.");
    Ok(())
}

async fn scan(global: &GlobalArgs, args: cli::ScanArgs, metrics: SharedMetrics) -> Result<()> {
    let action = ActionKind::from(args.action);
    let submitter = Arc::new(build_submitter(global, Some(Arc::clone(&metrics)))?);
    let workflow = ScanWorkflow::new(action, Arc::clone(&submitter))?
        .with_metrics(Arc::clone(&metrics));

    let config = ScannerConfig {
        sample_interval: Duration::from_millis(args.interval_ms.max(1)),
        cooldown: (args.cooldown_ms > 0).then(|| Duration::from_millis(args.cooldown_ms)),
        ..ScannerConfig::default()
    };
    let mut scanner = ScannerSession::new(
        Arc::new(FrameDirCamera::new(&args.frames)),
        Arc::new(QrDecoder),
        config,
    )
    .with_metrics(Arc::clone(&metrics));

    let payloads = scanner
        .activate()
        .await
        .with_context(|| format!("failed to start scanner on {}", args.frames.display()))?;
    tracing::info!(action = %action, frames = %args.frames.display(), "scanning");

    let printer = {
        let mut notes = submitter.view().subscribe();
        tokio::spawn(async move {
            loop {
                match notes.recv().await {
                    Ok(note) => {
                        let tag = match note.level {
                            NotificationLevel::Success => "ok",
                            NotificationLevel::Error => "error",
                        };
                        println!("[{tag}] {}", note.text);
                    }
                    Err(RecvError::Lagged(missed)) => {
                        tracing::warn!(missed, "notification printer fell behind");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    };

    tokio::select! {
        summary = workflow.run(payloads) => {
            println!(
                "{} succeeded, {} failed, {} suppressed, {} unrecognised",
                summary.succeeded, summary.failed, summary.suppressed, summary.rejected
            );
        }
        _ = shutdown_signal() => {
            tracing::info!("interrupted, stopping scanner");
        }
    }

    scanner.deactivate().await;
    // Dropping the last handles on the view closes its channel; the printer
    // drains what is buffered and then exits.
    drop(workflow);
    drop(submitter);
    if let Err(e) = printer.await {
        tracing::warn!(error = %e, "notification printer ended abnormally");
    }
    Ok(())
}

async fn submit_payload(
    global: &GlobalArgs,
    args: cli::SubmitArgs,
    metrics: SharedMetrics,
) -> Result<()> {
    let action = ActionKind::from(args.action);
    let submitter = Arc::new(build_submitter(global, Some(Arc::clone(&metrics)))?);
    let workflow = ScanWorkflow::new(action, submitter)?.with_metrics(metrics);

    match workflow.submit_manual(&args.payload).await {
        Ok(outcome) => report(outcome),
        Err(e) => bail!("{}: {e}", arcade_client::config::INVALID_PAYLOAD_MESSAGE),
    }
}

async fn submit_score(
    global: &GlobalArgs,
    args: cli::ScoreArgs,
    metrics: SharedMetrics,
) -> Result<()> {
    let submitter = build_submitter(global, Some(metrics))?;
    let outcome = submitter
        .submit(ActionRequest::SubmitScore {
            transaction_id: args.transaction_id,
            score: args.score,
        })
        .await;
    report(outcome)
}

async fn balance(global: &GlobalArgs, wallet: &str) -> Result<()> {
    let submitter = build_submitter(global, None)?;
    let balance = submitter
        .refresh_balance(wallet)
        .await
        .map_err(|e| anyhow::anyhow!(e.user_message()))
        .with_context(|| format!("failed to fetch balance for wallet {wallet}"))?;
    println!("{}", serde_json::to_string_pretty(&balance)?);
    Ok(())
}

fn render_qr(args: cli::QrArgs) -> Result<()> {
    let intent = TransactionIntent::new(&args.subject, &args.counterpart)
        .context("subject and counterpart must both be non-empty")?;
    let encoding = if args.delimited {
        PayloadEncoding::Delimited
    } else {
        PayloadEncoding::Structured
    };
    let payload = qr::encode_payload(&intent, encoding);

    match args.out {
        Some(path) => write_png(&payload, &path),
        None => {
            let art = qr::render_terminal(&payload).context("failed to render QR code")?;
            println!("{art}");
            println!("{payload}");
            Ok(())
        }
    }
}

fn write_png(payload: &str, path: &Path) -> Result<()> {
    qr::render_png(payload, path)
        .with_context(|| format!("failed to write QR image to {}", path.display()))?;
    println!("QR code written to {}", path.display());
    Ok(())
}

/// Prints a submission outcome. A failed submission is an error exit.
fn report(outcome: SubmitOutcome) -> Result<()> {
    match outcome {
        SubmitOutcome::Success(result) => {
            println!("{}", serde_json::to_string_pretty(&result)?);
            Ok(())
        }
        SubmitOutcome::Failed { result, .. } => bail!("{}", result.message),
        SubmitOutcome::Suppressed => {
            println!("A submission for this action is already in progress.");
            Ok(())
        }
    }
}

fn print_version() {
    println!("arcade-console {}", env!("CARGO_PKG_VERSION"));
}

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::warn!(error = %e, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
