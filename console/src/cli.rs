//! # CLI Interface
//!
//! Command-line structure for `arcade-console` using `clap` derive. Global
//! flags configure the backend and the session file; subcommands map onto
//! the operator actions.

use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use arcade_client::config;
use arcade_client::ActionKind;

/// Operator console for the arcade wallet.
///
/// Scans visitor QR codes from a desk or stall station and turns them into
/// attendance marks, plays and scores against the event backend.
#[derive(Parser, Debug)]
#[command(
    name = "arcade-console",
    about = "Arcade wallet operator console",
    version,
    propagate_version = true
)]
pub struct ArcadeConsoleCli {
    #[command(flatten)]
    pub global: GlobalArgs,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug)]
pub struct GlobalArgs {
    /// Base URL of the backend API.
    #[arg(
        long,
        global = true,
        env = config::API_URL_ENV,
        default_value = config::DEFAULT_API_URL
    )]
    pub api_url: String,

    /// Where the bearer token is kept between runs.
    #[arg(
        long,
        global = true,
        env = config::SESSION_FILE_ENV,
        default_value = config::DEFAULT_SESSION_FILE
    )]
    pub session_file: PathBuf,

    /// Log output format: pretty or json.
    #[arg(long, global = true, env = "ARCADE_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,

    /// Dump Prometheus metrics to stdout before exiting.
    #[arg(long, global = true)]
    pub print_metrics: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Store a bearer token for later commands.
    Login(LoginArgs),
    /// Forget the stored token.
    Logout,
    /// Scan codes from a camera and submit each one.
    Scan(ScanArgs),
    /// Submit a pasted or typed payload.
    Submit(SubmitArgs),
    /// Record the score of a finished play.
    Score(ScoreArgs),
    /// Look up a wallet balance.
    Balance(BalanceArgs),
    /// Render a payload as a QR code.
    Qr(QrArgs),
    /// Print version information and exit.
    Version,
}

/// Actions a QR payload can drive.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanAction {
    /// Mark a student's attendance.
    Attendance,
    /// Start a play at a stall.
    Play,
}

impl From<ScanAction> for ActionKind {
    fn from(action: ScanAction) -> Self {
        match action {
            ScanAction::Attendance => ActionKind::MarkAttendance,
            ScanAction::Play => ActionKind::StartPlay,
        }
    }
}

#[derive(Args, Debug)]
pub struct LoginArgs {
    /// Bearer token issued by the backend.
    #[arg(long, env = "ARCADE_TOKEN")]
    pub token: String,
}

#[derive(Args, Debug)]
pub struct ScanArgs {
    #[arg(long, value_enum)]
    pub action: ScanAction,

    /// Directory of captured frames (PNG or JPEG), replayed in name order.
    #[arg(long)]
    pub frames: PathBuf,

    /// Milliseconds between frame samples.
    #[arg(long, default_value_t = 100)]
    pub interval_ms: u64,

    /// Milliseconds to pause after each decoded code. Zero disables it.
    #[arg(long, default_value_t = 5000)]
    pub cooldown_ms: u64,
}

#[derive(Args, Debug)]
pub struct SubmitArgs {
    #[arg(long, value_enum)]
    pub action: ScanAction,

    /// Payload text, either JSON or `subject:counterpart`.
    #[arg(long)]
    pub payload: String,
}

#[derive(Args, Debug)]
pub struct ScoreArgs {
    /// Transaction id returned when the play started.
    #[arg(long)]
    pub transaction_id: String,

    #[arg(long, allow_negative_numbers = true)]
    pub score: i64,
}

#[derive(Args, Debug)]
pub struct BalanceArgs {
    #[arg(long)]
    pub wallet: String,
}

#[derive(Args, Debug)]
pub struct QrArgs {
    /// Subject identifier (user or wallet).
    #[arg(long)]
    pub subject: String,

    /// Counterpart identifier (registration number or stall).
    #[arg(long)]
    pub counterpart: String,

    /// Write `subject:counterpart` instead of JSON.
    #[arg(long)]
    pub delimited: bool,

    /// Write a PNG here instead of drawing in the terminal.
    #[arg(long)]
    pub out: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli_structure() {
        ArcadeConsoleCli::command().debug_assert();
    }

    #[test]
    fn global_flags_read_the_client_env_names() {
        let cmd = ArcadeConsoleCli::command();
        let env_of = |id: &str| {
            cmd.get_arguments()
                .find(|a| a.get_id() == id)
                .and_then(|a| a.get_env())
                .map(|e| e.to_string_lossy().into_owned())
        };
        assert_eq!(env_of("api_url").as_deref(), Some(config::API_URL_ENV));
        assert_eq!(env_of("session_file").as_deref(), Some(config::SESSION_FILE_ENV));
    }

    #[test]
    fn scan_parses_action_and_global_flags() {
        let cli = ArcadeConsoleCli::try_parse_from([
            "arcade-console",
            "scan",
            "--action",
            "play",
            "--frames",
            "/tmp/frames",
            "--api-url",
            "http://10.0.0.2:5000/api",
        ])
        .unwrap();
        assert_eq!(cli.global.api_url, "http://10.0.0.2:5000/api");
        match cli.command {
            Commands::Scan(args) => {
                assert_eq!(ActionKind::from(args.action), ActionKind::StartPlay);
                assert_eq!(args.interval_ms, 100);
            }
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
