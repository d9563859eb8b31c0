//! # Client Configuration & Constants
//!
//! Every tunable number the QR client relies on lives here. Runtime knobs
//! (base URL, session file) come in through the console's CLI layer; the
//! values below are the defaults those knobs fall back to.

use std::time::Duration;

// ---------------------------------------------------------------------------
// Backend
// ---------------------------------------------------------------------------

/// Base address of the REST backend when nothing else is configured.
/// Matches the port the event backend listens on in local development.
pub const DEFAULT_API_URL: &str = "http://localhost:5000/api";

/// Environment variable that overrides [`DEFAULT_API_URL`].
pub const API_URL_ENV: &str = "ARCADE_API_URL";

/// Per-request timeout. Stall operators are standing in front of a queue,
/// so a hung request should fail fast rather than freeze the station.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Header carrying the per-submission correlation id.
pub const REQUEST_ID_HEADER: &str = "X-Request-Id";

// ---------------------------------------------------------------------------
// Endpoints
// ---------------------------------------------------------------------------

/// Marks a registered user as present. Body: `{subjectId, counterpartId}`.
pub const ATTENDANCE_PATH: &str = "/attendance/mark";

/// Starts a play at a stall. Body: `{visitorWalletId, stallId}`.
pub const PLAY_START_PATH: &str = "/stall/play";

/// Records the score for a play. Body: `{transactionId, score}`.
pub const SCORE_PATH: &str = "/stall/score";

/// Wallet lookup. The wallet identifier is appended as one
/// percent-encoded path segment.
pub const WALLET_PATH: &str = "/wallet";

// ---------------------------------------------------------------------------
// Scanner
// ---------------------------------------------------------------------------

/// How often the decode loop samples the video stream.
pub const SCAN_SAMPLE_INTERVAL: Duration = Duration::from_millis(100);

/// Pause applied after a successful camera scan so the same code held in
/// front of the lens is not submitted twice.
pub const SCAN_COOLDOWN: Duration = Duration::from_secs(5);

/// Capacity of the payload channel between the decode loop and its consumer.
pub const PAYLOAD_CHANNEL_CAPACITY: usize = 16;

// ---------------------------------------------------------------------------
// Notifications
// ---------------------------------------------------------------------------

/// Broadcast capacity for user-facing notifications.
pub const NOTIFICATION_CHANNEL_CAPACITY: usize = 64;

/// Used when neither the server nor the transport produced a usable message.
pub const FALLBACK_ERROR_MESSAGE: &str = "Something went wrong";

/// Shown when manually entered text is neither JSON nor `subject:counterpart`.
pub const INVALID_PAYLOAD_MESSAGE: &str = "Invalid QR payload format";

// ---------------------------------------------------------------------------
// QR rendering
// ---------------------------------------------------------------------------

/// Minimum edge length, in pixels, of rendered QR images.
pub const QR_MIN_DIMENSION: u32 = 256;

// ---------------------------------------------------------------------------
// Session
// ---------------------------------------------------------------------------

/// Default location of the persisted session token.
pub const DEFAULT_SESSION_FILE: &str = ".arcade-session.json";

/// Environment variable that overrides [`DEFAULT_SESSION_FILE`].
pub const SESSION_FILE_ENV: &str = "ARCADE_SESSION_FILE";

/// Joins the configured base URL with an endpoint path without doubling or
/// dropping the slash between them.
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}
