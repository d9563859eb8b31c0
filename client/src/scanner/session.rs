//! Scanner session lifecycle.
//!
//! A [`ScannerSession`] owns one camera stream and at most one decode loop.
//! `activate()` acquires both; `deactivate()` (or dropping the session)
//! releases both. The stream lives inside a guard that stops it on drop, so
//! the camera is released on every exit path of the loop task, including
//! abort.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, trace, warn};

use crate::config;
use crate::intent::ScanPayload;
use crate::metrics::SharedMetrics;

use super::camera::{Camera, Facing, VideoStream};
use super::decoder::FrameDecoder;
use super::ScanError;

/// Tunables for the decode loop.
#[derive(Debug, Clone)]
pub struct ScannerConfig {
    /// Time between frame samples.
    pub sample_interval: Duration,
    /// Pause after each emitted payload. `None` disables the pause.
    pub cooldown: Option<Duration>,
    /// Camera direction to request.
    pub facing: Facing,
    /// Buffered payloads before the loop waits on its consumer.
    pub channel_capacity: usize,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self {
            sample_interval: config::SCAN_SAMPLE_INTERVAL,
            cooldown: Some(config::SCAN_COOLDOWN),
            facing: Facing::Environment,
            channel_capacity: config::PAYLOAD_CHANNEL_CAPACITY,
        }
    }
}

/// Observable state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScannerState {
    /// No loop running. Initial state, and the state after `deactivate()`.
    Idle,
    /// Camera open, loop sampling.
    Scanning,
    /// The last activation was refused. The caller has to retry.
    CameraUnavailable,
}

/// Payloads emitted by an active session. Closes when the loop ends.
pub type PayloadStream = mpsc::Receiver<ScanPayload>;

struct ActiveLoop {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Stops the stream when dropped.
struct StreamGuard(Box<dyn VideoStream>);

impl Drop for StreamGuard {
    fn drop(&mut self) {
        self.0.stop();
        debug!("camera stream released");
    }
}

pub struct ScannerSession {
    camera: Arc<dyn Camera>,
    decoder: Arc<dyn FrameDecoder>,
    config: ScannerConfig,
    metrics: Option<SharedMetrics>,
    active: Option<ActiveLoop>,
    state: ScannerState,
}

impl ScannerSession {
    pub fn new(
        camera: Arc<dyn Camera>,
        decoder: Arc<dyn FrameDecoder>,
        config: ScannerConfig,
    ) -> Self {
        Self {
            camera,
            decoder,
            config,
            metrics: None,
            active: None,
            state: ScannerState::Idle,
        }
    }

    pub fn with_metrics(mut self, metrics: SharedMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn state(&self) -> ScannerState {
        if self.state == ScannerState::Scanning && !self.is_active() {
            return ScannerState::Idle;
        }
        self.state
    }

    /// `true` while a decode loop is running.
    pub fn is_active(&self) -> bool {
        self.active
            .as_ref()
            .map(|a| !a.handle.is_finished())
            .unwrap_or(false)
    }

    /// Opens the camera and starts the decode loop.
    ///
    /// Fails with [`ScanError::AlreadyActive`] while a loop is running, and
    /// with [`ScanError::CameraUnavailable`] if the camera refuses. In the
    /// latter case no loop is started and nothing is retried.
    pub async fn activate(&mut self) -> Result<PayloadStream, ScanError> {
        if self.is_active() {
            return Err(ScanError::AlreadyActive);
        }
        // A loop that ended on its own (stream exhausted) leaves a finished
        // handle behind.
        self.active = None;

        let stream = match self.camera.open(self.config.facing).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!(error = %e, "camera unavailable");
                self.state = ScannerState::CameraUnavailable;
                return Err(ScanError::CameraUnavailable(e));
            }
        };

        let (tx, rx) = mpsc::channel(self.config.channel_capacity.max(1));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(decode_loop(
            StreamGuard(stream),
            Arc::clone(&self.decoder),
            self.config.clone(),
            self.metrics.clone(),
            tx,
            shutdown_rx,
        ));

        self.active = Some(ActiveLoop {
            shutdown: shutdown_tx,
            handle,
        });
        self.state = ScannerState::Scanning;
        info!(
            interval_ms = self.config.sample_interval.as_millis() as u64,
            "scanner activated"
        );
        Ok(rx)
    }

    /// Stops the loop and releases the camera. Safe to call repeatedly and
    /// on a session that never activated.
    pub async fn deactivate(&mut self) {
        if let Some(active) = self.active.take() {
            let _ = active.shutdown.send(true);
            if let Err(e) = active.handle.await {
                if !e.is_cancelled() {
                    warn!(error = %e, "decode loop ended abnormally");
                }
            }
            info!("scanner deactivated");
        }
        if self.state == ScannerState::Scanning {
            self.state = ScannerState::Idle;
        }
    }
}

impl Drop for ScannerSession {
    fn drop(&mut self) {
        if let Some(active) = self.active.take() {
            let _ = active.shutdown.send(true);
            active.handle.abort();
        }
    }
}

async fn decode_loop(
    mut guard: StreamGuard,
    decoder: Arc<dyn FrameDecoder>,
    config: ScannerConfig,
    metrics: Option<SharedMetrics>,
    tx: mpsc::Sender<ScanPayload>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(config.sample_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => break,
        }
        if *shutdown.borrow() {
            break;
        }

        // Frame capture and QR decoding are CPU or disk bound; run them off
        // the async workers. The guard travels with the work and comes back.
        let sampled = tokio::task::spawn_blocking({
            let decoder = Arc::clone(&decoder);
            move || {
                let sample = guard.0.next_frame().map(|frame| decoder.decode(&frame));
                (guard, sample)
            }
        })
        .await;
        let sample = match sampled {
            Ok((returned, sample)) => {
                guard = returned;
                sample
            }
            Err(e) => {
                // The guard was dropped with the failed task.
                warn!(error = %e, "frame sampling failed");
                break;
            }
        };

        let Some(decoded) = sample else {
            debug!("video stream ended");
            break;
        };
        let Some(text) = decoded else {
            trace!("no code in frame");
            continue;
        };
        if text.trim().is_empty() {
            continue;
        }

        if let Some(m) = &metrics {
            m.payloads_decoded_total.inc();
        }
        debug!(len = text.len(), "payload decoded");

        tokio::select! {
            sent = tx.send(ScanPayload::camera(text)) => {
                if sent.is_err() {
                    debug!("payload consumer dropped");
                    break;
                }
            }
            _ = shutdown.changed() => break,
        }

        if let Some(cooldown) = config.cooldown {
            tokio::select! {
                _ = tokio::time::sleep(cooldown) => {}
                _ = shutdown.changed() => break,
            }
            ticker.reset();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scanner::camera::{CameraError, Frame};
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    /// Every frame's first byte is the "payload id"; 0 means no code.
    struct ByteDecoder;

    impl FrameDecoder for ByteDecoder {
        fn decode(&self, frame: &Frame) -> Option<String> {
            match frame.luma()[0] {
                0 => None,
                n => Some(format!("code-{n}")),
            }
        }
    }

    struct ScriptedStream {
        frames: Vec<u8>,
        pos: usize,
        repeat_last: bool,
        released: Arc<AtomicBool>,
    }

    impl VideoStream for ScriptedStream {
        fn next_frame(&mut self) -> Option<Frame> {
            let byte = match self.frames.get(self.pos) {
                Some(b) => {
                    self.pos += 1;
                    *b
                }
                None if self.repeat_last => *self.frames.last()?,
                None => return None,
            };
            Frame::from_luma(1, 1, vec![byte])
        }

        fn stop(&mut self) {
            self.released.store(true, Ordering::SeqCst);
        }
    }

    struct ScriptedCamera {
        frames: Vec<u8>,
        repeat_last: bool,
        deny: bool,
        opens: AtomicUsize,
        released: Arc<AtomicBool>,
        facing: Mutex<Option<Facing>>,
    }

    impl ScriptedCamera {
        fn new(frames: Vec<u8>, repeat_last: bool) -> Arc<Self> {
            Arc::new(Self {
                frames,
                repeat_last,
                deny: false,
                opens: AtomicUsize::new(0),
                released: Arc::new(AtomicBool::new(false)),
                facing: Mutex::new(None),
            })
        }

        fn denied() -> Arc<Self> {
            Arc::new(Self {
                frames: vec![],
                repeat_last: false,
                deny: true,
                opens: AtomicUsize::new(0),
                released: Arc::new(AtomicBool::new(false)),
                facing: Mutex::new(None),
            })
        }
    }

    #[async_trait]
    impl Camera for ScriptedCamera {
        async fn open(&self, facing: Facing) -> Result<Box<dyn VideoStream>, CameraError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            *self.facing.lock() = Some(facing);
            if self.deny {
                return Err(CameraError::PermissionDenied);
            }
            Ok(Box::new(ScriptedStream {
                frames: self.frames.clone(),
                pos: 0,
                repeat_last: self.repeat_last,
                released: Arc::clone(&self.released),
            }))
        }
    }

    fn session(camera: Arc<ScriptedCamera>, cooldown: Option<Duration>) -> ScannerSession {
        ScannerSession::new(
            camera,
            Arc::new(ByteDecoder),
            ScannerConfig {
                cooldown,
                ..ScannerConfig::default()
            },
        )
    }

    #[tokio::test(start_paused = true)]
    async fn emits_decoded_payloads_and_skips_empty_frames() {
        let camera = ScriptedCamera::new(vec![0, 0, 3, 0, 4], false);
        let mut s = session(Arc::clone(&camera), None);
        let mut rx = s.activate().await.unwrap();

        assert_eq!(rx.recv().await.unwrap().text, "code-3");
        assert_eq!(rx.recv().await.unwrap().text, "code-4");
        // Stream exhausted: loop ends, channel closes, camera released.
        assert!(rx.recv().await.is_none());
        assert!(camera.released.load(Ordering::SeqCst));
        assert_eq!(*camera.facing.lock(), Some(Facing::Environment));
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_suppresses_repeat_of_held_code() {
        // The same code stays in view forever.
        let camera = ScriptedCamera::new(vec![7], true);
        let cooldown = Duration::from_secs(5);
        let mut s = session(Arc::clone(&camera), Some(cooldown));
        let mut rx = s.activate().await.unwrap();

        let start = tokio::time::Instant::now();
        assert_eq!(rx.recv().await.unwrap().text, "code-7");
        assert_eq!(rx.recv().await.unwrap().text, "code-7");
        assert!(start.elapsed() >= cooldown);

        s.deactivate().await;
        assert!(camera.released.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn denied_camera_reports_unavailable_and_never_samples() {
        let camera = ScriptedCamera::denied();
        let mut s = session(Arc::clone(&camera), None);

        let err = s.activate().await.err().unwrap();
        assert!(matches!(
            err,
            ScanError::CameraUnavailable(CameraError::PermissionDenied)
        ));
        assert_eq!(s.state(), ScannerState::CameraUnavailable);
        assert!(!s.is_active());
        assert_eq!(camera.opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn second_activation_is_refused_while_running() {
        let camera = ScriptedCamera::new(vec![0], true);
        let mut s = session(Arc::clone(&camera), None);
        let _rx = s.activate().await.unwrap();

        assert!(matches!(
            s.activate().await.err().unwrap(),
            ScanError::AlreadyActive
        ));
        assert_eq!(camera.opens.load(Ordering::SeqCst), 1);
        // The refused call does not disturb the running loop.
        assert!(s.is_active());
        assert_eq!(s.state(), ScannerState::Scanning);
        s.deactivate().await;
        assert_eq!(s.state(), ScannerState::Idle);
    }

    #[tokio::test(start_paused = true)]
    async fn deactivate_is_idempotent_and_safe_before_activate() {
        let camera = ScriptedCamera::new(vec![0], true);
        let mut s = session(Arc::clone(&camera), None);
        s.deactivate().await;
        let _rx = s.activate().await.unwrap();
        s.deactivate().await;
        s.deactivate().await;
        assert!(!s.is_active());
        assert!(camera.released.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_session_releases_camera() {
        let camera = ScriptedCamera::new(vec![0], true);
        {
            let mut s = session(Arc::clone(&camera), None);
            let _rx = s.activate().await.unwrap();
            tokio::time::sleep(Duration::from_millis(350)).await;
        }
        // The aborted loop may still have a sample running on the blocking
        // pool; the guard is released when that sample finishes.
        for _ in 0..500 {
            if camera.released.load(Ordering::SeqCst) {
                break;
            }
            tokio::task::yield_now().await;
            std::thread::sleep(Duration::from_millis(1));
        }
        assert!(camera.released.load(Ordering::SeqCst));
    }

    /// A stream whose first frame blocks its thread until the test lets it
    /// go. Only completes promptly if sampling happens off the runtime.
    struct HandshakeStream {
        entered: Arc<AtomicBool>,
        release: Arc<AtomicBool>,
        timed_out: Arc<AtomicBool>,
        done: bool,
    }

    impl VideoStream for HandshakeStream {
        fn next_frame(&mut self) -> Option<Frame> {
            if self.done {
                return None;
            }
            self.done = true;
            self.entered.store(true, Ordering::SeqCst);
            let start = std::time::Instant::now();
            while !self.release.load(Ordering::SeqCst) {
                if start.elapsed() > Duration::from_secs(2) {
                    self.timed_out.store(true, Ordering::SeqCst);
                    break;
                }
                std::thread::sleep(Duration::from_millis(1));
            }
            Frame::from_luma(1, 1, vec![9u8])
        }

        fn stop(&mut self) {}
    }

    struct HandshakeCamera {
        entered: Arc<AtomicBool>,
        release: Arc<AtomicBool>,
        timed_out: Arc<AtomicBool>,
    }

    #[async_trait]
    impl Camera for HandshakeCamera {
        async fn open(&self, _facing: Facing) -> Result<Box<dyn VideoStream>, CameraError> {
            Ok(Box::new(HandshakeStream {
                entered: Arc::clone(&self.entered),
                release: Arc::clone(&self.release),
                timed_out: Arc::clone(&self.timed_out),
                done: false,
            }))
        }
    }

    #[tokio::test]
    async fn slow_frames_do_not_block_the_runtime() {
        let camera = Arc::new(HandshakeCamera {
            entered: Arc::new(AtomicBool::new(false)),
            release: Arc::new(AtomicBool::new(false)),
            timed_out: Arc::new(AtomicBool::new(false)),
        });
        let mut s = ScannerSession::new(
            Arc::clone(&camera) as Arc<dyn Camera>,
            Arc::new(ByteDecoder),
            ScannerConfig {
                sample_interval: Duration::from_millis(1),
                cooldown: None,
                ..ScannerConfig::default()
            },
        );
        let mut rx = s.activate().await.unwrap();

        while !camera.entered.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
        // This task still runs while the frame is being captured.
        camera.release.store(true, Ordering::SeqCst);

        assert_eq!(rx.recv().await.unwrap().text, "code-9");
        assert!(!camera.timed_out.load(Ordering::SeqCst));
        s.deactivate().await;
    }

    #[tokio::test(start_paused = true)]
    async fn reactivation_after_stream_end_opens_camera_again() {
        let camera = ScriptedCamera::new(vec![5], false);
        let mut s = session(Arc::clone(&camera), None);
        let mut rx = s.activate().await.unwrap();
        assert_eq!(rx.recv().await.unwrap().text, "code-5");
        assert!(rx.recv().await.is_none());

        let mut rx = s.activate().await.unwrap();
        assert_eq!(rx.recv().await.unwrap().text, "code-5");
        assert_eq!(camera.opens.load(Ordering::SeqCst), 2);
    }
}
