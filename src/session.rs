//! # Tracking Session
//!
//! Orchestrates one tracking run: sizes the processing buffer from the video,
//! drives the engine through its lifecycle, feeds it frames and applies its
//! results to the registered scene nodes.
//!
//! ## Lifecycle
//!
//! ```text
//! Created ──initialize()──▶ Initializing ──Initialized──▶ Loading ──Loaded──▶ Ready
//!                                                                              │
//!                                             stop() from any state ──▶ Stopped
//! ```
//!
//! `Initialized` installs the adapted projection and immediately requests
//! the registered candidates. Engine failures are logged and the lifecycle
//! simply does not advance; await [`Lifecycle::Ready`] through
//! [`TrackingSession::subscribe`] with your own timeout.
//!
//! ## Frame Flow
//!
//! [`TrackingSession::drive`] is called once per render frame. It drains
//! pending engine events, applies them, and once `Ready` composes and sends
//! at most one frame. While a frame is outstanding new frames are dropped,
//! never queued.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use nft_overlay::config::TrackerConfig;
//! use nft_overlay::scene::shared_node;
//! use nft_overlay::session::TrackingSession;
//! use nft_layout::Size;
//! use nft_worker::replay::ReplayEngine;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let mut session = TrackingSession::builder()
//!     .with_config(TrackerConfig::default())
//!     .with_engine(ReplayEngine::from_path("session.jsonl")?)
//!     .build()?;
//!
//! let node = shared_node();
//! session.register_marker(["markers/pinball"], node.clone(), false)?;
//! session.initialize(Size { w: 1280, h: 720 })?;
//!
//! loop {
//!     session.drive(None)?;
//!     # break;
//! }
//! # Ok(())
//! # }
//! ```

use std::fmt;
use std::future::Future;
use std::time::Duration;

use fast_image_resize::Resizer;
use nft_layout::{build_layout, compose_letterbox, FrameView, ProcessingLayout, Size, Staging};
use nft_worker::{
    parse_failure_log, spawn_worker, Command, EngineEvent, PixelBuffer, TrackingEngine, WorkerError, WorkerHandle,
};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

use crate::calibration::{adapt, parse_projection, ProjectionState};
use crate::capture::FrameSource;
use crate::config::TrackerConfig;
use crate::error::{ErrorSeverity, HasSeverity, OverlayResult, TrackingError};
use crate::pose;
use crate::registry::{MarkerRegistry, SlotHandle};
use crate::scene::{PerspectiveCamera, SceneCamera, SceneNode};

/// Log target for messages forwarded from the engine.
pub const ENGINE_LOG_TARGET: &str = "nft_worker::engine";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    Initializing,
    Loading,
    Ready,
    Stopped,
}

impl Lifecycle {
    pub fn as_str(self) -> &'static str {
        match self {
            Lifecycle::Created => "created",
            Lifecycle::Initializing => "initializing",
            Lifecycle::Loading => "loading",
            Lifecycle::Ready => "ready",
            Lifecycle::Stopped => "stopped",
        }
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What [`TrackingSession::drive`] did with the offered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameDisposition {
    /// Composed and handed to the engine
    Sent,
    /// Previous frame still outstanding
    Dropped,
    /// Session is not `Ready`
    NotReady,
    /// No frame was offered
    NoFrame,
}

/// Running counters for one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub found: u64,
    pub lost: u64,
    /// Frame results that could not be applied
    pub discarded: u64,
    /// Engine `initialize`/`load` failures reported by the worker
    pub engine_failures: u64,
}

pub struct TrackingSession {
    config: TrackerConfig,
    worker: WorkerHandle,
    registry: MarkerRegistry,
    camera: Box<dyn SceneCamera>,
    layout: Option<ProcessingLayout>,
    projection: Option<ProjectionState>,
    lifecycle: watch::Sender<Lifecycle>,
    in_flight: bool,
    resizer: Resizer,
    staging: Staging,
    stats: SessionStats,
}

impl TrackingSession {
    pub fn builder() -> TrackingSessionBuilder {
        TrackingSessionBuilder::new()
    }

    pub fn lifecycle(&self) -> Lifecycle {
        *self.lifecycle.borrow()
    }

    /// Watch lifecycle transitions.
    pub fn subscribe(&self) -> watch::Receiver<Lifecycle> {
        self.lifecycle.subscribe()
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Layout computed by [`TrackingSession::initialize`].
    pub fn layout(&self) -> Option<&ProcessingLayout> {
        self.layout.as_ref()
    }

    /// Projection installed on the camera, once the engine initialized.
    pub fn projection(&self) -> Option<&ProjectionState> {
        self.projection.as_ref()
    }

    pub fn registry(&self) -> &MarkerRegistry {
        &self.registry
    }

    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Whether a sent frame is still waiting for its result.
    pub fn frame_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Register a marker slot. Only allowed until the candidates are sent to
    /// the engine.
    pub fn register_marker<I, S>(
        &mut self,
        candidates: I,
        node: impl SceneNode + 'static,
        persisted: bool,
    ) -> OverlayResult<SlotHandle>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        match self.lifecycle() {
            Lifecycle::Created | Lifecycle::Initializing => {
                Ok(self.registry.register(candidates, node, persisted))
            }
            other => Err(TrackingError::State {
                current: other.as_str(),
                attempted: "register a marker",
            }),
        }
    }

    /// Compute the processing layout for `source` and ask the engine to
    /// initialize against it.
    pub fn initialize(&mut self, source: Size) -> OverlayResult<ProcessingLayout> {
        let current = self.lifecycle();
        if current != Lifecycle::Created {
            return Err(TrackingError::State {
                current: current.as_str(),
                attempted: "initialize",
            });
        }

        let layout = build_layout(source, self.config.device_profile())?;
        let buffer = layout.buffer_size();

        self.worker.send(Command::Initialize {
            buffer_width: buffer.w,
            buffer_height: buffer.h,
            calibration: self.config.calibration.clone(),
        })?;

        tracing::info!(
            video_width = source.w,
            video_height = source.h,
            buffer_width = buffer.w,
            buffer_height = buffer.h,
            offset_x = layout.offset_x,
            offset_y = layout.offset_y,
            device_scale = layout.device_scale,
            "Processing layout ready"
        );

        self.layout = Some(layout);
        self.set_lifecycle(Lifecycle::Initializing);
        Ok(layout)
    }

    /// One orchestration step. Call once per render frame.
    ///
    /// Non-fatal problems with individual engine events are logged and
    /// counted; only a lost worker or a failed frame composition is returned.
    pub fn drive(&mut self, frame: Option<FrameView<'_>>) -> OverlayResult<FrameDisposition> {
        let current = self.lifecycle();
        if current == Lifecycle::Stopped {
            return Err(TrackingError::State {
                current: current.as_str(),
                attempted: "drive",
            });
        }

        while let Some(event) = self.worker.try_recv() {
            let kind = event.kind();
            if let Err(e) = self.handle_event(event) {
                log_event_error(kind, &e);
            }
        }

        if !self.worker.is_alive() {
            return Err(WorkerError::Disconnected.into());
        }

        if self.lifecycle() != Lifecycle::Ready {
            return Ok(FrameDisposition::NotReady);
        }
        let Some(frame) = frame else {
            return Ok(FrameDisposition::NoFrame);
        };
        if self.in_flight {
            self.stats.frames_dropped += 1;
            tracing::debug!(dropped = self.stats.frames_dropped, "Engine busy, frame dropped");
            return Ok(FrameDisposition::Dropped);
        }

        self.send_frame(frame)
    }

    fn send_frame(&mut self, frame: FrameView<'_>) -> OverlayResult<FrameDisposition> {
        let layout = self.layout.ok_or(TrackingError::State {
            current: "uninitialized",
            attempted: "send a frame",
        })?;

        // The buffer moves into the command, so every frame gets its own.
        let mut buffer = vec![0u8; layout.buffer_len()];
        compose_letterbox(&mut self.resizer, frame, &layout, &mut buffer, Some(&mut self.staging))?;

        let size = layout.buffer_size();
        match self.worker.try_send(Command::Process(PixelBuffer::new(buffer, size.w, size.h))) {
            Ok(()) => {
                self.in_flight = true;
                self.stats.frames_sent += 1;
                Ok(FrameDisposition::Sent)
            }
            Err(WorkerError::Busy(_)) => {
                self.stats.frames_dropped += 1;
                Ok(FrameDisposition::Dropped)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn handle_event(&mut self, event: EngineEvent) -> OverlayResult<()> {
        if event.is_frame_result() {
            self.in_flight = false;
        }
        match event {
            EngineEvent::Log(text) => {
                tracing::info!(target: ENGINE_LOG_TARGET, "{}", text);
                match parse_failure_log(&text) {
                    Some((stage, reason)) => {
                        self.stats.engine_failures += 1;
                        Err(TrackingError::engine(stage, reason))
                    }
                    None => Ok(()),
                }
            }
            EngineEvent::Initialized(json) => self.on_initialized(&json),
            EngineEvent::Loaded(infos) => self.on_loaded(infos),
            EngineEvent::Found(detection) => {
                self.stats.found += 1;
                pose::apply_found(&mut self.registry, detection.index, &detection.pose)
                    .map(|_| ())
                    .inspect_err(|_| self.stats.discarded += 1)
            }
            EngineEvent::Lost => {
                self.stats.lost += 1;
                pose::apply_lost(&mut self.registry);
                Ok(())
            }
        }
    }

    fn on_initialized(&mut self, json: &str) -> OverlayResult<()> {
        let current = self.lifecycle();
        if current != Lifecycle::Initializing {
            tracing::warn!(state = %current, "Ignoring unexpected initialized event");
            return Ok(());
        }
        let layout = self.layout.ok_or(TrackingError::State {
            current: current.as_str(),
            attempted: "adapt the projection",
        })?;

        let raw = parse_projection(json)?;
        let projection = adapt(
            &raw,
            &layout,
            self.config.render_target,
            self.config.near,
            self.config.far,
        )?;

        self.camera.set_projection(&projection.adjusted_matrix());
        self.camera.set_matrix_auto_update(false);
        self.projection = Some(projection);
        tracing::info!("Engine initialized, projection installed");

        let descriptors = self.registry.descriptors();
        tracing::info!(
            slots = self.registry.slot_count(),
            candidates = descriptors.len(),
            "Loading markers"
        );
        self.worker.send(Command::Load(descriptors))?;
        self.set_lifecycle(Lifecycle::Loading);
        Ok(())
    }

    fn on_loaded(&mut self, infos: Vec<nft_worker::MarkerInfo>) -> OverlayResult<()> {
        let current = self.lifecycle();
        if current != Lifecycle::Loading {
            tracing::warn!(state = %current, "Ignoring unexpected loaded event");
            return Ok(());
        }
        self.registry.apply_metadata(infos)?;
        tracing::info!(candidates = self.registry.candidate_count(), "Markers loaded");
        self.set_lifecycle(Lifecycle::Ready);
        Ok(())
    }

    fn set_lifecycle(&mut self, next: Lifecycle) {
        let previous = self.lifecycle.send_replace(next);
        if previous != next {
            tracing::info!(from = %previous, to = %next, "Session lifecycle changed");
        }
    }

    /// Stop the worker. Further calls to [`TrackingSession::drive`] fail.
    pub fn stop(&mut self) {
        self.worker.shutdown();
        self.in_flight = false;
        self.set_lifecycle(Lifecycle::Stopped);
    }

    /// Drive the session from `source` at the configured frame rate until
    /// `shutdown` resolves or a fatal error occurs.
    ///
    /// The source is opened here and, once open, closed on every exit path.
    /// The session is stopped when this returns.
    pub async fn run<S, F>(&mut self, source: &mut S, shutdown: F) -> OverlayResult<SessionStats>
    where
        S: FrameSource + ?Sized,
        F: Future<Output = ()>,
    {
        let size = match source.open().await {
            Ok(size) => size,
            Err(e) => {
                tracing::error!(source = source.name(), error = %e, "Frame source failed to open");
                self.stop();
                return Err(e);
            }
        };
        tracing::info!(source = source.name(), width = size.w, height = size.h, "Frame source opened");

        let result = self.run_opened(source, size, shutdown).await;

        if let Err(e) = source.close().await {
            tracing::warn!(source = source.name(), error = %e, "Failed to close frame source");
        }
        self.stop();

        let stats = self.stats;
        tracing::info!(
            sent = stats.frames_sent,
            dropped = stats.frames_dropped,
            found = stats.found,
            lost = stats.lost,
            "Tracking session finished"
        );
        result.map(|()| stats)
    }

    async fn run_opened<S, F>(&mut self, source: &mut S, size: Size, shutdown: F) -> OverlayResult<()>
    where
        S: FrameSource + ?Sized,
        F: Future<Output = ()>,
    {
        self.initialize(size)?;

        let period = Duration::from_secs_f64(1.0 / f64::from(self.config.fps.max(1)));
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    tracing::info!("Shutdown requested");
                    return Ok(());
                }
                _ = interval.tick() => {
                    let frame = source.current_frame();
                    if let Err(e) = self.drive(frame) {
                        if e.is_fatal() {
                            tracing::error!(category = e.category(), error = %e, "Tracking session failed");
                            return Err(e);
                        }
                        tracing::warn!(category = e.category(), error = %e, "Frame skipped");
                    }
                }
            }
        }
    }
}

fn log_event_error(kind: &'static str, e: &TrackingError) {
    match e.severity() {
        ErrorSeverity::Fatal | ErrorSeverity::Error => {
            tracing::error!(event = kind, category = e.category(), error = %e, "Engine event could not be applied")
        }
        ErrorSeverity::Warning | ErrorSeverity::Info => {
            tracing::warn!(event = kind, category = e.category(), error = %e, "Engine event discarded")
        }
    }
}

/// Builder for [`TrackingSession`].
pub struct TrackingSessionBuilder {
    config: TrackerConfig,
    engine: Option<Box<dyn TrackingEngine>>,
    camera: Option<Box<dyn SceneCamera>>,
}

impl Default for TrackingSessionBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackingSessionBuilder {
    pub fn new() -> Self {
        Self {
            config: TrackerConfig::default(),
            engine: None,
            camera: None,
        }
    }

    pub fn with_config(mut self, config: TrackerConfig) -> Self {
        self.config = config;
        self
    }

    /// Engine to run on the session's worker thread.
    pub fn with_engine<E: TrackingEngine>(mut self, engine: E) -> Self {
        self.engine = Some(Box::new(engine));
        self
    }

    /// Camera receiving the adapted projection. Defaults to a private
    /// [`PerspectiveCamera`]; the projection stays readable through
    /// [`TrackingSession::projection`].
    pub fn with_camera<C: SceneCamera + 'static>(mut self, camera: C) -> Self {
        self.camera = Some(Box::new(camera));
        self
    }

    /// Validate the configuration and spawn the worker.
    pub fn build(self) -> OverlayResult<TrackingSession> {
        self.config
            .validate()
            .map_err(|reason| TrackingError::config("tracker", reason))?;
        let engine = self
            .engine
            .ok_or_else(|| TrackingError::config("engine", "no tracking engine configured"))?;

        let worker = spawn_worker(engine, self.config.worker_config())?;
        let (lifecycle, _) = watch::channel(Lifecycle::Created);

        Ok(TrackingSession {
            worker,
            registry: MarkerRegistry::new(),
            camera: self
                .camera
                .unwrap_or_else(|| Box::new(PerspectiveCamera::default())),
            layout: None,
            projection: None,
            lifecycle,
            in_flight: false,
            resizer: Resizer::new(),
            staging: Staging::with_capacity(0),
            stats: SessionStats::default(),
            config: self.config,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scene::shared_node;
    use nft_worker::{Detection, MarkerInfo, RawPose};
    use std::time::Instant;

    struct StaticEngine;

    impl TrackingEngine for StaticEngine {
        fn initialize(&mut self, _w: u32, _h: u32, _calibration: &str) -> anyhow::Result<String> {
            Ok("[1,0,0,0,0,1,0,0,0,0,1,-1,0,0,0,0]".into())
        }

        fn load(&mut self, markers: &[String]) -> anyhow::Result<Vec<MarkerInfo>> {
            Ok(markers
                .iter()
                .map(|_| MarkerInfo { id: 0, width: 100.0, height: 100.0, dpi: 100.0 })
                .collect())
        }

        fn process(&mut self, _frame: PixelBuffer) -> Option<Detection> {
            Some(Detection {
                index: 0,
                pose: RawPose::from_column_major(&[1.0; 16]),
            })
        }
    }

    fn session() -> TrackingSession {
        TrackingSession::builder().with_engine(StaticEngine).build().unwrap()
    }

    fn drive_until(session: &mut TrackingSession, state: Lifecycle) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while session.lifecycle() != state {
            assert!(Instant::now() < deadline, "stuck in {}", session.lifecycle());
            session.drive(None).unwrap();
            std::thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn builder_requires_an_engine_and_a_valid_config() {
        let err = TrackingSession::builder().build().err().unwrap();
        assert_eq!(err.category(), "config");

        let config = TrackerConfig { fps: 0, ..TrackerConfig::default() };
        let err = TrackingSession::builder()
            .with_config(config)
            .with_engine(StaticEngine)
            .build()
            .err()
            .unwrap();
        assert!(err.to_string().contains("FPS"));
    }

    #[test]
    fn reaches_ready_and_locks_registration() {
        let mut session = session();
        session.register_marker(["a"], shared_node(), false).unwrap();
        session.initialize(Size { w: 640, h: 480 }).unwrap();
        drive_until(&mut session, Lifecycle::Ready);

        assert!(session.projection().is_some());
        assert!(matches!(
            session.register_marker(["late"], shared_node(), false),
            Err(TrackingError::State { .. })
        ));
        assert!(matches!(
            session.initialize(Size { w: 640, h: 480 }),
            Err(TrackingError::State { .. })
        ));
    }

    #[test]
    fn frames_wait_for_ready() {
        let mut session = session();
        let data = vec![0u8; 4 * 4 * 4];
        let frame = FrameView { data: &data, size: Size { w: 4, h: 4 }, stride: None };
        assert_eq!(session.drive(Some(frame)).unwrap(), FrameDisposition::NotReady);
    }

    #[test]
    fn worker_failure_logs_surface_as_engine_errors() {
        let mut session = session();
        let err = session
            .handle_event(EngineEvent::Log(nft_worker::failure_log(nft_worker::STAGE_LOAD, "descriptor missing")))
            .unwrap_err();
        assert_eq!(err.category(), "engine");
        assert_eq!(err.severity(), ErrorSeverity::Error);
        assert!(matches!(err, TrackingError::Engine { stage: "load markers", .. }));
        assert_eq!(session.stats().engine_failures, 1);

        session.handle_event(EngineEvent::Log("Initializing...".into())).unwrap();
        assert_eq!(session.stats().engine_failures, 1);
    }

    #[test]
    fn drive_after_stop_fails() {
        let mut session = session();
        session.stop();
        assert_eq!(session.lifecycle(), Lifecycle::Stopped);
        assert!(session.drive(None).is_err());
    }
}
