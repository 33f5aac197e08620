// SPDX-License-Identifier: MIT
//! # Tracking Worker for NFT Marker Engines
//!
//! This crate runs a natural-feature-tracking engine in its own execution
//! context and connects it to the render-side orchestrator through a pair of
//! ordered message queues.
//!
//! ## Architecture Overview
//!
//! ```text
//! ┌──────────────┐  Command (bounded)   ┌──────────────────┐
//! │ Orchestrator │─────────────────────▶│  Worker thread   │
//! │ (render loop)│                      │  TrackingEngine  │
//! │              │◀─────────────────────│                  │
//! └──────────────┘ EngineEvent (bounded)└──────────────────┘
//! ```
//!
//! ### Threading Model
//! - **Worker thread**: owns the engine; nothing else can reach it
//! - **Caller thread**: sends commands and polls events without blocking
//! - One worker per session; spawning a second session spawns a second thread
//!
//! ### Ownership Transfer
//! - `Command::Process` carries a `PixelBuffer` by value. Once sent, the
//!   orchestrator has no handle to those pixels.
//!
//! ### Ordering
//! - Each queue is FIFO. The worker handles one command at a time and answers
//!   every `Process` with exactly one `Found` or `Lost`.
//!
//! ### Failure Handling
//! - Failed `initialize`/`load` calls are reported as `Log` events built by
//!   [`failure_log`] and the matching completion event is never sent.
//! - A `Process` received before a successful `initialize` is answered with
//!   `Lost` without touching the engine.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use nft_worker::{spawn_worker, Command, WorkerConfig, replay::ReplayEngine};
//!
//! let engine = ReplayEngine::from_path("session.jsonl")?;
//! let worker = spawn_worker(engine, WorkerConfig::default())?;
//! worker.send(Command::Initialize {
//!     buffer_width: 320,
//!     buffer_height: 240,
//!     calibration: "camera_para.dat".into(),
//! })?;
//! while let Some(event) = worker.try_recv() {
//!     println!("{:?}", event);
//! }
//! # Ok::<(), anyhow::Error>(())
//! ```

use std::thread;

use crossbeam_channel::{bounded, Receiver, Sender, TryRecvError, TrySendError};

pub mod protocol;
pub mod replay;

pub use protocol::{
    decode_event, encode_event, failure_log, parse_failure_log, Command, Detection, EngineEvent,
    MarkerInfo, PixelBuffer, ProtocolError, RawPose, STAGE_INITIALIZE, STAGE_LOAD,
};

/// The external tracking engine.
///
/// Implementations run exclusively on the worker thread.
pub trait TrackingEngine: Send + 'static {
    /// Prepare the engine for buffers of the given size and return the camera
    /// projection matrix serialized as a JSON array of 16 numbers.
    fn initialize(&mut self, buffer_width: u32, buffer_height: u32, calibration: &str) -> anyhow::Result<String>;

    /// Load marker descriptors, returning one entry per loaded candidate in
    /// the order given.
    fn load(&mut self, markers: &[String]) -> anyhow::Result<Vec<MarkerInfo>>;

    /// Track one frame. `None` means no marker was found.
    fn process(&mut self, frame: PixelBuffer) -> Option<Detection>;

    /// Messages the engine wants forwarded to the orchestrator's log.
    fn take_logs(&mut self) -> Vec<String> {
        Vec::new()
    }
}

impl TrackingEngine for Box<dyn TrackingEngine> {
    fn initialize(&mut self, buffer_width: u32, buffer_height: u32, calibration: &str) -> anyhow::Result<String> {
        (**self).initialize(buffer_width, buffer_height, calibration)
    }

    fn load(&mut self, markers: &[String]) -> anyhow::Result<Vec<MarkerInfo>> {
        (**self).load(markers)
    }

    fn process(&mut self, frame: PixelBuffer) -> Option<Detection> {
        (**self).process(frame)
    }

    fn take_logs(&mut self) -> Vec<String> {
        (**self).take_logs()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum WorkerError {
    #[error("tracking worker is busy; {0} command dropped")]
    Busy(&'static str),
    #[error("tracking worker has shut down")]
    Disconnected,
    #[error("failed to spawn tracking worker thread: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Queue sizing for one worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Capacity of the command queue (default: 3)
    pub command_capacity: usize,
    /// Capacity of the event queue (default: 64)
    pub event_capacity: usize,
    /// Name given to the worker thread
    pub thread_name: String,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            command_capacity: 3,
            event_capacity: 64,
            thread_name: "nft-tracking".into(),
        }
    }
}

/// Orchestrator-side handle to a running worker.
pub struct WorkerHandle {
    commands: Sender<Command>,
    events: Receiver<EngineEvent>,
    thread: Option<thread::JoinHandle<()>>,
}

/// Spawn a worker thread that owns `engine`.
pub fn spawn_worker<E: TrackingEngine>(engine: E, cfg: WorkerConfig) -> Result<WorkerHandle, WorkerError> {
    let (cmd_tx, cmd_rx) = bounded::<Command>(cfg.command_capacity.max(1));
    let (evt_tx, evt_rx) = bounded::<EngineEvent>(cfg.event_capacity.max(1));

    let thread = thread::Builder::new()
        .name(cfg.thread_name.clone())
        .spawn(move || run_worker(engine, cmd_rx, evt_tx))?;

    tracing::debug!(thread = %cfg.thread_name, "Tracking worker spawned");

    Ok(WorkerHandle {
        commands: cmd_tx,
        events: evt_rx,
        thread: Some(thread),
    })
}

impl WorkerHandle {
    /// Queue a command, waiting for room if the queue is full.
    ///
    /// Use this for lifecycle commands, which must never be dropped.
    pub fn send(&self, cmd: Command) -> Result<(), WorkerError> {
        self.commands.send(cmd).map_err(|_| WorkerError::Disconnected)
    }

    /// Queue a command without waiting. A full queue drops the command.
    pub fn try_send(&self, cmd: Command) -> Result<(), WorkerError> {
        match self.commands.try_send(cmd) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(cmd)) => Err(WorkerError::Busy(cmd.kind())),
            Err(TrySendError::Disconnected(_)) => Err(WorkerError::Disconnected),
        }
    }

    /// Next pending event, if any.
    pub fn try_recv(&self) -> Option<EngineEvent> {
        match self.events.try_recv() {
            Ok(event) => Some(event),
            Err(TryRecvError::Empty) | Err(TryRecvError::Disconnected) => None,
        }
    }

    /// Block for at most `timeout` waiting for the next event.
    pub fn recv_timeout(&self, timeout: std::time::Duration) -> Option<EngineEvent> {
        self.events.recv_timeout(timeout).ok()
    }

    /// Whether the worker thread is still running.
    pub fn is_alive(&self) -> bool {
        self.thread.as_ref().is_some_and(|t| !t.is_finished())
    }

    /// Stop the worker and wait for its thread to exit. Idempotent.
    pub fn shutdown(&mut self) {
        self.stop_and_join();
    }

    fn stop_and_join(&mut self) {
        let Some(thread) = self.thread.take() else {
            return;
        };

        // Events are drained while waiting so a worker blocked on a full
        // event queue can always make progress towards the shutdown command.
        let mut queued = false;
        while !thread.is_finished() {
            if !queued {
                match self.commands.try_send(Command::Shutdown) {
                    Ok(()) | Err(TrySendError::Disconnected(_)) => queued = true,
                    Err(TrySendError::Full(_)) => {}
                }
            }
            while self.events.try_recv().is_ok() {}
            thread::sleep(std::time::Duration::from_millis(1));
        }

        if thread.join().is_err() {
            tracing::error!("Tracking worker thread panicked");
        }
    }
}

impl Drop for WorkerHandle {
    fn drop(&mut self) {
        self.stop_and_join();
    }
}

fn run_worker<E: TrackingEngine>(mut engine: E, commands: Receiver<Command>, events: Sender<EngineEvent>) {
    let mut initialized = false;

    for cmd in commands.iter() {
        let mut out = Vec::with_capacity(2);

        match cmd {
            Command::Initialize {
                buffer_width,
                buffer_height,
                calibration,
            } => {
                out.push(EngineEvent::Log("Initializing...".into()));
                match engine.initialize(buffer_width, buffer_height, &calibration) {
                    Ok(projection) => {
                        initialized = true;
                        out.push(EngineEvent::Initialized(projection));
                    }
                    Err(e) => out.push(EngineEvent::Log(failure_log(STAGE_INITIALIZE, format!("{:#}", e)))),
                }
            }
            Command::Load(markers) => {
                if !initialized {
                    out.push(EngineEvent::Log(failure_log(STAGE_LOAD, "engine not initialized.")));
                } else {
                    match engine.load(&markers) {
                        Ok(infos) => out.push(EngineEvent::Loaded(infos)),
                        Err(e) => out.push(EngineEvent::Log(failure_log(STAGE_LOAD, format!("{:#}", e)))),
                    }
                }
            }
            Command::Process(frame) => {
                let result = if initialized { engine.process(frame) } else { None };
                out.push(match result {
                    Some(detection) => EngineEvent::Found(detection),
                    None => EngineEvent::Lost,
                });
            }
            Command::Shutdown => break,
        }

        // Engine logs precede the command's own result.
        let logs = engine.take_logs().into_iter().map(EngineEvent::Log);
        for event in logs.chain(out) {
            if events.send(event).is_err() {
                return;
            }
        }
    }

    tracing::debug!("Tracking worker exiting");
}
