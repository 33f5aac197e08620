//! Common test utilities and helpers for the nft-overlay tests
//!
//! Provides a scriptable tracking engine, frame helpers and polling helpers
//! for driving a session to a given lifecycle state.

#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use nft_layout::{FrameView, Size};
use nft_overlay::session::{Lifecycle, TrackingSession};
use nft_worker::{Detection, MarkerInfo, PixelBuffer, RawPose, TrackingEngine};

/// Projection an engine might report for a 320x240 buffer.
pub const PROJECTION_JSON: &str =
    "[1.9,0,0,0,0,2.5,0,0,0.01,-0.02,-1.0001,-1,0,0,-0.2,0]";

/// What the engine saw, shared with the test.
#[derive(Debug, Default)]
pub struct Recorded {
    pub initialize: Option<(u32, u32, String)>,
    pub loaded: Vec<String>,
    pub frames: Vec<(u32, u32, usize)>,
}

/// Engine answering frames from a script. An exhausted script answers `lost`.
pub struct ScriptedEngine {
    pub recorded: Arc<Mutex<Recorded>>,
    pub results: VecDeque<Option<Detection>>,
    pub infos: Option<Vec<MarkerInfo>>,
    pub fail_initialize: bool,
    /// When set, every `process` call waits for one message first.
    pub gate: Option<mpsc::Receiver<()>>,
}

impl ScriptedEngine {
    pub fn new(results: impl IntoIterator<Item = Option<Detection>>) -> (Self, Arc<Mutex<Recorded>>) {
        let recorded = Arc::new(Mutex::new(Recorded::default()));
        (
            Self {
                recorded: recorded.clone(),
                results: results.into_iter().collect(),
                infos: None,
                fail_initialize: false,
                gate: None,
            },
            recorded,
        )
    }

    /// Report these infos from `load` instead of one default entry per marker.
    pub fn with_infos(mut self, infos: Vec<MarkerInfo>) -> Self {
        self.infos = Some(infos);
        self
    }

    pub fn failing_initialize(mut self) -> Self {
        self.fail_initialize = true;
        self
    }

    pub fn gated(mut self) -> (Self, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        self.gate = Some(rx);
        (self, tx)
    }
}

impl TrackingEngine for ScriptedEngine {
    fn initialize(&mut self, w: u32, h: u32, calibration: &str) -> anyhow::Result<String> {
        self.recorded.lock().unwrap().initialize = Some((w, h, calibration.to_string()));
        if self.fail_initialize {
            anyhow::bail!("camera parameters unreadable");
        }
        Ok(PROJECTION_JSON.to_string())
    }

    fn load(&mut self, markers: &[String]) -> anyhow::Result<Vec<MarkerInfo>> {
        self.recorded.lock().unwrap().loaded = markers.to_vec();
        Ok(self.infos.clone().unwrap_or_else(|| {
            markers
                .iter()
                .enumerate()
                .map(|(i, _)| info(i as i32, 720.0, 360.0, 72.0))
                .collect()
        }))
    }

    fn process(&mut self, frame: PixelBuffer) -> Option<Detection> {
        if let Some(gate) = &self.gate {
            let _ = gate.recv();
        }
        self.recorded
            .lock()
            .unwrap()
            .frames
            .push((frame.width, frame.height, frame.data.len()));
        self.results.pop_front().flatten()
    }
}

pub fn info(id: i32, width: f64, height: f64, dpi: f64) -> MarkerInfo {
    MarkerInfo { id, width, height, dpi }
}

/// Identity rotation with a translation along z.
pub fn pose_at_depth(z: f64) -> RawPose {
    let mut m = [0.0; 16];
    m[0] = 1.0;
    m[5] = 1.0;
    m[10] = 1.0;
    m[15] = 1.0;
    m[14] = z;
    RawPose::from_column_major(&m)
}

pub fn found(index: usize, z: f64) -> Option<Detection> {
    Some(Detection { index, pose: pose_at_depth(z) })
}

/// Owned RGBA8 frame of one colour.
pub struct TestFrame {
    pub data: Vec<u8>,
    pub size: Size,
}

impl TestFrame {
    pub fn solid(w: u32, h: u32, rgba: [u8; 4]) -> Self {
        Self {
            data: rgba.repeat(w as usize * h as usize),
            size: Size { w, h },
        }
    }

    pub fn view(&self) -> FrameView<'_> {
        FrameView { data: &self.data, size: self.size, stride: None }
    }
}

/// Drive without frames until the session reaches `state`.
pub fn drive_until(session: &mut TrackingSession, state: Lifecycle) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while session.lifecycle() != state {
        assert!(
            Instant::now() < deadline,
            "session stuck in {} waiting for {}",
            session.lifecycle(),
            state
        );
        session.drive(None).unwrap();
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Drive with `frame` until `answered` frame results have been applied.
pub fn drive_results(session: &mut TrackingSession, frame: &TestFrame, answered: u64) {
    let deadline = Instant::now() + Duration::from_secs(5);
    loop {
        let stats = session.stats();
        if stats.found + stats.lost >= answered {
            return;
        }
        assert!(Instant::now() < deadline, "only {} results after 5s", stats.found + stats.lost);
        session.drive(Some(frame.view())).unwrap();
        std::thread::sleep(Duration::from_millis(1));
    }
}

/// Drive without frames for a short while, for asserting that nothing advances.
pub fn drive_for(session: &mut TrackingSession, duration: Duration) {
    let deadline = Instant::now() + duration;
    while Instant::now() < deadline {
        session.drive(None).unwrap();
        std::thread::sleep(Duration::from_millis(2));
    }
}
