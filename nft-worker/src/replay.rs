// SPDX-License-Identifier: MIT
//! Replay engine: a [`TrackingEngine`] that plays back a recorded session.
//!
//! A recording is a JSON-lines file in the wire format of
//! [`crate::protocol`]. The first `initialized` and `loaded` events answer
//! `initialize` and `load`; `found`/`lost` events answer successive frames.
//! Blank lines are skipped, unknown kinds are ignored and malformed lines are
//! logged and dropped.

use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::{anyhow, Context, Result};

use crate::protocol::{decode_event, Detection, EngineEvent, MarkerInfo, PixelBuffer};
use crate::TrackingEngine;

pub struct ReplayEngine {
    projection: Option<String>,
    markers: Option<Vec<MarkerInfo>>,
    frames: Vec<Option<Detection>>,
    cursor: usize,
    looping: bool,
    pending_logs: VecDeque<String>,
}

impl ReplayEngine {
    /// Build a replay directly from decoded parts.
    pub fn new(
        projection: Option<String>,
        markers: Option<Vec<MarkerInfo>>,
        frames: Vec<Option<Detection>>,
    ) -> Self {
        Self {
            projection,
            markers,
            frames,
            cursor: 0,
            looping: false,
            pending_logs: VecDeque::new(),
        }
    }

    /// Restart from the first frame result once the recording is exhausted.
    pub fn looping(mut self, looping: bool) -> Self {
        self.looping = looping;
        self
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .with_context(|| format!("opening replay script {}", path.display()))?;
        Self::from_reader(BufReader::new(file))
    }

    pub fn from_reader(reader: impl BufRead) -> Result<Self> {
        let mut replay = Self::new(None, None, Vec::new());

        for (line_no, line) in reader.lines().enumerate() {
            let line = line.with_context(|| format!("reading replay line {}", line_no + 1))?;
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            match decode_event(trimmed) {
                Ok(Some(EngineEvent::Initialized(json))) if replay.projection.is_none() => {
                    replay.projection = Some(json);
                }
                Ok(Some(EngineEvent::Loaded(infos))) if replay.markers.is_none() => {
                    replay.markers = Some(infos);
                }
                Ok(Some(EngineEvent::Found(detection))) => replay.frames.push(Some(detection)),
                Ok(Some(EngineEvent::Lost)) => replay.frames.push(None),
                Ok(Some(EngineEvent::Log(text))) => replay.pending_logs.push_back(text),
                Ok(Some(other)) => {
                    tracing::debug!(line = line_no + 1, kind = other.kind(), "Ignoring repeated replay event");
                }
                Ok(None) => {
                    tracing::debug!(line = line_no + 1, "Ignoring unknown replay event kind");
                }
                Err(e) => {
                    tracing::warn!(line = line_no + 1, error = %e, "Skipping malformed replay line");
                }
            }
        }

        Ok(replay)
    }

    /// Number of recorded frame results.
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }
}

impl TrackingEngine for ReplayEngine {
    fn initialize(&mut self, buffer_width: u32, buffer_height: u32, calibration: &str) -> Result<String> {
        tracing::debug!(buffer_width, buffer_height, calibration, "Replay initialize");
        self.projection
            .clone()
            .ok_or_else(|| anyhow!("replay script has no 'initialized' event"))
    }

    fn load(&mut self, markers: &[String]) -> Result<Vec<MarkerInfo>> {
        let infos = self
            .markers
            .clone()
            .ok_or_else(|| anyhow!("replay script has no 'loaded' event"))?;
        if infos.len() != markers.len() {
            tracing::warn!(
                requested = markers.len(),
                recorded = infos.len(),
                "Replay marker count differs from requested candidates"
            );
        }
        Ok(infos)
    }

    fn process(&mut self, _frame: PixelBuffer) -> Option<Detection> {
        if self.cursor >= self.frames.len() {
            if !self.looping || self.frames.is_empty() {
                return None;
            }
            self.cursor = 0;
        }
        let result = self.frames[self.cursor].clone();
        self.cursor += 1;
        result
    }

    fn take_logs(&mut self) -> Vec<String> {
        self.pending_logs.drain(..).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    const SCRIPT: &str = r#"
{"type":"log","payload":"recorded on device A"}
{"type":"initialized","payload":"[1,0,0,0,0,1,0,0,0,0,1,0,0,0,0,1]"}
{"type":"loaded","payload":[{"id":0,"width":800,"height":600,"dpi":72}]}
{"type":"found","payload":{"index":0,"matrixGL_RH":[1,0,0,0,0,1,0,0,0,0,1,0,0,0,-500,1]}}
this line is garbage
{"type":"mystery","payload":1}
{"type":"lost","payload":null}
"#;

    fn frame() -> PixelBuffer {
        PixelBuffer::new(vec![0; 4], 1, 1)
    }

    #[test]
    fn parses_script_and_skips_bad_lines() {
        let mut engine = ReplayEngine::from_reader(Cursor::new(SCRIPT)).unwrap();
        assert_eq!(engine.frame_count(), 2);
        assert_eq!(engine.take_logs(), vec!["recorded on device A".to_string()]);
        assert!(engine.take_logs().is_empty());

        let proj = engine.initialize(320, 240, "camera_para.dat").unwrap();
        assert!(proj.starts_with('['));
        let infos = engine.load(&["a".into()]).unwrap();
        assert_eq!(infos[0].dpi, 72.0);

        let first = engine.process(frame()).unwrap();
        assert_eq!(first.index, 0);
        assert_eq!(first.pose.get(14), Some(-500.0));
        assert!(engine.process(frame()).is_none());
        // Exhausted, not looping.
        assert!(engine.process(frame()).is_none());
    }

    #[test]
    fn looping_restarts_the_recording() {
        let mut engine = ReplayEngine::from_reader(Cursor::new(SCRIPT)).unwrap().looping(true);
        assert!(engine.process(frame()).is_some());
        assert!(engine.process(frame()).is_none());
        assert!(engine.process(frame()).is_some());
    }

    #[test]
    fn loads_script_from_disk() {
        use std::io::Write;

        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SCRIPT.as_bytes()).unwrap();
        let engine = ReplayEngine::from_path(file.path()).unwrap();
        assert_eq!(engine.frame_count(), 2);

        assert!(ReplayEngine::from_path(file.path().with_extension("missing")).is_err());
    }

    #[test]
    fn missing_sections_fail_the_lifecycle_call() {
        let mut engine = ReplayEngine::new(None, None, Vec::new());
        assert!(engine.initialize(320, 240, "x").is_err());
        assert!(engine.load(&[]).is_err());
    }
}
