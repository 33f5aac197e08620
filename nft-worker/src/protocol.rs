// SPDX-License-Identifier: MIT
//! # Worker Message Protocol
//!
//! Message kinds exchanged between the orchestrator and the tracking engine,
//! plus a JSON wire codec for engines that live behind a serialized boundary
//! (a subprocess, a recorded session, a browser worker).
//!
//! ## Wire Format
//!
//! Every engine event is a single JSON object:
//!
//! ```text
//! {"type": "log",         "payload": "Initializing..."}
//! {"type": "initialized", "payload": "[1.9,0,0,0, ...]"}
//! {"type": "loaded",      "payload": [{"id":0,"width":893,"height":1117,"dpi":120}]}
//! {"type": "found",       "payload": {"index":0,"matrixGL_RH":{"0":1.0,"1":0.0, ...}}}
//! {"type": "lost",        "payload": null}
//! ```
//!
//! `matrixGL_RH` may be a dense array or a sparse object keyed by element
//! index. Sparse keys must be canonical decimal indices (`"1"`, never `"01"`
//! or `"+1"`) and may not repeat. Unknown `type`s decode to `Ok(None)` and
//! are meant to be ignored; malformed payloads of known types are errors.
//!
//! A failed `initialize` or `load` is reported as a `log` event whose text
//! starts with `Error during <stage>: `; see [`parse_failure_log`].

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;

const FAILURE_PREFIX: &str = "Error during ";

/// Lifecycle stage name used in failure logs for `initialize`.
pub const STAGE_INITIALIZE: &str = "initialize";
/// Lifecycle stage name used in failure logs for `load`.
pub const STAGE_LOAD: &str = "load markers";

/// Log text reporting that `stage` failed.
pub fn failure_log(stage: &str, reason: impl fmt::Display) -> String {
    format!("{FAILURE_PREFIX}{stage}: {reason}")
}

/// Split a log produced by [`failure_log`] into its stage and reason.
/// Any other log text yields `None`.
pub fn parse_failure_log(text: &str) -> Option<(&'static str, &str)> {
    let rest = text.strip_prefix(FAILURE_PREFIX)?;
    [STAGE_INITIALIZE, STAGE_LOAD]
        .into_iter()
        .find_map(|stage| rest.strip_prefix(stage)?.strip_prefix(": ").map(|reason| (stage, reason)))
}

/// Owned RGBA8 processing buffer. Moving it into [`Command::Process`] hands
/// the pixels to the worker; the sender no longer has access to them.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelBuffer {
    pub data: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

impl PixelBuffer {
    pub fn new(data: Vec<u8>, width: u32, height: u32) -> Self {
        Self { data, width, height }
    }
}

/// Physical description of one loaded marker candidate.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MarkerInfo {
    pub id: i32,
    /// Width of the training image, in pixels
    pub width: f64,
    /// Height of the training image, in pixels
    pub height: f64,
    /// Resolution the training image was prepared at
    pub dpi: f64,
}

/// Pose values as reported by the engine: element index → value.
///
/// Engines are not required to report every element, so this stays sparse
/// until the pose applier validates it into a full 4×4 matrix.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "PoseRepr", into = "PoseRepr")]
pub struct RawPose(pub BTreeMap<usize, f64>);

impl RawPose {
    pub fn from_column_major(values: &[f64; 16]) -> Self {
        Self(values.iter().copied().enumerate().collect())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<f64> {
        self.0.get(&index).copied()
    }
}

#[derive(Serialize, Deserialize)]
#[serde(untagged)]
enum PoseRepr {
    Dense(Vec<f64>),
    Sparse(SparseEntries),
}

/// Sparse pose entries in wire order. Repeated keys are kept so they can be
/// rejected instead of silently overwriting each other.
struct SparseEntries(Vec<(String, f64)>);

impl<'de> Deserialize<'de> for SparseEntries {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct EntriesVisitor;

        impl<'de> Visitor<'de> for EntriesVisitor {
            type Value = SparseEntries;

            fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str("a map of matrix element index to number")
            }

            fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
                let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(16).min(64));
                while let Some(entry) = map.next_entry::<String, f64>()? {
                    entries.push(entry);
                }
                Ok(SparseEntries(entries))
            }
        }

        deserializer.deserialize_map(EntriesVisitor)
    }
}

impl Serialize for SparseEntries {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_map(self.0.iter().map(|(k, v)| (k, v)))
    }
}

impl TryFrom<PoseRepr> for RawPose {
    type Error = String;

    fn try_from(repr: PoseRepr) -> Result<Self, Self::Error> {
        match repr {
            PoseRepr::Dense(values) => Ok(RawPose(values.into_iter().enumerate().collect())),
            PoseRepr::Sparse(SparseEntries(entries)) => {
                let mut pose = BTreeMap::new();
                for (key, value) in entries {
                    let index = key
                        .parse::<usize>()
                        .ok()
                        .filter(|i| i.to_string() == key)
                        .ok_or_else(|| format!("pose key '{}' is not an element index", key))?;
                    if pose.insert(index, value).is_some() {
                        return Err(format!("pose element {} is given more than once", index));
                    }
                }
                Ok(RawPose(pose))
            }
        }
    }
}

impl From<RawPose> for PoseRepr {
    fn from(pose: RawPose) -> Self {
        let dense = pose.0.keys().copied().eq(0..pose.0.len());
        if dense {
            PoseRepr::Dense(pose.0.into_values().collect())
        } else {
            PoseRepr::Sparse(SparseEntries(
                pose.0.into_iter().map(|(k, v)| (k.to_string(), v)).collect(),
            ))
        }
    }
}

/// One successful detection for the frame just processed.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Position in the flattened candidate list sent with [`Command::Load`]
    pub index: usize,
    pub pose: RawPose,
}

/// Orchestrator → engine.
#[derive(Debug)]
pub enum Command {
    Initialize {
        buffer_width: u32,
        buffer_height: u32,
        /// Opaque camera-parameter asset reference
        calibration: String,
    },
    Load(Vec<String>),
    Process(PixelBuffer),
    Shutdown,
}

impl Command {
    pub fn kind(&self) -> &'static str {
        match self {
            Command::Initialize { .. } => "initialize",
            Command::Load(_) => "load",
            Command::Process(_) => "process",
            Command::Shutdown => "shutdown",
        }
    }
}

/// Engine → orchestrator.
#[derive(Debug, Clone, PartialEq)]
pub enum EngineEvent {
    Log(String),
    /// Serialized 4×4 projection matrix computed against the buffer size
    Initialized(String),
    /// Metadata per loaded candidate, in flattened candidate order
    Loaded(Vec<MarkerInfo>),
    Found(Detection),
    Lost,
}

impl EngineEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            EngineEvent::Log(_) => "log",
            EngineEvent::Initialized(_) => "initialized",
            EngineEvent::Loaded(_) => "loaded",
            EngineEvent::Found(_) => "found",
            EngineEvent::Lost => "lost",
        }
    }

    /// Whether this event answers a `Process` command.
    pub fn is_frame_result(&self) -> bool {
        matches!(self, EngineEvent::Found(_) | EngineEvent::Lost)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("invalid message envelope: {0}")]
    Envelope(#[source] serde_json::Error),
    #[error("malformed '{kind}' payload: {source}")]
    Payload {
        kind: &'static str,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Serialize, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    payload: Value,
}

#[derive(Serialize, Deserialize)]
struct FoundPayload {
    index: usize,
    #[serde(rename = "matrixGL_RH")]
    matrix_gl_rh: RawPose,
}

/// Initialized payloads are usually a JSON string holding the matrix; some
/// engines send the array itself.
#[derive(Deserialize)]
#[serde(untagged)]
enum InitializedPayload {
    Text(String),
    Matrix(Vec<f64>),
}

/// Payload of a known kind, decoded straight from the message text so the
/// payload's own structure (including repeated keys) is seen as sent.
#[derive(Deserialize)]
struct Typed<T> {
    payload: T,
}

fn typed_payload<T: serde::de::DeserializeOwned>(text: &str, kind: &'static str) -> Result<T, ProtocolError> {
    serde_json::from_str::<Typed<T>>(text)
        .map(|typed| typed.payload)
        .map_err(|source| ProtocolError::Payload { kind, source })
}

/// Decode one wire message. `Ok(None)` means the kind is not recognized.
pub fn decode_event(text: &str) -> Result<Option<EngineEvent>, ProtocolError> {
    let envelope: Envelope = serde_json::from_str(text).map_err(ProtocolError::Envelope)?;

    let event = match envelope.kind.as_str() {
        "log" => EngineEvent::Log(match envelope.payload {
            Value::String(s) => s,
            other => other.to_string(),
        }),
        "initialized" => EngineEvent::Initialized(match typed_payload(text, "initialized")? {
            InitializedPayload::Text(s) => s,
            InitializedPayload::Matrix(m) => Value::from(m).to_string(),
        }),
        "loaded" => EngineEvent::Loaded(typed_payload(text, "loaded")?),
        "found" => {
            let found: FoundPayload = typed_payload(text, "found")?;
            EngineEvent::Found(Detection {
                index: found.index,
                pose: found.matrix_gl_rh,
            })
        }
        "lost" => EngineEvent::Lost,
        _ => return Ok(None),
    };

    Ok(Some(event))
}

/// Encode an event in the wire format accepted by [`decode_event`].
pub fn encode_event(event: &EngineEvent) -> Result<String, ProtocolError> {
    let payload = match event {
        EngineEvent::Log(s) | EngineEvent::Initialized(s) => Value::String(s.clone()),
        EngineEvent::Loaded(infos) => serde_json::to_value(infos)
            .map_err(|source| ProtocolError::Payload { kind: "loaded", source })?,
        EngineEvent::Found(d) => serde_json::to_value(FoundPayload {
            index: d.index,
            matrix_gl_rh: d.pose.clone(),
        })
        .map_err(|source| ProtocolError::Payload { kind: "found", source })?,
        EngineEvent::Lost => Value::Null,
    };

    serde_json::to_string(&Envelope {
        kind: event.kind().to_string(),
        payload,
    })
    .map_err(ProtocolError::Envelope)
}
