//! Capability traits for the collaborators the sampler drives.
//!
//! Each trait is the narrowest interface the pipeline needs. Decoding,
//! calibration and recognition all live behind them.

use std::fmt;

use gsr_schemas::{FieldValue, FrameIndex};
use serde_json::Value;

use crate::{Frame, Layout, Region};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct VideoProps {
    pub frame_count: u64,
    pub width: u32,
    pub height: u32,
    pub fps: f64,
}

pub trait FrameSource {
    fn props(&self) -> VideoProps;

    fn read_frame(&mut self, index: FrameIndex) -> Result<Frame, CaptureError>;
}

pub const DEFAULT_GAME_VERSION: &str = "6.10";

/// Which recording is being read. The game version picks the calibration;
/// the participant picks the player-specific regions inside it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CaptureSession {
    pub game_version: String,
    pub participant: Option<u32>,
}

impl Default for CaptureSession {
    fn default() -> Self {
        Self::new(DEFAULT_GAME_VERSION)
    }
}

impl CaptureSession {
    pub fn new(game_version: impl Into<String>) -> Self {
        Self {
            game_version: game_version.into(),
            participant: None,
        }
    }

    pub fn with_participant(mut self, participant: u32) -> Self {
        self.participant = Some(participant);
        self
    }

    /// Read `/session` from a merged config document.
    pub fn from_config_json(config_json: &Value) -> Result<Self, CaptureError> {
        let mut session = Self::default();
        let Some(section) = config_json.pointer("/session").filter(|v| !v.is_null()) else {
            return Ok(session);
        };

        if let Some(v) = section.get("game_version") {
            session.game_version = match v {
                Value::String(s) if !s.trim().is_empty() => s.trim().to_string(),
                // YAML reads an unquoted 6.10 as a float.
                Value::Number(n) => n.to_string(),
                _ => {
                    return Err(CaptureError::InvalidSession(format!(
                        "game_version must be a non-empty string, got {v}"
                    )))
                }
            };
        }
        match section.get("participant") {
            None | Some(Value::Null) => {}
            Some(v) => {
                let id = v
                    .as_u64()
                    .and_then(|n| u32::try_from(n).ok())
                    .ok_or_else(|| {
                        CaptureError::InvalidSession(format!("participant must be a non-negative integer, got {v}"))
                    })?;
                session.participant = Some(id);
            }
        }
        Ok(session)
    }
}

/// Calibration lookup: session (game version, participant) + resolution to
/// regions of interest.
pub trait LayoutResolver {
    fn resolve(&self, session: &CaptureSession, width: u32, height: u32) -> Result<Layout, CaptureError>;
}

/// One recognizer answer. `value: None` means "unrecognized".
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Recognition {
    pub value: Option<FieldValue>,
    pub confidence: Option<f32>,
}

impl Recognition {
    pub fn unrecognized() -> Self {
        Self::default()
    }

    pub fn value<V: Into<FieldValue>>(value: V) -> Self {
        Self {
            value: Some(value.into()),
            confidence: None,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// Per-frame recognizer. Stateless across frames; may run on several
/// regions of one frame at once.
pub trait Recognizer: Send + Sync {
    fn name(&self) -> &'static str;

    fn recognize(&self, field: &str, crop: &Frame) -> Recognition;
}

#[derive(Clone, Debug, PartialEq)]
pub enum CaptureError {
    /// Frame index past the end of the video.
    FrameOutOfRange { index: FrameIndex, frame_count: u64 },
    RegionOutOfBounds {
        field: Option<String>,
        region: Region,
        width: u32,
        height: u32,
    },
    /// No calibration for this game version / resolution.
    UnknownLayout { version: String, width: u32, height: u32 },
    /// Layout has player-specific regions and the session names no
    /// participant, or one it has no regions for.
    UnknownParticipant { version: String, participant: Option<u32> },
    InvalidSession(String),
    InvalidPlan(String),
    /// Decoder or I/O failure inside the frame source.
    Source(String),
}

impl fmt::Display for CaptureError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureError::FrameOutOfRange { index, frame_count } => {
                write!(f, "frame {index} out of range (video has {frame_count} frames)")
            }
            CaptureError::RegionOutOfBounds {
                field,
                region,
                width,
                height,
            } => {
                let Region {
                    x,
                    y,
                    width: w,
                    height: h,
                } = region;
                match field {
                    Some(name) => write!(
                        f,
                        "region for '{name}' ({x},{y} {w}x{h}) falls outside {width}x{height} frame"
                    ),
                    None => write!(
                        f,
                        "region ({x},{y} {w}x{h}) falls outside {width}x{height} frame"
                    ),
                }
            }
            CaptureError::UnknownLayout {
                version,
                width,
                height,
            } => write!(f, "no layout for version {version} at {width}x{height}"),
            CaptureError::UnknownParticipant {
                version,
                participant: Some(p),
            } => write!(f, "no player regions for participant {p} in version {version}"),
            CaptureError::UnknownParticipant {
                version,
                participant: None,
            } => write!(f, "version {version} layout needs a participant id"),
            CaptureError::InvalidSession(msg) => write!(f, "invalid session: {msg}"),
            CaptureError::InvalidPlan(msg) => write!(f, "invalid sampling plan: {msg}"),
            CaptureError::Source(msg) => write!(f, "frame source error: {msg}"),
        }
    }
}

impl std::error::Error for CaptureError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_reads_config_section() {
        let cfg = serde_json::json!({ "session": { "game_version": "7.02", "participant": 4 } });
        let session = CaptureSession::from_config_json(&cfg).unwrap();
        assert_eq!(session, CaptureSession::new("7.02").with_participant(4));

        let unquoted = serde_json::json!({ "session": { "game_version": 6.1 } });
        assert_eq!(CaptureSession::from_config_json(&unquoted).unwrap().game_version, "6.1");

        let empty = CaptureSession::from_config_json(&serde_json::json!({})).unwrap();
        assert_eq!(empty.game_version, DEFAULT_GAME_VERSION);
        assert_eq!(empty.participant, None);
    }

    #[test]
    fn bad_participant_is_invalid_session() {
        for bad in [serde_json::json!(-1), serde_json::json!("four"), serde_json::json!(5_000_000_000u64)] {
            let cfg = serde_json::json!({ "session": { "participant": bad } });
            let err = CaptureSession::from_config_json(&cfg).unwrap_err();
            assert!(matches!(err, CaptureError::InvalidSession(_)), "{err}");
        }
        let blank = serde_json::json!({ "session": { "game_version": " " } });
        assert!(CaptureSession::from_config_json(&blank).is_err());
    }
}
