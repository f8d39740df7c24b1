use std::collections::BTreeMap;

use gsr_capture::{
    CaptureError, CaptureSession, Frame, FrameSource, Layout, LayoutResolver, Recognition, Recognizer, Region,
    VideoProps,
};
use gsr_schemas::{FieldValue, FrameIndex};

// ---------------------------------------------------------------------------
// Pixel code
// ---------------------------------------------------------------------------

/// `[hi, lo, 255]` for a value in `0..=65535`; black means "nothing shown".
pub fn encode_pixel(value: Option<u16>) -> [u8; 3] {
    match value {
        Some(v) => {
            let [hi, lo] = v.to_be_bytes();
            [hi, lo, 255]
        }
        None => [0, 0, 0],
    }
}

/// Inverse of [`encode_pixel`]. The blue channel doubles as confidence.
pub fn decode_pixel(rgb: [u8; 3]) -> Option<(u16, f32)> {
    let [hi, lo, marker] = rgb;
    if marker == 0 {
        return None;
    }
    Some((u16::from_be_bytes([hi, lo]), f32::from(marker) / 255.0))
}

// ---------------------------------------------------------------------------
// Layout
// ---------------------------------------------------------------------------

/// Regions laid out left to right in field-name order, each `cell` pixels
/// square, for a single game version and optionally a single participant.
#[derive(Clone, Debug)]
pub struct FixedLayout {
    version: String,
    participant: Option<u32>,
    layout: Layout,
}

impl FixedLayout {
    pub const CELL: u32 = 8;

    pub fn row<S: AsRef<str>>(version: &str, fields: &[S]) -> Self {
        let mut names: Vec<&str> = fields.iter().map(|f| f.as_ref()).collect();
        names.sort_unstable();
        let layout = names.iter().enumerate().fold(Layout::new(), |layout, (i, name)| {
            layout.with_region(*name, Region::new(i as u32 * Self::CELL, 0, Self::CELL, Self::CELL))
        });
        Self {
            version: version.to_string(),
            participant: None,
            layout,
        }
    }

    /// Only resolve for sessions recording this participant.
    pub fn for_participant(mut self, participant: u32) -> Self {
        self.participant = Some(participant);
        self
    }

    /// Smallest frame that holds every region.
    pub fn frame_size(&self) -> (u32, u32) {
        ((self.layout.len() as u32).max(1) * Self::CELL, Self::CELL)
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }
}

impl LayoutResolver for FixedLayout {
    fn resolve(&self, session: &CaptureSession, width: u32, height: u32) -> Result<Layout, CaptureError> {
        if session.game_version != self.version {
            return Err(CaptureError::UnknownLayout {
                version: session.game_version.clone(),
                width,
                height,
            });
        }
        if self.participant.is_some() && session.participant != self.participant {
            return Err(CaptureError::UnknownParticipant {
                version: session.game_version.clone(),
                participant: session.participant,
            });
        }
        Ok(self.layout.clone())
    }
}

// ---------------------------------------------------------------------------
// Video
// ---------------------------------------------------------------------------

/// In-memory video: per field, the value shown on each source frame.
///
/// Scripts shorter than the video show nothing for the remaining frames.
#[derive(Clone, Debug)]
pub struct SyntheticVideo {
    layout: FixedLayout,
    fps: f64,
    frame_count: u64,
    script: BTreeMap<String, Vec<Option<u16>>>,
    /// Per (field, frame) blue-channel override, to fake low confidence.
    dim: BTreeMap<(String, FrameIndex), u8>,
    reads: u64,
}

impl SyntheticVideo {
    pub fn new(layout: FixedLayout, fps: f64, frame_count: u64) -> Self {
        Self {
            layout,
            fps,
            frame_count,
            script: BTreeMap::new(),
            dim: BTreeMap::new(),
            reads: 0,
        }
    }

    pub fn show<S: Into<String>>(mut self, field: S, values: Vec<Option<u16>>) -> Self {
        self.script.insert(field.into(), values);
        self
    }

    /// Paint `field` at `frame` with reduced confidence `marker / 255`.
    pub fn dim<S: Into<String>>(mut self, field: S, frame: FrameIndex, marker: u8) -> Self {
        self.dim.insert((field.into(), frame), marker.max(1));
        self
    }

    /// Frames decoded so far.
    pub fn reads(&self) -> u64 {
        self.reads
    }
}

impl FrameSource for SyntheticVideo {
    fn props(&self) -> VideoProps {
        let (width, height) = self.layout.frame_size();
        VideoProps {
            frame_count: self.frame_count,
            width,
            height,
            fps: self.fps,
        }
    }

    fn read_frame(&mut self, index: FrameIndex) -> Result<Frame, CaptureError> {
        if index >= self.frame_count {
            return Err(CaptureError::FrameOutOfRange {
                index,
                frame_count: self.frame_count,
            });
        }
        self.reads += 1;

        let (width, height) = self.layout.frame_size();
        let mut frame = Frame::filled(width, height, [0, 0, 0]);
        for (field, region) in self.layout.layout().iter() {
            let shown = self
                .script
                .get(field)
                .and_then(|s| s.get(index as usize).copied())
                .flatten();
            let mut rgb = encode_pixel(shown);
            if shown.is_some() {
                if let Some(marker) = self.dim.get(&(field.to_string(), index)) {
                    rgb[2] = *marker;
                }
            }
            frame.fill_region(region, rgb);
        }
        Ok(frame)
    }
}

// ---------------------------------------------------------------------------
// Recognizer
// ---------------------------------------------------------------------------

/// Reads the pixel code from the crop's mean colour.
#[derive(Clone, Copy, Debug, Default)]
pub struct PixelCodeRecognizer;

impl Recognizer for PixelCodeRecognizer {
    fn name(&self) -> &'static str {
        "pixel-code"
    }

    fn recognize(&self, _field: &str, crop: &Frame) -> Recognition {
        match decode_pixel(crop.mean_rgb()) {
            Some((v, confidence)) => Recognition {
                value: Some(FieldValue::Int(i64::from(v))),
                confidence: Some(confidence),
            },
            None => Recognition::unrecognized(),
        }
    }
}
