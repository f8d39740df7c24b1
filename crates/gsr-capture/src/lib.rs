//! gsr-capture
//!
//! Capture boundary: frame source, layout and recognizer capabilities, and
//! the sampler that turns them into a raw state stream.
//!
//! This crate defines **only** the narrow interfaces and the sampling
//! driver. No video decoding, no OCR, no calibration tables belong here.

mod frame;
mod sampler;
mod source;

pub use frame::{Frame, Layout, Region};
pub use sampler::{SampledStream, SamplingPlan, DEFAULT_FRAMES_PER_SEC};
pub use source::{
    CaptureError, CaptureSession, FrameSource, LayoutResolver, Recognition, Recognizer, VideoProps,
    DEFAULT_GAME_VERSION,
};
