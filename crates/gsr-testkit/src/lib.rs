//! Deterministic fixtures for exercising the pipeline without real video.
//!
//! - [`SyntheticVideo`]: a frame source whose regions are painted with
//!   pixel-coded values
//! - [`FixedLayout`]: one layout for one game version (and optionally one
//!   participant), regions in a row
//! - [`PixelCodeRecognizer`]: decodes the painted value back out of a crop
//! - [`RawStreamBuilder`] and the CSV / JSON loaders: raw streams from series

mod stream;
mod video;

pub use stream::{load_series_csv, write_raw_frames_json, RawStreamBuilder};
pub use video::{decode_pixel, encode_pixel, FixedLayout, PixelCodeRecognizer, SyntheticVideo};
