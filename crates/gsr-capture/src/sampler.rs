//! Frame sampling driver.
//!
//! Walks the video at a fixed stride, crops every layout region and asks the
//! recognizer about each crop, yielding one [`RawFrame`] per sampled frame.
//! Regions of one frame may be recognized concurrently; the scope join is
//! the barrier, so each record is complete before it is yielded.

use std::iter::StepBy;
use std::ops::Range;

use gsr_schemas::{FrameIndex, RawFrame};
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    CaptureError, CaptureSession, Frame, FrameSource, Layout, LayoutResolver, Recognition, Recognizer, VideoProps,
};

pub const DEFAULT_FRAMES_PER_SEC: f64 = 10.0;

#[derive(Clone, Debug, PartialEq)]
pub struct SamplingPlan {
    pub first_frame: FrameIndex,
    /// Exclusive. `None` runs to the end of the video.
    pub last_frame: Option<FrameIndex>,
    /// Target sampling rate; the stride is derived from the video's fps.
    pub frames_per_sec: f64,
    pub parallel_regions: bool,
}

impl Default for SamplingPlan {
    fn default() -> Self {
        Self {
            first_frame: 0,
            last_frame: None,
            frames_per_sec: DEFAULT_FRAMES_PER_SEC,
            parallel_regions: false,
        }
    }
}

impl SamplingPlan {
    /// Read `/sampling` from a merged config document. A negative
    /// `last_frame` means "to the end".
    pub fn from_config_json(config_json: &Value) -> Result<Self, CaptureError> {
        let mut plan = Self::default();
        let Some(sampling) = config_json.pointer("/sampling").filter(|v| !v.is_null()) else {
            return Ok(plan);
        };

        if let Some(v) = sampling.get("first_frame") {
            plan.first_frame = v
                .as_u64()
                .ok_or_else(|| CaptureError::InvalidPlan(format!("first_frame must be >= 0, got {v}")))?;
        }
        if let Some(v) = sampling.get("last_frame") {
            plan.last_frame = match v.as_i64() {
                Some(n) if n < 0 => None,
                Some(n) => Some(n as u64),
                None => {
                    return Err(CaptureError::InvalidPlan(format!(
                        "last_frame must be an integer, got {v}"
                    )))
                }
            };
        }
        if let Some(v) = sampling.get("frames_per_sec") {
            plan.frames_per_sec = v
                .as_f64()
                .ok_or_else(|| CaptureError::InvalidPlan(format!("frames_per_sec must be a number, got {v}")))?;
        }
        if let Some(v) = sampling.get("parallel_regions") {
            plan.parallel_regions = v.as_bool().unwrap_or(false);
        }
        Ok(plan)
    }

    /// Checks that do not depend on the video.
    pub fn validate(&self) -> Result<(), CaptureError> {
        if !(self.frames_per_sec.is_finite() && self.frames_per_sec > 0.0) {
            return Err(CaptureError::InvalidPlan(format!(
                "frames_per_sec must be positive, got {}",
                self.frames_per_sec
            )));
        }
        if let Some(last) = self.last_frame {
            if last <= self.first_frame {
                return Err(CaptureError::InvalidPlan(format!(
                    "end frame must be after start frame (start {}, end {last})",
                    self.first_frame
                )));
            }
        }
        Ok(())
    }

    /// Source frames between two samples for a video at `video_fps`.
    pub fn stride(&self, video_fps: f64) -> Result<u64, CaptureError> {
        self.validate()?;
        if !(video_fps.is_finite() && video_fps > 0.0) {
            return Err(CaptureError::InvalidPlan(format!(
                "video fps must be positive, got {video_fps}"
            )));
        }
        Ok(((video_fps / self.frames_per_sec).round() as u64).max(1))
    }

    /// Sampled frame indices for a video with these properties.
    pub fn frame_indices(&self, props: &VideoProps) -> Result<StepBy<Range<FrameIndex>>, CaptureError> {
        let stride = self.stride(props.fps)?;
        let last = self
            .last_frame
            .unwrap_or(props.frame_count)
            .min(props.frame_count);
        if last <= self.first_frame {
            return Err(CaptureError::InvalidPlan(format!(
                "end frame must be after start frame (start {}, end {last})",
                self.first_frame
            )));
        }
        Ok((self.first_frame..last).step_by(stride as usize))
    }

    /// `true` when `frame` lies inside the `[first_frame, last_frame)` window.
    pub fn contains(&self, frame: FrameIndex) -> bool {
        frame >= self.first_frame && self.last_frame.map_or(true, |last| frame < last)
    }
}

/// Iterator of raw records, one per sampled frame.
///
/// Fuses after the first error.
pub struct SampledStream<'a, S: FrameSource, R: Recognizer + ?Sized> {
    source: &'a mut S,
    recognizer: &'a R,
    layout: Layout,
    indices: StepBy<Range<FrameIndex>>,
    fps: f64,
    parallel: bool,
    failed: bool,
}

impl<'a, S: FrameSource, R: Recognizer + ?Sized> SampledStream<'a, S, R> {
    pub fn open(
        source: &'a mut S,
        resolver: &dyn LayoutResolver,
        session: &CaptureSession,
        recognizer: &'a R,
        plan: &SamplingPlan,
    ) -> Result<Self, CaptureError> {
        let props = source.props();
        let indices = plan.frame_indices(&props)?;
        let layout = resolver.resolve(session, props.width, props.height)?;
        layout.validate(props.width, props.height)?;

        info!(
            recognizer = recognizer.name(),
            game_version = %session.game_version,
            participant = ?session.participant,
            regions = layout.len(),
            stride = plan.stride(props.fps)?,
            samples = indices.clone().count(),
            "sampling video"
        );

        Ok(Self {
            source,
            recognizer,
            layout,
            indices,
            fps: props.fps,
            parallel: plan.parallel_regions,
            failed: false,
        })
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    fn sample(&mut self, index: FrameIndex) -> Result<RawFrame, CaptureError> {
        let frame = self.source.read_frame(index)?;
        let results = if self.parallel {
            recognize_parallel(&self.layout, self.recognizer, &frame)?
        } else {
            recognize_sequential(&self.layout, self.recognizer, &frame)?
        };

        let mut raw = RawFrame::new(index, index as f64 / self.fps);
        for (field, rec) in results {
            if let Some(c) = rec.confidence {
                raw = raw.with_confidence(field.clone(), c);
            }
            raw = raw.with_reading(field, rec.value);
        }
        debug!(frame = index, fields = raw.readings.len(), "frame sampled");
        Ok(raw)
    }
}

impl<S: FrameSource, R: Recognizer + ?Sized> Iterator for SampledStream<'_, S, R> {
    type Item = Result<RawFrame, CaptureError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let index = self.indices.next()?;
        let result = self.sample(index);
        if result.is_err() {
            self.failed = true;
        }
        Some(result)
    }
}

fn recognize_sequential<R: Recognizer + ?Sized>(
    layout: &Layout,
    recognizer: &R,
    frame: &Frame,
) -> Result<Vec<(String, Recognition)>, CaptureError> {
    layout
        .iter()
        .map(|(field, region)| {
            let crop = frame.crop(region)?;
            Ok((field.to_string(), recognizer.recognize(field, &crop)))
        })
        .collect()
}

/// One scoped thread per region. Results come back in layout (field-name)
/// order regardless of which thread finishes first.
fn recognize_parallel<R: Recognizer + ?Sized>(
    layout: &Layout,
    recognizer: &R,
    frame: &Frame,
) -> Result<Vec<(String, Recognition)>, CaptureError> {
    let crops = layout
        .iter()
        .map(|(field, region)| frame.crop(region).map(|c| (field, c)))
        .collect::<Result<Vec<_>, _>>()?;

    std::thread::scope(|s| {
        let handles: Vec<_> = crops
            .iter()
            .map(|(field, crop)| (*field, s.spawn(move || recognizer.recognize(field, crop))))
            .collect();
        handles
            .into_iter()
            .map(|(field, handle)| {
                handle
                    .join()
                    .map(|rec| (field.to_string(), rec))
                    .map_err(|_| CaptureError::Source(format!("recognizer panicked on field '{field}'")))
            })
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Region;
    use gsr_schemas::FieldValue;

    /// Every frame is a solid colour whose red channel is the frame index.
    struct CountingSource {
        props: VideoProps,
        reads: Vec<FrameIndex>,
    }

    impl FrameSource for CountingSource {
        fn props(&self) -> VideoProps {
            self.props
        }

        fn read_frame(&mut self, index: FrameIndex) -> Result<Frame, CaptureError> {
            if index >= self.props.frame_count {
                return Err(CaptureError::FrameOutOfRange {
                    index,
                    frame_count: self.props.frame_count,
                });
            }
            self.reads.push(index);
            Ok(Frame::filled(self.props.width, self.props.height, [index as u8, 0, 0]))
        }
    }

    /// Region "a" is shared; region "b" sits under the participant's
    /// portrait, one column per participant.
    struct TwoRegions;

    impl LayoutResolver for TwoRegions {
        fn resolve(&self, session: &CaptureSession, width: u32, height: u32) -> Result<Layout, CaptureError> {
            if session.game_version != "6.10" {
                return Err(CaptureError::UnknownLayout {
                    version: session.game_version.clone(),
                    width,
                    height,
                });
            }
            let column = match session.participant {
                Some(p @ 0..=1) => p * 2,
                other => {
                    return Err(CaptureError::UnknownParticipant {
                        version: session.game_version.clone(),
                        participant: other,
                    })
                }
            };
            Ok(Layout::new()
                .with_region("a", Region::new(0, 0, 2, 2))
                .with_region("b", Region::new(column, 2, 2, 2)))
        }
    }

    fn session() -> CaptureSession {
        CaptureSession::new("6.10").with_participant(1)
    }

    struct RedChannel;

    impl Recognizer for RedChannel {
        fn name(&self) -> &'static str {
            "red-channel"
        }

        fn recognize(&self, _field: &str, crop: &Frame) -> Recognition {
            Recognition::value(i64::from(crop.mean_rgb()[0])).with_confidence(0.9)
        }
    }

    fn source(frame_count: u64, fps: f64) -> CountingSource {
        CountingSource {
            props: VideoProps {
                frame_count,
                width: 4,
                height: 4,
                fps,
            },
            reads: Vec::new(),
        }
    }

    #[test]
    fn stride_derives_from_video_fps() {
        let plan = SamplingPlan::default();
        assert_eq!(plan.stride(30.0).unwrap(), 3);
        assert_eq!(plan.stride(60.0).unwrap(), 6);
        assert_eq!(plan.stride(5.0).unwrap(), 1);
        assert_eq!(plan.stride(25.0).unwrap(), 3);
        let bad = SamplingPlan {
            frames_per_sec: 0.0,
            ..SamplingPlan::default()
        };
        assert!(bad.stride(30.0).is_err());
    }

    #[test]
    fn empty_window_is_rejected() {
        let props = source(100, 30.0).props;
        let plan = SamplingPlan {
            first_frame: 50,
            last_frame: Some(50),
            ..SamplingPlan::default()
        };
        let err = plan.frame_indices(&props).unwrap_err();
        assert!(err.to_string().contains("end frame must be after start frame"));

        let past_end = SamplingPlan {
            first_frame: 100,
            ..SamplingPlan::default()
        };
        assert!(past_end.frame_indices(&props).is_err());
    }

    #[test]
    fn plan_reads_config_section() {
        let cfg = serde_json::json!({
            "sampling": { "first_frame": 30, "last_frame": -1, "frames_per_sec": 5 }
        });
        let plan = SamplingPlan::from_config_json(&cfg).unwrap();
        assert_eq!(plan.first_frame, 30);
        assert_eq!(plan.last_frame, None);
        assert_eq!(plan.frames_per_sec, 5.0);
        assert!(plan.contains(30));
        assert!(!plan.contains(29));

        let inverted = serde_json::json!({ "sampling": { "first_frame": 30, "last_frame": 10 } });
        assert!(SamplingPlan::from_config_json(&inverted).unwrap().validate().is_err());

        let bad = serde_json::json!({ "sampling": { "first_frame": -3 } });
        assert!(SamplingPlan::from_config_json(&bad).is_err());
        assert_eq!(
            SamplingPlan::from_config_json(&serde_json::json!({})).unwrap(),
            SamplingPlan::default()
        );
    }

    #[test]
    fn stream_samples_at_stride_and_builds_records() {
        let mut src = source(10, 30.0);
        let plan = SamplingPlan::default();
        let frames: Vec<RawFrame> = SampledStream::open(&mut src, &TwoRegions, &session(), &RedChannel, &plan)
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();

        let indices: Vec<_> = frames.iter().map(|f| f.frame).collect();
        assert_eq!(indices, vec![0, 3, 6, 9]);
        assert_eq!(frames[1].reading("a").value, Some(FieldValue::Int(3)));
        assert_eq!(frames[1].reading("b").confidence, Some(0.9));
        assert!((frames[1].timestamp - 0.1).abs() < 1e-9);
        assert_eq!(src.reads, vec![0, 3, 6, 9]);
    }

    #[test]
    fn parallel_regions_match_sequential() {
        let plan = SamplingPlan::default();
        let mut a = source(12, 30.0);
        let seq: Vec<_> = SampledStream::open(&mut a, &TwoRegions, &session(), &RedChannel, &plan)
            .unwrap()
            .collect();
        let par_plan = SamplingPlan {
            parallel_regions: true,
            ..plan
        };
        let mut b = source(12, 30.0);
        let par: Vec<_> = SampledStream::open(&mut b, &TwoRegions, &session(), &RedChannel, &par_plan)
            .unwrap()
            .collect();
        assert_eq!(seq, par);
    }

    #[test]
    fn unknown_version_fails_at_open() {
        let mut src = source(10, 30.0);
        let old = CaptureSession::new("1.0").with_participant(1);
        let err = SampledStream::open(&mut src, &TwoRegions, &old, &RedChannel, &SamplingPlan::default())
            .err()
            .unwrap();
        assert!(matches!(err, CaptureError::UnknownLayout { .. }));
    }

    #[test]
    fn participant_selects_player_regions() {
        let plan = SamplingPlan::default();
        let mut src = source(4, 30.0);
        let zero = CaptureSession::new("6.10").with_participant(0);
        let first = SampledStream::open(&mut src, &TwoRegions, &zero, &RedChannel, &plan).unwrap();
        assert_eq!(first.layout().get("b"), Some(&Region::new(0, 2, 2, 2)));

        let mut src = source(4, 30.0);
        let second = SampledStream::open(&mut src, &TwoRegions, &session(), &RedChannel, &plan).unwrap();
        assert_eq!(second.layout().get("b"), Some(&Region::new(2, 2, 2, 2)));
        assert_eq!(second.layout().get("a"), first.layout().get("a"));

        for missing in [CaptureSession::new("6.10"), CaptureSession::new("6.10").with_participant(7)] {
            let mut src = source(4, 30.0);
            let err = SampledStream::open(&mut src, &TwoRegions, &missing, &RedChannel, &plan)
                .err()
                .unwrap();
            assert!(matches!(err, CaptureError::UnknownParticipant { .. }), "{err}");
            assert!(src.reads.is_empty());
        }
    }

    #[test]
    fn source_error_fuses_stream() {
        struct Flaky(CountingSource);
        impl FrameSource for Flaky {
            fn props(&self) -> VideoProps {
                // Claims more frames than it can deliver.
                VideoProps {
                    frame_count: 20,
                    ..self.0.props
                }
            }
            fn read_frame(&mut self, index: FrameIndex) -> Result<Frame, CaptureError> {
                self.0.read_frame(index)
            }
        }

        let mut src = Flaky(source(5, 30.0));
        let plan = SamplingPlan::default();
        let results: Vec<_> = SampledStream::open(&mut src, &TwoRegions, &session(), &RedChannel, &plan)
            .unwrap()
            .collect();
        assert_eq!(results.len(), 3);
        assert!(results[0].is_ok() && results[1].is_ok());
        assert!(matches!(results[2], Err(CaptureError::FrameOutOfRange { index: 6, .. })));
    }
}
