use anyhow::Result;
use gsr_capture::{SamplingPlan, VideoProps};

/// Dry-run of the frame sampler: which frames a capture run would read.
pub fn run_sample_plan(
    frame_count: u64,
    fps: f64,
    frames_per_sec: f64,
    first_frame: u64,
    last_frame: i64,
) -> Result<()> {
    let plan = SamplingPlan {
        first_frame,
        last_frame: u64::try_from(last_frame).ok(),
        frames_per_sec,
        ..SamplingPlan::default()
    };
    // Only frame_count and fps matter for the index walk.
    let props = VideoProps {
        frame_count,
        width: 0,
        height: 0,
        fps,
    };

    let stride = plan.stride(fps)?;
    let indices = plan.frame_indices(&props)?;

    let mut samples = 0u64;
    let mut first = None;
    let mut last = None;
    for f in indices {
        samples += 1;
        first.get_or_insert(f);
        last = Some(f);
    }

    println!("stride={}", stride);
    println!("samples={}", samples);
    if let (Some(first), Some(last)) = (first, last) {
        println!("first={}", first);
        println!("last={}", last);
    }
    Ok(())
}
