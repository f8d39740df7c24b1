use anyhow::{Context, Result};
use gsr_schemas::{FieldValue, FrameIndex, RawFrame};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Raw streams from per-field series. Sample `i` lands on frame
/// `first_frame + i * stride`.
#[derive(Clone, Debug)]
pub struct RawStreamBuilder {
    first_frame: FrameIndex,
    stride: u64,
    fps: f64,
    series: BTreeMap<String, Vec<Option<FieldValue>>>,
}

impl Default for RawStreamBuilder {
    fn default() -> Self {
        Self {
            first_frame: 0,
            stride: 1,
            fps: 10.0,
            series: BTreeMap::new(),
        }
    }
}

impl RawStreamBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn first_frame(mut self, frame: FrameIndex) -> Self {
        self.first_frame = frame;
        self
    }

    pub fn stride(mut self, stride: u64) -> Self {
        self.stride = stride.max(1);
        self
    }

    pub fn fps(mut self, fps: f64) -> Self {
        self.fps = fps;
        self
    }

    pub fn ints<S: Into<String>>(mut self, field: S, values: &[Option<i64>]) -> Self {
        self.series
            .insert(field.into(), values.iter().map(|v| v.map(FieldValue::Int)).collect());
        self
    }

    pub fn flags<S: Into<String>>(mut self, field: S, values: &[Option<bool>]) -> Self {
        self.series
            .insert(field.into(), values.iter().map(|v| v.map(FieldValue::Flag)).collect());
        self
    }

    pub fn values<S: Into<String>>(mut self, field: S, values: Vec<Option<FieldValue>>) -> Self {
        self.series.insert(field.into(), values);
        self
    }

    /// As many frames as the longest series; shorter ones read ABSENT.
    pub fn build(&self) -> Vec<RawFrame> {
        let len = self.series.values().map(Vec::len).max().unwrap_or(0);
        (0..len)
            .map(|i| {
                let frame = self.first_frame + i as u64 * self.stride;
                self.series.iter().fold(
                    RawFrame::new(frame, frame as f64 / self.fps),
                    |raw, (field, values)| raw.with_reading(field.clone(), values.get(i).cloned().flatten()),
                )
            })
            .collect()
    }
}

/// Load a raw stream from a CSV fixture: `frame,timestamp,<field>...`.
/// Empty cells are ABSENT; `true`/`false` are flags, integers are ints,
/// anything else is text.
pub fn load_series_csv(path: &Path) -> Result<Vec<RawFrame>> {
    let mut rdr = csv::Reader::from_path(path).with_context(|| format!("open series csv: {}", path.display()))?;
    let headers = rdr.headers().context("read series csv header")?.clone();
    if headers.len() < 2 || &headers[0] != "frame" || &headers[1] != "timestamp" {
        anyhow::bail!("series csv must start with frame,timestamp columns");
    }

    let mut out = Vec::new();
    for (line, rec) in rdr.records().enumerate() {
        let rec = rec.with_context(|| format!("read series csv row {}", line + 1))?;
        let frame: FrameIndex = rec[0].trim().parse().with_context(|| format!("parse frame on row {}", line + 1))?;
        let timestamp: f64 = rec[1]
            .trim()
            .parse()
            .with_context(|| format!("parse timestamp on row {}", line + 1))?;
        let mut raw = RawFrame::new(frame, timestamp);
        for (name, cell) in headers.iter().zip(rec.iter()).skip(2) {
            raw = raw.with_reading(name, parse_cell(cell));
        }
        out.push(raw);
    }
    Ok(out)
}

fn parse_cell(cell: &str) -> Option<FieldValue> {
    let cell = cell.trim();
    if cell.is_empty() {
        return None;
    }
    if let Ok(b) = cell.parse::<bool>() {
        return Some(FieldValue::Flag(b));
    }
    if let Ok(v) = cell.parse::<i64>() {
        return Some(FieldValue::Int(v));
    }
    Some(FieldValue::Text(cell.to_string()))
}

pub fn write_raw_frames_json(path: &Path, frames: &[RawFrame]) -> Result<()> {
    let json = serde_json::to_string_pretty(frames).context("serialize raw frames failed")?;
    fs::write(path, format!("{json}\n")).with_context(|| format!("write raw frames failed: {}", path.display()))?;
    Ok(())
}
