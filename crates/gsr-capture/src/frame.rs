use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::CaptureError;

/// Packed RGB8 image, row-major, no padding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    rgb: Vec<u8>,
}

impl Frame {
    pub fn new(width: u32, height: u32, rgb: Vec<u8>) -> Result<Self, CaptureError> {
        let expected = width as usize * height as usize * 3;
        if rgb.len() != expected {
            return Err(CaptureError::Source(format!(
                "frame buffer is {} bytes, expected {expected} for {width}x{height} RGB",
                rgb.len()
            )));
        }
        Ok(Self { width, height, rgb })
    }

    /// Single-colour frame.
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let pixels = width as usize * height as usize;
        Self {
            width,
            height,
            rgb: rgb.repeat(pixels),
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn as_rgb(&self) -> &[u8] {
        &self.rgb
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * 3;
        Some([self.rgb[idx], self.rgb[idx + 1], self.rgb[idx + 2]])
    }

    pub fn fill_region(&mut self, region: &Region, rgb: [u8; 3]) {
        for y in region.y..region.y.saturating_add(region.height).min(self.height) {
            for x in region.x..region.x.saturating_add(region.width).min(self.width) {
                let idx = (y as usize * self.width as usize + x as usize) * 3;
                self.rgb[idx..idx + 3].copy_from_slice(&rgb);
            }
        }
    }

    /// Copy out one region of interest.
    pub fn crop(&self, region: &Region) -> Result<Frame, CaptureError> {
        if !region.fits(self.width, self.height) {
            return Err(CaptureError::RegionOutOfBounds {
                field: None,
                region: *region,
                width: self.width,
                height: self.height,
            });
        }
        let mut rgb = Vec::with_capacity(region.area() * 3);
        for y in region.y..region.y + region.height {
            let row_start = (y as usize * self.width as usize + region.x as usize) * 3;
            let row_end = row_start + region.width as usize * 3;
            rgb.extend_from_slice(&self.rgb[row_start..row_end]);
        }
        Ok(Frame {
            width: region.width,
            height: region.height,
            rgb,
        })
    }

    /// Mean colour over the whole frame.
    pub fn mean_rgb(&self) -> [u8; 3] {
        let pixels = (self.width as u64 * self.height as u64).max(1);
        let mut sum = [0u64; 3];
        for px in self.rgb.chunks_exact(3) {
            for c in 0..3 {
                sum[c] += u64::from(px[c]);
            }
        }
        sum.map(|s| (s / pixels) as u8)
    }
}

/// Pixel rectangle in frame coordinates.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Region {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Region {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn area(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Non-empty and entirely inside a `frame_width` x `frame_height` frame.
    pub fn fits(&self, frame_width: u32, frame_height: u32) -> bool {
        self.width > 0
            && self.height > 0
            && self.x.checked_add(self.width).is_some_and(|r| r <= frame_width)
            && self.y.checked_add(self.height).is_some_and(|b| b <= frame_height)
    }
}

/// Named regions of interest for one game version and resolution.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Layout {
    regions: BTreeMap<String, Region>,
}

impl Layout {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_region<S: Into<String>>(mut self, field: S, region: Region) -> Self {
        self.regions.insert(field.into(), region);
        self
    }

    pub fn get(&self, field: &str) -> Option<&Region> {
        self.regions.get(field)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    /// Regions in field-name order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Region)> {
        self.regions.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Every region must fit inside the frame.
    pub fn validate(&self, width: u32, height: u32) -> Result<(), CaptureError> {
        for (field, region) in &self.regions {
            if !region.fits(width, height) {
                return Err(CaptureError::RegionOutOfBounds {
                    field: Some(field.clone()),
                    region: *region,
                    width,
                    height,
                });
            }
        }
        Ok(())
    }
}
