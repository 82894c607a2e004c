//! Redaction geometry: detector boxes to fill rectangles
//!
//! Detector output lives in the coordinate space of the copy the backend
//! analyzed. [`compute_redactions`] scales each box back to the original
//! image, grows it by a proportional margin plus a fixed padding, rejects
//! boxes that would black out most of the picture and clamps the rest to the
//! canvas. The function is pure: same inputs, same rectangles.

use crate::config::RedactionConfig;
use crate::types::{BoundingBox, Detection};
use serde::{Deserialize, Serialize};

/// Tunables for [`compute_redactions`]
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RedactionParams {
    /// Fixed padding in pixels on every side
    pub padding: f64,
    /// Proportional margin on every side
    pub extra_margin: f64,
    /// Reject boxes wider than this fraction of the canvas
    pub max_width_ratio: f64,
    /// Reject boxes taller than this fraction of the canvas
    pub max_height_ratio: f64,
}

impl Default for RedactionParams {
    fn default() -> Self {
        Self::from(&RedactionConfig::default())
    }
}

impl From<&RedactionConfig> for RedactionParams {
    fn from(config: &RedactionConfig) -> Self {
        Self {
            padding: config.padding,
            extra_margin: config.extra_margin,
            max_width_ratio: config.max_width_ratio,
            max_height_ratio: config.max_height_ratio,
        }
    }
}

/// Axis-aligned rectangle in original-image pixel space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0.0 || self.height <= 0.0
    }

    /// Whether the rectangle lies inside `[0,width] x [0,height]`, up to float rounding
    pub fn is_within(&self, width: f64, height: f64) -> bool {
        const EPSILON: f64 = 1e-9;
        self.x >= 0.0
            && self.y >= 0.0
            && self.right() <= width + EPSILON
            && self.bottom() <= height + EPSILON
    }

    fn is_finite(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
    }

    /// Cut the far edges back to the canvas. The origin is assumed non-negative.
    fn clamp_to(self, canvas_width: f64, canvas_height: f64) -> Self {
        let x = self.x.min(canvas_width);
        let y = self.y.min(canvas_height);
        Self {
            x,
            y,
            width: self.width.min(canvas_width - x).max(0.0),
            height: self.height.min(canvas_height - y).max(0.0),
        }
    }

    /// Integer pixel cover: floor origin, ceil far edge, clamped to the canvas.
    /// `None` when nothing is left to fill.
    pub fn to_pixels(&self, canvas_width: u32, canvas_height: u32) -> Option<PixelRect> {
        let x0 = self.x.floor().clamp(0.0, canvas_width as f64) as u32;
        let y0 = self.y.floor().clamp(0.0, canvas_height as f64) as u32;
        let x1 = self.right().ceil().clamp(0.0, canvas_width as f64) as u32;
        let y1 = self.bottom().ceil().clamp(0.0, canvas_height as f64) as u32;

        if x1 <= x0 || y1 <= y0 {
            return None;
        }

        Some(PixelRect {
            x: x0,
            y: y0,
            width: x1 - x0,
            height: y1 - y0,
        })
    }
}

/// Rectangle snapped to whole pixels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Map detections onto opaque rectangles for a `canvas_width x canvas_height` image.
///
/// A non-finite or non-positive `scale` is treated as 1.0. Detections with a
/// missing or non-finite box are skipped. A box whose expanded size exceeds `max_width_ratio` of the canvas width or
/// `max_height_ratio` of its height is skipped, not clipped. The number of
/// returned rectangles is the redaction count.
pub fn compute_redactions(
    detections: &[Detection],
    scale: f64,
    canvas_width: u32,
    canvas_height: u32,
    params: &RedactionParams,
) -> Vec<Rect> {
    let canvas_w = canvas_width as f64;
    let canvas_h = canvas_height as f64;
    let scale = usable_scale(scale);

    detections
        .iter()
        .filter_map(|detection| detection.bbox.as_ref().and_then(well_formed))
        .filter_map(|(x, y, w, h)| {
            let (x, y, w, h) = (x * scale, y * scale, w * scale, h * scale);

            let margin_w = w * params.extra_margin;
            let margin_h = h * params.extra_margin;

            let expanded = Rect {
                x: (x - params.padding - margin_w).max(0.0),
                y: (y - params.padding - margin_h).max(0.0),
                width: w + params.padding * 2.0 + margin_w * 2.0,
                height: h + params.padding * 2.0 + margin_h * 2.0,
            };

            if !expanded.is_finite()
                || expanded.width > canvas_w * params.max_width_ratio
                || expanded.height > canvas_h * params.max_height_ratio
            {
                return None;
            }

            let clamped = expanded.clamp_to(canvas_w, canvas_h);
            (!clamped.is_empty()).then_some(clamped)
        })
        .collect()
}

/// Scale factor to apply, falling back to 1.0 for unusable values
pub fn usable_scale(scale: f64) -> f64 {
    if scale.is_finite() && scale > 0.0 {
        scale
    } else {
        1.0
    }
}

fn well_formed(bbox: &BoundingBox) -> Option<(f64, f64, f64, f64)> {
    let (x, y, w, h) = (bbox.x?, bbox.y?, bbox.width?, bbox.height?);
    if [x, y, w, h].iter().all(|v| v.is_finite()) && w >= 0.0 && h >= 0.0 {
        Some((x, y, w, h))
    } else {
        None
    }
}
