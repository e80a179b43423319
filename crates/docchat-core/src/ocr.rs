//! OCR layout lookup for scanned PDFs
//!
//! Scanned documents carry the OCR service's line geometry. Each polygon is
//! four corner points in page inches with a top-left origin.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::geometry::Rect;

pub const POINTS_PER_INCH: f64 = 72.0;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrLayout {
    #[serde(default)]
    pub pages: Vec<OcrPage>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OcrPage {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    #[serde(default)]
    pub lines: Vec<OcrLine>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrLine {
    pub content: String,
    #[serde(default)]
    pub polygon: Vec<f64>,
}

impl OcrLine {
    /// Axis-aligned bounds of the polygon in points (top-left origin)
    pub fn bounding_rect(&self) -> Option<Rect> {
        if self.polygon.len() < 8 {
            return None;
        }
        let xs = self.polygon[..8].iter().step_by(2).map(|v| v * POINTS_PER_INCH);
        let ys = self.polygon[1..8].iter().step_by(2).map(|v| v * POINTS_PER_INCH);

        let (x0, x1) = min_max(xs);
        let (y0, y1) = min_max(ys);
        Some(Rect::new(x0, y0, x1, y1))
    }
}

fn min_max(values: impl Iterator<Item = f64>) -> (f64, f64) {
    values.fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
        (lo.min(v), hi.max(v))
    })
}

/// Rectangles of every OCR line on `target_page` (1-indexed) whose text
/// appears verbatim in `cited`.
///
/// Zero-area rectangles are returned as-is.
pub fn locate(layout: &OcrLayout, cited: &str, target_page: u32) -> Vec<Rect> {
    let Some(page) = target_page
        .checked_sub(1)
        .and_then(|index| layout.pages.get(index as usize))
    else {
        warn!(
            target_page,
            pages = layout.pages.len(),
            "OCR layout has no such page"
        );
        return Vec::new();
    };

    page.lines
        .iter()
        .filter(|line| !line.content.is_empty() && cited.contains(line.content.as_str()))
        .filter_map(|line| {
            let rect = line.bounding_rect();
            if rect.is_none() {
                debug!(content = %line.content, "OCR line polygon has fewer than 8 coordinates");
            }
            rect
        })
        .collect()
}
