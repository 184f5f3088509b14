mod engine;
mod font;

use anyhow::Result;

use crate::pdf::RenderedPage;

pub use engine::{TesseractRecognizer, list_tesseract_languages};
pub use font::{FontData, ResolvedOverlayFont, resolve_overlay_font};

/// Pixel box in rasterized-page coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
pub struct BBoxPx {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl BBoxPx {
    pub fn from_edges(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            x: left,
            y: top,
            w: right.saturating_sub(left),
            h: bottom.saturating_sub(top),
        }
    }

    pub fn left(&self) -> u32 {
        self.x
    }

    pub fn top(&self) -> u32 {
        self.y
    }

    pub fn right(&self) -> u32 {
        self.x + self.w
    }

    pub fn bottom(&self) -> u32 {
        self.y + self.h
    }

    pub fn center_y(&self) -> f32 {
        (self.top() as f32 + self.bottom() as f32) * 0.5
    }
}

/// A line as reported by an OCR engine. Engines may omit the box.
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct RecognizedLine {
    pub text: String,
    pub bbox: Option<BBoxPx>,
}

impl RecognizedLine {
    pub fn new(text: impl Into<String>, bbox: Option<BBoxPx>) -> Self {
        Self {
            text: text.into(),
            bbox,
        }
    }
}

/// Bitmap in, recognized lines out. Calls block until the result is ready.
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, page: &RenderedPage) -> Result<Vec<RecognizedLine>>;
}

#[derive(Debug, Clone)]
pub(crate) struct OcrLine {
    pub(crate) text: String,
    pub(crate) bbox: BBoxPx,
    pub(crate) conf: f32,
}

impl From<OcrLine> for RecognizedLine {
    fn from(line: OcrLine) -> Self {
        RecognizedLine {
            text: line.text,
            bbox: Some(line.bbox),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn edges_round_trip_through_box() {
        let bbox = BBoxPx::from_edges(10, 20, 110, 60);
        assert_eq!(bbox.w, 100);
        assert_eq!(bbox.h, 40);
        assert_eq!(bbox.right(), 110);
        assert_eq!(bbox.bottom(), 60);
        assert_eq!(bbox.center_y(), 40.0);
    }

    #[test]
    fn inverted_edges_collapse_to_empty_box() {
        let bbox = BBoxPx::from_edges(50, 50, 40, 40);
        assert_eq!(bbox.w, 0);
        assert_eq!(bbox.h, 0);
    }
}
