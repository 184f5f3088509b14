mod geom;
mod merge;
mod parse;
mod preprocess;
mod tesseract;
mod text;

use anyhow::{Context, Result};
use std::io::Write;
use tracing::debug;

use crate::ocr::{OcrLine, RecognizedLine, TextRecognizer};
use crate::pdf::RenderedPage;

pub use tesseract::list_tesseract_languages;

/// Runs the `tesseract` CLI over a page and returns one line per hOCR line segment.
#[derive(Debug, Clone)]
pub struct TesseractRecognizer {
    languages: String,
    psm: Vec<u32>,
    max_upscale: u32,
    dpi: u32,
}

impl TesseractRecognizer {
    /// Validates `languages` against the installed traineddata.
    pub fn new(languages: &str, psm: &[u32], max_upscale: u32, dpi: u32) -> Result<Self> {
        let languages = tesseract::normalize_ocr_languages(languages)?;
        let psm = if psm.is_empty() {
            vec![4]
        } else {
            psm.to_vec()
        };
        Ok(Self {
            languages,
            psm,
            max_upscale: max_upscale.max(1),
            dpi: dpi.max(1),
        })
    }

    pub fn languages(&self) -> &str {
        &self.languages
    }

    fn extract_lines(&self, page: &RenderedPage) -> Result<Vec<OcrLine>> {
        let (width, height) = page.image.dimensions();
        let scale = preprocess::ocr_scale(width, self.max_upscale);

        let mut lines = Vec::new();
        let variants = preprocess::preprocess_for_ocr_variants(&page.image, scale);
        for ocr_image in variants {
            let mut tmp = tempfile::Builder::new()
                .suffix(".png")
                .tempfile()
                .with_context(|| "failed to create temp file for OCR")?;
            ocr_image
                .write_to(&mut tmp, image::ImageFormat::Png)
                .with_context(|| "failed to write temp image for OCR")?;
            tmp.flush().ok();

            let dpi = self.dpi * scale;
            for psm in &self.psm {
                let hocr = tesseract::run_tesseract_hocr(tmp.path(), &self.languages, *psm, dpi)?;
                let mut parsed = parse::parse_hocr_lines(&hocr)?;
                if parsed.is_empty() {
                    let tsv =
                        tesseract::run_tesseract_tsv(tmp.path(), &self.languages, *psm, dpi)?;
                    parsed = parse::parse_tsv_lines(&tsv)?;
                }
                lines = merge::merge_lines(lines, parsed);
            }
        }
        if scale > 1 {
            lines = merge::scale_lines(lines, scale as f32);
        }
        lines = merge::filter_lines(lines, width, height);
        lines = merge::suppress_overlaps(lines);
        debug!(
            page = page.number,
            lines = lines.len(),
            scale,
            "tesseract finished"
        );
        Ok(lines)
    }
}

impl TextRecognizer for TesseractRecognizer {
    fn recognize(&self, page: &RenderedPage) -> Result<Vec<RecognizedLine>> {
        let lines = self
            .extract_lines(page)
            .with_context(|| format!("ocr failed on page {}", page.number))?;
        Ok(lines.into_iter().map(RecognizedLine::from).collect())
    }
}
