use anyhow::{Context, Result, anyhow};
use futures_util::stream::{self, StreamExt, TryStreamExt};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info};

use crate::debug::OcrDebugConfig;
use crate::form::locator_labels;
use crate::locate::{PageLabelIndex, locate_labels};
use crate::ocr::{RecognizedLine, TextRecognizer};
use crate::overlay::{OverlayRenderer, plan_overlay};
use crate::pdf::{PageRasterizer, RenderedPage, encode_png, images_to_pdf};
use crate::profile::Profile;

pub const PDF_TITLE: &str = "form_filled";

/// What happened on one page of a fill.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageSummary {
    pub number: usize,
    pub labels_found: usize,
    pub texts_drawn: usize,
    pub marks_drawn: usize,
}

#[derive(Debug, Clone)]
pub struct FilledPdf {
    pub bytes: Vec<u8>,
    pub pages: Vec<PageSummary>,
}

/// The whole fill: rasterize, locate labels, draw the overlay, reassemble.
pub struct Filler<R, T> {
    rasterizer: Arc<R>,
    recognizer: Arc<T>,
    renderer: OverlayRenderer,
    jobs: usize,
}

impl<R, T> Filler<R, T>
where
    R: PageRasterizer + 'static,
    T: TextRecognizer + 'static,
{
    pub fn new(rasterizer: R, recognizer: T, renderer: OverlayRenderer) -> Self {
        Self {
            rasterizer: Arc::new(rasterizer),
            recognizer: Arc::new(recognizer),
            renderer,
            jobs: 1,
        }
    }

    /// How many pages may be in OCR at once. Results keep page order regardless.
    pub fn with_jobs(mut self, jobs: usize) -> Self {
        self.jobs = jobs.max(1);
        self
    }

    /// Any rasterizer, OCR or encoding failure aborts the whole fill.
    pub async fn fill(
        &self,
        pdf_bytes: &[u8],
        profile: &Profile,
        debug: Option<&OcrDebugConfig>,
    ) -> Result<FilledPdf> {
        let rasterizer = Arc::clone(&self.rasterizer);
        let bytes = pdf_bytes.to_vec();
        let pages = tokio::task::spawn_blocking(move || rasterizer.rasterize(&bytes))
            .await
            .with_context(|| "rasterizer task failed")??;
        if pages.is_empty() {
            return Err(anyhow!("no pages found in pdf"));
        }
        info!(pages = pages.len(), jobs = self.jobs, "rasterized pdf");

        let located = self.locate_pages(pages).await?;

        let mut summaries = Vec::with_capacity(located.len());
        let mut images = Vec::with_capacity(located.len());
        for (page, lines, index) in located {
            if let Some(debug) = debug {
                debug.write_page(&self.renderer, &page, &lines, &index)?;
            }
            let plan = plan_overlay(&index, profile);
            let drawn = self
                .renderer
                .draw(&page.image, &plan)
                .with_context(|| format!("failed to draw overlay on page {}", page.number))?;
            images.push(encode_png(&drawn)?);

            let summary = PageSummary {
                number: page.number,
                labels_found: index.len(),
                texts_drawn: plan.texts.len(),
                marks_drawn: plan.marks.len(),
            };
            debug!(
                page = summary.number,
                labels = summary.labels_found,
                texts = summary.texts_drawn,
                marks = summary.marks_drawn,
                "page filled"
            );
            summaries.push(summary);
        }

        let bytes = images_to_pdf(&images, PDF_TITLE)?;
        Ok(FilledPdf {
            bytes,
            pages: summaries,
        })
    }

    async fn locate_pages(
        &self,
        pages: Vec<RenderedPage>,
    ) -> Result<Vec<(RenderedPage, Vec<RecognizedLine>, PageLabelIndex)>> {
        let labels = Arc::new(locator_labels());
        // Stops at the first failed page; later pages never reach OCR.
        stream::iter(pages)
            .map(|page| {
                let recognizer = Arc::clone(&self.recognizer);
                let labels = Arc::clone(&labels);
                async move {
                    let number = page.number;
                    tokio::task::spawn_blocking(move || {
                        let lines = recognizer.recognize(&page)?;
                        let index = locate_labels(&lines, &labels);
                        Ok::<_, anyhow::Error>((page, lines, index))
                    })
                    .await
                    .with_context(|| format!("ocr task failed on page {}", number))?
                }
            })
            .buffered(self.jobs)
            .try_collect()
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::form::INTEREST_ROW;
    use crate::ocr::BBoxPx;
    use crate::overlay::OverlayStyle;
    use crate::test_util::{blank_page, media_box, sample_profile};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeRasterizer {
        sizes: Vec<(u32, u32)>,
    }

    impl PageRasterizer for FakeRasterizer {
        fn rasterize(&self, _pdf_bytes: &[u8]) -> Result<Vec<RenderedPage>> {
            Ok(self
                .sizes
                .iter()
                .enumerate()
                .map(|(idx, (w, h))| blank_page(idx + 1, *w, *h))
                .collect())
        }
    }

    /// Returns the same lines for every page and counts how often it ran.
    struct FakeRecognizer {
        lines: Vec<RecognizedLine>,
        fail_on: Option<usize>,
        calls: Arc<AtomicUsize>,
    }

    impl FakeRecognizer {
        fn new(lines: Vec<RecognizedLine>) -> Self {
            Self {
                lines,
                fail_on: None,
                calls: Arc::new(AtomicUsize::new(0)),
            }
        }
    }

    impl TextRecognizer for FakeRecognizer {
        fn recognize(&self, page: &RenderedPage) -> Result<Vec<RecognizedLine>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail_on == Some(page.number) {
                return Err(anyhow!("tesseract exploded"));
            }
            Ok(self.lines.clone())
        }
    }

    fn form_lines() -> Vec<RecognizedLine> {
        vec![
            RecognizedLine::new("Familienname", Some(BBoxPx::from_edges(20, 20, 120, 40))),
            RecognizedLine::new("Vorname", Some(BBoxPx::from_edges(20, 60, 100, 80))),
            RecognizedLine::new("Unterschrift", None),
            RecognizedLine::new(INTEREST_ROW, Some(BBoxPx::from_edges(20, 100, 140, 120))),
        ]
    }

    fn renderer() -> OverlayRenderer {
        OverlayRenderer::new(OverlayStyle::default(), None)
    }

    #[tokio::test]
    async fn fills_every_page_in_order() {
        let rasterizer = FakeRasterizer {
            sizes: vec![(400, 200), (200, 400), (400, 200)],
        };
        let filler = Filler::new(rasterizer, FakeRecognizer::new(form_lines()), renderer());
        let filled = filler
            .fill(b"%PDF-1.4", &sample_profile(), None)
            .await
            .expect("fill");

        let numbers: Vec<_> = filled.pages.iter().map(|p| p.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);
        for page in &filled.pages {
            assert_eq!(page.labels_found, 3);
            assert_eq!(page.texts_drawn, 2);
            assert_eq!(page.marks_drawn, 1);
        }

        let doc = lopdf::Document::load_mem(&filled.bytes).expect("pdf");
        let page_ids: Vec<_> = doc.get_pages().into_values().collect();
        assert_eq!(page_ids.len(), 3);
        let second = media_box(&doc, page_ids[1]);
        assert!((second[2] - 200.0).abs() < 0.5, "{:?}", second);
        assert!((second[3] - 400.0).abs() < 0.5, "{:?}", second);
    }

    #[tokio::test]
    async fn parallel_jobs_keep_page_order() {
        let rasterizer = FakeRasterizer {
            sizes: vec![(120, 80); 5],
        };
        let filler =
            Filler::new(rasterizer, FakeRecognizer::new(Vec::new()), renderer()).with_jobs(3);
        let filled = filler
            .fill(b"%PDF-1.4", &sample_profile(), None)
            .await
            .expect("fill");
        let numbers: Vec<_> = filled.pages.iter().map(|p| p.number).collect();
        assert_eq!(numbers, vec![1, 2, 3, 4, 5]);
        assert!(filled.pages.iter().all(|p| p.labels_found == 0));
    }

    #[tokio::test]
    async fn ocr_failure_aborts_the_fill() {
        let rasterizer = FakeRasterizer {
            sizes: vec![(100, 100), (100, 100)],
        };
        let mut recognizer = FakeRecognizer::new(form_lines());
        recognizer.fail_on = Some(2);
        let filler = Filler::new(rasterizer, recognizer, renderer());
        let err = filler
            .fill(b"%PDF-1.4", &sample_profile(), None)
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("tesseract exploded"));
    }

    #[tokio::test]
    async fn first_ocr_failure_stops_remaining_pages() {
        let rasterizer = FakeRasterizer {
            sizes: vec![(100, 100); 5],
        };
        let mut recognizer = FakeRecognizer::new(form_lines());
        recognizer.fail_on = Some(1);
        let calls = Arc::clone(&recognizer.calls);
        let filler = Filler::new(rasterizer, recognizer, renderer());
        let err = filler
            .fill(b"%PDF-1.4", &sample_profile(), None)
            .await
            .unwrap_err();
        assert!(format!("{:#}", err).contains("tesseract exploded"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn empty_document_is_an_error() {
        let filler = Filler::new(
            FakeRasterizer { sizes: Vec::new() },
            FakeRecognizer::new(Vec::new()),
            renderer(),
        );
        let err = filler
            .fill(b"%PDF-1.4", &Profile::default(), None)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("no pages"));
    }

    #[tokio::test]
    async fn debug_dumps_are_written_per_page() {
        let dir = tempfile::tempdir().expect("tempdir");
        let debug = OcrDebugConfig::for_input(&dir.path().join("form.pdf")).expect("debug");
        let filler = Filler::new(
            FakeRasterizer {
                sizes: vec![(200, 150), (200, 150)],
            },
            FakeRecognizer::new(form_lines()),
            renderer(),
        );
        filler
            .fill(b"%PDF-1.4", &sample_profile(), Some(&debug))
            .await
            .expect("fill");
        for number in [1, 2] {
            assert!(debug.output_path(number).exists());
            assert!(debug.json_path(number).exists());
        }
    }
}
