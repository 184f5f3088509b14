use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::info;

use crate::locate::PageLabelIndex;
use crate::ocr::{BBoxPx, RecognizedLine};
use crate::overlay::OverlayRenderer;
use crate::pdf::{RenderedPage, encode_png};

/// Where `--debug-ocr` dumps go: `<dir>/<base>_pageNN_ocr_bbox.png` and `_ocr.json`.
#[derive(Debug, Clone)]
pub struct OcrDebugConfig {
    output_dir: PathBuf,
    base_name: String,
}

#[derive(Serialize)]
struct PageDump<'a> {
    page: usize,
    lines: &'a [RecognizedLine],
    labels: &'a PageLabelIndex,
}

impl OcrDebugConfig {
    /// Dumps land next to the input PDF, named after its stem.
    pub fn for_input(src_path: &Path) -> Result<Self> {
        let dir = src_path
            .parent()
            .filter(|parent| !parent.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let base = src_path
            .file_stem()
            .and_then(|value| value.to_str())
            .unwrap_or("input");
        std::fs::create_dir_all(dir)
            .with_context(|| format!("failed to create debug dir: {}", dir.display()))?;
        Ok(Self {
            output_dir: dir.to_path_buf(),
            base_name: sanitize_filename_component(base),
        })
    }

    fn page_label(&self, page_number: usize) -> String {
        format!("{}_page{:02}", self.base_name, page_number)
    }

    pub fn output_path(&self, page_number: usize) -> PathBuf {
        self.output_dir
            .join(format!("{}_ocr_bbox.png", self.page_label(page_number)))
    }

    pub fn json_path(&self, page_number: usize) -> PathBuf {
        self.output_dir
            .join(format!("{}_ocr.json", self.page_label(page_number)))
    }

    /// Writes the page with every recognized box in green and every located label in red.
    pub fn write_page(
        &self,
        renderer: &OverlayRenderer,
        page: &RenderedPage,
        lines: &[RecognizedLine],
        index: &PageLabelIndex,
    ) -> Result<()> {
        let svg = render_bbox_svg(page.width(), page.height(), lines, index);
        let image = renderer.composite(&page.image, &svg)?;
        let bytes = encode_png(&image)?;
        let output_path = self.output_path(page.number);
        std::fs::write(&output_path, bytes).with_context(|| {
            format!("failed to write ocr debug image: {}", output_path.display())
        })?;

        let json_path = self.json_path(page.number);
        let dump = PageDump {
            page: page.number,
            lines,
            labels: index,
        };
        let json = serde_json::to_vec_pretty(&dump)?;
        std::fs::write(&json_path, json)
            .with_context(|| format!("failed to write ocr debug json: {}", json_path.display()))?;
        info!(path = %output_path.display(), "wrote ocr debug image");
        Ok(())
    }
}

fn render_bbox_svg(
    width: u32,
    height: u32,
    lines: &[RecognizedLine],
    index: &PageLabelIndex,
) -> String {
    let mut svg = String::new();
    svg.push_str(&format!(
        r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
        w = width,
        h = height
    ));
    for bbox in lines.iter().filter_map(|line| line.bbox) {
        push_rect(&mut svg, &bbox, "#00c853");
    }
    for (_, bbox) in index.iter() {
        push_rect(&mut svg, bbox, "#d50000");
    }
    svg.push_str("</svg>");
    svg
}

fn push_rect(svg: &mut String, bbox: &BBoxPx, color: &str) {
    let BBoxPx { x, y, w, h } = *bbox;
    svg.push_str(&format!(
        r#"<rect x="{x}" y="{y}" width="{w}" height="{h}" fill="none" stroke="{color}" stroke-width="2"/>"#
    ));
}

fn sanitize_filename_component(value: &str) -> String {
    let mut out = String::new();
    for ch in value.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
            out.push(ch);
        } else if ch.is_whitespace() {
            out.push('_');
        }
    }
    if out.is_empty() {
        "input".to_string()
    } else {
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::overlay::OverlayStyle;
    use crate::test_util::blank_page;

    #[test]
    fn file_names_follow_page_numbers() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = OcrDebugConfig::for_input(&dir.path().join("Anmeldung Wohnung.pdf"))
            .expect("config");
        assert_eq!(
            config.output_path(3),
            dir.path().join("Anmeldung_Wohnung_page03_ocr_bbox.png")
        );
        assert_eq!(
            config.json_path(12),
            dir.path().join("Anmeldung_Wohnung_page12_ocr.json")
        );
    }

    #[test]
    fn writes_image_and_json() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = OcrDebugConfig::for_input(&dir.path().join("form.pdf")).expect("config");
        let page = blank_page(2, 200, 100);
        let bbox = BBoxPx::from_edges(10, 10, 80, 30);
        let lines = vec![
            RecognizedLine::new("Vorname", Some(bbox)),
            RecognizedLine::new("ohne box", None),
        ];
        let mut index = PageLabelIndex::default();
        index.insert("Vorname", bbox);
        let renderer = OverlayRenderer::new(OverlayStyle::default(), None);

        config
            .write_page(&renderer, &page, &lines, &index)
            .expect("write");

        let image = image::open(config.output_path(2)).expect("png");
        assert_eq!((image.width(), image.height()), (200, 100));
        let json: serde_json::Value =
            serde_json::from_slice(&std::fs::read(config.json_path(2)).expect("json"))
                .expect("parse");
        assert_eq!(json["page"], 2);
        assert_eq!(json["lines"].as_array().map(Vec::len), Some(2));
        assert_eq!(json["labels"]["Vorname"]["w"], 70);
    }

    #[test]
    fn odd_characters_are_dropped_from_names() {
        assert_eq!(sanitize_filename_component("a b/c.ä"), "a_bc");
        assert_eq!(sanitize_filename_component("..."), "input");
    }
}
