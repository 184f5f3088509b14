use anyhow::{Context, Result, anyhow};
use image::RgbaImage;
use resvg::render;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tiny_skia::{IntSize, Pixmap};
use tracing::warn;
use usvg::{Options, Tree, fontdb};

use crate::form::{
    CHECKBOX_ROWS, LABEL_FIELDS, MARK_SIZE, TEXT_OFFSET_X, TEXT_OFFSET_Y, mark_offset_x,
};
use crate::locate::PageLabelIndex;
use crate::ocr::BBoxPx;
use crate::profile::Profile;

pub const DEFAULT_FONT_SIZE: f32 = 22.0;

/// A profile value drawn with its baseline-left corner at (`x`, `y`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TextPlacement {
    pub label: &'static str,
    pub field: &'static str,
    pub text: String,
    pub x: f32,
    pub y: f32,
}

/// A filled square whose bottom-left corner sits at (`x`, `y`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarkPlacement {
    pub label: &'static str,
    pub option: &'static str,
    pub x: f32,
    pub y: f32,
    pub size: f32,
}

impl MarkPlacement {
    /// (left, top, right, bottom)
    pub fn rect(&self) -> (f32, f32, f32, f32) {
        (self.x, self.y - self.size, self.x + self.size, self.y)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct OverlayPlan {
    pub texts: Vec<TextPlacement>,
    pub marks: Vec<MarkPlacement>,
}

impl OverlayPlan {
    pub fn is_empty(&self) -> bool {
        self.texts.is_empty() && self.marks.is_empty()
    }
}

pub fn text_anchor(bbox: &BBoxPx) -> (f32, f32) {
    (
        bbox.right() as f32 + TEXT_OFFSET_X,
        bbox.bottom() as f32 + TEXT_OFFSET_Y,
    )
}

pub fn mark_origin(row_label: &str, bbox: &BBoxPx) -> (f32, f32) {
    (bbox.right() as f32 + mark_offset_x(row_label), bbox.center_y())
}

/// Decides what goes where on one page. Labels absent from `index` produce nothing.
pub fn plan_overlay(index: &PageLabelIndex, profile: &Profile) -> OverlayPlan {
    let mut plan = OverlayPlan::default();
    let mut anchors: HashMap<(u32, u32), &'static str> = HashMap::new();

    for entry in LABEL_FIELDS {
        let Some(bbox) = index.get(entry.label) else {
            continue;
        };
        let Some(value) = profile.get(entry.field) else {
            continue;
        };
        if let Some(previous) = anchors.insert((bbox.right(), bbox.bottom()), entry.field) {
            warn!(
                field = entry.field,
                previous, "two profile fields share one label anchor"
            );
        }
        let (x, y) = text_anchor(bbox);
        plan.texts.push(TextPlacement {
            label: entry.label,
            field: entry.field,
            text: value.to_string(),
            x,
            y,
        });
    }

    for row in CHECKBOX_ROWS {
        let Some(bbox) = index.get(row.label) else {
            continue;
        };
        let (x, y) = mark_origin(row.label, bbox);
        plan.marks.push(MarkPlacement {
            label: row.label,
            option: row.option,
            x,
            y,
            size: MARK_SIZE,
        });
    }

    plan
}

#[derive(Debug, Clone)]
pub struct OverlayStyle {
    pub font_size: f32,
    pub font_family: String,
    pub text_color: String,
    pub mark_color: String,
}

impl Default for OverlayStyle {
    fn default() -> Self {
        Self {
            font_size: DEFAULT_FONT_SIZE,
            font_family: "sans-serif".to_string(),
            text_color: "#000000".to_string(),
            mark_color: "#000000".to_string(),
        }
    }
}

/// Draws overlay plans onto page bitmaps. Holds the font database so every
/// page of a fill is rendered with the same fonts.
#[derive(Clone)]
pub struct OverlayRenderer {
    style: OverlayStyle,
    fontdb: Arc<fontdb::Database>,
}

impl std::fmt::Debug for OverlayRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayRenderer")
            .field("style", &self.style)
            .field("fonts", &self.fontdb.len())
            .finish()
    }
}

impl OverlayRenderer {
    pub fn new(style: OverlayStyle, font_data: Option<&[u8]>) -> Self {
        let mut db = fontdb::Database::new();
        db.load_system_fonts();
        if let Some(data) = font_data {
            db.load_font_data(data.to_vec());
        }
        Self {
            style,
            fontdb: Arc::new(db),
        }
    }

    /// Transparent SVG layer holding every text, then every mark.
    pub fn render_svg(&self, width: u32, height: u32, plan: &OverlayPlan) -> String {
        let mut svg = String::new();
        svg.push_str(&format!(
            r#"<svg xmlns="http://www.w3.org/2000/svg" width="{w}" height="{h}" viewBox="0 0 {w} {h}">"#,
            w = width,
            h = height
        ));
        svg.push('\n');
        for text in &plan.texts {
            if text.text.is_empty() {
                continue;
            }
            svg.push_str(&format!(
                r#"<text x="{x}" y="{y}" font-family="{family}" font-size="{size}" fill="{color}" xml:space="preserve">{value}</text>"#,
                x = text.x,
                y = text.y,
                family = escape_xml(&self.style.font_family),
                size = self.style.font_size,
                color = escape_xml(&self.style.text_color),
                value = escape_xml(&text.text)
            ));
            svg.push('\n');
        }
        for mark in &plan.marks {
            let (left, top, _, _) = mark.rect();
            svg.push_str(&format!(
                r#"<rect x="{x}" y="{y}" width="{s}" height="{s}" fill="{color}"/>"#,
                x = left,
                y = top,
                s = mark.size,
                color = escape_xml(&self.style.mark_color)
            ));
            svg.push('\n');
        }
        svg.push_str("</svg>");
        svg
    }

    /// Returns a copy of `page` with the plan drawn on top. Same size as `page`.
    pub fn draw(&self, page: &RgbaImage, plan: &OverlayPlan) -> Result<RgbaImage> {
        let svg = self.render_svg(page.width(), page.height(), plan);
        self.composite(page, &svg)
    }

    /// Renders `svg` over an opaque copy of `page`.
    pub fn composite(&self, page: &RgbaImage, svg: &str) -> Result<RgbaImage> {
        let (width, height) = page.dimensions();
        let options = Options {
            fontdb: self.fontdb.clone(),
            ..Options::default()
        };
        let tree = Tree::from_str(svg, &options).with_context(|| "failed to parse overlay SVG")?;
        let size = IntSize::from_wh(width, height)
            .ok_or_else(|| anyhow!("empty page size {}x{}", width, height))?;
        let mut pixmap = Pixmap::from_vec(page.as_raw().clone(), size)
            .ok_or_else(|| anyhow!("failed to build pixmap from page"))?;
        render(&tree, tiny_skia::Transform::identity(), &mut pixmap.as_mut());
        RgbaImage::from_raw(width, height, pixmap.take())
            .ok_or_else(|| anyhow!("failed to build image buffer from overlay"))
    }
}

pub(crate) fn escape_xml(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}
