use crate::ocr::{BBoxPx, OcrLine};

use super::geom::{horizontal_overlap_ratio, iou, vertical_overlap_ratio};

/// Folds a later OCR pass into the lines collected so far.
pub(super) fn merge_lines(mut base: Vec<OcrLine>, extra: Vec<OcrLine>) -> Vec<OcrLine> {
    for line in extra {
        if let Some(idx) = base
            .iter()
            .position(|existing| iou(&existing.bbox, &line.bbox) > 0.6)
        {
            let line_len = line.text.chars().count();
            let base_len = base[idx].text.chars().count();
            let prefer = line.conf > base[idx].conf + 5.0
                || (line_len > base_len && line.conf + 5.0 >= base[idx].conf);
            if prefer || (base_len <= 2 && line_len >= 4) {
                base[idx] = line;
            }
        } else {
            base.push(line);
        }
    }
    base
}

pub(super) fn scale_lines(lines: Vec<OcrLine>, scale: f32) -> Vec<OcrLine> {
    let down = |value: u32| ((value as f32) / scale).round() as u32;
    lines
        .into_iter()
        .map(|line| OcrLine {
            bbox: BBoxPx {
                x: down(line.bbox.x),
                y: down(line.bbox.y),
                w: down(line.bbox.w),
                h: down(line.bbox.h),
            },
            ..line
        })
        .collect()
}

pub(super) fn filter_lines(lines: Vec<OcrLine>, width: u32, height: u32) -> Vec<OcrLine> {
    lines
        .into_iter()
        .filter(|line| is_line_valid(line, width, height))
        .collect()
}

fn is_line_valid(line: &OcrLine, width: u32, height: u32) -> bool {
    let text = line.text.trim();
    if text.is_empty() {
        return false;
    }
    if line.bbox.w == 0 || line.bbox.h == 0 {
        return false;
    }
    if line.bbox.right() > width || line.bbox.bottom() > height {
        return false;
    }
    if line.bbox.h as f32 > height as f32 * 0.25 {
        return false;
    }
    if !text.chars().any(char::is_alphanumeric) {
        return false;
    }
    !(line.conf < 25.0 && text.chars().count() <= 2)
}

/// Drops lines that repeat a higher-confidence line and returns the rest in reading order.
pub(super) fn suppress_overlaps(lines: Vec<OcrLine>) -> Vec<OcrLine> {
    let mut sorted = lines;
    sorted.sort_by(|a, b| {
        b.conf
            .partial_cmp(&a.conf)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    let mut kept: Vec<OcrLine> = Vec::new();

    'outer: for line in sorted {
        for existing in &kept {
            if iou(&existing.bbox, &line.bbox) > 0.5 {
                continue 'outer;
            }
            if vertical_overlap_ratio(&existing.bbox, &line.bbox) > 0.8
                && horizontal_overlap_ratio(&existing.bbox, &line.bbox) > 0.8
            {
                continue 'outer;
            }
        }
        kept.push(line);
    }
    kept.sort_by_key(|line| (line.bbox.y, line.bbox.x));
    kept
}
