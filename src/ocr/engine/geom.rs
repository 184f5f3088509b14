use crate::ocr::BBoxPx;

fn span_overlap(a_start: u32, a_end: u32, b_start: u32, b_end: u32) -> u32 {
    a_end.min(b_end).saturating_sub(a_start.max(b_start))
}

pub(super) fn iou(a: &BBoxPx, b: &BBoxPx) -> f32 {
    let iw = span_overlap(a.left(), a.right(), b.left(), b.right());
    let ih = span_overlap(a.top(), a.bottom(), b.top(), b.bottom());
    if iw == 0 || ih == 0 {
        return 0.0;
    }
    let inter = iw as f32 * ih as f32;
    let area_a = a.w as f32 * a.h as f32;
    let area_b = b.w as f32 * b.h as f32;
    inter / (area_a + area_b - inter).max(1.0)
}

pub(super) fn horizontal_overlap_ratio(a: &BBoxPx, b: &BBoxPx) -> f32 {
    let inter = span_overlap(a.left(), a.right(), b.left(), b.right());
    inter as f32 / (a.w.min(b.w) as f32).max(1.0)
}

pub(super) fn vertical_overlap_ratio(a: &BBoxPx, b: &BBoxPx) -> f32 {
    let inter = span_overlap(a.top(), a.bottom(), b.top(), b.bottom());
    inter as f32 / (a.h.min(b.h) as f32).max(1.0)
}

pub(super) fn union_bbox(a: &BBoxPx, b: &BBoxPx) -> BBoxPx {
    BBoxPx::from_edges(
        a.left().min(b.left()),
        a.top().min(b.top()),
        a.right().max(b.right()),
        a.bottom().max(b.bottom()),
    )
}
