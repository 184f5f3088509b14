use anyhow::Result;
use std::collections::BTreeMap;

use crate::ocr::{BBoxPx, OcrLine};

use super::geom::union_bbox;
use super::text::needs_space;

#[derive(Clone)]
struct WordToken {
    text: String,
    bbox: BBoxPx,
    conf: f32,
}

/// Word rows (level 5) grouped by page/block/paragraph/line.
pub(super) fn parse_tsv_lines(tsv: &str) -> Result<Vec<OcrLine>> {
    let mut word_map: BTreeMap<(i32, i32, i32, i32), Vec<WordToken>> = BTreeMap::new();

    for row in tsv.lines().skip(1) {
        let cols = row.split('\t').collect::<Vec<_>>();
        if cols.len() < 12 {
            continue;
        }
        let level: i32 = cols[0].parse().unwrap_or(0);
        if level != 5 {
            continue;
        }
        let key = (
            cols[1].parse().unwrap_or(0),
            cols[2].parse().unwrap_or(0),
            cols[3].parse().unwrap_or(0),
            cols[4].parse().unwrap_or(0),
        );
        let left: u32 = cols[6].parse().unwrap_or(0);
        let top: u32 = cols[7].parse().unwrap_or(0);
        let width: u32 = cols[8].parse().unwrap_or(0);
        let height: u32 = cols[9].parse().unwrap_or(0);
        let conf: f32 = cols[10].parse().unwrap_or(-1.0);
        let text = cols[11].trim();
        if text.is_empty() || conf < 0.0 {
            continue;
        }

        word_map.entry(key).or_default().push(WordToken {
            text: text.to_string(),
            bbox: BBoxPx {
                x: left,
                y: top,
                w: width,
                h: height,
            },
            conf,
        });
    }

    let mut lines = Vec::new();
    for (_, mut words) in word_map {
        words.sort_by_key(|word| word.bbox.x);
        for segment in split_word_segments(words) {
            if let Some(line) = build_line(&segment) {
                lines.push(line);
            }
        }
    }

    Ok(lines)
}

pub(super) fn parse_hocr_lines(hocr: &str) -> Result<Vec<OcrLine>> {
    let mut lines = Vec::new();
    let bytes = hocr.as_bytes();
    let mut i = 0usize;
    while let Some(start) = find_subslice(bytes, b"<span", i) {
        let Some(tag_end) = find_byte(bytes, b'>', start) else {
            break;
        };
        let tag = &hocr[start..tag_end];
        if !tag.contains("ocr_line") && !tag.contains("ocr_caption") && !tag.contains("ocr_header")
        {
            i = tag_end + 1;
            continue;
        }
        let Some((inner_start, inner_end)) = find_span_inner(bytes, tag_end + 1) else {
            break;
        };
        let mut words = parse_hocr_words(&hocr[inner_start..inner_end]);
        i = inner_end + "</span>".len();
        if words.is_empty() {
            continue;
        }
        words.sort_by_key(|word| word.bbox.x);
        for segment in split_word_segments(words) {
            if let Some(line) = build_line(&segment) {
                lines.push(line);
            }
        }
    }
    Ok(lines)
}

/// Splits a physical line where the gap between words is large, so a printed
/// label and whatever sits further along the row become separate lines.
fn split_word_segments(words: Vec<WordToken>) -> Vec<Vec<WordToken>> {
    if words.len() <= 1 {
        return if words.is_empty() { Vec::new() } else { vec![words] };
    }

    let mut heights = words.iter().map(|word| word.bbox.h).collect::<Vec<_>>();
    heights.sort_unstable();
    let median_h = heights[heights.len() / 2].max(1) as f32;
    let gap_threshold = (median_h * 2.5).clamp(12.0, 120.0);
    let vertical_threshold = (median_h * 0.9).clamp(6.0, 80.0);

    let mut segments: Vec<Vec<WordToken>> = Vec::new();
    let mut current: Vec<WordToken> = Vec::new();
    let mut last_right = 0u32;
    let mut last_center_y = 0f32;
    for word in words {
        let center_y = word.bbox.center_y();
        if current.is_empty() {
            last_right = word.bbox.right();
            last_center_y = center_y;
            current.push(word);
            continue;
        }
        let gap = word.bbox.x.saturating_sub(last_right);
        let vertical_gap = (center_y - last_center_y).abs();
        if (gap as f32) > gap_threshold || vertical_gap > vertical_threshold {
            segments.push(std::mem::take(&mut current));
            last_right = word.bbox.right();
            last_center_y = center_y;
        } else {
            last_right = last_right.max(word.bbox.right());
            last_center_y = (last_center_y + center_y) * 0.5;
        }
        current.push(word);
    }
    if !current.is_empty() {
        segments.push(current);
    }
    segments
}

fn build_line(words: &[WordToken]) -> Option<OcrLine> {
    let mut text = String::new();
    let mut bbox: Option<BBoxPx> = None;
    let mut conf_sum = 0.0;
    let mut len_sum = 0.0;
    for word in words {
        if !text.is_empty() && needs_space(&text, &word.text) {
            text.push(' ');
        }
        text.push_str(&word.text);
        bbox = Some(match bbox {
            Some(current) => union_bbox(&current, &word.bbox),
            None => word.bbox,
        });
        let weight = word.text.chars().count().max(1) as f32;
        conf_sum += word.conf * weight;
        len_sum += weight;
    }
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some(OcrLine {
        text: text.to_string(),
        bbox: bbox?,
        conf: if len_sum > 0.0 { conf_sum / len_sum } else { 0.0 },
    })
}

fn find_subslice(haystack: &[u8], needle: &[u8], from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .windows(needle.len())
        .position(|win| win == needle)
        .map(|pos| from + pos)
}

fn find_byte(haystack: &[u8], needle: u8, from: usize) -> Option<usize> {
    haystack
        .get(from..)?
        .iter()
        .position(|b| *b == needle)
        .map(|pos| from + pos)
}

fn find_span_inner(bytes: &[u8], start: usize) -> Option<(usize, usize)> {
    let mut depth = 1i32;
    let mut i = start;
    while i < bytes.len() {
        if bytes[i] == b'<' {
            if bytes[i..].starts_with(b"<span") {
                depth += 1;
            } else if bytes[i..].starts_with(b"</span") {
                depth -= 1;
                if depth == 0 {
                    return Some((start, i));
                }
            }
        }
        i += 1;
    }
    None
}

fn extract_attr<'a>(tag: &'a str, name: &str) -> Option<&'a str> {
    let needle = format!("{}=", name);
    let idx = tag.find(&needle)?;
    let rest = &tag[idx + needle.len()..];
    let quote = rest.chars().next().filter(|ch| *ch == '"' || *ch == '\'')?;
    let rest = &rest[1..];
    let end = rest.find(quote)?;
    Some(&rest[..end])
}

fn strip_tags(value: &str) -> String {
    let mut out = String::new();
    let mut in_tag = false;
    for ch in value.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out
}

fn decode_entities(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

fn parse_hocr_words(inner: &str) -> Vec<WordToken> {
    let bytes = inner.as_bytes();
    let mut words = Vec::new();
    let mut i = 0usize;
    while let Some(start) = find_subslice(bytes, b"<span", i) {
        let Some(tag_end) = find_byte(bytes, b'>', start) else {
            break;
        };
        let tag = &inner[start..tag_end];
        if !tag.contains("ocrx_word") {
            i = tag_end + 1;
            continue;
        }
        let Some((inner_start, inner_end)) = find_span_inner(bytes, tag_end + 1) else {
            break;
        };
        i = inner_end + "</span>".len();
        let word_text =
            decode_entities(&strip_tags(&inner[inner_start..inner_end])).replace('\u{00a0}', " ");
        let word_text = word_text.trim();
        let Some(title) = extract_attr(tag, "title") else {
            continue;
        };
        if let (Some(bbox), Some(conf)) = (parse_title_bbox(title), parse_title_conf(title)) {
            if should_keep_word(word_text, conf, &bbox) {
                words.push(WordToken {
                    text: word_text.to_string(),
                    bbox,
                    conf,
                });
            }
        }
    }
    words
}

fn parse_title_bbox(title: &str) -> Option<BBoxPx> {
    let bbox_idx = title.find("bbox")?;
    let nums = title[bbox_idx + 4..]
        .split([' ', ';'])
        .filter(|v| !v.is_empty())
        .take(4)
        .filter_map(|v| v.parse::<u32>().ok())
        .collect::<Vec<_>>();
    let &[x1, y1, x2, y2] = nums.as_slice() else {
        return None;
    };
    if x2 <= x1 || y2 <= y1 {
        return None;
    }
    Some(BBoxPx::from_edges(x1, y1, x2, y2))
}

fn parse_title_conf(title: &str) -> Option<f32> {
    let idx = title.find("x_wconf")?;
    let rest = &title[idx + "x_wconf".len()..];
    let value = rest.split([' ', ';']).find(|v| !v.is_empty())?;
    value.parse::<f32>().ok()
}

fn should_keep_word(text: &str, conf: f32, bbox: &BBoxPx) -> bool {
    if text.is_empty() || bbox.w == 0 {
        return false;
    }
    let len = text.chars().count();
    if bbox.h < 8 {
        return conf >= 80.0 && len >= 2;
    }
    if conf < 55.0 && len <= 1 {
        return false;
    }
    !(conf < 60.0 && !text.chars().any(char::is_alphanumeric))
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOCR: &str = r#"<div class='ocr_page' title='bbox 0 0 1700 2200'>
<span class='ocr_line' id='line_1_1' title="bbox 100 200 900 240; baseline 0 -8; x_size 40">
  <span class='ocrx_word' id='word_1_1' title='bbox 100 200 180 240; x_wconf 95'>PLZ/Ort</span>
  <span class='ocrx_word' id='word_1_2' title='bbox 700 200 900 240; x_wconf 91'>Stockwerk</span>
</span>
<span class='ocr_line' id='line_1_2' title="bbox 100 300 500 340">
  <span class='ocrx_word' id='word_1_3' title='bbox 100 300 220 340; x_wconf 93'>Anzahl</span>
  <span class='ocrx_word' id='word_1_4' title='bbox 230 300 360 340; x_wconf 90'><strong>Zimmer</strong></span>
  <span class='ocrx_word' id='word_1_5' title='bbox 370 300 380 340; x_wconf 12'>|</span>
</span>
</div>"#;

    #[test]
    fn hocr_lines_split_on_wide_gaps() {
        let lines = parse_hocr_lines(HOCR).expect("parse hocr");
        let texts: Vec<_> = lines.iter().map(|line| line.text.as_str()).collect();
        assert_eq!(texts, vec!["PLZ/Ort", "Stockwerk", "Anzahl Zimmer"]);
        assert_eq!(lines[0].bbox, BBoxPx::from_edges(100, 200, 180, 240));
        assert_eq!(lines[2].bbox, BBoxPx::from_edges(100, 300, 360, 340));
    }

    #[test]
    fn tsv_words_group_into_lines() {
        let tsv = "level\tpage_num\tblock_num\tpar_num\tline_num\tword_num\tleft\ttop\twidth\theight\tconf\ttext\n\
5\t1\t1\t1\t1\t1\t40\t50\t60\t20\t96\tMax.\n\
5\t1\t1\t1\t1\t2\t106\t50\t90\t20\t94\tMietzins\n\
5\t1\t1\t1\t2\t1\t40\t90\t80\t20\t-1\t\n";
        let lines = parse_tsv_lines(tsv).expect("parse tsv");
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].text, "Max. Mietzins");
        assert_eq!(lines[0].bbox, BBoxPx::from_edges(40, 50, 196, 70));
    }

    #[test]
    fn entities_are_decoded_once() {
        assert_eq!(decode_entities("A &amp;lt; B"), "A &lt; B");
    }
}
