use serde::Serialize;
use std::collections::BTreeMap;

use crate::ocr::{BBoxPx, RecognizedLine};

/// Label text → box of the first recognized line containing it, for one page.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PageLabelIndex {
    boxes: BTreeMap<String, BBoxPx>,
}

impl PageLabelIndex {
    pub fn get(&self, label: &str) -> Option<&BBoxPx> {
        self.boxes.get(label)
    }

    pub fn contains(&self, label: &str) -> bool {
        self.boxes.contains_key(label)
    }

    pub fn len(&self) -> usize {
        self.boxes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.boxes.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &BBoxPx)> {
        self.boxes.iter().map(|(label, bbox)| (label.as_str(), bbox))
    }

    pub fn insert(&mut self, label: impl Into<String>, bbox: BBoxPx) {
        self.boxes.insert(label.into(), bbox);
    }
}

/// Scans `lines` in the order the OCR engine produced them. A label is bound to
/// the first line whose trimmed text contains it, ignoring case; later lines
/// never replace it. Lines without a box are skipped even when they match.
pub fn locate_labels(lines: &[RecognizedLine], labels: &[&str]) -> PageLabelIndex {
    let needles: Vec<(&str, String)> = labels
        .iter()
        .map(|label| (*label, label.to_lowercase()))
        .collect();
    let mut index = PageLabelIndex::default();

    for line in lines {
        let Some(bbox) = line.bbox else {
            continue;
        };
        let text = line.text.trim().to_lowercase();
        for (label, needle) in &needles {
            if !index.contains(label) && text.contains(needle.as_str()) {
                index.insert(*label, bbox);
            }
        }
        if index.len() == needles.len() {
            break;
        }
    }
    index
}
