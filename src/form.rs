//! The rental application form this tool fills: which printed labels anchor
//! which profile fields, which rows get a checkmark, and the pixel offsets
//! tuned for pages rasterized at 200 DPI.

/// Printed label text and the profile field written next to it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LabelField {
    pub label: &'static str,
    pub field: &'static str,
}

/// Row label and the option nominally chosen on that row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckboxRow {
    pub label: &'static str,
    pub option: &'static str,
}

const fn label(label: &'static str, field: &'static str) -> LabelField {
    LabelField { label, field }
}

const fn row(label: &'static str, option: &'static str) -> CheckboxRow {
    CheckboxRow { label, option }
}

// "PLZ/Ort" is printed twice on the form (rental object and applicant address).
// Matching cannot tell the two apart, so both fields anchor to the first hit.
pub const LABEL_FIELDS: &[LabelField] = &[
    label("Liegenschaft", "objekt_adresse"),
    label("PLZ/Ort", "objekt_plz_ort"),
    label("Anzahl Zimmer", "zimmer"),
    label("Stockwerk", "stockwerk"),
    label("Gewünschter Bezugstermin", "bezugsdatum"),
    label("Max. Mietzins", "mietzins"),
    label("Familienname", "familienname"),
    label("Vorname", "vorname"),
    label("Geburtsdatum", "geburtsdatum"),
    label("Zivilstand", "zivilstand"),
    label("Heimatort/Nationalität", "nationalitaet"),
    label("Beruf", "beruf"),
    label("Arbeitgeber", "arbeitgeber"),
    label("Strasse", "strasse"),
    label("PLZ/Ort", "plz_ort"),
    label("Mobile-Nr.", "mobile"),
    label("E-Mail-Adresse", "email"),
    label("Monatseinkommen brutto", "einkommen"),
    label("Welche/wie viele Haustiere haben Sie?", "haustiere"),
];

pub const CHECKBOX_ROWS: &[CheckboxRow] = &[
    row("Garage/Parkplatz?", "nein"),
    row("Bestehen Betreibungen?", "nein"),
    row(INTEREST_ROW, "Internet"),
];

/// The one row whose answer boxes sit further right than the others.
pub const INTEREST_ROW: &str = "Wie wurde Ihr Interesse geweckt?";

pub const TEXT_OFFSET_X: f32 = 36.0;
pub const TEXT_OFFSET_Y: f32 = -6.0;

pub const MARK_SIZE: f32 = 10.0;
pub const MARK_OFFSET_X: f32 = 100.0;
pub const INTEREST_MARK_OFFSET_X: f32 = 200.0;

/// Horizontal distance from a row label's right edge to the mark's left edge.
pub fn mark_offset_x(row_label: &str) -> f32 {
    if row_label == INTEREST_ROW {
        INTEREST_MARK_OFFSET_X
    } else {
        MARK_OFFSET_X
    }
}

/// Every label the locator must look for: field labels first (each once), then row labels.
pub fn locator_labels() -> Vec<&'static str> {
    let mut labels: Vec<&'static str> = Vec::new();
    let candidates = LABEL_FIELDS
        .iter()
        .map(|entry| entry.label)
        .chain(CHECKBOX_ROWS.iter().map(|entry| entry.label));
    for candidate in candidates {
        if !labels.contains(&candidate) {
            labels.push(candidate);
        }
    }
    labels
}
