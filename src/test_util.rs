use image::{Rgba, RgbaImage};

use crate::pdf::RenderedPage;
use crate::profile::Profile;

pub(crate) fn with_temp_home<F, R>(func: F) -> R
where
    F: FnOnce(&std::path::Path) -> R,
{
    static HOME_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
    let _guard = HOME_MUTEX
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner());
    let dir = tempfile::tempdir().expect("tempdir");
    let old_home = std::env::var("HOME").ok();
    let old_base = std::env::var(crate::paths::BASE_DIR_ENV).ok();
    unsafe {
        std::env::set_var("HOME", dir.path());
        std::env::remove_var(crate::paths::BASE_DIR_ENV);
    }
    let result = func(dir.path());
    unsafe {
        match old_home {
            Some(old) => std::env::set_var("HOME", old),
            None => std::env::remove_var("HOME"),
        }
        if let Some(old) = old_base {
            std::env::set_var(crate::paths::BASE_DIR_ENV, old);
        }
    }
    result
}

pub(crate) fn blank_page(number: usize, width: u32, height: u32) -> RenderedPage {
    RenderedPage::new(
        number,
        RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255])),
    )
}

pub(crate) fn sample_profile() -> Profile {
    let mut profile = Profile::default();
    let values = [
        ("familienname", "Muster"),
        ("vorname", "Max"),
        ("geburtsdatum", "01.01.1990"),
        ("zivilstand", "ledig"),
        ("nationalitaet", "Schweiz"),
        ("strasse", "Musterstrasse 1"),
        ("plz_ort", "8000 Zürich"),
        ("mobile", "079 000 00 00"),
        ("email", "max@example.org"),
        ("beruf", "Ingenieur"),
        ("arbeitgeber", "Beispiel AG"),
        ("einkommen", "6500"),
        ("objekt_adresse", "Seeweg 5"),
        ("objekt_plz_ort", "8400 Winterthur"),
        ("zimmer", "2.5"),
        ("stockwerk", "2. OG"),
        ("bezugsdatum", "01.04.2026"),
        ("mietzins", "1800"),
        ("haustiere", "keine"),
        ("betreibung", "nein"),
    ];
    for (key, value) in values {
        profile.set(key, value).expect("sample field");
    }
    profile
}

pub(crate) fn media_box(doc: &lopdf::Document, page_id: lopdf::ObjectId) -> [f32; 4] {
    let page = doc
        .get_object(page_id)
        .and_then(|object| object.as_dict())
        .expect("page dict");
    let values = page
        .get(b"MediaBox")
        .and_then(|object| object.as_array())
        .expect("media box");
    let mut out = [0.0; 4];
    for (slot, value) in out.iter_mut().zip(values) {
        *slot = match value {
            lopdf::Object::Integer(number) => *number as f32,
            lopdf::Object::Real(number) => *number as f32,
            other => panic!("unexpected media box entry: {:?}", other),
        };
    }
    out
}
