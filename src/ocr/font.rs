use anyhow::{Context, Result, anyhow};
use std::path::Path;
use std::sync::Arc;
use ttf_parser::Face;
use ttf_parser::name_id;
use usvg::fontdb;

/// Raw font bytes plus the family name the SVG layer should ask for.
#[derive(Clone)]
pub struct FontData {
    data: Arc<Vec<u8>>,
    family: Option<String>,
}

impl FontData {
    pub fn family(&self) -> Option<&str> {
        self.family.as_deref()
    }

    pub fn data(&self) -> &[u8] {
        self.data.as_ref()
    }
}

impl std::fmt::Debug for FontData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FontData")
            .field("family", &self.family)
            .field("bytes", &self.data.len())
            .finish()
    }
}

fn load_font_file(path: &Path) -> Result<FontData> {
    let data =
        std::fs::read(path).with_context(|| format!("failed to read font: {}", path.display()))?;
    parse_font_data(data, None)
        .map_err(|err| anyhow!("failed to parse font: {} ({})", path.display(), err))
}

#[derive(Debug, Clone)]
pub struct ResolvedOverlayFont {
    pub font: FontData,
    pub family: String,
}

/// Font file first, then a named family, then the fallback list, all from system fonts.
pub fn resolve_overlay_font(
    font_path: Option<&Path>,
    font_family: Option<&str>,
    fallback: &[&str],
) -> Result<ResolvedOverlayFont> {
    if let Some(path) = font_path {
        let font = load_font_file(path)?;
        let family = font
            .family()
            .map(|name| name.to_string())
            .or_else(|| font_family.map(|name| name.to_string()))
            .unwrap_or_else(|| "sans-serif".to_string());
        return Ok(ResolvedOverlayFont { font, family });
    }

    let mut db = fontdb::Database::new();
    db.load_system_fonts();

    if let Some(family) = font_family {
        return load_font_family(&db, family);
    }

    for candidate in fallback {
        if let Ok(resolved) = load_font_family(&db, candidate) {
            return Ok(resolved);
        }
    }

    Err(anyhow!("no fallback fonts found"))
}

fn parse_font_data(
    data: Vec<u8>,
    preferred_family: Option<&str>,
) -> Result<FontData> {
    let mut fallback_family = None;
    let mut parsed_any = false;
    let count = ttf_parser::fonts_in_collection(&data).unwrap_or(1);
    for index in 0..count {
        let Ok(face) = Face::parse(&data, index) else {
            continue;
        };
        let family = extract_family_name(&face);
        if let (Some(preferred), Some(found)) = (preferred_family, family.as_deref()) {
            if found.eq_ignore_ascii_case(preferred) {
                return Ok(FontData {
                    family,
                    data: Arc::new(data),
                });
            }
        }
        if !parsed_any {
            parsed_any = true;
            fallback_family = family;
        }
    }
    if !parsed_any {
        return Err(anyhow!("failed to parse font data"));
    }
    Ok(FontData {
        data: Arc::new(data),
        family: fallback_family,
    })
}

fn load_font_family(
    db: &fontdb::Database,
    family: &str,
) -> Result<ResolvedOverlayFont> {
    let families = if family.eq_ignore_ascii_case("sans-serif") {
        vec![fontdb::Family::SansSerif]
    } else {
        vec![fontdb::Family::Name(family)]
    };
    let query = fontdb::Query {
        families: &families,
        ..Default::default()
    };
    let id = db
        .query(&query)
        .ok_or_else(|| anyhow!("font not found: {}", family))?;
    let data = db
        .with_face_data(id, |data, _index| data.to_vec())
        .ok_or_else(|| anyhow!("failed to load font data: {}", family))?;
    let font = parse_font_data(data, Some(family))?;
    let resolved_family = font
        .family()
        .map(|name| name.to_string())
        .unwrap_or_else(|| family.to_string());
    Ok(ResolvedOverlayFont {
        font,
        family: resolved_family,
    })
}

fn extract_family_name(face: &Face<'_>) -> Option<String> {
    let mut fallback = None;
    for name in face.names() {
        if name.name_id == name_id::TYPOGRAPHIC_FAMILY {
            if let Some(value) = name.to_string() {
                return Some(value);
            }
        } else if name.name_id == name_id::FAMILY && fallback.is_none() {
            fallback = name.to_string();
        }
    }
    fallback
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn garbage_bytes_are_not_a_font() {
        let err = parse_font_data(b"not a font".to_vec(), None).unwrap_err();
        assert!(err.to_string().contains("failed to parse font data"));
    }

    #[test]
    fn missing_font_file_is_reported() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("missing.ttf");
        let err = resolve_overlay_font(Some(&path), None, &[]).unwrap_err();
        assert!(err.to_string().contains("missing.ttf"));
    }
}
