use anyhow::{Context, Result, anyhow};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::debug::OcrDebugConfig;
use crate::fill::{FilledPdf, Filler};
use crate::ocr::{TesseractRecognizer, resolve_overlay_font};
use crate::overlay::OverlayRenderer;
use crate::pdf::{CommandRasterizer, is_pdf};
use crate::profile::{Profile, ProfileStore};
use crate::settings::Settings;

/// State behind both the one-shot CLI and the interactive loop: the profile
/// being edited, the selected PDF, where the result goes, and the last status line.
#[derive(Debug)]
pub struct Session {
    settings: Settings,
    store: ProfileStore,
    pdf_path: Option<PathBuf>,
    output_path: PathBuf,
    debug_ocr: bool,
    status: String,
}

impl Session {
    /// Seeds the profile from the configured template, or empty fields if none.
    pub fn new(settings: Settings) -> Result<Self> {
        let defaults = match settings.profile_template() {
            Some(path) => ProfileStore::load_defaults(&path)?,
            None => Profile::default(),
        };
        let output_path = settings.output_path.clone();
        Ok(Self {
            settings,
            store: ProfileStore::new(defaults),
            pdf_path: None,
            output_path,
            debug_ocr: false,
            status: String::new(),
        })
    }

    pub fn profile(&self) -> &Profile {
        self.store.current()
    }

    pub fn pdf_path(&self) -> Option<&Path> {
        self.pdf_path.as_deref()
    }

    pub fn output_path(&self) -> &Path {
        &self.output_path
    }

    pub fn status(&self) -> &str {
        &self.status
    }

    pub fn set_debug_ocr(&mut self, enabled: bool) {
        self.debug_ocr = enabled;
    }

    pub fn set_output(&mut self, path: impl Into<PathBuf>) {
        self.output_path = path.into();
    }

    /// On failure the profile is left as it was.
    pub fn load_profile(&mut self, path: &Path) -> Result<()> {
        match self.store.load_json_file(path) {
            Ok(()) => {
                info!(path = %path.display(), "profile loaded");
                self.status = "profile loaded".to_string();
                Ok(())
            }
            Err(err) => {
                self.status = format!("profile error: {:#}", err);
                Err(err)
            }
        }
    }

    pub fn save_profile(&mut self, path: &Path) -> Result<()> {
        match self.store.save_json_file(path) {
            Ok(()) => {
                self.status = format!("profile saved: {}", path.display());
                Ok(())
            }
            Err(err) => {
                self.status = format!("profile error: {:#}", err);
                Err(err)
            }
        }
    }

    pub fn set_field(&mut self, key: &str, value: &str) -> Result<()> {
        self.store.set(key, value)
    }

    /// Accepts only files whose bytes sniff as PDF.
    pub fn select_pdf(&mut self, path: &Path) -> Result<()> {
        match check_pdf(path) {
            Ok(()) => {
                self.pdf_path = Some(path.to_path_buf());
                self.status = "pdf selected".to_string();
                Ok(())
            }
            Err(err) => {
                self.status = format!("pdf error: {:#}", err);
                Err(err)
            }
        }
    }

    /// Runs a fill and writes the result. The output file is untouched on failure.
    pub async fn fill(&mut self) -> Result<PathBuf> {
        match self.fill_inner().await {
            Ok(filled) => {
                self.status = format!("done. pdf exported: {}", self.output_path.display());
                info!(
                    pages = filled.pages.len(),
                    path = %self.output_path.display(),
                    "pdf exported"
                );
                Ok(self.output_path.clone())
            }
            Err(err) => {
                self.status = format!("error: {:#}", err);
                Err(err)
            }
        }
    }

    async fn fill_inner(&self) -> Result<FilledPdf> {
        let pdf_path = self
            .pdf_path
            .as_deref()
            .ok_or_else(|| anyhow!("no pdf selected"))?;
        let pdf_bytes = fs::read(pdf_path)
            .with_context(|| format!("failed to read pdf: {}", pdf_path.display()))?;

        let settings = &self.settings;
        let recognizer = TesseractRecognizer::new(
            &settings.ocr_languages,
            &settings.ocr_psm,
            settings.ocr_upscale,
            settings.render_dpi,
        )?;
        let rasterizer = CommandRasterizer::new(settings.render_dpi);
        let filler = Filler::new(rasterizer, recognizer, build_renderer(settings))
            .with_jobs(settings.effective_jobs());

        let debug = if self.debug_ocr {
            Some(OcrDebugConfig::for_input(pdf_path)?)
        } else {
            None
        };
        let filled = filler
            .fill(&pdf_bytes, self.store.current(), debug.as_ref())
            .await?;

        fs::write(&self.output_path, &filled.bytes)
            .with_context(|| format!("failed to write pdf: {}", self.output_path.display()))?;
        Ok(filled)
    }
}

fn check_pdf(path: &Path) -> Result<()> {
    let bytes = fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    if !is_pdf(&bytes) {
        return Err(anyhow!("not a pdf file: {}", path.display()));
    }
    Ok(())
}

/// Resolves the configured font; falls back to the generic family with a warning.
pub fn build_renderer(settings: &Settings) -> OverlayRenderer {
    match resolve_overlay_font(
        settings.overlay_font_path.as_deref(),
        settings.overlay_font_family.as_deref(),
        overlay_fallback_fonts(),
    ) {
        Ok(resolved) => OverlayRenderer::new(
            settings.overlay_style(&resolved.family),
            Some(resolved.font.data()),
        ),
        Err(err) => {
            warn!("overlay font unavailable, using sans-serif: {:#}", err);
            OverlayRenderer::new(settings.overlay_style("sans-serif"), None)
        }
    }
}

#[cfg(target_os = "macos")]
fn overlay_fallback_fonts() -> &'static [&'static str] {
    &["Helvetica", "Arial", "sans-serif"]
}

#[cfg(target_os = "windows")]
fn overlay_fallback_fonts() -> &'static [&'static str] {
    &["Arial", "Segoe UI", "sans-serif"]
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn overlay_fallback_fonts() -> &'static [&'static str] {
    &["DejaVu Sans", "Liberation Sans", "sans-serif"]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{sample_profile, with_temp_home};

    /// Built under a throwaway HOME so settings and template lookups stay off the real one.
    fn session() -> Session {
        with_temp_home(|_| {
            let mut session = Session::new(Settings::default()).expect("session");
            session.store = ProfileStore::new(sample_profile());
            session
        })
    }

    #[test]
    fn template_seeds_profile() {
        with_temp_home(|home| {
            let template = home.join("template.json");
            fs::write(&template, r#"{"vorname": "Erika", "familienname": "Muster"}"#)
                .expect("template");
            let settings = Settings {
                profile_defaults: Some(template),
                ..Settings::default()
            };
            let mut session = Session::new(settings).expect("session");
            assert_eq!(session.profile().vorname, "Erika");

            let partial = home.join("partial.json");
            fs::write(&partial, r#"{"vorname": "Max"}"#).expect("partial");
            session.load_profile(&partial).expect("load");
            assert_eq!(session.profile().vorname, "Max");
            assert_eq!(session.profile().familienname, "Muster");
        });
    }

    #[test]
    fn broken_profile_keeps_previous_values() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("broken.json");
        fs::write(&path, r#"{"vorname": "#).expect("write");
        let mut session = session();
        let before = session.profile().clone();

        assert!(session.load_profile(&path).is_err());
        assert!(session.status().starts_with("profile error: "));
        assert_eq!(session.profile(), &before);

        let good = dir.path().join("good.json");
        fs::write(&good, r#"{"beruf": "Koch"}"#).expect("write");
        session.load_profile(&good).expect("load");
        assert_eq!(session.status(), "profile loaded");
        assert_eq!(session.profile().beruf, "Koch");
    }

    #[test]
    fn only_pdf_files_can_be_selected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let text = dir.path().join("form.pdf");
        fs::write(&text, "just text").expect("write");
        let mut session = session();
        assert!(session.select_pdf(&text).is_err());
        assert!(session.status().starts_with("pdf error: "));
        assert!(session.pdf_path().is_none());

        let pdf = dir.path().join("real.pdf");
        fs::write(&pdf, b"%PDF-1.4\n%\xe2\xe3\xcf\xd3\n").expect("write");
        session.select_pdf(&pdf).expect("select");
        assert_eq!(session.status(), "pdf selected");
        assert_eq!(session.pdf_path(), Some(pdf.as_path()));
    }

    #[tokio::test]
    async fn fill_without_pdf_reports_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut session = session();
        session.set_output(dir.path().join("out.pdf"));
        let err = session.fill().await.unwrap_err();
        assert!(err.to_string().contains("no pdf selected"));
        assert_eq!(session.status(), "error: no pdf selected");
        assert!(!dir.path().join("out.pdf").exists());
    }

    #[test]
    fn save_writes_current_profile() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("saved.json");
        let mut session = session();
        session.set_field("zimmer", "4.5").expect("set");
        session.save_profile(&path).expect("save");
        let saved: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).expect("read")).expect("json");
        assert_eq!(saved["zimmer"], "4.5");
    }
}
