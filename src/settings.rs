use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

use crate::overlay::{DEFAULT_FONT_SIZE, OverlayStyle};
use crate::paths;

const DEFAULT_SETTINGS_TOML: &str = include_str!("../settings.toml");

pub const DEFAULT_DPI: u32 = 200;
pub const DEFAULT_OCR_LANGUAGES: &str = "deu+eng";
pub const DEFAULT_OUTPUT_PATH: &str = "form_filled.pdf";

#[derive(Debug, Clone)]
pub struct Settings {
    pub render_dpi: u32,
    pub ocr_languages: String,
    pub ocr_psm: Vec<u32>,
    pub ocr_jobs: usize,
    pub ocr_upscale: u32,
    pub overlay_font_size: f32,
    pub overlay_text_color: String,
    pub overlay_mark_color: String,
    pub overlay_font_family: Option<String>,
    pub overlay_font_path: Option<PathBuf>,
    pub output_path: PathBuf,
    pub profile_defaults: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            render_dpi: DEFAULT_DPI,
            ocr_languages: DEFAULT_OCR_LANGUAGES.to_string(),
            ocr_psm: vec![4],
            ocr_jobs: 1,
            ocr_upscale: 2,
            overlay_font_size: DEFAULT_FONT_SIZE,
            overlay_text_color: "#000000".to_string(),
            overlay_mark_color: "#000000".to_string(),
            overlay_font_family: None,
            overlay_font_path: None,
            output_path: PathBuf::from(DEFAULT_OUTPUT_PATH),
            profile_defaults: None,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct SettingsFile {
    render: Option<RenderSettings>,
    ocr: Option<OcrSettings>,
    overlay: Option<OverlaySettings>,
    output: Option<OutputSettings>,
    profile: Option<ProfileSettings>,
}

#[derive(Debug, Default, Deserialize)]
struct RenderSettings {
    dpi: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct OcrSettings {
    languages: Option<String>,
    psm: Option<Vec<u32>>,
    jobs: Option<usize>,
    upscale: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
struct OverlaySettings {
    font_size: Option<f32>,
    text_color: Option<String>,
    mark_color: Option<String>,
    font_family: Option<String>,
    font_path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OutputSettings {
    path: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct ProfileSettings {
    defaults: Option<String>,
}

pub fn load_settings(extra_path: Option<&Path>) -> Result<Settings> {
    let mut settings = Settings::default();
    ensure_home_settings_file()?;

    let mut ordered_paths = Vec::new();
    ordered_paths.push(PathBuf::from("settings.toml"));
    ordered_paths.push(PathBuf::from("settings.local.toml"));

    if let Some(home) = paths::settings_dir() {
        ordered_paths.push(home.join("settings.toml"));
        ordered_paths.push(home.join("settings.local.toml"));
    }

    if let Some(extra) = extra_path {
        if !extra.exists() {
            return Err(anyhow!("settings file not found: {}", extra.display()));
        }
        ordered_paths.push(extra.to_path_buf());
    }

    for path in ordered_paths {
        if path.exists() {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read settings: {}", path.display()))?;
            let parsed: SettingsFile = toml::from_str(&content)
                .with_context(|| format!("failed to parse settings: {}", path.display()))?;
            settings.merge(parsed);
        }
    }

    Ok(settings)
}

impl Settings {
    /// `[ocr] jobs`, with 0 meaning one job per CPU.
    pub fn effective_jobs(&self) -> usize {
        if self.ocr_jobs == 0 {
            num_cpus::get().max(1)
        } else {
            self.ocr_jobs
        }
    }

    /// The configured template, else `profile.json` in the settings directory if present.
    pub fn profile_template(&self) -> Option<PathBuf> {
        if let Some(path) = &self.profile_defaults {
            return Some(path.clone());
        }
        paths::default_profile_template().filter(|path| path.exists())
    }

    pub fn overlay_style(&self, font_family: &str) -> OverlayStyle {
        OverlayStyle {
            font_size: self.overlay_font_size,
            font_family: font_family.to_string(),
            text_color: self.overlay_text_color.clone(),
            mark_color: self.overlay_mark_color.clone(),
        }
    }

    fn merge(&mut self, incoming: SettingsFile) {
        if let Some(render) = incoming.render {
            if let Some(dpi) = render.dpi {
                if dpi > 0 {
                    self.render_dpi = dpi;
                }
            }
        }
        if let Some(ocr) = incoming.ocr {
            if let Some(languages) = ocr.languages {
                if !languages.trim().is_empty() {
                    self.ocr_languages = languages;
                }
            }
            if let Some(psm) = ocr.psm {
                if !psm.is_empty() {
                    self.ocr_psm = psm;
                }
            }
            if let Some(jobs) = ocr.jobs {
                self.ocr_jobs = jobs;
            }
            if let Some(upscale) = ocr.upscale {
                if upscale > 0 {
                    self.ocr_upscale = upscale;
                }
            }
        }
        if let Some(overlay) = incoming.overlay {
            if let Some(size) = overlay.font_size {
                if size > 0.0 {
                    self.overlay_font_size = size;
                }
            }
            if let Some(color) = overlay.text_color {
                if !color.trim().is_empty() {
                    self.overlay_text_color = color;
                }
            }
            if let Some(color) = overlay.mark_color {
                if !color.trim().is_empty() {
                    self.overlay_mark_color = color;
                }
            }
            if let Some(family) = overlay.font_family {
                if !family.trim().is_empty() {
                    self.overlay_font_family = Some(family);
                }
            }
            if let Some(path) = overlay.font_path.as_deref().and_then(paths::resolve_user_path) {
                self.overlay_font_path = Some(path);
            }
        }
        if let Some(output) = incoming.output {
            if let Some(path) = output.path.as_deref().and_then(paths::resolve_user_path) {
                self.output_path = path;
            }
        }
        if let Some(profile) = incoming.profile {
            if let Some(path) = profile.defaults.as_deref().and_then(paths::resolve_user_path) {
                self.profile_defaults = Some(path);
            }
        }
    }
}

fn ensure_home_settings_file() -> Result<()> {
    let Some(home) = paths::settings_dir() else {
        return Ok(());
    };
    fs::create_dir_all(&home)
        .with_context(|| format!("failed to create settings directory: {}", home.display()))?;
    let path = home.join("settings.toml");
    if !path.exists() {
        fs::write(&path, DEFAULT_SETTINGS_TOML)
            .with_context(|| format!("failed to write settings: {}", path.display()))?;
    }
    Ok(())
}
