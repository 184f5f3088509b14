use anyhow::{Context, Result, anyhow};
use std::path::Path;

pub mod debug;
pub mod fill;
pub mod form;
pub mod locate;
pub mod logging;
pub mod ocr;
pub mod overlay;
mod paths;
pub mod pdf;
pub mod profile;
pub mod session;
pub mod settings;
#[cfg(test)]
mod test_util;

pub use fill::{FilledPdf, Filler, PageSummary};
pub use locate::{PageLabelIndex, locate_labels};
pub use ocr::{BBoxPx, RecognizedLine, TesseractRecognizer, TextRecognizer};
pub use overlay::{OverlayPlan, OverlayRenderer, OverlayStyle, plan_overlay};
pub use pdf::{CommandRasterizer, PageRasterizer, RenderedPage};
pub use profile::{FIELD_KEYS, Profile, ProfileStore};
pub use session::Session;

#[derive(Debug, Clone, Default)]
pub struct Config {
    pub profile: Option<String>,
    pub pdf: Option<String>,
    pub output: Option<String>,
    pub set: Vec<String>,
    pub save_profile: Option<String>,
    pub show_profile: bool,
    pub show_labels: bool,
    pub settings_path: Option<String>,
    pub ocr_lang: Option<String>,
    pub jobs: Option<usize>,
    pub debug_ocr: bool,
    pub verbose: bool,
}

/// Settings plus every command-line override, applied to a fresh session.
pub fn open_session(config: &Config) -> Result<Session> {
    let settings_path = config.settings_path.as_deref().map(Path::new);
    let mut settings = settings::load_settings(settings_path)?;
    if let Some(lang) = config.ocr_lang.as_deref() {
        if !lang.trim().is_empty() {
            settings.ocr_languages = lang.trim().to_string();
        }
    }
    if let Some(jobs) = config.jobs {
        settings.ocr_jobs = jobs;
    }

    let mut session = Session::new(settings)?;
    session.set_debug_ocr(config.debug_ocr);
    if let Some(output) = config.output.as_deref() {
        session.set_output(output);
    }
    if let Some(profile) = config.profile.as_deref() {
        session.load_profile(Path::new(profile))?;
    }
    for assignment in &config.set {
        let (key, value) = parse_assignment(assignment)?;
        session.set_field(key, value)?;
    }
    Ok(session)
}

/// One-shot mode. Returns what should be printed to stdout.
pub async fn run(config: Config) -> Result<String> {
    let mut session = open_session(&config)?;
    let mut output = Vec::new();

    if let Some(path) = config.save_profile.as_deref() {
        session.save_profile(Path::new(path))?;
        output.push(session.status().to_string());
    }
    if config.show_labels {
        output.push(format_labels());
    }
    if config.show_profile {
        output.push(format_profile(session.profile()));
    }
    if let Some(pdf) = config.pdf.as_deref() {
        session.select_pdf(Path::new(pdf))?;
        session.fill().await?;
        output.push(session.status().to_string());
    }

    if output.is_empty() {
        return Err(anyhow!(
            "nothing to do: pass --pdf to fill a form (see --help)"
        ));
    }
    Ok(output.join("\n"))
}

/// `field=value`; the value may itself contain `=`.
pub fn parse_assignment(value: &str) -> Result<(&str, &str)> {
    let (key, field_value) = value
        .split_once('=')
        .with_context(|| format!("expected field=value, got '{}'", value))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(anyhow!("expected field=value, got '{}'", value));
    }
    Ok((key, field_value))
}

pub fn format_profile(profile: &Profile) -> String {
    let width = FIELD_KEYS.iter().map(|key| key.len()).max().unwrap_or(0);
    profile
        .entries()
        .map(|(key, value)| format!("{:width$}  {}", key, value, width = width))
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn format_labels() -> String {
    let mut lines = Vec::new();
    for entry in form::LABEL_FIELDS {
        lines.push(format!("{} -> {}", entry.label, entry.field));
    }
    for row in form::CHECKBOX_ROWS {
        lines.push(format!("{} -> [x] {}", row.label, row.option));
    }
    lines.join("\n")
}
