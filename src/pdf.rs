use anyhow::{Context, Result, anyhow};
use image::{DynamicImage, RgbaImage};
use std::env;
use std::fs;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;
use tracing::debug;

pub const PDF_MIME: &str = "application/pdf";

/// One rasterized source page. `number` is 1-based.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    pub number: usize,
    pub image: RgbaImage,
}

impl RenderedPage {
    pub fn new(number: usize, image: RgbaImage) -> Self {
        Self { number, image }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }
}

/// PDF bytes in, one bitmap per page out, in document order.
pub trait PageRasterizer: Send + Sync {
    fn rasterize(&self, pdf_bytes: &[u8]) -> Result<Vec<RenderedPage>>;
}

/// Rasterizes through `mutool draw`, falling back to `pdftoppm`.
#[derive(Debug, Clone)]
pub struct CommandRasterizer {
    dpi: u32,
}

impl CommandRasterizer {
    pub fn new(dpi: u32) -> Self {
        Self { dpi: dpi.max(1) }
    }
}

impl PageRasterizer for CommandRasterizer {
    fn rasterize(&self, pdf_bytes: &[u8]) -> Result<Vec<RenderedPage>> {
        let pages = render_pdf_pages(pdf_bytes, self.dpi)?;
        pages
            .into_iter()
            .enumerate()
            .map(|(idx, bytes)| {
                let image = image::load_from_memory(&bytes)
                    .with_context(|| format!("failed to decode rendered page {}", idx + 1))?;
                Ok(RenderedPage::new(idx + 1, flatten_on_white(image)))
            })
            .collect()
    }
}

pub fn is_pdf(bytes: &[u8]) -> bool {
    infer::get(bytes)
        .map(|kind| kind.mime_type() == PDF_MIME)
        .unwrap_or(false)
}

/// Composites any transparency onto a white sheet so every pixel is opaque.
pub fn flatten_on_white(image: DynamicImage) -> RgbaImage {
    let mut rgba = image.to_rgba8();
    for pixel in rgba.pixels_mut() {
        let [r, g, b, a] = pixel.0;
        if a == 255 {
            continue;
        }
        let alpha = a as f32 / 255.0;
        let blend = |c: u8| (c as f32 * alpha + 255.0 * (1.0 - alpha)).round() as u8;
        pixel.0 = [blend(r), blend(g), blend(b), 255];
    }
    rgba
}

/// Page number from the trailing digits of the file stem (`page-012.png` -> 12).
fn page_index(path: &Path) -> Option<u32> {
    let stem = path.file_stem()?.to_str()?;
    let start = stem
        .rfind(|c: char| !c.is_ascii_digit())
        .map_or(0, |idx| idx + 1);
    stem[start..].parse().ok()
}

fn render_pdf_pages(pdf_bytes: &[u8], dpi: u32) -> Result<Vec<Vec<u8>>> {
    let dir = tempdir().with_context(|| "failed to create temp dir for pdf")?;
    let input_path = dir.path().join("input.pdf");
    fs::write(&input_path, pdf_bytes).with_context(|| "failed to write temp pdf")?;
    let dpi_arg = dpi.to_string();

    if command_exists("mutool") {
        debug!(dpi, "rasterizing with mutool");
        let output = Command::new("mutool")
            .arg("draw")
            .arg("-r")
            .arg(&dpi_arg)
            .arg("-o")
            .arg(dir.path().join("page-%03d.png"))
            .arg(&input_path)
            .output()
            .with_context(|| "failed to run mutool")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("mutool failed: {}", stderr.trim()));
        }
    } else if command_exists("pdftoppm") {
        debug!(dpi, "rasterizing with pdftoppm");
        let output = Command::new("pdftoppm")
            .arg("-png")
            .arg("-r")
            .arg(&dpi_arg)
            .arg(&input_path)
            .arg(dir.path().join("page"))
            .output()
            .with_context(|| "failed to run pdftoppm")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(anyhow!("pdftoppm failed: {}", stderr.trim()));
        }
    } else {
        return Err(anyhow!(
            "pdf rendering requires mutool or pdftoppm (install mupdf or poppler)"
        ));
    }

    let mut entries: Vec<_> = fs::read_dir(dir.path())
        .with_context(|| "failed to read temp pdf directory")?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| is_page_image(path))
        .collect();
    entries.sort_by_cached_key(|path| (page_index(path), path.clone()));

    let mut pages = Vec::with_capacity(entries.len());
    for path in entries {
        let bytes = fs::read(&path).with_context(|| "failed to read rendered pdf page")?;
        pages.push(bytes);
    }
    Ok(pages)
}

fn is_page_image(path: &Path) -> bool {
    let named_page = path
        .file_name()
        .and_then(|name| name.to_str())
        .map(|name| name.starts_with("page"))
        .unwrap_or(false);
    let png = path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("png"))
        .unwrap_or(false);
    named_page && png
}

pub(crate) fn command_exists(cmd: &str) -> bool {
    let path = Path::new(cmd);
    if path.components().count() > 1 {
        return is_executable(path);
    }

    let Some(path_var) = env::var_os("PATH") else {
        return false;
    };

    #[cfg(windows)]
    let candidates = vec![format!("{}.exe", cmd), cmd.to_string()];
    #[cfg(not(windows))]
    let candidates = vec![cmd.to_string()];

    env::split_paths(&path_var).any(|dir| {
        candidates
            .iter()
            .any(|candidate| is_executable(&dir.join(candidate)))
    })
}

fn is_executable(path: &Path) -> bool {
    let Ok(metadata) = fs::metadata(path) else {
        return false;
    };
    if !metadata.is_file() {
        return false;
    }
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        metadata.permissions().mode() & 0o111 != 0
    }
    #[cfg(not(unix))]
    {
        true
    }
}

pub fn encode_png(image: &RgbaImage) -> Result<Vec<u8>> {
    let rgb = DynamicImage::ImageRgba8(image.clone()).to_rgb8();
    let mut bytes = Vec::new();
    DynamicImage::ImageRgb8(rgb)
        .write_to(&mut std::io::Cursor::new(&mut bytes), image::ImageFormat::Png)
        .with_context(|| "failed to encode page image")?;
    Ok(bytes)
}

/// One page per PNG, each page exactly as many points as the image has pixels.
pub fn images_to_pdf(pages: &[Vec<u8>], title: &str) -> Result<Vec<u8>> {
    use printpdf::{Image, ImageTransform, Mm, PdfDocument};

    let mut doc = None;
    let mut layers = Vec::new();

    for (idx, bytes) in pages.iter().enumerate() {
        let image = printpdf::image_crate::load_from_memory(bytes)
            .with_context(|| format!("failed to decode overlay page {}", idx + 1))?;
        let width_mm = px_to_mm(image.width());
        let height_mm = px_to_mm(image.height());

        match doc.as_mut() {
            None => {
                let (doc_handle, page, layer) =
                    PdfDocument::new(title, Mm(width_mm), Mm(height_mm), "Layer 1");
                doc = Some(doc_handle);
                layers.push((page, layer, image));
            }
            Some(doc_handle) => {
                let (page, layer) =
                    doc_handle.add_page(Mm(width_mm), Mm(height_mm), format!("Layer {}", idx + 1));
                layers.push((page, layer, image));
            }
        }
    }

    let doc = doc.ok_or_else(|| anyhow!("no pages to render"))?;
    for (page, layer, image) in layers {
        let current_layer = doc.get_page(page).get_layer(layer);
        let pdf_image = Image::from_dynamic_image(&image);
        let transform = ImageTransform {
            translate_x: Some(Mm(0.0)),
            translate_y: Some(Mm(0.0)),
            rotate: None,
            scale_x: Some(1.0),
            scale_y: Some(1.0),
            dpi: Some(72.0),
        };
        pdf_image.add_to_layer(current_layer, transform);
    }

    let mut buffer = Vec::new();
    {
        let mut writer = std::io::BufWriter::new(&mut buffer);
        doc.save(&mut writer).with_context(|| "failed to write pdf")?;
    }
    Ok(buffer)
}

fn px_to_mm(px: u32) -> f32 {
    let inches = px as f32 / 72.0;
    inches * 25.4
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::blank_page;

    #[test]
    fn pdf_magic_is_detected() {
        assert!(is_pdf(b"%PDF-1.7\n%\xe2\xe3\xcf\xd3\n"));
        assert!(!is_pdf(b"{\"vorname\": \"Max\"}"));
    }

    #[test]
    fn transparent_pixels_become_white() {
        let mut image = RgbaImage::from_pixel(2, 1, image::Rgba([0, 0, 0, 0]));
        image.put_pixel(1, 0, image::Rgba([10, 20, 30, 255]));
        let flat = flatten_on_white(DynamicImage::ImageRgba8(image));
        assert_eq!(flat.get_pixel(0, 0).0, [255, 255, 255, 255]);
        assert_eq!(flat.get_pixel(1, 0).0, [10, 20, 30, 255]);
    }

    #[test]
    fn page_images_are_recognized_by_name() {
        assert!(is_page_image(Path::new("/tmp/x/page-001.png")));
        assert!(is_page_image(Path::new("/tmp/x/page-1.PNG")));
        assert!(!is_page_image(Path::new("/tmp/x/input.pdf")));
        assert!(!is_page_image(Path::new("/tmp/x/cover.png")));
    }

    #[test]
    fn page_files_sort_by_number() {
        let mut entries: Vec<_> = [
            "page-1000.png",
            "page-101.png",
            "page-999.png",
            "page-002.png",
        ]
        .iter()
        .map(|name| Path::new("/tmp/x").join(name))
        .collect();
        entries.sort_by_cached_key(|path| (page_index(path), path.clone()));
        let names: Vec<_> = entries
            .iter()
            .filter_map(|path| path.file_name()?.to_str())
            .collect();
        assert_eq!(
            names,
            vec!["page-002.png", "page-101.png", "page-999.png", "page-1000.png"]
        );
        assert_eq!(page_index(Path::new("page-07.png")), Some(7));
        assert_eq!(page_index(Path::new("cover.png")), None);
    }

    #[test]
    fn assembled_pdf_keeps_page_count_and_size() {
        let pages = vec![
            encode_png(&blank_page(1, 170, 220).image).expect("png"),
            encode_png(&blank_page(2, 220, 170).image).expect("png"),
            encode_png(&blank_page(3, 170, 220).image).expect("png"),
        ];
        let bytes = images_to_pdf(&pages, "filled").expect("pdf");
        let doc = lopdf::Document::load_mem(&bytes).expect("load pdf");
        let page_ids: Vec<_> = doc.get_pages().into_values().collect();
        assert_eq!(page_ids.len(), 3);

        let expected = [(170.0, 220.0), (220.0, 170.0), (170.0, 220.0)];
        for (page_id, (width, height)) in page_ids.iter().zip(expected) {
            let media_box = crate::test_util::media_box(&doc, *page_id);
            assert!((media_box[2] - width).abs() < 0.5, "{:?}", media_box);
            assert!((media_box[3] - height).abs() < 0.5, "{:?}", media_box);
        }
    }

    #[test]
    fn no_pages_is_an_error() {
        let err = images_to_pdf(&[], "filled").unwrap_err();
        assert!(err.to_string().contains("no pages"));
    }
}
