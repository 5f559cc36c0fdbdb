//! Paged documents (`.pdf`) → Word, first-page image, or plain text.
//!
//! ## Why spawn_blocking?
//!
//! pdfium is a C++ library with thread-local state and no async interface.
//! Every call happens inside `tokio::task::spawn_blocking` so a large document
//! never stalls the runtime's worker threads. The document handle lives
//! entirely inside the blocking closure and is released on every exit path.
//!
//! ## Why bind per call?
//!
//! Binding is cheap compared to loading a document, and keeping the
//! [`Pdfium`] instance local means no pdfium state outlives a conversion.
//!
//! ## Word output
//!
//! `.docx` keeps each page's geometry: text segments become paragraphs with
//! the source indent, vertical spacing, font size and weight (see
//! [`super::layout`]), and image objects are embedded in place. A page with
//! no text layer is embedded as a rendering of the whole page.

use super::docx::DocxDocument;
use super::layout::{ImageFragment, PageLayout, Rect, TextFragment};
use super::write_atomic_blocking;
use crate::converter::{ConvertOptions, Converter, ConverterMeta};
use crate::error::ConvertError;
use crate::text::{clean_extracted_text, wrap_markdown};
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat};
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

pub const NAME: &str = "pdf-converter";

const PDF_MAGIC: &[u8; 4] = b"%PDF";

/// Converts `.pdf` documents through pdfium.
pub struct PdfConverter {
    meta: ConverterMeta,
    render_width: u32,
    max_rendered_pixels: u32,
    pdfium_lib_path: Option<PathBuf>,
}

impl PdfConverter {
    pub const SOURCE_FORMATS: &'static [&'static str] = &[".pdf"];
    pub const TARGETS: &'static [&'static str] = &[".docx", ".png", ".txt", ".md"];

    pub fn new(
        render_width: u32,
        max_rendered_pixels: u32,
        pdfium_lib_path: Option<PathBuf>,
    ) -> Result<Self, ConvertError> {
        Ok(Self {
            meta: ConverterMeta::new(
                NAME,
                "Convert PDF documents to Word, Image, or Text",
                ".pdf",
                Self::TARGETS,
            )?,
            render_width,
            max_rendered_pixels,
            pdfium_lib_path,
        })
    }
}

#[async_trait]
impl Converter for PdfConverter {
    fn meta(&self) -> &ConverterMeta {
        &self.meta
    }

    /// Accept only files that start with the `%PDF` magic bytes.
    async fn validate(&self, input: &Path) -> bool {
        let Ok(mut file) = tokio::fs::File::open(input).await else {
            return false;
        };
        let mut magic = [0u8; 4];
        file.read_exact(&mut magic).await.is_ok() && &magic == PDF_MAGIC
    }

    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        target: &str,
        options: &ConvertOptions,
    ) -> Result<PathBuf, ConvertError> {
        self.meta.ensure_supported(target)?;

        let job = PdfJob {
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            target: PdfTarget::from_extension(target)?,
            password: options.password.clone(),
            render_width: self.render_width,
            max_height: self.max_rendered_pixels,
            lib_dir: self.pdfium_lib_path.clone(),
        };

        tokio::task::spawn_blocking(move || job.run())
            .await
            .map_err(|e| ConvertError::Internal(format!("PDF task panicked: {}", e)))??;

        info!("Converted {} → {}", input.display(), output.display());
        Ok(output.to_path_buf())
    }
}

// ── Blocking job ─────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PdfTarget {
    Docx,
    Png,
    Text,
    Markdown,
}

impl PdfTarget {
    fn from_extension(target: &str) -> Result<Self, ConvertError> {
        match target {
            ".docx" => Ok(Self::Docx),
            ".png" => Ok(Self::Png),
            ".txt" => Ok(Self::Text),
            ".md" => Ok(Self::Markdown),
            other => Err(ConvertError::Internal(format!(
                "{NAME} declares {other} but has no handler for it"
            ))),
        }
    }
}

struct PdfJob {
    input: PathBuf,
    output: PathBuf,
    target: PdfTarget,
    password: Option<String>,
    render_width: u32,
    max_height: u32,
    lib_dir: Option<PathBuf>,
}

impl PdfJob {
    fn run(self) -> Result<(), ConvertError> {
        let pdfium = bind_pdfium(self.lib_dir.as_deref(), NAME)?;
        let document = open_document(&pdfium, &self.input, self.password.as_deref())?;
        debug!(
            "PDF loaded: {} pages ({})",
            document.pages().len(),
            self.input.display()
        );

        let bytes = match self.target {
            PdfTarget::Docx => to_docx(&document, self.render_width, self.max_height)?,
            PdfTarget::Png => to_png(&document, self.render_width, self.max_height)?,
            PdfTarget::Text => clean_extracted_text(&extract_text(&document)?).into_bytes(),
            PdfTarget::Markdown => {
                wrap_markdown(&clean_extracted_text(&extract_text(&document)?)).into_bytes()
            }
        };

        write_atomic_blocking(NAME, &self.output, &bytes)
    }
}

/// Bind to the pdfium shared library.
///
/// `lib_path` may name the library file or the directory holding it. When it
/// holds nothing usable the search continues with `PDFIUM_LIB_PATH`, the
/// download cache and the working directory (see [`pdfium_auto`]), then the
/// system library search path. Never downloads.
pub fn bind_pdfium(lib_path: Option<&Path>, converter: &str) -> Result<Pdfium, ConvertError> {
    if let Some(found) = pdfium_auto::find_pdfium_library(lib_path) {
        debug!("Binding pdfium from {}", found.display());
        return pdfium_auto::bind_pdfium_from_path(&found)
            .map_err(|e| ConvertError::failed(converter, e));
    }
    Pdfium::bind_to_system_library()
        .map(Pdfium::new)
        .map_err(|e| {
            ConvertError::failed(
                converter,
                format!(
                    "pdfium library not available ({:?}). Run edgeconvert once to download it, \
                     or set PDFIUM_LIB_PATH",
                    e
                ),
            )
        })
}

fn open_document<'a>(
    pdfium: &'a Pdfium,
    path: &Path,
    password: Option<&'a str>,
) -> Result<PdfDocument<'a>, ConvertError> {
    pdfium.load_pdf_from_file(path, password).map_err(|e| {
        let detail = format!("{:?}", e);
        if detail.contains("Password") || detail.contains("password") {
            let hint = if password.is_some() {
                "wrong password"
            } else {
                "document is encrypted and no password was given"
            };
            ConvertError::failed(NAME, format!("{hint}: {detail}"))
        } else {
            ConvertError::MalformedInput {
                path: path.to_path_buf(),
                detail,
            }
        }
    })
}

fn pdfium_err(context: &str) -> impl Fn(PdfiumError) -> ConvertError + '_ {
    move |e| ConvertError::failed(NAME, format!("{context}: {:?}", e))
}

// ── Targets ──────────────────────────────────────────────────────────────

/// Text of every page, in order, one newline between pages.
fn extract_text(document: &PdfDocument) -> Result<String, ConvertError> {
    let mut out = String::new();
    for (i, page) in document.pages().iter().enumerate() {
        let text = page.text().map_err(pdfium_err("reading page text"))?;
        if i > 0 {
            out.push('\n');
        }
        out.push_str(&text.all());
    }
    Ok(out)
}

fn to_docx(document: &PdfDocument, render_width: u32, max_height: u32) -> Result<Vec<u8>, ConvertError> {
    let mut docx = DocxDocument::new();
    for (index, page) in document.pages().iter().enumerate() {
        let layout = page_layout(&page, index, render_width, max_height)?;
        docx.push_page(layout.into_docx_page());
    }
    debug!("DOCX assembled from {} pages", docx.page_count());
    docx.to_bytes()
        .map_err(|e| ConvertError::failed(NAME, format!("packaging DOCX: {e}")))
}

fn page_layout(
    page: &PdfPage,
    index: usize,
    render_width: u32,
    max_height: u32,
) -> Result<PageLayout, ConvertError> {
    let mut layout = PageLayout::new(page.width().value, page.height().value);

    let text = page.text().map_err(pdfium_err("reading page text"))?;
    let segments = text.segments();
    layout
        .text
        .extend(segments.iter().filter_map(|segment| text_fragment(&segment)));

    if layout.text.is_empty() {
        debug!("Page {}: no text layer, embedding a rendering", index + 1);
        layout.images.push(ImageFragment {
            png: render_png(page, render_width, max_height)?,
            bounds: Rect::new(0.0, 0.0, layout.width_pt, layout.height_pt),
        });
    } else {
        layout
            .images
            .extend(page.objects().iter().filter_map(|object| image_fragment(&object)));
    }

    debug!(
        "Page {}: {} text segments, {} pictures",
        index + 1,
        layout.text.len(),
        layout.images.len()
    );
    Ok(layout)
}

fn text_fragment(segment: &PdfPageTextSegment) -> Option<TextFragment> {
    let text = segment.text();
    if text.trim().is_empty() {
        return None;
    }
    let b = segment.bounds();
    let (size_pt, bold) = glyph_style(segment).unwrap_or((b.height().value, false));
    Some(TextFragment {
        text,
        bounds: Rect::new(b.left().value, b.bottom().value, b.right().value, b.top().value),
        size_pt,
        bold,
    })
}

/// Font size and weight of the first visible glyph in a segment.
fn glyph_style(segment: &PdfPageTextSegment) -> Option<(f32, bool)> {
    let chars = segment.chars().ok()?;
    let style = chars
        .iter()
        .find(|c| c.unicode_char().is_some_and(|ch| !ch.is_whitespace()))
        .map(|c| {
            let bold = is_bold(c.font_weight(), c.font_is_bold_reenforced(), &c.font_name());
            (c.scaled_font_size().value, bold)
        });
    style
}

/// pdfium does not report a weight for every font, so the name is checked too.
fn is_bold(weight: Option<PdfFontWeight>, reinforced: bool, font_name: &str) -> bool {
    let heavy = match weight {
        Some(
            PdfFontWeight::Weight600
            | PdfFontWeight::Weight700Bold
            | PdfFontWeight::Weight800
            | PdfFontWeight::Weight900,
        ) => true,
        Some(PdfFontWeight::Custom(w)) => w >= 600,
        _ => false,
    };
    heavy || reinforced || font_name.to_ascii_lowercase().contains("bold")
}

fn image_fragment(object: &PdfPageObject) -> Option<ImageFragment> {
    let image = object.as_image_object()?;
    let raw = image
        .get_raw_image()
        .inspect_err(|e| debug!("skipping unreadable image object: {:?}", e))
        .ok()?;
    let png = encode_png(&DynamicImage::ImageRgba8(raw.to_rgba8())).ok()?;
    let b = object.bounds().ok()?.to_rect();
    Some(ImageFragment {
        png,
        bounds: Rect::new(b.left().value, b.bottom().value, b.right().value, b.top().value),
    })
}

/// Rasterise page one only.
fn to_png(document: &PdfDocument, width: u32, max_height: u32) -> Result<Vec<u8>, ConvertError> {
    let pages = document.pages();
    if pages.len() == 0 {
        return Err(ConvertError::failed(NAME, "document has no pages"));
    }
    let page = pages.first().map_err(pdfium_err("opening first page"))?;
    render_png(&page, width, max_height)
}

fn render_png(page: &PdfPage, width: u32, max_height: u32) -> Result<Vec<u8>, ConvertError> {
    let render_config = PdfRenderConfig::new()
        .set_target_width(width as i32)
        .set_maximum_height(max_height as i32);
    let image = page
        .render_with_config(&render_config)
        .map_err(pdfium_err("rendering page"))?
        .as_image();
    debug!("Rendered page → {}x{} px", image.width(), image.height());
    encode_png(&image)
}

fn encode_png(image: &DynamicImage) -> Result<Vec<u8>, ConvertError> {
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
        .map_err(|e| ConvertError::failed(NAME, format!("encoding PNG: {e}")))?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn declares_four_targets() {
        let conv = PdfConverter::new(1240, 4000, None).unwrap();
        assert_eq!(conv.meta().name, "pdf-converter");
        assert_eq!(conv.meta().supported_targets, vec![".docx", ".png", ".txt", ".md"]);
    }

    #[test]
    fn every_declared_target_has_a_handler() {
        for t in PdfConverter::TARGETS {
            assert!(PdfTarget::from_extension(t).is_ok(), "{t}");
        }
    }

    #[test]
    fn bold_from_weight_or_name() {
        assert!(is_bold(Some(PdfFontWeight::Weight700Bold), false, "Arial"));
        assert!(is_bold(Some(PdfFontWeight::Custom(650)), false, "Arial"));
        assert!(is_bold(None, false, "Helvetica-Bold"));
        assert!(is_bold(Some(PdfFontWeight::Weight400Normal), true, "Arial"));
        assert!(!is_bold(Some(PdfFontWeight::Weight400Normal), false, "Helvetica"));
        assert!(!is_bold(None, false, "Times-Roman"));
    }

    #[tokio::test]
    async fn validate_checks_magic_bytes() {
        let dir = TempDir::new().unwrap();
        let conv = PdfConverter::new(1240, 4000, None).unwrap();

        let real = dir.path().join("a.pdf");
        std::fs::write(&real, b"%PDF-1.7\n%\xE2\xE3\xCF\xD3\n").unwrap();
        assert!(conv.validate(&real).await);

        let fake = dir.path().join("b.pdf");
        std::fs::write(&fake, b"PK\x03\x04 not a pdf").unwrap();
        assert!(!conv.validate(&fake).await);

        let short = dir.path().join("c.pdf");
        std::fs::write(&short, b"%P").unwrap();
        assert!(!conv.validate(&short).await);

        assert!(!conv.validate(&dir.path().join("missing.pdf")).await);
    }

    #[tokio::test]
    async fn undeclared_target_fails_before_pdfium() {
        let dir = TempDir::new().unwrap();
        let conv = PdfConverter::new(1240, 4000, None).unwrap();
        let input = dir.path().join("a.pdf");
        std::fs::write(&input, b"%PDF-1.4").unwrap();
        let out = dir.path().join("a.html");

        let err = conv
            .convert(&input, &out, ".html", &ConvertOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::UnsupportedTarget { .. }), "{err:?}");
        assert!(!out.exists());
    }
}
