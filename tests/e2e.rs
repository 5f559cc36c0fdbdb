//! End-to-end tests against the real backends: pdfium, ffmpeg and
//! LibreOffice.
//!
//! They are gated behind the `E2E_ENABLED` environment variable so they do
//! not run in CI unless explicitly requested. Inputs are generated on the fly
//! (an image wrapped into a PDF, a synthetic ffmpeg test clip, a DOCX from
//! the crate's own writer), so no fixture files are needed.
//!
//! Run with:
//!   E2E_ENABLED=1 PDFIUM_LIB_PATH=. cargo test --test e2e -- --nocapture

use edgequake_convert::converters::docx::{DocxDocument, DocxPage};
use edgequake_convert::converters::pdf::bind_pdfium;
use edgequake_convert::{ConverterConfig, Dispatcher, ErrorKind};
use image::{Rgba, RgbaImage};
use pdfium_render::prelude::*;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

// ── Test helpers ─────────────────────────────────────────────────────────────

/// Skip this test unless E2E_ENABLED is set and `tool` (if any) runs.
macro_rules! e2e_skip_unless_ready {
    () => {{
        if std::env::var("E2E_ENABLED").is_err() {
            println!("SKIP — set E2E_ENABLED=1 to run e2e tests");
            return;
        }
    }};
    ($tool:expr) => {{
        e2e_skip_unless_ready!();
        if !tool_available($tool) {
            println!("SKIP — '{}' not found on PATH", $tool);
            return;
        }
    }};
}

fn tool_available(program: &str) -> bool {
    Command::new(program)
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn dispatcher() -> Dispatcher {
    let mut builder = ConverterConfig::builder().subprocess_timeout_secs(180);
    if let Ok(dir) = std::env::var("PDFIUM_LIB_PATH") {
        builder = builder.pdfium_lib_path(dir);
    }
    Dispatcher::from_config(&builder.build().unwrap()).unwrap()
}

/// A 120×80 PNG, half opaque red, half fully transparent.
fn write_png(dir: &Path, name: &str) -> PathBuf {
    let mut img = RgbaImage::from_pixel(120, 80, Rgba([255, 0, 0, 255]));
    for x in 60..120 {
        for y in 0..80 {
            img.put_pixel(x, y, Rgba([0, 0, 0, 0]));
        }
    }
    let p = dir.join(name);
    img.save(&p).unwrap();
    p
}

/// A two-page A4 PDF with a real text layer: a 24 pt bold title flush with
/// the margin and a 12 pt body line indented one inch.
fn write_text_pdf(dir: &Path, name: &str) -> PathBuf {
    let lib = std::env::var_os("PDFIUM_LIB_PATH").map(PathBuf::from);
    let pdfium = bind_pdfium(lib.as_deref(), "e2e").unwrap();
    let mut document = pdfium.create_new_pdf().unwrap();
    let regular = document.fonts_mut().helvetica();
    let bold = document.fonts_mut().helvetica_bold();

    for (title, body) in [
        ("Chapter One", "alpha body on the first page"),
        ("Chapter Two", "omega body on the second page"),
    ] {
        let mut page = document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::a4())
            .unwrap();
        page.objects_mut()
            .create_text_object(PdfPoints::new(36.0), PdfPoints::new(760.0), title, bold, PdfPoints::new(24.0))
            .unwrap();
        page.objects_mut()
            .create_text_object(PdfPoints::new(108.0), PdfPoints::new(700.0), body, regular, PdfPoints::new(12.0))
            .unwrap();
    }

    let p = dir.join(name);
    document.save_to_file(&p).unwrap();
    p
}

fn docx_document_xml(path: &Path) -> String {
    let mut archive = zip::ZipArchive::new(std::fs::File::open(path).unwrap()).unwrap();
    let mut xml = String::new();
    archive
        .by_name("word/document.xml")
        .unwrap()
        .read_to_string(&mut xml)
        .unwrap();
    xml
}

// ── Images / pdfium ──────────────────────────────────────────────────────────

#[tokio::test]
async fn test_png_to_pdf_single_page() {
    e2e_skip_unless_ready!();
    let dir = TempDir::new().unwrap();
    let png = write_png(dir.path(), "logo.png");

    let pdf = dispatcher().execute(&png, dir.path(), ".pdf").await.unwrap();

    let bytes = std::fs::read(&pdf).unwrap();
    assert!(bytes.starts_with(b"%PDF"), "not a PDF");
}

#[tokio::test]
async fn test_pdf_to_png_renders_first_page() {
    e2e_skip_unless_ready!();
    let dir = TempDir::new().unwrap();
    let png = write_png(dir.path(), "page.png");
    let d = dispatcher();
    let pdf = d.execute(&png, dir.path().join("pdf"), ".pdf").await.unwrap();

    let rendered = d.execute(&pdf, dir.path().join("png"), "png").await.unwrap();

    let img = image::open(&rendered).unwrap();
    assert_eq!(img.width(), 1240);
    // Transparent half was flattened onto white before embedding.
    let px = img.to_rgb8().get_pixel(img.width() - 5, 5).0;
    assert!(px.iter().all(|&c| c > 240), "expected white, got {px:?}");
}

#[tokio::test]
async fn test_pdf_to_text_and_markdown() {
    e2e_skip_unless_ready!();
    let dir = TempDir::new().unwrap();
    let png = write_png(dir.path(), "scan.png");
    let d = dispatcher();
    let pdf = d.execute(&png, dir.path(), ".pdf").await.unwrap();

    // An image-only page has no text layer; output is still well-formed.
    let txt = d.execute(&pdf, dir.path().join("t"), "txt").await.unwrap();
    let text = std::fs::read_to_string(&txt).unwrap();
    assert!(text.ends_with('\n'));
    assert!(!text.contains("\n\n\n\n"));

    let md = d.execute(&pdf, dir.path().join("m"), "md").await.unwrap();
    let md = std::fs::read_to_string(&md).unwrap();
    assert!(md.starts_with("# Extracted Text\n\n```text\n"));
    assert!(md.ends_with("```\n"));
}

#[tokio::test]
async fn test_pdf_to_docx_is_a_zip() {
    e2e_skip_unless_ready!();
    let dir = TempDir::new().unwrap();
    let png = write_png(dir.path(), "form.png");
    let d = dispatcher();
    let pdf = d.execute(&png, dir.path(), ".pdf").await.unwrap();

    let docx = d.execute(&pdf, dir.path().join("w"), "docx").await.unwrap();

    let file = std::fs::File::open(&docx).unwrap();
    let mut archive = zip::ZipArchive::new(file).unwrap();
    assert!(archive.by_name("word/document.xml").is_ok());
}

#[tokio::test]
async fn test_text_pdf_keeps_page_order() {
    e2e_skip_unless_ready!();
    let dir = TempDir::new().unwrap();
    let pdf = write_text_pdf(dir.path(), "book.pdf");
    let d = dispatcher();

    let txt = d.execute(&pdf, dir.path().join("t"), "txt").await.unwrap();
    let text = std::fs::read_to_string(&txt).unwrap();
    let first = text.find("alpha body on the first page").expect("page 1 text");
    let second = text.find("omega body on the second page").expect("page 2 text");
    assert!(first < second, "pages out of order:\n{text}");
    assert!(text.find("Chapter One").unwrap() < text.find("Chapter Two").unwrap());

    let md = d.execute(&pdf, dir.path().join("m"), "md").await.unwrap();
    let md = std::fs::read_to_string(&md).unwrap();
    assert!(md.contains("alpha body on the first page"));
    assert!(md.contains("omega body on the second page"));
}

#[tokio::test]
async fn test_text_pdf_to_docx_keeps_layout() {
    e2e_skip_unless_ready!();
    let dir = TempDir::new().unwrap();
    let pdf = write_text_pdf(dir.path(), "book.pdf");

    let docx = dispatcher()
        .execute(&pdf, dir.path().join("w"), "docx")
        .await
        .unwrap();

    let xml = docx_document_xml(&docx);
    let one = xml.find("Chapter One").expect("page 1 title");
    let two = xml.find("Chapter Two").expect("page 2 title");
    assert!(one < two);
    assert!(xml.contains("alpha body on the first page"));
    assert!(xml.contains("omega body on the second page"));
    // Bold 24 pt title, indented body, one section per page.
    assert!(xml.contains("<w:b/>"), "{xml}");
    assert!(xml.contains(r#"<w:sz w:val="48"/>"#), "{xml}");
    assert!(xml.contains("<w:ind w:left="), "{xml}");
    assert_eq!(xml.matches("<w:sectPr>").count(), 2, "{xml}");
}

#[tokio::test]
async fn test_image_only_pdf_to_docx_embeds_the_page() {
    e2e_skip_unless_ready!();
    let dir = TempDir::new().unwrap();
    let png = write_png(dir.path(), "scan.png");
    let d = dispatcher();
    let pdf = d.execute(&png, dir.path(), ".pdf").await.unwrap();

    let docx = d.execute(&pdf, dir.path().join("w"), "docx").await.unwrap();

    let mut archive = zip::ZipArchive::new(std::fs::File::open(&docx).unwrap()).unwrap();
    assert!(archive.by_name("word/media/image1.png").is_ok());
    assert!(docx_document_xml(&docx).contains("r:embed="));
}

// ── ffmpeg ───────────────────────────────────────────────────────────────────

fn make_clip(dir: &Path) -> PathBuf {
    let clip = dir.join("clip.mp4");
    let status = Command::new("ffmpeg")
        .args(["-f", "lavfi", "-i", "testsrc=duration=1:size=160x120:rate=10"])
        .args(["-f", "lavfi", "-i", "sine=frequency=440:duration=1"])
        .args(["-shortest", "-y"])
        .arg(&clip)
        .output()
        .unwrap()
        .status;
    assert!(status.success(), "ffmpeg could not generate the test clip");
    clip
}

#[tokio::test]
async fn test_mp4_to_mp3_and_gif() {
    e2e_skip_unless_ready!("ffmpeg");
    let dir = TempDir::new().unwrap();
    let clip = make_clip(dir.path());
    let d = dispatcher();

    let mp3 = d.execute(&clip, dir.path().join("a"), "mp3").await.unwrap();
    assert!(std::fs::metadata(&mp3).unwrap().len() > 0);

    let gif = d.execute(&clip, dir.path().join("g"), "gif").await.unwrap();
    assert!(std::fs::read(&gif).unwrap().starts_with(b"GIF8"));
}

#[tokio::test]
async fn test_corrupt_video_is_conversion_error() {
    e2e_skip_unless_ready!("ffmpeg");
    let dir = TempDir::new().unwrap();
    let clip = dir.path().join("broken.mp4");
    std::fs::write(&clip, b"definitely not a video").unwrap();

    let err = dispatcher().execute(&clip, dir.path(), "wav").await.unwrap_err();

    assert_eq!(err.kind(), ErrorKind::ConversionError);
    assert!(!err.to_string().trim().is_empty());
}

// ── LibreOffice ──────────────────────────────────────────────────────────────

#[tokio::test]
async fn test_docx_to_pdf() {
    e2e_skip_unless_ready!("soffice");
    let dir = TempDir::new().unwrap();
    let mut doc = DocxDocument::new();
    doc.push_page(DocxPage::from_text("Quarterly report\n\nRevenue grew."));
    doc.push_page(DocxPage::from_text("Appendix"));
    let input = dir.path().join("report.docx");
    std::fs::write(&input, doc.to_bytes().unwrap()).unwrap();

    let pdf = dispatcher()
        .execute(&input, dir.path().join("out"), "pdf")
        .await
        .unwrap();

    assert_eq!(pdf.file_name().unwrap(), "report.pdf");
    assert!(std::fs::read(&pdf).unwrap().starts_with(b"%PDF"));
}
