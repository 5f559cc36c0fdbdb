//! Minimal WordprocessingML (`.docx`) writer.
//!
//! Paged-document reconstruction needs positioned paragraphs, character
//! size and weight, inline pictures and one page size per source page. This
//! writes exactly the parts a conforming reader requires for that:
//! `[Content_Types].xml`, `_rels/.rels`, `word/document.xml`,
//! `word/_rels/document.xml.rels` and one `word/media/imageN.png` per picture.
//!
//! Each source page becomes its own section, so a document mixing portrait
//! and landscape pages keeps both.
//!
//! Output is deterministic: entries are written in a fixed order with a fixed
//! timestamp, so the same pages always produce the same bytes.

use std::fmt::Write as _;
use std::io::{Cursor, Seek, Write};
use zip::write::{SimpleFileOptions, ZipWriter};
use zip::{CompressionMethod, DateTime};

const CONTENT_TYPES: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Types xmlns="http://schemas.openxmlformats.org/package/2006/content-types"><Default Extension="rels" ContentType="application/vnd.openxmlformats-package.relationships+xml"/><Default Extension="xml" ContentType="application/xml"/><Default Extension="png" ContentType="image/png"/><Override PartName="/word/document.xml" ContentType="application/vnd.openxmlformats-officedocument.wordprocessingml.document.main+xml"/></Types>"#;

const PACKAGE_RELS: &str = r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>
<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships"><Relationship Id="rId1" Type="http://schemas.openxmlformats.org/officeDocument/2006/relationships/officeDocument" Target="word/document.xml"/></Relationships>"#;

const IMAGE_REL_TYPE: &str =
    "http://schemas.openxmlformats.org/officeDocument/2006/relationships/image";

/// US Letter in points, used when the source page size is unknown.
const DEFAULT_PAGE_SIZE_PT: (f32, f32) = (612.0, 792.0);

/// Page margin on every side, in points. Paragraph indents are measured from it.
pub const PAGE_MARGIN_PT: f32 = 36.0;

const EMU_PER_PT: f32 = 12_700.0;

// ── Model ────────────────────────────────────────────────────────────────────

/// A span of text with uniform character formatting.
#[derive(Debug, Clone, PartialEq)]
pub struct DocxRun {
    pub text: String,
    /// Font size in points; `None` keeps the reader's default.
    pub size_pt: Option<f32>,
    pub bold: bool,
}

impl DocxRun {
    pub fn plain(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            size_pt: None,
            bold: false,
        }
    }
}

/// One line of source text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocxParagraph {
    pub runs: Vec<DocxRun>,
    /// Left indent from the page margin, in points.
    pub indent_pt: f32,
    /// Vertical gap above the paragraph, in points.
    pub space_before_pt: f32,
}

impl DocxParagraph {
    pub fn text(&self) -> String {
        self.runs.iter().map(|r| r.text.as_str()).collect()
    }
}

/// An inline PNG picture.
#[derive(Debug, Clone, PartialEq)]
pub struct DocxImage {
    pub png: Vec<u8>,
    pub width_pt: f32,
    pub height_pt: f32,
    pub indent_pt: f32,
    pub space_before_pt: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DocxBlock {
    Paragraph(DocxParagraph),
    Image(DocxImage),
}

/// One source page: its blocks in reading order, and its size.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocxPage {
    pub blocks: Vec<DocxBlock>,
    /// Width and height in points.
    pub size_pt: Option<(f32, f32)>,
}

impl DocxPage {
    /// Split plain text into unformatted paragraphs, one per line.
    ///
    /// Blank lines are kept as empty paragraphs so vertical spacing survives.
    pub fn from_text(text: &str) -> Self {
        let normalised = text.replace("\r\n", "\n").replace('\r', "\n");
        let blocks = normalised
            .trim_end_matches('\n')
            .split('\n')
            .map(|line| {
                let line = line.trim_end();
                DocxBlock::Paragraph(DocxParagraph {
                    runs: if line.is_empty() {
                        Vec::new()
                    } else {
                        vec![DocxRun::plain(line)]
                    },
                    ..Default::default()
                })
            })
            .collect();
        Self {
            blocks,
            size_pt: None,
        }
    }

    pub fn with_size(mut self, width_pt: f32, height_pt: f32) -> Self {
        if width_pt > 0.0 && height_pt > 0.0 {
            self.size_pt = Some((width_pt, height_pt));
        }
        self
    }

    /// Plain text of every paragraph, in order.
    pub fn paragraph_texts(&self) -> Vec<String> {
        self.blocks
            .iter()
            .filter_map(|b| match b {
                DocxBlock::Paragraph(p) => Some(p.text()),
                DocxBlock::Image(_) => None,
            })
            .collect()
    }

    pub fn image_count(&self) -> usize {
        self.blocks
            .iter()
            .filter(|b| matches!(b, DocxBlock::Image(_)))
            .count()
    }
}

/// A document assembled page by page.
#[derive(Debug, Clone, Default)]
pub struct DocxDocument {
    pages: Vec<DocxPage>,
}

impl DocxDocument {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_page(&mut self, page: DocxPage) {
        self.pages.push(page);
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn images(&self) -> impl Iterator<Item = &DocxImage> {
        self.pages.iter().flat_map(|p| p.blocks.iter()).filter_map(|b| match b {
            DocxBlock::Image(img) => Some(img),
            DocxBlock::Paragraph(_) => None,
        })
    }

    // ── XML ──────────────────────────────────────────────────────────────

    /// Render `word/document.xml`.
    pub fn document_xml(&self) -> String {
        let mut body = String::with_capacity(4096);
        let mut image_no = 0usize;
        let last = self.pages.len().saturating_sub(1);

        for (i, page) in self.pages.iter().enumerate() {
            for block in &page.blocks {
                match block {
                    DocxBlock::Paragraph(p) => write_paragraph(&mut body, p),
                    DocxBlock::Image(img) => {
                        image_no += 1;
                        write_image(&mut body, img, image_no);
                    }
                }
            }
            // Every page but the last closes its section in a trailing
            // paragraph; the last one uses the body-level sectPr.
            if i < last {
                body.push_str("<w:p><w:pPr>");
                body.push_str(&section_properties(page.size_pt));
                body.push_str("</w:pPr></w:p>");
            }
        }

        let final_size = self.pages.last().and_then(|p| p.size_pt);
        format!(
            concat!(
                r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
                "\n",
                r#"<w:document xmlns:w="http://schemas.openxmlformats.org/wordprocessingml/2006/main" "#,
                r#"xmlns:r="http://schemas.openxmlformats.org/officeDocument/2006/relationships" "#,
                r#"xmlns:wp="http://schemas.openxmlformats.org/drawingml/2006/wordprocessingDrawing" "#,
                r#"xmlns:a="http://schemas.openxmlformats.org/drawingml/2006/main" "#,
                r#"xmlns:pic="http://schemas.openxmlformats.org/drawingml/2006/picture"><w:body>"#,
                "{body}{sect}</w:body></w:document>"
            ),
            body = body,
            sect = section_properties(final_size),
        )
    }

    /// Render `word/_rels/document.xml.rels`: one relationship per picture.
    pub fn document_rels_xml(&self) -> String {
        let mut rels = String::from(concat!(
            r#"<?xml version="1.0" encoding="UTF-8" standalone="yes"?>"#,
            "\n",
            r#"<Relationships xmlns="http://schemas.openxmlformats.org/package/2006/relationships">"#
        ));
        for n in 1..=self.images().count() {
            let _ = write!(
                rels,
                r#"<Relationship Id="rIdImg{n}" Type="{IMAGE_REL_TYPE}" Target="media/image{n}.png"/>"#
            );
        }
        rels.push_str("</Relationships>");
        rels
    }

    // ── Packaging ────────────────────────────────────────────────────────

    /// Write the packaged document to `writer`.
    pub fn write_to<W: Write + Seek>(&self, writer: W) -> zip::result::ZipResult<W> {
        let options = SimpleFileOptions::default()
            .compression_method(CompressionMethod::Deflated)
            .last_modified_time(DateTime::default());

        let mut zip = ZipWriter::new(writer);
        zip.start_file("[Content_Types].xml", options.clone())?;
        zip.write_all(CONTENT_TYPES.as_bytes())?;
        zip.start_file("_rels/.rels", options.clone())?;
        zip.write_all(PACKAGE_RELS.as_bytes())?;
        zip.start_file("word/document.xml", options.clone())?;
        zip.write_all(self.document_xml().as_bytes())?;
        zip.start_file("word/_rels/document.xml.rels", options.clone())?;
        zip.write_all(self.document_rels_xml().as_bytes())?;
        for (i, img) in self.images().enumerate() {
            // PNG is already compressed.
            let stored = options.clone().compression_method(CompressionMethod::Stored);
            zip.start_file(format!("word/media/image{}.png", i + 1), stored)?;
            zip.write_all(&img.png)?;
        }
        zip.finish()
    }

    /// Package the document into an in-memory buffer.
    pub fn to_bytes(&self) -> zip::result::ZipResult<Vec<u8>> {
        Ok(self.write_to(Cursor::new(Vec::new()))?.into_inner())
    }
}

fn paragraph_properties(out: &mut String, indent_pt: f32, space_before_pt: f32) {
    let before = points_to_twips(space_before_pt);
    let indent = points_to_twips(indent_pt);
    out.push_str("<w:pPr>");
    let _ = write!(out, r#"<w:spacing w:before="{before}" w:after="0"/>"#);
    if indent > 0 {
        let _ = write!(out, r#"<w:ind w:left="{indent}"/>"#);
    }
    out.push_str("</w:pPr>");
}

fn write_paragraph(out: &mut String, p: &DocxParagraph) {
    out.push_str("<w:p>");
    paragraph_properties(out, p.indent_pt, p.space_before_pt);
    for run in p.runs.iter().filter(|r| !r.text.is_empty()) {
        out.push_str("<w:r>");
        if run.bold || run.size_pt.is_some() {
            out.push_str("<w:rPr>");
            if run.bold {
                out.push_str("<w:b/>");
            }
            if let Some(size) = run.size_pt {
                let half_points = (size * 2.0).round().max(2.0) as u32;
                let _ = write!(out, r#"<w:sz w:val="{half_points}"/>"#);
            }
            out.push_str("</w:rPr>");
        }
        out.push_str(r#"<w:t xml:space="preserve">"#);
        out.push_str(&escape_xml(&run.text));
        out.push_str("</w:t></w:r>");
    }
    out.push_str("</w:p>");
}

fn write_image(out: &mut String, img: &DocxImage, n: usize) {
    let cx = (img.width_pt.max(1.0) * EMU_PER_PT).round() as u64;
    let cy = (img.height_pt.max(1.0) * EMU_PER_PT).round() as u64;
    out.push_str("<w:p>");
    paragraph_properties(out, img.indent_pt, img.space_before_pt);
    let _ = write!(
        out,
        concat!(
            r#"<w:r><w:drawing><wp:inline distT="0" distB="0" distL="0" distR="0">"#,
            r#"<wp:extent cx="{cx}" cy="{cy}"/><wp:docPr id="{n}" name="Picture {n}"/>"#,
            r#"<a:graphic><a:graphicData uri="http://schemas.openxmlformats.org/drawingml/2006/picture">"#,
            r#"<pic:pic><pic:nvPicPr><pic:cNvPr id="{n}" name="image{n}.png"/><pic:cNvPicPr/></pic:nvPicPr>"#,
            r#"<pic:blipFill><a:blip r:embed="rIdImg{n}"/><a:stretch><a:fillRect/></a:stretch></pic:blipFill>"#,
            r#"<pic:spPr><a:xfrm><a:off x="0" y="0"/><a:ext cx="{cx}" cy="{cy}"/></a:xfrm>"#,
            r#"<a:prstGeom prst="rect"><a:avLst/></a:prstGeom></pic:spPr></pic:pic>"#,
            r#"</a:graphicData></a:graphic></wp:inline></w:drawing></w:r>"#
        ),
        cx = cx,
        cy = cy,
        n = n,
    );
    out.push_str("</w:p>");
}

fn section_properties(size_pt: Option<(f32, f32)>) -> String {
    let (w, h) = size_pt.unwrap_or(DEFAULT_PAGE_SIZE_PT);
    let margin = points_to_twips(PAGE_MARGIN_PT);
    let orient = if w > h { r#" w:orient="landscape""# } else { "" };
    format!(
        concat!(
            r#"<w:sectPr><w:type w:val="nextPage"/><w:pgSz w:w="{w}" w:h="{h}"{orient}/>"#,
            r#"<w:pgMar w:top="{m}" w:right="{m}" w:bottom="{m}" w:left="{m}" w:header="0" w:footer="0" w:gutter="0"/>"#,
            "</w:sectPr>"
        ),
        w = points_to_twips(w).max(1),
        h = points_to_twips(h).max(1),
        orient = orient,
        m = margin,
    )
}

fn points_to_twips(pt: f32) -> u32 {
    (pt * 20.0).round().max(0.0) as u32
}

/// Escape markup characters and drop code points XML 1.0 cannot carry.
fn escape_xml(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '\t' => out.push(ch),
            c if (c as u32) < 0x20 || c == '\u{FFFE}' || c == '\u{FFFF}' => {}
            c => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn read_part(bytes: &[u8], name: &str) -> Vec<u8> {
        let mut archive = zip::ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut out = Vec::new();
        archive.by_name(name).unwrap().read_to_end(&mut out).unwrap();
        out
    }

    fn tiny_png() -> Vec<u8> {
        vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A]
    }

    #[test]
    fn page_from_text_keeps_blank_lines() {
        let page = DocxPage::from_text("Title\r\n\r\nBody line  \n");
        assert_eq!(page.paragraph_texts(), vec!["Title", "", "Body line"]);
    }

    #[test]
    fn escapes_markup() {
        assert_eq!(escape_xml("a < b & \"c\""), "a &lt; b &amp; &quot;c&quot;");
        assert_eq!(escape_xml("bell\u{7}tab\t"), "belltab\t");
    }

    #[test]
    fn each_page_gets_its_own_section() {
        let mut doc = DocxDocument::new();
        doc.push_page(DocxPage::from_text("first <page>").with_size(595.0, 842.0));
        doc.push_page(DocxPage::from_text("second").with_size(842.0, 595.0));
        let xml = doc.document_xml();

        assert!(xml.contains("first &lt;page&gt;"));
        assert_eq!(xml.matches("<w:sectPr>").count(), 2);
        assert!(xml.contains(r#"<w:pgSz w:w="11900" w:h="16840"/>"#), "{xml}");
        assert!(xml.contains(r#"<w:pgSz w:w="16840" w:h="11900" w:orient="landscape"/>"#));
        let first = xml.find("first").unwrap();
        let break_at = xml.find("<w:sectPr>").unwrap();
        let second = xml.find("second").unwrap();
        assert!(first < break_at && break_at < second);
    }

    #[test]
    fn default_page_size_is_letter() {
        let xml = DocxDocument::new().document_xml();
        assert!(xml.contains(r#"<w:pgSz w:w="12240" w:h="15840"/>"#));
    }

    #[test]
    fn run_formatting_and_indent_are_written() {
        let mut doc = DocxDocument::new();
        doc.push_page(DocxPage {
            blocks: vec![DocxBlock::Paragraph(DocxParagraph {
                runs: vec![
                    DocxRun {
                        text: "Heading".into(),
                        size_pt: Some(18.0),
                        bold: true,
                    },
                    DocxRun::plain(" tail"),
                ],
                indent_pt: 72.0,
                space_before_pt: 12.0,
            })],
            size_pt: None,
        });
        let xml = doc.document_xml();

        assert!(xml.contains(r#"<w:spacing w:before="240" w:after="0"/><w:ind w:left="1440"/>"#), "{xml}");
        assert!(xml.contains(r#"<w:rPr><w:b/><w:sz w:val="36"/></w:rPr><w:t xml:space="preserve">Heading</w:t>"#));
        assert!(xml.contains(r#"<w:r><w:t xml:space="preserve"> tail</w:t></w:r>"#));
    }

    #[test]
    fn pictures_are_packaged_and_linked() {
        let mut doc = DocxDocument::new();
        let mut page = DocxPage::from_text("caption");
        page.blocks.push(DocxBlock::Image(DocxImage {
            png: tiny_png(),
            width_pt: 100.0,
            height_pt: 50.0,
            indent_pt: 0.0,
            space_before_pt: 0.0,
        }));
        assert_eq!(page.image_count(), 1);
        doc.push_page(page);
        let bytes = doc.to_bytes().unwrap();

        assert_eq!(read_part(&bytes, "word/media/image1.png"), tiny_png());
        let rels = String::from_utf8(read_part(&bytes, "word/_rels/document.xml.rels")).unwrap();
        assert!(rels.contains(r#"Id="rIdImg1""#) && rels.contains("media/image1.png"));
        let xml = String::from_utf8(read_part(&bytes, "word/document.xml")).unwrap();
        assert!(xml.contains(r#"r:embed="rIdImg1""#));
        assert!(xml.contains(r#"<wp:extent cx="1270000" cy="635000"/>"#), "{xml}");
        let types = String::from_utf8(read_part(&bytes, "[Content_Types].xml")).unwrap();
        assert!(types.contains(r#"Extension="png""#));
    }

    #[test]
    fn package_contains_required_parts() {
        let mut doc = DocxDocument::new();
        doc.push_page(DocxPage::from_text("hello docx"));
        let bytes = doc.to_bytes().unwrap();

        let xml = String::from_utf8(read_part(&bytes, "word/document.xml")).unwrap();
        assert!(xml.contains("hello docx"));
        assert!(!read_part(&bytes, "[Content_Types].xml").is_empty());
        assert!(!read_part(&bytes, "_rels/.rels").is_empty());
    }

    #[test]
    fn packaging_is_deterministic() {
        let mut doc = DocxDocument::new();
        doc.push_page(DocxPage::from_text("same bytes"));
        assert_eq!(doc.to_bytes().unwrap(), doc.to_bytes().unwrap());
    }
}
