//! Page layout reconstruction: positioned text and pictures → DOCX blocks.
//!
//! pdfium reports text as segments (runs on one baseline with one font) and
//! pictures as objects, each with a bounding box in PDF user space (points,
//! origin at the bottom-left). This module is pure: it turns those boxes into
//! paragraphs whose indent, spacing, size and weight follow the source page.
//!
//! ```text
//!  fragments ──► lines (vertical overlap) ──► blocks sorted top → bottom
//!                  │                             │
//!                  └─ runs sorted left → right   └─ space_before = gap to previous block
//! ```

use super::docx::{DocxBlock, DocxImage, DocxPage, DocxParagraph, DocxRun, PAGE_MARGIN_PT};

/// An axis-aligned box in PDF points, origin bottom-left.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub left: f32,
    pub bottom: f32,
    pub right: f32,
    pub top: f32,
}

impl Rect {
    pub fn new(left: f32, bottom: f32, right: f32, top: f32) -> Self {
        Self {
            left: left.min(right),
            bottom: bottom.min(top),
            right: left.max(right),
            top: bottom.max(top),
        }
    }

    fn width(&self) -> f32 {
        self.right - self.left
    }

    fn height(&self) -> f32 {
        self.top - self.bottom
    }

    fn middle(&self) -> f32 {
        (self.top + self.bottom) / 2.0
    }

    fn union(&self, other: &Rect) -> Rect {
        Rect {
            left: self.left.min(other.left),
            bottom: self.bottom.min(other.bottom),
            right: self.right.max(other.right),
            top: self.top.max(other.top),
        }
    }
}

/// A run of text on one baseline with uniform formatting.
#[derive(Debug, Clone, PartialEq)]
pub struct TextFragment {
    pub text: String,
    pub bounds: Rect,
    pub size_pt: f32,
    pub bold: bool,
}

/// An encoded PNG and where it sits on the page.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageFragment {
    pub png: Vec<u8>,
    pub bounds: Rect,
}

/// Everything extracted from one source page.
#[derive(Debug, Clone, Default)]
pub struct PageLayout {
    pub width_pt: f32,
    pub height_pt: f32,
    pub text: Vec<TextFragment>,
    pub images: Vec<ImageFragment>,
}

struct Line {
    bounds: Rect,
    fragments: Vec<TextFragment>,
}

enum Item {
    Line(Line),
    Image(ImageFragment),
}

impl Item {
    fn bounds(&self) -> Rect {
        match self {
            Item::Line(l) => l.bounds,
            Item::Image(i) => i.bounds,
        }
    }
}

impl PageLayout {
    pub fn new(width_pt: f32, height_pt: f32) -> Self {
        Self {
            width_pt,
            height_pt,
            ..Default::default()
        }
    }

    /// Lay the page out as DOCX blocks, top to bottom.
    pub fn into_docx_page(self) -> DocxPage {
        let content_width = (self.width_pt - 2.0 * PAGE_MARGIN_PT).max(1.0);
        let mut items: Vec<Item> = group_lines(self.text).into_iter().map(Item::Line).collect();
        items.extend(self.images.into_iter().map(Item::Image));
        items.sort_by(|a, b| b.bounds().top.total_cmp(&a.bounds().top));

        let mut cursor = self.height_pt - PAGE_MARGIN_PT;
        let mut blocks = Vec::with_capacity(items.len());
        for item in items {
            let bounds = item.bounds();
            let space_before_pt = (cursor - bounds.top).max(0.0);
            let indent_pt = (bounds.left - PAGE_MARGIN_PT).clamp(0.0, content_width);
            cursor = cursor.min(bounds.bottom);

            blocks.push(match item {
                Item::Line(line) => DocxBlock::Paragraph(DocxParagraph {
                    runs: line_runs(line.fragments),
                    indent_pt,
                    space_before_pt,
                }),
                Item::Image(img) => {
                    let (width_pt, height_pt) =
                        fit_width(img.bounds.width(), img.bounds.height(), content_width - indent_pt);
                    DocxBlock::Image(DocxImage {
                        png: img.png,
                        width_pt,
                        height_pt,
                        indent_pt,
                        space_before_pt,
                    })
                }
            });
        }

        DocxPage {
            blocks,
            size_pt: None,
        }
        .with_size(self.width_pt, self.height_pt)
    }
}

/// Group fragments whose vertical middle falls inside an existing line.
fn group_lines(mut fragments: Vec<TextFragment>) -> Vec<Line> {
    fragments.retain(|f| !f.text.trim().is_empty());
    fragments.sort_by(|a, b| {
        b.bounds
            .top
            .total_cmp(&a.bounds.top)
            .then(a.bounds.left.total_cmp(&b.bounds.left))
    });

    let mut lines: Vec<Line> = Vec::new();
    for frag in fragments {
        let mid = frag.bounds.middle();
        match lines
            .iter_mut()
            .rev()
            .find(|l| mid >= l.bounds.bottom && mid <= l.bounds.top)
        {
            Some(line) => {
                line.bounds = line.bounds.union(&frag.bounds);
                line.fragments.push(frag);
            }
            None => lines.push(Line {
                bounds: frag.bounds,
                fragments: vec![frag],
            }),
        }
    }
    lines
}

/// Order a line's fragments left to right, restoring the gaps between them
/// as spaces and merging neighbours with identical formatting.
fn line_runs(mut fragments: Vec<TextFragment>) -> Vec<DocxRun> {
    fragments.sort_by(|a, b| a.bounds.left.total_cmp(&b.bounds.left));

    let mut runs: Vec<DocxRun> = Vec::with_capacity(fragments.len());
    let mut prev_right: Option<f32> = None;
    for frag in fragments {
        let mut text = String::new();
        if let Some(right) = prev_right {
            let gap = frag.bounds.left - right;
            let space_width = (frag.size_pt * 0.5).max(1.0);
            if gap > space_width * 0.3 && !frag.text.starts_with(char::is_whitespace) {
                let n = (gap / space_width).round().clamp(1.0, 40.0) as usize;
                text.push_str(&" ".repeat(n));
            }
        }
        text.push_str(frag.text.trim_end_matches(['\r', '\n']));
        prev_right = Some(frag.bounds.right);

        let size_pt = Some(round_half(frag.size_pt)).filter(|s| *s > 0.0);
        match runs.last_mut() {
            Some(last) if last.bold == frag.bold && last.size_pt == size_pt => {
                last.text.push_str(&text)
            }
            _ => runs.push(DocxRun {
                text,
                size_pt,
                bold: frag.bold,
            }),
        }
    }
    runs
}

/// Word sizes fonts in half points.
fn round_half(pt: f32) -> f32 {
    (pt * 2.0).round() / 2.0
}

/// Scale `(w, h)` down proportionally so `w <= max_width`.
fn fit_width(w: f32, h: f32, max_width: f32) -> (f32, f32) {
    let max_width = max_width.max(1.0);
    if w <= max_width || w <= 0.0 {
        (w, h)
    } else {
        (max_width, h * max_width / w)
    }
}
