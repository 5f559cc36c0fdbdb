//! Bitmap re-encoding between `.png`, `.jpg`/`.jpeg` and `.webp`, plus
//! single-page PDF wrapping.
//!
//! One unit is registered per source extension (`image-converter-png`, …).
//! The decoder ignores the extension and sniffs the format from the content,
//! so a mislabelled file still converts as long as the bytes are an image.
//!
//! ## Transparency
//!
//! JPEG and the PDF page have no alpha channel. For those targets a
//! transparent image is composited over white first; dropping the channel
//! instead would turn transparent areas into whatever colour the fully
//! transparent pixels happen to carry (usually black).

use super::pdf::bind_pdfium;
use super::write_atomic_blocking;
use crate::converter::{normalize_extension, ConvertOptions, Converter, ConverterMeta};
use crate::error::ConvertError;
use async_trait::async_trait;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use pdfium_render::prelude::*;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tokio::io::AsyncReadExt;
use tracing::{debug, info};

/// Bytes read by [`ImageConverter::validate`]; enough for every magic number
/// `image::guess_format` knows.
const SNIFF_LEN: u64 = 32;

/// Re-encodes bitmaps of one source extension.
pub struct ImageConverter {
    meta: ConverterMeta,
    pdfium_lib_path: Option<PathBuf>,
}

impl ImageConverter {
    pub const SOURCE_FORMATS: &'static [&'static str] = &[".jpg", ".jpeg", ".png", ".webp"];
    pub const TARGETS: &'static [&'static str] = &[".png", ".jpg", ".jpeg", ".webp", ".pdf"];

    pub fn new(source_format: &str, pdfium_lib_path: Option<PathBuf>) -> Result<Self, ConvertError> {
        let source = normalize_extension(source_format);
        Ok(Self {
            meta: ConverterMeta::new(
                format!("image-converter-{}", source.trim_start_matches('.')),
                format!("Convert {source} images"),
                &source,
                Self::TARGETS,
            )?,
            pdfium_lib_path,
        })
    }
}

#[async_trait]
impl Converter for ImageConverter {
    fn meta(&self) -> &ConverterMeta {
        &self.meta
    }

    /// Accept only content whose leading bytes match a known image signature.
    async fn validate(&self, input: &Path) -> bool {
        let Ok(file) = tokio::fs::File::open(input).await else {
            return false;
        };
        let mut head = Vec::with_capacity(SNIFF_LEN as usize);
        if file.take(SNIFF_LEN).read_to_end(&mut head).await.is_err() {
            return false;
        }
        image::guess_format(&head).is_ok()
    }

    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        target: &str,
        _options: &ConvertOptions,
    ) -> Result<PathBuf, ConvertError> {
        self.meta.ensure_supported(target)?;

        let name = self.meta.name.clone();
        let target_kind = ImageTarget::from_extension(target, &name)?;
        let src = input.to_path_buf();
        let dst = output.to_path_buf();
        let lib_dir = self.pdfium_lib_path.clone();

        tokio::task::spawn_blocking(move || {
            let image = decode(&src)?;
            debug!(
                "{}: decoded {}x{} {:?}",
                name,
                image.width(),
                image.height(),
                image.color()
            );
            let prepared = prepare_for(image, target_kind);
            let bytes = match target_kind {
                ImageTarget::Pdf => wrap_in_pdf(&prepared, lib_dir.as_deref(), &name)?,
                other => encode(&prepared, other, &name)?,
            };
            write_atomic_blocking(&name, &dst, &bytes)
        })
        .await
        .map_err(|e| ConvertError::Internal(format!("Image task panicked: {}", e)))??;

        info!("Converted {} → {}", input.display(), output.display());
        Ok(output.to_path_buf())
    }
}

// ── Encoding ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImageTarget {
    Png,
    Jpeg,
    Webp,
    Pdf,
}

impl ImageTarget {
    fn from_extension(target: &str, converter: &str) -> Result<Self, ConvertError> {
        match target {
            ".png" => Ok(Self::Png),
            ".jpg" | ".jpeg" => Ok(Self::Jpeg),
            ".webp" => Ok(Self::Webp),
            ".pdf" => Ok(Self::Pdf),
            other => Err(ConvertError::Internal(format!(
                "{converter} declares {other} but has no encoder for it"
            ))),
        }
    }

    fn format(self) -> Option<ImageFormat> {
        match self {
            Self::Png => Some(ImageFormat::Png),
            Self::Jpeg => Some(ImageFormat::Jpeg),
            Self::Webp => Some(ImageFormat::WebP),
            Self::Pdf => None,
        }
    }

    fn lacks_alpha(self) -> bool {
        matches!(self, Self::Jpeg | Self::Pdf)
    }
}

fn decode(path: &Path) -> Result<DynamicImage, ConvertError> {
    let malformed = |detail: String| ConvertError::MalformedInput {
        path: path.to_path_buf(),
        detail,
    };
    image::ImageReader::open(path)
        .map_err(|e| malformed(e.to_string()))?
        .with_guessed_format()
        .map_err(|e| malformed(e.to_string()))?
        .decode()
        .map_err(|e| malformed(e.to_string()))
}

/// Convert the pixel layout into one the target encoder accepts.
fn prepare_for(image: DynamicImage, target: ImageTarget) -> DynamicImage {
    let has_alpha = image.color().has_alpha();
    match target {
        t if t.lacks_alpha() && has_alpha => flatten_onto_white(&image),
        ImageTarget::Jpeg | ImageTarget::Pdf => match image {
            DynamicImage::ImageRgb8(_) | DynamicImage::ImageLuma8(_) => image,
            other => DynamicImage::ImageRgb8(other.to_rgb8()),
        },
        ImageTarget::Webp => match image {
            DynamicImage::ImageRgb8(_) | DynamicImage::ImageRgba8(_) => image,
            other if has_alpha => DynamicImage::ImageRgba8(other.to_rgba8()),
            other => DynamicImage::ImageRgb8(other.to_rgb8()),
        },
        ImageTarget::Png => image,
    }
}

/// Composite every pixel over an opaque white background.
fn flatten_onto_white(image: &DynamicImage) -> DynamicImage {
    let rgba = image.to_rgba8();
    let (w, h) = rgba.dimensions();
    let mut out = RgbImage::new(w, h);
    for (x, y, px) in rgba.enumerate_pixels() {
        let alpha = u32::from(px[3]);
        let over_white = |c: u8| ((u32::from(c) * alpha + 255 * (255 - alpha) + 127) / 255) as u8;
        out.put_pixel(x, y, Rgb([over_white(px[0]), over_white(px[1]), over_white(px[2])]));
    }
    DynamicImage::ImageRgb8(out)
}

fn encode(image: &DynamicImage, target: ImageTarget, converter: &str) -> Result<Vec<u8>, ConvertError> {
    let format = target.format().ok_or_else(|| {
        ConvertError::Internal(format!("{converter}: {target:?} is not a bitmap format"))
    })?;
    let mut buf = Vec::new();
    image
        .write_to(&mut Cursor::new(&mut buf), format)
        .map_err(|e| ConvertError::failed(converter, format!("encoding {format:?}: {e}")))?;
    Ok(buf)
}

/// Embed `image` as the only page of a new PDF, 1 px = 1 pt.
fn wrap_in_pdf(
    image: &DynamicImage,
    lib_dir: Option<&Path>,
    converter: &str,
) -> Result<Vec<u8>, ConvertError> {
    let pdf_err = |step: &str, e: PdfiumError| ConvertError::failed(converter, format!("{step}: {:?}", e));
    let pdfium = bind_pdfium(lib_dir, converter)?;
    let width = PdfPoints::new(image.width() as f32);
    let height = PdfPoints::new(image.height() as f32);

    let mut document = pdfium.create_new_pdf().map_err(|e| pdf_err("creating PDF", e))?;
    {
        let mut page = document
            .pages_mut()
            .create_page_at_end(PdfPagePaperSize::from_points(width, height))
            .map_err(|e| pdf_err("adding page", e))?;
        page.objects_mut()
            .create_image_object(PdfPoints::ZERO, PdfPoints::ZERO, image, Some(width), Some(height))
            .map_err(|e| pdf_err("embedding image", e))?;
    }
    document.save_to_bytes().map_err(|e| pdf_err("saving PDF", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};
    use tempfile::TempDir;

    fn write_rgba_png(path: &Path, px: Rgba<u8>) {
        RgbaImage::from_pixel(4, 3, px).save(path).unwrap();
    }

    #[test]
    fn name_derives_from_source() {
        let conv = ImageConverter::new("JPEG", None).unwrap();
        assert_eq!(conv.meta().name, "image-converter-jpeg");
        assert_eq!(conv.meta().source_format, ".jpeg");
        assert_eq!(conv.meta().supported_targets.len(), 5);
    }

    #[test]
    fn flatten_composites_over_white() {
        let mut img = RgbaImage::new(2, 1);
        img.put_pixel(0, 0, Rgba([10, 20, 30, 0]));
        img.put_pixel(1, 0, Rgba([10, 20, 30, 255]));
        let flat = flatten_onto_white(&DynamicImage::ImageRgba8(img)).to_rgb8();
        assert_eq!(flat.get_pixel(0, 0), &Rgb([255, 255, 255]));
        assert_eq!(flat.get_pixel(1, 0), &Rgb([10, 20, 30]));
    }

    #[test]
    fn jpeg_target_drops_alpha() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 128])));
        let prepared = prepare_for(img, ImageTarget::Jpeg);
        assert!(!prepared.color().has_alpha());
    }

    #[test]
    fn png_target_keeps_alpha() {
        let img = DynamicImage::ImageRgba8(RgbaImage::from_pixel(1, 1, Rgba([0, 0, 0, 128])));
        assert!(prepare_for(img, ImageTarget::Png).color().has_alpha());
    }

    #[tokio::test]
    async fn png_with_alpha_to_jpg_decodes_as_rgb() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("logo.png");
        write_rgba_png(&input, Rgba([0, 0, 255, 0]));
        let out = dir.path().join("logo.jpg");

        let conv = ImageConverter::new(".png", None).unwrap();
        assert!(conv.validate(&input).await);
        conv.convert(&input, &out, ".jpg", &ConvertOptions::default())
            .await
            .unwrap();

        let back = image::open(&out).unwrap();
        assert_eq!((back.width(), back.height()), (4, 3));
        assert!(!back.color().has_alpha());
        let px = back.to_rgb8().get_pixel(0, 0).0;
        assert!(px.iter().all(|&c| c > 240), "expected near-white, got {px:?}");
    }

    #[tokio::test]
    async fn png_to_webp_round_trips_dimensions() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("a.png");
        write_rgba_png(&input, Rgba([1, 2, 3, 255]));
        let out = dir.path().join("a.webp");

        ImageConverter::new(".png", None)
            .unwrap()
            .convert(&input, &out, ".webp", &ConvertOptions::default())
            .await
            .unwrap();

        let bytes = std::fs::read(&out).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::WebP);
        let back = image::load_from_memory(&bytes).unwrap();
        assert_eq!((back.width(), back.height()), (4, 3));
    }

    #[tokio::test]
    async fn garbage_is_rejected() {
        let dir = TempDir::new().unwrap();
        let input = dir.path().join("fake.png");
        std::fs::write(&input, b"definitely not an image").unwrap();
        let conv = ImageConverter::new(".png", None).unwrap();

        assert!(!conv.validate(&input).await);
        let err = conv
            .convert(&input, &dir.path().join("fake.jpg"), ".jpg", &ConvertOptions::default())
            .await
            .unwrap_err();
        assert!(matches!(err, ConvertError::MalformedInput { .. }), "{err:?}");
    }
}
