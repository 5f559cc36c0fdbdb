//! Plugin registry: source extension → converter unit.
//!
//! ## Why a static list?
//!
//! Converters are discovered from [`REGISTRATIONS`], an explicit table of
//! constructors, rather than by scanning anything at runtime. Adding a
//! backend means adding one entry; the compiler checks the rest.
//!
//! Source-parameterised units (images, media, office) are constructed once
//! per extension they list. A constructor that fails for one extension is
//! logged and skipped so one broken backend never takes the others down.
//!
//! The registry is built once and read-only afterwards, so lookups need no
//! locking. [`Registry::init_global`] stores one instance for the process.

use crate::config::ConverterConfig;
use crate::converter::{extension_of, normalize_extension, Converter};
use crate::converters::{
    ImageConverter, JsonToMarkdownConverter, MediaConverter, OfficeConverter, PdfConverter,
};
use crate::error::ConvertError;
use once_cell::sync::OnceCell;
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Constructor for one unit bound to one source extension.
pub type Constructor = fn(&ConverterConfig, &str) -> Result<Arc<dyn Converter>, ConvertError>;

/// One entry of the discovery table.
pub struct Registration {
    pub name: &'static str,
    pub source_formats: &'static [&'static str],
    pub build: Constructor,
}

/// Every converter shipped with the crate, in registration order.
pub static REGISTRATIONS: &[Registration] = &[
    Registration {
        name: "json2md",
        source_formats: JsonToMarkdownConverter::SOURCE_FORMATS,
        build: build_json,
    },
    Registration {
        name: "image-converter",
        source_formats: ImageConverter::SOURCE_FORMATS,
        build: build_image,
    },
    Registration {
        name: "pdf-converter",
        source_formats: PdfConverter::SOURCE_FORMATS,
        build: build_pdf,
    },
    Registration {
        name: "video-converter",
        source_formats: MediaConverter::SOURCE_FORMATS,
        build: build_media,
    },
    Registration {
        name: "office-converter",
        source_formats: OfficeConverter::SOURCE_FORMATS,
        build: build_office,
    },
];

fn build_json(config: &ConverterConfig, _ext: &str) -> Result<Arc<dyn Converter>, ConvertError> {
    Ok(Arc::new(JsonToMarkdownConverter::new(config.json_indent)?))
}

fn build_image(config: &ConverterConfig, ext: &str) -> Result<Arc<dyn Converter>, ConvertError> {
    Ok(Arc::new(ImageConverter::new(ext, config.pdfium_lib_path.clone())?))
}

fn build_pdf(config: &ConverterConfig, _ext: &str) -> Result<Arc<dyn Converter>, ConvertError> {
    Ok(Arc::new(PdfConverter::new(
        config.render_width,
        config.max_rendered_pixels,
        config.pdfium_lib_path.clone(),
    )?))
}

fn build_media(config: &ConverterConfig, ext: &str) -> Result<Arc<dyn Converter>, ConvertError> {
    Ok(Arc::new(MediaConverter::new(
        ext,
        config.ffmpeg_path.clone(),
        config.runner(),
        config.subprocess_timeout(),
    )?))
}

fn build_office(config: &ConverterConfig, ext: &str) -> Result<Arc<dyn Converter>, ConvertError> {
    Ok(Arc::new(OfficeConverter::new(
        ext,
        config.soffice_path.clone(),
        config.runner(),
        config.subprocess_timeout(),
    )?))
}

static GLOBAL: OnceCell<Arc<Registry>> = OnceCell::new();

/// Read-only mapping from lower-cased source extension to its unit.
#[derive(Clone, Default)]
pub struct Registry {
    converters: BTreeMap<String, Arc<dyn Converter>>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.converters.iter().map(|(ext, c)| (ext, &c.meta().name)))
            .finish()
    }
}

impl Registry {
    pub fn builder() -> RegistryBuilder {
        RegistryBuilder::default()
    }

    /// Discover every unit in [`REGISTRATIONS`] using `config`.
    pub fn from_config(config: &ConverterConfig) -> Result<Self, ConvertError> {
        Self::from_registrations(REGISTRATIONS, config)
    }

    /// Discover units from an arbitrary table.
    pub fn from_registrations(
        registrations: &[Registration],
        config: &ConverterConfig,
    ) -> Result<Self, ConvertError> {
        let mut builder = Self::builder().strict(config.strict_registry);
        for reg in registrations {
            for ext in reg.source_formats {
                match (reg.build)(config, ext) {
                    Ok(unit) => builder = builder.register(unit)?,
                    Err(e) => warn!("Skipping {} for {}: {}", reg.name, ext, e),
                }
            }
        }
        let registry = builder.build();
        info!(
            "Converter registry ready: {} extensions ({})",
            registry.len(),
            registry.converters.keys().cloned().collect::<Vec<_>>().join(" ")
        );
        Ok(registry)
    }

    /// Build the process-wide registry on first call; later calls return it
    /// unchanged and ignore `config`.
    pub fn init_global(config: &ConverterConfig) -> Result<Arc<Registry>, ConvertError> {
        GLOBAL
            .get_or_try_init(|| Self::from_config(config).map(Arc::new))
            .cloned()
    }

    /// The process-wide registry, if [`Registry::init_global`] has run.
    pub fn global() -> Option<Arc<Registry>> {
        GLOBAL.get().cloned()
    }

    /// Route a file name to its unit by (case-insensitive) extension.
    pub fn lookup(&self, filename: impl AsRef<Path>) -> Result<Arc<dyn Converter>, ConvertError> {
        let extension = extension_of(filename.as_ref());
        self.converters
            .get(&extension)
            .cloned()
            .ok_or(ConvertError::UnsupportedFormat { extension })
    }

    /// Source extension → declared targets, for every registered unit.
    pub fn capabilities(&self) -> BTreeMap<String, Vec<String>> {
        self.converters
            .iter()
            .map(|(ext, c)| (ext.clone(), c.meta().supported_targets.clone()))
            .collect()
    }

    pub fn contains(&self, extension: &str) -> bool {
        self.converters.contains_key(&normalize_extension(extension))
    }

    pub fn len(&self) -> usize {
        self.converters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }

    /// Registered units in extension order.
    pub fn converters(&self) -> impl Iterator<Item = (&str, &Arc<dyn Converter>)> {
        self.converters.iter().map(|(k, v)| (k.as_str(), v))
    }
}

/// Builder for [`Registry`].
#[derive(Default)]
pub struct RegistryBuilder {
    converters: BTreeMap<String, Arc<dyn Converter>>,
    strict: bool,
}

impl RegistryBuilder {
    /// Fail on a second unit for one extension instead of replacing the first.
    pub fn strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    /// Add `unit` under its declared source extension.
    pub fn register(mut self, unit: Arc<dyn Converter>) -> Result<Self, ConvertError> {
        let meta = unit.meta();
        let extension = normalize_extension(&meta.source_format);
        if extension.is_empty() {
            return Err(ConvertError::Internal(format!(
                "converter '{}' declares no source format",
                meta.name
            )));
        }

        if let Some(existing) = self.converters.get(&extension) {
            let existing = existing.meta().name.clone();
            if self.strict {
                return Err(ConvertError::DuplicateRegistration {
                    extension,
                    existing,
                    replacement: meta.name.clone(),
                });
            }
            warn!(
                "Extension {} already handled by {}; replacing with {}",
                extension, existing, meta.name
            );
        }

        debug!("Registered {} for {}", meta.name, extension);
        self.converters.insert(extension, unit);
        Ok(self)
    }

    pub fn build(self) -> Registry {
        Registry {
            converters: self.converters,
        }
    }
}
