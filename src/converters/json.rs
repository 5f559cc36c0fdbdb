//! Structured data → Markdown: embed a pretty-printed JSON document in a
//! fenced code block.

use super::write_atomic;
use crate::converter::{ConvertOptions, Converter, ConverterMeta};
use crate::error::ConvertError;
use crate::text::code_fence;
use async_trait::async_trait;
use serde::Serialize;
use serde_json::ser::PrettyFormatter;
use std::path::{Path, PathBuf};
use tracing::{error, info};

pub const NAME: &str = "json2md";

/// Converts `.json` files into a Markdown document with one `json` code block.
pub struct JsonToMarkdownConverter {
    meta: ConverterMeta,
    indent: usize,
}

impl JsonToMarkdownConverter {
    pub const SOURCE_FORMATS: &'static [&'static str] = &[".json"];
    pub const TARGETS: &'static [&'static str] = &[".md"];

    pub fn new(indent: usize) -> Result<Self, ConvertError> {
        Ok(Self {
            meta: ConverterMeta::new(
                NAME,
                "Convert JSON data to Markdown code block",
                ".json",
                Self::TARGETS,
            )?,
            indent,
        })
    }
}

#[async_trait]
impl Converter for JsonToMarkdownConverter {
    fn meta(&self) -> &ConverterMeta {
        &self.meta
    }

    async fn convert(
        &self,
        input: &Path,
        output: &Path,
        target: &str,
        _options: &ConvertOptions,
    ) -> Result<PathBuf, ConvertError> {
        self.meta.ensure_supported(target)?;

        let content = tokio::fs::read_to_string(input).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::InvalidData {
                ConvertError::MalformedInput {
                    path: input.to_path_buf(),
                    detail: format!("not valid UTF-8: {e}"),
                }
            } else {
                ConvertError::failed(NAME, format!("reading {}: {e}", input.display()))
            }
        })?;

        let markdown = render_markdown(&content, self.indent).map_err(|e| {
            error!("Failed to parse JSON file {}: {}", input.display(), e);
            ConvertError::MalformedInput {
                path: input.to_path_buf(),
                detail: e.to_string(),
            }
        })?;

        write_atomic(NAME, output, markdown.as_bytes()).await?;

        info!("Converted {} → {}", input.display(), output.display());
        Ok(output.to_path_buf())
    }
}

/// Parse `content` strictly and render the Markdown document.
///
/// Key order is preserved as found in the source (`serde_json` is built with
/// `preserve_order`) and non-ASCII characters are written as-is.
pub fn render_markdown(content: &str, indent: usize) -> Result<String, serde_json::Error> {
    let value: serde_json::Value = serde_json::from_str(content)?;
    let pretty = to_pretty_string(&value, indent)?;
    let fence = code_fence(&pretty);
    Ok(format!("# Converted JSON Data\n\n{fence}json\n{pretty}\n{fence}\n"))
}

fn to_pretty_string(value: &serde_json::Value, indent: usize) -> Result<String, serde_json::Error> {
    let indent = " ".repeat(indent);
    let mut buf = Vec::new();
    let mut ser = serde_json::Serializer::with_formatter(
        &mut buf,
        PrettyFormatter::with_indent(indent.as_bytes()),
    );
    value.serialize(&mut ser)?;
    // serde_json only ever emits valid UTF-8.
    Ok(String::from_utf8_lossy(&buf).into_owned())
}
