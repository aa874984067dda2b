//! Conversion model and the conversion capability.
//!
//! The capability is a stateless, reentrant unit behind the [`Converter`]
//! trait: `convert(request) -> Result<ConversionResult>`. Both protocol
//! adapters and the batch orchestrator only ever see the trait;
//! [`HtmlConverter`] is the implementation shipped with the service.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::{ConverterConfig, Error, Result};
use crate::validation::validate_input_size;

pub mod html;

pub use html::HtmlConverter;

// =============================================================================
// Request model
// =============================================================================

/// One HTML document to convert.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionRequest {
    /// HTML input. Missing is treated as empty so that a batch item without
    /// html fails on its own instead of rejecting the whole batch.
    #[serde(default)]
    pub html: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<ConvertOptions>,

    /// Plugin names, applied in order. Duplicates are ignored.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub plugins: Vec<String>,

    /// Base URL used to resolve relative links and images.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub domain: Option<String>,
}

impl ConversionRequest {
    pub fn new(html: impl Into<String>) -> Self {
        Self {
            html: html.into(),
            ..Default::default()
        }
    }
}

/// Rendering options. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvertOptions {
    /// Trim leading and trailing whitespace on every output line.
    pub trim_spaces: bool,
    /// Emit unsupported tags verbatim instead of unwrapping them.
    pub keep_unknown_tags: bool,
    /// Recorded on extracted link metadata when the anchor has no target.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub link_target: Option<String>,
    /// Resolve image sources against `domain`.
    pub image_absolute_path: bool,
    pub code_block_style: CodeBlockStyle,
    /// Render tables without cell padding.
    pub table_compact: bool,
    pub emphasis_style: EmphasisStyle,
    pub bold_style: BoldStyle,
    pub heading_style: HeadingStyle,
    pub bullet_list_marker: BulletMarker,
    pub ordered_list_marker: OrderedMarker,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeBlockStyle {
    #[default]
    Fenced,
    Indented,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmphasisStyle {
    #[default]
    #[serde(rename = "*")]
    Asterisk,
    #[serde(rename = "_")]
    Underscore,
}

impl EmphasisStyle {
    pub fn delimiter(self) -> &'static str {
        match self {
            EmphasisStyle::Asterisk => "*",
            EmphasisStyle::Underscore => "_",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoldStyle {
    #[default]
    #[serde(rename = "**")]
    Asterisks,
    #[serde(rename = "__")]
    Underscores,
}

impl BoldStyle {
    pub fn delimiter(self) -> &'static str {
        match self {
            BoldStyle::Asterisks => "**",
            BoldStyle::Underscores => "__",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HeadingStyle {
    #[default]
    Atx,
    Setext,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum BulletMarker {
    #[default]
    #[serde(rename = "-")]
    Dash,
    #[serde(rename = "*")]
    Asterisk,
    #[serde(rename = "+")]
    Plus,
}

impl BulletMarker {
    pub fn as_str(self) -> &'static str {
        match self {
            BulletMarker::Dash => "-",
            BulletMarker::Asterisk => "*",
            BulletMarker::Plus => "+",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderedMarker {
    #[default]
    #[serde(rename = ".")]
    Period,
    #[serde(rename = ")")]
    Paren,
}

impl OrderedMarker {
    pub fn as_str(self) -> &'static str {
        match self {
            OrderedMarker::Period => ".",
            OrderedMarker::Paren => ")",
        }
    }
}

// =============================================================================
// Result model
// =============================================================================

/// Output of one successful conversion. Immutable once produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionResult {
    pub markdown: String,
    pub stats: ConversionStats,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ConversionMeta>,
}

/// Sizes, timing and element counts for one conversion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionStats {
    /// Input HTML size in bytes.
    pub input_size: usize,
    /// Output Markdown size in bytes.
    pub output_size: usize,
    #[serde(with = "humantime_serde")]
    pub processing_time: Duration,
    /// Elements visited in the document body.
    pub elements_count: usize,
    /// Elements rendered to a Markdown construct or passed through.
    pub converted_count: usize,
    /// Elements dropped (scripts, styles) or unwrapped as unsupported.
    pub skipped_count: usize,
    pub plugins_used: Vec<String>,
}

/// Document metadata extracted alongside the Markdown.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ConversionMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub keywords: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub author: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub images: Vec<ImageInfo>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub links: Vec<LinkInfo>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub custom_meta: HashMap<String, String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub src: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LinkInfo {
    pub href: String,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<String>,
}

/// Capability metadata reported by the info endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConverterInfo {
    pub version: String,
    pub supported_plugins: Vec<String>,
    pub features: Vec<String>,
}

// =============================================================================
// Capability
// =============================================================================

/// HTML to Markdown conversion capability.
///
/// Implementations must be stateless and safe for concurrent reentrant calls;
/// no locking is done around them. Validation failures (empty input, no tags)
/// are reported as errors like any other conversion failure.
#[cfg_attr(test, mockall::automock)]
pub trait Converter: Send + Sync + fmt::Debug {
    fn convert(&self, request: &ConversionRequest) -> Result<ConversionResult>;

    fn info(&self) -> ConverterInfo;
}

/// Per-call limits applied around the capability.
#[derive(Debug, Clone)]
pub struct ConversionLimits {
    pub max_input_size: usize,
    pub timeout: Duration,
    pub default_plugins: Vec<String>,
}

impl From<&ConverterConfig> for ConversionLimits {
    fn from(config: &ConverterConfig) -> Self {
        Self {
            max_input_size: config.max_input_size,
            timeout: config.timeout,
            default_plugins: config.default_plugins.clone(),
        }
    }
}

impl Default for ConversionLimits {
    fn default() -> Self {
        Self::from(&ConverterConfig::default())
    }
}

/// Run one conversion on the blocking pool under `limits`.
///
/// A conversion that outlives `limits.timeout` is abandoned: the caller gets
/// a timeout error and the blocking task's result is discarded.
pub async fn convert_bounded(
    converter: Arc<dyn Converter>,
    mut request: ConversionRequest,
    limits: &ConversionLimits,
) -> Result<ConversionResult> {
    validate_input_size(&request.html, limits.max_input_size)?;
    if request.plugins.is_empty() {
        request.plugins = limits.default_plugins.clone();
    }

    let task = tokio::task::spawn_blocking(move || converter.convert(&request));
    match tokio::time::timeout(limits.timeout, task).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_err)) => Err(Error::internal(format!("converter task failed: {}", join_err))),
        Err(_elapsed) => Err(Error::timeout(format!(
            "conversion exceeded {:?}",
            limits.timeout
        ))),
    }
}
