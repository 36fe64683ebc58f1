use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Quality used when a caller does not specify one
pub const DEFAULT_QUALITY: u8 = 80;

/// Image formats recognised by extension
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ImageFormat {
    Jpeg,
    Png,
    WebP,
    Other(String),
}

impl ImageFormat {
    /// Determine format from file extension
    pub fn from_extension(ext: &str) -> Self {
        match ext.to_lowercase().as_str() {
            "jpg" | "jpeg" => Self::Jpeg,
            "png" => Self::Png,
            "webp" => Self::WebP,
            other => Self::Other(other.to_string()),
        }
    }

    /// Determine format from a path, `None` when the path has no extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(Self::from_extension)
    }

    /// Check if format can be fed to the converter
    pub fn is_supported_input(&self) -> bool {
        match self {
            Self::Jpeg | Self::Png => true,
            Self::WebP | Self::Other(_) => false,
        }
    }
}

/// Returns the extension of `path` as shown in error messages: lowercased,
/// with its leading dot, or empty when there is none.
pub fn display_extension(path: &Path) -> String {
    path.extension()
        .map(|ext| format!(".{}", ext.to_string_lossy().to_lowercase()))
        .unwrap_or_default()
}

/// Encoding options shared by single and batch conversions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionOptions {
    /// Lossy quality, 0-100
    pub quality: u8,

    /// Whether to encode losslessly
    pub lossless: bool,

    /// Whether to keep the source file after a successful conversion
    pub keep_original: bool,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            lossless: false,
            keep_original: false,
        }
    }
}

impl ConversionOptions {
    /// Build options, clamping quality into 0-100
    pub fn new(quality: i64, lossless: bool, keep_original: bool) -> Self {
        Self {
            quality: clamp_quality(quality),
            lossless,
            keep_original,
        }
    }
}

/// Clamp an arbitrary integer quality into 0-100
pub fn clamp_quality(quality: i64) -> u8 {
    quality.clamp(0, 100) as u8
}

/// A single conversion request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionRequest {
    /// Path as supplied by the caller, possibly relative
    pub source_path: PathBuf,

    pub options: ConversionOptions,
}

impl ConversionRequest {
    pub fn new<P: AsRef<Path>>(source_path: P, options: ConversionOptions) -> Self {
        Self {
            source_path: source_path.as_ref().to_path_buf(),
            options,
        }
    }
}

/// Outcome of a successful conversion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionSuccess {
    /// Resolved absolute path of the source image
    pub input_path: PathBuf,

    /// Path of the written WebP file
    pub output_path: PathBuf,

    /// Size reported for the source. When the source was deleted this is the
    /// size of the output file, not the original.
    pub size_before: u64,

    /// Size of the written output
    pub size_after: u64,

    pub quality: u8,
    pub lossless: bool,
}

/// Outcome of a failed conversion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversionFailure {
    /// Path exactly as supplied by the caller
    pub input_path: PathBuf,

    /// Human readable reason
    pub error: String,
}

/// Result of converting one image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ConversionResult {
    Success(ConversionSuccess),
    Failure(ConversionFailure),
}

impl ConversionResult {
    /// Build a failure for `input_path`
    pub fn failure<P: AsRef<Path>>(input_path: P, error: impl ToString) -> Self {
        Self::Failure(ConversionFailure {
            input_path: input_path.as_ref().to_path_buf(),
            error: error.to_string(),
        })
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// Input path of either variant
    pub fn input_path(&self) -> &Path {
        match self {
            Self::Success(success) => &success.input_path,
            Self::Failure(failure) => &failure.input_path,
        }
    }

    /// Error message, `None` for successes
    pub fn error(&self) -> Option<&str> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(&failure.error),
        }
    }
}

/// Ordered results of a batch, one entry per expanded input
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchResult {
    pub results: Vec<ConversionResult>,
}

impl BatchResult {
    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }

    pub fn succeeded(&self) -> usize {
        self.results.iter().filter(|r| r.is_success()).count()
    }

    pub fn failed(&self) -> usize {
        self.len() - self.succeeded()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ConversionResult> {
        self.results.iter()
    }
}

impl From<Vec<ConversionResult>> for BatchResult {
    fn from(results: Vec<ConversionResult>) -> Self {
        Self { results }
    }
}

impl std::ops::Index<usize> for BatchResult {
    type Output = ConversionResult;

    fn index(&self, index: usize) -> &Self::Output {
        &self.results[index]
    }
}
