//! Error types for extractd.
//!
//! Every fallible operation in the crate returns [`ExtractdError`]. The variants
//! follow the failure classes of the ingestion and extraction pipeline:
//!
//! - `Io` - file system and pipe errors, always bubbled up unchanged
//! - `TooLarge` / `ZeroLength` - ingestion-size errors, raised before any byte is read
//! - `UnsupportedFormat` - carries a short escaped prefix of the content
//! - `SelfForkUnavailable` / `Subprocess` - worker process failures
//! - `Fetch` - transport failures and non-2xx origin answers
//! - `Output` - the caller-supplied writer failed after streaming began
//! - `Cache`, `Ocr` - auxiliary subsystems, degraded by callers rather than fatal
//!
//! # Example
//!
//! ```rust
//! use extractd::{ExtractdError, Result};
//!
//! fn check_declared(size: i64, limit: u64) -> Result<()> {
//!     if size == 0 {
//!         return Err(ExtractdError::ZeroLength);
//!     }
//!     if size > 0 && size as u64 > limit {
//!         return Err(ExtractdError::TooLarge { declared: size as u64, limit });
//!     }
//!     Ok(())
//! }
//!
//! assert!(check_declared(10, 5).is_err());
//! ```
use thiserror::Error;

/// Result type alias using `ExtractdError`.
pub type Result<T> = std::result::Result<T, ExtractdError>;

/// Number of content bytes shown in unsupported-format errors.
pub const SNIPPET_LEN: usize = 32;

/// Main error type for all extractd operations.
#[derive(Debug, Error)]
pub enum ExtractdError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parsing error: {message}")]
    Parsing {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("OCR error: {message}")]
    Ocr {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Validation error: {message}")]
    Validation {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Cache error: {message}")]
    Cache {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Serialization error: {message}")]
    Serialization {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Subprocess error: {message}")]
    Subprocess {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Document too large: declared {declared} bytes exceeds limit of {limit} bytes")]
    TooLarge { declared: u64, limit: u64 },

    #[error("Document has zero length")]
    ZeroLength,

    #[error("Unsupported format: {message} (content prefix: \"{snippet}\")")]
    UnsupportedFormat { message: String, snippet: String },

    #[error("Cannot fork worker: {0}")]
    SelfForkUnavailable(String),

    #[error("Text stream already consumed")]
    StreamConsumed,

    #[error("Document has no page structure")]
    NotPaginated,

    #[error("Fetch failed{}: {message}", .status.map(|s| format!(" with status {s}")).unwrap_or_default())]
    Fetch { status: Option<u16>, message: String },

    #[error("Output write failed: {0}")]
    Output(#[source] std::io::Error),

    #[error("Missing dependency: {0}")]
    MissingDependency(String),

    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for ExtractdError {
    fn from(err: serde_json::Error) -> Self {
        ExtractdError::Serialization {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<rmp_serde::encode::Error> for ExtractdError {
    fn from(err: rmp_serde::encode::Error) -> Self {
        ExtractdError::Serialization {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<rmp_serde::decode::Error> for ExtractdError {
    fn from(err: rmp_serde::decode::Error) -> Self {
        ExtractdError::Serialization {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

impl From<crate::pdf::error::PdfError> for ExtractdError {
    fn from(err: crate::pdf::error::PdfError) -> Self {
        ExtractdError::Parsing {
            message: err.to_string(),
            source: Some(Box::new(err)),
        }
    }
}

macro_rules! error_constructor {
    ($name:ident, $variant:ident) => {
        pastey::paste! {
            #[doc = "Create a " $variant " error"]
            pub fn $name<S: Into<String>>(message: S) -> Self {
                Self::$variant {
                    message: message.into(),
                    source: None,
                }
            }

            #[doc = "Create a " $variant " error with source"]
            pub fn [<$name _with_source>]<S: Into<String>, E: std::error::Error + Send + Sync + 'static>(
                message: S,
                source: E,
            ) -> Self {
                Self::$variant {
                    message: message.into(),
                    source: Some(Box::new(source)),
                }
            }
        }
    };
}

impl ExtractdError {
    error_constructor!(parsing, Parsing);
    error_constructor!(ocr, Ocr);
    error_constructor!(validation, Validation);
    error_constructor!(cache, Cache);
    error_constructor!(serialization, Serialization);
    error_constructor!(subprocess, Subprocess);

    /// Build an unsupported-format error quoting at most [`SNIPPET_LEN`] bytes of `content`.
    pub fn unsupported<S: Into<String>>(message: S, content: &[u8]) -> Self {
        Self::UnsupportedFormat {
            message: message.into(),
            snippet: content_snippet(content),
        }
    }

    pub fn fetch<S: Into<String>>(status: Option<u16>, message: S) -> Self {
        Self::Fetch {
            status,
            message: message.into(),
        }
    }

    /// Whether the error came from writing to the caller's output after streaming began.
    pub fn is_output_failure(&self) -> bool {
        matches!(self, Self::Output(_))
    }

    /// Request-level status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Self::TooLarge { .. } => 413,
            Self::ZeroLength | Self::Parsing { .. } => 422,
            Self::UnsupportedFormat { .. } => 415,
            Self::Validation { .. } => 400,
            Self::Fetch { status, .. } => match status {
                Some(code) if (400..500).contains(code) => *code,
                Some(_) => 502,
                None => 400,
            },
            Self::Output(_) => crate::extractor::status::CLIENT_GONE,
            _ => 500,
        }
    }
}

/// Escaped, length-limited rendering of the start of a payload.
pub fn content_snippet(content: &[u8]) -> String {
    let end = content.len().min(SNIPPET_LEN);
    String::from_utf8_lossy(&content[..end]).escape_debug().to_string()
}
