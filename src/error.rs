// src/error.rs
//
// Every fallible postfx call returns PostFxError. Each variant maps to one
// ErrorCategory; hosts branch on the category, not the variant:
// UserError and ResourceLimit are the caller's to fix, Degraded means a
// fallback was drawn instead, CodecError and InternalBug are surfaced as-is.

use std::borrow::Cow;
use thiserror::Error;

/// Error taxonomy used by callers to decide between surfacing and recovering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCategory {
    /// Bad path, color or argument
    UserError,
    /// Decoder, encoder or resampler rejected the pixels
    CodecError,
    /// Dimension, pixel-count or filesystem limit
    ResourceLimit,
    /// A collaborator failed; a fallback was substituted
    Degraded,
    /// A stage panicked
    InternalBug,
}

impl ErrorCategory {
    /// Stable string code for logs and host bindings.
    pub fn code(&self) -> &'static str {
        match self {
            ErrorCategory::UserError => "POSTFX_USER_ERROR",
            ErrorCategory::CodecError => "POSTFX_CODEC_ERROR",
            ErrorCategory::ResourceLimit => "POSTFX_RESOURCE_LIMIT",
            ErrorCategory::Degraded => "POSTFX_DEGRADED",
            ErrorCategory::InternalBug => "POSTFX_INTERNAL_BUG",
        }
    }
}

/// postfx error types
#[derive(Debug, Error)]
pub enum PostFxError {
    // File I/O Errors
    #[error("File not found: {path}")]
    FileNotFound { path: Cow<'static, str> },

    #[error("Failed to read file '{path}': {source}")]
    FileReadFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write file '{path}': {source}")]
    FileWriteFailed {
        path: Cow<'static, str>,
        #[source]
        source: std::io::Error,
    },

    // Decode Errors
    #[error("Unsupported image format: {format}")]
    UnsupportedFormat { format: Cow<'static, str> },

    #[error("Failed to decode image: {message}")]
    DecodeFailed { message: Cow<'static, str> },

    // Size Limit Errors
    #[error("Image dimension {dimension} exceeds maximum {max}")]
    DimensionExceedsLimit { dimension: u32, max: u32 },

    #[error("Image pixel count {pixels} exceeds maximum {max}")]
    PixelCountExceedsLimit { pixels: u64, max: u64 },

    // Collaborator Errors (recovered by fallbacks)
    #[error("No usable font resource: {reason}")]
    FontUnavailable { reason: Cow<'static, str> },

    #[error("Underline curve rendering unavailable: {reason}")]
    CurveRenderUnavailable { reason: Cow<'static, str> },

    #[error("Invalid color '{value}'. Expected #RRGGBB")]
    InvalidColor { value: Cow<'static, str> },

    // Operation Errors
    #[error("Invalid value for {name}: {value}. {reason}")]
    InvalidArgument {
        name: Cow<'static, str>,
        value: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    #[error("Resize failed ({source_width}x{source_height} -> {target_width}x{target_height}): {message}")]
    ResizeFailed {
        source_width: u32,
        source_height: u32,
        target_width: u32,
        target_height: u32,
        message: Cow<'static, str>,
    },

    // Encode Errors
    #[error("Failed to encode as {format}: {message}")]
    EncodeFailed {
        format: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    // Internal Errors
    #[error("Internal error: {message}")]
    InternalPanic { message: Cow<'static, str> },
}

impl PostFxError {
    pub fn file_not_found(path: impl Into<Cow<'static, str>>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    pub fn file_read_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::FileReadFailed {
            path: path.into(),
            source,
        }
    }

    pub fn file_write_failed(path: impl Into<Cow<'static, str>>, source: std::io::Error) -> Self {
        Self::FileWriteFailed {
            path: path.into(),
            source,
        }
    }

    pub fn unsupported_format(format: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    pub fn decode_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::DecodeFailed {
            message: message.into(),
        }
    }

    pub fn dimension_exceeds_limit(dimension: u32, max: u32) -> Self {
        Self::DimensionExceedsLimit { dimension, max }
    }

    pub fn pixel_count_exceeds_limit(pixels: u64, max: u64) -> Self {
        Self::PixelCountExceedsLimit { pixels, max }
    }

    pub fn font_unavailable(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::FontUnavailable {
            reason: reason.into(),
        }
    }

    pub fn curve_render_unavailable(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::CurveRenderUnavailable {
            reason: reason.into(),
        }
    }

    pub fn invalid_color(value: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidColor {
            value: value.into(),
        }
    }

    pub fn invalid_argument(
        name: impl Into<Cow<'static, str>>,
        value: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn resize_failed(
        source_dims: (u32, u32),
        target_dims: (u32, u32),
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::ResizeFailed {
            source_width: source_dims.0,
            source_height: source_dims.1,
            target_width: target_dims.0,
            target_height: target_dims.1,
            message: message.into(),
        }
    }

    pub fn encode_failed(
        format: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::EncodeFailed {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn internal_panic(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InternalPanic {
            message: message.into(),
        }
    }

    /// Check if this error is recoverable (the caller can substitute or retry)
    ///
    /// Consistent with category():
    /// - UserError, ResourceLimit and Degraded errors are recoverable
    /// - CodecError and InternalBug errors are not
    pub fn is_recoverable(&self) -> bool {
        match self.category() {
            ErrorCategory::UserError | ErrorCategory::ResourceLimit | ErrorCategory::Degraded => {
                true
            }
            ErrorCategory::CodecError | ErrorCategory::InternalBug => false,
        }
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::FileNotFound { .. }
            | Self::InvalidColor { .. }
            | Self::InvalidArgument { .. } => ErrorCategory::UserError,

            Self::UnsupportedFormat { .. }
            | Self::DecodeFailed { .. }
            | Self::EncodeFailed { .. }
            | Self::ResizeFailed { .. } => ErrorCategory::CodecError,

            // Read/write failures usually mean permissions or a full disk.
            Self::DimensionExceedsLimit { .. }
            | Self::PixelCountExceedsLimit { .. }
            | Self::FileReadFailed { .. }
            | Self::FileWriteFailed { .. } => ErrorCategory::ResourceLimit,

            Self::FontUnavailable { .. } | Self::CurveRenderUnavailable { .. } => {
                ErrorCategory::Degraded
            }

            Self::InternalPanic { .. } => ErrorCategory::InternalBug,
        }
    }
}
