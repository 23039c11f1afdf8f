use std::path::PathBuf;
use thiserror::Error;

/// Structured error types for the segmentation service.
///
/// Each variant captures context specific to its error domain (filesystem,
/// image handling, model inference), so callers can report precise messages
/// without parsing error strings. Sources are `Send + Sync` because errors
/// cross the blocking-task boundary in the HTTP adapter.
#[derive(Error, Debug)]
pub enum SegmentError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Filesystem error: {operation} failed for {path:?}")]
    FileSystem {
        path: PathBuf,
        operation: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not read the image file: {message}")]
    ImageDecode { message: String },

    #[error("Image processing error: {operation} failed")]
    ImageProcessing {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Model error: {operation} failed")]
    Model {
        operation: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {field} {reason}")]
    Validation { field: String, reason: String },
}

pub type Result<T> = std::result::Result<T, SegmentError>;

impl From<anyhow::Error> for SegmentError {
    fn from(err: anyhow::Error) -> Self {
        SegmentError::Configuration {
            message: err.to_string(),
        }
    }
}

/// Fallback for I/O errors without path/operation context. Code that has
/// context constructs `SegmentError::FileSystem` directly.
impl From<std::io::Error> for SegmentError {
    fn from(err: std::io::Error) -> Self {
        Self::FileSystem {
            path: PathBuf::from("unknown"),
            operation: "unknown".to_string(),
            source: err,
        }
    }
}

impl From<image::ImageError> for SegmentError {
    fn from(err: image::ImageError) -> Self {
        Self::ImageProcessing {
            operation: "image processing".to_string(),
            source: Box::new(err),
        }
    }
}

impl From<ort::Error> for SegmentError {
    fn from(err: ort::Error) -> Self {
        Self::Model {
            operation: "ort operation".to_string(),
            source: Box::new(err),
        }
    }
}

/// Shape errors occur during tensor operations that belong to inference, so
/// they are categorized as model errors rather than a separate tensor type.
impl From<ndarray::ShapeError> for SegmentError {
    fn from(err: ndarray::ShapeError) -> Self {
        Self::Model {
            operation: "tensor shape conversion".to_string(),
            source: Box::new(err),
        }
    }
}
