// In: src/error.rs

//! This module defines the single, unified error type for the entire minibench library.
//! It uses the `thiserror` crate to provide ergonomic, context-aware error handling.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum MinibenchError {
    // =========================================================================
    // === High-Level, Semantic Errors (Specific to our library's logic)
    // =========================================================================
    /// A requested slice shape is incompatible with its source shape.
    /// Raised by sampler construction, before any data is read.
    #[error("Invalid slice shape: {0}")]
    InvalidShape(String),

    /// A source could not be opened: missing file, unreadable file, or
    /// malformed container metadata. Raised at open, never mid-stream.
    #[error("Source unavailable: {0}")]
    SourceUnavailable(String),

    /// The multiplexer has no usable sources to draw from.
    #[error("Multiplexer pool is empty: {0}")]
    EmptyPool(String),

    #[error("Unsupported element type for this operation: {0}")]
    UnsupportedType(String),

    /// A container's payload region is inconsistent with its own metadata.
    #[error("Storage format error: {0}")]
    StorageFormat(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Internal logic error (this is a bug): {0}")]
    InternalError(String),

    // =========================================================================
    // === External Error Wrappers (Using #[from] for automatic conversion)
    // =========================================================================
    /// An error originating from the underlying I/O subsystem (e.g., file not found).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// An error from the Serde JSON library, typically during manifest or
    /// benchmark-file deserialization.
    #[error("Serde JSON error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    /// An error from a safe byte-casting operation failing.
    #[error("Byte slice casting error: {0}")]
    PodCast(String), // Manual `From` impl is needed as bytemuck::PodCastError doesn't impl Error

    /// An error for Python FFI (Foreign Function Interface) operations.
    #[cfg(feature = "python")]
    #[error("FFI operation failed: {0}")]
    FfiError(String), // PyErr doesn't impl Error, so we can't use #[from] here.

    // =========================================================================
    // === Low-Level Kernel/Transport Errors
    // =========================================================================
    #[error("Buffer length mismatch: expected a multiple of {0}, got {1}")]
    BufferMismatch(usize, usize),

    #[error("Zstd operation failed: {0}")]
    ZstdError(String),

    #[error("Stream channel error: {0}")]
    ChannelError(String),
}

// =============================================================================
// === Manual `From` Implementations ===
// =============================================================================

impl From<bytemuck::PodCastError> for MinibenchError {
    fn from(err: bytemuck::PodCastError) -> Self {
        MinibenchError::PodCast(err.to_string())
    }
}

#[cfg(feature = "python")]
impl From<pyo3::PyErr> for MinibenchError {
    fn from(err: pyo3::PyErr) -> Self {
        MinibenchError::FfiError(err.to_string())
    }
}

#[cfg(feature = "python")]
impl From<MinibenchError> for pyo3::PyErr {
    fn from(err: MinibenchError) -> pyo3::PyErr {
        use pyo3::exceptions::{PyIOError, PyValueError};
        match err {
            MinibenchError::Io(_) | MinibenchError::SourceUnavailable(_) => {
                PyIOError::new_err(err.to_string())
            }
            _ => PyValueError::new_err(err.to_string()),
        }
    }
}
