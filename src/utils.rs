//! This module provides a set of shared, low-level utility functions used
//! throughout the minibench Rust core.
//!
//! Its primary responsibilities include:
//! 1.  Providing safe, validated conversions between raw byte buffers and
//!     typed element vectors.
//! 2.  Keeping every byte-reinterpretation behind `bytemuck`, so no module
//!     in the crate needs its own `unsafe` block.

use std::path::Path;

use crate::error::MinibenchError;

//==================================================================================
// 1. Core Utility Functions
//==================================================================================

/// Converts a slice of primitive elements into a borrowed byte view.
///
/// Zero-copy; the bytes are the native (little-endian on all supported
/// targets) representation the storage formats write verbatim.
pub fn typed_slice_to_bytes<T: bytemuck::Pod>(data: &[T]) -> &[u8] {
    bytemuck::cast_slice(data)
}

/// Converts a raw byte buffer into an owned vector of primitive elements.
///
/// File reads land in heap buffers with no alignment guarantee for `T`, so
/// this copies element-by-element via `pod_read_unaligned` instead of
/// casting the buffer in place.
///
/// # Errors
/// Returns `MinibenchError::BufferMismatch` if the byte length is not a
/// multiple of `size_of::<T>()`.
pub fn typed_vec_from_bytes<T: bytemuck::Pod>(bytes: &[u8]) -> Result<Vec<T>, MinibenchError> {
    let elem_size = std::mem::size_of::<T>();
    if elem_size == 0 {
        return Ok(Vec::new());
    }
    if bytes.len() % elem_size != 0 {
        return Err(MinibenchError::BufferMismatch(elem_size, bytes.len()));
    }
    Ok(bytes
        .chunks_exact(elem_size)
        .map(bytemuck::pod_read_unaligned)
        .collect())
}

/// Returns the UTF-8 file stem of a path, if it has one.
///
/// Collection converters use the stem as the item key when a flat file
/// becomes a dataset or entity.
pub fn file_stem(path: &Path) -> Option<&str> {
    path.file_stem().and_then(|s| s.to_str())
}
