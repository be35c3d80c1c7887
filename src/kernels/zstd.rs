//! This module contains the pure, stateless kernels for performing Zstandard
//! compression and decompression.
//!
//! The archive storage backend runs every field payload through this kernel.
//! The container header records the uncompressed length, so `decode` takes an
//! expected length instead of carrying its own size prefix, pre-allocates
//! exactly that much, and treats any disagreement as corruption. This module
//! is a safe, panic-free wrapper around the `zstd` crate.

use std::io::Write;
use zstd::stream::Encoder;

use crate::error::MinibenchError;

/// Default compression level used by the archive writers.
pub const DEFAULT_LEVEL: i32 = 3;

//==================================================================================
// 1. Public API
//==================================================================================

/// Compresses a byte slice into a single Zstandard frame.
pub fn encode(input_bytes: &[u8], level: i32) -> Result<Vec<u8>, MinibenchError> {
    let mut output_buf = Vec::with_capacity(input_bytes.len() / 2 + 64);

    // We use the streaming Encoder, which writes directly to the output buffer.
    let mut encoder =
        Encoder::new(&mut output_buf, level).map_err(|e| MinibenchError::ZstdError(e.to_string()))?;
    encoder
        .write_all(input_bytes)
        .map_err(|e| MinibenchError::ZstdError(e.to_string()))?;

    // `finish` is essential to finalize the Zstd frame.
    encoder
        .finish()
        .map_err(|e| MinibenchError::ZstdError(e.to_string()))?;

    Ok(output_buf)
}

/// Decompresses a Zstandard frame whose uncompressed size is already known
/// from container metadata.
pub fn decode(input_bytes: &[u8], expected_len: usize) -> Result<Vec<u8>, MinibenchError> {
    let mut decompressed_data = Vec::with_capacity(expected_len);
    zstd::stream::copy_decode(input_bytes, &mut decompressed_data)
        .map_err(|e| MinibenchError::ZstdError(e.to_string()))?;

    if decompressed_data.len() != expected_len {
        return Err(MinibenchError::ZstdError(format!(
            "Decompressed size does not match metadata. Expected {}, got {}.",
            expected_len,
            decompressed_data.len()
        )));
    }

    Ok(decompressed_data)
}

//==================================================================================
// 2. Unit Tests
//==================================================================================
