// In: src/storage/mod.rs

//! # Storage Layer: Container Formats and the Slice-Read Contract
//!
//! ## ARCHITECTURAL OVERVIEW
//!
//! This module is the single home of everything that touches bytes on disk.
//! It defines four container formats and one capability contract, and the
//! sampling layer above it never learns which is which:
//!
//! ```text
//! +-----------+----------------------------------+---------------------------+
//! | Backend   | Layout                           | Read behavior             |
//! +-----------+----------------------------------+---------------------------+
//! | flat      | header + raw payload             | eager or windowed         |
//! | archive   | header + zstd field payloads     | whole field at open       |
//! | tree      | payload blobs + JSON manifest    | windowed per dataset      |
//! | stash     | tree with `key/field` paths      | windowed per entity field |
//! +-----------+----------------------------------+---------------------------+
//! ```
//!
//! Every backend resolves its array shape from metadata alone at open time
//! (fixed header or manifest footer), so a malformed source fails before any
//! payload byte is read. Payload bytes are always raw little-endian elements
//! in row-major order; the archive compresses them per field, the others
//! store them verbatim.

pub mod archive;
pub mod flat;
pub mod stash;
pub mod tree;

pub use archive::{peek_archive, read_archive_field, write_archive, ArchiveInfo, ArchiveSource};
pub use flat::{peek_flat, read_flat, write_flat, FlatSource, ReadMode};
pub use stash::{Stash, StashField, StashWriter};
pub use tree::{TreeDataset, TreeFile, TreeWriter};

use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use bytemuck::Zeroable;
use ndarray::{ArrayD, IxDyn};

use crate::error::MinibenchError;
use crate::traits::Element;
use crate::types::{Shape, SliceSpec};

/// The capability contract every backend exposes to the sampling layer:
/// a shape resolved once at open, and rectangular window reads against it.
///
/// `read_slice` takes `&mut self` because windowed backends seek a file
/// handle; one source therefore serves one iterating sampler at a time.
pub trait SliceSource<T: Element> {
    /// The source array shape, resolved from metadata at open time.
    fn shape(&self) -> &Shape;

    /// Reads one window. The spec must fit within `shape()`; backends
    /// reject anything else with `InvalidShape` before touching data.
    fn read_slice(&mut self, spec: &SliceSpec) -> Result<ArrayD<T>, MinibenchError>;
}

//==================================================================================
// Shared backend plumbing
//==================================================================================

/// Opens a file for reading, folding any I/O failure into the open-phase
/// error contract (`SourceUnavailable` with path context).
pub(crate) fn open_file(path: &Path) -> Result<File, MinibenchError> {
    File::open(path)
        .map_err(|e| MinibenchError::SourceUnavailable(format!("{}: {}", path.display(), e)))
}

pub(crate) fn ensure_fits(spec: &SliceSpec, shape: &Shape) -> Result<(), MinibenchError> {
    if spec.fits_within(shape) {
        Ok(())
    } else {
        Err(MinibenchError::InvalidShape(format!(
            "window {} does not fit within source shape {}",
            spec, shape
        )))
    }
}

/// Extracts one window from a fully materialized array.
pub(crate) fn slice_array<T: Clone>(array: &ArrayD<T>, spec: &SliceSpec) -> ArrayD<T> {
    array.slice(spec.to_slice_info().as_slice()).to_owned()
}

/// Reads one window of a row-major array region directly from a seekable
/// reader, without materializing the rest of the payload.
///
/// The window decomposes into contiguous runs along the innermost axis; this
/// walks an odometer over the outer window coordinates and issues one
/// seek + exact read per run, assembling the result in row-major order.
pub(crate) fn read_windowed<T, R>(
    reader: &mut R,
    payload_offset: u64,
    source_shape: &Shape,
    spec: &SliceSpec,
) -> Result<ArrayD<T>, MinibenchError>
where
    T: Element,
    R: Read + Seek,
{
    ensure_fits(spec, source_shape)?;

    let strides = source_shape.strides();
    let ndim = source_shape.ndim();
    let out_dims = spec.shape().dims().to_vec();
    let ranges = spec.ranges();
    let elem_size = std::mem::size_of::<T>();

    let mut out: Vec<T> = vec![T::zeroed(); out_dims.iter().product()];
    let out_bytes: &mut [u8] = bytemuck::cast_slice_mut(&mut out);

    let run_len = out_dims[ndim - 1];
    let run_bytes = run_len * elem_size;
    let outer_runs: usize = out_dims[..ndim - 1].iter().product();

    // Odometer over the outer window axes; empty for rank-1 sources.
    let mut counters = vec![0usize; ndim - 1];
    let mut cursor = 0usize;
    for _ in 0..outer_runs {
        let mut linear = ranges[ndim - 1].0 * strides[ndim - 1];
        for (axis, &count) in counters.iter().enumerate() {
            linear += (ranges[axis].0 + count) * strides[axis];
        }
        reader.seek(SeekFrom::Start(payload_offset + (linear * elem_size) as u64))?;
        reader.read_exact(&mut out_bytes[cursor..cursor + run_bytes])?;
        cursor += run_bytes;

        for axis in (0..counters.len()).rev() {
            counters[axis] += 1;
            if counters[axis] < out_dims[axis] {
                break;
            }
            counters[axis] = 0;
        }
    }

    ArrayD::from_shape_vec(IxDyn(&out_dims), out)
        .map_err(|e| MinibenchError::InternalError(format!("window assembly failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn ramp(n: usize) -> Vec<f64> {
        (0..n).map(|v| v as f64).collect()
    }

    #[test]
    fn test_read_windowed_matches_in_memory_slice() {
        let shape = Shape::new(vec![4, 5, 3]).unwrap();
        let data = ramp(shape.num_elements());
        let array = ArrayD::from_shape_vec(IxDyn(shape.dims()), data.clone()).unwrap();

        let bytes = crate::utils::typed_slice_to_bytes(&data).to_vec();
        let spec = SliceSpec::new(vec![(1, 3), (2, 5), (0, 2)]).unwrap();

        let mut cursor = Cursor::new(bytes);
        let windowed = read_windowed::<f64, _>(&mut cursor, 0, &shape, &spec).unwrap();
        let direct = slice_array(&array, &spec);
        assert_eq!(windowed, direct);
    }

    #[test]
    fn test_read_windowed_respects_payload_offset() {
        let shape = Shape::new(vec![6]).unwrap();
        let data = ramp(6);
        let mut bytes = vec![0xAAu8; 16];
        bytes.extend_from_slice(crate::utils::typed_slice_to_bytes(&data));

        let spec = SliceSpec::new(vec![(2, 5)]).unwrap();
        let mut cursor = Cursor::new(bytes);
        let windowed = read_windowed::<f64, _>(&mut cursor, 16, &shape, &spec).unwrap();
        let values: Vec<f64> = windowed.iter().copied().collect();
        assert_eq!(values, vec![2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_read_windowed_rejects_out_of_bounds_window() {
        let shape = Shape::new(vec![4, 4]).unwrap();
        let data = ramp(16);
        let bytes = crate::utils::typed_slice_to_bytes(&data).to_vec();

        let spec = SliceSpec::new(vec![(2, 5), (0, 2)]).unwrap();
        let mut cursor = Cursor::new(bytes);
        let result = read_windowed::<f64, _>(&mut cursor, 0, &shape, &spec);
        assert!(matches!(result, Err(MinibenchError::InvalidShape(_))));
    }
}
