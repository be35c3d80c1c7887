// In: src/sampling/samplers.rs

//! Single-source slice samplers: one open backend handle driven by one
//! offset generator.
//!
//! A sampler owns its `SliceSource` for its whole lifetime, so the backing
//! file handle lives exactly as long as the iteration and is released on
//! drop. All open-phase failures (missing file, malformed header, unknown
//! field) surface from the constructor; the stream itself only carries read
//! errors, and a read error ends the stream after being yielded once.

use std::marker::PhantomData;
use std::path::Path;

use ndarray::ArrayD;

use crate::config::SliceOpts;
use crate::error::MinibenchError;
use crate::sampling::indices::RandomSlices;
use crate::storage::{
    ArchiveSource, FlatSource, ReadMode, SliceSource, StashField, TreeDataset,
};
use crate::traits::Element;

/// One drawn sample: the extracted window under its conventional `x` label.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation<T: Element> {
    pub x: ArrayD<T>,
}

/// The uniform stream type the multiplexer and transport operate on. Errors
/// travel in-band as stream items.
pub type ObservationStream<T> =
    Box<dyn Iterator<Item = Result<Observation<T>, MinibenchError>> + Send>;

//==================================================================================
// The sampler
//==================================================================================

/// Draws random windows from one open source until its offset generator is
/// spent or a read fails.
pub struct SliceSampler<S, T> {
    source: S,
    indices: RandomSlices,
    failed: bool,
    _element: PhantomData<T>,
}

impl<S, T> SliceSampler<S, T>
where
    S: SliceSource<T>,
    T: Element,
{
    /// Wraps an already-open source. The slice shape is validated against
    /// the source shape here, so a misshapen request fails before the first
    /// pull.
    pub fn new(source: S, slice_shape: &[usize], opts: SliceOpts) -> Result<Self, MinibenchError> {
        let indices = RandomSlices::new(source.shape(), slice_shape, opts)?;
        Ok(Self {
            source,
            indices,
            failed: false,
            _element: PhantomData,
        })
    }

    /// The source shape windows are drawn against.
    pub fn source_shape(&self) -> &crate::types::Shape {
        self.source.shape()
    }
}

impl<S, T> Iterator for SliceSampler<S, T>
where
    S: SliceSource<T>,
    T: Element,
{
    type Item = Result<Observation<T>, MinibenchError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        let spec = self.indices.next()?;
        match self.source.read_slice(&spec) {
            Ok(x) => Some(Ok(Observation { x })),
            Err(e) => {
                // One structured error, then the stream is over.
                self.failed = true;
                Some(Err(e))
            }
        }
    }
}

//==================================================================================
// Per-backend constructors
//==================================================================================

/// Opens a flat array file and samples random windows from it.
///
/// `ReadMode::Eager` materializes the payload once and slices in memory;
/// `ReadMode::Windowed` keeps the file handle and reads only each window's
/// contiguous runs.
pub fn flat_random_slices<T, P>(
    path: P,
    mode: ReadMode,
    slice_shape: &[usize],
    opts: SliceOpts,
) -> Result<SliceSampler<FlatSource<T>, T>, MinibenchError>
where
    T: Element,
    P: AsRef<Path>,
{
    SliceSampler::new(FlatSource::open(path, mode)?, slice_shape, opts)
}

/// Opens one named field of an archive file and samples random windows from
/// the decompressed array.
pub fn archive_random_slices<T, P>(
    path: P,
    field: &str,
    slice_shape: &[usize],
    opts: SliceOpts,
) -> Result<SliceSampler<ArchiveSource<T>, T>, MinibenchError>
where
    T: Element,
    P: AsRef<Path>,
{
    SliceSampler::new(ArchiveSource::open(path, field)?, slice_shape, opts)
}

/// Opens one dataset of a tree container and samples random windows from it.
pub fn tree_random_slices<T, P>(
    path: P,
    dataset: &str,
    slice_shape: &[usize],
    opts: SliceOpts,
) -> Result<SliceSampler<TreeDataset<T>, T>, MinibenchError>
where
    T: Element,
    P: AsRef<Path>,
{
    SliceSampler::new(TreeDataset::open(path, dataset)?, slice_shape, opts)
}

/// Opens one field of one keyed entity in a stash and samples random windows
/// from it.
pub fn stash_random_slices<T, P>(
    path: P,
    key: &str,
    field: &str,
    slice_shape: &[usize],
    opts: SliceOpts,
) -> Result<SliceSampler<StashField<T>, T>, MinibenchError>
where
    T: Element,
    P: AsRef<Path>,
{
    SliceSampler::new(StashField::open(path, key, field)?, slice_shape, opts)
}
