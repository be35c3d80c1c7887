// In: src/sampling/indices.rs

//! The random offset generator: an infinite (or bounded) sequence of window
//! coordinates over a fixed source shape.
//!
//! This is the only place sampling randomness for a single source lives. The
//! generator is pure computation: geometry is validated once in `new`, and
//! iteration just draws offsets, so everything that can fail does so before
//! the first window is yielded.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::config::SliceOpts;
use crate::error::MinibenchError;
use crate::types::{Shape, SliceSpec};

/// Yields uniformly random `SliceSpec` windows of a fixed shape over a fixed
/// source shape. Each dimension's start offset is drawn independently and
/// uniformly from `[0, source_dim - slice_dim]`; repeats are allowed.
pub struct RandomSlices {
    source: Shape,
    slice: Shape,
    rng: StdRng,
    remaining: Option<u64>,
}

impl RandomSlices {
    /// Builds a generator, rejecting any slice shape that does not fit the
    /// source: rank mismatch, zero dimensions, or an oversized extent all
    /// fail here with `InvalidShape`, never mid-iteration.
    pub fn new(
        source_shape: &Shape,
        slice_shape: &[usize],
        opts: SliceOpts,
    ) -> Result<Self, MinibenchError> {
        let slice = Shape::new(slice_shape.to_vec())?;
        if slice.ndim() != source_shape.ndim() {
            return Err(MinibenchError::InvalidShape(format!(
                "slice rank {} does not match source rank {}",
                slice.ndim(),
                source_shape.ndim()
            )));
        }
        if !source_shape.contains(&slice) {
            return Err(MinibenchError::InvalidShape(format!(
                "slice shape {} does not fit within source shape {}",
                slice, source_shape
            )));
        }

        let rng = match opts.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(Self {
            source: source_shape.clone(),
            slice,
            rng,
            remaining: opts.max_count,
        })
    }

    /// The window shape every yielded spec selects.
    pub fn slice_shape(&self) -> &Shape {
        &self.slice
    }
}

impl Iterator for RandomSlices {
    type Item = SliceSpec;

    fn next(&mut self) -> Option<SliceSpec> {
        match self.remaining.as_mut() {
            Some(0) => return None,
            Some(n) => *n -= 1,
            None => {}
        }

        let offsets: Vec<usize> = self
            .source
            .dims()
            .iter()
            .zip(self.slice.dims().iter())
            .map(|(&dim, &win)| self.rng.random_range(0..=dim - win))
            .collect();

        Some(SliceSpec::from_offsets(&offsets, &self.slice))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shape(dims: &[usize]) -> Shape {
        Shape::new(dims.to_vec()).unwrap()
    }

    fn opts(max_count: Option<u64>, seed: Option<u64>) -> SliceOpts {
        SliceOpts { max_count, seed }
    }

    #[test]
    fn test_every_window_has_the_requested_shape_and_fits() {
        let source = shape(&[20, 20]);
        let gen = RandomSlices::new(&source, &[3, 2], opts(Some(200), Some(42))).unwrap();
        let mut count = 0;
        for spec in gen {
            assert_eq!(spec.shape().dims(), &[3, 2]);
            assert!(spec.fits_within(&source));
            count += 1;
        }
        assert_eq!(count, 200);
    }

    #[test]
    fn test_seeded_runs_replay_the_same_sequence() {
        let source = shape(&[64, 64, 8]);
        let first: Vec<SliceSpec> = RandomSlices::new(&source, &[8, 8, 4], opts(Some(50), Some(7)))
            .unwrap()
            .collect();
        let second: Vec<SliceSpec> = RandomSlices::new(&source, &[8, 8, 4], opts(Some(50), Some(7)))
            .unwrap()
            .collect();
        assert_eq!(first, second);
    }

    #[test]
    fn test_full_size_slice_always_starts_at_origin() {
        let source = shape(&[5, 3]);
        let mut gen = RandomSlices::new(&source, &[5, 3], opts(Some(4), Some(0))).unwrap();
        for _ in 0..4 {
            let spec = gen.next().unwrap();
            assert_eq!(spec.ranges(), &[(0, 5), (0, 3)]);
        }
    }

    #[test]
    fn test_invalid_geometry_fails_before_iteration() {
        let source = shape(&[20, 20]);
        assert!(matches!(
            RandomSlices::new(&source, &[21, 2], SliceOpts::default()),
            Err(MinibenchError::InvalidShape(_))
        ));
        assert!(matches!(
            RandomSlices::new(&source, &[3], SliceOpts::default()),
            Err(MinibenchError::InvalidShape(_))
        ));
        assert!(matches!(
            RandomSlices::new(&source, &[3, 0], SliceOpts::default()),
            Err(MinibenchError::InvalidShape(_))
        ));
    }

    #[test]
    fn test_max_count_zero_yields_nothing() {
        let source = shape(&[4, 4]);
        let mut gen = RandomSlices::new(&source, &[2, 2], opts(Some(0), Some(1))).unwrap();
        assert!(gen.next().is_none());
    }
}
