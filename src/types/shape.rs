// In: src/types/shape.rs

//! Validated geometry types: the shape of a stored array and the coordinates
//! of one rectangular window into it.
//!
//! Every backend resolves a `Shape` at open time and every sampler draws
//! `SliceSpec` windows against it, so the validation here is what guarantees
//! that read paths never see out-of-bounds coordinates.

use crate::error::MinibenchError;
use ndarray::SliceInfoElem;
use std::fmt;

/// The shape of an n-dimensional array: an ordered list of positive extents.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape(Vec<usize>);

impl Shape {
    /// Builds a shape, rejecting rank zero and zero-sized dimensions.
    pub fn new(dims: Vec<usize>) -> Result<Self, MinibenchError> {
        if dims.is_empty() {
            return Err(MinibenchError::InvalidShape(
                "shape must have at least one dimension".to_string(),
            ));
        }
        if let Some(pos) = dims.iter().position(|&d| d == 0) {
            return Err(MinibenchError::InvalidShape(format!(
                "dimension {} of shape {:?} is zero",
                pos, dims
            )));
        }
        Ok(Shape(dims))
    }

    /// Internal constructor for dims already known to be valid.
    pub(crate) fn new_unchecked(dims: Vec<usize>) -> Self {
        Shape(dims)
    }

    pub fn ndim(&self) -> usize {
        self.0.len()
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    /// Total number of elements.
    pub fn num_elements(&self) -> usize {
        self.0.iter().product()
    }

    /// True if a window of shape `other` fits inside `self` in every dimension.
    pub fn contains(&self, other: &Shape) -> bool {
        self.ndim() == other.ndim() && self.0.iter().zip(other.0.iter()).all(|(d, s)| s <= d)
    }

    /// Row-major element strides.
    pub fn strides(&self) -> Vec<usize> {
        let mut strides = vec![1usize; self.ndim()];
        for i in (0..self.ndim().saturating_sub(1)).rev() {
            strides[i] = strides[i + 1] * self.0[i + 1];
        }
        strides
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, d) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}", d)?;
        }
        write!(f, ")")
    }
}

/// One rectangular window: a half-open `(start, stop)` range per dimension.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceSpec(Vec<(usize, usize)>);

impl SliceSpec {
    /// Builds a spec, rejecting rank zero and empty or inverted ranges.
    pub fn new(ranges: Vec<(usize, usize)>) -> Result<Self, MinibenchError> {
        if ranges.is_empty() {
            return Err(MinibenchError::InvalidShape(
                "slice must have at least one dimension".to_string(),
            ));
        }
        for (i, &(start, stop)) in ranges.iter().enumerate() {
            if stop <= start {
                return Err(MinibenchError::InvalidShape(format!(
                    "slice range {}..{} in dimension {} is empty",
                    start, stop, i
                )));
            }
        }
        Ok(SliceSpec(ranges))
    }

    /// Builds the spec covering `slice_shape` starting at `offsets`.
    /// Callers guarantee matching rank; the offset generator always does.
    pub(crate) fn from_offsets(offsets: &[usize], slice_shape: &Shape) -> Self {
        SliceSpec(
            offsets
                .iter()
                .zip(slice_shape.dims().iter())
                .map(|(&start, &len)| (start, start + len))
                .collect(),
        )
    }

    pub fn ndim(&self) -> usize {
        self.0.len()
    }

    pub fn ranges(&self) -> &[(usize, usize)] {
        &self.0
    }

    /// The shape of the window this spec selects.
    pub fn shape(&self) -> Shape {
        Shape::new_unchecked(self.0.iter().map(|&(start, stop)| stop - start).collect())
    }

    /// True if every range ends within the matching dimension of `shape`.
    pub fn fits_within(&self, shape: &Shape) -> bool {
        self.ndim() == shape.ndim()
            && self
                .0
                .iter()
                .zip(shape.dims().iter())
                .all(|(&(_, stop), &dim)| stop <= dim)
    }

    /// Converts the spec into `ndarray` slice info for in-memory extraction.
    pub fn to_slice_info(&self) -> Vec<SliceInfoElem> {
        self.0
            .iter()
            .map(|&(start, stop)| SliceInfoElem::Slice {
                start: start as isize,
                end: Some(stop as isize),
                step: 1,
            })
            .collect()
    }
}

impl fmt::Display for SliceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, &(start, stop)) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{}:{}", start, stop)?;
        }
        write!(f, "]")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::ArrayD;

    #[test]
    fn test_shape_rejects_degenerate_dims() {
        assert!(Shape::new(vec![]).is_err());
        assert!(Shape::new(vec![4, 0, 2]).is_err());
        assert!(Shape::new(vec![20, 20]).is_ok());
    }

    #[test]
    fn test_shape_contains() {
        let source = Shape::new(vec![20, 20]).unwrap();
        assert!(source.contains(&Shape::new(vec![3, 2]).unwrap()));
        assert!(source.contains(&Shape::new(vec![20, 20]).unwrap()));
        assert!(!source.contains(&Shape::new(vec![21, 2]).unwrap()));
        assert!(!source.contains(&Shape::new(vec![3]).unwrap()));
    }

    #[test]
    fn test_row_major_strides() {
        let shape = Shape::new(vec![4, 3, 2]).unwrap();
        assert_eq!(shape.strides(), vec![6, 2, 1]);
        assert_eq!(Shape::new(vec![7]).unwrap().strides(), vec![1]);
    }

    #[test]
    fn test_slice_spec_validation() {
        assert!(SliceSpec::new(vec![]).is_err());
        assert!(SliceSpec::new(vec![(3, 3)]).is_err());
        assert!(SliceSpec::new(vec![(5, 2)]).is_err());
        let spec = SliceSpec::new(vec![(3, 6), (0, 2)]).unwrap();
        assert_eq!(spec.shape().dims(), &[3, 2]);
        assert_eq!(spec.to_string(), "[3:6, 0:2]");
    }

    #[test]
    fn test_fits_within() {
        let shape = Shape::new(vec![10, 10]).unwrap();
        let spec = SliceSpec::new(vec![(7, 10), (0, 2)]).unwrap();
        assert!(spec.fits_within(&shape));
        let spec = SliceSpec::new(vec![(8, 11), (0, 2)]).unwrap();
        assert!(!spec.fits_within(&shape));
    }

    #[test]
    fn test_slice_info_extraction() {
        let data: Vec<f64> = (0..12).map(|v| v as f64).collect();
        let arr = ArrayD::from_shape_vec(ndarray::IxDyn(&[3, 4]), data).unwrap();
        let spec = SliceSpec::new(vec![(1, 3), (2, 4)]).unwrap();
        let window = arr.slice(spec.to_slice_info().as_slice()).to_owned();
        assert_eq!(window.shape(), &[2, 2]);
        let values: Vec<f64> = window.iter().copied().collect();
        assert_eq!(values, vec![6.0, 7.0, 10.0, 11.0]);
    }

    #[test]
    fn test_from_offsets_covers_slice_shape() {
        let slice = Shape::new(vec![3, 2]).unwrap();
        let spec = SliceSpec::from_offsets(&[4, 7], &slice);
        assert_eq!(spec.ranges(), &[(4, 7), (7, 9)]);
        assert_eq!(spec.shape(), slice);
    }
}
