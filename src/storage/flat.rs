// In: src/storage/flat.rs

//! The flat container: one array per file, one fixed self-describing header,
//! one raw payload. This is the simplest backend and the canonical
//! interchange format the collection converters start from.
//!
//! Layout (all integers little-endian):
//!
//! ```text
//! magic(4) | version(2) | dtype code(1) | ndim(1) | dims(u64 x ndim) | payload
//! ```
//!
//! `FlatSource` offers two read modes mirroring the two ways a benchmark
//! wants to touch these files: `Eager` materializes the payload once at
//! open, `Windowed` keeps the file handle and reads only the requested
//! window per slice.

use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;

use bytemuck::Zeroable;
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

use crate::error::MinibenchError;
use crate::storage::{ensure_fits, open_file, read_windowed, slice_array, SliceSource};
use crate::traits::Element;
use crate::types::{ElementType, Shape, SliceSpec};
use crate::utils::typed_slice_to_bytes;

//==================================================================================
// Format Constants
//==================================================================================

pub const FLAT_MAGIC: &[u8; 4] = b"MBAR";
pub const FLAT_FORMAT_VERSION: u16 = 1;
/// A sane rank limit so a corrupt ndim byte cannot trigger a huge read.
const MAX_REASONABLE_NDIM: usize = 32;

/// How a `FlatSource` services slice reads.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReadMode {
    /// Materialize the whole payload at open; slices are in-memory copies.
    #[default]
    Eager,
    /// Keep the file handle; each slice reads only its contiguous runs.
    Windowed,
}

//==================================================================================
// Writer / Reader entry points
//==================================================================================

/// Writes one array as a flat container file.
pub fn write_flat<T, P>(path: P, array: &ArrayD<T>) -> Result<(), MinibenchError>
where
    T: Element,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let shape = Shape::new(array.shape().to_vec())?;
    if shape.ndim() > MAX_REASONABLE_NDIM {
        return Err(MinibenchError::InvalidShape(format!(
            "rank {} exceeds the format limit of {}",
            shape.ndim(),
            MAX_REASONABLE_NDIM
        )));
    }

    let mut header = Vec::with_capacity(8 + 8 * shape.ndim());
    header.extend_from_slice(FLAT_MAGIC);
    header.extend_from_slice(&FLAT_FORMAT_VERSION.to_le_bytes());
    header.push(T::ELEMENT_TYPE.code());
    header.push(shape.ndim() as u8);
    for &dim in shape.dims() {
        header.extend_from_slice(&(dim as u64).to_le_bytes());
    }

    // Canonicalize so the payload is row-major regardless of the input's
    // memory layout.
    let canonical = array.as_standard_layout();
    let elements = canonical.as_slice().ok_or_else(|| {
        MinibenchError::InternalError("canonicalized array is not contiguous".to_string())
    })?;

    let mut file = File::create(path)?;
    file.write_all(&header)?;
    file.write_all(typed_slice_to_bytes(elements))?;
    Ok(())
}

/// Resolves a flat file's element type and shape from its header alone.
pub fn peek_flat<P: AsRef<Path>>(path: P) -> Result<(ElementType, Shape), MinibenchError> {
    let path = path.as_ref();
    let mut file = open_file(path)?;
    let header = read_header(&mut file, path)?;
    validate_payload_len(&file, path, &header)?;
    Ok((header.dtype, header.shape))
}

/// Reads a whole flat file into memory.
pub fn read_flat<T, P>(path: P) -> Result<ArrayD<T>, MinibenchError>
where
    T: Element,
    P: AsRef<Path>,
{
    let path = path.as_ref();
    let mut file = open_file(path)?;
    let header = read_header(&mut file, path)?;
    validate_payload_len(&file, path, &header)?;
    check_dtype::<T>(path, header.dtype)?;

    let mut elements: Vec<T> = vec![T::zeroed(); header.shape.num_elements()];
    file.read_exact(bytemuck::cast_slice_mut(&mut elements))
        .map_err(|e| open_failure(path, &format!("truncated payload ({})", e)))?;

    ArrayD::from_shape_vec(IxDyn(header.shape.dims()), elements)
        .map_err(|e| MinibenchError::InternalError(format!("payload assembly failed: {}", e)))
}

//==================================================================================
// FlatSource
//==================================================================================

/// An opened flat file serving window reads. Owns its handle; dropping the
/// source releases the file.
pub struct FlatSource<T: Element> {
    shape: Shape,
    state: State<T>,
}

enum State<T> {
    Eager(ArrayD<T>),
    Windowed { file: File, payload_offset: u64 },
}

impl<T: Element> FlatSource<T> {
    pub fn open<P: AsRef<Path>>(path: P, mode: ReadMode) -> Result<Self, MinibenchError> {
        let path = path.as_ref();
        match mode {
            ReadMode::Eager => {
                let array = read_flat::<T, _>(path)?;
                let shape = Shape::new_unchecked(array.shape().to_vec());
                Ok(FlatSource {
                    shape,
                    state: State::Eager(array),
                })
            }
            ReadMode::Windowed => {
                let mut file = open_file(path)?;
                let header = read_header(&mut file, path)?;
                validate_payload_len(&file, path, &header)?;
                check_dtype::<T>(path, header.dtype)?;
                Ok(FlatSource {
                    shape: header.shape,
                    state: State::Windowed {
                        file,
                        payload_offset: header.payload_offset,
                    },
                })
            }
        }
    }

    pub fn mode(&self) -> ReadMode {
        match self.state {
            State::Eager(_) => ReadMode::Eager,
            State::Windowed { .. } => ReadMode::Windowed,
        }
    }
}

impl<T: Element> SliceSource<T> for FlatSource<T> {
    fn shape(&self) -> &Shape {
        &self.shape
    }

    fn read_slice(&mut self, spec: &SliceSpec) -> Result<ArrayD<T>, MinibenchError> {
        match &mut self.state {
            State::Eager(array) => {
                ensure_fits(spec, &self.shape)?;
                Ok(slice_array(array, spec))
            }
            State::Windowed {
                file,
                payload_offset,
            } => read_windowed(file, *payload_offset, &self.shape, spec),
        }
    }
}

//==================================================================================
// Private Helpers
//==================================================================================

struct FlatHeader {
    dtype: ElementType,
    shape: Shape,
    payload_offset: u64,
}

fn open_failure(path: &Path, msg: &str) -> MinibenchError {
    MinibenchError::SourceUnavailable(format!("{}: {}", path.display(), msg))
}

fn read_header(file: &mut File, path: &Path) -> Result<FlatHeader, MinibenchError> {
    let mut fixed = [0u8; 8];
    file.read_exact(&mut fixed)
        .map_err(|e| open_failure(path, &format!("truncated header ({})", e)))?;

    if &fixed[0..4] != FLAT_MAGIC {
        return Err(open_failure(path, "bad magic number"));
    }
    let version = u16::from_le_bytes([fixed[4], fixed[5]]);
    if version != FLAT_FORMAT_VERSION {
        return Err(open_failure(
            path,
            &format!(
                "unsupported format version: expected {}, got {}",
                FLAT_FORMAT_VERSION, version
            ),
        ));
    }
    let dtype = ElementType::from_code(fixed[6]).map_err(|e| open_failure(path, &e.to_string()))?;
    let ndim = fixed[7] as usize;
    if ndim == 0 || ndim > MAX_REASONABLE_NDIM {
        return Err(open_failure(path, &format!("implausible rank {}", ndim)));
    }

    let mut dims = Vec::with_capacity(ndim);
    let mut dim_buf = [0u8; 8];
    for _ in 0..ndim {
        file.read_exact(&mut dim_buf)
            .map_err(|e| open_failure(path, &format!("truncated dims ({})", e)))?;
        dims.push(u64::from_le_bytes(dim_buf) as usize);
    }
    let shape = Shape::new(dims).map_err(|e| open_failure(path, &e.to_string()))?;

    Ok(FlatHeader {
        dtype,
        shape,
        payload_offset: (8 + 8 * ndim) as u64,
    })
}

/// Cross-checks the file length against the declared shape so truncation is
/// caught at open, not mid-stream.
fn validate_payload_len(
    file: &File,
    path: &Path,
    header: &FlatHeader,
) -> Result<(), MinibenchError> {
    let expected =
        header.payload_offset + (header.shape.num_elements() * header.dtype.size_bytes()) as u64;
    let actual = file
        .metadata()
        .map_err(|e| open_failure(path, &e.to_string()))?
        .len();
    if actual != expected {
        return Err(open_failure(
            path,
            &format!(
                "payload length mismatch: header declares {} bytes, file has {}",
                expected, actual
            ),
        ));
    }
    Ok(())
}

fn check_dtype<T: Element>(path: &Path, stored: ElementType) -> Result<(), MinibenchError> {
    if stored != T::ELEMENT_TYPE {
        return Err(MinibenchError::UnsupportedType(format!(
            "{} holds {}, requested {}",
            path.display(),
            stored,
            T::ELEMENT_TYPE
        )));
    }
    Ok(())
}

//==================================================================================
// Unit Tests
//==================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Seek, SeekFrom};
    use tempfile::tempdir;

    fn ramp_array(dims: &[usize]) -> ArrayD<f64> {
        let n: usize = dims.iter().product();
        ArrayD::from_shape_vec(IxDyn(dims), (0..n).map(|v| v as f64).collect()).unwrap()
    }

    #[test]
    fn test_write_read_roundtrip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.arr");
        let original = ramp_array(&[6, 4]);

        write_flat(&path, &original).unwrap();
        let loaded = read_flat::<f64, _>(&path).unwrap();
        assert_eq!(loaded, original);
    }

    #[test]
    fn test_peek_resolves_shape_and_dtype() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.arr");
        write_flat(&path, &ramp_array(&[3, 5, 2])).unwrap();

        let (dtype, shape) = peek_flat(&path).unwrap();
        assert_eq!(dtype, ElementType::Float64);
        assert_eq!(shape.dims(), &[3, 5, 2]);
    }

    #[test]
    fn test_windowed_matches_eager() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.arr");
        write_flat(&path, &ramp_array(&[8, 8])).unwrap();

        let mut eager = FlatSource::<f64>::open(&path, ReadMode::Eager).unwrap();
        let mut windowed = FlatSource::<f64>::open(&path, ReadMode::Windowed).unwrap();
        assert_eq!(eager.shape(), windowed.shape());

        for spec in [
            SliceSpec::new(vec![(0, 3), (5, 8)]).unwrap(),
            SliceSpec::new(vec![(6, 8), (0, 1)]).unwrap(),
            SliceSpec::new(vec![(0, 8), (0, 8)]).unwrap(),
        ] {
            assert_eq!(
                eager.read_slice(&spec).unwrap(),
                windowed.read_slice(&spec).unwrap()
            );
        }
    }

    #[test]
    fn test_missing_file_is_source_unavailable() {
        let dir = tempdir().unwrap();
        let result = FlatSource::<f64>::open(dir.path().join("nope.arr"), ReadMode::Eager);
        assert!(matches!(
            result,
            Err(MinibenchError::SourceUnavailable(_))
        ));
    }

    #[test]
    fn test_bad_magic_is_source_unavailable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("junk.arr");
        std::fs::write(&path, b"not a container at all").unwrap();

        let result = peek_flat(&path);
        assert!(matches!(
            result,
            Err(MinibenchError::SourceUnavailable(_))
        ));
    }

    #[test]
    fn test_truncated_payload_fails_at_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.arr");
        write_flat(&path, &ramp_array(&[4, 4])).unwrap();

        // Chop off the last element.
        let file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        let len = file.metadata().unwrap().len();
        file.set_len(len - 8).unwrap();

        let result = FlatSource::<f64>::open(&path, ReadMode::Windowed);
        assert!(matches!(
            result,
            Err(MinibenchError::SourceUnavailable(_))
        ));
    }

    #[test]
    fn test_dtype_mismatch_is_unsupported_type() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.arr");
        write_flat(&path, &ramp_array(&[4])).unwrap();

        let result = read_flat::<f32, _>(&path);
        assert!(matches!(result, Err(MinibenchError::UnsupportedType(_))));
    }

    #[test]
    fn test_corrupt_version_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("a.arr");
        write_flat(&path, &ramp_array(&[4])).unwrap();

        let mut file = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        file.seek(SeekFrom::Start(4)).unwrap();
        file.write_all(&[0xFF, 0xFF]).unwrap();

        let result = peek_flat(&path);
        assert!(matches!(
            result,
            Err(MinibenchError::SourceUnavailable(_))
        ));
    }
}
