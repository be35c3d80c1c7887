// In: src/storage/tree.rs

//! The tree container: many datasets in one file, addressed by
//! slash-separated paths, with a JSON manifest appended as a footer.
//!
//! Layout:
//!
//! ```text
//! magic(4) | version(2) | payload blobs... | manifest JSON | manifest_len(8) | magic(4)
//! ```
//!
//! The manifest is the single source of truth for what the file contains:
//! opening resolves every dataset's dtype, shape, and payload extent from it
//! without reading a payload byte, and cross-checks each extent against the
//! file length so corruption fails at open. A writer that is dropped before
//! `finish` leaves no trailing manifest, and open rejects the file.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use bytemuck::Zeroable;
use ndarray::{ArrayD, IxDyn};
use serde::{Deserialize, Serialize};

use crate::error::MinibenchError;
use crate::storage::{open_file, read_windowed, SliceSource};
use crate::traits::Element;
use crate::types::{ElementType, Shape, SliceSpec};
use crate::utils::typed_slice_to_bytes;

//==================================================================================
// Format Constants
//==================================================================================

pub const TREE_MAGIC: &[u8; 4] = b"MBTR";
pub const TREE_FORMAT_VERSION: u16 = 1;
/// magic(4) + version(2)
const PREAMBLE_LEN: u64 = 6;
/// manifest_len(8) + magic(4)
const TRAILER_LEN: u64 = 12;
/// A reasonable limit to prevent OOM from a malformed manifest length. (64MB)
const MAX_REASONABLE_MANIFEST_LEN: u64 = 64 * 1024 * 1024;

//==================================================================================
// Manifest (wire format)
//==================================================================================

/// One manifest entry, exactly as serialized into the footer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DatasetEntry {
    pub path: String,
    pub dtype: ElementType,
    pub shape: Vec<usize>,
    /// Absolute payload position in the file.
    pub offset: u64,
    pub nbytes: u64,
}

#[derive(Serialize, Deserialize, Debug, Clone)]
struct TreeManifest {
    format_version: u16,
    datasets: Vec<DatasetEntry>,
}

/// A manifest entry after open-time validation.
#[derive(Debug, Clone)]
struct ValidatedEntry {
    dtype: ElementType,
    shape: Shape,
    offset: u64,
    nbytes: u64,
}

//==================================================================================
// Writer
//==================================================================================

/// Appends datasets to a new tree file; `finish` seals it with the manifest.
pub struct TreeWriter {
    file: File,
    entries: Vec<DatasetEntry>,
    position: u64,
}

impl TreeWriter {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, MinibenchError> {
        let mut file = File::create(path.as_ref())?;
        file.write_all(TREE_MAGIC)?;
        file.write_all(&TREE_FORMAT_VERSION.to_le_bytes())?;
        Ok(TreeWriter {
            file,
            entries: Vec::new(),
            position: PREAMBLE_LEN,
        })
    }

    /// Appends one dataset under a slash-separated path.
    pub fn put<T: Element>(
        &mut self,
        dataset_path: &str,
        array: &ArrayD<T>,
    ) -> Result<(), MinibenchError> {
        if dataset_path.is_empty() {
            return Err(MinibenchError::StorageFormat(
                "dataset path must not be empty".to_string(),
            ));
        }
        if self.entries.iter().any(|e| e.path == dataset_path) {
            return Err(MinibenchError::StorageFormat(format!(
                "duplicate dataset path '{}'",
                dataset_path
            )));
        }

        let shape = Shape::new(array.shape().to_vec())?;
        let canonical = array.as_standard_layout();
        let elements = canonical.as_slice().ok_or_else(|| {
            MinibenchError::InternalError("canonicalized array is not contiguous".to_string())
        })?;
        let bytes = typed_slice_to_bytes(elements);

        self.file.write_all(bytes)?;
        self.entries.push(DatasetEntry {
            path: dataset_path.to_string(),
            dtype: T::ELEMENT_TYPE,
            shape: shape.dims().to_vec(),
            offset: self.position,
            nbytes: bytes.len() as u64,
        });
        self.position += bytes.len() as u64;
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Seals the file: manifest JSON, manifest length, trailing magic.
    pub fn finish(mut self) -> Result<(), MinibenchError> {
        let manifest = TreeManifest {
            format_version: TREE_FORMAT_VERSION,
            datasets: std::mem::take(&mut self.entries),
        };
        let footer = serde_json::to_vec(&manifest)?;
        self.file.write_all(&footer)?;
        self.file.write_all(&(footer.len() as u64).to_le_bytes())?;
        self.file.write_all(TREE_MAGIC)?;
        Ok(())
    }
}

//==================================================================================
// Reader
//==================================================================================

/// An opened tree file: validated manifest plus the underlying handle.
pub struct TreeFile {
    file: File,
    path: PathBuf,
    entries: BTreeMap<String, ValidatedEntry>,
}

impl TreeFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, MinibenchError> {
        let path = path.as_ref();
        let mut file = open_file(path)?;
        let fail = |msg: String| MinibenchError::SourceUnavailable(format!("{}: {}", path.display(), msg));

        let total = file.metadata().map_err(|e| fail(e.to_string()))?.len();
        if total < PREAMBLE_LEN + TRAILER_LEN {
            return Err(fail(format!("file too small ({} bytes)", total)));
        }

        let mut preamble = [0u8; 6];
        file.read_exact(&mut preamble)
            .map_err(|e| fail(e.to_string()))?;
        if &preamble[0..4] != TREE_MAGIC {
            return Err(fail("bad leading magic number".to_string()));
        }
        let version = u16::from_le_bytes([preamble[4], preamble[5]]);
        if version != TREE_FORMAT_VERSION {
            return Err(fail(format!(
                "unsupported format version: expected {}, got {}",
                TREE_FORMAT_VERSION, version
            )));
        }

        file.seek(SeekFrom::Start(total - TRAILER_LEN))
            .map_err(|e| fail(e.to_string()))?;
        let mut trailer = [0u8; 12];
        file.read_exact(&mut trailer)
            .map_err(|e| fail(e.to_string()))?;
        if &trailer[8..12] != TREE_MAGIC {
            return Err(fail("bad trailing magic number (unfinished file?)".to_string()));
        }
        let manifest_len = u64::from_le_bytes([
            trailer[0], trailer[1], trailer[2], trailer[3], trailer[4], trailer[5], trailer[6],
            trailer[7],
        ]);
        if manifest_len > MAX_REASONABLE_MANIFEST_LEN
            || PREAMBLE_LEN + manifest_len + TRAILER_LEN > total
        {
            return Err(fail(format!("implausible manifest length {}", manifest_len)));
        }

        let payload_end = total - TRAILER_LEN - manifest_len;
        file.seek(SeekFrom::Start(payload_end))
            .map_err(|e| fail(e.to_string()))?;
        let mut manifest_bytes = vec![0u8; manifest_len as usize];
        file.read_exact(&mut manifest_bytes)
            .map_err(|e| fail(e.to_string()))?;
        let manifest: TreeManifest =
            serde_json::from_slice(&manifest_bytes).map_err(|e| fail(e.to_string()))?;
        if manifest.format_version != TREE_FORMAT_VERSION {
            return Err(fail(format!(
                "manifest declares version {}, file declares {}",
                manifest.format_version, TREE_FORMAT_VERSION
            )));
        }

        let mut entries = BTreeMap::new();
        for entry in manifest.datasets {
            let shape = Shape::new(entry.shape.clone()).map_err(|e| fail(e.to_string()))?;
            let expected = (shape.num_elements() * entry.dtype.size_bytes()) as u64;
            if entry.nbytes != expected {
                return Err(fail(format!(
                    "dataset '{}' declares {} bytes but its shape {} implies {}",
                    entry.path, entry.nbytes, shape, expected
                )));
            }
            if entry.offset < PREAMBLE_LEN || entry.offset + entry.nbytes > payload_end {
                return Err(fail(format!(
                    "dataset '{}' extent {}..{} escapes the payload region",
                    entry.path,
                    entry.offset,
                    entry.offset + entry.nbytes
                )));
            }
            let validated = ValidatedEntry {
                dtype: entry.dtype,
                shape,
                offset: entry.offset,
                nbytes: entry.nbytes,
            };
            if entries.insert(entry.path.clone(), validated).is_some() {
                return Err(fail(format!("duplicate dataset path '{}'", entry.path)));
            }
        }

        Ok(TreeFile {
            file,
            path: path.to_path_buf(),
            entries,
        })
    }

    /// Dataset paths in sorted order.
    pub fn dataset_paths(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    pub fn contains(&self, dataset: &str) -> bool {
        self.entries.contains_key(dataset)
    }

    /// Resolves one dataset's dtype and shape from the manifest.
    pub fn shape_of(&self, dataset: &str) -> Result<(ElementType, Shape), MinibenchError> {
        let entry = self.lookup(dataset)?;
        Ok((entry.dtype, entry.shape.clone()))
    }

    /// Reads one whole dataset into memory.
    pub fn read_dataset<T: Element>(
        &mut self,
        dataset: &str,
    ) -> Result<ArrayD<T>, MinibenchError> {
        let entry = self.lookup(dataset)?.clone();
        check_dtype::<T>(dataset, entry.dtype)?;

        let mut elements: Vec<T> = vec![T::zeroed(); entry.shape.num_elements()];
        self.file.seek(SeekFrom::Start(entry.offset))?;
        self.file
            .read_exact(bytemuck::cast_slice_mut(&mut elements))?;
        ArrayD::from_shape_vec(IxDyn(entry.shape.dims()), elements)
            .map_err(|e| MinibenchError::InternalError(format!("payload assembly failed: {}", e)))
    }

    fn lookup(&self, dataset: &str) -> Result<&ValidatedEntry, MinibenchError> {
        self.entries.get(dataset).ok_or_else(|| {
            MinibenchError::SourceUnavailable(format!(
                "{}: no dataset named '{}'",
                self.path.display(),
                dataset
            ))
        })
    }
}

//==================================================================================
// TreeDataset
//==================================================================================

/// One dataset of a tree file, opened for windowed reads. Owns its handle.
pub struct TreeDataset<T: Element> {
    file: File,
    shape: Shape,
    offset: u64,
    _marker: std::marker::PhantomData<T>,
}

impl<T: Element> TreeDataset<T> {
    pub fn open<P: AsRef<Path>>(path: P, dataset: &str) -> Result<Self, MinibenchError> {
        let tree = TreeFile::open(path)?;
        let entry = tree.lookup(dataset)?.clone();
        check_dtype::<T>(dataset, entry.dtype)?;

        let TreeFile { file, .. } = tree;
        Ok(TreeDataset {
            file,
            shape: entry.shape,
            offset: entry.offset,
            _marker: std::marker::PhantomData,
        })
    }
}

impl<T: Element> SliceSource<T> for TreeDataset<T> {
    fn shape(&self) -> &Shape {
        &self.shape
    }

    fn read_slice(&mut self, spec: &SliceSpec) -> Result<ArrayD<T>, MinibenchError> {
        read_windowed(&mut self.file, self.offset, &self.shape, spec)
    }
}

fn check_dtype<T: Element>(dataset: &str, stored: ElementType) -> Result<(), MinibenchError> {
    if stored != T::ELEMENT_TYPE {
        return Err(MinibenchError::UnsupportedType(format!(
            "dataset '{}' holds {}, requested {}",
            dataset,
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
    use crate::storage::slice_array;
    use tempfile::tempdir;

    fn ramp_array(dims: &[usize], base: f64) -> ArrayD<f64> {
        let n: usize = dims.iter().product();
        ArrayD::from_shape_vec(IxDyn(dims), (0..n).map(|v| base + v as f64).collect()).unwrap()
    }

    fn build_tree(path: &Path) -> (ArrayD<f64>, ArrayD<f64>, ArrayD<f64>) {
        let a = ramp_array(&[5, 4], 0.0);
        let b = ramp_array(&[3, 3, 3], 100.0);
        let c = ramp_array(&[7], 1000.0);

        let mut writer = TreeWriter::create(path).unwrap();
        writer.put("group/a", &a).unwrap();
        writer.put("group/b", &b).unwrap();
        writer.put("solo", &c).unwrap();
        writer.finish().unwrap();
        (a, b, c)
    }

    #[test]
    fn test_tree_roundtrip_and_sorted_paths() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.tree");
        let (a, b, c) = build_tree(&path);

        let mut tree = TreeFile::open(&path).unwrap();
        let paths: Vec<&str> = tree.dataset_paths().collect();
        assert_eq!(paths, vec!["group/a", "group/b", "solo"]);

        assert_eq!(tree.read_dataset::<f64>("group/a").unwrap(), a);
        assert_eq!(tree.read_dataset::<f64>("group/b").unwrap(), b);
        assert_eq!(tree.read_dataset::<f64>("solo").unwrap(), c);
    }

    #[test]
    fn test_shape_resolution_from_manifest() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.tree");
        build_tree(&path);

        let tree = TreeFile::open(&path).unwrap();
        let (dtype, shape) = tree.shape_of("group/b").unwrap();
        assert_eq!(dtype, ElementType::Float64);
        assert_eq!(shape.dims(), &[3, 3, 3]);
    }

    #[test]
    fn test_windowed_dataset_matches_direct_slice() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.tree");
        let (a, _, _) = build_tree(&path);

        let mut dataset = TreeDataset::<f64>::open(&path, "group/a").unwrap();
        let spec = SliceSpec::new(vec![(1, 4), (2, 4)]).unwrap();
        assert_eq!(dataset.read_slice(&spec).unwrap(), slice_array(&a, &spec));
    }

    #[test]
    fn test_duplicate_dataset_rejected_at_write() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.tree");
        let a = ramp_array(&[2, 2], 0.0);

        let mut writer = TreeWriter::create(&path).unwrap();
        writer.put("x", &a).unwrap();
        let result = writer.put("x", &a);
        assert!(matches!(result, Err(MinibenchError::StorageFormat(_))));
    }

    #[test]
    fn test_missing_dataset_is_source_unavailable() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.tree");
        build_tree(&path);

        let result = TreeDataset::<f64>::open(&path, "group/zzz");
        assert!(matches!(
            result,
            Err(MinibenchError::SourceUnavailable(_))
        ));
    }

    #[test]
    fn test_unfinished_file_is_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.tree");
        {
            let mut writer = TreeWriter::create(&path).unwrap();
            writer.put("x", &ramp_array(&[4, 4], 0.0)).unwrap();
            // Dropped without finish: no manifest, no trailing magic.
        }

        let result = TreeFile::open(&path);
        assert!(matches!(
            result,
            Err(MinibenchError::SourceUnavailable(_))
        ));
    }

    #[test]
    fn test_manifest_extent_lies_are_rejected() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("t.tree");

        // Hand-build a file whose manifest claims more bytes than exist.
        let mut bytes = Vec::new();
        bytes.extend_from_slice(TREE_MAGIC);
        bytes.extend_from_slice(&TREE_FORMAT_VERSION.to_le_bytes());
        bytes.extend_from_slice(&[0u8; 16]); // a tiny payload region
        let manifest = serde_json::json!({
            "format_version": TREE_FORMAT_VERSION,
            "datasets": [{
                "path": "x",
                "dtype": "float64",
                "shape": [100, 100],
                "offset": 6,
                "nbytes": 80000
            }]
        });
        let footer = serde_json::to_vec(&manifest).unwrap();
        bytes.extend_from_slice(&footer);
        bytes.extend_from_slice(&(footer.len() as u64).to_le_bytes());
        bytes.extend_from_slice(TREE_MAGIC);
        std::fs::write(&path, &bytes).unwrap();

        let result = TreeFile::open(&path);
        assert!(matches!(
            result,
            Err(MinibenchError::SourceUnavailable(_))
        ));
    }
}
