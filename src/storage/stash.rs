// In: src/storage/stash.rs

//! The stash container: keyed entities, each holding named array fields,
//! layered on the tree format. An entity's field lives at the dataset path
//! `key/field`, so the whole key-value surface is a naming convention plus
//! layout validation; the bytes on disk are a plain tree file.

use std::path::Path;

use ndarray::ArrayD;

use crate::error::MinibenchError;
use crate::storage::tree::{TreeDataset, TreeFile, TreeWriter};
use crate::storage::SliceSource;
use crate::traits::Element;
use crate::types::{ElementType, Shape, SliceSpec};

//==================================================================================
// Writer
//==================================================================================

/// Writes keyed entities into a new stash file.
pub struct StashWriter {
    inner: TreeWriter,
}

impl StashWriter {
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self, MinibenchError> {
        Ok(StashWriter {
            inner: TreeWriter::create(path)?,
        })
    }

    /// Writes one entity: a key plus its named array fields.
    pub fn put_entity<T: Element>(
        &mut self,
        key: &str,
        fields: &[(&str, &ArrayD<T>)],
    ) -> Result<(), MinibenchError> {
        validate_component(key, "key")?;
        if fields.is_empty() {
            return Err(MinibenchError::StorageFormat(format!(
                "entity '{}' needs at least one field",
                key
            )));
        }
        for (field, array) in fields {
            validate_component(field, "field")?;
            self.inner.put(&format!("{}/{}", key, field), array)?;
        }
        Ok(())
    }

    pub fn finish(self) -> Result<(), MinibenchError> {
        self.inner.finish()
    }
}

//==================================================================================
// Reader
//==================================================================================

/// An opened stash: the underlying tree plus the derived key set.
pub struct Stash {
    file: TreeFile,
    keys: Vec<String>,
}

impl Stash {
    /// Opens a stash, validating that every dataset path is `key/field`.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, MinibenchError> {
        let path = path.as_ref();
        let file = TreeFile::open(path)?;

        let mut keys: Vec<String> = Vec::new();
        for dataset in file.dataset_paths() {
            let (key, field) = dataset.split_once('/').ok_or_else(|| {
                MinibenchError::SourceUnavailable(format!(
                    "{}: dataset '{}' is not a key/field pair; not a stash",
                    path.display(),
                    dataset
                ))
            })?;
            if key.is_empty() || field.is_empty() || field.contains('/') {
                return Err(MinibenchError::SourceUnavailable(format!(
                    "{}: dataset '{}' is not a key/field pair; not a stash",
                    path.display(),
                    dataset
                )));
            }
            // Paths come out of the tree sorted, so keys arrive grouped.
            if keys.last().map(String::as_str) != Some(key) {
                keys.push(key.to_string());
            }
        }

        Ok(Stash { file, keys })
    }

    /// Entity keys in sorted order.
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    /// Field names of one entity, empty if the key is unknown.
    pub fn fields_of(&self, key: &str) -> Vec<String> {
        let prefix = format!("{}/", key);
        self.file
            .dataset_paths()
            .filter_map(|p| p.strip_prefix(&prefix))
            .map(|f| f.to_string())
            .collect()
    }

    /// Resolves one field's dtype and shape from the manifest.
    pub fn shape_of(&self, key: &str, field: &str) -> Result<(ElementType, Shape), MinibenchError> {
        self.file.shape_of(&format!("{}/{}", key, field))
    }

    /// Reads one whole entity field into memory.
    pub fn read_field<T: Element>(
        &mut self,
        key: &str,
        field: &str,
    ) -> Result<ArrayD<T>, MinibenchError> {
        self.file.read_dataset(&format!("{}/{}", key, field))
    }
}

//==================================================================================
// StashField
//==================================================================================

/// One entity field opened for windowed reads. Owns its handle.
pub struct StashField<T: Element> {
    inner: TreeDataset<T>,
}

impl<T: Element> StashField<T> {
    pub fn open<P: AsRef<Path>>(path: P, key: &str, field: &str) -> Result<Self, MinibenchError> {
        validate_component(key, "key")?;
        validate_component(field, "field")?;
        Ok(StashField {
            inner: TreeDataset::open(path, &format!("{}/{}", key, field))?,
        })
    }
}

impl<T: Element> SliceSource<T> for StashField<T> {
    fn shape(&self) -> &Shape {
        self.inner.shape()
    }

    fn read_slice(&mut self, spec: &SliceSpec) -> Result<ArrayD<T>, MinibenchError> {
        self.inner.read_slice(spec)
    }
}

fn validate_component(name: &str, what: &str) -> Result<(), MinibenchError> {
    if name.is_empty() || name.contains('/') {
        return Err(MinibenchError::StorageFormat(format!(
            "invalid {} '{}': must be non-empty and free of '/'",
            what, name
        )));
    }
    Ok(())
}

//==================================================================================
// Unit Tests
//==================================================================================
