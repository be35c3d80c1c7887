// In: src/data.rs

//! Synthetic collection generation and the converters between container
//! formats.
//!
//! Benchmarks and tests need collections with known statistics but
//! unpredictable identities: values come from a seeded normal distribution,
//! file and entity names from fresh v4 UUIDs. A collection is generated once
//! as flat files and then converted losslessly into the other container
//! formats, so every backend serves byte-identical arrays.

use std::marker::PhantomData;
use std::path::{Path, PathBuf};

use ndarray::{ArrayD, IxDyn};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, Normal};
use uuid::Uuid;

use crate::config::GenParams;
use crate::error::MinibenchError;
use crate::kernels::zstd::DEFAULT_LEVEL;
use crate::storage::{
    peek_archive, read_archive_field, read_flat, write_archive, write_flat, StashWriter,
    TreeWriter,
};
use crate::traits::Element;
use crate::types::Shape;
use crate::utils::file_stem;

//==================================================================================
// 1. The Generator
//==================================================================================

/// Yields `(key, array)` pairs: a fresh v4 UUID per item and normally
/// distributed values cast into the target element type.
pub struct RandomArrays<T: Element> {
    shape: Shape,
    normal: Normal<f64>,
    rng: StdRng,
    remaining: Option<u64>,
    _element: PhantomData<T>,
}

/// Builds a generator of random arrays. The value stream is fully
/// determined by `params.seed`; only the keys differ between runs.
pub fn random_arrays<T: Element>(
    shape: &[usize],
    count: Option<u64>,
    params: GenParams,
) -> Result<RandomArrays<T>, MinibenchError> {
    let shape = Shape::new(shape.to_vec())?;
    let normal = Normal::new(params.loc, params.scale).map_err(|e| {
        MinibenchError::InvalidConfig(format!(
            "invalid generator parameters (loc {}, scale {}): {}",
            params.loc, params.scale, e
        ))
    })?;
    Ok(RandomArrays {
        shape,
        normal,
        rng: StdRng::seed_from_u64(params.seed),
        remaining: count,
        _element: PhantomData,
    })
}

impl<T: Element> Iterator for RandomArrays<T> {
    type Item = (String, ArrayD<T>);

    fn next(&mut self) -> Option<Self::Item> {
        match self.remaining.as_mut() {
            Some(0) => return None,
            Some(n) => *n -= 1,
            None => {}
        }

        let key = Uuid::new_v4().to_string();
        let normal = self.normal;
        let rng = &mut self.rng;
        let array = ArrayD::from_shape_fn(IxDyn(self.shape.dims()), |_| {
            // Out-of-range draws for integer targets collapse to zero.
            num_traits::cast(normal.sample(rng)).unwrap_or_else(T::zero)
        });
        Some((key, array))
    }
}

//==================================================================================
// 2. Collection Creation
//==================================================================================

/// Generates `num_items` arrays and writes each as one flat file
/// (`<uuid>.arr`) under `dir`, returning the paths in creation order.
pub fn create_flat_collection<T, P>(
    dir: P,
    shape: &[usize],
    num_items: usize,
    params: GenParams,
) -> Result<Vec<PathBuf>, MinibenchError>
where
    T: Element,
    P: AsRef<Path>,
{
    let dir = dir.as_ref();
    std::fs::create_dir_all(dir)?;

    let mut paths = Vec::with_capacity(num_items);
    for (key, array) in random_arrays::<T>(shape, Some(num_items as u64), params)? {
        let path = dir.join(format!("{}.arr", key));
        write_flat(&path, &array)?;
        paths.push(path);
    }
    log::info!(
        "wrote {} flat arrays of shape {:?} under {}",
        paths.len(),
        shape,
        dir.display()
    );
    Ok(paths)
}

//==================================================================================
// 3. Converters
//==================================================================================

/// Converts each flat file into a single-field archive (`<stem>.arc`) under
/// `out_dir`, returning the archive paths in input order.
pub fn convert_flat_to_archives<T, P>(
    paths: &[PathBuf],
    out_dir: P,
    field: &str,
) -> Result<Vec<PathBuf>, MinibenchError>
where
    T: Element,
    P: AsRef<Path>,
{
    let out_dir = out_dir.as_ref();
    std::fs::create_dir_all(out_dir)?;

    let mut out_paths = Vec::with_capacity(paths.len());
    for path in paths {
        let array = read_flat::<T, _>(path)?;
        let stem = stem_of(path)?;
        let out = out_dir.join(format!("{}.arc", stem));
        write_archive(&out, &[(field, &array)], DEFAULT_LEVEL)?;
        log::debug!("archived {} -> {}", path.display(), out.display());
        out_paths.push(out);
    }
    Ok(out_paths)
}

/// Gathers a flat collection into one tree container, one dataset per file,
/// keyed by file stem.
pub fn convert_flat_to_tree<T, P>(paths: &[PathBuf], out_path: P) -> Result<(), MinibenchError>
where
    T: Element,
    P: AsRef<Path>,
{
    let mut writer = TreeWriter::create(&out_path)?;
    for path in paths {
        let array = read_flat::<T, _>(path)?;
        writer.put(stem_of(path)?, &array)?;
    }
    log::info!(
        "gathered {} datasets into {}",
        writer.len(),
        out_path.as_ref().display()
    );
    writer.finish()
}

/// Gathers archives into one stash, one entity per archive, keyed by file
/// stem, with every archive field copied.
pub fn convert_archives_to_stash<T, P>(paths: &[PathBuf], out_path: P) -> Result<(), MinibenchError>
where
    T: Element,
    P: AsRef<Path>,
{
    let mut writer = StashWriter::create(&out_path)?;
    for path in paths {
        let info = peek_archive(path)?;
        let key = stem_of(path)?.to_string();

        let mut fields: Vec<(String, ArrayD<T>)> = Vec::with_capacity(info.fields.len());
        for name in info.field_names() {
            let array = read_archive_field::<T, _>(path, name)?;
            fields.push((name.to_string(), array));
        }
        let refs: Vec<(&str, &ArrayD<T>)> =
            fields.iter().map(|(n, a)| (n.as_str(), a)).collect();
        writer.put_entity(&key, &refs)?;
    }
    writer.finish()
}

fn stem_of(path: &Path) -> Result<&str, MinibenchError> {
    file_stem(path).ok_or_else(|| {
        MinibenchError::InvalidConfig(format!("{}: path has no usable file stem", path.display()))
    })
}

//==================================================================================
// 4. Unit Tests
//==================================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{Stash, TreeFile};

    fn params(seed: u64) -> GenParams {
        GenParams {
            loc: 0.0,
            scale: 1.0,
            seed,
        }
    }

    #[test]
    fn test_generator_is_value_deterministic_with_unique_keys() {
        let first: Vec<_> = random_arrays::<f64>(&[4, 3], Some(5), params(7))
            .unwrap()
            .collect();
        let second: Vec<_> = random_arrays::<f64>(&[4, 3], Some(5), params(7))
            .unwrap()
            .collect();

        assert_eq!(first.len(), 5);
        for ((key_a, arr_a), (key_b, arr_b)) in first.iter().zip(second.iter()) {
            assert_ne!(key_a, key_b);
            assert_eq!(arr_a, arr_b);
        }
    }

    #[test]
    fn test_generator_rejects_degenerate_scale() {
        let bad = GenParams {
            scale: -1.0,
            ..GenParams::default()
        };
        assert!(matches!(
            random_arrays::<f64>(&[2, 2], None, bad),
            Err(MinibenchError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_flat_collection_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let paths = create_flat_collection::<f32, _>(dir.path(), &[6, 4], 3, params(1)).unwrap();
        assert_eq!(paths.len(), 3);
        for path in &paths {
            let array = read_flat::<f32, _>(path).unwrap();
            assert_eq!(array.shape(), &[6, 4]);
        }
    }

    #[test]
    fn test_archive_conversion_preserves_values() {
        let dir = tempfile::tempdir().unwrap();
        let flats = create_flat_collection::<f64, _>(
            dir.path().join("flat"),
            &[5, 5],
            2,
            params(2),
        )
        .unwrap();
        let archives =
            convert_flat_to_archives::<f64, _>(&flats, dir.path().join("arc"), "x").unwrap();

        assert_eq!(archives.len(), 2);
        for (flat, archive) in flats.iter().zip(archives.iter()) {
            let original = read_flat::<f64, _>(flat).unwrap();
            let converted = read_archive_field::<f64, _>(archive, "x").unwrap();
            assert_eq!(original, converted);
        }
    }

    #[test]
    fn test_tree_conversion_keys_datasets_by_stem() {
        let dir = tempfile::tempdir().unwrap();
        let flats =
            create_flat_collection::<f64, _>(dir.path().join("flat"), &[4, 4], 3, params(3))
                .unwrap();
        let tree_path = dir.path().join("collection.tr");
        convert_flat_to_tree::<f64, _>(&flats, &tree_path).unwrap();

        let mut tree = TreeFile::open(&tree_path).unwrap();
        assert_eq!(tree.dataset_paths().count(), 3);
        for flat in &flats {
            let stem = file_stem(flat).unwrap();
            let original = read_flat::<f64, _>(flat).unwrap();
            let stored = tree.read_dataset::<f64>(stem).unwrap();
            assert_eq!(original, stored);
        }
    }

    #[test]
    fn test_stash_conversion_copies_every_field() {
        let dir = tempfile::tempdir().unwrap();
        let flats =
            create_flat_collection::<f64, _>(dir.path().join("flat"), &[3, 3], 2, params(4))
                .unwrap();
        let archives =
            convert_flat_to_archives::<f64, _>(&flats, dir.path().join("arc"), "x").unwrap();
        let stash_path = dir.path().join("collection.st");
        convert_archives_to_stash::<f64, _>(&archives, &stash_path).unwrap();

        let mut stash = Stash::open(&stash_path).unwrap();
        assert_eq!(stash.keys().len(), 2);
        for archive in &archives {
            let key = file_stem(archive).unwrap().to_string();
            assert_eq!(stash.fields_of(&key), vec!["x".to_string()]);
            let original = read_archive_field::<f64, _>(archive, "x").unwrap();
            let stored = stash.read_field::<f64>(&key, "x").unwrap();
            assert_eq!(original, stored);
        }
    }
}
