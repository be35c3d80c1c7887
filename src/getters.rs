// In: src/getters.rs

//! Whole-item access paths: load one randomly chosen item in full.
//!
//! These are the baselines the slice samplers are measured against. Each
//! getter picks a random member of a collection, loads the complete array,
//! and reports its shape, so a harness can verify the load really happened
//! without keeping the data around.

use std::path::PathBuf;

use rand::seq::IndexedRandom;
use rand::Rng;

use crate::error::MinibenchError;
use crate::storage::{read_archive_field, read_flat, Stash};
use crate::traits::Element;
use crate::types::Shape;

/// Loads one random flat file in full.
pub fn touch_flat<T, R>(paths: &[PathBuf], rng: &mut R) -> Result<Shape, MinibenchError>
where
    T: Element,
    R: Rng + ?Sized,
{
    let path = paths.choose(rng).ok_or_else(|| {
        MinibenchError::SourceUnavailable("the flat collection is empty".to_string())
    })?;
    let array = read_flat::<T, _>(path)?;
    Shape::new(array.shape().to_vec())
}

/// Loads one named field of one random archive in full, decompressing it.
pub fn touch_archive<T, R>(
    paths: &[PathBuf],
    field: &str,
    rng: &mut R,
) -> Result<Shape, MinibenchError>
where
    T: Element,
    R: Rng + ?Sized,
{
    let path = paths.choose(rng).ok_or_else(|| {
        MinibenchError::SourceUnavailable("the archive collection is empty".to_string())
    })?;
    let array = read_archive_field::<T, _>(path, field)?;
    Shape::new(array.shape().to_vec())
}

/// Loads one field of one random entity of an open stash in full.
pub fn touch_stash<T, R>(
    stash: &mut Stash,
    field: &str,
    rng: &mut R,
) -> Result<Shape, MinibenchError>
where
    T: Element,
    R: Rng + ?Sized,
{
    let key = stash
        .keys()
        .choose(rng)
        .cloned()
        .ok_or_else(|| MinibenchError::SourceUnavailable("the stash has no keys".to_string()))?;
    let array = stash.read_field::<T>(&key, field)?;
    Shape::new(array.shape().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenParams;
    use crate::data::{
        convert_archives_to_stash, convert_flat_to_archives, create_flat_collection,
    };
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_touch_flat_reports_the_item_shape() {
        let dir = tempfile::tempdir().unwrap();
        let paths =
            create_flat_collection::<f64, _>(dir.path(), &[8, 6], 4, GenParams::default()).unwrap();

        let mut rng = StdRng::seed_from_u64(0);
        for _ in 0..10 {
            let shape = touch_flat::<f64, _>(&paths, &mut rng).unwrap();
            assert_eq!(shape.dims(), &[8, 6]);
        }
    }

    #[test]
    fn test_touch_archive_and_stash() {
        let dir = tempfile::tempdir().unwrap();
        let flats = create_flat_collection::<f32, _>(
            dir.path().join("flat"),
            &[5, 5],
            3,
            GenParams::default(),
        )
        .unwrap();
        let archives =
            convert_flat_to_archives::<f32, _>(&flats, dir.path().join("arc"), "x").unwrap();
        let stash_path = dir.path().join("c.st");
        convert_archives_to_stash::<f32, _>(&archives, &stash_path).unwrap();

        let mut rng = StdRng::seed_from_u64(1);
        let shape = touch_archive::<f32, _>(&archives, "x", &mut rng).unwrap();
        assert_eq!(shape.dims(), &[5, 5]);

        let mut stash = Stash::open(&stash_path).unwrap();
        let shape = touch_stash::<f32, _>(&mut stash, "x", &mut rng).unwrap();
        assert_eq!(shape.dims(), &[5, 5]);
    }

    #[test]
    fn test_empty_collection_is_source_unavailable() {
        let mut rng = StdRng::seed_from_u64(2);
        let result = touch_flat::<f64, _>(&[], &mut rng);
        assert!(matches!(
            result,
            Err(MinibenchError::SourceUnavailable(_))
        ));
    }
}
