// In: src/sampling/mux.rs

//! The stream multiplexer: a bounded working set of live sampler streams
//! interleaved into one output stream.
//!
//! The multiplexer decouples "how many files are open at once" from "how
//! representative the output is of the whole collection". At most
//! `working_size` streams are live; each pull advances one of them, chosen
//! at random. Slots retire when their stream ends or when a per-slot Poisson
//! countdown expires, and retired slots are refilled from the seed pool
//! while any seed remains admissible.
//!
//! Construction is free of side effects. All validation, seed admission, and
//! source opening happen lazily on the first pull, so an unusable pool
//! surfaces as a stream item, not a constructor panic.

use std::fmt;
use std::path::{Path, PathBuf};

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Poisson};

use crate::config::{MuxConfig, SliceOpts};
use crate::error::MinibenchError;
use crate::sampling::samplers::{
    archive_random_slices, flat_random_slices, stash_random_slices, tree_random_slices,
    Observation, ObservationStream,
};
use crate::storage::{ReadMode, Stash, TreeFile};
use crate::traits::Element;

//==================================================================================
// 1. Stream Seeds
//==================================================================================

/// A re-openable factory for one source's sampler stream.
///
/// The multiplexer holds seeds, not open handles: a source is only open
/// while a slot in the working set is running its stream, and a seed can be
/// opened again each time it is re-admitted.
pub struct StreamSeed<T: Element> {
    label: String,
    open: Box<dyn Fn() -> Result<ObservationStream<T>, MinibenchError> + Send>,
}

impl<T: Element> StreamSeed<T> {
    /// Wraps an open callback. The label identifies the source in logs.
    pub fn new<F>(label: impl Into<String>, open: F) -> Self
    where
        F: Fn() -> Result<ObservationStream<T>, MinibenchError> + Send + 'static,
    {
        Self {
            label: label.into(),
            open: Box::new(open),
        }
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    pub(crate) fn open(&self) -> Result<ObservationStream<T>, MinibenchError> {
        (self.open)()
    }
}

impl<T: Element> fmt::Debug for StreamSeed<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StreamSeed").field(&self.label).finish()
    }
}

//==================================================================================
// 2. Seed-Pool Builders
//==================================================================================

/// Builds one seed per flat array file. Unreadable files are not detected
/// here; they fail at admission time and are dropped from the pool.
pub fn flat_pool<T: Element>(
    paths: &[PathBuf],
    mode: ReadMode,
    slice_shape: &[usize],
    opts: SliceOpts,
) -> Vec<StreamSeed<T>> {
    paths
        .iter()
        .map(|path| {
            let path = path.clone();
            let slice = slice_shape.to_vec();
            StreamSeed::new(path.display().to_string(), move || {
                let sampler = flat_random_slices::<T, _>(&path, mode, &slice, opts)?;
                Ok(Box::new(sampler) as ObservationStream<T>)
            })
        })
        .collect()
}

/// Builds one seed per archive file, all sampling the same named field.
pub fn archive_pool<T: Element>(
    paths: &[PathBuf],
    field: &str,
    slice_shape: &[usize],
    opts: SliceOpts,
) -> Vec<StreamSeed<T>> {
    paths
        .iter()
        .map(|path| {
            let path = path.clone();
            let field = field.to_string();
            let slice = slice_shape.to_vec();
            StreamSeed::new(format!("{}:{}", path.display(), field), move || {
                let sampler = archive_random_slices::<T, _>(&path, &field, &slice, opts)?;
                Ok(Box::new(sampler) as ObservationStream<T>)
            })
        })
        .collect()
}

/// Builds one seed per dataset of a tree container. The container is opened
/// once here to enumerate its datasets, then each seed re-opens its own
/// dataset on admission.
pub fn tree_pool<T: Element, P: AsRef<Path>>(
    path: P,
    slice_shape: &[usize],
    opts: SliceOpts,
) -> Result<Vec<StreamSeed<T>>, MinibenchError> {
    let path = path.as_ref();
    let tree = TreeFile::open(path)?;
    let datasets: Vec<String> = tree.dataset_paths().map(str::to_string).collect();

    Ok(datasets
        .into_iter()
        .map(|dataset| {
            let path = path.to_path_buf();
            let slice = slice_shape.to_vec();
            let label = format!("{}:{}", path.display(), dataset);
            StreamSeed::new(label, move || {
                let sampler = tree_random_slices::<T, _>(&path, &dataset, &slice, opts)?;
                Ok(Box::new(sampler) as ObservationStream<T>)
            })
        })
        .collect())
}

/// Builds one seed per keyed entity of a stash, all sampling the same field.
pub fn stash_pool<T: Element, P: AsRef<Path>>(
    path: P,
    field: &str,
    slice_shape: &[usize],
    opts: SliceOpts,
) -> Result<Vec<StreamSeed<T>>, MinibenchError> {
    let path = path.as_ref();
    let stash = Stash::open(path)?;
    let keys: Vec<String> = stash.keys().to_vec();

    Ok(keys
        .into_iter()
        .map(|key| {
            let path = path.to_path_buf();
            let field = field.to_string();
            let slice = slice_shape.to_vec();
            let label = format!("{}:{}/{}", path.display(), key, field);
            StreamSeed::new(label, move || {
                let sampler = stash_random_slices::<T, _>(&path, &key, &field, &slice, opts)?;
                Ok(Box::new(sampler) as ObservationStream<T>)
            })
        })
        .collect())
}

//==================================================================================
// 3. The Multiplexer
//==================================================================================

/// One live entry of the working set.
struct Slot<T: Element> {
    stream: ObservationStream<T>,
    seed_idx: usize,
    /// Draws left before early retirement; `None` when lifespans are off.
    remaining: Option<u64>,
    /// Items this activation has produced, for the empty-seed prune check.
    produced: u64,
    /// Selection weight, frozen from the pool weights at admission.
    weight: f64,
}

/// Interleaves a bounded working set of sampler streams into one stream.
///
/// See [`MuxConfig`] for the full policy surface. Termination: after
/// `n_samples` produced observations, or when no slot is live and no seed
/// is admissible.
pub struct Mux<T: Element> {
    seeds: Vec<StreamSeed<T>>,
    cfg: MuxConfig,
    /// Admission weight per seed; zeroed to drop a seed from admission.
    distribution: Vec<f64>,
    /// Slot-selection weight per seed; uniform unless configured.
    pool_weights: Vec<f64>,
    slots: Vec<Option<Slot<T>>>,
    poisson: Option<Poisson<f64>>,
    rng: StdRng,
    produced: u64,
    primed: bool,
    finished: bool,
}

impl<T: Element> Mux<T> {
    /// Wraps a seed pool under a policy. No validation and no I/O happen
    /// here; the first pull does all of it.
    pub fn new(seeds: Vec<StreamSeed<T>>, cfg: MuxConfig) -> Self {
        let rng = match cfg.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let distribution = vec![1.0; seeds.len()];
        Self {
            seeds,
            cfg,
            distribution,
            pool_weights: Vec::new(),
            slots: Vec::new(),
            poisson: None,
            rng,
            produced: 0,
            primed: false,
            finished: false,
        }
    }

    /// Number of currently live streams. Zero before the first pull and
    /// after termination; never exceeds `working_size` in between.
    pub fn active_streams(&self) -> usize {
        self.slots.iter().flatten().count()
    }

    /// Validates the policy and fills the initial working set.
    fn prime(&mut self) -> Result<(), MinibenchError> {
        // 1. Reject unusable policy values before any admission work.
        if self.cfg.working_size == 0 {
            return Err(MinibenchError::InvalidConfig(
                "working_size must be at least 1".to_string(),
            ));
        }
        if let Some(lam) = self.cfg.lam {
            let poisson = Poisson::new(lam).map_err(|e| {
                MinibenchError::InvalidConfig(format!("invalid lam {}: {}", lam, e))
            })?;
            self.poisson = Some(poisson);
        }
        self.pool_weights = match self.cfg.pool_weights.clone() {
            Some(weights) => {
                if weights.len() != self.seeds.len() {
                    return Err(MinibenchError::InvalidConfig(format!(
                        "pool_weights has {} entries for a pool of {} seeds",
                        weights.len(),
                        self.seeds.len()
                    )));
                }
                if weights.iter().any(|w| !w.is_finite() || *w < 0.0) {
                    return Err(MinibenchError::InvalidConfig(
                        "pool_weights must be finite and non-negative".to_string(),
                    ));
                }
                if !weights.iter().any(|w| *w > 0.0) {
                    return Err(MinibenchError::InvalidConfig(
                        "pool_weights must contain at least one positive weight".to_string(),
                    ));
                }
                weights
            }
            None => vec![1.0; self.seeds.len()],
        };

        // 2. An empty pool is a stream-level error, not a panic.
        if self.seeds.is_empty() {
            return Err(MinibenchError::EmptyPool(
                "the seed pool is empty".to_string(),
            ));
        }

        // 3. Fill the working set. Open failures inside refill_slot drop the
        //    failing seed and move on.
        self.slots = (0..self.cfg.working_size).map(|_| None).collect();
        for i in 0..self.cfg.working_size {
            self.refill_slot(i);
        }
        if self.active_streams() == 0 {
            return Err(MinibenchError::EmptyPool(
                "no stream in the pool could be opened".to_string(),
            ));
        }
        Ok(())
    }

    /// Draws a seed index from the admission distribution, or `None` when
    /// every seed has been dropped.
    fn draw_seed(&mut self) -> Option<usize> {
        let total: f64 = self.distribution.iter().sum();
        if !(total > 0.0) {
            return None;
        }
        let mut r = self.rng.random::<f64>() * total;
        let mut fallback = None;
        for (idx, &weight) in self.distribution.iter().enumerate() {
            if weight <= 0.0 {
                continue;
            }
            fallback = Some(idx);
            if r < weight {
                return Some(idx);
            }
            r -= weight;
        }
        // Float rounding can walk past the last bucket.
        fallback
    }

    /// Admits seeds into slot `i` until one opens or none are admissible.
    fn refill_slot(&mut self, i: usize) {
        self.slots[i] = None;
        loop {
            let idx = match self.draw_seed() {
                Some(idx) => idx,
                None => return,
            };
            if !self.cfg.with_replacement {
                // Without replacement a seed is admitted at most once.
                self.distribution[idx] = 0.0;
            }
            match self.seeds[idx].open() {
                Ok(stream) => {
                    let remaining = match self.poisson {
                        // At least one draw per activation, so a short
                        // countdown can never retire a slot unseen.
                        Some(poisson) => Some(1 + poisson.sample(&mut self.rng) as u64),
                        None => None,
                    };
                    log_metric!(
                        "event" = "slot_admitted",
                        "stream" = self.seeds[idx].label(),
                        "lifespan" = &remaining.unwrap_or(0)
                    );
                    self.slots[i] = Some(Slot {
                        stream,
                        seed_idx: idx,
                        remaining,
                        produced: 0,
                        weight: self.pool_weights[idx],
                    });
                    return;
                }
                Err(e) => {
                    log::warn!(
                        "dropping stream '{}' from the pool: {}",
                        self.seeds[idx].label(),
                        e
                    );
                    self.distribution[idx] = 0.0;
                }
            }
        }
    }

    /// Retires slot `i`, updates the admission distribution, and refills.
    fn retire_slot(&mut self, i: usize) {
        let slot = match self.slots[i].take() {
            Some(slot) => slot,
            None => return,
        };
        let idx = slot.seed_idx;
        log_metric!(
            "event" = "slot_retired",
            "stream" = self.seeds[idx].label(),
            "produced" = &slot.produced
        );

        if self.cfg.prune_empty_seeds && slot.produced == 0 {
            self.distribution[idx] = 0.0;
        }
        if self.cfg.revive && !self.cfg.with_replacement {
            // Revive wins over pruning: a spent seed comes back at the top
            // of the admission distribution.
            let top = self.distribution.iter().copied().fold(0.0_f64, f64::max);
            self.distribution[idx] = if top > 0.0 { top } else { 1.0 };
        }

        // The old handle is released before a refill can re-open the source.
        drop(slot);
        self.refill_slot(i);
    }

    /// Picks a live slot, weighted by each slot's selection weight, or
    /// `None` when no selectable slot remains.
    fn pick_slot(&mut self) -> Option<usize> {
        let total: f64 = self.slots.iter().flatten().map(|s| s.weight).sum();
        if !(total > 0.0) {
            return None;
        }
        let mut r = self.rng.random::<f64>() * total;
        let mut fallback = None;
        for (i, slot) in self.slots.iter().enumerate() {
            let slot = match slot {
                Some(slot) => slot,
                None => continue,
            };
            if slot.weight <= 0.0 {
                continue;
            }
            fallback = Some(i);
            if r < slot.weight {
                return Some(i);
            }
            r -= slot.weight;
        }
        fallback
    }
}

impl<T: Element> Iterator for Mux<T> {
    type Item = Result<Observation<T>, MinibenchError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        // 1. First pull: validate the policy and fill the working set.
        if !self.primed {
            self.primed = true;
            if let Err(e) = self.prime() {
                self.finished = true;
                return Some(Err(e));
            }
        }

        loop {
            // 2. Sample-count termination counts produced observations only.
            if let Some(limit) = self.cfg.n_samples {
                if self.produced >= limit {
                    self.finished = true;
                    return None;
                }
            }

            // 3. No selectable slot means the pool has drained.
            let i = match self.pick_slot() {
                Some(i) => i,
                None => {
                    self.finished = true;
                    return None;
                }
            };

            // 4. Advance the chosen stream one step.
            let step = match self.slots[i].as_mut() {
                Some(slot) => slot.stream.next(),
                None => None,
            };
            match step {
                Some(Ok(obs)) => {
                    self.produced += 1;
                    let mut expired = false;
                    if let Some(slot) = self.slots[i].as_mut() {
                        slot.produced += 1;
                        if let Some(remaining) = slot.remaining.as_mut() {
                            *remaining -= 1;
                            expired = *remaining == 0;
                        }
                    }
                    if expired {
                        self.retire_slot(i);
                    }
                    return Some(Ok(obs));
                }
                Some(Err(e)) => {
                    // A failed stream surfaces its error once, then retires.
                    self.retire_slot(i);
                    return Some(Err(e));
                }
                None => {
                    self.retire_slot(i);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::{ArrayD, IxDyn};

    /// A seed whose stream yields `count` constant observations.
    fn constant_seed(value: f64, count: u64) -> StreamSeed<f64> {
        StreamSeed::new(format!("constant-{}", value), move || {
            let arr = ArrayD::from_elem(IxDyn(&[2, 2]), value);
            let items = (0..count).map(move |_| Ok(Observation { x: arr.clone() }));
            Ok(Box::new(items) as ObservationStream<f64>)
        })
    }

    fn failing_seed(label: &str) -> StreamSeed<f64> {
        StreamSeed::new(label, || {
            Err(MinibenchError::SourceUnavailable("gone".to_string()))
        })
    }

    fn cfg() -> MuxConfig {
        MuxConfig {
            seed: Some(99),
            lam: None,
            ..MuxConfig::default()
        }
    }

    #[test]
    fn test_empty_pool_surfaces_on_first_pull() {
        let mut mux = Mux::<f64>::new(Vec::new(), cfg());
        match mux.next() {
            Some(Err(MinibenchError::EmptyPool(_))) => {}
            other => panic!("expected EmptyPool, got {:?}", other.map(|r| r.is_ok())),
        }
        assert!(mux.next().is_none());
    }

    #[test]
    fn test_all_open_failures_surface_as_empty_pool() {
        let seeds = vec![failing_seed("a"), failing_seed("b")];
        let mut mux = Mux::new(seeds, cfg());
        assert!(matches!(
            mux.next(),
            Some(Err(MinibenchError::EmptyPool(_)))
        ));
    }

    #[test]
    fn test_exhaustion_without_replacement_is_exact() {
        let seeds = vec![
            constant_seed(1.0, 4),
            constant_seed(2.0, 4),
            constant_seed(3.0, 4),
        ];
        let config = MuxConfig {
            with_replacement: false,
            ..cfg()
        };
        let results: Vec<_> = Mux::new(seeds, config).collect();
        assert_eq!(results.len(), 12);
        assert!(results.iter().all(|r| r.is_ok()));
    }

    #[test]
    fn test_n_samples_bounds_the_stream() {
        let seeds = vec![constant_seed(1.0, 1000)];
        let config = MuxConfig {
            n_samples: Some(17),
            ..cfg()
        };
        let results: Vec<_> = Mux::new(seeds, config).collect();
        assert_eq!(results.len(), 17);
    }

    #[test]
    fn test_working_set_never_exceeds_bound() {
        let seeds: Vec<_> = (0..8).map(|v| constant_seed(v as f64, 50)).collect();
        let config = MuxConfig {
            working_size: 3,
            ..cfg()
        };
        let mut mux = Mux::new(seeds, config);
        assert_eq!(mux.active_streams(), 0);
        for _ in 0..100 {
            assert!(mux.next().is_some());
            assert!(mux.active_streams() <= 3);
        }
    }

    #[test]
    fn test_zero_weight_seed_is_never_drawn() {
        let seeds = vec![constant_seed(1.0, 10), constant_seed(2.0, 10)];
        let config = MuxConfig {
            pool_weights: Some(vec![1.0, 0.0]),
            with_replacement: false,
            ..cfg()
        };
        let results: Vec<_> = Mux::new(seeds, config).collect();
        // Only the weighted seed is ever selected; the stream ends when it
        // is spent, even though the zero-weight slot is still live.
        assert_eq!(results.len(), 10);
        for item in results {
            assert!(item.unwrap().x.iter().all(|&v| v == 1.0));
        }
    }

    #[test]
    fn test_mismatched_pool_weights_are_invalid_config() {
        let seeds = vec![constant_seed(1.0, 1)];
        let config = MuxConfig {
            pool_weights: Some(vec![0.5, 0.5]),
            ..cfg()
        };
        let mut mux = Mux::new(seeds, config);
        assert!(matches!(
            mux.next(),
            Some(Err(MinibenchError::InvalidConfig(_)))
        ));
    }

    #[test]
    fn test_revive_replays_a_spent_seed() {
        let config = MuxConfig {
            with_replacement: false,
            revive: true,
            n_samples: Some(5),
            ..cfg()
        };
        let results: Vec<_> = Mux::new(vec![constant_seed(1.0, 2)], config).collect();
        assert_eq!(results.len(), 5);

        // Without revive the single two-item seed caps the stream at two.
        let config = MuxConfig {
            with_replacement: false,
            revive: false,
            n_samples: Some(5),
            ..cfg()
        };
        let results: Vec<_> = Mux::new(vec![constant_seed(1.0, 2)], config).collect();
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn test_pruned_empty_seeds_terminate_the_stream() {
        let seeds = vec![constant_seed(1.0, 0), constant_seed(2.0, 0)];
        let config = MuxConfig {
            prune_empty_seeds: true,
            ..cfg()
        };
        let results: Vec<_> = Mux::new(seeds, config).collect();
        assert!(results.is_empty());
    }

    #[test]
    fn test_open_failures_mid_pool_are_skipped() {
        let seeds = vec![failing_seed("a"), constant_seed(5.0, 3), failing_seed("b")];
        let config = MuxConfig {
            with_replacement: false,
            ..cfg()
        };
        let results: Vec<_> = Mux::new(seeds, config).collect();
        assert_eq!(results.len(), 3);
        assert!(results.iter().all(|r| r.is_ok()));
    }

    #[test]
    fn test_poisson_lifespans_recycle_slots() {
        let seeds: Vec<_> = (0..4).map(|v| constant_seed(v as f64, 1_000)).collect();
        let config = MuxConfig {
            lam: Some(3.0),
            working_size: 2,
            n_samples: Some(200),
            ..cfg()
        };
        let mut mux = Mux::new(seeds, config);
        let mut count = 0;
        while let Some(item) = mux.next() {
            assert!(item.is_ok());
            assert!(mux.active_streams() <= 2);
            count += 1;
        }
        assert_eq!(count, 200);
    }

    #[test]
    fn test_stream_error_is_yielded_once_then_slot_retires() {
        let erroring = StreamSeed::new("half-broken", || {
            let arr = ArrayD::from_elem(IxDyn(&[1]), 1.0_f64);
            let items = vec![
                Ok(Observation { x: arr }),
                Err(MinibenchError::Io(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    "short read",
                ))),
            ];
            Ok(Box::new(items.into_iter()) as ObservationStream<f64>)
        });
        let config = MuxConfig {
            with_replacement: false,
            prune_empty_seeds: false,
            ..cfg()
        };
        let results: Vec<_> = Mux::new(vec![erroring], config).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }
}
