// In: src/config.rs

//! The single source of truth for all minibench configuration.
//!
//! This module defines every knob the library exposes: sampler options, the
//! multiplexer policy, data-generation parameters, and the benchmark
//! harness's parameter grid. Configs are created once at the application
//! boundary (a JSON file, a Python call site, or a bench harness) and passed
//! down explicitly; nothing in the crate reads configuration at module scope.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::MinibenchError;

/// The seed data generation uses when none is given, so default collections
/// are reproducible across runs and machines.
pub const DEFAULT_GEN_SEED: u64 = 12345;

//==================================================================================
// I. Sampler Options
//==================================================================================

/// Options for one slice sampler: how many slices to draw and from which
/// RNG state.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SliceOpts {
    /// Stop after this many slices; `None` draws forever.
    #[serde(default)]
    pub max_count: Option<u64>,

    /// Seed for the offset RNG. Identical seeds replay identical offset
    /// sequences; `None` draws OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

//==================================================================================
// II. Multiplexer Policy
//==================================================================================

/// The full admission and scheduling policy of the stream multiplexer.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "snake_case")]
pub struct MuxConfig {
    /// Maximum number of simultaneously live streams.
    #[serde(default = "default_working_size")]
    pub working_size: usize,

    /// Mean of the Poisson draw that caps each slot's lifespan. `None`
    /// disables lifespans entirely; slots then live until their stream ends.
    #[serde(default = "default_lam")]
    pub lam: Option<f64>,

    /// Per-seed weights for slot selection. `None` means uniform. Must match
    /// the pool length, and at least one weight must be positive.
    #[serde(default)]
    pub pool_weights: Option<Vec<f64>>,

    /// If true, a seed can be admitted again after its slot retires.
    #[serde(default = "default_true")]
    pub with_replacement: bool,

    /// If true, a seed whose stream produced nothing is removed from
    /// admission when its slot retires.
    #[serde(default = "default_true")]
    pub prune_empty_seeds: bool,

    /// If true (and replacement is off), a spent seed's admission
    /// probability is restored when its slot retires, so it can be drawn
    /// again before the pool drains.
    #[serde(default)]
    pub revive: bool,

    /// Stop after this many produced observations; `None` is unbounded.
    #[serde(default)]
    pub n_samples: Option<u64>,

    /// Seed for the multiplexer's own RNG (slot selection, admission, and
    /// lifespan draws). `None` draws OS entropy.
    #[serde(default)]
    pub seed: Option<u64>,
}

impl Default for MuxConfig {
    fn default() -> Self {
        Self {
            working_size: default_working_size(),
            lam: default_lam(),
            pool_weights: None,
            with_replacement: true,
            prune_empty_seeds: true,
            revive: false,
            n_samples: None,
            seed: None,
        }
    }
}

//==================================================================================
// III. Data Generation
//==================================================================================

/// Parameters for the random-array generator backing collection creation.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
pub struct GenParams {
    /// Mean of the normal distribution values are drawn from.
    #[serde(default)]
    pub loc: f64,

    /// Standard deviation of the normal distribution.
    #[serde(default = "default_scale")]
    pub scale: f64,

    /// RNG seed for the value stream.
    #[serde(default = "default_gen_seed")]
    pub seed: u64,
}

impl Default for GenParams {
    fn default() -> Self {
        Self {
            loc: 0.0,
            scale: default_scale(),
            seed: default_gen_seed(),
        }
    }
}

//==================================================================================
// IV. The Benchmark Harness Grid
//==================================================================================

/// One cell of the benchmark parameter grid: a collection to generate and
/// the sampling knobs to run against it.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct DataParams {
    /// Shape of every generated array.
    pub shape: Vec<usize>,

    /// How many arrays the collection holds.
    pub num_items: usize,

    /// Slice shape for the samplers. `None` lets the harness derive one
    /// from `shape`.
    #[serde(default)]
    pub slice: Option<Vec<usize>>,

    /// Overrides `MuxConfig::lam` for this cell.
    #[serde(default)]
    pub lam: Option<f64>,

    /// Overrides `MuxConfig::working_size` for this cell.
    #[serde(default)]
    pub working_size: Option<usize>,
}

/// The benchmark harness configuration: where to materialize collections
/// and which parameter cells to run.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct BenchConfig {
    /// Directory for generated collections. `None` means a fresh temporary
    /// directory per run.
    #[serde(default)]
    pub workspace: Option<PathBuf>,

    pub params: Vec<DataParams>,
}

impl BenchConfig {
    /// Loads a config from a JSON file. Harness setup calls this explicitly;
    /// the library never loads configuration on its own.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, MinibenchError> {
        let text = std::fs::read_to_string(path)?;
        let config: BenchConfig = serde_json::from_str(&text)?;
        Ok(config)
    }
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            workspace: None,
            params: vec![
                DataParams {
                    shape: vec![64, 64],
                    num_items: 100,
                    slice: None,
                    lam: None,
                    working_size: None,
                },
                DataParams {
                    shape: vec![256, 256],
                    num_items: 25,
                    slice: Some(vec![32, 32]),
                    lam: None,
                    working_size: None,
                },
            ],
        }
    }
}

//==================================================================================
// V. Serde Default Helpers
//==================================================================================

/// Helper for `serde` to default a boolean field to true.
fn default_true() -> bool {
    true
}

fn default_working_size() -> usize {
    10
}

fn default_lam() -> Option<f64> {
    Some(25.0)
}

fn default_scale() -> f64 {
    1.0
}

fn default_gen_seed() -> u64 {
    DEFAULT_GEN_SEED
}

//==================================================================================
// VI. Unit Tests
//==================================================================================
