// In: src/ffi/python.rs

use log::LevelFilter;
use pyo3::prelude::*;
use pyo3::types::PyBytes;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::Once;

use crate::benchparse;
use crate::config::{GenParams, MuxConfig, SliceOpts, DEFAULT_GEN_SEED};
use crate::data;
use crate::sampling::{
    archive_pool, channel_stream, flat_pool, stash_pool, tree_pool, Mux, StreamChannel,
    StreamSeed, DEFAULT_CHANNEL_CAPACITY,
};
use crate::storage::ReadMode;
use crate::utils::typed_slice_to_bytes;

//==================================================================================
// I. The Streaming Sampler (The recommended approach)
//==================================================================================

/// The multiplexed slice sampler, exposed as a Python iterator.
///
/// Construction wires the whole Rust pipeline: a seed pool over the chosen
/// backend, the multiplexer policy, and a producer thread behind a bounded
/// channel. Iteration yields `(bytes, shape)` tuples of float64 windows in
/// row-major order, ready for `np.frombuffer(...).reshape(shape)`.
#[pyclass(name = "MuxSampler", module = "minibench_core")]
pub struct PyMuxSampler {
    channel: StreamChannel<f64>,
}

#[pymethods]
impl PyMuxSampler {
    /// Creates a new MuxSampler instance.
    ///
    /// This constructor is the main entry point from Python. It takes the
    /// backend name and sampling knobs as keyword arguments, constructs the
    /// unified `MuxConfig` struct, and starts the Rust sampling pipeline.
    #[new]
    #[pyo3(signature = (
        backend,
        sources,
        slice_shape,
        field = "x",
        mode = "windowed",
        working_size = 10,
        lam = Some(25.0),
        pool_weights = None,
        with_replacement = true,
        prune_empty_seeds = true,
        revive = false,
        n_samples = None,
        max_count = None,
        seed = None,
        capacity = DEFAULT_CHANNEL_CAPACITY
    ))]
    fn new(
        backend: &str,
        sources: Vec<String>,
        slice_shape: Vec<usize>,
        field: &str,
        mode: &str,
        working_size: usize,
        lam: Option<f64>,
        pool_weights: Option<Vec<f64>>,
        with_replacement: bool,
        prune_empty_seeds: bool,
        revive: bool,
        n_samples: Option<u64>,
        max_count: Option<u64>,
        seed: Option<u64>,
        capacity: usize,
    ) -> PyResult<Self> {
        // 1. Parse string arguments into their corresponding Rust enums.
        let parsed_mode = match mode.to_lowercase().as_str() {
            "eager" => ReadMode::Eager,
            "windowed" => ReadMode::Windowed,
            _ => {
                return Err(PyErr::new::<pyo3::exceptions::PyValueError, _>(
                    "Invalid mode. Must be 'eager' or 'windowed'.",
                ))
            }
        };

        // 2. Assemble the per-stream options and the unified MuxConfig.
        let opts = SliceOpts { max_count, seed };
        let config = MuxConfig {
            working_size,
            lam,
            pool_weights,
            with_replacement,
            prune_empty_seeds,
            revive,
            n_samples,
            seed,
        };

        // 3. Build the seed pool for the chosen backend.
        let paths: Vec<PathBuf> = sources.iter().map(PathBuf::from).collect();
        let seeds: Vec<StreamSeed<f64>> = match backend.to_lowercase().as_str() {
            "flat" => flat_pool(&paths, parsed_mode, &slice_shape, opts),
            "archive" => archive_pool(&paths, field, &slice_shape, opts),
            "tree" => tree_pool(single_source(&paths)?, &slice_shape, opts)?,
            "stash" => stash_pool(single_source(&paths)?, field, &slice_shape, opts)?,
            _ => {
                return Err(PyErr::new::<pyo3::exceptions::PyValueError, _>(
                    "Invalid backend. Must be 'flat', 'archive', 'tree', or 'stash'.",
                ))
            }
        };

        // 4. Start the pipeline behind its producer thread.
        let channel = channel_stream(Mux::new(seeds, config), capacity)?;
        Ok(Self { channel })
    }

    fn __iter__(slf: Py<Self>) -> Py<Self> {
        slf
    }

    /// Returns the next `(bytes, shape)` window, or raises StopIteration.
    fn __next__(&mut self, py: Python) -> PyResult<Option<(PyObject, Vec<usize>)>> {
        let item = py.allow_threads(|| self.channel.next());
        match item {
            Some(Ok(obs)) => {
                let shape = obs.x.shape().to_vec();
                let canonical = obs.x.as_standard_layout();
                let elements = canonical.as_slice().ok_or_else(|| {
                    PyErr::new::<pyo3::exceptions::PyRuntimeError, _>(
                        "window is not contiguous after canonicalization",
                    )
                })?;
                let bytes = PyBytes::new(py, typed_slice_to_bytes(elements));
                Ok(Some((bytes.into(), shape)))
            }
            Some(Err(e)) => Err(e.into()),
            None => Ok(None),
        }
    }

    /// Stops the producer thread and drains nothing further. Safe to call
    /// more than once; iteration afterwards raises StopIteration.
    pub fn stop(&mut self) {
        self.channel.stop();
    }
}

/// Tree and stash backends address one container file, not a file list.
fn single_source(paths: &[PathBuf]) -> PyResult<&PathBuf> {
    match paths {
        [path] => Ok(path),
        _ => Err(PyErr::new::<pyo3::exceptions::PyValueError, _>(
            "This backend takes exactly one source path.",
        )),
    }
}

//==================================================================================
// II. Collection Management
//==================================================================================

/// Generates a collection of random flat array files and returns their paths.
#[pyfunction]
#[pyo3(name = "create_flat_collection")]
#[pyo3(signature = (dir, shape, num_items, loc = 0.0, scale = 1.0, seed = None))]
pub fn create_flat_collection_py(
    py: Python,
    dir: &str,
    shape: Vec<usize>,
    num_items: usize,
    loc: f64,
    scale: f64,
    seed: Option<u64>,
) -> PyResult<Vec<String>> {
    let params = GenParams {
        loc,
        scale,
        seed: seed.unwrap_or(DEFAULT_GEN_SEED),
    };
    let paths = py.allow_threads(|| {
        data::create_flat_collection::<f64, _>(dir, &shape, num_items, params)
    })?;
    Ok(paths.iter().map(|p| p.display().to_string()).collect())
}

/// Converts flat array files into single-field archives.
#[pyfunction]
#[pyo3(name = "convert_flat_to_archives")]
#[pyo3(signature = (paths, out_dir, field = "x"))]
pub fn convert_flat_to_archives_py(
    py: Python,
    paths: Vec<String>,
    out_dir: &str,
    field: &str,
) -> PyResult<Vec<String>> {
    let paths: Vec<PathBuf> = paths.iter().map(PathBuf::from).collect();
    let out = py.allow_threads(|| {
        data::convert_flat_to_archives::<f64, _>(&paths, out_dir, field)
    })?;
    Ok(out.iter().map(|p| p.display().to_string()).collect())
}

/// Gathers flat array files into one tree container.
#[pyfunction]
#[pyo3(name = "convert_flat_to_tree")]
pub fn convert_flat_to_tree_py(py: Python, paths: Vec<String>, out_path: &str) -> PyResult<()> {
    let paths: Vec<PathBuf> = paths.iter().map(PathBuf::from).collect();
    py.allow_threads(|| data::convert_flat_to_tree::<f64, _>(&paths, out_path))?;
    Ok(())
}

/// Gathers archives into one stash container.
#[pyfunction]
#[pyo3(name = "convert_archives_to_stash")]
pub fn convert_archives_to_stash_py(
    py: Python,
    paths: Vec<String>,
    out_path: &str,
) -> PyResult<()> {
    let paths: Vec<PathBuf> = paths.iter().map(PathBuf::from).collect();
    py.allow_threads(|| data::convert_archives_to_stash::<f64, _>(&paths, out_path))?;
    Ok(())
}

/// Splits a pytest-benchmark test name into `(test_name, params_json)`.
#[pyfunction]
#[pyo3(name = "parse_benchmark_name")]
pub fn parse_benchmark_name_py(name: &str) -> (String, String) {
    let (test, params) = benchparse::parse_benchmark_name(name);
    (test.to_string(), params)
}

//==================================================================================
// III. Logging
//==================================================================================

static INIT_LOGGER: Once = Once::new();

#[pyfunction]
#[pyo3(name = "enable_verbose_logging")]
#[pyo3(signature = (log_file = None))]
pub fn enable_verbose_logging_py(log_file: Option<String>) {
    INIT_LOGGER.call_once(|| {
        let mut builder = env_logger::Builder::new();

        builder.is_test(false);
        builder.filter_level(LevelFilter::Info);

        // Custom formatter: just print the level and message
        builder.format(|buf, record| {
            use std::io::Write;
            writeln!(buf, "[{}] {}", record.level(), record.args())?;
            buf.flush()?;
            Ok(())
        });

        if let Some(filename) = log_file {
            let file = OpenOptions::new()
                .append(true)
                .create(true)
                .open(filename)
                .expect("Could not open log file in append mode");
            builder.target(env_logger::Target::Pipe(Box::new(file)));
        }

        let _ = builder.try_init();
    });
}
