//! This file is the root of the `minibench_core` Rust crate.
//!
//! Its responsibilities are strictly limited to:
//! 1.  Declaring all the top-level modules of our library (`sampling`,
//!     `storage`, etc.) so the Rust compiler knows they exist.
//! 2.  Defining the `#[pymodule]` which acts as the main entry point when the
//!     compiled library is imported into Python (behind the `python` feature).

//==================================================================================
// 0. Constants
//==================================================================================
/// The crate version, automatically set from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
//==================================================================================
// 1. Module Declarations
//==================================================================================
#[macro_use]
mod observability; // Make macros available throughout the crate

pub mod benchparse;
pub mod config;
pub mod data;
pub mod getters;
pub mod kernels;
pub mod sampling;
pub mod storage;
pub mod types;

mod error;
mod traits;
mod utils;

#[cfg(feature = "python")]
mod ffi;

// The error and element contracts appear throughout the public API.
pub use error::MinibenchError;
pub use traits::Element;

//==================================================================================
// 2. Python Module Definition
//==================================================================================
#[cfg(feature = "python")]
use pyo3::prelude::*;

/// The `minibench_core` Python module, containing all exposed Rust functions.
#[cfg(feature = "python")]
#[pymodule]
fn minibench_core(py: Python, m: &PyModule) -> PyResult<()> {
    use ffi::python::PyMuxSampler;

    // --- Collection management ---
    m.add_function(wrap_pyfunction!(ffi::python::create_flat_collection_py, m)?)?;
    m.add_function(wrap_pyfunction!(ffi::python::convert_flat_to_archives_py, m)?)?;
    m.add_function(wrap_pyfunction!(ffi::python::convert_flat_to_tree_py, m)?)?;
    m.add_function(wrap_pyfunction!(ffi::python::convert_archives_to_stash_py, m)?)?;

    // --- Benchmark-result parsing ---
    m.add_function(wrap_pyfunction!(ffi::python::parse_benchmark_name_py, m)?)?;

    // --- The streaming sampler ---
    m.add_class::<PyMuxSampler>()?;

    // --- Expose the custom error type ---
    m.add(
        "MinibenchError",
        py.get_type::<pyo3::exceptions::PyValueError>(),
    )?;

    // --- Expose version string as a module attribute ---
    m.add("__version__", VERSION)?;

    // --- Turn on logging for scheduler diagnostics ---
    m.add_function(wrap_pyfunction!(ffi::python::enable_verbose_logging_py, m)?)?;

    Ok(())
}
