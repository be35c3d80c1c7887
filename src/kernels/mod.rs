//! This module contains the pure, stateless byte-level kernels.
//!
//! Kernels never do I/O and never inspect container metadata; they transform
//! one buffer into another. The storage layer decides when to call them.

pub mod zstd;
