//! This module defines the core, strongly-typed data representations used
//! throughout the minibench sampling pipeline.
//!
//! It includes the canonical `ElementType` enum which replaces fragile
//! string-based dtype tags with a safe, serializable enum, plus the validated
//! `Shape` and `SliceSpec` geometry types that every storage backend and
//! sampler speaks.

pub mod element_type;
pub mod shape;

// Re-export the main types for easier access.
pub use element_type::ElementType;
pub use shape::{Shape, SliceSpec};
