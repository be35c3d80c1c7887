//! This module defines the shared trait that binds Rust primitive types to
//! the storage-level `ElementType` tags.

use crate::types::ElementType;

/// A primitive that can live in a minibench container and flow through the
/// sampling pipeline: plain-old-data for byte-level I/O, castable for the
/// generic data generators, and sendable across the transport thread.
pub trait Element:
    bytemuck::Pod
    + num_traits::NumCast
    + num_traits::Zero
    + PartialEq
    + std::fmt::Debug
    + Send
    + Sync
    + 'static
{
    const ELEMENT_TYPE: ElementType;
}

// Implement the trait for every supported primitive.
macro_rules! impl_element {
    ($T:ty, $tag:expr) => {
        impl Element for $T {
            const ELEMENT_TYPE: ElementType = $tag;
        }
    };
}

impl_element!(i32, ElementType::Int32);
impl_element!(i64, ElementType::Int64);
impl_element!(f32, ElementType::Float32);
impl_element!(f64, ElementType::Float64);
