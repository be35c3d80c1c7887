// In: src/ffi/mod.rs

//! The Python-facing surface of the library. Everything here is a thin
//! marshalling layer: parse Python arguments into the crate's config
//! structs, run the Rust machinery with the GIL released, and hand results
//! back as plain Python values.

pub mod python;
