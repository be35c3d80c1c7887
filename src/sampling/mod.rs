// In: src/sampling/mod.rs

// ====================================================================================
// ARCHITECTURAL OVERVIEW: The Sampling Layer
// ====================================================================================
//
// The `sampling` module is the public face of the library: everything above
// `storage` that turns stored arrays into a stream of random slices. It is a
// stack of four explicit, pull-based stages; each stage is an ordinary
// iterator and owns the stage below it.
//
//   1. [Offset Generator (indices::RandomSlices)]   -> yields `SliceSpec`
//         |
//         `-> pure RNG; validates geometry up front, never touches storage
//
//   2. [Slice Sampler (samplers::SliceSampler)]     -> yields `Result<Observation>`
//         |
//         `-> owns one `SliceSource` handle; one window read per pull
//
//   3. [Multiplexer (mux::Mux)]                     -> yields `Result<Observation>`
//         |
//         `-> interleaves a bounded working set of samplers, re-opening
//             sources from `StreamSeed` factories as slots retire
//
//   4. [Transport (transport::StreamChannel)]       -> yields `Result<Observation>`
//         |
//         `-> optional: moves any of the above onto a named producer thread
//             behind a bounded channel
//
// Stages compose freely: a single sampler can feed the transport directly,
// and the multiplexer runs fine without a channel. Errors ride the stream as
// items, so a consumer sees exactly one `Err` for a failed read and the
// stream stays ordinary `Iterator` all the way up.
// ====================================================================================
pub mod indices;
pub mod mux;
pub mod samplers;
pub mod transport;

// --- Offset generation ---
pub use indices::RandomSlices;

// --- Single-source samplers ---
pub use samplers::{
    archive_random_slices, flat_random_slices, stash_random_slices, tree_random_slices,
    Observation, ObservationStream, SliceSampler,
};

// --- Multiplexing ---
pub use mux::{archive_pool, flat_pool, stash_pool, tree_pool, Mux, StreamSeed};

// --- Cross-thread transport ---
pub use transport::{channel_stream, StreamChannel, DEFAULT_CHANNEL_CAPACITY};
