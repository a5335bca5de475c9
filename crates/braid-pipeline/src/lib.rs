//! # braid-pipeline
//!
//! Wiring layer of the braid engine: a single subscriber to the raw runtime
//! event source that resolves session identity, enriches every event through
//! the correlation service, filters echoed tool results out of text deltas,
//! maps the result onto a small closed set of canonical [`parts::StreamPart`]
//! operations, and publishes batches to subscribers.
//!
//! ## Crate Position
//!
//! Aggregation layer. Depends on: braid-core, braid-correlation.

#![deny(unsafe_code)]

pub mod emitter;
pub mod parts;
pub mod pipeline;

pub use emitter::PartEmitter;
pub use parts::StreamPart;
pub use pipeline::EventPipeline;
