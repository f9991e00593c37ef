//! Integration tests for Eddy
//!
//! These tests exercise the stream primitives, the cooperative scheduler and
//! the stream test harness together through their public APIs only.

#[path = "style.rs"]
mod style;

#[path = "streams/cold_streams.rs"]
mod cold_streams;
#[path = "streams/determinism.rs"]
mod determinism;
#[path = "streams/hot_streams.rs"]
mod hot_streams;
#[path = "streams/threaded_backend.rs"]
mod threaded_backend;
