//! Integration tests for Layer 2: Runtime
//!
//! Tests for the sequential subsystem runtime, the parallel unit runtime,
//! and the engine frame loop.

mod parallel;
