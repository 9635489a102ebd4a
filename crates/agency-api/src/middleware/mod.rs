//! Request middleware: counters and tracing spans.

pub mod metrics;
pub mod tracing_layer;
