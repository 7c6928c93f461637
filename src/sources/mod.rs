//! Capture sources

pub mod dsl_file;

pub use dsl_file::{DslCapture, DslHeader};
