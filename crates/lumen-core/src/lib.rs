//! Lumen Core
//!
//! Logging, profiling, and shared math re-exports used by the
//! rest of the Lumen crates.

pub mod logging;
pub mod math;
pub mod profiling;
