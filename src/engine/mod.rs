//! TWAP Engine — spec §4.4 (component C6).

pub mod twap;

pub use twap::{ExecutionTask, TwapEngine, TwapEngineMetrics, DEFAULT_QUEUE_CAPACITY};
