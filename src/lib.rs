//! Cross-chain TWAP bridge orchestration core: Price Cache and Feed
//! Aggregator, the Chain Adapter interface and Adapter Registry, the
//! Order Store interface, the TWAP Engine, and the top-level
//! Orchestrator. On-chain contracts, the REST/WebSocket surface, durable
//! persistence, and process bootstrap are deliberately out of scope —
//! see `DESIGN.md`.

pub mod chain;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod money;
pub mod orchestrator;
pub mod price;
pub mod secret;
pub mod statistics;
pub mod store;

pub use error::{Error, Result};
