//! Chain Adapter interface (C3) and Adapter Registry (C4) — spec §4.3, §4.7.

pub mod adapter;
pub mod registry;

pub use adapter::{
    ChainAdapter, ChainEvent, ChainEventData, ChainEventKind, CreateHtlcParams,
    CreateTwapOrderParams, ExecuteTwapIntervalParams, ExecutionOutcome,
};
pub use registry::AdapterRegistry;
