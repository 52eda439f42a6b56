//! The core's error taxonomy (spec §7). Every fallible operation in this
//! crate returns one of these kinds; mapping a kind to a transport status
//! code (HTTP, gRPC, ...) is the caller's job, not the core's.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(
        "slippage exceeded: expected {expected}, actual {actual}, {actual_bps} bps > {limit_bps} bps limit"
    )]
    SlippageExceeded {
        expected: String,
        actual: String,
        actual_bps: u32,
        limit_bps: u32,
    },

    #[error("no price available for {0}")]
    PriceUnavailable(String),

    #[error("chain adapter error on {chain_id}: {source}")]
    Chain {
        chain_id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("store error: {0}")]
    Store(#[source] anyhow::Error),

    #[error("order {0} has expired")]
    OrderExpired(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::Conflict(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    pub fn chain(chain_id: impl Into<String>, source: impl Into<anyhow::Error>) -> Self {
        Self::Chain {
            chain_id: chain_id.into(),
            source: source.into(),
        }
    }

    pub fn store(source: impl Into<anyhow::Error>) -> Self {
        Self::Store(source.into())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
