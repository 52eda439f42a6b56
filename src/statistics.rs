//! In-memory statistics counters (spec §4.7 "Statistics"). Lives at the
//! crate root rather than under `orchestrator` since both the Orchestrator
//! and the TWAP Engine record into the same counters.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

#[derive(Default)]
pub struct Statistics {
    total_orders: AtomicU64,
    active_orders: AtomicU64,
    completed_orders: AtomicU64,
    failed_orders: AtomicU64,
    swaps: AtomicU64,
    successful_swaps: AtomicU64,
    total_process_time_ms: AtomicU64,
    process_time_samples: AtomicU64,
    started_at: Option<Instant>,
}

#[derive(Debug, Clone, Copy)]
pub struct StatisticsSnapshot {
    pub total_orders: u64,
    pub active_orders: u64,
    pub completed_orders: u64,
    pub failed_orders: u64,
    pub swaps: u64,
    pub successful_swaps: u64,
    pub average_process_time_ms: f64,
    pub uptime_secs: u64,
}

impl Statistics {
    pub fn new() -> Self {
        Self {
            started_at: Some(Instant::now()),
            ..Default::default()
        }
    }

    pub fn record_order_created(&self) {
        self.total_orders.fetch_add(1, Ordering::Relaxed);
        self.active_orders.fetch_add(1, Ordering::Relaxed);
    }

    /// Records a completed order's end-to-end processing time, measured by
    /// the caller from `Order::created_at` (spec §4.7 "average processing
    /// time").
    pub fn record_order_completed(&self, process_time_ms: u64) {
        self.active_orders.fetch_sub(1, Ordering::Relaxed);
        self.completed_orders.fetch_add(1, Ordering::Relaxed);
        self.total_process_time_ms
            .fetch_add(process_time_ms, Ordering::Relaxed);
        self.process_time_samples.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_order_failed(&self) {
        self.active_orders.fetch_sub(1, Ordering::Relaxed);
        self.failed_orders.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_swap_attempted(&self) {
        self.swaps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_swap_succeeded(&self) {
        self.successful_swaps.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatisticsSnapshot {
        let samples = self.process_time_samples.load(Ordering::Relaxed);
        let average_process_time_ms = if samples == 0 {
            0.0
        } else {
            self.total_process_time_ms.load(Ordering::Relaxed) as f64 / samples as f64
        };
        StatisticsSnapshot {
            total_orders: self.total_orders.load(Ordering::Relaxed),
            active_orders: self.active_orders.load(Ordering::Relaxed),
            completed_orders: self.completed_orders.load(Ordering::Relaxed),
            failed_orders: self.failed_orders.load(Ordering::Relaxed),
            swaps: self.swaps.load(Ordering::Relaxed),
            successful_swaps: self.successful_swaps.load(Ordering::Relaxed),
            average_process_time_ms,
            uptime_secs: self
                .started_at
                .map(|t| t.elapsed().as_secs())
                .unwrap_or(0),
        }
    }
}
