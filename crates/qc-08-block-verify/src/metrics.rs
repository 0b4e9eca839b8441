//! # Block Verification Metrics
//!
//! Prometheus metrics for monitoring block verification.
//!
//! ## Usage
//!
//! Enable with the `metrics` feature:
//! ```toml
//! qc-08-block-verify = { path = "...", features = ["metrics"] }
//! ```
//!
//! ## Metrics Exported
//!
//! - `blkverify_requests_verified_total` - Requests verified locally (by result)
//! - `blkverify_quorum_passed_total` - Requests that reached quorum
//! - `blkverify_votes_received_total` - Votes accepted into a request
//! - `blkverify_hard_failures_total` - Quorum passed on a request that failed locally
//! - `blkverify_recovery_loaded_total` - Requests restored from the recovery log
//! - `blkverify_tx_fetch_latency_seconds` - Transaction fetch time

#[cfg(feature = "metrics")]
use lazy_static::lazy_static;

#[cfg(feature = "metrics")]
use prometheus::{
    register_histogram, register_int_counter, register_int_counter_vec, Histogram, IntCounter,
    IntCounterVec,
};

#[cfg(feature = "metrics")]
lazy_static! {
    /// Requests verified locally, labeled by result
    pub static ref REQUESTS_VERIFIED: IntCounterVec = register_int_counter_vec!(
        "blkverify_requests_verified_total",
        "Total number of requests verified locally",
        &["result"]
    )
    .expect("Failed to create REQUESTS_VERIFIED metric");

    /// Requests that reached quorum
    pub static ref QUORUM_PASSED: IntCounter = register_int_counter!(
        "blkverify_quorum_passed_total",
        "Total number of requests that reached quorum"
    )
    .expect("Failed to create QUORUM_PASSED metric");

    /// Votes accepted
    pub static ref VOTES_RECEIVED: IntCounter = register_int_counter!(
        "blkverify_votes_received_total",
        "Total number of votes accepted into a request"
    )
    .expect("Failed to create VOTES_RECEIVED metric");

    /// Local state failure on a request the network accepted
    pub static ref HARD_FAILURES: IntCounter = register_int_counter!(
        "blkverify_hard_failures_total",
        "Total number of requests that passed quorum but failed local state verification"
    )
    .expect("Failed to create HARD_FAILURES metric");

    /// Requests restored from the recovery log
    pub static ref RECOVERY_LOADED: IntCounter = register_int_counter!(
        "blkverify_recovery_loaded_total",
        "Total number of requests restored from the recovery log"
    )
    .expect("Failed to create RECOVERY_LOADED metric");

    /// Bus events skipped by subscribers that fell behind
    pub static ref BUS_EVENTS_LAGGED: IntCounter = register_int_counter!(
        "blkverify_bus_events_lagged_total",
        "Total number of bus events dropped because a subscriber lagged"
    )
    .expect("Failed to create BUS_EVENTS_LAGGED metric");

    /// Transaction fetch latency
    pub static ref TX_FETCH_LATENCY: Histogram = register_histogram!(
        "blkverify_tx_fetch_latency_seconds",
        "Time taken to fetch a request's transactions in seconds",
        vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0]
    )
    .expect("Failed to create TX_FETCH_LATENCY metric");
}

#[cfg(feature = "metrics")]
pub fn record_request_verified(result: &str) {
    REQUESTS_VERIFIED.with_label_values(&[result]).inc();
}

#[cfg(feature = "metrics")]
pub fn record_quorum_passed() {
    QUORUM_PASSED.inc();
}

#[cfg(feature = "metrics")]
pub fn record_vote_received() {
    VOTES_RECEIVED.inc();
}

#[cfg(feature = "metrics")]
pub fn record_hard_failure() {
    HARD_FAILURES.inc();
}

#[cfg(feature = "metrics")]
pub fn record_recovery_loaded(count: usize) {
    RECOVERY_LOADED.inc_by(count as u64);
}

#[cfg(feature = "metrics")]
pub fn record_bus_events_lagged(count: u64) {
    BUS_EVENTS_LAGGED.inc_by(count);
}

#[cfg(feature = "metrics")]
pub fn record_tx_fetch_latency(seconds: f64) {
    TX_FETCH_LATENCY.observe(seconds);
}

// No-op implementations when metrics feature is disabled
#[cfg(not(feature = "metrics"))]
pub fn record_request_verified(_result: &str) {}

#[cfg(not(feature = "metrics"))]
pub fn record_quorum_passed() {}

#[cfg(not(feature = "metrics"))]
pub fn record_vote_received() {}

#[cfg(not(feature = "metrics"))]
pub fn record_hard_failure() {}

#[cfg(not(feature = "metrics"))]
pub fn record_recovery_loaded(_count: usize) {}

#[cfg(not(feature = "metrics"))]
pub fn record_bus_events_lagged(_count: u64) {}

#[cfg(not(feature = "metrics"))]
pub fn record_tx_fetch_latency(_seconds: f64) {}
