//! # Block Verification Test Suite
//!
//! Multi-node scenarios for `qc-08-block-verify`. Every node runs its own
//! [`Dispatcher`](qc_08_block_verify::Dispatcher) over its own event bus; a
//! router per node turns `NetworkSend` events into inbound events on the
//! addressed peers' buses.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── network.rs        # Simulated node set and message routing
//!     ├── quorum_flow.rs    # Validators voting to (or failing) quorum
//!     ├── broadcast_flow.rs # Broadcast nodes accepting posed blocks
//!     └── recovery_flow.rs  # Restarts and full-block recovery
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p qc-tests
//!
//! # With logs
//! RUST_LOG=qc_08_block_verify=debug cargo test -p qc-tests -- --nocapture
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]
#![cfg_attr(test, allow(clippy::panic))]

pub mod integration;
