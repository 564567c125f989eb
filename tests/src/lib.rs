//! # Relay Test Suite
//!
//! End-to-end tests wiring the in-memory bus, the middleware core and the
//! Prometheus export together.
//!
//! ## Structure
//!
//! ```text
//! tests/src/
//! └── integration/
//!     ├── flows.rs          # subscribe / publish / reply / unsubscribe
//!     └── metrics_export.rs # gauges and counters as scraped text
//! ```
//!
//! ## Running Tests
//!
//! ```bash
//! cargo test -p relay-tests
//! cargo test -p relay-tests integration::flows::
//! ```

#![allow(unused_variables)]
#![allow(unused_imports)]
#![allow(dead_code)]

pub mod integration;
