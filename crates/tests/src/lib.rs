//! Integration tests for the serac voting engine.
//!
//! Test modules:
//!
//! - `mock`: reusable chain/transport doubles and the `TestNode` fixture
//! - `processor_tests`: end-to-end voting scenarios (finalization, flips,
//!   neutral stalls, staleness, response validation)
//! - `quorum_tests`: quorum detection, latching and parameter validation
//! - `scheduler_tests`: polling cadence, timeouts, in-flight limits and
//!   the background event loop
//!
//! Run with `cargo test --package serac-tests`.

#[cfg(test)]
mod mock;


#[cfg(test)]
mod quorum_tests;

#[cfg(test)]
mod scheduler_tests;
