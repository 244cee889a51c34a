//! Tracing lifecycle and event aggregation.
//!
//! The controller owns the start/stop state machine; the aggregator
//! owns the three concurrent event listeners scoped to one run. The
//! two halves meet in [`EventAggregator::collect`], which runs the
//! bounded-duration wait and the listeners under one cancellation
//! scope.

pub mod aggregator;
pub mod controller;

pub use aggregator::EventAggregator;
pub use controller::TraceController;
