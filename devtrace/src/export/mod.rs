//! Trace document assembly
//!
//! Serializes the fragments a run collected into one syntactically
//! valid array document the trace-viewer tooling can load.

pub mod document;

pub use document::{legacy_normalize, DocumentWriter};
