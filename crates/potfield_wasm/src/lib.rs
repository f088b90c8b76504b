//! JavaScript bindings for `potfield_core`.
//!
//! Engines and grid analyzers are configured from plain JS objects: an
//! optional engine config (missing fields take their defaults) and a list of
//! potential sources tagged by `kind` (`"expression"`, `"gravity"`, `"well"`).

mod analysis;
mod sources;
mod system;

pub use analysis::{AnalysisPayload, WasmGridAnalyzer};
pub use sources::SourceSpec;
pub use system::WasmEngine;
