//! # Faultline Analysis
//!
//! The root-cause analysis engine:
//! - [`tree`]: folds per-event topology chains into one shared alarm tree
//! - [`outage`]: Stage A — application outage detection per (app, idc)
//! - [`scorer`]: Stage B — post-order roll-up scoring over the tree
//! - [`prompt`]: deterministic, bounded LLM prompt rendering
//! - [`analyzer`]: the orchestration façade tying the stages together

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod analyzer;
pub mod outage;
pub mod prompt;
pub mod scorer;
pub mod tree;

pub use analyzer::{Analyzer, AnalyzerStats, NoopSink, ResultSink};
pub use prompt::render_prompt;
pub use tree::AlarmTree;
