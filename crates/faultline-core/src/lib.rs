//! # Faultline Core
//!
//! Shared foundation for the Faultline root-cause analyzer:
//! - Domain model: topology nodes, alarm events, candidates, verdicts
//! - Analyzer and service configuration with YAML loading
//! - Error taxonomy shared by every crate in the workspace

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod config;
pub mod error;
pub mod model;

pub use error::{Error, Result};

/// Re-export commonly used types
pub mod prelude {
    pub use crate::config::{
        AnalyzerConfig, LayerConfig, PromptOptions, ScoreWeights, ServiceConfig,
    };
    pub use crate::error::{Error, Result};
    pub use crate::model::{
        AlarmEvent, AlarmEventRef, AlarmPath, AnalysisResult, AppOutage, AppOutageNode, Candidate,
        Node, NodeRef, NodeType, PathImpact, ScoreDetail, ServerType,
    };
}
