//! Analyzer and service configuration.
//!
//! `AnalyzerConfig` mirrors the tuning surface of the scorer: the layer
//! hierarchy, per-layer promotion thresholds and score weights, and the
//! Stage A outage threshold. `ServiceConfig` wraps it together with the
//! HTTP and topology settings loaded from a YAML file.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::model::NodeType;

/// Weights blended into a candidate's confidence.
/// `coverage + impact + base` is nominally <= 1.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoreWeights {
    pub coverage: f64,
    pub impact: f64,
    pub base: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            coverage: 0.7,
            impact: 0.3,
            base: 0.0,
        }
    }
}

/// Promotion thresholds for one topology layer
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerConfig {
    /// Minimum coverage for promotion (inclusive)
    pub coverage_threshold: f64,
    /// Minimum impacted children for promotion
    pub min_children: usize,
    pub weights: ScoreWeights,
}

impl Default for LayerConfig {
    fn default() -> Self {
        Self {
            coverage_threshold: 0.6,
            min_children: 1,
            weights: ScoreWeights::default(),
        }
    }
}

/// Root-cause analyzer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalyzerConfig {
    /// Layers that may produce candidates, in evaluation order
    pub hierarchy: Vec<NodeType>,
    /// Per-layer thresholds; layers absent here use [`LayerConfig::default`]
    pub layers: BTreeMap<NodeType, LayerConfig>,
    /// Datacenters the deployment spans
    pub datacenters: Vec<String>,
    /// Stage A coverage threshold (inclusive)
    pub app_outage_threshold: f64,
    /// Reserved: strict-outage mode for Stage A. Parsed and surfaced but
    /// not acted upon until its semantics are confirmed.
    pub require_full_match: bool,
}

impl Default for AnalyzerConfig {
    fn default() -> Self {
        let mut layers = BTreeMap::new();
        for node_type in NodeType::ALL {
            let coverage_threshold = match node_type {
                NodeType::NetPartition => 0.7,
                NodeType::Idc => 0.8,
                _ => 0.6,
            };
            layers.insert(
                node_type,
                LayerConfig {
                    coverage_threshold,
                    ..LayerConfig::default()
                },
            );
        }
        Self {
            hierarchy: NodeType::ALL.to_vec(),
            layers,
            datacenters: vec!["M5".to_string(), "M6".to_string()],
            app_outage_threshold: 0.6,
            require_full_match: false,
        }
    }
}

impl AnalyzerConfig {
    /// Effective config for a layer, falling back to the documented default
    pub fn layer(&self, node_type: NodeType) -> LayerConfig {
        self.layers
            .get(&node_type)
            .copied()
            .unwrap_or_default()
    }

    /// Refuse to start on an empty hierarchy or malformed thresholds/weights
    pub fn validate(&self) -> Result<()> {
        if self.hierarchy.is_empty() {
            return Err(Error::config("hierarchy must name at least one layer"));
        }
        if !(0.0..=1.0).contains(&self.app_outage_threshold) {
            return Err(Error::config(
                "app_outage_threshold must be between 0.0 and 1.0",
            ));
        }
        for (node_type, layer) in &self.layers {
            if !(0.0..=1.0).contains(&layer.coverage_threshold) {
                return Err(Error::config(format!(
                    "{node_type} coverage_threshold must be between 0.0 and 1.0"
                )));
            }
            let weights = &layer.weights;
            for (name, value) in [
                ("coverage", weights.coverage),
                ("impact", weights.impact),
                ("base", weights.base),
            ] {
                if !(0.0..=1.0).contains(&value) {
                    return Err(Error::config(format!(
                        "{node_type} weight {name} must be between 0.0 and 1.0"
                    )));
                }
            }
            if weights.coverage + weights.impact + weights.base > 1.0 + 1e-9 {
                return Err(Error::config(format!(
                    "{node_type} weights must sum to at most 1.0"
                )));
            }
        }
        Ok(())
    }
}

/// Prompt rendering options. Zero-valued caps and empty strings fall back
/// to the documented defaults at render time.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PromptOptions {
    pub assistant_role: String,
    pub language: String,
    pub output_expectation: String,
    pub max_app_outages: usize,
    pub max_affected_nodes: usize,
    pub max_candidates: usize,
    pub max_explained_event_ids: usize,
    pub max_paths: usize,
    pub max_impacts_per_level: usize,
    pub max_events_per_impact: usize,
}

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen: String,
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            request_timeout_secs: 30,
        }
    }
}

/// Topology oracle settings
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologyConfig {
    /// Path to a JSON topology snapshot backing the in-process oracle
    pub snapshot_path: String,
}

/// Complete service configuration
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub server: ServerConfig,
    pub analyzer: AnalyzerConfig,
    pub prompt: PromptOptions,
    pub topology: TopologyConfig,
}

impl ServiceConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("read {}: {e}", path.display())))?;
        let config: Self = serde_yaml::from_str(&raw)
            .map_err(|e| Error::config(format!("parse {}: {e}", path.display())))?;
        config.analyzer.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layer_thresholds() {
        let config = AnalyzerConfig::default();
        assert_eq!(config.layer(NodeType::VirtualMachine).coverage_threshold, 0.6);
        assert_eq!(config.layer(NodeType::NetPartition).coverage_threshold, 0.7);
        assert_eq!(config.layer(NodeType::Idc).coverage_threshold, 0.8);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_missing_layer_uses_fallback() {
        let config = AnalyzerConfig {
            layers: BTreeMap::new(),
            ..AnalyzerConfig::default()
        };
        let layer = config.layer(NodeType::HostMachine);
        assert_eq!(layer.coverage_threshold, 0.6);
        assert_eq!(layer.min_children, 1);
        assert_eq!(layer.weights.coverage, 0.7);
        assert_eq!(layer.weights.impact, 0.3);
        assert_eq!(layer.weights.base, 0.0);
    }

    #[test]
    fn test_validate_rejects_empty_hierarchy() {
        let config = AnalyzerConfig {
            hierarchy: vec![],
            ..AnalyzerConfig::default()
        };
        assert!(matches!(config.validate(), Err(Error::ConfigInvalid(_))));
    }

    #[test]
    fn test_validate_rejects_overweight_layer() {
        let mut config = AnalyzerConfig::default();
        config.layers.insert(
            NodeType::HostMachine,
            LayerConfig {
                weights: ScoreWeights {
                    coverage: 0.8,
                    impact: 0.4,
                    base: 0.1,
                },
                ..LayerConfig::default()
            },
        );
        assert!(matches!(config.validate(), Err(Error::ConfigInvalid(_))));
    }

    #[test]
    fn test_validate_rejects_out_of_range_threshold() {
        let mut config = AnalyzerConfig::default();
        config.layers.insert(
            NodeType::Idc,
            LayerConfig {
                coverage_threshold: 1.5,
                ..LayerConfig::default()
            },
        );
        assert!(matches!(config.validate(), Err(Error::ConfigInvalid(_))));
    }

    #[test]
    fn test_service_config_yaml_roundtrip() {
        let yaml = r#"
server:
  listen: "127.0.0.1:9090"
analyzer:
  hierarchy: [VirtualMachine, HostMachine]
  app_outage_threshold: 0.5
  layers:
    HostMachine:
      coverage_threshold: 0.5
      min_children: 2
topology:
  snapshot_path: "demos/topology.json"
"#;
        let config: ServiceConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.listen, "127.0.0.1:9090");
        assert_eq!(config.analyzer.hierarchy.len(), 2);
        assert_eq!(config.analyzer.layer(NodeType::HostMachine).min_children, 2);
        assert_eq!(config.topology.snapshot_path, "demos/topology.json");
        assert!(config.analyzer.validate().is_ok());
    }
}
