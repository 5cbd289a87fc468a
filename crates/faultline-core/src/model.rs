//! Domain model for topology-aware root-cause analysis.
//!
//! The model has three layers:
//! - Topology: [`NodeType`], [`NodeRef`], [`Node`] — vertices of the
//!   deployment tree as the oracle reports them.
//! - Input: [`AlarmEvent`] and its compressed form [`AlarmEventRef`].
//! - Verdict: [`Candidate`], [`AlarmPath`], [`AppOutage`] and the
//!   [`AnalysisResult`] bundle returned by one analysis call.
//!
//! All values are immutable to consumers; collections are ordered maps so
//! repeated analyses of the same batch serialize byte-identically.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// =============================================================================
// TOPOLOGY
// =============================================================================

/// Topology layer of a vertex. Ordering follows the hierarchy from leaf
/// (`App`) to root (`IDC`).
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum NodeType {
    App,
    VirtualMachine,
    HostMachine,
    PhysicalMachine,
    NetPartition,
    #[serde(rename = "IDC")]
    Idc,
}

impl NodeType {
    /// Every layer, leaf to root
    pub const ALL: [NodeType; 6] = [
        NodeType::App,
        NodeType::VirtualMachine,
        NodeType::HostMachine,
        NodeType::PhysicalMachine,
        NodeType::NetPartition,
        NodeType::Idc,
    ];

    /// Parse a graph label into a layer, if it names one
    pub fn from_label(label: &str) -> Option<Self> {
        match label {
            "App" => Some(Self::App),
            "VirtualMachine" => Some(Self::VirtualMachine),
            "HostMachine" => Some(Self::HostMachine),
            "PhysicalMachine" => Some(Self::PhysicalMachine),
            "NetPartition" => Some(Self::NetPartition),
            "IDC" => Some(Self::Idc),
            _ => None,
        }
    }

    /// Canonical label
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::App => "App",
            Self::VirtualMachine => "VirtualMachine",
            Self::HostMachine => "HostMachine",
            Self::PhysicalMachine => "PhysicalMachine",
            Self::NetPartition => "NetPartition",
            Self::Idc => "IDC",
        }
    }
}

impl fmt::Display for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Machine tier carrying an alarm, as alarm sources encode it
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum ServerType {
    /// Host machine ("1")
    #[serde(rename = "1")]
    Host,
    /// Virtual machine ("2")
    #[serde(rename = "2")]
    Vm,
    /// Physical machine ("3")
    #[serde(rename = "3")]
    Physical,
}

impl ServerType {
    /// Wire encoding of the tier
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Host => "1",
            Self::Vm => "2",
            Self::Physical => "3",
        }
    }
}

impl fmt::Display for ServerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Stable reference to a topology vertex
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeRef {
    /// Globally unique vertex key (CMDB key or synthesized)
    pub key: String,
    /// Topology layer
    #[serde(rename = "type")]
    pub node_type: NodeType,
    /// Display name
    pub name: String,
    /// Owning datacenter, when known
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub idc: String,
    /// Owning network partition, when known
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,
    /// Raw graph labels
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub labels: Vec<String>,
    /// Free-form vertex properties
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub props: BTreeMap<String, serde_json::Value>,
}

/// Topology vertex plus its baseline fan-out per child layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(flatten)]
    pub reference: NodeRef,
    /// Baseline child cardinality per child layer, positive counts only
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub child_counts: BTreeMap<NodeType, u32>,
}

impl Node {
    /// Vertex key
    pub fn key(&self) -> &str {
        &self.reference.key
    }

    /// Vertex layer
    pub fn node_type(&self) -> NodeType {
        self.reference.node_type
    }
}

// =============================================================================
// INPUT EVENTS
// =============================================================================

/// One raw alarm inside the analysis window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmEvent {
    /// Upstream alarm id, informational only
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub id: String,
    /// Emitting system
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub source: String,
    /// Upstream priority tag (e.g. "P0")
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub priority: String,
    /// Alarmed application name; blank for machine-level alarms
    #[serde(default)]
    pub app_name: String,
    /// Datacenter the alarm fired in
    #[serde(default)]
    pub datacenter: String,
    /// Carrying host machine ip, when the source reports one
    #[serde(default)]
    pub host_ip: String,
    /// Alarmed endpoint ip
    #[serde(default)]
    pub ip: String,
    /// Network partition name, when the source reports one
    #[serde(default)]
    pub network_partition: String,
    /// Machine tier the alarm fired on
    pub server_type: ServerType,
    /// Alarm rule that fired
    #[serde(default)]
    pub rule_name: String,
    /// Firing timestamp
    pub occurred_at: DateTime<Utc>,
    /// Extra source attributes (e.g. a cmdb_key hint)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: BTreeMap<String, String>,
}

impl AlarmEvent {
    /// Deterministic event identity: `app|server_type|idc|ip|rule`.
    /// Duplicates under the same identity dedupe last-write-wins.
    pub fn event_id(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            self.app_name, self.server_type, self.datacenter, self.ip, self.rule_name
        )
    }
}

/// Compressed event reference carried inside verdicts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmEventRef {
    pub id: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub rule_name: String,
    pub node_type: NodeType,
    pub occurred_at: DateTime<Utc>,
}

// =============================================================================
// VERDICTS
// =============================================================================

/// Score breakdown backing a candidate's confidence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreDetail {
    pub coverage: f64,
    pub impact: f64,
    pub base: f64,
    pub raw_score: f64,
    pub normalized: f64,
}

/// Probable root-cause node
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub node: NodeRef,
    /// Normalized confidence in [0, 1]
    pub confidence: f64,
    /// Fraction of baseline children affected, in [0, 1]
    pub coverage: f64,
    /// Promotion reason tag
    pub reason: String,
    pub metrics: ScoreDetail,
    /// Event ids this candidate accounts for, ascending
    #[serde(rename = "explained_event_ids")]
    pub explained: Vec<String>,
}

/// One affected child inside a candidate's subtree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathImpact {
    pub node: NodeRef,
    /// Events on this child, sorted by (occurred_at, id)
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub events: Vec<AlarmEventRef>,
    /// Affected children of this child, recursively
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub impacts: Vec<PathImpact>,
}

/// Candidate node plus the recursive subtree of affected children
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmPath {
    pub candidate: NodeRef,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub impacts: Vec<PathImpact>,
}

/// One collapsed alarmed deployment target inside an app outage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppOutageNode {
    pub server_type: ServerType,
    pub ip: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub host_ip: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub partition: String,
    /// Distinct rule names seen on this target, ascending
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub rule_names: Vec<String>,
}

/// Stage A verdict: an application down on a significant fraction of its
/// deployment footprint in one datacenter
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppOutage {
    pub app_name: String,
    pub datacenter: String,
    /// Total deployment targets reported by the oracle
    pub total_nodes: u32,
    /// Distinct alarmed targets after collapsing
    pub alarmed_nodes: u32,
    pub coverage: f64,
    pub threshold: f64,
    pub affected_nodes: Vec<AppOutageNode>,
}

/// Complete output of one analysis call
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AnalysisResult {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub app_outages: Vec<AppOutage>,
    /// Candidates sorted by confidence descending
    #[serde(default)]
    pub candidates: Vec<Candidate>,
    /// Paths sorted by candidate key ascending
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub paths: Vec<AlarmPath>,
    /// Input events no candidate accounts for, ascending by event id
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unexplained_events: Vec<AlarmEvent>,
    /// Rendered triage prompt
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub prompt: String,
}

/// Clamp a score into [0, 1]
pub fn clamp01(value: f64) -> f64 {
    value.clamp(0.0, 1.0)
}
