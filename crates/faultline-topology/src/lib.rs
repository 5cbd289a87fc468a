//! # Faultline Topology
//!
//! Translates alarm events into topology facts for the analyzer:
//! - [`TopologyOracle`]: the two read operations the analyzer depends on —
//!   resolve an event into a leaf-to-root chain of nodes, and count an
//!   application's deployment targets in a datacenter.
//! - [`graph`]: a narrow read-only seam over a property-graph store.
//! - [`GraphOracle`]: the production adapter implemented on that seam.
//! - [`SnapshotOracle`]: an in-process oracle built from a JSON topology
//!   snapshot, for local deployments and tests.

#![warn(missing_debug_implementations, rust_2018_idioms, unreachable_pub)]

pub mod graph;
pub mod oracle;
pub mod snapshot;

pub use graph::{GraphReader, GraphRecord, GraphValue, GraphVertex};
pub use oracle::{GraphOracle, TopologyOracle};
pub use snapshot::{SnapshotOracle, TopologySnapshot};
