//! Topology oracle: alarm event in, topology facts out.
//!
//! `resolve_event` dispatches on the event's machine tier: host alarms
//! resolve starting from the HostMachine vertex, physical alarms from the
//! PhysicalMachine vertex, everything else from the App (preferred) or
//! VirtualMachine. The returned chain is ordered leaf to root and omits
//! absent layers. A chain never carries both a host and a physical; when
//! the store returns both, the physical is dropped.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use faultline_core::model::{AlarmEvent, Node, NodeRef, NodeType, ServerType};
use faultline_core::{Error, Result};

use crate::graph::{GraphReader, GraphRecord, GraphValue, GraphVertex};

/// Read operations the analyzer depends on
#[async_trait]
pub trait TopologyOracle: Send + Sync {
    /// Resolve an event into an ordered leaf-to-root chain of nodes
    async fn resolve_event(&self, event: &AlarmEvent) -> Result<Vec<Node>>;

    /// Count an application's distinct deployment targets in a datacenter,
    /// across all three machine tiers
    async fn list_app_instances(&self, app_name: &str, datacenter: &str) -> Result<u32>;
}

const RESOLVE_FROM_APP_OR_VM: &str = "
MATCH (app:App)
WHERE app.name = $name
OPTIONAL MATCH (app)-[:DEPLOYED_ON]->(vm:VirtualMachine)
OPTIONAL MATCH (vm)<-[:HOSTS_VM]-(host:HostMachine)
OPTIONAL MATCH (host)<-[:HAS_HOST]-(np:NetPartition)
OPTIONAL MATCH (np)<-[:HAS_PARTITION]-(idc:IDC)
RETURN app, vm, host, null AS physical, np, idc,
       CASE WHEN vm IS NULL THEN 0 ELSE size((vm)<-[:DEPLOYED_ON]-(:App)) END AS vm_app_count,
       CASE WHEN host IS NULL THEN 0 ELSE size((host)-[:HOSTS_VM]->(:VirtualMachine)) END AS host_vm_count,
       CASE WHEN np IS NULL THEN 0 ELSE size((np)-[:HAS_HOST]->(:HostMachine)) END AS np_host_count,
       CASE WHEN np IS NULL THEN 0 ELSE size((np)-[:HAS_PHYSICAL]->(:PhysicalMachine)) END AS np_physical_count,
       CASE WHEN idc IS NULL THEN 0 ELSE size((idc)-[:HAS_PARTITION]->(:NetPartition)) END AS idc_np_count
ORDER BY idc.name = $idc DESC
LIMIT 1
";

const RESOLVE_FROM_HOST: &str = "
MATCH (host:HostMachine)
WHERE host.ip = $ip
OPTIONAL MATCH (host)<-[:HAS_HOST]-(np:NetPartition)
OPTIONAL MATCH (np)<-[:HAS_PARTITION]-(idc:IDC)
RETURN null AS app, null AS vm, host, null AS physical, np, idc,
       0 AS vm_app_count,
       CASE WHEN host IS NULL THEN 0 ELSE size((host)-[:HOSTS_VM]->(:VirtualMachine)) END AS host_vm_count,
       CASE WHEN np IS NULL THEN 0 ELSE size((np)-[:HAS_HOST]->(:HostMachine)) END AS np_host_count,
       CASE WHEN np IS NULL THEN 0 ELSE size((np)-[:HAS_PHYSICAL]->(:PhysicalMachine)) END AS np_physical_count,
       CASE WHEN idc IS NULL THEN 0 ELSE size((idc)-[:HAS_PARTITION]->(:NetPartition)) END AS idc_np_count
LIMIT 1
";

const RESOLVE_FROM_PHYSICAL: &str = "
MATCH (phy:PhysicalMachine)
WHERE phy.ip = $ip
OPTIONAL MATCH (np:NetPartition)-[:HAS_PHYSICAL]->(phy)
OPTIONAL MATCH (np)<-[:HAS_PARTITION]-(idc:IDC)
RETURN null AS app, null AS vm, null AS host, phy AS physical, np, idc,
       0 AS vm_app_count,
       0 AS host_vm_count,
       CASE WHEN np IS NULL THEN 0 ELSE size((np)-[:HAS_HOST]->(:HostMachine)) END AS np_host_count,
       CASE WHEN np IS NULL THEN 0 ELSE size((np)-[:HAS_PHYSICAL]->(:PhysicalMachine)) END AS np_physical_count,
       CASE WHEN idc IS NULL THEN 0 ELSE size((idc)-[:HAS_PARTITION]->(:NetPartition)) END AS idc_np_count
LIMIT 1
";

const LIST_VM_INSTANCES: &str = "
MATCH (app:App {name: $app})-[:DEPLOYED_ON]->(vm:VirtualMachine)
MATCH (vm)<-[:HOSTS_VM]-(host:HostMachine)
MATCH (host)<-[:HAS_HOST]-(np:NetPartition)<-[:HAS_PARTITION]-(idc:IDC {name: $idc})
RETURN COUNT(DISTINCT vm) AS total
";

const LIST_HOST_INSTANCES: &str = "
MATCH (app:App {name: $app})-[:DEPLOYED_ON]->(host:HostMachine)
MATCH (host)<-[:HAS_HOST]-(np:NetPartition)<-[:HAS_PARTITION]-(idc:IDC {name: $idc})
RETURN COUNT(DISTINCT host) AS total
";

const LIST_PHYSICAL_INSTANCES: &str = "
MATCH (app:App {name: $app})-[:DEPLOYED_ON]->(phy:PhysicalMachine)
MATCH (np:NetPartition)-[:HAS_PHYSICAL]->(phy)
MATCH (np)<-[:HAS_PARTITION]-(idc:IDC {name: $idc})
RETURN COUNT(DISTINCT phy) AS total
";

/// Production oracle backed by a [`GraphReader`]
#[derive(Clone)]
pub struct GraphOracle {
    reader: Arc<dyn GraphReader>,
}

impl std::fmt::Debug for GraphOracle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GraphOracle").finish_non_exhaustive()
    }
}

impl GraphOracle {
    pub fn new(reader: Arc<dyn GraphReader>) -> Self {
        Self { reader }
    }

    async fn fetch_chain(
        &self,
        query: &str,
        params: BTreeMap<String, serde_json::Value>,
        missing: impl FnOnce() -> String,
    ) -> Result<Vec<Node>> {
        let records = self.reader.run_read(query, &params).await?;
        let Some(record) = records.into_iter().next() else {
            return Err(Error::not_found(missing()));
        };
        chain_from_record(&record)
    }
}

#[async_trait]
impl TopologyOracle for GraphOracle {
    async fn resolve_event(&self, event: &AlarmEvent) -> Result<Vec<Node>> {
        let chain = match event.server_type {
            ServerType::Host => {
                let params = BTreeMap::from([(
                    "ip".to_string(),
                    serde_json::json!(event.ip),
                )]);
                self.fetch_chain(RESOLVE_FROM_HOST, params, || {
                    format!("host {} not found", event.ip)
                })
                .await?
            }
            ServerType::Physical => {
                let params = BTreeMap::from([(
                    "ip".to_string(),
                    serde_json::json!(event.ip),
                )]);
                self.fetch_chain(RESOLVE_FROM_PHYSICAL, params, || {
                    format!("physical {} not found", event.ip)
                })
                .await?
            }
            ServerType::Vm => {
                let params = BTreeMap::from([
                    ("name".to_string(), serde_json::json!(event.app_name)),
                    ("idc".to_string(), serde_json::json!(event.datacenter)),
                ]);
                self.fetch_chain(RESOLVE_FROM_APP_OR_VM, params, || {
                    format!("app {} not found", event.app_name)
                })
                .await?
            }
        };
        debug!(
            event = %event.event_id(),
            chain_len = chain.len(),
            "resolved event chain"
        );
        Ok(chain)
    }

    async fn list_app_instances(&self, app_name: &str, datacenter: &str) -> Result<u32> {
        let params = BTreeMap::from([
            ("app".to_string(), serde_json::json!(app_name)),
            ("idc".to_string(), serde_json::json!(datacenter)),
        ]);
        let mut total: i64 = 0;
        for query in [LIST_VM_INSTANCES, LIST_HOST_INSTANCES, LIST_PHYSICAL_INSTANCES] {
            let records = self.reader.run_read(query, &params).await?;
            for record in &records {
                if let Some(value) = record.get("total") {
                    total += value.as_int();
                }
            }
        }
        Ok(total.max(0) as u32)
    }
}

/// Assemble a leaf-to-root chain from one record. Columns `app`, `vm`,
/// `host`, `physical`, `np`, `idc` hold the vertices; `*_count` columns
/// hold baseline child cardinalities.
fn chain_from_record(record: &GraphRecord) -> Result<Vec<Node>> {
    let app = vertex_node(record, "app")?;
    let mut vm = vertex_node(record, "vm")?;
    let mut host = vertex_node(record, "host")?;
    let mut physical = vertex_node(record, "physical")?;
    let mut np = vertex_node(record, "np")?;
    let mut idc = vertex_node(record, "idc")?;

    set_child_count(&mut vm, NodeType::App, count(record, "vm_app_count"));
    set_child_count(&mut host, NodeType::VirtualMachine, count(record, "host_vm_count"));
    set_child_count(&mut np, NodeType::HostMachine, count(record, "np_host_count"));
    set_child_count(&mut np, NodeType::PhysicalMachine, count(record, "np_physical_count"));
    set_child_count(&mut idc, NodeType::NetPartition, count(record, "idc_np_count"));

    // a chain carries at most one machine-tier node
    if host.is_some() && physical.is_some() {
        physical = None;
    }

    Ok([app, vm, host, physical, np, idc]
        .into_iter()
        .flatten()
        .collect())
}

fn count(record: &GraphRecord, column: &str) -> i64 {
    record.get(column).map(GraphValue::as_int).unwrap_or(0)
}

fn vertex_node(record: &GraphRecord, column: &str) -> Result<Option<Node>> {
    let Some(value) = record.get(column) else {
        return Ok(None);
    };
    let Some(vertex) = value.as_vertex() else {
        return Ok(None);
    };
    Ok(Some(node_from_vertex(vertex)?))
}

fn node_from_vertex(vertex: &GraphVertex) -> Result<Node> {
    let node_type = infer_node_type(&vertex.labels).ok_or_else(|| {
        Error::not_found(format!(
            "vertex {} carries no topology label: {:?}",
            vertex.id, vertex.labels
        ))
    })?;

    let name = ["name", "hostname", "cmdb_key", "ip"]
        .iter()
        .find_map(|k| vertex.prop_str(k))
        .unwrap_or_default()
        .to_string();

    let key = match vertex.prop_str("cmdb_key") {
        Some(cmdb_key) => cmdb_key.to_string(),
        None => match vertex.prop_str("ip") {
            Some(ip) => format!("{node_type}:{ip}"),
            None => format!("{node_type}:{}", vertex.id),
        },
    };

    Ok(Node {
        reference: NodeRef {
            key,
            node_type,
            name,
            idc: vertex.prop_str("idc").unwrap_or_default().to_string(),
            partition: vertex
                .prop_str("network_partition")
                .or_else(|| vertex.prop_str("partition"))
                .unwrap_or_default()
                .to_string(),
            labels: vertex.labels.clone(),
            props: vertex.props.clone(),
        },
        child_counts: BTreeMap::new(),
    })
}

/// First recognized topology label wins
fn infer_node_type(labels: &[String]) -> Option<NodeType> {
    labels.iter().find_map(|label| NodeType::from_label(label))
}

fn set_child_count(node: &mut Option<Node>, child_type: NodeType, count: i64) {
    if count <= 0 {
        return;
    }
    if let Some(node) = node {
        node.child_counts.insert(child_type, count as u32);
    }
}
