//! In-process topology oracle built from a JSON snapshot.
//!
//! The snapshot carries the same six record kinds a CMDB export does:
//! datacenters, network partitions, host machines, physical machines,
//! virtual machines and application instances. Indexes are built once at
//! load; lookups are pure map reads, so the oracle is safe to share
//! across concurrent analyses.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use faultline_core::model::{AlarmEvent, Node, NodeRef, NodeType, ServerType};
use faultline_core::{Error, Result};

use crate::oracle::TopologyOracle;

/// One datacenter record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdcRecord {
    pub id: u32,
    pub name: String,
    #[serde(default)]
    pub location: String,
}

/// One network partition record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartitionRecord {
    pub id: u32,
    pub idc: String,
    pub name: String,
    #[serde(default)]
    pub cidr: String,
}

/// One host or physical machine record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MachineRecord {
    pub id: u32,
    pub idc: String,
    pub network_partition: String,
    pub ip: String,
    #[serde(default)]
    pub host_name: String,
}

/// One virtual machine record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VmRecord {
    pub id: u32,
    pub idc: String,
    pub network_partition: String,
    pub ip: String,
    #[serde(default)]
    pub host_name: String,
    pub host_ip: String,
}

/// One application instance record (one row per deployment target)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppRecord {
    pub id: u32,
    pub ip: String,
    pub name: String,
}

/// Topology snapshot as exported
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TopologySnapshot {
    pub idcs: Vec<IdcRecord>,
    pub partitions: Vec<PartitionRecord>,
    pub hosts: Vec<MachineRecord>,
    pub physicals: Vec<MachineRecord>,
    pub vms: Vec<VmRecord>,
    pub apps: Vec<AppRecord>,
}

impl TopologySnapshot {
    /// Load a snapshot from a JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .map_err(|e| Error::config(format!("read snapshot {}: {e}", path.display())))?;
        serde_json::from_str(&raw)
            .map_err(|e| Error::config(format!("parse snapshot {}: {e}", path.display())))
    }
}

/// Oracle answering from an in-memory snapshot
#[derive(Debug)]
pub struct SnapshotOracle {
    idc_by_name: BTreeMap<String, IdcRecord>,
    np_by_name: BTreeMap<String, PartitionRecord>,
    host_by_ip: BTreeMap<String, MachineRecord>,
    physical_by_ip: BTreeMap<String, MachineRecord>,
    vm_by_ip: BTreeMap<String, VmRecord>,
    app_by_ip: BTreeMap<String, AppRecord>,
    apps_by_name: BTreeMap<String, Vec<AppRecord>>,
    host_vms: BTreeMap<String, Vec<String>>,
    vm_apps: BTreeMap<String, Vec<String>>,
    np_hosts: BTreeMap<String, Vec<String>>,
    np_physicals: BTreeMap<String, Vec<String>>,
    idc_partitions: BTreeMap<String, Vec<String>>,
}

impl SnapshotOracle {
    pub fn new(snapshot: TopologySnapshot) -> Self {
        let mut oracle = Self {
            idc_by_name: BTreeMap::new(),
            np_by_name: BTreeMap::new(),
            host_by_ip: BTreeMap::new(),
            physical_by_ip: BTreeMap::new(),
            vm_by_ip: BTreeMap::new(),
            app_by_ip: BTreeMap::new(),
            apps_by_name: BTreeMap::new(),
            host_vms: BTreeMap::new(),
            vm_apps: BTreeMap::new(),
            np_hosts: BTreeMap::new(),
            np_physicals: BTreeMap::new(),
            idc_partitions: BTreeMap::new(),
        };

        for idc in &snapshot.idcs {
            oracle.idc_by_name.insert(idc.name.clone(), idc.clone());
        }
        for np in &snapshot.partitions {
            oracle.np_by_name.insert(np.name.clone(), np.clone());
            if oracle.idc_by_name.contains_key(&np.idc) {
                oracle
                    .idc_partitions
                    .entry(np.idc.clone())
                    .or_default()
                    .push(format!("NP_{}", np.id));
            }
        }
        for host in &snapshot.hosts {
            oracle.host_by_ip.insert(host.ip.clone(), host.clone());
            if oracle.np_by_name.contains_key(&host.network_partition) {
                oracle
                    .np_hosts
                    .entry(host.network_partition.clone())
                    .or_default()
                    .push(format!("HM_{}", host.id));
            }
        }
        for physical in &snapshot.physicals {
            oracle
                .physical_by_ip
                .insert(physical.ip.clone(), physical.clone());
            if oracle.np_by_name.contains_key(&physical.network_partition) {
                oracle
                    .np_physicals
                    .entry(physical.network_partition.clone())
                    .or_default()
                    .push(format!("PM_{}", physical.id));
            }
        }
        for vm in &snapshot.vms {
            oracle.vm_by_ip.insert(vm.ip.clone(), vm.clone());
            if oracle.host_by_ip.contains_key(&vm.host_ip) {
                oracle
                    .host_vms
                    .entry(vm.host_ip.clone())
                    .or_default()
                    .push(format!("VM_{}", vm.id));
            }
        }
        for app in &snapshot.apps {
            oracle.app_by_ip.insert(app.ip.clone(), app.clone());
            oracle
                .apps_by_name
                .entry(app.name.clone())
                .or_default()
                .push(app.clone());
            if oracle.vm_by_ip.contains_key(&app.ip) {
                oracle
                    .vm_apps
                    .entry(app.ip.clone())
                    .or_default()
                    .push(format!("APP_{}", app.id));
            }
        }

        oracle
    }

    /// Load and index a snapshot file in one step
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        Ok(Self::new(TopologySnapshot::from_file(path)?))
    }

    fn app_node(&self, app: &AppRecord) -> Node {
        Node {
            reference: NodeRef {
                key: format!("APP_{}", app.id),
                node_type: NodeType::App,
                name: app.name.clone(),
                idc: String::new(),
                partition: String::new(),
                labels: vec!["App".to_string()],
                props: BTreeMap::from([
                    ("ip".to_string(), serde_json::json!(app.ip)),
                    ("name".to_string(), serde_json::json!(app.name)),
                ]),
            },
            child_counts: BTreeMap::new(),
        }
    }

    fn vm_node(&self, vm: &VmRecord) -> Node {
        let key = format!("VM_{}", vm.id);
        let app_count = self
            .vm_apps
            .get(&vm.ip)
            .map(|apps| apps.len() as u32)
            .unwrap_or(0)
            .max(1);
        Node {
            reference: NodeRef {
                key,
                node_type: NodeType::VirtualMachine,
                name: vm.host_name.clone(),
                idc: vm.idc.clone(),
                partition: vm.network_partition.clone(),
                labels: vec!["VirtualMachine".to_string(), "Compute".to_string()],
                props: BTreeMap::from([
                    ("ip".to_string(), serde_json::json!(vm.ip)),
                    ("host_ip".to_string(), serde_json::json!(vm.host_ip)),
                    ("hostname".to_string(), serde_json::json!(vm.host_name)),
                ]),
            },
            child_counts: BTreeMap::from([(NodeType::App, app_count)]),
        }
    }

    fn host_node(&self, host: &MachineRecord) -> Node {
        let vm_count = self
            .host_vms
            .get(&host.ip)
            .map(|vms| vms.len() as u32)
            .unwrap_or(0)
            .max(1);
        Node {
            reference: NodeRef {
                key: format!("HM_{}", host.id),
                node_type: NodeType::HostMachine,
                name: host.host_name.clone(),
                idc: host.idc.clone(),
                partition: host.network_partition.clone(),
                labels: vec![
                    "HostMachine".to_string(),
                    "Machine".to_string(),
                    "Compute".to_string(),
                ],
                props: BTreeMap::from([
                    ("ip".to_string(), serde_json::json!(host.ip)),
                    ("hostname".to_string(), serde_json::json!(host.host_name)),
                ]),
            },
            child_counts: BTreeMap::from([(NodeType::VirtualMachine, vm_count)]),
        }
    }

    fn physical_node(&self, physical: &MachineRecord) -> Node {
        Node {
            reference: NodeRef {
                key: format!("PM_{}", physical.id),
                node_type: NodeType::PhysicalMachine,
                name: physical.host_name.clone(),
                idc: physical.idc.clone(),
                partition: physical.network_partition.clone(),
                labels: vec![
                    "PhysicalMachine".to_string(),
                    "Machine".to_string(),
                    "Compute".to_string(),
                ],
                props: BTreeMap::from([
                    ("ip".to_string(), serde_json::json!(physical.ip)),
                    ("hostname".to_string(), serde_json::json!(physical.host_name)),
                ]),
            },
            child_counts: BTreeMap::new(),
        }
    }

    fn np_node(&self, np: &PartitionRecord) -> Node {
        let key = format!("NP_{}", np.id);
        let mut child_counts = BTreeMap::new();
        if let Some(hosts) = self.np_hosts.get(&np.name) {
            child_counts.insert(NodeType::HostMachine, hosts.len() as u32);
        }
        if let Some(physicals) = self.np_physicals.get(&np.name) {
            child_counts.insert(NodeType::PhysicalMachine, physicals.len() as u32);
        }
        Node {
            reference: NodeRef {
                key,
                node_type: NodeType::NetPartition,
                name: np.name.clone(),
                idc: np.idc.clone(),
                partition: np.name.clone(),
                labels: vec!["NetPartition".to_string()],
                props: BTreeMap::from([
                    ("name".to_string(), serde_json::json!(np.name)),
                    ("cidr".to_string(), serde_json::json!(np.cidr)),
                ]),
            },
            child_counts,
        }
    }

    fn idc_node(&self, idc: &IdcRecord) -> Node {
        let key = format!("IDC_{}", idc.id);
        let mut child_counts = BTreeMap::new();
        if let Some(partitions) = self.idc_partitions.get(&idc.name) {
            child_counts.insert(NodeType::NetPartition, partitions.len() as u32);
        }
        Node {
            reference: NodeRef {
                key,
                node_type: NodeType::Idc,
                name: idc.name.clone(),
                idc: idc.name.clone(),
                partition: String::new(),
                labels: vec!["IDC".to_string()],
                props: BTreeMap::from([("name".to_string(), serde_json::json!(idc.name))]),
            },
            child_counts,
        }
    }

    fn resolve_app_event(&self, event: &AlarmEvent) -> Result<Vec<Node>> {
        let app = self
            .app_by_ip
            .get(&event.ip)
            .or_else(|| {
                self.apps_by_name
                    .get(&event.app_name)
                    .and_then(|apps| apps.first())
            })
            .ok_or_else(|| Error::not_found(format!("app {} not found", event.app_name)))?;
        let vm = self
            .vm_by_ip
            .get(&app.ip)
            .ok_or_else(|| Error::not_found(format!("vm {} not found", app.ip)))?;
        let host = self
            .host_by_ip
            .get(&vm.host_ip)
            .ok_or_else(|| Error::not_found(format!("host {} not found", vm.host_ip)))?;
        let (np, idc) = self.upstream_of(&host.network_partition)?;

        Ok(vec![
            self.app_node(app),
            self.vm_node(vm),
            self.host_node(host),
            self.np_node(np),
            self.idc_node(idc),
        ])
    }

    fn resolve_host_event(&self, event: &AlarmEvent) -> Result<Vec<Node>> {
        let ip = if !event.ip.is_empty() {
            &event.ip
        } else {
            &event.host_ip
        };
        let host = self
            .host_by_ip
            .get(ip)
            .ok_or_else(|| Error::not_found(format!("host {ip} not found")))?;
        let (np, idc) = self.upstream_of(&host.network_partition)?;
        Ok(vec![self.host_node(host), self.np_node(np), self.idc_node(idc)])
    }

    fn resolve_physical_event(&self, event: &AlarmEvent) -> Result<Vec<Node>> {
        let ip = if !event.ip.is_empty() {
            &event.ip
        } else {
            &event.host_ip
        };
        let physical = self
            .physical_by_ip
            .get(ip)
            .ok_or_else(|| Error::not_found(format!("physical {ip} not found")))?;
        let (np, idc) = self.upstream_of(&physical.network_partition)?;
        Ok(vec![
            self.physical_node(physical),
            self.np_node(np),
            self.idc_node(idc),
        ])
    }

    fn upstream_of(&self, partition: &str) -> Result<(&PartitionRecord, &IdcRecord)> {
        let np = self
            .np_by_name
            .get(partition)
            .ok_or_else(|| Error::not_found(format!("network partition {partition} not found")))?;
        let idc = self
            .idc_by_name
            .get(&np.idc)
            .ok_or_else(|| Error::not_found(format!("idc {} not found", np.idc)))?;
        Ok((np, idc))
    }
}

#[async_trait]
impl TopologyOracle for SnapshotOracle {
    async fn resolve_event(&self, event: &AlarmEvent) -> Result<Vec<Node>> {
        match event.server_type {
            ServerType::Host => self.resolve_host_event(event),
            ServerType::Physical => self.resolve_physical_event(event),
            ServerType::Vm => self.resolve_app_event(event),
        }
    }

    async fn list_app_instances(&self, app_name: &str, datacenter: &str) -> Result<u32> {
        let Some(apps) = self.apps_by_name.get(app_name) else {
            return Ok(0);
        };
        let mut targets: BTreeSet<String> = BTreeSet::new();
        for app in apps {
            if let Some(vm) = self.vm_by_ip.get(&app.ip) {
                if vm.idc == datacenter {
                    targets.insert(format!("VM_{}", vm.id));
                }
            } else if let Some(host) = self.host_by_ip.get(&app.ip) {
                if host.idc == datacenter {
                    targets.insert(format!("HM_{}", host.id));
                }
            } else if let Some(physical) = self.physical_by_ip.get(&app.ip) {
                if physical.idc == datacenter {
                    targets.insert(format!("PM_{}", physical.id));
                }
            }
        }
        Ok(targets.len() as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    pub(crate) fn create_test_snapshot() -> TopologySnapshot {
        TopologySnapshot {
            idcs: vec![IdcRecord {
                id: 1,
                name: "M5".to_string(),
                location: "east".to_string(),
            }],
            partitions: vec![PartitionRecord {
                id: 1,
                idc: "M5".to_string(),
                name: "np-core".to_string(),
                cidr: "10.1.0.0/16".to_string(),
            }],
            hosts: vec![MachineRecord {
                id: 10,
                idc: "M5".to_string(),
                network_partition: "np-core".to_string(),
                ip: "10.1.0.10".to_string(),
                host_name: "host-10".to_string(),
            }],
            physicals: vec![MachineRecord {
                id: 7,
                idc: "M5".to_string(),
                network_partition: "np-core".to_string(),
                ip: "10.1.0.77".to_string(),
                host_name: "pm-7".to_string(),
            }],
            vms: vec![
                VmRecord {
                    id: 100,
                    idc: "M5".to_string(),
                    network_partition: "np-core".to_string(),
                    ip: "10.1.1.100".to_string(),
                    host_name: "vm-100".to_string(),
                    host_ip: "10.1.0.10".to_string(),
                },
                VmRecord {
                    id: 101,
                    idc: "M5".to_string(),
                    network_partition: "np-core".to_string(),
                    ip: "10.1.1.101".to_string(),
                    host_name: "vm-101".to_string(),
                    host_ip: "10.1.0.10".to_string(),
                },
            ],
            apps: vec![
                AppRecord {
                    id: 1,
                    ip: "10.1.1.100".to_string(),
                    name: "order-service".to_string(),
                },
                AppRecord {
                    id: 2,
                    ip: "10.1.1.101".to_string(),
                    name: "order-service".to_string(),
                },
            ],
        }
    }

    fn app_event(app: &str, ip: &str) -> AlarmEvent {
        AlarmEvent {
            id: String::new(),
            source: String::new(),
            priority: String::new(),
            app_name: app.to_string(),
            datacenter: "M5".to_string(),
            host_ip: String::new(),
            ip: ip.to_string(),
            network_partition: String::new(),
            server_type: ServerType::Vm,
            rule_name: "proc_down".to_string(),
            occurred_at: Utc::now(),
            attributes: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_resolve_app_event_builds_full_chain() {
        let oracle = SnapshotOracle::new(create_test_snapshot());
        let chain = oracle
            .resolve_event(&app_event("order-service", "10.1.1.100"))
            .await
            .unwrap();

        let keys: Vec<&str> = chain.iter().map(|n| n.key()).collect();
        assert_eq!(keys, vec!["APP_1", "VM_100", "HM_10", "NP_1", "IDC_1"]);

        let host = &chain[2];
        assert_eq!(host.child_counts.get(&NodeType::VirtualMachine), Some(&2));
        let np = &chain[3];
        assert_eq!(np.child_counts.get(&NodeType::HostMachine), Some(&1));
        assert_eq!(np.child_counts.get(&NodeType::PhysicalMachine), Some(&1));
    }

    #[tokio::test]
    async fn test_resolve_host_event_starts_at_host() {
        let oracle = SnapshotOracle::new(create_test_snapshot());
        let mut event = app_event("", "10.1.0.10");
        event.server_type = ServerType::Host;

        let chain = oracle.resolve_event(&event).await.unwrap();
        assert_eq!(chain[0].node_type(), NodeType::HostMachine);
        assert_eq!(chain.len(), 3);
    }

    #[tokio::test]
    async fn test_resolve_physical_event_skips_machine_tiers() {
        let oracle = SnapshotOracle::new(create_test_snapshot());
        let mut event = app_event("", "10.1.0.77");
        event.server_type = ServerType::Physical;

        let chain = oracle.resolve_event(&event).await.unwrap();
        let types: Vec<NodeType> = chain.iter().map(|n| n.node_type()).collect();
        assert_eq!(
            types,
            vec![NodeType::PhysicalMachine, NodeType::NetPartition, NodeType::Idc]
        );
    }

    #[tokio::test]
    async fn test_resolve_unknown_event_fails() {
        let oracle = SnapshotOracle::new(create_test_snapshot());
        let err = oracle
            .resolve_event(&app_event("ghost-service", "10.9.9.9"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::TopologyNotFound(_)));
    }

    #[tokio::test]
    async fn test_list_app_instances_counts_distinct_targets() {
        let oracle = SnapshotOracle::new(create_test_snapshot());
        assert_eq!(
            oracle.list_app_instances("order-service", "M5").await.unwrap(),
            2
        );
        assert_eq!(
            oracle.list_app_instances("order-service", "M9").await.unwrap(),
            0
        );
        assert_eq!(oracle.list_app_instances("ghost", "M5").await.unwrap(), 0);
    }
}
