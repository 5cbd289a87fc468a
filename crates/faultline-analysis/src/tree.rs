//! Shared alarm tree built from per-event topology chains.
//!
//! The tree is an arena of [`TreeNode`] records indexed by vertex key;
//! parent and children are stored as keys rather than references. Each
//! node accumulates the events that flowed through it, one impact bucket
//! per affected child, and the baseline child cardinalities the oracle
//! reported. The tree lives for exactly one analysis call.

use std::collections::{BTreeMap, BTreeSet};

use faultline_core::model::{AlarmEvent, AlarmEventRef, Node, NodeRef};

/// Accumulated alarms on one child of a tree node
#[derive(Debug, Clone)]
pub struct Impact {
    pub node: NodeRef,
    /// Events on this child, keyed by event id
    pub events: BTreeMap<String, AlarmEventRef>,
}

/// One interned topology vertex with its runtime alarm state
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub node: Node,
    /// Parent vertex key; `None` until a chain links one, then stable
    pub parent: Option<String>,
    /// Child vertex keys observed in any chain
    pub children: BTreeSet<String>,
    /// Affected children, keyed by child vertex key
    pub impacts: BTreeMap<String, Impact>,
    /// Events that flowed through this node, keyed by event id
    pub events: BTreeMap<String, AlarmEventRef>,
}

impl TreeNode {
    fn new(node: Node) -> Self {
        Self {
            node,
            parent: None,
            children: BTreeSet::new(),
            impacts: BTreeMap::new(),
            events: BTreeMap::new(),
        }
    }

    /// Fold in baselines from a re-observed vertex: positive counts
    /// replace zero counts but never shrink a known count.
    fn merge_counts(&mut self, other: &Node) {
        for (&child_type, &count) in &other.child_counts {
            if count == 0 {
                continue;
            }
            let entry = self.node.child_counts.entry(child_type).or_insert(0);
            if count > *entry {
                *entry = count;
            }
        }
    }
}

/// Arena of tree nodes for one analysis call
#[derive(Debug, Default)]
pub struct AlarmTree {
    nodes: BTreeMap<String, TreeNode>,
    event_ids: BTreeSet<String>,
}

impl AlarmTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one event's leaf-to-root chain into the tree: intern every
    /// vertex, attach the event along the whole chain, record a child
    /// impact on each parent, and link parent pointers.
    pub fn insert_chain(&mut self, chain: &[Node], event: &AlarmEvent, event_id: &str) {
        if chain.is_empty() {
            return;
        }
        self.event_ids.insert(event_id.to_string());

        let mut child_key: Option<String> = None;
        for node in chain {
            let key = node.key().to_string();
            let state = self
                .nodes
                .entry(key.clone())
                .or_insert_with(|| TreeNode::new(node.clone()));
            state.merge_counts(node);
            state.events.insert(
                event_id.to_string(),
                AlarmEventRef {
                    id: event_id.to_string(),
                    rule_name: event.rule_name.clone(),
                    node_type: node.node_type(),
                    occurred_at: event.occurred_at,
                },
            );

            if let Some(child) = child_key.take() {
                let child_ref = self.nodes[&child].node.reference.clone();
                let child_type = child_ref.node_type;
                let state = self.nodes.get_mut(&key).expect("interned above");
                state.children.insert(child.clone());
                state
                    .impacts
                    .entry(child.clone())
                    .or_insert_with(|| Impact {
                        node: child_ref,
                        events: BTreeMap::new(),
                    })
                    .events
                    .insert(
                        event_id.to_string(),
                        AlarmEventRef {
                            id: event_id.to_string(),
                            rule_name: event.rule_name.clone(),
                            node_type: child_type,
                            occurred_at: event.occurred_at,
                        },
                    );

                let child_state = self.nodes.get_mut(&child).expect("interned above");
                if child_state.parent.is_none() {
                    child_state.parent = Some(key.clone());
                }
            }
            child_key = Some(key);
        }
    }

    /// Keys of nodes no chain claimed a parent for, ascending
    pub fn roots(&self) -> Vec<String> {
        self.nodes
            .iter()
            .filter(|(_, node)| node.parent.is_none())
            .map(|(key, _)| key.clone())
            .collect()
    }

    pub fn node(&self, key: &str) -> Option<&TreeNode> {
        self.nodes.get(key)
    }

    pub fn node_mut(&mut self, key: &str) -> Option<&mut TreeNode> {
        self.nodes.get_mut(key)
    }

    /// Distinct event ids attached anywhere in the tree
    pub fn total_events(&self) -> usize {
        self.event_ids.len()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use faultline_core::model::{NodeType, ServerType};

    fn make_node(key: &str, node_type: NodeType, counts: &[(NodeType, u32)]) -> Node {
        Node {
            reference: NodeRef {
                key: key.to_string(),
                node_type,
                name: key.to_lowercase(),
                idc: String::new(),
                partition: String::new(),
                labels: vec![node_type.as_str().to_string()],
                props: BTreeMap::new(),
            },
            child_counts: counts.iter().copied().collect(),
        }
    }

    fn make_event(app: &str, minute: u32) -> AlarmEvent {
        AlarmEvent {
            id: String::new(),
            source: String::new(),
            priority: String::new(),
            app_name: app.to_string(),
            datacenter: "M5".to_string(),
            host_ip: String::new(),
            ip: "10.0.0.1".to_string(),
            network_partition: String::new(),
            server_type: ServerType::Vm,
            rule_name: "proc_down".to_string(),
            occurred_at: Utc.with_ymd_and_hms(2024, 3, 1, 10, minute, 0).unwrap(),
            attributes: BTreeMap::new(),
        }
    }

    fn vm_chain(app_key: &str) -> Vec<Node> {
        vec![
            make_node(app_key, NodeType::App, &[]),
            make_node("VM_100", NodeType::VirtualMachine, &[(NodeType::App, 2)]),
            make_node("HM_10", NodeType::HostMachine, &[(NodeType::VirtualMachine, 2)]),
            make_node("NP_1", NodeType::NetPartition, &[(NodeType::HostMachine, 1)]),
            make_node("IDC_1", NodeType::Idc, &[(NodeType::NetPartition, 1)]),
        ]
    }

    #[test]
    fn test_insert_chain_links_parents_and_impacts() {
        let mut tree = AlarmTree::new();
        tree.insert_chain(&vm_chain("APP_1"), &make_event("order-service", 0), "e1");
        tree.insert_chain(&vm_chain("APP_2"), &make_event("payment-service", 1), "e2");

        assert_eq!(tree.len(), 6);
        assert_eq!(tree.total_events(), 2);
        assert_eq!(tree.roots(), vec!["IDC_1".to_string()]);

        let vm = tree.node("VM_100").unwrap();
        assert_eq!(vm.parent.as_deref(), Some("HM_10"));
        assert_eq!(vm.impacts.len(), 2);
        assert_eq!(vm.events.len(), 2);

        let host = tree.node("HM_10").unwrap();
        assert_eq!(host.impacts.len(), 1);
        assert!(host.impacts.contains_key("VM_100"));
        assert_eq!(host.impacts["VM_100"].events.len(), 2);

        let app = tree.node("APP_1").unwrap();
        assert_eq!(app.parent.as_deref(), Some("VM_100"));
        assert!(app.impacts.is_empty());
    }

    #[test]
    fn test_child_counts_grow_but_never_shrink() {
        let mut tree = AlarmTree::new();
        tree.insert_chain(&vm_chain("APP_1"), &make_event("order-service", 0), "e1");

        let mut shrunk = vm_chain("APP_2");
        shrunk[2] = make_node("HM_10", NodeType::HostMachine, &[(NodeType::VirtualMachine, 1)]);
        tree.insert_chain(&shrunk, &make_event("payment-service", 1), "e2");

        let host = tree.node("HM_10").unwrap();
        assert_eq!(host.node.child_counts[&NodeType::VirtualMachine], 2);

        let mut grown = vm_chain("APP_1");
        grown[2] = make_node("HM_10", NodeType::HostMachine, &[(NodeType::VirtualMachine, 5)]);
        tree.insert_chain(&grown, &make_event("order-service", 2), "e1");
        let host = tree.node("HM_10").unwrap();
        assert_eq!(host.node.child_counts[&NodeType::VirtualMachine], 5);
    }

    #[test]
    fn test_duplicate_event_id_dedupes_on_node() {
        let mut tree = AlarmTree::new();
        tree.insert_chain(&vm_chain("APP_1"), &make_event("order-service", 0), "e1");
        tree.insert_chain(&vm_chain("APP_1"), &make_event("order-service", 3), "e1");

        assert_eq!(tree.total_events(), 1);
        let vm = tree.node("VM_100").unwrap();
        assert_eq!(vm.events.len(), 1);
        // last write wins
        assert_eq!(
            vm.events["e1"].occurred_at,
            Utc.with_ymd_and_hms(2024, 3, 1, 10, 3, 0).unwrap()
        );
    }

    #[test]
    fn test_single_node_chain_is_a_root() {
        let mut tree = AlarmTree::new();
        let idc = vec![make_node("IDC_9", NodeType::Idc, &[])];
        tree.insert_chain(&idc, &make_event("", 0), "e-idc");
        assert_eq!(tree.roots(), vec!["IDC_9".to_string()]);
        assert!(tree.node("IDC_9").unwrap().impacts.is_empty());
    }
}
