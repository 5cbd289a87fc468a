//! Stage A: application outage detection.
//!
//! Events are partitioned by (application, datacenter); events on the
//! same deployment target collapse into one alarmed node carrying the
//! union of rule names. The oracle supplies the total deployment count
//! for the group; when the alarmed fraction reaches the threshold the
//! group becomes an outage. An oracle failure skips the group only — the
//! rest of the analysis proceeds.

use std::collections::{BTreeMap, BTreeSet};

use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use faultline_core::model::{AlarmEvent, AppOutage, AppOutageNode, ServerType};
use faultline_core::{Error, Result};
use faultline_topology::TopologyOracle;

/// Detect application outages over one event batch
pub async fn detect_app_outages(
    oracle: &dyn TopologyOracle,
    events: &[AlarmEvent],
    threshold: f64,
    cancel: &CancellationToken,
) -> Result<Vec<AppOutage>> {
    let threshold = if threshold > 0.0 { threshold } else { 0.6 };

    let mut groups: BTreeMap<(String, String), Vec<&AlarmEvent>> = BTreeMap::new();
    for event in events {
        if event.app_name.trim().is_empty() {
            continue;
        }
        groups
            .entry((event.app_name.clone(), event.datacenter.clone()))
            .or_default()
            .push(event);
    }

    let mut outages = Vec::new();
    for ((app_name, datacenter), group) in &groups {
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }

        let total = match oracle.list_app_instances(app_name, datacenter).await {
            Ok(total) => total,
            Err(err) => {
                warn!(
                    app = %app_name,
                    idc = %datacenter,
                    error = %err,
                    "skipping outage group, oracle lookup failed"
                );
                continue;
            }
        };
        if total == 0 {
            debug!(app = %app_name, idc = %datacenter, "no known deployment targets");
            continue;
        }

        let alarmed = collapse_alarmed_nodes(group);
        if alarmed.is_empty() {
            continue;
        }

        let coverage = alarmed.len() as f64 / total as f64;
        if coverage < threshold {
            continue;
        }

        let mut affected: Vec<AppOutageNode> = alarmed.into_values().collect();
        affected.sort_by(|a, b| {
            a.server_type
                .cmp(&b.server_type)
                .then_with(|| a.ip.cmp(&b.ip))
        });

        outages.push(AppOutage {
            app_name: app_name.clone(),
            datacenter: datacenter.clone(),
            total_nodes: total,
            alarmed_nodes: affected.len() as u32,
            coverage,
            threshold,
            affected_nodes: affected,
        });
    }

    outages.sort_by(|a, b| {
        b.coverage
            .total_cmp(&a.coverage)
            .then_with(|| a.app_name.cmp(&b.app_name))
            .then_with(|| a.datacenter.cmp(&b.datacenter))
    });

    Ok(outages)
}

/// Collapse a group's events into distinct alarmed deployment targets
fn collapse_alarmed_nodes(events: &[&AlarmEvent]) -> BTreeMap<String, AppOutageNode> {
    let mut nodes: BTreeMap<String, (AppOutageNode, BTreeSet<String>)> = BTreeMap::new();
    for event in events {
        let key = normalize_event_key(event);
        let entry = nodes.entry(key).or_insert_with(|| {
            (
                AppOutageNode {
                    server_type: event.server_type,
                    ip: event.ip.clone(),
                    host_ip: event.host_ip.clone(),
                    partition: event.network_partition.clone(),
                    rule_names: Vec::new(),
                },
                BTreeSet::new(),
            )
        });
        if !event.rule_name.is_empty() {
            entry.1.insert(event.rule_name.clone());
        }
    }
    nodes
        .into_iter()
        .map(|(key, (mut node, rules))| {
            node.rule_names = rules.into_iter().collect();
            (key, node)
        })
        .collect()
}

/// Two events collide when they share (server_type, identity, datacenter).
/// Identity is the alarmed ip, falling back to the carrying host's ip for
/// machine-tier alarms that omit their own.
fn normalize_event_key(event: &AlarmEvent) -> String {
    let identity = match event.server_type {
        ServerType::Host | ServerType::Physical => {
            if !event.ip.is_empty() {
                &event.ip
            } else {
                &event.host_ip
            }
        }
        ServerType::Vm => &event.ip,
    };
    format!("{}:{}:{}", event.server_type, identity, event.datacenter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{TimeZone, Utc};
    use faultline_core::model::Node;

    struct MockOracle {
        totals: BTreeMap<String, u32>,
        fail: bool,
    }

    #[async_trait]
    impl TopologyOracle for MockOracle {
        async fn resolve_event(&self, event: &AlarmEvent) -> Result<Vec<Node>> {
            Err(Error::not_found(event.event_id()))
        }

        async fn list_app_instances(&self, app_name: &str, datacenter: &str) -> Result<u32> {
            if self.fail {
                return Err(Error::oracle("connection refused"));
            }
            Ok(self
                .totals
                .get(&format!("{app_name}|{datacenter}"))
                .copied()
                .unwrap_or(0))
        }
    }

    fn billing_event(ip: &str, rule: &str) -> AlarmEvent {
        AlarmEvent {
            id: String::new(),
            source: String::new(),
            priority: String::new(),
            app_name: "billing".to_string(),
            datacenter: "M5".to_string(),
            host_ip: String::new(),
            ip: ip.to_string(),
            network_partition: "np-core".to_string(),
            server_type: ServerType::Vm,
            rule_name: rule.to_string(),
            occurred_at: Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap(),
            attributes: BTreeMap::new(),
        }
    }

    #[tokio::test]
    async fn test_full_outage_reaches_threshold() {
        let oracle = MockOracle {
            totals: BTreeMap::from([("billing|M5".to_string(), 3)]),
            fail: false,
        };
        let events = vec![
            billing_event("10.1.1.3", "proc_down"),
            billing_event("10.1.1.1", "proc_down"),
            billing_event("10.1.1.2", "proc_down"),
        ];

        let outages = detect_app_outages(&oracle, &events, 0.6, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outages.len(), 1);
        let outage = &outages[0];
        assert!((outage.coverage - 1.0).abs() < 1e-9);
        assert_eq!(outage.alarmed_nodes, 3);
        assert_eq!(outage.total_nodes, 3);
        let ips: Vec<&str> = outage.affected_nodes.iter().map(|n| n.ip.as_str()).collect();
        assert_eq!(ips, vec!["10.1.1.1", "10.1.1.2", "10.1.1.3"]);
    }

    #[tokio::test]
    async fn test_oracle_failure_skips_group_silently() {
        let oracle = MockOracle {
            totals: BTreeMap::new(),
            fail: true,
        };
        let events = vec![
            billing_event("10.1.1.1", "proc_down"),
            billing_event("10.1.1.2", "proc_down"),
            billing_event("10.1.1.3", "proc_down"),
        ];

        let outages = detect_app_outages(&oracle, &events, 0.6, &CancellationToken::new())
            .await
            .unwrap();
        assert!(outages.is_empty());
    }

    #[tokio::test]
    async fn test_below_threshold_is_not_an_outage() {
        let oracle = MockOracle {
            totals: BTreeMap::from([("billing|M5".to_string(), 10)]),
            fail: false,
        };
        let events = vec![
            billing_event("10.1.1.1", "proc_down"),
            billing_event("10.1.1.2", "proc_down"),
        ];

        let outages = detect_app_outages(&oracle, &events, 0.6, &CancellationToken::new())
            .await
            .unwrap();
        assert!(outages.is_empty());
    }

    #[tokio::test]
    async fn test_same_target_collapses_with_rule_union() {
        let oracle = MockOracle {
            totals: BTreeMap::from([("billing|M5".to_string(), 1)]),
            fail: false,
        };
        let events = vec![
            billing_event("10.1.1.1", "proc_down"),
            billing_event("10.1.1.1", "cpu_high"),
            billing_event("10.1.1.1", "proc_down"),
        ];

        let outages = detect_app_outages(&oracle, &events, 0.6, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outages.len(), 1);
        assert_eq!(outages[0].alarmed_nodes, 1);
        assert_eq!(
            outages[0].affected_nodes[0].rule_names,
            vec!["cpu_high".to_string(), "proc_down".to_string()]
        );
    }

    #[tokio::test]
    async fn test_blank_app_names_are_dropped() {
        let oracle = MockOracle {
            totals: BTreeMap::from([("billing|M5".to_string(), 1)]),
            fail: false,
        };
        let mut machine_event = billing_event("10.0.0.1", "ping_loss");
        machine_event.app_name = "  ".to_string();

        let outages =
            detect_app_outages(&oracle, &[machine_event], 0.6, &CancellationToken::new())
                .await
                .unwrap();
        assert!(outages.is_empty());
    }

    #[tokio::test]
    async fn test_host_identity_falls_back_to_host_ip() {
        let mut event = billing_event("", "ping_loss");
        event.server_type = ServerType::Host;
        event.host_ip = "10.0.0.9".to_string();
        assert_eq!(normalize_event_key(&event), "1:10.0.0.9:M5");
    }

    #[tokio::test]
    async fn test_outages_sorted_by_coverage_then_name() {
        let oracle = MockOracle {
            totals: BTreeMap::from([
                ("billing|M5".to_string(), 2),
                ("auth|M5".to_string(), 1),
            ]),
            fail: false,
        };
        let mut auth = billing_event("10.2.0.1", "proc_down");
        auth.app_name = "auth".to_string();
        let events = vec![
            billing_event("10.1.1.1", "proc_down"),
            billing_event("10.1.1.2", "proc_down"),
            auth,
        ];

        let outages = detect_app_outages(&oracle, &events, 0.6, &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(outages.len(), 2);
        // equal coverage 1.0: app name breaks the tie
        assert_eq!(outages[0].app_name, "auth");
        assert_eq!(outages[1].app_name, "billing");
    }

    #[tokio::test]
    async fn test_cancellation_aborts_stage_a() {
        let oracle = MockOracle {
            totals: BTreeMap::new(),
            fail: false,
        };
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = detect_app_outages(&oracle, &[billing_event("10.1.1.1", "r")], 0.6, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Cancelled));
    }
}
