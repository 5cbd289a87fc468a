//! Read-only seam over the graph store used as topology oracle.
//!
//! The store itself is an external collaborator; the analyzer only ever
//! needs record sets whose columns are vertices (labels + properties) or
//! integer cardinalities. `GraphReader` is the narrowest interface that
//! carries those, and the one test doubles implement.

use std::collections::BTreeMap;

use async_trait::async_trait;
use faultline_core::Result;

/// One record column value
#[derive(Debug, Clone, PartialEq)]
pub enum GraphValue {
    Null,
    Int(i64),
    Text(String),
    Vertex(GraphVertex),
}

impl GraphValue {
    /// Integer view; non-integers read as zero
    pub fn as_int(&self) -> i64 {
        match self {
            Self::Int(v) => *v,
            _ => 0,
        }
    }

    /// Vertex view
    pub fn as_vertex(&self) -> Option<&GraphVertex> {
        match self {
            Self::Vertex(v) => Some(v),
            _ => None,
        }
    }
}

/// A graph vertex as the store returns it
#[derive(Debug, Clone, PartialEq)]
pub struct GraphVertex {
    /// Store-internal vertex id
    pub id: i64,
    pub labels: Vec<String>,
    pub props: BTreeMap<String, serde_json::Value>,
}

impl GraphVertex {
    /// String property, if present and non-empty
    pub fn prop_str(&self, key: &str) -> Option<&str> {
        self.props
            .get(key)
            .and_then(|v| v.as_str())
            .filter(|s| !s.trim().is_empty())
    }
}

/// One result record: column name to value
pub type GraphRecord = BTreeMap<String, GraphValue>;

/// Read-only graph query interface.
///
/// Implementations map transport failures to
/// [`Error::OracleUnavailable`](faultline_core::Error::OracleUnavailable);
/// an empty record set is not an error at this layer.
#[async_trait]
pub trait GraphReader: Send + Sync {
    async fn run_read(
        &self,
        query: &str,
        params: &BTreeMap<String, serde_json::Value>,
    ) -> Result<Vec<GraphRecord>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_graph_value_views() {
        assert_eq!(GraphValue::Int(7).as_int(), 7);
        assert_eq!(GraphValue::Null.as_int(), 0);
        assert_eq!(GraphValue::Text("x".to_string()).as_int(), 0);
        assert!(GraphValue::Null.as_vertex().is_none());
    }

    #[test]
    fn test_vertex_prop_str_skips_blank() {
        let vertex = GraphVertex {
            id: 1,
            labels: vec!["App".to_string()],
            props: BTreeMap::from([
                ("name".to_string(), serde_json::json!("order-service")),
                ("ip".to_string(), serde_json::json!("  ")),
            ]),
        };
        assert_eq!(vertex.prop_str("name"), Some("order-service"));
        assert_eq!(vertex.prop_str("ip"), None);
        assert_eq!(vertex.prop_str("missing"), None);
    }
}
