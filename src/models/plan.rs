//! Execution plan model
//!
//! Internal representation of an engine execution plan tree. The engine emits
//! `EXPLAIN (FORMAT JSON)` output with its own field names (`Node Type`,
//! `Total Cost`, `Plans`, ...); those are mapped here into [`ExecutionPlanNode`].

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// A single operator node of an execution plan tree
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ExecutionPlanNode {
    /// Operator tag as emitted by the engine (e.g. "Seq Scan", "Hash Join")
    pub node_type: String,
    pub total_cost: f64,
    pub startup_cost: f64,
    pub estimated_rows: i64,
    pub row_width: i64,
    /// Only present when the plan was executed (ANALYZE)
    pub actual_rows: Option<i64>,
    pub actual_loops: Option<i64>,
    pub actual_total_time_ms: Option<f64>,
    pub relation_name: Option<String>,
    pub alias: Option<String>,
    pub filter: Option<String>,
    pub index_name: Option<String>,
    pub join_type: Option<String>,
    pub children: Vec<ExecutionPlanNode>,
}

/// Engine-native node shape (PostgreSQL EXPLAIN JSON)
#[derive(Debug, Deserialize)]
struct RawPlanNode {
    #[serde(rename = "Node Type")]
    node_type: String,
    #[serde(rename = "Startup Cost", default)]
    startup_cost: Option<f64>,
    #[serde(rename = "Total Cost", default)]
    total_cost: Option<f64>,
    #[serde(rename = "Plan Rows", default)]
    plan_rows: Option<f64>,
    #[serde(rename = "Plan Width", default)]
    plan_width: Option<i64>,
    #[serde(rename = "Actual Rows", default)]
    actual_rows: Option<f64>,
    #[serde(rename = "Actual Loops", default)]
    actual_loops: Option<f64>,
    #[serde(rename = "Actual Total Time", default)]
    actual_total_time: Option<f64>,
    #[serde(rename = "Relation Name", default)]
    relation_name: Option<String>,
    #[serde(rename = "Alias", default)]
    alias: Option<String>,
    #[serde(rename = "Filter", default)]
    filter: Option<String>,
    #[serde(rename = "Index Name", default)]
    index_name: Option<String>,
    #[serde(rename = "Join Type", default)]
    join_type: Option<String>,
    #[serde(rename = "Plans", default)]
    plans: Vec<RawPlanNode>,
}

/// Top-level EXPLAIN document: `{"Plan": {...}, "Execution Time": ...}`
#[derive(Debug, Deserialize)]
struct RawExplainDocument {
    #[serde(rename = "Plan")]
    plan: RawPlanNode,
    #[serde(rename = "Execution Time", default)]
    execution_time: Option<f64>,
}

impl From<RawPlanNode> for ExecutionPlanNode {
    fn from(raw: RawPlanNode) -> Self {
        Self {
            node_type: raw.node_type,
            total_cost: raw.total_cost.unwrap_or(0.0).max(0.0),
            startup_cost: raw.startup_cost.unwrap_or(0.0).max(0.0),
            // Engines report row estimates as numbers that may carry a fraction
            estimated_rows: raw.plan_rows.unwrap_or(0.0).max(0.0).round() as i64,
            row_width: raw.plan_width.unwrap_or(0).max(0),
            actual_rows: raw.actual_rows.map(|r| r.round() as i64),
            actual_loops: raw.actual_loops.map(|l| l.round() as i64),
            actual_total_time_ms: raw.actual_total_time,
            relation_name: raw.relation_name,
            alias: raw.alias,
            filter: raw.filter,
            index_name: raw.index_name,
            join_type: raw.join_type,
            children: raw.plans.into_iter().map(ExecutionPlanNode::from).collect(),
        }
    }
}

impl ExecutionPlanNode {
    /// Create a bare node, mostly useful for building plans by hand
    pub fn new(node_type: impl Into<String>, total_cost: f64, estimated_rows: i64) -> Self {
        Self {
            node_type: node_type.into(),
            total_cost,
            estimated_rows,
            ..Default::default()
        }
    }

    pub fn with_relation(mut self, relation: impl Into<String>) -> Self {
        self.relation_name = Some(relation.into());
        self
    }

    pub fn with_child(mut self, child: ExecutionPlanNode) -> Self {
        self.children.push(child);
        self
    }

    /// Parse engine EXPLAIN JSON output.
    ///
    /// Accepts the array form returned by `EXPLAIN (FORMAT JSON)`
    /// (`[{"Plan": {...}}]`), a single `{"Plan": {...}}` document, or a bare node.
    /// When the document carries a top-level `Execution Time` and the root node has
    /// no actual time of its own, the document time is copied onto the root.
    pub fn from_explain_json(value: &serde_json::Value) -> Result<Self, serde_json::Error> {
        let document = match value {
            serde_json::Value::Array(items) => items.first().cloned().ok_or_else(|| {
                <serde_json::Error as serde::de::Error>::custom("empty EXPLAIN output")
            })?,
            other => other.clone(),
        };

        if document.get("Plan").is_some() {
            let doc: RawExplainDocument = serde_json::from_value(document)?;
            let mut root = ExecutionPlanNode::from(doc.plan);
            if root.actual_total_time_ms.is_none() {
                root.actual_total_time_ms = doc.execution_time;
            }
            Ok(root)
        } else {
            let raw: RawPlanNode = serde_json::from_value(document)?;
            Ok(ExecutionPlanNode::from(raw))
        }
    }

    /// Depth-first, pre-order iteration over this node and all descendants
    pub fn iter(&self) -> PlanIter<'_> {
        PlanIter { stack: vec![self] }
    }

    /// Normalized operator tag: lowercase, with '-' and '_' treated as spaces,
    /// so "Seq Scan", "sequential-scan" and "SEQ_SCAN" compare alike
    fn normalized_type(&self) -> String {
        self.node_type
            .to_lowercase()
            .replace(['-', '_'], " ")
            .split_whitespace()
            .collect::<Vec<_>>()
            .join(" ")
    }

    pub fn is_sequential_scan(&self) -> bool {
        matches!(
            self.normalized_type().as_str(),
            "seq scan" | "sequential scan" | "parallel seq scan"
        )
    }

    pub fn is_join(&self) -> bool {
        let t = self.normalized_type();
        t == "nested loop" || t.ends_with(" join")
    }

    pub fn has_sequential_scan(&self) -> bool {
        self.iter().any(ExecutionPlanNode::is_sequential_scan)
    }

    /// Sequential-scan nodes in plan order
    pub fn sequential_scans(&self) -> Vec<&ExecutionPlanNode> {
        self.iter().filter(|n| n.is_sequential_scan()).collect()
    }

    pub fn node_count(&self) -> usize {
        self.iter().count()
    }
}

pub struct PlanIter<'a> {
    stack: Vec<&'a ExecutionPlanNode>,
}

impl<'a> Iterator for PlanIter<'a> {
    type Item = &'a ExecutionPlanNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}
