//! Suggestion rules and index recommendations
//!
//! Each rule inspects the statement text and/or the plan tree independently and
//! may emit one suggestion. Rules never see each other's output, so the result
//! does not depend on evaluation order.
//!
//! ## Rule List:
//! - Q001: Sequential scan in plan (INDEX / HIGH)
//! - Q002: Expensive join (QUERY_REWRITE / MEDIUM)
//! - Q003: No WHERE clause (QUERY_REWRITE / CRITICAL)
//! - Q004: Wildcard projection (QUERY_REWRITE / LOW)

use super::statement::{self, ColumnRef, TableRef};
use crate::models::{
    ExecutionPlanNode, IndexRecommendation, IndexType, OptimizationSuggestion, Priority,
    SuggestionKind,
};

/// Heuristic improvement estimate attached to every index recommendation
pub const INDEX_IMPROVEMENT_PERCENT: u8 = 70;

/// Everything a rule may look at
pub struct RuleContext<'a> {
    pub sql: &'a str,
    pub plan: &'a ExecutionPlanNode,
    pub join_cost_threshold: f64,
}

pub trait SuggestionRule: Send + Sync {
    /// Rule ID (e.g., "Q001")
    fn id(&self) -> &str;

    fn name(&self) -> &str;

    fn evaluate(&self, context: &RuleContext) -> Option<OptimizationSuggestion>;
}

/// Q001: a node reads a whole table
pub struct Q001SequentialScan;

impl SuggestionRule for Q001SequentialScan {
    fn id(&self) -> &str {
        "Q001"
    }
    fn name(&self) -> &str {
        "Sequential scan"
    }

    fn evaluate(&self, context: &RuleContext) -> Option<OptimizationSuggestion> {
        let scans = context.plan.sequential_scans();
        if scans.is_empty() {
            return None;
        }

        let mut relations: Vec<&str> =
            scans.iter().filter_map(|n| n.relation_name.as_deref()).collect();
        relations.sort_unstable();
        relations.dedup();

        let target = if relations.is_empty() {
            "a table".to_string()
        } else {
            relations.join(", ")
        };

        Some(OptimizationSuggestion {
            kind: SuggestionKind::Index,
            priority: Priority::High,
            description: format!("Plan performs a sequential scan on {}", target),
            impact: "Every row of the table is read; cost grows linearly with table size"
                .to_string(),
            implementation_hint:
                "Add an index on the columns used in WHERE/JOIN/ORDER BY for the scanned table"
                    .to_string(),
        })
    }
}

/// Q002: join operator whose estimated cost exceeds the configured threshold
pub struct Q002ExpensiveJoin;

impl SuggestionRule for Q002ExpensiveJoin {
    fn id(&self) -> &str {
        "Q002"
    }
    fn name(&self) -> &str {
        "Expensive join"
    }

    fn evaluate(&self, context: &RuleContext) -> Option<OptimizationSuggestion> {
        let worst = context
            .plan
            .iter()
            .filter(|n| n.is_join() && n.total_cost > context.join_cost_threshold)
            .max_by(|a, b| a.total_cost.total_cmp(&b.total_cost))?;

        Some(OptimizationSuggestion {
            kind: SuggestionKind::QueryRewrite,
            priority: Priority::Medium,
            description: format!(
                "{} has estimated cost {:.2} (threshold {:.0})",
                worst.node_type, worst.total_cost, context.join_cost_threshold
            ),
            impact: "Large joins dominate execution time and memory usage".to_string(),
            implementation_hint:
                "Filter inputs before joining, index the join keys, or split the query"
                    .to_string(),
        })
    }
}

/// Q003: statement reads without any predicate
pub struct Q003MissingWhere;

impl SuggestionRule for Q003MissingWhere {
    fn id(&self) -> &str {
        "Q003"
    }
    fn name(&self) -> &str {
        "Missing WHERE clause"
    }

    fn evaluate(&self, context: &RuleContext) -> Option<OptimizationSuggestion> {
        if statement::has_where_clause(context.sql) {
            return None;
        }

        Some(OptimizationSuggestion {
            kind: SuggestionKind::QueryRewrite,
            priority: Priority::Critical,
            description: "Query has no WHERE clause and reads every row".to_string(),
            impact: "Result size and latency are unbounded as the table grows".to_string(),
            implementation_hint: "Add a WHERE clause or a LIMIT to bound the rows returned"
                .to_string(),
        })
    }
}

/// Q004: projection uses `*`
pub struct Q004SelectStar;

impl SuggestionRule for Q004SelectStar {
    fn id(&self) -> &str {
        "Q004"
    }
    fn name(&self) -> &str {
        "Wildcard projection"
    }

    fn evaluate(&self, context: &RuleContext) -> Option<OptimizationSuggestion> {
        if !statement::selects_all_columns(context.sql) {
            return None;
        }

        Some(OptimizationSuggestion {
            kind: SuggestionKind::QueryRewrite,
            priority: Priority::Low,
            description: "Query selects all columns".to_string(),
            impact: "Unneeded columns increase I/O and prevent index-only scans".to_string(),
            implementation_hint: "List only the columns the caller uses".to_string(),
        })
    }
}

pub fn default_rules() -> Vec<Box<dyn SuggestionRule>> {
    vec![
        Box::new(Q001SequentialScan),
        Box::new(Q002ExpensiveJoin),
        Box::new(Q003MissingWhere),
        Box::new(Q004SelectStar),
    ]
}

/// Evaluate every rule against the context
pub fn evaluate_rules(
    rules: &[Box<dyn SuggestionRule>],
    context: &RuleContext,
) -> Vec<OptimizationSuggestion> {
    rules
        .iter()
        .filter_map(|rule| {
            let suggestion = rule.evaluate(context);
            if suggestion.is_some() {
                tracing::debug!("Rule {} ({}) triggered", rule.id(), rule.name());
            }
            suggestion
        })
        .collect()
}

/// Whether `col` belongs to `table`: qualified columns must match the table name or
/// alias; unqualified ones are attributed when the statement references a single
/// table, or when the scan's filter mentions them.
fn column_belongs_to(
    col: &ColumnRef,
    table: &TableRef,
    statement_tables: usize,
    scan_filter: Option<&str>,
) -> bool {
    match &col.qualifier {
        Some(q) => {
            q.eq_ignore_ascii_case(&table.table)
                || table.alias.as_deref().is_some_and(|a| a.eq_ignore_ascii_case(q))
        },
        None => {
            statement_tables <= 1
                || scan_filter.is_some_and(|f| {
                    f.to_lowercase().contains(&col.column.to_lowercase())
                })
        },
    }
}

fn index_name(table: &str, column: &str) -> String {
    format!("idx_{}_{}", table, column).to_lowercase()
}

fn column_recommendation(table: &str, column: &str, reason: String) -> IndexRecommendation {
    let index_type = IndexType::Btree;
    IndexRecommendation {
        table_name: table.to_string(),
        columns: vec![column.to_string()],
        index_type,
        estimated_improvement_percent: INDEX_IMPROVEMENT_PERCENT,
        reason,
        create_statement: Some(format!(
            "CREATE INDEX {} ON {} USING {} ({})",
            index_name(table, column),
            table,
            index_type.as_sql(),
            column
        )),
    }
}

/// Tables read by sequential scans. Scan nodes without a relation name fall back
/// to the tables of the FROM clause.
fn scanned_tables(plan: &ExecutionPlanNode, statement_tables: &[TableRef]) -> Vec<(TableRef, Option<String>)> {
    let mut scanned: Vec<(TableRef, Option<String>)> = Vec::new();
    let mut push = |table: TableRef, filter: Option<String>| {
        if !scanned.iter().any(|(t, _)| t.table.eq_ignore_ascii_case(&table.table)) {
            scanned.push((table, filter));
        }
    };

    for scan in plan.sequential_scans() {
        match &scan.relation_name {
            Some(relation) => {
                let known = statement_tables
                    .iter()
                    .find(|t| t.table.eq_ignore_ascii_case(relation));
                let table = TableRef {
                    table: relation.clone(),
                    alias: scan.alias.clone().or_else(|| known.and_then(|t| t.alias.clone())),
                };
                push(table, scan.filter.clone());
            },
            None => {
                for table in statement_tables {
                    push(table.clone(), scan.filter.clone());
                }
            },
        }
    }

    scanned
}

/// Index recommendations for a statement whose plan contains sequential scans.
///
/// One BTREE recommendation per WHERE-clause column of each scanned table; ORDER BY
/// columns are used when the table has no WHERE column; a table-level
/// recommendation without columns is emitted when neither yields one.
pub fn recommend_indexes(sql: &str, plan: &ExecutionPlanNode) -> Vec<IndexRecommendation> {
    if !plan.has_sequential_scan() {
        return Vec::new();
    }

    let statement_tables = statement::extract_tables(sql);
    let where_columns = statement::extract_where_columns(sql);
    let order_columns = statement::extract_order_by_columns(sql);
    let mut recommendations = Vec::new();

    for (table, filter) in scanned_tables(plan, &statement_tables) {
        let belongs = |c: &&ColumnRef| {
            column_belongs_to(c, &table, statement_tables.len(), filter.as_deref())
        };

        let filtered: Vec<&ColumnRef> = where_columns.iter().filter(belongs).collect();
        if !filtered.is_empty() {
            for col in filtered {
                recommendations.push(column_recommendation(
                    &table.table,
                    &col.column,
                    format!(
                        "Sequential scan on {} filtered by {}",
                        table.table, col.column
                    ),
                ));
            }
            continue;
        }

        let ordered: Vec<&ColumnRef> = order_columns.iter().filter(belongs).collect();
        if !ordered.is_empty() {
            for col in ordered {
                recommendations.push(column_recommendation(
                    &table.table,
                    &col.column,
                    format!("Sequential scan on {} sorted by {}", table.table, col.column),
                ));
            }
            continue;
        }

        recommendations.push(IndexRecommendation {
            table_name: table.table.clone(),
            columns: Vec::new(),
            index_type: IndexType::Btree,
            estimated_improvement_percent: INDEX_IMPROVEMENT_PERCENT,
            reason: format!(
                "Full scan of {} without a usable predicate; index the columns used to filter it",
                table.table
            ),
            create_statement: None,
        });
    }

    recommendations
}
