//! Performance scoring
//!
//! A score starts at 100 and loses points for slow execution, expensive plans and
//! full table scans. The result is always an integer in [0, 100].

use crate::models::ExecutionPlanNode;

pub const MAX_SCORE: f64 = 100.0;

/// Plan cost above which the cost penalty starts
pub const COST_PENALTY_THRESHOLD: f64 = 1000.0;

const MAX_TIME_PENALTY: f64 = 50.0;
const MAX_COST_PENALTY: f64 = 30.0;
const SEQUENTIAL_SCAN_PENALTY: f64 = 20.0;

/// Penalty proportional to how far `value` exceeds `threshold`, capped at `cap`
fn proportional_penalty(value: f64, threshold: f64, cap: f64) -> f64 {
    if threshold <= 0.0 || value.is_nan() || value <= threshold {
        return 0.0;
    }
    (cap * (value - threshold) / threshold).min(cap)
}

/// Score a plan and its observed execution time against the slow-query threshold
pub fn performance_score(
    execution_time_ms: f64,
    plan: &ExecutionPlanNode,
    slow_query_threshold_ms: f64,
) -> u8 {
    let mut score = MAX_SCORE;

    score -= proportional_penalty(execution_time_ms, slow_query_threshold_ms, MAX_TIME_PENALTY);
    score -= proportional_penalty(plan.total_cost, COST_PENALTY_THRESHOLD, MAX_COST_PENALTY);

    if plan.has_sequential_scan() {
        score -= SEQUENTIAL_SCAN_PENALTY;
    }

    score.clamp(0.0, MAX_SCORE).round() as u8
}
