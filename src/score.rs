use serde::Serialize;

use crate::stats::AggregateStats;

/// Composite quality score derived from aggregate stats.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct ScoreResult {
	pub total: f64,
	#[serde(rename = "successRate")]
	pub success_rate: f64,
	#[serde(rename = "errorRate")]
	pub error_rate: f64,
	pub latency: f64,
	pub qps: f64,
}

const WEIGHT_SUCCESS: f64 = 35.0;
const WEIGHT_ERROR: f64 = 10.0;
const WEIGHT_LATENCY: f64 = 50.0;
const WEIGHT_QPS: f64 = 5.0;
const WEIGHT_SUM: f64 = WEIGHT_SUCCESS + WEIGHT_ERROR + WEIGHT_LATENCY + WEIGHT_QPS;

/// Deterministic, pure function over aggregate stats. Returns all-zero
/// when `success == 0`.
pub fn calculate_score(stats: &AggregateStats) -> ScoreResult {
	let total = stats.counters.total;
	if total == 0 || stats.counters.success == 0 {
		return ScoreResult::default();
	}

	let success = stats.counters.success as f64;
	let error = stats.counters.error as f64;
	let ioerror = stats.counters.ioerror as f64;
	let total_f = total as f64;

	let mean_lat_ms = stats.mean_ms();
	let p50_lat_ms = stats.percentile_ms(50.0);
	let p95_lat_ms = stats.percentile_ms(95.0);
	let std_lat_ms = stats.stdev_ms();
	let qps = stats.qps();

	let success_score = clamp(100.0 * success / total_f);
	let error_score = clamp(100.0 * (1.0 - (error + ioerror) / total_f));

	let m = (mean_lat_ms + p50_lat_ms) / 2.0;
	let mut latency_score = if m < 0.1 {
		95.0
	} else if m > 1000.0 {
		0.0
	} else {
		let base = 100.0 * (1.0 - (m - 0.1) / (1000.0 - 0.1));
		let penalty = if m > 0.0 { std_lat_ms / m * 5.0 } else { 0.0 };
		(base - penalty).max(0.0)
	};
	if p95_lat_ms > 1000.0 {
		latency_score *= 0.7;
	}
	let latency_score = clamp(latency_score);

	let qps_score = clamp(100.0 * (1.0 + qps).ln() / (1.0 + 100.0_f64).ln());

	let weighted = success_score * WEIGHT_SUCCESS
		+ error_score * WEIGHT_ERROR
		+ latency_score * WEIGHT_LATENCY
		+ qps_score * WEIGHT_QPS;

	ScoreResult {
		total: weighted / WEIGHT_SUM,
		success_rate: success_score,
		error_rate: error_score,
		latency: latency_score,
		qps: qps_score,
	}
}

fn clamp(v: f64) -> f64 {
	v.clamp(0.0, 100.0)
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::stats::{merge, HistogramConfig, Outcome, WorkerStats};

	fn stats_with_latency(n: u64, latency_ns: u64, duration_secs: f64) -> AggregateStats {
		let mut w = WorkerStats::new(HistogramConfig::default(), true);
		for _ in 0..n {
			w.record(Outcome::Success, latency_ns, "A", Some("NOERROR"), None, false, None);
		}
		merge(vec![w], duration_secs)
	}

	#[test]
	fn success_zero_is_all_zero() {
		let mut w = WorkerStats::new(HistogramConfig::default(), true);
		w.record(Outcome::Error, 1_000_000, "A", Some("SERVFAIL"), None, false, None);
		let agg = merge(vec![w], 1.0);
		let score = calculate_score(&agg);
		assert_eq!(score.total, 0.0);
		assert_eq!(score.success_rate, 0.0);
	}

	#[test]
	fn near_perfect_run_scores_highly() {
		// 100% success, <0.1ms latency, >=100 qps -> total >= 95.
		let agg = stats_with_latency(1000, 50_000, 1.0);
		let score = calculate_score(&agg);
		assert!(score.total >= 95.0, "expected >=95, got {}", score.total);
	}

	#[test]
	fn deterministic_for_identical_input() {
		let a = stats_with_latency(500, 2_000_000, 5.0);
		let b = stats_with_latency(500, 2_000_000, 5.0);
		let sa = calculate_score(&a);
		let sb = calculate_score(&b);
		assert_eq!(sa.total, sb.total);
	}

	#[test]
	fn slow_latency_scores_near_zero_component() {
		let agg = stats_with_latency(10, 1_500_000_000, 1.0);
		let score = calculate_score(&agg);
		assert_eq!(score.latency, 0.0);
	}
}
