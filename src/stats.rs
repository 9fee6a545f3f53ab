use std::collections::{HashMap, HashSet};

use hdrhistogram::Histogram;

/// Outcome of a single issued query. Every query yields exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
	Success,
	Negative,
	Error,
	Truncated,
	IdMismatch,
	IoError,
}

/// Counters over [`Outcome`]. `success + negative + error + truncated +
/// idmismatch + ioerror == total` always holds.
#[derive(Debug, Clone, Copy, Default)]
pub struct Counters {
	pub total: u64,
	pub success: u64,
	pub negative: u64,
	pub error: u64,
	pub truncated: u64,
	pub idmismatch: u64,
	pub ioerror: u64,
}

impl Counters {
	pub fn record(&mut self, outcome: Outcome) {
		self.total += 1;
		match outcome {
			Outcome::Success => self.success += 1,
			Outcome::Negative => self.negative += 1,
			Outcome::Error => self.error += 1,
			Outcome::Truncated => self.truncated += 1,
			Outcome::IdMismatch => self.idmismatch += 1,
			Outcome::IoError => self.ioerror += 1,
		}
	}

	fn merge(&mut self, other: &Counters) {
		self.total += other.total;
		self.success += other.success;
		self.negative += other.negative;
		self.error += other.error;
		self.truncated += other.truncated;
		self.idmismatch += other.idmismatch;
		self.ioerror += other.ioerror;
	}
}

/// Histogram bounds/precision, validated from `--min`/`--max`/`--precision`.
#[derive(Debug, Clone, Copy)]
pub struct HistogramConfig {
	pub min_ns: u64,
	pub max_ns: u64,
	pub precision: u8,
}

impl Default for HistogramConfig {
	fn default() -> Self {
		HistogramConfig {
			min_ns: 400_000, // 400us
			max_ns: 60_000_000_000,
			precision: 1,
		}
	}
}

/// Per-worker statistics: owned exclusively by its worker until the
/// worker exits, at which point ownership transfers to the merger.
pub struct WorkerStats {
	pub counters: Counters,
	pub hist: Histogram<u64>,
	pub qtypes: HashMap<String, u64>,
	pub rcodes: Option<HashMap<String, u64>>,
	pub doh_status: HashMap<u16, u64>,
	pub auth_domains: HashSet<String>,
}

impl WorkerStats {
	pub fn new(hist_cfg: HistogramConfig, track_rcodes: bool) -> Self {
		let low = hist_cfg.min_ns.max(1);
		let high = hist_cfg.max_ns.max(low + 1);
		let hist = Histogram::new_with_bounds(low, high, hist_cfg.precision as u8).expect("valid histogram bounds");
		WorkerStats {
			counters: Counters::default(),
			hist,
			qtypes: HashMap::new(),
			rcodes: if track_rcodes { Some(HashMap::new()) } else { None },
			doh_status: HashMap::new(),
			auth_domains: HashSet::new(),
		}
	}

	/// Record one completed query. `rcode` and `http_status` are
	/// independent views of the same event from the outcome counters:
	/// a negative outcome can come from either an NXDomain or a
	/// NoError-with-no-answers response, and the rcode tally keeps that
	/// distinction even though both count the same outcome.
	pub fn record(
		&mut self,
		outcome: Outcome,
		latency_ns: u64,
		qtype: &str,
		rcode: Option<&str>,
		http_status: Option<u16>,
		authenticated: bool,
		auth_domain: Option<&str>,
	) {
		self.counters.record(outcome);
		let _ = self.hist.record(latency_ns);
		*self.qtypes.entry(qtype.to_string()).or_insert(0) += 1;
		if let (Some(map), Some(rcode)) = (self.rcodes.as_mut(), rcode) {
			*map.entry(rcode.to_string()).or_insert(0) += 1;
		}
		if let Some(status) = http_status {
			*self.doh_status.entry(status).or_insert(0) += 1;
		}
		if authenticated {
			if let Some(name) = auth_domain {
				self.auth_domains.insert(name.to_string());
			}
		}
	}
}

/// Structural union of all per-worker stats, produced once at the end of
/// a run and read-only thereafter.
pub struct AggregateStats {
	pub counters: Counters,
	pub hist: Histogram<u64>,
	pub qtypes: HashMap<String, u64>,
	pub rcodes: Option<HashMap<String, u64>>,
	pub doh_status: HashMap<u16, u64>,
	pub auth_domains: HashSet<String>,
	pub duration_secs: f64,
}

impl AggregateStats {
	pub fn qps(&self) -> f64 {
		if self.duration_secs > 0.0 {
			self.counters.total as f64 / self.duration_secs
		} else {
			0.0
		}
	}

	pub fn min_ms(&self) -> f64 {
		ns_to_ms(self.hist.min())
	}

	pub fn max_ms(&self) -> f64 {
		ns_to_ms(self.hist.max())
	}

	pub fn mean_ms(&self) -> f64 {
		ns_to_ms(self.hist.mean() as u64)
	}

	pub fn stdev_ms(&self) -> f64 {
		ns_to_ms(self.hist.stdev() as u64)
	}

	pub fn percentile_ms(&self, p: f64) -> f64 {
		ns_to_ms(self.hist.value_at_quantile(p / 100.0))
	}
}

fn ns_to_ms(ns: u64) -> f64 {
	ns as f64 / 1_000_000.0
}

/// Merge N per-worker stats into one aggregate. Commutative and
/// associative: the result does not depend on worker order.
pub fn merge(workers: Vec<WorkerStats>, duration_secs: f64) -> AggregateStats {
	let mut iter = workers.into_iter();
	let first = iter.next().expect("at least one worker");

	let mut counters = first.counters;
	let mut hist = first.hist;
	let mut qtypes = first.qtypes;
	let mut rcodes = first.rcodes;
	let mut doh_status = first.doh_status;
	let mut auth_domains = first.auth_domains;

	for w in iter {
		counters.merge(&w.counters);
		let _ = hist.add(&w.hist);
		for (k, v) in w.qtypes {
			*qtypes.entry(k).or_insert(0) += v;
		}
		if let (Some(dst), Some(src)) = (rcodes.as_mut(), w.rcodes) {
			for (k, v) in src {
				*dst.entry(k).or_insert(0) += v;
			}
		}
		for (k, v) in w.doh_status {
			*doh_status.entry(k).or_insert(0) += v;
		}
		auth_domains.extend(w.auth_domains);
	}

	AggregateStats {
		counters,
		hist,
		qtypes,
		rcodes,
		doh_status,
		auth_domains,
		duration_secs,
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn worker_with(n: u64) -> WorkerStats {
		let mut w = WorkerStats::new(HistogramConfig::default(), true);
		for _ in 0..n {
			w.record(Outcome::Success, 5_000_000, "A", Some("NOERROR"), None, false, None);
		}
		w
	}

	#[test]
	fn counter_conservation() {
		let mut w = WorkerStats::new(HistogramConfig::default(), true);
		w.record(Outcome::Success, 1_000_000, "A", Some("NOERROR"), None, false, None);
		w.record(Outcome::Negative, 1_000_000, "A", Some("NXDOMAIN"), None, false, None);
		w.record(Outcome::Error, 1_000_000, "A", Some("SERVFAIL"), None, false, None);
		w.record(Outcome::Truncated, 1_000_000, "A", None, None, false, None);
		w.record(Outcome::IdMismatch, 1_000_000, "A", None, None, false, None);
		w.record(Outcome::IoError, 1_000_000, "A", None, None, false, None);
		let c = w.counters;
		assert_eq!(c.total, c.success + c.negative + c.error + c.truncated + c.idmismatch + c.ioerror);
	}

	#[test]
	fn merge_is_commutative_in_totals() {
		let a = worker_with(3);
		let b = worker_with(7);
		let agg = merge(vec![a, b], 1.0);
		assert_eq!(agg.counters.total, 10);
		assert_eq!(agg.counters.success, 10);
		assert_eq!(*agg.qtypes.get("A").unwrap(), 10);
	}

	#[test]
	fn qps_identity() {
		let a = worker_with(100);
		let agg = merge(vec![a], 2.0);
		assert_eq!(agg.qps(), 50.0);
	}

	#[test]
	fn rcodes_and_outcomes_are_independent_views() {
		// Both NXDomain and NoError-with-no-answers classify as Negative,
		// but the rcode tally still distinguishes them.
		let mut w = WorkerStats::new(HistogramConfig::default(), true);
		w.record(Outcome::Negative, 1_000_000, "A", Some("NXDOMAIN"), None, false, None);
		w.record(Outcome::Negative, 1_000_000, "A", Some("NOERROR"), None, false, None);
		assert_eq!(w.counters.negative, 2);
		assert_eq!(*w.rcodes.as_ref().unwrap().get("NXDOMAIN").unwrap(), 1);
		assert_eq!(*w.rcodes.as_ref().unwrap().get("NOERROR").unwrap(), 1);
	}
}
