use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::config::BenchmarkConfig;
use crate::driver::{self, RunOutcome};
use crate::error::FatalIOError;
use crate::question::Question;
use crate::server::{parse_server, DohMethod, HttpVersion, ServerDescriptor};

/// One server's outcome in a batch run, keyed by the original input
/// string so callers can render `{server: report}` in insertion order.
pub struct BatchEntry {
	pub server_label: String,
	pub outcome: Result<RunOutcome, FatalIOError>,
}

/// Run the pipeline once per server in `servers`, sequentially and
/// in-process, cloning `config` and overriding only the server
/// descriptor each time.
///
/// `tcp`/`dot`/`http_version`/`doh_method` are threaded through from the
/// original CLI flags the way [`crate::config::assemble`] applies them to
/// the single-server path, since a batch server string carries no scheme
/// override of its own beyond what [`parse_server`] infers.
pub async fn run_batch(
	servers: &[String],
	config: &BenchmarkConfig,
	questions: Arc<Vec<Question>>,
	tcp: bool,
	dot: bool,
	http_version: HttpVersion,
	doh_method: DohMethod,
	common_flags: &crate::server::CommonFlags,
) -> Vec<BatchEntry> {
	let mut results = Vec::with_capacity(servers.len());
	for server_label in servers {
		let cancel = CancellationToken::new();
		let descriptor = build_descriptor(server_label, tcp, dot, http_version, doh_method, common_flags);
		let outcome = match descriptor {
			Ok(server) => driver::run(config, &server, questions.clone(), cancel).await,
			Err(e) => {
				tracing::warn!(server = %server_label, "batch entry failed to parse: {e}");
				Err(FatalIOError { server: server_label.clone(), attempts: 0, reason: e.to_string() })
			}
		};
		results.push(BatchEntry { server_label: server_label.clone(), outcome });
	}
	results
}

fn build_descriptor(
	raw: &str,
	tcp: bool,
	dot: bool,
	http_version: HttpVersion,
	doh_method: DohMethod,
	common_flags: &crate::server::CommonFlags,
) -> Result<ServerDescriptor, crate::error::ConfigError> {
	let mut server = parse_server(raw, tcp, dot, http_version, doh_method)?;
	server.flags = common_flags.clone();
	Ok(server)
}

/// Split the `--batch-json` flag's comma-separated value, trimming
/// whitespace around each entry but preserving input order and
/// duplicates.
pub fn split_batch_servers(raw: &str) -> Vec<String> {
	raw.split(',').map(|s| s.trim().to_string()).filter(|s| !s.is_empty()).collect()
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn splits_and_trims_preserving_order() {
		let servers = split_batch_servers("s1, s2 ,s3");
		assert_eq!(servers, vec!["s1".to_string(), "s2".to_string(), "s3".to_string()]);
	}

	#[test]
	fn blank_entries_are_dropped() {
		let servers = split_batch_servers("s1,,s2,");
		assert_eq!(servers, vec!["s1".to_string(), "s2".to_string()]);
	}

	#[tokio::test]
	async fn unparseable_server_yields_fatal_entry_without_aborting_batch() {
		use crate::config::Termination;
		use crate::delay::RequestDelay;
		use crate::stats::HistogramConfig;

		let config = BenchmarkConfig {
			concurrency: 1,
			termination: Termination::Count(1),
			rate_limit: 0,
			rate_limit_worker: 0,
			request_delay: RequestDelay::None,
			probability: 1.0,
			query_per_conn: 0,
			separate_worker_connections: false,
			connect_timeout: std::time::Duration::from_millis(10),
			write_timeout: std::time::Duration::from_millis(10),
			read_timeout: std::time::Duration::from_millis(10),
			request_timeout: std::time::Duration::from_millis(10),
			hist: HistogramConfig::default(),
			track_rcodes: true,
			fail_conditions: vec![],
			request_log_path: None,
			progress_interval: None,
		};
		use hickory_proto::rr::{Name, RecordType};
		let questions = Arc::new(vec![Question { name: Name::from_ascii("example.com.").unwrap(), qtype: RecordType::A }]);
		let entries = run_batch(
			&["".to_string()],
			&config,
			questions,
			false,
			false,
			HttpVersion::Http1_1,
			DohMethod::Post,
			&crate::server::CommonFlags::default(),
		)
		.await;
		assert_eq!(entries.len(), 1);
		assert!(entries[0].outcome.is_err());
	}
}
