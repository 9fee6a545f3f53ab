use std::path::PathBuf;
use std::time::Duration;

use crate::cli::BenchmarkArgs;
use crate::delay::{parse_request_delay, RequestDelay};
use crate::error::ConfigError;
use crate::question::{build_questions, load_names, parse_query_types, Question};
use crate::server::{parse_server, DohMethod, HttpVersion, ServerDescriptor};
use crate::stats::HistogramConfig;

/// How a run decides it is done: exactly one of these.
#[derive(Debug, Clone, Copy)]
pub enum Termination {
	Count(u32),
	Duration(Duration),
}

/// Outcome categories that `--fail` can turn into a non-zero exit code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailCondition {
	IoError,
	Negative,
	Error,
	IdMismatch,
}

impl FailCondition {
	fn parse(raw: &str) -> Result<Self, ConfigError> {
		match raw.to_ascii_lowercase().as_str() {
			"ioerror" => Ok(FailCondition::IoError),
			"negative" => Ok(FailCondition::Negative),
			"error" => Ok(FailCondition::Error),
			"idmismatch" => Ok(FailCondition::IdMismatch),
			_ => Err(ConfigError::InvalidServer {
				input: raw.to_string(),
				reason: "--fail must be one of ioerror, negative, error, idmismatch".to_string(),
			}),
		}
	}
}

/// The assembled, explicit-value configuration handed to the driver. Not a
/// process singleton -- batch mode clones it once per server.
#[derive(Debug, Clone)]
pub struct BenchmarkConfig {
	pub concurrency: u32,
	pub termination: Termination,
	pub rate_limit: u32,
	pub rate_limit_worker: u32,
	pub request_delay: RequestDelay,
	pub probability: f64,
	pub query_per_conn: u32,
	pub separate_worker_connections: bool,
	pub connect_timeout: Duration,
	pub write_timeout: Duration,
	pub read_timeout: Duration,
	pub request_timeout: Duration,
	pub hist: HistogramConfig,
	pub track_rcodes: bool,
	pub fail_conditions: Vec<FailCondition>,
	pub request_log_path: Option<PathBuf>,
	pub progress_interval: Option<Duration>,
}

/// Parse a `clap`-free duration string shared by `--request`/`--write`/
/// `--read`/`--connect`/`--min`/`--max`. Delegates to [`delay::parse_request_delay`]'s
/// single-duration grammar so "5s", "400us", "250ms" all work the same way.
fn parse_plain_duration(raw: &str) -> Result<Duration, ConfigError> {
	match parse_request_delay(raw)? {
		RequestDelay::None => Ok(Duration::ZERO),
		RequestDelay::Constant(d) => Ok(d),
		RequestDelay::Range(_, _) => Err(ConfigError::InvalidDelay {
			input: raw.to_string(),
			reason: "a single duration was expected, not a range".to_string(),
		}),
	}
}

/// Convert parsed CLI flags into a [`ServerDescriptor`], a [`BenchmarkConfig`]
/// and the materialized [`Question`] list. Bypassed entirely by unit tests
/// below, the way the teacher tests `resolver::parse_resolver` without
/// going through `clap`.
pub async fn assemble(args: &BenchmarkArgs) -> Result<(ServerDescriptor, BenchmarkConfig, Vec<Question>), ConfigError> {
	let config = assemble_sync(args)?;

	let names = load_names(&args.queries).await?;
	let qtypes = parse_query_types(&args.types)?;
	let questions = build_questions(&names, &qtypes)?;

	let http_version = HttpVersion::parse(&args.doh_protocol)?;
	let doh_method = DohMethod::parse(&args.doh_method)?;
	let mut server = parse_server(&args.server, args.tcp, args.dot, http_version, doh_method)?;
	server.flags.recurse = args.recurse;
	server.flags.insecure_tls = args.insecure;
	server.flags.dnssec_do = args.dnssec;
	server.flags.edns0_buf_size = args.edns0;
	server.flags.edns_opt = parse_ednsopt(args.ednsopt.as_deref())?;

	Ok((server, config, questions))
}

/// The part of [`assemble`] that needs no I/O (no file/URL fetches) --
/// split out so config invariants can be unit-tested synchronously.
fn assemble_sync(args: &BenchmarkArgs) -> Result<BenchmarkConfig, ConfigError> {
	if args.concurrency == 0 {
		return Err(ConfigError::ZeroConcurrency);
	}
	let termination = match (args.number, &args.duration) {
		(Some(n), None) => Termination::Count(n),
		(None, Some(d)) => Termination::Duration(parse_plain_duration(d)?),
		_ => return Err(ConfigError::CountAndDurationConflict),
	};
	if args.probability <= 0.0 {
		return Err(ConfigError::InvalidProbability);
	}
	if args.hist_precision < 1 || args.hist_precision > 5 {
		return Err(ConfigError::InvalidHistogramPrecision);
	}

	let fail_conditions = args.fail.iter().map(|s| FailCondition::parse(s)).collect::<Result<Vec<_>, _>>()?;
	let request_delay = parse_request_delay(&args.request_delay)?;
	let request_timeout = parse_plain_duration(&args.request_timeout)?;
	let connect_timeout = match &args.connect_timeout {
		Some(s) => parse_plain_duration(s)?,
		None => request_timeout,
	};
	let write_timeout = match &args.write_timeout {
		Some(s) => parse_plain_duration(s)?,
		None => request_timeout,
	};
	let read_timeout = match &args.read_timeout {
		Some(s) => parse_plain_duration(s)?,
		None => request_timeout,
	};
	let hist = HistogramConfig {
		min_ns: parse_plain_duration(&args.hist_min)?.as_nanos() as u64,
		max_ns: parse_plain_duration(&args.hist_max)?.as_nanos() as u64,
		precision: args.hist_precision,
	};
	let progress_interval = match &args.progress_interval {
		Some(s) => Some(parse_plain_duration(s)?),
		None => None,
	};

	Ok(BenchmarkConfig {
		concurrency: args.concurrency,
		termination,
		rate_limit: args.rate_limit,
		rate_limit_worker: args.rate_limit_worker,
		request_delay,
		probability: args.probability,
		query_per_conn: args.query_per_conn,
		separate_worker_connections: args.separate_worker_connections,
		connect_timeout,
		write_timeout,
		read_timeout,
		request_timeout,
		hist,
		track_rcodes: args.codes,
		fail_conditions,
		request_log_path: args.log_requests.then(|| PathBuf::from(args.log_requests_path.clone().unwrap_or_else(|| "requests.log".to_string()))),
		progress_interval,
	})
}

fn parse_ednsopt(raw: Option<&str>) -> Result<Option<(u16, Vec<u8>)>, ConfigError> {
	let Some(raw) = raw else { return Ok(None) };
	let (code, hex) = raw.split_once(':').ok_or_else(|| ConfigError::InvalidEdnsOpt { input: raw.to_string() })?;
	let code: u16 = code.parse().map_err(|_| ConfigError::InvalidEdnsOpt { input: raw.to_string() })?;
	if hex.len() % 2 != 0 {
		return Err(ConfigError::InvalidEdnsOpt { input: raw.to_string() });
	}
	let mut bytes = Vec::with_capacity(hex.len() / 2);
	for chunk in hex.as_bytes().chunks(2) {
		let byte_str = std::str::from_utf8(chunk).map_err(|_| ConfigError::InvalidEdnsOpt { input: raw.to_string() })?;
		let byte = u8::from_str_radix(byte_str, 16).map_err(|_| ConfigError::InvalidEdnsOpt { input: raw.to_string() })?;
		bytes.push(byte);
	}
	Ok(Some((code, bytes)))
}

#[cfg(test)]
mod tests {
	use super::*;

	fn base_args() -> BenchmarkArgs {
		BenchmarkArgs {
			server: "127.0.0.1".to_string(),
			types: vec![],
			number: Some(10),
			concurrency: 1,
			rate_limit: 0,
			rate_limit_worker: 0,
			duration: None,
			tcp: false,
			dot: false,
			insecure: false,
			doh_method: "POST".to_string(),
			doh_protocol: "1.1".to_string(),
			recurse: true,
			dnssec: false,
			edns0: 0,
			ednsopt: None,
			probability: 1.0,
			query_per_conn: 0,
			separate_worker_connections: false,
			request_delay: "0s".to_string(),
			write_timeout: None,
			read_timeout: None,
			connect_timeout: None,
			request_timeout: "5s".to_string(),
			hist_min: "400us".to_string(),
			hist_max: "60s".to_string(),
			hist_precision: 1,
			codes: true,
			fail: vec![],
			progress_interval: None,
			log_requests: false,
			log_requests_path: None,
			json: None,
			csv: None,
			html: None,
			plot: None,
			plotf: None,
			batch_json: None,
			queries: vec!["example.com".to_string()],
		}
	}

	#[test]
	fn count_and_duration_conflict() {
		let mut args = base_args();
		args.duration = Some("5s".to_string());
		assert!(matches!(assemble_sync(&args), Err(ConfigError::CountAndDurationConflict)));
	}

	#[test]
	fn zero_concurrency_is_rejected() {
		let mut args = base_args();
		args.concurrency = 0;
		assert!(matches!(assemble_sync(&args), Err(ConfigError::ZeroConcurrency)));
	}

	#[test]
	fn zero_probability_is_rejected() {
		let mut args = base_args();
		args.probability = 0.0;
		assert!(matches!(assemble_sync(&args), Err(ConfigError::InvalidProbability)));
	}

	#[test]
	fn precision_out_of_range_is_rejected() {
		let mut args = base_args();
		args.hist_precision = 6;
		assert!(matches!(assemble_sync(&args), Err(ConfigError::InvalidHistogramPrecision)));
	}

	#[test]
	fn timeouts_default_to_request_timeout() {
		let args = base_args();
		let config = assemble_sync(&args).unwrap();
		assert_eq!(config.connect_timeout, Duration::from_secs(5));
		assert_eq!(config.write_timeout, Duration::from_secs(5));
		assert_eq!(config.read_timeout, Duration::from_secs(5));
	}

	#[test]
	fn ednsopt_parses_hex() {
		let parsed = parse_ednsopt(Some("65001:abcd")).unwrap().unwrap();
		assert_eq!(parsed.0, 65001);
		assert_eq!(parsed.1, vec![0xab, 0xcd]);
	}

	#[test]
	fn ednsopt_rejects_odd_length_hex() {
		assert!(parse_ednsopt(Some("1:abc")).is_err());
	}

	#[tokio::test]
	async fn assemble_end_to_end_builds_questions() {
		let args = base_args();
		let (server, _config, questions) = assemble(&args).await.unwrap();
		assert_eq!(questions.len(), 1);
		assert_eq!(server.host(), "127.0.0.1");
	}
}
