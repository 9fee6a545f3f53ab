use std::io::Write;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use rand::seq::SliceRandom;
use rand::Rng;
use tokio::sync::Mutex as AsyncMutex;
use tokio_util::sync::CancellationToken;

use crate::config::{BenchmarkConfig, Termination};
use crate::error::FatalIOError;
use crate::question::Question;
use crate::ratelimit::RateGate;
use crate::server::{HttpVersion, ServerDescriptor, ServerKind};
use crate::stats::{self, AggregateStats, HistogramConfig, WorkerStats};
use crate::transport::{doh, doq, dot, plain, Transport};

/// Result of a completed driver run. Cancellation still carries partial,
/// valid statistics -- it is not an error.
pub enum RunOutcome {
	Completed(AggregateStats),
	Cancelled(AggregateStats),
}

const CONNECTIVITY_RETRIES: u32 = 3;

/// Run one benchmark: build one transport per worker according to the
/// server kind and connection-sharing policy, spawn `concurrency` workers,
/// wait for them to drain, then merge.
pub async fn run(config: &BenchmarkConfig, server: &ServerDescriptor, questions: Arc<Vec<Question>>, cancel: CancellationToken) -> Result<RunOutcome, FatalIOError> {
	let transports = build_worker_transports(server, config).await?;

	if let Termination::Duration(d) = config.termination {
		let timer_cancel = cancel.clone();
		tokio::spawn(async move {
			tokio::time::sleep(d).await;
			timer_cancel.cancel();
		});
	}

	let request_log = match &config.request_log_path {
		Some(path) => Some(open_request_log(path)),
		None => None,
	};

	let global_rate = Arc::new(RateGate::new(config.rate_limit));
	let issued = Arc::new(AtomicU64::new(0));
	let start = Instant::now();

	let progress_done = CancellationToken::new();
	if let Some(interval) = config.progress_interval.filter(|d| !d.is_zero()) {
		spawn_progress_ticker(issued.clone(), interval, progress_done.clone());
	}

	let mut handles = Vec::with_capacity(transports.len());
	for (id, transport) in transports.into_iter().enumerate() {
		let questions = questions.clone();
		let server = server.clone();
		let config = config.clone();
		let global_rate = global_rate.clone();
		let cancel = cancel.clone();
		let request_log = request_log.clone();
		let issued = issued.clone();
		handles.push(tokio::spawn(async move {
			worker_loop(id, questions, config, transport, server, global_rate, cancel, request_log, issued).await
		}));
	}

	let mut worker_stats = Vec::with_capacity(handles.len());
	for handle in handles {
		match handle.await {
			Ok(stats) => worker_stats.push(stats),
			Err(e) => tracing::warn!("worker task panicked: {e}"),
		}
	}
	progress_done.cancel();

	let duration_secs = start.elapsed().as_secs_f64();
	let was_cancelled = cancel.is_cancelled();
	let aggregate = stats::merge(worker_stats, duration_secs);

	Ok(if was_cancelled { RunOutcome::Cancelled(aggregate) } else { RunOutcome::Completed(aggregate) })
}

/// Ticker reporting cumulative issued-query counts at a fixed interval.
/// Reads the same atomic `issued` counter every worker increments after
/// each query and emits a `tracing::info!` event; never touches
/// measurement state.
fn spawn_progress_ticker(issued: Arc<AtomicU64>, interval: Duration, done: CancellationToken) {
	tokio::spawn(async move {
		let mut ticker = tokio::time::interval(interval);
		ticker.tick().await; // first tick fires immediately; skip it
		loop {
			tokio::select! {
				_ = ticker.tick() => {
					tracing::info!(issued = issued.load(Ordering::Relaxed), "progress");
				}
				_ = done.cancelled() => break,
			}
		}
	});
}

type RequestLog = Arc<AsyncMutex<std::io::BufWriter<std::fs::File>>>;

fn open_request_log(path: &Path) -> RequestLog {
	let file = std::fs::OpenOptions::new().create(true).append(true).open(path).unwrap_or_else(|e| {
		tracing::warn!("failed to open request log {}: {e}; request logging disabled for this run", path.display());
		std::fs::File::create("/dev/null").expect("/dev/null always openable")
	});
	Arc::new(AsyncMutex::new(std::io::BufWriter::new(file)))
}

#[allow(clippy::too_many_arguments)]
async fn worker_loop(
	id: usize,
	questions: Arc<Vec<Question>>,
	config: BenchmarkConfig,
	mut transport: Transport,
	server: ServerDescriptor,
	global_rate: Arc<RateGate>,
	cancel: CancellationToken,
	request_log: Option<RequestLog>,
	issued: Arc<AtomicU64>,
) -> WorkerStats {
	tracing::debug!(worker = id, "starting");
	let worker_rate = RateGate::new(config.rate_limit_worker);
	let mut stats = WorkerStats::new(config.hist, config.track_rcodes);
	let mut rng = rand::thread_rng();

	let mut order: Vec<usize> = (0..questions.len()).collect();
	order.shuffle(&mut rng);

	let mut passes_done: u32 = 0;
	'outer: loop {
		if let Termination::Count(n) = config.termination {
			if passes_done >= n {
				break;
			}
		}
		if cancel.is_cancelled() {
			break;
		}

		for &idx in &order {
			if cancel.is_cancelled() {
				break 'outer;
			}
			let question = &questions[idx];
			if config.probability < 1.0 && !rng.gen_bool(config.probability) {
				continue;
			}

			if global_rate.acquire(&cancel).await.is_err() {
				break 'outer;
			}
			if worker_rate.acquire(&cancel).await.is_err() {
				break 'outer;
			}
			if config.request_delay.sleep(&cancel).await.is_err() {
				break 'outer;
			}

			let deadline = Instant::now() + config.request_timeout;
			let result = transport.query(question, &server, deadline).await;
			issued.fetch_add(1, Ordering::Relaxed);

			let qtype_str = format!("{}", question.qtype);
			stats.record(result.outcome, result.duration.as_nanos() as u64, &qtype_str, result.rcode.as_deref(), result.http_status, result.authenticated, Some(&question.name_str()));

			if let Some(log) = &request_log {
				log_request(log, question, result.outcome, result.duration).await;
			}
		}
		passes_done += 1;
	}

	tracing::debug!(worker = id, passes = passes_done, "exiting");
	stats
}

async fn log_request(log: &RequestLog, question: &Question, outcome: crate::stats::Outcome, duration: Duration) {
	let line = format!("{} {} {:?} {}\n", chrono_stamp(), question.name_str(), outcome, duration.as_micros());
	let mut writer = log.lock().await;
	if writer.write_all(line.as_bytes()).is_err() {
		return;
	}
	let _ = writer.flush();
}

/// Stand-in timestamp (UNIX epoch seconds) -- request logging only needs a
/// monotone-enough marker per line, not calendar formatting.
fn chrono_stamp() -> u64 {
	std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).map(|d| d.as_secs()).unwrap_or(0)
}

async fn resolve_addr(host: &str, port: u16) -> Result<SocketAddr, FatalIOError> {
	if let Ok(addr) = format!("{host}:{port}").parse::<SocketAddr>() {
		return Ok(addr);
	}
	tokio::net::lookup_host((host, port))
		.await
		.ok()
		.and_then(|mut it| it.next())
		.ok_or_else(|| FatalIOError {
			server: format!("{host}:{port}"),
			attempts: 1,
			reason: "DNS resolution of server hostname failed".to_string(),
		})
}

async fn build_worker_transports(server: &ServerDescriptor, config: &BenchmarkConfig) -> Result<Vec<Transport>, FatalIOError> {
	let n = config.concurrency as usize;
	match &server.kind {
		ServerKind::Plain { host, port, use_tcp } => {
			let addr = resolve_addr(host, *port).await?;
			verify_connectivity(addr, *use_tcp, config.connect_timeout, &server.host_label()).await?;
			let shared_pool = (!config.separate_worker_connections).then(plain::PlainTransport::new_pool);
			Ok((0..n)
				.map(|_| {
					let pool = shared_pool.clone().unwrap_or_else(plain::PlainTransport::new_pool);
					Transport::Plain(plain::PlainTransport::new(addr, *use_tcp, config.query_per_conn, config.connect_timeout, config.write_timeout, config.read_timeout, pool))
				})
				.collect())
		}
		ServerKind::DoT { host, port } => {
			let addr = resolve_addr(host, *port).await?;
			verify_connectivity(addr, true, config.connect_timeout, &server.host_label()).await?;
			let shared_pool = (!config.separate_worker_connections).then(dot::DotTransport::new_pool);
			Ok((0..n)
				.map(|_| {
					let pool = shared_pool.clone().unwrap_or_else(dot::DotTransport::new_pool);
					Transport::Dot(dot::DotTransport::new(addr, host, server.flags.insecure_tls, config.query_per_conn, config.connect_timeout, config.write_timeout, config.read_timeout, pool))
				})
				.collect())
		}
		ServerKind::DoH { scheme, host, port, path, http_version, method } => {
			let client = build_reqwest_client(*http_version, server.flags.insecure_tls, config.request_timeout)?;
			let addr = resolve_addr(host, *port).await?;
			Ok((0..n)
				.map(|_| match http_version {
					HttpVersion::Http3 => Transport::Doh(
						doh::DohTransport::new_http3(addr, host, path, *method, server.flags.insecure_tls, config.request_timeout)
							.expect("h3 endpoint construction is infallible for a valid bind address"),
					),
					_ => Transport::Doh(doh::DohTransport::new_http(client.clone(), scheme, host, *port, path, *method, config.request_timeout)),
				})
				.collect())
		}
		ServerKind::DoQ { host, port } => {
			let addr = resolve_addr(host, *port).await?;
			let mut last_err = None;
			for attempt in 1..=CONNECTIVITY_RETRIES {
				match doq::DoqTransport::new(addr, host, server.flags.insecure_tls, config.connect_timeout) {
					Ok(_) => {
						last_err = None;
						break;
					}
					Err(e) => last_err = Some(e.to_string()),
				}
				tracing::warn!(attempt, "DoQ endpoint construction failed, retrying");
			}
			if let Some(reason) = last_err {
				return Err(FatalIOError { server: server.host_label(), attempts: CONNECTIVITY_RETRIES, reason });
			}
			let mut transports = Vec::with_capacity(n);
			for _ in 0..n {
				let t = doq::DoqTransport::new(addr, host, server.flags.insecure_tls, config.connect_timeout)
					.map_err(|e| FatalIOError { server: server.host_label(), attempts: 1, reason: e.to_string() })?;
				transports.push(Transport::Doq(t));
			}
			Ok(transports)
		}
	}
}

fn build_reqwest_client(http_version: HttpVersion, insecure: bool, request_timeout: Duration) -> Result<reqwest::Client, FatalIOError> {
	let mut builder = reqwest::Client::builder().danger_accept_invalid_certs(insecure).timeout(request_timeout);
	if http_version == HttpVersion::Http1_1 {
		builder = builder.http1_only();
	}
	builder.build().map_err(|e| FatalIOError { server: "doh client".to_string(), attempts: 1, reason: e.to_string() })
}

/// Small fixed retry budget establishing the worker pool's shared
/// connection(s) once, up front, before any worker starts. Failure here is
/// a `FatalIOError`, distinct from a per-query `IOError`.
async fn verify_connectivity(addr: SocketAddr, use_tcp: bool, connect_timeout: Duration, label: &str) -> Result<(), FatalIOError> {
	let mut last_err = None;
	for attempt in 1..=CONNECTIVITY_RETRIES {
		let result = if use_tcp {
			tokio::time::timeout(connect_timeout, tokio::net::TcpStream::connect(addr)).await
		} else {
			tokio::time::timeout(connect_timeout, async {
				let socket = tokio::net::UdpSocket::bind(if addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" }).await?;
				socket.connect(addr).await?;
				Ok::<_, std::io::Error>(socket)
			})
		};
		match result {
			Ok(Ok(_)) => return Ok(()),
			Ok(Err(e)) => last_err = Some(e.to_string()),
			Err(_) => last_err = Some("connect timed out".to_string()),
		}
	}
	Err(FatalIOError { server: label.to_string(), attempts: CONNECTIVITY_RETRIES, reason: last_err.unwrap_or_default() })
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::config::FailCondition;
	use crate::delay::RequestDelay;
	use crate::server::{CommonFlags, DohMethod};
	use crate::transport::mock::{MockReply, MockTransport};

	fn test_config(concurrency: u32, number: u32) -> BenchmarkConfig {
		BenchmarkConfig {
			concurrency,
			termination: Termination::Count(number),
			rate_limit: 0,
			rate_limit_worker: 0,
			request_delay: RequestDelay::None,
			probability: 1.0,
			query_per_conn: 0,
			separate_worker_connections: false,
			connect_timeout: Duration::from_secs(1),
			write_timeout: Duration::from_secs(1),
			read_timeout: Duration::from_secs(1),
			request_timeout: Duration::from_secs(1),
			hist: HistogramConfig::default(),
			track_rcodes: true,
			fail_conditions: Vec::<FailCondition>::new(),
			request_log_path: None,
			progress_interval: None,
		}
	}

	fn mock_server() -> ServerDescriptor {
		ServerDescriptor {
			kind: ServerKind::Plain { host: "mock".to_string(), port: 0, use_tcp: false },
			flags: CommonFlags::default(),
		}
	}

	async fn run_mock(config: BenchmarkConfig, questions: Vec<Question>, replies_per_worker: Vec<MockReply>) -> RunOutcome {
		let server = mock_server();
		let questions = Arc::new(questions);
		let cancel = CancellationToken::new();
		let transports: Vec<Transport> = (0..config.concurrency).map(|_| Transport::Mock(MockTransport::new(replies_per_worker.clone()))).collect();

		let global_rate = Arc::new(RateGate::new(config.rate_limit));
		let issued = Arc::new(AtomicU64::new(0));
		let start = Instant::now();
		let mut handles = Vec::new();
		for (id, transport) in transports.into_iter().enumerate() {
			let questions = questions.clone();
			let server = server.clone();
			let config = config.clone();
			let global_rate = global_rate.clone();
			let cancel = cancel.clone();
			let issued = issued.clone();
			handles.push(tokio::spawn(async move { worker_loop(id, questions, config, transport, server, global_rate, cancel, None, issued).await }));
		}
		let mut worker_stats = Vec::new();
		for h in handles {
			worker_stats.push(h.await.unwrap());
		}
		let duration_secs = start.elapsed().as_secs_f64().max(0.001);
		let agg = stats::merge(worker_stats, duration_secs);
		RunOutcome::Completed(agg)
	}

	fn example_questions(n: usize) -> Vec<Question> {
		use hickory_proto::rr::{Name, RecordType};
		(0..n).map(|i| Question { name: Name::from_ascii(format!("q{i}.example.com.")).unwrap(), qtype: RecordType::A }).collect()
	}

	#[tokio::test]
	async fn count_bounded_total_matches_expectation() {
		// -c 1 -n 10, one question, always success.
		let config = test_config(1, 10);
		let outcome = run_mock(config, example_questions(1), vec![MockReply::Success]).await;
		let RunOutcome::Completed(agg) = outcome else { panic!("expected Completed") };
		assert_eq!(agg.counters.total, 10);
		assert_eq!(agg.counters.success, 10);
	}

	#[tokio::test]
	async fn concurrency_multiplies_total() {
		// -n 5 -c 2, two questions -> total = 5*2*2 = 20.
		let config = test_config(2, 5);
		let outcome = run_mock(config, example_questions(2), vec![MockReply::Success]).await;
		let RunOutcome::Completed(agg) = outcome else { panic!("expected Completed") };
		assert_eq!(agg.counters.total, 20);
	}

	#[tokio::test]
	async fn id_mismatch_reply_is_tallied_separately() {
		let config = test_config(1, 1);
		let outcome = run_mock(config, example_questions(1), vec![MockReply::WrongTxId]).await;
		let RunOutcome::Completed(agg) = outcome else { panic!("expected Completed") };
		assert_eq!(agg.counters.idmismatch, 1);
		assert_eq!(agg.counters.success, 0);
	}

	#[tokio::test]
	async fn progress_ticker_reports_and_stops_on_done() {
		let issued = Arc::new(AtomicU64::new(0));
		let done = CancellationToken::new();
		spawn_progress_ticker(issued.clone(), Duration::from_millis(5), done.clone());
		issued.store(42, Ordering::Relaxed);
		tokio::time::sleep(Duration::from_millis(20)).await;
		done.cancel();
		// ticker must not panic or hang; cancellation stops it promptly.
		tokio::time::sleep(Duration::from_millis(20)).await;
		assert_eq!(issued.load(Ordering::Relaxed), 42);
	}
}
