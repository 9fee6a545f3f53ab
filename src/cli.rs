use clap::{Parser, Subcommand};

/// High-concurrency DNS benchmarking tool.
#[derive(Parser, Debug)]
#[command(name = "dns-benchmark")]
#[command(about = "Benchmark DNS resolvers across Plain/DoT/DoH/DoQ transports")]
pub struct Cli {
	#[command(subcommand)]
	pub command: Option<Command>,

	#[command(flatten)]
	pub benchmark: BenchmarkArgs,
}

#[derive(Subcommand, Debug)]
pub enum Command {
	/// Run a benchmark (default when no subcommand is given).
	Benchmark(BenchmarkArgs),

	/// Serve the static frontend and a JSON preload endpoint. Out of scope
	/// for the benchmarking core -- this only validates its own flags.
	Frontend {
		/// Address to bind the frontend HTTP server to.
		#[arg(long = "addr", default_value = "127.0.0.1:8080")]
		addr: String,
	},
}

#[derive(Parser, Debug, Clone)]
pub struct BenchmarkArgs {
	/// Target server (see the server descriptor grammar in server.rs)
	#[arg(short = 's', long = "server", default_value = "127.0.0.1")]
	pub server: String,

	/// Query type, repeatable -- one query per type per name
	#[arg(short = 't', long = "type")]
	pub types: Vec<String>,

	/// Repetition count per worker (count-bounded run)
	#[arg(short = 'n', long = "number")]
	pub number: Option<u32>,

	/// Worker count
	#[arg(short = 'c', long = "concurrency", default_value = "1")]
	pub concurrency: u32,

	/// Global queries-per-second cap; 0 = unlimited
	#[arg(short = 'l', long = "rate-limit", default_value = "0")]
	pub rate_limit: u32,

	/// Per-worker queries-per-second cap; 0 = unlimited
	#[arg(long = "rate-limit-worker", default_value = "0")]
	pub rate_limit_worker: u32,

	/// Duration-bounded run (e.g. "30s"). Mutually exclusive with --number
	#[arg(short = 'd', long = "duration")]
	pub duration: Option<String>,

	/// Plain DNS over TCP instead of UDP
	#[arg(long = "tcp")]
	pub tcp: bool,

	/// DNS-over-TLS transport
	#[arg(long = "dot")]
	pub dot: bool,

	/// Disable TLS certificate verification
	#[arg(long = "insecure")]
	pub insecure: bool,

	/// HTTP method for DoH: GET or POST
	#[arg(long = "doh-method", default_value = "POST")]
	pub doh_method: String,

	/// HTTP version for DoH: 1.1, 2, or 3
	#[arg(long = "doh-protocol", default_value = "1.1")]
	pub doh_protocol: String,

	/// Set the Recursion Desired bit
	#[arg(short = 'r', long = "recurse", default_value = "true")]
	pub recurse: bool,

	/// Set the EDNS0 DNSSEC OK (DO) bit
	#[arg(long = "dnssec")]
	pub dnssec: bool,

	/// EDNS0 UDP buffer size; 0 disables the OPT record
	#[arg(long = "edns0", default_value = "0")]
	pub edns0: u16,

	/// Generic EDNS option as "code:hex"
	#[arg(long = "ednsopt")]
	pub ednsopt: Option<String>,

	/// Per-query inclusion probability in (0, inf); >=1 always includes
	#[arg(long = "probability", default_value = "1.0")]
	pub probability: f64,

	/// Queries per connection for Plain/DoT; 0 = unbounded
	#[arg(long = "query-per-conn", default_value = "0")]
	pub query_per_conn: u32,

	/// Force one connection per worker instead of a shared pool
	#[arg(long = "separate-worker-connections")]
	pub separate_worker_connections: bool,

	/// Constant or "D1-D2" per-request delay
	#[arg(long = "request-delay", default_value = "0s")]
	pub request_delay: String,

	/// Write timeout per operation
	#[arg(long = "write")]
	pub write_timeout: Option<String>,

	/// Read timeout per operation
	#[arg(long = "read")]
	pub read_timeout: Option<String>,

	/// Connect timeout per operation
	#[arg(long = "connect")]
	pub connect_timeout: Option<String>,

	/// Total per-query send+receive deadline
	#[arg(long = "request", default_value = "5s")]
	pub request_timeout: String,

	/// HDR histogram minimum, in duration form (e.g. "400us")
	#[arg(long = "min", default_value = "400us")]
	pub hist_min: String,

	/// HDR histogram maximum, in duration form
	#[arg(long = "max", default_value = "60s")]
	pub hist_max: String,

	/// HDR histogram precision (significant figures), 1-5
	#[arg(long = "precision", default_value = "1")]
	pub hist_precision: u8,

	/// Tally response codes
	#[arg(long = "codes", default_value = "true")]
	pub codes: bool,

	/// Repeatable: exit non-zero if any matching outcome occurred
	/// (ioerror, negative, error, idmismatch)
	#[arg(long = "fail")]
	pub fail: Vec<String>,

	/// Report cumulative issued-query counts at this interval (e.g. "1s");
	/// unset disables progress reporting
	#[arg(long = "progress-interval")]
	pub progress_interval: Option<String>,

	/// Enable per-request logging to a file
	#[arg(long = "log-requests")]
	pub log_requests: bool,

	/// Path for per-request log lines
	#[arg(long = "log-requests-path")]
	pub log_requests_path: Option<String>,

	/// Write the JSON report to this path
	#[arg(long = "json")]
	pub json: Option<String>,

	/// Write a CSV report to this path (out of scope; accepted and ignored)
	#[arg(long = "csv")]
	pub csv: Option<String>,

	/// Write an HTML report to this path (out of scope; accepted and ignored)
	#[arg(long = "html")]
	pub html: Option<String>,

	/// Write a latency plot to this path (out of scope; accepted and ignored)
	#[arg(long = "plot")]
	pub plot: Option<String>,

	/// Plot format (out of scope; accepted and ignored)
	#[arg(long = "plotf")]
	pub plotf: Option<String>,

	/// Comma-separated server list; runs the pipeline once per server and
	/// emits a single JSON object keyed by server string
	#[arg(long = "batch-json")]
	pub batch_json: Option<String>,

	/// Query tokens: literal names, "@file" paths, or http(s):// URLs
	pub queries: Vec<String>,
}
