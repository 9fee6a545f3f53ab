use thiserror::Error;

/// Invalid configuration: bad flags, unparseable server/delay/ednsopt strings,
/// or an empty question list. Surfaced to stderr and exits the process before
/// any work starts.
#[derive(Debug, Error)]
pub enum ConfigError {
	#[error("empty resolver address")]
	EmptyServer,

	#[error("invalid server descriptor '{input}': {reason}")]
	InvalidServer { input: String, reason: String },

	#[error("invalid request delay '{input}': {reason}")]
	InvalidDelay { input: String, reason: String },

	#[error("invalid ednsopt '{input}', expected 'code:hex'")]
	InvalidEdnsOpt { input: String },

	#[error("question list is empty after expanding all tokens")]
	EmptyQuestionList,

	#[error("--number and --duration are mutually exclusive; exactly one must be set")]
	CountAndDurationConflict,

	#[error("--concurrency must be at least 1")]
	ZeroConcurrency,

	#[error("--precision must be between 1 and 5")]
	InvalidHistogramPrecision,

	#[error("failed to read question file '{path}': {source}")]
	QuestionFile {
		path: String,
		#[source]
		source: std::io::Error,
	},

	#[error("failed to fetch question URL '{url}': {source}")]
	QuestionFetch {
		url: String,
		#[source]
		source: reqwest::Error,
	},

	#[error("--probability must be greater than 0")]
	InvalidProbability,

	#[error("invalid query type '{0}'")]
	InvalidQueryType(String),
}

/// Failure to establish initial connectivity on the first attempt after a
/// small, fixed retry budget. Unlike a per-query `IOError` (which is counted
/// and the benchmark continues), this fails the whole run.
#[derive(Debug, Error)]
#[error("failed to establish connectivity to {server} after {attempts} attempts: {reason}")]
pub struct FatalIOError {
	pub server: String,
	pub attempts: u32,
	pub reason: String,
}
