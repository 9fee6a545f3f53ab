pub mod doh;
pub mod doq;
pub mod dot;
pub mod plain;
mod tls;

#[cfg(test)]
pub mod mock;

use std::time::{Duration, Instant};

use hickory_proto::op::{Edns, Message, MessageType, OpCode, Query, ResponseCode};
use hickory_proto::rr::rdata::opt::EdnsOption;
use rand::Rng;

use crate::question::Question;
use crate::server::{CommonFlags, ServerDescriptor};
use crate::stats::Outcome;

/// Result of one completed (or failed) query, handed straight to
/// [`crate::stats::WorkerStats::record`].
pub struct QueryOutcome {
	pub outcome: Outcome,
	pub duration: Duration,
	pub rcode: Option<String>,
	pub http_status: Option<u16>,
	pub authenticated: bool,
}

pub(crate) fn io_outcome(duration: Duration) -> QueryOutcome {
	QueryOutcome { outcome: Outcome::IoError, duration, rcode: None, http_status: None, authenticated: false }
}

/// Wrap a future with a timeout, collapsing `Elapsed` into an `io::Error`
/// so callers can use a single `?` chain regardless of which timeout
/// budget (connect/write/read/request) is active.
pub(crate) async fn with_timeout<T, F>(duration: Duration, fut: F) -> std::io::Result<T>
where
	F: std::future::Future<Output = std::io::Result<T>>,
{
	match tokio::time::timeout(duration, fut).await {
		Ok(r) => r,
		Err(_) => Err(std::io::Error::new(std::io::ErrorKind::TimedOut, "operation timed out")),
	}
}

/// Build the outbound DNS message: random 16-bit txid, RD bit, and an
/// optional EDNS0 OPT record carrying the DO bit and UDP payload size.
pub fn build_query(question: &Question, flags: &CommonFlags) -> (u16, Vec<u8>) {
	let txid: u16 = rand::thread_rng().gen();
	let mut message = Message::new();
	message.set_id(txid);
	message.set_message_type(MessageType::Query);
	message.set_op_code(OpCode::Query);
	message.set_recursion_desired(flags.recurse);
	message.add_query(Query::query(question.name.clone(), question.qtype));

	if flags.edns0_buf_size > 0 || flags.dnssec_do || flags.edns_opt.is_some() {
		let mut edns = Edns::new();
		edns.set_max_payload(flags.edns0_buf_size.max(512));
		edns.set_dnssec_ok(flags.dnssec_do);
		if let Some((code, data)) = &flags.edns_opt {
			edns.options_mut().insert(EdnsOption::Unknown(*code, data.clone()));
		}
		message.set_edns(edns);
	}

	let bytes = message.to_vec().unwrap_or_default();
	(txid, bytes)
}

/// Classify a decoded response into a six-way split: txid mismatch,
/// truncated, success (NOERROR + answers), negative (NOERROR with no
/// answers, or NXDOMAIN), any other rcode is an error, and undecodable
/// bytes are an I/O error.
pub fn classify(expected_txid: u16, bytes: &[u8]) -> (Outcome, Option<String>, bool) {
	let message = match Message::from_vec(bytes) {
		Ok(m) => m,
		Err(_) => return (Outcome::IoError, None, false),
	};

	let authenticated = message.header().authentic_data();
	let rcode_str = format!("{}", message.response_code());

	if message.id() != expected_txid {
		return (Outcome::IdMismatch, Some(rcode_str), authenticated);
	}
	if message.header().truncated() {
		return (Outcome::Truncated, Some(rcode_str), authenticated);
	}
	let outcome = match message.response_code() {
		ResponseCode::NoError if message.answer_count() > 0 => Outcome::Success,
		ResponseCode::NoError | ResponseCode::NXDomain => Outcome::Negative,
		_ => Outcome::Error,
	};
	(outcome, Some(rcode_str), authenticated)
}

/// Tagged-variant dispatch over the four transport backends. Adding a
/// new transport means adding a variant, a constructor, and a case here.
pub enum Transport {
	Plain(plain::PlainTransport),
	Dot(dot::DotTransport),
	Doh(doh::DohTransport),
	Doq(doq::DoqTransport),
	#[cfg(test)]
	Mock(mock::MockTransport),
}

impl Transport {
	pub async fn query(&mut self, question: &Question, server: &ServerDescriptor, deadline: Instant) -> QueryOutcome {
		match self {
			Transport::Plain(t) => t.query(question, &server.flags, deadline).await,
			Transport::Dot(t) => t.query(question, &server.flags, deadline).await,
			Transport::Doh(t) => t.query(question, &server.flags, deadline).await,
			Transport::Doq(t) => t.query(question, &server.flags, deadline).await,
			#[cfg(test)]
			Transport::Mock(t) => t.query(question, &server.flags, deadline).await,
		}
	}
}
