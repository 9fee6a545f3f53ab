use std::collections::VecDeque;
use std::str::FromStr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use hickory_proto::op::{Message, MessageType, Query};
use hickory_proto::rr::rdata::A;
use hickory_proto::rr::{Name, RData, Record, RecordType};
use tokio::sync::Mutex;

use crate::question::Question;
use crate::server::CommonFlags;

use super::{build_query, classify, io_outcome, QueryOutcome};

/// A scripted reply for one query, used to drive the driver's worker
/// loop through specific scenarios without a real network stack.
#[derive(Clone)]
pub enum MockReply {
	Success,
	Nxdomain,
	ServFail,
	WrongTxId,
	Drop,
}

/// In-process stand-in for a real transport backend, selected only under
/// `#[cfg(test)]` via `Transport::Mock`.
pub struct MockTransport {
	scripted: Arc<Mutex<VecDeque<MockReply>>>,
}

impl MockTransport {
	pub fn new(scripted: Vec<MockReply>) -> Self {
		MockTransport { scripted: Arc::new(Mutex::new(scripted.into())) }
	}

	pub async fn query(&mut self, question: &Question, flags: &CommonFlags, _deadline: Instant) -> QueryOutcome {
		let (txid, _bytes) = build_query(question, flags);
		let reply = { self.scripted.lock().await.pop_front() }.unwrap_or(MockReply::Success);
		match reply {
			MockReply::Drop => io_outcome(Duration::from_millis(1)),
			MockReply::WrongTxId => {
				let resp = response_bytes(txid.wrapping_add(1), question, hickory_proto::op::ResponseCode::NoError, true);
				let (outcome, rcode, authenticated) = classify(txid, &resp);
				QueryOutcome { outcome, duration: Duration::from_millis(1), rcode, http_status: None, authenticated }
			}
			MockReply::Nxdomain => {
				let resp = response_bytes(txid, question, hickory_proto::op::ResponseCode::NXDomain, false);
				let (outcome, rcode, authenticated) = classify(txid, &resp);
				QueryOutcome { outcome, duration: Duration::from_millis(1), rcode, http_status: None, authenticated }
			}
			MockReply::ServFail => {
				let resp = response_bytes(txid, question, hickory_proto::op::ResponseCode::ServFail, false);
				let (outcome, rcode, authenticated) = classify(txid, &resp);
				QueryOutcome { outcome, duration: Duration::from_millis(1), rcode, http_status: None, authenticated }
			}
			MockReply::Success => {
				let resp = response_bytes(txid, question, hickory_proto::op::ResponseCode::NoError, true);
				let (outcome, rcode, authenticated) = classify(txid, &resp);
				QueryOutcome { outcome, duration: Duration::from_millis(1), rcode, http_status: None, authenticated }
			}
		}
	}
}

fn response_bytes(txid: u16, question: &Question, rcode: hickory_proto::op::ResponseCode, with_answer: bool) -> Vec<u8> {
	let mut msg = Message::new();
	msg.set_id(txid);
	msg.set_message_type(MessageType::Response);
	msg.set_response_code(rcode);
	msg.add_query(Query::query(question.name.clone(), question.qtype));
	if with_answer && question.qtype == RecordType::A {
		let mut record = Record::new();
		record.set_name(question.name.clone());
		record.set_record_type(RecordType::A);
		record.set_data(Some(RData::A(A(std::net::Ipv4Addr::new(93, 184, 216, 34)))));
		msg.add_answer(record);
	}
	msg.to_vec().unwrap_or_default()
}

#[cfg(test)]
mod tests {
	use super::*;

	fn question() -> Question {
		Question { name: Name::from_str("example.com.").unwrap(), qtype: RecordType::A }
	}

	#[tokio::test]
	async fn success_reply_classifies_as_success() {
		let mut transport = MockTransport::new(vec![MockReply::Success]);
		let flags = CommonFlags::default();
		let deadline = Instant::now() + Duration::from_secs(1);
		let result = transport.query(&question(), &flags, deadline).await;
		assert_eq!(result.outcome, crate::stats::Outcome::Success);
	}

	#[tokio::test]
	async fn dropped_reply_is_ioerror() {
		let mut transport = MockTransport::new(vec![MockReply::Drop]);
		let flags = CommonFlags::default();
		let deadline = Instant::now() + Duration::from_secs(1);
		let result = transport.query(&question(), &flags, deadline).await;
		assert_eq!(result.outcome, crate::stats::Outcome::IoError);
	}
}
