use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};

use crate::question::Question;
use crate::server::CommonFlags;

use super::tls::client_config;
use super::{build_query, classify, io_outcome, with_timeout, QueryOutcome};

/// DNS-over-QUIC (RFC 9250). One QUIC session per worker -- `QperConn`
/// does not apply here: every query opens a fresh bidirectional stream
/// and writes one 2-byte length-prefixed message.
pub struct DoqTransport {
	endpoint: quinn::Endpoint,
	server_addr: SocketAddr,
	server_name: String,
	connection: Option<quinn::Connection>,
	connect_timeout: Duration,
}

impl DoqTransport {
	pub fn new(server_addr: SocketAddr, host: &str, insecure: bool, connect_timeout: Duration) -> std::io::Result<Self> {
		let bind_addr = if server_addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
		let mut endpoint = quinn::Endpoint::client(bind_addr.parse().unwrap())?;
		let tls_config = client_config(insecure, vec![b"doq".to_vec()]);
		let quic_config = quinn::crypto::rustls::QuicClientConfig::try_from((*tls_config).clone())
			.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
		endpoint.set_default_client_config(quinn::ClientConfig::new(Arc::new(quic_config)));
		Ok(DoqTransport { endpoint, server_addr, server_name: host.to_string(), connection: None, connect_timeout })
	}

	async fn ensure_connected(&mut self) -> std::io::Result<()> {
		if self.connection.is_some() {
			return Ok(());
		}
		let connecting = self
			.endpoint
			.connect(self.server_addr, &self.server_name)
			.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
		let conn = with_timeout(self.connect_timeout, async { connecting.await.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)) }).await?;
		self.connection = Some(conn);
		Ok(())
	}

	pub async fn query(&mut self, question: &Question, flags: &CommonFlags, deadline: Instant) -> QueryOutcome {
		let (txid, bytes) = build_query(question, flags);
		let start = Instant::now();

		if self.ensure_connected().await.is_err() {
			return io_outcome(start.elapsed());
		}

		let remaining = deadline.saturating_duration_since(start);
		let result = self.send_and_recv(&bytes, remaining).await;
		let duration = start.elapsed();

		match result {
			Ok(resp) => {
				let (outcome, rcode, authenticated) = classify(txid, &resp);
				QueryOutcome { outcome, duration, rcode, http_status: None, authenticated }
			}
			Err(_) => {
				self.connection = None;
				io_outcome(duration)
			}
		}
	}

	async fn send_and_recv(&self, bytes: &[u8], timeout: Duration) -> std::io::Result<Vec<u8>> {
		let conn = self.connection.as_ref().expect("connected");
		with_timeout(timeout, async {
			let (mut send, mut recv) = conn.open_bi().await.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

			let len = (bytes.len() as u16).to_be_bytes();
			send.write_all(&len).await?;
			send.write_all(bytes).await?;
			send.finish().map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;

			let mut len_buf = [0u8; 2];
			recv.read_exact(&mut len_buf).await.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
			let resp_len = u16::from_be_bytes(len_buf) as usize;
			let mut buf = vec![0u8; resp_len];
			recv.read_exact(&mut buf).await.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
			Ok(buf)
		})
		.await
	}
}
