use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rustls::pki_types::ServerName;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_rustls::{client::TlsStream, TlsConnector};

use crate::question::Question;
use crate::server::CommonFlags;
use crate::stats::Outcome;

use super::tls::client_config;
use super::{build_query, classify, io_outcome, with_timeout, QueryOutcome};

pub struct PooledConn {
	stream: TlsStream<TcpStream>,
	queries_sent: u32,
}

pub type Pool = Arc<Mutex<Option<PooledConn>>>;

/// DNS-over-TLS: the same length-prefixed wire format as plain TCP,
/// carried inside a TLS session. Connection pooling follows the same
/// `SeparateWorkerConnections` rule as [`super::plain`].
pub struct DotTransport {
	addr: SocketAddr,
	server_name: ServerName<'static>,
	connector: TlsConnector,
	query_per_conn: u32,
	connect_timeout: Duration,
	write_timeout: Duration,
	read_timeout: Duration,
	pool: Pool,
}

impl DotTransport {
	pub fn new(
		addr: SocketAddr,
		host: &str,
		insecure: bool,
		query_per_conn: u32,
		connect_timeout: Duration,
		write_timeout: Duration,
		read_timeout: Duration,
		pool: Pool,
	) -> Self {
		let config = client_config(insecure, vec![]);
		let connector = TlsConnector::from(config);
		let server_name = ServerName::try_from(host.to_string()).unwrap_or_else(|_| ServerName::try_from("localhost".to_string()).expect("literal server name"));
		DotTransport { addr, server_name, connector, query_per_conn, connect_timeout, write_timeout, read_timeout, pool }
	}

	pub fn new_pool() -> Pool {
		Arc::new(Mutex::new(None))
	}

	async fn connect(&self) -> std::io::Result<TlsStream<TcpStream>> {
		let tcp = with_timeout(self.connect_timeout, TcpStream::connect(self.addr)).await?;
		with_timeout(self.connect_timeout, async { self.connector.connect(self.server_name.clone(), tcp).await }).await
	}

	pub async fn query(&mut self, question: &Question, flags: &CommonFlags, deadline: Instant) -> QueryOutcome {
		let (txid, bytes) = build_query(question, flags);
		let start = Instant::now();

		let mut guard = self.pool.lock().await;
		let need_new = match guard.as_ref() {
			None => true,
			Some(p) => self.query_per_conn > 0 && p.queries_sent >= self.query_per_conn,
		};
		if need_new {
			match self.connect().await {
				Ok(stream) => *guard = Some(PooledConn { stream, queries_sent: 0 }),
				Err(_) => return io_outcome(start.elapsed()),
			}
		}

		let remaining = deadline.saturating_duration_since(start);
		let conn = guard.as_mut().unwrap();
		let result = send_and_recv(&mut conn.stream, &bytes, self.write_timeout, self.read_timeout.min(remaining)).await;
		let duration = start.elapsed();

		match result {
			Ok(resp) => {
				conn.queries_sent += 1;
				let (outcome, rcode, authenticated) = classify(txid, &resp);
				if matches!(outcome, Outcome::IoError) {
					*guard = None;
				}
				QueryOutcome { outcome, duration, rcode, http_status: None, authenticated }
			}
			Err(_) => {
				*guard = None;
				io_outcome(duration)
			}
		}
	}
}

async fn send_and_recv<S: AsyncRead + AsyncWrite + Unpin>(stream: &mut S, bytes: &[u8], write_timeout: Duration, read_timeout: Duration) -> std::io::Result<Vec<u8>> {
	let len_prefix = (bytes.len() as u16).to_be_bytes();
	with_timeout(write_timeout, async {
		stream.write_all(&len_prefix).await?;
		stream.write_all(bytes).await
	})
	.await?;

	let mut len_buf = [0u8; 2];
	with_timeout(read_timeout, async { stream.read_exact(&mut len_buf).await }).await?;
	let len = u16::from_be_bytes(len_buf) as usize;
	let mut buf = vec![0u8; len];
	with_timeout(read_timeout, async { stream.read_exact(&mut buf).await }).await?;
	Ok(buf)
}
