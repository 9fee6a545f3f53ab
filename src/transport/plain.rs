use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::Mutex;

use crate::question::Question;
use crate::server::CommonFlags;
use crate::stats::Outcome;

use super::{build_query, classify, io_outcome, with_timeout, QueryOutcome};

enum Conn {
	Udp(UdpSocket),
	Tcp(TcpStream),
}

pub struct PooledConn {
	conn: Conn,
	queries_sent: u32,
}

pub type Pool = Arc<Mutex<Option<PooledConn>>>;

/// Plain DNS over UDP or TCP. `pool` is shared across every worker that
/// targets the same server when `SeparateWorkerConnections` is false, or
/// exclusive per worker otherwise.
pub struct PlainTransport {
	addr: SocketAddr,
	use_tcp: bool,
	query_per_conn: u32,
	connect_timeout: Duration,
	write_timeout: Duration,
	read_timeout: Duration,
	pool: Pool,
}

impl PlainTransport {
	pub fn new(
		addr: SocketAddr,
		use_tcp: bool,
		query_per_conn: u32,
		connect_timeout: Duration,
		write_timeout: Duration,
		read_timeout: Duration,
		pool: Pool,
	) -> Self {
		PlainTransport { addr, use_tcp, query_per_conn, connect_timeout, write_timeout, read_timeout, pool }
	}

	pub fn new_pool() -> Pool {
		Arc::new(Mutex::new(None))
	}

	async fn connect(&self) -> std::io::Result<Conn> {
		if self.use_tcp {
			let stream = with_timeout(self.connect_timeout, TcpStream::connect(self.addr)).await?;
			Ok(Conn::Tcp(stream))
		} else {
			let bind_addr = if self.addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
			let socket = UdpSocket::bind(bind_addr).await?;
			with_timeout(self.connect_timeout, async { socket.connect(self.addr).await }).await?;
			Ok(Conn::Udp(socket))
		}
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
				Ok(conn) => *guard = Some(PooledConn { conn, queries_sent: 0 }),
				Err(_) => return io_outcome(start.elapsed()),
			}
		}

		let remaining = deadline.saturating_duration_since(start);
		let result = send_and_recv(guard.as_mut().unwrap(), &bytes, self.write_timeout, self.read_timeout.min(remaining)).await;
		let duration = start.elapsed();

		match result {
			Ok(response_bytes) => {
				let (outcome, rcode, authenticated) = classify(txid, &response_bytes);
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

async fn send_and_recv(pooled: &mut PooledConn, bytes: &[u8], write_timeout: Duration, read_timeout: Duration) -> std::io::Result<Vec<u8>> {
	match &mut pooled.conn {
		Conn::Udp(socket) => {
			with_timeout(write_timeout, async { socket.send(bytes).await.map(|_| ()) }).await?;
			let mut buf = vec![0u8; 4096];
			let len = with_timeout(read_timeout, async { socket.recv(&mut buf).await }).await?;
			pooled.queries_sent += 1;
			buf.truncate(len);
			Ok(buf)
		}
		Conn::Tcp(stream) => {
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
			pooled.queries_sent += 1;
			Ok(buf)
		}
	}
}
