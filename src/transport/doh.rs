use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use bytes::{Buf, Bytes, BytesMut};
use h3::client::SendRequest;

use crate::question::Question;
use crate::server::{CommonFlags, DohMethod};
use crate::stats::Outcome;

use super::tls::client_config;
use super::{build_query, classify, QueryOutcome};

/// DNS-over-HTTPS. HTTP/1.1 and HTTP/2 share a pooled `reqwest::Client`;
/// HTTP/3 bypasses reqwest entirely (it has no h3 support) and drives a
/// `quinn`/`h3` connection directly, one per transport instance.
pub struct DohTransport {
	backend: Backend,
	url: String,
	path: String,
	method: DohMethod,
	request_timeout: Duration,
}

enum Backend {
	Http(reqwest::Client),
	Http3(H3Client),
}

struct H3Client {
	endpoint: quinn::Endpoint,
	server_addr: SocketAddr,
	server_name: String,
	send_request: Option<SendRequest<h3_quinn::OpenStreams, Bytes>>,
}

impl DohTransport {
	pub fn new_http(client: reqwest::Client, scheme: &str, host: &str, port: u16, path: &str, method: DohMethod, request_timeout: Duration) -> Self {
		let url = format!("{scheme}://{host}:{port}{path}");
		DohTransport { backend: Backend::Http(client), url, path: path.to_string(), method, request_timeout }
	}

	pub fn new_http3(server_addr: SocketAddr, host: &str, path: &str, method: DohMethod, insecure: bool, request_timeout: Duration) -> std::io::Result<Self> {
		let bind_addr = if server_addr.is_ipv4() { "0.0.0.0:0" } else { "[::]:0" };
		let mut endpoint = quinn::Endpoint::client(bind_addr.parse().unwrap())?;
		let tls_config = client_config(insecure, vec![b"h3".to_vec()]);
		let quic_config = quinn::crypto::rustls::QuicClientConfig::try_from((*tls_config).clone())
			.map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?;
		endpoint.set_default_client_config(quinn::ClientConfig::new(Arc::new(quic_config)));

		Ok(DohTransport {
			backend: Backend::Http3(H3Client { endpoint, server_addr, server_name: host.to_string(), send_request: None }),
			url: format!("https://{host}{path}"),
			path: path.to_string(),
			method,
			request_timeout,
		})
	}

	pub async fn query(&mut self, question: &Question, flags: &CommonFlags, deadline: Instant) -> QueryOutcome {
		let (txid, bytes) = build_query(question, flags);
		let start = Instant::now();
		let remaining = deadline.saturating_duration_since(start);

		let result = match &mut self.backend {
			Backend::Http(client) => query_http(client, &self.url, self.method, &bytes, remaining).await,
			Backend::Http3(h3c) => query_http3(h3c, &self.path, self.method, &bytes, remaining).await,
		};
		let duration = start.elapsed();

		match result {
			Ok((status, body)) if (200..300).contains(&status) => {
				let (outcome, rcode, authenticated) = classify(txid, &body);
				QueryOutcome { outcome, duration, rcode, http_status: Some(status), authenticated }
			}
			Ok((status, _)) => QueryOutcome { outcome: Outcome::IoError, duration, rcode: None, http_status: Some(status), authenticated: false },
			Err(_) => QueryOutcome { outcome: Outcome::IoError, duration, rcode: None, http_status: None, authenticated: false },
		}
	}
}

async fn query_http(client: &reqwest::Client, url: &str, method: DohMethod, bytes: &[u8], timeout: Duration) -> Result<(u16, Vec<u8>), ()> {
	let request = match method {
		DohMethod::Post => client
			.post(url)
			.header("content-type", "application/dns-message")
			.header("accept", "application/dns-message")
			.body(bytes.to_vec()),
		DohMethod::Get => {
			let encoded = URL_SAFE_NO_PAD.encode(bytes);
			client.get(url).query(&[("dns", encoded)]).header("accept", "application/dns-message")
		}
	};
	let response = tokio::time::timeout(timeout, request.send()).await.map_err(|_| ())?.map_err(|_| ())?;
	let status = response.status().as_u16();
	let body = response.bytes().await.map_err(|_| ())?;
	Ok((status, body.to_vec()))
}

async fn query_http3(h3c: &mut H3Client, path: &str, method: DohMethod, bytes: &[u8], timeout: Duration) -> Result<(u16, Vec<u8>), ()> {
	if h3c.send_request.is_none() {
		let connecting = h3c.endpoint.connect(h3c.server_addr, &h3c.server_name).map_err(|_| ())?;
		let quinn_conn = connecting.await.map_err(|_| ())?;
		let h3_conn = h3_quinn::Connection::new(quinn_conn);
		let (mut driver, send_request) = h3::client::new(h3_conn).await.map_err(|_| ())?;
		tokio::spawn(async move {
			let _ = std::future::poll_fn(|cx| driver.poll_close(cx)).await;
		});
		h3c.send_request = Some(send_request);
	}
	let send_request = h3c.send_request.as_mut().unwrap();

	let (uri, http_method, body) = match method {
		DohMethod::Post => (path.to_string(), http::Method::POST, Some(Bytes::copy_from_slice(bytes))),
		DohMethod::Get => {
			let encoded = URL_SAFE_NO_PAD.encode(bytes);
			(format!("{path}?dns={encoded}"), http::Method::GET, None)
		}
	};

	let mut builder = http::Request::builder().method(http_method).uri(uri).header("accept", "application/dns-message");
	if body.is_some() {
		builder = builder.header("content-type", "application/dns-message");
	}
	let request = builder.body(()).map_err(|_| ())?;

	let fut = async {
		let mut stream = send_request.send_request(request).await.map_err(|_| ())?;
		if let Some(body) = body {
			stream.send_data(body).await.map_err(|_| ())?;
		}
		stream.finish().await.map_err(|_| ())?;

		let response = stream.recv_response().await.map_err(|_| ())?;
		let status = response.status().as_u16();
		let mut collected = BytesMut::new();
		while let Some(chunk) = stream.recv_data().await.map_err(|_| ())? {
			collected.extend_from_slice(chunk.chunk());
		}
		Ok::<_, ()>((status, collected.to_vec()))
	};
	tokio::time::timeout(timeout, fut).await.map_err(|_| ())?
}
