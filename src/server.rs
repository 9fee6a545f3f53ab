use crate::error::ConfigError;

/// HTTP version used for a DoH transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpVersion {
	Http1_1,
	Http2,
	Http3,
}

impl HttpVersion {
	pub fn parse(raw: &str) -> Result<Self, ConfigError> {
		match raw {
			"1.1" => Ok(HttpVersion::Http1_1),
			"2" => Ok(HttpVersion::Http2),
			"3" => Ok(HttpVersion::Http3),
			other => Err(ConfigError::InvalidServer {
				input: other.to_string(),
				reason: "--doh-protocol must be one of 1.1, 2, 3".to_string(),
			}),
		}
	}
}

/// HTTP method used to carry the DNS wire message for DoH.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DohMethod {
	Get,
	Post,
}

impl DohMethod {
	pub fn parse(raw: &str) -> Result<Self, ConfigError> {
		match raw.to_ascii_uppercase().as_str() {
			"GET" => Ok(DohMethod::Get),
			"POST" => Ok(DohMethod::Post),
			other => Err(ConfigError::InvalidServer {
				input: other.to_string(),
				reason: "--doh-method must be GET or POST".to_string(),
			}),
		}
	}
}

/// The transport-specific part of a server descriptor.
#[derive(Debug, Clone)]
pub enum ServerKind {
	Plain { host: String, port: u16, use_tcp: bool },
	DoT { host: String, port: u16 },
	DoH {
		scheme: String,
		host: String,
		port: u16,
		path: String,
		http_version: HttpVersion,
		method: DohMethod,
	},
	DoQ { host: String, port: u16 },
}

/// Query-construction flags shared by every transport.
#[derive(Debug, Clone)]
pub struct CommonFlags {
	pub insecure_tls: bool,
	pub recurse: bool,
	pub dnssec_do: bool,
	pub edns0_buf_size: u16,
	pub edns_opt: Option<(u16, Vec<u8>)>,
}

impl Default for CommonFlags {
	fn default() -> Self {
		CommonFlags {
			insecure_tls: false,
			recurse: true,
			dnssec_do: false,
			edns0_buf_size: 0,
			edns_opt: None,
		}
	}
}

/// A fully-resolved server descriptor: transport kind plus the common
/// query-construction flags.
#[derive(Debug, Clone)]
pub struct ServerDescriptor {
	pub kind: ServerKind,
	pub flags: CommonFlags,
}

impl ServerDescriptor {
	pub fn host(&self) -> &str {
		match &self.kind {
			ServerKind::Plain { host, .. } => host,
			ServerKind::DoT { host, .. } => host,
			ServerKind::DoH { host, .. } => host,
			ServerKind::DoQ { host, .. } => host,
		}
	}

	pub fn port(&self) -> u16 {
		match &self.kind {
			ServerKind::Plain { port, .. } => *port,
			ServerKind::DoT { port, .. } => *port,
			ServerKind::DoH { port, .. } => *port,
			ServerKind::DoQ { port, .. } => *port,
		}
	}

	/// Human-readable `host:port` label used in [`crate::error::FatalIOError`]
	/// messages -- not meant for re-parsing.
	pub fn host_label(&self) -> String {
		format!("{}:{}", self.host(), self.port())
	}
}

/// Parse a server string into a [`ServerDescriptor`].
///
/// `force_tcp` and `force_dot` come from the `--tcp`/`--dot` CLI flags and
/// only take effect when the input carries no explicit scheme.
pub fn parse_server(
	input: &str,
	force_tcp: bool,
	force_dot: bool,
	http_version: HttpVersion,
	doh_method: DohMethod,
) -> Result<ServerDescriptor, ConfigError> {
	let trimmed = input.trim();
	if trimmed.is_empty() {
		return Err(ConfigError::EmptyServer);
	}

	let kind = if let Some(rest) = trimmed.strip_prefix("quic://") {
		let (host, port) = parse_authority(rest, 853)?;
		ServerKind::DoQ { host, port }
	} else if let Some(rest) = trimmed.strip_prefix("https://") {
		let (authority, path) = split_path(rest);
		let (host, port) = parse_authority(authority, 443)?;
		ServerKind::DoH {
			scheme: "https".to_string(),
			host,
			port,
			path,
			http_version,
			method: doh_method,
		}
	} else if let Some(rest) = trimmed.strip_prefix("http://") {
		let (authority, path) = split_path(rest);
		let (host, port) = parse_authority(authority, 80)?;
		ServerKind::DoH {
			scheme: "http".to_string(),
			host,
			port,
			path,
			http_version,
			method: doh_method,
		}
	} else if let Some(rest) = trimmed.strip_prefix("tls://") {
		let (host, port) = parse_authority(rest, 853)?;
		ServerKind::DoT { host, port }
	} else if force_dot {
		let (host, port) = parse_authority(trimmed, 853)?;
		ServerKind::DoT { host, port }
	} else {
		let (host, port) = parse_authority(trimmed, 53)?;
		ServerKind::Plain {
			host,
			port,
			use_tcp: force_tcp,
		}
	};

	Ok(ServerDescriptor {
		kind,
		flags: CommonFlags::default(),
	})
}

/// Split `host[:port][/path]` (no scheme) into `(authority, path)`. The
/// path defaults to `/dns-query` by the caller when absent -- this helper
/// only identifies whether a `/` exists at all, leaving bracketed IPv6
/// literals ("[::1]:443/path") intact.
fn split_path(rest: &str) -> (&str, String) {
	if let Some(bracket_end) = rest.find(']') {
		// bracketed IPv6 literal: look for a path only after the bracket.
		if let Some(slash) = rest[bracket_end..].find('/') {
			let idx = bracket_end + slash;
			return (&rest[..idx], rest[idx..].to_string());
		}
		return (rest, "/dns-query".to_string());
	}
	match rest.find('/') {
		Some(idx) => (&rest[..idx], rest[idx..].to_string()),
		None => (rest, "/dns-query".to_string()),
	}
}

/// Parse `host`, `host:port`, or `[ipv6]:port` into `(host, port)`,
/// defaulting the port to `default_port` when absent. A bare (unbracketed)
/// IPv6 literal is ambiguous between a host and a host:port pair and is
/// treated as host-only.
fn parse_authority(authority: &str, default_port: u16) -> Result<(String, u16), ConfigError> {
	let authority = authority.trim();
	if authority.is_empty() {
		return Err(ConfigError::EmptyServer);
	}

	if let Some(rest) = authority.strip_prefix('[') {
		let close = rest.find(']').ok_or_else(|| ConfigError::InvalidServer {
			input: authority.to_string(),
			reason: "unterminated '[' in bracketed IPv6 literal".to_string(),
		})?;
		let host = rest[..close].to_string();
		let after = &rest[close + 1..];
		let port = if let Some(p) = after.strip_prefix(':') {
			p.parse::<u16>().map_err(|_| ConfigError::InvalidServer {
				input: authority.to_string(),
				reason: "invalid port".to_string(),
			})?
		} else {
			default_port
		};
		return Ok((host, port));
	}

	// Bare IPv6 (more than one ':') is ambiguous -> host only.
	if authority.matches(':').count() > 1 {
		return Ok((authority.to_string(), default_port));
	}

	match authority.split_once(':') {
		Some((host, port_str)) => {
			let port = port_str.parse::<u16>().map_err(|_| ConfigError::InvalidServer {
				input: authority.to_string(),
				reason: "invalid port".to_string(),
			})?;
			Ok((host.to_string(), port))
		}
		None => Ok((authority.to_string(), default_port)),
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn defaults() -> (HttpVersion, DohMethod) {
		(HttpVersion::Http1_1, DohMethod::Post)
	}

	#[test]
	fn plain_default_port() {
		let (v, m) = defaults();
		let d = parse_server("127.0.0.1", false, false, v, m).unwrap();
		match d.kind {
			ServerKind::Plain { host, port, use_tcp } => {
				assert_eq!(host, "127.0.0.1");
				assert_eq!(port, 53);
				assert!(!use_tcp);
			}
			_ => panic!("expected Plain"),
		}
	}

	#[test]
	fn plain_tcp_flag() {
		let (v, m) = defaults();
		let d = parse_server("127.0.0.1:5353", true, false, v, m).unwrap();
		match d.kind {
			ServerKind::Plain { port, use_tcp, .. } => {
				assert_eq!(port, 5353);
				assert!(use_tcp);
			}
			_ => panic!("expected Plain"),
		}
	}

	#[test]
	fn quic_scheme() {
		let (v, m) = defaults();
		let d = parse_server("quic://dns.example.com", false, false, v, m).unwrap();
		match d.kind {
			ServerKind::DoQ { host, port } => {
				assert_eq!(host, "dns.example.com");
				assert_eq!(port, 853);
			}
			_ => panic!("expected DoQ"),
		}
	}

	#[test]
	fn dot_scheme_and_flag() {
		let (v, m) = defaults();
		let d1 = parse_server("tls://1.1.1.1", false, false, v, m).unwrap();
		assert!(matches!(d1.kind, ServerKind::DoT { .. }));
		let d2 = parse_server("1.1.1.1", false, true, v, m).unwrap();
		assert!(matches!(d2.kind, ServerKind::DoT { .. }));
	}

	#[test]
	fn doh_default_path_appended() {
		let (v, m) = defaults();
		let d = parse_server("https://dns.google", false, false, v, m).unwrap();
		match d.kind {
			ServerKind::DoH { host, port, path, scheme, .. } => {
				assert_eq!(host, "dns.google");
				assert_eq!(port, 443);
				assert_eq!(path, "/dns-query");
				assert_eq!(scheme, "https");
			}
			_ => panic!("expected DoH"),
		}
	}

	#[test]
	fn doh_explicit_path_kept() {
		let (v, m) = defaults();
		let d = parse_server("https://dns.google/resolve", false, false, v, m).unwrap();
		match d.kind {
			ServerKind::DoH { path, .. } => assert_eq!(path, "/resolve"),
			_ => panic!("expected DoH"),
		}
	}

	#[test]
	fn bracketed_ipv6_with_port() {
		let (v, m) = defaults();
		let d = parse_server("[2606:4700:4700::1111]:53", false, false, v, m).unwrap();
		match d.kind {
			ServerKind::Plain { host, port, .. } => {
				assert_eq!(host, "2606:4700:4700::1111");
				assert_eq!(port, 53);
			}
			_ => panic!("expected Plain"),
		}
	}

	#[test]
	fn bare_ipv6_is_host_only() {
		let (v, m) = defaults();
		let d = parse_server("2606:4700:4700::1111", false, false, v, m).unwrap();
		match d.kind {
			ServerKind::Plain { host, port, .. } => {
				assert_eq!(host, "2606:4700:4700::1111");
				assert_eq!(port, 53);
			}
			_ => panic!("expected Plain"),
		}
	}

	#[test]
	fn empty_input_is_config_error() {
		let (v, m) = defaults();
		assert!(parse_server("", false, false, v, m).is_err());
	}

	#[test]
	fn http_version_parse() {
		assert_eq!(HttpVersion::parse("1.1").unwrap(), HttpVersion::Http1_1);
		assert_eq!(HttpVersion::parse("2").unwrap(), HttpVersion::Http2);
		assert_eq!(HttpVersion::parse("3").unwrap(), HttpVersion::Http3);
		assert!(HttpVersion::parse("4").is_err());
	}
}
