use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::error::ConfigError;
use crate::ratelimit::Cancelled;

/// Per-request delay, either disabled, a constant duration, or a uniform
/// range.
#[derive(Debug, Clone, Copy)]
pub enum RequestDelay {
	None,
	Constant(Duration),
	Range(Duration, Duration),
}

impl RequestDelay {
	/// Sleep for this request's delay, cancellable by `cancel`.
	pub async fn sleep(&self, cancel: &CancellationToken) -> Result<(), Cancelled> {
		let duration = match self {
			RequestDelay::None => return Ok(()),
			RequestDelay::Constant(d) => *d,
			RequestDelay::Range(lo, hi) => {
				if lo >= hi {
					*lo
				} else {
					let nanos = rand::thread_rng().gen_range(lo.as_nanos()..=hi.as_nanos());
					Duration::from_nanos(nanos as u64)
				}
			}
		};
		if duration.is_zero() {
			return Ok(());
		}
		tokio::select! {
			_ = tokio::time::sleep(duration) => Ok(()),
			_ = cancel.cancelled() => Err(Cancelled),
		}
	}
}

/// Parse `"0s"`, a single duration, or a `D1-D2` range (e.g. `"500ms-1s"`).
pub fn parse_request_delay(raw: &str) -> Result<RequestDelay, ConfigError> {
	let raw = raw.trim();
	if raw.is_empty() || raw == "0" || raw == "0s" {
		return Ok(RequestDelay::None);
	}
	if let Some((lo, hi)) = raw.split_once('-') {
		let lo = parse_duration(lo, raw)?;
		let hi = parse_duration(hi, raw)?;
		return Ok(RequestDelay::Range(lo, hi));
	}
	Ok(RequestDelay::Constant(parse_duration(raw, raw)?))
}

fn parse_duration(raw: &str, original: &str) -> Result<Duration, ConfigError> {
	let raw = raw.trim();
	let invalid = || ConfigError::InvalidDelay {
		input: original.to_string(),
		reason: format!("could not parse duration segment '{}'", raw),
	};
	let (digits, unit) = raw.find(|c: char| !c.is_ascii_digit() && c != '.').map(|i| raw.split_at(i)).ok_or_else(invalid)?;
	let value: f64 = digits.parse().map_err(|_| invalid())?;
	let multiplier_ns: f64 = match unit {
		"ns" => 1.0,
		"us" | "µs" => 1_000.0,
		"ms" => 1_000_000.0,
		"s" | "" => 1_000_000_000.0,
		"m" => 60.0 * 1_000_000_000.0,
		_ => return Err(invalid()),
	};
	Ok(Duration::from_nanos((value * multiplier_ns) as u64))
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn zero_is_none() {
		assert!(matches!(parse_request_delay("0s").unwrap(), RequestDelay::None));
		assert!(matches!(parse_request_delay("0").unwrap(), RequestDelay::None));
	}

	#[test]
	fn constant_duration() {
		match parse_request_delay("500ms").unwrap() {
			RequestDelay::Constant(d) => assert_eq!(d, Duration::from_millis(500)),
			_ => panic!("expected Constant"),
		}
	}

	#[test]
	fn range_duration() {
		match parse_request_delay("500ms-500ms").unwrap() {
			RequestDelay::Range(lo, hi) => {
				assert_eq!(lo, Duration::from_millis(500));
				assert_eq!(hi, Duration::from_millis(500));
			}
			_ => panic!("expected Range"),
		}
	}

	#[test]
	fn plain_seconds() {
		match parse_request_delay("2s").unwrap() {
			RequestDelay::Constant(d) => assert_eq!(d, Duration::from_secs(2)),
			_ => panic!("expected Constant"),
		}
	}

	#[test]
	fn invalid_delay_is_config_error() {
		assert!(parse_request_delay("banana").is_err());
	}

	#[tokio::test]
	async fn none_does_not_sleep() {
		let cancel = CancellationToken::new();
		let start = std::time::Instant::now();
		RequestDelay::None.sleep(&cancel).await.unwrap();
		assert!(start.elapsed() < Duration::from_millis(50));
	}
}
