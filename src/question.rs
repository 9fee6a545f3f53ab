use std::str::FromStr;

use hickory_proto::rr::{Name, RecordType};

use crate::error::ConfigError;

/// One (qname, qtype) pair, built once by [`build_questions`] and shared
/// read-only by every worker for the lifetime of a run.
#[derive(Debug, Clone)]
pub struct Question {
	pub name: Name,
	pub qtype: RecordType,
}

impl Question {
	pub fn name_str(&self) -> String {
		self.name.to_ascii()
	}
}

/// Expand the positional CLI tokens into an ordered list of FQDN name
/// strings. A token starting with `@` names a local file (one name per
/// line, blank/`#` lines skipped); a token starting with `http://` or
/// `https://` is fetched once and parsed the same way; anything else is a
/// literal name.
pub async fn load_names(tokens: &[String]) -> Result<Vec<String>, ConfigError> {
	let mut names = Vec::new();
	for token in tokens {
		if let Some(path) = token.strip_prefix('@') {
			let content = std::fs::read_to_string(path).map_err(|source| ConfigError::QuestionFile {
				path: path.to_string(),
				source,
			})?;
			names.extend(parse_name_lines(&content));
		} else if token.starts_with("http://") || token.starts_with("https://") {
			let body = reqwest::get(token)
				.await
				.and_then(|r| r.error_for_status())
				.map_err(|source| ConfigError::QuestionFetch {
					url: token.clone(),
					source,
				})?
				.text()
				.await
				.map_err(|source| ConfigError::QuestionFetch {
					url: token.clone(),
					source,
				})?;
			names.extend(parse_name_lines(&body));
		} else {
			names.push(token.clone());
		}
	}
	Ok(names)
}

fn parse_name_lines(content: &str) -> Vec<String> {
	content
		.lines()
		.map(|line| line.trim())
		.filter(|line| !line.is_empty() && !line.starts_with('#'))
		.map(String::from)
		.collect()
}

/// Parse the `--type` flags (e.g. "A", "AAAA", "mx") into hickory record
/// types, defaulting to `A` when none are given.
pub fn parse_query_types(raw: &[String]) -> Result<Vec<RecordType>, ConfigError> {
	if raw.is_empty() {
		return Ok(vec![RecordType::A]);
	}
	raw.iter()
		.map(|s| RecordType::from_str(&s.to_ascii_uppercase()).map_err(|_| ConfigError::InvalidQueryType(s.clone())))
		.collect()
}

/// Cross-product `names` with `qtypes` into the final question list, one
/// (name, type) pair per combination, in name-major order. Fails with
/// [`ConfigError::EmptyQuestionList`] if either input is empty.
pub fn build_questions(names: &[String], qtypes: &[RecordType]) -> Result<Vec<Question>, ConfigError> {
	if names.is_empty() || qtypes.is_empty() {
		return Err(ConfigError::EmptyQuestionList);
	}
	let mut questions = Vec::with_capacity(names.len() * qtypes.len());
	for name in names {
		let fqdn = Name::from_ascii(name).map_err(|_| ConfigError::InvalidQueryType(name.clone()))?;
		for &qtype in qtypes {
			questions.push(Question {
				name: fqdn.clone(),
				qtype,
			});
		}
	}
	if questions.is_empty() {
		return Err(ConfigError::EmptyQuestionList);
	}
	Ok(questions)
}
