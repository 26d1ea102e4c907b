//! Service configuration: backend base URL, timeouts, session flavour, and download location.

// std
use std::{env, time::Duration as StdDuration};
// crates.io
use serde::Deserializer;
// self
use crate::_prelude::*;

const DEFAULT_TIMEOUT: StdDuration = StdDuration::from_secs(10);
const DEFAULT_CLIENT_IDENTIFIER: &str = "com.networkservice.api";

/// Connection behaviour of the underlying HTTP client.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
	/// Pooled connections with a per-request timeout.
	#[default]
	Default,
	/// No idle connections are kept between requests.
	Ephemeral,
	/// Long-running transfers: only the connect phase is bounded, and the client identifier is
	/// sent as the user agent.
	Background,
}

/// Settings shared by every call issued through a
/// [`NetworkService`](crate::service::NetworkService).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ServiceConfig {
	/// Absolute `http`/`https` URL every endpoint path is appended to.
	pub base_url: String,
	/// Request timeout (connect timeout for [`SessionKind::Background`]), in seconds when
	/// deserialized.
	#[serde(default = "default_timeout", deserialize_with = "deserialize_seconds")]
	pub timeout: StdDuration,
	/// Client flavour.
	#[serde(default)]
	pub session_kind: SessionKind,
	/// Identifier of the calling application.
	#[serde(default = "default_client_identifier")]
	pub client_identifier: String,
	/// Directory downloads are written into.
	#[serde(default = "env::temp_dir")]
	pub download_dir: PathBuf,
}
impl ServiceConfig {
	/// Starts a builder with every optional field at its default.
	pub fn builder(base_url: impl Into<String>) -> ServiceConfigBuilder {
		ServiceConfigBuilder { config: Self::new(base_url) }
	}

	/// Creates a configuration with default settings.
	pub fn new(base_url: impl Into<String>) -> Self {
		Self {
			base_url: base_url.into(),
			timeout: DEFAULT_TIMEOUT,
			session_kind: SessionKind::Default,
			client_identifier: DEFAULT_CLIENT_IDENTIFIER.into(),
			download_dir: env::temp_dir(),
		}
	}

	/// Parses the base URL, rejecting anything that is not `http`/`https` with a host.
	pub fn parsed_base_url(&self) -> Result<Url, ErrorKind> {
		validate_http_url(&self.base_url)
	}

	/// Resolves `path` against the base URL by plain concatenation, so a base path prefix is
	/// preserved.
	pub fn endpoint_url(&self, path: &str) -> Result<Url, ErrorKind> {
		self.parsed_base_url()?;

		let base = self.base_url.trim_end_matches('/');
		let joined = match path {
			"" => base.to_owned(),
			p if p.starts_with('/') => format!("{base}{p}"),
			p => format!("{base}/{p}"),
		};

		validate_http_url(&joined)
	}
}

/// Builder for [`ServiceConfig`].
#[derive(Clone, Debug)]
pub struct ServiceConfigBuilder {
	config: ServiceConfig,
}
impl ServiceConfigBuilder {
	/// Overrides the request timeout.
	pub fn timeout(mut self, timeout: StdDuration) -> Self {
		self.config.timeout = timeout;

		self
	}

	/// Overrides the session flavour.
	pub fn session_kind(mut self, kind: SessionKind) -> Self {
		self.config.session_kind = kind;

		self
	}

	/// Overrides the client identifier.
	pub fn client_identifier(mut self, identifier: impl Into<String>) -> Self {
		self.config.client_identifier = identifier.into();

		self
	}

	/// Overrides the download directory.
	pub fn download_dir(mut self, dir: impl Into<PathBuf>) -> Self {
		self.config.download_dir = dir.into();

		self
	}

	/// Finalizes the configuration. The base URL is validated per call, not here.
	pub fn build(self) -> ServiceConfig {
		self.config
	}
}

fn validate_http_url(raw: &str) -> Result<Url, ErrorKind> {
	let url = Url::parse(raw).map_err(|_| ErrorKind::MalformedUrl)?;

	match url.scheme() {
		"http" | "https" if url.host_str().is_some_and(|host| !host.is_empty()) => Ok(url),
		_ => Err(ErrorKind::MalformedUrl),
	}
}

fn default_timeout() -> StdDuration {
	DEFAULT_TIMEOUT
}

fn default_client_identifier() -> String {
	DEFAULT_CLIENT_IDENTIFIER.into()
}

fn deserialize_seconds<'de, D>(deserializer: D) -> Result<StdDuration, D::Error>
where
	D: Deserializer<'de>,
{
	let secs = f64::deserialize(deserializer)?;

	StdDuration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn deserializes_with_defaults() {
		let config: ServiceConfig =
			serde_json::from_str(r#"{"base_url":"https://api.example.com"}"#)
				.expect("Minimal configuration should deserialize.");

		assert_eq!(config, ServiceConfig::new("https://api.example.com"));
		assert_eq!(config.timeout, StdDuration::from_secs(10));
		assert_eq!(config.client_identifier, "com.networkservice.api");

		let config: ServiceConfig = serde_json::from_str(
			r#"{"base_url":"https://api.example.com","timeout":2.5,"session_kind":"background"}"#,
		)
		.expect("Full configuration should deserialize.");

		assert_eq!(config.timeout, StdDuration::from_millis(2_500));
		assert_eq!(config.session_kind, SessionKind::Background);
	}

	#[test]
	fn rejects_malformed_base_urls() {
		for raw in ["htp://bad", "not a url", "ftp://example.com", "file:///tmp/x", ""] {
			assert_eq!(
				ServiceConfig::new(raw).endpoint_url("/posts"),
				Err(ErrorKind::MalformedUrl),
				"{raw} should be rejected."
			);
		}
	}

	#[test]
	fn endpoint_url_concatenates_paths() {
		let config = ServiceConfig::builder("https://api.example.com/v1/")
			.timeout(StdDuration::from_secs(3))
			.build();

		assert_eq!(
			config.endpoint_url("/posts/1").expect("Path should resolve.").as_str(),
			"https://api.example.com/v1/posts/1"
		);
		assert_eq!(
			config.endpoint_url("auth/refresh").expect("Path should resolve.").as_str(),
			"https://api.example.com/v1/auth/refresh"
		);
		assert_eq!(config.timeout, StdDuration::from_secs(3));
	}
}
