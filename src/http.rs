//! Transport primitives for backend calls.
//!
//! The service depends on HTTP only through [`TransportClient`]: the pipeline hands it fully
//! adapted requests and receives raw status/body pairs back, so alternative stacks (or fakes in
//! tests) plug in without touching refresh coordination. [`ReqwestTransport`] is the default
//! implementation.

// crates.io
use serde_json::{Map, Value};
#[cfg(feature = "reqwest")]
use {
	reqwest::{
		header::CONTENT_TYPE,
		multipart::{Form, Part},
		redirect::Policy,
	},
	tokio::{fs, io::AsyncWriteExt},
};
// self
use crate::{_prelude::*, adapter::RequestHeaders, retry::StatusOutcome};
#[cfg(feature = "reqwest")] use crate::{config::{ServiceConfig, SessionKind}, error::ConfigError};

type BoxError = Box<dyn StdError + Send + Sync>;

/// Boxed future returned by [`TransportClient`] operations.
pub type TransportFuture<'a, T> =
	Pin<Box<dyn Future<Output = Result<T, TransportError>> + 'a + Send>>;

/// Callback receiving transfer progress.
pub type ProgressFn = Arc<dyn Fn(Progress) + Send + Sync>;

/// HTTP methods supported by typed endpoints.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
	/// Parameters travel in the query string.
	#[default]
	Get,
	/// Parameters travel as a JSON body.
	Post,
}
impl Method {
	/// Canonical upper-case name.
	pub const fn as_str(self) -> &'static str {
		match self {
			Method::Get => "GET",
			Method::Post => "POST",
		}
	}
}
impl Display for Method {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.as_str())
	}
}

/// Fully resolved request ready for dispatch.
#[derive(Clone, Debug)]
pub struct HttpRequest {
	/// Request method.
	pub method: Method,
	/// Absolute request URL without the parameter query.
	pub url: Url,
	/// Adapted headers.
	pub headers: RequestHeaders,
	/// Call parameters; see [`HttpRequest::query_url`] and [`HttpRequest::json_body`].
	pub params: Option<Map<String, Value>>,
}
impl HttpRequest {
	/// Creates a request with no headers or parameters.
	pub fn new(method: Method, url: Url) -> Self {
		Self { method, url, headers: RequestHeaders::default(), params: None }
	}

	/// Sets the call parameters.
	pub fn with_params(mut self, params: Option<Map<String, Value>>) -> Self {
		self.params = params;

		self
	}

	/// URL to dispatch: for GET the parameters are appended as query pairs (strings verbatim,
	/// other values as their JSON text).
	pub fn query_url(&self) -> Url {
		let mut url = self.url.clone();

		let params = match (self.method, &self.params) {
			(Method::Get, Some(params)) if !params.is_empty() => params,
			_ => return url,
		};
		let mut pairs = url.query_pairs_mut();

		for (key, value) in params {
			match value {
				Value::String(s) => pairs.append_pair(key, s),
				other => pairs.append_pair(key, &other.to_string()),
			};
		}

		drop(pairs);

		url
	}

	/// JSON body to send: only POST requests carry one.
	pub fn json_body(&self) -> Result<Option<Vec<u8>>, TransportError> {
		match (self.method, &self.params) {
			(Method::Post, Some(params)) => serde_json::to_vec(params)
				.map(Some)
				.map_err(|e| TransportError::Encoding { message: e.to_string() }),
			_ => Ok(None),
		}
	}
}

/// Status and body of a completed exchange, whatever the status.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawResponse {
	/// HTTP status code.
	pub status: u16,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl RawResponse {
	/// Returns `true` for a 2xx status.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}
}
impl StatusOutcome for RawResponse {
	fn status(&self) -> u16 {
		self.status
	}
}

/// One multipart form part; every part is appended under the request's key.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum UploadSource {
	/// File contents, sent with the file's name.
	File(PathBuf),
	/// UTF-8 text value.
	Text(String),
}

/// Multipart upload ready for dispatch.
#[derive(Clone, Debug)]
pub struct MultipartRequest {
	/// Absolute request URL.
	pub url: Url,
	/// Adapted headers.
	pub headers: RequestHeaders,
	/// Form field name shared by every part.
	pub key: String,
	/// Parts in submission order.
	pub parts: Vec<UploadSource>,
}

/// Download ready for dispatch.
#[derive(Clone, Debug)]
pub struct DownloadRequest {
	/// Absolute request URL.
	pub url: Url,
	/// Adapted headers.
	pub headers: RequestHeaders,
	/// File the body is written to on a 2xx response. Other statuses leave it untouched.
	pub destination: PathBuf,
}

/// Result of a download exchange.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadResponse {
	/// HTTP status code.
	pub status: u16,
	/// Bytes written to the destination; zero for non-2xx statuses.
	pub bytes_written: u64,
	/// Body of a non-2xx response, kept for status extraction.
	pub error_body: Vec<u8>,
}
impl StatusOutcome for DownloadResponse {
	fn status(&self) -> u16 {
		self.status
	}
}

/// Transfer progress snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Progress {
	/// Bytes transferred so far.
	pub completed: u64,
	/// Expected total, when known.
	pub total: Option<u64>,
}
impl Progress {
	/// Completed fraction in `[0, 1]`, when the total is known and non-zero.
	pub fn fraction(&self) -> Option<f64> {
		self.total.filter(|total| *total > 0).map(|total| self.completed as f64 / total as f64)
	}
}

/// Native transport failures, mapped onto [`ErrorKind`] by the retry policy.
#[derive(Debug, ThisError)]
pub enum TransportError {
	/// Connection could not be established.
	#[error("Connection failed.")]
	Connection {
		/// Underlying failure.
		#[source]
		source: BoxError,
	},
	/// Request or connect timeout elapsed.
	#[error("Request timed out.")]
	TimedOut,
	/// Request was cancelled before completion.
	#[error("Request was cancelled.")]
	Cancelled,
	/// Request could not be built, typically because of its URL or headers.
	#[error("Request could not be built.")]
	InvalidRequest {
		/// Underlying failure.
		#[source]
		source: BoxError,
	},
	/// Redirect chain could not be resolved (loop or limit exceeded).
	#[error("Redirect chain could not be resolved.")]
	Redirect {
		/// Underlying failure.
		#[source]
		source: BoxError,
	},
	/// Response body could not be read.
	#[error("Response body could not be read.")]
	Body {
		/// Underlying failure.
		#[source]
		source: BoxError,
	},
	/// Request body or multipart form could not be encoded.
	#[error("Request body could not be encoded: {message}.")]
	Encoding {
		/// Human-readable reason.
		message: String,
	},
	/// Download destination could not be written.
	#[error("Download destination could not be written.")]
	Io(#[from] std::io::Error),
	/// Any other transport failure.
	#[error(transparent)]
	Other(BoxError),
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for TransportError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() {
			Self::TimedOut
		} else if e.is_connect() {
			Self::Connection { source: Box::new(e) }
		} else if e.is_redirect() {
			Self::Redirect { source: Box::new(e) }
		} else if e.is_builder() {
			Self::InvalidRequest { source: Box::new(e) }
		} else if e.is_body() || e.is_decode() {
			Self::Body { source: Box::new(e) }
		} else {
			Self::Other(Box::new(e))
		}
	}
}

/// Abstraction over the HTTP stack.
///
/// Implementations must be `Send + Sync + 'static` so one instance can serve every task the
/// service spawns; returned futures must be `Send`.
pub trait TransportClient
where
	Self: 'static + Send + Sync,
{
	/// Sends a data request.
	fn send(&self, request: HttpRequest) -> TransportFuture<'_, RawResponse>;

	/// Sends a multipart upload.
	fn upload_multipart(
		&self,
		request: MultipartRequest,
		progress: Option<ProgressFn>,
	) -> TransportFuture<'_, RawResponse>;

	/// Streams a download into its destination file.
	fn download(
		&self,
		request: DownloadRequest,
		progress: Option<ProgressFn>,
	) -> TransportFuture<'_, DownloadResponse>;
}

/// [`TransportClient`] backed by reqwest.
///
/// Data calls use a client built for the configured [`SessionKind`]; uploads and downloads use a
/// background-style client bounded only by the connect timeout.
#[cfg(feature = "reqwest")]
#[derive(Clone, Debug)]
pub struct ReqwestTransport {
	client: ReqwestClient,
	transfer_client: ReqwestClient,
}
#[cfg(feature = "reqwest")]
impl ReqwestTransport {
	/// Builds clients for `config`.
	pub fn from_config(config: &ServiceConfig) -> Result<Self, ConfigError> {
		Ok(Self {
			client: build_client(config, config.session_kind)?,
			transfer_client: build_client(config, SessionKind::Background)?,
		})
	}

	/// Wraps preconfigured clients.
	pub fn with_clients(client: ReqwestClient, transfer_client: ReqwestClient) -> Self {
		Self { client, transfer_client }
	}

	fn request(
		client: &ReqwestClient,
		method: Method,
		url: Url,
		headers: &RequestHeaders,
	) -> reqwest::RequestBuilder {
		let method = match method {
			Method::Get => reqwest::Method::GET,
			Method::Post => reqwest::Method::POST,
		};

		headers.iter().fold(client.request(method, url), |builder, (name, value)| {
			builder.header(name, value)
		})
	}
}
#[cfg(feature = "reqwest")]
impl TransportClient for ReqwestTransport {
	fn send(&self, request: HttpRequest) -> TransportFuture<'_, RawResponse> {
		Box::pin(async move {
			let mut builder =
				Self::request(&self.client, request.method, request.query_url(), &request.headers);

			if let Some(body) = request.json_body()? {
				builder = builder.header(CONTENT_TYPE, "application/json").body(body);
			}

			let response = builder.send().await?;
			let status = response.status().as_u16();
			let body = response.bytes().await?.to_vec();

			Ok(RawResponse { status, body })
		})
	}

	fn upload_multipart(
		&self,
		request: MultipartRequest,
		progress: Option<ProgressFn>,
	) -> TransportFuture<'_, RawResponse> {
		Box::pin(async move {
			let mut form = Form::new();
			let mut total = 0_u64;

			for source in &request.parts {
				let part = match source {
					UploadSource::File(path) => {
						let bytes = fs::read(path).await.map_err(|e| TransportError::Encoding {
							message: format!("{}: {e}", path.display()),
						})?;
						let name = path
							.file_name()
							.map(|n| n.to_string_lossy().into_owned())
							.unwrap_or_else(|| "file".into());

						total += bytes.len() as u64;

						Part::bytes(bytes).file_name(name)
					},
					UploadSource::Text(text) => {
						total += text.len() as u64;

						Part::text(text.clone())
					},
				};

				form = form.part(request.key.clone(), part);
			}

			let report = |completed| {
				if let Some(progress) = &progress {
					progress(Progress { completed, total: Some(total) });
				}
			};

			report(0);

			let response =
				Self::request(&self.transfer_client, Method::Post, request.url, &request.headers)
					.multipart(form)
					.send()
					.await?;
			let status = response.status().as_u16();
			let body = response.bytes().await?.to_vec();

			report(total);

			Ok(RawResponse { status, body })
		})
	}

	fn download(
		&self,
		request: DownloadRequest,
		progress: Option<ProgressFn>,
	) -> TransportFuture<'_, DownloadResponse> {
		Box::pin(async move {
			let mut response =
				Self::request(&self.transfer_client, Method::Get, request.url, &request.headers)
					.send()
					.await?;
			let status = response.status().as_u16();

			if !response.status().is_success() {
				let error_body = response.bytes().await?.to_vec();

				return Ok(DownloadResponse { status, bytes_written: 0, error_body });
			}
			if let Some(parent) = request.destination.parent() {
				fs::create_dir_all(parent).await?;
			}

			let total = response.content_length();
			let partial = PartialDownload::beside(&request.destination);
			let mut file = fs::File::create(partial.path()).await?;
			let mut completed = 0_u64;

			while let Some(chunk) = response.chunk().await? {
				file.write_all(&chunk).await?;
				completed += chunk.len() as u64;

				if let Some(progress) = &progress {
					progress(Progress { completed, total });
				}
			}

			file.flush().await?;
			drop(file);
			partial.commit(&request.destination).await?;

			Ok(DownloadResponse { status, bytes_written: completed, error_body: Vec::new() })
		})
	}
}

// Sibling file a download streams into; removed on drop unless renamed over the destination.
#[cfg(feature = "reqwest")]
struct PartialDownload {
	path: PathBuf,
	committed: bool,
}
#[cfg(feature = "reqwest")]
impl PartialDownload {
	fn beside(destination: &Path) -> Self {
		let mut path = destination.as_os_str().to_owned();

		path.push(".part");

		Self { path: PathBuf::from(path), committed: false }
	}

	fn path(&self) -> &Path {
		&self.path
	}

	async fn commit(mut self, destination: &Path) -> std::io::Result<()> {
		fs::rename(&self.path, destination).await?;
		self.committed = true;

		Ok(())
	}
}
#[cfg(feature = "reqwest")]
impl Drop for PartialDownload {
	fn drop(&mut self) {
		if !self.committed {
			let _ = std::fs::remove_file(&self.path);
		}
	}
}

#[cfg(feature = "reqwest")]
fn build_client(config: &ServiceConfig, kind: SessionKind) -> Result<ReqwestClient, ConfigError> {
	let builder = ReqwestClient::builder().redirect(Policy::limited(10));
	let builder = match kind {
		SessionKind::Default => builder.timeout(config.timeout),
		SessionKind::Ephemeral => builder.timeout(config.timeout).pool_max_idle_per_host(0),
		SessionKind::Background => builder
			.connect_timeout(config.timeout)
			.user_agent(config.client_identifier.as_str()),
	};

	Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	fn params() -> Map<String, Value> {
		let mut params = Map::new();

		params.insert("q".into(), Value::String("rust lang".into()));
		params.insert("page".into(), Value::from(2));

		params
	}

	#[test]
	fn get_params_become_query_pairs() {
		let url = Url::parse("https://api.example.com/posts").expect("Fixture URL should parse.");
		let request = HttpRequest::new(Method::Get, url).with_params(Some(params()));

		assert_eq!(request.query_url().as_str(), "https://api.example.com/posts?page=2&q=rust+lang");
		assert_eq!(request.json_body().expect("GET never encodes a body."), None);
	}

	#[test]
	fn post_params_become_json_body() {
		let url = Url::parse("https://api.example.com/posts").expect("Fixture URL should parse.");
		let request = HttpRequest::new(Method::Post, url).with_params(Some(params()));
		let body = request
			.json_body()
			.expect("Parameters should encode.")
			.expect("POST should carry a body.");
		let decoded: Value = serde_json::from_slice(&body).expect("Body should be JSON.");

		assert_eq!(decoded["q"], "rust lang");
		assert_eq!(request.query_url().query(), None);
	}

	#[cfg(feature = "reqwest")]
	#[tokio::test]
	async fn partial_download_replaces_the_destination_only_on_commit() {
		let destination = std::env::temp_dir().join(format!(
			"netservice_partial_{}_{}",
			std::process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos()
		));

		std::fs::write(&destination, b"previous").expect("Failed to write existing destination.");

		let abandoned = PartialDownload::beside(&destination);
		let abandoned_path = abandoned.path().to_path_buf();

		std::fs::write(&abandoned_path, b"trunc").expect("Failed to write partial file.");
		drop(abandoned);

		assert!(!abandoned_path.exists(), "Abandoned partial file must be removed.");
		assert_eq!(std::fs::read(&destination).expect("Destination should remain."), b"previous");

		let finished = PartialDownload::beside(&destination);
		let finished_path = finished.path().to_path_buf();

		std::fs::write(&finished_path, b"complete").expect("Failed to write partial file.");
		finished.commit(&destination).await.expect("Rename should succeed.");

		assert!(!finished_path.exists());
		assert_eq!(std::fs::read(&destination).expect("Destination should exist."), b"complete");

		std::fs::remove_file(&destination).expect("Failed to remove destination.");
	}

	#[test]
	fn progress_fraction_requires_known_total() {
		assert_eq!(Progress { completed: 5, total: Some(10) }.fraction(), Some(0.5));
		assert_eq!(Progress { completed: 5, total: None }.fraction(), None);
		assert_eq!(Progress { completed: 0, total: Some(0) }.fraction(), None);
	}
}
