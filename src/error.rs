//! Caller-facing failure taxonomy plus the crate-level errors raised by stores, transports, and
//! configuration.

// self
use crate::{_prelude::*, envelope::ResponseStatus, http::TransportError, store::StoreError};

/// Crate-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Crate-level error raised by stores, transports, refreshers, and configuration.
///
/// Callers of [`NetworkService`](crate::service::NetworkService) never see this type; the
/// pipeline folds it into an [`ErrorInfo`] at the boundary.
#[derive(Debug, ThisError)]
pub enum Error {
	/// Durable token storage failure.
	#[error("{0}")]
	Storage(
		#[from]
		#[source]
		StoreError,
	),
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Transport failure (DNS, TCP, TLS, body streaming).
	#[error(transparent)]
	Transport(#[from] TransportError),

	/// No refresh token is cached, so a refresh cannot be attempted.
	#[error("No refresh token is available.")]
	MissingRefreshToken,
	/// Refresh endpoint rejected the request or answered with an unusable payload.
	#[error("Token refresh failed: {reason}.")]
	Refresh {
		/// Human-readable reason.
		reason: String,
	},
}

/// Configuration and validation failures.
#[derive(Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: BoxError,
	},
	/// Base URL is not an absolute `http`/`https` URL with a host.
	#[error("Base URL `{url}` is not a valid http(s) URL.")]
	InvalidBaseUrl {
		/// Rejected input.
		url: String,
	},
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + std::error::Error) -> Self {
		Self::HttpClientBuild { source: Box::new(src) }
	}
}
#[cfg(feature = "reqwest")]
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e)
	}
}

/// Closed set of failure kinds surfaced through a call's error slot.
///
/// Each kind carries a stable numeric code (negative for client-side failures, the HTTP status
/// otherwise) and a fixed human-readable message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorKind {
	/// Network connection could not be established.
	Connection,
	/// The request was cancelled before it completed.
	Cancelled,
	/// The base URL or resolved request URL is malformed.
	MalformedUrl,
	/// The response could not be decoded into the expected envelope.
	InvalidResponse,
	/// Multipart form data could not be encoded.
	MultipartEncoding,
	/// Any failure that does not fit another kind.
	Network,
	/// HTTP 400.
	BadRequest,
	/// HTTP 401 that could not be recovered by a token refresh.
	AuthenticationFailure,
	/// HTTP 403.
	Forbidden,
	/// HTTP 404.
	ResourceUnavailable,
	/// HTTP 405.
	MethodNotAllowed,
	/// HTTP 408 or a transport-level timeout.
	TimedOut,
	/// Unresolved 3xx: the service moved.
	ServiceRelocated,
}
impl ErrorKind {
	/// Numeric code associated with the kind.
	pub const fn code(self) -> i32 {
		match self {
			Self::Connection => -1,
			Self::Cancelled => -2,
			Self::MalformedUrl => -3,
			Self::InvalidResponse => -4,
			Self::MultipartEncoding => -5,
			Self::Network => -6,
			Self::BadRequest => 400,
			Self::AuthenticationFailure => 401,
			Self::Forbidden => 403,
			Self::ResourceUnavailable => 404,
			Self::MethodNotAllowed => 405,
			Self::TimedOut => 408,
			Self::ServiceRelocated => 300,
		}
	}

	/// Fixed message associated with the kind.
	pub const fn message(self) -> &'static str {
		match self {
			Self::Connection => "Error in network connection.",
			Self::Cancelled => "Network request has been cancelled.",
			Self::MalformedUrl => "Incorrect URL.",
			Self::InvalidResponse => "API response is not valid.",
			Self::MultipartEncoding => "Error encoding multipart file.",
			Self::Network => "Network error.",
			Self::BadRequest => "Bad network request.",
			Self::AuthenticationFailure => "Network request token error.",
			Self::Forbidden => "User is forbidden for the request.",
			Self::ResourceUnavailable => "API response unavailable.",
			Self::MethodNotAllowed => "HTTP Request method is not allowed.",
			Self::TimedOut => "Network request timed out.",
			Self::ServiceRelocated => "API service is not available.",
		}
	}

	/// Maps a non-2xx HTTP status onto the taxonomy. 401 maps to
	/// [`ErrorKind::AuthenticationFailure`]; unknown statuses map to [`ErrorKind::Network`].
	pub const fn from_status(status: u16) -> Self {
		match status {
			300..=399 => Self::ServiceRelocated,
			400 => Self::BadRequest,
			401 => Self::AuthenticationFailure,
			403 => Self::Forbidden,
			404 => Self::ResourceUnavailable,
			405 => Self::MethodNotAllowed,
			408 => Self::TimedOut,
			_ => Self::Network,
		}
	}
}
impl Display for ErrorKind {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str(self.message())
	}
}

/// Immutable failure value handed to a call's callback.
#[derive(Clone, Debug, PartialEq, ThisError)]
#[error("{kind}")]
pub struct ErrorInfo {
	/// Failure kind.
	pub kind: ErrorKind,
	/// HTTP status of the failing response, when one was received.
	pub http_status: Option<u16>,
	/// `status` object decoded from the failing response's envelope, if it carried one.
	pub server_status: Option<ResponseStatus>,
}
impl ErrorInfo {
	/// Creates an error value for `kind` with no response metadata.
	pub const fn new(kind: ErrorKind) -> Self {
		Self { kind, http_status: None, server_status: None }
	}

	/// Attaches the HTTP status of the failing response.
	pub fn with_http_status(mut self, status: u16) -> Self {
		self.http_status = Some(status);

		self
	}

	/// Attaches the server-supplied envelope status.
	pub fn with_server_status(mut self, status: Option<ResponseStatus>) -> Self {
		self.server_status = status;

		self
	}

	/// Numeric code of the kind.
	pub fn code(&self) -> i32 {
		self.kind.code()
	}

	/// Fixed message of the kind.
	pub fn message(&self) -> &'static str {
		self.kind.message()
	}
}
impl From<ErrorKind> for ErrorInfo {
	fn from(kind: ErrorKind) -> Self {
		Self::new(kind)
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	#[test]
	fn status_mapping_covers_the_taxonomy() {
		assert_eq!(ErrorKind::from_status(301), ErrorKind::ServiceRelocated);
		assert_eq!(ErrorKind::from_status(400), ErrorKind::BadRequest);
		assert_eq!(ErrorKind::from_status(401), ErrorKind::AuthenticationFailure);
		assert_eq!(ErrorKind::from_status(403), ErrorKind::Forbidden);
		assert_eq!(ErrorKind::from_status(404), ErrorKind::ResourceUnavailable);
		assert_eq!(ErrorKind::from_status(405), ErrorKind::MethodNotAllowed);
		assert_eq!(ErrorKind::from_status(408), ErrorKind::TimedOut);
		assert_eq!(ErrorKind::from_status(500), ErrorKind::Network);
		assert_eq!(ErrorKind::from_status(418), ErrorKind::Network);
	}

	#[test]
	fn error_info_exposes_code_and_message() {
		let info = ErrorInfo::new(ErrorKind::MalformedUrl).with_http_status(0);

		assert_eq!(info.code(), -3);
		assert_eq!(info.message(), "Incorrect URL.");
		assert_eq!(info.to_string(), "Incorrect URL.");
		assert_eq!(ErrorInfo::from(ErrorKind::TimedOut).code(), 408);
	}

	#[test]
	fn store_error_converts_into_crate_error_with_source() {
		let store_error = StoreError::Backend { message: "disk unplugged".into() };
		let error: Error = store_error.clone().into();

		assert!(matches!(error, Error::Storage(_)));
		assert!(error.to_string().contains("disk unplugged"));

		let source = StdError::source(&error)
			.expect("Crate error should expose the original store error as its source.");

		assert_eq!(source.to_string(), store_error.to_string());
	}
}
