//! Failure classification deciding whether a call is handed to the refresh coordinator.

// self
use crate::{_prelude::*, http::TransportError};

/// Anything carrying an HTTP status code.
pub trait StatusOutcome {
	/// HTTP status code of the exchange.
	fn status(&self) -> u16;
}

/// Category assigned to a finished exchange.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Classification {
	/// 2xx.
	Success,
	/// 401: the credential expired and a refresh may recover the call.
	AuthExpired,
	/// Connection could not be established.
	ConnectionError,
	/// Request or response timed out.
	TimedOut,
	/// Request was cancelled.
	Cancelled,
	/// Response arrived but could not be read.
	MalformedResponse,
	/// Any other failure, already mapped onto its caller-facing kind.
	OtherError(ErrorKind),
}
impl Classification {
	/// Caller-facing kind for a terminal failure; `None` for [`Classification::Success`].
	///
	/// [`Classification::AuthExpired`] maps to [`ErrorKind::AuthenticationFailure`], which is what
	/// the caller sees when the refresh did not recover the call.
	pub const fn error_kind(self) -> Option<ErrorKind> {
		match self {
			Self::Success => None,
			Self::AuthExpired => Some(ErrorKind::AuthenticationFailure),
			Self::ConnectionError => Some(ErrorKind::Connection),
			Self::TimedOut => Some(ErrorKind::TimedOut),
			Self::Cancelled => Some(ErrorKind::Cancelled),
			Self::MalformedResponse => Some(ErrorKind::InvalidResponse),
			Self::OtherError(kind) => Some(kind),
		}
	}

	/// Returns `true` only for [`Classification::AuthExpired`].
	pub const fn is_auth_expired(self) -> bool {
		matches!(self, Self::AuthExpired)
	}
}

/// Stateless mapping from transport outcomes to [`Classification`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RetryPolicy;
impl RetryPolicy {
	/// Classifies a data or upload exchange.
	pub fn classify<O>(outcome: &Result<O, TransportError>) -> Classification
	where
		O: StatusOutcome,
	{
		match outcome {
			Ok(response) => Self::classify_status(response.status()),
			Err(e) => Self::classify_error(e),
		}
	}

	/// Classifies a download: identical to [`RetryPolicy::classify`] except that any non-2xx
	/// status other than 401 and 404 is an invalid response.
	pub fn classify_download<O>(outcome: &Result<O, TransportError>) -> Classification
	where
		O: StatusOutcome,
	{
		match outcome {
			Ok(response) => match response.status() {
				200..=299 | 401 | 404 => Self::classify_status(response.status()),
				_ => Classification::OtherError(ErrorKind::InvalidResponse),
			},
			Err(e) => Self::classify_error(e),
		}
	}

	/// Classifies an HTTP status code.
	pub const fn classify_status(status: u16) -> Classification {
		match status {
			200..=299 => Classification::Success,
			401 => Classification::AuthExpired,
			408 => Classification::TimedOut,
			_ => Classification::OtherError(ErrorKind::from_status(status)),
		}
	}

	/// Classifies a native transport failure.
	pub fn classify_error(error: &TransportError) -> Classification {
		match error {
			TransportError::Connection { .. } => Classification::ConnectionError,
			TransportError::TimedOut => Classification::TimedOut,
			TransportError::Cancelled => Classification::Cancelled,
			TransportError::Redirect { .. } =>
				Classification::OtherError(ErrorKind::ServiceRelocated),
			TransportError::Body { .. } => Classification::MalformedResponse,
			TransportError::InvalidRequest { .. } =>
				Classification::OtherError(ErrorKind::MalformedUrl),
			TransportError::Encoding { .. } =>
				Classification::OtherError(ErrorKind::MultipartEncoding),
			TransportError::Io(_) | TransportError::Other(_) =>
				Classification::OtherError(ErrorKind::Network),
		}
	}
}

#[cfg(test)]
mod tests {
	// self
	use super::*;

	struct Status(u16);
	impl StatusOutcome for Status {
		fn status(&self) -> u16 {
			self.0
		}
	}

	fn ok(status: u16) -> Result<Status, TransportError> {
		Ok(Status(status))
	}

	#[test]
	fn only_401_is_auth_expired() {
		assert_eq!(RetryPolicy::classify(&ok(204)), Classification::Success);
		assert_eq!(RetryPolicy::classify(&ok(401)), Classification::AuthExpired);

		for status in [200, 302, 400, 403, 404, 405, 408, 500, 503] {
			assert!(!RetryPolicy::classify(&ok(status)).is_auth_expired(), "{status}");
		}
	}

	#[test]
	fn statuses_map_to_caller_kinds() {
		let kind = |status| RetryPolicy::classify(&ok(status)).error_kind();

		assert_eq!(kind(200), None);
		assert_eq!(kind(301), Some(ErrorKind::ServiceRelocated));
		assert_eq!(kind(400), Some(ErrorKind::BadRequest));
		assert_eq!(kind(401), Some(ErrorKind::AuthenticationFailure));
		assert_eq!(kind(403), Some(ErrorKind::Forbidden));
		assert_eq!(kind(404), Some(ErrorKind::ResourceUnavailable));
		assert_eq!(kind(405), Some(ErrorKind::MethodNotAllowed));
		assert_eq!(kind(408), Some(ErrorKind::TimedOut));
		assert_eq!(kind(502), Some(ErrorKind::Network));
	}

	#[test]
	fn transport_errors_map_to_caller_kinds() {
		let kind = |error| RetryPolicy::classify::<Status>(&Err(error)).error_kind();

		assert_eq!(
			kind(TransportError::Connection { source: "refused".into() }),
			Some(ErrorKind::Connection)
		);
		assert_eq!(kind(TransportError::TimedOut), Some(ErrorKind::TimedOut));
		assert_eq!(kind(TransportError::Cancelled), Some(ErrorKind::Cancelled));
		assert_eq!(
			kind(TransportError::Body { source: "truncated".into() }),
			Some(ErrorKind::InvalidResponse)
		);
		assert_eq!(
			kind(TransportError::Encoding { message: "missing file".into() }),
			Some(ErrorKind::MultipartEncoding)
		);
		assert_eq!(
			kind(TransportError::Redirect { source: "too many redirects".into() }),
			Some(ErrorKind::ServiceRelocated)
		);
		assert_eq!(kind(TransportError::Other("boom".into())), Some(ErrorKind::Network));
	}

	#[test]
	fn downloads_treat_unexpected_statuses_as_invalid() {
		let kind = |status| RetryPolicy::classify_download(&ok(status));

		assert_eq!(kind(200), Classification::Success);
		assert_eq!(kind(401), Classification::AuthExpired);
		assert_eq!(kind(404), Classification::OtherError(ErrorKind::ResourceUnavailable));
		assert_eq!(kind(403), Classification::OtherError(ErrorKind::InvalidResponse));
		assert_eq!(kind(500), Classification::OtherError(ErrorKind::InvalidResponse));
	}
}
