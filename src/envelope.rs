//! Wire envelope every backend response is wrapped in:
//! `{"status": {"message", "code", "responseTimeStamp"}, "body": T}`.

// crates.io
use serde_json::{Map, Value};
// self
use crate::{_prelude::*, obs};

/// Server-side status block describing the outcome of a request.
///
/// `code` is backend-specific and need not match the HTTP status.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseStatus {
	/// Human-readable description of `code`.
	pub message: Option<String>,
	/// Backend status code.
	pub code: Option<String>,
	/// Server timestamp taken when the request finished processing.
	#[serde(rename = "responseTimeStamp")]
	pub response_time_stamp: Option<String>,
}
impl ResponseStatus {
	/// Reads the status block leniently: string fields accept numbers and booleans, anything
	/// else is treated as absent.
	pub fn from_object(object: &Map<String, Value>) -> Self {
		let field = |key: &str| match object.get(key) {
			Some(Value::String(s)) => Some(s.clone()),
			Some(v @ (Value::Number(_) | Value::Bool(_))) => Some(v.to_string()),
			_ => None,
		};

		Self {
			message: field("message"),
			code: field("code"),
			response_time_stamp: field("responseTimeStamp"),
		}
	}
}

/// Decoded response: either part may be missing, but not both.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResponseEnvelope<T> {
	/// Server status block.
	pub status: Option<ResponseStatus>,
	/// Typed payload carried under the `body` key.
	#[serde(rename = "body")]
	pub data: Option<T>,
}
impl<T> ResponseEnvelope<T> {
	/// Consumes the envelope, returning the payload.
	pub fn into_data(self) -> Option<T> {
		self.data
	}
}

/// Decodes `bytes` into an envelope carrying `T`.
///
/// Non-object JSON, an object with neither `status` nor `body`, and a `body` that does not match
/// `T` all yield [`ErrorKind::InvalidResponse`].
pub fn decode_envelope<T>(bytes: &[u8]) -> Result<ResponseEnvelope<T>, ErrorInfo>
where
	T: DeserializeOwned,
{
	let invalid = || ErrorInfo::new(ErrorKind::InvalidResponse);
	let Value::Object(mut object) = serde_json::from_slice(bytes).map_err(|_| invalid())? else {
		return Err(invalid());
	};
	let status = match object.get("status") {
		Some(Value::Object(status)) => Some(ResponseStatus::from_object(status)),
		_ => None,
	};
	let data = match object.remove("body") {
		None | Some(Value::Null) => None,
		Some(body) => {
			let decoded = serde_path_to_error::deserialize::<_, T>(body).map_err(|e| {
				obs::emit_decode_failure(&e.path().to_string(), &e.inner().to_string());

				invalid()
			})?;

			Some(decoded)
		},
	};

	if status.is_none() && data.is_none() {
		return Err(invalid());
	}

	Ok(ResponseEnvelope { status, data })
}

/// Extracts the status block from an error response body, if it is an envelope.
pub fn decode_status(bytes: &[u8]) -> Option<ResponseStatus> {
	match serde_json::from_slice(bytes).ok()? {
		Value::Object(object) => match object.get("status") {
			Some(Value::Object(status)) => Some(ResponseStatus::from_object(status)),
			_ => None,
		},
		_ => None,
	}
}
