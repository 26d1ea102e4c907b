//! Header adaptation applied to every outgoing request.
//!
//! Order matters: `Accept: application/json` first, then the caller's default headers (which may
//! overwrite it), then `Authorization` derived from the token cache.

// self
use crate::{_prelude::*, auth::TokenState, http::HttpRequest};

/// Lowercase `Accept` header name.
pub const ACCEPT: &str = "accept";
/// Lowercase `Authorization` header name.
pub const AUTHORIZATION: &str = "authorization";

/// Case-insensitive header map; names are stored lowercase.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct RequestHeaders(BTreeMap<String, String>);
impl RequestHeaders {
	/// Sets `name`, replacing any previous value.
	pub fn insert(&mut self, name: impl AsRef<str>, value: impl Into<String>) {
		self.0.insert(name.as_ref().to_ascii_lowercase(), value.into());
	}

	/// Sets `name` only if it is not present yet. Returns `true` when the value was stored.
	pub fn insert_if_absent(&mut self, name: impl AsRef<str>, value: impl Into<String>) -> bool {
		let key = name.as_ref().to_ascii_lowercase();

		if self.0.contains_key(&key) {
			return false;
		}

		self.0.insert(key, value.into());

		true
	}

	/// Returns the value for `name`, ignoring case.
	pub fn get(&self, name: &str) -> Option<&str> {
		self.0.get(&name.to_ascii_lowercase()).map(String::as_str)
	}

	/// Iterates `(lowercase name, value)` pairs.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
		self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
	}

	/// Number of headers.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns `true` when no headers are set.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}
impl Debug for RequestHeaders {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_list().entries(self.0.keys()).finish()
	}
}
impl<K, V> FromIterator<(K, V)> for RequestHeaders
where
	K: AsRef<str>,
	V: Into<String>,
{
	fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
		let mut headers = Self::default();

		for (name, value) in iter {
			headers.insert(name, value);
		}

		headers
	}
}

/// Returns `request` with its headers adapted via [`adapt_headers`].
pub fn adapt(mut request: HttpRequest, defaults: &RequestHeaders, tokens: &TokenState) -> HttpRequest {
	adapt_headers(&mut request.headers, defaults, tokens);

	request
}

/// Applies the default `Accept`, the caller's defaults, and exactly one authorization mode:
/// `Bearer <access>` for a usable access token, the raw refresh token when only that is cached,
/// or nothing at all.
pub fn adapt_headers(headers: &mut RequestHeaders, defaults: &RequestHeaders, tokens: &TokenState) {
	headers.insert(ACCEPT, "application/json");

	for (name, value) in defaults.iter() {
		headers.insert(name, value);
	}

	if let Some(access) = tokens.valid_access_token_at(OffsetDateTime::now_utc()) {
		headers.insert(AUTHORIZATION, format!("Bearer {}", access.expose()));
	} else if let Some(refresh) = tokens.refresh_token() {
		headers.insert(AUTHORIZATION, refresh.expose());
	}
}
