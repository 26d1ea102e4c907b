//! Token pair and raw cache state.

// self
use crate::{_prelude::*, auth::TokenSecret};

/// Complete access/refresh token pair.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
	/// Access token sent as `Authorization: Bearer <value>`.
	pub access_token: TokenSecret,
	/// Refresh token presented to the refresh endpoint.
	pub refresh_token: TokenSecret,
	/// Absolute expiry of the access token, when the backend reported one.
	pub expiry: Option<OffsetDateTime>,
}
impl Token {
	/// Creates a pair with no known expiry.
	pub fn new(access: impl Into<TokenSecret>, refresh: impl Into<TokenSecret>) -> Self {
		Self { access_token: access.into(), refresh_token: refresh.into(), expiry: None }
	}

	/// Sets an absolute expiry instant.
	pub fn with_expiry(mut self, instant: OffsetDateTime) -> Self {
		self.expiry = Some(instant);

		self
	}

	/// Sets the expiry relative to `issued_at`. Non-positive durations, and lifetimes that
	/// overflow the representable date range, leave the expiry unset.
	pub fn with_expires_in(mut self, issued_at: OffsetDateTime, lifetime: Duration) -> Self {
		if lifetime.is_positive() {
			self.expiry = issued_at.checked_add(lifetime);
		}

		self
	}

	/// Returns `true` if the access token has expired at `instant`.
	pub fn is_expired_at(&self, instant: OffsetDateTime) -> bool {
		self.expiry.is_some_and(|expiry| instant >= expiry)
	}
}

/// Raw contents of the token cache.
///
/// Unlike [`Token`] this may be partial: a 401 evicts the access token while the refresh token
/// stays behind for the refresh call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TokenState {
	/// Cached access token.
	pub access_token: Option<TokenSecret>,
	/// Cached refresh token.
	pub refresh_token: Option<TokenSecret>,
	/// Expiry of the cached access token.
	pub expiry: Option<OffsetDateTime>,
}
impl TokenState {
	/// Returns the complete pair, or `None` when either half is missing or empty.
	pub fn token(&self) -> Option<Token> {
		let access = self.access_token.as_ref().filter(|secret| !secret.is_empty())?;
		let refresh = self.refresh_token.as_ref().filter(|secret| !secret.is_empty())?;

		Some(Token { access_token: access.clone(), refresh_token: refresh.clone(), expiry: self.expiry })
	}

	/// Access token usable at `instant`: present, non-empty, and not past a known expiry.
	pub fn valid_access_token_at(&self, instant: OffsetDateTime) -> Option<&TokenSecret> {
		let access = self.access_token.as_ref().filter(|secret| !secret.is_empty())?;

		match self.expiry {
			Some(expiry) if instant >= expiry => None,
			_ => Some(access),
		}
	}

	/// Non-empty refresh token, if cached.
	pub fn refresh_token(&self) -> Option<&TokenSecret> {
		self.refresh_token.as_ref().filter(|secret| !secret.is_empty())
	}

	/// Returns `true` when neither secret is cached.
	pub fn is_empty(&self) -> bool {
		self.access_token.as_ref().is_none_or(TokenSecret::is_empty) && self.refresh_token().is_none()
	}
}
impl From<Token> for TokenState {
	fn from(token: Token) -> Self {
		Self {
			access_token: Some(token.access_token),
			refresh_token: Some(token.refresh_token),
			expiry: token.expiry,
		}
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn partial_state_is_not_a_token() {
		let state = TokenState { refresh_token: Some("refresh".into()), ..Default::default() };

		assert!(state.token().is_none());
		assert!(!state.is_empty());

		let state = TokenState {
			access_token: Some("".into()),
			refresh_token: Some("refresh".into()),
			expiry: None,
		};

		assert!(state.token().is_none());
		assert!(TokenState::default().is_empty());
	}

	#[test]
	fn expired_access_token_is_not_valid() {
		let now = macros::datetime!(2025-11-10 12:00 UTC);
		let token = Token::new("access", "refresh").with_expires_in(now, Duration::minutes(5));
		let state = TokenState::from(token.clone());

		assert!(state.valid_access_token_at(now).is_some());
		assert!(state.valid_access_token_at(now + Duration::minutes(5)).is_none());
		assert!(token.is_expired_at(now + Duration::minutes(6)));
		assert_eq!(state.token(), Some(token));
	}

	#[test]
	fn non_positive_lifetime_leaves_expiry_unset() {
		let now = macros::datetime!(2025-11-10 12:00 UTC);
		let token = Token::new("access", "refresh").with_expires_in(now, Duration::ZERO);

		assert!(token.expiry.is_none());
	}

	#[test]
	fn out_of_range_lifetime_leaves_expiry_unset() {
		let now = macros::datetime!(2025-11-10 12:00 UTC);
		let token = Token::new("access", "refresh").with_expires_in(now, Duration::MAX);

		assert!(token.expiry.is_none());
	}
}
