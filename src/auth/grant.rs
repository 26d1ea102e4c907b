//! Payload returned by the refresh endpoint.

// self
use crate::{_prelude::*, auth::Token};

/// Body of a successful refresh response.
#[derive(Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RefreshGrant {
	/// Token type reported by the backend, usually `Bearer`.
	pub token_type: Option<String>,
	/// Access token lifetime in seconds.
	pub expires_in: Option<f64>,
	/// Replacement refresh token.
	pub refresh_token: Option<String>,
	/// Replacement access token.
	pub access_token: Option<String>,
}
impl RefreshGrant {
	/// Converts the grant into a token pair issued at `issued_at`.
	///
	/// Both secrets must be present and non-empty; a missing or non-positive lifetime leaves the
	/// expiry unknown.
	pub fn into_token(self, issued_at: OffsetDateTime) -> Result<Token> {
		let access = self.access_token.filter(|v| !v.is_empty()).ok_or_else(|| Error::Refresh {
			reason: "refresh response is missing the access token".into(),
		})?;
		let refresh = self.refresh_token.filter(|v| !v.is_empty()).ok_or_else(|| Error::Refresh {
			reason: "refresh response is missing the refresh token".into(),
		})?;
		let token = Token::new(access, refresh);
		let lifetime = self
			.expires_in
			.filter(|secs| secs.is_finite())
			.and_then(Duration::checked_seconds_f64);

		Ok(match lifetime {
			Some(lifetime) => token.with_expires_in(issued_at, lifetime),
			None => token,
		})
	}
}
impl Debug for RefreshGrant {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("RefreshGrant")
			.field("token_type", &self.token_type)
			.field("expires_in", &self.expires_in)
			.field("refresh_token_set", &self.refresh_token.is_some())
			.field("access_token_set", &self.access_token.is_some())
			.finish()
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn grant_converts_lifetime_into_expiry() {
		let issued = macros::datetime!(2025-11-10 12:00 UTC);
		let grant: RefreshGrant = serde_json::from_str(
			r#"{"token_type":"Bearer","expires_in":3600,"refresh_token":"r2","access_token":"a2"}"#,
		)
		.expect("Grant should deserialize.");
		let token = grant.into_token(issued).expect("Complete grant should convert.");

		assert_eq!(token.access_token.expose(), "a2");
		assert_eq!(token.refresh_token.expose(), "r2");
		assert_eq!(token.expiry, Some(macros::datetime!(2025-11-10 13:00 UTC)));
	}

	#[test]
	fn huge_lifetime_converts_without_an_expiry() {
		let issued = macros::datetime!(2025-11-10 12:00 UTC);
		let grant = RefreshGrant {
			expires_in: Some(1e12),
			refresh_token: Some("r".into()),
			access_token: Some("a".into()),
			..Default::default()
		};
		let token = grant.into_token(issued).expect("Out-of-range lifetime must not fail the grant.");

		assert_eq!(token.access_token.expose(), "a");
		assert!(token.expiry.is_none());
	}

	#[test]
	fn incomplete_grant_is_rejected() {
		let grant = RefreshGrant { access_token: Some("a".into()), ..Default::default() };

		assert!(matches!(
			grant.into_token(OffsetDateTime::UNIX_EPOCH),
			Err(Error::Refresh { .. })
		));
	}
}
