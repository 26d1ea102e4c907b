//! Refresher that calls the backend's `/auth/refresh` endpoint.

// crates.io
use serde_json::Map;
// self
use crate::{
	_prelude::*,
	adapter::{self, RequestHeaders},
	auth::{RefreshGrant, Token, TokenState},
	config::ServiceConfig,
	envelope,
	error::ConfigError,
	http::{HttpRequest, Method, TransportClient},
	obs::{self, CallKind, CallOutcome, CallSpan},
	refresh::{RefreshFuture, TokenRefresher},
};

/// Path of the refresh endpoint, relative to the base URL.
pub const REFRESH_PATH: &str = "/auth/refresh";

/// [`TokenRefresher`] issuing `POST {base}/auth/refresh` through the service's transport.
///
/// The request is adapted like any other call; with the access token already evicted the raw
/// refresh token rides in `Authorization`. The exchange never enters the retry path.
pub struct EndpointRefresher<C>
where
	C: ?Sized + TransportClient,
{
	config: Arc<ServiceConfig>,
	transport: Arc<C>,
	headers: Arc<RwLock<RequestHeaders>>,
}
impl<C> EndpointRefresher<C>
where
	C: ?Sized + TransportClient,
{
	/// Creates a refresher sharing the service's configuration, transport, and default headers.
	pub fn new(
		config: Arc<ServiceConfig>,
		transport: Arc<C>,
		headers: Arc<RwLock<RequestHeaders>>,
	) -> Self {
		Self { config, transport, headers }
	}

	async fn exchange(&self, tokens: &TokenState) -> Result<Token> {
		let url = self.config.endpoint_url(REFRESH_PATH).map_err(|_| ConfigError::InvalidBaseUrl {
			url: self.config.base_url.clone(),
		})?;
		let defaults = self.headers.read().clone();
		let request = adapter::adapt(
			HttpRequest::new(Method::Post, url).with_params(Some(Map::new())),
			&defaults,
			tokens,
		);
		let issued_at = OffsetDateTime::now_utc();
		let response = self.transport.send(request).await?;

		if !response.is_success() {
			return Err(Error::Refresh {
				reason: format!("refresh endpoint answered with HTTP {}", response.status),
			});
		}

		let grant = envelope::decode_envelope::<RefreshGrant>(&response.body)
			.map_err(|e| Error::Refresh { reason: e.message().into() })?
			.into_data()
			.ok_or_else(|| Error::Refresh { reason: "refresh response has no body".into() })?;

		grant.into_token(issued_at)
	}
}
impl<C> TokenRefresher for EndpointRefresher<C>
where
	C: ?Sized + TransportClient,
{
	fn refresh<'a>(&'a self, tokens: &'a TokenState) -> RefreshFuture<'a> {
		const KIND: CallKind = CallKind::Refresh;

		let span = CallSpan::new(KIND, "refresh");

		obs::record_call_outcome(KIND, CallOutcome::Attempt);

		Box::pin(span.instrument(async move {
			let result = self.exchange(tokens).await;

			obs::record_call_outcome(KIND, CallOutcome::of(&result));

			result
		}))
	}
}
impl<C> Debug for EndpointRefresher<C>
where
	C: ?Sized + TransportClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("EndpointRefresher").field("base_url", &self.config.base_url).finish()
	}
}
