//! Caller-facing facade: typed endpoints, calls, uploads, and downloads against one backend.
//!
//! Every call runs through the same pipeline: resolve the URL (a malformed base URL fails before
//! any I/O, inside `call` itself), adapt headers from the token cache, dispatch, and classify.
//! A 401 parks the call behind the shared [`RefreshCoordinator`]; after a successful refresh the
//! call is replayed once with the new bearer token, and that replay's result is final.

pub mod call;
pub mod transfer;

mod pipeline;

pub use call::{CallHandle, CallPhase, Callback};
pub use transfer::*;

// crates.io
use serde_json::{Map, Value};
use tokio::sync::oneshot;
// self
use crate::{
	_prelude::*,
	adapter::RequestHeaders,
	config::ServiceConfig,
	envelope::{self, ResponseEnvelope},
	http::{Method, RawResponse, TransportClient},
	obs::CallKind,
	refresh::{EndpointRefresher, RefreshCoordinator, RefreshMetrics},
	service::{
		call::{CallControl, CallbackSlot},
		pipeline::DataExchange,
	},
	store::TokenStore,
};
#[cfg(feature = "reqwest")] use crate::{error::ConfigError, http::ReqwestTransport, store::TokenStorage};

/// Decoder turning a 2xx body into an envelope.
pub type Decoder<T> = fn(&[u8]) -> std::result::Result<ResponseEnvelope<T>, ErrorInfo>;

/// Result handed to data and upload callbacks.
pub type CallResult<T> = std::result::Result<ResponseEnvelope<T>, ErrorInfo>;

#[cfg(feature = "reqwest")]
/// Service specialized for the crate's default reqwest transport.
pub type ReqwestNetworkService = NetworkService<ReqwestTransport>;

/// Typed description of one backend endpoint.
pub struct Endpoint<T> {
	path: String,
	method: Method,
	decoder: Decoder<T>,
}
impl<T> Endpoint<T>
where
	T: DeserializeOwned,
{
	/// Endpoint decoding its body as JSON into `T`.
	pub fn new(path: impl Into<String>, method: Method) -> Self {
		Self::with_decoder(path, method, envelope::decode_envelope::<T>)
	}

	/// GET endpoint.
	pub fn get(path: impl Into<String>) -> Self {
		Self::new(path, Method::Get)
	}

	/// POST endpoint.
	pub fn post(path: impl Into<String>) -> Self {
		Self::new(path, Method::Post)
	}
}
impl<T> Endpoint<T> {
	/// Endpoint with a custom decoder.
	pub fn with_decoder(path: impl Into<String>, method: Method, decoder: Decoder<T>) -> Self {
		Self { path: path.into(), method, decoder }
	}

	/// Path appended to the base URL.
	pub fn path(&self) -> &str {
		&self.path
	}

	/// HTTP method.
	pub fn method(&self) -> Method {
		self.method
	}

	/// Decodes a 2xx body.
	pub fn decode(&self, body: &[u8]) -> CallResult<T> {
		(self.decoder)(body)
	}
}
impl<T> Clone for Endpoint<T> {
	fn clone(&self) -> Self {
		Self { path: self.path.clone(), method: self.method, decoder: self.decoder }
	}
}
impl<T> Debug for Endpoint<T> {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("Endpoint").field("path", &self.path).field("method", &self.method).finish()
	}
}

/// HTTP client facade for a single backend.
///
/// Clones share the transport, token store, default headers, and refresh coordinator, so every
/// clone takes part in the same refresh waves.
pub struct NetworkService<C>
where
	C: ?Sized + TransportClient,
{
	config: Arc<ServiceConfig>,
	transport: Arc<C>,
	store: Arc<TokenStore>,
	headers: Arc<RwLock<RequestHeaders>>,
	coordinator: Arc<RefreshCoordinator>,
}
impl<C> NetworkService<C>
where
	C: ?Sized + TransportClient,
{
	/// Creates a service over a caller-provided transport. Token refreshes go through
	/// [`EndpointRefresher`] on the same transport.
	pub fn with_transport(
		config: ServiceConfig,
		transport: impl Into<Arc<C>>,
		store: Arc<TokenStore>,
	) -> Self {
		let config = Arc::new(config);
		let transport = transport.into();
		let headers = Arc::new(RwLock::new(RequestHeaders::default()));
		let refresher = EndpointRefresher::new(config.clone(), transport.clone(), headers.clone());
		let coordinator = Arc::new(RefreshCoordinator::new(store.clone(), Arc::new(refresher)));

		Self { config, transport, store, headers, coordinator }
	}

	/// Creates a service with an explicit coordinator, e.g. one built around a custom
	/// [`TokenRefresher`](crate::refresh::TokenRefresher).
	pub fn with_coordinator(
		config: ServiceConfig,
		transport: impl Into<Arc<C>>,
		store: Arc<TokenStore>,
		coordinator: Arc<RefreshCoordinator>,
	) -> Self {
		Self {
			config: Arc::new(config),
			transport: transport.into(),
			store,
			headers: Default::default(),
			coordinator,
		}
	}

	/// Issues a typed call and returns immediately.
	///
	/// `callback` runs exactly once. A malformed base URL is reported as
	/// [`ErrorKind::MalformedUrl`] before this method returns; everything else is delivered from a
	/// tokio task. Parameters are sent as a query string for GET and as a JSON body for POST.
	pub fn call<T, F>(
		&self,
		endpoint: &Endpoint<T>,
		params: Option<Map<String, Value>>,
		callback: F,
	) -> CallHandle
	where
		T: 'static + Send,
		F: 'static + Send + FnOnce(CallResult<T>),
	{
		let slot = Arc::new(CallbackSlot::new(Box::new(callback) as Callback<ResponseEnvelope<T>>));
		let control = CallControl::new(CallKind::Data, slot.clone());
		let handle = CallHandle::new(control.clone());
		let url = match self.config.endpoint_url(endpoint.path()) {
			Ok(url) => url,
			Err(kind) => {
				Self::fail_now(&control, &slot, kind);

				return handle;
			},
		};
		let decoder = endpoint.decoder;

		self.spawn_exchange(
			DataExchange { method: endpoint.method(), url, params },
			control,
			slot,
			move |response: RawResponse| decoder(&response.body),
		);

		handle
	}

	/// Future form of [`NetworkService::call`]. Dropping the future cancels the call.
	pub async fn execute<T>(
		&self,
		endpoint: &Endpoint<T>,
		params: Option<Map<String, Value>>,
	) -> CallResult<T>
	where
		T: 'static + Send,
	{
		let (tx, rx) = oneshot::channel();
		let handle = self.call(endpoint, params, move |result| {
			let _ = tx.send(result);
		});
		let _cancel_on_drop = CancelOnDrop(handle);

		rx.await.unwrap_or_else(|_| Err(ErrorInfo::new(ErrorKind::Cancelled)))
	}

	/// Adds a default header sent with every request. The first value set for a name wins;
	/// later calls for the same name (ignoring case) are ignored and return `false`.
	pub fn add_header(&self, name: impl AsRef<str>, value: impl Into<String>) -> bool {
		self.headers.write().insert_if_absent(name, value)
	}

	/// Snapshot of the default headers.
	pub fn headers(&self) -> RequestHeaders {
		self.headers.read().clone()
	}

	/// Shared token store.
	pub fn tokens(&self) -> &Arc<TokenStore> {
		&self.store
	}

	/// Service configuration.
	pub fn config(&self) -> &ServiceConfig {
		&self.config
	}

	/// Refresh coordinator shared by every clone of this service.
	pub fn coordinator(&self) -> &Arc<RefreshCoordinator> {
		&self.coordinator
	}

	/// Refresh wave counters.
	pub fn refresh_metrics(&self) -> Arc<RefreshMetrics> {
		self.coordinator.metrics()
	}

	/// Resolves every call parked behind a refresh with
	/// [`ErrorKind::AuthenticationFailure`]. Returns how many were released.
	pub fn shutdown(&self) -> usize {
		self.coordinator.flush()
	}
}
#[cfg(feature = "reqwest")]
impl NetworkService<ReqwestTransport> {
	/// Creates a reqwest-backed service whose tokens persist in `storage`.
	pub fn new(
		config: ServiceConfig,
		storage: Arc<dyn TokenStorage>,
	) -> std::result::Result<Self, ConfigError> {
		let transport = ReqwestTransport::from_config(&config)?;

		Ok(Self::with_transport(config, transport, Arc::new(TokenStore::new(storage))))
	}
}
impl<C> Clone for NetworkService<C>
where
	C: ?Sized + TransportClient,
{
	fn clone(&self) -> Self {
		Self {
			config: self.config.clone(),
			transport: self.transport.clone(),
			store: self.store.clone(),
			headers: self.headers.clone(),
			coordinator: self.coordinator.clone(),
		}
	}
}
impl<C> Debug for NetworkService<C>
where
	C: ?Sized + TransportClient,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("NetworkService")
			.field("base_url", &self.config.base_url)
			.field("session_kind", &self.config.session_kind)
			.field("headers", &*self.headers.read())
			.field("coordinator", &self.coordinator)
			.finish()
	}
}

struct CancelOnDrop(CallHandle);
impl Drop for CancelOnDrop {
	fn drop(&mut self) {
		self.0.cancel();
	}
}
