//! Token cache backed by a durable key-value store.
//!
//! [`TokenStore`] keeps the process-wide token pair in memory and treats that cache as the
//! source of truth. The first read hydrates it from a [`TokenStorage`] backend; every
//! mutation updates the cache first and is then mirrored to the backend under the keys
//! [`ACCESS_TOKEN_KEY`], [`REFRESH_TOKEN_KEY`], and [`TOKEN_EXPIRY_KEY`].

pub mod file;
pub mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

// crates.io
use async_lock::{Mutex as AsyncMutex, OnceCell};
use time::format_description::well_known::Rfc3339;
// self
use crate::{
	_prelude::*,
	auth::{Token, TokenSecret, TokenState},
	obs,
};

/// Storage key holding the access token.
pub const ACCESS_TOKEN_KEY: &str = "AUTHENTICATION_TOKEN";
/// Storage key holding the refresh token.
pub const REFRESH_TOKEN_KEY: &str = "AUTHENTICATION_REFRESH_TOKEN";
/// Storage key holding the access token expiry as RFC 3339.
pub const TOKEN_EXPIRY_KEY: &str = "AUTHENTICATION_TOKEN_EXPIRY";

/// Boxed future returned by [`TokenStorage`] operations.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StoreError>> + 'a + Send>>;

/// Durable key-value backend used to persist tokens across process restarts.
pub trait TokenStorage
where
	Self: Send + Sync,
{
	/// Reads the value stored under `key`.
	fn load<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>>;

	/// Writes or replaces the value stored under `key`.
	fn save<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()>;

	/// Removes `key`; removing a missing key succeeds.
	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()>;
}

/// Error type produced by [`TokenStorage`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum StoreError {
	/// Serialization failures surfaced by the backend.
	#[error("Serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
	/// Backend-level failure for the storage engine.
	#[error("Backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
}

#[derive(Debug, Default)]
struct Cache {
	state: TokenState,
	// Set by a full replacement so a late hydration never overwrites newer state.
	replaced: bool,
	// Set by an access eviction; a late hydration keeps the persisted refresh token only.
	access_evicted: bool,
}

/// Process-wide token cache mirrored to durable storage.
pub struct TokenStore {
	storage: Arc<dyn TokenStorage>,
	cache: RwLock<Cache>,
	hydrated: OnceCell<()>,
	persist_lock: AsyncMutex<()>,
}
impl TokenStore {
	/// Creates a store over `storage`. Nothing is read until the first access.
	pub fn new(storage: Arc<dyn TokenStorage>) -> Self {
		Self {
			storage,
			cache: Default::default(),
			hydrated: OnceCell::new(),
			persist_lock: AsyncMutex::new(()),
		}
	}

	/// Creates a store backed by a fresh [`MemoryStorage`].
	pub fn in_memory() -> Self {
		Self::new(Arc::new(MemoryStorage::default()))
	}

	/// Loads the persisted tokens into the cache once. Later calls are no-ops.
	///
	/// A failed load leaves the store un-hydrated so the next access tries again.
	pub async fn try_hydrate(&self) -> Result<(), StoreError> {
		self.hydrated
			.get_or_try_init(|| async {
				let access = self.storage.load(ACCESS_TOKEN_KEY).await?;
				let refresh = self.storage.load(REFRESH_TOKEN_KEY).await?;
				let expiry = self.storage.load(TOKEN_EXPIRY_KEY).await?;
				let state = TokenState {
					access_token: access.filter(|v| !v.is_empty()).map(TokenSecret::new),
					refresh_token: refresh.filter(|v| !v.is_empty()).map(TokenSecret::new),
					expiry: expiry.as_deref().and_then(parse_expiry),
				};
				let mut cache = self.cache.write();

				if !cache.replaced {
					cache.state = state;

					if cache.access_evicted {
						cache.state.access_token = None;
						cache.state.expiry = None;
					}
				}

				Ok(())
			})
			.await
			.map(|_| ())
	}

	/// Current cache contents, hydrating first. Hydration failures are logged and the
	/// in-memory state is returned as-is.
	pub async fn state(&self) -> TokenState {
		if let Err(e) = self.try_hydrate().await {
			obs::emit_storage_failure("hydrate", &e);
		}

		self.cached()
	}

	/// Complete token pair, if both halves are cached.
	pub async fn get(&self) -> Option<Token> {
		self.state().await.token()
	}

	/// Cache contents without touching durable storage.
	pub fn cached(&self) -> TokenState {
		self.cache.read().state.clone()
	}

	/// Replaces the cached pair and mirrors it to storage.
	pub async fn set(&self, token: Token) -> Result<(), StoreError> {
		self.replace(TokenState::from(token));
		self.persist().await
	}

	/// Drops the access token (and its expiry) but keeps the refresh token.
	pub async fn clear_access(&self) -> Result<(), StoreError> {
		self.try_hydrate().await?;
		self.evict_access();
		self.persist().await
	}

	/// Drops both tokens.
	pub async fn clear_all(&self) -> Result<(), StoreError> {
		self.replace(TokenState::default());
		self.persist().await
	}

	/// Cache half of [`TokenStore::clear_access`]; safe to call while holding a sync lock.
	///
	/// Before hydration the eviction is remembered and applied to the loaded state, so the
	/// persisted refresh token survives.
	pub(crate) fn evict_access(&self) {
		let mut cache = self.cache.write();

		cache.state.access_token = None;
		cache.state.expiry = None;
		cache.access_evicted = true;
	}

	/// Replaces the cache without touching storage; safe to call while holding a sync lock.
	pub(crate) fn replace(&self, state: TokenState) {
		let mut cache = self.cache.write();

		cache.state = state;
		cache.replaced = true;
	}

	/// Writes the current cache contents to storage, hydrating first.
	///
	/// Writes are serialized and always copy the latest snapshot, so concurrent mirrors cannot
	/// leave storage behind the cache. Nothing is written while hydration fails.
	pub(crate) async fn persist(&self) -> Result<(), StoreError> {
		self.try_hydrate().await?;

		let _guard = self.persist_lock.lock().await;
		let state = self.cached();

		self.write_key(ACCESS_TOKEN_KEY, state.access_token.map(|s| s.expose().to_owned())).await?;
		self.write_key(REFRESH_TOKEN_KEY, state.refresh_token.map(|s| s.expose().to_owned()))
			.await?;
		self.write_key(TOKEN_EXPIRY_KEY, state.expiry.and_then(|e| e.format(&Rfc3339).ok())).await
	}

	async fn write_key(&self, key: &'static str, value: Option<String>) -> Result<(), StoreError> {
		match value {
			Some(value) if !value.is_empty() => self.storage.save(key, value).await,
			_ => self.storage.remove(key).await,
		}
	}
}
impl Debug for TokenStore {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let cache = self.cache.read();

		f.debug_struct("TokenStore")
			.field("access_token_set", &cache.state.access_token.is_some())
			.field("refresh_token_set", &cache.state.refresh_token.is_some())
			.field("hydrated", &self.hydrated.is_initialized())
			.finish()
	}
}

fn parse_expiry(raw: &str) -> Option<OffsetDateTime> {
	OffsetDateTime::parse(raw, &Rfc3339).ok()
}
