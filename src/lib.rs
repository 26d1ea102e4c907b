//! Typed HTTP client facade for a single backend: bearer-token injection, single-flight token
//! refresh, and replay of every request that failed on an expired credential.

#![deny(clippy::all, missing_docs, unused_crate_dependencies)]

pub mod adapter;
pub mod auth;
pub mod config;
pub mod envelope;
pub mod error;
pub mod http;
pub mod obs;
pub mod refresh;
pub mod retry;
pub mod service;
pub mod store;
#[cfg(all(any(test, feature = "test"), feature = "reqwest"))]
pub mod _preludet {
	//! Convenience re-exports and helpers for integration tests; enabled via `cfg(test)` or the
	//! `test` crate feature.

	pub use crate::_prelude::*;

	// self
	use crate::{
		auth::Token,
		config::ServiceConfig,
		http::ReqwestTransport,
		service::NetworkService,
		store::{MemoryStorage, TokenStorage, TokenStore},
	};

	/// Service type alias used by reqwest-backed integration tests.
	pub type ReqwestTestService = NetworkService<ReqwestTransport>;

	/// Builds a reqwest-backed [`NetworkService`] pointed at `base_url` with an in-memory
	/// durable store. The returned storage handle lets tests inspect mirrored keys.
	pub fn build_reqwest_test_service(base_url: &str) -> (ReqwestTestService, Arc<MemoryStorage>) {
		let storage = Arc::new(MemoryStorage::default());
		let backend: Arc<dyn TokenStorage> = storage.clone();
		let config = ServiceConfig::builder(base_url)
			.timeout(std::time::Duration::from_secs(5))
			.build();
		let transport = ReqwestTransport::from_config(&config)
			.expect("Failed to build reqwest transport for tests.");
		let service =
			NetworkService::with_transport(config, transport, Arc::new(TokenStore::new(backend)));

		(service, storage)
	}

	/// Builds a token pair fixture with no expiry.
	pub fn token_fixture(access: &str, refresh: &str) -> Token {
		Token::new(access, refresh)
	}
}

mod _prelude {
	pub use std::{
		collections::{BTreeMap, VecDeque},
		error::Error as StdError,
		fmt::{Debug, Display, Formatter, Result as FmtResult},
		future::Future,
		path::{Path, PathBuf},
		pin::Pin,
		sync::Arc,
	};

	pub use parking_lot::{Mutex, RwLock};
	#[cfg(feature = "reqwest")]
	pub use reqwest::{Client as ReqwestClient, Error as ReqwestError};
	pub use serde::{Deserialize, Serialize, de::DeserializeOwned};
	pub use thiserror::Error as ThisError;
	pub use time::{Duration, OffsetDateTime};
	pub use url::Url;

	pub use crate::error::{Error, ErrorInfo, ErrorKind, Result};
}

#[cfg(feature = "reqwest")] pub use reqwest;
pub use url;
#[cfg(test)] use color_eyre as _;
