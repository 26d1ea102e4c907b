//! Thread-safe in-memory [`TokenStorage`] implementation for local development and tests.

// self
use crate::{
	_prelude::*,
	store::{StoreFuture, TokenStorage},
};

type EntryMap = Arc<RwLock<BTreeMap<String, String>>>;

/// Storage backend that keeps entries in-process; contents vanish with the process.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage(EntryMap);
impl MemoryStorage {
	/// Seeds or replaces an entry synchronously.
	pub fn insert(&self, key: impl Into<String>, value: impl Into<String>) {
		self.0.write().insert(key.into(), value.into());
	}

	/// Reads an entry synchronously.
	pub fn get(&self, key: &str) -> Option<String> {
		self.0.read().get(key).cloned()
	}

	/// Returns `true` when no entries are stored.
	pub fn is_empty(&self) -> bool {
		self.0.read().is_empty()
	}
}
impl TokenStorage for MemoryStorage {
	fn load<'a>(&'a self, key: &'a str) -> StoreFuture<'a, Option<String>> {
		let value = self.get(key);

		Box::pin(async move { Ok(value) })
	}

	fn save<'a>(&'a self, key: &'a str, value: String) -> StoreFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().insert(key.to_owned(), value);

			Ok(())
		})
	}

	fn remove<'a>(&'a self, key: &'a str) -> StoreFuture<'a, ()> {
		let map = self.0.clone();

		Box::pin(async move {
			map.write().remove(key);

			Ok(())
		})
	}
}
