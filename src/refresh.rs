//! Single-flight token refresh shared by every in-flight call.
//!
//! A call that fails with an expired credential hands a resume continuation to
//! [`RefreshCoordinator::handle_failure`]. The first such failure starts a refresh wave; every
//! failure that arrives while the wave runs joins it. When the wave finishes, all of its members
//! are resumed with the same outcome, each exactly once. A failure that arrives after the wave
//! drained its queue starts a new wave.

mod endpoint;
mod metrics;

pub use endpoint::*;
pub use metrics::RefreshMetrics;

// crates.io
use tokio::{runtime::Handle, sync::oneshot};
// self
use crate::{
	_prelude::*,
	auth::{Token, TokenState},
	obs,
	retry::Classification,
	store::TokenStore,
};

/// Boxed future returned by [`TokenRefresher::refresh`].
pub type RefreshFuture<'a> = Pin<Box<dyn Future<Output = Result<Token>> + 'a + Send>>;

type Resume = Box<dyn FnOnce(bool) + Send>;

/// Performs the refresh exchange for a wave.
pub trait TokenRefresher
where
	Self: 'static + Send + Sync,
{
	/// Exchanges the refresh token in `tokens` for a new pair.
	fn refresh<'a>(&'a self, tokens: &'a TokenState) -> RefreshFuture<'a>;
}

/// One suspended call waiting for a refresh wave.
///
/// Dropping an unresolved retry resolves it with `false`, so a continuation can never be lost.
pub struct PendingRetry {
	resume: Option<Resume>,
}
impl PendingRetry {
	/// Wraps a resume continuation.
	pub fn new(resume: impl 'static + FnOnce(bool) + Send) -> Self {
		Self { resume: Some(Box::new(resume)) }
	}

	/// Invokes the continuation with the wave's outcome.
	pub fn resolve(mut self, success: bool) {
		if let Some(resume) = self.resume.take() {
			resume(success);
		}
	}
}
impl Drop for PendingRetry {
	fn drop(&mut self) {
		if let Some(resume) = self.resume.take() {
			resume(false);
		}
	}
}
impl Debug for PendingRetry {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("PendingRetry").field("resolved", &self.resume.is_none()).finish()
	}
}

#[derive(Debug, Default)]
struct RefreshState {
	in_progress: bool,
	pending: VecDeque<PendingRetry>,
}

struct Shared {
	state: Mutex<RefreshState>,
	store: Arc<TokenStore>,
	refresher: Arc<dyn TokenRefresher>,
	metrics: Arc<RefreshMetrics>,
}
impl Shared {
	// Applies `update` to the cache, takes the queue, and ends the wave in one critical section.
	fn drain(&self, update: impl FnOnce(&TokenStore)) -> VecDeque<PendingRetry> {
		let mut state = self.state.lock();

		update(&self.store);
		state.in_progress = false;

		std::mem::take(&mut state.pending)
	}

	async fn persist(&self, operation: &'static str) {
		if let Err(e) = self.store.persist().await {
			obs::emit_storage_failure(operation, &e);
		}
	}
}

// Drains the queue with `false` if the wave task is torn down before it finishes.
struct WaveGuard {
	shared: Option<Arc<Shared>>,
}
impl WaveGuard {
	fn disarm(&mut self) {
		self.shared = None;
	}
}
impl Drop for WaveGuard {
	fn drop(&mut self) {
		if let Some(shared) = self.shared.take() {
			drop(shared.drain(|_| {}));
		}
	}
}

/// Serializes token refreshes across every call of a service.
pub struct RefreshCoordinator {
	shared: Arc<Shared>,
}
impl RefreshCoordinator {
	/// Creates a coordinator refreshing tokens held by `store` through `refresher`.
	pub fn new(store: Arc<TokenStore>, refresher: Arc<dyn TokenRefresher>) -> Self {
		Self {
			shared: Arc::new(Shared {
				state: Default::default(),
				store,
				refresher,
				metrics: Default::default(),
			}),
		}
	}

	/// Routes a failed call.
	///
	/// Anything but [`Classification::AuthExpired`] resumes with `false` immediately. An expired
	/// credential evicts the cached access token, queues `resume`, and starts a wave unless one is
	/// already running. Must be called within a tokio runtime for the wave to run; otherwise the
	/// queue is resolved with `false`.
	pub fn handle_failure(
		&self,
		classification: Classification,
		resume: impl 'static + FnOnce(bool) + Send,
	) {
		if !classification.is_auth_expired() {
			resume(false);

			return;
		}

		let start_wave = {
			let mut state = self.shared.state.lock();

			self.shared.store.evict_access();
			state.pending.push_back(PendingRetry::new(resume));

			!std::mem::replace(&mut state.in_progress, true)
		};

		if !start_wave {
			return;
		}

		match Handle::try_current() {
			Ok(handle) => {
				handle.spawn(run_wave(self.shared.clone()));
			},
			Err(_) => drop(self.shared.drain(|_| {})),
		}
	}

	/// Future form of [`RefreshCoordinator::handle_failure`]; registration happens immediately,
	/// before the returned future is polled.
	pub fn await_resume(
		&self,
		classification: Classification,
	) -> impl Future<Output = bool> + Send + 'static {
		let (tx, rx) = oneshot::channel();

		self.handle_failure(classification, move |success| {
			let _ = tx.send(success);
		});

		async move { rx.await.unwrap_or(false) }
	}

	/// Resolves every queued retry with `false`. Returns how many were resolved.
	///
	/// A running wave still finishes and updates the store.
	pub fn flush(&self) -> usize {
		let pending = std::mem::take(&mut self.shared.state.lock().pending);
		let count = pending.len();

		for retry in pending {
			retry.resolve(false);
		}

		count
	}

	/// Returns `true` while a wave is running.
	pub fn is_refreshing(&self) -> bool {
		self.shared.state.lock().in_progress
	}

	/// Number of calls waiting for the current wave.
	pub fn pending_len(&self) -> usize {
		self.shared.state.lock().pending.len()
	}

	/// Wave counters.
	pub fn metrics(&self) -> Arc<RefreshMetrics> {
		self.shared.metrics.clone()
	}
}
impl Drop for RefreshCoordinator {
	fn drop(&mut self) {
		self.flush();
	}
}
impl Debug for RefreshCoordinator {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		let state = self.shared.state.lock();

		f.debug_struct("RefreshCoordinator")
			.field("in_progress", &state.in_progress)
			.field("pending", &state.pending.len())
			.finish()
	}
}

async fn run_wave(shared: Arc<Shared>) {
	let mut guard = WaveGuard { shared: Some(shared.clone()) };

	shared.metrics.record_wave();
	obs::emit_refresh_wave_start();
	shared.persist("evict_access").await;

	let tokens = shared.store.cached();
	let outcome = match tokens.refresh_token() {
		Some(_) => shared.refresher.refresh(&tokens).await,
		None => Err(Error::MissingRefreshToken),
	};

	if let Err(e) = &outcome {
		obs::emit_refresh_failure(e);
	}

	let success = outcome.is_ok();
	let pending = shared.drain(|store| match outcome {
		Ok(token) => store.replace(TokenState::from(token)),
		Err(_) => store.replace(TokenState::default()),
	});

	guard.disarm();
	shared.persist(if success { "set" } else { "clear_all" }).await;
	shared.metrics.record_outcome(success, pending.len());
	obs::record_refresh_wave(success);
	obs::emit_refresh_wave_finish(success, pending.len());

	for retry in pending {
		retry.resolve(success);
	}
}

#[cfg(test)]
mod tests {
	// std
	use std::sync::atomic::{AtomicUsize, Ordering};
	// crates.io
	use tokio::sync::Notify;
	// self
	use super::*;
	use crate::store::{ACCESS_TOKEN_KEY, MemoryStorage, REFRESH_TOKEN_KEY};

	struct GatedRefresher {
		calls: AtomicUsize,
		release: Notify,
		succeed: bool,
		presented: Mutex<Vec<String>>,
	}
	impl GatedRefresher {
		fn new(succeed: bool) -> Arc<Self> {
			Arc::new(Self {
				calls: AtomicUsize::new(0),
				release: Notify::new(),
				succeed,
				presented: Mutex::new(Vec::new()),
			})
		}
	}
	impl TokenRefresher for GatedRefresher {
		fn refresh<'a>(&'a self, tokens: &'a TokenState) -> RefreshFuture<'a> {
			Box::pin(async move {
				let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;

				assert!(tokens.access_token.is_none(), "Access token must be evicted first.");

				self.presented
					.lock()
					.extend(tokens.refresh_token().map(|secret| secret.expose().to_owned()));

				self.release.notified().await;

				if self.succeed {
					Ok(Token::new(format!("fresh-{call}"), format!("refresh-{call}")))
				} else {
					Err(Error::Refresh { reason: "rejected".into() })
				}
			})
		}
	}

	async fn seeded_store() -> (Arc<TokenStore>, Arc<MemoryStorage>) {
		let storage = Arc::new(MemoryStorage::default());
		let store = Arc::new(TokenStore::new(storage.clone()));

		store
			.set(Token::new("stale", "refresh-0"))
			.await
			.expect("Seeding the store should succeed.");

		(store, storage)
	}

	#[tokio::test]
	async fn concurrent_failures_share_one_refresh() {
		let (store, storage) = seeded_store().await;
		let refresher = GatedRefresher::new(true);
		let coordinator = RefreshCoordinator::new(store.clone(), refresher.clone());
		let waiters = (0..5)
			.map(|_| coordinator.await_resume(Classification::AuthExpired))
			.collect::<Vec<_>>();

		assert!(coordinator.is_refreshing());
		assert_eq!(coordinator.pending_len(), 5);
		assert!(store.cached().access_token.is_none());

		refresher.release.notify_one();

		for waiter in waiters {
			assert!(waiter.await, "Every member of a successful wave resumes with true.");
		}

		assert_eq!(refresher.calls.load(Ordering::SeqCst), 1);
		assert!(!coordinator.is_refreshing());
		assert_eq!(store.cached().token(), Some(Token::new("fresh-1", "refresh-1")));
		assert_eq!(storage.get(ACCESS_TOKEN_KEY).as_deref(), Some("fresh-1"));

		let metrics = coordinator.metrics();

		assert_eq!((metrics.waves(), metrics.successes(), metrics.resumed()), (1, 1, 5));
	}

	#[tokio::test]
	async fn failed_refresh_clears_the_store_for_everyone() {
		let (store, storage) = seeded_store().await;
		let refresher = GatedRefresher::new(false);
		let coordinator = RefreshCoordinator::new(store.clone(), refresher.clone());
		let first = coordinator.await_resume(Classification::AuthExpired);
		let second = coordinator.await_resume(Classification::AuthExpired);

		refresher.release.notify_one();

		assert!(!first.await);
		assert!(!second.await);
		assert!(store.cached().is_empty());
		assert_eq!(storage.get(REFRESH_TOKEN_KEY), None);
		assert_eq!(coordinator.metrics().failures(), 1);
	}

	#[tokio::test]
	async fn arrivals_after_a_wave_start_a_new_one() {
		let (store, _) = seeded_store().await;
		let refresher = GatedRefresher::new(true);
		let coordinator = RefreshCoordinator::new(store.clone(), refresher.clone());

		refresher.release.notify_one();

		assert!(coordinator.await_resume(Classification::AuthExpired).await);

		refresher.release.notify_one();

		assert!(coordinator.await_resume(Classification::AuthExpired).await);
		assert_eq!(refresher.calls.load(Ordering::SeqCst), 2);
		assert_eq!(store.cached().token(), Some(Token::new("fresh-2", "refresh-2")));
	}

	#[tokio::test]
	async fn other_failures_resume_immediately_without_a_wave() {
		let (store, _) = seeded_store().await;
		let refresher = GatedRefresher::new(true);
		let coordinator = RefreshCoordinator::new(store.clone(), refresher.clone());

		assert!(!coordinator.await_resume(Classification::TimedOut).await);
		assert!(!coordinator.is_refreshing());
		assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
		assert_eq!(store.cached().token(), Some(Token::new("stale", "refresh-0")));
	}

	#[tokio::test]
	async fn unhydrated_store_refreshes_with_the_persisted_refresh_token() {
		let storage = Arc::new(MemoryStorage::default());

		storage.insert(ACCESS_TOKEN_KEY, "stale");
		storage.insert(REFRESH_TOKEN_KEY, "persisted-refresh");

		let store = Arc::new(TokenStore::new(storage.clone()));
		let refresher = GatedRefresher::new(true);
		let coordinator = RefreshCoordinator::new(store.clone(), refresher.clone());
		let waiter = coordinator.await_resume(Classification::AuthExpired);

		refresher.release.notify_one();

		assert!(waiter.await);
		assert_eq!(*refresher.presented.lock(), vec!["persisted-refresh".to_owned()]);
		assert_eq!(storage.get(REFRESH_TOKEN_KEY).as_deref(), Some("refresh-1"));
		assert_eq!(storage.get(ACCESS_TOKEN_KEY).as_deref(), Some("fresh-1"));
	}

	#[tokio::test]
	async fn missing_refresh_token_fails_the_wave_without_calling_out() {
		let store = Arc::new(TokenStore::in_memory());
		let refresher = GatedRefresher::new(true);
		let coordinator = RefreshCoordinator::new(store, refresher.clone());

		assert!(!coordinator.await_resume(Classification::AuthExpired).await);
		assert_eq!(refresher.calls.load(Ordering::SeqCst), 0);
	}

	#[tokio::test]
	async fn flush_and_drop_resolve_waiters_with_false() {
		let (store, _) = seeded_store().await;
		let refresher = GatedRefresher::new(true);
		let coordinator = RefreshCoordinator::new(store.clone(), refresher.clone());
		let flushed = coordinator.await_resume(Classification::AuthExpired);

		assert_eq!(coordinator.flush(), 1);
		assert!(!flushed.await);

		let dropped = coordinator.await_resume(Classification::AuthExpired);

		drop(coordinator);

		assert!(!dropped.await);
	}

	#[test]
	fn dropping_an_unresolved_retry_resumes_with_false() {
		let (tx, rx) = std::sync::mpsc::channel();

		drop(PendingRetry::new(move |success| tx.send(success).expect("Receiver is alive.")));

		assert!(!rx.recv().expect("Resume should have run."));

		let (tx, rx) = std::sync::mpsc::channel();

		PendingRetry::new(move |success| tx.send(success).expect("Receiver is alive."))
			.resolve(true);

		assert_eq!(rx.try_iter().collect::<Vec<_>>(), vec![true]);
	}
}
