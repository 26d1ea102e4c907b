//! Request pipeline: adapt headers, dispatch, classify, and replay at most once after a refresh.

// crates.io
use serde_json::{Map, Value};
use tokio::runtime::Handle;
// self
use crate::{
	_prelude::*,
	adapter::{self, RequestHeaders},
	envelope::{self, ResponseStatus},
	http::{
		DownloadRequest, DownloadResponse, HttpRequest, Method, MultipartRequest, ProgressFn,
		RawResponse, TransportClient, TransportError, TransportFuture, UploadSource,
	},
	obs::{self, CallOutcome, CallSpan},
	retry::{Classification, RetryPolicy, StatusOutcome},
	service::{
		NetworkService,
		call::{CallControl, CallPhase, CallbackSlot},
	},
};

/// One kind of exchange the pipeline can drive.
pub(crate) trait Exchange
where
	Self: 'static + Send + Sync,
{
	type Output: 'static + Send + StatusOutcome;

	fn classify(outcome: &Result<Self::Output, TransportError>) -> Classification;

	fn dispatch<'a, C>(
		&'a self,
		transport: &'a C,
		headers: RequestHeaders,
	) -> TransportFuture<'a, Self::Output>
	where
		C: ?Sized + TransportClient;

	fn server_status(output: &Self::Output) -> Option<ResponseStatus>;
}

pub(crate) struct DataExchange {
	pub(crate) method: Method,
	pub(crate) url: Url,
	pub(crate) params: Option<Map<String, Value>>,
}
impl Exchange for DataExchange {
	type Output = RawResponse;

	fn classify(outcome: &Result<RawResponse, TransportError>) -> Classification {
		RetryPolicy::classify(outcome)
	}

	fn dispatch<'a, C>(
		&'a self,
		transport: &'a C,
		headers: RequestHeaders,
	) -> TransportFuture<'a, RawResponse>
	where
		C: ?Sized + TransportClient,
	{
		transport.send(HttpRequest {
			method: self.method,
			url: self.url.clone(),
			headers,
			params: self.params.clone(),
		})
	}

	fn server_status(output: &RawResponse) -> Option<ResponseStatus> {
		envelope::decode_status(&output.body)
	}
}

pub(crate) struct UploadExchange {
	pub(crate) url: Url,
	pub(crate) key: String,
	pub(crate) parts: Vec<UploadSource>,
	pub(crate) progress: Option<ProgressFn>,
}
impl Exchange for UploadExchange {
	type Output = RawResponse;

	fn classify(outcome: &Result<RawResponse, TransportError>) -> Classification {
		RetryPolicy::classify(outcome)
	}

	fn dispatch<'a, C>(
		&'a self,
		transport: &'a C,
		headers: RequestHeaders,
	) -> TransportFuture<'a, RawResponse>
	where
		C: ?Sized + TransportClient,
	{
		let request = MultipartRequest {
			url: self.url.clone(),
			headers,
			key: self.key.clone(),
			parts: self.parts.clone(),
		};

		transport.upload_multipart(request, self.progress.clone())
	}

	fn server_status(output: &RawResponse) -> Option<ResponseStatus> {
		envelope::decode_status(&output.body)
	}
}

pub(crate) struct DownloadExchange {
	pub(crate) url: Url,
	pub(crate) destination: PathBuf,
	pub(crate) progress: Option<ProgressFn>,
}
impl Exchange for DownloadExchange {
	type Output = DownloadResponse;

	fn classify(outcome: &Result<DownloadResponse, TransportError>) -> Classification {
		RetryPolicy::classify_download(outcome)
	}

	fn dispatch<'a, C>(
		&'a self,
		transport: &'a C,
		headers: RequestHeaders,
	) -> TransportFuture<'a, DownloadResponse>
	where
		C: ?Sized + TransportClient,
	{
		let request = DownloadRequest {
			url: self.url.clone(),
			headers,
			destination: self.destination.clone(),
		};

		transport.download(request, self.progress.clone())
	}

	fn server_status(output: &DownloadResponse) -> Option<ResponseStatus> {
		envelope::decode_status(&output.error_body)
	}
}

impl<C> NetworkService<C>
where
	C: ?Sized + TransportClient,
{
	/// Runs `exchange` on a spawned task and delivers `finish(output)` (or the failure) into
	/// `slot` exactly once.
	pub(crate) fn spawn_exchange<T, E, F>(
		&self,
		exchange: E,
		control: Arc<CallControl>,
		slot: Arc<CallbackSlot<T>>,
		finish: F,
	) where
		T: 'static + Send,
		E: Exchange,
		F: 'static + Send + FnOnce(E::Output) -> Result<T, ErrorInfo>,
	{
		let kind = control.kind();
		let span = CallSpan::new(kind, "pipeline");
		let service = self.clone();
		let task_control = control.clone();
		let task_slot = slot.clone();

		obs::record_call_outcome(kind, CallOutcome::Attempt);

		let task = async move {
			let result = service.run_exchange(&exchange, &task_control).await.and_then(finish);
			let phase = if result.is_ok() { CallPhase::Succeeded } else { CallPhase::FailedTerminal };

			if task_control.advance(phase) {
				obs::record_call_outcome(kind, CallOutcome::of(&result));
				task_slot.deliver(result);
			}
		};

		match Handle::try_current() {
			Ok(handle) => control.attach_task(handle.spawn(span.instrument(task)).abort_handle()),
			Err(_) => Self::fail_now(&control, &*slot, ErrorKind::Network),
		}
	}

	/// Delivers `kind` synchronously, before any I/O.
	pub(crate) fn fail_now<T>(control: &CallControl, slot: &CallbackSlot<T>, kind: ErrorKind) {
		if control.advance(CallPhase::FailedTerminal) {
			obs::record_call_outcome(control.kind(), CallOutcome::Failure);
			slot.deliver(Err(ErrorInfo::new(kind)));
		}
	}

	async fn run_exchange<E>(&self, exchange: &E, control: &CallControl) -> Result<E::Output, ErrorInfo>
	where
		E: Exchange,
	{
		let cancelled = || ErrorInfo::new(ErrorKind::Cancelled);
		let mut replayed = false;

		loop {
			let tokens = self.store.state().await;
			let defaults = self.headers.read().clone();
			let mut headers = RequestHeaders::default();

			adapter::adapt_headers(&mut headers, &defaults, &tokens);

			if !control.advance(if replayed { CallPhase::Retried } else { CallPhase::Sent }) {
				return Err(cancelled());
			}

			let outcome = exchange.dispatch(&*self.transport, headers).await;
			let classification = E::classify(&outcome);

			match outcome {
				Ok(output) if classification == Classification::Success => return Ok(output),
				_ if classification.is_auth_expired() && !replayed => {
					if !control.advance(CallPhase::AwaitingRefresh) {
						return Err(cancelled());
					}
					if !self.coordinator.await_resume(classification).await {
						return Err(
							ErrorInfo::new(ErrorKind::AuthenticationFailure).with_http_status(401)
						);
					}

					replayed = true;
				},
				outcome => return Err(failure::<E>(classification, &outcome)),
			}
		}
	}
}

fn failure<E>(classification: Classification, outcome: &Result<E::Output, TransportError>) -> ErrorInfo
where
	E: Exchange,
{
	let info = ErrorInfo::new(classification.error_kind().unwrap_or(ErrorKind::Network));

	match outcome {
		Ok(output) => info.with_http_status(output.status()).with_server_status(E::server_status(output)),
		Err(_) => info,
	}
}
