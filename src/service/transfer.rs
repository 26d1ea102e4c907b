//! Multipart uploads and file downloads.

// std
use std::path::Component;
// self
use crate::{
	_prelude::*,
	envelope::ResponseEnvelope,
	http::{DownloadResponse, ProgressFn, RawResponse, TransportClient, UploadSource},
	obs::CallKind,
	service::{
		CallHandle, CallResult, Callback, Endpoint, NetworkService,
		call::{CallControl, CallbackSlot},
		pipeline::{DownloadExchange, UploadExchange},
	},
};

/// File name used when a download does not name its destination.
pub const DEFAULT_DOWNLOAD_NAME: &str = "New";

/// Multipart form submitted by [`NetworkService::upload`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UploadRequest {
	/// Form field name every part is appended under.
	pub key: String,
	/// Parts in submission order.
	pub parts: Vec<UploadSource>,
}
impl UploadRequest {
	/// Creates an empty form for `key`.
	pub fn new(key: impl Into<String>) -> Self {
		Self { key: key.into(), parts: Vec::new() }
	}

	/// Appends a file part.
	pub fn file(mut self, path: impl Into<PathBuf>) -> Self {
		self.parts.push(UploadSource::File(path.into()));

		self
	}

	/// Appends a text part.
	pub fn text(mut self, value: impl Into<String>) -> Self {
		self.parts.push(UploadSource::Text(value.into()));

		self
	}
}

/// File written by a finished download.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownloadedFile {
	/// Destination path.
	pub path: PathBuf,
	/// Bytes written.
	pub bytes_written: u64,
}

impl<C> NetworkService<C>
where
	C: ?Sized + TransportClient,
{
	/// Uploads `request` as multipart form data to `endpoint` and decodes the response like
	/// [`NetworkService::call`]. Uploads are always sent as POST.
	///
	/// A form without parts fails with [`ErrorKind::MultipartEncoding`] before this method returns,
	/// as does a malformed base URL (with [`ErrorKind::MalformedUrl`]). Unreadable files fail with
	/// [`ErrorKind::MultipartEncoding`] once the task runs.
	pub fn upload<T, F>(
		&self,
		endpoint: &Endpoint<T>,
		request: UploadRequest,
		progress: Option<ProgressFn>,
		callback: F,
	) -> CallHandle
	where
		T: 'static + Send,
		F: 'static + Send + FnOnce(CallResult<T>),
	{
		let slot = Arc::new(CallbackSlot::new(Box::new(callback) as Callback<ResponseEnvelope<T>>));
		let control = CallControl::new(CallKind::Upload, slot.clone());
		let handle = CallHandle::new(control.clone());
		let url = match self.config.endpoint_url(endpoint.path()) {
			Ok(_) if request.parts.is_empty() => Err(ErrorKind::MultipartEncoding),
			other => other,
		};
		let url = match url {
			Ok(url) => url,
			Err(kind) => {
				Self::fail_now(&control, &slot, kind);

				return handle;
			},
		};
		let decoder = endpoint.decoder;
		let exchange = UploadExchange { url, key: request.key, parts: request.parts, progress };

		self.spawn_exchange(exchange, control, slot, move |response: RawResponse| {
			decoder(&response.body)
		});

		handle
	}

	/// Downloads `path` into the configured download directory as `file_name` (default
	/// [`DEFAULT_DOWNLOAD_NAME`]).
	///
	/// `file_name` must be a single plain path component; anything else (absolute paths, `..`,
	/// separators) fails with [`ErrorKind::MalformedUrl`] before this method returns.
	///
	/// Only a 2xx response is written to disk. 404 maps to [`ErrorKind::ResourceUnavailable`], any
	/// other non-2xx status except 401 to [`ErrorKind::InvalidResponse`]; 401 goes through the
	/// refresh path like every other call.
	pub fn download<F>(
		&self,
		path: &str,
		file_name: Option<&str>,
		progress: Option<ProgressFn>,
		callback: F,
	) -> CallHandle
	where
		F: 'static + Send + FnOnce(std::result::Result<DownloadedFile, ErrorInfo>),
	{
		let slot = Arc::new(CallbackSlot::new(Box::new(callback) as Callback<DownloadedFile>));
		let control = CallControl::new(CallKind::Download, slot.clone());
		let handle = CallHandle::new(control.clone());
		let file_name = file_name.unwrap_or(DEFAULT_DOWNLOAD_NAME);
		let url = match self.config.endpoint_url(path) {
			Ok(_) if !is_plain_file_name(file_name) => Err(ErrorKind::MalformedUrl),
			other => other,
		};
		let url = match url {
			Ok(url) => url,
			Err(kind) => {
				Self::fail_now(&control, &slot, kind);

				return handle;
			},
		};
		let destination = self.config.download_dir.join(file_name);
		let exchange = DownloadExchange { url, destination: destination.clone(), progress };

		self.spawn_exchange(exchange, control, slot, move |response: DownloadResponse| {
			Ok(DownloadedFile { path: destination, bytes_written: response.bytes_written })
		});

		handle
	}
}

// Exactly one normal component, so the destination stays inside the download directory.
fn is_plain_file_name(name: &str) -> bool {
	let mut components = Path::new(name).components();

	matches!((components.next(), components.next()), (Some(Component::Normal(_)), None))
}

#[cfg(test)]
mod tests {
	// std
	use std::{env, fs, process};
	// crates.io
	use httpmock::prelude::*;
	use tokio::sync::oneshot;
	// self
	use super::*;
	use crate::{_preludet::*, http::Progress, service::CallPhase};

	#[derive(Debug, Deserialize)]
	struct Receipt {
		stored: u32,
	}

	fn unique_name(prefix: &str) -> String {
		format!(
			"netservice_{prefix}_{}_{}",
			process::id(),
			OffsetDateTime::now_utc().unix_timestamp_nanos()
		)
	}

	#[test]
	fn upload_request_keeps_part_order() {
		let request = UploadRequest::new("files").file("/tmp/a.png").text("caption");

		assert_eq!(request.key, "files");
		assert_eq!(
			request.parts,
			vec![UploadSource::File("/tmp/a.png".into()), UploadSource::Text("caption".into())]
		);
	}

	#[tokio::test]
	async fn download_writes_the_body_and_reports_progress() {
		let server = MockServer::start_async().await;
		let mock = server
			.mock_async(|when, then| {
				when.method(GET).path("/files/report").header("authorization", "Bearer access");
				then.status(200).body("hello world");
			})
			.await;
		let (service, _) = build_reqwest_test_service(&server.base_url());
		let name = unique_name("download");
		let seen = Arc::new(Mutex::new(Vec::new()));
		let sink = seen.clone();
		let (tx, rx) = oneshot::channel();

		service.tokens().set(token_fixture("access", "refresh")).await.expect("Seeding should succeed.");
		service.download(
			"/files/report",
			Some(&name),
			Some(Arc::new(move |progress: Progress| sink.lock().push(progress))),
			move |result| {
				let _ = tx.send(result);
			},
		);

		let file = rx
			.await
			.expect("Callback should run.")
			.expect("Download should succeed.");

		assert_eq!(file.path, env::temp_dir().join(&name));
		assert_eq!(file.bytes_written, 11);
		assert_eq!(fs::read_to_string(&file.path).expect("File should exist."), "hello world");
		assert_eq!(seen.lock().last().map(|p| p.completed), Some(11));
		assert!(!env::temp_dir().join(format!("{name}.part")).exists());

		mock.assert_async().await;
		fs::remove_file(&file.path).expect("Failed to remove downloaded file.");
	}

	#[tokio::test]
	async fn download_failures_never_touch_the_destination() {
		let server = MockServer::start_async().await;
		let _missing = server
			.mock_async(|when, then| {
				when.method(GET).path("/files/missing");
				then.status(404);
			})
			.await;
		let _broken = server
			.mock_async(|when, then| {
				when.method(GET).path("/files/broken");
				then.status(500).body("oops");
			})
			.await;
		let (service, _) = build_reqwest_test_service(&server.base_url());

		for (path, kind) in
			[("/files/missing", ErrorKind::ResourceUnavailable), ("/files/broken", ErrorKind::InvalidResponse)]
		{
			let name = unique_name("failed_download");
			let (tx, rx) = oneshot::channel();

			service.download(path, Some(&name), None, move |result| {
				let _ = tx.send(result);
			});

			let error = rx.await.expect("Callback should run.").expect_err("Download should fail.");

			assert_eq!(error.kind, kind);
			assert!(!env::temp_dir().join(&name).exists());
		}
	}

	#[tokio::test]
	async fn download_rejects_names_escaping_the_download_dir() {
		let (service, _) = build_reqwest_test_service("http://127.0.0.1:9");

		for name in ["../escape", "/etc/passwd", "nested/file", "..", ""] {
			let fired = Arc::new(Mutex::new(None));
			let sink = fired.clone();
			let handle = service.download("/files/report", Some(name), None, move |result| {
				*sink.lock() = Some(result.map_err(|e| e.kind));
			});

			assert_eq!(*fired.lock(), Some(Err(ErrorKind::MalformedUrl)), "{name:?}");
			assert_eq!(handle.phase(), CallPhase::FailedTerminal);
		}

		assert!(is_plain_file_name("report.pdf"));
		assert!(is_plain_file_name(DEFAULT_DOWNLOAD_NAME));
	}

	#[tokio::test]
	async fn upload_sends_every_part_and_decodes_the_receipt() {
		let server = MockServer::start_async().await;
		let mock = server
			.mock_async(|when, then| {
				when.method(POST).path("/upload");
				then.status(200).body(r#"{"status":{"code":"201"},"body":{"stored":2}}"#);
			})
			.await;
		let (service, _) = build_reqwest_test_service(&server.base_url());
		let file = env::temp_dir().join(unique_name("upload"));

		fs::write(&file, b"binary-ish").expect("Failed to write upload fixture.");

		let seen = Arc::new(Mutex::new(Vec::new()));
		let sink = seen.clone();
		let (tx, rx) = oneshot::channel();

		service.upload(
			&Endpoint::<Receipt>::post("/upload"),
			UploadRequest::new("files").file(&file).text("caption"),
			Some(Arc::new(move |progress: Progress| sink.lock().push(progress))),
			move |result| {
				let _ = tx.send(result);
			},
		);

		let envelope = rx.await.expect("Callback should run.").expect("Upload should succeed.");

		assert_eq!(envelope.data.map(|r| r.stored), Some(2));
		assert_eq!(
			seen.lock().last().copied(),
			Some(Progress { completed: 17, total: Some(17) })
		);

		mock.assert_async().await;
		fs::remove_file(&file).expect("Failed to remove upload fixture.");
	}

	#[tokio::test]
	async fn upload_encoding_failures_are_reported() {
		let (service, _) = build_reqwest_test_service("http://127.0.0.1:9");
		let endpoint = Endpoint::<Receipt>::post("/upload");
		let fired = Arc::new(Mutex::new(None));
		let sink = fired.clone();
		let handle = service.upload(&endpoint, UploadRequest::new("files"), None, move |result| {
			*sink.lock() = Some(result.map(|_| ()).map_err(|e| e.kind));
		});

		assert_eq!(*fired.lock(), Some(Err(ErrorKind::MultipartEncoding)));
		assert_eq!(handle.phase(), CallPhase::FailedTerminal);

		let (tx, rx) = oneshot::channel();

		service.upload(
			&endpoint,
			UploadRequest::new("files").file(env::temp_dir().join(unique_name("absent"))),
			None,
			move |result| {
				let _ = tx.send(result);
			},
		);

		let error = rx.await.expect("Callback should run.").expect_err("Missing file must fail.");

		assert_eq!(error.kind, ErrorKind::MultipartEncoding);
	}
}
