//! Per-call bookkeeping: exactly-once callback delivery, phase tracking, and cancellation.

// crates.io
use tokio::task::AbortHandle;
// self
use crate::{_prelude::*, obs::{self, CallKind}};

/// Completion callback of a call.
pub type Callback<T> = Box<dyn FnOnce(std::result::Result<T, ErrorInfo>) + Send>;

/// Lifecycle of a call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CallPhase {
	/// Request built, nothing sent yet.
	Built,
	/// First dispatch in flight.
	Sent,
	/// Parked behind a refresh wave after an expired credential.
	AwaitingRefresh,
	/// Single replay after a successful refresh in flight.
	Retried,
	/// Data delivered.
	Succeeded,
	/// Error delivered.
	FailedTerminal,
	/// Cancelled by the caller before completion.
	Cancelled,
}
impl CallPhase {
	/// Returns a stable label suitable for span or metric fields.
	pub const fn as_str(self) -> &'static str {
		match self {
			Self::Built => "built",
			Self::Sent => "sent",
			Self::AwaitingRefresh => "awaiting_refresh",
			Self::Retried => "retried",
			Self::Succeeded => "succeeded",
			Self::FailedTerminal => "failed_terminal",
			Self::Cancelled => "cancelled",
		}
	}

	/// Returns `true` once the call's callback has been (or is being) delivered.
	pub const fn is_terminal(self) -> bool {
		matches!(self, Self::Succeeded | Self::FailedTerminal | Self::Cancelled)
	}
}

/// Holds the callback until its single invocation.
pub(crate) struct CallbackSlot<T>(Mutex<Option<Callback<T>>>);
impl<T> CallbackSlot<T> {
	pub(crate) fn new(callback: Callback<T>) -> Self {
		Self(Mutex::new(Some(callback)))
	}

	/// Invokes the callback unless it already ran. The lock is released before invocation.
	pub(crate) fn deliver(&self, result: std::result::Result<T, ErrorInfo>) -> bool {
		let callback = self.0.lock().take();

		match callback {
			Some(callback) => {
				callback(result);

				true
			},
			None => false,
		}
	}
}

/// Type-erased view of a [`CallbackSlot`] used by cancellation.
pub(crate) trait DeliverError
where
	Self: Send + Sync,
{
	fn deliver_error(&self, error: ErrorInfo) -> bool;
}
impl<T> DeliverError for CallbackSlot<T>
where
	T: Send,
{
	fn deliver_error(&self, error: ErrorInfo) -> bool {
		self.deliver(Err(error))
	}
}

/// Shared state between a running call and its [`CallHandle`].
pub(crate) struct CallControl {
	kind: CallKind,
	phase: Mutex<CallPhase>,
	abort: Mutex<Option<AbortHandle>>,
	slot: Arc<dyn DeliverError>,
}
impl CallControl {
	pub(crate) fn new(kind: CallKind, slot: Arc<dyn DeliverError>) -> Arc<Self> {
		Arc::new(Self {
			kind,
			phase: Mutex::new(CallPhase::Built),
			abort: Mutex::new(None),
			slot,
		})
	}

	pub(crate) fn kind(&self) -> CallKind {
		self.kind
	}

	/// Moves to `next`; refuses once a terminal phase was reached.
	pub(crate) fn advance(&self, next: CallPhase) -> bool {
		let mut phase = self.phase.lock();

		if phase.is_terminal() {
			return false;
		}

		*phase = next;
		obs::emit_phase(self.kind, next.as_str());

		true
	}

	pub(crate) fn phase(&self) -> CallPhase {
		*self.phase.lock()
	}

	pub(crate) fn attach_task(&self, task: AbortHandle) {
		let mut abort = self.abort.lock();

		if self.phase() == CallPhase::Cancelled {
			task.abort();
		} else {
			*abort = Some(task);
		}
	}

	fn cancel(&self) -> bool {
		if !self.advance(CallPhase::Cancelled) {
			return false;
		}

		self.slot.deliver_error(ErrorInfo::new(ErrorKind::Cancelled));

		if let Some(task) = self.abort.lock().take() {
			task.abort();
		}

		true
	}
}

/// Handle to an issued call.
#[derive(Clone)]
pub struct CallHandle {
	control: Arc<CallControl>,
}
impl CallHandle {
	pub(crate) fn new(control: Arc<CallControl>) -> Self {
		Self { control }
	}

	/// Cancels the call: delivers [`ErrorKind::Cancelled`] if nothing was delivered yet, aborts
	/// the in-flight exchange, and prevents any pending replay. Returns `false` if the call had
	/// already finished.
	pub fn cancel(&self) -> bool {
		self.control.cancel()
	}

	/// Current phase.
	pub fn phase(&self) -> CallPhase {
		self.control.phase()
	}

	/// Returns `true` once the callback ran or cancellation won.
	pub fn is_finished(&self) -> bool {
		self.phase().is_terminal()
	}
}
impl Debug for CallHandle {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CallHandle")
			.field("kind", &self.control.kind)
			.field("phase", &self.phase())
			.finish()
	}
}
