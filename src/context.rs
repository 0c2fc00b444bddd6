//! Binding between the process-wide subscriber and the request currently
//! being served.
//!
//! A request owns its [`RequestLogBuffer`] through one of two slots:
//! a Tokio task-local, set up by [`scope`] for async handlers, or a
//! thread-local, set up by [`ThreadScope`] for handlers that run to
//! completion on one thread. An open thread scope shadows the task-local,
//! since it only lives for the duration of a synchronous call. Work
//! spawned onto other tasks or threads does not inherit either slot.

use crate::buffer::RequestLogBuffer;
use crate::encode::{empty_header_value, WireEncoder};
use std::cell::RefCell;
use std::future::Future;
use std::marker::PhantomData;

thread_local! {
    static THREAD_SLOT: RefCell<Option<RequestLogBuffer>> = const { RefCell::new(None) };
}

tokio::task_local! {
    static TASK_SLOT: RefCell<RequestLogBuffer>;
}

/// The current buffer is already mutably borrowed further up the stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferBusy;

/// Run `f` against the buffer of the current request.
///
/// Returns `Ok(None)` when no capture scope is active.
pub fn with_current_buffer<R>(
    f: impl FnOnce(&mut RequestLogBuffer) -> R,
) -> Result<Option<R>, BufferBusy> {
    if in_thread_scope() {
        return THREAD_SLOT
            .try_with(|slot| match slot.try_borrow_mut() {
                Ok(mut slot) => Ok(slot.as_mut().map(f)),
                Err(_) => Err(BufferBusy),
            })
            .unwrap_or(Ok(None));
    }

    TASK_SLOT
        .try_with(|cell| match cell.try_borrow_mut() {
            Ok(mut buf) => Ok(Some(f(&mut buf))),
            Err(_) => Err(BufferBusy),
        })
        .unwrap_or(Ok(None))
}

/// Whether records emitted here would be captured.
pub fn is_capturing() -> bool {
    in_thread_scope() || TASK_SLOT.try_with(|_| ()).is_ok()
}

fn in_thread_scope() -> bool {
    THREAD_SLOT
        .try_with(|slot| slot.try_borrow().map(|s| s.is_some()).unwrap_or(true))
        .unwrap_or(false)
}

/// Encode and clear the current request's buffer. Outside of a capture
/// scope this yields the empty payload.
pub fn encode_current(encoder: &WireEncoder) -> String {
    match with_current_buffer(|buf| encoder.encode(buf)) {
        Ok(Some(value)) => value,
        Ok(None) | Err(BufferBusy) => empty_header_value(),
    }
}

/// Run `fut` with a fresh buffer bound to its task.
///
/// The buffer lives exactly as long as the returned future, so an
/// aborted or panicking request leaves nothing behind.
pub fn scope<F: Future>(fut: F) -> impl Future<Output = F::Output> {
    TASK_SLOT.scope(RefCell::new(RequestLogBuffer::new()), fut)
}

/// Thread-bound capture scope for synchronous handlers.
///
/// Entering installs a fresh buffer on the current thread; dropping the
/// guard restores whatever was there before, so scopes nest and a
/// panicking handler cannot leak rows into the next request served by
/// the same thread.
pub struct ThreadScope {
    previous: Option<RequestLogBuffer>,
    _not_send: PhantomData<*const ()>,
}

impl ThreadScope {
    pub fn enter() -> Self {
        let previous = THREAD_SLOT.with(|slot| slot.borrow_mut().replace(RequestLogBuffer::new()));
        Self {
            previous,
            _not_send: PhantomData,
        }
    }

    /// Encode what this scope captured and close it.
    pub fn finish(self, encoder: &WireEncoder) -> String {
        THREAD_SLOT
            .try_with(|slot| match slot.try_borrow_mut() {
                Ok(mut slot) => slot.as_mut().map(|buf| encoder.encode(buf)),
                Err(_) => None,
            })
            .ok()
            .flatten()
            .unwrap_or_else(empty_header_value)
    }
}

impl Drop for ThreadScope {
    fn drop(&mut self) {
        let previous = self.previous.take();
        let _ = THREAD_SLOT.try_with(|slot| {
            if let Ok(mut slot) = slot.try_borrow_mut() {
                *slot = previous;
            }
        });
    }
}

/// Run `f` inside a [`ThreadScope`] and return its output together with
/// the encoded header value.
pub fn capture_sync<R>(encoder: &WireEncoder, f: impl FnOnce() -> R) -> (R, String) {
    let scope = ThreadScope::enter();
    let out = f();
    (out, scope.finish(encoder))
}
