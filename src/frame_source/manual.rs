//! Caller-driven frame source with a virtual clock

use super::{FrameCallback, FrameSource, RequestHandle};
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::mem;
use tracing::{debug, trace};

#[derive(Default)]
struct ManualState {
    clock_ms: f64,
    next_id: u64,
    pending: BTreeMap<RequestHandle, FrameCallback>,
    cancelled: Vec<RequestHandle>,
    requested: u64,
    unreliable_cancel: bool,
}

/// Frame source whose clock and refresh signal are driven by the caller
///
/// Nothing fires on its own: callbacks queue up until [`ManualFrameSource::fire`]
/// (or one of its variants) dispatches them with the current virtual clock.
/// This makes tick sequences fully deterministic.
///
/// With [`ManualFrameSource::with_unreliable_cancel`] the source records
/// cancellations but still delivers the callback, emulating a host whose timer
/// already fired before the cancel arrived.
#[derive(Default)]
pub struct ManualFrameSource {
    state: RefCell<ManualState>,
}

impl ManualFrameSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_unreliable_cancel() -> Self {
        let source = Self::default();
        source.state.borrow_mut().unreliable_cancel = true;
        source
    }

    pub fn set_time(&self, timestamp_ms: f64) {
        self.state.borrow_mut().clock_ms = timestamp_ms;
    }

    pub fn advance(&self, delta_ms: f64) {
        self.state.borrow_mut().clock_ms += delta_ms;
    }

    /// Dispatches every pending callback with the current clock.
    ///
    /// Callbacks requested while dispatching are queued for the next call.
    /// Returns the number of callbacks invoked.
    pub fn fire(&self) -> usize {
        let (timestamp, callbacks) = {
            let mut state = self.state.borrow_mut();
            (state.clock_ms, mem::take(&mut state.pending))
        };

        let count = callbacks.len();
        trace!("Dispatching {} frame callback(s) at {}ms", count, timestamp);
        for (_, callback) in callbacks {
            callback(timestamp);
        }
        count
    }

    /// Moves the clock to `timestamp_ms` and fires.
    pub fn fire_at(&self, timestamp_ms: f64) -> usize {
        self.set_time(timestamp_ms);
        self.fire()
    }

    /// Advances the clock by `delta_ms` and fires.
    pub fn advance_and_fire(&self, delta_ms: f64) -> usize {
        self.advance(delta_ms);
        self.fire()
    }

    pub fn pending_count(&self) -> usize {
        self.state.borrow().pending.len()
    }

    pub fn is_pending(&self, handle: RequestHandle) -> bool {
        self.state.borrow().pending.contains_key(&handle)
    }

    /// Total number of `request_frame` calls seen.
    pub fn requested_count(&self) -> u64 {
        self.state.borrow().requested
    }

    pub fn cancelled_handles(&self) -> Vec<RequestHandle> {
        self.state.borrow().cancelled.clone()
    }
}

impl FrameSource for ManualFrameSource {
    fn request_frame(&self, callback: FrameCallback) -> RequestHandle {
        let mut state = self.state.borrow_mut();
        state.next_id += 1;
        state.requested += 1;
        let handle = RequestHandle::from_raw(state.next_id);
        state.pending.insert(handle, callback);
        trace!("Queued {}", handle);
        handle
    }

    fn cancel_frame(&self, handle: RequestHandle) {
        let mut state = self.state.borrow_mut();
        state.cancelled.push(handle);
        if state.unreliable_cancel {
            debug!("Cancellation of {} arrived too late, callback stays queued", handle);
            return;
        }
        if state.pending.remove(&handle).is_some() {
            trace!("Cancelled {}", handle);
        }
    }

    fn now(&self) -> f64 {
        self.state.borrow().clock_ms
    }
}
