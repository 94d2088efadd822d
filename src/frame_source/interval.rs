//! Emulated display refresh on a tokio `LocalSet`
//!
//! Each request spawns a local task that sleeps until the next refresh
//! boundary and then runs the callback. Boundaries are phase-aligned to the
//! source's origin, so a callback requested at any point inside a refresh
//! period fires at the end of that period, the same way a vsync-driven host
//! behaves.
//!
//! All methods must be called from inside a [`tokio::task::LocalSet`] because
//! frame callbacks are not `Send`.

use super::{FrameCallback, FrameSource, RequestHandle};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep_until, Instant};
use tracing::{debug, trace};

pub const DEFAULT_REFRESH_RATE_HZ: f64 = 60.0;

type TaskTable = Rc<RefCell<HashMap<RequestHandle, JoinHandle<()>>>>;

pub struct IntervalFrameSource {
    origin: Instant,
    period: Duration,
    next_id: Cell<u64>,
    tasks: TaskTable,
}

impl IntervalFrameSource {
    /// Creates a 60 Hz source whose clock starts at zero now.
    pub fn new() -> Self {
        Self::with_refresh_rate(DEFAULT_REFRESH_RATE_HZ)
    }

    /// Creates a source refreshing at `refresh_rate_hz`.
    ///
    /// Non-finite or non-positive rates fall back to 60 Hz; callers that load
    /// the rate from configuration validate it there.
    pub fn with_refresh_rate(refresh_rate_hz: f64) -> Self {
        let rate = if refresh_rate_hz.is_finite() && refresh_rate_hz > 0.0 {
            refresh_rate_hz
        } else {
            debug!(
                "Invalid refresh rate {}, using {} Hz",
                refresh_rate_hz, DEFAULT_REFRESH_RATE_HZ
            );
            DEFAULT_REFRESH_RATE_HZ
        };

        debug!("Creating interval frame source at {} Hz", rate);
        Self {
            origin: Instant::now(),
            period: Duration::from_secs_f64(1.0 / rate),
            next_id: Cell::new(0),
            tasks: Rc::new(RefCell::new(HashMap::new())),
        }
    }

    pub fn period(&self) -> Duration {
        self.period
    }

    pub fn pending_count(&self) -> usize {
        self.tasks.borrow().len()
    }

    fn next_boundary(&self) -> Instant {
        let elapsed = self.origin.elapsed().as_secs_f64();
        let period = self.period.as_secs_f64();
        let frames = (elapsed / period).floor() + 1.0;
        self.origin + Duration::from_secs_f64(frames * period)
    }
}

impl Default for IntervalFrameSource {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameSource for IntervalFrameSource {
    fn request_frame(&self, callback: FrameCallback) -> RequestHandle {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        let handle = RequestHandle::from_raw(id);

        let deadline = self.next_boundary();
        let origin = self.origin;
        let tasks = Rc::clone(&self.tasks);

        let task = tokio::task::spawn_local(async move {
            sleep_until(deadline).await;
            tasks.borrow_mut().remove(&handle);
            let timestamp = origin.elapsed().as_secs_f64() * 1000.0;
            callback(timestamp);
        });

        self.tasks.borrow_mut().insert(handle, task);
        trace!("Scheduled {} for the next refresh", handle);
        handle
    }

    fn cancel_frame(&self, handle: RequestHandle) {
        if let Some(task) = self.tasks.borrow_mut().remove(&handle) {
            task.abort();
            trace!("Aborted {}", handle);
        }
    }

    fn now(&self) -> f64 {
        self.origin.elapsed().as_secs_f64() * 1000.0
    }
}

impl Drop for IntervalFrameSource {
    fn drop(&mut self) {
        for (_, task) in self.tasks.borrow_mut().drain() {
            task.abort();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::task::LocalSet;
    use tokio::time::sleep;

    #[tokio::test(start_paused = true)]
    async fn fires_on_the_next_refresh_boundary() {
        LocalSet::new()
            .run_until(async {
                let source = IntervalFrameSource::new();
                let seen = Rc::new(RefCell::new(Vec::new()));
                let sink = seen.clone();
                source.request_frame(Box::new(move |ts: f64| sink.borrow_mut().push(ts)));
                assert_eq!(source.pending_count(), 1);

                sleep(Duration::from_millis(40)).await;

                let seen = seen.borrow();
                assert_eq!(seen.len(), 1);
                assert!(seen[0] >= 1000.0 / 60.0 && seen[0] < 18.0, "fired at {}", seen[0]);
                assert_eq!(source.pending_count(), 0);
            })
            .await;
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_request_never_fires() {
        LocalSet::new()
            .run_until(async {
                let source = IntervalFrameSource::new();
                let fired = Rc::new(Cell::new(false));
                let flag = fired.clone();
                let handle = source.request_frame(Box::new(move |_: f64| flag.set(true)));
                source.cancel_frame(handle);
                source.cancel_frame(handle);

                sleep(Duration::from_millis(100)).await;
                assert!(!fired.get());
                assert_eq!(source.pending_count(), 0);
            })
            .await;
    }

    #[test]
    fn invalid_rate_falls_back_to_sixty_hz() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let _guard = runtime.enter();
        let source = IntervalFrameSource::with_refresh_rate(f64::NAN);
        assert_eq!(source.period(), Duration::from_secs_f64(1.0 / 60.0));
    }
}
