//! Loop controller - lifecycle, timing bookkeeping and the tick handler
//!
//! The controller owns its state behind an `Rc`; every scheduled frame
//! callback only holds a `Weak` reference, so a pending callback can never
//! keep a dropped controller alive. Borrows of the internal state are never
//! held while a step or the frame source runs, which lets steps call back into
//! the controller (through a [`LoopHandle`]) mid-tick.
//!
//! # Tick
//!
//! ```text
//! callback(ts) ─► running? ─no─► return
//!                   │yes
//!                   ▼
//!           request next frame
//!                   │
//!      elapsed = ts - last_timestamp
//!                   │
//!     elapsed > threshold? ─yes─► last_timestamp = ts, return (dead frame)
//!                   │no
//!       accumulate, update steps, render steps, last_timestamp = ts
//! ```

use super::state::{LoopEvent, LoopState};
use super::steps::{StepRegistry, StepToken};
use super::LoopError;
use crate::config::LoopSettings;
use crate::frame_source::{FrameSource, RequestHandle};
use std::cell::RefCell;
use std::rc::{Rc, Weak};
use tracing::{debug, info, trace};

/// Frame counters since construction
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    /// Ticks that ran the update and render phases
    pub frames_processed: u64,
    /// Ticks discarded as dead frames
    pub frames_dropped: u64,
}

#[derive(Debug, Default)]
struct LoopCore {
    state: LoopState,
    start_timestamp: f64,
    last_timestamp: f64,
    elapsed_ms: f64,
    frame_request: Option<RequestHandle>,
    // Bumped on every request and on every halt; a callback only ticks if it
    // carries the current value.
    generation: u64,
    allowed_overflow_threshold: f64,
    stats: LoopStats,
}

struct Shared {
    source: Rc<dyn FrameSource>,
    core: RefCell<LoopCore>,
    steps: RefCell<StepRegistry>,
}

impl Shared {
    fn start(self: &Rc<Self>) {
        let resumed = {
            let mut core = self.core.borrow_mut();
            let Some(next) = core.state.on(LoopEvent::Start) else {
                debug!("Start ignored, loop is already running");
                return;
            };

            let resumed = core.state.is_paused();
            let now = self.source.now();
            core.last_timestamp = now;
            if !resumed {
                core.start_timestamp = now;
            }
            core.state = next;
            resumed
        };

        self.request_next_frame();

        if resumed {
            info!("Run loop resumed");
        } else {
            info!("Run loop started");
        }
    }

    /// Shared body of stop and pause.
    fn halt(&self, event: LoopEvent) {
        let pending = {
            let mut core = self.core.borrow_mut();
            let Some(next) = core.state.on(event) else {
                debug!("{:?} ignored in state {:?}", event, core.state);
                return;
            };
            core.state = next;
            core.generation += 1;
            core.frame_request.take()
        };

        if let Some(handle) = pending {
            self.source.cancel_frame(handle);
            trace!("Cancelled pending {}", handle);
        }

        if event == LoopEvent::Pause {
            info!("Run loop paused");
        } else {
            info!("Run loop stopped");
        }
    }

    fn request_next_frame(self: &Rc<Self>) {
        let generation = {
            let mut core = self.core.borrow_mut();
            core.generation += 1;
            core.generation
        };

        let weak: Weak<Shared> = Rc::downgrade(self);
        let handle = self.source.request_frame(Box::new(move |timestamp: f64| {
            if let Some(shared) = weak.upgrade() {
                shared.tick(generation, timestamp);
            }
        }));

        self.core.borrow_mut().frame_request = Some(handle);
    }

    fn tick(self: &Rc<Self>, generation: u64, timestamp: f64) {
        {
            let core = self.core.borrow();
            if !core.state.is_running() {
                trace!("Frame at {}ms ignored, loop is {:?}", timestamp, core.state);
                return;
            }
            if core.generation != generation {
                debug!("Stale frame callback at {}ms ignored", timestamp);
                return;
            }
        }

        self.request_next_frame();

        let elapsed = {
            let mut core = self.core.borrow_mut();
            let elapsed = (timestamp - core.last_timestamp).max(0.0);

            if elapsed > core.allowed_overflow_threshold {
                core.last_timestamp = timestamp;
                core.stats.frames_dropped += 1;
                debug!(
                    "Dead frame: {:.2}ms since last tick exceeds {:.2}ms, skipping",
                    elapsed, core.allowed_overflow_threshold
                );
                return;
            }

            core.elapsed_ms += elapsed;
            core.stats.frames_processed += 1;
            elapsed
        };

        trace!("Tick at {}ms, elapsed {:.2}ms", timestamp, elapsed);
        let snapshot = self.steps.borrow().snapshot();
        snapshot.run(elapsed);

        self.core.borrow_mut().last_timestamp = timestamp;
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        if let Some(handle) = self.core.get_mut().frame_request.take() {
            debug!("Run loop dropped while scheduled, cancelling {}", handle);
            self.source.cancel_frame(handle);
        }
    }
}

/// Pausable, time-accounting run loop over an injected [`FrameSource`]
///
/// Dispatches the update phase and then the render phase once per frame,
/// passing the milliseconds elapsed since the previous tick to every update
/// step. Ticks lagging more than the configured overflow threshold are
/// discarded as dead frames.
///
/// The controller is single-threaded (`!Send`); all calls, including the
/// frame source's callbacks, must happen on one thread.
///
/// # Examples
///
/// ```rust
/// use frameloop::{frame_source::ManualFrameSource, LoopController, LoopSettings};
/// use std::rc::Rc;
///
/// let source = Rc::new(ManualFrameSource::new());
/// let controller = LoopController::new(source.clone(), LoopSettings::default())?;
/// controller.add_update_step(|elapsed_ms| println!("update {elapsed_ms}"));
/// controller.add_render_step(|| println!("render"));
///
/// controller.start();
/// source.advance_and_fire(16.0);
/// assert_eq!(controller.elapsed_ms(), 16.0);
/// controller.stop();
/// # Ok::<(), frameloop::LoopError>(())
/// ```
pub struct LoopController {
    shared: Rc<Shared>,
}

impl LoopController {
    /// Creates an idle controller.
    ///
    /// # Errors
    ///
    /// [`LoopError::InvalidArgument`] if the settings do not validate.
    pub fn new(source: Rc<dyn FrameSource>, settings: LoopSettings) -> Result<Self, LoopError> {
        settings.validate()?;
        let threshold = settings.allowed_overflow_threshold();
        debug!(
            "Creating run loop: {} overflow frames, threshold {:.2}ms",
            settings.allowed_overflow_frames, threshold
        );

        Ok(Self::build(source, threshold))
    }

    /// Creates an idle controller with the default overflow budget.
    pub fn with_defaults(source: Rc<dyn FrameSource>) -> Self {
        Self::build(source, LoopSettings::default().allowed_overflow_threshold())
    }

    fn build(source: Rc<dyn FrameSource>, allowed_overflow_threshold: f64) -> Self {
        let core = LoopCore {
            allowed_overflow_threshold,
            ..LoopCore::default()
        };
        Self {
            shared: Rc::new(Shared {
                source,
                core: RefCell::new(core),
                steps: RefCell::new(StepRegistry::default()),
            }),
        }
    }

    /// Starts or resumes the loop. No-op while running.
    ///
    /// Resuming from a pause keeps the original start timestamp.
    pub fn start(&self) {
        self.shared.start();
    }

    /// Cancels the pending frame and returns to idle. No-op unless running.
    ///
    /// Accumulated time and the start timestamp are kept.
    pub fn stop(&self) {
        self.shared.halt(LoopEvent::Stop);
    }

    /// Like [`LoopController::stop`], but the next start resumes.
    pub fn pause(&self) {
        self.shared.halt(LoopEvent::Pause);
    }

    /// Appends an update step; it receives the elapsed milliseconds of each processed tick.
    pub fn add_update_step(&self, step: impl FnMut(f64) + 'static) -> StepToken {
        self.shared.steps.borrow_mut().add_update(step)
    }

    /// Appends a render step, run after every update step of a processed tick.
    pub fn add_render_step(&self, step: impl FnMut() + 'static) -> StepToken {
        self.shared.steps.borrow_mut().add_render(step)
    }

    /// Removes the update step registered under `token`.
    ///
    /// Returns `false` if the token is unknown or was already removed.
    pub fn remove_update_step(&self, token: StepToken) -> bool {
        self.shared.steps.borrow_mut().remove_update(token)
    }

    /// Removes the render step registered under `token`.
    ///
    /// Returns `false` if the token is unknown or was already removed.
    pub fn remove_render_step(&self, token: StepToken) -> bool {
        self.shared.steps.borrow_mut().remove_render(token)
    }

    /// Removes every update and render step. A tick already running keeps its snapshot.
    pub fn clear_steps(&self) {
        self.shared.steps.borrow_mut().clear();
    }

    /// Number of registered update steps.
    pub fn update_step_count(&self) -> usize {
        self.shared.steps.borrow().update_len()
    }

    /// Number of registered render steps.
    pub fn render_step_count(&self) -> usize {
        self.shared.steps.borrow().render_len()
    }

    /// Weak handle for use inside steps.
    pub fn handle(&self) -> LoopHandle {
        LoopHandle {
            shared: Rc::downgrade(&self.shared),
        }
    }

    /// Current lifecycle state.
    pub fn state(&self) -> LoopState {
        self.shared.core.borrow().state
    }

    /// True while ticks are being processed.
    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// True between a pause and the start that resumes it.
    pub fn is_paused(&self) -> bool {
        self.state().is_paused()
    }

    /// Host timestamp of the last start that was not a resume.
    pub fn start_timestamp(&self) -> f64 {
        self.shared.core.borrow().start_timestamp
    }

    /// Host timestamp of the latest tick, dead frames included.
    pub fn last_timestamp(&self) -> f64 {
        self.shared.core.borrow().last_timestamp
    }

    /// Total elapsed time consumed by processed ticks.
    pub fn elapsed_ms(&self) -> f64 {
        self.shared.core.borrow().elapsed_ms
    }

    /// Handle of the pending frame request, `None` when nothing is scheduled.
    pub fn frame_request(&self) -> Option<RequestHandle> {
        self.shared.core.borrow().frame_request
    }

    /// Gap in milliseconds above which a tick is discarded as a dead frame.
    pub fn allowed_overflow_threshold(&self) -> f64 {
        self.shared.core.borrow().allowed_overflow_threshold
    }

    /// Processed and dropped frame counters since construction.
    pub fn stats(&self) -> LoopStats {
        self.shared.core.borrow().stats
    }
}

/// Non-owning handle to a [`LoopController`]
///
/// Steps capture this instead of the controller so that the step lists do not
/// form a reference cycle with their owner. Every method is a no-op (or
/// returns `None`/`false`) once the controller has been dropped.
#[derive(Clone)]
pub struct LoopHandle {
    shared: Weak<Shared>,
}

impl LoopHandle {
    /// Starts or resumes the loop if the controller is still alive.
    pub fn start(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.start();
        }
    }

    /// Stops the loop and cancels the pending frame.
    pub fn stop(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.halt(LoopEvent::Stop);
        }
    }

    /// Pauses the loop so the next start resumes it.
    pub fn pause(&self) {
        if let Some(shared) = self.shared.upgrade() {
            shared.halt(LoopEvent::Pause);
        }
    }

    /// Registers an update step; `None` once the controller has been dropped.
    pub fn add_update_step(&self, step: impl FnMut(f64) + 'static) -> Option<StepToken> {
        let shared = self.shared.upgrade()?;
        let token = shared.steps.borrow_mut().add_update(step);
        Some(token)
    }

    /// Registers a render step; `None` once the controller has been dropped.
    pub fn add_render_step(&self, step: impl FnMut() + 'static) -> Option<StepToken> {
        let shared = self.shared.upgrade()?;
        let token = shared.steps.borrow_mut().add_render(step);
        Some(token)
    }

    /// Returns `false` if the token is unknown, already removed, or the controller is gone.
    pub fn remove_update_step(&self, token: StepToken) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };
        let removed = shared.steps.borrow_mut().remove_update(token);
        removed
    }

    /// Returns `false` if the token is unknown, already removed, or the controller is gone.
    pub fn remove_render_step(&self, token: StepToken) -> bool {
        let Some(shared) = self.shared.upgrade() else {
            return false;
        };
        let removed = shared.steps.borrow_mut().remove_render(token);
        removed
    }

    /// Current lifecycle state, `None` once the controller has been dropped.
    pub fn state(&self) -> Option<LoopState> {
        let shared = self.shared.upgrade()?;
        let state = shared.core.borrow().state;
        Some(state)
    }

    /// Accumulated loop time, `None` once the controller has been dropped.
    pub fn elapsed_ms(&self) -> Option<f64> {
        let shared = self.shared.upgrade()?;
        let elapsed = shared.core.borrow().elapsed_ms;
        Some(elapsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame_source::ManualFrameSource;
    use std::cell::Cell;

    fn setup(frames: u32) -> (Rc<ManualFrameSource>, LoopController) {
        let source = Rc::new(ManualFrameSource::new());
        let controller =
            LoopController::new(source.clone(), LoopSettings::with_overflow_frames(frames))
                .unwrap();
        (source, controller)
    }

    #[test]
    fn new_controller_is_idle_and_unscheduled() {
        let (source, controller) = setup(10);
        assert_eq!(controller.state(), LoopState::Idle);
        assert_eq!(controller.frame_request(), None);
        assert_eq!(source.pending_count(), 0);
        assert_eq!(controller.elapsed_ms(), 0.0);
    }

    #[test]
    fn zero_overflow_budget_only_processes_zero_gap_ticks() {
        let (source, controller) = setup(0);
        assert_eq!(controller.allowed_overflow_threshold(), 0.0);
        let updates = Rc::new(Cell::new(0));
        let counter = updates.clone();
        controller.add_update_step(move |_| counter.set(counter.get() + 1));

        controller.start();
        source.fire();
        source.advance_and_fire(1.0);
        source.fire();

        assert_eq!(updates.get(), 2);
        assert_eq!(controller.stats().frames_processed, 2);
        assert_eq!(controller.stats().frames_dropped, 1);
        assert_eq!(controller.elapsed_ms(), 0.0);
        assert_eq!(controller.last_timestamp(), 1.0);
    }

    #[test]
    fn start_requests_a_frame_and_captures_timestamps() {
        let (source, controller) = setup(10);
        source.set_time(250.0);
        controller.start();

        assert!(controller.is_running());
        assert_eq!(source.pending_count(), 1);
        assert!(controller.frame_request().is_some());
        assert_eq!(controller.start_timestamp(), 250.0);
        assert_eq!(controller.last_timestamp(), 250.0);
    }

    #[test]
    fn start_twice_is_idempotent() {
        let (source, controller) = setup(10);
        source.set_time(5.0);
        controller.start();
        let handle = controller.frame_request();

        source.set_time(9.0);
        controller.start();

        assert_eq!(source.pending_count(), 1);
        assert_eq!(source.requested_count(), 1);
        assert_eq!(controller.frame_request(), handle);
        assert_eq!(controller.start_timestamp(), 5.0);
        assert_eq!(controller.last_timestamp(), 5.0);
    }

    #[test]
    fn stop_and_pause_are_noops_when_idle() {
        let (source, controller) = setup(10);
        controller.stop();
        controller.pause();
        assert_eq!(controller.state(), LoopState::Idle);
        assert!(source.cancelled_handles().is_empty());
    }

    #[test]
    fn every_tick_reschedules_before_running_steps() {
        let (source, controller) = setup(10);
        let pending_during_update = Rc::new(Cell::new(0));
        let probe = pending_during_update.clone();
        let observed = source.clone();
        controller.add_update_step(move |_| probe.set(observed.pending_count()));

        controller.start();
        source.advance_and_fire(16.0);

        assert_eq!(pending_during_update.get(), 1);
        assert_eq!(source.pending_count(), 1);
    }

    #[test]
    fn negative_elapsed_is_clamped_to_zero() {
        let (source, controller) = setup(10);
        let seen = Rc::new(Cell::new(-1.0));
        let sink = seen.clone();
        controller.add_update_step(move |dt| sink.set(dt));

        source.set_time(100.0);
        controller.start();
        source.fire_at(90.0);

        assert_eq!(seen.get(), 0.0);
        assert_eq!(controller.elapsed_ms(), 0.0);
        assert_eq!(controller.last_timestamp(), 90.0);
    }

    #[test]
    fn dropping_a_scheduled_controller_cancels_its_frame() {
        let (source, controller) = setup(10);
        controller.start();
        let handle = controller.frame_request().unwrap();

        drop(controller);

        assert_eq!(source.cancelled_handles(), vec![handle]);
        assert_eq!(source.pending_count(), 0);
    }

    #[test]
    fn handle_outliving_controller_is_inert() {
        let (_source, controller) = setup(10);
        let handle = controller.handle();
        let token = controller.add_render_step(|| {});
        drop(controller);

        handle.start();
        assert_eq!(handle.state(), None);
        assert!(handle.add_update_step(|_| {}).is_none());
        assert!(!handle.remove_render_step(token));
    }
}
