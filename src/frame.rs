//! Frame timing and the per-frame state machine.
//!
//! A host (winit redraw, `requestAnimationFrame`, or the headless loop)
//! calls [`FrameScheduler::request`] when it has arranged for a callback
//! and [`FrameScheduler::run_tick`] from that callback. Each tick advances
//! the target with the frame time before it renders.

use std::cell::Cell;
use std::fmt;

use log::error;
use thiserror::Error;

use crate::render::RenderError;

/// Source of wall-clock seconds. Only differences between readings matter.
pub trait TimeSource {
    fn now_seconds(&self) -> f64;
}

#[cfg(not(target_arch = "wasm32"))]
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    start: std::time::Instant,
}

#[cfg(not(target_arch = "wasm32"))]
impl Default for SystemClock {
    fn default() -> Self {
        Self {
            start: std::time::Instant::now(),
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
impl TimeSource for SystemClock {
    fn now_seconds(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

/// `performance.now()` of the page.
#[cfg(target_arch = "wasm32")]
pub struct PerformanceClock {
    performance: web_sys::Performance,
}

#[cfg(target_arch = "wasm32")]
impl PerformanceClock {
    pub fn new() -> Option<Self> {
        let performance = web_sys::window()?.performance()?;
        Some(Self { performance })
    }
}

#[cfg(target_arch = "wasm32")]
impl TimeSource for PerformanceClock {
    fn now_seconds(&self) -> f64 {
        self.performance.now() / 1000.0
    }
}

/// Clock that only moves when told to; drives headless runs and tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: Cell<f64>,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self {
            now: Cell::new(start),
        }
    }

    pub fn set(&self, seconds: f64) {
        self.now.set(seconds);
    }

    pub fn advance(&self, seconds: f64) {
        self.now.set(self.now.get() + seconds);
    }
}

impl TimeSource for ManualClock {
    fn now_seconds(&self) -> f64 {
        self.now.get()
    }
}

impl<T: TimeSource + ?Sized> TimeSource for &T {
    fn now_seconds(&self) -> f64 {
        (**self).now_seconds()
    }
}

/// Timing of one tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FrameTime {
    /// Seconds since the first tick.
    pub elapsed: f64,
    /// Seconds since the previous tick, never negative.
    pub delta: f32,
    /// Zero-based index of the tick.
    pub frame: u64,
}

/// Monotonic elapsed-time tracker over a [`TimeSource`].
#[derive(Debug)]
pub struct FrameClock<T> {
    source: T,
    start: Option<f64>,
    elapsed: f64,
    frames: u64,
}

impl<T: TimeSource> FrameClock<T> {
    pub fn new(source: T) -> Self {
        Self {
            source,
            start: None,
            elapsed: 0.0,
            frames: 0,
        }
    }

    pub fn source(&self) -> &T {
        &self.source
    }

    /// Reads the source and returns the time for the next frame. A source
    /// that jumps backwards holds the clock still.
    pub fn tick(&mut self) -> FrameTime {
        let now = self.source.now_seconds();
        let start = *self.start.get_or_insert(now);
        let elapsed = (now - start).max(self.elapsed);
        let delta = (elapsed - self.elapsed) as f32;
        self.elapsed = elapsed;
        let frame = self.frames;
        self.frames += 1;
        FrameTime {
            elapsed,
            delta,
            frame,
        }
    }

    pub fn elapsed(&self) -> f64 {
        self.elapsed
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameState {
    Idle,
    Scheduled,
    Executing,
}

impl fmt::Display for FrameState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FrameState::Idle => "idle",
            FrameState::Scheduled => "scheduled",
            FrameState::Executing => "executing",
        };
        f.write_str(name)
    }
}

/// What a tick drives.
pub trait FrameTarget {
    /// Moves time-dependent state (camera controls) forward.
    fn advance(&mut self, time: FrameTime);
    /// Draws the current state.
    fn render(&mut self) -> Result<(), RenderError>;
}

#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("tick requested while the scheduler is {0}")]
    NotScheduled(FrameState),
    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Idle → Scheduled → Executing → Scheduled, for as long as the host keeps
/// calling back.
#[derive(Debug)]
pub struct FrameScheduler<T> {
    clock: FrameClock<T>,
    state: FrameState,
}

impl<T: TimeSource> FrameScheduler<T> {
    pub fn new(source: T) -> Self {
        Self {
            clock: FrameClock::new(source),
            state: FrameState::Idle,
        }
    }

    pub fn state(&self) -> FrameState {
        self.state
    }

    pub fn clock(&self) -> &FrameClock<T> {
        &self.clock
    }

    /// Marks a tick as pending. Returns `false` when one already is, or a
    /// tick is running and will reschedule itself.
    pub fn request(&mut self) -> bool {
        if self.state == FrameState::Idle {
            self.state = FrameState::Scheduled;
            true
        } else {
            false
        }
    }

    /// Stops the loop after the current tick.
    pub fn stop(&mut self) {
        self.state = FrameState::Idle;
    }

    /// Runs one tick: advance, then render. On success the next tick is
    /// scheduled; a render failure stops the loop.
    pub fn run_tick<F: FrameTarget + ?Sized>(&mut self, target: &mut F) -> Result<FrameTime, SchedulerError> {
        if self.state != FrameState::Scheduled {
            return Err(SchedulerError::NotScheduled(self.state));
        }
        self.state = FrameState::Executing;

        let time = self.clock.tick();
        target.advance(time);
        match target.render() {
            Ok(()) => {
                self.state = FrameState::Scheduled;
                Ok(time)
            }
            Err(err) => {
                error!("frame {} failed, stopping: {err}", time.frame);
                self.state = FrameState::Idle;
                Err(err.into())
            }
        }
    }
}
