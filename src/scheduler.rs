//! Frame scheduling shared by both animation layers
//!
//! The compositor's frame callback plays the role of an animation-frame
//! request: each callback must ask for the next one or the chain ends.
//! `FrameLoop` owns that chain and decides whether a callback that arrives
//! is still wanted. A callback can't be withdrawn once requested, so
//! stopping the loop only marks the in-flight callback as stale.

/// Something that can ask the host for one more frame callback
pub trait FrameRequester {
    fn request_frame(&mut self);
}

/// Whether a surface is currently on screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Visibility {
    Visible,
    Hidden,
}

/// Caps redraw work to a target rate regardless of how often callbacks arrive
#[derive(Debug, Clone)]
pub struct FrameThrottle {
    interval_ms: f64,
    last: Option<f64>,
}

impl FrameThrottle {
    pub fn from_fps(fps: u32) -> Self {
        Self {
            interval_ms: 1000.0 / f64::from(fps.max(1)),
            last: None,
        }
    }

    #[cfg(test)]
    pub fn interval_ms(&self) -> f64 {
        self.interval_ms
    }

    /// Returns true when enough time has passed since the last admitted frame
    pub fn admit(&mut self, now_ms: f64) -> bool {
        if let Some(last) = self.last
            && now_ms - last < self.interval_ms
        {
            return false;
        }
        self.last = Some(now_ms);
        true
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}

/// Monotonic milliseconds from `wl_callback.done` timestamps
///
/// Frame timestamps are 32-bit milliseconds with an undefined base and wrap
/// after about 49.7 days. Only the forward distance between consecutive
/// stamps is accumulated, so the clock keeps counting across the wrap.
#[derive(Debug, Clone, Default)]
pub struct FrameClock {
    last: Option<u32>,
    now_ms: f64,
}

impl FrameClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one raw timestamp and return the extended time. A stamp older
    /// than the previous one counts as no time passing.
    pub fn advance(&mut self, stamp: u32) -> f64 {
        if let Some(last) = self.last {
            let delta = stamp.wrapping_sub(last);
            if delta <= i32::MAX as u32 {
                self.now_ms += f64::from(delta);
            }
        }
        self.last = Some(stamp);
        self.now_ms
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoopState {
    Stopped,
    Running,
    Disposed,
}

/// What a frame callback should do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
    /// The loop is live; the next callback has already been requested
    Run,
    /// Stale or post-disposal callback; do nothing
    Idle,
}

#[derive(Debug)]
pub struct FrameLoop {
    state: LoopState,
    in_flight: bool,
}

impl Default for FrameLoop {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameLoop {
    pub fn new() -> Self {
        Self {
            state: LoopState::Stopped,
            in_flight: false,
        }
    }

    #[cfg(test)]
    pub fn is_running(&self) -> bool {
        self.state == LoopState::Running
    }

    pub fn is_disposed(&self) -> bool {
        self.state == LoopState::Disposed
    }

    /// Start (or resume) the loop. Returns false if it was already running
    /// or has been disposed.
    pub fn start(&mut self, requester: &mut impl FrameRequester) -> bool {
        if self.state != LoopState::Stopped {
            return false;
        }
        self.state = LoopState::Running;
        // A callback from before the last stop may still be pending; adopt it
        // rather than opening a second chain.
        if !self.in_flight {
            requester.request_frame();
            self.in_flight = true;
        }
        true
    }

    /// Stop the loop. Returns false if it was not running.
    pub fn stop(&mut self) -> bool {
        if self.state != LoopState::Running {
            return false;
        }
        self.state = LoopState::Stopped;
        true
    }

    pub fn dispose(&mut self) {
        self.state = LoopState::Disposed;
    }

    /// Called on every frame callback. Requests the next callback before
    /// returning `Tick::Run` so throttled frames keep the chain alive.
    pub fn on_callback(&mut self, requester: &mut impl FrameRequester) -> Tick {
        self.in_flight = false;
        if self.state != LoopState::Running {
            return Tick::Idle;
        }
        requester.request_frame();
        self.in_flight = true;
        Tick::Run
    }

    /// Apply a visibility report: start when visible, stop when hidden.
    /// Returns true if the loop state changed.
    pub fn set_visibility(
        &mut self,
        visibility: Visibility,
        requester: &mut impl FrameRequester,
    ) -> bool {
        match visibility {
            Visibility::Visible => self.start(requester),
            Visibility::Hidden => self.stop(),
        }
    }
}
