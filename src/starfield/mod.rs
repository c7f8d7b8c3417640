//! Starfield background layer
//!
//! `StarfieldRenderer` owns the render state and the frame loop for one
//! surface and drives a `StarfieldBackend` (the wgpu implementation lives in
//! `gpu`). The shading itself is stateless; the only thing that evolves per
//! frame is simulation time and the layer scroll phase derived from it.

pub mod gpu;
pub mod shader;

use crate::config::{GeneralConfig, StarfieldConfig};
use crate::error::AnimError;
use crate::scheduler::{FrameLoop, FrameRequester, FrameThrottle, Tick, Visibility};
use log::{debug, trace};

/// Pixel size of a drawing surface (never zero)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Resolution {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width: width.max(1),
            height: height.max(1),
        }
    }

    pub fn aspect(&self) -> f32 {
        self.width as f32 / self.height as f32
    }

    /// Shrink by a render scale factor, truncating like a canvas size would
    pub fn scaled(self, factor: f32) -> Self {
        Self::new(
            (self.width as f32 * factor) as u32,
            (self.height as f32 * factor) as u32,
        )
    }
}

/// Uniform block shared with `starfield.wgsl` (64 bytes, std140-compatible)
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct StarfieldUniforms {
    /// width, height, aspect
    pub resolution: [f32; 3],
    pub time: f32,
    pub focal: [f32; 2],
    pub rotation: [f32; 2],
    pub star_phase: f32,
    pub density: f32,
    pub speed: f32,
    pub glow_intensity: f32,
    pub saturation: f32,
    pub rotation_speed: f32,
    pub transparent: u32,
    pub _pad: u32,
}

impl StarfieldUniforms {
    pub fn new(config: &StarfieldConfig, resolution: Resolution, time: f32, star_phase: f32) -> Self {
        Self {
            resolution: [
                resolution.width as f32,
                resolution.height as f32,
                resolution.aspect(),
            ],
            time,
            focal: config.focal,
            rotation: config.rotation,
            star_phase,
            density: config.density,
            speed: config.speed,
            glow_intensity: config.glow_intensity,
            saturation: config.saturation,
            rotation_speed: config.rotation_speed,
            transparent: u32::from(config.transparent),
            _pad: 0,
        }
    }
}

/// A GPU surface the starfield can be drawn into
pub trait StarfieldBackend {
    /// Reconfigure the drawing surface to a new pixel size
    fn resize(&mut self, width: u32, height: u32);

    fn write_uniforms(&mut self, uniforms: &StarfieldUniforms);

    /// Submit one full-surface draw and present it. A surface that has
    /// nothing to present right now (lost, outdated, timed out) reports
    /// `Skipped` rather than an error.
    fn draw(&mut self) -> Result<Presentation, AnimError>;

    /// Release the GPU context. Called once, after the frame loop has stopped.
    fn release(self)
    where
        Self: Sized;
}

/// Whether a draw reached the screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Presentation {
    Presented,
    Skipped,
}

/// Frame rate cap and render scale for a starfield surface
#[derive(Debug, Clone, Copy)]
pub struct RenderOptions {
    pub frame_rate: u32,
    pub render_scale: f32,
}

impl From<&GeneralConfig> for RenderOptions {
    fn from(general: &GeneralConfig) -> Self {
        Self {
            frame_rate: general.frame_rate,
            render_scale: general.render_scale,
        }
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        (&GeneralConfig::default()).into()
    }
}

/// What a frame callback ended up doing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// Stale callback, hidden surface or disposed renderer
    Idle,
    /// Callback arrived before the frame interval elapsed
    Throttled,
    /// Drawn, but the surface could not present this time
    Skipped,
    Rendered,
}

#[derive(Debug)]
struct RenderState {
    /// Simulation seconds; only advances on rendered frames
    elapsed: f64,
    resolution: Resolution,
    star_phase: f32,
    /// Timestamp of the previous rendered frame since the loop last started
    last_tick_ms: Option<f64>,
}

pub struct StarfieldRenderer<B: StarfieldBackend> {
    backend: Option<B>,
    config: StarfieldConfig,
    render_scale: f32,
    state: RenderState,
    throttle: FrameThrottle,
    frame_loop: FrameLoop,
    frames_rendered: u64,
    /// Set once the first frame has actually been presented
    ready: bool,
}

impl<B: StarfieldBackend> StarfieldRenderer<B> {
    /// Size the surface to `container` and submit the first frame. The loop
    /// starts right away unless `visibility` is already `Hidden`.
    ///
    /// `on_ready` is called if that first frame was presented. Otherwise the
    /// first `on_frame` that presents calls its own `on_ready` instead.
    pub fn mount<R, F>(
        mut backend: B,
        config: StarfieldConfig,
        container: Resolution,
        options: RenderOptions,
        visibility: Visibility,
        requester: &mut R,
        on_ready: F,
    ) -> Result<Self, AnimError>
    where
        R: FrameRequester,
        F: FnOnce(),
    {
        if let Err(e) = config.validate() {
            backend.release();
            return Err(e);
        }

        let resolution = container.scaled(options.render_scale);
        backend.resize(resolution.width, resolution.height);

        let mut renderer = Self {
            backend: Some(backend),
            config,
            render_scale: options.render_scale,
            state: RenderState {
                elapsed: 0.0,
                resolution,
                star_phase: 0.0,
                last_tick_ms: None,
            },
            throttle: FrameThrottle::from_fps(options.frame_rate),
            frame_loop: FrameLoop::new(),
            frames_rendered: 0,
            ready: false,
        };

        match renderer.submit() {
            Ok(Presentation::Presented) => {
                renderer.ready = true;
                on_ready();
            }
            Ok(Presentation::Skipped) => {
                debug!("First starfield frame not presented, ready deferred")
            }
            Err(e) => {
                renderer.dispose();
                return Err(e);
            }
        }
        debug!(
            "Starfield mounted at {}x{}",
            resolution.width, resolution.height
        );

        if visibility == Visibility::Visible {
            renderer.frame_loop.start(requester);
        }
        Ok(renderer)
    }

    fn uniforms(&self) -> StarfieldUniforms {
        StarfieldUniforms::new(
            &self.config,
            self.state.resolution,
            self.state.elapsed as f32,
            self.state.star_phase,
        )
    }

    fn submit(&mut self) -> Result<Presentation, AnimError> {
        let uniforms = self.uniforms();
        let Some(backend) = self.backend.as_mut() else {
            return Ok(Presentation::Skipped);
        };
        backend.write_uniforms(&uniforms);
        let presented = backend.draw()?;
        if presented == Presentation::Presented {
            self.frames_rendered += 1;
        }
        Ok(presented)
    }

    /// Handle one frame callback at host time `now_ms`. `on_ready` runs if
    /// this is the first frame to reach the screen.
    pub fn on_frame<R, F>(
        &mut self,
        now_ms: f64,
        requester: &mut R,
        on_ready: F,
    ) -> Result<FrameOutcome, AnimError>
    where
        R: FrameRequester,
        F: FnOnce(),
    {
        if self.backend.is_none() || self.frame_loop.on_callback(requester) == Tick::Idle {
            return Ok(FrameOutcome::Idle);
        }
        if !self.throttle.admit(now_ms) {
            return Ok(FrameOutcome::Throttled);
        }

        if !self.config.disable_animation
            && let Some(last) = self.state.last_tick_ms
        {
            self.state.elapsed += (now_ms - last).max(0.0) / 1000.0;
        }
        self.state.last_tick_ms = Some(now_ms);
        self.state.star_phase =
            (self.state.elapsed * f64::from(self.config.star_speed) / 10.0) as f32;

        trace!("Starfield frame t={:.3}s", self.state.elapsed);
        if self.submit()? == Presentation::Skipped {
            return Ok(FrameOutcome::Skipped);
        }
        if !self.ready {
            self.ready = true;
            on_ready();
        }
        Ok(FrameOutcome::Rendered)
    }

    /// React to a new container size. The next rendered frame picks up the
    /// new resolution. No-op after disposal.
    pub fn resize(&mut self, container: Resolution) {
        let resolution = container.scaled(self.render_scale);
        if resolution == self.state.resolution {
            return;
        }
        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        backend.resize(resolution.width, resolution.height);
        self.state.resolution = resolution;
        debug!(
            "Starfield resized to {}x{}",
            resolution.width, resolution.height
        );
    }

    /// Pause or resume the frame loop. Simulation time does not advance
    /// while paused. No-op after disposal.
    pub fn set_visibility<R: FrameRequester>(
        &mut self,
        visibility: Visibility,
        requester: &mut R,
    ) -> bool {
        if self.backend.is_none() {
            return false;
        }
        let changed = self.frame_loop.set_visibility(visibility, requester);
        if changed && visibility == Visibility::Visible {
            self.throttle.reset();
            self.state.last_tick_ms = None;
        }
        changed
    }

    /// Stop the loop, then release the GPU context. Idempotent.
    pub fn dispose(&mut self) {
        self.frame_loop.dispose();
        if let Some(backend) = self.backend.take() {
            backend.release();
            debug!("Starfield disposed after {} frames", self.frames_rendered);
        }
    }
}

#[cfg(test)]
impl<B: StarfieldBackend> StarfieldRenderer<B> {
    fn is_disposed(&self) -> bool {
        self.backend.is_none()
    }

    fn is_running(&self) -> bool {
        self.frame_loop.is_running()
    }

    fn elapsed(&self) -> f64 {
        self.state.elapsed
    }

    fn resolution(&self) -> Resolution {
        self.state.resolution
    }

    fn star_phase(&self) -> f32 {
        self.state.star_phase
    }
}

impl<B: StarfieldBackend> Drop for StarfieldRenderer<B> {
    fn drop(&mut self) {
        self.dispose();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::FrameClock;
    use crate::scheduler::tests::CountingRequester;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[derive(Default)]
    struct Calls {
        resizes: Vec<(u32, u32)>,
        uniforms: Vec<StarfieldUniforms>,
        draws: usize,
        released: bool,
    }

    struct MockBackend {
        calls: Rc<RefCell<Calls>>,
        fail_draw: bool,
        /// Number of upcoming draws that have nothing to present
        skip_draws: usize,
    }

    impl MockBackend {
        fn new(calls: &Rc<RefCell<Calls>>) -> Self {
            Self {
                calls: calls.clone(),
                fail_draw: false,
                skip_draws: 0,
            }
        }
    }

    impl StarfieldBackend for MockBackend {
        fn resize(&mut self, width: u32, height: u32) {
            self.calls.borrow_mut().resizes.push((width, height));
        }

        fn write_uniforms(&mut self, uniforms: &StarfieldUniforms) {
            self.calls.borrow_mut().uniforms.push(*uniforms);
        }

        fn draw(&mut self) -> Result<Presentation, AnimError> {
            if self.fail_draw {
                return Err(AnimError::surface("starfield", "lost"));
            }
            if self.skip_draws > 0 {
                self.skip_draws -= 1;
                return Ok(Presentation::Skipped);
            }
            self.calls.borrow_mut().draws += 1;
            Ok(Presentation::Presented)
        }

        fn release(self) {
            self.calls.borrow_mut().released = true;
        }
    }

    fn mounted(
        config: StarfieldConfig,
    ) -> (
        StarfieldRenderer<MockBackend>,
        Rc<RefCell<Calls>>,
        CountingRequester,
    ) {
        let calls = Rc::new(RefCell::new(Calls::default()));
        let mut req = CountingRequester::default();
        let renderer = StarfieldRenderer::mount(
            MockBackend::new(&calls),
            config,
            Resolution::new(1920, 1080),
            RenderOptions::default(),
            Visibility::Visible,
            &mut req,
            || {},
        )
        .unwrap();
        (renderer, calls, req)
    }

    fn frame(
        renderer: &mut StarfieldRenderer<MockBackend>,
        now_ms: f64,
        req: &mut CountingRequester,
    ) -> FrameOutcome {
        renderer.on_frame(now_ms, req, || {}).unwrap()
    }

    #[test]
    fn uniform_block_matches_wgsl_layout() {
        assert_eq!(std::mem::size_of::<StarfieldUniforms>(), 64);
    }

    #[test]
    fn ready_fires_once_after_first_draw() {
        let calls = Rc::new(RefCell::new(Calls::default()));
        let fired = Cell::new(0);
        let mut req = CountingRequester::default();
        let mut renderer = StarfieldRenderer::mount(
            MockBackend::new(&calls),
            StarfieldConfig::default(),
            Resolution::new(800, 600),
            RenderOptions::default(),
            Visibility::Visible,
            &mut req,
            || {
                assert_eq!(calls.borrow().draws, 1);
                fired.set(fired.get() + 1);
            },
        )
        .unwrap();
        assert_eq!(fired.get(), 1);
        assert!(renderer.is_running());
        assert_eq!(req.requests, 1);

        renderer
            .on_frame(100.0, &mut req, || fired.set(fired.get() + 1))
            .unwrap();
        assert_eq!(fired.get(), 1);
    }

    #[test]
    fn ready_waits_for_a_presented_frame() {
        let calls = Rc::new(RefCell::new(Calls::default()));
        let mut backend = MockBackend::new(&calls);
        backend.skip_draws = 2;
        let fired = Cell::new(0);
        let mut req = CountingRequester::default();
        let mut renderer = StarfieldRenderer::mount(
            backend,
            StarfieldConfig::default(),
            Resolution::new(800, 600),
            RenderOptions::default(),
            Visibility::Visible,
            &mut req,
            || fired.set(fired.get() + 1),
        )
        .unwrap();
        assert_eq!(fired.get(), 0);
        // the loop runs regardless, so the surface gets another chance
        assert!(renderer.is_running());

        let on_ready = || fired.set(fired.get() + 1);
        assert_eq!(
            renderer.on_frame(100.0, &mut req, on_ready).unwrap(),
            FrameOutcome::Skipped
        );
        assert_eq!(fired.get(), 0);
        assert_eq!(
            renderer.on_frame(200.0, &mut req, on_ready).unwrap(),
            FrameOutcome::Rendered
        );
        assert_eq!(fired.get(), 1);
        renderer.on_frame(300.0, &mut req, on_ready).unwrap();
        assert_eq!(fired.get(), 1);
        assert_eq!(calls.borrow().draws, 2);
    }

    #[test]
    fn mount_while_hidden_waits_for_visibility() {
        let calls = Rc::new(RefCell::new(Calls::default()));
        let mut req = CountingRequester::default();
        let mut renderer = StarfieldRenderer::mount(
            MockBackend::new(&calls),
            StarfieldConfig::default(),
            Resolution::new(800, 600),
            RenderOptions::default(),
            Visibility::Hidden,
            &mut req,
            || {},
        )
        .unwrap();
        // first frame is still drawn, but no loop
        assert_eq!(calls.borrow().draws, 1);
        assert_eq!(req.requests, 0);
        assert!(!renderer.is_running());

        assert!(renderer.set_visibility(Visibility::Visible, &mut req));
        assert_eq!(req.requests, 1);
        assert_eq!(frame(&mut renderer, 50.0, &mut req), FrameOutcome::Rendered);
    }

    #[test]
    fn surface_is_sized_below_native() {
        let (renderer, calls, _) = mounted(StarfieldConfig::default());
        assert_eq!(calls.borrow().resizes, vec![(1440, 810)]);
        assert_eq!(renderer.resolution(), Resolution::new(1440, 810));
        let u = calls.borrow().uniforms[0];
        assert_eq!(u.resolution, [1440.0, 810.0, 1440.0 / 810.0]);
    }

    #[test]
    fn resize_reaches_the_next_frame() {
        let (mut renderer, calls, mut req) = mounted(StarfieldConfig::default());
        let written = calls.borrow().uniforms.len();
        renderer.resize(Resolution::new(1000, 1000));
        assert_eq!(calls.borrow().resizes.last(), Some(&(750, 750)));
        // nothing is uploaded until a frame is drawn
        assert_eq!(calls.borrow().uniforms.len(), written);

        frame(&mut renderer, 16.0, &mut req);
        let calls = calls.borrow();
        assert_eq!(calls.uniforms.last().unwrap().resolution, [750.0, 750.0, 1.0]);
        assert_eq!(calls.draws, 2);
    }

    #[test]
    fn fast_callbacks_are_throttled() {
        let (mut renderer, calls, mut req) = mounted(StarfieldConfig::default());
        let mut now = 0.0;
        let mut throttled = 0;
        // one second at 60 Hz
        for _ in 0..60 {
            now += 1000.0 / 60.0;
            if frame(&mut renderer, now, &mut req) == FrameOutcome::Throttled {
                throttled += 1;
            }
        }
        let loop_draws = calls.borrow().draws - 1;
        assert!(loop_draws <= 46, "{} draws in one second", loop_draws);
        assert!(throttled > 0);
        // every callback kept the chain alive
        assert_eq!(req.requests, 61);
    }

    #[test]
    fn frames_keep_rendering_across_timestamp_wrap() {
        let (mut renderer, calls, mut req) = mounted(StarfieldConfig::default());
        let mut clock = FrameClock::new();
        let mut stamp = u32::MAX - 1000;
        for _ in 0..180 {
            frame(&mut renderer, clock.advance(stamp), &mut req);
            stamp = stamp.wrapping_add(16);
        }
        let rendered = calls.borrow().draws - 1;
        // 62 callbacks land before the wrap; every other one of the 180 is admitted
        assert!(rendered >= 85, "only {} frames rendered", rendered);
        assert!((renderer.elapsed() - 2.85).abs() < 0.05, "{}", renderer.elapsed());
    }

    #[test]
    fn no_work_while_hidden_and_immediate_resume() {
        let (mut renderer, calls, mut req) = mounted(StarfieldConfig::default());
        frame(&mut renderer, 100.0, &mut req);
        assert!(renderer.set_visibility(Visibility::Hidden, &mut req));

        let before = (calls.borrow().draws, calls.borrow().uniforms.len());
        // the callback that was already in flight, then nothing more
        assert_eq!(frame(&mut renderer, 200.0, &mut req), FrameOutcome::Idle);
        assert_eq!(frame(&mut renderer, 300.0, &mut req), FrameOutcome::Idle);
        assert_eq!(before, (calls.borrow().draws, calls.borrow().uniforms.len()));

        let requests = req.requests;
        assert!(renderer.set_visibility(Visibility::Visible, &mut req));
        assert_eq!(req.requests, requests + 1);
        assert_eq!(frame(&mut renderer, 310.0, &mut req), FrameOutcome::Rendered);
    }

    #[test]
    fn time_is_frozen_while_hidden() {
        let (mut renderer, _, mut req) = mounted(StarfieldConfig::default());
        frame(&mut renderer, 1000.0, &mut req);
        frame(&mut renderer, 2000.0, &mut req);
        assert!((renderer.elapsed() - 1.0).abs() < 1e-9);

        renderer.set_visibility(Visibility::Hidden, &mut req);
        renderer.set_visibility(Visibility::Visible, &mut req);
        frame(&mut renderer, 60_000.0, &mut req);
        assert!((renderer.elapsed() - 1.0).abs() < 1e-9);
        frame(&mut renderer, 60_500.0, &mut req);
        assert!((renderer.elapsed() - 1.5).abs() < 1e-9);
    }

    #[test]
    fn star_phase_follows_elapsed_time() {
        let (mut renderer, _, mut req) = mounted(StarfieldConfig::default());
        frame(&mut renderer, 0.0, &mut req);
        frame(&mut renderer, 2000.0, &mut req);
        // 2 s * 0.15 / 10
        assert!((renderer.star_phase() - 0.03).abs() < 1e-6);
    }

    #[test]
    fn disabled_animation_draws_without_advancing() {
        let config = StarfieldConfig {
            disable_animation: true,
            ..Default::default()
        };
        let (mut renderer, calls, mut req) = mounted(config);
        frame(&mut renderer, 0.0, &mut req);
        frame(&mut renderer, 5000.0, &mut req);
        assert_eq!(renderer.elapsed(), 0.0);
        assert_eq!(calls.borrow().draws, 3);
    }

    #[test]
    fn invalid_config_fails_mount_without_drawing() {
        let calls = Rc::new(RefCell::new(Calls::default()));
        let mut req = CountingRequester::default();
        let config = StarfieldConfig {
            speed: -1.0,
            ..Default::default()
        };
        let result = StarfieldRenderer::mount(
            MockBackend::new(&calls),
            config,
            Resolution::new(10, 10),
            RenderOptions::default(),
            Visibility::Visible,
            &mut req,
            || panic!("ready must not fire"),
        );
        assert!(matches!(result, Err(AnimError::InvalidConfig { .. })));
        assert_eq!(calls.borrow().draws, 0);
        assert!(calls.borrow().released);
        assert_eq!(req.requests, 0);
    }

    #[test]
    fn failed_first_frame_releases_backend() {
        let calls = Rc::new(RefCell::new(Calls::default()));
        let mut backend = MockBackend::new(&calls);
        backend.fail_draw = true;
        let mut req = CountingRequester::default();
        let result = StarfieldRenderer::mount(
            backend,
            StarfieldConfig::default(),
            Resolution::new(10, 10),
            RenderOptions::default(),
            Visibility::Visible,
            &mut req,
            || panic!("ready must not fire"),
        );
        assert!(matches!(
            result,
            Err(AnimError::SurfaceUnavailable { .. })
        ));
        assert!(calls.borrow().released);
    }

    #[test]
    fn stale_events_after_dispose_do_nothing() {
        let (mut renderer, calls, mut req) = mounted(StarfieldConfig::default());
        frame(&mut renderer, 16.0, &mut req);
        renderer.dispose();
        assert!(renderer.is_disposed());
        assert!(calls.borrow().released);

        let draws = calls.borrow().draws;
        let resizes = calls.borrow().resizes.len();
        let requests = req.requests;
        renderer.resize(Resolution::new(640, 480));
        assert!(!renderer.set_visibility(Visibility::Visible, &mut req));
        assert_eq!(frame(&mut renderer, 64.0, &mut req), FrameOutcome::Idle);
        renderer.dispose();

        assert_eq!(calls.borrow().draws, draws);
        assert_eq!(calls.borrow().resizes.len(), resizes);
        assert_eq!(req.requests, requests);
    }

    #[test]
    fn drop_releases_backend() {
        let (renderer, calls, _) = mounted(StarfieldConfig::default());
        drop(renderer);
        assert!(calls.borrow().released);
    }
}
