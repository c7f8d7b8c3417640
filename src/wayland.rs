//! Wayland host
//!
//! Owns the layer-shell surfaces both animation layers draw into:
//! - One background layer per output, rendered by the wgpu starfield at a
//!   reduced resolution and stretched back to output size with wp_viewporter
//! - A single overlay layer with an empty input region for the comet,
//!   drawn on the CPU into shm buffers
//!
//! Frame callbacks on each surface pace its animation. Visibility changes
//! arrive from the Hyprland thread as `BackdropCommand`s.

use crate::comet::Step;
use crate::comet::canvas::PixelCanvas;
use crate::comet::run::{CometRun, FrameSink};
use crate::config::Config;
use crate::error::AnimError;
use crate::host::CometCue;
use crate::registry::SurfaceRegistry;
use crate::scheduler::{FrameClock, FrameRequester, Visibility};
use crate::starfield::gpu::GpuStarfield;
use crate::starfield::{RenderOptions, Resolution, StarfieldRenderer};
use log::{debug, error, info, warn};
use smithay_client_toolkit::reexports::calloop::LoopHandle;
use smithay_client_toolkit::reexports::calloop::timer::{TimeoutAction, Timer};
use smithay_client_toolkit::{
    compositor::{CompositorHandler, CompositorState, Region},
    delegate_compositor, delegate_layer, delegate_output, delegate_registry, delegate_shm,
    output::{OutputHandler, OutputState},
    registry::{ProvidesRegistryState, RegistryState},
    registry_handlers,
    shell::{
        WaylandSurface,
        wlr_layer::{
            Anchor, KeyboardInteractivity, Layer, LayerShell, LayerShellHandler, LayerSurface,
            LayerSurfaceConfigure,
        },
    },
    shm::{
        Shm, ShmHandler,
        slot::{Buffer, SlotPool},
    },
};
use wayland_client::globals::registry_queue_init;
use wayland_client::protocol::{wl_output, wl_shm, wl_surface::WlSurface};
use wayland_client::{Connection, Dispatch, EventQueue, QueueHandle};
use wayland_protocols::wp::viewporter::client::{
    wp_viewport::{self, WpViewport},
    wp_viewporter::{self, WpViewporter},
};

/// Commands sent to the Wayland thread from the IPC side
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackdropCommand {
    SetVisibility {
        monitor: String,
        visibility: Visibility,
    },
    Shutdown,
}

/// Frame callback plus commit on one surface
struct WlFrameRequester<'a> {
    surface: &'a WlSurface,
    qh: &'a QueueHandle<Backdrop>,
}

impl FrameRequester for WlFrameRequester<'_> {
    fn request_frame(&mut self) {
        self.surface.frame(self.qh, self.surface.clone());
        self.surface.commit();
    }
}

/// Starfield layer of one output
struct BackgroundSurface {
    output: wl_output::WlOutput,
    layer: LayerSurface,
    viewport: Option<WpViewport>,
    renderer: Option<StarfieldRenderer<GpuStarfield>>,
    /// Visibility reported before the first configure
    pending: Visibility,
    clock: FrameClock,
}

impl Drop for BackgroundSurface {
    fn drop(&mut self) {
        // The GPU surface must go before the wl_surface it points at
        if let Some(mut renderer) = self.renderer.take() {
            renderer.dispose();
        }
        if let Some(viewport) = self.viewport.take() {
            viewport.destroy();
        }
    }
}

fn comet_unavailable(reason: impl std::fmt::Display) -> AnimError {
    AnimError::surface("comet", reason)
}

/// shm buffers of the comet overlay surface
struct ShmSink {
    layer: LayerSurface,
    pool: Option<SlotPool>,
    buffer: Option<Buffer>,
}

impl FrameSink for ShmSink {
    fn present(&mut self, canvas: &mut PixelCanvas) -> Result<(), AnimError> {
        let (width, height) = canvas.size();
        let Some(pool) = self.pool.as_mut() else {
            return Err(comet_unavailable("no shm pool"));
        };
        let (w, h, stride) = (width as i32, height as i32, width as i32 * 4);

        let mut buffer = match self.buffer.take() {
            Some(b) if b.height() == h && b.stride() == stride => b,
            _ => {
                pool.create_buffer(w, h, stride, wl_shm::Format::Argb8888)
                    .map_err(comet_unavailable)?
                    .0
            }
        };
        let data = match pool.canvas(&buffer) {
            Some(data) => data,
            None => {
                // Still held by the compositor
                let (fresh, data) = pool
                    .create_buffer(w, h, stride, wl_shm::Format::Argb8888)
                    .map_err(comet_unavailable)?;
                buffer = fresh;
                data
            }
        };
        canvas.present_into(data);

        let surface = self.layer.wl_surface();
        buffer
            .attach_to(surface)
            .map_err(|e| comet_unavailable(format!("{:?}", e)))?;
        surface.damage_buffer(0, 0, w, h);
        surface.commit();
        self.buffer = Some(buffer);
        Ok(())
    }
}

/// Overlay layer carrying the comet flyby
struct CometOverlay {
    output_name: String,
    sink: ShmSink,
    run: CometRun,
}

impl CometOverlay {
    fn surface(&self) -> &WlSurface {
        self.sink.layer.wl_surface()
    }
}

pub struct Backdrop {
    registry_state: RegistryState,
    output_state: OutputState,
    compositor: CompositorState,
    layer_shell: LayerShell,
    shm: Shm,
    viewporter: Option<WpViewporter>,

    gpu: wgpu::Instance,
    conn: Connection,
    qh: QueueHandle<Backdrop>,
    loop_handle: LoopHandle<'static, Backdrop>,

    config: Config,
    options: RenderOptions,
    backgrounds: SurfaceRegistry<BackgroundSurface>,
    comet: Option<CometOverlay>,
    cue: CometCue,

    pub exit: bool,
}

impl Backdrop {
    /// Bind the globals both layers need. Outputs are picked up as they are
    /// announced during the first roundtrips.
    pub fn new(
        conn: &Connection,
        config: Config,
        loop_handle: LoopHandle<'static, Backdrop>,
    ) -> Result<(Self, EventQueue<Self>), AnimError> {
        let (globals, event_queue) = registry_queue_init::<Backdrop>(conn)
            .map_err(|e| AnimError::Wayland(format!("registry: {}", e)))?;
        let qh = event_queue.handle();

        let compositor = CompositorState::bind(&globals, &qh)
            .map_err(|e| AnimError::Wayland(format!("wl_compositor: {}", e)))?;
        let layer_shell = LayerShell::bind(&globals, &qh)
            .map_err(|e| AnimError::Wayland(format!("zwlr_layer_shell_v1: {}", e)))?;
        let shm = Shm::bind(&globals, &qh)
            .map_err(|e| AnimError::Wayland(format!("wl_shm: {}", e)))?;
        let viewporter = match globals.bind::<WpViewporter, _, _>(&qh, 1..=1, ()) {
            Ok(vp) => Some(vp),
            Err(e) => {
                warn!("wp_viewporter unavailable ({}), rendering at full size", e);
                None
            }
        };

        let mut options = RenderOptions::from(&config.general);
        if viewporter.is_none() {
            options.render_scale = 1.0;
        }

        let cue = CometCue::new(&config.comet);
        let state = Self {
            registry_state: RegistryState::new(&globals),
            output_state: OutputState::new(&globals, &qh),
            compositor,
            layer_shell,
            shm,
            viewporter,
            gpu: wgpu::Instance::default(),
            conn: conn.clone(),
            qh,
            loop_handle,
            config,
            options,
            backgrounds: SurfaceRegistry::new(),
            comet: None,
            cue,
            exit: false,
        };
        Ok((state, event_queue))
    }

    pub fn handle_command(&mut self, cmd: BackdropCommand) {
        match cmd {
            BackdropCommand::SetVisibility {
                monitor,
                visibility,
            } => self.set_visibility(&monitor, visibility),
            BackdropCommand::Shutdown => {
                info!("Shutdown requested");
                self.exit = true;
            }
        }
    }

    fn set_visibility(&mut self, monitor: &str, visibility: Visibility) {
        let Some(bg) = self.backgrounds.get_mut(monitor) else {
            return;
        };
        let BackgroundSurface {
            layer,
            renderer,
            pending,
            ..
        } = bg;
        match renderer {
            Some(renderer) => {
                let mut req = WlFrameRequester {
                    surface: layer.wl_surface(),
                    qh: &self.qh,
                };
                if renderer.set_visibility(visibility, &mut req) {
                    info!("Starfield on {} {:?}", monitor, visibility);
                }
            }
            None => *pending = visibility,
        }
    }

    /// Tear down every layer, disposing GPU contexts first
    pub fn shutdown(&mut self) {
        self.comet = None;
        for (name, _) in self.backgrounds.drain() {
            debug!("Removed starfield on {}", name);
        }
    }

    fn output_name(&self, output: &wl_output::WlOutput) -> Option<String> {
        self.output_state.info(output).and_then(|info| info.name)
    }

    fn add_background(&mut self, qh: &QueueHandle<Self>, output: wl_output::WlOutput) {
        let Some(name) = self.output_name(&output) else {
            warn!("Output without a name, skipping");
            return;
        };
        if !self.config.output_enabled(&name) {
            info!("Starfield disabled on {}", name);
            return;
        }
        if self.backgrounds.contains(&name) {
            warn!("Starfield already present on {}", name);
            return;
        }

        let surface = self.compositor.create_surface(qh);
        let viewport = self
            .viewporter
            .as_ref()
            .map(|vp| vp.get_viewport(&surface, qh, ()));
        let layer = self.layer_shell.create_layer_surface(
            qh,
            surface,
            Layer::Background,
            Some("starfall"),
            Some(&output),
        );
        layer.set_anchor(Anchor::all());
        layer.set_exclusive_zone(-1);
        layer.set_keyboard_interactivity(KeyboardInteractivity::None);
        layer.set_size(0, 0);
        layer.commit();

        let bg = BackgroundSurface {
            output,
            layer,
            viewport,
            renderer: None,
            pending: Visibility::Visible,
            clock: FrameClock::new(),
        };
        match self.backgrounds.register(name.clone(), bg) {
            Ok(_) => info!("Created starfield layer on {}", name),
            Err(e) => warn!("{}", e),
        }
    }

    fn remove_background(&mut self, name: &str) {
        if self.backgrounds.remove(name).is_some() {
            info!("Removed starfield on {}", name);
        }
        if self.comet.as_ref().is_some_and(|c| c.output_name == name) {
            info!("Comet output {} went away, dropping comet", name);
            self.comet = None;
        }
    }

    fn configure_background(&mut self, qh: &QueueHandle<Self>, surface: &WlSurface, size: (u32, u32)) {
        let Some((name, bg)) = self
            .backgrounds
            .find_mut(|b| b.layer.wl_surface() == surface)
        else {
            return;
        };
        let name = name.to_string();
        let (mut width, mut height) = size;
        if width == 0 || height == 0 {
            let logical = self
                .output_state
                .info(&bg.output)
                .and_then(|info| info.logical_size)
                .unwrap_or((1, 1));
            (width, height) = (logical.0.max(1) as u32, logical.1.max(1) as u32);
        }
        if let Some(viewport) = &bg.viewport {
            viewport.set_destination(width as i32, height as i32);
        }
        let container = Resolution::new(width, height);

        if let Some(renderer) = bg.renderer.as_mut() {
            renderer.resize(container);
            return;
        }

        let backend = match GpuStarfield::new(
            &self.gpu,
            &self.conn,
            bg.layer.wl_surface(),
            self.config.starfield.transparent,
        ) {
            Ok(backend) => backend,
            Err(e) => {
                warn!("Starfield omitted on {}: {}", name, e);
                self.remove_background(&name);
                return;
            }
        };

        let mut req = WlFrameRequester {
            surface: bg.layer.wl_surface(),
            qh,
        };
        let mut ready = false;
        match StarfieldRenderer::mount(
            backend,
            self.config.starfield.clone(),
            container,
            self.options,
            bg.pending,
            &mut req,
            || ready = true,
        ) {
            Ok(renderer) => {
                bg.renderer = Some(renderer);
                info!("Starfield running on {} ({}x{})", name, width, height);
            }
            Err(e) => {
                warn!("Starfield omitted on {}: {}", name, e);
                self.remove_background(&name);
                return;
            }
        }

        if ready {
            self.starfield_ready(&name);
        }
    }

    fn starfield_ready(&mut self, name: &str) {
        let Some(delay) = self.cue.arm(name) else {
            return;
        };
        let timer = Timer::from_duration(delay);
        if let Err(e) = self
            .loop_handle
            .insert_source(timer, |_, _, state: &mut Backdrop| {
                state.launch_comet();
                TimeoutAction::Drop
            })
        {
            warn!("Failed to schedule comet: {}", e.error);
        }
    }

    fn launch_comet(&mut self) {
        let Some(name) = self.cue.fire() else {
            return;
        };
        let Some(output) = self.backgrounds.get_mut(&name).map(|bg| bg.output.clone()) else {
            warn!("Comet output {} is gone, skipping flyby", name);
            return;
        };

        let surface = self.compositor.create_surface(&self.qh);
        // Clicks pass through to whatever is below
        match Region::new(&self.compositor) {
            Ok(region) => surface.set_input_region(Some(region.wl_region())),
            Err(e) => {
                warn!("Comet omitted: {}", e);
                return;
            }
        }
        let layer = self.layer_shell.create_layer_surface(
            &self.qh,
            surface,
            Layer::Overlay,
            Some("starfall-comet"),
            Some(&output),
        );
        layer.set_anchor(Anchor::all());
        layer.set_exclusive_zone(-1);
        layer.set_keyboard_interactivity(KeyboardInteractivity::None);
        layer.set_size(0, 0);
        layer.commit();

        info!("Launching comet on {}", name);
        self.comet = Some(CometOverlay {
            output_name: name,
            sink: ShmSink {
                layer,
                pool: None,
                buffer: None,
            },
            run: CometRun::new(),
        });
    }

    fn configure_comet(&mut self, qh: &QueueHandle<Self>, size: (u32, u32)) {
        let Some(comet) = self.comet.as_mut() else {
            return;
        };
        let (width, height) = (size.0.max(1), size.1.max(1));
        if comet.sink.pool.is_none() {
            match SlotPool::new(width as usize * height as usize * 4, &self.shm) {
                Ok(pool) => comet.sink.pool = Some(pool),
                Err(e) => {
                    warn!("Comet omitted: {}", e);
                    self.comet = None;
                    return;
                }
            }
        }

        let surface = comet.surface().clone();
        let mut req = WlFrameRequester {
            surface: &surface,
            qh,
        };
        if let Err(e) = comet.run.configure(width, height, &mut comet.sink, &mut req) {
            warn!("Comet omitted: {}", e);
            self.comet = None;
        }
    }

    fn comet_frame(&mut self, qh: &QueueHandle<Self>, time: u32) {
        let Some(comet) = self.comet.as_mut() else {
            return;
        };
        let surface = comet.surface().clone();
        let mut req = WlFrameRequester {
            surface: &surface,
            qh,
        };
        match comet.run.on_frame(time, &mut comet.sink, &mut req) {
            Ok(Step::Finished) => {
                debug!("Removing comet overlay");
                self.comet = None;
            }
            Ok(_) => {}
            Err(e) => {
                warn!("Comet stopped: {}", e);
                self.comet = None;
            }
        }
    }

    fn starfield_frame(&mut self, qh: &QueueHandle<Self>, surface: &WlSurface, time: u32) {
        let Some((name, bg)) = self
            .backgrounds
            .find_mut(|b| b.layer.wl_surface() == surface)
        else {
            return;
        };
        let Some(renderer) = bg.renderer.as_mut() else {
            return;
        };
        let name = name.to_string();
        let now_ms = bg.clock.advance(time);
        let mut req = WlFrameRequester { surface, qh };
        let mut ready = false;
        if let Err(e) = renderer.on_frame(now_ms, &mut req, || ready = true) {
            error!("Starfield on {} failed: {}", name, e);
            self.remove_background(&name);
            return;
        }
        if ready {
            debug!("First starfield frame presented on {}", name);
            self.starfield_ready(&name);
        }
    }
}

impl CompositorHandler for Backdrop {
    fn scale_factor_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &WlSurface,
        _new_factor: i32,
    ) {
    }

    fn transform_changed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &WlSurface,
        _new_transform: wl_output::Transform,
    ) {
    }

    fn frame(&mut self, _conn: &Connection, qh: &QueueHandle<Self>, surface: &WlSurface, time: u32) {
        if self
            .comet
            .as_ref()
            .is_some_and(|c| c.surface() == surface)
        {
            self.comet_frame(qh, time);
        } else {
            self.starfield_frame(qh, surface, time);
        }
    }

    fn surface_enter(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &WlSurface,
        _output: &wl_output::WlOutput,
    ) {
    }

    fn surface_leave(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _surface: &WlSurface,
        _output: &wl_output::WlOutput,
    ) {
    }
}

impl OutputHandler for Backdrop {
    fn output_state(&mut self) -> &mut OutputState {
        &mut self.output_state
    }

    fn new_output(&mut self, _conn: &Connection, qh: &QueueHandle<Self>, output: wl_output::WlOutput) {
        self.add_background(qh, output);
    }

    fn update_output(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        _output: wl_output::WlOutput,
    ) {
    }

    fn output_destroyed(
        &mut self,
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
        output: wl_output::WlOutput,
    ) {
        let name = self
            .backgrounds
            .find_mut(|b| b.output == output)
            .map(|(name, _)| name.to_string());
        if let Some(name) = name {
            self.remove_background(&name);
        }
    }
}

impl LayerShellHandler for Backdrop {
    fn closed(&mut self, _conn: &Connection, _qh: &QueueHandle<Self>, layer: &LayerSurface) {
        if self
            .comet
            .as_ref()
            .is_some_and(|c| c.surface() == layer.wl_surface())
        {
            debug!("Compositor closed the comet overlay");
            self.comet = None;
            return;
        }
        let name = self
            .backgrounds
            .find_mut(|b| b.layer.wl_surface() == layer.wl_surface())
            .map(|(name, _)| name.to_string());
        if let Some(name) = name {
            info!("Compositor closed the starfield on {}", name);
            self.remove_background(&name);
        }
    }

    fn configure(
        &mut self,
        _conn: &Connection,
        qh: &QueueHandle<Self>,
        layer: &LayerSurface,
        configure: LayerSurfaceConfigure,
        _serial: u32,
    ) {
        if self
            .comet
            .as_ref()
            .is_some_and(|c| c.surface() == layer.wl_surface())
        {
            self.configure_comet(qh, configure.new_size);
        } else {
            self.configure_background(qh, layer.wl_surface(), configure.new_size);
        }
    }
}

impl ShmHandler for Backdrop {
    fn shm_state(&mut self) -> &mut Shm {
        &mut self.shm
    }
}

impl ProvidesRegistryState for Backdrop {
    fn registry(&mut self) -> &mut RegistryState {
        &mut self.registry_state
    }

    registry_handlers![OutputState];
}

impl Dispatch<WpViewporter, ()> for Backdrop {
    fn event(
        _state: &mut Self,
        _proxy: &WpViewporter,
        _event: wp_viewporter::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
    }
}

impl Dispatch<WpViewport, ()> for Backdrop {
    fn event(
        _state: &mut Self,
        _proxy: &WpViewport,
        _event: wp_viewport::Event,
        _data: &(),
        _conn: &Connection,
        _qh: &QueueHandle<Self>,
    ) {
    }
}

delegate_compositor!(Backdrop);
delegate_output!(Backdrop);
delegate_shm!(Backdrop);
delegate_layer!(Backdrop);
delegate_registry!(Backdrop);

