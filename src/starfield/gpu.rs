//! wgpu backend for the starfield
//!
//! One device per surface, created straight from the raw Wayland handles of
//! a layer surface. The whole scene is one fullscreen triangle; all of the
//! work happens in the fragment shader.

use super::shader::STARFIELD_WGSL;
use super::{Presentation, StarfieldBackend, StarfieldUniforms};
use crate::error::AnimError;
use log::{debug, info, warn};
use raw_window_handle::{
    RawDisplayHandle, RawWindowHandle, WaylandDisplayHandle, WaylandWindowHandle,
};
use std::ffi::c_void;
use std::ptr::NonNull;
use wayland_client::protocol::wl_surface::WlSurface;
use wayland_client::{Connection, Proxy};

fn unavailable(reason: impl std::fmt::Display) -> AnimError {
    AnimError::surface("starfield", reason)
}

pub struct GpuStarfield {
    surface: wgpu::Surface<'static>,
    device: wgpu::Device,
    queue: wgpu::Queue,
    surface_config: wgpu::SurfaceConfiguration,
    pipeline: wgpu::RenderPipeline,
    uniform_buffer: wgpu::Buffer,
    bind_group: wgpu::BindGroup,
    clear: wgpu::Color,
}

impl GpuStarfield {
    /// Create a GPU context bound to `wl_surface`.
    ///
    /// The surface must stay alive until `release` has been called.
    pub fn new(
        instance: &wgpu::Instance,
        conn: &Connection,
        wl_surface: &WlSurface,
        transparent: bool,
    ) -> Result<Self, AnimError> {
        let display = NonNull::new(conn.backend().display_ptr() as *mut c_void)
            .ok_or_else(|| unavailable("wl_display pointer is null"))?;
        let window = NonNull::new(wl_surface.id().as_ptr() as *mut c_void)
            .ok_or_else(|| unavailable("wl_surface pointer is null"))?;

        let target = wgpu::SurfaceTargetUnsafe::RawHandle {
            raw_display_handle: RawDisplayHandle::Wayland(WaylandDisplayHandle::new(display)),
            raw_window_handle: RawWindowHandle::Wayland(WaylandWindowHandle::new(window)),
        };
        // SAFETY: both handles come from live proxies, and the host keeps the
        // layer surface around until this backend has been released.
        let surface = unsafe { instance.create_surface_unsafe(target) }.map_err(unavailable)?;

        let adapter = pollster::block_on(instance.request_adapter(&wgpu::RequestAdapterOptions {
            power_preference: wgpu::PowerPreference::LowPower,
            compatible_surface: Some(&surface),
            force_fallback_adapter: false,
        }))
        .ok_or_else(|| unavailable("no GPU adapter can present to this surface"))?;

        let info = adapter.get_info();
        info!("Starfield using {} ({:?})", info.name, info.backend);

        let (device, queue) = pollster::block_on(adapter.request_device(
            &wgpu::DeviceDescriptor {
                label: Some("starfield"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits::downlevel_webgl2_defaults()
                    .using_resolution(adapter.limits()),
                memory_hints: wgpu::MemoryHints::MemoryUsage,
            },
            None,
        ))
        .map_err(unavailable)?;

        let caps = surface.get_capabilities(&adapter);
        // The shader writes display values directly, so skip sRGB encoding
        let format = caps
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .or_else(|| caps.formats.first().copied())
            .ok_or_else(|| unavailable("surface reports no formats"))?;

        let alpha_mode = if transparent {
            [
                wgpu::CompositeAlphaMode::PostMultiplied,
                wgpu::CompositeAlphaMode::PreMultiplied,
            ]
            .into_iter()
            .find(|m| caps.alpha_modes.contains(m))
            .unwrap_or(wgpu::CompositeAlphaMode::Auto)
        } else {
            wgpu::CompositeAlphaMode::Opaque
        };
        let alpha_mode = if caps.alpha_modes.contains(&alpha_mode) {
            alpha_mode
        } else {
            caps.alpha_modes
                .first()
                .copied()
                .unwrap_or(wgpu::CompositeAlphaMode::Auto)
        };

        // Pacing comes from frame callbacks; don't let present block the loop
        let present_mode = if caps.present_modes.contains(&wgpu::PresentMode::Mailbox) {
            wgpu::PresentMode::Mailbox
        } else {
            wgpu::PresentMode::Fifo
        };

        let surface_config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: 1,
            height: 1,
            present_mode,
            desired_maximum_frame_latency: 2,
            alpha_mode,
            view_formats: vec![],
        };
        debug!(
            "Starfield surface: {:?}, {:?}, {:?}",
            format, alpha_mode, present_mode
        );

        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("starfield"),
            source: wgpu::ShaderSource::Wgsl(STARFIELD_WGSL.into()),
        });

        let uniform_buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("starfield uniforms"),
            size: std::mem::size_of::<StarfieldUniforms>() as wgpu::BufferAddress,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("starfield uniforms"),
            entries: &[wgpu::BindGroupLayoutEntry {
                binding: 0,
                visibility: wgpu::ShaderStages::FRAGMENT,
                ty: wgpu::BindingType::Buffer {
                    ty: wgpu::BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("starfield uniforms"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: uniform_buffer.as_entire_binding(),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("starfield"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("starfield"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                compilation_options: Default::default(),
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                compilation_options: Default::default(),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState::default(),
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Ok(Self {
            surface,
            device,
            queue,
            surface_config,
            pipeline,
            uniform_buffer,
            bind_group,
            clear: if transparent {
                wgpu::Color::TRANSPARENT
            } else {
                wgpu::Color::BLACK
            },
        })
    }
}

impl StarfieldBackend for GpuStarfield {
    fn resize(&mut self, width: u32, height: u32) {
        self.surface_config.width = width.max(1);
        self.surface_config.height = height.max(1);
        self.surface.configure(&self.device, &self.surface_config);
    }

    fn write_uniforms(&mut self, uniforms: &StarfieldUniforms) {
        self.queue
            .write_buffer(&self.uniform_buffer, 0, bytemuck::bytes_of(uniforms));
    }

    fn draw(&mut self) -> Result<Presentation, AnimError> {
        let frame = match self.surface.get_current_texture() {
            Ok(frame) => frame,
            Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                debug!("Starfield surface outdated, reconfiguring");
                self.surface.configure(&self.device, &self.surface_config);
                return Ok(Presentation::Skipped);
            }
            Err(wgpu::SurfaceError::Timeout) => {
                warn!("Timed out acquiring starfield frame, skipping");
                return Ok(Presentation::Skipped);
            }
            Err(e) => return Err(unavailable(e)),
        };

        let view = frame
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());
        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("starfield"),
            });
        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("starfield"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(self.clear),
                        store: wgpu::StoreOp::Store,
                    },
                })],
                depth_stencil_attachment: None,
                timestamp_writes: None,
                occlusion_query_set: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.bind_group, &[]);
            pass.draw(0..3, 0..1);
        }
        self.queue.submit(Some(encoder.finish()));
        frame.present();
        Ok(Presentation::Presented)
    }

    fn release(self) {
        let GpuStarfield {
            surface, device, ..
        } = self;
        drop(surface);
        device.destroy();
        debug!("Starfield GPU context released");
    }
}
