//! Minimal 2D drawing surface for the comet overlay
//!
//! `PixelCanvas` records the comet's shapes into a `vello_cpu` render context
//! and rasterises them into a premultiplied RGBA pixmap, which is then copied
//! into a `wl_shm` ARGB8888 buffer (little-endian B, G, R, A bytes).

use crate::error::AnimError;
use glam::Vec2;
use vello_cpu::kurbo::{BezPath, Cap, Circle, Point, Shape, Stroke};
use vello_cpu::peniko::{Color, Gradient};
use vello_cpu::{Pixmap, RenderContext};

/// Flattening tolerance for circles, in pixels
const TOLERANCE: f64 = 0.1;

/// 8-bit colour with a fractional alpha
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rgba {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: f32,
}

impl Rgba {
    pub const fn new(r: u8, g: u8, b: u8, a: f32) -> Self {
        Self { r, g, b, a }
    }

    pub fn with_alpha(self, a: f32) -> Self {
        Self { a, ..self }
    }

    fn to_color(self, global_alpha: f32) -> Color {
        let a = (self.a * global_alpha).clamp(0.0, 1.0);
        Color::from_rgba8(self.r, self.g, self.b, (a * 255.0).round() as u8)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GradientStop {
    pub offset: f32,
    pub color: Rgba,
}

impl GradientStop {
    pub const fn new(offset: f32, color: Rgba) -> Self {
        Self { offset, color }
    }
}

pub trait Canvas {
    /// Reset every pixel to transparent
    fn clear(&mut self);

    /// Multiplier applied to the alpha of everything drawn afterwards
    fn set_global_alpha(&mut self, alpha: f32);

    /// Line from `from` to `to` with round caps
    fn stroke_segment(&mut self, from: Vec2, to: Vec2, width: f32, color: Rgba);

    /// Disc filled with a radial gradient; stop offsets are fractions of `radius`
    fn fill_radial(&mut self, center: Vec2, radius: f32, stops: &[GradientStop]);

    fn fill_disc(&mut self, center: Vec2, radius: f32, color: Rgba);
}

fn point(v: Vec2) -> Point {
    Point::new(f64::from(v.x), f64::from(v.y))
}

pub struct PixelCanvas {
    ctx: RenderContext,
    pixmap: Pixmap,
    global_alpha: f32,
}

impl PixelCanvas {
    pub fn new(width: u32, height: u32) -> Result<Self, AnimError> {
        let (Ok(w), Ok(h)) = (u16::try_from(width), u16::try_from(height)) else {
            return Err(AnimError::surface(
                "comet",
                format!("{}x{} is too large for the overlay", width, height),
            ));
        };
        Ok(Self {
            ctx: RenderContext::new(w, h),
            pixmap: Pixmap::new(w, h),
            global_alpha: 1.0,
        })
    }

    pub fn size(&self) -> (u32, u32) {
        (u32::from(self.ctx.width()), u32::from(self.ctx.height()))
    }

    /// Rasterise everything drawn since the last `clear` and copy it into
    /// an ARGB8888 buffer. Rows beyond the end of `dst` are dropped.
    pub fn present_into(&mut self, dst: &mut [u8]) {
        self.rasterise();
        let src = self.pixmap.data_as_u8_slice();
        for (from, to) in src.chunks_exact(4).zip(dst.chunks_exact_mut(4)) {
            to.copy_from_slice(&[from[2], from[1], from[0], from[3]]);
        }
    }

    fn rasterise(&mut self) {
        self.pixmap.data_as_u8_slice_mut().fill(0);
        self.ctx.flush();
        self.ctx.render_to_pixmap(&mut self.pixmap);
    }

    /// Premultiplied (r, g, b, a) bytes of a pixel
    #[cfg(test)]
    pub fn pixel(&mut self, x: u32, y: u32) -> Option<[u8; 4]> {
        let (w, h) = self.size();
        if x >= w || y >= h {
            return None;
        }
        self.rasterise();
        let i = (y * w + x) as usize * 4;
        let px = &self.pixmap.data_as_u8_slice()[i..i + 4];
        Some([px[0], px[1], px[2], px[3]])
    }
}

impl Canvas for PixelCanvas {
    fn clear(&mut self) {
        self.ctx.reset();
    }

    fn set_global_alpha(&mut self, alpha: f32) {
        self.global_alpha = alpha.clamp(0.0, 1.0);
    }

    fn stroke_segment(&mut self, from: Vec2, to: Vec2, width: f32, color: Rgba) {
        if width <= 0.0 {
            return;
        }
        let mut path = BezPath::new();
        path.move_to(point(from));
        path.line_to(point(to));
        self.ctx
            .set_stroke(Stroke::new(f64::from(width)).with_caps(Cap::Round));
        self.ctx.set_paint(color.to_color(self.global_alpha));
        self.ctx.stroke_path(&path);
    }

    fn fill_radial(&mut self, center: Vec2, radius: f32, stops: &[GradientStop]) {
        if radius <= 0.0 || stops.is_empty() {
            return;
        }
        let stops: Vec<(f32, Color)> = stops
            .iter()
            .map(|s| (s.offset, s.color.to_color(self.global_alpha)))
            .collect();
        let gradient = Gradient::new_radial(point(center), radius).with_stops(stops.as_slice());
        self.ctx.set_paint(gradient);
        self.ctx
            .fill_path(&Circle::new(point(center), f64::from(radius)).to_path(TOLERANCE));
    }

    fn fill_disc(&mut self, center: Vec2, radius: f32, color: Rgba) {
        if radius <= 0.0 {
            return;
        }
        self.ctx.set_paint(color.to_color(self.global_alpha));
        self.ctx
            .fill_path(&Circle::new(point(center), f64::from(radius)).to_path(TOLERANCE));
    }
}
