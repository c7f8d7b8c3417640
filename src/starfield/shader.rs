//! CPU reference of the starfield fragment program.
//!
//! Mirrors `starfield.wgsl` function for function so the shading can be
//! evaluated without a GPU: unit tests pin its determinism and `--still`
//! writes a frame of it to disk. Output is a pure function of
//! (fragment position, uniforms); nothing here keeps state.

use super::StarfieldUniforms;
use glam::{Vec2, Vec3};

/// WGSL source of the GPU program
pub const STARFIELD_WGSL: &str = include_str!("starfield.wgsl");

pub const NUM_LAYERS: usize = 3;

/// GLSL/WGSL `fract`: x - floor(x), always in [0, 1)
fn fract(x: f32) -> f32 {
    x - x.floor()
}

fn fract2(v: Vec2) -> Vec2 {
    Vec2::new(fract(v.x), fract(v.y))
}

fn smoothstep(edge0: f32, edge1: f32, x: f32) -> f32 {
    let t = ((x - edge0) / (edge1 - edge0)).clamp(0.0, 1.0);
    t * t * (3.0 - 2.0 * t)
}

fn mix(a: f32, b: f32, t: f32) -> f32 {
    a + (b - a) * t
}

pub fn hash21(cell: Vec2) -> f32 {
    let mut p = fract2(cell * Vec2::new(123.34, 456.21));
    p += p.dot(p + 45.32);
    fract(p.x * p.y)
}

/// Smoothed triangle wave in [0, 1]
pub fn tris(x: f32) -> f32 {
    let t = fract(x);
    1.0 - smoothstep(0.0, 1.0, (2.0 * t - 1.0).abs())
}

pub fn hsv2rgb(c: Vec3) -> Vec3 {
    let channel = |k: f32| {
        let p = (fract(c.x + k) * 6.0 - 3.0).abs();
        mix(1.0, (p - 1.0).clamp(0.0, 1.0), c.y)
    };
    c.z * Vec3::new(channel(1.0), channel(2.0 / 3.0), channel(1.0 / 3.0))
}

fn rays(uv: Vec2) -> f32 {
    smoothstep(0.0, 1.0, 1.0 - (uv.x * uv.y * 1000.0).abs())
}

/// Brightness of one point light at offset `uv` from its centre
pub fn star(uv: Vec2, flare: f32, glow: f32) -> f32 {
    let d = uv.length();
    let mut m = (0.05 * glow) / d.max(0.005);
    m += rays(uv) * flare * glow;
    let uv45 = Vec2::new(0.7071 * (uv.x - uv.y), 0.7071 * (uv.x + uv.y));
    m += rays(uv45) * 0.3 * flare * glow;
    m * (1.0 - smoothstep(0.2, 1.0, d))
}

/// Colour family of a star, picked per cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StarClass {
    Cool,
    Warm,
    Neutral,
}

pub fn star_class(cell: Vec2) -> StarClass {
    let choice = hash21(cell + 7.0);
    if choice < 0.45 {
        StarClass::Cool
    } else if choice < 0.75 {
        StarClass::Warm
    } else {
        StarClass::Neutral
    }
}

pub fn star_color(cell: Vec2) -> Vec3 {
    let h = |salt: f32| hash21(cell + salt);
    let hsv = match star_class(cell) {
        StarClass::Cool => Vec3::new(0.58 + h(11.0) * 0.08, 0.15 + h(13.0) * 0.2, 0.85 + h(17.0) * 0.15),
        StarClass::Warm => Vec3::new(0.07 + h(19.0) * 0.05, 0.2 + h(23.0) * 0.25, 0.9 + h(29.0) * 0.1),
        StarClass::Neutral => Vec3::new(0.08 + h(31.0) * 0.02, h(37.0) * 0.12, 0.92 + h(41.0) * 0.08),
    };
    hsv2rgb(hsv)
}

pub fn star_layer(uv: Vec2, u: &StarfieldUniforms) -> Vec3 {
    let gv = fract2(uv) - 0.5;
    let id = uv.floor();
    let mut col = Vec3::ZERO;

    for y in -1..=1 {
        for x in -1..=1 {
            let offset = Vec2::new(x as f32, y as f32);
            let cell = id + offset;
            let seed = hash21(cell);
            let size = fract(seed * 345.32);
            let flare = smoothstep(0.9, 1.0, size);
            let pad = Vec2::new(
                tris(seed * 34.0 + u.time * u.speed / 10.0),
                tris(seed * 38.0 + u.time * u.speed / 30.0),
            ) - 0.5;
            col += star(gv - offset - pad, flare, u.glow_intensity) * size * star_color(cell);
        }
    }
    col
}

/// Colour of the fragment at `frag_uv` (0..1, y up), as straight RGBA
pub fn shade(frag_uv: Vec2, u: &StarfieldUniforms) -> [f32; 4] {
    let res = Vec2::new(u.resolution[0], u.resolution[1]);
    let focal_px = Vec2::from(u.focal) * res;
    let mut uv = (frag_uv * res - focal_px) / res.y;

    let (rc, rs) = (u.rotation[0], u.rotation[1]);
    uv = Vec2::new(rc * uv.x + rs * uv.y, -rs * uv.x + rc * uv.y);

    let angle = u.time * u.rotation_speed;
    let (sa, ca) = angle.sin_cos();
    uv = Vec2::new(ca * uv.x + sa * uv.y, -sa * uv.x + ca * uv.y);

    let mut col = Vec3::ZERO;
    for layer in 0..NUM_LAYERS {
        let i = layer as f32 / NUM_LAYERS as f32;
        let depth = fract(i + u.star_phase * u.speed);
        let scale = mix(20.0 * u.density, 0.5 * u.density, depth);
        let fade = depth * (1.0 - smoothstep(0.9, 1.0, depth));
        col += star_layer(uv * scale + i * 453.32, u) * fade;
    }

    let alpha = if u.transparent != 0 {
        smoothstep(0.0, 0.3, col.length()).min(1.0)
    } else {
        1.0
    };
    [col.x, col.y, col.z, alpha]
}

/// Byte length of a packed RGB image, computed without `u32` overflow
fn rgb_len(width: u32, height: u32) -> usize {
    width as usize * height as usize * 3
}

/// Shade every pixel of a `width`×`height` frame into packed RGB8, top row first
pub fn render_still(width: u32, height: u32, u: &StarfieldUniforms) -> Vec<u8> {
    let mut out = Vec::with_capacity(rgb_len(width, height));
    for y in 0..height {
        for x in 0..width {
            let frag = Vec2::new(
                (x as f32 + 0.5) / width as f32,
                1.0 - (y as f32 + 0.5) / height as f32,
            );
            let [r, g, b, a] = shade(frag, u);
            for c in [r, g, b] {
                out.push(((c * a).clamp(0.0, 1.0) * 255.0).round() as u8);
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StarfieldConfig;
    use crate::starfield::Resolution;

    fn uniforms(time: f32) -> StarfieldUniforms {
        let cfg = StarfieldConfig::default();
        StarfieldUniforms::new(&cfg, Resolution::new(320, 180), time, time * cfg.star_speed / 10.0)
    }

    #[test]
    fn wgsl_declares_both_entry_points() {
        assert!(STARFIELD_WGSL.contains("fn vs_main"));
        assert!(STARFIELD_WGSL.contains("fn fs_main"));
    }

    #[test]
    fn hash_of_origin_is_zero() {
        assert_eq!(hash21(Vec2::ZERO), 0.0);
    }

    #[test]
    fn hash_stays_in_unit_range() {
        for y in -20..20 {
            for x in -20..20 {
                let h = hash21(Vec2::new(x as f32, y as f32));
                assert!((0.0..1.0).contains(&h), "hash {} out of range", h);
            }
        }
    }

    #[test]
    fn tris_peaks_mid_period() {
        assert_eq!(tris(0.5), 1.0);
        assert_eq!(tris(0.0), 0.0);
        assert_eq!(tris(3.5), 1.0);
    }

    #[test]
    fn hsv_primaries() {
        assert!(hsv2rgb(Vec3::new(0.0, 0.0, 1.0)).abs_diff_eq(Vec3::ONE, 1e-6));
        assert!(hsv2rgb(Vec3::new(0.0, 1.0, 1.0)).abs_diff_eq(Vec3::X, 1e-6));
    }

    #[test]
    fn star_is_brightest_at_centre_and_dark_past_one_cell() {
        let centre = star(Vec2::ZERO, 0.0, 0.3);
        let near = star(Vec2::new(0.1, 0.05), 0.0, 0.3);
        let far = star(Vec2::new(1.2, 0.0), 0.0, 0.3);
        assert!(centre > near);
        assert_eq!(far, 0.0);
    }

    #[test]
    fn colour_families_all_occur_with_cool_most_common_band() {
        let mut counts = [0usize; 3];
        for y in 0..64 {
            for x in 0..64 {
                let class = star_class(Vec2::new(x as f32, y as f32));
                counts[class as usize] += 1;
            }
        }
        assert!(counts.iter().all(|&c| c > 0), "{:?}", counts);
        let cool = counts[StarClass::Cool as usize] as f32 / 4096.0;
        assert!((0.30..=0.60).contains(&cool), "cool share {}", cool);
    }

    #[test]
    fn shading_is_deterministic() {
        let u = uniforms(12.5);
        for &(x, y) in &[(0.1, 0.2), (0.5, 0.5), (0.93, 0.71)] {
            let uv = Vec2::new(x, y);
            assert_eq!(shade(uv, &u), shade(uv, &u));
        }
        assert_eq!(render_still(32, 18, &u), render_still(32, 18, &u));
    }

    #[test]
    fn shading_changes_with_time() {
        let a = render_still(64, 36, &uniforms(0.0));
        let b = render_still(64, 36, &uniforms(40.0));
        assert_ne!(a, b);
    }

    #[test]
    fn output_is_finite_and_non_negative() {
        let u = uniforms(3.0);
        for y in 0..12 {
            for x in 0..20 {
                let uv = Vec2::new(x as f32 / 20.0, y as f32 / 12.0);
                let px = shade(uv, &u);
                assert!(px.iter().all(|c| c.is_finite() && *c >= 0.0), "{:?}", px);
                assert_eq!(px[3], 1.0);
            }
        }
    }

    #[test]
    fn transparent_mode_emits_alpha_from_brightness() {
        let mut u = uniforms(3.0);
        u.transparent = 1;
        for y in 0..12 {
            for x in 0..20 {
                let uv = Vec2::new(x as f32 / 20.0, y as f32 / 12.0);
                let a = shade(uv, &u)[3];
                assert!((0.0..=1.0).contains(&a));
            }
        }
    }

    #[test]
    fn still_has_one_rgb_triplet_per_pixel() {
        let px = render_still(7, 5, &uniforms(1.0));
        assert_eq!(px.len(), 7 * 5 * 3);
    }

    #[test]
    fn rgb_len_does_not_wrap_for_large_sizes() {
        // 40000 * 40000 * 3 overflows u32
        assert_eq!(rgb_len(40_000, 40_000), 4_800_000_000);
    }
}
