//! One-shot comet flyby
//!
//! A glowing head travels a fixed diagonal across the output, dragging a
//! tapered trail, then the trail fades out and the run ends for good. The
//! simulator is driven by frame timestamps and draws through `Canvas`, so it
//! knows nothing about Wayland buffers. `run::CometRun` wraps it with the
//! frame loop and the canvas for one overlay surface.

pub mod canvas;
pub mod easing;
pub mod run;
pub mod trail;

use canvas::{Canvas, GradientStop, Rgba};
use glam::Vec2;
use log::{debug, info};
use trail::TrailBuffer;

/// Length of the flight from launch to the end point
pub const FLIGHT_MS: f64 = 2600.0;
/// Global alpha removed per frame once the flight is over
pub const FADE_STEP: f32 = 0.06;
pub const TRAIL_CAPACITY: usize = 55;

const TRAIL_COLOR: Rgba = Rgba::new(255, 145, 30, 1.0);
const TRAIL_MAX_ALPHA: f32 = 0.7;
const TRAIL_MAX_WIDTH: f32 = 3.5;

const GLOW_RADIUS: f32 = 30.0;
const GLOW_STOPS: [GradientStop; 4] = [
    GradientStop::new(0.0, Rgba::new(255, 235, 140, 1.0)),
    GradientStop::new(0.15, Rgba::new(255, 180, 50, 0.95)),
    GradientStop::new(0.4, Rgba::new(255, 110, 0, 0.45)),
    GradientStop::new(1.0, Rgba::new(255, 60, 0, 0.0)),
];

const CORE_RADIUS: f32 = 3.5;
const CORE_COLOR: Rgba = Rgba::new(255, 245, 200, 0.95);

/// Straight path from near the top-left corner to the lower right,
/// fixed for the whole run
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trajectory {
    pub start: Vec2,
    pub end: Vec2,
}

impl Trajectory {
    pub fn for_viewport(width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        Self {
            start: Vec2::new(0.02 * w, 0.05 * h),
            end: Vec2::new(0.85 * w, 0.78 * h),
        }
    }

    pub fn at(&self, progress: f32) -> Vec2 {
        self.start.lerp(self.end, progress)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Phase {
    Flying,
    /// Trail frozen, redrawn at `alpha`
    Fading { alpha: f32 },
    Done,
}

/// Result of one `advance` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Drew,
    /// The run just ended and the canvas was cleared; returned exactly once
    Finished,
    /// Nothing left to draw
    Idle,
}

pub struct CometSimulator {
    trajectory: Trajectory,
    trail: TrailBuffer,
    phase: Phase,
    started_at: Option<f64>,
}

impl CometSimulator {
    /// Compute the path for a `width`×`height` viewport and enter `Flying`
    pub fn start(width: u32, height: u32) -> Self {
        let trajectory = Trajectory::for_viewport(width, height);
        debug!(
            "Comet launched {:?} -> {:?}",
            trajectory.start, trajectory.end
        );
        Self {
            trajectory,
            trail: TrailBuffer::new(TRAIL_CAPACITY),
            phase: Phase::Flying,
            started_at: None,
        }
    }

    /// Draw the frame for host time `now_ms`. The first call defines t = 0.
    pub fn advance(&mut self, now_ms: f64, canvas: &mut impl Canvas) -> Step {
        match self.phase {
            Phase::Flying => {
                self.fly(now_ms, canvas);
                Step::Drew
            }
            Phase::Fading { alpha } => self.fade(alpha, canvas),
            Phase::Done => Step::Idle,
        }
    }

    fn fly(&mut self, now_ms: f64, canvas: &mut impl Canvas) {
        let started = *self.started_at.get_or_insert(now_ms);
        let raw = ((now_ms - started) / FLIGHT_MS).clamp(0.0, 1.0) as f32;
        let head = self.trajectory.at(easing::launch_then_coast(raw));
        self.trail.push(head);

        canvas.clear();
        draw_trail(&self.trail, canvas);
        canvas.fill_radial(head, GLOW_RADIUS, &GLOW_STOPS);
        canvas.fill_disc(head, CORE_RADIUS, CORE_COLOR);

        if raw >= 1.0 {
            debug!("Comet reached the end of its path, fading trail");
            self.phase = Phase::Fading { alpha: 1.0 };
        }
    }

    fn fade(&mut self, alpha: f32, canvas: &mut impl Canvas) -> Step {
        let alpha = alpha - FADE_STEP;
        canvas.clear();
        if alpha <= 0.0 {
            self.trail.clear();
            self.phase = Phase::Done;
            info!("Comet flyby finished");
            return Step::Finished;
        }

        canvas.set_global_alpha(alpha);
        draw_trail(&self.trail, canvas);
        canvas.set_global_alpha(1.0);
        self.phase = Phase::Fading { alpha };
        Step::Drew
    }
}

#[cfg(test)]
impl CometSimulator {
    fn phase(&self) -> Phase {
        self.phase
    }

    fn trajectory(&self) -> Trajectory {
        self.trajectory
    }

    fn trail(&self) -> &TrailBuffer {
        &self.trail
    }

    /// Newest trail point
    fn head(&self) -> Vec2 {
        self.trail.iter().last().copied().unwrap_or(self.trajectory.start)
    }
}

/// Oldest segment thinnest and faintest, newest thickest and most opaque
fn draw_trail(trail: &TrailBuffer, canvas: &mut impl Canvas) {
    let len = trail.len() as f32;
    for (i, from, to) in trail.segments() {
        let ratio = i as f32 / len;
        canvas.stroke_segment(
            from,
            to,
            ratio * TRAIL_MAX_WIDTH,
            TRAIL_COLOR.with_alpha(ratio * ratio * TRAIL_MAX_ALPHA),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    enum Op {
        Clear,
        Alpha(f32),
        Stroke { width: f32, alpha: f32 },
        Glow(Vec2),
        Core(Vec2),
    }

    #[derive(Default)]
    struct RecordingCanvas {
        ops: Vec<Op>,
    }

    impl RecordingCanvas {
        fn take(&mut self) -> Vec<Op> {
            std::mem::take(&mut self.ops)
        }
    }

    impl Canvas for RecordingCanvas {
        fn clear(&mut self) {
            self.ops.push(Op::Clear);
        }
        fn set_global_alpha(&mut self, alpha: f32) {
            self.ops.push(Op::Alpha(alpha));
        }
        fn stroke_segment(&mut self, _from: Vec2, _to: Vec2, width: f32, color: Rgba) {
            self.ops.push(Op::Stroke {
                width,
                alpha: color.a,
            });
        }
        fn fill_radial(&mut self, center: Vec2, _radius: f32, _stops: &[GradientStop]) {
            self.ops.push(Op::Glow(center));
        }
        fn fill_disc(&mut self, center: Vec2, _radius: f32, _color: Rgba) {
            self.ops.push(Op::Core(center));
        }
    }

    /// Fly to the end of the path at ~60 Hz
    fn fly_to_end(sim: &mut CometSimulator, canvas: &mut RecordingCanvas) {
        let mut t = 0.0;
        while t < FLIGHT_MS {
            sim.advance(t, canvas);
            t += 16.0;
        }
        sim.advance(FLIGHT_MS, canvas);
    }

    #[test]
    fn trajectory_is_fraction_of_viewport() {
        let traj = Trajectory::for_viewport(1000, 800);
        assert!(traj.start.abs_diff_eq(Vec2::new(20.0, 40.0), 1e-3));
        assert!(traj.end.abs_diff_eq(Vec2::new(850.0, 624.0), 1e-3));
    }

    #[test]
    fn first_frame_draws_head_without_trail() {
        let mut sim = CometSimulator::start(1000, 800);
        let mut canvas = RecordingCanvas::default();
        assert_eq!(sim.advance(5000.0, &mut canvas), Step::Drew);
        let start = sim.trajectory().start;
        assert_eq!(canvas.take(), vec![Op::Clear, Op::Glow(start), Op::Core(start)]);
        assert_eq!(sim.trail().len(), 1);
    }

    #[test]
    fn head_follows_eased_progress() {
        let mut sim = CometSimulator::start(1000, 800);
        let mut canvas = RecordingCanvas::default();
        sim.advance(0.0, &mut canvas);
        // raw 0.2 -> eased 0.1
        sim.advance(520.0, &mut canvas);
        let traj = sim.trajectory();
        let expected = traj.start + (traj.end - traj.start) * 0.1;
        assert!(sim.head().abs_diff_eq(expected, 1e-3), "{:?}", sim.head());
    }

    #[test]
    fn trail_segments_taper_towards_the_tail() {
        let mut sim = CometSimulator::start(1000, 800);
        let mut canvas = RecordingCanvas::default();
        for i in 0..10 {
            sim.advance(i as f64 * 16.0, &mut canvas);
        }
        let strokes: Vec<(f32, f32)> = canvas
            .take()
            .into_iter()
            .rev()
            .skip(2)
            .take_while(|op| *op != Op::Clear)
            .filter_map(|op| match op {
                Op::Stroke { width, alpha } => Some((width, alpha)),
                _ => None,
            })
            .collect();
        // reversed: newest first
        assert_eq!(strokes.len(), 9);
        for pair in strokes.windows(2) {
            assert!(pair[0].0 > pair[1].0);
            assert!(pair[0].1 > pair[1].1);
        }
        // newest segment: ratio 9/10
        assert!((strokes[0].0 - 0.9 * 3.5).abs() < 1e-5);
        assert!((strokes[0].1 - 0.81 * 0.7).abs() < 1e-5);
    }

    #[test]
    fn trail_is_bounded_during_flight() {
        let mut sim = CometSimulator::start(1920, 1080);
        let mut canvas = RecordingCanvas::default();
        for i in 0..100 {
            sim.advance(i as f64 * 10.0, &mut canvas);
        }
        assert_eq!(sim.trail().len(), TRAIL_CAPACITY);
    }

    #[test]
    fn flight_ends_at_duration() {
        let mut sim = CometSimulator::start(1000, 800);
        let mut canvas = RecordingCanvas::default();
        sim.advance(0.0, &mut canvas);
        sim.advance(FLIGHT_MS - 1.0, &mut canvas);
        assert_eq!(sim.phase(), Phase::Flying);
        sim.advance(FLIGHT_MS, &mut canvas);
        assert_eq!(sim.phase(), Phase::Fading { alpha: 1.0 });
        assert!(sim.head().abs_diff_eq(sim.trajectory().end, 1e-3));
    }

    #[test]
    fn fade_takes_seventeen_ticks_then_finishes_once() {
        let mut sim = CometSimulator::start(1000, 800);
        let mut canvas = RecordingCanvas::default();
        fly_to_end(&mut sim, &mut canvas);
        let trail_len = sim.trail().len();

        for tick in 1..=16 {
            assert_eq!(sim.advance(FLIGHT_MS + tick as f64 * 16.0, &mut canvas), Step::Drew);
            assert!(matches!(sim.phase(), Phase::Fading { .. }), "tick {}", tick);
            assert_eq!(sim.trail().len(), trail_len);
        }
        canvas.take();
        assert_eq!(sim.advance(FLIGHT_MS + 17.0 * 16.0, &mut canvas), Step::Finished);
        assert_eq!(sim.phase(), Phase::Done);
        assert!(sim.trail().is_empty());
        assert_eq!(canvas.take(), vec![Op::Clear]);

        assert_eq!(sim.advance(FLIGHT_MS + 1000.0, &mut canvas), Step::Idle);
        assert!(canvas.take().is_empty());
    }

    #[test]
    fn fading_frames_draw_only_the_dimmed_trail() {
        let mut sim = CometSimulator::start(1000, 800);
        let mut canvas = RecordingCanvas::default();
        fly_to_end(&mut sim, &mut canvas);
        canvas.take();

        sim.advance(FLIGHT_MS + 16.0, &mut canvas);
        let ops = canvas.take();
        assert_eq!(ops.first(), Some(&Op::Clear));
        assert!(matches!(ops[1], Op::Alpha(a) if (a - 0.94).abs() < 1e-6));
        assert_eq!(ops.last(), Some(&Op::Alpha(1.0)));
        assert!(!ops.iter().any(|op| matches!(op, Op::Glow(_) | Op::Core(_))));
        assert!(ops.iter().any(|op| matches!(op, Op::Stroke { .. })));
    }
}
