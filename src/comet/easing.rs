/// Share of the displacement covered during the launch phase
pub const LAUNCH_SHARE: f32 = 0.4;

/// Map linear time progress to path progress: quadratic launch over the first
/// 40% of the run (reaching 40% of the path), then constant speed to the end.
/// Input is clamped to [0, 1].
pub fn launch_then_coast(raw: f32) -> f32 {
    let raw = raw.clamp(0.0, 1.0);
    if raw < LAUNCH_SHARE {
        let t = raw / LAUNCH_SHARE;
        t * t * LAUNCH_SHARE
    } else {
        LAUNCH_SHARE + (raw - LAUNCH_SHARE) * (1.0 / (1.0 - LAUNCH_SHARE)) * (1.0 - LAUNCH_SHARE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints() {
        assert_eq!(launch_then_coast(0.0), 0.0);
        assert!((launch_then_coast(1.0) - 1.0).abs() < 1e-6);
        assert!((launch_then_coast(LAUNCH_SHARE) - LAUNCH_SHARE).abs() < 1e-6);
    }

    #[test]
    fn clamps_out_of_range_input() {
        assert_eq!(launch_then_coast(-0.5), 0.0);
        assert!((launch_then_coast(2.0) - 1.0).abs() < 1e-6);
    }

    #[test]
    fn launch_phase_is_monotonic_and_accelerating() {
        let mut prev = launch_then_coast(0.0);
        let mut prev_step = 0.0;
        for i in 1..=40 {
            let p = launch_then_coast(i as f32 / 100.0);
            assert!(p > prev, "not increasing at {}", i);
            let step = p - prev;
            assert!(step >= prev_step - 1e-6, "not accelerating at {}", i);
            prev = p;
            prev_step = step;
        }
        // Launch ends below linear progress, so the coast is faster than average
        assert!(launch_then_coast(0.2) < 0.2);
    }

    #[test]
    fn coast_phase_is_linear() {
        let samples: Vec<f32> = (40..=100).map(|i| launch_then_coast(i as f32 / 100.0)).collect();
        for w in samples.windows(2) {
            assert!((w[1] - w[0] - 0.01).abs() < 1e-5, "{:?}", w);
        }
    }
}
