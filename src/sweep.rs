use std::time::Duration;

pub type Rgba = [u8; 4];

pub const BLUE: Rgba = [0x42, 0x85, 0xF4, 255];
pub const RED: Rgba = [0xEA, 0x43, 0x35, 255];
pub const YELLOW: Rgba = [0xFB, 0xBC, 0x05, 255];
pub const GREEN: Rgba = [0x34, 0xA8, 0x53, 255];

const BASE_STOPS: [(f32, Rgba); 4] = [(0.0, BLUE), (0.3, RED), (0.7, YELLOW), (1.0, GREEN)];

#[derive(Debug, Clone, Copy)]
pub struct BorderSweep {
    period: Duration,
}

impl Default for BorderSweep {
    fn default() -> Self {
        Self::new(Duration::from_secs(3))
    }
}

impl BorderSweep {
    pub fn new(period: Duration) -> Self {
        Self { period }
    }

    /// Loop position in `[0, 1)` after `elapsed`.
    pub fn offset_at(&self, elapsed: Duration) -> f32 {
        let period = self.period.as_secs_f64();
        if period <= 0.0 {
            return 0.0;
        }
        let offset = (elapsed.as_secs_f64() % period) / period;
        (offset as f32).clamp(0.0, 0.999_999)
    }

    pub fn stops(&self, offset: f32) -> [(f32, Rgba); 4] {
        let mut stops = BASE_STOPS.map(|(pos, color)| ((pos + offset).rem_euclid(1.0), color));
        stops.sort_by(|a, b| a.0.total_cmp(&b.0));
        stops
    }

    /// Colour at ring position `t` in `[0, 1)`, interpolating between the
    /// neighbouring stops and wrapping past the last one.
    pub fn color_at(&self, offset: f32, t: f32) -> Rgba {
        let stops = self.stops(offset);
        let t = t.rem_euclid(1.0);
        let next_idx = stops.iter().position(|(pos, _)| *pos > t).unwrap_or(0);
        let prev_idx = (next_idx + stops.len() - 1) % stops.len();
        let (p0, c0) = stops[prev_idx];
        let (p1, c1) = stops[next_idx];
        let span = (p1 - p0).rem_euclid(1.0);
        if span <= f32::EPSILON {
            return c0;
        }
        let local = (t - p0).rem_euclid(1.0) / span;
        lerp(c0, c1, local.clamp(0.0, 1.0))
    }
}

fn lerp(a: Rgba, b: Rgba, t: f32) -> Rgba {
    std::array::from_fn(|i| (a[i] as f32 + (b[i] as f32 - a[i] as f32) * t).round() as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn offset_loops_over_period() {
        let sweep = BorderSweep::default();
        assert_eq!(sweep.offset_at(Duration::ZERO), 0.0);
        assert!((sweep.offset_at(Duration::from_millis(1500)) - 0.5).abs() < 1e-6);
        assert!((sweep.offset_at(Duration::from_millis(4500)) - 0.5).abs() < 1e-6);
        for ms in (0..10_000).step_by(37) {
            let offset = sweep.offset_at(Duration::from_millis(ms));
            assert!((0.0..1.0).contains(&offset));
        }
    }

    #[test]
    fn zero_period_is_static() {
        let sweep = BorderSweep::new(Duration::ZERO);
        assert_eq!(sweep.offset_at(Duration::from_secs(9)), 0.0);
    }

    #[test]
    fn stops_rotate_and_stay_sorted() {
        let sweep = BorderSweep::default();
        let stops = sweep.stops(0.5);
        assert!(stops.windows(2).all(|w| w[0].0 <= w[1].0));
        assert!(stops.iter().all(|(pos, _)| (0.0..1.0).contains(pos)));
        assert!(stops.contains(&(0.5, BLUE)));
    }

    #[test]
    fn colour_hits_stop_colours() {
        let sweep = BorderSweep::default();
        assert_eq!(sweep.color_at(0.0, 0.3), RED);
        assert_eq!(sweep.color_at(0.0, 0.7), YELLOW);
        let mid = sweep.color_at(0.0, 0.5);
        assert_ne!(mid, RED);
        assert_ne!(mid, YELLOW);
    }
}
