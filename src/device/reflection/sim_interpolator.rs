// This file is part of instrument_controller.
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

use nalgebra::Vector3;
use std::time::{Duration, Instant};

use crate::motion::trajectory::interpolate;

/// Linear interpolator of the simulated motion of both platforms. It runs in
/// the device hook.
#[derive(Debug, Default)]
pub struct SimInterpolator {
    _upper_start: Vector3<f64>,
    _upper_target: Vector3<f64>,
    _lower_start: Vector3<f64>,
    _lower_target: Vector3<f64>,
    _start_time: Option<Instant>,
    _duration: Duration,
}

impl SimInterpolator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start a new motion from the start positions.
    ///
    /// # Arguments
    /// * `upper` - Start and target of the upper platform.
    /// * `lower` - Start and target of the lower platform.
    /// * `duration` - Duration of the motion.
    /// * `now` - Start time.
    pub fn start(
        &mut self,
        upper: (Vector3<f64>, Vector3<f64>),
        lower: (Vector3<f64>, Vector3<f64>),
        duration: Duration,
        now: Instant,
    ) {
        (self._upper_start, self._upper_target) = upper;
        (self._lower_start, self._lower_target) = lower;
        self._duration = duration;
        self._start_time = Some(now);
    }

    /// Motion is running or not.
    pub fn is_active(&self) -> bool {
        self._start_time.is_some()
    }

    /// Stop the motion.
    pub fn stop(&mut self) {
        self._start_time = None;
    }

    /// Progress in [0, 1] at the time. A finished or stopped motion gives 1.
    pub fn progress(&self, now: Instant) -> f64 {
        let Some(start_time) = self._start_time else {
            return 1.0;
        };

        if self._duration.is_zero() {
            return 1.0;
        }

        (now.saturating_duration_since(start_time).as_secs_f64() / self._duration.as_secs_f64())
            .min(1.0)
    }

    /// Advance the motion.
    ///
    /// # Arguments
    /// * `now` - Current time.
    ///
    /// # Returns
    /// Positions of the upper and lower platforms and the progress. None if
    /// no motion is running. The motion stops itself when the progress
    /// reaches 1.
    pub fn advance(&mut self, now: Instant) -> Option<(Vector3<f64>, Vector3<f64>, f64)> {
        if !self.is_active() {
            return None;
        }

        let progress = self.progress(now);
        let upper = interpolate(&self._upper_start, &self._upper_target, progress);
        let lower = interpolate(&self._lower_start, &self._lower_target, progress);

        if progress >= 1.0 {
            self.stop();
        }

        Some((upper, lower, progress))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    #[test]
    fn test_advance() {
        let mut interpolator = SimInterpolator::new();
        let now = Instant::now();

        assert!(interpolator.advance(now).is_none());

        interpolator.start(
            (Vector3::zeros(), Vector3::new(10.0, 0.0, 0.0)),
            (Vector3::zeros(), Vector3::new(0.0, 0.0, -5.0)),
            Duration::from_secs(2),
            now,
        );

        let (upper, lower, progress) = interpolator
            .advance(now + Duration::from_secs(1))
            .unwrap();

        assert_relative_eq!(progress, 0.5);
        assert_relative_eq!(upper[0], 5.0);
        assert_relative_eq!(lower[2], -2.5);
        assert!(interpolator.is_active());

        let (upper, lower, progress) = interpolator
            .advance(now + Duration::from_secs(3))
            .unwrap();

        assert_eq!(progress, 1.0);
        assert_eq!(upper, Vector3::new(10.0, 0.0, 0.0));
        assert_eq!(lower, Vector3::new(0.0, 0.0, -5.0));
        assert!(!interpolator.is_active());
    }

    #[test]
    fn test_zero_duration() {
        let mut interpolator = SimInterpolator::new();
        let now = Instant::now();

        interpolator.start(
            (Vector3::zeros(), Vector3::new(1.0, 2.0, 3.0)),
            (Vector3::zeros(), Vector3::zeros()),
            Duration::ZERO,
            now,
        );

        let (upper, _, progress) = interpolator.advance(now).unwrap();

        assert_eq!(progress, 1.0);
        assert_eq!(upper, Vector3::new(1.0, 2.0, 3.0));
    }
}
