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

use crate::constants::TRAJECTORY_SAMPLE_STEP;
use crate::enums::Platform;
use crate::error::DeviceError;

// Index of the Z axis in the platform vector.
const AXIS_Z: usize = 2;

/// Plan of the synchronized move of both platforms.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncPlan {
    // Total time in second.
    pub duration: f64,
    // Per-axis velocities in mm/sec.
    pub upper_velocity: Vector3<f64>,
    pub lower_velocity: Vector3<f64>,
}

/// Check the soft limit of the platform.
///
/// # Arguments
/// * `platform` - Platform.
/// * `target` - Target position in mm.
/// * `range` - Range of each axis in mm.
///
/// # Errors
/// LimitExceeded with the physical axis if any |target| > range.
pub fn check_soft_limit(
    platform: Platform,
    target: &Vector3<f64>,
    range: &Vector3<f64>,
) -> Result<(), DeviceError> {
    for (idx, (value, limit)) in target.iter().zip(range.iter()).enumerate() {
        if value.abs() > *limit {
            return Err(DeviceError::LimitExceeded {
                axis: platform.physical_axis(idx) as usize,
                target: *value,
                range: *limit,
            });
        }
    }

    Ok(())
}

/// Check the Z distance between the platforms.
///
/// # Arguments
/// * `upper_z` - Z position of the upper platform.
/// * `lower_z` - Z position of the lower platform.
/// * `min_distance` - Minimum distance.
///
/// # Errors
/// CollisionRisk if the distance is less than the minimum.
pub fn check_z_distance(upper_z: f64, lower_z: f64, min_distance: f64) -> Result<(), DeviceError> {
    let distance = (upper_z - lower_z).abs();
    if distance < min_distance {
        return Err(DeviceError::CollisionRisk(format!(
            "Z distance {distance} between upper ({upper_z}) and lower ({lower_z}) is less than {min_distance}"
        )));
    }

    Ok(())
}

/// Check the collision along the linear trajectories of both platforms. The
/// trajectories are sampled at t = 0.0, 0.1, ..., 1.0. Nothing is checked if
/// neither Z changes.
///
/// # Arguments
/// * `upper_start` - Start of the upper platform.
/// * `upper_end` - End of the upper platform.
/// * `lower_start` - Start of the lower platform.
/// * `lower_end` - End of the lower platform.
/// * `min_distance` - Minimum Z distance.
///
/// # Errors
/// CollisionRisk at the first violating sample.
pub fn check_collision(
    upper_start: &Vector3<f64>,
    upper_end: &Vector3<f64>,
    lower_start: &Vector3<f64>,
    lower_end: &Vector3<f64>,
    min_distance: f64,
) -> Result<(), DeviceError> {
    if (upper_start[AXIS_Z] == upper_end[AXIS_Z]) && (lower_start[AXIS_Z] == lower_end[AXIS_Z]) {
        return Ok(());
    }

    let num_samples = (1.0 / TRAJECTORY_SAMPLE_STEP).round() as usize;
    for idx in 0..=num_samples {
        let t = (idx as f64) / (num_samples as f64);
        let upper_z = interpolate(upper_start, upper_end, t)[AXIS_Z];
        let lower_z = interpolate(lower_start, lower_end, t)[AXIS_Z];

        check_z_distance(upper_z, lower_z, min_distance).map_err(|error| match error {
            DeviceError::CollisionRisk(reason) => {
                DeviceError::CollisionRisk(format!("{reason} at t = {t:.1}"))
            }
            other => other,
        })?;
    }

    Ok(())
}

/// Plan the synchronized move so that all axes arrive at the same time.
///
/// # Arguments
/// * `upper_start` - Start of the upper platform.
/// * `upper_target` - Target of the upper platform.
/// * `lower_start` - Start of the lower platform.
/// * `lower_target` - Target of the lower platform.
/// * `max_velocity` - Maximum velocity of the axes in mm/sec.
///
/// # Returns
/// Plan with T = d_max / v_max and v_i = d_i / T. A plan without any
/// distance has zero duration and velocities.
///
/// # Errors
/// InvalidArgs if the maximum velocity is not positive.
pub fn plan_synchronized_move(
    upper_start: &Vector3<f64>,
    upper_target: &Vector3<f64>,
    lower_start: &Vector3<f64>,
    lower_target: &Vector3<f64>,
    max_velocity: f64,
) -> Result<SyncPlan, DeviceError> {
    if max_velocity <= 0.0 {
        return Err(DeviceError::InvalidArgs(format!(
            "maximum velocity {max_velocity} should be positive"
        )));
    }

    let upper_distance = (upper_target - upper_start).abs();
    let lower_distance = (lower_target - lower_start).abs();
    let max_distance = upper_distance.max().max(lower_distance.max());

    if max_distance == 0.0 {
        return Ok(SyncPlan {
            duration: 0.0,
            upper_velocity: Vector3::zeros(),
            lower_velocity: Vector3::zeros(),
        });
    }

    let duration = max_distance / max_velocity;

    Ok(SyncPlan {
        duration,
        upper_velocity: upper_distance / duration,
        lower_velocity: lower_distance / duration,
    })
}

/// Interpolate the position linearly.
///
/// # Arguments
/// * `start` - Start position.
/// * `target` - Target position.
/// * `progress` - Progress in [0, 1]. The value is clamped.
///
/// # Returns
/// Interpolated position. The target itself when the progress is 1.
pub fn interpolate(start: &Vector3<f64>, target: &Vector3<f64>, progress: f64) -> Vector3<f64> {
    if progress >= 1.0 {
        return *target;
    }

    start + (target - start) * progress.max(0.0)
}

#[cfg(test)]
mod tests {
    use super::*;

    use approx::assert_relative_eq;

    #[test]
    fn test_check_soft_limit() {
        let range = Vector3::new(1000.0, 1000.0, 500.0);

        assert!(check_soft_limit(Platform::Upper, &Vector3::new(1000.0, -1000.0, 500.0), &range).is_ok());

        assert_eq!(
            check_soft_limit(Platform::Upper, &Vector3::new(1001.0, 0.0, 0.0), &range),
            Err(DeviceError::LimitExceeded {
                axis: 0,
                target: 1001.0,
                range: 1000.0
            })
        );

        // Z of the lower platform is the physical axis 5.
        assert_eq!(
            check_soft_limit(Platform::Lower, &Vector3::new(0.0, 0.0, -501.0), &range),
            Err(DeviceError::LimitExceeded {
                axis: 5,
                target: -501.0,
                range: 500.0
            })
        );
    }

    #[test]
    fn test_check_collision_start_violated() {
        let upper = Vector3::new(0.0, 0.0, 100.0);
        let lower = Vector3::new(0.0, 0.0, 60.0);

        let result = check_collision(
            &upper,
            &Vector3::new(0.0, 0.0, 120.0),
            &lower,
            &lower,
            50.0,
        );

        assert!(matches!(result, Err(DeviceError::CollisionRisk(_))));
    }

    #[test]
    fn test_check_collision_start_at_min_distance() {
        // 60 apart is enough for the minimum 50.
        let upper = Vector3::new(0.0, 0.0, 100.0);
        let lower = Vector3::new(0.0, 0.0, 40.0);

        assert!(check_collision(
            &upper,
            &Vector3::new(0.0, 0.0, 120.0),
            &lower,
            &lower,
            50.0
        )
        .is_ok());
        assert!(check_z_distance(100.0, 50.0, 50.0).is_ok());
    }

    #[test]
    fn test_check_collision_crossing() {
        // The platforms cross each other in the middle.
        let result = check_collision(
            &Vector3::new(0.0, 0.0, 100.0),
            &Vector3::new(0.0, 0.0, -100.0),
            &Vector3::new(0.0, 0.0, -100.0),
            &Vector3::new(0.0, 0.0, 100.0),
            10.0,
        );

        assert!(matches!(result, Err(DeviceError::CollisionRisk(_))));
    }

    #[test]
    fn test_check_collision_zero_distance() {
        let result = check_collision(
            &Vector3::new(0.0, 0.0, 100.0),
            &Vector3::new(0.0, 0.0, -100.0),
            &Vector3::new(0.0, 0.0, -100.0),
            &Vector3::new(0.0, 0.0, 100.0),
            0.0,
        );

        assert!(result.is_ok());
    }

    #[test]
    fn test_check_collision_no_z_change() {
        let upper = Vector3::new(0.0, 0.0, 10.0);
        let lower = Vector3::new(0.0, 0.0, 10.0);

        assert!(check_collision(
            &upper,
            &Vector3::new(5.0, 5.0, 10.0),
            &lower,
            &lower,
            50.0
        )
        .is_ok());
    }

    #[test]
    fn test_plan_synchronized_move() {
        let plan = plan_synchronized_move(
            &Vector3::zeros(),
            &Vector3::new(100.0, 50.0, 0.0),
            &Vector3::new(0.0, 0.0, 10.0),
            &Vector3::new(0.0, -200.0, 10.0),
            100.0,
        )
        .unwrap();

        assert_relative_eq!(plan.duration, 2.0);
        assert_relative_eq!(plan.upper_velocity, Vector3::new(50.0, 25.0, 0.0));
        assert_relative_eq!(plan.lower_velocity, Vector3::new(0.0, 100.0, 0.0));
    }

    #[test]
    fn test_plan_synchronized_move_no_distance() {
        let position = Vector3::new(1.0, 2.0, 3.0);
        let plan =
            plan_synchronized_move(&position, &position, &position, &position, 100.0).unwrap();

        assert_eq!(plan.duration, 0.0);
        assert_eq!(plan.upper_velocity, Vector3::zeros());
    }

    #[test]
    fn test_plan_synchronized_move_bad_velocity() {
        let position = Vector3::zeros();

        assert!(matches!(
            plan_synchronized_move(&position, &position, &position, &position, 0.0),
            Err(DeviceError::InvalidArgs(_))
        ));
    }

    #[test]
    fn test_interpolate() {
        let start = Vector3::new(0.0, 10.0, -10.0);
        let target = Vector3::new(10.0, 0.0, 10.0);

        assert_eq!(interpolate(&start, &target, 0.0), start);
        assert_relative_eq!(
            interpolate(&start, &target, 0.5),
            Vector3::new(5.0, 5.0, 0.0)
        );
        assert_eq!(interpolate(&start, &target, 1.0), target);
        assert_eq!(interpolate(&start, &target, 1.5), target);
        assert_eq!(interpolate(&start, &target, -1.0), start);
    }
}
