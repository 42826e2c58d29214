//! Avatar facing: input-combination offsets and damped yaw rotation.
#![forbid(unsafe_code)]

use std::f32::consts::{FRAC_PI_2, FRAC_PI_4, PI};

use character_motor::MoveInput;
use rapier3d::math::{Real, Rotation, Vector};

pub const OFFSET_FORWARD: Real = PI;
pub const OFFSET_BACK: Real = 0.0;
pub const OFFSET_LEFT: Real = -FRAC_PI_2;
pub const OFFSET_RIGHT: Real = FRAC_PI_2;
pub const OFFSET_FORWARD_LEFT: Real = -3.0 * FRAC_PI_4;
pub const OFFSET_FORWARD_RIGHT: Real = 3.0 * FRAC_PI_4;
pub const OFFSET_BACK_LEFT: Real = -FRAC_PI_4;
pub const OFFSET_BACK_RIGHT: Real = FRAC_PI_4;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FacingConfig {
    /// Largest rotation in radians the first stage may take per tick.
    pub max_step: Real,
    /// Slerp factor of the second stage (0 = frozen, 1 = take the whole step).
    pub blend: Real,
}

impl Default for FacingConfig {
    fn default() -> Self {
        Self {
            max_step: 0.4,
            blend: 0.6,
        }
    }
}

/// Fixed offset for one or two held keys; `None` for three or more, or none.
/// Opposing pairs resolve to back (forward + back) and left (left + right).
pub fn table_offset(input: &MoveInput) -> Option<Real> {
    match (input.forward, input.back, input.left, input.right) {
        (true, false, false, false) => Some(OFFSET_FORWARD),
        (false, true, false, false) | (true, true, false, false) => Some(OFFSET_BACK),
        (false, false, true, false) | (false, false, true, true) => Some(OFFSET_LEFT),
        (false, false, false, true) => Some(OFFSET_RIGHT),
        (true, false, true, false) => Some(OFFSET_FORWARD_LEFT),
        (true, false, false, true) => Some(OFFSET_FORWARD_RIGHT),
        (false, true, true, false) => Some(OFFSET_BACK_LEFT),
        (false, true, false, true) => Some(OFFSET_BACK_RIGHT),
        _ => None,
    }
}

/// Analog heading wins over the table; unmapped combinations keep `previous`.
pub fn direction_offset(input: &MoveInput, previous: Real) -> Real {
    if let Some(degrees) = input.analog_deg {
        return degrees.to_radians() + FRAC_PI_2;
    }
    table_offset(input).unwrap_or(previous)
}

/// Yaw of the camera as seen from the avatar, measured from +Z toward +X.
pub fn camera_relative_angle(avatar: &Vector<Real>, camera: &Vector<Real>) -> Real {
    (camera.x - avatar.x).atan2(camera.z - avatar.z)
}

pub fn yaw_rotation(yaw: Real) -> Rotation<Real> {
    Rotation::from_axis_angle(&Vector::y_axis(), yaw)
}

pub struct OrientationController {
    config: FacingConfig,
    last_offset: Real,
}

impl OrientationController {
    pub fn new(config: FacingConfig) -> Self {
        Self {
            config,
            last_offset: OFFSET_FORWARD,
        }
    }

    pub fn config(&self) -> FacingConfig {
        self.config
    }

    pub fn last_offset(&self) -> Real {
        self.last_offset
    }

    /// Turns `rotation` toward the input heading. Leaves it untouched and
    /// returns `None` when neither movement nor jump input is active.
    pub fn update(
        &mut self,
        rotation: &mut Rotation<Real>,
        input: &MoveInput,
        jump_active: bool,
        avatar: &Vector<Real>,
        camera: &Vector<Real>,
    ) -> Option<Real> {
        if !input.is_moving() && !jump_active {
            return None;
        }
        let offset = direction_offset(input, self.last_offset);
        self.last_offset = offset;
        let target_yaw = camera_relative_angle(avatar, camera) + offset;
        let target = yaw_rotation(target_yaw);
        let nudged = rotate_towards(rotation, &target, self.config.max_step);
        *rotation = slerp(rotation, &nudged, self.config.blend);
        Some(target_yaw)
    }
}

fn rotate_towards(from: &Rotation<Real>, to: &Rotation<Real>, max_step: Real) -> Rotation<Real> {
    let angle = from.angle_to(to);
    if angle <= max_step {
        return *to;
    }
    slerp(from, to, max_step / angle)
}

fn slerp(from: &Rotation<Real>, to: &Rotation<Real>, t: Real) -> Rotation<Real> {
    // `None` needs antipodal quaternions, which the shortest-path sign flip rules out.
    from.try_slerp(to, t, 1.0e-6).unwrap_or(*to)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn keys(forward: bool, back: bool, left: bool, right: bool) -> MoveInput {
        MoveInput {
            forward,
            back,
            left,
            right,
            analog_deg: None,
        }
    }

    #[test]
    fn offset_table_entries() {
        let prior = 1.25;
        assert_eq!(direction_offset(&keys(true, false, false, false), prior), PI);
        assert_eq!(direction_offset(&keys(false, true, false, false), prior), 0.0);
        assert_eq!(direction_offset(&keys(false, false, true, false), prior), -FRAC_PI_2);
        assert_eq!(direction_offset(&keys(false, false, false, true), prior), FRAC_PI_2);
        assert_eq!(
            direction_offset(&keys(true, false, true, false), prior),
            OFFSET_FORWARD_LEFT
        );
        assert_eq!(
            direction_offset(&keys(true, false, false, true), prior),
            OFFSET_FORWARD_RIGHT
        );
        assert_eq!(direction_offset(&keys(false, true, true, false), prior), -FRAC_PI_4);
        assert_eq!(direction_offset(&keys(false, true, false, true), prior), FRAC_PI_4);
    }

    #[test]
    fn unmapped_combinations_keep_previous_offset() {
        let prior = -0.7;
        assert_eq!(direction_offset(&MoveInput::default(), prior), prior);
        assert_eq!(direction_offset(&keys(true, false, true, true), prior), prior);
        assert_eq!(direction_offset(&keys(false, true, true, true), prior), prior);
        assert_eq!(direction_offset(&keys(true, true, true, true), prior), prior);
    }

    #[test]
    fn opposing_pairs_pick_back_and_left() {
        let prior = -0.7;
        assert_eq!(direction_offset(&keys(true, true, false, false), prior), OFFSET_BACK);
        assert_eq!(direction_offset(&keys(false, false, true, true), prior), OFFSET_LEFT);
    }

    #[test]
    fn analog_overrides_table() {
        let input = MoveInput {
            forward: true,
            analog_deg: Some(0.0),
            ..Default::default()
        };
        assert!((direction_offset(&input, 0.0) - FRAC_PI_2).abs() < 1.0e-6);
        let input = MoveInput {
            analog_deg: Some(90.0),
            ..Default::default()
        };
        assert!((direction_offset(&input, 0.0) - PI).abs() < 1.0e-6);
    }

    #[test]
    fn camera_angle_measured_from_plus_z() {
        let avatar = Vector::new(1.0, 0.0, 1.0);
        assert!(camera_relative_angle(&avatar, &Vector::new(1.0, 3.0, 6.0)).abs() < 1.0e-6);
        let side = camera_relative_angle(&avatar, &Vector::new(6.0, 0.0, 1.0));
        assert!((side - FRAC_PI_2).abs() < 1.0e-6);
    }

    #[test]
    fn idle_input_leaves_rotation_alone() {
        let mut controller = OrientationController::new(FacingConfig::default());
        let mut rotation = yaw_rotation(0.3);
        let before = rotation;
        let target = controller.update(
            &mut rotation,
            &MoveInput::default(),
            false,
            &Vector::zeros(),
            &Vector::new(0.0, 0.0, 5.0),
        );
        assert!(target.is_none());
        assert_eq!(rotation, before);
        assert_eq!(controller.last_offset(), OFFSET_FORWARD);
    }

    #[test]
    fn rotation_is_damped_then_converges() {
        let mut controller = OrientationController::new(FacingConfig::default());
        let mut rotation = Rotation::identity();
        let input = keys(false, false, false, true);
        let camera = Vector::new(0.0, 0.0, 5.0);
        controller.update(&mut rotation, &input, false, &Vector::zeros(), &camera);
        assert!((rotation.angle() - 0.4 * 0.6).abs() < 1.0e-4);

        for _ in 0..60 {
            controller.update(&mut rotation, &input, false, &Vector::zeros(), &camera);
        }
        assert!(rotation.angle_to(&yaw_rotation(FRAC_PI_2)) < 1.0e-3);
    }

    #[test]
    fn jump_alone_keeps_last_heading() {
        let mut controller = OrientationController::new(FacingConfig::default());
        let mut rotation = Rotation::identity();
        let camera = Vector::new(0.0, 0.0, 5.0);
        controller.update(
            &mut rotation,
            &keys(false, false, true, false),
            false,
            &Vector::zeros(),
            &camera,
        );
        let target = controller.update(
            &mut rotation,
            &MoveInput::default(),
            true,
            &Vector::zeros(),
            &camera,
        );
        assert_eq!(target, Some(-FRAC_PI_2));
    }

    #[test]
    fn slerp_handles_matching_and_opposite_headings() {
        let start = yaw_rotation(0.3);
        assert!(slerp(&start, &start, 0.6).angle_to(&start) < 1.0e-5);

        let opposite = yaw_rotation(0.3 + PI);
        let halfway = slerp(&start, &opposite, 0.5);
        assert!((halfway.angle_to(&start) - FRAC_PI_2).abs() < 1.0e-4);
        assert!((halfway.angle_to(&opposite) - FRAC_PI_2).abs() < 1.0e-4);
    }
}
