//! Avatar movement integrator (gravity + camera-relative planar steps).
#![forbid(unsafe_code)]

use rapier3d::math::{Real, Rotation, Vector};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotorConfig {
    /// Signed vertical acceleration in m/s^2 (negative pulls down).
    pub gravity: Real,
    /// Vertical launch speed applied by a jump, in m/s.
    pub jump_height: Real,
    /// Planar speed per active direction, in m/s.
    pub speed: Real,
}

impl Default for MotorConfig {
    fn default() -> Self {
        Self {
            gravity: -30.0,
            jump_height: 12.0,
            speed: 4.0,
        }
    }
}

/// Movement request for one tick. `analog_deg` is the joystick heading with
/// 0 deg along +X; `None` means no analog input and `Some(0.0)` is a heading.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MoveInput {
    pub forward: bool,
    pub back: bool,
    pub left: bool,
    pub right: bool,
    pub analog_deg: Option<Real>,
}

impl MoveInput {
    pub fn any_direction(&self) -> bool {
        self.forward || self.back || self.left || self.right
    }

    pub fn is_moving(&self) -> bool {
        self.any_direction() || self.analog_deg.is_some()
    }

    fn axes(&self) -> [(bool, Vector<Real>); 4] {
        [
            (self.forward, forward_axis()),
            (self.back, Vector::new(0.0, 0.0, 1.0)),
            (self.left, Vector::new(-1.0, 0.0, 0.0)),
            (self.right, Vector::new(1.0, 0.0, 0.0)),
        ]
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotorState {
    pub position: Vector<Real>,
    pub velocity: Vector<Real>,
    /// Ground classification from the previous collision pass.
    pub grounded: bool,
}

impl MotorState {
    pub fn new(position: Vector<Real>) -> Self {
        Self {
            position,
            velocity: Vector::zeros(),
            grounded: false,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MotorStep {
    pub vertical: Vector<Real>,
    pub planar: Vector<Real>,
}

pub struct MovementIntegrator {
    config: MotorConfig,
}

impl MovementIntegrator {
    pub fn new(config: MotorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> MotorConfig {
        self.config
    }

    pub fn config_mut(&mut self) -> &mut MotorConfig {
        &mut self.config
    }

    /// Launches a grounded avatar; airborne avatars ignore the request.
    pub fn jump(&self, state: &mut MotorState) -> bool {
        if !state.grounded {
            return false;
        }
        state.velocity.y = self.config.jump_height;
        state.grounded = false;
        true
    }

    pub fn step(
        &self,
        state: &mut MotorState,
        input: &MoveInput,
        azimuth: Real,
        dt: Real,
    ) -> MotorStep {
        // Grounded avatars restart from one tick of gravity instead of accumulating.
        if state.grounded {
            state.velocity.y = dt * self.config.gravity;
        } else {
            state.velocity.y += dt * self.config.gravity;
        }
        let vertical = state.velocity * dt;
        state.position += vertical;

        let step = self.config.speed * dt;
        let mut planar = Vector::zeros();
        for (active, axis) in input.axes() {
            if active {
                planar += rotate_about_up(axis, azimuth) * step;
            }
        }
        if let Some(degrees) = input.analog_deg {
            let heading = azimuth + (degrees - 90.0).to_radians();
            planar += rotate_about_up(forward_axis(), heading) * step;
        }
        state.position += planar;

        MotorStep { vertical, planar }
    }
}

pub fn forward_axis() -> Vector<Real> {
    Vector::new(0.0, 0.0, -1.0)
}

pub fn rotate_about_up(axis: Vector<Real>, angle: Real) -> Vector<Real> {
    Rotation::from_axis_angle(&Vector::y_axis(), angle) * axis
}
