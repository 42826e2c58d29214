//! Orbit camera locked to the avatar: person view, distance limits, occlusion.
#![forbid(unsafe_code)]

use std::f32::consts::{FRAC_PI_2, PI};

use rapier3d::math::{Point, Vector};
use rapier3d::prelude::Real;
use static_collider::{RayHit, StaticCollider};

/// Keeps the polar angle off the poles so the azimuth stays defined.
const POLAR_EPSILON: Real = 1.0e-6;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraConfig {
    pub third_person_min_distance: Real,
    pub third_person_max_distance: Real,
    pub first_person_distance: Real,
    pub third_person_max_polar: Real,
    pub occlusion_range: Real,
    /// Pull-in from the occluding hit point toward the avatar.
    pub occlusion_margin: Real,
    /// Orbit distance restored when leaving first person.
    pub toggle_distance: Real,
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            third_person_min_distance: 2.0,
            third_person_max_distance: 5.0,
            first_person_distance: 1.0e-4,
            third_person_max_polar: FRAC_PI_2,
            occlusion_range: 5.0,
            occlusion_margin: 0.5,
            toggle_distance: 5.0,
        }
    }
}

impl CameraConfig {
    pub fn validate(&self) -> Result<(), String> {
        let values = [
            self.third_person_min_distance,
            self.third_person_max_distance,
            self.first_person_distance,
            self.third_person_max_polar,
            self.occlusion_range,
            self.occlusion_margin,
            self.toggle_distance,
        ];
        if !values.iter().all(|value| value.is_finite()) {
            return Err("camera settings must be finite".to_string());
        }
        if self.third_person_min_distance < 0.0
            || self.third_person_min_distance > self.third_person_max_distance
        {
            return Err("camera distance band must satisfy 0 <= min <= max".to_string());
        }
        if self.first_person_distance <= 0.0 {
            return Err("first person distance must be > 0".to_string());
        }
        if self.third_person_max_polar <= 0.0 || self.third_person_max_polar > PI {
            return Err("camera max polar angle must be in (0, pi]".to_string());
        }
        if self.occlusion_range < 0.0 || self.occlusion_margin < 0.0 || self.toggle_distance <= 0.0
        {
            return Err("camera occlusion and toggle distances must be positive".to_string());
        }
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PersonView {
    First,
    Third,
}

/// Snapshot of the orbit: eye, orbit target and the limits in force this tick.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraState {
    pub position: Vector<Real>,
    pub target: Vector<Real>,
    pub min_distance: Real,
    pub max_distance: Real,
    pub max_polar: Real,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CameraUpdate {
    /// Geometry hit between avatar and camera, if the camera was pulled in.
    pub occluder: Option<RayHit>,
}

pub struct CameraRig {
    config: CameraConfig,
    view: PersonView,
    state: CameraState,
    avatar_visible: bool,
}

impl CameraRig {
    pub fn new(config: CameraConfig, position: Vector<Real>, view: PersonView) -> Self {
        let mut rig = Self {
            config,
            view,
            state: CameraState {
                position,
                target: Vector::zeros(),
                min_distance: 0.0,
                max_distance: Real::INFINITY,
                max_polar: PI,
            },
            avatar_visible: view == PersonView::Third,
        };
        rig.apply_view_limits();
        rig
    }

    pub fn config(&self) -> CameraConfig {
        self.config
    }

    pub fn view(&self) -> PersonView {
        self.view
    }

    pub fn is_first_person(&self) -> bool {
        self.view == PersonView::First
    }

    pub fn avatar_visible(&self) -> bool {
        self.avatar_visible
    }

    pub fn state(&self) -> CameraState {
        self.state
    }

    pub fn position(&self) -> Vector<Real> {
        self.state.position
    }

    pub fn target(&self) -> Vector<Real> {
        self.state.target
    }

    pub fn distance(&self) -> Real {
        (self.state.position - self.state.target).norm()
    }

    /// Orbit yaw of the camera around the target, from +Z toward +X.
    pub fn azimuth(&self) -> Real {
        let offset = self.state.position - self.state.target;
        offset.x.atan2(offset.z)
    }

    pub fn polar(&self) -> Real {
        let offset = self.state.position - self.state.target;
        let radius = offset.norm();
        if radius <= 0.0 {
            return 0.0;
        }
        (offset.y / radius).clamp(-1.0, 1.0).acos()
    }

    /// Manual orbit input; limits apply immediately.
    pub fn rotate(&mut self, delta_azimuth: Real, delta_polar: Real) {
        let radius = self.distance();
        let azimuth = self.azimuth() + delta_azimuth;
        let polar = (self.polar() + delta_polar).clamp(POLAR_EPSILON, PI - POLAR_EPSILON);
        self.state.position = self.state.target + spherical_offset(radius, polar, azimuth);
        self.constrain();
    }

    pub fn set_view(&mut self, view: PersonView) {
        if view != self.view {
            self.toggle_view();
        }
    }

    /// Flips person view. Leaving first person pushes the camera back out to
    /// the toggle distance along its current bearing.
    pub fn toggle_view(&mut self) -> PersonView {
        self.view = match self.view {
            PersonView::First => PersonView::Third,
            PersonView::Third => PersonView::First,
        };
        match self.view {
            PersonView::First => self.avatar_visible = false,
            PersonView::Third => {
                self.avatar_visible = true;
                let offset = self.state.position - self.state.target;
                let bearing = offset
                    .try_normalize(Real::EPSILON)
                    .unwrap_or_else(|| Vector::new(0.0, 0.0, 1.0));
                self.state.position = self.state.target + bearing * self.config.toggle_distance;
            }
        }
        self.apply_view_limits();
        self.view
    }

    /// Moves target and camera by the same delta so the orbit offset survives.
    pub fn follow(&mut self, target: Vector<Real>) {
        let delta = target - self.state.target;
        self.state.target = target;
        self.state.position += delta;
    }

    /// Follows `target` and re-applies limits without occlusion checks.
    pub fn sync(&mut self, target: Vector<Real>) {
        self.apply_view_limits();
        self.follow(target);
        self.constrain();
    }

    /// Per-tick camera pass: view limits, follow, occlusion, then clamp.
    pub fn update(
        &mut self,
        target: Vector<Real>,
        collider: Option<&StaticCollider>,
    ) -> CameraUpdate {
        self.apply_view_limits();
        self.follow(target);
        let occluder = collider.and_then(|collider| self.avoid_occlusion(collider));
        self.constrain();
        CameraUpdate { occluder }
    }

    fn apply_view_limits(&mut self) {
        match self.view {
            PersonView::First => {
                self.state.min_distance = self.config.first_person_distance;
                self.state.max_distance = self.config.first_person_distance;
                self.state.max_polar = PI;
            }
            PersonView::Third => {
                self.state.min_distance = self.config.third_person_min_distance;
                self.state.max_distance = self.config.third_person_max_distance;
                self.state.max_polar = self.config.third_person_max_polar;
            }
        }
    }

    fn avoid_occlusion(&mut self, collider: &StaticCollider) -> Option<RayHit> {
        if self.is_first_person() {
            return None;
        }
        let direction = (self.state.position - self.state.target)
            .try_normalize(Real::EPSILON)?;
        let hit = collider.cast_ray(
            Point::from(self.state.target),
            direction,
            self.config.occlusion_range,
        );
        match hit {
            Some(hit) => {
                let reach = (hit.toi - self.config.occlusion_margin)
                    .max(self.config.first_person_distance);
                self.state.position = self.state.target + direction * reach;
                self.state.min_distance = 0.0;
                Some(hit)
            }
            None => {
                self.state.min_distance = self.config.third_person_min_distance;
                None
            }
        }
    }

    fn constrain(&mut self) {
        let offset = self.state.position - self.state.target;
        let radius = offset
            .norm()
            .clamp(self.state.min_distance, self.state.max_distance);
        let polar = self
            .polar()
            .clamp(POLAR_EPSILON, self.state.max_polar.min(PI - POLAR_EPSILON));
        let azimuth = offset.x.atan2(offset.z);
        self.state.position = self.state.target + spherical_offset(radius, polar, azimuth);
    }
}

fn spherical_offset(radius: Real, polar: Real, azimuth: Real) -> Vector<Real> {
    let ring = radius * polar.sin();
    Vector::new(ring * azimuth.sin(), radius * polar.cos(), ring * azimuth.cos())
}
