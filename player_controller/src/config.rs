use character_collision::Capsule;
use character_facing::FacingConfig;
use character_motor::MotorConfig;
use player_camera::{CameraConfig, PersonView};
use rapier3d::math::{Point, Vector};
use rapier3d::prelude::Real;
use serde::Deserialize;

const CONFIG_VERSION: u32 = 1;

/// Every avatar tunable with its default; TOML files may set any subset.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AvatarConfig {
    pub version: u32,
    pub gravity: Real,
    /// Vertical launch speed of a jump, in m/s.
    pub jump_height: Real,
    pub speed: Real,
    pub spawn_position: [Real; 3],
    /// Falling below this height teleports the avatar back to spawn.
    pub reset_y: Real,
    pub first_person: bool,
    pub model_scale: Real,
    pub max_frame_dt: Real,
    pub capsule: CapsuleSettings,
    pub facing: FacingSettings,
    pub animation: AnimationSettings,
    pub camera: CameraSettings,
    pub interaction: InteractionSettings,
}

impl Default for AvatarConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            gravity: -30.0,
            jump_height: 12.0,
            speed: 4.0,
            spawn_position: [0.0, 2.0, 0.0],
            reset_y: -25.0,
            first_person: false,
            model_scale: 0.2,
            max_frame_dt: 0.05,
            capsule: CapsuleSettings::default(),
            facing: FacingSettings::default(),
            animation: AnimationSettings::default(),
            camera: CameraSettings::default(),
            interaction: InteractionSettings::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CapsuleSettings {
    pub radius: Real,
    pub segment_start: [Real; 3],
    pub segment_end: [Real; 3],
}

impl Default for CapsuleSettings {
    fn default() -> Self {
        Self {
            radius: 0.5,
            segment_start: [0.0, 0.0, 0.0],
            segment_end: [0.0, -10.0, 0.0],
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct FacingSettings {
    pub max_step: Real,
    pub blend: Real,
}

impl Default for FacingSettings {
    fn default() -> Self {
        let facing = FacingConfig::default();
        Self {
            max_step: facing.max_step,
            blend: facing.blend,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct AnimationSettings {
    pub fade_duration: Real,
}

impl Default for AnimationSettings {
    fn default() -> Self {
        Self { fade_duration: 0.1 }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct CameraSettings {
    pub initial_position: [Real; 3],
    pub third_person_min_distance: Real,
    pub third_person_max_distance: Real,
    pub first_person_distance: Real,
    pub third_person_max_polar: Real,
    pub occlusion_range: Real,
    pub occlusion_margin: Real,
    pub toggle_distance: Real,
}

impl Default for CameraSettings {
    fn default() -> Self {
        let camera = CameraConfig::default();
        Self {
            initial_position: [3.0, 3.0, 3.0],
            third_person_min_distance: camera.third_person_min_distance,
            third_person_max_distance: camera.third_person_max_distance,
            first_person_distance: camera.first_person_distance,
            third_person_max_polar: camera.third_person_max_polar,
            occlusion_range: camera.occlusion_range,
            occlusion_margin: camera.occlusion_margin,
            toggle_distance: camera.toggle_distance,
        }
    }
}

#[derive(Clone, Copy, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct InteractionSettings {
    pub hover_range: Real,
    pub click_range: Real,
    /// Largest pointer travel in pixels, per axis, that still counts as a click.
    pub click_slop: Real,
}

impl Default for InteractionSettings {
    fn default() -> Self {
        Self {
            hover_range: 17.0,
            click_range: 22.0,
            click_slop: 1.0,
        }
    }
}

impl AvatarConfig {
    pub fn parse_toml(text: &str) -> Result<Self, String> {
        let config: Self = toml::from_str(text).map_err(|err| err.to_string())?;
        config.validate()?;
        Ok(config)
    }

    pub fn with_gravity(mut self, gravity: Real) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_jump_height(mut self, jump_height: Real) -> Self {
        self.jump_height = jump_height;
        self
    }

    pub fn with_speed(mut self, speed: Real) -> Self {
        self.speed = speed;
        self
    }

    pub fn with_spawn_position(mut self, spawn_position: [Real; 3]) -> Self {
        self.spawn_position = spawn_position;
        self
    }

    pub fn with_reset_y(mut self, reset_y: Real) -> Self {
        self.reset_y = reset_y;
        self
    }

    pub fn with_first_person(mut self, first_person: bool) -> Self {
        self.first_person = first_person;
        self
    }

    pub fn with_model_scale(mut self, model_scale: Real) -> Self {
        self.model_scale = model_scale;
        self
    }

    pub fn with_max_frame_dt(mut self, max_frame_dt: Real) -> Self {
        self.max_frame_dt = max_frame_dt;
        self
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.version != CONFIG_VERSION {
            return Err(format!("unsupported avatar config version {}", self.version));
        }
        let scalars = [
            ("gravity", self.gravity),
            ("jump_height", self.jump_height),
            ("speed", self.speed),
            ("reset_y", self.reset_y),
            ("model_scale", self.model_scale),
            ("max_frame_dt", self.max_frame_dt),
            ("facing.max_step", self.facing.max_step),
            ("facing.blend", self.facing.blend),
            ("animation.fade_duration", self.animation.fade_duration),
            ("interaction.hover_range", self.interaction.hover_range),
            ("interaction.click_range", self.interaction.click_range),
            ("interaction.click_slop", self.interaction.click_slop),
        ];
        for (name, value) in scalars {
            if !value.is_finite() {
                return Err(format!("{} must be finite", name));
            }
        }
        let vectors = [
            ("spawn_position", self.spawn_position),
            ("camera.initial_position", self.camera.initial_position),
        ];
        for (name, value) in vectors {
            if !value.iter().all(|component| component.is_finite()) {
                return Err(format!("{} must be finite", name));
            }
        }
        if self.speed < 0.0 || self.jump_height < 0.0 {
            return Err("speed and jump_height must be >= 0".to_string());
        }
        if self.model_scale <= 0.0 {
            return Err("model_scale must be > 0".to_string());
        }
        if self.max_frame_dt <= 0.0 {
            return Err("max_frame_dt must be > 0".to_string());
        }
        if self.spawn_position[1] <= self.reset_y {
            return Err(format!(
                "spawn height {} must be above reset_y {}",
                self.spawn_position[1], self.reset_y
            ));
        }
        if self.facing.max_step <= 0.0 || !(0.0..=1.0).contains(&self.facing.blend) {
            return Err("facing needs max_step > 0 and blend in [0, 1]".to_string());
        }
        if self.animation.fade_duration < 0.0 {
            return Err("animation.fade_duration must be >= 0".to_string());
        }
        if self.interaction.hover_range < 0.0
            || self.interaction.click_range < 0.0
            || self.interaction.click_slop < 0.0
        {
            return Err("interaction ranges must be >= 0".to_string());
        }
        self.capsule()?;
        self.camera_config().validate()
    }

    pub fn capsule(&self) -> Result<Capsule, String> {
        let [sx, sy, sz] = self.capsule.segment_start;
        let [ex, ey, ez] = self.capsule.segment_end;
        Capsule::new(
            self.capsule.radius,
            Point::new(sx, sy, sz),
            Point::new(ex, ey, ez),
        )
    }

    pub fn spawn(&self) -> Vector<Real> {
        Vector::from(self.spawn_position)
    }

    pub fn motor_config(&self) -> MotorConfig {
        MotorConfig {
            gravity: self.gravity,
            jump_height: self.jump_height,
            speed: self.speed,
        }
    }

    pub fn facing_config(&self) -> FacingConfig {
        FacingConfig {
            max_step: self.facing.max_step,
            blend: self.facing.blend,
        }
    }

    pub fn camera_config(&self) -> CameraConfig {
        CameraConfig {
            third_person_min_distance: self.camera.third_person_min_distance,
            third_person_max_distance: self.camera.third_person_max_distance,
            first_person_distance: self.camera.first_person_distance,
            third_person_max_polar: self.camera.third_person_max_polar,
            occlusion_range: self.camera.occlusion_range,
            occlusion_margin: self.camera.occlusion_margin,
            toggle_distance: self.camera.toggle_distance,
        }
    }

    pub fn person_view(&self) -> PersonView {
        if self.first_person {
            PersonView::First
        } else {
            PersonView::Third
        }
    }
}
