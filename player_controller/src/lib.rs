//! Avatar session composition (input + motor + collision + facing + animation + camera).
#![forbid(unsafe_code)]

mod config;
mod interaction;

pub use config::{
    AnimationSettings, AvatarConfig, CameraSettings, CapsuleSettings, FacingSettings,
    InteractionSettings,
};
pub use interaction::{ClickEvent, HoverEvent, InteractionProbe, InteractionTarget};

use character_animation::{AnimationClips, AnimationStateMachine, Transition};
use character_collision::{AvatarTransform, Capsule, CollisionResolution, CollisionResolver};
use character_facing::OrientationController;
use character_motor::{MotorState, MovementIntegrator};
use engine_core::logging;
use player_camera::{CameraRig, PersonView};
use player_input::{InputBindings, InputChannel, InputState, PumpSummary};
use rapier3d::math::{Rotation, Vector};
use rapier3d::prelude::Real;
use static_collider::StaticCollider;

/// What the model loader hands over once the avatar has finished loading.
#[derive(Clone, Debug, PartialEq)]
pub struct AvatarAssets {
    pub model: String,
    pub clips: AnimationClips,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AvatarPose {
    pub position: Vector<Real>,
    pub rotation: Rotation<Real>,
    pub scale: Real,
    /// False in first person.
    pub visible: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TickSummary {
    /// Frame time after clamping.
    pub dt: Real,
    pub jumped: bool,
    pub toggled: Option<PersonView>,
    pub collision: CollisionResolution,
    pub transition: Option<Transition>,
    pub camera_occluded: bool,
    /// The avatar fell below `reset_y` and was sent back to spawn.
    pub fell: bool,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub enum TickReport {
    /// Avatar or collider missing; nothing moved.
    NotReady,
    Advanced(TickSummary),
}

struct Avatar {
    assets: AvatarAssets,
    capsule: Capsule,
    motor: MotorState,
    rotation: Rotation<Real>,
    facing: OrientationController,
    animation: AnimationStateMachine,
}

pub struct AvatarSession {
    config: AvatarConfig,
    integrator: MovementIntegrator,
    resolver: CollisionResolver,
    camera: CameraRig,
    input: InputState,
    bindings: Option<InputBindings>,
    avatar: Option<Avatar>,
    collider_seen: bool,
}

impl AvatarSession {
    pub fn new(config: AvatarConfig) -> Result<Self, String> {
        config.validate()?;
        let [x, y, z] = config.camera.initial_position;
        let camera = CameraRig::new(
            config.camera_config(),
            Vector::new(x, y, z),
            config.person_view(),
        );
        Ok(Self {
            integrator: MovementIntegrator::new(config.motor_config()),
            resolver: CollisionResolver::new(),
            camera,
            input: InputState::new(),
            bindings: None,
            avatar: None,
            collider_seen: false,
            config,
        })
    }

    pub fn config(&self) -> &AvatarConfig {
        &self.config
    }

    /// Installs the loaded avatar at spawn and enables input.
    pub fn attach_avatar(&mut self, assets: AvatarAssets) -> Result<(), String> {
        assets.clips.validate()?;
        let capsule = self.config.capsule()?;
        let animation =
            AnimationStateMachine::new(assets.clips.clone(), self.config.animation.fade_duration);
        logging::info(format!(
            "avatar '{}' attached (clips: {}, {}, {})",
            assets.model, assets.clips.idle.name, assets.clips.walk.name, assets.clips.jump.name
        ));
        self.avatar = Some(Avatar {
            assets,
            capsule,
            motor: MotorState::new(self.config.spawn()),
            rotation: Rotation::identity(),
            facing: OrientationController::new(self.config.facing_config()),
            animation,
        });
        self.input.set_enabled(true);
        self.reset();
        Ok(())
    }

    pub fn assets(&self) -> Option<&AvatarAssets> {
        self.avatar.as_ref().map(|avatar| &avatar.assets)
    }

    /// Avatar attached and a collider seen by a previous `update`.
    pub fn is_ready(&self) -> bool {
        self.avatar.is_some() && self.collider_seen
    }

    pub fn is_grounded(&self) -> bool {
        self.avatar
            .as_ref()
            .map_or(false, |avatar| avatar.motor.grounded)
    }

    pub fn person_view(&self) -> PersonView {
        self.camera.view()
    }

    pub fn position(&self) -> Option<Vector<Real>> {
        self.avatar.as_ref().map(|avatar| avatar.motor.position)
    }

    pub fn velocity(&self) -> Option<Vector<Real>> {
        self.avatar.as_ref().map(|avatar| avatar.motor.velocity)
    }

    pub fn pose(&self) -> Option<AvatarPose> {
        self.avatar.as_ref().map(|avatar| AvatarPose {
            position: avatar.motor.position,
            rotation: avatar.rotation,
            scale: self.config.model_scale,
            visible: self.camera.avatar_visible(),
        })
    }

    pub fn camera(&self) -> &CameraRig {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut CameraRig {
        &mut self.camera
    }

    pub fn animation(&self) -> Option<&AnimationStateMachine> {
        self.avatar.as_ref().map(|avatar| &avatar.animation)
    }

    pub fn input(&self) -> &InputState {
        &self.input
    }

    pub fn input_mut(&mut self) -> &mut InputState {
        &mut self.input
    }

    /// Subscribes to `channel`; messages published earlier are not replayed.
    pub fn bind_input(&mut self, channel: &InputChannel) {
        self.bindings = Some(InputBindings::new(channel));
    }

    /// Drains pending channel messages into the input state.
    pub fn pump_input(&mut self, channel: &InputChannel) -> PumpSummary {
        let bindings = self
            .bindings
            .get_or_insert_with(|| InputBindings::new(channel));
        let summary = bindings.pump(channel, &mut self.input);
        if summary.ignored > 0 && logging::enabled(logging::LogLevel::Debug) {
            logging::debug(format!(
                "ignored {} input message(s) while input is disabled",
                summary.ignored
            ));
        }
        summary
    }

    /// Sends the avatar back to spawn with zero velocity and re-centres the orbit.
    pub fn reset(&mut self) -> bool {
        let spawn = self.config.spawn();
        let Some(avatar) = self.avatar.as_mut() else {
            return false;
        };
        avatar.motor.velocity = Vector::zeros();
        avatar.motor.position = spawn;
        self.camera.sync(spawn);
        true
    }

    /// Advances the whole pipeline by one frame.
    pub fn update(&mut self, dt: Real, collider: Option<&StaticCollider>) -> TickReport {
        let Some(collider) = collider else {
            return TickReport::NotReady;
        };
        if !self.collider_seen {
            self.collider_seen = true;
            logging::info(format!(
                "static collider attached ({} triangles)",
                collider.triangle_count()
            ));
        }
        let Some(avatar) = self.avatar.as_mut() else {
            return TickReport::NotReady;
        };
        let dt = clamp_frame_dt(dt, self.config.max_frame_dt);

        let pulses = self.input.begin_tick();
        let jumped = pulses.jump && self.integrator.jump(&mut avatar.motor);
        let toggled = if pulses.toggle {
            let view = self.camera.toggle_view();
            logging::info(format!("person view -> {:?}", view));
            Some(view)
        } else {
            None
        };

        let movement = self.input.move_input();
        self.integrator
            .step(&mut avatar.motor, &movement, self.camera.azimuth(), dt);

        let transform = AvatarTransform::new(
            avatar.motor.position,
            avatar.rotation,
            self.config.model_scale,
        );
        let collision = self.resolver.resolve(
            collider,
            &avatar.capsule,
            &transform,
            avatar.motor.velocity,
            dt,
        );
        avatar.motor.position += collision.correction;
        avatar.motor.velocity = collision.velocity;
        avatar.motor.grounded = collision.grounded;

        avatar.facing.update(
            &mut avatar.rotation,
            &movement,
            self.input.jump_active(),
            &avatar.motor.position,
            &self.camera.position(),
        );
        let transition = avatar
            .animation
            .update(dt, avatar.motor.grounded, movement.is_moving());

        let camera = self.camera.update(avatar.motor.position, Some(collider));

        let fell = avatar.motor.position.y < self.config.reset_y;
        if fell {
            logging::info(format!(
                "avatar fell to y={:.2}; resetting to spawn",
                avatar.motor.position.y
            ));
            self.reset();
        }

        TickReport::Advanced(TickSummary {
            dt,
            jumped,
            toggled,
            collision,
            transition,
            camera_occluded: camera.occluder.is_some(),
            fell,
        })
    }

    /// Gaze probe from the camera toward the orbit target; silent until ready.
    pub fn hover(&self, probe: &InteractionProbe) -> Option<HoverEvent> {
        if !self.is_ready() {
            return None;
        }
        let eye = self.camera.position();
        let forward = (self.camera.target() - eye).try_normalize(Real::EPSILON)?;
        probe.hover(eye, forward)
    }
}

/// Negative and non-finite frame times become zero; long frames are capped.
pub fn clamp_frame_dt(dt: Real, max_frame_dt: Real) -> Real {
    if dt.is_finite() {
        dt.clamp(0.0, max_frame_dt)
    } else {
        0.0
    }
}
