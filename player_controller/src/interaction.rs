use rapier3d::math::{Point, Vector};
use rapier3d::prelude::Real;
use static_collider::{RayHit, SceneDescription, StaticCollider};

use crate::config::InteractionSettings;

/// A labelled piece of geometry the pointer or gaze can pick.
#[derive(Clone, Debug)]
pub struct InteractionTarget {
    pub id: String,
    /// Tooltip text; targets without one are clickable but never hovered.
    pub title: Option<String>,
    collider: StaticCollider,
}

impl InteractionTarget {
    pub fn new(id: impl Into<String>, title: Option<String>, collider: StaticCollider) -> Self {
        Self {
            id: id.into(),
            title,
            collider,
        }
    }

    pub fn collider(&self) -> &StaticCollider {
        &self.collider
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HoverEvent {
    ShowTooltip { id: String, title: String },
    HideTooltip,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClickEvent {
    pub id: String,
    pub title: Option<String>,
}

pub struct InteractionProbe {
    settings: InteractionSettings,
    targets: Vec<InteractionTarget>,
    pointer_down: Option<[Real; 2]>,
}

impl InteractionProbe {
    pub fn new(settings: InteractionSettings) -> Self {
        Self {
            settings,
            targets: Vec::new(),
            pointer_down: None,
        }
    }

    /// Registers every solid tagged `interactive` in `scene`.
    pub fn from_scene(settings: InteractionSettings, scene: &SceneDescription) -> Result<Self, String> {
        let mut probe = Self::new(settings);
        for (solid, collider) in StaticCollider::interactive_from_scene(scene)? {
            probe.add_target(InteractionTarget::new(solid.id, solid.title, collider));
        }
        Ok(probe)
    }

    pub fn add_target(&mut self, target: InteractionTarget) {
        self.targets.push(target);
    }

    pub fn targets(&self) -> &[InteractionTarget] {
        &self.targets
    }

    /// Gaze probe along the camera's forward axis. `None` when there is
    /// nothing to probe.
    pub fn hover(&self, eye: Vector<Real>, forward: Vector<Real>) -> Option<HoverEvent> {
        if self.targets.is_empty() {
            return None;
        }
        let event = match self.nearest(eye, forward, self.settings.hover_range) {
            Some((target, _)) => match &target.title {
                Some(title) => HoverEvent::ShowTooltip {
                    id: target.id.clone(),
                    title: title.clone(),
                },
                None => HoverEvent::HideTooltip,
            },
            None => HoverEvent::HideTooltip,
        };
        Some(event)
    }

    /// Screen-space pointer press, in pixels.
    pub fn pointer_down(&mut self, screen: [Real; 2]) {
        self.pointer_down = Some(screen);
    }

    /// Pointer release with the world ray under the cursor. Drags beyond the
    /// slop on either axis are not clicks.
    pub fn pointer_up(
        &mut self,
        screen: [Real; 2],
        origin: Vector<Real>,
        direction: Vector<Real>,
    ) -> Option<ClickEvent> {
        let down = self.pointer_down.take()?;
        let slop = self.settings.click_slop;
        if (screen[0] - down[0]).abs() > slop || (screen[1] - down[1]).abs() > slop {
            return None;
        }
        let (target, _) = self.nearest(origin, direction, self.settings.click_range)?;
        Some(ClickEvent {
            id: target.id.clone(),
            title: target.title.clone(),
        })
    }

    fn nearest(
        &self,
        origin: Vector<Real>,
        direction: Vector<Real>,
        range: Real,
    ) -> Option<(&InteractionTarget, RayHit)> {
        self.targets
            .iter()
            .filter_map(|target| {
                target
                    .collider
                    .cast_ray(Point::from(origin), direction, range)
                    .map(|hit| (target, hit))
            })
            .min_by(|a, b| a.1.toi.total_cmp(&b.1.toi))
    }
}
