//! Avatar input: key flags, joystick heading, one-shot pulses, typed event channel.
#![forbid(unsafe_code)]

use bevy_ecs::event::{Event, Events, ManualEventReader};
use bevy_ecs::world::World;
use character_motor::MoveInput;
use rapier3d::math::Real;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Key {
    Forward,
    Back,
    Left,
    Right,
    Jump,
    TogglePerson,
}

impl Key {
    pub const ALL: [Key; 6] = [
        Key::Forward,
        Key::Back,
        Key::Left,
        Key::Right,
        Key::Jump,
        Key::TogglePerson,
    ];

    /// Maps a DOM-style key code; anything outside the alphabet is `None`.
    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "KeyW" => Some(Key::Forward),
            "KeyS" => Some(Key::Back),
            "KeyA" => Some(Key::Left),
            "KeyD" => Some(Key::Right),
            "Space" => Some(Key::Jump),
            "KeyV" => Some(Key::TogglePerson),
            _ => None,
        }
    }

    pub fn code(self) -> &'static str {
        match self {
            Key::Forward => "KeyW",
            Key::Back => "KeyS",
            Key::Left => "KeyA",
            Key::Right => "KeyD",
            Key::Jump => "Space",
            Key::TogglePerson => "KeyV",
        }
    }

    fn index(self) -> usize {
        match self {
            Key::Forward => 0,
            Key::Back => 1,
            Key::Left => 2,
            Key::Right => 3,
            Key::Jump => 4,
            Key::TogglePerson => 5,
        }
    }
}

/// One-shot latch: raised any number of times, observed by exactly one `take`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct Pulse {
    raised: bool,
}

impl Pulse {
    pub fn raise(&mut self) {
        self.raised = true;
    }

    pub fn is_raised(&self) -> bool {
        self.raised
    }

    pub fn take(&mut self) -> bool {
        std::mem::take(&mut self.raised)
    }
}

/// Pulses latched for the tick in progress.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickPulses {
    pub jump: bool,
    pub toggle: bool,
}

/// Key flags plus joystick heading, written by input handlers between ticks
/// and read by the pipeline during a tick. Starts disabled.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct InputState {
    enabled: bool,
    keys: [bool; 6],
    analog_deg: Option<Real>,
    jump: Pulse,
    toggle: Pulse,
    current: TickPulses,
}

impl InputState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Re-enabling keeps whatever flags are already set.
    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    /// Returns false when the transition was dropped because input is disabled.
    pub fn set_key(&mut self, key: Key, pressed: bool) -> bool {
        if !self.enabled {
            return false;
        }
        self.keys[key.index()] = pressed;
        true
    }

    pub fn is_pressed(&self, key: Key) -> bool {
        self.keys[key.index()]
    }

    /// `Some(0.0)` is a heading along +X; `None` clears analog input.
    pub fn set_analog_angle(&mut self, degrees: Option<Real>) -> bool {
        if !self.enabled {
            return false;
        }
        self.analog_deg = degrees.filter(|value| value.is_finite());
        true
    }

    pub fn analog_angle(&self) -> Option<Real> {
        self.analog_deg
    }

    pub fn pulse_jump(&mut self) -> bool {
        if !self.enabled {
            return false;
        }
        self.jump.raise();
        true
    }

    pub fn pulse_toggle(&mut self) -> bool {
        if !self.enabled {
            return false;
        }
        self.toggle.raise();
        true
    }

    /// Latches pending pulses for the tick about to run. Pulses raised after
    /// this call wait for the next tick.
    pub fn begin_tick(&mut self) -> TickPulses {
        self.current = TickPulses {
            jump: self.jump.take(),
            toggle: self.toggle.take(),
        };
        self.current
    }

    pub fn pulses(&self) -> TickPulses {
        self.current
    }

    /// Jump key held or jump pulse latched this tick.
    pub fn jump_active(&self) -> bool {
        self.is_pressed(Key::Jump) || self.current.jump
    }

    pub fn move_input(&self) -> MoveInput {
        MoveInput {
            forward: self.is_pressed(Key::Forward),
            back: self.is_pressed(Key::Back),
            left: self.is_pressed(Key::Left),
            right: self.is_pressed(Key::Right),
            analog_deg: self.analog_deg,
        }
    }

    /// Clears key flags, analog heading and every pulse; `enabled` is kept.
    pub fn reset_status(&mut self) {
        self.keys = [false; 6];
        self.analog_deg = None;
        self.jump = Pulse::default();
        self.toggle = Pulse::default();
        self.current = TickPulses::default();
    }
}

#[derive(Event, Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyDown(pub Key);

#[derive(Event, Clone, Copy, Debug, PartialEq, Eq)]
pub struct KeyUp(pub Key);

#[derive(Event, Clone, Copy, Debug, PartialEq)]
pub struct JoystickMoved(pub Option<Real>);

#[derive(Event, Clone, Copy, Debug, PartialEq, Eq)]
pub struct JumpButton;

/// Closed set of messages accepted by [`InputChannel::publish`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum InputMessage {
    KeyDown(Key),
    KeyUp(Key),
    JoystickMoved(Option<Real>),
    JumpButton,
}

impl InputMessage {
    /// Key message from a raw code; unknown codes yield `None`.
    pub fn key(code: &str, pressed: bool) -> Option<Self> {
        let key = Key::from_code(code)?;
        Some(if pressed {
            InputMessage::KeyDown(key)
        } else {
            InputMessage::KeyUp(key)
        })
    }
}

/// Typed publish/subscribe channel backed by one `Events<T>` buffer per message kind.
pub struct InputChannel {
    world: World,
}

impl InputChannel {
    pub fn new() -> Self {
        let mut world = World::new();
        world.init_resource::<Events<KeyDown>>();
        world.init_resource::<Events<KeyUp>>();
        world.init_resource::<Events<JoystickMoved>>();
        world.init_resource::<Events<JumpButton>>();
        Self { world }
    }

    pub fn publish(&mut self, message: InputMessage) {
        match message {
            InputMessage::KeyDown(key) => self.send(KeyDown(key)),
            InputMessage::KeyUp(key) => self.send(KeyUp(key)),
            InputMessage::JoystickMoved(degrees) => self.send(JoystickMoved(degrees)),
            InputMessage::JumpButton => self.send(JumpButton),
        }
    }

    pub fn send<T: Event>(&mut self, message: T) {
        if let Some(mut events) = self.world.get_resource_mut::<Events<T>>() {
            events.send(message);
        }
    }

    /// Cursor that sees only messages published after this call.
    pub fn subscribe<T: Event>(&self) -> Subscription<T> {
        let reader = self
            .events::<T>()
            .map(Events::get_reader_current)
            .unwrap_or_default();
        Subscription { reader }
    }

    /// Drops messages older than two frames; unread subscribers lose them.
    pub fn end_frame(&mut self) {
        self.advance::<KeyDown>();
        self.advance::<KeyUp>();
        self.advance::<JoystickMoved>();
        self.advance::<JumpButton>();
    }

    fn advance<T: Event>(&mut self) {
        if let Some(mut events) = self.world.get_resource_mut::<Events<T>>() {
            events.update();
        }
    }

    fn events<T: Event>(&self) -> Option<&Events<T>> {
        self.world.get_resource::<Events<T>>()
    }
}

impl Default for InputChannel {
    fn default() -> Self {
        Self::new()
    }
}

pub struct Subscription<T: Event> {
    reader: ManualEventReader<T>,
}

impl<T: Event + Clone> Subscription<T> {
    /// Messages published since the previous read, oldest first.
    pub fn read(&mut self, channel: &InputChannel) -> Vec<T> {
        match channel.events::<T>() {
            Some(events) => self.reader.read(events).cloned().collect(),
            None => Vec::new(),
        }
    }
}

/// What a pump changed, for callers that log or react to input.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct PumpSummary {
    pub applied: usize,
    pub ignored: usize,
}

/// The four subscriptions the avatar listens on, routed into an [`InputState`].
pub struct InputBindings {
    key_down: Subscription<KeyDown>,
    key_up: Subscription<KeyUp>,
    joystick: Subscription<JoystickMoved>,
    jump_button: Subscription<JumpButton>,
}

impl InputBindings {
    pub fn new(channel: &InputChannel) -> Self {
        Self {
            key_down: channel.subscribe(),
            key_up: channel.subscribe(),
            joystick: channel.subscribe(),
            jump_button: channel.subscribe(),
        }
    }

    pub fn pump(&mut self, channel: &InputChannel, state: &mut InputState) -> PumpSummary {
        let mut summary = PumpSummary::default();
        let mut record = |accepted: bool| {
            if accepted {
                summary.applied += 1;
            } else {
                summary.ignored += 1;
            }
        };
        for KeyDown(key) in self.key_down.read(channel) {
            let accepted = state.set_key(key, true);
            match key {
                Key::Jump => {
                    state.pulse_jump();
                }
                Key::TogglePerson => {
                    state.pulse_toggle();
                }
                _ => {}
            }
            record(accepted);
        }
        for KeyUp(key) in self.key_up.read(channel) {
            record(state.set_key(key, false));
        }
        for JoystickMoved(degrees) in self.joystick.read(channel) {
            record(state.set_analog_angle(degrees));
        }
        for JumpButton in self.jump_button.read(channel) {
            record(state.pulse_jump());
        }
        summary
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enabled_state() -> InputState {
        let mut state = InputState::new();
        state.set_enabled(true);
        state
    }

    #[test]
    fn key_codes_map_to_alphabet() {
        for key in Key::ALL {
            assert_eq!(Key::from_code(key.code()), Some(key));
        }
        assert_eq!(Key::from_code("KeyQ"), None);
        assert!(InputMessage::key("Enter", true).is_none());
    }

    #[test]
    fn disabled_input_ignores_updates() {
        let mut state = InputState::new();
        assert!(!state.set_key(Key::Forward, true));
        assert!(!state.set_analog_angle(Some(45.0)));
        assert!(!state.pulse_jump());
        assert_eq!(state.move_input(), MoveInput::default());
        assert_eq!(state.begin_tick(), TickPulses::default());
    }

    #[test]
    fn enabling_keeps_existing_flags() {
        let mut state = enabled_state();
        state.set_key(Key::Left, true);
        state.set_enabled(false);
        assert!(!state.set_key(Key::Left, false));
        state.set_enabled(true);
        assert!(state.is_pressed(Key::Left));
    }

    #[test]
    fn zero_degrees_is_a_heading() {
        let mut state = enabled_state();
        state.set_analog_angle(Some(0.0));
        assert_eq!(state.move_input().analog_deg, Some(0.0));
        assert!(state.move_input().is_moving());
        state.set_analog_angle(None);
        assert!(!state.move_input().is_moving());
    }

    #[test]
    fn pulse_is_visible_for_exactly_one_tick() {
        let mut state = enabled_state();
        state.pulse_jump();
        state.pulse_jump();
        assert!(!state.pulses().jump);

        let tick = state.begin_tick();
        assert!(tick.jump);
        assert!(!tick.toggle);
        assert!(state.pulses().jump);
        assert!(state.jump_active());

        assert!(!state.begin_tick().jump);
        assert!(!state.jump_active());
    }

    #[test]
    fn pulse_raised_mid_tick_waits_for_next_tick() {
        let mut state = enabled_state();
        state.begin_tick();
        state.pulse_toggle();
        assert!(!state.pulses().toggle);
        assert!(state.begin_tick().toggle);
    }

    #[test]
    fn reset_status_clears_everything_but_enabled() {
        let mut state = enabled_state();
        state.set_key(Key::Forward, true);
        state.set_analog_angle(Some(30.0));
        state.pulse_jump();
        state.reset_status();
        assert!(state.is_enabled());
        assert_eq!(state.move_input(), MoveInput::default());
        assert!(!state.begin_tick().jump);
    }

    #[test]
    fn subscriptions_see_only_later_messages_once() {
        let mut channel = InputChannel::new();
        channel.publish(InputMessage::KeyDown(Key::Forward));
        let mut downs = channel.subscribe::<KeyDown>();
        let mut ups = channel.subscribe::<KeyUp>();
        assert!(downs.read(&channel).is_empty());

        channel.publish(InputMessage::KeyDown(Key::Left));
        channel.publish(InputMessage::KeyUp(Key::Left));
        assert_eq!(downs.read(&channel), vec![KeyDown(Key::Left)]);
        assert!(downs.read(&channel).is_empty());
        assert_eq!(ups.read(&channel), vec![KeyUp(Key::Left)]);

        channel.end_frame();
        channel.publish(InputMessage::JoystickMoved(Some(0.0)));
        let mut sticks = channel.subscribe::<JoystickMoved>();
        assert!(sticks.read(&channel).is_empty());
    }

    #[test]
    fn bindings_pump_channel_into_state() {
        let mut channel = InputChannel::new();
        let mut bindings = InputBindings::new(&channel);
        let mut state = enabled_state();

        channel.publish(InputMessage::KeyDown(Key::Forward));
        channel.publish(InputMessage::KeyDown(Key::TogglePerson));
        channel.publish(InputMessage::JoystickMoved(Some(0.0)));
        channel.publish(InputMessage::JumpButton);
        let summary = bindings.pump(&channel, &mut state);
        assert_eq!(summary, PumpSummary { applied: 4, ignored: 0 });
        assert!(state.is_pressed(Key::Forward));
        assert_eq!(state.analog_angle(), Some(0.0));
        let pulses = state.begin_tick();
        assert!(pulses.jump && pulses.toggle);

        channel.end_frame();
        channel.publish(InputMessage::KeyUp(Key::Forward));
        bindings.pump(&channel, &mut state);
        assert!(!state.is_pressed(Key::Forward));
    }

    #[test]
    fn pump_counts_ignored_messages_while_disabled() {
        let mut channel = InputChannel::new();
        let mut bindings = InputBindings::new(&channel);
        let mut state = InputState::new();
        channel.publish(InputMessage::KeyDown(Key::Jump));
        channel.publish(InputMessage::JumpButton);
        let summary = bindings.pump(&channel, &mut state);
        assert_eq!(summary, PumpSummary { applied: 0, ignored: 2 });
        assert_eq!(state.begin_tick(), TickPulses::default());
    }
}
