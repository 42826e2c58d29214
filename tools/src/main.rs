use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand, ValueEnum};
use engine_core::logging::{self, LogLevel};
use player_controller::{
    AvatarAssets, AvatarConfig, AvatarSession, InteractionProbe, TickReport,
};
use player_input::{InputChannel, InputMessage, Key};
use static_collider::{SceneDescription, StaticCollider};

const EXIT_SUCCESS: i32 = 0;
const EXIT_USAGE: i32 = 2;
const EXIT_SCENE: i32 = 10;
const EXIT_CONFIG: i32 = 11;
const EXIT_SIMULATION: i32 = 12;

const DEFAULT_TICKS: u32 = 120;
const DEFAULT_DT: f32 = 1.0 / 60.0;

#[derive(Parser)]
#[command(name = "tools", version, about = "Avatar controller tools CLI")]
struct Cli {
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Runs the avatar pipeline headless against a scene file.
    Simulate(SimulateArgs),
    /// Parses and validates a scene file.
    ValidateScene {
        #[arg(long, value_name = "PATH")]
        scene: PathBuf,
    },
    /// Parses and validates an avatar config file.
    ValidateConfig {
        #[arg(long, value_name = "PATH")]
        config: PathBuf,
    },
}

#[derive(Parser)]
struct SimulateArgs {
    #[arg(long, value_name = "PATH")]
    scene: PathBuf,

    #[arg(long, value_name = "PATH")]
    config: Option<PathBuf>,

    #[arg(long)]
    ticks: Option<u32>,

    #[arg(long)]
    dt: Option<f32>,

    /// Keys held for the whole run.
    #[arg(long, value_enum, value_delimiter = ',')]
    hold: Vec<HoldKey>,

    /// Joystick heading in degrees (0 = +X).
    #[arg(long, allow_negative_numbers = true)]
    analog: Option<f32>,

    /// Presses the jump button on this tick.
    #[arg(long)]
    jump_at: Option<u32>,

    /// Toggles person view on this tick.
    #[arg(long)]
    toggle_at: Option<u32>,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
enum HoldKey {
    Forward,
    Back,
    Left,
    Right,
    Jump,
}

impl HoldKey {
    fn key(self) -> Key {
        match self {
            HoldKey::Forward => Key::Forward,
            HoldKey::Back => Key::Back,
            HoldKey::Left => Key::Left,
            HoldKey::Right => Key::Right,
            HoldKey::Jump => Key::Jump,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct SimulationPlan {
    ticks: u32,
    dt: f32,
    hold: Vec<Key>,
    analog: Option<f32>,
    jump_at: Option<u32>,
    toggle_at: Option<u32>,
}

impl Default for SimulationPlan {
    fn default() -> Self {
        Self {
            ticks: DEFAULT_TICKS,
            dt: DEFAULT_DT,
            hold: Vec::new(),
            analog: None,
            jump_at: None,
            toggle_at: None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
struct SimulationOutcome {
    ticks: u32,
    position: [f32; 3],
    grounded: bool,
    first_person: bool,
    jumps: u32,
    resets: u32,
    transitions: u32,
    hover: Option<String>,
}

fn main() {
    let cli = Cli::parse();
    match LogLevel::parse(&cli.log_level) {
        Ok(level) => logging::set_max_level(level),
        Err(err) => {
            eprintln!("{}", err);
            std::process::exit(EXIT_USAGE);
        }
    }
    let exit_code = match cli.command {
        Commands::Simulate(args) => run_simulate(args),
        Commands::ValidateScene { scene } => run_validate_scene(&scene),
        Commands::ValidateConfig { config } => run_validate_config(&config),
    };
    std::process::exit(exit_code);
}

fn run_simulate(args: SimulateArgs) -> i32 {
    let scene = match load_scene(&args.scene) {
        Ok(scene) => scene,
        Err(code) => return code,
    };
    let config = match args.config.as_deref().map(load_config).transpose() {
        Ok(config) => config.unwrap_or_default(),
        Err(code) => return code,
    };
    let plan = SimulationPlan {
        ticks: args.ticks.unwrap_or(DEFAULT_TICKS),
        dt: args.dt.unwrap_or(DEFAULT_DT),
        hold: args.hold.iter().map(|key| key.key()).collect(),
        analog: args.analog,
        jump_at: args.jump_at,
        toggle_at: args.toggle_at,
    };
    match simulate(&scene, config, &plan) {
        Ok(outcome) => {
            println!(
                "simulate ok (scene={}, ticks={}, position=[{:.3}, {:.3}, {:.3}], grounded={}, first_person={}, jumps={}, resets={}, transitions={}, hover={})",
                scene.name,
                outcome.ticks,
                outcome.position[0],
                outcome.position[1],
                outcome.position[2],
                outcome.grounded,
                outcome.first_person,
                outcome.jumps,
                outcome.resets,
                outcome.transitions,
                outcome.hover.as_deref().unwrap_or("-"),
            );
            EXIT_SUCCESS
        }
        Err(err) => {
            eprintln!("simulation failed: {}", err);
            EXIT_SIMULATION
        }
    }
}

fn run_validate_scene(path: &Path) -> i32 {
    let scene = match load_scene(path) {
        Ok(scene) => scene,
        Err(code) => return code,
    };
    match StaticCollider::from_scene(&scene) {
        Ok(collider) => {
            println!(
                "scene ok: {} ({} triangles, {} interactive)",
                scene.name,
                collider.triangle_count(),
                scene.interactive_solids().count()
            );
            EXIT_SUCCESS
        }
        Err(err) => {
            eprintln!("scene invalid: {}", err);
            EXIT_SCENE
        }
    }
}

fn run_validate_config(path: &Path) -> i32 {
    match load_config(path) {
        Ok(config) => {
            println!(
                "config ok: speed={} gravity={} spawn={:?}",
                config.speed, config.gravity, config.spawn_position
            );
            EXIT_SUCCESS
        }
        Err(code) => code,
    }
}

fn load_scene(path: &Path) -> Result<SceneDescription, i32> {
    let text = fs::read_to_string(path).map_err(|err| {
        eprintln!("failed to read scene {}: {}", path.display(), err);
        EXIT_SCENE
    })?;
    let scene = SceneDescription::parse_toml(&text).map_err(|err| {
        eprintln!("failed to parse scene {}: {}", path.display(), err);
        EXIT_SCENE
    })?;
    scene.validate().map_err(|err| {
        eprintln!("scene invalid: {}", err);
        EXIT_SCENE
    })?;
    Ok(scene)
}

fn load_config(path: &Path) -> Result<AvatarConfig, i32> {
    let text = fs::read_to_string(path).map_err(|err| {
        eprintln!("failed to read config {}: {}", path.display(), err);
        EXIT_CONFIG
    })?;
    AvatarConfig::parse_toml(&text).map_err(|err| {
        eprintln!("config invalid: {}", err);
        EXIT_CONFIG
    })
}

fn placeholder_assets() -> AvatarAssets {
    use character_animation::{AnimationClips, ClipInfo};
    AvatarAssets {
        model: "headless".to_string(),
        clips: AnimationClips {
            idle: ClipInfo::new("idle", 1.0),
            walk: ClipInfo::new("walk", 1.0),
            jump: ClipInfo::new("jump", 1.0),
        },
    }
}

fn simulate(
    scene: &SceneDescription,
    config: AvatarConfig,
    plan: &SimulationPlan,
) -> Result<SimulationOutcome, String> {
    let collider = StaticCollider::from_scene(scene)?;
    let probe = InteractionProbe::from_scene(config.interaction, scene)?;
    let mut session = AvatarSession::new(config)?;
    let mut channel = InputChannel::new();
    session.bind_input(&channel);
    session.attach_avatar(placeholder_assets())?;

    for key in &plan.hold {
        channel.publish(InputMessage::KeyDown(*key));
    }
    if plan.analog.is_some() {
        channel.publish(InputMessage::JoystickMoved(plan.analog));
    }

    let mut outcome = SimulationOutcome {
        ticks: 0,
        position: [0.0; 3],
        grounded: false,
        first_person: false,
        jumps: 0,
        resets: 0,
        transitions: 0,
        hover: None,
    };
    for tick in 0..plan.ticks {
        if plan.jump_at == Some(tick) {
            channel.publish(InputMessage::JumpButton);
        }
        if plan.toggle_at == Some(tick) {
            channel.publish(InputMessage::KeyDown(Key::TogglePerson));
            channel.publish(InputMessage::KeyUp(Key::TogglePerson));
        }
        session.pump_input(&channel);
        channel.end_frame();
        let summary = match session.update(plan.dt, Some(&collider)) {
            TickReport::Advanced(summary) => summary,
            TickReport::NotReady => return Err(format!("session not ready on tick {}", tick)),
        };
        outcome.ticks += 1;
        outcome.jumps += u32::from(summary.jumped);
        outcome.resets += u32::from(summary.fell);
        outcome.transitions += u32::from(summary.transition.is_some());
    }

    let position = session
        .position()
        .ok_or_else(|| "avatar missing after simulation".to_string())?;
    outcome.position = [position.x, position.y, position.z];
    outcome.grounded = session.is_grounded();
    outcome.first_person = session.camera().is_first_person();
    outcome.hover = match session.hover(&probe) {
        Some(player_controller::HoverEvent::ShowTooltip { title, .. }) => Some(title),
        _ => None,
    };
    Ok(outcome)
}
