//! Cadence CLI entry point.
//!
//! Boots a demo engine: a handful of UI, editor and server subsystems plus
//! behavioral units that spawn, move and expire entities.

use std::env;
use std::process::ExitCode;

use cadence_foundation::{Domain, EntityHandle, LaunchMode, MetaInfo, MetaRegistry, Result};
use cadence_runtime::{BehavioralUnit, Engine, FromStore, RuntimeConfig, Subsystem};
use cadence_storage::EntityAccess;
use tracing::{error, info};
use uuid::Uuid;

/// CLI configuration parsed from arguments.
struct CliConfig {
    mode: LaunchMode,
    frames: Option<u64>,
    workers: Option<usize>,
    frame_limiter: bool,
    show_help: bool,
    show_version: bool,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            mode: LaunchMode::Editor,
            frames: Some(300),
            workers: None,
            frame_limiter: true,
            show_help: false,
            show_version: false,
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("\x1b[31mError: {e}\x1b[0m");
            ExitCode::FAILURE
        }
    }
}

fn parse_args(args: Vec<String>) -> std::result::Result<CliConfig, Box<dyn std::error::Error>> {
    let mut config = CliConfig::default();

    let mut args = args.into_iter().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "-h" | "--help" => config.show_help = true,
            "-V" | "--version" => config.show_version = true,
            "--no-limiter" => config.frame_limiter = false,
            "-m" | "--mode" => {
                let value = args.next().ok_or("--mode requires a value")?;
                config.mode = value.parse()?;
            }
            "-f" | "--frames" => {
                let value = args.next().ok_or("--frames requires a value")?;
                let frames: u64 = value
                    .parse()
                    .map_err(|_| format!("invalid --frames value: {value}"))?;
                config.frames = (frames > 0).then_some(frames);
            }
            "-w" | "--workers" => {
                let value = args.next().ok_or("--workers requires a value")?;
                config.workers = Some(
                    value
                        .parse()
                        .map_err(|_| format!("invalid --workers value: {value}"))?,
                );
            }
            other => return Err(format!("unknown option: {other}").into()),
        }
    }

    Ok(config)
}

fn run(args: Vec<String>) -> std::result::Result<(), Box<dyn std::error::Error>> {
    let cli = parse_args(args)?;

    if cli.show_help {
        print_help();
        return Ok(());
    }
    if cli.show_version {
        println!("cadence {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let mut config = RuntimeConfig::for_mode(cli.mode).with_frame_limiter(cli.frame_limiter);
    if let Some(workers) = cli.workers {
        config = config.with_worker_threads(workers);
    }
    info!(mode = %cli.mode, domain = %config.domain, "launching");

    let mut engine = build_engine(config).inspect_err(report)?;
    let frames = engine.run(cli.frames).inspect_err(report)?;
    info!(
        frames,
        live_entities = engine.store().len(),
        "demo finished"
    );
    engine.shutdown();
    Ok(())
}

fn report(err: &cadence_foundation::Error) {
    error!("{}", err.diagnostic());
}

fn print_help() {
    println!(
        "\x1b[1mCadence\x1b[0m - Dependency-ordered tick orchestration demo

\x1b[1mUSAGE:\x1b[0m
    cadence [OPTIONS]

\x1b[1mOPTIONS:\x1b[0m
    -m, --mode <MODE>       Launch mode: editor, client, server, server_no_ui, none [default: editor]
    -f, --frames <N>        Frames to run, 0 for no limit [default: 300]
    -w, --workers <N>       Worker threads for behavioral units [default: half the cores]
        --no-limiter        Run frames back to back
    -h, --help              Print help
    -V, --version           Print version

\x1b[1mENVIRONMENT:\x1b[0m
    RUST_LOG                Log filter, e.g. RUST_LOG=cadence_runtime=debug"
    );
}

// =============================================================================
// Demo subsystems
// =============================================================================

#[derive(Default)]
struct WindowService {
    frames: u64,
}

impl Subsystem for WindowService {
    fn update(&mut self, _dt: f32) {
        self.frames += 1;
    }
}

#[derive(Default)]
struct RenderService {
    submitted: u64,
}

impl Subsystem for RenderService {
    fn post_update(&mut self, _dt: f32) {
        self.submitted += 1;
    }
}

#[derive(Default)]
struct ImguiService;

impl Subsystem for ImguiService {}

#[derive(Default)]
struct EditorService;

impl Subsystem for EditorService {}

#[derive(Default)]
struct NetworkService {
    elapsed: f32,
}

impl Subsystem for NetworkService {
    fn update(&mut self, dt: f32) {
        self.elapsed += dt;
    }
}

// =============================================================================
// Demo behavioral units
// =============================================================================

const MAX_ENTITIES: usize = 256;

struct Position(f32, f32);
struct Velocity(f32, f32);
struct Lifetime(f32);

/// Spawns one entity per tick and equips last tick's spawns once they are live.
struct Spawner {
    access: EntityAccess,
    waiting: Vec<Uuid>,
    spawned: u32,
}

impl FromStore for Spawner {
    fn from_store(access: EntityAccess) -> Self {
        Self {
            access,
            waiting: Vec::new(),
            spawned: 0,
        }
    }
}

impl BehavioralUnit for Spawner {
    fn update(&mut self, _dt: f32) -> Result<()> {
        for uuid in std::mem::take(&mut self.waiting) {
            let Some(handle) = self.access.handle_of(uuid) else {
                continue;
            };
            let angle = f32::from(u16::try_from(self.spawned % 360).unwrap_or(0)).to_radians();
            self.access.add_data(handle, Position(0.0, 0.0))?;
            self.access.add_data(handle, Velocity(angle.cos(), angle.sin()))?;
            self.access.add_data(handle, Lifetime(2.0))?;
        }
        if self.access.len() < MAX_ENTITIES {
            self.waiting.push(self.access.create_entity(None));
            self.spawned += 1;
        }
        Ok(())
    }
}

/// Integrates velocity into position.
struct Movement {
    access: EntityAccess,
}

impl FromStore for Movement {
    fn from_store(access: EntityAccess) -> Self {
        Self { access }
    }
}

impl BehavioralUnit for Movement {
    fn update(&mut self, dt: f32) -> Result<()> {
        let velocities: Vec<(EntityHandle, f32, f32)> = self
            .access
            .view::<(Velocity,)>()
            .iter()
            .map(|(handle, (v,))| (handle, v.0, v.1))
            .collect();
        let mut positions = self.access.write::<Position>();
        for (handle, dx, dy) in velocities {
            if let Some(p) = positions.get_mut(handle) {
                p.0 += dx * dt;
                p.1 += dy * dt;
            }
        }
        Ok(())
    }
}

/// Counts lifetimes down and queues expired entities for removal.
struct Expiry {
    access: EntityAccess,
}

impl FromStore for Expiry {
    fn from_store(access: EntityAccess) -> Self {
        Self { access }
    }
}

impl BehavioralUnit for Expiry {
    fn update(&mut self, dt: f32) -> Result<()> {
        let mut expired = Vec::new();
        {
            let mut lifetimes = self.access.write::<Lifetime>();
            for (handle, lifetime) in lifetimes.iter_mut() {
                lifetime.0 -= dt;
                if lifetime.0 <= 0.0 {
                    expired.push(handle);
                }
            }
        }
        for handle in expired {
            self.access.remove_entity(handle)?;
        }
        Ok(())
    }
}

fn declarations() -> Result<MetaRegistry> {
    let mut registry = MetaRegistry::new();
    registry.declare::<WindowService>(
        MetaInfo::new()
            .domain(Domain::UI)
            .post_update_after::<RenderService>(),
    )?;
    registry.declare::<RenderService>(
        MetaInfo::new()
            .domain(Domain::UI)
            .update_after::<WindowService>(),
    )?;
    registry.declare::<ImguiService>(
        MetaInfo::new()
            .domain(Domain::UI)
            .update_after::<RenderService>()
            .post_update_before::<RenderService>(),
    )?;
    registry.declare::<EditorService>(
        MetaInfo::new()
            .domain(Domain::EDITOR)
            .update_after::<ImguiService>(),
    )?;
    registry.declare::<NetworkService>(MetaInfo::new().domain(Domain::SERVER_NO_UI))?;

    registry.declare::<Spawner>(MetaInfo::new().update_before::<Movement>())?;
    registry.declare::<Movement>(MetaInfo::new())?;
    registry.declare::<Expiry>(MetaInfo::new().update_after::<Spawner>())?;
    Ok(registry)
}

fn build_engine(config: RuntimeConfig) -> Result<Engine> {
    let mut engine = Engine::new(config, declarations()?)?;

    let subsystems = engine.subsystems();
    subsystems.register::<WindowService>()?;
    subsystems.register::<RenderService>()?;
    subsystems.register::<ImguiService>()?;
    subsystems.register::<EditorService>()?;
    subsystems.register::<NetworkService>()?;

    let units = engine.units();
    units.register::<Spawner>()?;
    units.register::<Movement>()?;
    units.register::<Expiry>()?;

    engine.start()?;
    Ok(engine)
}
