use std::path::{Path, PathBuf};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use glam::{Mat4, Vec3, Vec4};
use native_engine::{create_engine, info_keys, is_native_engine_available, FrameContext, Handle};
use render_queue::{RenderEventQueue, RenderThread};
use scene::{Actor, BridgeConfig, RenderMethod, SceneContext, Viewport};
use serde::Serialize;
use timeline::{load_clips, ClipBinding, ClipMixer};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "hvr-bridge", version, about = "Drive the volumetric engine bridge from the command line")]
struct Cli {
    /// Bridge config JSON. Defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print engine version and render method catalogue.
    Info,
    /// Step a clip track over a time range and print the winning clip per tick.
    Simulate(SimulateArgs),
}

#[derive(Parser, Debug)]
struct SimulateArgs {
    /// Clip list JSON.
    #[arg(long)]
    clips: PathBuf,

    #[arg(long, default_value_t = 0.0)]
    from: f64,

    #[arg(long, default_value_t = 10.0)]
    to: f64,

    /// Seconds between ticks.
    #[arg(long, default_value_t = 0.5)]
    step: f64,

    /// Evaluate as a paused, scrubbing timeline.
    #[arg(long, default_value_t = false)]
    scrub: bool,

    /// Render method type for the actor. Engine default when omitted.
    #[arg(long)]
    render_method: Option<String>,
}

#[derive(Serialize)]
struct EngineReport {
    native_engine_available: bool,
    version: Option<String>,
    build_info: Option<String>,
    render_method_types: Vec<String>,
    render_method_default: String,
}

#[derive(Serialize)]
struct Tick<'a> {
    time: f64,
    winner: Option<usize>,
    locator: Option<&'a str>,
    asset: Handle,
}

fn main() -> anyhow::Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .try_init();
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    match cli.cmd {
        Command::Info => cmd_info(config),
        Command::Simulate(args) => cmd_simulate(config, args),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<BridgeConfig> {
    match path {
        Some(path) => Ok(BridgeConfig::load(path)?),
        None => Ok(BridgeConfig::default()),
    }
}

fn cmd_info(config: BridgeConfig) -> anyhow::Result<()> {
    let engine = create_engine(&config.engine)?;
    let (queue, _drain) = RenderEventQueue::new();
    let ctx = SceneContext::new(engine, queue, config);
    ctx.initialise().context("engine initialisation")?;
    let report = EngineReport {
        native_engine_available: is_native_engine_available(),
        version: ctx.info(info_keys::VERSION),
        build_info: ctx.info(info_keys::BUILD_INFO),
        render_method_types: ctx.render_method_types(),
        render_method_default: ctx.render_method_default(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn cmd_simulate(config: BridgeConfig, args: SimulateArgs) -> anyhow::Result<()> {
    anyhow::ensure!(args.step > 0.0, "--step must be positive");
    anyhow::ensure!(args.to >= args.from, "--to must not be before --from");
    let clips = load_clips(&args.clips)?;
    info!(clips = clips.len(), path = %args.clips.display(), "clip list loaded");

    let engine = create_engine(&config.engine)?;
    let (queue, drain) = RenderEventQueue::new();
    let render = RenderThread::spawn(drain)?;
    let ctx = SceneContext::new(engine, queue, config);
    ctx.initialise().context("engine initialisation")?;

    let mut actor = Actor::new(&ctx);
    let render_method = RenderMethod::new(&ctx, args.render_method.as_deref().unwrap_or(""));
    actor.set_render_method(&render_method);
    actor.set_transform(Mat4::IDENTITY, 1.0);
    let viewport = Viewport::new(&ctx);
    viewport.update(
        Mat4::look_at_rh(Vec3::new(0.0, 1.5, 4.0), Vec3::new(0.0, 1.0, 0.0), Vec3::Y),
        Mat4::perspective_rh_gl(60f32.to_radians(), 16.0 / 9.0, 0.1, 100.0),
        Vec4::new(0.0, 0.0, 1920.0, 1080.0),
        ctx.config().colour_space,
    );

    let mut bindings: Vec<ClipBinding> = clips.into_iter().map(ClipBinding::from).collect();
    let mut mixer = ClipMixer::new(&ctx);
    let ticks = ((args.to - args.from) / args.step).floor() as u64;
    for frame in 0..=ticks {
        let time = args.from + frame as f64 * args.step;
        ctx.update();
        let winner = mixer
            .evaluate(time, !args.scrub, &mut bindings, &mut actor)
            .with_context(|| format!("evaluating the clip track at {time:.3}s"))?;
        for asset in bindings.iter().filter_map(ClipBinding::asset) {
            asset.update(time as f32);
        }
        if ctx.will_render(&actor, &viewport) {
            ctx.prepare_render(frame, FrameContext::default());
            ctx.render_actor(&actor, &viewport, FrameContext::default());
        } else {
            warn!(time, "actor not renderable this tick");
        }
        let tick = Tick {
            time,
            winner,
            locator: winner.map(|i| bindings[i].clip().locator.as_str()),
            asset: actor.asset(),
        };
        println!("{}", serde_json::to_string(&tick)?);
    }

    mixer.stop(&mut bindings, &mut actor);
    drop(bindings);
    drop(actor);
    drop(viewport);
    drop(render_method);
    let drain = render.stop()?;
    info!(last_event = ?drain.last_executed(), "simulation finished");
    Ok(())
}
