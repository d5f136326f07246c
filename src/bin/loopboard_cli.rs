use std::collections::HashSet;
use std::fs;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};

use loopboard_engine::audio::{AudioClock, AudioOutput, BufferCache};
use loopboard_engine::config::{AppConfig, StepClockConfig};
use loopboard_engine::engine::{ManualBackend, StubTimeSource, SystemTimeSource, TimeSource};
use loopboard_engine::error::validate_bpm;
use loopboard_engine::kit::{builtin_kits, LoopKit};
use loopboard_engine::loops::bar_duration;
use loopboard_engine::scheduler::{LookaheadScheduler, StepClock};
use loopboard_engine::{init_logging, Arrangement};

fn main() -> ExitCode {
    init_logging();
    let cli = Cli::parse();
    match cli.execute() {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("loopboard error: {err:?}");
            ExitCode::from(1)
        }
    }
}

#[derive(Parser, Debug)]
#[command(name = "loopboard", about = "Loop board engine tools")]
struct Cli {
    /// Engine config JSON (defaults apply when omitted or unreadable).
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

impl Cli {
    fn execute(self) -> Result<()> {
        let config = match &self.config {
            Some(path) => AppConfig::load_from_file(path),
            None => AppConfig::default(),
        }
        .validated()
        .context("invalid engine config")?;

        match self.command {
            Command::Kits => kits_command(),
            Command::Steps(args) => steps_command(args, &config),
            Command::Render(args) => render_command(args, config),
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the built-in sound kits as JSON.
    Kits,
    /// Run the step clock and print each tick as a JSON line.
    Steps(StepsArgs),
    /// Render an arrangement of loop-kit clips to a WAV file.
    Render(RenderArgs),
}

#[derive(Args, Debug, Clone)]
struct StepsArgs {
    #[arg(long, default_value_t = 120.0)]
    bpm: f64,
    /// How long to run, in clock seconds.
    #[arg(long, default_value_t = 2.0)]
    seconds: f64,
    /// Steps per pattern.
    #[arg(long, default_value_t = 16)]
    steps: usize,
    /// Follow the wall clock in real time instead of simulating.
    #[arg(long)]
    realtime: bool,
}

#[derive(Args, Debug, Clone)]
struct RenderArgs {
    /// Root directory holding `kits/<kit>/<type>/Row_<n>.wav`.
    #[arg(long)]
    assets: PathBuf,
    /// Arrangement JSON (array of clips). The demo arrangement when omitted.
    #[arg(long)]
    arrangement: Option<PathBuf>,
    #[arg(long)]
    bpm: Option<f64>,
    /// Bars to render. Defaults to the end of the last clip.
    #[arg(long)]
    bars: Option<u32>,
    #[arg(long, default_value_t = 48_000)]
    sample_rate: u32,
    /// Destination WAV file.
    #[arg(long)]
    output: PathBuf,
}

fn kits_command() -> Result<()> {
    let json = serde_json::to_string_pretty(builtin_kits()).context("serialize kits")?;
    println!("{json}");
    Ok(())
}

fn steps_command(args: StepsArgs, config: &AppConfig) -> Result<()> {
    if args.steps == 0 {
        bail!("--steps must be greater than 0");
    }
    let clock_config = StepClockConfig {
        step_count: args.steps,
        ..config.step_clock.clone()
    };
    let poll = clock_config.poll_interval();

    let stub = Arc::new(StubTimeSource::new(0.0));
    let time: Arc<dyn TimeSource> = if args.realtime {
        Arc::new(SystemTimeSource::default())
    } else {
        Arc::clone(&stub) as Arc<dyn TimeSource>
    };

    let mut clock = StepClock::new(Arc::clone(&time), args.bpm, &clock_config)
        .context("invalid --bpm")?;
    let origin = time.now();
    clock.start();

    while time.now() - origin < args.seconds {
        for tick in clock.tick() {
            let line = serde_json::json!({
                "index": tick.index,
                "time": tick.time - origin,
            });
            println!("{line}");
        }
        if args.realtime {
            std::thread::sleep(poll);
        } else {
            stub.advance(poll.as_secs_f64());
        }
    }
    clock.stop();

    tracing::info!(
        "[Steps] Done after {:.3}s, {} stall recovery(ies)",
        time.now() - origin,
        clock.stall_recoveries()
    );
    Ok(())
}

fn render_command(args: RenderArgs, mut config: AppConfig) -> Result<()> {
    let arrangement = match &args.arrangement {
        Some(path) => {
            let json = fs::read_to_string(path)
                .with_context(|| format!("read arrangement {}", path.display()))?;
            Arrangement::from_json(&json)
                .with_context(|| format!("parse arrangement {}", path.display()))?
        }
        None => Arrangement::demo(),
    };
    let bpm = validate_bpm(args.bpm.unwrap_or(config.transport.default_bpm))
        .context("invalid --bpm")?;
    let bars = args.bars.unwrap_or_else(|| arrangement.length_bars());
    if bars == 0 {
        bail!("nothing to render: arrangement is empty and --bars was not given");
    }

    config.audio.sample_rate = args.sample_rate;
    let backend = ManualBackend::new(args.sample_rate, config.audio.channels);
    let clock = Arc::new(
        AudioClock::open(&config.audio, Box::new(backend.clone())).context("open render graph")?,
    );

    // Decode only the loops the arrangement uses
    let used: HashSet<&str> = arrangement
        .clips()
        .iter()
        .map(|c| c.pattern_id.as_str())
        .collect();
    let assets = LoopKit::default()
        .assets(&args.assets)
        .into_iter()
        .filter(|(id, _)| used.contains(id.as_str()))
        .collect();

    let cache = Arc::new(BufferCache::new());
    let runtime = tokio::runtime::Builder::new_current_thread()
        .build()
        .context("build runtime")?;
    let report = runtime.block_on(cache.preload(assets));
    for failure in &report.failed {
        eprintln!("warning: {failure}");
    }

    let mut scheduler =
        LookaheadScheduler::new(Arc::clone(&clock) as Arc<dyn AudioOutput>, &config.scheduler);
    scheduler.set_notes(arrangement.notes(bpm, &cache));
    scheduler.start();

    let format = backend.format();
    let spec = hound::WavSpec {
        channels: format.channels,
        sample_rate: format.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(&args.output, spec)
        .with_context(|| format!("create {}", args.output.display()))?;

    let total_frames = (bars as f64 * bar_duration(bpm) * format.sample_rate as f64).round() as u64;
    let block_frames =
        ((config.scheduler.poll_interval().as_secs_f64() * format.sample_rate as f64) as u64).max(1);
    let mut rendered = 0u64;
    while rendered < total_frames {
        scheduler.tick();
        let frames = block_frames.min(total_frames - rendered);
        for sample in backend.advance(frames as usize) {
            writer.write_sample(sample).context("write sample")?;
        }
        rendered += frames;
    }
    writer.finalize().context("finalize WAV")?;
    scheduler.stop();
    clock.close().context("close render graph")?;

    let summary = serde_json::json!({
        "output": args.output.display().to_string(),
        "bpm": bpm,
        "bars": bars,
        "frames": rendered,
        "loaded": report.loaded.len(),
        "failed": report.failed.len(),
    });
    println!("{summary}");
    Ok(())
}
