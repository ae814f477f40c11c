//! Offline render command.
//!
//! Ticks the scheduler and steps a WAV driver in lockstep, as fast as the
//! machine allows.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, bail};
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use recall_config::default_render_dir;
use recall_core::SoundScope;
use recall_engine::{Member, Scheduler};
use recall_io::{DeviceDriver, WavDevice};

use super::common::{EngineOverrides, SourceArgs, demo_run, load_config};

#[derive(Args)]
pub struct RenderArgs {
    /// Output WAV file (defaults to the configured output)
    #[arg(value_name = "OUTPUT")]
    output: Option<PathBuf>,

    #[command(flatten)]
    source: SourceArgs,

    #[command(flatten)]
    engine: EngineOverrides,

    /// Ticks to run after the expected end before giving up
    #[arg(long, default_value = "64")]
    slack: u64,
}

pub fn run(args: RenderArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    args.engine.apply(&mut config);
    config.time_accounting = false;

    let output = args
        .output
        .or_else(|| config.output.clone())
        .unwrap_or_else(|| default_render_dir().join("recall.wav"));

    let context = config.to_context()?;
    let geometry = *context.geometry();
    let state = context.device_state()?.into_shared();
    let mut scheduler = Scheduler::new(context);
    let handle = scheduler.handle();

    let driver = DeviceDriver::new(Box::new(WavDevice::new(&output)), geometry, Arc::clone(&state))
        .with_listener(handle.listener());
    driver
        .open()
        .with_context(|| format!("opening {}", output.display()))?;

    let demo = demo_run(&args.source, &geometry, &state)?;
    let expected = demo.buffers(&geometry) as u64;
    let mut member = Member::channel("render", demo.tree);
    for recycling in demo.recyclings {
        member = member.with_recycling(recycling);
    }
    let member = handle.add_member(member)?;
    handle.start(member, demo.root, SoundScope::Playback)?;

    println!(
        "Rendering {} Hz, {} ch, {} frames/buffer, {} -> {}",
        geometry.samplerate(),
        geometry.pcm_channels(),
        geometry.buffer_size(),
        geometry.format(),
        output.display()
    );

    let pb = ProgressBar::new(expected);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} buffers ({eta})")?
            .progress_chars("##-"),
    );

    let limit = expected + args.slack;
    let mut buffers = 0u64;
    loop {
        let report = scheduler.tick();
        driver.step()?;
        buffers += 1;
        pb.set_position(buffers.min(expected));
        if report.quiescent {
            break;
        }
        if buffers >= limit {
            pb.abandon();
            driver.close()?;
            bail!("run did not finish within {limit} buffers");
        }
    }
    // the final tick's producer slot
    driver.step()?;
    buffers += 1;
    driver.close()?;
    pb.finish_and_clear();

    let status = scheduler.status();
    let frames = buffers * geometry.buffer_size() as u64;
    println!(
        "Wrote {} frames ({:.2}s) in {} ticks; musical time {} ({} note offsets)",
        frames,
        frames as f64 / f64::from(geometry.samplerate()),
        status.tick_count,
        status.uptime_string(),
        status.note_offset_absolute
    );
    tracing::info!(output = %output.display(), buffers, "render complete");
    Ok(())
}
