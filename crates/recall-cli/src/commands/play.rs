//! Real-time playback command.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::Context;
use clap::Args;
use indicatif::{ProgressBar, ProgressStyle};
use recall_config::{DeviceKind, EngineConfig, default_render_dir};
use recall_core::{DriverControl, SoundScope};
use recall_engine::{Member, Scheduler};
use recall_io::{CpalDevice, DeviceDriver, SoundDevice, VirtualDevice, WavDevice};

use super::common::{EngineOverrides, SourceArgs, demo_run, load_config};

#[derive(Args)]
pub struct PlayArgs {
    #[command(flatten)]
    source: SourceArgs,

    #[command(flatten)]
    engine: EngineOverrides,

    /// Device backend (overrides the configured one)
    #[arg(long, value_parser = parse_device)]
    device: Option<DeviceKind>,

    /// Output device name fragment for the cpal backend
    #[arg(long)]
    device_name: Option<String>,
}

fn parse_device(s: &str) -> Result<DeviceKind, String> {
    match s {
        "virtual" => Ok(DeviceKind::Virtual),
        "wav" => Ok(DeviceKind::Wav),
        "cpal" => Ok(DeviceKind::Cpal),
        other => Err(format!(
            "unknown device '{other}' (expected virtual, wav or cpal)"
        )),
    }
}

fn backend(config: &EngineConfig) -> Box<dyn SoundDevice> {
    match config.device {
        DeviceKind::Virtual => Box::new(VirtualDevice::new()),
        DeviceKind::Wav => Box::new(WavDevice::new(
            config
                .output
                .clone()
                .unwrap_or_else(|| default_render_dir().join("recall.wav")),
        )),
        DeviceKind::Cpal => {
            let device = CpalDevice::new();
            match &config.device_name {
                Some(name) => Box::new(device.with_device_name(name.clone())),
                None => Box::new(device),
            }
        }
    }
}

pub fn run(args: PlayArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let mut config = load_config(config_path)?;
    args.engine.apply(&mut config);
    if let Some(device) = args.device {
        config.device = device;
    }
    if args.device_name.is_some() {
        config.device_name = args.device_name;
    }

    let context = config.to_context()?;
    let geometry = *context.geometry();
    let state = context.device_state()?.into_shared();
    let scheduler = Scheduler::new(context);
    let handle = scheduler.handle();

    let driver = Arc::new(
        DeviceDriver::new(backend(&config), geometry, Arc::clone(&state))
            .with_listener(handle.listener()),
    );
    driver
        .start()
        .with_context(|| format!("starting {} device", config.device))?;
    let errors = driver.errors();

    let demo = demo_run(&args.source, &geometry, &state)?;
    let mut member = Member::channel("play", demo.tree).with_driver(driver.clone());
    for recycling in demo.recyclings {
        member = member.with_recycling(recycling);
    }
    let member = handle.add_member(member)?;
    handle.start(member, demo.root, SoundScope::Playback)?;
    let thread = scheduler.spawn()?;

    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = Arc::clone(&interrupted);
    ctrlc::set_handler(move || {
        flag.store(true, Ordering::SeqCst);
    })?;

    println!(
        "Playing on {} ({} Hz, {} ch). Press Ctrl+C to stop.",
        config.device,
        geometry.samplerate(),
        geometry.pcm_channels()
    );
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner} {msg}")?);

    let mut cancelled = false;
    while driver.is_running() {
        if interrupted.load(Ordering::SeqCst) && !cancelled {
            handle.cancel(member, None)?;
            cancelled = true;
        }
        let status = handle.status();
        spinner.set_message(format!(
            "{}  offset {}  buffers {}",
            status.uptime_string(),
            status.note_offset,
            status.buffers_completed
        ));
        spinner.tick();
        std::thread::sleep(Duration::from_millis(50));
    }
    spinner.finish_and_clear();

    thread.stop()?;
    driver.close()?;
    if let Ok(fault) = errors.try_recv() {
        return Err(fault).context("device failed during playback");
    }

    let status = handle.status();
    println!(
        "Stopped after {} ({} buffers){}",
        status.uptime_string(),
        status.buffers_completed,
        if cancelled { ", interrupted" } else { "" }
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_names_parse() {
        assert_eq!(parse_device("wav"), Ok(DeviceKind::Wav));
        assert!(parse_device("jack").is_err());
    }

    #[test]
    fn backend_follows_config() {
        let config = EngineConfig {
            device: DeviceKind::Virtual,
            ..EngineConfig::default()
        };
        assert_eq!(backend(&config).name(), "virtual");
        let config = EngineConfig {
            device: DeviceKind::Wav,
            ..EngineConfig::default()
        };
        assert_eq!(backend(&config).name(), "wav");
    }
}
