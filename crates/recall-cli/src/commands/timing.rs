//! Timing table inspection command.

use std::path::Path;

use clap::Args;
use recall_core::{DEFAULT_PERIOD, TimingTables};
use serde::Serialize;

use super::common::load_config;

#[derive(Args)]
pub struct TimingArgs {
    /// Samplerate in Hz
    #[arg(long)]
    samplerate: Option<u32>,

    /// Frames per device buffer
    #[arg(long)]
    buffer_size: Option<usize>,

    /// Tempo in beats per minute
    #[arg(long)]
    bpm: Option<f64>,

    /// Note-offset rate scale
    #[arg(long)]
    delay_factor: Option<f64>,

    /// Table rows to print
    #[arg(long, default_value = "8")]
    rows: usize,

    /// Print JSON instead of a table
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
struct TimingReport {
    samplerate: u32,
    buffer_size: usize,
    bpm: f64,
    delay_factor: f64,
    buffers_per_offset: f64,
    seconds_per_offset: f64,
    delay: Vec<f64>,
    attack: Vec<f64>,
}

pub fn run(args: TimingArgs, config_path: Option<&Path>) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let mut key = config.timing_key();
    if let Some(samplerate) = args.samplerate {
        key.samplerate = samplerate;
    }
    if let Some(buffer_size) = args.buffer_size {
        key.buffer_size = buffer_size;
    }
    if let Some(bpm) = args.bpm {
        key.bpm = bpm;
    }
    if let Some(delay_factor) = args.delay_factor {
        key.delay_factor = delay_factor;
    }

    let tables = TimingTables::new(key)?;
    let rows = args.rows.min(DEFAULT_PERIOD);

    if args.json {
        let report = TimingReport {
            samplerate: key.samplerate,
            buffer_size: key.buffer_size,
            bpm: key.bpm,
            delay_factor: key.delay_factor,
            buffers_per_offset: key.delay(),
            seconds_per_offset: key.seconds_per_offset(),
            delay: tables.delay()[..rows].to_vec(),
            attack: tables.attack()[..rows].to_vec(),
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Timing");
    println!("======\n");
    println!("  Samplerate:   {} Hz", key.samplerate);
    println!("  Buffer size:  {} frames", key.buffer_size);
    println!("  Tempo:        {} bpm", key.bpm);
    println!("  Delay factor: {}", key.delay_factor);
    println!();
    println!("  Buffers per note offset: {:.6}", key.delay());
    println!("  Seconds per note offset: {:.6}", key.seconds_per_offset());
    println!();
    println!("  {:>5}  {:>12}  {:>12}", "i", "delay", "attack");
    println!("  {:-<5}  {:-<12}  {:-<12}", "", "", "");
    for i in 0..rows {
        println!(
            "  {:>5}  {:>12.6}  {:>12.3}",
            i,
            tables.delay()[i],
            tables.attack()[i]
        );
    }
    if rows < DEFAULT_PERIOD {
        println!("  ... {} of {} rows", rows, DEFAULT_PERIOD);
    }
    Ok(())
}
