//! End-to-end: scheduler ticks feed a device ring that a driver drains into
//! a backend.

use std::sync::Arc;
use std::time::{Duration, Instant};

use recall_core::{
    AudioGeometry, AudioSignal, DriverControl, Fill, Port, RecallFlags, RecallTree, Recycling,
    SampleFormat, SoundScope, StreamPlayer,
};
use recall_engine::{AudioContext, Member, Scheduler};
use recall_io::{DeviceDriver, VirtualDevice, WavDevice, read_wav};

const BUFFER: usize = 64;

fn geometry() -> AudioGeometry {
    AudioGeometry::new(8000, BUFFER, 1, SampleFormat::Float32).unwrap()
}

/// Player tree for a signal of `buffers` buffers at a constant level.
fn player(
    state: &recall_core::SharedDeviceState,
    buffers: usize,
    level: f32,
) -> (RecallTree, recall_core::NodeId, recall_core::SharedRecycling) {
    let samples = vec![level; buffers * BUFFER];
    let recycling = Recycling::new(0, AudioSignal::from_samples(&geometry(), &samples)).into_shared();
    let mut tree = RecallTree::new();
    let template = tree.add_template(
        Box::new(StreamPlayer::new(
            Arc::clone(&recycling),
            Arc::clone(state),
            Port::new("gain", 1.0).into_shared(),
            Fill::Copy,
        )),
        RecallFlags::NONE,
    );
    (tree, template, recycling)
}

#[test]
fn offline_render_writes_every_buffer() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("render.wav");

    let ctx = AudioContext::new(geometry()).with_time_accounting(false);
    let state = ctx.device_state().unwrap().into_shared();
    let mut scheduler = Scheduler::new(ctx);
    let handle = scheduler.handle();

    let driver = DeviceDriver::new(Box::new(WavDevice::new(&path)), geometry(), Arc::clone(&state))
        .with_listener(handle.listener());
    driver.open().unwrap();

    let (tree, template, recycling) = player(&state, 10, 0.25);
    let member = handle
        .add_member(Member::channel("player", tree).with_recycling(recycling))
        .unwrap();
    handle.start(member, template, SoundScope::Playback).unwrap();

    let mut steps = 0;
    loop {
        let report = scheduler.tick();
        driver.step().unwrap();
        steps += 1;
        if report.quiescent || steps > 100 {
            break;
        }
    }
    // flush the producer slot of the final tick
    driver.step().unwrap();
    steps += 1;
    driver.close().unwrap();

    let (samples, info) = read_wav(&path).unwrap();
    assert_eq!(info.num_frames, (steps * BUFFER) as u64);
    // one buffer of latency between producer and consumer slot
    assert!(samples[..BUFFER].iter().all(|&x| x == 0.0));
    assert_eq!(samples.iter().filter(|&&x| x == 0.25).count(), 10 * BUFFER);
    assert!(samples.iter().all(|&x| x == 0.0 || x == 0.25));
    assert_eq!(handle.status().buffers_completed, steps as u64);
}

#[test]
fn quiescence_stops_a_threaded_driver() {
    let ctx = AudioContext::new(geometry());
    let state = ctx.device_state().unwrap().into_shared();
    let scheduler = Scheduler::new(ctx);
    let handle = scheduler.handle();

    let (device, capture) = VirtualDevice::capturing();
    let driver = Arc::new(
        DeviceDriver::new(
            Box::new(device.with_pacing(Duration::from_millis(1))),
            geometry(),
            Arc::clone(&state),
        )
        .with_listener(handle.listener()),
    );
    driver.start().unwrap();

    let (tree, template, recycling) = player(&state, 4, 0.5);
    let member = handle
        .add_member(
            Member::channel("player", tree)
                .with_recycling(recycling)
                .with_driver(driver.clone()),
        )
        .unwrap();
    handle.start(member, template, SoundScope::Playback).unwrap();
    let thread = scheduler.spawn().unwrap();

    let deadline = Instant::now() + Duration::from_secs(10);
    while driver.is_running() && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(5));
    }
    assert!(!driver.is_running());
    thread.stop().unwrap();
    driver.close().unwrap();

    assert!(!capture.lock().is_empty());
    assert!(driver.errors().try_recv().is_err());
    assert!(handle.status().buffers_completed > 0);
}
