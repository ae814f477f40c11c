//! Built-in recall kinds.
//!
//! These kinds move, mix and count; they do not synthesize or filter.
//!
//! - [`Container`] groups children.
//! - [`StreamPlayer`] feeds one recycling's signal into a device ring.
//! - [`SignalMixer`] adds one recycling's signal into another's.
//! - [`BeatCounter`] finishes after a number of note offsets.
//! - [`Tap`] wraps a closure; handy for tests and demos.

use std::sync::Arc;

use crate::device::SharedDeviceState;
use crate::node::{RecallKind, StageContext};
use crate::param::SharedPort;
use crate::recycling::{SharedRecycling, SharedSignal};

/// Structural node without own work.
#[derive(Debug, Clone, Copy, Default)]
pub struct Container;

impl RecallKind for Container {
    fn name(&self) -> &'static str {
        "container"
    }

    fn duplicate(&self) -> Box<dyn RecallKind> {
        Box::new(*self)
    }
}

/// Closure-backed kind, called once for every stage it receives.
#[derive(Clone)]
pub struct Tap {
    name: &'static str,
    f: Arc<dyn Fn(&mut StageContext<'_>) + Send + Sync>,
}

impl Tap {
    /// Wraps `f`.
    pub fn new(f: impl Fn(&mut StageContext<'_>) + Send + Sync + 'static) -> Self {
        Self {
            name: "tap",
            f: Arc::new(f),
        }
    }

    /// Sets the diagnostic name.
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

impl RecallKind for Tap {
    fn name(&self) -> &'static str {
        self.name
    }

    fn duplicate(&self) -> Box<dyn RecallKind> {
        Box::new(self.clone())
    }

    fn run_stage(&mut self, ctx: &mut StageContext<'_>) {
        (self.f)(ctx);
    }
}

/// How a [`StreamPlayer`] builds its run instance from the template.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Fill {
    /// Verbatim copy of the template.
    Copy,
    /// The template tiled to this many frames.
    Frames(usize),
}

/// Plays a recycling's signal into one channel of a device ring.
///
/// On RunInitPre the player looks up the signal bound to its run, creating
/// it from the template when missing. Each RunInter mixes the buffer under
/// the cursor into the ring's producer slot and advances the cursor. Once
/// the cursor ran off the stream the player requests done.
pub struct StreamPlayer {
    recycling: SharedRecycling,
    device: SharedDeviceState,
    gain: SharedPort<f64>,
    fill: Fill,
    signal: Option<SharedSignal>,
}

impl StreamPlayer {
    /// Creates a player.
    pub fn new(
        recycling: SharedRecycling,
        device: SharedDeviceState,
        gain: SharedPort<f64>,
        fill: Fill,
    ) -> Self {
        Self {
            recycling,
            device,
            gain,
            fill,
            signal: None,
        }
    }

    /// Signal being played, once initialized.
    pub fn signal(&self) -> Option<&SharedSignal> {
        self.signal.as_ref()
    }
}

impl RecallKind for StreamPlayer {
    fn name(&self) -> &'static str {
        "stream-player"
    }

    fn duplicate(&self) -> Box<dyn RecallKind> {
        Box::new(Self::new(
            Arc::clone(&self.recycling),
            Arc::clone(&self.device),
            Arc::clone(&self.gain),
            self.fill,
        ))
    }

    fn is_signal(&self) -> bool {
        true
    }

    fn run_init_pre(&mut self, ctx: &mut StageContext<'_>) {
        let mut recycling = self.recycling.lock();
        let signal = match recycling.signal_for(ctx.recall_id) {
            Some(signal) => signal,
            None => match self.fill {
                Fill::Copy => recycling.instantiate_copy(ctx.recall_id),
                Fill::Frames(frames) => recycling.instantiate(ctx.recall_id, frames),
            },
        };
        self.signal = Some(signal);
    }

    fn run_inter(&mut self, ctx: &mut StageContext<'_>) {
        let Some(signal) = &self.signal else {
            ctx.request_done();
            return;
        };
        let channel = self.recycling.lock().channel();
        let gain = self.gain.safe_read() as f32;
        let mut signal = signal.lock();
        let Some(buffer) = signal.current_buffer() else {
            ctx.request_done();
            return;
        };
        {
            let guard = self.device.lock();
            guard.borrow_mut().ring.mix_into_next(channel, buffer, gain);
        }
        signal.advance_cursor();
    }
}

/// Adds the current buffer of one recycling's signal into another's.
///
/// Neither cursor is moved; players own cursor progress. The two signals
/// are never locked at the same time.
pub struct SignalMixer {
    source: SharedRecycling,
    destination: SharedRecycling,
    gain: SharedPort<f64>,
    scratch: Vec<f32>,
}

impl SignalMixer {
    /// Creates a mixer.
    pub fn new(source: SharedRecycling, destination: SharedRecycling, gain: SharedPort<f64>) -> Self {
        Self {
            source,
            destination,
            gain,
            scratch: Vec::new(),
        }
    }
}

impl RecallKind for SignalMixer {
    fn name(&self) -> &'static str {
        "signal-mixer"
    }

    fn duplicate(&self) -> Box<dyn RecallKind> {
        Box::new(Self::new(
            Arc::clone(&self.source),
            Arc::clone(&self.destination),
            Arc::clone(&self.gain),
        ))
    }

    fn run_inter(&mut self, ctx: &mut StageContext<'_>) {
        let source = self.source.lock().stream_current(ctx.recall_id);
        let destination = self.destination.lock().stream_current(ctx.recall_id);
        let (Some(source), Some(destination)) = (source, destination) else {
            return;
        };
        if Arc::ptr_eq(&source, &destination) {
            return;
        }
        let gain = self.gain.safe_read() as f32;
        {
            let source = source.lock();
            let Some(src) = source.current_buffer() else {
                return;
            };
            self.scratch.clear();
            self.scratch.extend_from_slice(src);
        }
        let mut destination = destination.lock();
        if let Some(dst) = destination.current_buffer_mut() {
            for (d, s) in dst.iter_mut().zip(&self.scratch) {
                *d += s * gain;
            }
        }
    }
}

/// Finishes after counting a number of note offsets.
pub struct BeatCounter {
    device: SharedDeviceState,
    beats: u64,
    counted: u64,
    last_offset: Option<u64>,
}

impl BeatCounter {
    /// Counts `beats` offset changes of `device`'s clock.
    pub fn new(device: SharedDeviceState, beats: u64) -> Self {
        Self {
            device,
            beats,
            counted: 0,
            last_offset: None,
        }
    }

    /// Offsets counted so far.
    pub fn counted(&self) -> u64 {
        self.counted
    }
}

impl RecallKind for BeatCounter {
    fn name(&self) -> &'static str {
        "beat-counter"
    }

    fn duplicate(&self) -> Box<dyn RecallKind> {
        Box::new(Self::new(Arc::clone(&self.device), self.beats))
    }

    fn run_init_pre(&mut self, _ctx: &mut StageContext<'_>) {
        self.counted = 0;
        self.last_offset = Some(self.device.lock().borrow().clock.note_offset_absolute());
    }

    fn run_pre(&mut self, ctx: &mut StageContext<'_>) {
        let offset = self.device.lock().borrow().clock.note_offset_absolute();
        if let Some(last) = self.last_offset
            && offset > last
        {
            self.counted += offset - last;
        }
        self.last_offset = Some(offset);
        if self.counted >= self.beats {
            ctx.request_done();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceState;
    use crate::format::{AudioGeometry, SampleFormat};
    use crate::node::{NodeState, RecallFlags, RecallTree};
    use crate::param::Port;
    use crate::recall_id::{RecallIdAllocator, SoundScope};
    use crate::recycling::Recycling;
    use crate::ring::TimingKey;
    use crate::stream::AudioSignal;

    fn device(buffer_size: usize) -> SharedDeviceState {
        DeviceState::new(
            4,
            2,
            TimingKey {
                samplerate: 44100,
                buffer_size,
                bpm: 120.0,
                delay_factor: 1.0,
            },
        )
        .unwrap()
        .into_shared()
    }

    fn recycling(channel: u16, samples: &[f32]) -> SharedRecycling {
        let geo = AudioGeometry::new(44100, 4, 1, SampleFormat::Float32).unwrap();
        Recycling::new(channel, AudioSignal::from_samples(&geo, samples)).into_shared()
    }

    #[test]
    fn player_writes_buffers_then_finishes() {
        let dev = device(4);
        let rec = recycling(1, &[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
        let gain = Port::new("gain", 0.5).into_shared();
        let ids = RecallIdAllocator::new();
        let run = ids.allocate(SoundScope::Playback);

        let mut tree = RecallTree::new();
        let player = tree.add_node(
            Box::new(StreamPlayer::new(rec.clone(), dev.clone(), gain, Fill::Copy)),
            RecallFlags::NONE,
            &run,
        );
        tree.run_init(player).unwrap();

        tree.run_cycle(player).unwrap();
        assert_eq!(
            dev.lock().borrow().ring.next(),
            &[0.0, 0.5, 0.0, 1.0, 0.0, 1.5, 0.0, 2.0]
        );
        dev.lock().borrow_mut().complete_buffer();

        tree.run_cycle(player).unwrap();
        assert_eq!(dev.lock().borrow().ring.next()[7], 4.0);
        assert_eq!(tree.state(player), NodeState::Running);

        // stream exhausted: request, drain, done
        tree.run_cycle(player).unwrap();
        assert_eq!(tree.state(player), NodeState::Terminating);
        tree.run_cycle(player).unwrap();
        assert_eq!(tree.state(player), NodeState::Done);
        assert_eq!(rec.lock().len(), 1);
    }

    #[test]
    fn mixer_adds_into_destination() {
        let src = recycling(0, &[1.0, 1.0, 1.0, 1.0]);
        let dst = recycling(0, &[0.5, 0.5, 0.5, 0.5]);
        let ids = RecallIdAllocator::new();
        let run = ids.allocate(SoundScope::Wave);
        src.lock().instantiate_copy(&run);
        let out = dst.lock().instantiate_copy(&run);

        let mut tree = RecallTree::new();
        let mixer = tree.add_node(
            Box::new(SignalMixer::new(src, dst, Port::new("gain", 2.0).into_shared())),
            RecallFlags::NONE,
            &run,
        );
        tree.run_init(mixer).unwrap();
        tree.run_cycle(mixer).unwrap();
        assert!(out.lock().samples().all(|x| x == 2.5));
    }

    #[test]
    fn opposing_mixers_run_concurrently() {
        let a = recycling(0, &[1.0; 4]);
        let b = recycling(1, &[1.0; 4]);
        let ids = RecallIdAllocator::new();
        let run = ids.allocate(SoundScope::Wave);
        a.lock().instantiate_copy(&run);
        b.lock().instantiate_copy(&run);

        let (tx, rx) = crossbeam_channel::unbounded();
        let threads: Vec<_> = [(a.clone(), b.clone()), (b, a)]
            .into_iter()
            .map(|(src, dst)| {
                let run = Arc::clone(&run);
                let tx = tx.clone();
                std::thread::spawn(move || {
                    let mut tree = RecallTree::new();
                    let mixer = tree.add_node(
                        Box::new(SignalMixer::new(src, dst, Port::new("gain", 0.0).into_shared())),
                        RecallFlags::NONE,
                        &run,
                    );
                    tree.run_init(mixer).unwrap();
                    for _ in 0..20_000 {
                        tree.run_cycle(mixer).unwrap();
                    }
                    tx.send(()).unwrap();
                })
            })
            .collect();
        for _ in 0..2 {
            rx.recv_timeout(std::time::Duration::from_secs(30))
                .expect("mixers deadlocked");
        }
        for t in threads {
            t.join().unwrap();
        }
    }

    #[test]
    fn beat_counter_finishes_after_beats() {
        let dev = device(1024);
        let ids = RecallIdAllocator::new();
        let run = ids.allocate(SoundScope::Sequencer);
        let mut tree = RecallTree::new();
        let counter = tree.add_node(
            Box::new(BeatCounter::new(dev.clone(), 2)),
            RecallFlags::NONE,
            &run,
        );
        tree.run_init(counter).unwrap();
        let mut ticks = 0;
        while tree.state(counter) != NodeState::Done && ticks < 100 {
            dev.lock().borrow_mut().complete_buffer();
            tree.run_cycle(counter).unwrap();
            ticks += 1;
        }
        assert_eq!(tree.state(counter), NodeState::Done);
        assert!(dev.lock().borrow().clock.note_offset_absolute() >= 2);
    }

    #[test]
    fn tap_duplicates_share_closure() {
        let hits = Arc::new(parking_lot::Mutex::new(0));
        let h = Arc::clone(&hits);
        let tap = Tap::new(move |_ctx: &mut StageContext<'_>| *h.lock() += 1).named("hits");
        let copy = tap.duplicate();
        assert_eq!(copy.name(), "hits");
        let ids = RecallIdAllocator::new();
        let run = ids.allocate(SoundScope::Midi);
        let mut tree = RecallTree::new();
        let node = tree.add_node(copy, RecallFlags::NONE, &run);
        tree.run_cycle(node).unwrap();
        assert_eq!(*hits.lock(), 3);
    }
}
