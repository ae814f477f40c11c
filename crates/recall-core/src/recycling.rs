//! Owners of audio signals.
//!
//! A [`Recycling`] holds one read-only template signal and any number of
//! run instances, each bound to a [`RecallId`](crate::RecallId). Instances are
//! shared with node kinds and device code through [`SharedSignal`] handles.

use std::sync::Arc;

use parking_lot::Mutex;

use crate::recall_id::{RecallId, SharedRecallId};
use crate::stream::AudioSignal;

/// Shared, lockable audio signal.
pub type SharedSignal = Arc<Mutex<AudioSignal>>;

/// Shared, lockable recycling.
pub type SharedRecycling = Arc<Mutex<Recycling>>;

/// One template signal plus its per-run instances.
#[derive(Debug)]
pub struct Recycling {
    channel: u16,
    template: Arc<AudioSignal>,
    signals: Vec<SharedSignal>,
}

impl Recycling {
    /// Creates a recycling for `channel` around a template signal.
    pub fn new(channel: u16, mut template: AudioSignal) -> Self {
        template.set_template(true);
        template.set_recall_id(None);
        Self {
            channel,
            template: Arc::new(template),
            signals: Vec::new(),
        }
    }

    /// Wraps the recycling in a shared handle.
    pub fn into_shared(self) -> SharedRecycling {
        Arc::new(Mutex::new(self))
    }

    /// Output channel this recycling feeds.
    pub fn channel(&self) -> u16 {
        self.channel
    }

    /// The template signal.
    pub fn template(&self) -> &Arc<AudioSignal> {
        &self.template
    }

    /// Replaces the template. Existing instances are left as they are.
    pub fn replace_template(&mut self, mut template: AudioSignal) {
        template.set_template(true);
        template.set_recall_id(None);
        self.template = Arc::new(template);
    }

    /// All instance signals.
    pub fn signals(&self) -> &[SharedSignal] {
        &self.signals
    }

    /// Number of instance signals.
    pub fn len(&self) -> usize {
        self.signals.len()
    }

    /// Returns `true` if no instance exists.
    pub fn is_empty(&self) -> bool {
        self.signals.is_empty()
    }

    /// Creates an instance holding `frame_count` frames tiled from the
    /// template, cursor at the head.
    pub fn instantiate(&mut self, recall_id: &SharedRecallId, frame_count: usize) -> SharedSignal {
        let template = &self.template;
        let mut signal = template.empty_like();
        signal.set_recall_id(Some(Arc::clone(recall_id)));
        signal.tile(template, frame_count);
        signal.rewind();
        self.push(signal)
    }

    /// Creates an instance as a verbatim copy of the template.
    pub fn instantiate_copy(&mut self, recall_id: &SharedRecallId) -> SharedSignal {
        let template = &self.template;
        let mut signal = template.empty_like();
        signal.set_recall_id(Some(Arc::clone(recall_id)));
        signal.duplicate_stream(template);
        signal.rewind();
        self.push(signal)
    }

    /// First instance bound to `recall_id`.
    pub fn signal_for(&self, recall_id: &RecallId) -> Option<SharedSignal> {
        by_recall_id(&self.signals, recall_id)
    }

    /// First instance bound to `recall_id` whose cursor is set.
    pub fn stream_current(&self, recall_id: &RecallId) -> Option<SharedSignal> {
        stream_current_of(&self.signals, recall_id)
    }

    /// Destroys every instance bound to `recall_id`.
    ///
    /// Returns the number of signals released.
    pub fn release(&mut self, recall_id: &RecallId) -> usize {
        let before = self.signals.len();
        self.signals
            .retain(|s| s.lock().recall_id().is_none_or(|id| **id != *recall_id));
        let released = before - self.signals.len();
        #[cfg(feature = "tracing")]
        if released > 0 {
            tracing::debug!(channel = self.channel, recall_id = %recall_id, released, "recycling release");
        }
        released
    }

    fn push(&mut self, signal: AudioSignal) -> SharedSignal {
        let shared = Arc::new(Mutex::new(signal));
        self.signals.push(Arc::clone(&shared));
        shared
    }
}

/// First template signal in `signals`.
pub fn template_of(signals: &[SharedSignal]) -> Option<SharedSignal> {
    signals.iter().find(|s| s.lock().is_template()).cloned()
}

/// First non-template signal bound to `recall_id`.
pub fn by_recall_id(signals: &[SharedSignal], recall_id: &RecallId) -> Option<SharedSignal> {
    signals
        .iter()
        .find(|s| {
            let s = s.lock();
            !s.is_template() && s.recall_id().is_some_and(|id| **id == *recall_id)
        })
        .cloned()
}

/// First non-template signal bound to `recall_id` with its cursor set.
pub fn stream_current_of(signals: &[SharedSignal], recall_id: &RecallId) -> Option<SharedSignal> {
    signals
        .iter()
        .find(|s| {
            let s = s.lock();
            !s.is_template()
                && s.cursor().is_some()
                && s.recall_id().is_some_and(|id| **id == *recall_id)
        })
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::{AudioGeometry, SampleFormat};
    use crate::recall_id::{RecallIdAllocator, SoundScope};

    fn recycling() -> Recycling {
        let geo = AudioGeometry::new(48000, 4, 1, SampleFormat::Float32).unwrap();
        Recycling::new(0, AudioSignal::from_samples(&geo, &[0.5, -0.5, 0.25]))
    }

    #[test]
    fn template_is_flagged_and_unbound() {
        let r = recycling();
        assert!(r.template().is_template());
        assert!(r.template().recall_id().is_none());
        assert!(r.is_empty());
    }

    #[test]
    fn instantiate_tiles_and_binds() {
        let alloc = RecallIdAllocator::new();
        let id = alloc.allocate(SoundScope::Playback);
        let mut r = recycling();
        let signal = r.instantiate(&id, 7);
        let s = signal.lock();
        assert_eq!(s.frame_count(), 7);
        assert_eq!(s.cursor(), Some(0));
        assert_eq!(
            s.samples().collect::<Vec<_>>(),
            vec![0.5, -0.5, 0.25, 0.5, -0.5, 0.25, 0.5]
        );
        assert!(!s.is_template());
        assert_eq!(s.recall_id().map(|i| i.id()), Some(id.id()));
    }

    #[test]
    fn lookups_by_recall_id() {
        let alloc = RecallIdAllocator::new();
        let a = alloc.allocate(SoundScope::Playback);
        let b = alloc.allocate(SoundScope::Playback);
        let mut r = recycling();
        let sa = r.instantiate(&a, 3);
        let sb = r.instantiate_copy(&b);
        assert!(Arc::ptr_eq(&r.signal_for(&a).unwrap(), &sa));
        assert!(Arc::ptr_eq(&r.signal_for(&b).unwrap(), &sb));

        sb.lock().seek(usize::MAX);
        assert!(r.stream_current(&b).is_none());
        assert!(r.stream_current(&a).is_some());
        assert!(template_of(r.signals()).is_none());
    }

    #[test]
    fn release_destroys_only_matching_instances() {
        let alloc = RecallIdAllocator::new();
        let a = alloc.allocate(SoundScope::Wave);
        let b = alloc.allocate(SoundScope::Wave);
        let mut r = recycling();
        r.instantiate(&a, 3);
        r.instantiate(&a, 3);
        r.instantiate(&b, 3);
        assert_eq!(r.release(&a), 2);
        assert_eq!(r.len(), 1);
        assert!(r.signal_for(&a).is_none());
        assert!(r.signal_for(&b).is_some());
    }
}
