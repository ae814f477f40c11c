//! Property-based tests for recall-core streams and the recall tree.
//!
//! Covers the resize, tile and realloc laws of audio signals and the
//! idempotence of done, using proptest for randomized geometry.

use proptest::prelude::*;
use recall_core::{
    AudioGeometry, AudioSignal, Container, NodeState, RecallFlags, RecallIdAllocator, RecallTree,
    SampleFormat, SoundScope,
};

fn geometry(buffer_size: usize) -> AudioGeometry {
    AudioGeometry::new(48000, buffer_size, 1, SampleFormat::Float32).unwrap()
}

fn frames(n: usize) -> Vec<f32> {
    (0..n).map(|i| (i as f32 * 0.37).sin()).collect()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// After `safe_resize(n)` the length is `max(n, length_till_cursor)` and
    /// the cursor survives.
    #[test]
    fn safe_resize_law(
        length in 0usize..40,
        cursor in proptest::option::of(0usize..40),
        target in 0usize..60,
    ) {
        let mut s = AudioSignal::with_length(&geometry(8), length);
        if let Some(c) = cursor {
            s.seek(c);
        }
        let before = s.cursor();
        let till = s.length_till_cursor();

        s.safe_resize(target);

        prop_assert_eq!(s.length(), target.max(till));
        prop_assert_eq!(s.buffers().count(), s.length());
        prop_assert_eq!(s.cursor(), before);
    }

    /// Tiling is periodic in the template's frame count for any ratio of
    /// buffer sizes, and yields exactly the requested frame count.
    #[test]
    fn tile_periodicity(
        template_bs in 1usize..64,
        dest_bs in 1usize..64,
        template_frames in 1usize..200,
        frame_count in 0usize..1000,
    ) {
        let source = frames(template_frames);
        let template = AudioSignal::from_samples(&geometry(template_bs), &source);
        let mut out = AudioSignal::new(&geometry(dest_bs));

        out.tile(&template, frame_count);

        prop_assert_eq!(out.frame_count(), frame_count);
        prop_assert_eq!(out.length(), frame_count.div_ceil(dest_bs));
        for (i, x) in out.samples().enumerate() {
            prop_assert_eq!(x, source[i % template_frames]);
        }
    }

    /// Reallocating to the same size twice equals reallocating once, and a
    /// detour through another size preserves the frame sequence.
    #[test]
    fn realloc_idempotence(
        bs in 1usize..64,
        other in 1usize..64,
        n in 0usize..500,
    ) {
        let source = frames(n);
        let mut once = AudioSignal::from_samples(&geometry(bs), &source);
        once.realloc_buffer_size(other).unwrap();
        let mut twice = once.clone();
        twice.realloc_buffer_size(other).unwrap();

        prop_assert_eq!(once.length(), twice.length());
        prop_assert_eq!(once.last_frame(), twice.last_frame());
        prop_assert_eq!(once.samples().collect::<Vec<_>>(), twice.samples().collect::<Vec<_>>());

        twice.realloc_buffer_size(bs).unwrap();
        prop_assert_eq!(twice.samples().collect::<Vec<_>>(), source);
        prop_assert_eq!(twice.frame_count(), n);
    }

    /// `done` twice is observationally equal to `done` once.
    #[test]
    fn done_idempotence(children in 0usize..6, ticks in 1usize..4) {
        let ids = RecallIdAllocator::new();
        let run = ids.allocate(SoundScope::Playback);
        let mut tree = RecallTree::new();
        let (tx, rx) = crossbeam_channel::unbounded();
        tree.set_event_sender(tx);

        let root = tree.add_node(Box::new(Container), RecallFlags::NONE, &run);
        for _ in 0..children {
            let c = tree.add_node(Box::new(Container), RecallFlags::NONE, &run);
            tree.add_child(root, c).unwrap();
        }
        tree.run_init(root).unwrap();
        for _ in 0..ticks {
            tree.run_cycle(root).unwrap();
        }
        let _ = rx.try_iter().count();

        prop_assert!(tree.done(root));
        let flags = tree.flags(root).unwrap();
        let events: Vec<_> = rx.try_iter().collect();

        prop_assert!(!tree.done(root));
        prop_assert_eq!(tree.flags(root).unwrap(), flags);
        prop_assert_eq!(tree.state(root), NodeState::Done);
        prop_assert_eq!(events.len(), 1);
        prop_assert_eq!(rx.try_iter().count(), 0);
    }
}
