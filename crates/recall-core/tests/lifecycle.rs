//! Integration tests for the recall lifecycle and device timing.

use std::collections::HashMap;

use recall_core::{
    Container, NodeId, NodeState, RecallFlags, RecallIdAllocator, RecallTree, SoundScope,
    TimingKey, TimingTables, TreeEvent,
};

// ---------------------------------------------------------------------------
// Cancellation
// ---------------------------------------------------------------------------

fn build_tree(tree: &mut RecallTree, parent: NodeId, depth: usize, fan_out: usize) {
    if depth == 0 {
        return;
    }
    for _ in 0..fan_out {
        let template = tree.add_template(Box::new(Container), RecallFlags::NONE);
        tree.add_child(parent, template).unwrap();
        build_tree(tree, template, depth - 1, fan_out);
    }
}

#[test]
fn cancel_reaches_every_node_once() {
    let ids = RecallIdAllocator::new();
    let run = ids.allocate(SoundScope::Playback);
    let mut tree = RecallTree::new();

    let template = tree.add_template(Box::new(Container), RecallFlags::PERSISTENT);
    build_tree(&mut tree, template, 3, 4);
    let root = tree.instantiate(template, &run).unwrap();
    tree.run_init(root).unwrap();
    tree.run_cycle(root).unwrap();

    let (tx, rx) = crossbeam_channel::unbounded();
    tree.set_event_sender(tx);
    tree.cancel(root).unwrap();

    let events: Vec<TreeEvent> = rx.try_iter().collect();
    let mut cancelled_at = HashMap::new();
    let mut done_at = HashMap::new();
    for (i, event) in events.iter().enumerate() {
        match *event {
            TreeEvent::Cancelled(id) => {
                assert!(cancelled_at.insert(id, i).is_none(), "{id} cancelled twice");
            }
            TreeEvent::Done(id) => {
                assert!(done_at.insert(id, i).is_none(), "{id} done twice");
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    assert_eq!(done_at.len(), 85);
    for (id, done) in &done_at {
        let cancelled = cancelled_at[id];
        assert!(cancelled < *done, "{id} done before cancel");
        assert_eq!(tree.state(*id), NodeState::Done);
    }
    // children finish before their parent
    assert_eq!(events.last(), Some(&TreeEvent::Done(root)));

    assert_eq!(tree.sweep(), 85);
    assert_eq!(tree.len(), 85, "templates stay");
}

#[test]
fn cancel_is_synchronous_for_initial_run() {
    let ids = RecallIdAllocator::new();
    let run = ids.allocate(SoundScope::Notation);
    let mut tree = RecallTree::new();
    let root = tree.add_node(Box::new(Container), RecallFlags::NONE, &run);
    tree.run_init(root).unwrap();
    assert!(tree.flags(root).unwrap().contains(RecallFlags::INITIAL_RUN));

    tree.cancel(root).unwrap();
    assert_eq!(tree.state(root), NodeState::Done);
    assert!(!tree.has_live_roots(&run));
}

// ---------------------------------------------------------------------------
// Timing tables
// ---------------------------------------------------------------------------

#[test]
fn timing_tables_match_formula() {
    let key = TimingKey {
        samplerate: 44100,
        buffer_size: 1024,
        bpm: 120.0,
        delay_factor: 1.0,
    };
    let tables = TimingTables::new(key).unwrap();

    let delay: f64 = 60.0 * (44100.0 / 1024.0) / 120.0 * (1.0 / 16.0) * (1.0 / 1.0);
    assert!((delay - 1.3458).abs() < 1e-4);
    let tact = delay * 1024.0;
    let period = 64.0;

    let mut attack = vec![0.0_f64; 64];
    let mut delays = vec![delay; 64];
    for i in 1..64 {
        let fi = i as f64;
        attack[i] = ((fi * tact + attack[i - 1]) / (period / (delay * fi))) % 1024.0;
        delays[i] = (tact + attack[i]) / 1024.0;
    }

    assert_eq!(tables.delay()[0], delay);
    for i in 0..64 {
        assert_eq!(tables.attack()[i].to_bits(), attack[i].to_bits(), "attack[{i}]");
        assert_eq!(tables.delay()[i].to_bits(), delays[i].to_bits(), "delay[{i}]");
    }
}
