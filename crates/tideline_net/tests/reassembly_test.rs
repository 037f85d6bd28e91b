//! Receiver reassembly under arbitrary message order.

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tideline_net::protocol::PacketBuilder;
use tideline_net::{
    decode_message, dispatch_downlink, Message, ProtocolError, QueuedUplinkConnector, Timeline, TimelineConfig,
    TimelineError,
};
use tideline_shared::{ObjectId, Quaternion, TickNumber, Vec3, INVALID_TICK};
use tideline_state::{BundleRegistry, ObjectRecord, ObjectStates, SerializationPurpose};

const OBJECTS: u32 = 24;

fn random_change(rng: &mut StdRng) -> ObjectStates {
    let mut states = ObjectStates::default();
    if rng.gen_bool(0.7) {
        states
            .position
            .assign(Vec3::new(rng.gen_range(-50.0..50.0), rng.gen_range(0.0..10.0), rng.gen_range(-50.0..50.0)));
    }
    if rng.gen_bool(0.3) {
        states
            .rotation
            .assign(Quaternion::from_axis_angle(Vec3::new(0.0, 1.0, 0.0), rng.gen_range(0.0..6.0)));
    }
    if rng.gen_bool(0.2) {
        states.visibility.assign(rng.gen());
    }
    states
}

/// Sender with a spawned world at tick 1 and random changes at tick 2.
fn sender(rng: &mut StdRng) -> Timeline {
    let timeline = Timeline::new();
    for id in 0..OBJECTS {
        timeline.object_states_changed(ObjectId(id), &ObjectStates::spawned(Vec3::new(id as f32, 0.0, 0.0)));
    }
    timeline.commit(0.0).unwrap();
    for id in 0..OBJECTS {
        if rng.gen_bool(0.5) {
            timeline.object_states_changed(ObjectId(id), &random_change(rng));
        }
    }
    timeline.commit(0.05).unwrap();
    timeline
}

fn packets(timeline: &Timeline, tick: TickNumber, reference: TickNumber) -> Vec<Vec<u8>> {
    let packets = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&packets);
    let builder = PacketBuilder::new(Arc::new(BundleRegistry::new()), move |bytes: &[u8]| {
        sink.lock().push(bytes.to_vec());
    });
    timeline.send_snapshot_to_client(tick, &builder, reference).unwrap();
    let collected = packets.lock().clone();
    collected
}

fn deliver(timeline: &Timeline, packets: &[Vec<u8>]) {
    let bundles = BundleRegistry::new();
    for bytes in packets {
        dispatch_downlink(&decode_message(bytes, &bundles).unwrap(), timeline).unwrap();
    }
}

#[test]
fn test_any_order_commits_once() {
    for seed in 0..64 {
        let mut rng = StdRng::seed_from_u64(seed);
        let source = sender(&mut rng);

        let receiver = Timeline::new();
        let acks = QueuedUplinkConnector::new();
        receiver.set_uplink_connector(Some(Arc::new(acks.clone())));

        let mut full = packets(&source, 1, INVALID_TICK);
        full.shuffle(&mut rng);
        deliver(&receiver, &full);
        assert_eq!(acks.drain().collect::<Vec<_>>(), vec![1], "seed {seed}");

        let mut delta = packets(&source, 2, 1);
        assert!(delta.len() <= full.len());
        delta.shuffle(&mut rng);
        deliver(&receiver, &delta);
        assert_eq!(acks.drain().collect::<Vec<_>>(), vec![2], "seed {seed}");

        // What the receiver holds at tick 2 is the sender's world at tick 2.
        let expected = folded_view(&source);
        let snapshot = receiver.snapshot(2).unwrap();
        assert_eq!(snapshot.len(), OBJECTS as usize);
        for (id, record) in &snapshot.records {
            assert_eq!(record, &expected[id], "seed {seed}, {id}");
        }
    }
}

#[test]
fn test_duplicated_messages_after_commit_are_ignored() {
    let mut rng = StdRng::seed_from_u64(7);
    let source = sender(&mut rng);
    let receiver = Timeline::new();

    let full = packets(&source, 1, INVALID_TICK);
    deliver(&receiver, &full);
    let committed = receiver.snapshot(1).unwrap().records;

    let bundles = BundleRegistry::new();
    for bytes in &full {
        let replayed = decode_message(bytes, &bundles).unwrap();
        dispatch_downlink(&replayed, &receiver).unwrap();
    }
    assert_eq!(receiver.committed_ticks(), vec![1]);
    assert!(receiver.staged_ticks().is_empty());
    assert_eq!(receiver.snapshot(1).unwrap().records, committed);
}

#[test]
fn test_delta_against_lost_reference() {
    let mut rng = StdRng::seed_from_u64(11);
    let source = sender(&mut rng);
    let receiver = Timeline::new();

    let delta = packets(&source, 2, 1);
    let bundles = BundleRegistry::new();
    let mut last_error = None;
    for bytes in &delta {
        if let Err(error) = dispatch_downlink(&decode_message(bytes, &bundles).unwrap(), &receiver) {
            last_error = Some(error);
        }
    }
    let error = last_error.unwrap();
    assert!(error.requires_resync());
    assert!(matches!(
        error,
        ProtocolError::Timeline(TimelineError::ReferenceEvicted { tick: 2, reference: 1 })
    ));

    receiver.reset();
    deliver(&receiver, &packets(&source, 2, INVALID_TICK));
    assert_eq!(receiver.committed_ticks(), vec![2]);
}

#[test]
fn test_evicted_reference_sends_full_state() {
    let mut rng = StdRng::seed_from_u64(23);
    let source = Timeline::with_config(TimelineConfig {
        capacity: 4,
        accumulate_full_state: true,
    });
    for id in 0..OBJECTS {
        source.object_states_changed(ObjectId(id), &ObjectStates::spawned(Vec3::new(id as f32, 0.0, 0.0)));
    }
    source.commit(0.0).unwrap();

    let receiver = Timeline::new();
    let acks = QueuedUplinkConnector::new();
    receiver.set_uplink_connector(Some(Arc::new(acks.clone())));
    deliver(&receiver, &packets(&source, 1, INVALID_TICK));
    assert_eq!(acks.drain().collect::<Vec<_>>(), vec![1]);

    // The acknowledged tick falls out of the sender's window.
    for tick in 2..=6u8 {
        for id in 0..OBJECTS {
            if rng.gen_bool(0.5) {
                source.object_states_changed(ObjectId(id), &random_change(&mut rng));
            }
        }
        source.commit(f64::from(tick) * 0.05).unwrap();
    }
    assert_eq!(source.oldest_tick(), Some(3));

    let sent = packets(&source, 6, 1);
    let bundles = BundleRegistry::new();
    let Message::ConfirmSnapshot { reference_tick, .. } = decode_message(sent.last().unwrap(), &bundles).unwrap()
    else {
        panic!("last message is not a confirmation");
    };
    assert_eq!(reference_tick, INVALID_TICK);

    deliver(&receiver, &sent);
    assert_eq!(acks.drain().collect::<Vec<_>>(), vec![6]);
    assert_eq!(receiver.committed_ticks(), vec![1, 6]);

    let expected = source.snapshot(6).unwrap().records;
    let snapshot = receiver.snapshot(6).unwrap();
    assert_eq!(snapshot.len(), OBJECTS as usize);
    for (id, record) in &snapshot.records {
        assert_eq!(record, &expected[id].filtered(SerializationPurpose::Network), "{id}");
    }
}

/// Everything committed on the sender, merged oldest to newest, as sent on
/// the wire.
fn folded_view(timeline: &Timeline) -> BTreeMap<ObjectId, ObjectRecord> {
    let mut view: BTreeMap<ObjectId, ObjectRecord> = BTreeMap::new();
    for tick in timeline.committed_ticks() {
        for (id, record) in timeline.snapshot(tick).unwrap().records {
            view.entry(id)
                .or_default()
                .merge_from(&record.filtered(SerializationPurpose::Network))
                .unwrap();
        }
    }
    view
}
