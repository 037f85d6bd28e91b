//! Savegame round trips and lag compensation on a loaded world.

use std::sync::Arc;

use tideline_net::{read_savegame, write_savegame, ObjectTable, SavegameError, SyncConfig, SyncServer, Timeline};
use tideline_shared::{ObjectId, Vec3};
use tideline_state::{state_bundle, BundleKind, BundleRegistry, ObjectStates, StateFlags, StateWriter};

state_bundle! {
    /// Test door.
    pub struct DoorStates {
        /// Opening angle.
        pub angle: f32 => StateFlags::DEFAULT | StateFlags::LERPED,
        /// Only meaningful while running.
        pub animating: bool => StateFlags::NETWORKED,
    }
}

fn bundles() -> BundleRegistry {
    let mut bundles = BundleRegistry::new();
    bundles.register::<DoorStates>(BundleKind(3)).unwrap();
    bundles
}

#[test]
fn test_savegame_restores_folded_world() {
    let bundles = bundles();
    let timeline = Arc::new(Timeline::new());
    let mut world = ObjectTable::tracked_by(Arc::clone(&timeline));
    world.spawn(ObjectId(1), ObjectStates::spawned(Vec3::ZERO));
    world.spawn(ObjectId(2), ObjectStates::spawned(Vec3::ONE));
    let mut door = DoorStates::default();
    door.angle.assign(15.0);
    door.animating.assign(true);
    world.set_extra_states(ObjectId(2), &door).unwrap();
    timeline.commit(0.0).unwrap();

    let mut moved = ObjectStates::default();
    moved.position.assign(Vec3::new(3.0, 0.0, 0.0));
    world.set_states(ObjectId(1), &moved);
    timeline.commit(0.1).unwrap();

    let mut writer = StateWriter::new();
    write_savegame(&timeline, &bundles, &mut writer).unwrap();

    let restored = Timeline::new();
    restored.commit(5.0).unwrap();
    let tick = read_savegame(&restored, &bundles, writer.as_slice()).unwrap();
    assert_eq!(tick, 2);
    assert_eq!(restored.committed_ticks(), vec![2]);
    assert_eq!(restored.latest_realtime(), Some(0.1));

    let snapshot = restored.snapshot(2).unwrap();
    let first = snapshot.record(ObjectId(1)).unwrap();
    assert_eq!(first.states.position.get(), Vec3::new(3.0, 0.0, 0.0));
    assert!(first.states.visibility.get());

    let extra = snapshot.record(ObjectId(2)).unwrap().extra.as_deref().unwrap();
    let door = extra.downcast_ref::<DoorStates>().unwrap();
    assert_eq!(door.angle.get(), 15.0);
    assert!(!door.animating.has_value());

    // Simulation continues from the saved tick.
    assert_eq!(restored.commit(0.2).unwrap(), 3);
}

#[test]
fn test_truncated_savegame_leaves_timeline_alone() {
    let bundles = bundles();
    let timeline = Timeline::new();
    timeline.object_states_changed(ObjectId(1), &ObjectStates::spawned(Vec3::ONE));
    timeline.commit(0.0).unwrap();

    let mut writer = StateWriter::new();
    write_savegame(&timeline, &bundles, &mut writer).unwrap();
    let bytes = writer.into_inner();

    let target = Timeline::new();
    target.commit(1.0).unwrap();
    let err = read_savegame(&target, &bundles, &bytes[..bytes.len() - 3]).unwrap_err();
    assert!(matches!(err, SavegameError::Codec(_)));
    assert_eq!(target.committed_ticks(), vec![1]);
}

#[test]
fn test_lag_compensation_after_load() {
    let bundles = bundles();
    let mut config = SyncConfig::default();
    config.server.send_interval_ticks = 1;
    let mut server = SyncServer::new(&config);
    let client = server.add_client();
    server.update_client_latency(client, 0.1, 0.05).unwrap();

    let mut world = ObjectTable::tracked_by(Arc::clone(server.timeline()));
    world.spawn(ObjectId(1), ObjectStates::spawned(Vec3::ZERO));
    for step in 1..=20u8 {
        server.end_tick(0.05).unwrap();
        let mut moved = ObjectStates::default();
        moved.position.assign(Vec3::new(f32::from(step), 0.0, 0.0));
        world.set_states(ObjectId(1), &moved);
    }
    server.end_tick(0.05).unwrap();

    // Savegames carry the present, not the rolled back past.
    let mut before = StateWriter::new();
    {
        let guard = server.begin_rollback_for_client(client, &mut world).unwrap();
        let x = guard.registry().states(ObjectId(1)).unwrap().position.get().x;
        assert!(x < 20.0);
        write_savegame(server.timeline(), &bundles, &mut before).unwrap();
    }
    assert_eq!(world.states(ObjectId(1)).unwrap().position.get().x, 20.0);

    let loaded = Timeline::new();
    read_savegame(&loaded, &bundles, before.as_slice()).unwrap();
    let record = loaded.snapshot(21).unwrap().records[&ObjectId(1)].clone();
    assert_eq!(record.states.position.get().x, 20.0);
}
