//! # Savegames
//!
//! A savegame is the complete retained state folded into one snapshot and
//! written with the SAVED purpose. It is never delta-encoded.
//!
//! ```text
//!   [magic u32 "TDLS"][tick u32][realtime f64][object count u32]
//!   per object:
//!     [object u32][ObjectStates][has extra u8]([kind u16][extra bundle])
//! ```

use std::collections::BTreeMap;

use tideline_shared::{ObjectId, TickNumber, INVALID_TICK};
use tideline_state::{
    BundleKind, BundleRegistry, ObjectRecord, ObjectStates, SerializationPurpose, StateBundle, StateReader,
    StateWriter,
};

use crate::error::{SavegameError, SavegameResult};
use crate::snapshot::Snapshot;
use crate::timeline::Timeline;

/// First four bytes of every savegame.
pub const SAVEGAME_MAGIC: u32 = u32::from_le_bytes(*b"TDLS");

const PURPOSE: SerializationPurpose = SerializationPurpose::Savegame;

/// Writes the retained state of `timeline`.
///
/// Objects without any saved value are left out.
///
/// # Errors
///
/// [`SavegameError::EmptyTimeline`] if nothing is committed, or a state
/// error if an extra bundle is not registered in `bundles`. Nothing is
/// written on failure.
pub fn write_savegame(timeline: &Timeline, bundles: &BundleRegistry, writer: &mut StateWriter) -> SavegameResult<()> {
    let state = timeline.folded_state()?.ok_or(SavegameError::EmptyTimeline)?;
    let mut records = Vec::with_capacity(state.records.len());
    for (&id, record) in &state.records {
        let record = record.filtered(PURPOSE);
        if record.is_empty() {
            continue;
        }
        let kind = record.extra.as_deref().map(|extra| bundles.kind_of(extra)).transpose()?;
        records.push((id, record, kind));
    }
    let count = u32::try_from(records.len()).map_err(|_| SavegameError::TooManyObjects(records.len()))?;

    writer.write_u32(SAVEGAME_MAGIC);
    writer.write_u32(state.tick);
    writer.write_f64(state.realtime);
    writer.write_u32(count);
    for (id, record, kind) in &records {
        writer.write_u32(id.0);
        record.states.serialize(writer, PURPOSE);
        match (record.extra.as_deref(), kind) {
            (Some(extra), Some(kind)) => {
                writer.write_u8(1);
                writer.write_u16(kind.0);
                extra.dyn_serialize(writer, PURPOSE);
            }
            _ => writer.write_u8(0),
        }
    }
    tracing::debug!(tick = state.tick, objects = count, "wrote savegame");
    Ok(())
}

/// Replaces everything in `timeline` with the saved state.
///
/// Returns the tick the state was saved at; it becomes the only committed
/// snapshot.
///
/// # Errors
///
/// Fails on foreign or malformed data, trailing bytes and unregistered
/// extra bundles. The timeline is left untouched on failure.
pub fn read_savegame(timeline: &Timeline, bundles: &BundleRegistry, bytes: &[u8]) -> SavegameResult<TickNumber> {
    let mut reader = StateReader::new(bytes);
    let magic = reader.read_u32()?;
    if magic != SAVEGAME_MAGIC {
        return Err(SavegameError::BadMagic(magic));
    }
    let tick = reader.read_u32()?;
    if tick == INVALID_TICK {
        return Err(SavegameError::InvalidTick(tick));
    }
    let realtime = reader.read_f64()?;
    let count = reader.read_u32()?;

    let mut records = BTreeMap::new();
    for _ in 0..count {
        let id = ObjectId(reader.read_u32()?);
        let mut record = ObjectRecord::new(ObjectStates::deserialize(&mut reader, PURPOSE)?);
        if reader.read_u8()? != 0 {
            let kind = BundleKind(reader.read_u16()?);
            record.extra = Some(bundles.deserialize(kind, &mut reader, PURPOSE)?);
        }
        records.insert(id, record);
    }
    if reader.remaining() > 0 {
        return Err(SavegameError::TrailingBytes(reader.remaining()));
    }

    timeline.restore(Snapshot::with_records(tick, realtime, records));
    tracing::debug!(tick, objects = count, "loaded savegame");
    Ok(tick)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tideline_shared::Vec3;
    use tideline_state::CodecError;

    tideline_state::state_bundle! {
        struct Chest {
            locked: bool,
            gold: u32,
        }
    }

    #[test]
    fn test_empty_timeline() {
        let mut writer = StateWriter::new();
        assert_eq!(
            write_savegame(&Timeline::new(), &BundleRegistry::new(), &mut writer).unwrap_err(),
            SavegameError::EmptyTimeline
        );
    }

    #[test]
    fn test_rejects_foreign_data() {
        let timeline = Timeline::new();
        let bundles = BundleRegistry::new();
        assert_eq!(
            read_savegame(&timeline, &bundles, &[1, 2, 3, 4]).unwrap_err(),
            SavegameError::BadMagic(u32::from_le_bytes([1, 2, 3, 4]))
        );
        assert!(matches!(
            read_savegame(&timeline, &bundles, b"TD"),
            Err(SavegameError::Codec(CodecError::UnexpectedEnd { .. }))
        ));
    }

    #[test]
    fn test_rejects_trailing_bytes() {
        let timeline = Timeline::new();
        timeline.object_states_changed(ObjectId(1), &ObjectStates::spawned(Vec3::ONE));
        timeline.commit(0.0).unwrap();
        let mut writer = StateWriter::new();
        write_savegame(&timeline, &BundleRegistry::new(), &mut writer).unwrap();
        writer.write_u8(0);

        let restored = Timeline::new();
        assert_eq!(
            read_savegame(&restored, &BundleRegistry::new(), writer.as_slice()).unwrap_err(),
            SavegameError::TrailingBytes(1)
        );
        assert!(restored.is_empty());
    }

    #[test]
    fn test_unsaved_values_are_skipped() {
        let timeline = Timeline::new();
        let mut states = ObjectStates::spawned(Vec3::ONE);
        states.running.set_saved(false);
        timeline.object_states_changed(ObjectId(1), &states);
        let mut transient = ObjectStates::default();
        transient.scale.set_saved(false);
        transient.scale.assign(Vec3::ONE);
        timeline.object_states_changed(ObjectId(2), &transient);
        timeline.commit(0.0).unwrap();

        let mut writer = StateWriter::new();
        write_savegame(&timeline, &BundleRegistry::new(), &mut writer).unwrap();

        let restored = Timeline::new();
        read_savegame(&restored, &BundleRegistry::new(), writer.as_slice()).unwrap();
        let snapshot = restored.snapshot(1).unwrap();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.record(ObjectId(1)).unwrap().count_states_with_value(), 4);
    }

    #[test]
    fn test_extra_bundle_needs_registration() {
        let timeline = Timeline::new();
        let mut chest = Chest::default();
        chest.gold.assign(30);
        timeline.object_extra_states_changed(ObjectId(4), &chest).unwrap();
        timeline.commit(0.0).unwrap();

        let mut writer = StateWriter::new();
        assert!(write_savegame(&timeline, &BundleRegistry::new(), &mut writer).is_err());
        assert!(writer.is_empty());

        let mut bundles = BundleRegistry::new();
        bundles.register::<Chest>(BundleKind(1)).unwrap();
        let mut writer = StateWriter::new();
        write_savegame(&timeline, &bundles, &mut writer).unwrap();

        let restored = Timeline::new();
        assert_eq!(read_savegame(&restored, &bundles, writer.as_slice()).unwrap(), 1);
        let record = restored.snapshot(1).unwrap().records[&ObjectId(4)].clone();
        assert_eq!(record.extra.as_deref().unwrap().downcast_ref::<Chest>(), Some(&chest));
    }
}
