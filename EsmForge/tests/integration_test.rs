use esmforge::prelude::*;
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use std::fs::File;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tempfile::{tempdir, TempDir};

use esmforge::formats::records::land::{LAND_NUM_VERTS, LAND_SIZE};
use esmforge::formats::records::GetNextRefMode;

fn init_logging() {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
}

fn write_file(
    path: &Path,
    masters: &[&str],
    body: impl FnOnce(&mut EsmWriter<File>) -> esmforge::Result<()>,
) -> PathBuf {
    let mut writer = EsmWriter::new(File::create(path).unwrap()).unwrap();
    writer.set_author("tests");
    for master in masters {
        writer.add_master(*master, 0);
    }
    writer.save().unwrap();
    body(&mut writer).unwrap();
    writer.close().unwrap();
    path.to_path_buf()
}

fn record<T: EsmRecord>(
    writer: &mut EsmWriter<File>,
    value: &T,
    flags: RecordFlags,
    is_deleted: bool,
) -> esmforge::Result<()> {
    writer.start_record(T::TAG, flags)?;
    value.save(writer, is_deleted)?;
    writer.end_record(T::TAG)
}

fn info(id: &str, prev: &str) -> DialInfo {
    DialInfo {
        id: RefId::string(id),
        prev: RefId::string(prev),
        ..DialInfo::default()
    }
}

fn cell_ref(index: u32, id: &str) -> CellRef {
    CellRef {
        ref_num: RefNum::new(index, -1),
        ref_id: RefId::string(id),
        ..CellRef::default()
    }
}

fn heights() -> [f32; LAND_NUM_VERTS] {
    let mut heights = [0.0f32; LAND_NUM_VERTS];
    for (i, h) in heights.iter_mut().enumerate() {
        *h = ((i % LAND_SIZE) as f32 - (i / LAND_SIZE) as f32) * 16.0;
    }
    heights
}

fn greeting() -> Dialogue {
    Dialogue {
        id: "Greeting".to_string(),
        dialogue_type: DialogueType::Greeting,
        ..Dialogue::default()
    }
}

/// A master with one topic, one cell and one land record.
fn write_master(dir: &TempDir) -> PathBuf {
    write_file(&dir.path().join("Base.esm"), &[], |w| {
        record(w, &greeting(), RecordFlags::empty(), false)?;
        for (id, prev) in [("a", ""), ("b", "a"), ("c", "b")] {
            record(w, &info(id, prev), RecordFlags::empty(), false)?;
        }

        w.start_record(tags::CELL, RecordFlags::empty())?;
        Cell::default().save_header(w, false)?;
        cell_ref(5, "chest").save(w, false, false)?;
        cell_ref(6, "barrel").save(w, false, false)?;
        w.end_record(tags::CELL)?;

        let mut land = Land::default();
        land.set_data(LandData {
            heights: heights(),
            loaded: LandDataTypes::HEIGHTS,
            ..LandData::default()
        });
        record(w, &land, RecordFlags::empty(), false)
    })
}

/// A plugin that edits the master's topic, moves one reference and carries
/// an ignored land record.
fn write_plugin(dir: &TempDir) -> PathBuf {
    write_file(&dir.path().join("Mod.esp"), &["base.ESM"], |w| {
        record(w, &greeting(), RecordFlags::empty(), false)?;
        record(w, &info("d", "a"), RecordFlags::empty(), false)?;
        record(w, &info("b", "a"), RecordFlags::empty(), true)?;

        w.start_record(tags::CELL, RecordFlags::empty())?;
        Cell::default().save_header(w, false)?;
        MovedCellRef {
            ref_num: RefNum::new(0x0100_0005, -1),
            target: Some((1, 1)),
        }
        .save(w)?;
        cell_ref(0x0100_0005, "chest").save(w, false, false)?;
        cell_ref(1, "lamp").save(w, false, false)?;
        w.end_record(tags::CELL)?;

        record(w, &Land::default(), RecordFlags::IGNORED, false)
    })
}

fn info_ids(dialogue: &Dialogue) -> Vec<String> {
    dialogue.infos.iter().map(|i| i.id.to_string()).collect()
}

#[test]
fn test_load_order_merges_plugin_into_master() {
    init_logging();
    let dir = tempdir().unwrap();
    let paths = vec![write_master(&dir), write_plugin(&dir)];
    let pool = ReaderPool::default();
    let content = load_content(&paths, &pool).unwrap();

    assert_eq!(content.files.len(), 2);
    assert_eq!(content.files[1].parents, vec![0]);

    let counts: Vec<(String, usize)> = content
        .record_counts
        .iter()
        .map(|(name, count)| (name.to_string(), *count))
        .collect();
    assert_eq!(
        counts,
        vec![
            ("DIAL".to_string(), 2),
            ("INFO".to_string(), 5),
            ("CELL".to_string(), 2),
            ("LAND".to_string(), 2),
        ]
    );

    let topic = content.dialogue("GREETING").unwrap();
    assert_eq!(topic.dialogue_type, DialogueType::Greeting);
    assert_eq!(info_ids(topic), vec!["a", "d", "c"]);

    assert_eq!(content.moved_refs.len(), 1);
    assert_eq!(content.moved_refs[0].ref_num, RefNum::new(5, 0));
    assert_eq!(content.moved_refs[0].target, Some((1, 1)));

    let cell = &content.cells[&RefId::exterior_cell(0, 0)];
    assert_eq!(cell.contexts.len(), 2);
}

#[test]
fn test_cell_contexts_replay_each_file() {
    let dir = tempdir().unwrap();
    let paths = vec![write_master(&dir), write_plugin(&dir)];
    let content = load_content(&paths, &ReaderPool::default()).unwrap();
    let cell = &content.cells[&RefId::exterior_cell(0, 0)];

    let mut reader = EsmReader::new();
    let mut refs = Vec::new();
    for index in 0..cell.contexts.len() {
        cell.restore(&mut reader, index).unwrap();
        while let Some(loaded) = Cell::next_ref(&mut reader).unwrap() {
            refs.push((loaded.record.ref_id.to_string(), loaded.record.ref_num));
        }
    }

    assert_eq!(
        refs,
        vec![
            ("chest".to_string(), RefNum::new(5, 0)),
            ("barrel".to_string(), RefNum::new(6, 0)),
            ("lamp".to_string(), RefNum::new(1, 1)),
        ]
    );

    // The moved pair is only visible through the moved-aware enumeration.
    cell.restore(&mut reader, 1).unwrap();
    let next = Cell::next_ref_with_moved(&mut reader, GetNextRefMode::LoadAll)
        .unwrap()
        .unwrap();
    assert_eq!(next.moved.unwrap().ref_num, RefNum::new(5, 0));
    assert_eq!(next.cell_ref.unwrap().ref_num, RefNum::new(5, 0));
}

#[test]
fn test_land_heights_load_after_reader_is_gone() {
    let dir = tempdir().unwrap();
    let paths = vec![write_master(&dir), write_plugin(&dir)];
    let mut content = {
        let pool = ReaderPool::new(1);
        load_content(&paths, &pool).unwrap()
    };

    let land = content.lands.get_mut(&(0, 0)).unwrap();
    assert!(land.data_types.contains(LandDataTypes::HEIGHTS));
    assert!(land.data().is_none());

    land.load_data(LandDataTypes::HEIGHTS).unwrap();
    let data = land.data().unwrap();
    assert_eq!(data.heights[..], heights()[..]);
    assert_eq!(data.min_height, -1024.0);
    assert_eq!(data.max_height, 1024.0);
}

#[test]
fn test_small_pool_loads_same_content() {
    let dir = tempdir().unwrap();
    let paths = vec![write_master(&dir), write_plugin(&dir)];

    let wide = load_content(&paths, &ReaderPool::default()).unwrap();
    let pool = ReaderPool::new(1);
    let narrow = load_content(&paths, &pool).unwrap();

    // Idle readers are only closed when a later slot needs room.
    assert_eq!(pool.len(), 2);
    assert_eq!(pool.state_of(0), Some(ReaderState::Free));
    assert_eq!(pool.state_of(1), Some(ReaderState::Free));
    assert_eq!(narrow.files[1].parents, wide.files[1].parents);
    assert_eq!(
        info_ids(narrow.dialogue("greeting").unwrap()),
        info_ids(wide.dialogue("greeting").unwrap())
    );
}

#[test]
fn test_missing_master_maps_to_own_slot() {
    let dir = tempdir().unwrap();
    let plugin = write_plugin(&dir);
    let content = load_content(&[plugin], &ReaderPool::default()).unwrap();
    assert_eq!(content.files[0].parents, vec![0]);
    assert_eq!(content.moved_refs.len(), 1);
    assert_eq!(content.moved_refs[0].ref_num, RefNum::new(5, 0));
}

#[cfg(feature = "cli")]
#[test]
fn test_rewrite_is_byte_identical() {
    use esmforge::cli::commands::rewrite::rewrite_file;

    let dir = tempdir().unwrap();
    let source = write_master(&dir);
    let destination = dir.path().join("copy.esm");
    let records = rewrite_file(&source, &destination, TextEncoding::default()).unwrap();

    assert_eq!(records, 6);
    assert_eq!(
        std::fs::read(&source).unwrap(),
        std::fs::read(&destination).unwrap()
    );
}

fn arb_tag() -> impl Strategy<Value = RecName> {
    "[A-Z0-9_]{4}".prop_map(|s| s.parse().unwrap())
}

type Records = Vec<(RecName, u32, Vec<(RecName, Vec<u8>)>)>;

fn arb_records() -> impl Strategy<Value = Records> {
    let sub = (arb_tag(), proptest::collection::vec(any::<u8>(), 0..48));
    let rec = (
        arb_tag(),
        any::<u32>(),
        proptest::collection::vec(sub, 0..6),
    );
    proptest::collection::vec(rec, 0..8)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_framing_round_trip(records in arb_records()) {
        let mut writer = EsmWriter::new(Cursor::new(Vec::new())).unwrap();
        writer.save().unwrap();
        for (name, flags, subs) in &records {
            writer.start_record(*name, RecordFlags::from_bits_retain(*flags)).unwrap();
            for (sub, payload) in subs {
                writer.write_hn_bytes(*sub, payload).unwrap();
            }
            writer.end_record(*name).unwrap();
        }
        let bytes = writer.close().unwrap().into_inner();

        let mut reader = EsmReader::new();
        reader.open(Box::new(Cursor::new(bytes)), "generated.esp").unwrap();
        let mut read = Vec::new();
        while reader.has_more_recs() {
            let name = reader.get_rec_name().unwrap();
            let flags = reader.get_rec_header().unwrap();
            let mut subs = Vec::new();
            while reader.has_more_subs() {
                let sub = reader.get_sub_name().unwrap();
                subs.push((sub, reader.get_h_bytes().unwrap()));
            }
            read.push((name, flags.bits(), subs));
        }
        prop_assert_eq!(read, records);
    }
}
