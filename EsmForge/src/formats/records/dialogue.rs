//! Dialogue topics (`DIAL`) and their responses (`INFO`)
//!
//! Infos of a topic form an ordered list. Each info names its predecessor,
//! and plugins splice new or changed infos into the list of their masters.

use std::collections::HashMap;
use std::io::{Seek, Write};

use serde::Serialize;

use super::{EsmRecord, Loaded, RawSubrecord};
use crate::error::Result;
use crate::formats::common::{tags, RecName};
use crate::formats::esm::{EsmReader, EsmWriter};
use crate::formats::refid::RefId;

/// Kind of a dialogue topic, stored as one byte in `DATA`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[repr(i8)]
pub enum DialogueType {
    #[default]
    Topic = 0,
    Voice = 1,
    Greeting = 2,
    Persuasion = 3,
    Journal = 4,
    Unknown = -1,
}

impl DialogueType {
    pub fn from_i8(value: i8) -> Option<Self> {
        match value {
            0 => Some(Self::Topic),
            1 => Some(Self::Voice),
            2 => Some(Self::Greeting),
            3 => Some(Self::Persuasion),
            4 => Some(Self::Journal),
            -1 => Some(Self::Unknown),
            _ => None,
        }
    }
}

/// One response of a topic.
#[derive(Debug, Clone, Default)]
pub struct DialInfo {
    pub id: RefId,
    /// Info this one follows; empty for the first.
    pub prev: RefId,
    pub next: RefId,
    /// Response text, conditions and scripts, kept verbatim.
    pub fields: Vec<RawSubrecord>,
}

impl EsmRecord for DialInfo {
    const TAG: RecName = tags::INFO;

    fn load(esm: &mut EsmReader) -> Result<Loaded<Self>> {
        let mut info = DialInfo {
            id: esm.get_hn_ref_id(tags::INAM)?,
            prev: esm.get_hn_ref_id(tags::PNAM)?,
            next: esm.get_hn_ref_id(tags::NNAM)?,
            ..DialInfo::default()
        };
        let mut is_deleted = false;

        while esm.has_more_subs() {
            if esm.get_sub_name()? == tags::DELE {
                esm.skip_h_sub()?;
                is_deleted = true;
            } else {
                info.fields.push(RawSubrecord::read(esm)?);
            }
        }

        Ok(Loaded {
            record: info,
            is_deleted,
        })
    }

    fn save<W: Write + Seek>(&self, esm: &mut EsmWriter<W>, is_deleted: bool) -> Result<()> {
        esm.write_hnc_ref_id(tags::INAM, &self.id)?;
        esm.write_hnc_ref_id(tags::PNAM, &self.prev)?;
        esm.write_hnc_ref_id(tags::NNAM, &self.next)?;
        if is_deleted {
            return esm.write_delete_marker();
        }
        for field in &self.fields {
            field.write(esm)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Node {
    info: DialInfo,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Ordered infos of one topic with an index by id.
///
/// Nodes live in an arena and are linked by slot number, so moving an info
/// never invalidates the positions of the others.
#[derive(Debug, Clone, Default)]
pub struct InfoOrder {
    nodes: Vec<Option<Node>>,
    vacant: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
    len: usize,
    /// Slot and pending-delete flag of each indexed info.
    positions: HashMap<RefId, (usize, bool)>,
}

impl InfoOrder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Add an info.
    ///
    /// Without `merge` it is appended. With `merge` an info with the same id
    /// is taken out first, then the new one goes to the front when `prev` is
    /// empty, after `prev` when that is indexed, and to the end otherwise.
    pub fn insert(&mut self, info: DialInfo, is_deleted: bool, merge: bool) {
        if !merge || self.is_empty() {
            let id = info.id.clone();
            let slot = self.link_back(info);
            self.positions.insert(id, (slot, is_deleted));
            return;
        }

        if let Some((slot, _)) = self.positions.remove(&info.id) {
            self.unlink(slot);
        }

        let id = info.id.clone();
        let slot = if info.prev.is_empty() {
            self.link_front(info)
        } else if let Some(&(prev, _)) = self.positions.get(&info.prev) {
            self.link_after(prev, info)
        } else {
            self.link_back(info)
        };
        self.positions.insert(id, (slot, is_deleted));
    }

    /// Remove every info still flagged deleted and drop the id index.
    pub fn clear_deleted(&mut self) {
        let deleted: Vec<usize> = self
            .positions
            .values()
            .filter(|(_, is_deleted)| *is_deleted)
            .map(|(slot, _)| *slot)
            .collect();
        for slot in deleted {
            self.unlink(slot);
        }
        self.positions.clear();
    }

    pub fn get(&self, id: &RefId) -> Option<&DialInfo> {
        let (slot, _) = self.positions.get(id)?;
        self.nodes[*slot].as_ref().map(|node| &node.info)
    }

    /// Pending-delete flag of an indexed info.
    pub fn is_deleted(&self, id: &RefId) -> Option<bool> {
        self.positions.get(id).map(|(_, is_deleted)| *is_deleted)
    }

    pub fn iter(&self) -> InfoIter<'_> {
        InfoIter {
            order: self,
            cursor: self.head,
        }
    }

    fn alloc(&mut self, node: Node) -> usize {
        self.len += 1;
        match self.vacant.pop() {
            Some(slot) => {
                self.nodes[slot] = Some(node);
                slot
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        }
    }

    fn node_mut(&mut self, slot: usize) -> Option<&mut Node> {
        self.nodes.get_mut(slot).and_then(Option::as_mut)
    }

    fn link_back(&mut self, info: DialInfo) -> usize {
        let tail = self.tail;
        let slot = self.alloc(Node {
            info,
            prev: tail,
            next: None,
        });
        match tail.and_then(|t| self.node_mut(t)) {
            Some(node) => node.next = Some(slot),
            None => self.head = Some(slot),
        }
        self.tail = Some(slot);
        slot
    }

    fn link_front(&mut self, info: DialInfo) -> usize {
        let head = self.head;
        let slot = self.alloc(Node {
            info,
            prev: None,
            next: head,
        });
        match head.and_then(|h| self.node_mut(h)) {
            Some(node) => node.prev = Some(slot),
            None => self.tail = Some(slot),
        }
        self.head = Some(slot);
        slot
    }

    fn link_after(&mut self, after: usize, info: DialInfo) -> usize {
        let next = self.nodes[after].as_ref().and_then(|node| node.next);
        let slot = self.alloc(Node {
            info,
            prev: Some(after),
            next,
        });
        if let Some(node) = self.node_mut(after) {
            node.next = Some(slot);
        }
        match next.and_then(|n| self.node_mut(n)) {
            Some(node) => node.prev = Some(slot),
            None => self.tail = Some(slot),
        }
        slot
    }

    fn unlink(&mut self, slot: usize) {
        let Some(node) = self.nodes.get_mut(slot).and_then(Option::take) else {
            return;
        };
        match node.prev.and_then(|p| self.node_mut(p)) {
            Some(prev) => prev.next = node.next,
            None => self.head = node.next,
        }
        match node.next.and_then(|n| self.node_mut(n)) {
            Some(next) => next.prev = node.prev,
            None => self.tail = node.prev,
        }
        self.vacant.push(slot);
        self.len -= 1;
    }
}

/// Infos in list order.
pub struct InfoIter<'a> {
    order: &'a InfoOrder,
    cursor: Option<usize>,
}

impl<'a> Iterator for InfoIter<'a> {
    type Item = &'a DialInfo;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.order.nodes.get(self.cursor?)?.as_ref()?;
        self.cursor = node.next;
        Some(&node.info)
    }
}

impl<'a> IntoIterator for &'a InfoOrder {
    type Item = &'a DialInfo;
    type IntoIter = InfoIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// A dialogue topic and its ordered infos.
#[derive(Debug, Clone, Default)]
pub struct Dialogue {
    pub id: String,
    pub dialogue_type: DialogueType,
    pub infos: InfoOrder,
}

impl Dialogue {
    pub fn ref_id(&self) -> RefId {
        RefId::string(self.id.clone())
    }

    /// Read the `INFO` record at the reader's position into this topic.
    pub fn read_info(&mut self, esm: &mut EsmReader, merge: bool) -> Result<()> {
        let Loaded { record, is_deleted } = DialInfo::load(esm)?;
        self.infos.insert(record, is_deleted, merge);
        Ok(())
    }

    /// Drop infos that ended up deleted once every file is read.
    pub fn clear_deleted_infos(&mut self) {
        self.infos.clear_deleted();
    }

    /// Read `DATA` leniently: the type is the first byte, extra bytes are skipped.
    fn load_type(&mut self, esm: &mut EsmReader) -> Result<()> {
        let size = esm.get_sub_header()?;
        if size == 0 {
            esm.warn(format!("dialogue {} has an empty DATA subrecord", self.id));
            self.dialogue_type = DialogueType::Unknown;
            return Ok(());
        }
        let raw: i8 = esm.get_t()?;
        if size != 1 {
            esm.warn(format!("unexpected DATA size {size} for dialogue {}", self.id));
            esm.skip(size - 1)?;
        }
        self.dialogue_type = DialogueType::from_i8(raw).unwrap_or_else(|| {
            esm.warn(format!("unknown dialogue type {raw} for {}", self.id));
            DialogueType::Unknown
        });
        Ok(())
    }
}

impl EsmRecord for Dialogue {
    const TAG: RecName = tags::DIAL;

    fn load(esm: &mut EsmReader) -> Result<Loaded<Self>> {
        let mut dialogue = Dialogue {
            id: esm.get_hn_string(tags::NAME)?,
            ..Dialogue::default()
        };
        let mut is_deleted = false;

        while esm.has_more_subs() {
            match esm.get_sub_name()? {
                tags::DATA => dialogue.load_type(esm)?,
                tags::DELE => {
                    esm.skip_h_sub()?;
                    dialogue.dialogue_type = DialogueType::Unknown;
                    is_deleted = true;
                }
                other => return Err(esm.fail(format!("Unknown subrecord {other}"))),
            }
        }

        Ok(Loaded {
            record: dialogue,
            is_deleted,
        })
    }

    fn save<W: Write + Seek>(&self, esm: &mut EsmWriter<W>, is_deleted: bool) -> Result<()> {
        esm.write_hnc_string(tags::NAME, &self.id)?;
        if is_deleted {
            return esm.write_delete_marker();
        }
        esm.write_hn_t(tags::DATA, &(self.dialogue_type as i8))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::common::RecordFlags;
    use pretty_assertions::assert_eq;
    use std::io::Cursor;

    fn info(id: &str, prev: &str) -> DialInfo {
        DialInfo {
            id: RefId::string(id),
            prev: RefId::string(prev),
            ..DialInfo::default()
        }
    }

    fn ids(order: &InfoOrder) -> Vec<String> {
        order.iter().map(|i| i.id.to_string()).collect()
    }

    #[test]
    fn test_merge_inserts_after_prev() {
        let mut order = InfoOrder::new();
        order.insert(info("a", ""), false, true);
        order.insert(info("b", "a"), false, true);
        assert_eq!(ids(&order), vec!["a", "b"]);
    }

    #[test]
    fn test_reimport_with_empty_prev_moves_to_front() {
        let mut order = InfoOrder::new();
        order.insert(info("a", ""), false, true);
        order.insert(info("b", "a"), false, true);
        order.insert(info("b", ""), false, true);
        assert_eq!(ids(&order), vec!["b", "a"]);
        assert_eq!(order.len(), 2);
        assert!(order.get(&RefId::string("B")).is_some());
    }

    #[test]
    fn test_unknown_prev_appends() {
        let mut order = InfoOrder::new();
        order.insert(info("a", ""), false, true);
        order.insert(info("c", "missing"), false, true);
        order.insert(info("b", "a"), false, true);
        assert_eq!(ids(&order), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_plain_insert_keeps_file_order() {
        let mut order = InfoOrder::new();
        order.insert(info("c", "b"), false, false);
        order.insert(info("a", ""), false, false);
        order.insert(info("b", "a"), false, false);
        assert_eq!(ids(&order), vec!["c", "a", "b"]);
    }

    #[test]
    fn test_clear_deleted_compacts_and_drops_index() {
        let mut order = InfoOrder::new();
        order.insert(info("a", ""), false, true);
        order.insert(info("b", "a"), true, true);
        order.insert(info("c", "b"), false, true);
        assert_eq!(order.is_deleted(&RefId::string("b")), Some(true));

        order.clear_deleted();
        assert_eq!(ids(&order), vec!["a", "c"]);
        assert!(order.get(&RefId::string("a")).is_none());

        // The index is gone, so "c" no longer resolves and "d" is appended.
        order.insert(info("d", "c"), false, true);
        assert_eq!(ids(&order), vec!["a", "c", "d"]);
    }

    #[test]
    fn test_override_in_place_keeps_neighbours() {
        let mut order = InfoOrder::new();
        for (id, prev) in [("a", ""), ("b", "a"), ("c", "b")] {
            order.insert(info(id, prev), false, true);
        }
        let mut changed = info("b", "a");
        changed.next = RefId::string("c");
        order.insert(changed, false, true);
        assert_eq!(ids(&order), vec!["a", "b", "c"]);
        assert_eq!(order.get(&RefId::string("b")).unwrap().next, RefId::string("c"));
    }

    fn write_record<T: EsmRecord>(record: &T, is_deleted: bool) -> Vec<u8> {
        let mut writer = EsmWriter::new(Cursor::new(Vec::new())).unwrap();
        writer.start_record(T::TAG, RecordFlags::empty()).unwrap();
        record.save(&mut writer, is_deleted).unwrap();
        writer.end_record(T::TAG).unwrap();
        writer.close().unwrap().into_inner()
    }

    fn read_record<T: EsmRecord>(bytes: Vec<u8>) -> Result<Loaded<T>> {
        let mut reader = EsmReader::new();
        reader.open_raw(Box::new(Cursor::new(bytes)), "dialogue.esp")?;
        assert_eq!(reader.get_rec_name()?, T::TAG);
        reader.get_rec_header()?;
        T::load(&mut reader)
    }

    #[test]
    fn test_dialogue_round_trip() {
        let dialogue = Dialogue {
            id: "Background".to_string(),
            dialogue_type: DialogueType::Journal,
            ..Dialogue::default()
        };
        let loaded = read_record::<Dialogue>(write_record(&dialogue, false)).unwrap();
        assert!(!loaded.is_deleted);
        assert_eq!(loaded.record.id, "Background");
        assert_eq!(loaded.record.dialogue_type, DialogueType::Journal);

        let deleted = read_record::<Dialogue>(write_record(&dialogue, true)).unwrap();
        assert!(deleted.is_deleted);
        assert_eq!(deleted.record.dialogue_type, DialogueType::Unknown);
    }

    #[test]
    fn test_odd_dialogue_data_is_tolerated() {
        let mut writer = EsmWriter::new(Cursor::new(Vec::new())).unwrap();
        writer.start_record(tags::DIAL, RecordFlags::empty()).unwrap();
        writer.write_hnc_string(tags::NAME, "Odd").unwrap();
        writer.write_hn_t(tags::DATA, &9i32).unwrap();
        writer.end_record(tags::DIAL).unwrap();

        let loaded = read_record::<Dialogue>(writer.close().unwrap().into_inner()).unwrap();
        assert_eq!(loaded.record.dialogue_type, DialogueType::Unknown);
    }

    #[test]
    fn test_info_round_trip_keeps_fields() {
        let mut original = info("1234", "1233");
        original.next = RefId::string("1235");
        original.fields.push(RawSubrecord {
            name: RecName::new(b"NAME"),
            data: b"Hello there.".to_vec(),
        });
        let loaded = read_record::<DialInfo>(write_record(&original, false)).unwrap();
        assert!(!loaded.is_deleted);
        assert_eq!(loaded.record.id, original.id);
        assert_eq!(loaded.record.prev, original.prev);
        assert_eq!(loaded.record.next, original.next);
        assert_eq!(loaded.record.fields, original.fields);

        let deleted = read_record::<DialInfo>(write_record(&original, true)).unwrap();
        assert!(deleted.is_deleted);
        assert!(deleted.record.fields.is_empty());
    }
}
