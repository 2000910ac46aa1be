//! `CELL` records and the references they contain
//!
//! A cell record starts with its identity (`NAME`, `DATA`), continues with
//! cell-level fields and then lists its references. A reference that moved to
//! another cell is announced by `MVRF` (and optionally `CNDT`) directly before
//! its own `FRMR` block; the pair is always read together.

use std::io::{Seek, Write};

use serde::Serialize;

use super::{EsmRecord, Loaded, RawSubrecord};
use crate::error::Result;
use crate::formats::common::{tags, RecName};
use crate::formats::esm::{EsmReader, EsmWriter, ReaderContext};
use crate::formats::refid::RefId;
use crate::load_order::adjust_ref_num;

/// `DATA` flag bits of a cell.
pub mod cell_flags {
    pub const INTERIOR: i32 = 0x01;
    pub const HAS_WATER: i32 = 0x02;
    pub const NO_SLEEP: i32 = 0x04;
    pub const QUASI_EXTERIOR: i32 = 0x80;
}

const MIN_SCALE: f32 = 0.5;
const MAX_SCALE: f32 = 2.0;

/// Subrecords a reference may carry after its `NAME`.
const REF_FIELDS: [RecName; 17] = [
    RecName::new(b"UNAM"),
    tags::XSCL,
    RecName::new(b"ANAM"),
    RecName::new(b"BNAM"),
    RecName::new(b"XSOL"),
    RecName::new(b"CNAM"),
    RecName::new(b"INDX"),
    RecName::new(b"XCHG"),
    tags::INTV,
    RecName::new(b"NAM9"),
    RecName::new(b"DODT"),
    RecName::new(b"DNAM"),
    RecName::new(b"FLTV"),
    RecName::new(b"KNAM"),
    RecName::new(b"TNAM"),
    tags::DATA,
    tags::NAM0,
];

/// Reference number: an index within the file that created the reference
/// plus that file's position in the load order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct RefNum {
    pub index: u32,
    /// Load-order position, or -1 when not yet resolved.
    pub content_file: i32,
}

impl Default for RefNum {
    fn default() -> Self {
        Self {
            index: 0,
            content_file: -1,
        }
    }
}

impl RefNum {
    pub fn new(index: u32, content_file: i32) -> Self {
        Self { index, content_file }
    }

    pub fn has_content_file(&self) -> bool {
        self.content_file >= 0
    }

    pub fn is_set(&self) -> bool {
        self.index != 0 || self.has_content_file()
    }

    /// Narrow on-disk form: content file in the top byte.
    pub fn to_u32(&self) -> u32 {
        if self.has_content_file() {
            ((self.content_file as u32) << 24) | (self.index & 0x00ff_ffff)
        } else {
            self.index
        }
    }

    /// Read `FRMR` (or `MVRF`) in its narrow or wide layout.
    fn load(esm: &mut EsmReader) -> Result<Self> {
        let size = esm.get_sub_header()?;
        match size {
            4 => Ok(Self::new(esm.get_t()?, -1)),
            8 => {
                let (index, content_file) = esm.get_t::<(u32, i32)>()?;
                Ok(Self::new(index, content_file))
            }
            _ => Err(esm.fail(format!("Unexpected reference number size {size}"))),
        }
    }

    fn save<W: Write + Seek>(&self, esm: &mut EsmWriter<W>, name: RecName, wide: bool) -> Result<()> {
        if wide {
            esm.write_hn_t(name, &(self.index, self.content_file))
        } else {
            esm.write_hn_t(name, &self.to_u32())
        }
    }
}

/// One placed object in a cell.
#[derive(Debug, Clone, Default)]
pub struct CellRef {
    pub ref_num: RefNum,
    pub ref_id: RefId,
    /// `XSCL`, clamped to the range the engine accepts.
    pub scale: Option<f32>,
    /// Other fields, kept verbatim in file order.
    pub fields: Vec<RawSubrecord>,
}

impl CellRef {
    /// Load a reference starting at its `FRMR`. An optional `NAM0` counter
    /// in front of it is skipped.
    pub fn load(esm: &mut EsmReader) -> Result<Loaded<CellRef>> {
        if esm.is_next_sub(tags::NAM0)? {
            esm.skip_h_sub_size(4)?;
        }
        esm.get_sub_name_is(tags::FRMR)?;

        let mut cell_ref = CellRef {
            ref_num: RefNum::load(esm)?,
            ref_id: esm.get_hn_ref_id(tags::NAME)?,
            ..CellRef::default()
        };
        let mut is_deleted = false;

        while esm.has_more_subs() {
            let name = esm.get_sub_name()?;
            if name == tags::DELE {
                esm.skip_h_sub()?;
                is_deleted = true;
            } else if name == tags::XSCL {
                let scale: f32 = esm.get_h_t()?;
                let clamped = scale.clamp(MIN_SCALE, MAX_SCALE);
                if clamped != scale {
                    esm.warn(format!(
                        "reference {} has scale {scale}, clamped to {clamped}",
                        cell_ref.ref_id
                    ));
                }
                cell_ref.scale = Some(clamped);
            } else if REF_FIELDS.contains(&name) {
                cell_ref.fields.push(RawSubrecord::read(esm)?);
            } else {
                esm.cache_sub_name();
                break;
            }
        }

        Ok(Loaded {
            record: cell_ref,
            is_deleted,
        })
    }

    /// Skip one reference without decoding it.
    pub fn skip(esm: &mut EsmReader) -> Result<()> {
        Self::load(esm).map(|_| ())
    }

    pub fn save<W: Write + Seek>(
        &self,
        esm: &mut EsmWriter<W>,
        wide: bool,
        is_deleted: bool,
    ) -> Result<()> {
        self.ref_num.save(esm, tags::FRMR, wide)?;
        esm.write_hn_ref_id(tags::NAME, &self.ref_id)?;
        if is_deleted {
            return esm.write_delete_marker();
        }
        if let Some(scale) = self.scale {
            esm.write_hn_t(tags::XSCL, &scale)?;
        }
        for field in &self.fields {
            field.write(esm)?;
        }
        Ok(())
    }
}

/// Announcement that a reference now lives in another exterior cell.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MovedCellRef {
    pub ref_num: RefNum,
    /// Target cell grid coordinates as stored in `CNDT`.
    pub target: Option<(i32, i32)>,
}

impl MovedCellRef {
    /// Read `MVRF` (already matched) and the optional `CNDT`.
    fn load(esm: &mut EsmReader) -> Result<Self> {
        let mut ref_num = RefNum::load(esm)?;
        adjust_ref_num(&mut ref_num, esm);
        let target = esm.get_hno_t::<(i32, i32)>(tags::CNDT)?;
        Ok(Self { ref_num, target })
    }

    pub fn save<W: Write + Seek>(&self, esm: &mut EsmWriter<W>) -> Result<()> {
        self.ref_num.save(esm, tags::MVRF, false)?;
        if let Some(target) = self.target {
            esm.write_hn_t(tags::CNDT, &target)?;
        }
        Ok(())
    }
}

/// Which references [`Cell::next_ref_with_moved`] decodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum GetNextRefMode {
    #[default]
    LoadAll,
    LoadOnlyMoved,
    LoadOnlyNotMoved,
}

/// One step of reference enumeration with move announcements exposed.
#[derive(Debug, Clone)]
pub struct NextRef {
    /// The reference, or `None` when the mode skipped it.
    pub cell_ref: Option<CellRef>,
    pub is_deleted: bool,
    pub moved: Option<MovedCellRef>,
}

/// An interior or exterior cell.
#[derive(Debug, Clone, Default)]
pub struct Cell {
    pub name: String,
    /// `DATA` flags, see [`cell_flags`].
    pub flags: i32,
    pub x: i32,
    pub y: i32,
    pub water: Option<f32>,
    /// `AMBI` lighting block, kept as stored.
    pub ambient: Option<[u8; 16]>,
    pub region: RefId,
    pub map_color: Option<i32>,
    /// Next free reference index (`NAM0`).
    pub ref_num_counter: u32,
    /// Reference-list positions, one per file that contributed to this cell.
    pub contexts: Vec<ReaderContext>,
}

impl Cell {
    pub fn is_exterior(&self) -> bool {
        self.flags & cell_flags::INTERIOR == 0
    }

    /// Identity used to match this cell across files.
    pub fn cell_id(&self) -> RefId {
        if self.is_exterior() {
            RefId::exterior_cell(self.x, self.y)
        } else {
            RefId::string(self.name.clone())
        }
    }

    /// Load the cell header. With `save_context`, the position of the
    /// reference list is remembered and the rest of the record skipped;
    /// otherwise the reader stays at the first reference.
    pub fn load_with(esm: &mut EsmReader, save_context: bool) -> Result<Loaded<Cell>> {
        let mut cell = Cell::default();
        let is_deleted = cell.load_name_and_data(esm)?;
        if !is_deleted {
            cell.load_cell(esm)?;
        }
        if save_context {
            cell.contexts.push(esm.context()?);
            esm.skip_record()?;
        }
        Ok(Loaded {
            record: cell,
            is_deleted,
        })
    }

    fn load_name_and_data(&mut self, esm: &mut EsmReader) -> Result<bool> {
        let mut is_deleted = false;
        let mut has_data = false;

        while esm.has_more_subs() {
            match esm.get_sub_name()? {
                tags::NAME => self.name = esm.get_h_string()?,
                tags::DATA => {
                    let (flags, x, y) = esm.get_h_t::<(i32, i32, i32)>()?;
                    self.flags = flags;
                    self.x = x;
                    self.y = y;
                    has_data = true;
                }
                tags::DELE => {
                    esm.skip_h_sub()?;
                    is_deleted = true;
                }
                _ => {
                    esm.cache_sub_name();
                    break;
                }
            }
        }

        if !has_data && !is_deleted {
            return Err(esm.fail("Missing DATA subrecord"));
        }
        Ok(is_deleted)
    }

    fn load_cell(&mut self, esm: &mut EsmReader) -> Result<()> {
        while esm.has_more_subs() {
            match esm.get_sub_name()? {
                tags::INTV => {
                    let water: i32 = esm.get_h_t()?;
                    self.water = Some(water as f32);
                }
                tags::WHGT => {
                    let water: f32 = esm.get_h_t()?;
                    if !water.is_finite() {
                        esm.warn(format!("cell {} has invalid water height {water}", self.name));
                    }
                    self.water = Some(water);
                }
                tags::AMBI => self.ambient = Some(esm.get_h_t()?),
                tags::RGNN => self.region = esm.get_ref_id()?,
                tags::NAM5 => self.map_color = Some(esm.get_h_t()?),
                tags::NAM0 => self.ref_num_counter = esm.get_h_t()?,
                _ => {
                    esm.cache_sub_name();
                    break;
                }
            }
        }
        Ok(())
    }

    /// Restore the reader to the reference list of `contexts[index]`.
    pub fn restore(&self, esm: &mut EsmReader, index: usize) -> Result<()> {
        match self.contexts.get(index) {
            Some(ctx) => esm.restore_context(ctx),
            None => Err(esm.fail(format!("Cell {} has no reference list {index}", self.name))),
        }
    }

    /// Next reference that was not moved out of this cell. Moved pairs are
    /// skipped as a unit.
    pub fn next_ref(esm: &mut EsmReader) -> Result<Option<Loaded<CellRef>>> {
        if !esm.has_more_subs() {
            return Ok(None);
        }
        while esm.is_next_sub(tags::MVRF)? {
            MovedCellRef::load(esm)?;
            if !esm.peek_next_sub(tags::FRMR)? {
                return Ok(None);
            }
            CellRef::skip(esm)?;
        }
        if !esm.peek_next_sub(tags::FRMR)? && !esm.peek_next_sub(tags::NAM0)? {
            return Ok(None);
        }
        let mut loaded = CellRef::load(esm)?;
        adjust_ref_num(&mut loaded.record.ref_num, esm);
        Ok(Some(loaded))
    }

    /// Next reference together with its move announcement, if any.
    pub fn next_ref_with_moved(
        esm: &mut EsmReader,
        mode: GetNextRefMode,
    ) -> Result<Option<NextRef>> {
        if !esm.has_more_subs() {
            return Ok(None);
        }
        let moved = if esm.is_next_sub(tags::MVRF)? {
            Some(MovedCellRef::load(esm)?)
        } else {
            None
        };
        if !esm.peek_next_sub(tags::FRMR)? && !esm.peek_next_sub(tags::NAM0)? {
            return Ok(None);
        }

        let wanted = match mode {
            GetNextRefMode::LoadAll => true,
            GetNextRefMode::LoadOnlyMoved => moved.is_some(),
            GetNextRefMode::LoadOnlyNotMoved => moved.is_none(),
        };
        if !wanted {
            CellRef::skip(esm)?;
            return Ok(Some(NextRef {
                cell_ref: None,
                is_deleted: false,
                moved,
            }));
        }

        let Loaded {
            mut record,
            is_deleted,
        } = CellRef::load(esm)?;
        adjust_ref_num(&mut record.ref_num, esm);
        Ok(Some(NextRef {
            cell_ref: Some(record),
            is_deleted,
            moved,
        }))
    }

    /// Write the header subrecords. References are written separately with
    /// [`CellRef::save`] and [`MovedCellRef::save`].
    pub fn save_header<W: Write + Seek>(&self, esm: &mut EsmWriter<W>, is_deleted: bool) -> Result<()> {
        esm.write_hn_string(tags::NAME, &self.name)?;
        esm.write_hn_t(tags::DATA, &(self.flags, self.x, self.y))?;
        if is_deleted {
            return esm.write_delete_marker();
        }

        if let Some(water) = self.water {
            esm.write_hn_t(tags::WHGT, &water)?;
        }
        if let Some(ambient) = self.ambient {
            esm.write_hn_t(tags::AMBI, &ambient)?;
        }
        if !self.region.is_empty() {
            esm.write_hn_ref_id(tags::RGNN, &self.region)?;
        }
        if let Some(color) = self.map_color {
            esm.write_hn_t(tags::NAM5, &color)?;
        }
        if self.ref_num_counter != 0 {
            esm.write_hn_t(tags::NAM0, &self.ref_num_counter)?;
        }
        Ok(())
    }
}

impl EsmRecord for Cell {
    const TAG: RecName = tags::CELL;

    fn load(esm: &mut EsmReader) -> Result<Loaded<Self>> {
        Self::load_with(esm, true)
    }

    fn save<W: Write + Seek>(&self, esm: &mut EsmWriter<W>, is_deleted: bool) -> Result<()> {
        self.save_header(esm, is_deleted)
    }
}
