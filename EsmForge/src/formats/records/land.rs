//! `LAND` records: terrain of one exterior cell
//!
//! Only the cell coordinates and flags are read when the record is loaded.
//! The bulky vertex blocks are located, remembered through a reader context,
//! and decoded on demand by [`Land::load_data`].

use std::io::{Seek, Write};

use bitflags::bitflags;

use super::{EsmRecord, Loaded};
use crate::error::Result;
use crate::formats::common::{tags, RecName};
use crate::formats::esm::{EsmReader, EsmWriter, ReaderContext};

/// Vertices along one side of a cell.
pub const LAND_SIZE: usize = 65;
pub const LAND_NUM_VERTS: usize = LAND_SIZE * LAND_SIZE;
/// Texture slots along one side of a cell.
pub const LAND_TEXTURE_SIZE: usize = 16;
pub const LAND_NUM_TEXTURES: usize = LAND_TEXTURE_SIZE * LAND_TEXTURE_SIZE;
/// World units per stored height step.
pub const HEIGHT_SCALE: f32 = 8.0;
/// Samples along one side of the global map preview.
pub const GLOBAL_MAP_LOD_SIZE_SQRT: usize = 9;
pub const GLOBAL_MAP_LOD_SIZE: usize = GLOBAL_MAP_LOD_SIZE_SQRT * GLOBAL_MAP_LOD_SIZE_SQRT;

/// Offset, one delta per vertex, and three bytes of padding.
const VHGT_SIZE: u32 = 4 + LAND_NUM_VERTS as u32 + 3;

bitflags! {
    /// Vertex blocks present in a record or loaded into [`LandData`].
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct LandDataTypes: u32 {
        const NORMALS = 1;
        const HEIGHTS = 2;
        const GLOBAL_MAP = 4;
        const COLOURS = 8;
        const TEXTURES = 16;
    }
}

/// Decoded vertex blocks.
#[derive(Debug, Clone)]
pub struct LandData {
    pub height_offset: f32,
    pub heights: [f32; LAND_NUM_VERTS],
    pub min_height: f32,
    pub max_height: f32,
    pub normals: [i8; LAND_NUM_VERTS * 3],
    pub colours: [u8; LAND_NUM_VERTS * 3],
    /// Texture indices in row-major order.
    pub textures: [u16; LAND_NUM_TEXTURES],
    /// Padding bytes after the height deltas.
    pub unk1: u8,
    pub unk2: u16,
    /// Blocks decoded so far.
    pub loaded: LandDataTypes,
}

impl Default for LandData {
    fn default() -> Self {
        Self {
            height_offset: 0.0,
            heights: [0.0; LAND_NUM_VERTS],
            min_height: 0.0,
            max_height: 0.0,
            normals: [0; LAND_NUM_VERTS * 3],
            colours: [0; LAND_NUM_VERTS * 3],
            textures: [0; LAND_NUM_TEXTURES],
            unk1: 0,
            unk2: 0,
            loaded: LandDataTypes::empty(),
        }
    }
}

/// Heights rebuilt from a `VHGT` block.
#[derive(Debug, Clone)]
pub struct DecodedHeights {
    pub heights: [f32; LAND_NUM_VERTS],
    pub min_height: f32,
    pub max_height: f32,
}

/// Rebuild absolute heights from the stored offset and per-vertex deltas.
///
/// The first delta of each row is relative to the previous row's first
/// vertex; every other delta is relative to the vertex on its left.
pub fn decode_heights(offset: f32, deltas: &[i8; LAND_NUM_VERTS]) -> DecodedHeights {
    let mut heights = [0.0f32; LAND_NUM_VERTS];
    let mut min_height = f32::MAX;
    let mut max_height = -f32::MAX;

    // Deltas are summed as integers so each vertex rounds only once.
    let mut row_offset = 0i32;
    for y in 0..LAND_SIZE {
        row_offset += i32::from(deltas[y * LAND_SIZE]);
        let mut col_offset = row_offset;
        for x in 0..LAND_SIZE {
            if x > 0 {
                col_offset += i32::from(deltas[y * LAND_SIZE + x]);
            }
            let height = (offset + col_offset as f32) * HEIGHT_SCALE;
            heights[y * LAND_SIZE + x] = height;
            min_height = min_height.min(height);
            max_height = max_height.max(height);
        }
    }

    DecodedHeights {
        heights,
        min_height,
        max_height,
    }
}

/// Encode absolute heights as an offset plus per-vertex deltas.
///
/// Deltas are taken against the already quantised neighbour so rounding
/// error does not accumulate along a row. Steps too steep for a signed byte
/// are clamped with a warning.
pub fn encode_heights(heights: &[f32; LAND_NUM_VERTS]) -> (f32, [i8; LAND_NUM_VERTS]) {
    let mut deltas = [0i8; LAND_NUM_VERTS];
    let mut clamped = 0usize;
    let mut quantise = |steps: f32| -> i8 {
        let rounded = steps.round();
        if rounded > f32::from(i8::MAX) || rounded < f32::from(i8::MIN) {
            clamped += 1;
        }
        rounded.clamp(f32::from(i8::MIN), f32::from(i8::MAX)) as i8
    };

    let offset = heights[0] / HEIGHT_SCALE;
    let steps_at = |index: usize| heights[index] / HEIGHT_SCALE - offset;

    let mut row_start = 0i32;
    for y in 0..LAND_SIZE {
        let first = y * LAND_SIZE;
        let delta = quantise(steps_at(first) - row_start as f32);
        deltas[first] = delta;
        row_start += i32::from(delta);

        let mut previous = row_start;
        for x in 1..LAND_SIZE {
            let delta = quantise(steps_at(first + x) - previous as f32);
            deltas[first + x] = delta;
            previous += i32::from(delta);
        }
    }

    if clamped > 0 {
        tracing::warn!("{clamped} height steps exceed the encodable range and were clamped");
    }
    (offset, deltas)
}

/// Coarse 9x9 height preview used by the global map.
pub fn generate_wnam(heights: &[f32; LAND_NUM_VERTS]) -> [i8; GLOBAL_MAP_LOD_SIZE] {
    let vert_mult = (LAND_SIZE - 1) as f32 / GLOBAL_MAP_LOD_SIZE_SQRT as f32;
    let mut wnam = [0i8; GLOBAL_MAP_LOD_SIZE];
    for row in 0..GLOBAL_MAP_LOD_SIZE_SQRT {
        for col in 0..GLOBAL_MAP_LOD_SIZE_SQRT {
            let y = (row as f32 * vert_mult) as usize;
            let x = (col as f32 * vert_mult) as usize;
            let mut height = heights[y * LAND_SIZE + x];
            height /= if height > 0.0 { 128.0 } else { 16.0 };
            wnam[row * GLOBAL_MAP_LOD_SIZE_SQRT + col] =
                height.clamp(f32::from(i8::MIN), f32::from(i8::MAX)) as i8;
        }
    }
    wnam
}

/// Convert between the file's 4x4 blocks of 4x4 texture slots and row-major
/// order. The mapping is its own inverse.
pub fn transpose_texture_data(input: &[u16; LAND_NUM_TEXTURES]) -> [u16; LAND_NUM_TEXTURES] {
    let mut out = [0u16; LAND_NUM_TEXTURES];
    let mut read_pos = 0;
    for y1 in 0..4 {
        for x1 in 0..4 {
            for y2 in 0..4 {
                for x2 in 0..4 {
                    out[(y1 * 4 + y2) * LAND_TEXTURE_SIZE + (x1 * 4 + x2)] = input[read_pos];
                    read_pos += 1;
                }
            }
        }
    }
    out
}

/// Landscape record of one exterior cell.
#[derive(Debug, Clone, Default)]
pub struct Land {
    pub x: i32,
    pub y: i32,
    /// `DATA` flags word.
    pub flags: i32,
    /// Vertex blocks present in the record.
    pub data_types: LandDataTypes,
    /// Global map preview as stored in the file.
    pub wnam: Option<[i8; GLOBAL_MAP_LOD_SIZE]>,
    /// Position of the first vertex block, for deferred loading.
    pub context: Option<ReaderContext>,
    data: Option<Box<LandData>>,
}

impl Land {
    /// Decoded blocks, if any were loaded.
    pub fn data(&self) -> Option<&LandData> {
        self.data.as_deref()
    }

    pub fn set_data(&mut self, data: LandData) {
        self.data_types |= data.loaded;
        self.data = Some(Box::new(data));
    }

    /// Whether every requested block present in the record is decoded.
    /// `WNAM` is always held in [`Land::wnam`] and counts as loaded.
    pub fn is_data_loaded(&self, flags: LandDataTypes) -> bool {
        let wanted = self.deferred(flags);
        self.data.as_ref().is_some_and(|d| d.loaded.contains(wanted))
    }

    fn deferred(&self, flags: LandDataTypes) -> LandDataTypes {
        (flags & self.data_types).difference(LandDataTypes::GLOBAL_MAP)
    }

    pub fn unload_data(&mut self) {
        self.data = None;
    }

    /// Decode the requested blocks, reopening the source file by name.
    pub fn load_data(&mut self, flags: LandDataTypes) -> Result<()> {
        let mut reader = EsmReader::new();
        self.load_data_with(&mut reader, flags)
    }

    /// Decode the requested blocks using `esm`, which is repositioned.
    /// Blocks that are absent or already loaded are skipped.
    pub fn load_data_with(&mut self, esm: &mut EsmReader, flags: LandDataTypes) -> Result<()> {
        if self.is_data_loaded(flags) {
            return Ok(());
        }
        let wanted = self.deferred(flags);
        let Some(context) = self.context.as_ref() else {
            return Ok(());
        };
        esm.restore_context(context)?;

        let data = self.data.get_or_insert_with(Box::default);
        let missing = wanted.difference(data.loaded);

        if esm.is_next_sub(tags::VNML)? {
            if missing.contains(LandDataTypes::NORMALS) {
                data.normals = esm.get_h_t()?;
                data.loaded |= LandDataTypes::NORMALS;
            } else {
                esm.skip_h_sub()?;
            }
        }
        if esm.is_next_sub(tags::VHGT)? {
            if missing.contains(LandDataTypes::HEIGHTS) {
                let size = esm.get_sub_header()?;
                if size != VHGT_SIZE {
                    return Err(esm.fail(format!(
                        "record size mismatch, requested {VHGT_SIZE}, got {size}"
                    )));
                }
                let offset: f32 = esm.get_t()?;
                let deltas: [i8; LAND_NUM_VERTS] = esm.get_t()?;
                data.unk1 = esm.get_t()?;
                data.unk2 = esm.get_t()?;

                let decoded = decode_heights(offset, &deltas);
                data.height_offset = offset;
                data.heights = decoded.heights;
                data.min_height = decoded.min_height;
                data.max_height = decoded.max_height;
                data.loaded |= LandDataTypes::HEIGHTS;
            } else {
                esm.skip_h_sub()?;
            }
        }
        if esm.is_next_sub(tags::WNAM)? {
            esm.skip_h_sub()?;
        }
        if esm.is_next_sub(tags::VCLR)? {
            if missing.contains(LandDataTypes::COLOURS) {
                data.colours = esm.get_h_t()?;
                data.loaded |= LandDataTypes::COLOURS;
            } else {
                esm.skip_h_sub()?;
            }
        }
        if esm.is_next_sub(tags::VTEX)? {
            if missing.contains(LandDataTypes::TEXTURES) {
                let stored: [u16; LAND_NUM_TEXTURES] = esm.get_h_t()?;
                data.textures = transpose_texture_data(&stored);
                data.loaded |= LandDataTypes::TEXTURES;
            } else {
                esm.skip_h_sub()?;
            }
        }
        Ok(())
    }
}

impl EsmRecord for Land {
    const TAG: RecName = tags::LAND;

    fn load(esm: &mut EsmReader) -> Result<Loaded<Self>> {
        let mut land = Land::default();
        let mut is_deleted = false;
        let mut has_location = false;
        let mut is_loaded = false;

        while !is_loaded && esm.has_more_subs() {
            match esm.get_sub_name()? {
                tags::INTV => {
                    let (x, y) = esm.get_h_t::<(i32, i32)>()?;
                    land.x = x;
                    land.y = y;
                    has_location = true;
                }
                tags::DATA => land.flags = esm.get_h_t()?,
                tags::DELE => {
                    esm.skip_h_sub()?;
                    is_deleted = true;
                }
                _ => {
                    esm.cache_sub_name();
                    is_loaded = true;
                }
            }
        }

        if !has_location {
            return Err(esm.fail("Missing INTV subrecord"));
        }

        land.context = Some(esm.context()?);

        // Note which blocks exist; their contents are read by load_data.
        while esm.has_more_subs() {
            match esm.get_sub_name()? {
                tags::VNML => {
                    esm.skip_h_sub()?;
                    land.data_types |= LandDataTypes::NORMALS;
                }
                tags::VHGT => {
                    esm.skip_h_sub()?;
                    land.data_types |= LandDataTypes::HEIGHTS;
                }
                tags::WNAM => {
                    land.wnam = Some(esm.get_h_t()?);
                    land.data_types |= LandDataTypes::GLOBAL_MAP;
                }
                tags::VCLR => {
                    esm.skip_h_sub()?;
                    land.data_types |= LandDataTypes::COLOURS;
                }
                tags::VTEX => {
                    esm.skip_h_sub()?;
                    land.data_types |= LandDataTypes::TEXTURES;
                }
                other => return Err(esm.fail(format!("Unknown subrecord {other}"))),
            }
        }

        Ok(Loaded {
            record: land,
            is_deleted,
        })
    }

    /// Blocks are written from loaded data; `WNAM` is regenerated from the
    /// heights when they are loaded.
    fn save<W: Write + Seek>(&self, esm: &mut EsmWriter<W>, is_deleted: bool) -> Result<()> {
        esm.write_hn_t(tags::INTV, &(self.x, self.y))?;
        esm.write_hn_t(tags::DATA, &self.flags)?;

        if is_deleted {
            return esm.write_delete_marker();
        }

        let loaded = self.data.as_ref().map_or(LandDataTypes::empty(), |d| d.loaded);
        let present = |flag| self.data_types.contains(flag) && loaded.contains(flag);

        if let Some(data) = self.data.as_deref() {
            if present(LandDataTypes::NORMALS) {
                esm.write_hn_t(tags::VNML, &data.normals)?;
            }
            if present(LandDataTypes::HEIGHTS) {
                let (offset, deltas) = encode_heights(&data.heights);
                esm.start_sub_record(tags::VHGT)?;
                esm.write_t(&offset)?;
                esm.write_t(&deltas)?;
                esm.write_t(&data.unk1)?;
                esm.write_t(&data.unk2)?;
                esm.end_record(tags::VHGT)?;
            }
        }

        if self.data_types.contains(LandDataTypes::GLOBAL_MAP) {
            let wnam = match self.data.as_deref() {
                Some(data) if loaded.contains(LandDataTypes::HEIGHTS) => {
                    Some(generate_wnam(&data.heights))
                }
                _ => self.wnam,
            };
            if let Some(wnam) = wnam {
                esm.write_hn_t(tags::WNAM, &wnam)?;
            }
        }

        if let Some(data) = self.data.as_deref() {
            if present(LandDataTypes::COLOURS) {
                esm.write_hn_t(tags::VCLR, &data.colours)?;
            }
            if present(LandDataTypes::TEXTURES) {
                esm.write_hn_t(tags::VTEX, &transpose_texture_data(&data.textures))?;
            }
        }
        Ok(())
    }
}
