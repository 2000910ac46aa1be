//! `TES3` file header record

use std::io::{Seek, Write};

use serde::Serialize;

use super::{EsmReader, EsmWriter};
use crate::error::Result;
use crate::formats::common::version::DEFAULT_FORMAT_VERSION;
use crate::formats::common::{tags, FormatVersion};

/// Header version written by the original game (1.3).
pub const VER_130: f32 = 1.3;
/// Header version of files from the 1.2 era.
pub const VER_120: f32 = 1.2;

/// Capacity of the author field in old files.
pub const AUTHOR_SIZE: u32 = 32;
/// Capacity of the description field in old files.
pub const DESCRIPTION_SIZE: u32 = 256;

/// Content file type stored in `HEDR`.
pub mod file_type {
    pub const ESP: u32 = 0;
    pub const ESM: u32 = 1;
    pub const ESS: u32 = 32;
}

/// A master file this file depends on.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MasterData {
    pub name: String,
    /// Size of the master when this file was saved.
    pub size: u64,
}

/// Contents of the `TES3` record at the start of every file.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Header {
    pub format_version: FormatVersion,
    pub version: f32,
    pub file_type: u32,
    pub author: String,
    pub description: String,
    pub record_count: u32,
    pub masters: Vec<MasterData>,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            format_version: DEFAULT_FORMAT_VERSION,
            version: VER_130,
            file_type: file_type::ESP,
            author: String::new(),
            description: String::new(),
            record_count: 0,
            masters: Vec::new(),
        }
    }
}

impl Header {
    /// Load from a reader positioned after the `TES3` record header.
    ///
    /// The format version is applied to the reader as soon as `FORM` is read,
    /// since the author and description layout depends on it.
    pub fn load(esm: &mut EsmReader) -> Result<Header> {
        let mut header = Header::default();

        if let Some(version) = esm.get_hno_t::<FormatVersion>(tags::FORM)? {
            header.format_version = version;
        }
        esm.set_format_version(header.format_version);

        if esm.is_next_sub(tags::HEDR)? {
            esm.get_sub_header()?;
            header.version = esm.get_t()?;
            header.file_type = esm.get_t()?;
            header.author = esm.get_maybe_fixed_string_size(AUTHOR_SIZE)?;
            header.description = esm.get_maybe_fixed_string_size(DESCRIPTION_SIZE)?;
            header.record_count = esm.get_t()?;
            let extra = esm.sub_remaining();
            if extra > 0 {
                esm.warn(format!("ignoring {extra} trailing bytes in HEDR"));
                esm.skip(extra)?;
            }
        }

        while esm.is_next_sub(tags::MAST)? {
            let name = esm.get_h_string()?;
            let size = esm.get_hn_t::<u64>(tags::DATA)?;
            header.masters.push(MasterData { name, size });
        }

        Ok(header)
    }

    /// Write the header subrecords into an open `TES3` record.
    pub fn save<W: Write + Seek>(&self, esm: &mut EsmWriter<W>) -> Result<()> {
        if self.format_version > DEFAULT_FORMAT_VERSION {
            esm.write_hn_t(tags::FORM, &self.format_version)?;
        }

        esm.start_sub_record(tags::HEDR)?;
        esm.write_t(&self.version)?;
        esm.write_t(&self.file_type)?;
        esm.write_maybe_fixed_size_string(&self.author, AUTHOR_SIZE as usize)?;
        esm.write_maybe_fixed_size_string(&self.description, DESCRIPTION_SIZE as usize)?;
        esm.write_t(&self.record_count)?;
        esm.end_record(tags::HEDR)?;

        for master in &self.masters {
            esm.write_hnc_string(tags::MAST, &master.name)?;
            esm.write_hn_t(tags::DATA, &master.size)?;
        }
        Ok(())
    }
}
