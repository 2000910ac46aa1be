//! Record types
//!
//! Only the records that take part in load-order resolution are modelled:
//! cells with their references, landscape, and dialogue topics with their
//! ordered infos. Subrecords a record does not interpret are kept verbatim so
//! saving reproduces them.

pub mod cell;
pub mod dialogue;
pub mod land;

use std::io::{Seek, Write};

use crate::error::Result;
use crate::formats::common::RecName;
use crate::formats::esm::{EsmReader, EsmWriter};

pub use cell::{Cell, CellRef, GetNextRefMode, MovedCellRef, NextRef, RefNum};
pub use dialogue::{DialInfo, Dialogue, DialogueType, InfoIter, InfoOrder};
pub use land::{Land, LandData, LandDataTypes};

/// A loaded record and whether it carried the deletion marker.
#[derive(Debug, Clone)]
pub struct Loaded<T> {
    pub record: T,
    pub is_deleted: bool,
}

/// A record type with a fixed tag that loads from and saves to a framed stream.
pub trait EsmRecord: Sized {
    const TAG: RecName;

    /// Load from a reader positioned after the record header.
    fn load(esm: &mut EsmReader) -> Result<Loaded<Self>>;

    /// Write the subrecords into an open record frame.
    fn save<W: Write + Seek>(&self, esm: &mut EsmWriter<W>, is_deleted: bool) -> Result<()>;
}

/// A subrecord kept as raw bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawSubrecord {
    pub name: RecName,
    pub data: Vec<u8>,
}

impl RawSubrecord {
    /// Read the payload of the subrecord whose name was just read.
    pub fn read(esm: &mut EsmReader) -> Result<Self> {
        let name = esm.sub_name();
        let data = esm.get_h_bytes()?;
        Ok(Self { name, data })
    }

    pub fn write<W: Write + Seek>(&self, esm: &mut EsmWriter<W>) -> Result<()> {
        esm.write_hn_bytes(self.name, &self.data)
    }
}
