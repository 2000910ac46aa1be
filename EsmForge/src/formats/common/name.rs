//! Four-character record and subrecord tags

use std::fmt;
use std::str::FromStr;

use serde::{Serialize, Serializer};

use crate::error::Error;

/// A four-byte tag naming a record or subrecord (`TES3`, `HEDR`, `DELE`, ...).
///
/// Stored as the raw bytes in file order. Shorter names are NUL padded.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct RecName([u8; 4]);

impl RecName {
    /// Tag from its four bytes.
    pub const fn new(bytes: &[u8; 4]) -> Self {
        Self(*bytes)
    }

    /// Tag from its little-endian integer form.
    pub const fn from_u32(value: u32) -> Self {
        Self(value.to_le_bytes())
    }

    /// Little-endian integer form of the tag.
    pub const fn to_u32(self) -> u32 {
        u32::from_le_bytes(self.0)
    }

    pub const fn as_bytes(&self) -> &[u8; 4] {
        &self.0
    }

    /// True for the all-zero tag a reader holds before its first read.
    pub const fn is_empty(&self) -> bool {
        self.to_u32() == 0
    }
}

impl fmt::Display for RecName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.0.iter().position(|&b| b == 0).unwrap_or(4);
        f.write_str(&String::from_utf8_lossy(&self.0[..len]))
    }
}

impl fmt::Debug for RecName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RecName({self})")
    }
}

impl FromStr for RecName {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = s.as_bytes();
        if bytes.is_empty() || bytes.len() > 4 || bytes.contains(&0) {
            return Err(Error::InvalidTag(s.to_string()));
        }
        let mut out = [0u8; 4];
        out[..bytes.len()].copy_from_slice(bytes);
        Ok(Self(out))
    }
}

impl Serialize for RecName {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Well-known tags.
pub mod tags {
    use super::RecName;

    // Records
    pub const TES3: RecName = RecName::new(b"TES3");
    pub const CELL: RecName = RecName::new(b"CELL");
    pub const LAND: RecName = RecName::new(b"LAND");
    pub const DIAL: RecName = RecName::new(b"DIAL");
    pub const INFO: RecName = RecName::new(b"INFO");

    // File header
    pub const FORM: RecName = RecName::new(b"FORM");
    pub const HEDR: RecName = RecName::new(b"HEDR");
    pub const MAST: RecName = RecName::new(b"MAST");
    pub const DATA: RecName = RecName::new(b"DATA");

    // Shared subrecords
    pub const NAME: RecName = RecName::new(b"NAME");
    pub const DELE: RecName = RecName::new(b"DELE");
    pub const INTV: RecName = RecName::new(b"INTV");

    // Cell identity
    pub const SPAC: RecName = RecName::new(b"SPAC");
    pub const CIDX: RecName = RecName::new(b"CIDX");

    // Cell and references
    pub const WHGT: RecName = RecName::new(b"WHGT");
    pub const AMBI: RecName = RecName::new(b"AMBI");
    pub const RGNN: RecName = RecName::new(b"RGNN");
    pub const NAM0: RecName = RecName::new(b"NAM0");
    pub const NAM5: RecName = RecName::new(b"NAM5");
    pub const FRMR: RecName = RecName::new(b"FRMR");
    pub const MVRF: RecName = RecName::new(b"MVRF");
    pub const CNDT: RecName = RecName::new(b"CNDT");
    pub const XSCL: RecName = RecName::new(b"XSCL");

    // Land
    pub const VNML: RecName = RecName::new(b"VNML");
    pub const VHGT: RecName = RecName::new(b"VHGT");
    pub const WNAM: RecName = RecName::new(b"WNAM");
    pub const VCLR: RecName = RecName::new(b"VCLR");
    pub const VTEX: RecName = RecName::new(b"VTEX");

    // Dialogue info
    pub const INAM: RecName = RecName::new(b"INAM");
    pub const PNAM: RecName = RecName::new(b"PNAM");
    pub const NNAM: RecName = RecName::new(b"NNAM");
}
