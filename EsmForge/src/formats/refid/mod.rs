//! Record identifiers
//!
//! A [`RefId`] names a record. Old files only know string ids; newer files
//! write a tagged binary form that also carries numeric ids. Binary decoding
//! lives in the reader (`EsmReader::get_ref_id`), encoding in the writer.

mod text;

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Serialize, Serializer};

use crate::error::Error;
use crate::formats::common::RecName;

/// Numeric record id: an index inside a content file plus that file's number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct FormId {
    pub index: u32,
    pub content_file: i32,
}

impl FormId {
    pub const fn new(index: u32, content_file: i32) -> Self {
        Self { index, content_file }
    }

    /// Index 0 means "no record", whatever the content file.
    pub const fn is_zero(&self) -> bool {
        self.index == 0
    }

    pub const fn has_content_file(&self) -> bool {
        self.content_file >= 0
    }

    /// Packed form: content file in the high bits, 24-bit index in the low bits.
    pub fn to_u64(self) -> u64 {
        (u64::from(self.content_file as u32) << 24) | u64::from(self.index)
    }

    pub fn from_u64(value: u64) -> Self {
        Self {
            index: (value & 0x00ff_ffff) as u32,
            content_file: (value >> 24) as i32,
        }
    }
}

/// Discriminator byte of the tagged binary RefId form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RefIdType {
    Empty = 0,
    /// `u32` length, then that many bytes; the subrecord may be larger.
    SizedString = 1,
    /// The rest of the subrecord is the string.
    UnsizedString = 2,
    FormId = 3,
    Generated = 4,
    Index = 5,
    Esm3ExteriorCell = 6,
}

impl RefIdType {
    pub fn from_u8(value: u8) -> Option<Self> {
        Some(match value {
            0 => RefIdType::Empty,
            1 => RefIdType::SizedString,
            2 => RefIdType::UnsizedString,
            3 => RefIdType::FormId,
            4 => RefIdType::Generated,
            5 => RefIdType::Index,
            6 => RefIdType::Esm3ExteriorCell,
            _ => return None,
        })
    }
}

/// Identifier of a record.
///
/// String ids compare, hash and order ASCII case-insensitively. Across
/// variants the order is `Empty < String < FormId < Generated < Index < ExteriorCell`.
#[derive(Clone, Default)]
pub enum RefId {
    #[default]
    Empty,
    String(String),
    FormId(FormId),
    Generated(u64),
    Index { record_type: RecName, value: u32 },
    ExteriorCell { x: i32, y: i32 },
}

impl RefId {
    /// String id. The empty string is the empty id.
    pub fn string(value: impl Into<String>) -> Self {
        let value = value.into();
        if value.is_empty() {
            RefId::Empty
        } else {
            RefId::String(value)
        }
    }

    pub const fn generated(value: u64) -> Self {
        RefId::Generated(value)
    }

    pub const fn index(record_type: RecName, value: u32) -> Self {
        RefId::Index { record_type, value }
    }

    pub const fn exterior_cell(x: i32, y: i32) -> Self {
        RefId::ExteriorCell { x, y }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, RefId::Empty)
    }

    /// The string of a string id.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            RefId::String(value) => Some(value),
            _ => None,
        }
    }

    /// Discriminator used when writing the tagged form. Strings report the unsized form.
    pub fn ref_id_type(&self) -> RefIdType {
        match self {
            RefId::Empty => RefIdType::Empty,
            RefId::String(_) => RefIdType::UnsizedString,
            RefId::FormId(_) => RefIdType::FormId,
            RefId::Generated(_) => RefIdType::Generated,
            RefId::Index { .. } => RefIdType::Index,
            RefId::ExteriorCell { .. } => RefIdType::Esm3ExteriorCell,
        }
    }

    fn variant_rank(&self) -> u8 {
        match self {
            RefId::Empty => 0,
            RefId::String(_) => 1,
            RefId::FormId(_) => 2,
            RefId::Generated(_) => 3,
            RefId::Index { .. } => 4,
            RefId::ExteriorCell { .. } => 5,
        }
    }
}

impl TryFrom<FormId> for RefId {
    type Error = Error;

    fn try_from(id: FormId) -> Result<Self, Self::Error> {
        if id.is_zero() {
            return Ok(RefId::Empty);
        }
        if !id.has_content_file() {
            return Err(Error::GeneratedFormId {
                index: id.index,
                content_file: id.content_file,
            });
        }
        Ok(RefId::FormId(id))
    }
}

impl From<&str> for RefId {
    fn from(value: &str) -> Self {
        RefId::string(value)
    }
}

impl PartialEq for RefId {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (RefId::Empty, RefId::Empty) => true,
            (RefId::String(a), RefId::String(b)) => a.eq_ignore_ascii_case(b),
            (RefId::FormId(a), RefId::FormId(b)) => a == b,
            (RefId::Generated(a), RefId::Generated(b)) => a == b,
            (
                RefId::Index { record_type: ta, value: va },
                RefId::Index { record_type: tb, value: vb },
            ) => ta == tb && va == vb,
            (RefId::ExteriorCell { x: xa, y: ya }, RefId::ExteriorCell { x: xb, y: yb }) => {
                xa == xb && ya == yb
            }
            _ => false,
        }
    }
}

impl Eq for RefId {}

impl Hash for RefId {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.variant_rank().hash(state);
        match self {
            RefId::Empty => {}
            RefId::String(value) => {
                value.len().hash(state);
                for byte in value.bytes() {
                    byte.to_ascii_lowercase().hash(state);
                }
            }
            RefId::FormId(id) => id.hash(state),
            RefId::Generated(value) => value.hash(state),
            RefId::Index { record_type, value } => {
                record_type.hash(state);
                value.hash(state);
            }
            RefId::ExteriorCell { x, y } => {
                x.hash(state);
                y.hash(state);
            }
        }
    }
}

impl Ord for RefId {
    fn cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (RefId::String(a), RefId::String(b)) => a
                .bytes()
                .map(|b| b.to_ascii_lowercase())
                .cmp(b.bytes().map(|b| b.to_ascii_lowercase())),
            (RefId::FormId(a), RefId::FormId(b)) => a.cmp(b),
            (RefId::Generated(a), RefId::Generated(b)) => a.cmp(b),
            (
                RefId::Index { record_type: ta, value: va },
                RefId::Index { record_type: tb, value: vb },
            ) => (ta.to_u32(), va).cmp(&(tb.to_u32(), vb)),
            (RefId::ExteriorCell { x: xa, y: ya }, RefId::ExteriorCell { x: xb, y: yb }) => {
                (xa, ya).cmp(&(xb, yb))
            }
            _ => self.variant_rank().cmp(&other.variant_rank()),
        }
    }
}

impl PartialOrd for RefId {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for RefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RefId::Empty => Ok(()),
            RefId::String(value) => f.write_str(value),
            RefId::FormId(id) => write!(f, "{:#x}", id.to_u64()),
            RefId::Generated(value) => write!(f, "{value:#x}"),
            RefId::Index { record_type, value } => write!(f, "{record_type}:{value:#x}"),
            RefId::ExteriorCell { x, y } => write!(f, "#{x} {y}"),
        }
    }
}

impl fmt::Debug for RefId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_debug_string())
    }
}

impl Serialize for RefId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.serialize_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_string_ids_ignore_ascii_case() {
        assert_eq!(RefId::string("FooBar"), RefId::string("foobar"));
        assert_ne!(RefId::string("foo"), RefId::string("bar"));

        let mut set = HashSet::new();
        set.insert(RefId::string("Gold_001"));
        assert!(set.contains(&RefId::string("GOLD_001")));
    }

    #[test]
    fn test_empty_string_is_empty_id() {
        assert_eq!(RefId::string(""), RefId::Empty);
        assert!(RefId::string("").is_empty());
    }

    #[test]
    fn test_order_across_variants() {
        let ids = [
            RefId::Empty,
            RefId::string("zzz"),
            RefId::FormId(FormId::new(1, 0)),
            RefId::generated(0),
            RefId::index(RecName::new(b"ARMO"), 0),
            RefId::exterior_cell(-100, -100),
        ];
        for pair in ids.windows(2) {
            assert!(pair[0] < pair[1], "{:?} !< {:?}", pair[0], pair[1]);
        }
        assert!(RefId::string("ABC") < RefId::string("abd"));
    }

    #[test]
    fn test_zero_form_id_is_empty() {
        assert_eq!(RefId::try_from(FormId::new(0, 0)).unwrap(), RefId::Empty);
        assert_eq!(RefId::try_from(FormId::new(0, -1)).unwrap(), RefId::Empty);
    }

    #[test]
    fn test_generated_form_id_is_rejected() {
        assert!(matches!(
            RefId::try_from(FormId::new(1, -1)),
            Err(Error::GeneratedFormId { index: 1, content_file: -1 })
        ));
    }

    #[test]
    fn test_display() {
        let cases = [
            (RefId::Empty, ""),
            (RefId::string("foo"), "foo"),
            (RefId::FormId(FormId::new(42, 0)), "0x2a"),
            (RefId::FormId(FormId::new(0x1f, 2)), "0x200001f"),
            (RefId::generated(42), "0x2a"),
            (RefId::index(RecName::new(b"ARMO"), 42), "ARMO:0x2a"),
            (RefId::exterior_cell(-13, 42), "#-13 42"),
        ];
        for (id, expected) in cases {
            assert_eq!(id.to_string(), expected);
        }
    }

    #[test]
    fn test_form_id_packing() {
        let id = FormId::new(0x00ff_ffff, i32::MAX);
        assert_eq!(id.to_u64(), 0x7f_ffff_ffff_ffff);
        assert_eq!(FormId::from_u64(id.to_u64()), id);
    }
}
