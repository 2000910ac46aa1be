//! Text forms of `RefId`: the debug string and the stable serialized text

use std::fmt::Write as _;

use super::{FormId, RefId};
use crate::error::{Error, Result};
use crate::formats::common::RecName;

const FORM_ID_PREFIX: &str = "FormId:0x";
const GENERATED_PREFIX: &str = "Generated:0x";
const INDEX_PREFIX: &str = "Index:";
const EXTERIOR_CELL_PREFIX: &str = "Esm3ExteriorCell:";

impl RefId {
    /// Unambiguous form for logs: the variant is always visible and control
    /// characters in string ids are escaped as `\xNN`.
    pub fn to_debug_string(&self) -> String {
        match self {
            RefId::Empty => "Empty{}".to_string(),
            RefId::String(value) => {
                let mut out = String::with_capacity(value.len() + 2);
                out.push('"');
                for c in value.chars() {
                    if c.is_ascii_control() {
                        let _ = write!(out, "\\x{:x}", c as u32);
                    } else {
                        out.push(c);
                    }
                }
                out.push('"');
                out
            }
            RefId::FormId(id) => format!("FormId:{:#x}", id.to_u64()),
            RefId::Generated(value) => format!("Generated:{value:#x}"),
            RefId::Index { record_type, value } => format!("Index:{record_type}:{value:#x}"),
            RefId::ExteriorCell { x, y } => format!("Esm3ExteriorCell:{x}:{y}"),
        }
    }

    /// Stable text form, parsed back by [`RefId::deserialize_text`].
    /// String ids are lowercased.
    pub fn serialize_text(&self) -> String {
        match self {
            RefId::Empty => String::new(),
            RefId::String(value) => value.to_ascii_lowercase(),
            RefId::FormId(id) => format!("{FORM_ID_PREFIX}{:x}", id.to_u64()),
            RefId::Generated(value) => format!("{GENERATED_PREFIX}{value:x}"),
            RefId::Index { record_type, value } => {
                format!("{INDEX_PREFIX}{record_type}:0x{value:x}")
            }
            RefId::ExteriorCell { x, y } => format!("{EXTERIOR_CELL_PREFIX}{x}:{y}"),
        }
    }

    /// Parse the output of [`RefId::serialize_text`]. Text without a known
    /// prefix is a string id.
    pub fn deserialize_text(text: &str) -> Result<RefId> {
        let invalid = || Error::InvalidRefIdText(text.to_string());

        if let Some(hex) = text.strip_prefix(FORM_ID_PREFIX) {
            let packed = u64::from_str_radix(hex, 16).map_err(|_| invalid())?;
            return RefId::try_from(FormId::from_u64(packed));
        }
        if let Some(hex) = text.strip_prefix(GENERATED_PREFIX) {
            let value = u64::from_str_radix(hex, 16).map_err(|_| invalid())?;
            return Ok(RefId::Generated(value));
        }
        if let Some(rest) = text.strip_prefix(INDEX_PREFIX) {
            let (tag, hex) = rest.split_once(":0x").ok_or_else(invalid)?;
            let record_type: RecName = tag.parse().map_err(|_| invalid())?;
            let value = u32::from_str_radix(hex, 16).map_err(|_| invalid())?;
            return Ok(RefId::Index { record_type, value });
        }
        if let Some(rest) = text.strip_prefix(EXTERIOR_CELL_PREFIX) {
            let (x, y) = rest.split_once(':').ok_or_else(invalid)?;
            let x = x.parse().map_err(|_| invalid())?;
            let y = y.parse().map_err(|_| invalid())?;
            return Ok(RefId::ExteriorCell { x, y });
        }
        Ok(RefId::string(text))
    }
}
