//! ESM file formats
//!
//! - `common` - tags, flags, versions, encodings and fixed-size values
//! - `refid` - record identifiers and their text forms
//! - `esm` - the framing reader and writer plus the `TES3` file header
//! - `records` - cell, land and dialogue records

pub mod common;
pub mod esm;
pub mod records;
pub mod refid;
