//! ESM framing writer
//!
//! Records and subrecords are written with a zero size placeholder that is
//! patched when the frame is closed. Every payload byte is added to all open
//! frames, so a record's size covers its subrecords including their headers.

use std::io::{Seek, Write};

use super::header::{Header, MasterData};
use super::stream::OutputStream;
use crate::error::{Error, Result};
use crate::formats::common::version::{
    uses_esm_cell_id, uses_limited_size_strings, uses_string_ref_ids,
};
use crate::formats::common::{tags, EsmValue, FormatVersion, RecName, RecordFlags, TextEncoding};
use crate::formats::refid::{RefId, RefIdType};

/// Worldspace name written for exterior cells in the legacy cell identity layout.
pub const DEFAULT_WORLDSPACE: &str = "sys::default";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FrameKind {
    Record,
    Subrecord,
}

#[derive(Debug)]
struct Frame {
    kind: FrameKind,
    name: RecName,
    /// Offset of the size placeholder.
    size_at: u64,
    size: u64,
}

/// Writer for one ESM stream.
pub struct EsmWriter<W: Write + Seek> {
    stream: OutputStream<W>,
    frames: Vec<Frame>,
    header: Header,
    encoding: TextEncoding,
    record_count: u32,
}

impl<W: Write + Seek> EsmWriter<W> {
    pub fn new(stream: W) -> Result<Self> {
        Ok(Self {
            stream: OutputStream::new(stream)?,
            frames: Vec::new(),
            header: Header::default(),
            encoding: TextEncoding::default(),
            record_count: 0,
        })
    }

    #[must_use]
    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    // ==================== Header configuration ====================

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn set_header(&mut self, header: Header) {
        self.header = header;
    }

    pub fn format_version(&self) -> FormatVersion {
        self.header.format_version
    }

    pub fn set_format_version(&mut self, version: FormatVersion) {
        self.header.format_version = version;
    }

    pub fn set_version(&mut self, version: f32) {
        self.header.version = version;
    }

    pub fn set_file_type(&mut self, file_type: u32) {
        self.header.file_type = file_type;
    }

    pub fn set_author(&mut self, author: impl Into<String>) {
        self.header.author = author.into();
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.header.description = description.into();
    }

    /// Record count stored in `HEDR`.
    pub fn set_record_count(&mut self, count: u32) {
        self.header.record_count = count;
    }

    pub fn add_master(&mut self, name: impl Into<String>, size: u64) {
        self.header.masters.push(MasterData {
            name: name.into(),
            size,
        });
    }

    pub fn clear_masters(&mut self) {
        self.header.masters.clear();
    }

    /// Records started since [`EsmWriter::save`], including the file header.
    pub fn record_count(&self) -> u32 {
        self.record_count
    }

    // ==================== Lifecycle ====================

    /// Write the `TES3` file header record.
    pub fn save(&mut self) -> Result<()> {
        self.record_count = 0;
        self.frames.clear();

        self.start_record(tags::TES3, RecordFlags::empty())?;
        let header = self.header.clone();
        header.save(self)?;
        self.end_record(tags::TES3)
    }

    /// Finish writing and hand back the sink. Fails if a frame is still open.
    pub fn close(mut self) -> Result<W> {
        if let Some(frame) = self.frames.last() {
            return Err(Error::UnclosedFrame(frame.name));
        }
        self.stream.flush()?;
        Ok(self.stream.into_inner())
    }

    // ==================== Frames ====================

    pub fn start_record(&mut self, name: RecName, flags: RecordFlags) -> Result<()> {
        if !self.frames.is_empty() {
            return Err(Error::FrameDepthExceeded {
                tag: name,
                open: self.frames.len(),
            });
        }
        self.record_count += 1;

        // The record header is not part of the record's own size.
        self.stream.write_all(name.as_bytes())?;
        let size_at = self.stream.position();
        self.stream.write_all(&0u32.to_le_bytes())?;
        self.stream.write_all(&0u32.to_le_bytes())?;
        self.stream.write_all(&flags.bits().to_le_bytes())?;

        self.frames.push(Frame {
            kind: FrameKind::Record,
            name,
            size_at,
            size: 0,
        });
        Ok(())
    }

    pub fn start_sub_record(&mut self, name: RecName) -> Result<()> {
        if self.frames.iter().any(|f| f.kind == FrameKind::Subrecord) {
            return Err(Error::FrameDepthExceeded {
                tag: name,
                open: self.frames.len(),
            });
        }

        self.write_name(name)?;
        let size_at = self.stream.position();
        self.write_t(&0u32)?;

        self.frames.push(Frame {
            kind: FrameKind::Subrecord,
            name,
            size_at,
            size: 0,
        });
        Ok(())
    }

    /// Close the innermost frame and patch its size.
    pub fn end_record(&mut self, name: RecName) -> Result<()> {
        let Some(frame) = self.frames.pop() else {
            return Err(Error::NoOpenFrame(name));
        };
        if frame.name != name {
            let expected = frame.name;
            self.frames.push(frame);
            return Err(Error::FrameMismatch {
                expected,
                found: name,
            });
        }
        let size = u32::try_from(frame.size).map_err(|_| Error::FrameTooLarge {
            tag: frame.name,
            size: frame.size,
        })?;
        self.stream.patch_u32(frame.size_at, size)?;
        Ok(())
    }

    // ==================== Payload writes ====================

    /// Write raw bytes, counting them toward every open frame.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        for frame in &mut self.frames {
            frame.size += bytes.len() as u64;
        }
        self.stream.write_all(bytes)?;
        Ok(())
    }

    pub fn write_t<T: EsmValue>(&mut self, value: &T) -> Result<()> {
        let mut buf = Vec::with_capacity(T::SIZE);
        value.write_to(&mut buf)?;
        self.write(&buf)
    }

    pub fn write_name(&mut self, name: RecName) -> Result<()> {
        self.write(name.as_bytes())
    }

    /// Subrecord holding exactly one value.
    pub fn write_hn_t<T: EsmValue>(&mut self, name: RecName, value: &T) -> Result<()> {
        self.start_sub_record(name)?;
        self.write_t(value)?;
        self.end_record(name)
    }

    /// Subrecord holding raw bytes.
    pub fn write_hn_bytes(&mut self, name: RecName, bytes: &[u8]) -> Result<()> {
        self.start_sub_record(name)?;
        self.write(bytes)?;
        self.end_record(name)
    }

    /// Deletion marker: a `DELE` subrecord with four zero bytes.
    pub fn write_delete_marker(&mut self) -> Result<()> {
        self.write_hn_t(tags::DELE, &0u32)
    }

    // ==================== Strings ====================

    /// String payload. An empty string is written as a single NUL.
    pub fn write_h_string(&mut self, data: &str) -> Result<()> {
        if data.is_empty() {
            return self.write(&[0]);
        }
        let encoded = self.encoding.encode(data).into_owned();
        self.write(&encoded)
    }

    /// String payload with a NUL terminator.
    pub fn write_hc_string(&mut self, data: &str) -> Result<()> {
        self.write_h_string(data)?;
        if !data.is_empty() && !data.ends_with('\0') {
            self.write(&[0])?;
        }
        Ok(())
    }

    pub fn write_hn_string(&mut self, name: RecName, data: &str) -> Result<()> {
        self.start_sub_record(name)?;
        self.write_h_string(data)?;
        self.end_record(name)
    }

    /// String subrecord NUL padded up to `size` bytes.
    pub fn write_hn_fixed_string(&mut self, name: RecName, data: &str, size: usize) -> Result<()> {
        let encoded = self.encoding.encode(data).into_owned();
        if encoded.len() > size {
            return Err(Error::StringTooLong {
                len: encoded.len(),
                max: size,
            });
        }
        self.start_sub_record(name)?;
        self.write(&encoded)?;
        self.write(&vec![0u8; size - encoded.len()])?;
        self.end_record(name)
    }

    pub fn write_hnc_string(&mut self, name: RecName, data: &str) -> Result<()> {
        self.start_sub_record(name)?;
        self.write_hc_string(data)?;
        self.end_record(name)
    }

    /// Only written when `data` is not empty.
    pub fn write_hno_string(&mut self, name: RecName, data: &str) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.write_hn_string(name, data)
    }

    pub fn write_hnoc_string(&mut self, name: RecName, data: &str) -> Result<()> {
        if data.is_empty() {
            return Ok(());
        }
        self.write_hnc_string(name, data)
    }

    /// Encoded string cut or NUL padded to exactly `size` bytes.
    pub fn write_fixed_size_string(&mut self, data: &str, size: usize) -> Result<()> {
        let mut encoded = self.encoding.encode(data).into_owned();
        encoded.resize(size, 0);
        self.write(&encoded)
    }

    /// Padded to `size` in old files, length prefixed in newer ones.
    pub fn write_maybe_fixed_size_string(&mut self, data: &str, size: usize) -> Result<()> {
        let encoded = self.encoding.encode(data).into_owned();
        if uses_limited_size_strings(self.header.format_version) {
            if encoded.len() > size {
                return Err(Error::StringTooLong {
                    len: encoded.len(),
                    max: size,
                });
            }
            return self.write_fixed_size_string(data, size);
        }
        let len = u32::try_from(encoded.len()).map_err(|_| Error::StringTooLong {
            len: encoded.len(),
            max: u32::MAX as usize,
        })?;
        self.write_t(&len)?;
        self.write(&encoded)
    }

    // ==================== RefIds ====================

    /// RefId filling the rest of the payload. Strings use the unsized form.
    pub fn write_ref_id(&mut self, value: &RefId) -> Result<()> {
        if uses_string_ref_ids(self.header.format_version) {
            let encoded = self.encoding.encode(&value.to_string()).into_owned();
            return self.write(&encoded);
        }
        self.write_tagged_ref_id(value, false)
    }

    /// RefId embedded among other fields. Strings use the length-prefixed form.
    pub fn write_sized_ref_id(&mut self, value: &RefId) -> Result<()> {
        if uses_string_ref_ids(self.header.format_version) {
            let encoded = self.encoding.encode(&value.to_string()).into_owned();
            return self.write(&encoded);
        }
        self.write_tagged_ref_id(value, true)
    }

    fn write_tagged_ref_id(&mut self, value: &RefId, sized: bool) -> Result<()> {
        match value {
            RefId::Empty => self.write_t(&(RefIdType::Empty as u8)),
            RefId::String(text) => {
                let encoded = self.encoding.encode(text).into_owned();
                if sized {
                    let len = u32::try_from(encoded.len()).map_err(|_| Error::StringTooLong {
                        len: encoded.len(),
                        max: u32::MAX as usize,
                    })?;
                    self.write_t(&(RefIdType::SizedString as u8))?;
                    self.write_t(&len)?;
                } else {
                    self.write_t(&(RefIdType::UnsizedString as u8))?;
                }
                self.write(&encoded)
            }
            RefId::FormId(id) => {
                self.write_t(&(RefIdType::FormId as u8))?;
                self.write_t(&(id.index, id.content_file))
            }
            RefId::Generated(value) => {
                self.write_t(&(RefIdType::Generated as u8))?;
                self.write_t(value)
            }
            RefId::Index { record_type, value } => {
                self.write_t(&(RefIdType::Index as u8))?;
                self.write_t(&(*record_type, *value))
            }
            RefId::ExteriorCell { x, y } => {
                self.write_t(&(RefIdType::Esm3ExteriorCell as u8))?;
                self.write_t(&(*x, *y))
            }
        }
    }

    pub fn write_h_ref_id(&mut self, value: &RefId) -> Result<()> {
        if uses_string_ref_ids(self.header.format_version) {
            return self.write_h_string(&value.to_string());
        }
        self.write_ref_id(value)
    }

    pub fn write_hc_ref_id(&mut self, value: &RefId) -> Result<()> {
        if uses_string_ref_ids(self.header.format_version) {
            return self.write_hc_string(&value.to_string());
        }
        self.write_ref_id(value)
    }

    pub fn write_hn_ref_id(&mut self, name: RecName, value: &RefId) -> Result<()> {
        self.start_sub_record(name)?;
        self.write_h_ref_id(value)?;
        self.end_record(name)
    }

    pub fn write_hnc_ref_id(&mut self, name: RecName, value: &RefId) -> Result<()> {
        self.start_sub_record(name)?;
        self.write_hc_ref_id(value)?;
        self.end_record(name)
    }

    /// Only written when `value` is not empty.
    pub fn write_hno_ref_id(&mut self, name: RecName, value: &RefId) -> Result<()> {
        if value.is_empty() {
            return Ok(());
        }
        self.write_hn_ref_id(name, value)
    }

    pub fn write_hnoc_ref_id(&mut self, name: RecName, value: &RefId) -> Result<()> {
        if value.is_empty() {
            return Ok(());
        }
        self.write_hnc_ref_id(name, value)
    }

    /// RefId subrecord padded to `size` bytes while ids are strings.
    pub fn write_hn_fixed_ref_id(&mut self, name: RecName, value: &RefId, size: usize) -> Result<()> {
        if uses_string_ref_ids(self.header.format_version) {
            return self.write_hn_fixed_string(name, &value.to_string(), size);
        }
        self.write_hn_ref_id(name, value)
    }

    /// RefId counterpart of [`EsmWriter::write_maybe_fixed_size_string`].
    pub fn write_maybe_fixed_size_ref_id(&mut self, value: &RefId, size: usize) -> Result<()> {
        if uses_string_ref_ids(self.header.format_version) {
            return self.write_maybe_fixed_size_string(&value.to_string(), size);
        }
        self.write_sized_ref_id(value)
    }

    /// Cell identity: `SPAC` + optional `CIDX` in old files, `NAME` RefId in new ones.
    pub fn write_cell_id(&mut self, cell: &RefId) -> Result<()> {
        if uses_esm_cell_id(self.header.format_version) {
            if let RefId::ExteriorCell { x, y } = cell {
                self.write_hn_string(tags::SPAC, DEFAULT_WORLDSPACE)?;
                return self.write_hn_t(tags::CIDX, &(*x, *y));
            }
            return self.write_hn_string(tags::SPAC, &cell.to_string());
        }
        self.write_hn_ref_id(tags::NAME, cell)
    }
}
