//! ESM framing reader
//!
//! Walks the record > subrecord structure of a TES3 stream and keeps three
//! byte counters in step: bytes left in the file, in the current record and
//! in the current subrecord. Every payload read goes through the subrecord
//! counter, so a record loader that reads too much fails at the read, and one
//! that reads too little fails when it asks for the next subrecord.

use std::collections::HashMap;
use std::fs::File;
use std::io;
use std::path::{Path, PathBuf};

use super::context::ReaderContext;
use super::header::{Header, MasterData};
use super::stream::{InputStream, ReadSeek};
use crate::error::{Error, ErrorLocation, Result};
use crate::formats::common::version::{
    uses_esm_cell_id, uses_limited_size_strings, uses_string_ref_ids,
};
use crate::formats::common::{tags, EsmValue, FormatVersion, RecName, RecordFlags, TextEncoding};
use crate::formats::refid::{FormId, RefId, RefIdType};

/// Size of a record header after its tag: size, unused word, flags.
const RECORD_HEADER_SIZE: u64 = 12;
/// Smallest payload of a sized-string RefId: type byte plus length.
const SIZED_STRING_MIN_SIZE: u32 = 5;

/// Reader for one ESM/ESP/omwsave stream.
pub struct EsmReader {
    stream: Option<InputStream>,
    pub(crate) ctx: ReaderContext,
    rec_flags: RecordFlags,
    header: Header,
    encoding: TextEncoding,
    file_size: u64,
    content_file_mapping: Option<HashMap<i32, i32>>,
}

impl Default for EsmReader {
    fn default() -> Self {
        Self::new()
    }
}

impl EsmReader {
    pub fn new() -> Self {
        Self {
            stream: None,
            ctx: ReaderContext::default(),
            rec_flags: RecordFlags::empty(),
            header: Header::default(),
            encoding: TextEncoding::default(),
            file_size: 0,
            content_file_mapping: None,
        }
    }

    #[must_use]
    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn set_encoding(&mut self, encoding: TextEncoding) {
        self.encoding = encoding;
    }

    pub fn encoding(&self) -> TextEncoding {
        self.encoding
    }

    // ==================== Opening ====================

    /// Attach a stream without reading anything from it.
    pub fn open_raw(&mut self, source: Box<dyn ReadSeek>, name: impl Into<PathBuf>) -> Result<()> {
        self.close();
        let stream = InputStream::new(source)?;
        self.file_size = stream.len();
        self.ctx.left_file = stream.len();
        self.ctx.filename = name.into();
        self.stream = Some(stream);
        Ok(())
    }

    /// Attach a stream and load its `TES3` file header.
    pub fn open(&mut self, source: Box<dyn ReadSeek>, name: impl Into<PathBuf>) -> Result<()> {
        self.open_raw(source, name)?;

        if self.get_rec_name()? != tags::TES3 {
            return Err(self.fail("Not a valid Morrowind file"));
        }
        self.get_rec_header()?;
        self.header = Header::load(self)?;

        if self.has_more_subs() {
            tracing::debug!(
                "skipping {} unread header bytes in {}",
                self.ctx.left_rec,
                self.ctx.filename.display()
            );
            self.skip_record()?;
        }
        Ok(())
    }

    pub fn open_raw_path<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::open(path)?;
        self.open_raw(Box::new(file), path)
    }

    pub fn open_path<P: AsRef<Path>>(&mut self, path: P) -> Result<()> {
        let path = path.as_ref();
        let file = File::open(path)?;
        tracing::debug!("opening {}", path.display());
        self.open(Box::new(file), path)
    }

    /// Drop the stream and reset accounting. Index and resolved parents stay.
    pub fn close(&mut self) {
        self.stream = None;
        self.ctx.clear();
        self.header = Header::default();
        self.rec_flags = RecordFlags::empty();
        self.file_size = 0;
    }

    pub fn is_open(&self) -> bool {
        self.stream.is_some()
    }

    // ==================== Accessors ====================

    /// Name the stream was opened with.
    pub fn name(&self) -> &Path {
        &self.ctx.filename
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn author(&self) -> &str {
        &self.header.author
    }

    pub fn description(&self) -> &str {
        &self.header.description
    }

    pub fn masters(&self) -> &[MasterData] {
        &self.header.masters
    }

    pub fn record_count(&self) -> u32 {
        self.header.record_count
    }

    pub fn format_version(&self) -> FormatVersion {
        self.header.format_version
    }

    /// Override the format version, e.g. for raw streams without a file header.
    pub fn set_format_version(&mut self, version: FormatVersion) {
        self.header.format_version = version;
    }

    /// Load-order position of this reader.
    pub fn index(&self) -> usize {
        self.ctx.index
    }

    pub fn set_index(&mut self, index: usize) {
        self.ctx.index = index;
    }

    /// Load-order positions of this file's masters, in header order.
    pub fn parent_file_indices(&self) -> &[usize] {
        &self.ctx.parent_file_indices
    }

    /// Remap content file numbers of decoded `FormId`s. Unmapped ids decode as empty.
    pub fn set_content_file_mapping(&mut self, mapping: Option<HashMap<i32, i32>>) {
        self.content_file_mapping = mapping;
    }

    pub fn record_flags(&self) -> RecordFlags {
        self.rec_flags
    }

    pub fn rec_name(&self) -> RecName {
        self.ctx.rec_name
    }

    pub fn sub_name(&self) -> RecName {
        self.ctx.sub_name
    }

    /// Declared size of the current subrecord.
    pub fn sub_size(&self) -> u32 {
        self.ctx.left_sub
    }

    /// Unread bytes of the current subrecord.
    pub fn sub_remaining(&self) -> u32 {
        self.ctx.sub_remaining
    }

    /// Unread bytes of the current record, after the current subrecord.
    pub fn left_rec(&self) -> i64 {
        self.ctx.left_rec
    }

    // ==================== Context ====================

    /// Snapshot of the current position, restorable with [`EsmReader::restore_context`].
    pub fn context(&mut self) -> Result<ReaderContext> {
        let mut ctx = self.ctx.clone();
        ctx.file_pos = match self.stream.as_mut() {
            Some(stream) => stream.position()?,
            None => 0,
        };
        ctx.format_version = self.header.format_version;
        Ok(ctx)
    }

    /// Resume at a snapshot, reopening the file by name if this reader has
    /// another file (or none) open.
    pub fn restore_context(&mut self, ctx: &ReaderContext) -> Result<()> {
        if !self.is_open() || self.ctx.filename != ctx.filename {
            self.open_raw_path(&ctx.filename)?;
        }
        self.ctx = ctx.clone();
        self.header.format_version = ctx.format_version;
        self.stream()?.seek_to(ctx.file_pos)?;
        Ok(())
    }

    // ==================== Records ====================

    pub fn has_more_recs(&self) -> bool {
        self.ctx.left_file > 0
    }

    /// Read the next record tag.
    pub fn get_rec_name(&mut self) -> Result<RecName> {
        if !self.has_more_recs() {
            return Err(self.fail("No more records, getRecName() failed"));
        }
        if self.has_more_subs() || self.ctx.sub_remaining > 0 {
            return Err(self.fail("Previous record contains unread bytes"));
        }
        if self.ctx.left_file < 4 {
            return Err(self.fail("End of file while reading record name"));
        }

        // A subrecord that overran its record leaves left_rec negative; move
        // back to the record boundary before reading the next tag.
        if self.ctx.left_rec < 0 {
            let overread = self.ctx.left_rec;
            self.stream()?.seek_relative(overread)?;
            self.ctx.left_rec = 0;
        }

        self.ctx.rec_name = self.read_raw()?;
        self.ctx.left_file -= 4;
        self.ctx.sub_cached = false;
        Ok(self.ctx.rec_name)
    }

    /// Read the record header after the tag and return its flags.
    pub fn get_rec_header(&mut self) -> Result<RecordFlags> {
        if self.ctx.left_file < RECORD_HEADER_SIZE {
            return Err(self.fail("End of file while reading record header"));
        }
        if self.has_more_subs() {
            return Err(self.fail("Previous record contains unread bytes"));
        }

        let size: u32 = self.read_raw()?;
        let _unused: u32 = self.read_raw()?;
        let flags: u32 = self.read_raw()?;
        self.ctx.left_file -= RECORD_HEADER_SIZE;

        if self.ctx.left_file < u64::from(size) {
            let left_file = self.ctx.left_file;
            return Err(self.size_mismatch(left_file, u64::from(size)));
        }
        self.ctx.left_rec = i64::from(size);
        self.ctx.left_file -= u64::from(size);
        self.ctx.left_sub = 0;
        self.ctx.sub_remaining = 0;
        self.rec_flags = RecordFlags::from_bits_retain(flags);
        Ok(self.rec_flags)
    }

    /// Skip whatever is left of the current record.
    pub fn skip_record(&mut self) -> Result<()> {
        let left = self.ctx.left_rec.max(0) as u64;
        self.stream()?.skip(left)?;
        self.ctx.left_rec = 0;
        self.ctx.sub_remaining = 0;
        self.ctx.sub_cached = false;
        Ok(())
    }

    // ==================== Subrecords ====================

    pub fn has_more_subs(&self) -> bool {
        self.ctx.left_rec > 0
    }

    /// Read the next subrecord tag, or return the peeked one.
    pub fn get_sub_name(&mut self) -> Result<RecName> {
        if self.ctx.sub_cached {
            self.ctx.sub_cached = false;
            return Ok(self.ctx.sub_name);
        }
        self.ensure_sub_consumed()?;
        if self.ctx.left_rec < 4 {
            return Err(self.fail("End of record while reading sub-record name"));
        }
        self.ctx.sub_name = self.read_raw()?;
        self.ctx.left_rec -= 4;
        Ok(self.ctx.sub_name)
    }

    /// Read the next subrecord tag and require it to be `name`.
    pub fn get_sub_name_is(&mut self, name: RecName) -> Result<()> {
        let found = self.get_sub_name()?;
        if found != name {
            return Err(self.fail(format!("Expected subrecord {name} but got {found}")));
        }
        Ok(())
    }

    /// Return the last tag again from the next `get_sub_name`.
    pub fn cache_sub_name(&mut self) {
        self.ctx.sub_cached = true;
    }

    /// Consume the next tag if it is `name`; otherwise leave it peeked.
    pub fn is_next_sub(&mut self, name: RecName) -> Result<bool> {
        if !self.has_more_subs() {
            return Ok(false);
        }
        let found = self.get_sub_name()?;
        self.ctx.sub_cached = found != name;
        Ok(!self.ctx.sub_cached)
    }

    /// Check whether the next tag is `name` without consuming it.
    pub fn peek_next_sub(&mut self, name: RecName) -> Result<bool> {
        if !self.has_more_subs() {
            return Ok(false);
        }
        let found = self.get_sub_name()?;
        self.ctx.sub_cached = true;
        Ok(found == name)
    }

    /// Read the subrecord size. The whole subrecord is charged to the record here.
    pub fn get_sub_header(&mut self) -> Result<u32> {
        self.ensure_sub_consumed()?;
        if self.ctx.left_rec < 4 {
            return Err(self.fail("End of record while reading sub-record header"));
        }
        let size: u32 = self.read_raw()?;
        self.ctx.left_rec -= 4;
        if i64::from(size) > self.ctx.left_rec {
            let left = self.ctx.left_rec;
            return Err(self.fail(format!(
                "Subrecord {} declares {size} bytes but only {left} are left in record {}",
                self.ctx.sub_name, self.ctx.rec_name
            )));
        }
        self.ctx.left_sub = size;
        self.ctx.sub_remaining = size;
        self.ctx.left_rec -= i64::from(size);
        Ok(size)
    }

    /// Skip the current subrecord's header and payload.
    pub fn skip_h_sub(&mut self) -> Result<()> {
        self.get_sub_header()?;
        let size = self.ctx.sub_remaining;
        self.skip(size)
    }

    /// Skip a subrecord that must have exactly `size` bytes.
    pub fn skip_h_sub_size(&mut self, size: u32) -> Result<()> {
        self.skip_h_sub()?;
        if self.ctx.left_sub != size {
            let left_sub = self.ctx.left_sub;
            return Err(self.size_mismatch(u64::from(left_sub), u64::from(size)));
        }
        Ok(())
    }

    /// Skip subrecords until the next tag is `name`, leaving it peeked.
    pub fn skip_h_sub_until(&mut self, name: RecName) -> Result<()> {
        while self.has_more_subs() && !self.is_next_sub(name)? {
            self.ctx.sub_cached = false;
            self.skip_h_sub()?;
        }
        if self.has_more_subs() {
            self.ctx.sub_cached = true;
        }
        Ok(())
    }

    /// Read the whole payload of the next subrecord.
    pub fn get_h_bytes(&mut self) -> Result<Vec<u8>> {
        let size = self.get_sub_header()?;
        let mut buf = vec![0u8; size as usize];
        self.get_exact(&mut buf)?;
        Ok(buf)
    }

    // ==================== Payload reads ====================

    /// Skip bytes of the current subrecord payload.
    pub fn skip(&mut self, count: u32) -> Result<()> {
        self.consume(count)?;
        self.stream()?.skip(u64::from(count))?;
        Ok(())
    }

    /// Fill `buf` from the current subrecord payload.
    pub fn get_exact(&mut self, buf: &mut [u8]) -> Result<()> {
        let count = u32::try_from(buf.len())
            .map_err(|_| self.fail(format!("Read of {} bytes is too large", buf.len())))?;
        self.consume(count)?;
        let result = self.stream()?.read_exact(buf);
        result.map_err(|e| self.io_fail(e))
    }

    /// Read a value from the current subrecord payload.
    pub fn get_t<T: EsmValue>(&mut self) -> Result<T> {
        self.consume(T::SIZE as u32)?;
        self.read_raw()
    }

    /// Read a subrecord whose payload is exactly one `T`.
    pub fn get_h_t<T: EsmValue>(&mut self) -> Result<T> {
        let size = self.get_sub_header()?;
        if size as usize != T::SIZE {
            return Err(self.size_mismatch(u64::from(size), T::SIZE as u64));
        }
        self.get_t()
    }

    /// Read a named subrecord whose payload is exactly one `T`.
    pub fn get_hn_t<T: EsmValue>(&mut self, name: RecName) -> Result<T> {
        self.get_sub_name_is(name)?;
        self.get_h_t()
    }

    /// Like [`EsmReader::get_hn_t`], but the subrecord may be absent.
    pub fn get_hno_t<T: EsmValue>(&mut self, name: RecName) -> Result<Option<T>> {
        if self.is_next_sub(name)? {
            return self.get_h_t().map(Some);
        }
        Ok(None)
    }

    // ==================== Strings ====================

    /// Read `size` payload bytes as text, cut at the first NUL.
    pub fn get_string(&mut self, size: u32) -> Result<String> {
        let mut buf = vec![0u8; size as usize];
        self.get_exact(&mut buf)?;
        let len = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
        Ok(self.encoding.decode(&buf[..len]).into_owned())
    }

    /// Read a subrecord whose whole payload is a string.
    pub fn get_h_string(&mut self) -> Result<String> {
        self.get_sub_header()?;
        if uses_string_ref_ids(self.header.format_version) && self.take_stray_terminator()? {
            return Ok(String::new());
        }
        let size = self.ctx.sub_remaining;
        self.get_string(size)
    }

    pub fn get_hn_string(&mut self, name: RecName) -> Result<String> {
        self.get_sub_name_is(name)?;
        self.get_h_string()
    }

    pub fn get_hno_string(&mut self, name: RecName) -> Result<Option<String>> {
        if self.is_next_sub(name)? {
            return self.get_h_string().map(Some);
        }
        Ok(None)
    }

    pub fn skip_h_string(&mut self) -> Result<()> {
        self.get_sub_header()?;
        if uses_string_ref_ids(self.header.format_version) && self.take_stray_terminator()? {
            return Ok(());
        }
        let size = self.ctx.sub_remaining;
        self.skip(size)
    }

    /// Read a string stored in a field of `size` bytes in old files, or with a
    /// `u32` length prefix in newer ones.
    pub fn get_maybe_fixed_string_size(&mut self, size: u32) -> Result<String> {
        let mut size = size;
        if !uses_limited_size_strings(self.header.format_version) {
            let stored: u32 = self.get_t()?;
            if stored > self.ctx.sub_remaining {
                let remaining = self.ctx.sub_remaining;
                return Err(self.fail(format!(
                    "String does not fit subrecord ({stored} > {remaining})"
                )));
            }
            size = stored;
        }
        self.get_string(size)
    }

    /// Some old plugins declare an empty string subrecord but still store its
    /// NUL terminator. Consume that byte, charging it to the record.
    fn take_stray_terminator(&mut self) -> Result<bool> {
        if self.ctx.left_sub != 0 || !self.has_more_subs() {
            return Ok(false);
        }
        if self.stream()?.peek_u8()? != Some(0) {
            return Ok(false);
        }
        self.ctx.left_rec -= 1;
        let _terminator: u8 = self.read_raw()?;
        Ok(true)
    }

    // ==================== RefIds ====================

    /// Read a subrecord whose whole payload is a RefId.
    pub fn get_ref_id(&mut self) -> Result<RefId> {
        if uses_string_ref_ids(self.header.format_version) {
            return Ok(RefId::string(self.get_h_string()?));
        }
        let size = self.get_sub_header()?;
        self.get_ref_id_impl(size)
    }

    pub fn get_hn_ref_id(&mut self, name: RecName) -> Result<RefId> {
        self.get_sub_name_is(name)?;
        self.get_ref_id()
    }

    /// Optional RefId subrecord; absent reads as the empty id.
    pub fn get_hno_ref_id(&mut self, name: RecName) -> Result<RefId> {
        if self.is_next_sub(name)? {
            return self.get_ref_id();
        }
        Ok(RefId::Empty)
    }

    /// Read a RefId occupying `size` bytes of the current payload.
    pub fn get_ref_id_sized(&mut self, size: u32) -> Result<RefId> {
        if uses_string_ref_ids(self.header.format_version) {
            return Ok(RefId::string(self.get_string(size)?));
        }
        self.get_ref_id_impl(size)
    }

    /// RefId counterpart of [`EsmReader::get_maybe_fixed_string_size`].
    pub fn get_maybe_fixed_ref_id_size(&mut self, size: u32) -> Result<RefId> {
        if uses_string_ref_ids(self.header.format_version) {
            return Ok(RefId::string(self.get_maybe_fixed_string_size(size)?));
        }
        let remaining = self.ctx.sub_remaining;
        self.get_ref_id_impl(remaining)
    }

    pub fn skip_h_ref_id(&mut self) -> Result<()> {
        if uses_string_ref_ids(self.header.format_version) {
            return self.skip_h_string();
        }
        self.skip_h_sub()
    }

    fn get_ref_id_impl(&mut self, size: u32) -> Result<RefId> {
        let type_byte: u8 = self.get_t()?;
        let Some(kind) = RefIdType::from_u8(type_byte) else {
            return Err(self.data_error(format!("Unsupported RefIdType: {type_byte}")));
        };
        match kind {
            RefIdType::Empty => Ok(RefId::Empty),
            RefIdType::SizedString => {
                if size < SIZED_STRING_MIN_SIZE {
                    return Err(self.fail(format!(
                        "Requested RefId record size is too small ({size} < {SIZED_STRING_MIN_SIZE})"
                    )));
                }
                let stored: u32 = self.get_t()?;
                let capacity = size - SIZED_STRING_MIN_SIZE;
                if stored > capacity {
                    return Err(self.fail(format!(
                        "RefId string does not fit subrecord size ({stored} > {capacity})"
                    )));
                }
                Ok(RefId::string(self.get_string(stored)?))
            }
            RefIdType::UnsizedString => {
                if size < 1 {
                    return Err(self.fail("Requested RefId record size is too small (0 < 1)"));
                }
                Ok(RefId::string(self.get_string(size - 1)?))
            }
            RefIdType::FormId => {
                let (index, content_file) = self.get_t::<(u32, i32)>()?;
                let mut id = FormId::new(index, content_file);
                if !self.apply_content_file_mapping(&mut id) {
                    return Ok(RefId::Empty);
                }
                RefId::try_from(id).map_err(|e| self.data_error(e.to_string()))
            }
            RefIdType::Generated => Ok(RefId::Generated(self.get_t()?)),
            RefIdType::Index => {
                let (record_type, value) = self.get_t::<(RecName, u32)>()?;
                Ok(RefId::Index { record_type, value })
            }
            RefIdType::Esm3ExteriorCell => {
                let (x, y) = self.get_t::<(i32, i32)>()?;
                Ok(RefId::ExteriorCell { x, y })
            }
        }
    }

    /// Returns false when a mapping is set and has no entry for the id's file.
    fn apply_content_file_mapping(&self, id: &mut FormId) -> bool {
        let Some(mapping) = &self.content_file_mapping else {
            return true;
        };
        if !id.has_content_file() {
            return true;
        }
        match mapping.get(&id.content_file) {
            Some(&mapped) => {
                id.content_file = mapped;
                true
            }
            None => false,
        }
    }

    /// Read a cell identity: `SPAC` + optional `CIDX` in old files, `NAME` RefId in new ones.
    pub fn get_cell_id(&mut self) -> Result<RefId> {
        if uses_esm_cell_id(self.header.format_version) {
            let worldspace = self.get_hn_string(tags::SPAC)?;
            if let Some((x, y)) = self.get_hno_t::<(i32, i32)>(tags::CIDX)? {
                return Ok(RefId::exterior_cell(x, y));
            }
            return Ok(RefId::string(worldspace));
        }
        self.get_hn_ref_id(tags::NAME)
    }

    // ==================== Errors ====================

    /// Structural error at the current position.
    pub fn fail(&mut self, message: impl Into<String>) -> Error {
        Error::Structural {
            message: message.into(),
            location: Box::new(self.location()),
        }
    }

    /// Data error at the current position.
    pub fn data_error(&mut self, message: impl Into<String>) -> Error {
        Error::Data {
            message: message.into(),
            location: Box::new(self.location()),
        }
    }

    /// Log a survivable anomaly with the current position.
    pub fn warn(&self, message: impl AsRef<str>) {
        tracing::warn!(
            file = %self.ctx.filename.display(),
            record = %self.ctx.rec_name,
            subrecord = %self.ctx.sub_name,
            "{}",
            message.as_ref()
        );
    }

    fn location(&mut self) -> ErrorLocation {
        let offset = self.stream.as_mut().and_then(|s| s.position().ok());
        ErrorLocation {
            file: self.ctx.filename.clone(),
            record: self.ctx.rec_name,
            subrecord: self.ctx.sub_name,
            offset,
        }
    }

    fn size_mismatch(&mut self, actual: u64, requested: u64) -> Error {
        self.fail(format!("record size mismatch, requested {requested}, got {actual}"))
    }

    fn io_fail(&mut self, error: io::Error) -> Error {
        if error.kind() == io::ErrorKind::UnexpectedEof {
            return self.fail("Unexpected end of stream");
        }
        Error::Io(error)
    }

    // ==================== Internals ====================

    fn stream(&mut self) -> Result<&mut InputStream> {
        self.stream.as_mut().ok_or(Error::ReaderNotOpen)
    }

    /// Unaccounted read, for framing fields only.
    fn read_raw<T: EsmValue>(&mut self) -> Result<T> {
        let result = self.stream()?.read_value::<T>();
        result.map_err(|e| self.io_fail(e))
    }

    fn consume(&mut self, count: u32) -> Result<()> {
        if count > self.ctx.sub_remaining {
            let remaining = self.ctx.sub_remaining;
            return Err(self.fail(format!(
                "Read of {count} bytes past the end of subrecord {} ({remaining} left)",
                self.ctx.sub_name
            )));
        }
        self.ctx.sub_remaining -= count;
        Ok(())
    }

    fn ensure_sub_consumed(&mut self) -> Result<()> {
        if self.ctx.sub_remaining > 0 {
            let remaining = self.ctx.sub_remaining;
            return Err(self.fail(format!(
                "Previous subrecord {} has {remaining} unread bytes",
                self.ctx.sub_name
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::common::version::{
        CURRENT_SAVE_GAME_FORMAT_VERSION, DEFAULT_FORMAT_VERSION,
    };
    use crate::formats::esm::EsmWriter;
    use std::io::Cursor;

    const FAKE: RecName = RecName::new(b"FAKE");

    /// Raw record bytes: tag, size, unused, flags, payload.
    fn record(tag: &[u8; 4], flags: u32, payload: &[u8]) -> Vec<u8> {
        let mut out = tag.to_vec();
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(&0u32.to_le_bytes());
        out.extend_from_slice(&flags.to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn sub(tag: &[u8; 4], payload: &[u8]) -> Vec<u8> {
        let mut out = tag.to_vec();
        out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
        out.extend_from_slice(payload);
        out
    }

    fn raw_reader(bytes: Vec<u8>, version: FormatVersion) -> EsmReader {
        let mut reader = EsmReader::new();
        reader.open_raw(Box::new(Cursor::new(bytes)), "test.esp").unwrap();
        reader.set_format_version(version);
        reader
    }

    #[test]
    fn test_walks_records_and_subrecords() {
        let mut payload = sub(b"NAME", b"abc\0");
        payload.extend(sub(b"DATA", &7u32.to_le_bytes()));
        let mut bytes = record(b"FAKE", 0x400, &payload);
        bytes.extend(record(b"NEXT", 0, &[]));

        let mut reader = raw_reader(bytes, DEFAULT_FORMAT_VERSION);
        assert_eq!(reader.get_rec_name().unwrap(), FAKE);
        assert_eq!(reader.get_rec_header().unwrap(), RecordFlags::PERSISTENT);
        assert_eq!(reader.get_hn_string(tags::NAME).unwrap(), "abc");
        assert_eq!(reader.get_hn_t::<u32>(tags::DATA).unwrap(), 7);
        assert!(!reader.has_more_subs());
        assert_eq!(reader.get_rec_name().unwrap(), RecName::new(b"NEXT"));
        reader.get_rec_header().unwrap();
        assert!(!reader.has_more_recs());
        assert!(reader.get_rec_name().is_err());
    }

    #[test]
    fn test_is_next_sub_leaves_mismatch_peeked() {
        let mut payload = sub(b"DATA", &1u32.to_le_bytes());
        payload.extend(sub(b"NAME", b"x"));
        let mut reader = raw_reader(record(b"FAKE", 0, &payload), DEFAULT_FORMAT_VERSION);
        reader.get_rec_name().unwrap();
        reader.get_rec_header().unwrap();

        assert!(!reader.is_next_sub(tags::NAME).unwrap());
        assert!(reader.peek_next_sub(tags::DATA).unwrap());
        assert_eq!(reader.get_sub_name().unwrap(), tags::DATA);
        assert_eq!(reader.get_h_t::<u32>().unwrap(), 1);
        assert!(reader.is_next_sub(tags::NAME).unwrap());
        assert_eq!(reader.get_h_string().unwrap(), "x");
        assert!(!reader.is_next_sub(tags::NAME).unwrap());
    }

    #[test]
    fn test_skip_h_sub_until_leaves_target_peeked() {
        let mut payload = sub(b"AAAA", &[1, 2]);
        payload.extend(sub(b"BBBB", &[3]));
        payload.extend(sub(b"CCCC", &[4, 5, 6, 7]));
        let mut reader = raw_reader(record(b"FAKE", 0, &payload), DEFAULT_FORMAT_VERSION);
        reader.get_rec_name().unwrap();
        reader.get_rec_header().unwrap();

        reader.skip_h_sub_until(RecName::new(b"CCCC")).unwrap();
        assert_eq!(reader.get_hn_t::<u32>(RecName::new(b"CCCC")).unwrap(), 0x0706_0504);
    }

    #[test]
    fn test_subrecord_larger_than_record_is_structural() {
        let mut payload = b"DATA".to_vec();
        payload.extend_from_slice(&100u32.to_le_bytes());
        payload.extend_from_slice(&[0; 4]);
        let mut reader = raw_reader(record(b"FAKE", 0, &payload), DEFAULT_FORMAT_VERSION);
        reader.get_rec_name().unwrap();
        reader.get_rec_header().unwrap();
        reader.get_sub_name().unwrap();
        let err = reader.get_sub_header().unwrap_err();
        assert!(err.is_structural(), "{err}");
    }

    #[test]
    fn test_record_larger_than_file_is_structural() {
        let mut bytes = record(b"FAKE", 0, &[0; 8]);
        bytes.truncate(bytes.len() - 4);
        let mut reader = raw_reader(bytes, DEFAULT_FORMAT_VERSION);
        reader.get_rec_name().unwrap();
        let err = reader.get_rec_header().unwrap_err();
        assert!(err.is_structural());
        assert!(err.reader_message().unwrap().contains("record size mismatch"));
    }

    #[test]
    fn test_unread_subrecord_bytes_are_reported() {
        let mut payload = sub(b"DATA", &[1, 2, 3, 4]);
        payload.extend(sub(b"NAME", b"x"));
        let mut reader = raw_reader(record(b"FAKE", 0, &payload), DEFAULT_FORMAT_VERSION);
        reader.get_rec_name().unwrap();
        reader.get_rec_header().unwrap();
        reader.get_sub_name().unwrap();
        reader.get_sub_header().unwrap();
        let _: u16 = reader.get_t().unwrap();
        assert!(reader.get_sub_name().unwrap_err().is_structural());
    }

    #[test]
    fn test_read_past_subrecord_is_structural() {
        let mut reader = raw_reader(record(b"FAKE", 0, &sub(b"DATA", &[1, 2])), DEFAULT_FORMAT_VERSION);
        reader.get_rec_name().unwrap();
        reader.get_rec_header().unwrap();
        reader.get_sub_name().unwrap();
        let err = reader.get_h_t::<u32>().unwrap_err();
        assert!(err.reader_message().unwrap().contains("requested 4, got 2"));
    }

    #[test]
    fn test_error_message_carries_location() {
        let mut reader = raw_reader(record(b"FAKE", 0, &sub(b"DATA", &[1])), DEFAULT_FORMAT_VERSION);
        reader.get_rec_name().unwrap();
        reader.get_rec_header().unwrap();
        let err = reader.get_hn_t::<u8>(tags::NAME).unwrap_err();
        let text = err.to_string();
        assert!(text.starts_with("ESM error: Expected subrecord NAME but got DATA"), "{text}");
        assert!(text.contains("File: test.esp"));
        assert!(text.contains("Record: FAKE"));
        assert!(text.contains("Offset: 0x14"));
    }

    #[test]
    fn test_stray_terminator_is_charged_to_record() {
        // NAME declares 0 bytes but a NUL follows; DATA comes after it.
        let mut payload = sub(b"NAME", &[]);
        payload.push(0);
        payload.extend(sub(b"DATA", &5u32.to_le_bytes()));
        let mut reader = raw_reader(record(b"FAKE", 0, &payload), DEFAULT_FORMAT_VERSION);
        reader.get_rec_name().unwrap();
        reader.get_rec_header().unwrap();

        assert_eq!(reader.get_hn_string(tags::NAME).unwrap(), "");
        assert_eq!(reader.get_hn_t::<u32>(tags::DATA).unwrap(), 5);
        assert!(!reader.has_more_subs());
    }

    #[test]
    fn test_stray_terminator_ignored_for_new_versions() {
        let mut payload = sub(b"NAME", &[]);
        payload.extend(sub(b"DATA", &5u32.to_le_bytes()));
        let mut reader = raw_reader(record(b"FAKE", 0, &payload), CURRENT_SAVE_GAME_FORMAT_VERSION);
        reader.get_rec_name().unwrap();
        reader.get_rec_header().unwrap();

        assert_eq!(reader.get_hn_string(tags::NAME).unwrap(), "");
        assert_eq!(reader.get_hn_t::<u32>(tags::DATA).unwrap(), 5);
    }

    #[test]
    fn test_overread_record_is_resynchronised() {
        let mut bytes = record(b"FAKE", 0, &sub(b"DATA", &[]));
        bytes.extend(record(b"NEXT", 0, &[]));
        let mut reader = raw_reader(bytes, DEFAULT_FORMAT_VERSION);
        reader.get_rec_name().unwrap();
        reader.get_rec_header().unwrap();
        reader.get_sub_name().unwrap();
        reader.get_sub_header().unwrap();
        // Pretend a loader consumed two bytes beyond the record.
        reader.stream().unwrap().skip(2).unwrap();
        reader.ctx.left_rec = -2;
        assert_eq!(reader.get_rec_name().unwrap(), RecName::new(b"NEXT"));
    }

    #[test]
    fn test_unsupported_ref_id_type_is_data_error() {
        let mut reader = raw_reader(record(b"FAKE", 0, &sub(b"NAME", &[9])), CURRENT_SAVE_GAME_FORMAT_VERSION);
        reader.get_rec_name().unwrap();
        reader.get_rec_header().unwrap();
        let err = reader.get_hn_ref_id(tags::NAME).unwrap_err();
        assert!(err.is_data());
        assert_eq!(err.reader_message(), Some("Unsupported RefIdType: 9"));
    }

    #[test]
    fn test_sized_string_longer_than_subrecord_fails() {
        let mut payload = vec![1u8];
        payload.extend_from_slice(&10u32.to_le_bytes());
        payload.extend_from_slice(b"abc");
        let mut reader = raw_reader(record(b"FAKE", 0, &sub(b"NAME", &payload)), CURRENT_SAVE_GAME_FORMAT_VERSION);
        reader.get_rec_name().unwrap();
        reader.get_rec_header().unwrap();
        let err = reader.get_hn_ref_id(tags::NAME).unwrap_err();
        assert!(err.is_structural());
    }

    #[test]
    fn test_content_file_mapping() {
        let mut payload = vec![3u8];
        payload.extend_from_slice(&0x2au32.to_le_bytes());
        payload.extend_from_slice(&1i32.to_le_bytes());
        let mut bytes = record(b"FAKE", 0, &sub(b"NAME", &payload));
        bytes.extend(record(b"FAKE", 0, &sub(b"NAME", &payload)));
        let mut reader = raw_reader(bytes, CURRENT_SAVE_GAME_FORMAT_VERSION);

        reader.set_content_file_mapping(Some(HashMap::from([(1, 5)])));
        reader.get_rec_name().unwrap();
        reader.get_rec_header().unwrap();
        assert_eq!(
            reader.get_hn_ref_id(tags::NAME).unwrap(),
            RefId::FormId(FormId::new(0x2a, 5))
        );

        reader.set_content_file_mapping(Some(HashMap::new()));
        reader.get_rec_name().unwrap();
        reader.get_rec_header().unwrap();
        assert_eq!(reader.get_hn_ref_id(tags::NAME).unwrap(), RefId::Empty);
    }

    #[test]
    fn test_context_restore_rereads_same_bytes() {
        let mut payload = sub(b"AAAA", &1u32.to_le_bytes());
        payload.extend(sub(b"BBBB", &2u32.to_le_bytes()));
        let mut reader = raw_reader(record(b"FAKE", 0, &payload), DEFAULT_FORMAT_VERSION);
        reader.get_rec_name().unwrap();
        reader.get_rec_header().unwrap();
        reader.get_hn_t::<u32>(RecName::new(b"AAAA")).unwrap();

        let ctx = reader.context().unwrap();
        assert_eq!(reader.get_hn_t::<u32>(RecName::new(b"BBBB")).unwrap(), 2);
        assert!(!reader.has_more_subs());

        reader.restore_context(&ctx).unwrap();
        assert!(reader.has_more_subs());
        assert_eq!(reader.get_hn_t::<u32>(RecName::new(b"BBBB")).unwrap(), 2);
    }

    #[test]
    fn test_writer_output_reads_back() {
        for version in [DEFAULT_FORMAT_VERSION, CURRENT_SAVE_GAME_FORMAT_VERSION] {
            let mut writer = EsmWriter::new(Cursor::new(Vec::new())).unwrap();
            writer.set_format_version(version);
            writer.set_author("an author");
            writer.save().unwrap();
            writer.start_record(FAKE, RecordFlags::empty()).unwrap();
            writer.write_hnc_ref_id(tags::NAME, &RefId::string("Some_Id")).unwrap();
            writer.write_cell_id(&RefId::exterior_cell(-3, 4)).unwrap();
            writer.end_record(FAKE).unwrap();
            let bytes = writer.close().unwrap().into_inner();

            let mut reader = EsmReader::new();
            reader.open(Box::new(Cursor::new(bytes)), "out.omwaddon").unwrap();
            assert_eq!(reader.format_version(), version);
            assert_eq!(reader.author(), "an author");
            assert_eq!(reader.get_rec_name().unwrap(), FAKE);
            reader.get_rec_header().unwrap();
            assert_eq!(reader.get_hn_ref_id(tags::NAME).unwrap(), RefId::string("some_id"));
            assert_eq!(reader.get_cell_id().unwrap(), RefId::exterior_cell(-3, 4));
            assert!(!reader.has_more_subs());
        }
    }
}
