//! Snapshot of a reader's position and byte accounting

use std::path::{Path, PathBuf};

use crate::formats::common::{FormatVersion, RecName};

/// Everything needed to resume reading at a saved point, possibly with a
/// different reader instance (the file is reopened by name when needed).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ReaderContext {
    pub(crate) filename: PathBuf,
    /// Bytes left in the file after the current record.
    pub(crate) left_file: u64,
    /// Bytes left in the current record. Negative after an overread.
    pub(crate) left_rec: i64,
    /// Declared size of the current subrecord.
    pub(crate) left_sub: u32,
    /// Bytes of the current subrecord payload not yet consumed.
    pub(crate) sub_remaining: u32,
    pub(crate) rec_name: RecName,
    pub(crate) sub_name: RecName,
    /// The last subrecord name was peeked and will be returned again.
    pub(crate) sub_cached: bool,
    pub(crate) file_pos: u64,
    pub(crate) index: usize,
    pub(crate) parent_file_indices: Vec<usize>,
    pub(crate) format_version: FormatVersion,
}

impl ReaderContext {
    pub fn filename(&self) -> &Path {
        &self.filename
    }

    pub fn file_pos(&self) -> u64 {
        self.file_pos
    }

    pub fn left_file(&self) -> u64 {
        self.left_file
    }

    pub fn left_rec(&self) -> i64 {
        self.left_rec
    }

    pub fn rec_name(&self) -> RecName {
        self.rec_name
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn format_version(&self) -> FormatVersion {
        self.format_version
    }

    /// Reset the accounting for a newly opened stream. The reader's index and
    /// resolved parents belong to its load-order slot and are kept.
    pub(crate) fn clear(&mut self) {
        *self = ReaderContext {
            index: self.index,
            parent_file_indices: std::mem::take(&mut self.parent_file_indices),
            ..ReaderContext::default()
        };
    }
}
