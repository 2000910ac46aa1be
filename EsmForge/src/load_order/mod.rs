//! Content-file index resolution
//!
//! A plugin lists its masters by file name. Once the masters are open in a
//! [`ReaderPool`], each name is mapped to the slot of the reader holding that
//! file, and reference numbers that point into a master are rewritten to
//! that slot.

use std::path::Path;

use crate::error::Result;
use crate::formats::esm::EsmReader;
use crate::formats::records::RefNum;
use crate::pool::ReaderPool;

/// Bits of a narrow reference number holding the local master number.
const LOCAL_FILE_SHIFT: u32 = 24;
const LOCAL_INDEX_MASK: u32 = 0x00ff_ffff;

fn file_name_matches(path: &Path, name: &str) -> bool {
    path.file_name()
        .map(|f| f.to_string_lossy().eq_ignore_ascii_case(name))
        .unwrap_or(false)
}

impl EsmReader {
    /// Map each master of this file to the pool slot holding it.
    ///
    /// Only slots before this reader's own index are searched, and slots whose
    /// reader has no data (not an ESM file) are skipped. A master that is not
    /// found maps to this reader's own index.
    pub fn resolve_parent_file_indices(&mut self, pool: &ReaderPool) -> Result<()> {
        let own = self.index();
        let mut resolved = Vec::with_capacity(self.masters().len());

        for master in self.masters() {
            let mut index = own;
            for candidate in 0..own {
                let reader = pool.get(candidate)?;
                if reader.file_size() == 0 {
                    continue;
                }
                if file_name_matches(reader.name(), &master.name) {
                    index = candidate;
                    break;
                }
            }
            if index == own {
                tracing::warn!(
                    "master {} of {} is not loaded before it",
                    master.name,
                    self.name().display()
                );
            }
            resolved.push(index);
        }

        tracing::debug!(
            "resolved masters of {}: {:?}",
            self.name().display(),
            resolved
        );
        self.ctx.parent_file_indices = resolved;
        Ok(())
    }
}

/// Rewrite a reference number read from `esm` to load-order terms.
///
/// The top byte of the index is the 1-based number of the master that
/// created the reference. A valid master number selects that master's slot;
/// anything else means the reference was created by this file.
pub fn adjust_ref_num(ref_num: &mut RefNum, esm: &EsmReader) {
    let local = (ref_num.index >> LOCAL_FILE_SHIFT) as usize;
    let parents = esm.parent_file_indices();
    if local != 0 && local <= parents.len() {
        ref_num.index &= LOCAL_INDEX_MASK;
        ref_num.content_file = parents[local - 1] as i32;
    } else {
        ref_num.content_file = esm.index() as i32;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::esm::EsmWriter;
    use pretty_assertions::assert_eq;
    use std::fs::File;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn write_file(dir: &TempDir, name: &str, masters: &[&str]) -> PathBuf {
        let path = dir.path().join(name);
        let mut writer = EsmWriter::new(File::create(&path).unwrap()).unwrap();
        for master in masters {
            writer.add_master(*master, 0);
        }
        writer.save().unwrap();
        writer.close().unwrap();
        path
    }

    fn open_all(pool: &ReaderPool, paths: &[PathBuf]) {
        for (i, path) in paths.iter().enumerate() {
            let mut reader = pool.get(i).unwrap();
            reader.open_path(path).unwrap();
            reader.resolve_parent_file_indices(pool).unwrap();
        }
    }

    #[test]
    fn test_masters_resolve_case_insensitively() {
        let dir = TempDir::new().unwrap();
        let paths = vec![
            write_file(&dir, "Morrowind.esm", &[]),
            write_file(&dir, "Tribunal.esm", &["morrowind.ESM"]),
            write_file(&dir, "Mod.esp", &["Tribunal.esm", "Morrowind.esm", "Missing.esm"]),
        ];
        let pool = ReaderPool::default();
        open_all(&pool, &paths);

        assert_eq!(pool.get(1).unwrap().parent_file_indices(), &[0]);
        assert_eq!(pool.get(2).unwrap().parent_file_indices(), &[1, 0, 2]);
    }

    #[test]
    fn test_resolution_reopens_evicted_masters() {
        let dir = TempDir::new().unwrap();
        let paths = vec![
            write_file(&dir, "A.esm", &[]),
            write_file(&dir, "B.esm", &[]),
            write_file(&dir, "C.esp", &["A.esm", "B.esm"]),
        ];
        let pool = ReaderPool::new(1);
        open_all(&pool, &paths);
        assert_eq!(pool.get(2).unwrap().parent_file_indices(), &[0, 1]);
    }

    #[test]
    fn test_adjust_ref_num() {
        let mut reader = EsmReader::new();
        reader.set_index(5);
        reader.ctx.parent_file_indices = vec![0, 3];

        let mut from_master = RefNum::new(0x0200_0010, -1);
        adjust_ref_num(&mut from_master, &reader);
        assert_eq!(from_master, RefNum::new(0x10, 3));

        let mut own = RefNum::new(0x11, -1);
        adjust_ref_num(&mut own, &reader);
        assert_eq!(own, RefNum::new(0x11, 5));

        // Out of range master numbers are kept as part of the index.
        let mut unknown = RefNum::new(0x0300_0001, -1);
        adjust_ref_num(&mut unknown, &reader);
        assert_eq!(unknown, RefNum::new(0x0300_0001, 5));
    }
}
