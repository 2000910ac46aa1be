//! Loading a whole load order
//!
//! Files are read in order, one pool slot each. Later files override
//! earlier ones: dialogue infos are spliced into their topic, land and cell
//! headers are replaced, and cells collect one reference-list context per
//! contributing file. Records flagged ignored are skipped.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;

use crate::error::Result;
use crate::formats::common::{tags, RecName, RecordFlags};
use crate::formats::esm::{EsmReader, Header};
use crate::formats::records::cell::GetNextRefMode;
use crate::formats::records::{Cell, Dialogue, EsmRecord, Land, Loaded, MovedCellRef, RefNum};
use crate::formats::refid::RefId;
use crate::pool::ReaderPool;

/// One file of the load order.
#[derive(Debug, Clone, Serialize)]
pub struct ContentFile {
    pub index: usize,
    pub path: PathBuf,
    pub header: Header,
    /// Pool slot of each master, in header order.
    pub parents: Vec<usize>,
}

/// A reference that a file moved into another exterior cell.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MovedRef {
    pub ref_num: RefNum,
    /// Cell whose reference list announced the move.
    pub cell: String,
    pub target: Option<(i32, i32)>,
}

/// Everything gathered from a load order.
#[derive(Debug, Default)]
pub struct LoadedContent {
    pub files: Vec<ContentFile>,
    /// Records seen per tag, in first-seen order.
    pub record_counts: IndexMap<RecName, usize>,
    /// Topics keyed by lowercased id.
    pub dialogues: IndexMap<String, Dialogue>,
    pub cells: IndexMap<RefId, Cell>,
    pub lands: HashMap<(i32, i32), Land>,
    pub moved_refs: Vec<MovedRef>,
}

/// Serializable overview of a [`LoadedContent`].
#[derive(Debug, Clone, Serialize)]
pub struct LoadSummary {
    pub files: Vec<ContentFile>,
    pub record_counts: IndexMap<RecName, usize>,
    pub dialogues: usize,
    pub infos: usize,
    pub cells: usize,
    pub lands: usize,
    pub moved_refs: Vec<MovedRef>,
}

impl LoadedContent {
    pub fn dialogue(&self, id: &str) -> Option<&Dialogue> {
        self.dialogues.get(&id.to_lowercase())
    }

    pub fn summary(&self) -> LoadSummary {
        LoadSummary {
            files: self.files.clone(),
            record_counts: self.record_counts.clone(),
            dialogues: self.dialogues.len(),
            infos: self.dialogues.values().map(|d| d.infos.len()).sum(),
            cells: self.cells.len(),
            lands: self.lands.len(),
            moved_refs: self.moved_refs.clone(),
        }
    }
}

/// Load `paths` in order, using pool slot `i` for the `i`-th file.
pub fn load_content<P: AsRef<Path>>(paths: &[P], pool: &ReaderPool) -> Result<LoadedContent> {
    let mut content = LoadedContent::default();

    for (index, path) in paths.iter().enumerate() {
        let path = path.as_ref();
        let mut reader = pool.get(index)?;
        reader.open_path(path)?;
        reader.resolve_parent_file_indices(pool)?;

        tracing::info!(
            "loading {} ({} records, {} masters)",
            path.display(),
            reader.record_count(),
            reader.masters().len()
        );
        content.files.push(ContentFile {
            index,
            path: path.to_path_buf(),
            header: reader.header().clone(),
            parents: reader.parent_file_indices().to_vec(),
        });

        FileLoader::new(&mut content).load(&mut reader)?;
    }

    for dialogue in content.dialogues.values_mut() {
        dialogue.clear_deleted_infos();
    }
    Ok(content)
}

struct FileLoader<'a> {
    content: &'a mut LoadedContent,
    /// Topic the following `INFO` records belong to.
    current_dialogue: Option<String>,
}

impl<'a> FileLoader<'a> {
    fn new(content: &'a mut LoadedContent) -> Self {
        Self {
            content,
            current_dialogue: None,
        }
    }

    fn load(mut self, esm: &mut EsmReader) -> Result<()> {
        while esm.has_more_recs() {
            let name = esm.get_rec_name()?;
            let flags = esm.get_rec_header()?;
            *self.content.record_counts.entry(name).or_insert(0) += 1;

            if flags.contains(RecordFlags::IGNORED) {
                tracing::debug!("skipping ignored {name} record");
                esm.skip_record()?;
                continue;
            }

            if name != tags::DIAL && name != tags::INFO {
                self.current_dialogue = None;
            }
            match name {
                tags::DIAL => self.load_dialogue(esm)?,
                tags::INFO => self.load_info(esm)?,
                tags::LAND => self.load_land(esm)?,
                tags::CELL => self.load_cell(esm)?,
                _ => {}
            }
            esm.skip_record()?;
        }
        Ok(())
    }

    fn load_dialogue(&mut self, esm: &mut EsmReader) -> Result<()> {
        let Loaded { record, is_deleted } = Dialogue::load(esm)?;
        let key = record.id.to_lowercase();
        if is_deleted {
            self.content.dialogues.shift_remove(&key);
            self.current_dialogue = None;
            return Ok(());
        }
        match self.content.dialogues.get_mut(&key) {
            Some(existing) => existing.dialogue_type = record.dialogue_type,
            None => {
                self.content.dialogues.insert(key.clone(), record);
            }
        }
        self.current_dialogue = Some(key);
        Ok(())
    }

    fn load_info(&mut self, esm: &mut EsmReader) -> Result<()> {
        let dialogue = match self.current_dialogue.as_deref() {
            Some(key) => self.content.dialogues.get_mut(key),
            None => None,
        };
        match dialogue {
            Some(dialogue) => {
                let merge = esm.index() != 0;
                dialogue.read_info(esm, merge)
            }
            None => {
                esm.warn("INFO record not preceded by a DIAL record");
                esm.skip_record()
            }
        }
    }

    fn load_land(&mut self, esm: &mut EsmReader) -> Result<()> {
        let Loaded { record, is_deleted } = Land::load(esm)?;
        let key = (record.x, record.y);
        if is_deleted {
            self.content.lands.remove(&key);
        } else {
            self.content.lands.insert(key, record);
        }
        Ok(())
    }

    fn load_cell(&mut self, esm: &mut EsmReader) -> Result<()> {
        let Loaded {
            mut record,
            is_deleted,
        } = Cell::load_with(esm, false)?;
        let id = record.cell_id();
        if is_deleted {
            self.content.cells.shift_remove(&id);
            return Ok(());
        }

        record.contexts.push(esm.context()?);
        while let Some(next) = Cell::next_ref_with_moved(esm, GetNextRefMode::LoadOnlyMoved)? {
            if let Some(MovedCellRef { ref_num, target }) = next.moved {
                self.content.moved_refs.push(MovedRef {
                    ref_num,
                    cell: id.to_string(),
                    target,
                });
            }
        }

        match self.content.cells.get_mut(&id) {
            Some(existing) => {
                let mut contexts = std::mem::take(&mut existing.contexts);
                contexts.append(&mut record.contexts);
                record.contexts = contexts;
                *existing = record;
            }
            None => {
                self.content.cells.insert(id, record);
            }
        }
        Ok(())
    }
}
