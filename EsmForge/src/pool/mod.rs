//! Bounded pool of ESM readers
//!
//! Every content file of a load order gets a stable slot index. A slot's
//! reader is handed out as a [`BusyReader`] guard and returned when the guard
//! drops. Only `capacity` readers keep their file open; when a new slot needs
//! room, the least recently released idle reader is closed and remembers its
//! file name so the next `get` can reopen it.
//!
//! The pool is single threaded (`!Sync`) and does no locking. Asking for a
//! slot that is already handed out is an error, not a wait.

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::ops::{Deref, DerefMut};
use std::path::PathBuf;

use crate::error::{Error, Result};
use crate::formats::common::TextEncoding;
use crate::formats::esm::EsmReader;

/// Open readers kept by [`ReaderPool::default`].
pub const DEFAULT_CAPACITY: usize = 100;

/// Lifecycle of a pool slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    /// Handed out through a [`BusyReader`].
    Busy,
    /// Idle with its file still open.
    Free,
    /// Idle with its file closed.
    Closed,
}

struct Item {
    state: ReaderState,
    /// Held here while idle; moved into the guard while busy.
    reader: Box<EsmReader>,
    /// File to reopen, for readers the pool closed.
    name: Option<PathBuf>,
}

#[derive(Default)]
struct PoolState {
    items: HashMap<usize, Item>,
    /// Free slots, least recently released first.
    free: VecDeque<usize>,
    busy: usize,
}

impl PoolState {
    /// Close idle readers until one more open reader fits.
    fn close_extra(&mut self, capacity: usize) {
        while self.busy + self.free.len() + 1 > capacity {
            let Some(index) = self.free.pop_front() else {
                break;
            };
            let Some(item) = self.items.get_mut(&index) else {
                continue;
            };
            let name = item.reader.name().to_path_buf();
            tracing::debug!("closing idle reader {index} ({})", name.display());
            item.reader.close();
            item.name = Some(name);
            item.state = ReaderState::Closed;
        }
    }

    fn remove_free(&mut self, index: usize) {
        if let Some(pos) = self.free.iter().position(|&i| i == index) {
            self.free.remove(pos);
        }
    }
}

/// Pool of readers addressed by stable slot index.
pub struct ReaderPool {
    capacity: usize,
    encoding: TextEncoding,
    state: RefCell<PoolState>,
}

impl Default for ReaderPool {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl ReaderPool {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            encoding: TextEncoding::default(),
            state: RefCell::new(PoolState::default()),
        }
    }

    /// Encoding given to readers created by the pool.
    #[must_use]
    pub fn with_encoding(mut self, encoding: TextEncoding) -> Self {
        self.encoding = encoding;
        self
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of slots ever handed out.
    pub fn len(&self) -> usize {
        self.state.borrow().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn state_of(&self, index: usize) -> Option<ReaderState> {
        self.state.borrow().items.get(&index).map(|item| item.state)
    }

    /// Number of readers with an open file, busy or idle.
    pub fn open_count(&self) -> usize {
        let state = self.state.borrow();
        state.busy + state.free.len()
    }

    /// Take the reader of slot `index`.
    ///
    /// A new slot gets an unopened reader with its index set. A slot closed
    /// by the pool is reopened by name before it is returned.
    pub fn get(&self, index: usize) -> Result<BusyReader<'_>> {
        let mut state = self.state.borrow_mut();
        let current = state.items.get(&index).map(|item| item.state);

        let reader = match current {
            None => {
                state.close_extra(self.capacity);
                let mut reader = Box::new(EsmReader::new().with_encoding(self.encoding));
                reader.set_index(index);
                state.items.insert(
                    index,
                    Item {
                        state: ReaderState::Busy,
                        reader: Box::default(),
                        name: None,
                    },
                );
                reader
            }
            Some(ReaderState::Busy) => return Err(Error::ReaderBusy { index }),
            Some(ReaderState::Free) => {
                state.remove_free(index);
                Self::take(&mut state, index)
            }
            Some(ReaderState::Closed) => {
                state.close_extra(self.capacity);
                let Some(item) = state.items.get_mut(&index) else {
                    return Err(Error::ReaderNotOpen);
                };
                if let Some(name) = item.name.clone() {
                    tracing::debug!("reopening reader {index} ({})", name.display());
                    item.reader.open_path(&name)?;
                    item.name = None;
                }
                Self::take(&mut state, index)
            }
        };

        state.busy += 1;
        Ok(BusyReader {
            pool: self,
            index,
            reader,
        })
    }

    fn take(state: &mut PoolState, index: usize) -> Box<EsmReader> {
        match state.items.get_mut(&index) {
            Some(item) => {
                item.state = ReaderState::Busy;
                std::mem::take(&mut item.reader)
            }
            None => Box::default(),
        }
    }

    fn release(&self, index: usize, reader: Box<EsmReader>) {
        let mut state = self.state.borrow_mut();
        state.busy = state.busy.saturating_sub(1);
        let is_open = reader.is_open();
        if let Some(item) = state.items.get_mut(&index) {
            item.reader = reader;
            item.state = if is_open {
                ReaderState::Free
            } else {
                ReaderState::Closed
            };
        }
        if is_open {
            state.free.push_back(index);
        }
    }
}

/// A reader taken from a [`ReaderPool`]; returned to its slot on drop.
pub struct BusyReader<'a> {
    pool: &'a ReaderPool,
    index: usize,
    reader: Box<EsmReader>,
}

impl BusyReader<'_> {
    pub fn slot(&self) -> usize {
        self.index
    }
}

impl Deref for BusyReader<'_> {
    type Target = EsmReader;

    fn deref(&self) -> &EsmReader {
        &self.reader
    }
}

impl DerefMut for BusyReader<'_> {
    fn deref_mut(&mut self) -> &mut EsmReader {
        &mut self.reader
    }
}

impl Drop for BusyReader<'_> {
    fn drop(&mut self) {
        let reader = std::mem::take(&mut self.reader);
        self.pool.release(self.index, reader);
    }
}
