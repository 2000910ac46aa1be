//! # EsmForge
//!
//! A pure-Rust engine for TES3 content and save files (`.esm`, `.esp`,
//! `.omwaddon`, `.omwsave`) as read and written by `OpenMW`.
//!
//! ## What's Included
//!
//! - **Framing** - record/subrecord reader and writer with byte-exact size accounting
//! - **Format versions** - the threshold table that gates every layout change
//! - **RefIds** - legacy string ids and the tagged binary form
//! - **Reader pool** - a bounded set of open files addressed by load-order slot
//! - **Load order** - master resolution and reference number rewriting
//! - **Records** - cells with moved references, land height grids, dialogue info ordering
//!
//! ## Quick Start
//!
//! ### Reading Records
//!
//! ```no_run
//! use esmforge::prelude::*;
//!
//! let mut reader = EsmReader::new();
//! reader.open_path("Morrowind.esm")?;
//! println!("{} records by {}", reader.record_count(), reader.author());
//!
//! while reader.has_more_recs() {
//!     let name = reader.get_rec_name()?;
//!     reader.get_rec_header()?;
//!     if name == tags::DIAL {
//!         let topic = Dialogue::load(&mut reader)?;
//!         println!("topic {}", topic.record.id);
//!     }
//!     reader.skip_record()?;
//! }
//! # Ok::<(), esmforge::Error>(())
//! ```
//!
//! ### Loading a Load Order
//!
//! ```no_run
//! use esmforge::prelude::*;
//!
//! let pool = ReaderPool::default();
//! let content = load_content(&["Morrowind.esm", "Tribunal.esm", "MyMod.esp"], &pool)?;
//! for (name, count) in &content.record_counts {
//!     println!("{name}: {count}");
//! }
//! # Ok::<(), esmforge::Error>(())
//! ```
//!
//! ### Writing Records
//!
//! ```
//! use esmforge::prelude::*;
//! use std::io::Cursor;
//!
//! let mut writer = EsmWriter::new(Cursor::new(Vec::new()))?;
//! writer.set_author("me");
//! writer.save()?;
//! writer.start_record(tags::DIAL, RecordFlags::empty())?;
//! Dialogue { id: "Greeting".into(), ..Dialogue::default() }.save(&mut writer, false)?;
//! writer.end_record(tags::DIAL)?;
//! let bytes = writer.close()?.into_inner();
//! assert_eq!(&bytes[..4], b"TES3");
//! # Ok::<(), esmforge::Error>(())
//! ```
//!
//! ## Feature Flags
//!
//! - `cli` - Enables the `esmforge` command-line binary

pub mod error;
pub mod formats;
pub mod load_order;
pub mod loader;
pub mod pool;

// Re-exports for convenience
pub use error::{Error, Result};

/// Prelude module for common imports
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::formats::common::version::FormatVersion;
    pub use crate::formats::common::{tags, EsmValue, RecName, RecordFlags, TextEncoding};
    pub use crate::formats::esm::{EsmReader, EsmWriter, Header, MasterData, ReaderContext};
    pub use crate::formats::refid::{FormId, RefId};

    // Records
    pub use crate::formats::records::{
        Cell, CellRef, DialInfo, Dialogue, DialogueType, EsmRecord, InfoOrder, Land, LandData,
        LandDataTypes, Loaded, MovedCellRef, NextRef, RawSubrecord, RefNum,
    };

    // Load order
    pub use crate::load_order::adjust_ref_num;
    pub use crate::loader::{load_content, LoadedContent};
    pub use crate::pool::{BusyReader, ReaderPool, ReaderState};
}

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

// CLI module (feature-gated)
#[cfg(feature = "cli")]
pub mod cli;
