//! ESM framing: the `TES3` header plus record and subrecord streams
//!
//! File layout:
//! - record: 4-byte tag, `u32` payload size, `u32` unused, `u32` flags, payload
//! - subrecord: 4-byte tag, `u32` payload size, payload
//!
//! All integers are little-endian. The first record of every file is `TES3`.

mod context;
mod header;
mod reader;
mod stream;
mod writer;

pub use context::ReaderContext;
pub use header::{file_type, Header, MasterData, AUTHOR_SIZE, DESCRIPTION_SIZE, VER_120, VER_130};
pub use reader::EsmReader;
pub use stream::ReadSeek;
pub use writer::{EsmWriter, DEFAULT_WORLDSPACE};
