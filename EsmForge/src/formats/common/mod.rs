//! Building blocks shared by the ESM reader, writer and records

mod encoding;
mod flags;
mod name;
mod value;
pub mod version;

pub use encoding::TextEncoding;
pub use flags::RecordFlags;
pub use name::{tags, RecName};
pub use value::EsmValue;
pub use version::FormatVersion;
