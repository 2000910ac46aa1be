//! Record header flags

use bitflags::bitflags;

bitflags! {
    /// Flags word stored in every record header.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RecordFlags: u32 {
        /// Record is a deletion of an earlier definition.
        const DELETED = 0x0000_0020;
        /// Reference persists across cell unloads.
        const PERSISTENT = 0x0000_0400;
        /// Record must be skipped by loaders.
        const IGNORED = 0x0000_1000;
        /// Record is blocked from being overridden.
        const BLOCKED = 0x0000_2000;
    }
}
