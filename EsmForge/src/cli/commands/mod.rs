use clap::Subcommand;
use std::path::PathBuf;

pub mod dump;
pub mod execute;
pub mod header;
pub mod load;
pub mod rewrite;
pub mod versions;

#[derive(Subcommand)]
pub enum Commands {
    /// Show the TES3 header of a file
    Header {
        /// ESM/ESP/omwsave file
        file: PathBuf,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// List records and their subrecords
    Dump {
        /// ESM/ESP/omwsave file
        file: PathBuf,

        /// Only show records with this tag (e.g. CELL)
        #[arg(short, long)]
        record: Option<String>,

        /// Stop after this many records
        #[arg(short, long)]
        limit: Option<usize>,

        /// Only print per-tag record counts
        #[arg(short, long)]
        count: bool,
    },

    /// Load files as one load order and summarise the result
    Load {
        /// Files in load order, masters first
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Maximum number of files kept open at once
        #[arg(long, default_value_t = crate::pool::DEFAULT_CAPACITY)]
        capacity: usize,

        /// Print as JSON
        #[arg(long)]
        json: bool,
    },

    /// Read every record and write it back unchanged
    Rewrite {
        /// Source file
        #[arg(short, long)]
        source: PathBuf,

        /// Destination file
        #[arg(short, long)]
        destination: PathBuf,
    },

    /// Print the format version thresholds
    Versions {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}
