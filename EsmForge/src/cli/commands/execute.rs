//! Command execution implementations

use super::Commands;
use super::{dump, header, load, rewrite, versions};
use crate::formats::common::TextEncoding;

impl Commands {
    /// Execute the selected command.
    ///
    /// # Errors
    /// Returns an error if the underlying command fails.
    pub fn execute(&self, encoding: TextEncoding) -> anyhow::Result<()> {
        match self {
            Commands::Header { file, json } => header::execute(file, encoding, *json),
            Commands::Dump {
                file,
                record,
                limit,
                count,
            } => dump::execute(file, encoding, record.as_deref(), *limit, *count),
            Commands::Load {
                files,
                capacity,
                json,
            } => load::execute(files, encoding, *capacity, *json),
            Commands::Rewrite {
                source,
                destination,
            } => rewrite::execute(source, destination, encoding),
            Commands::Versions { json } => versions::execute(*json),
        }
    }
}
