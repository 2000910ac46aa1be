//! CLI command for showing a file header

use std::path::Path;

use crate::formats::common::TextEncoding;
use crate::formats::esm::{file_type, EsmReader};

fn file_type_name(value: u32) -> &'static str {
    match value {
        file_type::ESP => "plugin",
        file_type::ESM => "master",
        file_type::ESS => "save",
        _ => "unknown",
    }
}

pub fn execute(path: &Path, encoding: TextEncoding, json: bool) -> anyhow::Result<()> {
    let mut reader = EsmReader::new().with_encoding(encoding);
    reader.open_path(path)?;
    let header = reader.header();

    if json {
        println!("{}", serde_json::to_string_pretty(header)?);
        return Ok(());
    }

    println!("File: {}", path.display());
    println!("  Format version: {}", header.format_version);
    println!("  Version: {:.2}", header.version);
    println!(
        "  Type: {} ({})",
        file_type_name(header.file_type),
        header.file_type
    );
    println!("  Author: {}", header.author);
    if !header.description.is_empty() {
        println!("  Description: {}", header.description.replace('\n', "\\n"));
    }
    println!("  Records: {}", header.record_count);
    if !header.masters.is_empty() {
        println!("  Masters:");
        for master in &header.masters {
            println!("    {} ({} bytes)", master.name, master.size);
        }
    }

    Ok(())
}
