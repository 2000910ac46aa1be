//! CLI command for loading a load order

use std::path::PathBuf;

use crate::formats::common::TextEncoding;
use crate::loader::load_content;
use crate::pool::ReaderPool;

pub fn execute(
    files: &[PathBuf],
    encoding: TextEncoding,
    capacity: usize,
    json: bool,
) -> anyhow::Result<()> {
    let pool = ReaderPool::new(capacity).with_encoding(encoding);
    let content = load_content(files, &pool)?;
    let summary = content.summary();

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Load order:");
    for file in &summary.files {
        println!("  [{}] {}", file.index, file.path.display());
        for (master, slot) in file.header.masters.iter().zip(&file.parents) {
            println!("      master {} -> [{slot}]", master.name);
        }
    }

    println!();
    println!("Records:");
    for (name, count) in &summary.record_counts {
        println!("  {name}: {count}");
    }

    println!();
    println!("Dialogue topics: {} ({} infos)", summary.dialogues, summary.infos);
    println!("Cells: {}", summary.cells);
    println!("Land records: {}", summary.lands);
    if !summary.moved_refs.is_empty() {
        println!("Moved references: {}", summary.moved_refs.len());
        for moved in &summary.moved_refs {
            let target = moved
                .target
                .map(|(x, y)| format!("{x}, {y}"))
                .unwrap_or_else(|| "?".to_string());
            println!(
                "  {:#x} (file {}) in {} -> ({target})",
                moved.ref_num.index, moved.ref_num.content_file, moved.cell
            );
        }
    }

    Ok(())
}
