//! CLI command for printing the format version table

use indexmap::IndexMap;

use crate::formats::common::version::FORMAT_VERSIONS;

pub fn execute(json: bool) -> anyhow::Result<()> {
    if json {
        let table: IndexMap<&str, u32> = FORMAT_VERSIONS.iter().copied().collect();
        println!("{}", serde_json::to_string_pretty(&table)?);
        return Ok(());
    }

    let width = FORMAT_VERSIONS
        .iter()
        .map(|(name, _)| name.len())
        .max()
        .unwrap_or(0);
    for (name, version) in FORMAT_VERSIONS {
        println!("{name:<width$}  {version}");
    }

    Ok(())
}
